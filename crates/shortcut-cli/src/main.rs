mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::bridge::BridgeSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "shortcuts",
    about = "Generate App Intents from a shortcut config and drive the app bridge",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: nearest directory with shortcuts.yaml, then .git/)
    #[arg(long, global = true, env = "SHORTCUTS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the Swift intents, catalogs, and TypeScript declarations
    Generate {
        /// Config file (default: <root>/shortcuts.yaml, then shortcuts.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Existing directory for the Swift source and catalogs (default: <root>/ios)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Declaration file path (default: <root>/shortcuts.d.ts)
        #[arg(long)]
        types_out: Option<PathBuf>,

        /// Bundle identifier used for the default app group
        #[arg(long, env = "SHORTCUTS_BUNDLE_ID")]
        bundle_id: Option<String>,
    },

    /// Check the config without writing anything
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Inspect and drive the shared store
    Bridge {
        /// Shared container directory (default: <root>/.shortcut-bridge)
        #[arg(long, env = "SHORTCUTS_STORE_DIR")]
        store_dir: Option<PathBuf>,

        #[command(subcommand)]
        subcommand: BridgeSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Bridge {
            subcommand: BridgeSubcommand::Listen { .. },
            ..
        } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Generate {
            config,
            out,
            types_out,
            bundle_id,
        } => cmd::generate::run(
            &root,
            cmd::generate::GenerateArgs {
                config,
                out,
                types_out,
                bundle_id,
            },
            cli.json,
        ),
        Commands::Validate { config } => cmd::validate::run(&root, config.as_deref(), cli.json),
        Commands::Bridge {
            store_dir,
            subcommand,
        } => cmd::bridge::run(&root, store_dir, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
