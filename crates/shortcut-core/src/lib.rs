pub mod config;
pub mod error;
pub mod generate;
pub mod io;
pub mod localization;
pub mod paths;
pub mod protocol;
pub mod swift;
pub mod template;
pub mod typescript;

pub use error::{Result, ShortcutError};
