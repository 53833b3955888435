//! TypeScript declaration surface for shortcut invocations.
//!
//! Variant order follows config order and field order follows parameter
//! order, so regenerating from the same config is byte-stable.

use crate::config::{ShortcutConfig, ShortcutDefinition};
use std::fmt::Write;

pub const GENERATED_HEADER: &str = "// This file is @generated by shortcut-bridge. DO NOT EDIT.\n";

/// Render the `shortcuts.d.ts` declaration file.
pub fn generate_type_surface(config: &ShortcutConfig) -> String {
    let mut out = String::new();
    out.push_str(GENERATED_HEADER);
    out.push('\n');

    if config.shortcuts.is_empty() {
        out.push_str("export type ShortcutInvocation = never;\n");
    } else {
        out.push_str("export type ShortcutInvocation =\n");
        for shortcut in &config.shortcuts {
            let _ = writeln!(out, "  | {}", render_variant(shortcut));
        }
        // close the union
        out.pop();
        out.push_str(";\n");
    }
    out.push('\n');

    out.push_str("export type ShortcutIdentifier = ShortcutInvocation[\"identifier\"];\n\n");
    out.push_str(
        "export type ShortcutParameters<I extends ShortcutIdentifier> = Extract<\n  ShortcutInvocation,\n  { identifier: I }\n>[\"parameters\"];\n\n",
    );
    out.push_str("/** Reply spoken by the assistant. Omit or pass \"\" for the default reply. */\n");
    out.push_str("export type ShortcutResponder = (message?: string) => void;\n\n");
    out.push_str("export type ShortcutListener = (\n");
    out.push_str("  invocation: ShortcutInvocation & { nonce: string; userConfirmed?: boolean },\n");
    out.push_str("  respond: ShortcutResponder,\n");
    out.push_str(") => void | Promise<void>;\n\n");
    out.push_str("export interface ShortcutSubscription {\n");
    out.push_str("  remove(): void;\n");
    out.push_str("}\n\n");
    out.push_str(
        "export declare function addShortcutListener(listener: ShortcutListener): ShortcutSubscription;\n",
    );
    out.push_str(
        "export declare function updateAppState(key: string, value: unknown): void;\n",
    );
    out.push_str(
        "export declare function clearAppState(keys?: string[]): void;\n",
    );
    out
}

/// One union member: `{ identifier: "<id>"; parameters… }`.
fn render_variant(shortcut: &ShortcutDefinition) -> String {
    let identifier = typescript_string_literal(&shortcut.identifier);
    if shortcut.parameters.is_empty() {
        return format!("{{ identifier: {identifier}; parameters?: never }}");
    }

    let fields: Vec<String> = shortcut
        .parameters
        .iter()
        .map(|p| {
            let marker = if p.optional { "?" } else { "" };
            format!("{}{marker}: {}", p.name, p.param_type.typescript_type())
        })
        .collect();
    let any_required = shortcut.parameters.iter().any(|p| !p.optional);
    let marker = if any_required { "" } else { "?" };
    format!(
        "{{ identifier: {identifier}; parameters{marker}: {{ {} }} }}",
        fields.join("; ")
    )
}

/// JSON string encoding doubles as a TypeScript string literal.
fn typescript_string_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.replace('"', "\\\"")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> ShortcutConfig {
        ShortcutConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn variants_follow_config_order() {
        let cfg = config(
            r#"
shortcuts:
  - identifier: startTimer
    title: Start
    phrases: [start]
  - identifier: addTodo
    title: Add
    phrases: [add]
    parameters:
      - { name: text, title: Text, type: string, optional: false }
      - { name: due, title: Due, type: date }
      - { name: done, title: Done, type: boolean }
  - identifier: setVolume
    title: Volume
    phrases: [volume]
    parameters:
      - { name: level, title: Level, type: number }
"#,
        );
        let out = generate_type_surface(&cfg);
        let expected_union = "export type ShortcutInvocation =\n  | { identifier: \"startTimer\"; parameters?: never }\n  | { identifier: \"addTodo\"; parameters: { text: string; due?: Date; done?: boolean } }\n  | { identifier: \"setVolume\"; parameters?: { level?: number } };\n";
        assert!(out.contains(expected_union), "got:\n{out}");
        assert!(out.starts_with(GENERATED_HEADER));
    }

    #[test]
    fn empty_config_is_never() {
        let out = generate_type_surface(&config("shortcuts: []"));
        assert!(out.contains("export type ShortcutInvocation = never;\n"));
        assert!(out.contains("export type ShortcutListener"));
    }

    #[test]
    fn listener_shapes_present() {
        let out = generate_type_surface(&config(
            "shortcuts: [{ identifier: a, title: A, phrases: [a] }]",
        ));
        assert!(out.contains("export type ShortcutResponder = (message?: string) => void;"));
        assert!(out.contains("export declare function addShortcutListener"));
    }

    #[test]
    fn output_is_deterministic() {
        let cfg = config(
            "shortcuts: [{ identifier: a, title: A, phrases: [a], parameters: [{ name: x, title: X, type: number }] }]",
        );
        assert_eq!(generate_type_surface(&cfg), generate_type_surface(&cfg));
    }
}
