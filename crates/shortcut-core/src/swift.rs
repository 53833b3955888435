//! Swift `AppIntents` source generation.
//!
//! Each fragment of an intent is rendered by its own function so tests can
//! pin exact output without rebuilding a whole file. Statements inside
//! `perform()` are indented by eight spaces.

use crate::config::{ParamType, ParameterSpec, ShortcutConfig, ShortcutDefinition, StateDialog};
use crate::localization::{
    description_key, dialog_key, param_prompt_key, param_title_key, title_key,
};
use crate::protocol::{
    app_state_key, param_key, param_type_key, APP_GROUP_ERROR_KEY, APP_GROUP_ERROR_REPLY,
    COMMAND_NONCE_KEY, COMMAND_SIGNAL_NAME, COMMAND_TIMESTAMP_KEY, DEFAULT_REPLY,
    DEFAULT_REPLY_KEY, PARAM_PREFIX, PARAM_TYPE_PREFIX, PENDING_COMMAND_KEY, POLL_INTERVAL_MS, RESPONSE_PREFIX,
    RESPONSE_TIMEOUT_SECS, USER_CONFIRMED_KEY,
};
use crate::template::{
    default_prompt, extract_placeholders, normalize_phrase, swift_phrase_literal,
    swift_string_literal, synthesize_equality_condition,
};
use std::collections::HashSet;
use std::fmt::Write;

pub const GENERATED_HEADER: &str = "// This file is @generated by shortcut-bridge. DO NOT EDIT.\n// Regenerate with `shortcuts generate`.\n";

/// Icon used when a shortcut does not name one.
pub const DEFAULT_SYSTEM_IMAGE: &str = "app.badge";

pub const PROVIDER_TYPE_NAME: &str = "ShortcutBridgeShortcuts";

const APP_GROUP_CONST: &str = "shortcutBridgeAppGroupId";
const SIGNAL_CONST: &str = "shortcutBridgeSignalName";

const BODY: &str = "        ";

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Render the complete intents source file.
pub fn render_file(config: &ShortcutConfig, app_group: &str) -> String {
    let localized = config.localization;
    let mut out = String::new();
    out.push_str(GENERATED_HEADER);
    out.push('\n');
    out.push_str("import AppIntents\nimport Foundation\n\n");
    let _ = writeln!(
        out,
        "private let {APP_GROUP_CONST} = {}",
        swift_string_literal(app_group)
    );
    let _ = writeln!(
        out,
        "private let {SIGNAL_CONST} = {}",
        swift_string_literal(COMMAND_SIGNAL_NAME)
    );

    for shortcut in &config.shortcuts {
        out.push('\n');
        out.push_str(&render_intent(shortcut, localized));
    }

    if !config.shortcuts.is_empty() {
        out.push('\n');
        out.push_str(&render_shortcuts_provider(config));
    }
    out
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

pub fn render_intent(shortcut: &ShortcutDefinition, localized: bool) -> String {
    let id = &shortcut.identifier;
    let mut out = String::new();
    out.push_str("@available(iOS 16.0, *)\n");
    let _ = writeln!(out, "struct {}: AppIntent {{", shortcut.intent_type_name());
    let _ = writeln!(
        out,
        "    static var title: LocalizedStringResource = {}",
        localized_resource(&title_key(id), &shortcut.title, localized)
    );
    if let Some(desc) = &shortcut.description {
        let _ = writeln!(
            out,
            "    static var description = IntentDescription({})",
            localized_resource(&description_key(id), desc, localized)
        );
    }
    out.push_str("    static var openAppWhenRun: Bool = false\n");

    for param in &shortcut.parameters {
        out.push('\n');
        out.push_str(&render_parameter_declaration(shortcut, param, localized));
    }

    out.push('\n');
    out.push_str("    func perform() async throws -> some IntentResult & ProvidesDialog {\n");
    out.push_str(&render_store_guard(localized));

    for param in &shortcut.parameters {
        out.push('\n');
        out.push_str(&render_value_request(shortcut, param, localized));
    }

    if shortcut.requires_confirmation() {
        out.push('\n');
        let _ = writeln!(out, "{BODY}var userConfirmed = false");
    }

    for (index, dialog) in shortcut.dialogs.iter().enumerate() {
        out.push('\n');
        out.push_str(&render_dialog(shortcut, index, dialog, localized));
    }

    out.push('\n');
    out.push_str(&render_publication(shortcut));
    out.push('\n');
    out.push_str(&render_signal());
    out.push('\n');
    out.push_str(&render_poll(localized));
    out.push_str("    }\n");
    out.push_str("}\n");
    out
}

/// `@Parameter` property. Always optional: the value slot is empty until
/// the user supplies it, whatever the config says about required-ness.
pub fn render_parameter_declaration(
    shortcut: &ShortcutDefinition,
    param: &ParameterSpec,
    localized: bool,
) -> String {
    let title = localized_resource(
        &param_title_key(&shortcut.identifier, &param.name),
        &param.title,
        localized,
    );
    let attribute = match &param.description {
        Some(desc) => format!(
            "    @Parameter(title: {title}, description: {})\n",
            swift_string_literal(desc)
        ),
        None => format!("    @Parameter(title: {title})\n"),
    };
    format!(
        "{attribute}    var {}: {}?\n",
        param.name,
        param.param_type.swift_type()
    )
}

fn render_store_guard(localized: bool) -> String {
    let reply = localized_string(APP_GROUP_ERROR_KEY, APP_GROUP_ERROR_REPLY, localized);
    format!(
        "{BODY}guard let defaults = UserDefaults(suiteName: {APP_GROUP_CONST}) else {{\n\
         {BODY}    return .result(dialog: IntentDialog(stringLiteral: {reply}))\n\
         {BODY}}}\n"
    )
}

pub fn render_value_request(
    shortcut: &ShortcutDefinition,
    param: &ParameterSpec,
    localized: bool,
) -> String {
    let prompt = localized_string(
        &param_prompt_key(&shortcut.identifier, &param.name),
        &default_prompt(&param.title),
        localized,
    );
    let name = &param.name;
    format!(
        "{BODY}if {name} == nil {{\n\
         {BODY}    {name} = try await ${name}.requestValue(IntentDialog(stringLiteral: {prompt}))\n\
         {BODY}}}\n"
    )
}

// ---------------------------------------------------------------------------
// Dialogs
// ---------------------------------------------------------------------------

/// Guarded dialog block. Confirmation dialogs continue (or throw on refusal);
/// message-only dialogs end the intent with the message.
pub fn render_dialog(
    shortcut: &ShortcutDefinition,
    index: usize,
    dialog: &StateDialog,
    localized: bool,
) -> String {
    let condition = synthesize_equality_condition(&dialog.state_key, &dialog.show_when);
    let inner = format!("{BODY}    ");
    let mut out = String::new();
    let _ = writeln!(out, "{BODY}if {condition} {{");
    out.push_str(&render_message(
        &dialog_key(&shortcut.identifier, index),
        &dialog.message,
        localized,
        &inner,
    ));
    if dialog.requires_confirmation {
        let _ = writeln!(
            out,
            "{inner}try await requestConfirmation(result: .result(dialog: IntentDialog(stringLiteral: message)))"
        );
        let _ = writeln!(out, "{inner}userConfirmed = true");
    } else {
        let _ = writeln!(
            out,
            "{inner}return .result(dialog: IntentDialog(stringLiteral: message))"
        );
    }
    let _ = writeln!(out, "{BODY}}}");
    out
}

/// Bind `message` to the dialog text, substituting `${var}` placeholders
/// from app state: text read first, then a number, else left as written.
pub fn render_message(key: &str, template: &str, localized: bool, indent: &str) -> String {
    let base = localized_string(key, template, localized);
    let placeholders = extract_placeholders(template);
    if placeholders.is_empty() {
        return format!("{indent}let message = {base}\n");
    }

    let mut out = format!("{indent}var message = {base}\n");
    for name in placeholders {
        let state = swift_string_literal(&app_state_key(&name));
        let token = swift_string_literal(&format!("${{{name}}}"));
        let _ = writeln!(out, "{indent}if let value = defaults.string(forKey: {state}) {{");
        let _ = writeln!(
            out,
            "{indent}    message = message.replacingOccurrences(of: {token}, with: value)"
        );
        let _ = writeln!(
            out,
            "{indent}}} else if let value = defaults.object(forKey: {state}) as? NSNumber {{"
        );
        let _ = writeln!(
            out,
            "{indent}    message = message.replacingOccurrences(of: {token}, with: value.stringValue)"
        );
        let _ = writeln!(out, "{indent}}}");
    }
    out
}

// ---------------------------------------------------------------------------
// Command publication, signal, poll
// ---------------------------------------------------------------------------

/// Clears what an unconsumed earlier command left behind, then writes
/// parameters before the command keys.
pub fn render_publication(shortcut: &ShortcutDefinition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BODY}let nonce = UUID().uuidString");
    let _ = writeln!(
        out,
        "{BODY}for key in defaults.dictionaryRepresentation().keys where key.hasPrefix({}) || key.hasPrefix({}) {{",
        swift_string_literal(PARAM_PREFIX),
        swift_string_literal(PARAM_TYPE_PREFIX)
    );
    let _ = writeln!(out, "{BODY}    defaults.removeObject(forKey: key)");
    let _ = writeln!(out, "{BODY}}}");
    for param in &shortcut.parameters {
        let key = swift_string_literal(&param_key(&param.name));
        let _ = writeln!(out, "{BODY}if let value = {} {{", param.name);
        let stored = match param.param_type {
            ParamType::Date => "value.timeIntervalSince1970",
            ParamType::String | ParamType::Number | ParamType::Boolean => "value",
        };
        let _ = writeln!(out, "{BODY}    defaults.set({stored}, forKey: {key})");
        if let Some(tag) = param.param_type.type_tag() {
            let _ = writeln!(
                out,
                "{BODY}    defaults.set({}, forKey: {})",
                swift_string_literal(tag),
                swift_string_literal(&param_type_key(&param.name))
            );
        }
        let _ = writeln!(out, "{BODY}}}");
    }
    let _ = writeln!(
        out,
        "{BODY}defaults.set({}, forKey: {})",
        swift_string_literal(&shortcut.identifier),
        swift_string_literal(PENDING_COMMAND_KEY)
    );
    let _ = writeln!(
        out,
        "{BODY}defaults.set(nonce, forKey: {})",
        swift_string_literal(COMMAND_NONCE_KEY)
    );
    let _ = writeln!(
        out,
        "{BODY}defaults.set(Date().timeIntervalSince1970, forKey: {})",
        swift_string_literal(COMMAND_TIMESTAMP_KEY)
    );
    let confirmed_key = swift_string_literal(USER_CONFIRMED_KEY);
    if shortcut.requires_confirmation() {
        let _ = writeln!(out, "{BODY}if userConfirmed {{");
        let _ = writeln!(out, "{BODY}    defaults.set(true, forKey: {confirmed_key})");
        let _ = writeln!(out, "{BODY}}} else {{");
        let _ = writeln!(out, "{BODY}    defaults.removeObject(forKey: {confirmed_key})");
        let _ = writeln!(out, "{BODY}}}");
    } else {
        let _ = writeln!(out, "{BODY}defaults.removeObject(forKey: {confirmed_key})");
    }
    let _ = writeln!(out, "{BODY}defaults.synchronize()");
    out
}

pub fn render_signal() -> String {
    format!(
        "{BODY}CFNotificationCenterPostNotification(\n\
         {BODY}    CFNotificationCenterGetDarwinNotifyCenter(),\n\
         {BODY}    CFNotificationName({SIGNAL_CONST} as CFString),\n\
         {BODY}    nil,\n\
         {BODY}    nil,\n\
         {BODY}    true\n\
         {BODY})\n"
    )
}

pub fn render_poll(localized: bool) -> String {
    let done = localized_string(DEFAULT_REPLY_KEY, DEFAULT_REPLY, localized);
    let nanos = POLL_INTERVAL_MS * 1_000_000;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{BODY}let responseKey = \"{RESPONSE_PREFIX}\\(nonce)\""
    );
    let _ = writeln!(
        out,
        "{BODY}let deadline = Date().addingTimeInterval({RESPONSE_TIMEOUT_SECS:.1})"
    );
    let _ = writeln!(out, "{BODY}while Date() < deadline {{");
    let _ = writeln!(
        out,
        "{BODY}    if let response = defaults.string(forKey: responseKey) {{"
    );
    let _ = writeln!(
        out,
        "{BODY}        defaults.removeObject(forKey: responseKey)"
    );
    let _ = writeln!(
        out,
        "{BODY}        return .result(dialog: IntentDialog(stringLiteral: response.isEmpty ? {done} : response))"
    );
    let _ = writeln!(out, "{BODY}    }}");
    let _ = writeln!(out, "{BODY}    try await Task.sleep(nanoseconds: {nanos})");
    let _ = writeln!(out, "{BODY}}}");
    let _ = writeln!(
        out,
        "{BODY}return .result(dialog: IntentDialog(stringLiteral: {done}))"
    );
    out
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// One `AppShortcut(...)` entry, indented for the provider body.
pub fn render_registration(shortcut: &ShortcutDefinition, localized: bool) -> String {
    let mut out = String::new();
    out.push_str("        AppShortcut(\n");
    let _ = writeln!(out, "            intent: {}(),", shortcut.intent_type_name());
    out.push_str("            phrases: [\n");
    let mut seen = HashSet::new();
    for phrase in shortcut.phrases.iter().filter(|p| !p.trim().is_empty()) {
        let normalized = normalize_phrase(phrase);
        if seen.insert(normalized.clone()) {
            let _ = writeln!(out, "                {},", swift_phrase_literal(&normalized));
        }
    }
    out.push_str("            ],\n");
    let _ = writeln!(
        out,
        "            shortTitle: {},",
        localized_resource(&title_key(&shortcut.identifier), &shortcut.title, localized)
    );
    let icon = shortcut
        .system_image_name
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_IMAGE);
    let _ = writeln!(out, "            systemImageName: {}", swift_string_literal(icon));
    out.push_str("        )\n");
    out
}

pub fn render_shortcuts_provider(config: &ShortcutConfig) -> String {
    let mut out = String::new();
    out.push_str("@available(iOS 16.0, *)\n");
    let _ = writeln!(out, "struct {PROVIDER_TYPE_NAME}: AppShortcutsProvider {{");
    out.push_str("    static var appShortcuts: [AppShortcut] {\n");
    for shortcut in &config.shortcuts {
        out.push_str(&render_registration(shortcut, config.localization));
    }
    out.push_str("    }\n");
    out.push_str("}\n");
    out
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// `String` expression: a catalog lookup with literal fallback, or the literal.
pub fn localized_string(key: &str, default: &str, localized: bool) -> String {
    if localized {
        format!(
            "String(localized: {}, defaultValue: {})",
            swift_string_literal(key),
            swift_string_literal(default)
        )
    } else {
        swift_string_literal(default)
    }
}

/// `LocalizedStringResource` expression for titles and descriptions.
pub fn localized_resource(key: &str, default: &str, localized: bool) -> String {
    if localized {
        format!(
            "LocalizedStringResource({}, defaultValue: {})",
            swift_string_literal(key),
            swift_string_literal(default)
        )
    } else {
        swift_string_literal(default)
    }
}
