//! Integration tests for localized messages
//!
//! Every test runs on its own thread, so locale switches do not leak
//! between tests.

use formguard::messages::{
    available_locales, get_locale, register_provider, resolve_message, set_locale, set_message,
    MessageProvider,
};
use formguard::value::FileInfo;
use formguard::{
    array, file, number, string, ClassSchema, Declaration, Engine, Level, LocaleError, StatusMap,
    ValidationSettings, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn validate(schema: &dyn Declaration, value: serde_json::Value) -> StatusMap {
    Engine::new().validate_all(schema, &Value::from(value), &ValidationSettings::new())
}

fn message_at(statuses: &StatusMap, path: &str) -> String {
    statuses[path].message.clone()
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn test_kind_specific_formatter_wins_over_generic() {
    assert_eq!(
        resolve_message("string", "min", &Value::from(2usize), None, Level::Error),
        "Minimum 2 characters"
    );
    assert_eq!(
        resolve_message("string", "required", &Value::Bool(true), None, Level::Error),
        "Required field"
    );

    set_message("en-US", "string.required", |_| "Text needed".to_string()).unwrap();
    assert_eq!(
        resolve_message("string", "required", &Value::Bool(true), None, Level::Error),
        "Text needed"
    );
    assert_eq!(
        resolve_message("number", "required", &Value::Bool(true), None, Level::Error),
        "Required field"
    );
}

#[test]
fn test_missing_formatter_yields_placeholder() {
    assert_eq!(
        resolve_message("number", "match", &Value::Undefined, None, Level::Error),
        "Unexpected error: number.match"
    );
}

#[test]
fn test_override_message_is_used_verbatim() {
    let message = resolve_message(
        "string",
        "min",
        &Value::from(2usize),
        Some("Too short".to_string()),
        Level::Warning,
    );
    assert_eq!(message, "Too short");
}

#[test]
fn test_pluralization() {
    let statuses = validate(&string().min(1), json!(""));
    assert_eq!(message_at(&statuses, ""), "Minimum 1 character");

    let statuses = validate(&array(string()).max(2), json!(["a", "b", "c"]));
    assert_eq!(message_at(&statuses, ""), "At most 2 elements");
}

// ============================================================================
// Locale switching
// ============================================================================

#[test]
fn test_switching_locale_changes_only_messages() {
    let schema = string().min(1);

    let english = validate(&schema, json!(""));
    set_locale("fr-FR").unwrap();
    let french = validate(&schema, json!(""));

    assert_eq!(message_at(&english, ""), "Minimum 1 character");
    assert_eq!(message_at(&french, ""), "Minimum 1 caractère");
    assert_eq!(english[""].code, french[""].code);
    assert_eq!(english[""].level, french[""].level);
    assert_eq!(english[""].path, french[""].path);
    assert_eq!(english[""].constraint, french[""].constraint);
}

#[test]
fn test_one_of_lists_are_localized() {
    let schema = string().one_of(vec!["a", "b", "c"]);

    let statuses = validate(&schema, json!("z"));
    assert_eq!(message_at(&statuses, ""), "Must be one of: a, b, or c");

    set_locale("fr-FR").unwrap();
    let statuses = validate(&schema, json!("z"));
    assert_eq!(message_at(&statuses, ""), "Doit être parmi : a, b ou c");
}

#[test]
fn test_numbers_are_formatted_for_the_locale() {
    let schema = number().min(1234.5);
    let statuses = validate(&schema, json!(0));
    assert_eq!(message_at(&statuses, ""), "Must be greater or equal to 1,234.5");

    set_locale("fr-FR").unwrap();
    let statuses = validate(&schema, json!(0));
    assert_eq!(
        message_at(&statuses, ""),
        "Doit être supérieur ou égal à 1\u{202F}234,5"
    );

    let upload = Value::File(FileInfo::new("a.bin", 2_000_000));
    let statuses = Engine::new().validate_all(
        &file().max(1_000_000u64),
        &upload,
        &ValidationSettings::new(),
    );
    assert_eq!(
        message_at(&statuses, ""),
        "Le fichier doit avoir une taille d'au plus 1\u{202F}000\u{202F}000 octets"
    );
}

#[test]
fn test_class_messages_follow_locale() {
    let schema = ClassSchema::builder("Contact")
        .field("name", string().required(true))
        .build();
    set_locale("fr_fr").unwrap();
    assert_eq!(get_locale(), "fr-FR");
    let statuses = validate(&schema, json!({}));
    assert_eq!(message_at(&statuses, "name"), "Champ obligatoire");
}

#[test]
fn test_invalid_locale_keeps_previous() {
    set_locale("fr-FR").unwrap();

    assert_eq!(
        set_locale("de-DE"),
        Err(LocaleError::NoProvider("de-DE".to_string()))
    );
    assert_eq!(
        set_locale("not a locale"),
        Err(LocaleError::InvalidTag("not a locale".to_string()))
    );
    assert_eq!(get_locale(), "fr-FR");
}

#[test]
fn test_register_provider_for_new_locale() {
    assert_eq!(available_locales(), vec!["en-US", "fr-FR"]);

    register_provider(
        MessageProvider::new("de-de")
            .message("required", |_| "Pflichtfeld".to_string())
            .message("string.min", |p| {
                format!("Mindestens {} Zeichen", p.constraint.formatted)
            }),
    )
    .unwrap();
    assert_eq!(available_locales(), vec!["de-DE", "en-US", "fr-FR"]);

    set_locale("de-DE").unwrap();
    let statuses = validate(&string().required(true).min(3), json!("ab"));
    assert_eq!(message_at(&statuses, ""), "Mindestens 3 Zeichen");
    let statuses = validate(&string().required(true), json!(null));
    assert_eq!(message_at(&statuses, ""), "Pflichtfeld");

    assert_eq!(
        register_provider(MessageProvider::new("??")),
        Err(LocaleError::InvalidTag("??".to_string()))
    );
}

#[test]
fn test_set_message_requires_registered_locale() {
    assert_eq!(
        set_message("it-IT", "required", |_| String::new()),
        Err(LocaleError::NoProvider("it-IT".to_string()))
    );
}
