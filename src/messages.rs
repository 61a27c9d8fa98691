//! Localized status messages.
//!
//! A provider maps `"{kind}.{code}"` and `"{code}"` keys to formatter
//! functions for one locale. Formatters receive the raw constraint value
//! together with its locale-formatted form and, for numbers, its plural
//! category.
//!
//! Providers and the active locale live in a thread-local registry shared
//! by every engine. `en-US` and `fr-FR` are built in.

use crate::error::LocaleError;
use crate::status::Level;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::error;

pub const DEFAULT_LOCALE: &str = "en-US";

/// CLDR plural category of a numeric constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralCategory {
    One,
    Other,
}

/// Constraint value as seen by a formatter.
#[derive(Debug)]
pub struct FormattedConstraint<'a> {
    pub raw: &'a Value,
    pub formatted: String,
    /// Set for numeric constraints only.
    pub plural: Option<PluralCategory>,
}

impl FormattedConstraint<'_> {
    /// `"s"` unless the constraint is singular.
    pub fn s(&self) -> &'static str {
        match self.plural {
            None | Some(PluralCategory::One) => "",
            Some(PluralCategory::Other) => "s",
        }
    }
}

#[derive(Debug)]
pub struct MessageProps<'a> {
    pub kind: &'a str,
    pub code: &'a str,
    pub constraint: FormattedConstraint<'a>,
    pub level: Level,
}

pub type MessageFn = Rc<dyn Fn(&MessageProps<'_>) -> String>;

// ============================================================================
// Locale formatting
// ============================================================================

/// Number, date, list and plural conventions of a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleFormat {
    group_separator: &'static str,
    decimal_separator: &'static str,
    date_pattern: &'static str,
    disjunction: &'static str,
    serial_comma: bool,
    french_plural: bool,
}

impl LocaleFormat {
    pub const ENGLISH: LocaleFormat = LocaleFormat {
        group_separator: ",",
        decimal_separator: ".",
        date_pattern: "%-m/%-d/%Y",
        disjunction: "or",
        serial_comma: true,
        french_plural: false,
    };

    pub const FRENCH: LocaleFormat = LocaleFormat {
        group_separator: "\u{202F}",
        decimal_separator: ",",
        date_pattern: "%d/%m/%Y",
        disjunction: "ou",
        serial_comma: false,
        french_plural: true,
    };

    /// Conventions for a canonical tag, by language subtag. Unknown
    /// languages use English conventions.
    pub fn for_locale(locale: &str) -> Self {
        match locale.split('-').next() {
            Some("fr") => Self::FRENCH,
            _ => Self::ENGLISH,
        }
    }

    /// Grouped integer digits and at most three fraction digits.
    pub fn format_number(&self, n: f64) -> String {
        if n.is_nan() {
            return "NaN".to_owned();
        }
        if n.is_infinite() {
            return if n < 0.0 { "-∞" } else { "∞" }.to_owned();
        }

        let fixed = format!("{:.3}", n.abs());
        let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let fraction = fraction.trim_end_matches('0');

        let mut out = String::new();
        if n < 0.0 && (integer != "0" || !fraction.is_empty()) {
            out.push('-');
        }
        let digits = integer.len();
        for (i, digit) in integer.chars().enumerate() {
            if i > 0 && (digits - i) % 3 == 0 {
                out.push_str(self.group_separator);
            }
            out.push(digit);
        }
        if !fraction.is_empty() {
            out.push_str(self.decimal_separator);
            out.push_str(fraction);
        }
        out
    }

    pub fn format_date(&self, date: &chrono::NaiveDateTime) -> String {
        date.format(self.date_pattern).to_string()
    }

    /// "a", "a or b", "a, b, or c" (English) / "a, b ou c" (French).
    pub fn format_list(&self, items: &[String]) -> String {
        match items {
            [] => String::new(),
            [only] => only.clone(),
            [first, second] => format!("{first} {} {second}", self.disjunction),
            [init @ .., last] => {
                let comma = if self.serial_comma { "," } else { "" };
                format!("{}{comma} {} {last}", init.join(", "), self.disjunction)
            }
        }
    }

    pub fn plural(&self, n: f64) -> PluralCategory {
        let n = n.abs();
        let one = if self.french_plural { n < 2.0 } else { n == 1.0 };
        if one {
            PluralCategory::One
        } else {
            PluralCategory::Other
        }
    }

    pub fn format(&self, value: &Value) -> String {
        match value {
            Value::Number(n) => self.format_number(*n),
            Value::Date(date) => self.format_date(date),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(|item| self.format(item)).collect();
                self.format_list(&items)
            }
            other => display(other),
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Date(date) => date.to_string(),
        Value::File(file) => file.name.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Formatter table of one locale.
#[derive(Clone)]
pub struct MessageProvider {
    locale: String,
    format: LocaleFormat,
    messages: HashMap<String, MessageFn>,
}

impl MessageProvider {
    pub fn new(locale: impl Into<String>) -> Self {
        let locale = locale.into();
        Self {
            format: LocaleFormat::for_locale(&locale),
            locale,
            messages: HashMap::new(),
        }
    }

    pub fn with_format(mut self, format: LocaleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn message(
        mut self,
        key: impl Into<String>,
        message: impl Fn(&MessageProps<'_>) -> String + 'static,
    ) -> Self {
        self.set(key, message);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, message: impl Fn(&MessageProps<'_>) -> String + 'static) {
        self.messages.insert(key.into(), Rc::new(message));
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn locale_format(&self) -> &LocaleFormat {
        &self.format
    }

    /// Formatter for `kind.code`, falling back to `code`.
    pub fn lookup(&self, kind: &str, code: &str) -> Option<MessageFn> {
        self.messages
            .get(&format!("{kind}.{code}"))
            .or_else(|| self.messages.get(code))
            .cloned()
    }

    /// Message for a failure without override. Never fails: a missing
    /// formatter yields a placeholder naming the key.
    pub fn get_message(&self, kind: &str, code: &str, raw: &Value, level: Level) -> String {
        let Some(message) = self.lookup(kind, code) else {
            return format!("Unexpected error: {kind}.{code}");
        };
        let props = MessageProps {
            kind,
            code,
            constraint: FormattedConstraint {
                raw,
                formatted: self.format.format(raw),
                plural: raw.as_f64().map(|n| self.format.plural(n)),
            },
            level,
        };
        message(&props)
    }

    pub fn en_us() -> Self {
        MessageProvider::new("en-US")
            .message("string.min", |p| format!("Minimum {} character{}", p.constraint.formatted, p.constraint.s()))
            .message("string.max", |p| format!("Maximum {} character{}", p.constraint.formatted, p.constraint.s()))
            .message("string.match", |_| "Invalid format".to_owned())
            .message("email.min", |p| format!("Minimum {} character{}", p.constraint.formatted, p.constraint.s()))
            .message("email.max", |p| format!("Maximum {} character{}", p.constraint.formatted, p.constraint.s()))
            .message("email.match", |_| "Invalid email format".to_owned())
            .message("time.min", |p| format!("Must be after or equal to {}", p.constraint.formatted))
            .message("time.max", |p| format!("Must be before or equal to {}", p.constraint.formatted))
            .message("time.match", |_| "Invalid time format".to_owned())
            .message("number.min", |p| format!("Must be greater or equal to {}", p.constraint.formatted))
            .message("number.max", |p| format!("Must be less or equal to {}", p.constraint.formatted))
            .message("date.min", |p| format!("Date must be greater or equal to {}", p.constraint.formatted))
            .message("date.max", |p| format!("Date must be less or equal to {}", p.constraint.formatted))
            .message("file.min", |p| {
                format!("File must have a size of at least {} byte{}", p.constraint.formatted, p.constraint.s())
            })
            .message("file.max", |p| {
                format!("File must have a size of at most {} byte{}", p.constraint.formatted, p.constraint.s())
            })
            .message("array.min", |p| format!("At least {} element{}", p.constraint.formatted, p.constraint.s()))
            .message("array.max", |p| format!("At most {} element{}", p.constraint.formatted, p.constraint.s()))
            .message("type", |p| format!("Wrong value type (expected {})", display(p.constraint.raw)))
            .message("test", |p| test_message(p.level, "Pending...", "Invalid value"))
            .message("oneOf", |p| format!("Must be one of: {}", p.constraint.formatted))
            .message("exists", |_| "Required field".to_owned())
            .message("defined", |_| "Required field".to_owned())
            .message("notnull", |_| "Required field".to_owned())
            .message("required", |_| "Required field".to_owned())
    }

    pub fn fr_fr() -> Self {
        MessageProvider::new("fr-FR")
            .message("string.min", |p| format!("Minimum {} caractère{}", p.constraint.formatted, p.constraint.s()))
            .message("string.max", |p| format!("Maximum {} caractère{}", p.constraint.formatted, p.constraint.s()))
            .message("string.match", |_| "Format incorrect".to_owned())
            .message("email.min", |p| format!("Minimum {} caractère{}", p.constraint.formatted, p.constraint.s()))
            .message("email.max", |p| format!("Maximum {} caractère{}", p.constraint.formatted, p.constraint.s()))
            .message("email.match", |_| "Format d'email incorrect".to_owned())
            .message("time.min", |p| format!("Doit être postérieur ou égal à {}", p.constraint.formatted))
            .message("time.max", |p| format!("Doit être antérieur ou égal à {}", p.constraint.formatted))
            .message("time.match", |_| "Format horaire incorrect".to_owned())
            .message("number.min", |p| format!("Doit être supérieur ou égal à {}", p.constraint.formatted))
            .message("number.max", |p| format!("Doit être inférieur ou égal à {}", p.constraint.formatted))
            .message("date.min", |p| format!("La date doit être égale ou postérieure au {}", p.constraint.formatted))
            .message("date.max", |p| format!("La date doit être égale ou antérieure au {}", p.constraint.formatted))
            .message("file.min", |p| {
                format!("Le fichier doit avoir une taille d'au moins {} octet{}", p.constraint.formatted, p.constraint.s())
            })
            .message("file.max", |p| {
                format!("Le fichier doit avoir une taille d'au plus {} octet{}", p.constraint.formatted, p.constraint.s())
            })
            .message("array.min", |p| format!("Au moins {} élément{}", p.constraint.formatted, p.constraint.s()))
            .message("array.max", |p| format!("Au plus {} élément{}", p.constraint.formatted, p.constraint.s()))
            .message("type", |p| format!("Valeur du mauvais type ({} attendu)", display(p.constraint.raw)))
            .message("test", |p| test_message(p.level, "En cours...", "Valeur incorrecte"))
            .message("oneOf", |p| format!("Doit être parmi : {}", p.constraint.formatted))
            .message("exists", |_| "Champ obligatoire".to_owned())
            .message("defined", |_| "Champ obligatoire".to_owned())
            .message("notnull", |_| "Champ obligatoire".to_owned())
            .message("required", |_| "Champ obligatoire".to_owned())
    }
}

fn test_message(level: Level, pending: &str, error: &str) -> String {
    match level {
        Level::Pending => pending.to_owned(),
        Level::Error => error.to_owned(),
        _ => String::new(),
    }
}

impl fmt::Debug for MessageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.messages.keys().collect();
        keys.sort();
        f.debug_struct("MessageProvider")
            .field("locale", &self.locale)
            .field("messages", &keys)
            .finish()
    }
}

// ============================================================================
// Locale tags
// ============================================================================

/// Canonical form of a BCP 47 language tag: `fr-fr` and `fr_FR` become
/// `fr-FR`, `zh-hant-tw` becomes `zh-Hant-TW`.
pub fn canonicalize_locale(tag: &str) -> Result<String, LocaleError> {
    let invalid = || LocaleError::InvalidTag(tag.to_owned());
    let mut subtags = tag.split(['-', '_']);

    let language = subtags.next().filter(|s| {
        matches!(s.len(), 2..=3 | 5..=8) && s.chars().all(|c| c.is_ascii_alphabetic())
    });
    let mut out = language.ok_or_else(invalid)?.to_ascii_lowercase();

    for (i, subtag) in subtags.enumerate() {
        if subtag.is_empty() || subtag.len() > 8 || !subtag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }
        out.push('-');
        let alphabetic = subtag.chars().all(|c| c.is_ascii_alphabetic());
        match subtag.len() {
            4 if i == 0 && alphabetic => {
                out.push_str(&subtag[..1].to_ascii_uppercase());
                out.push_str(&subtag[1..].to_ascii_lowercase());
            }
            2 if alphabetic => out.push_str(&subtag.to_ascii_uppercase()),
            3 if subtag.chars().all(|c| c.is_ascii_digit()) => out.push_str(subtag),
            _ => out.push_str(&subtag.to_ascii_lowercase()),
        }
    }
    Ok(out)
}

// ============================================================================
// Global registry
// ============================================================================

// WASM is single-threaded, so thread_local acts as a singleton
thread_local! {
    static MESSAGES: RefCell<MessageRegistry> = RefCell::new(MessageRegistry::new());
}

struct MessageRegistry {
    providers: HashMap<String, Rc<MessageProvider>>,
    locale: String,
}

impl MessageRegistry {
    fn new() -> Self {
        let mut providers = HashMap::new();
        for provider in [MessageProvider::en_us(), MessageProvider::fr_fr()] {
            providers.insert(provider.locale.clone(), Rc::new(provider));
        }
        Self {
            providers,
            locale: DEFAULT_LOCALE.to_owned(),
        }
    }

    fn current(&self) -> Option<Rc<MessageProvider>> {
        self.providers.get(&self.locale).cloned()
    }
}

/// Register (or replace) the provider for its locale.
///
/// # Example
/// ```
/// use formguard::messages::{register_provider, set_locale, MessageProvider};
///
/// register_provider(
///     MessageProvider::new("de-de").message("required", |_| "Pflichtfeld".to_owned()),
/// )
/// .unwrap();
/// set_locale("de-DE").unwrap();
/// # set_locale("en-US").unwrap();
/// ```
pub fn register_provider(mut provider: MessageProvider) -> Result<(), LocaleError> {
    let locale = canonicalize_locale(&provider.locale).inspect_err(|err| {
        error!(locale = provider.locale.as_str(), %err, "message provider ignored");
    })?;
    provider.locale = locale.clone();
    MESSAGES.with(|registry| {
        registry.borrow_mut().providers.insert(locale, Rc::new(provider));
    });
    Ok(())
}

/// Add or replace one formatter of a registered provider.
pub fn set_message(
    locale: &str,
    key: impl Into<String>,
    message: impl Fn(&MessageProps<'_>) -> String + 'static,
) -> Result<(), LocaleError> {
    let locale = canonicalize_locale(locale)?;
    MESSAGES.with(|registry| {
        let mut registry = registry.borrow_mut();
        let provider = registry
            .providers
            .get_mut(&locale)
            .ok_or_else(|| LocaleError::NoProvider(locale.clone()))?;
        Rc::make_mut(provider).set(key, message);
        Ok(())
    })
}

/// Switch the active locale. Unknown or malformed tags leave the current
/// locale in place.
pub fn set_locale(locale: &str) -> Result<(), LocaleError> {
    let result = canonicalize_locale(locale).and_then(|canonical| {
        MESSAGES.with(|registry| {
            let mut registry = registry.borrow_mut();
            if !registry.providers.contains_key(&canonical) {
                return Err(LocaleError::NoProvider(canonical));
            }
            registry.locale = canonical;
            Ok(())
        })
    });
    if let Err(err) = &result {
        error!(locale, %err, "locale unchanged");
    }
    result
}

pub fn get_locale() -> String {
    MESSAGES.with(|registry| registry.borrow().locale.clone())
}

/// Locales with a registered provider, sorted.
pub fn available_locales() -> Vec<String> {
    MESSAGES.with(|registry| {
        let mut locales: Vec<String> = registry.borrow().providers.keys().cloned().collect();
        locales.sort();
        locales
    })
}

/// Final message of a status: the override when given, otherwise the
/// active provider's formatter.
pub fn resolve_message(
    kind: &str,
    code: &str,
    raw: &Value,
    message: Option<String>,
    level: Level,
) -> String {
    if let Some(message) = message {
        return message;
    }
    // Release the registry before running the formatter: it may call back
    // into this module.
    let provider = MESSAGES.with(|registry| registry.borrow().current());
    match provider {
        Some(provider) => provider.get_message(kind, code, raw, level),
        None => format!("Unexpected error: {kind}.{code}"),
    }
}
