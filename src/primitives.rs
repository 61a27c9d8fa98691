//! Leaf kinds: string, email, time, number, boolean, date, file, ignored.
//!
//! Every validator checks the runtime type first and stops there on a
//! mismatch; after that, bounds come before patterns and option lists, and
//! the custom test always runs last.

use crate::constraint::{check_with_default, CommonConstraints, Constraint, Message, Test};
use crate::context::ValidationContext;
use crate::declaration::{bound_setters, one_of_setter, resolve_bound, test_setters, Field, KindConstraints};
use crate::status::Level;
use crate::value::Value;
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

/// `HH:MM`, `HH:MM:SS` or `HH:MM:SS.mmm`, 24-hour clock.
pub const TIME_PATTERN: &str =
    r"^([01][0-9]|2[0-3]):([0-5][0-9])(?::([0-5][0-9])(?:\.([0-9]{1,3}))?)?$";

/// Addresses accepted by `<input type="email">`.
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

static TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TIME_PATTERN).expect("time pattern is valid"));

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"));

const LAST_MILLIS_OF_DAY: u32 = 24 * 3600 * 1000 - 1;

/// Milliseconds since midnight, `None` if `time` is not a valid time string.
pub fn time_to_millis(time: &str) -> Option<u32> {
    let caps = TIME_REGEX.captures(time)?;
    let part = |index: usize| -> u32 {
        caps.get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    // "5" means 500ms, like a decimal fraction.
    let millis = caps.get(4).map_or(0, |m| {
        let digits = m.as_str();
        let scale = 10u32.pow(3 - digits.len() as u32);
        digits.parse::<u32>().unwrap_or(0) * scale
    });
    Some(part(1) * 3_600_000 + part(2) * 60_000 + part(3) * 1000 + millis)
}

// ---------------------------------------------------------------------------
// string / email
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StringConstraints {
    pub common: CommonConstraints,
    /// Minimum length in characters.
    pub min: Option<Constraint<usize>>,
    pub max: Option<Constraint<usize>>,
    pub matches: Option<Constraint<Regex>>,
    pub one_of: Option<Constraint<Vec<String>>>,
    pub test: Option<Test>,
}

pub fn string() -> Field<StringConstraints> {
    Field::new("string", StringConstraints::default())
}

fn validate_text(
    ctx: &ValidationContext<'_>,
    field: &Field<impl TextConstraints>,
    expected: &str,
    default_pattern: Option<&Regex>,
) -> bool {
    let Some(text) = ctx.value().as_str() else {
        return ctx.check_type(false, expected);
    };
    let len = text.chars().count();
    field.check(ctx, "min", |c| c.min_len(), |&min| len >= min)
        && field.check(ctx, "max", |c| c.max_len(), |&max| len <= max)
        && field.each_group(ctx, |c| {
            check_with_default(ctx, "match", c.pattern(), default_pattern, c.format_error(), |re| {
                re.is_match(text)
            })
        })
        && field.check(ctx, "oneOf", |c| c.one_of(), |options: &Vec<String>| {
            options.iter().any(|option| option == text)
        })
        && field.check_test(ctx, |c| c.test())
}

/// Shared shape of the string-like constraint sets.
trait TextConstraints: KindConstraints {
    fn min_len(&self) -> Option<&Constraint<usize>>;
    fn max_len(&self) -> Option<&Constraint<usize>>;
    fn pattern(&self) -> Option<&Constraint<Regex>>;
    fn one_of(&self) -> Option<&Constraint<Vec<String>>>;
    fn test(&self) -> Option<&Test>;

    fn format_error(&self) -> Option<&Message> {
        None
    }
}

impl TextConstraints for StringConstraints {
    fn min_len(&self) -> Option<&Constraint<usize>> {
        self.min.as_ref()
    }

    fn max_len(&self) -> Option<&Constraint<usize>> {
        self.max.as_ref()
    }

    fn pattern(&self) -> Option<&Constraint<Regex>> {
        self.matches.as_ref()
    }

    fn one_of(&self) -> Option<&Constraint<Vec<String>>> {
        self.one_of.as_ref()
    }

    fn test(&self) -> Option<&Test> {
        self.test.as_ref()
    }
}

impl KindConstraints for StringConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        validate_text(ctx, field, "string", None)
    }

    fn bounds(&self, ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (
            resolve_bound(ctx, self.min.as_ref()),
            resolve_bound(ctx, self.max.as_ref()),
        )
    }
}

/// A string matching an email pattern unless `matches` overrides it.
#[derive(Debug, Clone, Default)]
pub struct EmailConstraints {
    pub common: CommonConstraints,
    pub min: Option<Constraint<usize>>,
    pub max: Option<Constraint<usize>>,
    pub matches: Option<Constraint<Regex>>,
    pub one_of: Option<Constraint<Vec<String>>>,
    /// Message for addresses rejected by the pattern.
    pub format_error: Option<Message>,
    pub test: Option<Test>,
}

pub fn email() -> Field<EmailConstraints> {
    Field::new("email", EmailConstraints::default())
}

impl TextConstraints for EmailConstraints {
    fn min_len(&self) -> Option<&Constraint<usize>> {
        self.min.as_ref()
    }

    fn max_len(&self) -> Option<&Constraint<usize>> {
        self.max.as_ref()
    }

    fn pattern(&self) -> Option<&Constraint<Regex>> {
        self.matches.as_ref()
    }

    fn one_of(&self) -> Option<&Constraint<Vec<String>>> {
        self.one_of.as_ref()
    }

    fn test(&self) -> Option<&Test> {
        self.test.as_ref()
    }

    fn format_error(&self) -> Option<&Message> {
        self.format_error.as_ref()
    }
}

impl KindConstraints for EmailConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        validate_text(ctx, field, "email", Some(&*EMAIL_REGEX))
    }

    fn bounds(&self, ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (
            resolve_bound(ctx, self.min.as_ref()),
            resolve_bound(ctx, self.max.as_ref()),
        )
    }
}

impl Field<StringConstraints> {
    /// The whole string must match `pattern` (anchor it as needed).
    pub fn matches(self, pattern: impl Into<Constraint<Regex>>) -> Self {
        self.configure(|c| c.matches = Some(pattern.into()))
    }
}

impl Field<EmailConstraints> {
    pub fn matches(self, pattern: impl Into<Constraint<Regex>>) -> Self {
        self.configure(|c| c.matches = Some(pattern.into()))
    }

    pub fn format_error(self, message: impl Into<Message>) -> Self {
        self.configure(|c| c.format_error = Some(message.into()))
    }
}

// ---------------------------------------------------------------------------
// time
// ---------------------------------------------------------------------------

/// Time-of-day strings. Bounds are time strings too.
#[derive(Debug, Clone, Default)]
pub struct TimeConstraints {
    pub common: CommonConstraints,
    pub min: Option<Constraint<String>>,
    pub max: Option<Constraint<String>>,
    pub one_of: Option<Constraint<Vec<String>>>,
    pub format_error: Option<Message>,
    pub test: Option<Test>,
}

pub fn time() -> Field<TimeConstraints> {
    Field::new("time", TimeConstraints::default())
}

impl Field<TimeConstraints> {
    pub fn format_error(self, message: impl Into<Message>) -> Self {
        self.configure(|c| c.format_error = Some(message.into()))
    }
}

impl KindConstraints for TimeConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        let Some(text) = ctx.value().as_str() else {
            return ctx.check_type(false, "time");
        };
        let Some(millis) = time_to_millis(text) else {
            let message = field
                .constraints()
                .format_error
                .as_ref()
                .map(|message| message.resolve(ctx));
            return ctx.set_status("match", Value::from(TIME_PATTERN), message, Level::Error);
        };
        field.check(ctx, "min", |c| c.min.as_ref(), |min: &String| {
            millis >= time_to_millis(min).unwrap_or(0)
        }) && field.check(ctx, "max", |c| c.max.as_ref(), |max: &String| {
            millis <= time_to_millis(max).unwrap_or(LAST_MILLIS_OF_DAY)
        }) && field.check(ctx, "oneOf", |c| c.one_of.as_ref(), |options: &Vec<String>| {
            options.iter().any(|option| option == text)
        }) && field.check_test(ctx, |c| c.test.as_ref())
    }

    fn bounds(&self, ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (
            resolve_bound(ctx, self.min.as_ref()),
            resolve_bound(ctx, self.max.as_ref()),
        )
    }
}

// ---------------------------------------------------------------------------
// number
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct NumberConstraints {
    pub common: CommonConstraints,
    pub min: Option<Constraint<f64>>,
    pub max: Option<Constraint<f64>>,
    pub one_of: Option<Constraint<Vec<f64>>>,
    pub test: Option<Test>,
}

pub fn number() -> Field<NumberConstraints> {
    Field::new("number", NumberConstraints::default())
}

impl KindConstraints for NumberConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        // NaN is a type failure, not a bound failure.
        let Some(n) = ctx.value().as_f64().filter(|n| !n.is_nan()) else {
            return ctx.check_type(false, "number");
        };
        field.check(ctx, "min", |c| c.min.as_ref(), |&min| n >= min)
            && field.check(ctx, "max", |c| c.max.as_ref(), |&max| n <= max)
            && field.check(ctx, "oneOf", |c| c.one_of.as_ref(), |options: &Vec<f64>| {
                options.contains(&n)
            })
            && field.check_test(ctx, |c| c.test.as_ref())
    }

    fn bounds(&self, ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (
            resolve_bound(ctx, self.min.as_ref()),
            resolve_bound(ctx, self.max.as_ref()),
        )
    }
}

// ---------------------------------------------------------------------------
// boolean
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BooleanConstraints {
    pub common: CommonConstraints,
    pub one_of: Option<Constraint<Vec<bool>>>,
    pub test: Option<Test>,
}

pub fn boolean() -> Field<BooleanConstraints> {
    Field::new("boolean", BooleanConstraints::default())
}

impl KindConstraints for BooleanConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        let Some(b) = ctx.value().as_bool() else {
            return ctx.check_type(false, "boolean");
        };
        field.check(ctx, "oneOf", |c| c.one_of.as_ref(), |options: &Vec<bool>| {
            options.contains(&b)
        }) && field.check_test(ctx, |c| c.test.as_ref())
    }
}

// ---------------------------------------------------------------------------
// date
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DateConstraints {
    pub common: CommonConstraints,
    pub min: Option<Constraint<NaiveDateTime>>,
    pub max: Option<Constraint<NaiveDateTime>>,
    pub one_of: Option<Constraint<Vec<NaiveDateTime>>>,
    pub test: Option<Test>,
}

pub fn date() -> Field<DateConstraints> {
    Field::new("date", DateConstraints::default())
}

impl KindConstraints for DateConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        let Value::Date(date) = ctx.value() else {
            return ctx.check_type(false, "date");
        };
        field.check(ctx, "min", |c| c.min.as_ref(), |min| date >= min)
            && field.check(ctx, "max", |c| c.max.as_ref(), |max| date <= max)
            && field.check(ctx, "oneOf", |c| c.one_of.as_ref(), |options: &Vec<NaiveDateTime>| {
                options.contains(date)
            })
            && field.check_test(ctx, |c| c.test.as_ref())
    }

    fn bounds(&self, ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (
            resolve_bound(ctx, self.min.as_ref()),
            resolve_bound(ctx, self.max.as_ref()),
        )
    }
}

// ---------------------------------------------------------------------------
// file
// ---------------------------------------------------------------------------

/// Selected files. Bounds apply to the size in bytes.
#[derive(Debug, Clone, Default)]
pub struct FileConstraints {
    pub common: CommonConstraints,
    pub min: Option<Constraint<u64>>,
    pub max: Option<Constraint<u64>>,
    pub test: Option<Test>,
}

pub fn file() -> Field<FileConstraints> {
    Field::new("file", FileConstraints::default())
}

impl KindConstraints for FileConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        let Value::File(file) = ctx.value() else {
            return ctx.check_type(false, "file");
        };
        field.check(ctx, "min", |c| c.min.as_ref(), |&min| file.size >= min)
            && field.check(ctx, "max", |c| c.max.as_ref(), |&max| file.size <= max)
            && field.check_test(ctx, |c| c.test.as_ref())
    }

    fn bounds(&self, ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (
            resolve_bound(ctx, self.min.as_ref()),
            resolve_bound(ctx, self.max.as_ref()),
        )
    }
}

// ---------------------------------------------------------------------------
// ignored
// ---------------------------------------------------------------------------

/// A field that never produces statuses.
#[derive(Debug, Clone, Default)]
pub struct IgnoredConstraints {
    pub common: CommonConstraints,
}

pub fn ignored() -> Field<IgnoredConstraints> {
    Field::new("ignored", IgnoredConstraints::default()).ignored(true)
}

impl KindConstraints for IgnoredConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(_ctx: &ValidationContext<'_>, _field: &Field<Self>) -> bool {
        true
    }
}

test_setters!(
    StringConstraints,
    EmailConstraints,
    TimeConstraints,
    NumberConstraints,
    BooleanConstraints,
    DateConstraints,
    FileConstraints,
);

bound_setters!(
    StringConstraints => usize,
    EmailConstraints => usize,
    TimeConstraints => String,
    NumberConstraints => f64,
    DateConstraints => NaiveDateTime,
    FileConstraints => u64,
);

one_of_setter!(
    StringConstraints => Vec<String>,
    EmailConstraints => Vec<String>,
    TimeConstraints => Vec<String>,
    NumberConstraints => Vec<f64>,
    BooleanConstraints => Vec<bool>,
    DateConstraints => Vec<NaiveDateTime>,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_time_strings_to_millis() {
        assert_eq!(time_to_millis("00:00"), Some(0));
        assert_eq!(time_to_millis("01:02"), Some(3_720_000));
        assert_eq!(time_to_millis("01:02:03"), Some(3_723_000));
        assert_eq!(time_to_millis("01:02:03.5"), Some(3_723_500));
        assert_eq!(time_to_millis("23:59:59.999"), Some(LAST_MILLIS_OF_DAY));
        assert_eq!(time_to_millis("24:00"), None);
        assert_eq!(time_to_millis("1:00"), None);
        assert_eq!(time_to_millis("12:60"), None);
    }

    #[test]
    fn test_email_pattern_accepts_common_addresses() {
        assert!(EMAIL_REGEX.is_match("jane.doe+news@example.co.uk"));
        assert!(!EMAIL_REGEX.is_match("jane@"));
        assert!(!EMAIL_REGEX.is_match("@example.com"));
        assert!(!EMAIL_REGEX.is_match("jane doe@example.com"));
    }

    #[test]
    fn test_kinds_report_their_tag() {
        use crate::declaration::Declaration;
        assert_eq!(string().kind(), "string");
        assert_eq!(email().kind(), "email");
        assert_eq!(time().kind(), "time");
        assert_eq!(number().kind(), "number");
        assert_eq!(boolean().kind(), "boolean");
        assert_eq!(date().kind(), "date");
        assert_eq!(file().kind(), "file");
        assert_eq!(ignored().kind(), "ignored");
    }
}
