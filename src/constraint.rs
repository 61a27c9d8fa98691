//! Constraint values and the checks kind validators are built from.
//!
//! Every constraint can be given three ways: a plain value (`min(2)`), a
//! value with an override message and level
//! (`Constraint::of(2).message("Too short").level(Level::Warning)`), or a
//! function of the validation context computing either of those.

use crate::async_test::{self, AsyncTest};
use crate::context::ValidationContext;
use crate::status::Level;
use crate::value::Value;
use chrono::NaiveDateTime;
use regex::Regex;
use std::fmt;
use std::rc::Rc;

/// Types usable as constraint values.
pub trait ConstraintType: Clone + 'static {
    /// Raw form reported in statuses and handed to message formatters.
    fn to_value(&self) -> Value;
}

impl ConstraintType for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ConstraintType for usize {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl ConstraintType for u64 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl ConstraintType for f64 {
    fn to_value(&self) -> Value {
        Value::Number(*self)
    }
}

impl ConstraintType for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl ConstraintType for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Date(*self)
    }
}

impl ConstraintType for Regex {
    fn to_value(&self) -> Value {
        Value::String(self.as_str().to_owned())
    }
}

impl<T: ConstraintType> ConstraintType for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ConstraintType::to_value).collect())
    }
}

/// A resolved constraint: the value (absent means "no constraint"), an
/// optional override message and the level reported on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintValue<T> {
    pub value: Option<T>,
    pub message: Option<String>,
    pub level: Level,
}

impl<T> ConstraintValue<T> {
    pub fn of(value: T) -> Self {
        Self {
            value: Some(value),
            message: None,
            level: Level::Error,
        }
    }

    /// No constraint applies.
    pub fn none() -> Self {
        Self {
            value: None,
            message: None,
            level: Level::Error,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl<T> Default for ConstraintValue<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> From<T> for ConstraintValue<T> {
    fn from(value: T) -> Self {
        Self::of(value)
    }
}

type ComputedConstraint<T> = Rc<dyn Fn(&ValidationContext<'_>) -> ConstraintValue<T>>;

/// A constraint as declared on a field.
#[derive(Clone)]
pub enum Constraint<T> {
    Fixed(ConstraintValue<T>),
    Computed(ComputedConstraint<T>),
}

impl<T: ConstraintType> Constraint<T> {
    pub fn of(value: T) -> Self {
        Constraint::Fixed(ConstraintValue::of(value))
    }

    /// Constraint computed from the context at validation time.
    ///
    /// ```
    /// use formguard::constraint::{Constraint, ConstraintValue};
    ///
    /// // Required only when the sibling `contact` flag is set.
    /// let required: Constraint<bool> = Constraint::computed(|ctx| {
    ///     let flag = ctx.parent().and_then(|p| p.get("contact")).and_then(|v| v.as_bool());
    ///     ConstraintValue::of(flag == Some(true)).message("Needed to contact you")
    /// });
    /// # let _ = required;
    /// ```
    pub fn computed<F, R>(compute: F) -> Self
    where
        F: Fn(&ValidationContext<'_>) -> R + 'static,
        R: Into<ConstraintValue<T>>,
    {
        Constraint::Computed(Rc::new(move |ctx| compute(ctx).into()))
    }

    /// Override message. A computed constraint keeps any message it returns.
    pub fn message(self, message: impl Into<String>) -> Self {
        let message = message.into();
        match self {
            Constraint::Fixed(value) => Constraint::Fixed(value.message(message)),
            Constraint::Computed(compute) => Constraint::Computed(Rc::new(move |ctx| {
                let mut value = compute(ctx);
                if value.message.is_none() {
                    value.message = Some(message.clone());
                }
                value
            })),
        }
    }

    pub fn level(self, level: Level) -> Self {
        match self {
            Constraint::Fixed(value) => Constraint::Fixed(value.level(level)),
            Constraint::Computed(compute) => {
                Constraint::Computed(Rc::new(move |ctx| compute(ctx).level(level)))
            }
        }
    }

    pub fn resolve(&self, ctx: &ValidationContext<'_>) -> ConstraintValue<T> {
        match self {
            Constraint::Fixed(value) => value.clone(),
            Constraint::Computed(compute) => compute(ctx),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Constraint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Constraint::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T: ConstraintType> From<T> for Constraint<T> {
    fn from(value: T) -> Self {
        Constraint::of(value)
    }
}

impl From<&str> for Constraint<String> {
    fn from(value: &str) -> Self {
        Constraint::of(value.to_owned())
    }
}

impl From<Vec<&str>> for Constraint<Vec<String>> {
    fn from(values: Vec<&str>) -> Self {
        Constraint::of(values.into_iter().map(str::to_owned).collect())
    }
}

/// A message given directly or computed from the context.
#[derive(Clone)]
pub enum Message {
    Text(String),
    Computed(Rc<dyn Fn(&ValidationContext<'_>) -> String>),
}

impl Message {
    pub fn computed(compute: impl Fn(&ValidationContext<'_>) -> String + 'static) -> Self {
        Message::Computed(Rc::new(compute))
    }

    pub fn resolve(&self, ctx: &ValidationContext<'_>) -> String {
        match self {
            Message::Text(text) => text.clone(),
            Message::Computed(compute) => compute(ctx),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_owned())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Message::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Constraints shared by every kind.
#[derive(Debug, Clone, Default)]
pub struct CommonConstraints {
    /// Skip validation of the field entirely.
    pub ignored: Option<Constraint<bool>>,
    /// The key must be present in the parent object.
    pub exists: Option<Constraint<bool>>,
    /// The value must not be `undefined`.
    pub defined: Option<Constraint<bool>>,
    /// The value must not be `null`.
    pub notnull: Option<Constraint<bool>>,
    /// The value must be neither `null` nor `undefined`.
    pub required: Option<Constraint<bool>>,
}

/// Outcome of a custom test.
#[derive(Debug, Clone, PartialEq)]
pub enum TestResult {
    Valid,
    Invalid {
        message: Option<String>,
        level: Level,
    },
}

impl TestResult {
    /// Invalid with the generic message.
    pub fn invalid() -> Self {
        TestResult::Invalid {
            message: None,
            level: Level::Error,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        TestResult::Invalid {
            message: Some(message.into()),
            level: Level::Error,
        }
    }

    pub fn with_level(self, level: Level) -> Self {
        match self {
            TestResult::Valid => TestResult::Valid,
            TestResult::Invalid { message, .. } => TestResult::Invalid { message, level },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TestResult::Valid)
    }
}

impl From<bool> for TestResult {
    fn from(valid: bool) -> Self {
        if valid {
            TestResult::Valid
        } else {
            TestResult::invalid()
        }
    }
}

impl From<&str> for TestResult {
    fn from(message: &str) -> Self {
        TestResult::message(message)
    }
}

impl From<String> for TestResult {
    fn from(message: String) -> Self {
        TestResult::message(message)
    }
}

impl From<(&str, Level)> for TestResult {
    fn from((message, level): (&str, Level)) -> Self {
        TestResult::message(message).with_level(level)
    }
}

impl From<(String, Level)> for TestResult {
    fn from((message, level): (String, Level)) -> Self {
        TestResult::message(message).with_level(level)
    }
}

/// `None` means the test passed.
impl<T: Into<TestResult>> From<Option<T>> for TestResult {
    fn from(result: Option<T>) -> Self {
        result.map_or(TestResult::Valid, Into::into)
    }
}

/// A custom test: synchronous, or backed by a future.
#[derive(Clone)]
pub enum Test {
    Sync(Rc<dyn Fn(&ValidationContext<'_>) -> TestResult>),
    Async(Rc<AsyncTest>),
}

impl Test {
    pub fn sync<F, R>(test: F) -> Self
    where
        F: Fn(&ValidationContext<'_>) -> R + 'static,
        R: Into<TestResult>,
    {
        Test::Sync(Rc::new(move |ctx| test(ctx).into()))
    }
}

impl From<AsyncTest> for Test {
    fn from(test: AsyncTest) -> Self {
        Test::Async(Rc::new(test))
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Test::Sync(_) => f.write_str("Sync(..)"),
            Test::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// Resolve `constraint` and record a status named `code` when `valid`
/// rejects it. A missing or valueless constraint passes.
pub fn check<T: ConstraintType>(
    ctx: &ValidationContext<'_>,
    code: &str,
    constraint: Option<&Constraint<T>>,
    valid: impl Fn(&T) -> bool,
) -> bool {
    check_with_default(ctx, code, constraint, None, None, valid)
}

/// Like [`check`], with a fallback value used when the field declares none
/// and a fallback message used when no override message was given.
pub fn check_with_default<T: ConstraintType>(
    ctx: &ValidationContext<'_>,
    code: &str,
    constraint: Option<&Constraint<T>>,
    default: Option<&T>,
    default_message: Option<&Message>,
    valid: impl Fn(&T) -> bool,
) -> bool {
    let resolved = constraint.map(|c| c.resolve(ctx)).unwrap_or_default();
    let Some(value) = resolved.value.or_else(|| default.cloned()) else {
        return true;
    };
    if valid(&value) {
        return true;
    }
    let message = resolved
        .message
        .or_else(|| default_message.map(|m| m.resolve(ctx)));
    ctx.set_status(code, value.to_value(), message, resolved.level)
}

/// Run a custom test, recording a `test` status on failure.
pub fn check_test(ctx: &ValidationContext<'_>, test: Option<&Test>) -> bool {
    match test {
        None => true,
        Some(Test::Sync(test)) => match test(ctx) {
            TestResult::Valid => true,
            TestResult::Invalid { message, level } => {
                ctx.set_status("test", Value::Bool(false), message, level)
            }
        },
        Some(Test::Async(test)) => async_test::evaluate(ctx, test),
    }
}
