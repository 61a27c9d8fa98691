//! Validation statuses: the path-keyed results of a pass.

use crate::value::Value;
use futures::future::{LocalBoxFuture, Shared};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use ts_rs::TS;

/// Severity of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    #[default]
    Error,
    /// An async test is in flight.
    Pending,
    /// An async test could not run (its future failed).
    Unavailable,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Pending => "pending",
            Level::Unavailable => "unavailable",
        }
    }
}

/// A future resolving to the settled status of an async test, or `None`
/// when the test passed. Cloning shares the same underlying run.
#[derive(Clone)]
pub struct PendingHandle(Shared<LocalBoxFuture<'static, Option<ValidationStatus>>>);

impl PendingHandle {
    pub(crate) fn new(future: LocalBoxFuture<'static, Option<ValidationStatus>>) -> Self {
        Self(future.shared())
    }

    /// Settled result if the test already completed.
    pub fn peek(&self) -> Option<Option<ValidationStatus>> {
        self.0.peek().cloned()
    }
}

impl Future for PendingHandle {
    type Output = Option<ValidationStatus>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll_unpin(cx)
    }
}

impl PartialEq for PendingHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.0.peek().is_some() {
            "settled"
        } else {
            "pending"
        };
        f.debug_tuple("PendingHandle").field(&state).finish()
    }
}

/// The constraint a status reports: the raw constraint value, or the
/// in-flight handle for a pending async test.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusConstraint {
    Value(Value),
    Pending(PendingHandle),
}

impl StatusConstraint {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            StatusConstraint::Value(value) => Some(value),
            StatusConstraint::Pending(_) => None,
        }
    }

    pub fn as_pending(&self) -> Option<&PendingHandle> {
        match self {
            StatusConstraint::Pending(handle) => Some(handle),
            StatusConstraint::Value(_) => None,
        }
    }
}

impl From<Value> for StatusConstraint {
    fn from(value: Value) -> Self {
        StatusConstraint::Value(value)
    }
}

impl From<PendingHandle> for StatusConstraint {
    fn from(handle: PendingHandle) -> Self {
        StatusConstraint::Pending(handle)
    }
}

impl Serialize for StatusConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatusConstraint::Value(value) => value.serialize(serializer),
            StatusConstraint::Pending(_) => serializer.serialize_none(),
        }
    }
}

/// One validation result, keyed by its serialized path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationStatus {
    pub level: Level,
    pub path: String,
    /// Value at validation time.
    pub value: Value,
    pub kind: String,
    /// Which constraint produced the status: `required`, `min`, `type`, `test`...
    pub code: String,
    pub constraint: StatusConstraint,
    pub message: String,
}

impl ValidationStatus {
    pub fn is_pending(&self) -> bool {
        self.level == Level::Pending
    }

    pub fn pending(&self) -> Option<&PendingHandle> {
        self.constraint.as_pending()
    }
}

/// Statuses of one pass, keyed by serialized path, in visit order.
pub type StatusMap = IndexMap<String, ValidationStatus>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn status(level: Level) -> ValidationStatus {
        ValidationStatus {
            level,
            path: "name".into(),
            value: Value::from("x"),
            kind: "string".into(),
            code: "min".into(),
            constraint: StatusConstraint::Value(Value::from(2usize)),
            message: "Minimum 2 characters".into(),
        }
    }

    #[test]
    fn test_serializes_level_in_lowercase() {
        let json = serde_json::to_value(status(Level::Warning)).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["constraint"], 2.0);
    }

    #[test]
    fn test_pending_handles_compare_by_identity() {
        let settled = status(Level::Error);
        let handle = PendingHandle::new(async move { Some(settled) }.boxed_local());
        let other = PendingHandle::new(async { None }.boxed_local());
        assert_eq!(handle, handle.clone());
        assert_ne!(handle, other);
        assert!(handle.peek().is_none());

        let resolved = block_on(handle.clone());
        assert_eq!(resolved.map(|s| s.level), Some(Level::Error));
        assert!(handle.peek().is_some());
    }
}
