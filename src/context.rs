//! Validation contexts and pass settings.
//!
//! A context is created for every node a pass visits. Children borrow their
//! parent, so the chain from any node up to the root is always available to
//! computed constraints and custom tests, and all contexts of one pass share
//! the same status map.

use crate::engine::Engine;
use crate::messages;
use crate::path::{Path, Segment};
use crate::status::{Level, StatusConstraint, StatusMap, ValidationStatus};
use crate::value::{Value, UNDEFINED};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Group selector entry. `Default` stands for the ungrouped constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Group {
    Default,
    Named(String),
}

impl From<&str> for Group {
    fn from(name: &str) -> Self {
        Group::Named(name.to_owned())
    }
}

impl From<String> for Group {
    fn from(name: String) -> Self {
        Group::Named(name)
    }
}

impl<T: Into<Group>> From<Option<T>> for Group {
    fn from(group: Option<T>) -> Self {
        group.map_or(Group::Default, Into::into)
    }
}

/// Consumer-supplied handle passed through to computed constraints and
/// tests (e.g. a form manager exposing its own state).
pub trait FormHandle {
    fn as_any(&self) -> &dyn Any;

    /// Value currently held by the form at `path`.
    fn value_at(&self, _path: &Path) -> Option<Value> {
        None
    }

    fn submitted(&self) -> bool {
        false
    }
}

/// Settings of one pass.
#[derive(Clone, Default)]
pub struct ValidationSettings {
    /// Target path. `None` validates from the root.
    pub path: Option<Path>,
    /// Active groups. `None` runs the ungrouped constraints only.
    pub groups: Option<Vec<Group>>,
    /// Paths for which validation is skipped.
    pub ignore: Option<Rc<dyn Fn(&Path) -> bool>>,
    /// Treat async tests as valid without running them.
    pub skip_async: bool,
    pub form: Option<Rc<dyn FormHandle>>,
}

impl ValidationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }

    pub fn groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Group>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn ignore(mut self, ignore: impl Fn(&Path) -> bool + 'static) -> Self {
        self.ignore = Some(Rc::new(ignore));
        self
    }

    pub fn skip_async(mut self, skip: bool) -> Self {
        self.skip_async = skip;
        self
    }

    pub fn form(mut self, form: Rc<dyn FormHandle>) -> Self {
        self.form = Some(form);
        self
    }
}

impl fmt::Debug for ValidationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationSettings")
            .field("path", &self.path)
            .field("groups", &self.groups)
            .field("ignore", &self.ignore.is_some())
            .field("skip_async", &self.skip_async)
            .field("form", &self.form.is_some())
            .finish()
    }
}

/// The node being validated.
pub struct ValidationContext<'a> {
    engine: &'a Engine,
    kind: &'a str,
    value: &'a Value,
    path: Path,
    parent: Option<&'a ValidationContext<'a>>,
    root: Option<&'a ValidationContext<'a>>,
    settings: &'a ValidationSettings,
    statuses: &'a RefCell<StatusMap>,
}

impl<'a> ValidationContext<'a> {
    pub(crate) fn new_root(
        engine: &'a Engine,
        kind: &'a str,
        value: &'a Value,
        settings: &'a ValidationSettings,
        statuses: &'a RefCell<StatusMap>,
    ) -> Self {
        Self {
            engine,
            kind,
            value,
            path: Path::root(),
            parent: None,
            root: None,
            settings,
            statuses,
        }
    }

    /// Context of a nested node. The child gets its own copy of the path.
    pub fn child<'c>(
        &'c self,
        kind: &'c str,
        value: &'c Value,
        segment: Segment,
    ) -> ValidationContext<'c> {
        ValidationContext {
            engine: self.engine,
            kind,
            value,
            path: self.path.child(segment),
            parent: Some(self),
            root: self.root.or(Some(self)),
            settings: self.settings,
            statuses: self.statuses,
        }
    }

    pub fn kind(&self) -> &'a str {
        self.kind
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Absolute path from the root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of the enclosing node, `None` at the root.
    pub fn parent(&self) -> Option<&'a Value> {
        self.parent.map(|parent| parent.value)
    }

    pub fn parent_context(&self) -> Option<&'a ValidationContext<'a>> {
        self.parent
    }

    pub fn root_context(&self) -> Option<&'a ValidationContext<'a>> {
        self.root
    }

    /// Value the pass started from.
    pub fn root_value(&self) -> &'a Value {
        self.root.map_or(self.value, |root| root.value)
    }

    pub fn settings(&self) -> &'a ValidationSettings {
        self.settings
    }

    pub fn form(&self) -> Option<&'a dyn FormHandle> {
        self.settings.form.as_deref()
    }

    pub fn groups(&self) -> Option<&'a [Group]> {
        self.settings.groups.as_deref()
    }

    /// Whether the settings' ignore predicate excludes this node.
    pub fn ignored(&self) -> bool {
        self.settings
            .ignore
            .as_ref()
            .is_some_and(|ignore| ignore(&self.path))
    }

    pub(crate) fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn create_status(
        &self,
        code: &str,
        constraint: impl Into<StatusConstraint>,
        message: Option<String>,
        level: Level,
    ) -> ValidationStatus {
        StatusTemplate::of(self).status(code, constraint.into(), message, level)
    }

    /// Record a status for this node. Always returns `false`, so validators
    /// can end a failing check with it.
    pub fn set_status(
        &self,
        code: &str,
        constraint: impl Into<StatusConstraint>,
        message: Option<String>,
        level: Level,
    ) -> bool {
        let status = self.create_status(code, constraint, message, level);
        self.record(status);
        false
    }

    /// Record a `type` status unless `matches` holds.
    pub fn check_type(&self, matches: bool, expected: &str) -> bool {
        matches || self.set_status("type", Value::from(expected), None, Level::Error)
    }

    pub(crate) fn record(&self, status: ValidationStatus) {
        self.statuses
            .borrow_mut()
            .insert(status.path.clone(), status);
    }
}

impl fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("kind", &self.kind)
            .field("path", &self.path.to_string())
            .field("value", self.value)
            .finish()
    }
}

/// Owned snapshot of a node, for statuses built after the pass returned.
#[derive(Debug, Clone)]
pub(crate) struct StatusTemplate {
    pub kind: String,
    pub path: String,
    pub value: Value,
}

impl StatusTemplate {
    pub fn of(ctx: &ValidationContext<'_>) -> Self {
        Self {
            kind: ctx.kind.to_owned(),
            path: ctx.path.to_string(),
            value: ctx.value.clone(),
        }
    }

    pub fn status(
        &self,
        code: &str,
        constraint: StatusConstraint,
        message: Option<String>,
        level: Level,
    ) -> ValidationStatus {
        let raw = constraint.as_value().unwrap_or(&UNDEFINED);
        let message = messages::resolve_message(&self.kind, code, raw, message, level);
        ValidationStatus {
            level,
            path: self.path.clone(),
            value: self.value.clone(),
            kind: self.kind.clone(),
            code: code.to_owned(),
            constraint,
            message,
        }
    }
}
