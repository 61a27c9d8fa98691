//! Constraint declarations.
//!
//! A [`Declaration`] knows how to validate the node a context points at and
//! how to step into its children. Every field kind is a [`Field`] over its
//! own constraint set; class schemas are the other implementation (see
//! [`crate::registry`]).

use crate::constraint::{check, check_test, CommonConstraints, Constraint, ConstraintType, Test};
use crate::context::{Group, ValidationContext};
use crate::path::Segment;
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use ts_rs::TS;

pub type DeclRef = Rc<dyn Declaration>;

/// Display hints for a field, resolved without validating it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
pub struct ResolvedConstraints {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown", optional)]
    pub min: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown", optional)]
    pub max: Option<Value>,
}

pub trait Declaration {
    fn kind(&self) -> &str;

    /// Validate the node at `ctx` and everything below it, recording
    /// statuses into the pass. Returns whether the node is valid.
    fn validate(&self, ctx: &ValidationContext<'_>) -> bool;

    /// Presence check run by the enclosing object before [`validate`].
    ///
    /// [`validate`]: Declaration::validate
    fn validate_presence(&self, _ctx: &ValidationContext<'_>, _present: bool) -> bool {
        true
    }

    /// Declaration and value of the child at `segment`, or `None` when the
    /// segment cannot be followed. With `nullish`, missing values along the
    /// way are stepped through instead of stopping the walk.
    fn traverse<'v>(
        &self,
        _ctx: &ValidationContext<'v>,
        _segment: &Segment,
        _nullish: bool,
    ) -> Option<(DeclRef, &'v Value)> {
        None
    }

    fn resolve_constraints(&self, _ctx: &ValidationContext<'_>) -> ResolvedConstraints {
        ResolvedConstraints::default()
    }
}

impl<D: Declaration + ?Sized> Declaration for Rc<D> {
    fn kind(&self) -> &str {
        (**self).kind()
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> bool {
        (**self).validate(ctx)
    }

    fn validate_presence(&self, ctx: &ValidationContext<'_>, present: bool) -> bool {
        (**self).validate_presence(ctx, present)
    }

    fn traverse<'v>(
        &self,
        ctx: &ValidationContext<'v>,
        segment: &Segment,
        nullish: bool,
    ) -> Option<(DeclRef, &'v Value)> {
        (**self).traverse(ctx, segment, nullish)
    }

    fn resolve_constraints(&self, ctx: &ValidationContext<'_>) -> ResolvedConstraints {
        (**self).resolve_constraints(ctx)
    }
}

/// The constraint set of one kind.
///
/// Implement this for a custom kind and wrap it with [`Field::new`]; the
/// field takes care of the `ignored`, `defined`, `notnull` and `required`
/// checks and only calls [`validate`](KindConstraints::validate) for
/// non-nullish values.
pub trait KindConstraints: Default + 'static {
    fn common(&self) -> &CommonConstraints;

    fn common_mut(&mut self) -> &mut CommonConstraints;

    /// Kind-specific checks, in reporting order.
    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool;

    fn traverse<'v>(
        &self,
        _ctx: &ValidationContext<'v>,
        _segment: &Segment,
        _nullish: bool,
    ) -> Option<(DeclRef, &'v Value)> {
        None
    }

    /// Resolved `min` and `max`, for display.
    fn bounds(&self, _ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (None, None)
    }
}

/// A field declaration: a kind, its constraints and per-group overrides.
#[derive(Clone)]
pub struct Field<C> {
    kind: Cow<'static, str>,
    constraints: C,
    groups: IndexMap<String, C>,
}

impl<C: KindConstraints> Field<C> {
    pub fn new(kind: impl Into<Cow<'static, str>>, constraints: C) -> Self {
        Self {
            kind: kind.into(),
            constraints,
            groups: IndexMap::new(),
        }
    }

    pub fn constraints(&self) -> &C {
        &self.constraints
    }

    /// Constraints of a named group, if declared.
    pub fn group_constraints(&self, group: &str) -> Option<&C> {
        self.groups.get(group)
    }

    /// Edit the constraint set in place.
    pub fn configure(mut self, edit: impl FnOnce(&mut C)) -> Self {
        edit(&mut self.constraints);
        self
    }

    /// Declare the constraints used when `name` is among the active groups.
    pub fn group(mut self, name: impl Into<String>, field: Field<C>) -> Self {
        self.groups.insert(name.into(), field.constraints);
        self
    }

    pub fn ignored(mut self, ignored: impl Into<Constraint<bool>>) -> Self {
        self.constraints.common_mut().ignored = Some(ignored.into());
        self
    }

    pub fn exists(mut self, exists: impl Into<Constraint<bool>>) -> Self {
        self.constraints.common_mut().exists = Some(exists.into());
        self
    }

    pub fn defined(mut self, defined: impl Into<Constraint<bool>>) -> Self {
        self.constraints.common_mut().defined = Some(defined.into());
        self
    }

    pub fn notnull(mut self, notnull: impl Into<Constraint<bool>>) -> Self {
        self.constraints.common_mut().notnull = Some(notnull.into());
        self
    }

    pub fn required(mut self, required: impl Into<Constraint<bool>>) -> Self {
        self.constraints.common_mut().required = Some(required.into());
        self
    }

    pub fn into_decl(self) -> DeclRef {
        Rc::new(self)
    }

    /// Run `check` once per active group and stop at the first failure.
    /// Named groups the field does not declare are skipped.
    pub fn each_group(
        &self,
        ctx: &ValidationContext<'_>,
        mut check: impl FnMut(&C) -> bool,
    ) -> bool {
        let Some(groups) = ctx.groups() else {
            return check(&self.constraints);
        };
        groups.iter().all(|group| match group {
            Group::Default => check(&self.constraints),
            Group::Named(name) => self.groups.get(name).map_or(true, &mut check),
        })
    }

    /// Check the constraint picked by `select` in every active group.
    pub fn check<T, S, V>(&self, ctx: &ValidationContext<'_>, code: &str, select: S, valid: V) -> bool
    where
        T: ConstraintType,
        S: Fn(&C) -> Option<&Constraint<T>>,
        V: Fn(&T) -> bool,
    {
        self.each_group(ctx, |constraints| {
            check(ctx, code, select(constraints), &valid)
        })
    }

    /// Run the test picked by `select` in every active group.
    pub fn check_test<S>(&self, ctx: &ValidationContext<'_>, select: S) -> bool
    where
        S: Fn(&C) -> Option<&Test>,
    {
        self.each_group(ctx, |constraints| check_test(ctx, select(constraints)))
    }

    fn is_ignored(&self, ctx: &ValidationContext<'_>) -> bool {
        self.constraints
            .common()
            .ignored
            .as_ref()
            .and_then(|ignored| ignored.resolve(ctx).value)
            .unwrap_or(false)
    }

    fn validate_common(&self, ctx: &ValidationContext<'_>) -> bool {
        let value = ctx.value();
        self.check(ctx, "defined", |c| c.common().defined.as_ref(), |&defined| {
            !defined || !value.is_undefined()
        }) && self.check(ctx, "notnull", |c| c.common().notnull.as_ref(), |&notnull| {
            !notnull || !value.is_null()
        }) && self.check(ctx, "required", |c| c.common().required.as_ref(), |&required| {
            !required || !value.is_nullish()
        })
    }
}

impl<C: KindConstraints> Declaration for Field<C> {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> bool {
        if ctx.ignored() || self.is_ignored(ctx) {
            return true;
        }
        if !self.validate_common(ctx) {
            return false;
        }
        if ctx.value().is_nullish() {
            return true;
        }
        C::validate(ctx, self)
    }

    fn validate_presence(&self, ctx: &ValidationContext<'_>, present: bool) -> bool {
        self.check(ctx, "exists", |c| c.common().exists.as_ref(), |&exists| {
            !exists || present
        })
    }

    fn traverse<'v>(
        &self,
        ctx: &ValidationContext<'v>,
        segment: &Segment,
        nullish: bool,
    ) -> Option<(DeclRef, &'v Value)> {
        self.constraints.traverse(ctx, segment, nullish)
    }

    fn resolve_constraints(&self, ctx: &ValidationContext<'_>) -> ResolvedConstraints {
        let mut resolved = ResolvedConstraints::default();
        self.each_group(ctx, |constraints| {
            if let Some(required) = constraints
                .common()
                .required
                .as_ref()
                .and_then(|required| required.resolve(ctx).value)
            {
                resolved.required = required;
            }
            let (min, max) = constraints.bounds(ctx);
            if min.is_some() {
                resolved.min = min;
            }
            if max.is_some() {
                resolved.max = max;
            }
            true
        });
        resolved
    }
}

impl<C> fmt::Debug for Field<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind)
            .field("groups", &self.groups.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Resolve an optional bound for display.
pub(crate) fn resolve_bound<T: ConstraintType>(
    ctx: &ValidationContext<'_>,
    bound: Option<&Constraint<T>>,
) -> Option<Value> {
    bound
        .and_then(|bound| bound.resolve(ctx).value)
        .map(|value| value.to_value())
}

/// `test` and `test_async` setters for kinds with a `test` slot.
macro_rules! test_setters {
    ($($constraints:ty),* $(,)?) => {$(
        impl $crate::declaration::Field<$constraints> {
            /// Custom check run after every other constraint of the field.
            pub fn test<F, R>(self, test: F) -> Self
            where
                F: Fn(&$crate::context::ValidationContext<'_>) -> R + 'static,
                R: Into<$crate::constraint::TestResult>,
            {
                self.configure(|c| c.test = Some($crate::constraint::Test::sync(test)))
            }

            pub fn test_async(self, test: $crate::async_test::AsyncTest) -> Self {
                self.configure(|c| c.test = Some(test.into()))
            }
        }
    )*};
}

/// `min` and `max` setters over a bound type.
macro_rules! bound_setters {
    ($($constraints:ty => $bound:ty),* $(,)?) => {$(
        impl $crate::declaration::Field<$constraints> {
            pub fn min(self, min: impl Into<$crate::constraint::Constraint<$bound>>) -> Self {
                self.configure(|c| c.min = Some(min.into()))
            }

            pub fn max(self, max: impl Into<$crate::constraint::Constraint<$bound>>) -> Self {
                self.configure(|c| c.max = Some(max.into()))
            }
        }
    )*};
}

/// `one_of` setter over an option list type.
macro_rules! one_of_setter {
    ($($constraints:ty => $options:ty),* $(,)?) => {$(
        impl $crate::declaration::Field<$constraints> {
            /// The value must equal one of the options.
            pub fn one_of(self, options: impl Into<$crate::constraint::Constraint<$options>>) -> Self {
                self.configure(|c| c.one_of = Some(options.into()))
            }
        }
    )*};
}

pub(crate) use {bound_setters, one_of_setter, test_setters};
