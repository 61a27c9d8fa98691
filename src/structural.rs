//! Structural kinds: arrays and class instances.

use crate::constraint::{CommonConstraints, Constraint, Test};
use crate::context::ValidationContext;
use crate::declaration::{
    bound_setters, resolve_bound, test_setters, DeclRef, Declaration, Field, KindConstraints,
};
use crate::path::Segment;
use crate::registry::{ClassRef, ClassSchema, LazyClass};
use crate::value::{Value, UNDEFINED};
use std::fmt;
use std::rc::Rc;

/// Element declaration of an array.
#[derive(Clone)]
pub enum Of {
    Declaration(DeclRef),
    Class(LazyClass),
}

impl Of {
    pub fn resolve(&self) -> Option<DeclRef> {
        match self {
            Of::Declaration(decl) => Some(Rc::clone(decl)),
            Of::Class(class) => class.get().map(|schema| schema as DeclRef),
        }
    }
}

impl<C: KindConstraints> From<Field<C>> for Of {
    fn from(field: Field<C>) -> Self {
        Of::Declaration(field.into_decl())
    }
}

impl From<DeclRef> for Of {
    fn from(decl: DeclRef) -> Self {
        Of::Declaration(decl)
    }
}

impl From<Rc<ClassSchema>> for Of {
    fn from(schema: Rc<ClassSchema>) -> Self {
        Of::Class(LazyClass::new(schema))
    }
}

impl From<&Rc<ClassSchema>> for Of {
    fn from(schema: &Rc<ClassSchema>) -> Self {
        Of::Class(LazyClass::new(schema))
    }
}

impl From<&str> for Of {
    fn from(id: &str) -> Self {
        Of::Class(LazyClass::new(id))
    }
}

impl From<ClassRef> for Of {
    fn from(reference: ClassRef) -> Self {
        Of::Class(LazyClass::new(reference))
    }
}

impl fmt::Debug for Of {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Of::Declaration(decl) => f.debug_tuple("Declaration").field(&decl.kind()).finish(),
            Of::Class(class) => f.debug_tuple("Class").field(class.reference()).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// array
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ArrayConstraints {
    pub common: CommonConstraints,
    /// Minimum number of elements.
    pub min: Option<Constraint<usize>>,
    pub max: Option<Constraint<usize>>,
    pub of: Option<Of>,
    /// Runs on the whole array once every element passed.
    pub test: Option<Test>,
}

/// An array whose elements all follow `of`.
pub fn array(of: impl Into<Of>) -> Field<ArrayConstraints> {
    Field::new(
        "array",
        ArrayConstraints {
            of: Some(of.into()),
            ..ArrayConstraints::default()
        },
    )
}

impl KindConstraints for ArrayConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        let Value::Array(items) = ctx.value() else {
            return ctx.check_type(false, "array");
        };
        let len = items.len();
        if !(field.check(ctx, "min", |c| c.min.as_ref(), |&min| len >= min)
            && field.check(ctx, "max", |c| c.max.as_ref(), |&max| len <= max))
        {
            return false;
        }

        let mut valid = true;
        if let Some(element) = field.constraints().of.as_ref().and_then(Of::resolve) {
            for (index, item) in items.iter().enumerate() {
                let child = ctx.child(element.kind(), item, Segment::Index(index));
                valid = element.validate(&child) && valid;
            }
        }
        valid && field.check_test(ctx, |c| c.test.as_ref())
    }

    fn traverse<'v>(
        &self,
        ctx: &ValidationContext<'v>,
        segment: &Segment,
        nullish: bool,
    ) -> Option<(DeclRef, &'v Value)> {
        let value = ctx.value();
        let blocked = if nullish {
            !value.is_nullish() && !matches!(value, Value::Array(_))
        } else {
            value.is_nullish()
        };
        if blocked {
            return None;
        }
        let index = segment.as_index()?;
        let element = self.of.as_ref()?.resolve()?;
        let item = value
            .as_array()
            .and_then(|items| items.get(index))
            .unwrap_or(&UNDEFINED);
        Some((element, item))
    }

    fn bounds(&self, ctx: &ValidationContext<'_>) -> (Option<Value>, Option<Value>) {
        (
            resolve_bound(ctx, self.min.as_ref()),
            resolve_bound(ctx, self.max.as_ref()),
        )
    }
}

// ---------------------------------------------------------------------------
// instance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct InstanceConstraints {
    pub common: CommonConstraints,
    pub of: Option<LazyClass>,
    /// Runs after the class fields and the class test passed.
    pub test: Option<Test>,
}

/// An object validated against a class schema.
pub fn instance(of: impl Into<ClassRef>) -> Field<InstanceConstraints> {
    Field::new(
        "instance",
        InstanceConstraints {
            of: Some(LazyClass::new(of)),
            ..InstanceConstraints::default()
        },
    )
}

impl KindConstraints for InstanceConstraints {
    fn common(&self) -> &CommonConstraints {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConstraints {
        &mut self.common
    }

    fn validate(ctx: &ValidationContext<'_>, field: &Field<Self>) -> bool {
        if !ctx.check_type(matches!(ctx.value(), Value::Object(_)), "object") {
            return false;
        }
        // An unresolvable class leaves only the instance test.
        if let Some(class) = field.constraints().of.as_ref().and_then(LazyClass::get) {
            if !(class.validate_fields(ctx) && class.run_test(ctx)) {
                return false;
            }
        }
        field.check_test(ctx, |c| c.test.as_ref())
    }

    fn traverse<'v>(
        &self,
        ctx: &ValidationContext<'v>,
        segment: &Segment,
        nullish: bool,
    ) -> Option<(DeclRef, &'v Value)> {
        self.of.as_ref()?.get()?.traverse(ctx, segment, nullish)
    }
}

test_setters!(ArrayConstraints, InstanceConstraints);

bound_setters!(ArrayConstraints => usize);
