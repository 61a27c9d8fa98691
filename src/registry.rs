//! Class schemas and the class registry.
//!
//! A [`ClassSchema`] is the declaration of an object type: its fields, in
//! declaration order, and an optional class-level test. Schemas given an id
//! are stored in a thread-wide arena so that declarations can refer to a
//! class before it exists (`instance("Person")` inside `Person` itself).
//! References by id are resolved on first use and the arena slot is cached
//! in the referencing declaration.

use crate::async_test::AsyncTest;
use crate::constraint::{check_test, Test, TestResult};
use crate::context::{Group, ValidationContext};
use crate::declaration::{DeclRef, Declaration};
use crate::path::Segment;
use crate::value::{Value, UNDEFINED};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Arena slot of a registered class.
/// u32 keeps references small; 4B classes is far beyond any schema set.
pub type ClassId = u32;

// Global class registry using thread-local storage
// WASM is single-threaded, so thread_local acts as a singleton
thread_local! {
    static CLASS_REGISTRY: RefCell<ClassRegistry> = RefCell::new(ClassRegistry::new());
}

/// Register `schema` under `id` in the global registry.
///
/// Registering an id again points it at the new schema; declarations that
/// already resolved the old one keep using it.
///
/// # Example
/// ```
/// use formguard::registry::{class_by_id, register_class, ClassSchema};
///
/// let schema = ClassSchema::builder("Address").build();
/// let id = register_class("Address", schema);
/// assert_eq!(class_by_id(id).unwrap().name(), "Address");
/// ```
pub fn register_class(id: impl Into<String>, schema: Rc<ClassSchema>) -> ClassId {
    CLASS_REGISTRY.with(|registry| registry.borrow_mut().register(id.into(), schema))
}

/// Arena slot registered for `id`.
pub fn class_id(id: &str) -> Option<ClassId> {
    CLASS_REGISTRY.with(|registry| registry.borrow().lookup(id))
}

/// Schema stored in an arena slot.
pub fn class_by_id(class: ClassId) -> Option<Rc<ClassSchema>> {
    CLASS_REGISTRY.with(|registry| registry.borrow().get(class))
}

/// Resolve a class reference. Unregistered ids are reported and yield `None`.
pub fn resolve_class(reference: &ClassRef) -> Option<Rc<ClassSchema>> {
    match reference {
        ClassRef::Schema(schema) => Some(Rc::clone(schema)),
        ClassRef::Id(id) => class_id(id).and_then(class_by_id).or_else(|| {
            report_unregistered(id);
            None
        }),
    }
}

/// Number of registered classes.
pub fn class_count() -> usize {
    CLASS_REGISTRY.with(|registry| registry.borrow().count())
}

/// Drop every registered class.
///
/// Useful for tests. Slots cached before the reset are discarded; those
/// declarations look their id up again on next use.
pub fn clear_classes() {
    CLASS_REGISTRY.with(|registry| registry.borrow_mut().clear())
}

fn report_unregistered(id: &str) {
    tracing::error!(
        class = id,
        "class is not registered; did you forget to give the schema this id?"
    );
}

/// Arena of class schemas with an id index.
#[derive(Default)]
pub struct ClassRegistry {
    /// id → arena slot
    id_to_class: HashMap<String, ClassId>,
    /// Slot index is the ClassId.
    schemas: Vec<Rc<ClassSchema>>,
    /// Bumped by `clear`, which frees every slot for reuse.
    generation: u32,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: String, schema: Rc<ClassSchema>) -> ClassId {
        let class = self.schemas.len() as ClassId;
        self.schemas.push(schema);
        self.id_to_class.insert(id, class);
        class
    }

    pub fn lookup(&self, id: &str) -> Option<ClassId> {
        self.id_to_class.get(id).copied()
    }

    pub fn get(&self, class: ClassId) -> Option<Rc<ClassSchema>> {
        self.schemas.get(class as usize).cloned()
    }

    pub fn count(&self) -> usize {
        self.id_to_class.len()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn clear(&mut self) {
        self.id_to_class.clear();
        self.schemas.clear();
        self.generation = self.generation.wrapping_add(1);
        tracing::trace!(generation = self.generation, "cleared class registry");
    }
}

/// A class given directly or by registered id.
#[derive(Clone)]
pub enum ClassRef {
    Schema(Rc<ClassSchema>),
    Id(String),
}

impl From<Rc<ClassSchema>> for ClassRef {
    fn from(schema: Rc<ClassSchema>) -> Self {
        ClassRef::Schema(schema)
    }
}

impl From<&Rc<ClassSchema>> for ClassRef {
    fn from(schema: &Rc<ClassSchema>) -> Self {
        ClassRef::Schema(Rc::clone(schema))
    }
}

impl From<&str> for ClassRef {
    fn from(id: &str) -> Self {
        ClassRef::Id(id.to_owned())
    }
}

impl From<String> for ClassRef {
    fn from(id: String) -> Self {
        ClassRef::Id(id)
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassRef::Schema(schema) => f.debug_tuple("Schema").field(&schema.name).finish(),
            ClassRef::Id(id) => f.debug_tuple("Id").field(id).finish(),
        }
    }
}

/// A class reference resolved on first use. Only successful lookups are
/// cached, so a class registered late is still found. The cached slot is
/// tagged with the registry generation and dropped after `clear_classes`.
#[derive(Debug, Clone)]
pub struct LazyClass {
    reference: ClassRef,
    slot: Cell<Option<(u32, ClassId)>>,
}

impl LazyClass {
    pub fn new(reference: impl Into<ClassRef>) -> Self {
        Self {
            reference: reference.into(),
            slot: Cell::new(None),
        }
    }

    pub fn reference(&self) -> &ClassRef {
        &self.reference
    }

    pub fn get(&self) -> Option<Rc<ClassSchema>> {
        let id = match &self.reference {
            ClassRef::Schema(schema) => return Some(Rc::clone(schema)),
            ClassRef::Id(id) => id,
        };
        CLASS_REGISTRY.with(|registry| {
            let registry = registry.borrow();
            if let Some((generation, class)) = self.slot.get() {
                if generation == registry.generation() {
                    return registry.get(class);
                }
            }
            let Some(class) = registry.lookup(id) else {
                self.slot.set(None);
                report_unregistered(id);
                return None;
            };
            self.slot.set(Some((registry.generation(), class)));
            registry.get(class)
        })
    }
}

/// Declaration of an object type.
pub struct ClassSchema {
    name: String,
    id: Option<String>,
    fields: IndexMap<String, DeclRef>,
    test: Option<Test>,
}

impl ClassSchema {
    pub fn builder(name: impl Into<String>) -> ClassSchemaBuilder {
        ClassSchemaBuilder {
            name: name.into(),
            id: None,
            fields: IndexMap::new(),
            test: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&DeclRef> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Validate every declared field of the object at `ctx`. All fields are
    /// visited even after a failure.
    pub(crate) fn validate_fields(&self, ctx: &ValidationContext<'_>) -> bool {
        let object = ctx.value().as_object();
        let mut valid = true;
        for (name, decl) in &self.fields {
            let present = object.and_then(|object| object.get(name));
            let child = ctx.child(
                decl.kind(),
                present.unwrap_or(&UNDEFINED),
                Segment::Key(name.clone()),
            );
            valid = decl.validate_presence(&child, present.is_some()) && decl.validate(&child) && valid;
        }
        valid
    }

    /// Class-level test. It belongs to the ungrouped constraint set.
    pub(crate) fn run_test(&self, ctx: &ValidationContext<'_>) -> bool {
        let active = ctx
            .groups()
            .map_or(true, |groups| groups.contains(&Group::Default));
        !active || check_test(ctx, self.test.as_ref())
    }
}

impl Declaration for ClassSchema {
    fn kind(&self) -> &str {
        "class"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> bool {
        let value = ctx.value();
        if ctx.ignored() || value.is_nullish() {
            return true;
        }
        if !ctx.check_type(matches!(value, Value::Object(_)), "object") {
            return false;
        }
        // The class test sees an object whose fields all passed.
        self.validate_fields(ctx) && self.run_test(ctx)
    }

    fn traverse<'v>(
        &self,
        ctx: &ValidationContext<'v>,
        segment: &Segment,
        nullish: bool,
    ) -> Option<(DeclRef, &'v Value)> {
        let value = ctx.value();
        let blocked = if nullish {
            !value.is_nullish() && !matches!(value, Value::Object(_))
        } else {
            value.is_nullish()
        };
        if blocked {
            return None;
        }
        let key = segment.as_key()?;
        let decl = Rc::clone(self.fields.get(key)?);
        Some((decl, value.get(key).unwrap_or(&UNDEFINED)))
    }
}

impl fmt::Debug for ClassSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSchema")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("test", &self.test.is_some())
            .finish()
    }
}

/// Builder for [`ClassSchema`].
///
/// # Example
/// ```
/// use formguard::primitives::{number, string};
/// use formguard::registry::ClassSchema;
///
/// let person = ClassSchema::builder("Person")
///     .id("Person")
///     .field("name", string().required(true))
///     .field("age", number().min(0.0))
///     .build();
/// assert_eq!(person.field_names().collect::<Vec<_>>(), vec!["name", "age"]);
/// ```
pub struct ClassSchemaBuilder {
    name: String,
    id: Option<String>,
    fields: IndexMap<String, DeclRef>,
    test: Option<Test>,
}

impl ClassSchemaBuilder {
    /// Inherit the fields and test of `parent`. Parent fields come first;
    /// redeclaring one replaces it in place.
    pub fn extends(mut self, parent: &ClassSchema) -> Self {
        let mut fields = parent.fields.clone();
        fields.extend(self.fields.drain(..));
        self.fields = fields;
        if self.test.is_none() {
            self.test = parent.test.clone();
        }
        self
    }

    pub fn field(mut self, name: impl Into<String>, decl: impl Declaration + 'static) -> Self {
        self.fields.insert(name.into(), Rc::new(decl));
        self
    }

    /// Check run on the whole object once all of its fields passed.
    pub fn test<F, R>(mut self, test: F) -> Self
    where
        F: Fn(&ValidationContext<'_>) -> R + 'static,
        R: Into<TestResult>,
    {
        self.test = Some(Test::sync(test));
        self
    }

    pub fn test_async(mut self, test: AsyncTest) -> Self {
        self.test = Some(test.into());
        self
    }

    /// Register the schema under `id` when built.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn build(self) -> Rc<ClassSchema> {
        let schema = Rc::new(ClassSchema {
            name: self.name,
            id: self.id,
            fields: self.fields,
            test: self.test,
        });
        if let Some(id) = &schema.id {
            let class = register_class(id.clone(), Rc::clone(&schema));
            tracing::debug!(class = id.as_str(), slot = class, "registered class schema");
        }
        schema
    }
}
