//! Validation engine: full and path-targeted passes, display constraints and
//! the async status registry.
//!
//! A pass builds a fresh status map. The async registry outlives passes: it
//! remembers, per path, the last result of each async test so that later
//! passes can decide whether to run the test again.

use crate::async_test::SharedEntry;
use crate::context::{ValidationContext, ValidationSettings};
use crate::declaration::{Declaration, ResolvedConstraints};
use crate::messages;
use crate::path::{self, Path, Segment};
use crate::status::{PendingHandle, StatusMap, ValidationStatus};
use crate::value::Value;
use futures::task::{LocalSpawn, LocalSpawnExt};
use futures::FutureExt;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, error};

/// Engine-wide settings, all optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Locale activated when the engine is created.
    pub locale: Option<String>,
    /// Capacity of the parsed-path cache.
    pub path_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locale: None,
            path_cache_capacity: path::PathCache::DEFAULT_CAPACITY,
        }
    }
}

type SettleHook = Rc<dyn Fn(&str)>;

pub struct Engine {
    async_statuses: RefCell<HashMap<String, SharedEntry>>,
    spawner: Option<Rc<dyn LocalSpawn>>,
    on_settle: Option<SettleHook>,
}

impl Engine {
    /// An engine without a custom spawner. On `wasm32` async tests run on
    /// the browser event loop; elsewhere they run when their pending handle
    /// is awaited.
    pub fn new() -> Self {
        Self {
            async_statuses: RefCell::new(HashMap::new()),
            spawner: default_spawner(),
            on_settle: None,
        }
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        path::set_cache_capacity(config.path_cache_capacity);
        if let Some(locale) = &config.locale {
            // Logged by set_locale; the previous locale stays active.
            let _ = messages::set_locale(locale);
        }
        Self::new()
    }

    /// Drive async tests on `spawner` (e.g. a `LocalPool` spawner).
    pub fn with_spawner(mut self, spawner: impl LocalSpawn + 'static) -> Self {
        self.spawner = Some(Rc::new(spawner));
        self
    }

    /// Called with the path of every async test that settles.
    pub fn on_settle(mut self, hook: impl Fn(&str) + 'static) -> Self {
        self.on_settle = Some(Rc::new(hook));
        self
    }

    /// Validate `value` against `schema`, starting at `settings.path` when
    /// set. An unreachable target path yields no statuses.
    pub fn validate(
        &self,
        schema: &dyn Declaration,
        value: &Value,
        settings: &ValidationSettings,
    ) -> StatusMap {
        match &settings.path {
            Some(path) => self.validate_at(schema, value, path, settings).unwrap_or_default(),
            None => self.validate_all(schema, value, settings),
        }
    }

    /// Validate the whole tree.
    pub fn validate_all(
        &self,
        schema: &dyn Declaration,
        value: &Value,
        settings: &ValidationSettings,
    ) -> StatusMap {
        self.validate_at(schema, value, &Path::root(), settings)
            .unwrap_or_default()
    }

    /// Validate the subtree at `path`. Returns `None` when the path cannot
    /// be followed through the schema and value.
    pub fn validate_at(
        &self,
        schema: &dyn Declaration,
        value: &Value,
        path: &Path,
        settings: &ValidationSettings,
    ) -> Option<StatusMap> {
        debug!(path = %path, kind = schema.kind(), "validation pass");
        let statuses = RefCell::new(StatusMap::new());
        let root = ValidationContext::new_root(self, schema.kind(), value, settings, &statuses);
        walk(&root, schema, path.segments(), false, &mut |ctx, decl| {
            decl.validate(ctx);
        })?;
        let statuses = statuses.into_inner();
        debug!(path = %path, statuses = statuses.len(), "validation pass done");
        Some(statuses)
    }

    /// `required`, `min` and `max` of the field at `settings.path`, resolved
    /// without validating. Missing values along the path are stepped
    /// through.
    pub fn constraints_at(
        &self,
        schema: &dyn Declaration,
        value: &Value,
        settings: &ValidationSettings,
    ) -> Option<ResolvedConstraints> {
        let statuses = RefCell::new(StatusMap::new());
        let root = ValidationContext::new_root(self, schema.kind(), value, settings, &statuses);
        let segments = settings.path.as_ref().map_or(&[][..], Path::segments);
        walk(&root, schema, segments, true, &mut |ctx, decl| {
            decl.resolve_constraints(ctx)
        })
    }

    /// Last known status of the async test at `path`: pending, settled, or
    /// `None` when it passed or never ran.
    pub fn async_status(&self, path: &str) -> Option<ValidationStatus> {
        self.async_statuses
            .borrow()
            .get(path)
            .and_then(|entry| entry.borrow().status.clone())
    }

    /// Forget every async result.
    pub fn clear_async(&self) {
        self.async_statuses.borrow_mut().clear();
    }

    pub(crate) fn async_entry(&self, path: &str) -> Option<SharedEntry> {
        self.async_statuses.borrow().get(path).cloned()
    }

    pub(crate) fn store_async(&self, path: String, entry: SharedEntry) {
        self.async_statuses.borrow_mut().insert(path, entry);
    }

    pub(crate) fn settle_hook(&self) -> Option<SettleHook> {
        self.on_settle.clone()
    }

    pub(crate) fn spawn(&self, handle: PendingHandle) {
        let Some(spawner) = &self.spawner else {
            return;
        };
        if let Err(err) = spawner.spawn_local(handle.map(|_| ())) {
            error!(%err, "async test not spawned, it will run when awaited");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("async_statuses", &self.async_statuses.borrow().len())
            .field("spawner", &self.spawner.is_some())
            .finish_non_exhaustive()
    }
}

/// Follow `segments` from `ctx`, then hand the target context to `visit`.
fn walk<R>(
    ctx: &ValidationContext<'_>,
    decl: &dyn Declaration,
    segments: &[Segment],
    nullish: bool,
    visit: &mut dyn FnMut(&ValidationContext<'_>, &dyn Declaration) -> R,
) -> Option<R> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(visit(ctx, decl));
    };
    let (child_decl, child_value) = decl.traverse(ctx, segment, nullish)?;
    let child = ctx.child(child_decl.kind(), child_value, segment.clone());
    walk(&child, &*child_decl, rest, nullish, visit)
}

#[cfg(target_arch = "wasm32")]
fn default_spawner() -> Option<Rc<dyn LocalSpawn>> {
    Some(Rc::new(WasmSpawner))
}

#[cfg(not(target_arch = "wasm32"))]
fn default_spawner() -> Option<Rc<dyn LocalSpawn>> {
    None
}

/// Runs async tests on the JavaScript event loop.
#[cfg(target_arch = "wasm32")]
struct WasmSpawner;

#[cfg(target_arch = "wasm32")]
impl LocalSpawn for WasmSpawner {
    fn spawn_local_obj(
        &self,
        future: futures::task::LocalFutureObj<'static, ()>,
    ) -> Result<(), futures::task::SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{number, string};
    use crate::registry::ClassSchema;
    use serde_json::json;

    fn person() -> Rc<ClassSchema> {
        ClassSchema::builder("Person")
            .field("name", string().required(true).min(2))
            .field("age", number().min(0.0))
            .build()
    }

    #[test]
    fn test_validate_all_collects_in_field_order() {
        let engine = Engine::new();
        let value = Value::from(json!({ "name": "A", "age": -1 }));
        let statuses = engine.validate_all(&person(), &value, &ValidationSettings::new());
        let keys: Vec<&str> = statuses.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "age"]);
    }

    #[test]
    fn test_validate_at_unknown_path() {
        let engine = Engine::new();
        let value = Value::from(json!({ "name": "A" }));
        let path = Path::parse("nickname").unwrap();
        assert!(engine
            .validate_at(&person(), &value, &path, &ValidationSettings::new())
            .is_none());
    }

    #[test]
    fn test_validate_at_only_visits_target() {
        let engine = Engine::new();
        let value = Value::from(json!({ "name": "A", "age": -1 }));
        let path = Path::parse("age").unwrap();
        let statuses = engine
            .validate_at(&person(), &value, &path, &ValidationSettings::new())
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["age"].code, "min");
    }

    #[test]
    fn test_constraints_at_steps_through_missing_values() {
        let engine = Engine::new();
        let settings = ValidationSettings::new().at(Path::parse("name").unwrap());
        let resolved = engine
            .constraints_at(&person(), &Value::Undefined, &settings)
            .unwrap();
        assert!(resolved.required);
        assert_eq!(resolved.min, Some(Value::Number(2.0)));
        assert_eq!(resolved.max, None);
    }

    #[test]
    fn test_engine_config_defaults() {
        let config: EngineConfig = serde_json::from_value(json!({ "locale": "fr-FR" })).unwrap();
        assert_eq!(config.locale.as_deref(), Some("fr-FR"));
        assert_eq!(config.path_cache_capacity, path::PathCache::DEFAULT_CAPACITY);
    }
}
