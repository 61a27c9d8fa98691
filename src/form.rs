//! Status store of a form.
//!
//! `FormValidation` keeps the status map of the last passes so that a form
//! can revalidate one field at a time, pull in async results as they
//! settle, and wait for every pending check before submitting.

use crate::context::ValidationSettings;
use crate::declaration::{DeclRef, Declaration, ResolvedConstraints};
use crate::engine::Engine;
use crate::path::{parse_cached, Path};
use crate::status::{Level, StatusMap, ValidationStatus};
use crate::value::Value;
use futures::future::join_all;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

pub struct FormValidation {
    engine: Engine,
    schema: DeclRef,
    settings: ValidationSettings,
    statuses: StatusMap,
}

impl FormValidation {
    pub fn new(engine: Engine, schema: impl Declaration + 'static) -> Self {
        Self {
            engine,
            schema: Rc::new(schema),
            settings: ValidationSettings::default(),
            statuses: StatusMap::new(),
        }
    }

    /// Base settings of every pass. Their `path` is ignored.
    pub fn with_settings(mut self, settings: ValidationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn statuses(&self) -> &StatusMap {
        &self.statuses
    }

    pub fn status(&self, path: &str) -> Option<&ValidationStatus> {
        self.statuses.get(path)
    }

    /// Statuses that block a submit: errors, and unavailable checks that
    /// carry a message.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationStatus> {
        self.statuses.values().filter(|status| match status.level {
            Level::Error => true,
            Level::Unavailable => !status.message.is_empty(),
            _ => false,
        })
    }

    /// Full pass. Replaces every status and returns the new map.
    pub fn validate(&mut self, value: &Value) -> &StatusMap {
        let settings = ValidationSettings {
            path: None,
            ..self.settings.clone()
        };
        self.statuses = self.engine.validate_all(&*self.schema, value, &settings);
        &self.statuses
    }

    /// Revalidate the subtree at `path`, replacing its statuses and leaving
    /// every other one in place. Returns whether the map changed.
    pub fn validate_at(&mut self, value: &Value, path: &Path) -> bool {
        let settings = ValidationSettings {
            path: Some(path.clone()),
            ..self.settings.clone()
        };
        let before = self.statuses.clone();
        self.statuses.retain(|key, _| !is_under(key, path));
        if let Some(statuses) = self.engine.validate_at(&*self.schema, value, path, &settings) {
            self.statuses.extend(statuses);
        }
        let changed = !same_statuses(&before, &self.statuses);
        debug!(path = %path, changed, "field revalidated");
        changed
    }

    /// Copy the engine's last known async status at `path` into the map. A
    /// test that passed removes the stale pending status.
    pub fn update_async_status(&mut self, path: &str) -> bool {
        match self.engine.async_status(path) {
            Some(status) => {
                let changed = self.statuses.get(path) != Some(&status);
                self.statuses.insert(status.path.clone(), status);
                changed
            }
            None => match self.statuses.get(path) {
                Some(status) if status.is_pending() => {
                    self.statuses.shift_remove(path);
                    true
                }
                _ => false,
            },
        }
    }

    /// Wait for every pending async status and merge the outcomes. Returns
    /// whether the form is free of errors afterwards.
    pub async fn settle_pending(&mut self) -> bool {
        let pending: Vec<_> = self
            .statuses
            .values()
            .filter_map(|status| Some((status.path.clone(), status.pending()?.clone())))
            .collect();
        let (paths, handles): (Vec<String>, Vec<_>) = pending.into_iter().unzip();
        let settled = join_all(handles).await;
        for (path, status) in paths.into_iter().zip(settled) {
            match status {
                Some(status) => {
                    self.statuses.insert(path, status);
                }
                None => {
                    self.statuses.shift_remove(&path);
                }
            }
        }
        self.errors().next().is_none()
    }

    /// Whether no error is recorded at `path` or below it.
    pub fn is_valid_at(&self, path: &Path) -> bool {
        !self
            .statuses
            .iter()
            .any(|(key, status)| status.level == Level::Error && is_under(key, path))
    }

    pub fn constraints_at(&self, value: &Value, path: &Path) -> Option<ResolvedConstraints> {
        let settings = ValidationSettings {
            path: Some(path.clone()),
            skip_async: true,
            ..self.settings.clone()
        };
        self.engine.constraints_at(&*self.schema, value, &settings)
    }
}

impl fmt::Debug for FormValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormValidation")
            .field("schema", &self.schema.kind())
            .field("settings", &self.settings)
            .field("statuses", &self.statuses.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn is_under(key: &str, path: &Path) -> bool {
    parse_cached(key).is_ok_and(|key| key.starts_with(path))
}

/// Same paths, codes, levels and messages, in any order.
/// Equal statuses under the same keys, in any order. A status whose value
/// changed counts as changed even when its message did not.
fn same_statuses(a: &StatusMap, b: &StatusMap) -> bool {
    a.len() == b.len() && a.iter().all(|(path, status)| b.get(path) == Some(status))
}
