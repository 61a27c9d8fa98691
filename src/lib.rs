use wasm_bindgen::prelude::*;

pub mod bindings;
pub mod constraint;
pub mod context;
pub mod declaration;
pub mod engine;
pub mod error;
pub mod form;
pub mod messages;
pub mod path;
pub mod primitives;
pub mod registry;
pub mod status;
pub mod structural;
pub mod value;

// Re-export the schema building surface
pub use async_test::AsyncTest;
pub use constraint::{Constraint, ConstraintValue, Message, TestResult};
pub use context::{FormHandle, Group, ValidationContext, ValidationSettings};
pub use declaration::{DeclRef, Declaration, Field, KindConstraints, ResolvedConstraints};
pub use primitives::{boolean, date, email, file, ignored, number, string, time};
pub use registry::ClassSchema;
pub use structural::{array, instance};

// Re-export the validation surface
pub use engine::{Engine, EngineConfig};
pub use error::{LocaleError, PathError, TestError};
pub use form::FormValidation;
pub use path::{Path, Segment};
pub use status::{Level, StatusMap, ValidationStatus};
pub use value::Value;

/// Returns the WASM module version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.1.0");
    }
}
