//! JavaScript entry points.
//!
//! Schemas are built in Rust, so only the stateless parts of the core are
//! exported: the path language and the message registry.

use crate::messages;
use crate::path::{Path, Segment};
use crate::status::Level;
use crate::value::Value;
use wasm_bindgen::prelude::*;

/// Parse a path string into an array of keys and indices.
#[wasm_bindgen(js_name = parsePath)]
pub fn parse_path(path: &str) -> Result<JsValue, JsValue> {
    let path = Path::parse(path)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse path: {}", e)))?;
    serde_wasm_bindgen::to_value(path.segments())
        .map_err(|e| JsValue::from_str(&format!("Failed to convert path: {}", e)))
}

/// Serialize an array of keys and indices into a path string.
#[wasm_bindgen(js_name = serializePath)]
pub fn serialize_path(segments: JsValue) -> Result<String, JsValue> {
    let segments: Vec<Segment> = serde_wasm_bindgen::from_value(segments)
        .map_err(|e| JsValue::from_str(&format!("Failed to read segments: {}", e)))?;
    Ok(Path::from(segments).to_string())
}

#[wasm_bindgen(js_name = getLocale)]
pub fn get_locale() -> String {
    messages::get_locale()
}

/// Switch the message locale. Throws when no provider is registered for it.
#[wasm_bindgen(js_name = setLocale)]
pub fn set_locale(locale: &str) -> Result<(), JsValue> {
    messages::set_locale(locale).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen(js_name = availableLocales)]
pub fn available_locales() -> Vec<String> {
    messages::available_locales()
}

/// Default error message of `kind.code` for a constraint value, in the
/// current locale.
#[wasm_bindgen(js_name = defaultMessage)]
pub fn default_message(kind: &str, code: &str, constraint: JsValue) -> Result<String, JsValue> {
    let constraint: serde_json::Value = serde_wasm_bindgen::from_value(constraint)
        .map_err(|e| JsValue::from_str(&format!("Failed to read constraint: {}", e)))?;
    Ok(messages::resolve_message(
        kind,
        code,
        &Value::from(constraint),
        None,
        Level::Error,
    ))
}
