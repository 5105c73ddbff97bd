//! Conversions between [`JsValue`] and [`serde_json::Value`], plus small reflection helpers.

use js_sys::{Reflect, JSON};
use serde_json::{Number, Value};
use wasm_bindgen::{JsCast, JsValue};

/// Largest integer magnitude an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Converts a JavaScript value into JSON. Values JSON can't represent (functions, symbols, cycles) become `null`.
pub(crate) fn to_json(value: &JsValue) -> Value {
	if value.is_undefined() || value.is_null() {
		return Value::Null;
	}
	if let Some(boolean) = value.as_bool() {
		return Value::Bool(boolean);
	}
	if let Some(number) = value.as_f64() {
		return number_to_json(number);
	}
	if let Some(string) = value.as_string() {
		return Value::String(string);
	}
	JSON::stringify(value)
		.ok()
		.and_then(|json| json.as_string())
		.and_then(|json| serde_json::from_str(&json).ok())
		.unwrap_or(Value::Null)
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_json(number: f64) -> Value {
	if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
		Value::from(number as i64)
	} else {
		Number::from_f64(number).map_or(Value::Null, Value::Number)
	}
}

/// Converts JSON into a JavaScript value.
pub(crate) fn from_json(value: &Value) -> JsValue {
	match value {
		Value::Null => JsValue::NULL,
		Value::Bool(boolean) => JsValue::from_bool(*boolean),
		Value::Number(number) => number.as_f64().map_or(JsValue::NULL, JsValue::from_f64),
		Value::String(string) => JsValue::from_str(string),
		Value::Array(_) | Value::Object(_) => JSON::parse(&value.to_string()).unwrap_or(JsValue::NULL),
	}
}

/// Reads `target[key]`, treating reflection failures and `undefined` alike.
pub(crate) fn get(target: &JsValue, key: &str) -> Option<JsValue> {
	Reflect::get(target, &JsValue::from_str(key)).ok().filter(|value| !value.is_undefined())
}

/// Assigns `value` at the dotted `path` below `target`, e.g. `style.backgroundColor`.
pub(crate) fn set_path(target: &JsValue, path: &str, value: &JsValue) -> Result<(), JsValue> {
	let mut segments = path.split('.').filter(|segment| !segment.is_empty()).peekable();
	let mut current = target.clone();
	while let Some(segment) = segments.next() {
		if segments.peek().is_none() {
			return Reflect::set(&current, &JsValue::from_str(segment), value).map(drop);
		}
		current = Reflect::get(&current, &JsValue::from_str(segment))?;
		if !current.is_object() {
			return Err(JsValue::from_str(&format!("`{}` is not an object in property path `{}`", segment, path)));
		}
	}
	Err(JsValue::from_str("empty property path"))
}

/// Best-effort human-readable description of a thrown value.
pub(crate) fn error_message(error: &JsValue) -> String {
	if let Some(error) = error.dyn_ref::<js_sys::Error>() {
		return String::from(error.message());
	}
	error.as_string().unwrap_or_else(|| format!("{:?}", error))
}

/// Builds `[name='value']`, escaping `value` for a quoted CSS string.
pub(crate) fn attribute_selector(name: &str, value: &str) -> String {
	let mut selector = String::with_capacity(name.len() + value.len() + 6);
	selector.push('[');
	selector.push_str(name);
	selector.push_str("='");
	for c in value.chars() {
		match c {
			'\'' | '\\' => {
				selector.push('\\');
				selector.push(c);
			}
			'\n' => selector.push_str("\\a "),
			c => selector.push(c),
		}
	}
	selector.push_str("']");
	selector
}
