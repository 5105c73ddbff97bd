//! Reading live DOM state into plain Rust values.

use crate::js;
use serde_json::{Map, Value};
use tracing::error;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Attr, Element, HtmlElement, HtmlInputElement, HtmlOptionElement, HtmlSelectElement, HtmlTextAreaElement, NamedNodeMap, NodeList};

/// Form controls whose values are collected into the `form` field of a payload.
const FORM_CONTROLS: &str = "input, textarea, select";

pub fn load_attributes(element: &Element) -> Vec<(String, String)> {
	load_attribute_map(&element.attributes())
}

pub fn load_attribute_map(attributes: &NamedNodeMap) -> Vec<(String, String)> {
	(0..attributes.length()).filter_map(|i| attributes.item(i)).map(|attribute| load_attribute(&attribute)).collect()
}

pub fn load_attribute(attribute: &Attr) -> (String, String) {
	(attribute.name(), attribute.value())
}

/// Collects the [`Element`]s of a [`NodeList`], skipping anything else.
pub fn load_elements(nodes: &NodeList) -> Vec<Element> {
	(0..nodes.length()).filter_map(|i| nodes.item(i)).filter_map(|node| node.dyn_into::<Element>().ok()).collect()
}

/// [`Element::query_selector_all`], logging instead of failing on invalid selectors.
pub fn select_all(scope: &Element, selector: &str) -> Vec<Element> {
	match scope.query_selector_all(selector) {
		Ok(nodes) => load_elements(&nodes),
		Err(error) => {
			error!("Invalid selector {:?}: {:?}", selector, error);
			Vec::new()
		}
	}
}

/// The element's `data-*` attributes, keyed like [***HTMLElement.dataset***](https://developer.mozilla.org/en-US/docs/Web/API/HTMLElement/dataset).
pub fn load_dataset(element: &Element) -> Map<String, Value> {
	load_attributes(element)
		.into_iter()
		.filter_map(|(name, value)| name.strip_prefix("data-").map(|key| (camel_case(key), Value::String(value))))
		.collect()
}

/// The live `value` property, for any element that has one.
pub fn load_value(element: &Element) -> Value {
	js::get(element, "value").map_or(Value::Null, |value| js::to_json(&value))
}

pub fn load_text(element: &Element) -> String {
	match element.dyn_ref::<HtmlElement>() {
		Some(html_element) => html_element.inner_text(),
		None => element.text_content().unwrap_or_default(),
	}
}

pub fn load_classes(element: &Element) -> Vec<Value> {
	let class_list = element.class_list();
	(0..class_list.length()).filter_map(|i| class_list.item(i)).map(Value::String).collect()
}

/// Flattens the current values of every named control in `form`.
///
/// Radio buttons and checkboxes contribute only while checked, multi-selects contribute an array of the selected values.
/// Controls without `name` fall back to their `id`, and are skipped if they have neither.
pub fn load_form_values(form: &Element) -> Map<String, Value> {
	let mut values = Map::new();
	for control in select_all(form, FORM_CONTROLS) {
		let key = control.get_attribute("name").filter(|name| !name.is_empty()).or_else(|| Some(control.id()).filter(|id| !id.is_empty()));
		let key = match key {
			Some(key) => key,
			None => continue,
		};

		if let Some(input) = control.dyn_ref::<HtmlInputElement>() {
			match input.type_().as_str() {
				"radio" | "checkbox" => {
					if input.checked() {
						values.insert(key, Value::String(input.value()));
					}
				}
				_ => {
					values.insert(key, Value::String(input.value()));
				}
			}
		} else if let Some(select) = control.dyn_ref::<HtmlSelectElement>() {
			if select.multiple() {
				let selected = select.selected_options();
				let options = (0..selected.length())
					.filter_map(|i| selected.item(i))
					.filter_map(|option| option.dyn_into::<HtmlOptionElement>().ok())
					.map(|option| Value::String(option.value()))
					.collect();
				values.insert(key, Value::Array(options));
			} else {
				values.insert(key, Value::String(select.value()));
			}
		} else if let Some(text_area) = control.dyn_ref::<HtmlTextAreaElement>() {
			values.insert(key, Value::String(text_area.value()));
		}
	}
	values
}

pub fn is_disabled(element: &Element) -> bool {
	js::get(element, "disabled").and_then(|disabled| disabled.as_bool()).unwrap_or(false)
}

pub fn set_disabled(element: &Element, disabled: bool) {
	if let Err(error) = js_sys::Reflect::set(element, &JsValue::from_str("disabled"), &JsValue::from_bool(disabled)) {
		error!("Failed to set `disabled`: {:?}", error);
	}
}

/// Converts a dash-separated attribute suffix to camel case, the way `data-*` keys are converted.
///
/// A dash followed by an ASCII lowercase letter is dropped and the letter upper-cased; everything else is kept.
pub fn camel_case(name: &str) -> String {
	let mut converted = String::with_capacity(name.len());
	let mut chars = name.chars().peekable();
	while let Some(c) = chars.next() {
		match (c, chars.peek()) {
			('-', Some(next)) if next.is_ascii_lowercase() => {
				converted.push(next.to_ascii_uppercase());
				chars.next();
			}
			(c, _) => converted.push(c),
		}
	}
	converted
}
