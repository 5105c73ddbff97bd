//! Selector-addressed element commands: property queries, property updates and HTML insertion.
//!
//! Unlike [patches](`crate::patch`), these address elements by CSS selector.
//! Query results are keyed by an address the server can use in later selectors:
//! `#id` where the element has an id, otherwise its [node marker](`attr::MARKER`) selector.

use crate::{
	config::attr,
	js,
	load::{load_attributes, load_classes, load_dataset, load_text, load_value, select_all},
	marker::ensure_marker,
	patch::push_unique,
	runtime::Runtime,
};
use js_sys::Reflect;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, instrument, trace};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlElement, HtmlOptionElement, HtmlSelectElement};

/// Where [`Runtime::insert_html`] puts new content relative to each target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
	BeforeBegin,
	AfterBegin,
	BeforeEnd,
	AfterEnd,
}

impl InsertPosition {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			InsertPosition::BeforeBegin => "beforebegin",
			InsertPosition::AfterBegin => "afterbegin",
			InsertPosition::BeforeEnd => "beforeend",
			InsertPosition::AfterEnd => "afterend",
		}
	}

	/// Whether the new content ends up inside the target rather than next to it.
	#[must_use]
	pub fn is_inside(self) -> bool {
		matches!(self, InsertPosition::AfterBegin | InsertPosition::BeforeEnd)
	}
}

/// Inbound `query` message. Answered with `{"ok": [sender, results]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
	pub selector: String,
	/// Empty for a default set of properties.
	#[serde(default)]
	pub properties: Vec<String>,
	#[serde(default)]
	pub sender: Value,
}

/// Inbound `set_prop` message. Answered with `{"ok": [sender, count]}` iff `sender` is present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetPropRequest {
	pub selector: String,
	pub properties: Map<String, Value>,
	#[serde(default)]
	pub sender: Option<Value>,
}

/// Inbound `insert_html` message. Answered with `{"ok": [sender, count]}` iff `sender` is present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InsertHtmlRequest {
	pub selector: String,
	pub position: InsertPosition,
	pub html: String,
	#[serde(default)]
	pub sender: Option<Value>,
}

/// Selector under which query results report `element`, attaching a marker if it has no id.
fn address(element: &Element) -> String {
	let id = element.id();
	if id.is_empty() {
		js::attribute_selector(attr::MARKER, &ensure_marker(element))
	} else {
		format!("#{}", id)
	}
}

fn load_style(element: &Element) -> Map<String, Value> {
	let style = match element.dyn_ref::<HtmlElement>() {
		Some(html_element) => html_element.style(),
		None => return Map::new(),
	};
	(0..style.length())
		.map(|i| style.item(i))
		.filter_map(|name| style.get_property_value(&name).ok().filter(|value| !value.is_empty()).map(|value| (name, Value::String(value))))
		.collect()
}

/// A `<select>`'s options as `value → text`. [`None`] for other elements.
fn load_options(element: &Element) -> Option<Map<String, Value>> {
	element.dyn_ref::<HtmlSelectElement>()?;
	Some(
		select_all(element, "option")
			.into_iter()
			.filter_map(|option| option.dyn_into::<HtmlOptionElement>().ok())
			.map(|option| (option.value(), Value::String(option.text())))
			.collect(),
	)
}

fn load_property(element: &Element, property: &str) -> Value {
	match property {
		"attributes" => Value::Object(load_attributes(element).into_iter().map(|(name, value)| (name, Value::String(value))).collect()),
		"style" => Value::Object(load_style(element)),
		"classList" => Value::Array(load_classes(element)),
		"dataset" => Value::Object(load_dataset(element)),
		"options" => match load_options(element) {
			Some(options) => Value::Object(options),
			None => js::get(element, property).map_or(Value::Null, |value| js::to_json(&value)),
		},
		_ => js::get(element, property).map_or(Value::Null, |value| js::to_json(&value)),
	}
}

fn default_properties(element: &Element) -> Map<String, Value> {
	let mut properties = Map::new();
	properties.insert("marker".to_owned(), element.get_attribute(attr::MARKER).map_or(Value::Null, Value::String));
	properties.insert("id".to_owned(), Value::String(element.id()));
	properties.insert("tagName".to_owned(), Value::String(element.tag_name()));
	properties.insert("className".to_owned(), Value::String(element.class_name()));
	properties.insert("name".to_owned(), load_property(element, "name"));
	properties.insert("value".to_owned(), load_value(element));
	properties.insert("innerHTML".to_owned(), Value::String(element.inner_html()));
	properties.insert("innerText".to_owned(), Value::String(load_text(element)));
	for property in ["attributes", "classList", "dataset", "style"] {
		properties.insert(property.to_owned(), load_property(element, property));
	}
	properties
}

fn stringify(value: &Value) -> String {
	match value {
		Value::String(string) => string.clone(),
		other => other.to_string(),
	}
}

/// Assigns each entry of `entries` as a property of `element[property]`, like `style` or `dataset`.
fn assign_each(element: &Element, property: &str, entries: &Value) {
	let (target, entries) = match (js::get(element, property), entries.as_object()) {
		(Some(target), Some(entries)) => (target, entries),
		_ => return error!("Can't assign entries to `{}`.", property),
	};
	for (key, value) in entries {
		if let Err(error) = Reflect::set(&target, &JsValue::from_str(key), &JsValue::from_str(&stringify(value))) {
			error!("Failed to set `{}.{}`: {}", property, key, js::error_message(&error));
		}
	}
}

fn replace_options(element: &Element, options: &Value) -> bool {
	let (select, options) = match (element.dyn_ref::<HtmlSelectElement>(), options.as_object()) {
		(Some(select), Some(options)) => (select, options),
		_ => return false,
	};
	let document = match element.owner_document() {
		Some(document) => document,
		None => return false,
	};
	select.set_length(0);
	for (value, text) in options {
		match document.create_element("option").map(|option| option.unchecked_into::<HtmlOptionElement>()) {
			Ok(option) => {
				option.set_value(value);
				option.set_text(&stringify(text));
				if let Err(error) = select.append_child(&option) {
					error!("Failed to add option: {}", js::error_message(&error));
				}
			}
			Err(error) => error!("Failed to create option: {}", js::error_message(&error)),
		}
	}
	true
}

impl Runtime {
	/// Reads `properties` of every element matching `selector`, keyed by each element's address.
	///
	/// With no `properties`, a default set is read: marker, id, tag and class names, name, value,
	/// inner HTML and text, attributes, class list, dataset and inline style.
	#[instrument(skip(self, properties))]
	pub fn query(&self, selector: &str, properties: &[String]) -> Map<String, Value> {
		let mut results = Map::new();
		for element in self.select(selector) {
			let address = address(&element);
			let values = if properties.is_empty() {
				default_properties(&element)
			} else {
				properties.iter().map(|property| (property.clone(), load_property(&element, property))).collect()
			};
			results.insert(address, Value::Object(values));
		}
		trace!(count = results.len(), "Queried elements.");
		results
	}

	/// Updates every element matching `selector`. Returns how many elements matched.
	///
	/// `attributes`, `style` and `dataset` take maps that are assigned entry by entry.
	/// `innerHTML` and `outerHTML` replace content and bind whatever it declares,
	/// `options` replaces a `<select>`'s options from a `value → text` map,
	/// and any other key is assigned as a (dotted) property path.
	#[instrument(skip(self, properties))]
	pub fn set_prop(&self, selector: &str, properties: &Map<String, Value>) -> usize {
		let elements = self.select(selector);
		for element in &elements {
			for (property, value) in properties {
				match property.as_str() {
					"attributes" => match value.as_object() {
						Some(attributes) => {
							for (name, value) in attributes {
								if let Err(error) = element.set_attribute(name, &stringify(value)) {
									error!("Failed to set attribute `{}`: {}", name, js::error_message(&error));
								}
							}
						}
						None => error!("`attributes` must be a map."),
					},
					"style" | "dataset" => assign_each(element, property, value),
					"innerHTML" => {
						element.set_inner_html(&stringify(value));
						self.content_replaced(element);
					}
					"outerHTML" => {
						let parent = element.parent_element();
						element.set_outer_html(&stringify(value));
						match parent {
							Some(parent) => self.content_replaced(&parent),
							None => error!("Replaced an element without parent; its new content stays unbound."),
						}
					}
					"options" if replace_options(element, value) => (),
					_ => {
						if let Err(error) = js::set_path(element, property, &js::from_json(value)) {
							error!("Failed to set property `{}`: {}", property, js::error_message(&error));
						}
					}
				}
			}
		}
		elements.len()
	}

	/// Inserts `html` at `position` relative to every element matching `selector`, then binds the new content.
	/// Returns how many elements matched.
	#[instrument(skip(self, html))]
	pub fn insert_html(&self, selector: &str, position: InsertPosition, html: &str) -> usize {
		let targets = self.select(selector);
		let mut scopes = Vec::new();
		for target in &targets {
			if let Err(error) = target.insert_adjacent_html(position.as_str(), html) {
				error!("Failed to insert HTML: {}", js::error_message(&error));
				continue;
			}
			let scope = if position.is_inside() { Some(target.clone()) } else { target.parent_element() };
			match scope {
				Some(scope) => push_unique(&mut scopes, scope),
				None => error!("Inserted next to an element without parent; the new content stays unbound."),
			}
		}
		for scope in &scopes {
			self.content_replaced(scope);
		}
		targets.len()
	}

	pub(crate) fn handle_query(&self, request: QueryRequest) {
		let results = self.query(&request.selector, &request.properties);
		self.push("query", json!({ "ok": [request.sender, results] }));
	}

	pub(crate) fn handle_set_prop(&self, request: SetPropRequest) {
		let count = self.set_prop(&request.selector, &request.properties);
		if let Some(sender) = request.sender {
			self.push("set_prop", json!({ "ok": [sender, count] }));
		}
	}

	pub(crate) fn handle_insert_html(&self, request: InsertHtmlRequest) {
		let count = self.insert_html(&request.selector, request.position, &request.html);
		if let Some(sender) = request.sender {
			self.push("insert_html", json!({ "ok": [sender, count] }));
		}
	}
}
