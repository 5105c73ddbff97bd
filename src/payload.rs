//! The structured data sent to the server along with each remote call.

use crate::{js, load, marker::ensure_marker};
use serde_json::{Map, Value};
use std::rc::Rc;
use web_sys::{Element, Event};

/// Event properties copied into a payload's `event` field, where present.
const EVENT_FIELDS: &[&str] = &[
	"type", "altKey", "ctrlKey", "metaKey", "shiftKey", "key", "keyCode", "which", "data", "button", "clientX", "clientY", "offsetX", "offsetY", "pageX", "pageY", "screenX", "screenY",
];

/// Adds fields to every outgoing payload.
///
/// The sender and event are absent for calls issued through [`Runtime::invoke`](`crate::Runtime::invoke`).
pub type Contributor = Rc<dyn Fn(Option<&Element>, Option<&Event>) -> Map<String, Value>>;

/// Builds the payload for `element`, then applies all `contributors` in order.
pub fn build_payload(element: &Element, event: Option<&Event>, contributors: &[Contributor]) -> Map<String, Value> {
	let mut payload = base_payload(element, event);
	apply_contributors(&mut payload, contributors, Some(element), event);
	payload
}

/// Merges each contributor's fields into `payload`. Later contributors overwrite earlier keys.
pub fn apply_contributors(payload: &mut Map<String, Value>, contributors: &[Contributor], sender: Option<&Element>, event: Option<&Event>) {
	for contributor in contributors {
		merge(payload, contributor(sender, event));
	}
}

/// Shallow merge, `fields` winning on conflicts.
pub fn merge(payload: &mut Map<String, Value>, fields: Map<String, Value>) {
	for (key, value) in fields {
		payload.insert(key, value);
	}
}

fn base_payload(element: &Element, event: Option<&Event>) -> Map<String, Value> {
	let marker = ensure_marker(element);
	let attribute = |name: &str| element.get_attribute(name).map_or(Value::Null, Value::String);

	let mut payload = Map::new();
	payload.insert("id".to_owned(), attribute("id"));
	payload.insert("name".to_owned(), attribute("name"));
	payload.insert("class".to_owned(), attribute("class"));
	payload.insert("classes".to_owned(), Value::Array(load::load_classes(element)));
	payload.insert("text".to_owned(), Value::String(load::load_text(element)));
	payload.insert("html".to_owned(), Value::String(element.inner_html()));
	payload.insert("value".to_owned(), load::load_value(element));
	payload.insert("dataset".to_owned(), Value::Object(load::load_dataset(element)));
	payload.insert("marker".to_owned(), Value::String(marker));

	if let Some(event) = event {
		payload.insert("event".to_owned(), Value::Object(event_payload(event)));
	}

	if let Ok(Some(form)) = element.closest("form") {
		payload.insert("form".to_owned(), Value::Object(load::load_form_values(&form)));
	}

	payload
}

fn event_payload(event: &Event) -> Map<String, Value> {
	EVENT_FIELDS.iter().filter_map(|&field| js::get(event, field).map(|value| (field.to_owned(), js::to_json(&value)))).collect()
}
