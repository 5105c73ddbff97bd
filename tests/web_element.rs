#![cfg(target_arch = "wasm32")]

use serde_json::{json, Map, Value};
use tether_dom::{config::attr, InsertPosition};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::HtmlSelectElement;

wasm_bindgen_test_configure!(run_in_browser);

use web_transport_::{by_id, connected, page};

fn object(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		_ => unreachable!(),
	}
}

#[wasm_bindgen_test]
fn query_addresses_by_id_or_marker() {
	let document = page(
		r#"<li id="first" class="row" data-pos="1">One</li>
		<li class="row" data-pos="2">Two</li>"#,
	);
	let (runtime, _) = connected(&document);

	let results = runtime.query(".row", &["dataset".to_owned(), "innerHTML".to_owned()]);

	assert_eq!(results.len(), 2);
	assert_eq!(results["#first"], json!({"dataset": {"pos": "1"}, "innerHTML": "One"}));
	let (address, second) = results.iter().find(|(address, _)| *address != "#first").unwrap();
	assert!(address.starts_with(&format!("[{}='", attr::MARKER)));
	assert_eq!(second["innerHTML"], json!("Two"));
	assert_eq!(runtime.query(address, &[]).len(), 1);
}

#[wasm_bindgen_test]
fn query_defaults_and_special_properties() {
	let document = page(
		r#"<input id="name" name="who" class="big" style="color: red" value="Ada">
		<select id="size"><option value="s">Small</option><option value="m">Medium</option></select>"#,
	);
	let (runtime, _) = connected(&document);

	let name = &runtime.query("#name", &[])["#name"];
	assert_eq!(name["tagName"], json!("INPUT"));
	assert_eq!(name["name"], json!("who"));
	assert_eq!(name["value"], json!("Ada"));
	assert_eq!(name["classList"], json!(["big"]));
	assert_eq!(name["style"], json!({"color": "red"}));
	assert_eq!(name["attributes"]["name"], json!("who"));

	let size = runtime.query("#size", &["options".to_owned(), "onclick".to_owned()]);
	assert_eq!(size["#size"], json!({"options": {"s": "Small", "m": "Medium"}, "onclick": null}));
}

#[wasm_bindgen_test]
fn set_prop_updates_maps_and_paths() {
	let document = page(
		r#"<div id="a" class="box"></div>
		<div id="b" class="box"></div>
		<select id="size"><option value="x">X</option></select>"#,
	);
	let (runtime, _) = connected(&document);

	let count = runtime.set_prop(
		".box",
		&object(json!({
			"attributes": {"aria-busy": "true", "tabindex": 0},
			"style": {"color": "blue"},
			"dataset": {"userId": 5},
			"title": "Boxed",
		})),
	);
	assert_eq!(count, 2);
	for id in ["a", "b"] {
		let element = by_id(&document, id);
		assert_eq!(element.get_attribute("aria-busy").as_deref(), Some("true"));
		assert_eq!(element.get_attribute("tabindex").as_deref(), Some("0"));
		assert_eq!(element.get_attribute("data-user-id").as_deref(), Some("5"));
		assert_eq!(element.style().get_property_value("color").unwrap(), "blue");
		assert_eq!(element.title(), "Boxed");
	}

	runtime.set_prop("#size", &object(json!({"options": {"s": "Small", "l": "Large"}})));
	let size = by_id(&document, "size").unchecked_into::<HtmlSelectElement>();
	assert_eq!(size.length(), 2);
	assert_eq!(runtime.query("#size", &["options".to_owned()])["#size"]["options"], json!({"s": "Small", "l": "Large"}));

	assert_eq!(runtime.set_prop(".missing", &object(json!({"title": "x"}))), 0);
}

#[wasm_bindgen_test]
fn set_prop_html_binds_new_content() {
	let document = page(
		r#"<div id="inner"></div>
		<div id="wrapper"><p id="outer">Old</p></div>"#,
	);
	let (runtime, transport) = connected(&document);

	runtime.set_prop("#inner", &object(json!({"innerHTML": r#"<button id="one" tether-click="one">1</button>"#})));
	runtime.set_prop("#outer", &object(json!({"outerHTML": r#"<button id="two" tether-click="two">2</button>"#})));

	assert!(document.get_element_by_id("outer").is_none());
	by_id(&document, "one").click();
	by_id(&document, "two").click();
	let handlers: Vec<Value> = transport.take_named("event").into_iter().map(|call| call["handler"].clone()).collect();
	assert_eq!(handlers, vec![json!("one"), json!("two")]);
}

#[wasm_bindgen_test]
fn insert_html_binds_inserted_content() {
	let document = page(r#"<ul id="list"><li id="only">Only</li></ul>"#);
	let (runtime, transport) = connected(&document);

	assert_eq!(runtime.insert_html("#list", InsertPosition::BeforeEnd, r#"<li><button id="last" tether-click="last">Last</button></li>"#), 1);
	assert_eq!(runtime.insert_html("#only", InsertPosition::BeforeBegin, r#"<li><button id="first" tether-click="first">First</button></li>"#), 1);

	assert_eq!(by_id(&document, "list").children().length(), 3);
	by_id(&document, "first").click();
	by_id(&document, "last").click();
	let handlers: Vec<Value> = transport.take_named("event").into_iter().map(|call| call["handler"].clone()).collect();
	assert_eq!(handlers, vec![json!("first"), json!("last")]);
}

#[wasm_bindgen_test]
fn marked_scripts_run_when_inserted() {
	let document = page(r#"<div id="slot"></div>"#);
	let (runtime, _) = connected(&document);
	let read = || js_sys::eval("window.__tetherInlineRuns || 0").unwrap().as_f64().unwrap();
	let before = read();
	let html = r#"<script tether-script>window.__tetherInlineRuns = (window.__tetherInlineRuns || 0) + 1</script>
		<script>window.__tetherInlineRuns = 100</script>"#;

	runtime.insert_html("#slot", InsertPosition::AfterBegin, html);
	assert_eq!(read(), before + 1.0);

	runtime.set_prop("#slot", &object(json!({"innerHTML": html})));
	assert_eq!(read(), before + 2.0);
}

#[wasm_bindgen_test]
fn element_messages_reply_to_their_sender() {
	let document = page(r#"<p id="p" title="Hi">Text</p>"#);
	let (runtime, transport) = connected(&document);

	runtime.receive("query", json!({"selector": "#p", "properties": ["title"], "sender": "pid-1"}));
	runtime.receive("set_prop", json!({"selector": "#p", "properties": {"title": "Bye"}, "sender": "pid-2"}));
	runtime.receive("set_prop", json!({"selector": "#p", "properties": {"hidden": true}}));
	runtime.receive("insert_html", json!({"selector": "#p", "position": "afterend", "html": "<p>More</p>", "sender": "pid-3"}));
	runtime.receive("insert_html", json!({"selector": "#p", "position": "sideways", "html": "<p>Lost</p>", "sender": "pid-4"}));

	assert_eq!(
		transport.take(),
		vec![
			("query".to_owned(), json!({"ok": ["pid-1", {"#p": {"title": "Hi"}}]})),
			("set_prop".to_owned(), json!({"ok": ["pid-2", 1]})),
			("insert_html".to_owned(), json!({"ok": ["pid-3", 1]})),
		]
	);
	assert_eq!(by_id(&document, "p").title(), "Bye");
	assert!(by_id(&document, "p").hidden());
	assert_eq!(document.body().unwrap().children().length(), 2);
}
