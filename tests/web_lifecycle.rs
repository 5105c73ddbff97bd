#![cfg(target_arch = "wasm32")]

use serde_json::json;
use std::{cell::Cell, rc::Rc};
use tether_dom::{Config, ConnectionState};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::HtmlButtonElement;

wasm_bindgen_test_configure!(run_in_browser);

use web_transport_::{by_id, connected, page, runtime, runtime_with};

fn disabled(document: &web_sys::Document, id: &str) -> bool {
	by_id(document, id).unchecked_into::<HtmlButtonElement>().disabled()
}

#[wasm_bindgen_test]
fn disconnect_disables_and_reconnect_restores() {
	let document = page(
		r#"<button id="on" tether-click="a">A</button>
		<button id="off" tether-click="b" disabled>B</button>
		<button id="plain">C</button>"#,
	);
	let (runtime, transport) = runtime(&document);

	runtime.connect();
	assert_eq!(runtime.state(), ConnectionState::Connecting);
	assert_eq!(transport.joins(), 1);
	assert!(disabled(&document, "on"));
	assert!(disabled(&document, "off"));

	runtime.joined(json!({}));
	assert_eq!(runtime.state(), ConnectionState::Connected);
	assert!(!disabled(&document, "on"));
	assert!(disabled(&document, "off"));

	runtime.closed();
	assert_eq!(runtime.state(), ConnectionState::Disconnected);
	assert!(disabled(&document, "on"));
	assert!(disabled(&document, "off"));
	assert!(!disabled(&document, "plain"));

	runtime.joined(json!({}));
	assert!(!disabled(&document, "on"));
	assert!(disabled(&document, "off"));
}

#[wasm_bindgen_test]
fn controls_stay_enabled_if_so_configured() {
	let document = page(r#"<button id="on" tether-click="a">A</button>"#);
	let config = Config::from_json(r#"{"disable_controls_when_disconnected": false}"#).unwrap();
	let (runtime, _) = runtime_with(&document, config);

	runtime.connect();
	assert!(!disabled(&document, "on"));
	runtime.joined(json!({}));
	runtime.closed();
	assert!(!disabled(&document, "on"));
}

#[wasm_bindgen_test]
fn load_happens_once_per_page() {
	let document = page("");
	let config = Config::from_json(r#"{"store_token": "s3cr3t"}"#).unwrap();
	let (runtime, transport) = runtime_with(&document, config);
	let (loads, connects, disconnects) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));
	runtime.on_load({
		let loads = Rc::clone(&loads);
		move |_| loads.set(loads.get() + 1)
	});
	runtime.on_connect({
		let connects = Rc::clone(&connects);
		move |reply, _| {
			assert_eq!(reply, &json!({"ok": true}));
			connects.set(connects.get() + 1);
		}
	});
	runtime.on_disconnect({
		let disconnects = Rc::clone(&disconnects);
		move |_| disconnects.set(disconnects.get() + 1)
	});

	runtime.connect();
	runtime.joined(json!({"ok": true}));
	let names: Vec<String> = transport.take().into_iter().map(|(name, payload)| {
		assert_eq!(payload, json!({"store_token": "s3cr3t"}));
		name
	}).collect();
	assert_eq!(names, vec!["onconnect", "onload"]);

	runtime.closed();
	runtime.closed();
	runtime.joined(json!({"ok": true}));
	let names: Vec<String> = transport.take().into_iter().map(|(name, _)| name).collect();
	assert_eq!(names, vec!["onconnect"]);

	assert_eq!((loads.get(), connects.get(), disconnects.get()), (1, 2, 1));
}

#[wasm_bindgen_test]
fn connecting_doesnt_run_change_hooks() {
	let document = page(r#"<button id="on" tether-click="a">A</button>"#);
	let (runtime, _) = runtime(&document);
	let changes = Rc::new(Cell::new(0));
	runtime.on_change({
		let changes = Rc::clone(&changes);
		move |_, _| changes.set(changes.get() + 1)
	});

	runtime.connect();
	runtime.joined(json!({}));
	runtime.closed();
	runtime.joined(json!({}));

	assert_eq!(changes.get(), 0);
	assert_eq!(runtime.bound_elements().len(), 1);
}

#[wasm_bindgen_test]
fn join_failure_leaves_runtime_disconnected() {
	let document = page(r#"<button id="on" tether-click="a">A</button>"#);
	let (runtime, transport) = runtime(&document);

	runtime.connect();
	runtime.join_failed(json!({"reason": "unauthorized"}));

	assert_eq!(runtime.state(), ConnectionState::Disconnected);
	assert!(disabled(&document, "on"));
	assert_eq!(transport.joins(), 1);
	assert!(transport.take().is_empty());
}

#[wasm_bindgen_test]
fn finished_signal_restores_control() {
	let document = page(
		r#"<button id="save" tether-click="save">Save</button>
		<button id="held" tether-click="hold">Hold</button>"#,
	);
	let (runtime, transport) = connected(&document);

	by_id(&document, "save").click();
	assert!(disabled(&document, "save"));
	let calls = transport.take_named("event");
	assert_eq!(calls.len(), 1);

	// Disabled controls swallow further clicks.
	by_id(&document, "save").click();
	assert!(transport.take().is_empty());

	runtime.receive("event", json!({ "finished": "unrelated" }));
	assert!(disabled(&document, "save"));

	runtime.receive("event", json!({ "finished": calls[0]["reply_to"] }));
	assert!(!disabled(&document, "save"));
	runtime.receive("event", json!({ "finished": calls[0]["reply_to"] }));
	assert!(!disabled(&document, "save"));

	// A disconnect orphans the pending call, and reconnecting restores the state from before the click.
	by_id(&document, "held").click();
	let calls = transport.take_named("event");
	runtime.closed();
	runtime.joined(json!({}));
	assert!(!disabled(&document, "held"));
	runtime.receive("event", json!({ "finished": calls[0]["reply_to"] }));
	assert!(!disabled(&document, "held"));
}

#[wasm_bindgen_test]
fn only_configured_events_disable() {
	let document = page(r#"<input id="name" tether-change="rename">"#);
	let (_runtime, transport) = connected(&document);
	let input = by_id(&document, "name");

	input.dispatch_event(&web_sys::Event::new("change").unwrap()).unwrap();

	assert_eq!(transport.take_named("event").len(), 1);
	assert_eq!(input.get_attribute("disabled"), None);
}
