#![cfg(target_arch = "wasm32")]

use serde_json::json;
use std::{cell::RefCell, rc::Rc};
use tether_dom::{ModalPresenter, ModalRequest, Runtime, RuntimeBuilder};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

wasm_bindgen_test_configure!(run_in_browser);

use web_transport_::{by_id, connected, page, RecordingTransport};

#[wasm_bindgen_test]
fn execjs_replies_with_tagged_result() {
	let document = page("");
	let (runtime, transport) = connected(&document);

	runtime.receive("execjs", json!({"js": "1 + 1", "sender": "pid-1"}));
	runtime.receive("execjs", json!({"js": "throw new Error('boom')", "sender": "pid-2"}));

	assert_eq!(
		transport.take(),
		vec![("execjs".to_owned(), json!({"ok": ["pid-1", 2]})), ("execjs".to_owned(), json!({"error": ["pid-2", "boom"]}))]
	);
}

#[wasm_bindgen_test]
fn execjs_replies_null_for_unserialisable_results() {
	let document = page("");
	let (runtime, transport) = connected(&document);

	runtime.receive("execjs", json!({"js": "(function(){})", "sender": "pid-1"}));
	runtime.receive("execjs", json!({"js": "Symbol('s')", "sender": "pid-2"}));

	assert_eq!(
		transport.take_named("execjs"),
		vec![json!({"ok": ["pid-1", null]}), json!({"ok": ["pid-2", null]})]
	);
}

#[wasm_bindgen_test]
fn broadcastjs_and_console_send_nothing() {
	let document = page("");
	let (runtime, transport) = connected(&document);

	runtime.receive("broadcastjs", json!({"js": "window.__tetherBroadcast = 'seen'"}));
	runtime.receive("broadcastjs", json!({"js": "syntax error here"}));
	runtime.receive("console", json!({"log": "Hello from the server."}));
	runtime.receive("no_such_message", json!({}));
	runtime.receive("patch", json!({"kind": "no_such_patch"}));

	assert!(transport.take().is_empty());
	assert_eq!(js_sys::eval("window.__tetherBroadcast").unwrap().as_string().as_deref(), Some("seen"));
}

#[wasm_bindgen_test]
fn modal_without_presenter_is_cancelled() {
	let document = page("");
	let (runtime, transport) = connected(&document);

	runtime.receive("modal", json!({"html": "<p>Sure?</p>", "sender": "pid"}));

	assert_eq!(transport.take(), vec![("modal".to_owned(), json!({"ok": ["pid", {"button": "cancel", "form": {}}]}))]);
}

#[derive(Clone, Default)]
struct RecordingPresenter {
	shown: Rc<RefCell<Vec<String>>>,
	hidden: Rc<RefCell<usize>>,
}

impl ModalPresenter for RecordingPresenter {
	fn show(&self, request: &ModalRequest, _runtime: &Runtime) {
		self.shown.borrow_mut().push(request.html.clone());
	}

	fn hide(&self) {
		*self.hidden.borrow_mut() += 1;
	}
}

#[wasm_bindgen_test]
fn modal_is_answered_once() {
	let document = page(r#"<form id="dialog"><input name="reason" value="spam"></form>"#);
	let transport = RecordingTransport::default();
	let presenter = RecordingPresenter::default();
	let runtime = RuntimeBuilder::new(transport.clone()).modal_presenter(presenter.clone()).document(document.clone()).build().unwrap();
	runtime.connect();
	runtime.joined(json!({}));
	transport.take();

	runtime.receive("modal", json!({"html": "<p>Why?</p>", "timeout": 60000, "sender": "pid"}));
	assert_eq!(*presenter.shown.borrow(), vec!["<p>Why?</p>"]);
	assert!(runtime.modal_is_open());

	runtime.modal_submitted(&by_id(&document, "dialog"));
	runtime.modal_closed();
	runtime.modal_button_clicked("ok", None);

	assert!(!runtime.modal_is_open());
	assert_eq!(*presenter.hidden.borrow(), 1);
	assert_eq!(transport.take(), vec![("modal".to_owned(), json!({"ok": ["pid", {"button": "ok", "form": {"reason": "spam"}}]}))]);
}

#[wasm_bindgen_test]
fn newer_modal_supersedes_open_one() {
	let document = page("");
	let transport = RecordingTransport::default();
	let runtime = RuntimeBuilder::new(transport.clone()).modal_presenter(RecordingPresenter::default()).document(document.clone()).build().unwrap();
	runtime.connect();
	runtime.joined(json!({}));
	transport.take();

	runtime.receive("modal", json!({"html": "first", "sender": 1}));
	runtime.receive("modal", json!({"html": "second", "sender": 2}));
	runtime.modal_button_clicked("yes", None);

	assert_eq!(
		transport.take_named("modal"),
		vec![json!({"ok": [1, {"button": "cancel", "form": {}}]}), json!({"ok": [2, {"button": "yes", "form": {}}]})]
	);
}

#[wasm_bindgen_test]
fn waiters_report_alongside_bindings() {
	let document = page(r#"<button id="go" class="waited" tether-click="go">Go</button>"#);
	let (runtime, transport) = connected(&document);

	runtime.receive("register_waiters", json!({"waiters": [{"selector": ".waited", "event_name": "click", "token": "w1"}]}));
	by_id(&document, "go").click();

	let pushed = transport.take();
	let names: Vec<&str> = pushed.iter().map(|(name, _)| name.as_str()).collect();
	assert_eq!(names.len(), 2);
	assert!(names.contains(&"event"));
	assert!(names.contains(&"waiter"));
	let (_, waiter) = pushed.iter().find(|(name, _)| name == "waiter").unwrap();
	assert_eq!(waiter["token"], json!("w1"));
	assert_eq!(waiter["sender"]["id"], json!("go"));

	runtime.receive("unregister_waiters", json!({"selector": ".waited", "event_name": "click"}));
	runtime.receive("event", json!({ "finished": pushed.iter().find(|(name, _)| name == "event").unwrap().1["reply_to"] }));
	by_id(&document, "go").click();

	let names: Vec<String> = transport.take().into_iter().map(|(name, _)| name).collect();
	assert_eq!(names, vec!["event"]);
}
