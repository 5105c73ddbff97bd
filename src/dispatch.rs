//! Native event listeners for scanned bindings.
//!
//! All listeners share one [`Closure`] that is [bound](`Function::bind1`) to a per-listener id,
//! so attaching a listener doesn't allocate a new closure on the Rust side.

use crate::{
	channel::Completion,
	config::attr,
	load::{is_disabled, select_all, set_disabled},
	modifier::Handler,
	payload::build_payload,
	runtime::{Inner, Runtime},
	scan::{self, Binding, ScanResult},
};
use hashbrown::HashMap;
use js_sys::Function;
use serde_json::Value;
use std::rc::{Rc, Weak};
use tracing::{error, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Element, Event};

/// Which mechanism a listener belongs to. Bindings and waiters on the same node and event don't replace each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
	Binding,
	Waiter,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ListenerKey {
	pub(crate) marker: String,
	pub(crate) event: String,
	pub(crate) slot: Slot,
}

struct Installed {
	key: ListenerKey,
	element: Element,
	/// Canonical form of what the listener does, like a binding token's display form.
	signature: String,
	function: Function,
	handler: Handler<Event>,
}

impl Installed {
	fn detach(&self) {
		if let Err(error) = self.element.remove_event_listener_with_callback(&self.key.event, &self.function) {
			error!("Failed to remove event listener: {:?}", error);
		}
	}
}

/// At most one listener per element and [`ListenerKey`].
///
/// Elements that share a marker (i.e. repeated server-rendered content) are tracked separately.
#[derive(Default)]
pub(crate) struct ListenerTable {
	next_id: u32,
	ids: HashMap<ListenerKey, Vec<u32>>,
	installed: HashMap<u32, Installed>,
}

impl ListenerTable {
	pub(crate) fn handler(&self, id: u32) -> Option<(Slot, Handler<Event>)> {
		self.installed.get(&id).map(|installed| (installed.key.slot, Rc::clone(&installed.handler)))
	}

	/// Whether `element` already has a listener under `key` with the same `signature`.
	///
	/// Such a listener is kept on rebinding, along with any state its modifiers hold (like a pending debounced call).
	pub(crate) fn is_current(&self, key: &ListenerKey, element: &Element, signature: &str) -> bool {
		self.ids.get(key).map_or(false, |ids| {
			ids.iter()
				.filter_map(|id| self.installed.get(id))
				.any(|installed| installed.signature == signature && installed.element.is_same_node(Some(element.as_ref())))
		})
	}

	/// Attaches `handler` to `element`, first removing whatever listener was installed there under `key`.
	pub(crate) fn replace(&mut self, common_handler: &Closure<dyn Fn(JsValue, Event)>, key: ListenerKey, element: &Element, signature: String, handler: Handler<Event>) {
		let ids = self.ids.entry(key.clone()).or_default();
		let installed = &mut self.installed;
		ids.retain(|id| match installed.get(id).map(|previous| previous.element.is_same_node(Some(element.as_ref()))) {
			Some(true) => {
				if let Some(previous) = installed.remove(id) {
					previous.detach();
				}
				false
			}
			Some(false) => true,
			None => false,
		});

		let id = self.next_id;
		self.next_id = self.next_id.wrapping_add(1);
		let function = common_handler.as_ref().unchecked_ref::<Function>().bind1(&JsValue::UNDEFINED, &JsValue::from(id));
		if let Err(error) = element.add_event_listener_with_callback(&key.event, &function) {
			return error!("Failed to add event listener for `{}`: {:?}", key.event, error);
		}

		ids.push(id);
		installed.insert(
			id,
			Installed {
				key,
				element: element.clone(),
				signature,
				function,
				handler,
			},
		);
	}

	/// Removes every listener installed under `key`. Returns how many there were.
	pub(crate) fn remove(&mut self, key: &ListenerKey) -> usize {
		let ids = self.ids.remove(key).unwrap_or_default();
		for id in &ids {
			if let Some(installed) = self.installed.remove(id) {
				installed.detach();
			}
		}
		ids.len()
	}

	/// Forgets listeners whose elements left the document. Returns how many there were.
	pub(crate) fn prune_detached(&mut self) -> usize {
		let detached: Vec<u32> = self.installed.iter().filter(|(_, installed)| !installed.element.is_connected()).map(|(&id, _)| id).collect();
		for id in &detached {
			if let Some(installed) = self.installed.remove(id) {
				installed.detach();
				if let Some(ids) = self.ids.get_mut(&installed.key) {
					ids.retain(|other| other != id);
					if ids.is_empty() {
						self.ids.remove(&installed.key);
					}
				}
			}
		}
		detached.len()
	}

	pub(crate) fn len(&self) -> usize {
		self.installed.len()
	}

	/// Connected elements with at least one listener in `slot`, each listed once.
	pub(crate) fn elements(&self, slot: Slot) -> Vec<Element> {
		let mut elements: Vec<Element> = Vec::new();
		for installed in self.installed.values().filter(|installed| installed.key.slot == slot && installed.element.is_connected()) {
			if !elements.iter().any(|element| element.is_same_node(Some(installed.element.as_ref()))) {
				elements.push(installed.element.clone());
			}
		}
		elements
	}
}

impl Drop for ListenerTable {
	fn drop(&mut self) {
		for installed in self.installed.values() {
			installed.detach();
		}
	}
}

/// Body of the shared listener closure.
pub(crate) fn common_handler(inner: &Weak<Inner>, id: &JsValue, event: Event) {
	let span = trace_span!("common_handler", id = ?id, event_type = %event.type_());
	let _enter = span.enter();

	let inner = match inner.upgrade() {
		Some(inner) => inner,
		None => return warn!("Listener fired after its runtime was dropped."),
	};
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let listener = id.as_f64().and_then(|id| inner.listeners.borrow().handler(id as u32));
	match listener {
		Some((slot, handler)) => {
			if slot == Slot::Binding {
				event.prevent_default();
			}
			handler(event);
		}
		None => warn!("Listener fired after it was released."),
	}
}

impl Runtime {
	/// Scans `scope` and its descendants for bindings without touching any listeners.
	#[must_use]
	pub fn scan(&self, scope: &Element) -> ScanResult {
		scan::scan(scope, &self.inner.config)
	}

	/// Scans `scope` and (re)installs one listener per bound element and event.
	///
	/// Repeating this on an unchanged subtree leaves exactly one listener per pair,
	/// the same as applying it once. Listeners whose binding didn't change are kept as they are.
	#[instrument(skip(self, scope))]
	pub fn apply_bindings(&self, scope: &Element) -> ScanResult {
		let result = self.scan(scope);
		self.declare_properties(&result.properties);

		let changed: Vec<(&Binding, ListenerKey, String)> = {
			let listeners = self.inner.listeners.borrow();
			result
				.bindings
				.iter()
				.map(|binding| {
					let key = ListenerKey {
						marker: binding.marker.clone(),
						event: binding.token.event.clone(),
						slot: Slot::Binding,
					};
					(binding, key, binding.token.to_string())
				})
				.filter(|(binding, key, signature)| !listeners.is_current(key, &binding.element, signature))
				.collect()
		};
		trace!("Kept {} unchanged event listener(s).", result.bindings.len() - changed.len());

		let handlers: Vec<(&Binding, ListenerKey, String, Handler<Event>)> =
			changed.into_iter().map(|(binding, key, signature)| (binding, key, signature, self.binding_handler(binding))).collect();
		let mut listeners = self.inner.listeners.borrow_mut();
		for (binding, key, signature, handler) in handlers {
			listeners.replace(&self.inner.common_handler, key, &binding.element, signature, handler);
		}
		trace!("Freed {} event listener(s).", listeners.prune_detached());
		trace!("Event listener count: {}", listeners.len());
		drop(listeners);

		result
	}

	/// Runs the change hooks for `scope`, [applies bindings](`Runtime::apply_bindings`) below it,
	/// then evaluates the [marked scripts](`attr::SCRIPT`) it contains.
	pub fn enable_on(&self, scope: &Element) -> ScanResult {
		self.run_change_hooks(scope);
		let result = self.apply_bindings(scope);
		self.run_scripts_on(scope);
		result
	}

	fn run_scripts_on(&self, scope: &Element) {
		for script in select_all(scope, &format!("script[{}]", attr::SCRIPT)) {
			let code = script.text_content().unwrap_or_default();
			if let Err(message) = self.inner.evaluator.evaluate(&code) {
				error!("Inline script failed: {}", message);
			}
		}
	}

	/// Elements that currently carry a bound listener.
	#[must_use]
	pub fn bound_elements(&self) -> Vec<Element> {
		self.inner.listeners.borrow().elements(Slot::Binding)
	}

	pub(crate) fn bind_document(&self) -> Option<ScanResult> {
		match self.inner.document.document_element() {
			Some(root) => Some(self.apply_bindings(&root)),
			None => {
				error!("Document has no root element.");
				None
			}
		}
	}

	fn binding_handler(&self, binding: &Binding) -> Handler<Event> {
		let inner = Rc::downgrade(&self.inner);
		let element = binding.element.clone();
		let handler_name = binding.token.handler.clone();
		let argument = binding.token.argument();
		let handler: Handler<Event> = Rc::new(move |event: Event| {
			if let Some(runtime) = Runtime::upgrade(&inner) {
				runtime.fire(&element, &handler_name, argument.clone(), Some(&event));
			}
		});

		match &binding.token.options {
			None => handler,
			Some(options) => self.inner.modifiers.wrap(options, Rc::clone(&handler)).unwrap_or_else(|error| {
				warn!(marker = %binding.marker, "Binding `{}` stays unmodified: {}", binding.token, error);
				handler
			}),
		}
	}

	/// Builds the payload for `element` and issues the remote call to `handler`.
	///
	/// Controls are disabled until the call finishes if the triggering event's type is configured for it.
	#[instrument(skip(self, element, argument, event))]
	pub(crate) fn fire(&self, element: &Element, handler: &str, argument: Option<Value>, event: Option<&Event>) {
		if !self.is_connected() {
			return warn!("Not connected. Dropped call to `{}`.", handler);
		}

		let disable = event.map_or(false, |event| self.inner.config.disables_while_processing(&event.type_()));
		let on_complete: Option<Completion> = if disable {
			self.inner.ledger.borrow_mut().begin_processing(element, is_disabled(element));
			set_disabled(element, true);
			let inner = Rc::downgrade(&self.inner);
			let element = element.clone();
			Some(Box::new(move || {
				if let Some(runtime) = Runtime::upgrade(&inner) {
					runtime.end_processing(&element);
				}
			}))
		} else {
			None
		};

		let contributors = self.inner.contributors.borrow().clone();
		let mut payload = build_payload(element, event, &contributors);
		if let Some(argument) = argument {
			payload.insert("argument".to_owned(), argument);
		}
		self.send_call(handler, payload, on_complete);
	}

	/// Re-enables `element` once its call finished, unless something else still holds it disabled.
	fn end_processing(&self, element: &Element) {
		let restore = self.inner.ledger.borrow_mut().end_processing(element);
		if let Some(disabled) = restore {
			set_disabled(element, disabled);
		}
	}
}
