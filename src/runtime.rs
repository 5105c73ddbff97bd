//! The explicit context object that owns all client session state.

use crate::{
	channel::{envelope, evaluate_request, CallChannel, Completion, EvalReply, EvalRequest, Evaluator, FinishedMessage, PageEvaluator, Transport},
	config::Config,
	dispatch::{self, ListenerTable},
	element::{InsertHtmlRequest, QueryRequest, SetPropRequest},
	lifecycle::{DisabledLedger, Hooks, Lifecycle},
	load::select_all,
	modal::{ModalPresenter, ModalRequest, ModalState},
	modifier::{BrowserTimers, ModifierRegistry},
	patch::{Patch, PropertyStore},
	payload::{apply_contributors, merge, Contributor},
	waiter::{RegisterWaiters, UnregisterWaiters},
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::{error, info, instrument, trace, warn};
use wasm_bindgen::{closure::Closure, JsValue};
use web_sys::{Document, Element, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
	#[error("no global `window` found")]
	NoWindow,
	#[error("no `document` found on `window`")]
	NoDocument,
}

/// Inbound `console` message.
#[derive(Debug, Deserialize)]
struct ConsoleMessage {
	log: String,
}

pub(crate) struct Inner {
	pub(crate) config: Config,
	pub(crate) document: Document,
	pub(crate) transport: Box<dyn Transport>,
	pub(crate) evaluator: Box<dyn Evaluator>,
	pub(crate) modifiers: ModifierRegistry<Event>,
	pub(crate) modal_presenter: Option<Rc<dyn ModalPresenter>>,
	pub(crate) listeners: RefCell<ListenerTable>,
	pub(crate) common_handler: Closure<dyn Fn(JsValue, Event)>,
	pub(crate) lifecycle: RefCell<Lifecycle>,
	pub(crate) hooks: RefCell<Hooks>,
	pub(crate) contributors: RefCell<Vec<Contributor>>,
	pub(crate) calls: RefCell<CallChannel>,
	pub(crate) properties: RefCell<PropertyStore>,
	pub(crate) ledger: RefCell<DisabledLedger>,
	pub(crate) modal: RefCell<ModalState>,
}

/// Client session state for one page.
///
/// Cloning is cheap and yields another handle to the same session.
/// Event listeners only hold weak references, so dropping the last handle detaches everything.
#[derive(Clone)]
pub struct Runtime {
	pub(crate) inner: Rc<Inner>,
}

impl Debug for Runtime {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("config", &self.inner.config)
			.field("state", &self.inner.lifecycle.try_borrow().map(|lifecycle| lifecycle.state()).ok())
			.field("calls", &self.inner.calls.try_borrow().ok())
			.field("listeners", &self.inner.listeners.try_borrow().map(|listeners| listeners.len()).ok())
			.finish_non_exhaustive()
	}
}

/// Assembles a [`Runtime`] around a [`Transport`].
pub struct RuntimeBuilder {
	transport: Box<dyn Transport>,
	config: Config,
	evaluator: Box<dyn Evaluator>,
	modifiers: Option<ModifierRegistry<Event>>,
	modal_presenter: Option<Rc<dyn ModalPresenter>>,
	document: Option<Document>,
}

impl Debug for RuntimeBuilder {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuntimeBuilder")
			.field("config", &self.config)
			.field("modifiers", &self.modifiers)
			.field("modal_presenter", &self.modal_presenter.is_some())
			.field("document", &self.document)
			.finish_non_exhaustive()
	}
}

impl RuntimeBuilder {
	#[must_use]
	pub fn new(transport: impl Transport + 'static) -> Self {
		Self {
			transport: Box::new(transport),
			config: Config::default(),
			evaluator: Box::new(PageEvaluator),
			modifiers: None,
			modal_presenter: None,
			document: None,
		}
	}

	#[must_use]
	pub fn config(mut self, config: Config) -> Self {
		self.config = config;
		self
	}

	/// Replaces [`PageEvaluator`].
	#[must_use]
	pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
		self.evaluator = Box::new(evaluator);
		self
	}

	/// Replaces the default registry of [`ModifierRegistry::with_timers`] on [`BrowserTimers`].
	#[must_use]
	pub fn modifiers(mut self, modifiers: ModifierRegistry<Event>) -> Self {
		self.modifiers = Some(modifiers);
		self
	}

	/// Without a presenter, modal requests are answered with [`CANCEL`](`crate::modal::CANCEL`) right away.
	#[must_use]
	pub fn modal_presenter(mut self, modal_presenter: impl ModalPresenter + 'static) -> Self {
		self.modal_presenter = Some(Rc::new(modal_presenter));
		self
	}

	/// Defaults to the global `window.document`.
	#[must_use]
	pub fn document(mut self, document: Document) -> Self {
		self.document = Some(document);
		self
	}

	/// # Errors
	///
	/// Iff no document was given and there is no global one.
	#[instrument(skip(self))]
	pub fn build(self) -> Result<Runtime, RuntimeError> {
		let document = match self.document {
			Some(document) => document,
			None => web_sys::window().ok_or(RuntimeError::NoWindow)?.document().ok_or(RuntimeError::NoDocument)?,
		};
		let modifiers = self.modifiers.unwrap_or_else(|| ModifierRegistry::with_timers(BrowserTimers));

		let inner = Rc::new_cyclic(|weak: &Weak<Inner>| {
			let weak = weak.clone();
			Inner {
				config: self.config,
				document,
				transport: self.transport,
				evaluator: self.evaluator,
				modifiers,
				modal_presenter: self.modal_presenter,
				listeners: RefCell::default(),
				common_handler: Closure::wrap(Box::new(move |id: JsValue, event: Event| dispatch::common_handler(&weak, &id, event)) as Box<dyn Fn(JsValue, Event)>),
				lifecycle: RefCell::default(),
				hooks: RefCell::default(),
				contributors: RefCell::default(),
				calls: RefCell::default(),
				properties: RefCell::default(),
				ledger: RefCell::default(),
				modal: RefCell::default(),
			}
		});
		Ok(Runtime { inner })
	}
}

impl Runtime {
	pub(crate) fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
		inner.upgrade().map(|inner| Self { inner })
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.inner.config
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.inner.document
	}

	/// Adds fields to every outgoing payload, including those of [`invoke`](`Runtime::invoke`).
	///
	/// Contributors run in registration order, later ones overwriting earlier fields.
	pub fn add_payload(&self, contributor: impl Fn(Option<&Element>, Option<&Event>) -> Map<String, Value> + 'static) {
		self.inner.contributors.borrow_mut().push(Rc::new(contributor));
	}

	/// Routes one inbound message by its event name.
	#[instrument(skip(self, message))]
	pub fn receive(&self, event: &str, message: Value) {
		match event {
			"event" => {
				if let Some(FinishedMessage { finished }) = parse(event, message) {
					match finished {
						Some(token) => self.finished(&token),
						None => trace!("Ignored `event` message without `finished`."),
					}
				}
			}
			"execjs" => {
				if let Some(request) = parse::<EvalRequest>(event, message) {
					let reply = evaluate_request(&*self.inner.evaluator, request);
					if let EvalReply::Error(_, message) = &reply {
						error!("Evaluation failed: {}", message);
					}
					match serde_json::to_value(&reply) {
						Ok(reply) => self.push("execjs", reply),
						Err(error) => error!("Failed to serialise evaluation reply: {}", error),
					}
				}
			}
			"broadcastjs" => {
				if let Some(request) = parse::<EvalRequest>(event, message) {
					if let Err(message) = self.inner.evaluator.evaluate(&request.js) {
						error!("Broadcast evaluation failed: {}", message);
					}
				}
			}
			"console" => {
				if let Some(ConsoleMessage { log }) = parse(event, message) {
					info!(target: "tether_dom::console", "{}", log);
				}
			}
			"modal" => {
				if let Some(request) = parse::<ModalRequest>(event, message) {
					self.handle_modal(request);
				}
			}
			"register_waiters" => {
				if let Some(message) = parse::<RegisterWaiters>(event, message) {
					self.register_waiters(message);
				}
			}
			"unregister_waiters" => {
				if let Some(message) = parse::<UnregisterWaiters>(event, message) {
					self.unregister_waiters(&message);
				}
			}
			"query" => {
				if let Some(request) = parse::<QueryRequest>(event, message) {
					self.handle_query(request);
				}
			}
			"set_prop" => {
				if let Some(request) = parse::<SetPropRequest>(event, message) {
					self.handle_set_prop(request);
				}
			}
			"insert_html" => {
				if let Some(request) = parse::<InsertHtmlRequest>(event, message) {
					self.handle_insert_html(request);
				}
			}
			"patch" => {
				if let Some(patch) = parse::<Patch>(event, message) {
					self.apply_patch(&patch);
				}
			}
			other => warn!("Ignored message of unknown kind `{}`.", other),
		}
	}

	/// Calls `handler` on the server on behalf of the application, without a sender element.
	///
	/// Payload contributors apply, but fields of `payload` take precedence.
	/// A `payload` that isn't a JSON object is sent as `{"payload": payload}`.
	#[instrument(skip(self, payload, on_complete))]
	pub fn invoke(&self, handler: &str, payload: Value, on_complete: Option<Completion>) {
		let contributors = self.inner.contributors.borrow().clone();
		let mut merged = Map::new();
		apply_contributors(&mut merged, &contributors, None, None);
		merge(&mut merged, envelope(payload));
		self.send_call(handler, merged, on_complete);
	}

	/// Pushes an `event` message. Calls made while not connected are dropped.
	pub(crate) fn send_call(&self, handler: &str, payload: Map<String, Value>, on_complete: Option<Completion>) {
		if !self.is_connected() {
			return warn!("Not connected. Dropped call to `{}`.", handler);
		}

		#[cfg(feature = "dangerous-logging")]
		trace!(?payload, "Call payload.");

		let message = self.inner.calls.borrow_mut().prepare(handler, payload, on_complete);
		trace!(reply_to = %message.reply_to, "Calling `{}`.", handler);
		match serde_json::to_value(&message) {
			Ok(message) => self.push("event", message),
			Err(error) => error!("Failed to serialise call: {}", error),
		}
	}

	fn finished(&self, token: &str) {
		let completion = self.inner.calls.borrow_mut().resolve(token);
		match completion {
			Some(completion) => {
				trace!(%token, "Call finished.");
				completion();
			}
			None => trace!(%token, "Ignored unknown correlation token."),
		}
	}

	pub(crate) fn push(&self, event: &str, payload: Value) {
		self.inner.transport.push(event, payload);
	}

	/// Elements in the document matching `selector`, including the root element.
	pub(crate) fn select(&self, selector: &str) -> Vec<Element> {
		match self.inner.document.document_element() {
			Some(root) => {
				let mut elements = select_all(&root, selector);
				if root.matches(selector).unwrap_or(false) {
					elements.insert(0, root);
				}
				elements
			}
			None => Vec::new(),
		}
	}
}

fn parse<T: DeserializeOwned>(event: &str, message: Value) -> Option<T> {
	match serde_json::from_value(message) {
		Ok(parsed) => Some(parsed),
		Err(error) => {
			error!("Malformed `{}` message: {}", event, error);
			None
		}
	}
}
