//! Correlates a server-requested modal dialog with exactly one answer.
//!
//! Presentation is left to a [`ModalPresenter`]. Whichever happens first of a button click,
//! a form submission, the dialog closing or the request's timeout produces the answer,
//! everything after that is ignored.

use crate::{
	load::load_form_values,
	modifier::{BrowserTimers, Schedule},
	runtime::Runtime,
};
use gloo_timers::callback::Timeout;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::rc::Rc;
use tracing::{instrument, trace, warn};
use web_sys::Element;

/// Button name answered on close, on timeout and when nothing can present the dialog.
pub const CANCEL: &str = "cancel";
/// Button name answered on form submission.
pub const OK: &str = "ok";

/// Inbound `modal` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModalRequest {
	pub html: String,
	/// Auto-dismissal delay in milliseconds.
	#[serde(default)]
	pub timeout: Option<u32>,
	#[serde(default)]
	pub sender: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalAnswer {
	pub button: String,
	pub form: Map<String, Value>,
}

/// Displays modal dialogs.
///
/// Implementations report user interaction through [`Runtime::modal_button_clicked`],
/// [`Runtime::modal_submitted`] and [`Runtime::modal_closed`].
pub trait ModalPresenter {
	fn show(&self, request: &ModalRequest, runtime: &Runtime);
	fn hide(&self);
}

struct OpenModal<H> {
	generation: u64,
	sender: Value,
	_timeout: Option<H>,
}

/// At most one open dialog. `H` is the timeout handle, cancelled by dropping it.
pub(crate) struct ModalState<H = Timeout> {
	next_generation: u64,
	open: Option<OpenModal<H>>,
}

impl<H> Default for ModalState<H> {
	fn default() -> Self {
		Self { next_generation: 0, open: None }
	}
}

impl<H> ModalState<H> {
	/// Opens a dialog for `sender`. Returns this dialog's generation and the sender of the dialog it superseded, if any.
	pub(crate) fn open(&mut self, sender: Value, timeout: impl FnOnce(u64) -> Option<H>) -> (u64, Option<Value>) {
		let generation = self.next_generation;
		self.next_generation = self.next_generation.wrapping_add(1);
		let superseded = self.open.take().map(|open| open.sender);
		self.open = Some(OpenModal {
			generation,
			sender,
			_timeout: timeout(generation),
		});
		(generation, superseded)
	}

	/// Closes the open dialog and returns its sender, or [`None`] if it was answered already.
	///
	/// With `generation`, only that particular dialog is closed.
	pub(crate) fn resolve(&mut self, generation: Option<u64>) -> Option<Value> {
		match &self.open {
			Some(open) if generation.map_or(true, |generation| generation == open.generation) => self.open.take().map(|open| open.sender),
			_ => None,
		}
	}

	pub(crate) fn is_open(&self) -> bool {
		self.open.is_some()
	}
}

impl Runtime {
	#[instrument(skip(self, request))]
	pub(crate) fn handle_modal(&self, request: ModalRequest) {
		let presenter = match &self.inner.modal_presenter {
			Some(presenter) => Rc::clone(presenter),
			None => {
				warn!("No modal presenter. Cancelling modal request.");
				return self.reply_modal(request.sender, CANCEL, Map::new());
			}
		};

		let inner = Rc::downgrade(&self.inner);
		let timeout = request.timeout;
		let (_, superseded) = self.inner.modal.borrow_mut().open(request.sender.clone(), |generation| {
			timeout.map(|timeout| {
				BrowserTimers.schedule(
					timeout,
					Box::new(move || {
						if let Some(runtime) = Runtime::upgrade(&inner) {
							trace!("Modal timed out.");
							runtime.answer_modal(Some(generation), CANCEL, Map::new());
						}
					}),
				)
			})
		});
		if let Some(superseded) = superseded {
			self.reply_modal(superseded, CANCEL, Map::new());
		}

		presenter.show(&request, self);
	}

	/// Answers the open dialog with `button` and the values of `form`, if given.
	pub fn modal_button_clicked(&self, button: &str, form: Option<&Element>) {
		self.answer_modal(None, button, form.map(load_form_values).unwrap_or_default());
	}

	/// Answers the open dialog with [`OK`] and the values of `form`.
	pub fn modal_submitted(&self, form: &Element) {
		self.answer_modal(None, OK, load_form_values(form));
	}

	/// Answers the open dialog with [`CANCEL`], unless it was answered already.
	pub fn modal_closed(&self) {
		self.answer_modal(None, CANCEL, Map::new());
	}

	#[must_use]
	pub fn modal_is_open(&self) -> bool {
		self.inner.modal.borrow().is_open()
	}

	fn answer_modal(&self, generation: Option<u64>, button: &str, form: Map<String, Value>) {
		let sender = self.inner.modal.borrow_mut().resolve(generation);
		match sender {
			Some(sender) => {
				self.reply_modal(sender, button, form);
				if let Some(presenter) = &self.inner.modal_presenter {
					presenter.hide();
				}
			}
			None => trace!("Modal answered already."),
		}
	}

	fn reply_modal(&self, sender: Value, button: &str, form: Map<String, Value>) {
		let answer = ModalAnswer { button: button.to_owned(), form };
		self.push("modal", json!({ "ok": [sender, answer] }));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use core::cell::Cell;

	struct Handle(Rc<Cell<bool>>);
	impl Drop for Handle {
		fn drop(&mut self) {
			self.0.set(true);
		}
	}

	#[test]
	fn first_answer_wins() {
		let mut state = ModalState::<()>::default();
		let (generation, superseded) = state.open(json!("pid"), |_| None);
		assert_eq!(superseded, None);
		assert_eq!(state.resolve(Some(generation)), Some(json!("pid")));
		assert_eq!(state.resolve(None), None);
		assert_eq!(state.resolve(Some(generation)), None);
	}

	#[test]
	fn timeout_is_cancelled_on_answer() {
		let cancelled = Rc::new(Cell::new(false));
		let mut state = ModalState::default();
		state.open(json!(1), |_| Some(Handle(Rc::clone(&cancelled))));
		assert!(!cancelled.get());
		assert_eq!(state.resolve(None), Some(json!(1)));
		assert!(cancelled.get());
	}

	#[test]
	fn stale_timeout_doesnt_close_newer_dialog() {
		let mut state = ModalState::<()>::default();
		let (first, _) = state.open(json!("a"), |_| None);
		let (second, superseded) = state.open(json!("b"), |_| None);
		assert_eq!(superseded, Some(json!("a")));
		assert_eq!(state.resolve(Some(first)), None);
		assert!(state.is_open());
		assert_eq!(state.resolve(Some(second)), Some(json!("b")));
	}

	#[test]
	fn answer_wire_shape() {
		let answer = ModalAnswer {
			button: OK.to_owned(),
			form: serde_json::from_value(json!({"name": "Ada"})).unwrap(),
		};
		assert_eq!(json!({ "ok": ["pid", answer] }), json!({"ok": ["pid", {"button": "ok", "form": {"name": "Ada"}}]}));
	}
}
