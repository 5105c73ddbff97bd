//! Server-registered listeners ("waiters") that report events back as `waiter` messages.
//!
//! Waiters live in their own listener slot, so they never replace a binding on the same element and event.

use crate::{
	config::attr,
	dispatch::{ListenerKey, Slot},
	marker::ensure_marker,
	modifier::Handler,
	payload::build_payload,
	runtime::Runtime,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::rc::Rc;
use tracing::{instrument, trace, warn};
use web_sys::{Element, Event};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Waiter {
	pub selector: String,
	pub event_name: String,
	/// Echoed back with every report.
	pub token: String,
}

/// Inbound `register_waiters` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterWaiters {
	pub waiters: Vec<Waiter>,
}

/// Inbound `unregister_waiters` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnregisterWaiters {
	pub selector: String,
	pub event_name: String,
}

impl Runtime {
	#[instrument(skip(self, message))]
	pub(crate) fn register_waiters(&self, message: RegisterWaiters) {
		for waiter in message.waiters {
			let elements = self.select(&waiter.selector);
			trace!(selector = %waiter.selector, count = elements.len(), "Registering waiter.");
			for element in elements {
				let key = ListenerKey {
					marker: ensure_marker(&element),
					event: waiter.event_name.clone(),
					slot: Slot::Waiter,
				};
				let handler = self.waiter_handler(&element, &waiter.token);
				self.inner.listeners.borrow_mut().replace(&self.inner.common_handler, key, &element, waiter.token.clone(), handler);
			}
		}
	}

	#[instrument(skip(self, message))]
	pub(crate) fn unregister_waiters(&self, message: &UnregisterWaiters) {
		let mut listeners = self.inner.listeners.borrow_mut();
		for element in self.select(&message.selector) {
			if let Some(marker) = element.get_attribute(attr::MARKER) {
				listeners.remove(&ListenerKey {
					marker,
					event: message.event_name.clone(),
					slot: Slot::Waiter,
				});
			}
		}
	}

	fn waiter_handler(&self, element: &Element, token: &str) -> Handler<Event> {
		let inner = Rc::downgrade(&self.inner);
		let element = element.clone();
		let token = token.to_owned();
		Rc::new(move |event: Event| {
			let runtime = match Runtime::upgrade(&inner) {
				Some(runtime) => runtime,
				None => return,
			};
			if !runtime.is_connected() {
				return warn!(%token, "Not connected. Dropped waiter report.");
			}
			let contributors = runtime.inner.contributors.borrow().clone();
			let sender = build_payload(&element, Some(&event), &contributors);
			runtime.push("waiter", json!({ "token": token, "sender": Value::Object(sender) }));
		})
	}
}
