//! Connection state, lifecycle hooks and the enablement of bound controls.

use crate::{
	load::{is_disabled, set_disabled},
	runtime::Runtime,
};
use serde_json::{json, Value};
use std::rc::Rc;
use tracing::{error, info, instrument, trace, warn};
use web_sys::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
	/// Entered [`ConnectionState::Connected`]. `first` is set only once per page lifetime.
	Connected { first: bool },
	/// Left [`ConnectionState::Connected`] or [`ConnectionState::Connecting`].
	Disconnected,
	Unchanged,
}

/// The connection state machine: `disconnected → connecting → connected → disconnected`.
///
/// A transport that rejoins on its own may also go straight from disconnected to connected.
#[derive(Debug)]
pub(crate) struct Lifecycle {
	state: ConnectionState,
	loaded: bool,
}

impl Default for Lifecycle {
	fn default() -> Self {
		Self {
			state: ConnectionState::Disconnected,
			loaded: false,
		}
	}
}

impl Lifecycle {
	pub(crate) fn state(&self) -> ConnectionState {
		self.state
	}

	/// Returns whether connecting actually started.
	pub(crate) fn start_connecting(&mut self) -> bool {
		match self.state {
			ConnectionState::Disconnected => {
				self.state = ConnectionState::Connecting;
				true
			}
			ConnectionState::Connecting | ConnectionState::Connected => false,
		}
	}

	pub(crate) fn joined(&mut self) -> Transition {
		match self.state {
			ConnectionState::Connected => Transition::Unchanged,
			ConnectionState::Connecting | ConnectionState::Disconnected => {
				self.state = ConnectionState::Connected;
				let first = !self.loaded;
				self.loaded = true;
				Transition::Connected { first }
			}
		}
	}

	/// The connection closed or a join failed.
	pub(crate) fn lost(&mut self) -> Transition {
		match self.state {
			ConnectionState::Disconnected => Transition::Unchanged,
			ConnectionState::Connecting | ConnectionState::Connected => {
				self.state = ConnectionState::Disconnected;
				Transition::Disconnected
			}
		}
	}
}

/// Remembers the disabled state controls had before the runtime disabled them.
///
/// Controls can be held disabled for two reasons at once, a call in flight and a lost connection.
/// They return to their recorded prior state only once neither applies.
#[derive(Debug)]
pub(crate) struct DisabledLedger<K = Element> {
	processing: Vec<(K, bool)>,
	disconnected: Vec<(K, bool)>,
}

impl<K> Default for DisabledLedger<K> {
	fn default() -> Self {
		Self {
			processing: Vec::new(),
			disconnected: Vec::new(),
		}
	}
}

impl<K: Clone + PartialEq> DisabledLedger<K> {
	/// Records `control`'s prior state unless a call on it is already in flight.
	pub(crate) fn begin_processing(&mut self, control: &K, was_disabled: bool) {
		if !self.processing.iter().any(|(other, _)| other == control) {
			self.processing.push((control.clone(), was_disabled));
		}
	}

	/// Returns the state to restore, or [`None`] if `control` must stay as it is.
	pub(crate) fn end_processing(&mut self, control: &K) -> Option<bool> {
		let index = self.processing.iter().position(|(other, _)| other == control)?;
		let (_, was_disabled) = self.processing.swap_remove(index);
		if self.disconnected.iter().any(|(other, _)| other == control) {
			None
		} else {
			Some(was_disabled)
		}
	}

	/// Records the prior state of each `(control, currently_disabled)` not yet recorded and returns the controls to disable.
	///
	/// Calls in flight are orphaned by a disconnect, so their records move over here.
	pub(crate) fn disconnect(&mut self, controls: impl IntoIterator<Item = (K, bool)>) -> Vec<K> {
		let processing = std::mem::take(&mut self.processing);
		let mut to_disable = Vec::new();
		for (control, currently_disabled) in controls {
			if self.disconnected.iter().any(|(other, _)| *other == control) {
				continue;
			}
			let prior = processing.iter().find(|(other, _)| *other == control).map_or(currently_disabled, |&(_, was_disabled)| was_disabled);
			self.disconnected.push((control.clone(), prior));
			to_disable.push(control);
		}
		to_disable
	}

	/// Everything recorded by [`disconnect`](`DisabledLedger::disconnect`), to be restored.
	pub(crate) fn reconnect(&mut self) -> Vec<(K, bool)> {
		std::mem::take(&mut self.disconnected)
	}
}

pub type LoadHook = Rc<dyn Fn(&Runtime)>;
/// Receives the server's join reply.
pub type ConnectHook = Rc<dyn Fn(&Value, &Runtime)>;
pub type DisconnectHook = Rc<dyn Fn(&Runtime)>;
/// Receives the element whose content was just replaced.
pub type ChangeHook = Rc<dyn Fn(&Element, &Runtime)>;

/// Registered hooks, each list in registration order.
#[derive(Default)]
pub(crate) struct Hooks {
	pub(crate) load: Vec<LoadHook>,
	pub(crate) connect: Vec<ConnectHook>,
	pub(crate) disconnect: Vec<DisconnectHook>,
	pub(crate) change: Vec<ChangeHook>,
}

impl Runtime {
	#[must_use]
	pub fn state(&self) -> ConnectionState {
		self.inner.lifecycle.borrow().state()
	}

	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.state() == ConnectionState::Connected
	}

	/// Runs once, on the first successful join.
	pub fn on_load(&self, hook: impl Fn(&Runtime) + 'static) {
		self.inner.hooks.borrow_mut().load.push(Rc::new(hook));
	}

	/// Runs on every successful join, including rejoins.
	pub fn on_connect(&self, hook: impl Fn(&Value, &Runtime) + 'static) {
		self.inner.hooks.borrow_mut().connect.push(Rc::new(hook));
	}

	pub fn on_disconnect(&self, hook: impl Fn(&Runtime) + 'static) {
		self.inner.hooks.borrow_mut().disconnect.push(Rc::new(hook));
	}

	/// Runs with the target element after each content replacement, before its new content is bound.
	pub fn on_change(&self, hook: impl Fn(&Element, &Runtime) + 'static) {
		self.inner.hooks.borrow_mut().change.push(Rc::new(hook));
	}

	pub(crate) fn run_change_hooks(&self, element: &Element) {
		let hooks = self.inner.hooks.borrow().change.clone();
		for hook in hooks {
			hook(element, self);
		}
	}

	/// Binds the document, disables bound controls if so configured and asks the transport to join.
	#[instrument(skip(self))]
	pub fn connect(&self) {
		if !self.inner.lifecycle.borrow_mut().start_connecting() {
			return warn!("Already connecting or connected.");
		}
		self.bind_document();
		if self.inner.config.disable_controls_when_disconnected {
			self.disable_bound_controls();
		}
		self.inner.transport.join();
	}

	/// To be called by the [`Transport`](`crate::Transport`) once the channel is joined, with the server's reply.
	#[instrument(skip(self, reply))]
	pub fn joined(&self, reply: Value) {
		let first = match self.inner.lifecycle.borrow_mut().joined() {
			Transition::Connected { first } => first,
			Transition::Disconnected | Transition::Unchanged => return trace!("Already connected."),
		};
		info!(first, "Connected.");

		let store_token = json!({ "store_token": self.inner.config.store_token });
		self.push("onconnect", store_token.clone());
		if first {
			self.push("onload", store_token);
		}

		let hooks = self.inner.hooks.borrow().connect.clone();
		for hook in hooks {
			hook(&reply, self);
		}

		self.bind_document();
		let restore = self.inner.ledger.borrow_mut().reconnect();
		for (control, was_disabled) in restore {
			set_disabled(&control, was_disabled);
		}

		if first {
			let hooks = self.inner.hooks.borrow().load.clone();
			for hook in hooks {
				hook(self);
			}
		}
	}

	/// To be called by the [`Transport`](`crate::Transport`) if joining failed. No retry is initiated here.
	#[instrument(skip(self, reason))]
	pub fn join_failed(&self, reason: Value) {
		error!("Failed to join channel: {}", reason);
		self.lost();
	}

	/// To be called by the [`Transport`](`crate::Transport`) when the connection is lost.
	#[instrument(skip(self))]
	pub fn closed(&self) {
		self.lost();
	}

	fn lost(&self) {
		if self.inner.lifecycle.borrow_mut().lost() != Transition::Disconnected {
			return trace!("Already disconnected.");
		}
		info!("Disconnected.");

		let orphaned = self.inner.calls.borrow_mut().orphan_all();
		trace!("Orphaned {} pending call(s).", orphaned);

		if self.inner.config.disable_controls_when_disconnected {
			self.disable_bound_controls();
		}

		let hooks = self.inner.hooks.borrow().disconnect.clone();
		for hook in hooks {
			hook(self);
		}
	}

	fn disable_bound_controls(&self) {
		let controls = self.bound_elements().into_iter().map(|control| {
			let disabled = is_disabled(&control);
			(control, disabled)
		});
		let to_disable = self.inner.ledger.borrow_mut().disconnect(controls);
		for control in to_disable {
			set_disabled(&control, true);
		}
	}
}
