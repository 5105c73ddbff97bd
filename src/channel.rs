//! Remote calls over the multiplexed channel and their correlation with completion signals.

use crate::{js, marker::CorrelationTokens};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The persistent bidirectional channel to the server.
///
/// Implementations report back into the [`Runtime`](`crate::Runtime`): a successful join through
/// [`joined`](`crate::Runtime::joined`), a failed one through [`join_failed`](`crate::Runtime::join_failed`),
/// a lost connection through [`closed`](`crate::Runtime::closed`) and every inbound message through
/// [`receive`](`crate::Runtime::receive`).
pub trait Transport {
	/// Starts connecting and joining the channel.
	fn join(&self);

	/// Sends one message. Delivery is at-least-once while connected and doesn't happen after a disconnect.
	fn push(&self, event: &str, payload: Value);
}

/// Evaluates server-sent code in the page's context.
pub trait Evaluator {
	/// # Errors
	///
	/// With a description of whatever the evaluation threw.
	fn evaluate(&self, code: &str) -> Result<Value, String>;
}

/// [`Evaluator`] using the page's global `eval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageEvaluator;

impl Evaluator for PageEvaluator {
	fn evaluate(&self, code: &str) -> Result<Value, String> {
		js_sys::eval(code).map(|value| js::to_json(&value)).map_err(|error| js::error_message(&error))
	}
}

/// Runs once the server signals that the corresponding call finished.
pub type Completion = Box<dyn FnOnce()>;

/// Outbound `event` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallMessage {
	pub handler: String,
	pub payload: Map<String, Value>,
	pub reply_to: String,
}

/// Inbound `event` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FinishedMessage {
	#[serde(default)]
	pub finished: Option<String>,
}

/// Inbound `execjs` and `broadcastjs` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalRequest {
	pub js: String,
	/// Opaque identity of the requesting server process, echoed back in the reply.
	#[serde(default)]
	pub sender: Value,
}

/// Outbound `execjs` reply, serialised as `{"ok": [sender, value]}` or `{"error": [sender, message]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalReply {
	Ok(Value, Value),
	Error(Value, String),
}

/// Evaluates a synchronous-style request, turning failures into a tagged reply instead of propagating them.
pub fn evaluate_request(evaluator: &dyn Evaluator, request: EvalRequest) -> EvalReply {
	match evaluator.evaluate(&request.js) {
		Ok(value) => EvalReply::Ok(request.sender, value),
		Err(message) => EvalReply::Error(request.sender, message),
	}
}

/// Wraps anything that isn't a JSON object as `{"payload": value}`.
#[must_use]
pub fn envelope(payload: Value) -> Map<String, Value> {
	match payload {
		Value::Object(map) => map,
		other => {
			let mut map = Map::new();
			map.insert("payload".to_owned(), other);
			map
		}
	}
}

/// Correlation tokens and the completions still waiting for their `finished` signal.
#[derive(Default)]
pub struct CallChannel {
	tokens: CorrelationTokens,
	pending: HashMap<String, Completion>,
}

impl Debug for CallChannel {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("CallChannel").field("tokens", &self.tokens).field("pending", &self.pending.keys().collect::<Vec<_>>()).finish()
	}
}

impl CallChannel {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Allocates a correlation token, records `on_complete` under it and returns the message to push.
	pub fn prepare(&mut self, handler: &str, payload: Map<String, Value>, on_complete: Option<Completion>) -> CallMessage {
		let pending = &self.pending;
		let reply_to = self.tokens.next_unused(|token| pending.contains_key(token));
		if let Some(on_complete) = on_complete {
			self.pending.insert(reply_to.clone(), on_complete);
		}
		CallMessage {
			handler: handler.to_owned(),
			payload,
			reply_to,
		}
	}

	/// Removes and returns the completion registered for `token`, if any.
	///
	/// The caller runs it after releasing any borrow of `self`, since completions may issue further calls.
	pub fn resolve(&mut self, token: &str) -> Option<Completion> {
		self.pending.remove(token)
	}

	#[must_use]
	pub fn pending(&self) -> usize {
		self.pending.len()
	}

	/// Drops all pending completions without running them. Returns how many there were.
	pub fn orphan_all(&mut self) -> usize {
		let count = self.pending.len();
		self.pending.clear();
		count
	}
}
