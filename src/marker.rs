//! Identifier allocation for DOM nodes ([node markers](`crate::config::attr::MARKER`)) and pending remote calls.

use crate::config::attr;
use tracing::{error, trace};
use uuid::Uuid;
use web_sys::Element;

/// Returns the node marker of `element`, attaching a freshly generated one first if it has none.
///
/// Markers are random UUIDs, so they don't collide within a session with overwhelming probability
/// and are never reused for another node while the original is still attached.
pub fn ensure_marker(element: &Element) -> String {
	if let Some(marker) = element.get_attribute(attr::MARKER).filter(|marker| !marker.is_empty()) {
		return marker;
	}

	let marker = new_marker();
	if let Err(error) = element.set_attribute(attr::MARKER, &marker) {
		error!("Failed to attach node marker: {:?}", error);
	}
	trace!(%marker, "Attached node marker.");
	marker
}

#[must_use]
pub fn new_marker() -> String {
	Uuid::new_v4().to_string()
}

/// Monotonic source of correlation tokens.
#[derive(Debug, Default)]
pub struct CorrelationTokens {
	next: u64,
}

impl CorrelationTokens {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a token for which `in_use` is `false`.
	pub fn next_unused(&mut self, in_use: impl Fn(&str) -> bool) -> String {
		loop {
			let token = format!("c{}", self.next);
			self.next = self.next.wrapping_add(1);
			if !in_use(&token) {
				return token;
			}
		}
	}
}
