//! Runtime configuration and the DOM attribute surface.

use serde::Deserialize;

/// Names of the attributes the runtime reads from (and, for [`MARKER`](attr::MARKER), writes to) the DOM.
pub mod attr {
	/// Holds a node's stable correlation identifier.
	pub const MARKER: &str = "tether-id";

	/// Canonical multi-binding attribute: space-separated `event[#options]:handler[(arguments)]` tokens.
	pub const BINDINGS: &str = "tether";

	/// Per-event shorthand attributes are this prefix followed by a configured event name, e.g. `tether-click`.
	pub const SHORTHAND_PREFIX: &str = "tether-";

	/// Legacy pair syntax: event name…
	pub const EVENT: &str = "tether-event";
	/// …and handler name.
	pub const HANDLER: &str = "tether-handler";

	/// Modifier applied to shorthand and legacy-pair bindings of the same element.
	pub const OPTIONS: &str = "tether-options";

	/// Declares a shared handler namespace for bound descendants.
	pub const SCOPE: &str = "tether-scope";

	/// Single literal argument injected into handlers that don't specify arguments themselves.
	pub const ARGUMENT: &str = "tether-argument";

	/// Prefix of property-binding attributes, e.g. `tether-prop-style.background-color`.
	pub const PROPERTY_PREFIX: &str = "tether-prop-";

	/// Names a partial region that patches can be scoped to.
	pub const PARTIAL: &str = "tether-partial";

	/// Marks a `<script>` whose text is evaluated whenever the content containing it is inserted.
	pub const SCRIPT: &str = "tether-script";
}

/// Behaviour switches, usually rendered into the page by the server as JSON.
///
/// Every field has a default, so partial documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Event names recognised as shorthand attributes (`tether-<event>`).
	pub shorthand_events: Vec<String>,
	/// Whether bound controls are disabled while their remote call is in flight.
	pub disable_controls_while_processing: bool,
	/// Which event types trigger [`disable_controls_while_processing`](`Config::disable_controls_while_processing`).
	pub events_to_disable_while_processing: Vec<String>,
	/// Whether bound controls are disabled while the channel is down.
	pub disable_controls_when_disconnected: bool,
	/// Opaque session store token sent with `onconnect` and `onload`.
	pub store_token: Option<String>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			shorthand_events: ["click", "change", "keyup", "keydown"].iter().map(|&event| event.to_owned()).collect(),
			disable_controls_while_processing: true,
			events_to_disable_while_processing: vec!["click".to_owned()],
			disable_controls_when_disconnected: true,
			store_token: None,
		}
	}
}

impl Config {
	/// Parses a configuration document.
	///
	/// # Errors
	///
	/// Iff `json` isn't a valid configuration object.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}

	#[must_use]
	pub fn disables_while_processing(&self, event_type: &str) -> bool {
		self.disable_controls_while_processing && self.events_to_disable_while_processing.iter().any(|event| event == event_type)
	}

	/// Whether `event` has a shorthand attribute.
	#[must_use]
	pub fn is_shorthand_event(&self, event: &str) -> bool {
		self.shorthand_events.iter().any(|shorthand| shorthand == event)
	}
}
