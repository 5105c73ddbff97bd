//! Server-pushed DOM mutations addressed by node marker.

use crate::{
	config::attr,
	js,
	load::select_all,
	runtime::Runtime,
	scan::PropertyDeclaration,
};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, instrument, trace};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

/// One DOM mutation, optionally restricted to the [partial region](`attr::PARTIAL`) named `partial`.
///
/// Applying the same patch twice leaves the DOM as applying it once does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Patch {
	/// Also sets the live `value` of input-like elements if `name` is `value`, in any case.
	SetAttribute {
		marker: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		partial: Option<String>,
		name: String,
		value: String,
	},
	/// Assigns at a dotted `path` below the element. The value is recorded and survives content replacement.
	SetProperty {
		marker: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		partial: Option<String>,
		path: String,
		value: Value,
	},
	/// Replaces the element's content, then binds whatever the new content declares.
	ReplaceContent {
		marker: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		partial: Option<String>,
		html: String,
	},
	/// Evaluates `code` once in page context, but only if the marker is present.
	RunScript {
		marker: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		partial: Option<String>,
		code: String,
	},
}

impl Patch {
	#[must_use]
	pub fn marker(&self) -> &str {
		match self {
			Patch::SetAttribute { marker, .. } | Patch::SetProperty { marker, .. } | Patch::ReplaceContent { marker, .. } | Patch::RunScript { marker, .. } => marker,
		}
	}

	#[must_use]
	pub fn partial(&self) -> Option<&str> {
		match self {
			Patch::SetAttribute { partial, .. } | Patch::SetProperty { partial, .. } | Patch::ReplaceContent { partial, .. } | Patch::RunScript { partial, .. } => partial.as_deref(),
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Patch::SetAttribute { .. } => "set_attribute",
			Patch::SetProperty { .. } => "set_property",
			Patch::ReplaceContent { .. } => "replace_content",
			Patch::RunScript { .. } => "run_script",
		}
	}
}

/// Property values per marker, in the order they were first set.
#[derive(Debug, Default)]
pub(crate) struct PropertyStore {
	by_marker: HashMap<String, Vec<(String, Value)>>,
}

impl PropertyStore {
	/// Sets `path` for `marker`, replacing any earlier value.
	pub(crate) fn record(&mut self, marker: &str, path: &str, value: Value) {
		let properties = self.by_marker.entry_ref(marker).or_default();
		match properties.iter_mut().find(|(existing, _)| existing == path) {
			Some((_, existing)) => *existing = value,
			None => properties.push((path.to_owned(), value)),
		}
	}

	/// Sets `path` for `marker` only if it has no value yet. Returns the value in effect.
	pub(crate) fn declare(&mut self, marker: &str, path: &str, value: Value) -> Value {
		if let Some(existing) = self.value(marker, path) {
			return existing.clone();
		}
		self.record(marker, path, value.clone());
		value
	}

	pub(crate) fn value(&self, marker: &str, path: &str) -> Option<&Value> {
		self.get(marker).iter().find(|(existing, _)| existing == path).map(|(_, value)| value)
	}

	pub(crate) fn get(&self, marker: &str) -> &[(String, Value)] {
		self.by_marker.get(marker).map(Vec::as_slice).unwrap_or_default()
	}
}

fn apply_property(element: &Element, path: &str, value: &Value) {
	if let Err(error) = js::set_path(element, path, &js::from_json(value)) {
		error!("Failed to set property `{}`: {}", path, js::error_message(&error));
	}
}

fn is_input_like(element: &Element) -> bool {
	element.is_instance_of::<HtmlInputElement>() || element.is_instance_of::<HtmlTextAreaElement>() || element.is_instance_of::<HtmlSelectElement>()
}

pub(crate) fn push_unique(targets: &mut Vec<Element>, element: Element) {
	if !targets.iter().any(|target| target.is_same_node(Some(element.as_ref()))) {
		targets.push(element);
	}
}

impl Runtime {
	/// Live elements bearing `marker`, within the partial region named `partial` if given.
	#[must_use]
	pub fn patch_targets(&self, marker: &str, partial: Option<&str>) -> Vec<Element> {
		let selector = js::attribute_selector(attr::MARKER, marker);
		let mut targets = Vec::new();
		match partial {
			None => {
				for element in self.select(&selector) {
					push_unique(&mut targets, element);
				}
			}
			Some(partial) => {
				for region in self.select(&js::attribute_selector(attr::PARTIAL, partial)) {
					if region.matches(&selector).unwrap_or(false) {
						push_unique(&mut targets, region.clone());
					}
					for element in select_all(&region, &selector) {
						push_unique(&mut targets, element);
					}
				}
			}
		}
		targets
	}

	/// Applies `patch` to every live target. A patch without targets is a no-op.
	#[instrument(skip(self, patch), fields(kind = patch.kind(), marker = patch.marker()))]
	pub fn apply_patch(&self, patch: &Patch) {
		let targets = self.patch_targets(patch.marker(), patch.partial());
		if targets.is_empty() {
			return trace!("No live target.");
		}

		match patch {
			Patch::SetAttribute { name, value, .. } => {
				for target in &targets {
					if let Err(error) = target.set_attribute(name, value) {
						error!("Failed to set attribute `{}`: {}", name, js::error_message(&error));
					}
					if name.eq_ignore_ascii_case("value") && is_input_like(target) {
						if let Err(error) = js::set_path(target, "value", &JsValue::from_str(value)) {
							error!("Failed to set live value: {}", js::error_message(&error));
						}
					}
				}
			}
			Patch::SetProperty { marker, path, value, .. } => {
				self.inner.properties.borrow_mut().record(marker, path, value.clone());
				for target in &targets {
					apply_property(target, path, value);
				}
			}
			Patch::ReplaceContent { html, .. } => {
				for target in &targets {
					target.set_inner_html(html);
					self.content_replaced(target);
				}
			}
			Patch::RunScript { code, .. } => {
				if let Err(message) = self.inner.evaluator.evaluate(code) {
					error!("Script patch failed: {}", message);
				}
			}
		}
	}

	pub(crate) fn declare_properties(&self, declarations: &[PropertyDeclaration]) {
		for declaration in declarations {
			let value = self.inner.properties.borrow_mut().declare(&declaration.marker, &declaration.path, declaration.value.clone());
			apply_property(&declaration.element, &declaration.path, &value);
		}
	}

	/// Brings freshly inserted content below `scope` to life: hooks, bindings, scripts and recorded properties.
	pub(crate) fn content_replaced(&self, scope: &Element) {
		self.enable_on(scope);
		self.reapply_properties(scope);
	}

	/// Re-applies recorded properties to `scope` and every marked element below it.
	fn reapply_properties(&self, scope: &Element) {
		let mut marked = select_all(scope, &format!("[{}]", attr::MARKER));
		marked.insert(0, scope.clone());

		let properties = self.inner.properties.borrow();
		for element in marked {
			if let Some(marker) = element.get_attribute(attr::MARKER) {
				for (path, value) in properties.get(&marker) {
					apply_property(&element, path, value);
				}
			}
		}
	}
}
