//! Collects the declarative bindings of a DOM subtree into one normalised table.

use crate::{
	binding::{parse_list, shorthand_token, BindingToken},
	config::{attr, Config},
	literal::parse_literal,
	load::{camel_case, load_attributes, select_all},
	marker::ensure_marker,
};
use serde_json::Value;
use tracing::{error, trace, warn};
use web_sys::Element;

/// One bound (element, event) pair.
#[derive(Debug, Clone)]
pub struct Binding {
	pub element: Element,
	pub marker: String,
	pub token: BindingToken,
	/// Whether the element sits under a [shared scope](`attr::SCOPE`).
	pub shared_scope: bool,
}

/// An element property declared through a [property-binding attribute](`attr::PROPERTY_PREFIX`).
#[derive(Debug, Clone)]
pub struct PropertyDeclaration {
	pub element: Element,
	pub marker: String,
	/// Dotted path below the element, like `style.backgroundColor`.
	pub path: String,
	pub value: Value,
}

#[derive(Debug, Default)]
pub struct ScanResult {
	pub bindings: Vec<Binding>,
	pub properties: Vec<PropertyDeclaration>,
	/// Number of malformed declarations that were reported and skipped.
	pub rejected: usize,
}

/// Scans `scope` and all of its descendants.
///
/// Scanning only reads the DOM, apart from attaching node markers to elements that need one,
/// so it can be repeated freely.
pub fn scan(scope: &Element, config: &Config) -> ScanResult {
	let mut result = ScanResult::default();
	visit(scope, config, &mut result);
	for element in select_all(scope, "*") {
		visit(&element, config, &mut result);
	}
	trace!(bindings = result.bindings.len(), properties = result.properties.len(), rejected = result.rejected, "Scanned subtree.");
	result
}

fn visit(element: &Element, config: &Config, result: &mut ScanResult) {
	let attributes = load_attributes(element);
	let lookup = |name: &str| attributes.iter().find(|(n, _)| n == name).map(|(_, value)| value.as_str());
	let options = lookup(attr::OPTIONS);

	let mut lists = Vec::new();
	let mut properties = Vec::new();
	for (name, value) in &attributes {
		if name == attr::BINDINGS {
			lists.push(value.clone());
		} else if let Some(path) = name.strip_prefix(attr::PROPERTY_PREFIX) {
			properties.push((camel_case(path), parse_literal(value).unwrap_or_else(|_| Value::String(value.clone()))));
		} else if let Some(event) = name.strip_prefix(attr::SHORTHAND_PREFIX).filter(|&event| config.is_shorthand_event(event)) {
			lists.push(shorthand_token(event, value, options));
		}
	}

	match (lookup(attr::EVENT), lookup(attr::HANDLER)) {
		(Some(event), Some(handler)) => lists.push(shorthand_token(event, handler, options)),
		(Some(event), None) => {
			error!("`{}=\"{}\"` declared without `{}`.", attr::EVENT, event, attr::HANDLER);
			result.rejected += 1;
		}
		(None, Some(handler)) => {
			error!("`{}=\"{}\"` declared without `{}`.", attr::HANDLER, handler, attr::EVENT);
			result.rejected += 1;
		}
		(None, None) => (),
	}

	let qualifier = match element.closest(&format!("[{}]", attr::SCOPE)) {
		Ok(scope) => scope.and_then(|scope| scope.get_attribute(attr::SCOPE)),
		Err(error) => {
			error!("Failed to look up shared scope: {:?}", error);
			None
		}
	};
	let argument = lookup(attr::ARGUMENT);

	let mut tokens: Vec<BindingToken> = Vec::new();
	for parsed in lists.iter().flat_map(|list| parse_list(list)) {
		let mut token = match parsed {
			Ok(token) => token,
			Err(error) => {
				error!("Malformed binding: {}", error);
				result.rejected += 1;
				continue;
			}
		};

		if let Some(qualifier) = &qualifier {
			token.qualify(qualifier);
		}
		if let Some(argument) = argument {
			if let Err(error) = token.inject_argument(argument) {
				error!("Malformed binding: {}", error);
				result.rejected += 1;
				continue;
			}
		}

		match tokens.iter_mut().find(|existing| existing.event == token.event) {
			Some(existing) => {
				warn!("Binding `{}` overrides `{}` for the same event.", token, existing);
				*existing = token;
			}
			None => tokens.push(token),
		}
	}

	if tokens.is_empty() && properties.is_empty() {
		return;
	}

	let marker = ensure_marker(element);

	for (path, value) in properties {
		result.properties.push(PropertyDeclaration {
			element: element.clone(),
			marker: marker.clone(),
			path,
			value,
		});
	}

	result.bindings.extend(tokens.into_iter().map(|token| Binding {
		element: element.clone(),
		marker: marker.clone(),
		token,
		shared_scope: qualifier.is_some(),
	}));
}
