//! Declarative binding syntax.
//!
//! A binding list is a space-separated sequence of tokens of the form `event[#options]:handler[(arguments)]`, for example:
//!
//! ```text
//! click:save change#debounce(300):Search.update('name', {strict: true})
//! ```
//!
//! Whitespace inside parentheses, brackets, braces or quoted strings doesn't separate tokens.

use crate::literal::{parse_arguments, parse_literal, LiteralError};
use core::fmt::{self, Display, Formatter};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedBinding {
	#[error("binding {0:?} names no event")]
	MissingEvent(String),
	#[error("binding {0:?} names no handler")]
	MissingHandler(String),
	#[error("binding {0:?} has unbalanced parentheses or quotes")]
	Unbalanced(String),
	#[error("binding {token:?} has an invalid argument list: {source}")]
	Argument { token: String, source: LiteralError },
}

/// One parsed binding, normalised from either the canonical or a shorthand syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingToken {
	pub event: String,
	/// Modifier expression, like `debounce(500, true)`.
	pub options: Option<String>,
	/// Possibly namespace-qualified handler name, without arguments.
	pub handler: String,
	/// Literal arguments. Empty both for `handler` and `handler()`.
	pub arguments: Vec<Value>,
}

impl BindingToken {
	/// Parses a single token.
	///
	/// # Errors
	///
	/// Iff the event or handler name is missing, brackets are unbalanced or the arguments aren't literals.
	pub fn parse(token: &str) -> Result<Self, MalformedBinding> {
		let unbalanced = || MalformedBinding::Unbalanced(token.to_owned());
		let top_level = top_level(token).ok_or_else(unbalanced)?;
		let colon = top_level
			.iter()
			.find(|&&(_, c)| c == ':')
			.map(|&(i, _)| i)
			.ok_or_else(|| MalformedBinding::MissingHandler(token.to_owned()))?;

		let (head, call) = (&token[..colon], token[colon + 1..].trim());
		let (event, options) = match head.split_once('#') {
			Some((event, options)) => (event.trim(), Some(options.trim()).filter(|options| !options.is_empty())),
			None => (head.trim(), None),
		};
		if event.is_empty() {
			return Err(MalformedBinding::MissingEvent(token.to_owned()));
		}

		let (handler, arguments) = match call.find('(') {
			Some(open) => {
				if !call.ends_with(')') {
					return Err(unbalanced());
				}
				let source = &call[open + 1..call.len() - 1];
				let arguments = parse_arguments(source).map_err(|source| MalformedBinding::Argument { token: token.to_owned(), source })?;
				(call[..open].trim(), arguments)
			}
			None if call.contains(')') => return Err(unbalanced()),
			None => (call, Vec::new()),
		};
		if handler.is_empty() {
			return Err(MalformedBinding::MissingHandler(token.to_owned()));
		}

		Ok(Self {
			event: event.to_owned(),
			options: options.map(ToOwned::to_owned),
			handler: handler.to_owned(),
			arguments,
		})
	}

	/// Whether the handler name already carries a namespace, as in `Widget.render`.
	#[must_use]
	pub fn is_qualified(&self) -> bool {
		self.handler.contains('.')
	}

	/// Prefixes an unqualified handler name with a shared scope's `qualifier`.
	///
	/// Returns whether the name was changed.
	pub fn qualify(&mut self, qualifier: &str) -> bool {
		let qualifier = qualifier.trim();
		if qualifier.is_empty() || self.is_qualified() {
			return false;
		}
		self.handler = format!("{}.{}", qualifier, self.handler);
		true
	}

	/// Injects `literal` as the sole argument iff no arguments were given explicitly.
	///
	/// Returns whether the argument was injected.
	///
	/// # Errors
	///
	/// Iff `literal` isn't a literal value.
	pub fn inject_argument(&mut self, literal: &str) -> Result<bool, MalformedBinding> {
		if !self.arguments.is_empty() {
			return Ok(false);
		}
		let value = parse_literal(literal).map_err(|source| MalformedBinding::Argument { token: self.to_string(), source })?;
		self.arguments.push(value);
		Ok(true)
	}

	/// The value sent as the payload's `argument` field: the sole argument, an array of several, or nothing.
	#[must_use]
	pub fn argument(&self) -> Option<Value> {
		match self.arguments.as_slice() {
			[] => None,
			[single] => Some(single.clone()),
			several => Some(Value::Array(several.to_vec())),
		}
	}
}

impl Display for BindingToken {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.event)?;
		if let Some(options) = &self.options {
			write!(f, "#{}", options)?;
		}
		write!(f, ":{}", self.handler)?;
		if !self.arguments.is_empty() {
			f.write_str("(")?;
			for (i, argument) in self.arguments.iter().enumerate() {
				if i > 0 {
					f.write_str(", ")?;
				}
				write!(f, "{}", argument)?;
			}
			f.write_str(")")?;
		}
		Ok(())
	}
}

/// Splits a binding list into tokens at top-level whitespace.
///
/// # Errors
///
/// Iff brackets or quotes in `list` are unbalanced.
pub fn split_tokens(list: &str) -> Result<Vec<&str>, MalformedBinding> {
	let top_level = top_level(list).ok_or_else(|| MalformedBinding::Unbalanced(list.to_owned()))?;
	let mut tokens = Vec::new();
	let mut start = 0;
	for (i, c) in top_level.into_iter().filter(|(_, c)| c.is_whitespace()) {
		if i > start {
			tokens.push(&list[start..i]);
		}
		start = i + c.len_utf8();
	}
	if start < list.len() {
		tokens.push(&list[start..]);
	}
	Ok(tokens)
}

/// Parses every token of a binding list. Malformed tokens are returned as errors in place.
#[must_use]
pub fn parse_list(list: &str) -> Vec<Result<BindingToken, MalformedBinding>> {
	match split_tokens(list) {
		Ok(tokens) => tokens.into_iter().map(BindingToken::parse).collect(),
		Err(error) => vec![Err(error)],
	}
}

/// Rewrites a shorthand declaration (`tether-click="save(1)"`) into canonical token syntax.
#[must_use]
pub fn shorthand_token(event: &str, call: &str, options: Option<&str>) -> String {
	match options.map(str::trim).filter(|options| !options.is_empty()) {
		Some(options) => format!("{}#{}:{}", event, options, call.trim()),
		None => format!("{}:{}", event, call.trim()),
	}
}

/// Collects the characters of `source` that are outside any brackets and quotes, with their byte offsets.
///
/// Returns [`None`] if brackets or quotes are unbalanced.
fn top_level(source: &str) -> Option<Vec<(usize, char)>> {
	let mut depth = 0_usize;
	let mut quote = None;
	let mut escaped = false;
	let mut characters = Vec::new();
	for (i, c) in source.char_indices() {
		if let Some(open) = quote {
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == open {
				quote = None;
			}
			continue;
		}
		match c {
			'"' | '\'' if depth > 0 => quote = Some(c),
			'(' | '[' | '{' => depth += 1,
			')' | ']' | '}' => depth = depth.checked_sub(1)?,
			_ if depth == 0 => characters.push((i, c)),
			_ => (),
		}
	}
	(depth == 0 && quote.is_none()).then(|| characters)
}
