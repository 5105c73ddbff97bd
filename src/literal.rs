//! Literal-only parsing of inline handler and modifier arguments.
//!
//! Accepted are numbers, single- or double-quoted strings, `true`, `false`, `null`,
//! arrays and objects (with bare or quoted keys). Anything resembling code is rejected.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// How deeply arrays and objects may nest.
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
	#[error("unexpected end of literal")]
	UnexpectedEnd,
	#[error("unexpected {found:?} at offset {offset}")]
	Unexpected { found: char, offset: usize },
	#[error("invalid number {0:?}")]
	InvalidNumber(String),
	#[error("invalid escape sequence at offset {0}")]
	InvalidEscape(usize),
	#[error("literal nested deeper than {} levels at offset {0}", MAX_DEPTH)]
	TooDeep(usize),
}

/// Parses exactly one literal value.
///
/// # Errors
///
/// Iff `source` isn't a single well-formed literal.
pub fn parse_literal(source: &str) -> Result<Value, LiteralError> {
	let mut parser = Parser::new(source);
	parser.skip_whitespace();
	let value = parser.value()?;
	parser.skip_whitespace();
	match parser.peek() {
		None => Ok(value),
		Some(found) => Err(parser.unexpected(found)),
	}
}

/// Parses a comma-separated argument list (without the surrounding parentheses).
///
/// Blank input is an empty list.
///
/// # Errors
///
/// Iff any argument isn't a well-formed literal or the separators are off.
pub fn parse_arguments(source: &str) -> Result<Vec<Value>, LiteralError> {
	let mut parser = Parser::new(source);
	let mut arguments = Vec::new();
	parser.skip_whitespace();
	if parser.peek().is_none() {
		return Ok(arguments);
	}
	loop {
		arguments.push(parser.value()?);
		parser.skip_whitespace();
		match parser.bump() {
			None => return Ok(arguments),
			Some(',') => parser.skip_whitespace(),
			Some(found) => {
				parser.offset -= found.len_utf8();
				return Err(parser.unexpected(found));
			}
		}
	}
}

struct Parser<'a> {
	source: &'a str,
	offset: usize,
	depth: usize,
}

impl<'a> Parser<'a> {
	fn new(source: &'a str) -> Self {
		Self { source, offset: 0, depth: 0 }
	}

	fn peek(&self) -> Option<char> {
		self.source[self.offset..].chars().next()
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.offset += c.len_utf8();
		Some(c)
	}

	fn skip_whitespace(&mut self) {
		while self.peek().map_or(false, char::is_whitespace) {
			self.bump();
		}
	}

	fn unexpected(&self, found: char) -> LiteralError {
		LiteralError::Unexpected { found, offset: self.offset }
	}

	fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
		match self.peek() {
			Some(c) if c == expected => {
				self.bump();
				Ok(())
			}
			Some(found) => Err(self.unexpected(found)),
			None => Err(LiteralError::UnexpectedEnd),
		}
	}

	fn value(&mut self) -> Result<Value, LiteralError> {
		match self.peek() {
			None => Err(LiteralError::UnexpectedEnd),
			Some(quote @ ('"' | '\'')) => self.string(quote).map(Value::String),
			Some('[') => self.nested(Self::array),
			Some('{') => self.nested(Self::object),
			Some('-' | '+' | '.' | '0'..='9') => self.number(),
			Some(c) if is_identifier_char(c) => {
				let start = self.offset;
				match self.identifier() {
					"true" => Ok(Value::Bool(true)),
					"false" => Ok(Value::Bool(false)),
					"null" => Ok(Value::Null),
					_ => Err(LiteralError::Unexpected { found: c, offset: start }),
				}
			}
			Some(found) => Err(self.unexpected(found)),
		}
	}

	fn nested(&mut self, parse: fn(&mut Self) -> Result<Value, LiteralError>) -> Result<Value, LiteralError> {
		if self.depth == MAX_DEPTH {
			return Err(LiteralError::TooDeep(self.offset));
		}
		self.depth += 1;
		let value = parse(self);
		self.depth -= 1;
		value
	}

	fn identifier(&mut self) -> &'a str {
		let start = self.offset;
		while self.peek().map_or(false, is_identifier_char) {
			self.bump();
		}
		&self.source[start..self.offset]
	}

	fn string(&mut self, quote: char) -> Result<String, LiteralError> {
		self.bump();
		let mut string = String::new();
		loop {
			match self.bump().ok_or(LiteralError::UnexpectedEnd)? {
				c if c == quote => return Ok(string),
				'\\' => {
					let escape_offset = self.offset - 1;
					let escaped = match self.bump().ok_or(LiteralError::UnexpectedEnd)? {
						'n' => '\n',
						't' => '\t',
						'r' => '\r',
						'b' => '\u{8}',
						'f' => '\u{c}',
						'0' => '\0',
						'u' => self.unicode_escape(escape_offset)?,
						c @ ('\\' | '/' | '\'' | '"') => c,
						_ => return Err(LiteralError::InvalidEscape(escape_offset)),
					};
					string.push(escaped);
				}
				c => string.push(c),
			}
		}
	}

	fn unicode_escape(&mut self, escape_offset: usize) -> Result<char, LiteralError> {
		let digits = self.source.get(self.offset..self.offset + 4).ok_or(LiteralError::UnexpectedEnd)?;
		let code = u32::from_str_radix(digits, 16).map_err(|_| LiteralError::InvalidEscape(escape_offset))?;
		self.offset += 4;
		char::from_u32(code).ok_or(LiteralError::InvalidEscape(escape_offset))
	}

	fn number(&mut self) -> Result<Value, LiteralError> {
		let start = self.offset;
		while self.peek().map_or(false, |c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
			self.bump();
		}
		let text = &self.source[start..self.offset];
		let trimmed = text.strip_prefix('+').unwrap_or(text);
		if let Ok(integer) = trimmed.parse::<i64>() {
			return Ok(Value::from(integer));
		}
		trimmed
			.parse::<f64>()
			.ok()
			.filter(|float| float.is_finite())
			.and_then(Number::from_f64)
			.map(Value::Number)
			.ok_or_else(|| LiteralError::InvalidNumber(text.to_owned()))
	}

	fn array(&mut self) -> Result<Value, LiteralError> {
		self.expect('[')?;
		let mut items = Vec::new();
		self.skip_whitespace();
		if self.peek() == Some(']') {
			self.bump();
			return Ok(Value::Array(items));
		}
		loop {
			self.skip_whitespace();
			items.push(self.value()?);
			self.skip_whitespace();
			match self.bump() {
				Some(',') => {}
				Some(']') => return Ok(Value::Array(items)),
				Some(found) => {
					self.offset -= found.len_utf8();
					return Err(self.unexpected(found));
				}
				None => return Err(LiteralError::UnexpectedEnd),
			}
		}
	}

	fn object(&mut self) -> Result<Value, LiteralError> {
		self.expect('{')?;
		let mut map = Map::new();
		self.skip_whitespace();
		if self.peek() == Some('}') {
			self.bump();
			return Ok(Value::Object(map));
		}
		loop {
			self.skip_whitespace();
			let key = match self.peek() {
				Some(quote @ ('"' | '\'')) => self.string(quote)?,
				Some(c) if is_identifier_char(c) => self.identifier().to_owned(),
				Some(found) => return Err(self.unexpected(found)),
				None => return Err(LiteralError::UnexpectedEnd),
			};
			self.skip_whitespace();
			self.expect(':')?;
			self.skip_whitespace();
			let value = self.value()?;
			map.insert(key, value);
			self.skip_whitespace();
			match self.bump() {
				Some(',') => {}
				Some('}') => return Ok(Value::Object(map)),
				Some(found) => {
					self.offset -= found.len_utf8();
					return Err(self.unexpected(found));
				}
				None => return Err(LiteralError::UnexpectedEnd),
			}
		}
	}
}

fn is_identifier_char(c: char) -> bool {
	c.is_alphanumeric() || c == '_' || c == '$'
}
