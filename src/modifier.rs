//! Listener modifiers: decorators like `debounce` that wrap a plain handler.
//!
//! A binding's `#options` part (`debounce(500, true)`) names a modifier in a [`ModifierRegistry`]
//! together with literal arguments. The registry resolves the name and wraps the handler.

use crate::literal::parse_arguments;
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use gloo_timers::callback::Timeout;
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::Rc;
use thiserror::Error;

/// A shareable plain listener.
pub type Handler<E> = Rc<dyn Fn(E)>;

/// Wraps a handler according to literal arguments, or explains why it can't.
pub type ModifierFactory<E> = Rc<dyn Fn(&[Value], Handler<E>) -> Result<Handler<E>, String>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModifierError {
	#[error("unknown modifier {0:?}")]
	Unknown(String),
	#[error("malformed modifier {options:?}: {reason}")]
	Malformed { options: String, reason: String },
}

/// Deferred execution. Dropping a handle cancels its callback if it hasn't run yet.
pub trait Schedule {
	type Handle: 'static;

	fn schedule(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Self::Handle;
}

/// [`Schedule`] backed by the browser's `setTimeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserTimers;

impl Schedule for BrowserTimers {
	type Handle = Timeout;

	fn schedule(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Timeout {
		Timeout::new(delay_ms, callback)
	}
}

struct DebounceState<H> {
	armed: Cell<bool>,
	timer: RefCell<Option<H>>,
}

/// Delays calls to `handler` until `wait_ms` have passed without another call.
///
/// Without `immediate`, only the last call of a burst goes through, `wait_ms` after it was made.
/// With `immediate`, the first call of a burst goes through at once and the rest of the burst is dropped,
/// until `wait_ms` pass without a call.
pub fn debounce<E: 'static, S: Schedule + 'static>(handler: Handler<E>, wait_ms: u32, immediate: bool, scheduler: S) -> Handler<E> {
	let state = Rc::new(DebounceState::<S::Handle> {
		armed: Cell::new(false),
		timer: RefCell::new(None),
	});
	Rc::new(move |event: E| {
		let call_now = immediate && !state.armed.get();
		let (now, deferred) = if immediate { (Some(event), None) } else { (None, Some(event)) };

		let later = {
			let state = Rc::downgrade(&state);
			let handler = Rc::clone(&handler);
			Box::new(move || {
				if let Some(state) = state.upgrade() {
					state.armed.set(false);
				}
				if let Some(event) = deferred {
					handler(event);
				}
			})
		};
		state.armed.set(true);
		let previous = state.timer.replace(Some(scheduler.schedule(wait_ms, later)));
		drop(previous);

		if call_now {
			if let Some(event) = now {
				handler(event);
			}
		}
	})
}

/// Lets at most one call per `wait_ms` through to `handler`, starting with the first. The others are dropped.
pub fn throttle<E: 'static, S: Schedule + 'static>(handler: Handler<E>, wait_ms: u32, scheduler: S) -> Handler<E> {
	let state = Rc::new(DebounceState::<S::Handle> {
		armed: Cell::new(false),
		timer: RefCell::new(None),
	});
	Rc::new(move |event: E| {
		if state.armed.get() {
			return;
		}
		state.armed.set(true);
		let release = {
			let state = Rc::downgrade(&state);
			Box::new(move || {
				if let Some(state) = state.upgrade() {
					state.armed.set(false);
				}
			})
		};
		let previous = state.timer.replace(Some(scheduler.schedule(wait_ms, release)));
		drop(previous);
		handler(event);
	})
}

/// Maps modifier names to factories. The core only ever [resolves](`ModifierRegistry::resolve`) names.
pub struct ModifierRegistry<E> {
	factories: HashMap<String, ModifierFactory<E>>,
}

impl<E> Debug for ModifierRegistry<E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.factories.keys()).finish()
	}
}

impl<E: 'static> Default for ModifierRegistry<E> {
	fn default() -> Self {
		Self::new()
	}
}

impl<E: 'static> ModifierRegistry<E> {
	/// An empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self { factories: HashMap::new() }
	}

	/// A registry with `debounce(wait_ms = 0, immediate = false)` and `throttle(wait_ms = 0)`, timed by `scheduler`.
	#[must_use]
	pub fn with_timers<S: Schedule + Clone + 'static>(scheduler: S) -> Self {
		let mut registry = Self::new();
		{
			let scheduler = scheduler.clone();
			registry.register("debounce", move |arguments, handler| {
				let wait_ms = wait_argument(arguments.get(0))?;
				let immediate = match arguments.get(1) {
					None | Some(Value::Null) => false,
					Some(Value::Bool(immediate)) => *immediate,
					Some(other) => return Err(format!("`immediate` must be a boolean, not {}", other)),
				};
				Ok(debounce(handler, wait_ms, immediate, scheduler.clone()))
			});
		}
		registry.register("throttle", move |arguments, handler| Ok(throttle(handler, wait_argument(arguments.get(0))?, scheduler.clone())));
		registry
	}

	pub fn register(&mut self, name: &str, factory: impl Fn(&[Value], Handler<E>) -> Result<Handler<E>, String> + 'static) {
		self.factories.insert(name.to_owned(), Rc::new(factory));
	}

	#[must_use]
	pub fn resolve(&self, name: &str) -> Option<&ModifierFactory<E>> {
		self.factories.get(name)
	}

	/// Wraps `handler` as described by `options`, e.g. `debounce(500, true)` or just `debounce`.
	///
	/// # Errors
	///
	/// Iff the modifier is unknown or `options` or its arguments are malformed.
	pub fn wrap(&self, options: &str, handler: Handler<E>) -> Result<Handler<E>, ModifierError> {
		let malformed = |reason: String| ModifierError::Malformed { options: options.to_owned(), reason };
		let options_trimmed = options.trim();
		let (name, arguments) = match options_trimmed.find('(') {
			Some(open) => {
				let source = options_trimmed[open + 1..].strip_suffix(')').ok_or_else(|| malformed("missing `)`".to_owned()))?;
				(options_trimmed[..open].trim(), parse_arguments(source).map_err(|error| malformed(error.to_string()))?)
			}
			None => (options_trimmed, Vec::new()),
		};
		let factory = self.resolve(name).ok_or_else(|| ModifierError::Unknown(name.to_owned()))?;
		factory(&arguments, handler).map_err(malformed)
	}
}

fn wait_argument(argument: Option<&Value>) -> Result<u32, String> {
	match argument {
		None | Some(Value::Null) => Ok(0),
		Some(Value::Number(number)) => number
			.as_u64()
			.and_then(|wait| u32::try_from(wait).ok())
			.ok_or_else(|| format!("`wait` must be a non-negative integer of milliseconds, not {}", number)),
		Some(other) => Err(format!("`wait` must be a number, not {}", other)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Task {
		due: u64,
		cancelled: Rc<Cell<bool>>,
		callback: Option<Box<dyn FnOnce()>>,
	}

	/// Virtual clock: callbacks only run on [`ManualScheduler::advance`].
	#[derive(Clone, Default)]
	struct ManualScheduler {
		now: Rc<Cell<u64>>,
		tasks: Rc<RefCell<Vec<Task>>>,
	}

	struct ManualHandle(Rc<Cell<bool>>);
	impl Drop for ManualHandle {
		fn drop(&mut self) {
			self.0.set(true);
		}
	}

	impl Schedule for ManualScheduler {
		type Handle = ManualHandle;

		fn schedule(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> ManualHandle {
			let cancelled = Rc::new(Cell::new(false));
			self.tasks.borrow_mut().push(Task {
				due: self.now.get() + u64::from(delay_ms),
				cancelled: Rc::clone(&cancelled),
				callback: Some(callback),
			});
			ManualHandle(cancelled)
		}
	}

	impl ManualScheduler {
		fn advance(&self, ms: u64) {
			let target = self.now.get() + ms;
			loop {
				let next = {
					let mut tasks = self.tasks.borrow_mut();
					tasks.retain(|task| !task.cancelled.get() && task.callback.is_some());
					let index = tasks.iter().enumerate().filter(|(_, task)| task.due <= target).min_by_key(|(_, task)| task.due).map(|(i, _)| i);
					index.map(|i| {
						let task = &mut tasks[i];
						(task.due, task.callback.take())
					})
				};
				match next {
					Some((due, Some(callback))) => {
						self.now.set(due);
						callback();
					}
					_ => break,
				}
			}
			self.now.set(target);
		}
	}

	fn recorder() -> (Rc<RefCell<Vec<(u64, u32)>>>, impl Fn(&ManualScheduler) -> Handler<u32>) {
		let calls = Rc::new(RefCell::new(Vec::new()));
		let make = {
			let calls = Rc::clone(&calls);
			move |scheduler: &ManualScheduler| -> Handler<u32> {
				let calls = Rc::clone(&calls);
				let now = Rc::clone(&scheduler.now);
				Rc::new(move |value: u32| calls.borrow_mut().push((now.get(), value)))
			}
		};
		(calls, make)
	}

	#[test]
	fn trailing_debounce_fires_once_after_the_last_call() {
		let scheduler = ManualScheduler::default();
		let (calls, make) = recorder();
		let debounced = debounce(make(&scheduler), 500, false, scheduler.clone());

		debounced(1);
		scheduler.advance(100);
		debounced(2);
		scheduler.advance(100);
		debounced(3);

		scheduler.advance(499);
		assert!(calls.borrow().is_empty());
		scheduler.advance(1);
		assert_eq!(*calls.borrow(), vec![(700, 3)]);

		scheduler.advance(5000);
		assert_eq!(calls.borrow().len(), 1);
	}

	#[test]
	fn immediate_debounce_fires_first_and_suppresses_the_burst() {
		let scheduler = ManualScheduler::default();
		let (calls, make) = recorder();
		let debounced = debounce(make(&scheduler), 500, true, scheduler.clone());

		debounced(1);
		scheduler.advance(300);
		debounced(2);
		scheduler.advance(300);
		debounced(3);
		assert_eq!(*calls.borrow(), vec![(0, 1)]);

		// The window restarts with each call, so it closes 500ms after the third.
		scheduler.advance(499);
		debounced(4);
		assert_eq!(calls.borrow().len(), 1);

		scheduler.advance(500);
		debounced(5);
		assert_eq!(*calls.borrow(), vec![(0, 1), (1599, 5)]);
	}

	#[test]
	fn throttle_lets_one_call_through_per_window() {
		let scheduler = ManualScheduler::default();
		let (calls, make) = recorder();
		let throttled = throttle(make(&scheduler), 200, scheduler.clone());

		throttled(1);
		throttled(2);
		scheduler.advance(199);
		throttled(3);
		scheduler.advance(1);
		throttled(4);
		assert_eq!(*calls.borrow(), vec![(0, 1), (200, 4)]);
	}

	#[test]
	fn registry_wraps_by_name() {
		let scheduler = ManualScheduler::default();
		let registry = ModifierRegistry::with_timers(scheduler.clone());
		let (calls, make) = recorder();

		let wrapped = registry.wrap("debounce(50)", make(&scheduler)).unwrap();
		wrapped(1);
		wrapped(2);
		scheduler.advance(50);
		assert_eq!(*calls.borrow(), vec![(50, 2)]);

		let bare = registry.wrap(" throttle ", make(&scheduler)).unwrap();
		bare(3);
		assert_eq!(calls.borrow().len(), 2);
	}

	#[test]
	fn registry_errors() {
		let scheduler = ManualScheduler::default();
		let registry = ModifierRegistry::<u32>::with_timers(scheduler.clone());
		let (_, make) = recorder();

		assert_eq!(registry.wrap("repeat(2)", make(&scheduler)).err(), Some(ModifierError::Unknown("repeat".to_owned())));
		assert!(matches!(registry.wrap("debounce(-1)", make(&scheduler)), Err(ModifierError::Malformed { .. })));
		assert!(matches!(registry.wrap("debounce(500, 'yes')", make(&scheduler)), Err(ModifierError::Malformed { .. })));
		assert!(matches!(registry.wrap("debounce(500", make(&scheduler)), Err(ModifierError::Malformed { .. })));
	}

	#[test]
	fn custom_modifiers_can_be_registered() {
		let mut registry = ModifierRegistry::<u32>::new();
		registry.register("twice", |_, handler| {
			Ok(Rc::new(move |value: u32| {
				handler(value);
				handler(value);
			}))
		});
		assert!(registry.resolve("twice").is_some());
		assert!(registry.resolve("debounce").is_none());

		let scheduler = ManualScheduler::default();
		let (calls, make) = recorder();
		registry.wrap("twice()", make(&scheduler)).unwrap()(7);
		assert_eq!(calls.borrow().len(), 2);
	}
}
