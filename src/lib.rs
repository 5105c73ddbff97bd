#![doc(html_root_url = "https://docs.rs/tether-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Browser-side runtime for server-driven UIs.
//!
//! Elements declare remote calls through attributes like `tether="click:Cart.add(3)"`.
//! A [`Runtime`] scans the document for them, attaches listeners, sends a payload describing the element
//! over one multiplexed channel whenever such an event fires, and applies the [`Patch`]es the server pushes back.
//!
//! The channel itself is provided by the application as a [`Transport`].

pub mod binding;
pub mod channel;
pub mod config;
mod dispatch;
pub mod element;
mod js;
pub mod lifecycle;
pub mod literal;
pub mod load;
pub mod marker;
pub mod modal;
pub mod modifier;
pub mod patch;
pub mod payload;
mod runtime;
pub mod scan;
pub mod waiter;

pub use channel::{Completion, Evaluator, PageEvaluator, Transport};
pub use config::Config;
pub use element::InsertPosition;
pub use lifecycle::ConnectionState;
pub use modal::{ModalAnswer, ModalPresenter, ModalRequest};
pub use patch::Patch;
pub use runtime::{Runtime, RuntimeBuilder, RuntimeError};
