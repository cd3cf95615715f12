//! A Promises/A+ future for single-threaded code.
//!
//! A [`Promise`] settles exactly once, fulfilled with a [`Value`] or rejected
//! with one. Continuations attached through [`Promise::then`] never run
//! synchronously: they are queued as deferred units on the thread's
//! [`scheduler`] and run, in FIFO order, whenever the queue is drained.
//!
//! # Examples
//!
//! ```
//! use aplus_future::{scheduler, Handler, Promise, Value};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let seen = Rc::new(RefCell::new(Value::Undefined));
//! let sink = seen.clone();
//! Promise::resolve(Value::from(20))
//!     .then(Some(Handler::new(|v| Ok(Value::from(v.as_number().unwrap_or(0.0) + 1.0)))), None)
//!     .then(Some(Handler::new(move |v| { *sink.borrow_mut() = v; Ok(Value::Undefined) })), None);
//!
//! assert_eq!(*seen.borrow(), Value::Undefined);
//! scheduler::run();
//! assert_eq!(*seen.borrow(), Value::from(21));
//! ```
pub mod adapter;
mod future;
mod resolution;
pub mod scheduler;
mod value;
mod waiter;

pub use adapter::{deferred, rejected, resolved, Deferred};
pub use future::{Handler, Promise, Reject, Resolve};
pub use value::{Member, Object, Value};
pub use waiter::Waiter;

use thiserror::Error;

/// Rejection reasons produced by the library itself.
///
/// They travel through the promise graph as [`Value::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Chaining cycle detected for promise")]
    ChainingCycle,
    #[error("promises must be an array")]
    NotASequence,
    #[error("value is not callable")]
    NotCallable,
}
