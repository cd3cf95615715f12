//! The deferred-unit queue.
//!
//! Every thread owns one FIFO queue. Promises push their continuations onto
//! it with [`defer`] and nothing runs until somebody calls [`run`], which
//! keeps going until the queue is empty, including units queued by the
//! units it runs.
//!
//! # Examples
//!
//! ```
//! use aplus_future::scheduler;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let order = Rc::new(RefCell::new(Vec::new()));
//! for i in 0..3 {
//!     let order = order.clone();
//!     scheduler::defer(move || order.borrow_mut().push(i));
//! }
//! assert!(order.borrow().is_empty());
//! assert_eq!(scheduler::run(), 3);
//! assert_eq!(*order.borrow(), vec![0, 1, 2]);
//! ```
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::task::Waker;

use tracing::trace;

type Unit = Box<dyn FnOnce()>;

#[derive(Default)]
struct Queue {
    units: RefCell<VecDeque<Unit>>,
    draining: Cell<bool>,
    // Tasks waiting for work to show up on this queue.
    parked: RefCell<Vec<Waker>>,
}

thread_local! {
    static QUEUE: Queue = Queue::default();
}

struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Queues `unit` behind everything already queued on this thread.
pub fn defer<F>(unit: F)
where
    F: FnOnce() + 'static,
{
    let parked = QUEUE.with(|queue| {
        let mut units = queue.units.borrow_mut();
        units.push_back(Box::new(unit));
        trace!(pending = units.len(), "deferred unit queued");
        std::mem::take(&mut *queue.parked.borrow_mut())
    });
    for waker in parked {
        waker.wake();
    }
}

/// Runs queued units until the queue is empty and returns how many ran.
///
/// A unit that calls `run` itself gets `0` back; the outer drain picks up
/// whatever it queued.
pub fn run() -> usize {
    QUEUE.with(|queue| {
        if queue.draining.replace(true) {
            return 0;
        }
        let _draining = Draining(&queue.draining);
        let mut ran = 0;
        loop {
            let next = queue.units.borrow_mut().pop_front();
            match next {
                Some(unit) => {
                    unit();
                    ran += 1;
                }
                None => break,
            }
        }
        if ran > 0 {
            trace!(ran, "deferred queue drained");
        }
        ran
    })
}

/// Number of units waiting to run.
pub fn pending() -> usize {
    QUEUE.with(|queue| queue.units.borrow().len())
}

/// Whether nothing is waiting to run.
pub fn is_idle() -> bool {
    pending() == 0
}

/// Wakes `waker` the next time a unit is queued on this thread.
///
/// Parked wakers are only released by that next [`defer`], even when the
/// waiter that parked them has completed in the meantime. A stale waker
/// costs one spurious wake-up. Pruning on completion could drop a waker
/// that another waiter in the same task still relies on.
pub(crate) fn park(waker: &Waker) {
    QUEUE.with(|queue| {
        let mut parked = queue.parked.borrow_mut();
        if !parked.iter().any(|w| w.will_wake(waker)) {
            parked.push(waker.clone());
        }
    });
}

#[cfg(test)]
fn parked() -> usize {
    QUEUE.with(|queue| queue.parked.borrow().len())
}
