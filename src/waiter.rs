use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::{scheduler, Handler, Promise, Value};

/// A `std` future over a [`Promise`], produced by `promise.await` or
/// [`IntoFuture::into_future`].
///
/// The outcome arrives through an ordinary `then`, so it is only ever seen
/// after the promise settles and the queue has been drained. Every poll
/// drains the current thread's queue first.
///
/// # Examples
///
/// ```
/// use aplus_future::{deferred, Value};
/// use futures::executor::block_on;
///
/// let d = deferred();
/// d.reject.call(Value::from("💥"));
/// assert_eq!(block_on(async { d.promise.await }), Err(Value::from("💥")));
/// ```
#[derive(Debug)]
pub struct Waiter {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    outcome: Option<Result<Value, Value>>,
    waker: Option<Waker>,
}

impl Inner {
    fn complete(inner: &RefCell<Inner>, outcome: Result<Value, Value>) {
        let waker = {
            let mut inner = inner.borrow_mut();
            inner.outcome = Some(outcome);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake()
        }
    }
}

impl Waiter {
    fn new(promise: &Promise) -> Self {
        let inner = Rc::new(RefCell::new(Inner::default()));
        let fulfilled = inner.clone();
        let rejected = inner.clone();
        promise.then(
            Some(Handler::new(move |value| {
                Inner::complete(&fulfilled, Ok(value));
                Ok(Value::Undefined)
            })),
            Some(Handler::new(move |reason| {
                Inner::complete(&rejected, Err(reason));
                Ok(Value::Undefined)
            })),
        );
        Waiter { inner }
    }
}

impl Future for Waiter {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        scheduler::run();
        let mut inner = self.inner.borrow_mut();
        match inner.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                inner.waker = Some(cx.waker().clone());
                // Whoever settles the promise next has to queue a unit first.
                scheduler::park(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl IntoFuture for Promise {
    type Output = Result<Value, Value>;
    type IntoFuture = Waiter;

    fn into_future(self) -> Waiter {
        Waiter::new(&self)
    }
}
