use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{resolution, scheduler, Error, Object, Value};

type Continuation = Box<dyn FnOnce(Value)>;

enum State {
    Pending {
        on_fulfilled: Vec<Continuation>,
        on_rejected: Vec<Continuation>,
    },
    Fulfilled(Value),
    Rejected(Value),
}

thread_local! {
    static TEARDOWN: Teardown = Teardown::default();
}

/// Continuations of dropped pending promises, released one at a time.
///
/// Each continuation owns the promise it feeds, so a pending `then` chain
/// would otherwise be freed by one nested drop per link.
#[derive(Default)]
struct Teardown {
    running: Cell<bool>,
    queue: RefCell<Vec<Continuation>>,
}

impl Teardown {
    fn release(continuations: Vec<Continuation>) {
        let released = TEARDOWN.try_with(|teardown| {
            teardown.queue.borrow_mut().extend(continuations);
            if teardown.running.replace(true) {
                // An outer release is already looping over the queue.
                return;
            }
            loop {
                let next = teardown.queue.borrow_mut().pop();
                match next {
                    Some(continuation) => drop(continuation),
                    None => break,
                }
            }
            teardown.running.set(false);
        });
        if released.is_err() {
            trace!("thread shutting down, pending continuations dropped in place");
        }
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if let State::Pending {
            on_fulfilled,
            on_rejected,
        } = self
        {
            if on_fulfilled.is_empty() && on_rejected.is_empty() {
                return;
            }
            let mut continuations = std::mem::take(on_fulfilled);
            continuations.append(on_rejected);
            Teardown::release(continuations);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Fulfilled,
    Rejected,
}

/// A value that becomes available, or fails, at most once.
///
/// `Promise` is a handle: clones share the same state and compare equal by
/// identity. Nothing about the outcome can be read directly; attach
/// continuations with [`then`](Promise::then) or await it.
///
/// # Examples
///
/// ```
/// use aplus_future::{Handler, Promise, Value};
/// use futures::executor::block_on;
///
/// let promise = Promise::new(|resolve, _reject| {
///     resolve.call(Value::from("🍓"));
///     Ok(())
/// });
/// let loud = promise.then(
///     Some(Handler::new(|v| match v {
///         Value::Str(s) => Ok(Value::from(format!("{s}!"))),
///         other => Ok(other),
///     })),
///     None,
/// );
/// assert_eq!(block_on(async { loud.await }), Ok(Value::from("🍓!")));
/// ```
#[derive(Clone)]
pub struct Promise {
    state: Rc<RefCell<State>>,
}

/// A one-shot continuation handed to [`Promise::then`].
///
/// Returning `Err` means the handler raised; the dependent promise is
/// rejected with that value.
pub struct Handler(Box<dyn FnOnce(Value) -> Result<Value, Value>>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        Handler(Box::new(f))
    }

    /// Wraps a callable value, invoked with an undefined receiver. Returns
    /// `None` for anything that cannot be called, which `then` treats the
    /// same as a missing handler.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(f) if f.is_callable() => {
                let f = f.clone();
                Some(Handler::new(move |v| f.call(Value::Undefined, vec![v])))
            }
            _ => None,
        }
    }

    fn invoke(self, argument: Value) -> Result<Value, Value> {
        (self.0)(argument)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// The fulfil capability of a promise.
///
/// Calling it with another [`Promise`] makes this one follow that promise.
/// Any other value settles this promise on the next drain, unless it has
/// settled by then.
#[derive(Debug, Clone)]
pub struct Resolve {
    promise: Promise,
}

/// The reject capability of a promise.
#[derive(Debug, Clone)]
pub struct Reject {
    promise: Promise,
}

impl Resolve {
    pub(crate) fn new(promise: &Promise) -> Self {
        Resolve {
            promise: promise.clone(),
        }
    }

    pub fn call(&self, value: Value) {
        if let Value::Promise(inner) = &value {
            if inner.ptr_eq(&self.promise) {
                debug!("promise resolved with itself");
                Reject::new(&self.promise).call(Error::ChainingCycle.into());
                return;
            }
            let resolve = self.clone();
            let reject = Reject::new(&self.promise);
            inner.then(
                Some(Handler::new(move |v| {
                    resolve.call(v);
                    Ok(Value::Undefined)
                })),
                Some(Handler::new(move |r| {
                    reject.call(r);
                    Ok(Value::Undefined)
                })),
            );
            return;
        }
        self.promise.settle_later(Outcome::Fulfilled, value);
    }

    /// This capability as a callable value taking one argument.
    pub fn to_function(&self) -> Value {
        let resolve = self.clone();
        Value::function(move |_, args| {
            resolve.call(args.into_iter().next().unwrap_or_default());
            Ok(Value::Undefined)
        })
    }
}

impl Reject {
    pub(crate) fn new(promise: &Promise) -> Self {
        Reject {
            promise: promise.clone(),
        }
    }

    pub fn call(&self, reason: Value) {
        self.promise.settle_later(Outcome::Rejected, reason);
    }

    pub fn to_function(&self) -> Value {
        let reject = self.clone();
        Value::function(move |_, args| {
            reject.call(args.into_iter().next().unwrap_or_default());
            Ok(Value::Undefined)
        })
    }
}

/// A handler bound to the promise that receives its result.
struct Reaction {
    handler: Handler,
    dependent: Promise,
}

impl Reaction {
    fn run(self, argument: Value) {
        let resolve = Resolve::new(&self.dependent);
        let reject = Reject::new(&self.dependent);
        match self.handler.invoke(argument) {
            Ok(x) => resolution::resolve(&self.dependent, x, resolve, reject),
            Err(error) => reject.call(error),
        }
    }

    fn schedule(self, argument: Value) {
        scheduler::defer(move || self.run(argument));
    }
}

impl Promise {
    /// Creates a promise and runs `setup` right away with its two
    /// capabilities. An `Err` from `setup` rejects the promise.
    pub fn new<F>(setup: F) -> Promise
    where
        F: FnOnce(Resolve, Reject) -> Result<(), Value>,
    {
        let promise = Promise::pending();
        let reject = Reject::new(&promise);
        if let Err(error) = setup(Resolve::new(&promise), reject.clone()) {
            reject.call(error);
        }
        promise
    }

    pub(crate) fn pending() -> Promise {
        Promise {
            state: Rc::new(RefCell::new(State::Pending {
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
            })),
        }
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn settle_later(&self, outcome: Outcome, value: Value) {
        let promise = self.clone();
        scheduler::defer(move || promise.settle(outcome, value));
    }

    fn settle(&self, outcome: Outcome, value: Value) {
        let mut state = self.state.borrow_mut();
        let State::Pending {
            on_fulfilled,
            on_rejected,
        } = &mut *state
        else {
            trace!(?outcome, "settlement ignored, promise already settled");
            return;
        };
        let waiters = match outcome {
            Outcome::Fulfilled => std::mem::take(on_fulfilled),
            Outcome::Rejected => std::mem::take(on_rejected),
        };
        *state = match outcome {
            Outcome::Fulfilled => State::Fulfilled(value.clone()),
            Outcome::Rejected => State::Rejected(value.clone()),
        };
        drop(state);
        trace!(?outcome, waiters = waiters.len(), "promise settled");
        for waiter in waiters {
            waiter(value.clone());
        }
    }

    /// Attaches continuations and returns the promise that receives their
    /// result. Returns before either handler runs.
    ///
    /// A missing `on_fulfilled` passes the value through; a missing
    /// `on_rejected` passes the reason through.
    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let on_fulfilled = on_fulfilled.unwrap_or_else(|| Handler::new(Ok));
        let on_rejected = on_rejected.unwrap_or_else(|| Handler::new(Err));
        let dependent = Promise::pending();
        let fulfilled = Reaction {
            handler: on_fulfilled,
            dependent: dependent.clone(),
        };
        let rejected = Reaction {
            handler: on_rejected,
            dependent: dependent.clone(),
        };

        let mut state = self.state.borrow_mut();
        let ready = match &mut *state {
            State::Fulfilled(value) => Some((fulfilled, value.clone())),
            State::Rejected(reason) => Some((rejected, reason.clone())),
            // Settling schedules these, which then schedule the handler:
            // one tick more than attaching to a settled promise.
            State::Pending {
                on_fulfilled,
                on_rejected,
            } => {
                on_fulfilled.push(Box::new(move |value| fulfilled.schedule(value)));
                on_rejected.push(Box::new(move |reason| rejected.schedule(reason)));
                None
            }
        };
        drop(state);
        if let Some((reaction, argument)) = ready {
            reaction.schedule(argument);
        }
        dependent
    }

    pub fn catch(&self, on_rejected: Handler) -> Promise {
        self.then(None, Some(on_rejected))
    }

    /// Runs `callback` once this promise settles either way, then settles
    /// with the original outcome once the callback's result has itself
    /// settled. A failing callback replaces the outcome with its failure.
    pub fn finally<F>(&self, callback: F) -> Promise
    where
        F: FnOnce() -> Result<Value, Value> + 'static,
    {
        let callback = Rc::new(Cell::new(Some(callback)));
        let run = move || match callback.take() {
            Some(f) => f(),
            None => Ok(Value::Undefined),
        };
        let after = run.clone();
        let on_fulfilled = Handler::new(move |value| {
            let result = after()?;
            let restore = Handler::new(move |_| Ok(value));
            Ok(Promise::resolve(result).then(Some(restore), None).into())
        });
        let on_rejected = Handler::new(move |reason| {
            let result = run()?;
            let restore = Handler::new(move |_| Err(reason));
            Ok(Promise::resolve(result).then(Some(restore), None).into())
        });
        self.then(Some(on_fulfilled), Some(on_rejected))
    }

    /// Returns `value` itself when it is already a promise, otherwise a new
    /// promise fulfilled with it. Foreign thenables are not unwrapped here.
    pub fn resolve(value: Value) -> Promise {
        match value {
            Value::Promise(promise) => promise,
            value => Promise::new(move |resolve, _| {
                resolve.call(value);
                Ok(())
            }),
        }
    }

    pub fn reject(reason: Value) -> Promise {
        Promise::new(move |_, reject| {
            reject.call(reason);
            Ok(())
        })
    }

    /// Fulfills with every element's value, in input order, once all of them
    /// have fulfilled. Rejects with the first rejection seen.
    ///
    /// `items` must be a [`Value::List`]; anything else rejects with
    /// [`Error::NotASequence`].
    pub fn all(items: Value) -> Promise {
        Promise::new(move |resolve, reject| {
            let Value::List(items) = items else {
                debug!("Promise::all called without a list");
                reject.call(Error::NotASequence.into());
                return Ok(());
            };
            if items.is_empty() {
                resolve.call(Value::list(Vec::new()));
                return Ok(());
            }

            let total = items.len();
            let results = Rc::new(RefCell::new(vec![Value::Undefined; total]));
            let fulfilled = Rc::new(Cell::new(0usize));
            for (index, item) in items.iter().enumerate() {
                let results = results.clone();
                let fulfilled = fulfilled.clone();
                let resolve = resolve.clone();
                let reject = reject.clone();
                Promise::resolve(item.clone()).then(
                    Some(Handler::new(move |value| {
                        results.borrow_mut()[index] = value;
                        fulfilled.set(fulfilled.get() + 1);
                        if fulfilled.get() == total {
                            resolve.call(Value::list(results.take()));
                        }
                        Ok(Value::Undefined)
                    })),
                    Some(Handler::new(move |reason| {
                        reject.call(reason);
                        Ok(Value::Undefined)
                    })),
                );
            }
            Ok(())
        })
    }

    /// Settles like whichever element settles first. An empty list never
    /// settles.
    pub fn race(items: Value) -> Promise {
        Promise::new(move |resolve, reject| {
            let Value::List(items) = items else {
                debug!("Promise::race called without a list");
                reject.call(Error::NotASequence.into());
                return Ok(());
            };
            for item in items.iter() {
                let resolve = resolve.clone();
                let reject = reject.clone();
                Promise::resolve(item.clone()).then(
                    Some(Handler::new(move |value| {
                        resolve.call(value);
                        Ok(Value::Undefined)
                    })),
                    Some(Handler::new(move |reason| {
                        reject.call(reason);
                        Ok(Value::Undefined)
                    })),
                );
            }
            Ok(())
        })
    }

    /// This promise as an object with a callable `then` member, the shape
    /// foreign code expects of a thenable.
    pub fn to_thenable(&self) -> Object {
        let promise = self.clone();
        let then = Value::function(move |_, args| {
            let mut args = args.into_iter();
            let on_fulfilled = args.next().and_then(|f| Handler::from_value(&f));
            let on_rejected = args.next().and_then(|f| Handler::from_value(&f));
            Ok(promise.then(on_fulfilled, on_rejected).into())
        });
        Object::new().with("then", then)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Promise")
            .field(&Rc::as_ptr(&self.state))
            .finish()
    }
}
