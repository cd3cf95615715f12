//! Turning whatever a handler returned into one settlement of the promise
//! that was waiting on it.
use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{scheduler, Error, Handler, Object, Promise, Reject, Resolve, Value};

/// What a handler result turned out to be on inspection.
pub(crate) enum Resolvable {
    Plain(Value),
    Own(Promise),
    Thenable { receiver: Value, then: Object },
}

impl Resolvable {
    /// Looks for a callable `then` member. Reading the member may fail, in
    /// which case the failure is returned.
    pub(crate) fn inspect(x: Value) -> Result<Resolvable, Value> {
        let then = match &x {
            Value::Promise(promise) => return Ok(Resolvable::Own(promise.clone())),
            Value::Object(object) => object.get("then")?,
            _ => Value::Undefined,
        };
        match then {
            Value::Object(then) if then.is_callable() => {
                Ok(Resolvable::Thenable { receiver: x, then })
            }
            _ => Ok(Resolvable::Plain(x)),
        }
    }
}

/// The pair of callbacks handed to a thenable, sharing one latch so only the
/// first call of either takes effect.
struct Callbacks {
    dependent: Promise,
    resolve: Resolve,
    reject: Reject,
    called: Cell<bool>,
}

impl Callbacks {
    fn claim(&self) -> bool {
        !self.called.replace(true)
    }

    fn fulfilled(&self, y: Value) {
        if !self.claim() {
            trace!("thenable called back more than once");
            return;
        }
        let dependent = self.dependent.clone();
        let fulfil = self.resolve.clone();
        let fail = self.reject.clone();
        scheduler::defer(move || resolve(&dependent, y, fulfil, fail));
    }

    fn rejected(&self, r: Value) {
        if !self.claim() {
            trace!("thenable called back more than once");
            return;
        }
        self.reject.call(r);
    }
}

/// Settles `dependent` from a handler result `x`, unwrapping promises and
/// thenables until a plain value or a failure comes out.
pub(crate) fn resolve(dependent: &Promise, x: Value, resolve: Resolve, reject: Reject) {
    if let Value::Promise(promise) = &x {
        if promise.ptr_eq(dependent) {
            debug!("promise chained to itself");
            reject.call(Error::ChainingCycle.into());
            return;
        }
    }

    let callbacks = Rc::new(Callbacks {
        dependent: dependent.clone(),
        resolve,
        reject,
        called: Cell::new(false),
    });

    match Resolvable::inspect(x) {
        Err(error) => {
            if callbacks.claim() {
                callbacks.reject.call(error);
            }
        }
        Ok(Resolvable::Plain(value)) => callbacks.resolve.call(value),
        Ok(Resolvable::Own(promise)) => {
            let on_fulfilled = callbacks.clone();
            let on_rejected = callbacks;
            promise.then(
                Some(Handler::new(move |y| {
                    on_fulfilled.fulfilled(y);
                    Ok(Value::Undefined)
                })),
                Some(Handler::new(move |r| {
                    on_rejected.rejected(r);
                    Ok(Value::Undefined)
                })),
            );
        }
        Ok(Resolvable::Thenable { receiver, then }) => {
            let on_fulfilled = callbacks.clone();
            let on_rejected = callbacks.clone();
            let args = vec![
                Value::function(move |_, args| {
                    on_fulfilled.fulfilled(args.into_iter().next().unwrap_or_default());
                    Ok(Value::Undefined)
                }),
                Value::function(move |_, args| {
                    on_rejected.rejected(args.into_iter().next().unwrap_or_default());
                    Ok(Value::Undefined)
                }),
            ];
            if let Err(error) = then.call(receiver, args) {
                if callbacks.claim() {
                    callbacks.reject.call(error);
                } else {
                    trace!("thenable failed after calling back");
                }
            }
        }
    }
}
