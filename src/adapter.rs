//! The three factories a Promises/A+ conformance suite drives.
use crate::{Object, Promise, Reject, Resolve, Value};

/// A pending promise together with its two capabilities.
#[derive(Debug, Clone)]
pub struct Deferred {
    pub promise: Promise,
    pub resolve: Resolve,
    pub reject: Reject,
}

impl Deferred {
    /// `{ promise, resolve, reject }` as a dynamic object, the capabilities
    /// exposed as callable members.
    pub fn to_object(&self) -> Object {
        Object::new()
            .with("promise", self.promise.clone())
            .with("resolve", self.resolve.to_function())
            .with("reject", self.reject.to_function())
    }
}

/// A pending promise and the capabilities that settle it.
///
/// # Examples
///
/// ```
/// use aplus_future::{deferred, scheduler, Handler, Value};
/// use std::{cell::RefCell, rc::Rc};
///
/// let d = deferred();
/// let seen = Rc::new(RefCell::new(None));
/// let sink = seen.clone();
/// d.promise.then(Some(Handler::new(move |v| { *sink.borrow_mut() = Some(v); Ok(Value::Undefined) })), None);
///
/// d.resolve.call(Value::from(1));
/// d.reject.call(Value::from("ignored"));
/// scheduler::run();
/// assert_eq!(*seen.borrow(), Some(Value::from(1)));
/// ```
pub fn deferred() -> Deferred {
    let promise = Promise::pending();
    Deferred {
        resolve: Resolve::new(&promise),
        reject: Reject::new(&promise),
        promise,
    }
}

pub fn resolved(value: Value) -> Promise {
    Promise::resolve(value)
}

pub fn rejected(reason: Value) -> Promise {
    Promise::reject(reason)
}

#[cfg(test)]
mod tests {
    use super::{deferred, rejected, resolved};
    use crate::Value;
    use futures::executor::block_on;
    use std::future::IntoFuture;

    #[test]
    fn test_deferred_object_members() {
        let d = deferred();
        let object = d.to_object();
        assert_eq!(object.get("promise"), Ok(Value::Promise(d.promise.clone())));
        let resolve = object.get("resolve").unwrap();
        resolve.call(Value::Undefined, vec![Value::from("via object")]).unwrap();
        assert_eq!(block_on(d.promise.into_future()), Ok(Value::from("via object")));
    }

    #[test]
    fn test_deferred_reject_member() {
        let d = deferred();
        let reject = d.to_object().get("reject").unwrap();
        reject.call(Value::Undefined, vec![]).unwrap();
        assert_eq!(block_on(d.promise.into_future()), Err(Value::Undefined));
    }

    #[test]
    fn test_resolved_and_rejected() {
        assert_eq!(block_on(resolved(Value::Null).into_future()), Ok(Value::Null));
        assert_eq!(block_on(rejected(Value::from(0)).into_future()), Err(Value::from(0)));
    }
}
