#[cfg(test)]
mod tests {
    use aplus_future::{deferred, rejected, resolved, scheduler, Error, Handler, Promise, Value};
    use futures::executor::block_on;
    use std::cell::RefCell;
    use std::future::IntoFuture;
    use std::rc::Rc;

    fn outcome(promise: Promise) -> Result<Value, Value> {
        block_on(promise.into_future())
    }

    fn list(items: &[i32]) -> Value {
        Value::list(items.iter().map(|&i| Value::from(i)).collect())
    }

    fn record(log: &Rc<RefCell<Vec<&'static str>>>, entry: &'static str) -> Handler {
        let log = log.clone();
        Handler::new(move |v| {
            log.borrow_mut().push(entry);
            Ok(v)
        })
    }

    #[test]
    fn test_resolve_fulfills_with_plain_values() {
        for value in [
            Value::Undefined,
            Value::Null,
            Value::from(false),
            Value::from(0),
            Value::from("🍓"),
            list(&[1, 2]),
        ] {
            assert_eq!(outcome(resolved(value.clone())), Ok(value));
        }
    }

    #[test]
    fn test_settles_at_most_once() {
        let d = deferred();
        d.resolve.call(Value::from(1));
        d.reject.call(Value::from("err"));
        assert_eq!(outcome(d.promise.clone()), Ok(Value::from(1)));
        d.reject.call(Value::from("later"));
        assert_eq!(outcome(d.promise), Ok(Value::from(1)));
    }

    #[test]
    fn test_self_resolution_is_a_cycle() {
        let d = deferred();
        d.resolve.call(d.promise.clone().into());
        assert_eq!(outcome(d.promise), Err(Error::ChainingCycle.into()));
    }

    #[test]
    fn test_handler_returning_its_own_promise_is_a_cycle() {
        let slot: Rc<RefCell<Option<Promise>>> = Rc::default();
        let own = slot.clone();
        let chained = resolved(Value::from(1)).then(
            Some(Handler::new(move |_| {
                Ok(own.borrow().clone().map(Value::from).unwrap_or_default())
            })),
            None,
        );
        *slot.borrow_mut() = Some(chained.clone());
        assert_eq!(outcome(chained), Err(Error::ChainingCycle.into()));
    }

    #[test]
    fn test_then_returns_before_handlers_run() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let promise = resolved(Value::from(1));
        scheduler::run();
        promise.then(Some(record(&log, "handler")), None);
        log.borrow_mut().push("returned");
        scheduler::run();
        assert_eq!(*log.borrow(), vec!["returned", "handler"]);
    }

    #[test]
    fn test_pending_receiver_costs_one_more_tick() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let settled = resolved(Value::from(1));
        scheduler::run();

        let d = deferred();
        d.promise.then(Some(record(&log, "pending")), None);
        d.resolve.call(Value::from(2));
        settled.then(Some(record(&log, "settled")), None);
        scheduler::run();
        assert_eq!(*log.borrow(), vec!["settled", "pending"]);
    }

    #[test]
    fn test_fulfilling_releases_rejection_waiters() {
        let held = Rc::new(());
        let captured = held.clone();
        let d = deferred();
        d.promise.then(
            None,
            Some(Handler::new(move |r| {
                drop(captured);
                Err(r)
            })),
        );
        assert_eq!(Rc::strong_count(&held), 2);
        d.resolve.call(Value::from(1));
        scheduler::run();
        assert_eq!(Rc::strong_count(&held), 1);
    }

    #[test]
    fn test_rejecting_releases_fulfillment_waiters() {
        let held = Rc::new(());
        let captured = held.clone();
        let d = deferred();
        d.promise.then(
            Some(Handler::new(move |v| {
                drop(captured);
                Ok(v)
            })),
            None,
        );
        assert_eq!(Rc::strong_count(&held), 2);
        d.reject.call(Value::from("no"));
        scheduler::run();
        assert_eq!(Rc::strong_count(&held), 1);
    }

    #[test]
    fn test_fired_waiters_are_released() {
        let held = Rc::new(());
        let captured = held.clone();
        let d = deferred();
        d.promise.then(
            Some(Handler::new(move |v| {
                drop(captured);
                Ok(v)
            })),
            None,
        );
        d.resolve.call(Value::from(1));
        scheduler::run();
        assert_eq!(Rc::strong_count(&held), 1);
    }

    #[test]
    fn test_chained_values_flow() {
        let promise = resolved(Value::from(1))
            .then(
                Some(Handler::new(|v| {
                    Ok(Value::from(v.as_number().unwrap_or(0.0) * 10.0))
                })),
                None,
            )
            .then(Some(Handler::new(|_| Err(Value::from("stop")))), None)
            .then(Some(Handler::new(|_| Ok(Value::from("skipped")))), None)
            .catch(Handler::new(|r| Ok(Value::list(vec![r, Value::from("caught")]))));
        assert_eq!(
            outcome(promise),
            Ok(Value::list(vec![Value::from("stop"), Value::from("caught")]))
        );
    }

    #[test]
    fn test_handler_returning_promise_is_adopted() {
        let inner = deferred();
        let later = inner.promise.clone();
        let outer = resolved(Value::Null).then(Some(Handler::new(move |_| Ok(later.into()))), None);
        inner.resolve.call(Value::from("inner"));
        assert_eq!(outcome(outer), Ok(Value::from("inner")));
    }

    #[test]
    fn test_resolve_capability_adopts_rejection() {
        let d = deferred();
        d.resolve.call(rejected(Value::from("adopted")).into());
        assert_eq!(outcome(d.promise), Err(Value::from("adopted")));
    }

    #[test]
    fn test_all_empty() {
        assert_eq!(outcome(Promise::all(Value::list(vec![]))), Ok(Value::list(vec![])));
    }

    #[test]
    fn test_all_rejects_with_first_failure() {
        let items = vec![
            resolved(Value::from(1)).into(),
            rejected(Value::from("e")).into(),
            resolved(Value::from(2)).into(),
        ];
        assert_eq!(outcome(Promise::all(items.into())), Err(Value::from("e")));
    }

    #[test]
    fn test_all_keeps_input_order() {
        let first = deferred();
        let second = deferred();
        let all = Promise::all(Value::list(vec![
            first.promise.clone().into(),
            second.promise.clone().into(),
            Value::from(3),
        ]));
        second.resolve.call(Value::from(2));
        scheduler::run();
        first.resolve.call(Value::from(1));
        assert_eq!(outcome(all), Ok(list(&[1, 2, 3])));
    }

    #[test]
    fn test_all_of_resolved() {
        let items = vec![resolved(Value::from(1)).into(), resolved(Value::from(2)).into()];
        assert_eq!(outcome(Promise::all(items.into())), Ok(list(&[1, 2])));
    }

    #[test]
    fn test_all_non_sequence() {
        assert_eq!(
            outcome(Promise::all(Value::from(5))),
            Err(Error::NotASequence.into())
        );
    }

    #[test]
    fn test_race_empty_never_settles() {
        let log = Rc::new(RefCell::new(Vec::new()));
        Promise::race(Value::list(vec![]))
            .then(Some(record(&log, "fulfilled")), Some(record(&log, "rejected")));
        scheduler::run();
        assert!(log.borrow().is_empty());
        assert!(scheduler::is_idle());
    }

    #[test]
    fn test_race_fast_rejection_wins() {
        let slow = deferred();
        let race = Promise::race(Value::list(vec![
            slow.promise.clone().into(),
            rejected(Value::from("fast")).into(),
        ]));
        assert_eq!(outcome(race.clone()), Err(Value::from("fast")));
        slow.resolve.call(Value::from("slow"));
        assert_eq!(outcome(race), Err(Value::from("fast")));
    }

    #[test]
    fn test_race_first_fulfillment_wins() {
        let slow = deferred();
        let race = Promise::race(Value::list(vec![
            slow.promise.clone().into(),
            Value::from("plain"),
        ]));
        slow.reject.call(Value::from("too late"));
        assert_eq!(outcome(race), Ok(Value::from("plain")));
    }

    #[test]
    fn test_finally_keeps_value_after_pending_callback() {
        let gate = deferred();
        let later = gate.promise.clone();
        let ran = Rc::new(RefCell::new(false));
        let flag = ran.clone();
        let promise = resolved(Value::from(5)).finally(move || {
            *flag.borrow_mut() = true;
            Ok(later.into())
        });

        let log = Rc::new(RefCell::new(Vec::new()));
        promise.then(Some(record(&log, "done")), None);
        scheduler::run();
        assert!(*ran.borrow());
        assert!(log.borrow().is_empty());

        gate.resolve.call(Value::from("unrelated"));
        assert_eq!(outcome(promise), Ok(Value::from(5)));
        assert_eq!(*log.borrow(), vec!["done"]);
    }

    #[test]
    fn test_finally_keeps_reason() {
        let promise = rejected(Value::from("why")).finally(|| Ok(Value::from(1)));
        assert_eq!(outcome(promise), Err(Value::from("why")));
    }

    #[test]
    fn test_finally_callback_failure_overrides() {
        let promise = resolved(Value::from(5)).finally(|| Err(Value::from("cleanup")));
        assert_eq!(outcome(promise), Err(Value::from("cleanup")));

        let promise = rejected(Value::from("why"))
            .finally(|| Ok(rejected(Value::from("cleanup")).into()));
        assert_eq!(outcome(promise), Err(Value::from("cleanup")));
    }
}
