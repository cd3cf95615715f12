//! Dynamic values that flow through promises.
//!
//! Resolution has to look inside whatever a handler returns, so values are
//! inspected at runtime rather than typed up front: objects carry named
//! members, may be callable, and are compared by identity.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::{Error, Promise};

type NativeFn = dyn Fn(Value, Vec<Value>) -> Result<Value, Value>;
type Getter = dyn Fn(&Value) -> Result<Value, Value>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Object(Object),
    Promise(Promise),
    Error(Error),
}

impl Value {
    /// A callable object wrapping `f`. `f` receives the receiver and the
    /// call arguments.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, Value> + 'static,
    {
        Value::Object(Object::function(f))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Object(object) if object.is_callable())
    }

    /// Calls the value as a function. Anything but a callable object fails
    /// with [`Error::NotCallable`].
    pub fn call(&self, this: Value, args: Vec<Value>) -> Result<Value, Value> {
        match self {
            Value::Object(object) => object.call(this, args),
            _ => Err(Error::NotCallable.into()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(promise) => Some(promise),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Promise(promise)
    }
}

impl From<Error> for Value {
    fn from(error: Error) -> Self {
        Value::Error(error)
    }
}

/// A named member of an [`Object`].
#[derive(Clone)]
pub enum Member {
    Data(Value),
    /// Computed on every read. The getter gets the object itself and may fail.
    Accessor(Rc<Getter>),
}

struct ObjectInner {
    members: RefCell<BTreeMap<String, Member>>,
    call: Option<Rc<NativeFn>>,
}

/// A shared, mutable bag of members, optionally callable.
///
/// Clones refer to the same object; equality is identity.
#[derive(Clone)]
pub struct Object(Rc<ObjectInner>);

impl Object {
    pub fn new() -> Self {
        Object(Rc::new(ObjectInner {
            members: RefCell::new(BTreeMap::new()),
            call: None,
        }))
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, Value> + 'static,
    {
        Object(Rc::new(ObjectInner {
            members: RefCell::new(BTreeMap::new()),
            call: Some(Rc::new(f)),
        }))
    }

    /// Builder form of [`Object::set`].
    pub fn with(self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.0
            .members
            .borrow_mut()
            .insert(name.to_owned(), Member::Data(value.into()));
    }

    pub fn define_getter<F>(&self, name: &str, getter: F)
    where
        F: Fn(&Value) -> Result<Value, Value> + 'static,
    {
        self.0
            .members
            .borrow_mut()
            .insert(name.to_owned(), Member::Accessor(Rc::new(getter)));
    }

    /// Reads a member. Absent members read as [`Value::Undefined`]; an
    /// accessor's failure is returned as `Err`.
    pub fn get(&self, name: &str) -> Result<Value, Value> {
        // The getter may touch this object, so the map must not stay borrowed.
        let member = self.0.members.borrow().get(name).cloned();
        match member {
            None => Ok(Value::Undefined),
            Some(Member::Data(value)) => Ok(value),
            Some(Member::Accessor(getter)) => getter(&Value::Object(self.clone())),
        }
    }

    pub fn is_callable(&self) -> bool {
        self.0.call.is_some()
    }

    pub fn call(&self, this: Value, args: Vec<Value>) -> Result<Value, Value> {
        match &self.0.call {
            Some(f) => f(this, args),
            None => Err(Error::NotCallable.into()),
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_callable() { "Function" } else { "Object" };
        let members: Vec<String> = self.0.members.borrow().keys().cloned().collect();
        f.debug_struct(kind).field("members", &members).finish()
    }
}
