//! Script-side values.
//!
//! [`Value`] is the dynamically typed value the scripting runtime hands to
//! the bridge. Native structs, boxed values and objects appear as
//! [`NativeObject`] wrappers; script callables as [`ScriptFunction`]s.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;

/// Something the script can call.
pub trait ScriptFunction {
    fn call(&self, args: &[Value]) -> Result<Value, Error>;
}

impl<F> ScriptFunction for F
where
    F: Fn(&[Value]) -> Result<Value, Error>,
{
    fn call(&self, args: &[Value]) -> Result<Value, Error> {
        self(args)
    }
}

/// Script wrapper around a native pointer.
#[derive(Debug)]
pub struct NativeObject {
    ptr: u64,
    type_name: String,
    owned: Cell<bool>,
}

impl NativeObject {
    /// Wrap `ptr`. An owned wrapper is responsible for releasing the memory.
    pub fn new(ptr: u64, type_name: impl Into<String>, owned: bool) -> Self {
        Self {
            ptr,
            type_name: type_name.into(),
            owned: Cell::new(owned),
        }
    }

    pub fn ptr(&self) -> u64 {
        self.ptr
    }

    /// Qualified name of the dynamic type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_owned(&self) -> bool {
        self.owned.get()
    }

    /// Give up ownership, returning whether it was held.
    pub(crate) fn disown(&self) -> bool {
        self.owned.replace(false)
    }
}

/// A script value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<NativeObject>),
    Function(Rc<dyn ScriptFunction>),
}

impl Value {
    /// Wrap a closure as a script function.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + 'static,
    {
        Value::Function(Rc::new(f))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<NativeObject>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The native pointer behind a wrapper.
    pub fn native_pointer(&self) -> Option<u64> {
        self.as_object().map(|obj| obj.ptr())
    }

    /// Short description used in type mismatch messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.to_string(),
            Value::Array(items) => format!("[array of {}]", items.len()),
            Value::Object(obj) => format!("[object {}]", obj.type_name()),
            Value::Function(_) => "[function]".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(obj) => write!(f, "Object({} @ {:#x})", obj.type_name(), obj.ptr()),
            Value::Function(_) => f.write_str("Function"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<Rc<NativeObject>> for Value {
    fn from(obj: Rc<NativeObject>) -> Self {
        Value::Object(obj)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::array([]).is_truthy());
    }

    #[test]
    fn test_object_identity() {
        let a = Rc::new(NativeObject::new(64, "Demo.Widget", false));
        let b = Rc::new(NativeObject::new(64, "Demo.Widget", false));
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_function_identity() -> Result<(), Error> {
        let f = Value::function(|args| Ok(Value::from(args.len() as u32)));
        assert_eq!(f, f.clone());
        let Value::Function(inner) = &f else {
            return Err(Error::script("not a function"));
        };
        assert_eq!(inner.call(&[Value::Null])?, Value::from(1));
        Ok(())
    }

    #[test]
    fn test_describe() {
        assert_eq!(Value::from(42).describe(), "42");
        assert_eq!(Value::from(1.5).describe(), "1.5");
        assert_eq!(Value::from("abc").describe(), "abc");
        assert_eq!(Value::array([Value::Null]).describe(), "[array of 1]");
        let obj = Rc::new(NativeObject::new(64, "Demo.Point", true));
        assert_eq!(Value::from(obj).describe(), "[object Demo.Point]");
    }
}
