//! The dynamic values scripts compute with.
//!
//! Values form a closed set of kinds. Which operators a kind supports
//! is decided by the capability table in `operator`, conversions live in `convert`.
//! Besides `Reference`, values are immutable: mutation only happens
//! by replacing the value a reference holds.

pub mod convert;
pub mod operator;

use std::{
    cell::RefCell,
    fmt::{self, Display, Formatter},
    rc::Rc,
    sync::Arc,
};

use indexmap::IndexMap;

/// Index of a scope in a runtime's scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

/// A lexical environment captured as a value.
/// This is what a function is: an entrance in some script's code,
/// plus the scope it was declared in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeValue {
    pub entrance: usize,
    pub script: Arc<str>,
    pub parent: Option<ScopeId>,
}

/// A string whose text came from the active language's translation table.
/// The text is resolved when the translatable literal is read,
/// and is a snapshot from then on: switching languages affects later reads,
/// not values already stored. `id` is kept so hosts can re-resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translatable {
    pub script: Arc<str>,
    pub id: u32,
    pub text: Rc<str>,
}

/// A single-slot mutable cell.
/// Once bound, a constant reference rejects every write.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub value: Value,
    pub constant: bool,
}

impl Reference {
    pub fn new(value: Value, constant: bool) -> Rc<RefCell<Reference>> {
        Rc::new(RefCell::new(Reference { value, constant }))
    }

    /// Replaces the held value.
    /// Returns `false`, leaving the value untouched, if the reference is constant.
    pub fn assign(&mut self, value: Value) -> bool {
        if self.constant {
            return false;
        }
        self.value = value;
        true
    }
}

/// The kind of a value, used for capability lookup and in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Kind {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Translatable,
    Scope,
    Reference,
    Object,
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Boolean => "boolean",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Translatable => "translatable string",
            Kind::Scope => "function",
            Kind::Reference => "reference",
            Kind::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// A dynamically-typed script value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Translatable(Translatable),
    Scope(ScopeValue),
    Reference(Rc<RefCell<Reference>>),
    /// An ordered record, e.g. the exports of a loaded script.
    Object(Rc<IndexMap<String, Value>>),
}

impl Value {
    pub fn string(text: &str) -> Value {
        Value::String(Rc::from(text))
    }

    pub fn object(members: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Object(Rc::new(members.into_iter().collect()))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Boolean(_) => Kind::Boolean,
            Value::Integer(_) => Kind::Integer,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
            Value::Translatable(_) => Kind::Translatable,
            Value::Scope(_) => Kind::Scope,
            Value::Reference(_) => Kind::Reference,
            Value::Object(_) => Kind::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The text of a string or translatable string.
    pub fn text(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Translatable(t) => Some(&t.text),
            _ => None,
        }
    }

    /// Follows references down to the value they hold.
    pub fn resolved(&self) -> Value {
        match self {
            Value::Reference(reference) => reference.borrow().value.resolved(),
            other => other.clone(),
        }
    }
}

/// Structural equality, used by hosts and tests.
/// Script-level `==` is `operator::equal`, which also equates across kinds.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Translatable(a), Value::Translatable(b)) => a == b,
            (Value::Scope(a), Value::Scope(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for Value {
    /// The text form of a value, as used by string concatenation.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Translatable(t) => write!(f, "{}", t.text),
            Value::Scope(s) => write!(f, "<function {}@{}>", s.script, s.entrance),
            Value::Reference(r) => write!(f, "{}", r.borrow().value),
            Value::Object(members) => {
                write!(f, "{{")?;
                for (index, (key, value)) in members.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    match value {
                        Value::String(s) => write!(f, "{}: '{}'", key, s)?,
                        other => write!(f, "{}: {}", key, other)?,
                    }
                }
                write!(f, "}}")
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(Rc::from(s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Integer(-4).to_string(), "-4");
        assert_eq!(Value::Null.to_string(), "null");
        let object = Value::object(vec![
            ("name".to_string(), Value::from("Ada")),
            ("age".to_string(), Value::from(36)),
        ]);
        assert_eq!(object.to_string(), "{name: 'Ada', age: 36}");
    }

    #[test]
    fn constant_references_reject_writes() {
        let reference = Reference::new(Value::from(5), true);
        assert!(!reference.borrow_mut().assign(Value::from(6)));
        assert_eq!(reference.borrow().value, Value::from(5));

        let variable = Reference::new(Value::from(5), false);
        assert!(variable.borrow_mut().assign(Value::from(6)));
        assert_eq!(variable.borrow().value, Value::from(6));
    }

    #[test]
    fn references_resolve() {
        let inner = Value::Reference(Reference::new(Value::from("deep"), false));
        let outer = Value::Reference(Reference::new(inner, false));
        assert_eq!(outer.resolved(), Value::from("deep"));
        assert_eq!(outer.kind(), Kind::Reference);
    }

    #[test]
    fn text() {
        let translatable = Value::Translatable(Translatable {
            script: Arc::from("intro"),
            id: 0,
            text: Rc::from("Bonjour"),
        });
        assert_eq!(translatable.text(), Some("Bonjour"));
        assert_eq!(Value::from(1).text(), None);
    }
}
