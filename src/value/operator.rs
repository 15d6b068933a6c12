use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
};

use thiserror::Error;

use crate::value::{
    convert::{parse_number, Number},
    Kind, Value,
};

/// Every operator and conversion a value kind may be capable of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Compare,
    Equal,
    PickChild,
    Negate,
    ToBoolean,
    ToInteger,
    ToFloat,
    ToString,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
            Operation::Compare => "compare",
            Operation::Equal => "equal",
            Operation::PickChild => "pick child",
            Operation::Negate => "negate",
            Operation::ToBoolean => "to boolean",
            Operation::ToInteger => "to integer",
            Operation::ToFloat => "to float",
            Operation::ToString => "to string",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperatorError {
    #[error("unsupported operation `{operation}` between {left} and {right}")]
    Unsupported { operation: Operation, left: Kind, right: Kind },
    #[error("unsupported operation `{operation}` on {kind}")]
    UnsupportedUnary { operation: Operation, kind: Kind },
    #[error("division by zero")]
    DivisionByZero,
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("can not repeat a string {0} times")]
    NegativeRepetition(i64),
    #[error("repeating a string of {length} bytes {count} times exceeds the string length limit")]
    TextTooLong { length: usize, count: i64 },
    #[error("{left} and {right} can not be ordered")]
    Unordered { left: Kind, right: Kind },
}

/// The longest string repetition may build, in bytes.
pub const MAX_TEXT_LENGTH: usize = 1 << 24;

pub type BinaryFn = fn(&Value, &Value) -> Result<Value, OperatorError>;
pub type CompareFn = fn(&Value, &Value) -> Result<Ordering, OperatorError>;
pub type EqualFn = fn(&Value, &Value) -> bool;
pub type UnaryFn = fn(&Value) -> Result<Value, OperatorError>;

#[derive(Debug, Clone, Copy)]
enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl From<Arithmetic> for Operation {
    fn from(arithmetic: Arithmetic) -> Operation {
        match arithmetic {
            Arithmetic::Add => Operation::Add,
            Arithmetic::Subtract => Operation::Subtract,
            Arithmetic::Multiply => Operation::Multiply,
            Arithmetic::Divide => Operation::Divide,
        }
    }
}

fn unsupported(operation: Operation, left: &Value, right: &Value) -> OperatorError {
    OperatorError::Unsupported { operation, left: left.kind(), right: right.kind() }
}

// Capability tables.
// References never reach these, the entry points below resolve them first.

/// Arithmetic and pick-child capabilities, keyed by the left operand's kind.
pub fn binary_capability(operation: Operation, kind: Kind) -> Option<BinaryFn> {
    use Kind as K;
    use Operation as O;

    let capability: BinaryFn = match (operation, kind) {
        (O::Add, K::Integer) => |l, r| integer(Arithmetic::Add, l, r),
        (O::Subtract, K::Integer) => |l, r| integer(Arithmetic::Subtract, l, r),
        (O::Multiply, K::Integer) => |l, r| integer(Arithmetic::Multiply, l, r),
        (O::Divide, K::Integer) => |l, r| integer(Arithmetic::Divide, l, r),
        (O::Add, K::Float) => |l, r| float(Arithmetic::Add, l, r),
        (O::Subtract, K::Float) => |l, r| float(Arithmetic::Subtract, l, r),
        (O::Multiply, K::Float) => |l, r| float(Arithmetic::Multiply, l, r),
        (O::Divide, K::Float) => |l, r| float(Arithmetic::Divide, l, r),
        (O::Add, K::String | K::Translatable) => concatenate,
        (O::Multiply, K::String | K::Translatable) => repeat,
        (O::PickChild, K::String | K::Translatable) => pick_character,
        (O::PickChild, K::Object) => pick_member,
        _ => return None,
    };
    Some(capability)
}

/// Three-way comparison, from which `>`, `<`, `>=` and `<=` are derived.
pub fn compare_capability(kind: Kind) -> Option<CompareFn> {
    let capability: CompareFn = match kind {
        Kind::Integer | Kind::Float => compare_numbers,
        Kind::Boolean => compare_booleans,
        Kind::String | Kind::Translatable => compare_text,
        _ => return None,
    };
    Some(capability)
}

/// Every kind can be checked for equality.
pub fn equal_capability(kind: Kind) -> EqualFn {
    match kind {
        Kind::Null => |_, r| r.is_null(),
        Kind::Boolean => |l, r| matches!((l, r), (Value::Boolean(a), Value::Boolean(b)) if a == b),
        Kind::Integer | Kind::Float => equal_numbers,
        Kind::String | Kind::Translatable => |l, r| l.text().is_some() && l.text() == r.text(),
        Kind::Scope => |l, r| matches!((l, r), (Value::Scope(a), Value::Scope(b)) if a == b),
        Kind::Object => equal_objects,
        Kind::Reference => |l, r| equal(&l.resolved(), r),
    }
}

/// Negation and conversions.
pub fn unary_capability(operation: Operation, kind: Kind) -> Option<UnaryFn> {
    use Kind as K;
    use Operation as O;

    let capability: UnaryFn = match (operation, kind) {
        (O::Negate, K::Integer) => |v| match v {
            Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
            other => Err(OperatorError::UnsupportedUnary { operation: O::Negate, kind: other.kind() }),
        },
        (O::Negate, K::Float) => |v| match v {
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(OperatorError::UnsupportedUnary { operation: O::Negate, kind: other.kind() }),
        },
        (O::Negate, K::Boolean) => |v| match v {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(OperatorError::UnsupportedUnary { operation: O::Negate, kind: other.kind() }),
        },
        (O::ToBoolean, _) => |v| Ok(Value::Boolean(truthy(v))),
        (O::ToString, _) => |v| Ok(Value::from(v.to_string())),
        (O::ToInteger, K::Integer | K::Float | K::Boolean | K::String | K::Translatable) => {
            |v| to_number(v).map(|n| match n {
                Number::Integer(n) => Value::Integer(n),
                Number::Float(f) => Value::Integer(f as i64),
            })
        },
        (O::ToFloat, K::Integer | K::Float | K::Boolean | K::String | K::Translatable) => {
            |v| to_number(v).map(|n| match n {
                Number::Integer(n) => Value::Float(n as f64),
                Number::Float(f) => Value::Float(f),
            })
        },
        _ => return None,
    };
    Some(capability)
}

// Entry points.

/// Applies an arithmetic or pick-child operation.
/// Dispatch is on the left operand's kind.
pub fn apply(operation: Operation, left: &Value, right: &Value) -> Result<Value, OperatorError> {
    let (left, right) = (left.resolved(), right.resolved());
    let capability = binary_capability(operation, left.kind())
        .ok_or_else(|| unsupported(operation, &left, &right))?;
    capability(&left, &right)
}

pub fn compare(left: &Value, right: &Value) -> Result<Ordering, OperatorError> {
    let (left, right) = (left.resolved(), right.resolved());
    let capability = compare_capability(left.kind())
        .ok_or_else(|| unsupported(Operation::Compare, &left, &right))?;
    capability(&left, &right)
}

pub fn equal(left: &Value, right: &Value) -> bool {
    let (left, right) = (left.resolved(), right.resolved());
    equal_capability(left.kind())(&left, &right)
}

pub fn apply_unary(operation: Operation, value: &Value) -> Result<Value, OperatorError> {
    let value = value.resolved();
    let capability = unary_capability(operation, value.kind())
        .ok_or(OperatorError::UnsupportedUnary { operation, kind: value.kind() })?;
    capability(&value)
}

// Implementations.

/// The numeric reading of a value, strings are parsed.
pub(crate) fn to_number(value: &Value) -> Result<Number, OperatorError> {
    match value {
        Value::Integer(n) => Ok(Number::Integer(*n)),
        Value::Float(f) => Ok(Number::Float(*f)),
        Value::Boolean(b) => Ok(Number::Integer(*b as i64)),
        Value::String(_) | Value::Translatable(_) => {
            let text = value.text().unwrap_or_default();
            parse_number(text).ok_or_else(|| OperatorError::NotANumber(text.to_string()))
        },
        other => Err(OperatorError::UnsupportedUnary {
            operation: Operation::ToFloat,
            kind: other.kind(),
        }),
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Integer(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(_) | Value::Translatable(_) => {
            let text = value.text().unwrap_or_default();
            !text.is_empty() && text != "false"
        },
        Value::Reference(r) => truthy(&r.borrow().value),
        Value::Scope(_) | Value::Object(_) => true,
    }
}

fn integers(arithmetic: Arithmetic, l: i64, r: i64) -> Result<Value, OperatorError> {
    Ok(Value::Integer(match arithmetic {
        Arithmetic::Add => l.wrapping_add(r),
        Arithmetic::Subtract => l.wrapping_sub(r),
        Arithmetic::Multiply => l.wrapping_mul(r),
        Arithmetic::Divide if r == 0 => return Err(OperatorError::DivisionByZero),
        Arithmetic::Divide => l.wrapping_div(r),
    }))
}

fn floats(arithmetic: Arithmetic, l: f64, r: f64) -> Result<Value, OperatorError> {
    Ok(Value::Float(match arithmetic {
        Arithmetic::Add => l + r,
        Arithmetic::Subtract => l - r,
        Arithmetic::Multiply => l * r,
        Arithmetic::Divide if r == 0.0 => return Err(OperatorError::DivisionByZero),
        Arithmetic::Divide => l / r,
    }))
}

/// Integer on the left: stays an integer unless the right side is a float.
fn integer(arithmetic: Arithmetic, left: &Value, right: &Value) -> Result<Value, OperatorError> {
    let l = match left {
        Value::Integer(l) => *l,
        _ => return Err(unsupported(arithmetic.into(), left, right)),
    };

    match right {
        Value::Integer(_)
        | Value::Float(_)
        | Value::Boolean(_)
        | Value::String(_)
        | Value::Translatable(_) => match to_number(right)? {
            Number::Integer(r) => integers(arithmetic, l, r),
            Number::Float(r) => floats(arithmetic, l as f64, r),
        },
        _ => Err(unsupported(arithmetic.into(), left, right)),
    }
}

/// Float on the left: always a float.
fn float(arithmetic: Arithmetic, left: &Value, right: &Value) -> Result<Value, OperatorError> {
    let l = match left {
        Value::Float(l) => *l,
        _ => return Err(unsupported(arithmetic.into(), left, right)),
    };

    match right {
        Value::Integer(_)
        | Value::Float(_)
        | Value::Boolean(_)
        | Value::String(_)
        | Value::Translatable(_) => match to_number(right)? {
            Number::Integer(r) => floats(arithmetic, l, r as f64),
            Number::Float(r) => floats(arithmetic, l, r),
        },
        _ => Err(unsupported(arithmetic.into(), left, right)),
    }
}

fn concatenate(left: &Value, right: &Value) -> Result<Value, OperatorError> {
    let mut text = left.text().unwrap_or_default().to_string();
    text.push_str(&right.to_string());
    Ok(Value::from(text))
}

fn repeat(left: &Value, right: &Value) -> Result<Value, OperatorError> {
    match right {
        Value::Integer(n) if *n < 0 => Err(OperatorError::NegativeRepetition(*n)),
        Value::Integer(n) => {
            let text = left.text().unwrap_or_default();
            let too_long = || OperatorError::TextTooLong { length: text.len(), count: *n };
            let count = usize::try_from(*n).map_err(|_| too_long())?;
            match text.len().checked_mul(count) {
                Some(length) if length <= MAX_TEXT_LENGTH => Ok(Value::from(text.repeat(count))),
                _ => Err(too_long()),
            }
        },
        _ => Err(unsupported(Operation::Multiply, left, right)),
    }
}

fn pick_character(left: &Value, right: &Value) -> Result<Value, OperatorError> {
    match right {
        Value::Integer(index) => Ok(usize::try_from(*index)
            .ok()
            .and_then(|index| left.text().unwrap_or_default().chars().nth(index))
            .map(|c| Value::from(c.to_string()))
            .unwrap_or(Value::Null)),
        _ => Err(unsupported(Operation::PickChild, left, right)),
    }
}

fn pick_member(left: &Value, right: &Value) -> Result<Value, OperatorError> {
    let members = match left {
        Value::Object(members) => members,
        _ => return Err(unsupported(Operation::PickChild, left, right)),
    };

    match right {
        Value::String(_) | Value::Translatable(_) => Ok(right
            .text()
            .and_then(|key| members.get(key))
            .map(Value::resolved)
            .unwrap_or(Value::Null)),
        Value::Integer(index) => Ok(usize::try_from(*index)
            .ok()
            .and_then(|index| members.get_index(index))
            .map(|(_, value)| value.resolved())
            .unwrap_or(Value::Null)),
        _ => Err(unsupported(Operation::PickChild, left, right)),
    }
}

fn compare_numbers(left: &Value, right: &Value) -> Result<Ordering, OperatorError> {
    let numeric = matches!(
        right,
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::String(_) | Value::Translatable(_)
    );
    if !numeric {
        return Err(unsupported(Operation::Compare, left, right));
    }

    let unordered = || OperatorError::Unordered { left: left.kind(), right: right.kind() };
    match (to_number(left)?, to_number(right)?) {
        (Number::Integer(l), Number::Integer(r)) => Ok(l.cmp(&r)),
        (Number::Integer(l), Number::Float(r)) => (l as f64).partial_cmp(&r).ok_or_else(unordered),
        (Number::Float(l), Number::Integer(r)) => l.partial_cmp(&(r as f64)).ok_or_else(unordered),
        (Number::Float(l), Number::Float(r)) => l.partial_cmp(&r).ok_or_else(unordered),
    }
}

fn compare_booleans(left: &Value, right: &Value) -> Result<Ordering, OperatorError> {
    match (left, right) {
        (Value::Boolean(l), Value::Boolean(r)) => Ok(l.cmp(r)),
        _ => Err(unsupported(Operation::Compare, left, right)),
    }
}

/// Lexicographic, against the text form of the right side.
fn compare_text(left: &Value, right: &Value) -> Result<Ordering, OperatorError> {
    let l = left.text().unwrap_or_default();
    match right.text() {
        Some(r) => Ok(l.cmp(r)),
        None => Ok(l.cmp(right.to_string().as_str())),
    }
}

fn equal_numbers(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => l == r,
        (Value::Integer(l), Value::Float(r)) => (*l as f64) == *r,
        (Value::Float(l), Value::Integer(r)) => *l == (*r as f64),
        (Value::Float(l), Value::Float(r)) => l == r,
        _ => false,
    }
}

fn equal_objects(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter().all(|(key, value)| r.get(key).map_or(false, |other| equal(value, other)))
        },
        _ => false,
    }
}
