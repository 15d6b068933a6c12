use crate::value::{
    operator::{apply_unary, truthy, Operation, OperatorError},
    Value,
};

/// A number read out of a value or out of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

/// Parses text as an integer, falling back to a float.
/// Surrounding whitespace is ignored.
/// Text without a single digit is never a number,
/// so `inf` and `NaN` stay strings.
pub fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    if let Ok(integer) = text.parse::<i64>() {
        return Some(Number::Integer(integer));
    }
    text.parse::<f64>().ok().map(Number::Float)
}

impl Value {
    pub fn to_boolean(&self) -> bool {
        truthy(self)
    }

    pub fn to_integer(&self) -> Result<i64, OperatorError> {
        match apply_unary(Operation::ToInteger, self)? {
            Value::Integer(n) => Ok(n),
            other => Err(OperatorError::UnsupportedUnary {
                operation: Operation::ToInteger,
                kind: other.kind(),
            }),
        }
    }

    pub fn to_float(&self) -> Result<f64, OperatorError> {
        match apply_unary(Operation::ToFloat, self)? {
            Value::Float(f) => Ok(f),
            other => Err(OperatorError::UnsupportedUnary {
                operation: Operation::ToFloat,
                kind: other.kind(),
            }),
        }
    }

    /// The string form used by concatenation and `ToString`.
    pub fn to_text(&self) -> String {
        self.resolved().to_string()
    }
}
