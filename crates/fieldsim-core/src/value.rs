//! Dynamic value types shared by expressions, variables and force fields

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2D vector stored as `[x, y]`
pub type Vector = [f64; 2];

/// The zero vector
pub const ZERO: Vector = [0.0, 0.0];

/// A value produced by an expression or held by a variable
///
/// Serializes untagged, so JSON reads naturally: `null`, `true`, `3.5`, `[1, 2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Sentinel for a dependency that could not be resolved
    #[default]
    Undefined,
    /// Boolean value (conditions)
    Bool(bool),
    /// Scalar value
    Scalar(f64),
    /// 2-vector value
    Vector(Vector),
}

/// A map of symbol names to values
///
/// Uses IndexMap to preserve insertion order (useful for deterministic serialization)
pub type ValueMap = IndexMap<String, Value>;

impl Value {
    /// Check if this value is the undefined sentinel
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as a scalar
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get this value as a vector
    pub fn as_vector(&self) -> Option<Vector> {
        match self {
            Value::Vector(v) => Some(*v),
            _ => None,
        }
    }

    /// Scalar or error
    pub fn expect_scalar(&self) -> Result<f64> {
        self.as_scalar()
            .ok_or_else(|| Error::type_error("scalar", self.type_name()))
    }

    /// Vector or error
    pub fn expect_vector(&self) -> Result<Vector> {
        self.as_vector()
            .ok_or_else(|| Error::type_error("vector", self.type_name()))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "bool",
            Value::Scalar(_) => "scalar",
            Value::Vector(_) => "vector",
        }
    }

    /// Check if this value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Scalar(f) => *f != 0.0 && !f.is_nan(),
            Value::Vector(v) => v.iter().any(|c| *c != 0.0),
        }
    }

    /// Whether every numeric component is finite
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Scalar(f) => f.is_finite(),
            Value::Vector([x, y]) => x.is_finite() && y.is_finite(),
            _ => true,
        }
    }

    /// Apply a binary arithmetic operator with scalar/vector broadcasting
    pub fn arith(&self, op: ArithOp, rhs: &Value) -> Result<Value> {
        use crate::value::Value::{Scalar, Vector as Vec2};
        match (op, self, rhs) {
            (_, Scalar(a), Scalar(b)) => Ok(Scalar(op.apply(*a, *b))),

            (ArithOp::Add | ArithOp::Sub, Vec2(a), Vec2(b)) => {
                Ok(Vec2([op.apply(a[0], b[0]), op.apply(a[1], b[1])]))
            }
            (ArithOp::Mul, Vec2(a), Vec2(b)) => Ok(Scalar(dot(*a, *b))),

            (ArithOp::Mul, Scalar(s), Vec2(v)) => Ok(Vec2([s * v[0], s * v[1]])),
            (ArithOp::Mul | ArithOp::Div | ArithOp::Mod, Vec2(v), Scalar(s)) => {
                Ok(Vec2([op.apply(v[0], *s), op.apply(v[1], *s)]))
            }

            (_, Value::Undefined, _) | (_, _, Value::Undefined) => Err(Error::EvaluationError(
                format!("cannot apply '{}' to an undefined value", op.symbol()),
            )),
            _ => Err(Error::TypeError {
                expected: format!("operands compatible with '{}'", op.symbol()),
                got: format!("{} and {}", self.type_name(), rhs.type_name()),
            }),
        }
    }

    /// Negate a scalar or vector
    pub fn negate(&self) -> Result<Value> {
        match self {
            Value::Scalar(f) => Ok(Value::Scalar(-f)),
            Value::Vector([x, y]) => Ok(Value::Vector([-x, -y])),
            other => Err(Error::type_error("scalar or vector", other.type_name())),
        }
    }
}

/// Arithmetic operators understood by [`Value::arith`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
            ArithOp::Pow => a.powf(b),
        }
    }

    /// Source-level symbol for this operator
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Pow => "^",
        }
    }
}

/// Dot product of two vectors
pub fn dot(a: Vector, b: Vector) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

/// Euclidean length of a vector
pub fn norm(v: Vector) -> f64 {
    v[0].hypot(v[1])
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Vector([x, y]) => write!(f, "[{}, {}]", x, y),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Scalar(f)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Scalar(i as f64)
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Value::Vector(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert!(Value::Undefined.is_undefined());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Scalar(3.5).as_scalar(), Some(3.5));
        assert_eq!(Value::Vector([1.0, 2.0]).as_vector(), Some([1.0, 2.0]));
        assert_eq!(Value::Scalar(1.0).as_vector(), None);
    }

    #[test]
    fn test_value_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Scalar(0.0).is_truthy());
        assert!(!Value::Scalar(f64::NAN).is_truthy());
        assert!(Value::Scalar(2.0).is_truthy());
    }

    #[test]
    fn test_broadcasting() {
        let v = Value::Vector([1.0, -2.0]);
        let s = Value::Scalar(3.0);

        assert_eq!(s.arith(ArithOp::Mul, &v).unwrap(), Value::Vector([3.0, -6.0]));
        assert_eq!(v.arith(ArithOp::Mul, &s).unwrap(), Value::Vector([3.0, -6.0]));
        assert_eq!(v.arith(ArithOp::Div, &s).unwrap(), Value::Vector([1.0 / 3.0, -2.0 / 3.0]));
        assert_eq!(v.arith(ArithOp::Add, &v).unwrap(), Value::Vector([2.0, -4.0]));
        assert_eq!(v.arith(ArithOp::Mul, &v).unwrap(), Value::Scalar(5.0));
    }

    #[test]
    fn test_shape_mismatch() {
        let v = Value::Vector([1.0, 2.0]);
        let s = Value::Scalar(3.0);

        assert!(matches!(v.arith(ArithOp::Add, &s), Err(Error::TypeError { .. })));
        assert!(matches!(s.arith(ArithOp::Div, &v), Err(Error::TypeError { .. })));
        assert!(matches!(
            Value::Undefined.arith(ArithOp::Add, &s),
            Err(Error::EvaluationError(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Vector([1.0, -2.5]).to_string(), "[1, -2.5]");
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::from(true).to_string(), "true");
    }
}
