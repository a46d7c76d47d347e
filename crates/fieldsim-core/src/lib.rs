//! Fieldsim Core - identities, values and the expression engine
//!
//! This crate provides the leaf types of the fieldsim simulator:
//! - Globally unique, write-once identifiers (`Identifier`, `IdRegistry`)
//! - Scalar/vector/boolean values (`Value`, `ValueMap`)
//! - A small algebraic expression language compiled once and evaluated many
//!   times against a `Scope` (`CompiledExpr`, `extract_dependencies`)
//!
//! ## Expression example
//!
//! ```
//! use fieldsim_core::{compile, Value, ValueMap};
//!
//! let force = compile("mass * [0, -10]").unwrap();
//! let mut scope = ValueMap::new();
//! scope.insert("mass".to_string(), Value::Scalar(2.0));
//! assert_eq!(force.evaluate(&scope).unwrap(), Value::Vector([0.0, -20.0]));
//! ```

mod error;
pub mod expr;
mod identity;
mod parser;
mod rng;
mod value;

pub use error::{Error, Result};
pub use expr::{compile, extract_dependencies, CompiledExpr, Expr, Layered, Scope, RESERVED_NAMES};
pub use identity::{IdPrefix, IdRegistry, Identified, Identifier};
pub use rng::IdRng;
pub use value::{dot, norm, ArithOp, Value, ValueMap, Vector, ZERO};
