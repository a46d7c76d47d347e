//! Expression engine for force laws, conditions and derived variables
//!
//! Source text is compiled once into an [`Expr`] tree and evaluated many times
//! against a [`Scope`]. Values are scalars, 2-vectors or booleans; arithmetic
//! broadcasts scalars over vectors and `vector * vector` is the dot product.

use crate::{parser, value, ArithOp, Error, Result, Value, ValueMap};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;

/// Names bound by the simulator at evaluation time, never graph dependencies
pub const RESERVED_NAMES: &[&str] = &["pos", "v", "mass", "time", "dt", "F", "a", "type"];

/// Built-in constants
const CONSTANTS: &[(&str, f64)] = &[
    ("e", std::f64::consts::E),
    ("E", std::f64::consts::E),
    ("pi", std::f64::consts::PI),
    ("PI", std::f64::consts::PI),
    ("tau", std::f64::consts::TAU),
    ("phi", 1.618_033_988_749_895),
    ("Infinity", f64::INFINITY),
    ("NaN", f64::NAN),
    ("LN2", std::f64::consts::LN_2),
    ("LN10", std::f64::consts::LN_10),
    ("LOG2E", std::f64::consts::LOG2_E),
    ("LOG10E", std::f64::consts::LOG10_E),
    ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ("SQRT2", std::f64::consts::SQRT_2),
];

/// Names that are built in but carry no usable value here
const UNBOUND_BUILTINS: &[&str] = &["i", "null", "undefined"];

/// Built-in function names
pub const FUNCTIONS: &[&str] = &[
    "norm", "abs", "sqrt", "exp", "log", "sin", "cos", "tan", "asin", "acos", "atan", "atan2",
    "min", "max", "pow", "floor", "ceil", "round", "sign", "dot", "cross", "unit", "vec",
];

/// Check if a name belongs to the built-in constant/function table
pub fn is_builtin(name: &str) -> bool {
    CONSTANTS.iter().any(|(c, _)| *c == name)
        || UNBOUND_BUILTINS.contains(&name)
        || FUNCTIONS.contains(&name)
}

/// Check if a name is bound by the simulator at runtime
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Symbol lookup used during evaluation
///
/// Kept separate from any world type so expressions can be evaluated against
/// plain maps in tests.
pub trait Scope {
    /// Look up a symbol; `None` means the symbol is not bound at all
    fn lookup(&self, symbol: &str) -> Option<Value>;
}

impl<S: BuildHasher> Scope for indexmap::IndexMap<String, Value, S> {
    fn lookup(&self, symbol: &str) -> Option<Value> {
        self.get(symbol).copied()
    }
}

impl<S: BuildHasher> Scope for HashMap<String, Value, S> {
    fn lookup(&self, symbol: &str) -> Option<Value> {
        self.get(symbol).copied()
    }
}

impl<T: Scope + ?Sized> Scope for &T {
    fn lookup(&self, symbol: &str) -> Option<Value> {
        (**self).lookup(symbol)
    }
}

/// Two scopes searched top first
///
/// Lets callers put a few per-call bindings over a shared base map without
/// copying it.
pub struct Layered<'a> {
    top: &'a dyn Scope,
    base: &'a dyn Scope,
}

impl<'a> Layered<'a> {
    pub fn new(top: &'a dyn Scope, base: &'a dyn Scope) -> Self {
        Self { top, base }
    }
}

impl Scope for Layered<'_> {
    fn lookup(&self, symbol: &str) -> Option<Value> {
        self.top.lookup(symbol).or_else(|| self.base.lookup(symbol))
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

/// Arithmetic binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl From<BinaryOp> for ArithOp {
    fn from(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => ArithOp::Add,
            BinaryOp::Sub => ArithOp::Sub,
            BinaryOp::Mul => ArithOp::Mul,
            BinaryOp::Div => ArithOp::Div,
            BinaryOp::Mod => ArithOp::Mod,
            BinaryOp::Pow => ArithOp::Pow,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuit logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // === Literals ===
    Number(f64),
    Bool(bool),
    /// `[x, y]`
    VectorLit(Box<Expr>, Box<Expr>),

    // === Symbols ===
    Symbol(String),

    // === Operators ===
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : else`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),

    // === Postfix ===
    /// Function call by name
    Call(String, Vec<Expr>),
    /// 1-based component access, `pos[1]`
    Index(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate this expression against a scope
    pub fn eval(&self, scope: &dyn Scope) -> Result<Value> {
        match self {
            Expr::Number(n) => Ok(Value::Scalar(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::VectorLit(x, y) => {
                let x = x.eval(scope)?.expect_scalar()?;
                let y = y.eval(scope)?.expect_scalar()?;
                Ok(Value::Vector([x, y]))
            }

            Expr::Symbol(name) => resolve_symbol(name, scope),

            Expr::Unary(op, operand) => {
                let v = operand.eval(scope)?;
                match op {
                    UnaryOp::Neg => v.negate(),
                    UnaryOp::Plus => match v {
                        Value::Scalar(_) | Value::Vector(_) => Ok(v),
                        other => Err(Error::type_error("scalar or vector", other.type_name())),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(scope)?;
                let b = rhs.eval(scope)?;
                a.arith((*op).into(), &b)
            }
            Expr::Compare(op, lhs, rhs) => {
                let a = lhs.eval(scope)?;
                let b = rhs.eval(scope)?;
                compare_values(*op, &a, &b)
            }
            Expr::Logical(op, lhs, rhs) => {
                let a = lhs.eval(scope)?.is_truthy();
                let result = match op {
                    LogicalOp::And => a && rhs.eval(scope)?.is_truthy(),
                    LogicalOp::Or => a || rhs.eval(scope)?.is_truthy(),
                };
                Ok(Value::Bool(result))
            }
            Expr::Conditional(cond, then_expr, else_expr) => {
                if cond.eval(scope)?.is_truthy() {
                    then_expr.eval(scope)
                } else {
                    else_expr.eval(scope)
                }
            }

            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(scope))
                    .collect::<Result<Vec<_>>>()?;
                call_function(name, &values)
            }
            Expr::Index(target, index) => {
                let v = target.eval(scope)?.expect_vector()?;
                let i = index.eval(scope)?.expect_scalar()?;
                match i {
                    i if i == 1.0 => Ok(Value::Scalar(v[0])),
                    i if i == 2.0 => Ok(Value::Scalar(v[1])),
                    _ => Err(Error::EvaluationError(format!(
                        "index {} out of range for a 2-vector (indices start at 1)",
                        i
                    ))),
                }
            }
        }
    }

    /// Visit every free symbol reference in the tree
    fn collect_symbols<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) | Expr::Bool(_) => {}
            Expr::Symbol(name) => out.push(name.as_str()),
            Expr::VectorLit(a, b)
            | Expr::Binary(_, a, b)
            | Expr::Compare(_, a, b)
            | Expr::Logical(_, a, b)
            | Expr::Index(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            Expr::Unary(_, a) => a.collect_symbols(out),
            Expr::Conditional(c, a, b) => {
                c.collect_symbols(out);
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            // the callee name is not a symbol reference
            Expr::Call(_, args) => args.iter().for_each(|arg| arg.collect_symbols(out)),
        }
    }
}

fn resolve_symbol(name: &str, scope: &dyn Scope) -> Result<Value> {
    if let Some(v) = scope.lookup(name) {
        return Ok(v);
    }
    if let Some((_, c)) = CONSTANTS.iter().find(|(c, _)| *c == name) {
        return Ok(Value::Scalar(*c));
    }
    match name {
        "null" | "undefined" => Ok(Value::Undefined),
        "i" => Err(Error::EvaluationError(
            "complex numbers are not supported".to_string(),
        )),
        _ => Err(Error::UndefinedSymbol(name.to_string())),
    }
}

fn compare_values(op: CompareOp, a: &Value, b: &Value) -> Result<Value> {
    match (op, a, b) {
        (CompareOp::Eq, _, _) if a.type_name() == b.type_name() => Ok(Value::Bool(a == b)),
        (CompareOp::Ne, _, _) if a.type_name() == b.type_name() => Ok(Value::Bool(a != b)),
        (_, Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Bool(match op {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        })),
        _ => Err(Error::TypeError {
            expected: "comparable operands".to_string(),
            got: format!("{} and {}", a.type_name(), b.type_name()),
        }),
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::ArgumentCount {
            function: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// Apply a scalar function, element-wise over vectors
fn map_unary(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value> {
    arity(name, args, 1)?;
    match args[0] {
        Value::Scalar(x) => Ok(Value::Scalar(f(x))),
        Value::Vector([x, y]) => Ok(Value::Vector([f(x), f(y)])),
        other => Err(Error::type_error("scalar or vector", other.type_name())),
    }
}

fn fold_scalars(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value> {
    let mut scalars = args.iter().map(Value::expect_scalar);
    let first = scalars.next().ok_or_else(|| Error::ArgumentCount {
        function: name.to_string(),
        expected: 1,
        got: 0,
    })??;
    scalars
        .try_fold(first, |acc, x| Ok(f(acc, x?)))
        .map(Value::Scalar)
}

fn call_function(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "norm" => {
            arity(name, args, 1)?;
            match args[0] {
                Value::Vector(v) => Ok(Value::Scalar(value::norm(v))),
                Value::Scalar(s) => Ok(Value::Scalar(s.abs())),
                other => Err(Error::type_error("vector", other.type_name())),
            }
        }
        "unit" => {
            arity(name, args, 1)?;
            let v = args[0].expect_vector()?;
            let n = value::norm(v);
            Ok(Value::Vector([v[0] / n, v[1] / n]))
        }
        "dot" => {
            arity(name, args, 2)?;
            Ok(Value::Scalar(value::dot(
                args[0].expect_vector()?,
                args[1].expect_vector()?,
            )))
        }
        "cross" => {
            arity(name, args, 2)?;
            let a = args[0].expect_vector()?;
            let b = args[1].expect_vector()?;
            Ok(Value::Scalar(a[0] * b[1] - a[1] * b[0]))
        }
        "vec" => {
            arity(name, args, 2)?;
            Ok(Value::Vector([
                args[0].expect_scalar()?,
                args[1].expect_scalar()?,
            ]))
        }
        "atan2" => {
            arity(name, args, 2)?;
            let y = args[0].expect_scalar()?;
            let x = args[1].expect_scalar()?;
            Ok(Value::Scalar(y.atan2(x)))
        }
        "pow" => {
            arity(name, args, 2)?;
            args[0].arith(ArithOp::Pow, &args[1])
        }
        "log" if args.len() == 2 => {
            let x = args[0].expect_scalar()?;
            let base = args[1].expect_scalar()?;
            Ok(Value::Scalar(x.ln() / base.ln()))
        }
        "min" => fold_scalars(name, args, f64::min),
        "max" => fold_scalars(name, args, f64::max),
        "abs" => map_unary(name, args, f64::abs),
        "sqrt" => map_unary(name, args, f64::sqrt),
        "exp" => map_unary(name, args, f64::exp),
        "log" => map_unary(name, args, f64::ln),
        "sin" => map_unary(name, args, f64::sin),
        "cos" => map_unary(name, args, f64::cos),
        "tan" => map_unary(name, args, f64::tan),
        "asin" => map_unary(name, args, f64::asin),
        "acos" => map_unary(name, args, f64::acos),
        "atan" => map_unary(name, args, f64::atan),
        "floor" => map_unary(name, args, f64::floor),
        "ceil" => map_unary(name, args, f64::ceil),
        "round" => map_unary(name, args, f64::round),
        "sign" => map_unary(name, args, |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        _ => Err(Error::UnknownFunction(name.to_string())),
    }
}

/// Extract the graph dependencies of expression source
///
/// Returns every free symbol in first-occurrence order, excluding function
/// names, built-in constants/functions and [`RESERVED_NAMES`].
pub fn extract_dependencies(source: &str) -> Result<IndexSet<String>> {
    Ok(compile(source)?.dependencies().clone())
}

/// Compile expression source
pub fn compile(source: &str) -> Result<CompiledExpr> {
    CompiledExpr::new(source)
}

/// Expression source together with its parsed tree and dependency set
///
/// Serializes as the source text; deserializing recompiles it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompiledExpr {
    source: String,
    tree: Expr,
    dependencies: IndexSet<String>,
}

impl CompiledExpr {
    /// Compile source text
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let tree = parser::parse(&source)?;

        let mut symbols = Vec::new();
        tree.collect_symbols(&mut symbols);
        let dependencies = symbols
            .into_iter()
            .filter(|name| !is_builtin(name) && !is_reserved(name))
            .map(str::to_string)
            .collect();

        Ok(Self {
            source,
            tree,
            dependencies,
        })
    }

    /// Evaluate against a scope
    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Value> {
        self.tree.eval(scope)
    }

    /// Evaluate against a plain map
    pub fn evaluate_map(&self, scope: &ValueMap) -> Result<Value> {
        self.tree.eval(scope)
    }

    /// The original source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed tree
    pub fn tree(&self) -> &Expr {
        &self.tree
    }

    /// Free symbols that refer to other entities
    pub fn dependencies(&self) -> &IndexSet<String> {
        &self.dependencies
    }
}

impl PartialEq for CompiledExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for CompiledExpr {
    type Error = Error;

    fn try_from(source: String) -> Result<Self> {
        CompiledExpr::new(source)
    }
}

impl From<CompiledExpr> for String {
    fn from(expr: CompiledExpr) -> Self {
        expr.source
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eval(source: &str, scope: &ValueMap) -> Result<Value> {
        compile(source)?.evaluate(scope)
    }

    fn scope(pairs: &[(&str, Value)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_arithmetic() {
        let s = ValueMap::new();
        assert_eq!(eval("1 + 2 * 3", &s).unwrap(), Value::Scalar(7.0));
        assert_eq!(eval("(1 + 2) * 3", &s).unwrap(), Value::Scalar(9.0));
        assert_eq!(eval("-2^2", &s).unwrap(), Value::Scalar(-4.0));
        assert_eq!(eval("2^3^2", &s).unwrap(), Value::Scalar(512.0));
        assert_eq!(eval("7 % 4", &s).unwrap(), Value::Scalar(3.0));
        assert_eq!(eval("1 / 0", &s).unwrap(), Value::Scalar(f64::INFINITY));
    }

    #[test]
    fn test_vectors() {
        let s = scope(&[("mass", Value::Scalar(2.0))]);
        assert_eq!(
            eval("mass*[0,-10]", &s).unwrap(),
            Value::Vector([0.0, -20.0])
        );
        assert_eq!(eval("norm([3, 4])", &s).unwrap(), Value::Scalar(5.0));
        assert_eq!(eval("[1, 2] * [3, 4]", &s).unwrap(), Value::Scalar(11.0));
        assert_eq!(eval("dot([1, 2], [3, 4])", &s).unwrap(), Value::Scalar(11.0));
        assert_eq!(eval("cross([1, 0], [0, 1])", &s).unwrap(), Value::Scalar(1.0));
        assert_eq!(eval("[5, 6][2]", &s).unwrap(), Value::Scalar(6.0));
        assert_eq!(eval("unit([0, 2])", &s).unwrap(), Value::Vector([0.0, 1.0]));
        assert_eq!(eval("abs([-1, 2])", &s).unwrap(), Value::Vector([1.0, 2.0]));
    }

    #[test]
    fn test_logic_and_conditionals() {
        let s = scope(&[("x", Value::Scalar(3.0))]);
        assert_eq!(eval("x > 2 and x < 4", &s).unwrap(), Value::Bool(true));
        assert_eq!(eval("x > 5 || x == 3", &s).unwrap(), Value::Bool(true));
        assert_eq!(eval("not (x == 3)", &s).unwrap(), Value::Bool(false));
        assert_eq!(eval("x > 2 ? [1, 0] : [0, 1]", &s).unwrap(), Value::Vector([1.0, 0.0]));
        // short-circuit never touches the unbound symbol
        assert_eq!(eval("false and missing > 0", &s).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_constants_and_functions() {
        let s = ValueMap::new();
        assert_eq!(eval("pi", &s).unwrap(), Value::Scalar(std::f64::consts::PI));
        assert_eq!(eval("max(1, 5, 3)", &s).unwrap(), Value::Scalar(5.0));
        let log = eval("log(8, 2)", &s).unwrap().as_scalar().unwrap();
        assert!((log - 3.0).abs() < 1e-12);
        assert_eq!(eval("sqrt(16)", &s).unwrap(), Value::Scalar(4.0));
    }

    #[test]
    fn test_scope_shadows_constants() {
        let s = scope(&[("e", Value::Scalar(1.0))]);
        assert_eq!(eval("e", &s).unwrap(), Value::Scalar(1.0));
    }

    #[test]
    fn test_layered_scope() {
        let base = scope(&[("x", Value::Scalar(1.0)), ("y", Value::Scalar(2.0))]);
        let top = scope(&[("x", Value::Scalar(10.0))]);
        let layered = Layered::new(&top, &base);
        assert_eq!(compile("x + y").unwrap().evaluate(&layered).unwrap(), Value::Scalar(12.0));
    }

    #[test]
    fn test_evaluation_errors() {
        let s = scope(&[("u", Value::Undefined)]);
        assert!(matches!(eval("missing + 1", &s), Err(Error::UndefinedSymbol(_))));
        assert!(matches!(eval("[1, 2] + 1", &s), Err(Error::TypeError { .. })));
        assert!(matches!(eval("[1, 2] < 1", &s), Err(Error::TypeError { .. })));
        assert!(matches!(eval("nope(1)", &s), Err(Error::UnknownFunction(_))));
        assert!(matches!(eval("norm(1, 2)", &s), Err(Error::ArgumentCount { .. })));
        assert!(matches!(eval("[1, 2][3]", &s), Err(Error::EvaluationError(_))));
        assert!(matches!(eval("u * 2", &s), Err(Error::EvaluationError(_))));
        assert!(eval("u + 1", &s).unwrap_err().is_evaluation_error());
    }

    #[test]
    fn test_dependencies() {
        let deps = extract_dependencies("G * mass * VAR_M / norm(pos - VAR_C)^2 + e * k").unwrap();
        let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
        assert_eq!(deps, vec!["G", "VAR_M", "VAR_C", "k"]);

        let deps = extract_dependencies("F / mass + a * dt + type + time + v").unwrap();
        assert!(deps.is_empty());

        let deps = extract_dependencies("x + x * y").unwrap();
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_compile_rejects_bad_source() {
        assert!(compile("1 +* 2").unwrap_err().is_syntax_error());
    }

    #[test]
    fn test_compiled_expr_serializes_as_source() {
        let expr = compile("mass * [0, -9.81]").unwrap();
        let text: String = expr.clone().into();
        assert_eq!(text, "mass * [0, -9.81]");
        let back = CompiledExpr::try_from(text).unwrap();
        assert_eq!(back, expr);
        assert!(CompiledExpr::try_from("(".to_string()).is_err());
    }

    proptest! {
        #[test]
        fn prop_scalar_arithmetic_matches_f64(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let s = scope(&[("a", Value::Scalar(a)), ("b", Value::Scalar(b))]);
            prop_assert_eq!(eval("a + b", &s).unwrap(), Value::Scalar(a + b));
            prop_assert_eq!(eval("a * b - b", &s).unwrap(), Value::Scalar(a * b - b));
            prop_assert_eq!(eval("[a, b][1]", &s).unwrap(), Value::Scalar(a));
        }
    }
}
