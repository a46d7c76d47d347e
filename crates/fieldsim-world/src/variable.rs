//! Variables: named scalar/vector quantities, literal or derived
//!
//! A Derived variable holds a compiled expression whose free symbols are its
//! dependencies. Dependencies are always read straight off the compiled
//! expression, so they can never drift out of sync with the source text.

use crate::{Error, Result};
use fieldsim_core::{CompiledExpr, Identified, Identifier, Value, Vector};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Whether a variable stores a value or computes one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Literal,
    Derived,
}

/// Initial content of a variable: a literal value or formula text
#[derive(Debug, Clone, PartialEq)]
pub enum Quantity {
    Literal(Value),
    Formula(String),
}

impl Quantity {
    pub fn formula(source: impl Into<String>) -> Self {
        Quantity::Formula(source.into())
    }
}

impl From<Value> for Quantity {
    fn from(v: Value) -> Self {
        Quantity::Literal(v)
    }
}

impl From<f64> for Quantity {
    fn from(v: f64) -> Self {
        Quantity::Literal(Value::Scalar(v))
    }
}

impl From<Vector> for Quantity {
    fn from(v: Vector) -> Self {
        Quantity::Literal(Value::Vector(v))
    }
}

/// A named quantity registered in a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VariableRecord", into = "VariableRecord")]
pub struct Variable {
    id: Identifier,
    display_name: String,
    kind: VariableKind,
    literal_value: Value,
    expression: Option<CompiledExpr>,
    /// Set once the variable lives inside a world
    attached: bool,
}

impl Variable {
    /// Create a Literal variable
    pub fn literal(display_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: Identifier::unassigned(),
            display_name: display_name.into(),
            kind: VariableKind::Literal,
            literal_value: value.into(),
            expression: None,
            attached: false,
        }
    }

    /// Create a Derived variable from formula text
    ///
    /// Fails with a syntax error if the formula does not compile. Cycles can
    /// only be detected once the variable is registered into a world.
    pub fn derived(display_name: impl Into<String>, source: &str) -> Result<Self> {
        let expression = CompiledExpr::new(source)?;
        Ok(Self {
            id: Identifier::unassigned(),
            display_name: display_name.into(),
            kind: VariableKind::Derived,
            literal_value: Value::Undefined,
            expression: Some(expression),
            attached: false,
        })
    }

    /// Create a variable of whichever kind `quantity` describes
    pub fn new(display_name: impl Into<String>, quantity: Quantity) -> Result<Self> {
        match quantity {
            Quantity::Literal(value) => Ok(Self::literal(display_name, value)),
            Quantity::Formula(source) => Self::derived(display_name, &source),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn is_derived(&self) -> bool {
        self.kind == VariableKind::Derived
    }

    /// Whether this variable has been registered into a world
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Stored value of a Literal variable
    pub fn literal_value(&self) -> Option<Value> {
        match self.kind {
            VariableKind::Literal => Some(self.literal_value),
            VariableKind::Derived => None,
        }
    }

    /// Compiled expression of a Derived variable
    pub fn expression(&self) -> Option<&CompiledExpr> {
        self.expression.as_ref()
    }

    /// Symbols this variable reads (empty for Literal variables)
    pub fn dependencies(&self) -> Option<&IndexSet<String>> {
        self.expression.as_ref().map(CompiledExpr::dependencies)
    }

    /// Content of this variable as a [`Quantity`], for copying
    pub fn quantity(&self) -> Quantity {
        match &self.expression {
            Some(expr) => Quantity::Formula(expr.source().to_string()),
            None => Quantity::Literal(self.literal_value),
        }
    }

    /// Rename the variable
    pub fn rename(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
    }

    /// Reinitialize an unattached variable
    ///
    /// Attached variables must be edited through the owning world so the
    /// dependency graph can be checked; see `World::update_variable`.
    pub fn reset(&mut self, display_name: impl Into<String>, quantity: Quantity) -> Result<()> {
        self.ensure_detached()?;
        let replacement = Self::new(display_name, quantity)?;
        self.set_content(replacement);
        Ok(())
    }

    /// Replace the formula of an unattached variable
    ///
    /// The formula is accepted provisionally; the cycle check happens when the
    /// variable is registered.
    pub fn update_expression(&mut self, source: &str) -> Result<()> {
        self.ensure_detached()?;
        let expression = CompiledExpr::new(source)?;
        self.set_formula(expression);
        Ok(())
    }

    /// Short human readable form of the content, for listings
    pub fn describe(&self) -> String {
        match &self.expression {
            Some(expr) => format!("{} = {}", self.display_name, expr),
            None => format!("{} = {}", self.display_name, self.literal_value),
        }
    }

    fn ensure_detached(&self) -> Result<()> {
        if self.attached {
            return Err(Error::invalid(format!(
                "variable {} is attached to a world; edit it through the world",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn attach(&mut self) {
        self.attached = true;
    }

    pub(crate) fn set_literal(&mut self, value: Value) {
        self.kind = VariableKind::Literal;
        self.literal_value = value;
        self.expression = None;
    }

    pub(crate) fn set_formula(&mut self, expression: CompiledExpr) {
        self.kind = VariableKind::Derived;
        self.literal_value = Value::Undefined;
        self.expression = Some(expression);
    }

    /// Take over content of another variable, keeping id and attachment
    pub(crate) fn set_content(&mut self, other: Variable) {
        self.display_name = other.display_name;
        self.kind = other.kind;
        self.literal_value = other.literal_value;
        self.expression = other.expression;
    }
}

impl Identified for Variable {
    fn id(&self) -> &Identifier {
        &self.id
    }

    fn id_slot(&mut self) -> &mut Identifier {
        &mut self.id
    }
}

/// On-disk form of a variable
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VariableRecord {
    id: Identifier,
    display_name: String,
    kind: VariableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expression: Option<String>,
}

impl From<Variable> for VariableRecord {
    fn from(var: Variable) -> Self {
        let value = var.literal_value();
        Self {
            id: var.id,
            display_name: var.display_name,
            kind: var.kind,
            value,
            expression: var.expression.map(String::from),
        }
    }
}

impl TryFrom<VariableRecord> for Variable {
    type Error = Error;

    fn try_from(record: VariableRecord) -> Result<Self> {
        let mut var = match record.kind {
            VariableKind::Literal => {
                Variable::literal(record.display_name, record.value.unwrap_or_default())
            }
            VariableKind::Derived => {
                let source = record.expression.ok_or_else(|| {
                    Error::Serialization(format!("derived variable {} has no expression", record.id))
                })?;
                Variable::derived(record.display_name, &source)?
            }
        };
        var.id = record.id;
        Ok(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_derived() {
        let m = Variable::literal("m", 2.0);
        assert_eq!(m.kind(), VariableKind::Literal);
        assert_eq!(m.literal_value(), Some(Value::Scalar(2.0)));
        assert!(m.dependencies().is_none());
        assert!(m.id().is_unassigned());

        let f = Variable::derived("f", "VAR_A * 2 + time").unwrap();
        assert!(f.is_derived());
        assert_eq!(f.literal_value(), None);
        let deps: Vec<_> = f.dependencies().unwrap().iter().cloned().collect();
        assert_eq!(deps, vec!["VAR_A".to_string()]);
    }

    #[test]
    fn test_bad_formula_rejected() {
        let err = Variable::derived("bad", "1 +").unwrap_err();
        assert!(matches!(err, Error::Core(ref e) if e.is_syntax_error()));
    }

    #[test]
    fn test_provisional_update_keeps_expression() {
        let mut v = Variable::literal("x", 1.0);
        v.update_expression("x + 1").unwrap();
        assert!(v.is_derived());
        assert_eq!(v.expression().unwrap().source(), "x + 1");

        v.reset("y", Quantity::from([1.0, 2.0])).unwrap();
        assert_eq!(v.display_name(), "y");
        assert_eq!(v.literal_value(), Some(Value::Vector([1.0, 2.0])));
        assert!(v.expression().is_none());
    }

    #[test]
    fn test_attached_variable_rejects_direct_edit() {
        let mut v = Variable::literal("x", 1.0);
        v.attach();
        assert!(v.update_expression("2").is_err());
        assert!(v.reset("x", Quantity::from(3.0)).is_err());
        assert_eq!(v.literal_value(), Some(Value::Scalar(1.0)));
    }

    #[test]
    fn test_record_roundtrip() {
        let mut v = Variable::derived("speed", "norm(VAR_V)").unwrap();
        v.assign_id(Identifier::new("VAR_S")).unwrap();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["expression"], "norm(VAR_V)");
        assert!(json.get("value").is_none());

        let back: Variable = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);

        let lit: Variable =
            serde_json::from_str(r#"{"id":"VAR_P","display_name":"p","kind":"literal","value":[1.0,-2.5]}"#)
                .unwrap();
        assert_eq!(lit.literal_value(), Some(Value::Vector([1.0, -2.5])));
    }

    #[test]
    fn test_derived_record_without_expression_fails() {
        let res: std::result::Result<Variable, _> =
            serde_json::from_str(r#"{"id":"VAR_P","display_name":"p","kind":"derived"}"#);
        assert!(res.is_err());
    }
}
