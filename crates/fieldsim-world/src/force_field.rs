//! Force fields
//!
//! A field is a condition plus a vector expression, both evaluated in the
//! scope of the object being pushed. Immediate fields see the object state;
//! Derived fields additionally see the summed Immediate force `F` and the
//! resulting acceleration `a`.

use fieldsim_core::{CompiledExpr, Identified, Identifier, Layered, Scope, Value, ValueMap, Vector};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, Template};

/// When a field is evaluated within a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceFieldKind {
    Immediate,
    Derived,
}

/// A conditional force applied to every object in a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceField {
    id: Identifier,
    pub display_name: String,
    kind: ForceFieldKind,
    condition: CompiledExpr,
    expression: CompiledExpr,
    #[serde(default)]
    template: Template,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<Identifier>,
}

impl ForceField {
    /// Create an unregistered field from source text
    pub fn new(
        kind: ForceFieldKind,
        display_name: impl Into<String>,
        condition: &str,
        expression: &str,
    ) -> Result<Self> {
        Ok(Self {
            id: Identifier::unassigned(),
            display_name: display_name.into(),
            kind,
            condition: CompiledExpr::new(condition)?,
            expression: CompiledExpr::new(expression)?,
            template: Template::custom(),
            owner: None,
        })
    }

    /// Immediate field that always applies
    pub fn immediate(display_name: impl Into<String>, expression: &str) -> Result<Self> {
        Self::new(ForceFieldKind::Immediate, display_name, "true", expression)
    }

    pub fn kind(&self) -> ForceFieldKind {
        self.kind
    }

    pub fn is_derived(&self) -> bool {
        self.kind == ForceFieldKind::Derived
    }

    pub fn condition(&self) -> &CompiledExpr {
        &self.condition
    }

    pub fn expression(&self) -> &CompiledExpr {
        &self.expression
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Object that owns this field, if any
    pub fn owner(&self) -> Option<&Identifier> {
        self.owner.as_ref()
    }

    /// Replace condition and expression together
    ///
    /// Both are compiled before anything changes, so a syntax error in
    /// either leaves the field as it was.
    pub fn update(&mut self, condition: &str, expression: &str) -> Result<()> {
        let condition = CompiledExpr::new(condition)?;
        let expression = CompiledExpr::new(expression)?;
        self.condition = condition;
        self.expression = expression;
        Ok(())
    }

    /// Whether the condition evaluates to exactly `true`
    pub fn judge_condition(&self, scope: &dyn Scope) -> Result<bool> {
        Ok(self.condition.evaluate(scope)? == Value::Bool(true))
    }

    /// Force of an Immediate field on the object described by `scope`
    ///
    /// Returns `None` when the condition does not hold.
    pub fn compute_force(&self, scope: &dyn Scope) -> Result<Option<Vector>> {
        if self.is_derived() {
            return Err(Error::invalid(format!(
                "{} is a derived field; use compute_force_ffd",
                self.id
            )));
        }
        if !self.judge_condition(scope)? {
            return Ok(None);
        }
        self.force_value(scope).map(Some)
    }

    /// Force of a Derived field given the summed Immediate force
    ///
    /// `F` and `a = F / mass` are bound on top of `scope`; zero or missing
    /// mass gives zero acceleration.
    pub fn compute_force_ffd(&self, scope: &dyn Scope, total_force: Vector) -> Result<Option<Vector>> {
        if !self.is_derived() {
            return Err(Error::invalid(format!(
                "{} is an immediate field; use compute_force",
                self.id
            )));
        }
        let extra = Self::derived_bindings(scope, total_force);
        let scope = Layered::new(&extra, scope);
        if !self.judge_condition(&scope)? {
            return Ok(None);
        }
        self.force_value(&scope).map(Some)
    }

    /// Condition of a Derived field given the summed Immediate force
    pub fn judge_condition_ffd(&self, scope: &dyn Scope, total_force: Vector) -> Result<bool> {
        let extra = Self::derived_bindings(scope, total_force);
        self.judge_condition(&Layered::new(&extra, scope))
    }

    fn derived_bindings(scope: &dyn Scope, total_force: Vector) -> ValueMap {
        let mass = scope
            .lookup("mass")
            .and_then(|m| m.as_scalar())
            .unwrap_or(0.0);
        let accel = total_force.map(|f| {
            let a = f / mass;
            if a.is_finite() {
                a
            } else {
                0.0
            }
        });
        let mut extra = ValueMap::with_capacity(2);
        extra.insert("F".to_string(), Value::Vector(total_force));
        extra.insert("a".to_string(), Value::Vector(accel));
        extra
    }

    fn force_value(&self, scope: &dyn Scope) -> Result<Vector> {
        match self.expression.evaluate(scope)? {
            Value::Vector(v) => Ok(v),
            other => Err(Error::NonVectorForce {
                field: self.id.clone(),
                got: other.type_name().to_string(),
            }),
        }
    }

    pub(crate) fn set_owner(&mut self, owner: Option<Identifier>) {
        self.owner = owner;
    }

    pub(crate) fn template_mut(&mut self) -> &mut Template {
        &mut self.template
    }
}

impl Identified for ForceField {
    fn id(&self) -> &Identifier {
        &self.id
    }

    fn id_slot(&mut self) -> &mut Identifier {
        &mut self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_scope(mass: f64, pos: Vector) -> ValueMap {
        let mut s = ValueMap::new();
        s.insert("mass".into(), Value::Scalar(mass));
        s.insert("pos".into(), Value::Vector(pos));
        s.insert("v".into(), Value::Vector([0.0, 0.0]));
        s
    }

    #[test]
    fn test_immediate_force() {
        let ff = ForceField::immediate("gravity", "mass * [0, -10]").unwrap();
        let force = ff.compute_force(&object_scope(2.0, [0.0, 0.0])).unwrap();
        assert_eq!(force, Some([0.0, -20.0]));
    }

    #[test]
    fn test_condition_must_be_exactly_true() {
        let ff = ForceField::new(ForceFieldKind::Immediate, "f", "1", "[1, 0]").unwrap();
        assert_eq!(ff.compute_force(&object_scope(1.0, [0.0, 0.0])).unwrap(), None);

        let ff = ForceField::new(ForceFieldKind::Immediate, "f", "pos[1] > 0", "[1, 0]").unwrap();
        assert_eq!(ff.compute_force(&object_scope(1.0, [-1.0, 0.0])).unwrap(), None);
        assert_eq!(
            ff.compute_force(&object_scope(1.0, [1.0, 0.0])).unwrap(),
            Some([1.0, 0.0])
        );
    }

    #[test]
    fn test_non_vector_force() {
        let ff = ForceField::immediate("scalar", "mass").unwrap();
        let err = ff.compute_force(&object_scope(1.0, [0.0, 0.0])).unwrap_err();
        assert!(matches!(err, Error::NonVectorForce { ref got, .. } if got == "scalar"));
    }

    #[test]
    fn test_derived_sees_total_force() {
        let ff = ForceField::new(ForceFieldKind::Derived, "cancel", "true", "-F").unwrap();
        let scope = object_scope(2.0, [0.0, 0.0]);
        assert!(ff.compute_force(&scope).is_err());
        assert_eq!(
            ff.compute_force_ffd(&scope, [4.0, -6.0]).unwrap(),
            Some([-4.0, 6.0])
        );

        let ff = ForceField::new(ForceFieldKind::Derived, "acc", "true", "a").unwrap();
        assert_eq!(ff.compute_force_ffd(&scope, [4.0, -6.0]).unwrap(), Some([2.0, -3.0]));
        let massless = object_scope(0.0, [0.0, 0.0]);
        assert_eq!(ff.compute_force_ffd(&massless, [4.0, -6.0]).unwrap(), Some([0.0, 0.0]));
    }

    #[test]
    fn test_update_is_atomic() {
        let mut ff = ForceField::immediate("f", "[1, 0]").unwrap();
        assert!(ff.update("true", "[1,").is_err());
        assert_eq!(ff.expression().source(), "[1, 0]");

        ff.update("false", "[2, 0]").unwrap();
        assert_eq!(ff.condition().source(), "false");
    }
}
