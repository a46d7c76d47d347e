//! Evaluation scopes
//!
//! The scope an expression sees for one object, from lowest to highest
//! precedence: every world variable under its id, the caller's overrides,
//! `TARGET_<name>` for the object's own variables, then the object state
//! (`pos`, `v`, `mass`, `type`) and the clock (`time`, `dt`). Template
//! parameters of the field being evaluated sit on top of all of these.

use std::borrow::Cow;

use fieldsim_core::{Identifier, Layered, Value, ValueMap, Vector};

use crate::{Error, ForceField, ObjectState, Result, World};

/// Simulation clock handed to every evaluation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeStep {
    pub time: f64,
    pub dt: f64,
}

impl TimeStep {
    pub fn new(time: f64, dt: f64) -> Self {
        Self { time, dt }
    }

    /// `time` and `dt` as a scope, for Derived variables
    pub fn runtime(&self) -> ValueMap {
        let mut scope = ValueMap::with_capacity(2);
        scope.insert("time".to_string(), Value::Scalar(self.time));
        scope.insert("dt".to_string(), Value::Scalar(self.dt));
        scope
    }
}

impl World {
    /// Evaluate every variable at `step`
    ///
    /// Variables that fail to evaluate read as undefined.
    pub fn variable_values(&self, step: TimeStep) -> ValueMap {
        self.variables.snapshot(&step.runtime())
    }

    /// Variable values with `overrides` layered on top
    ///
    /// Borrows `overrides` as is when it already covers every variable.
    fn resolved_values<'a>(&self, step: TimeStep, overrides: Option<&'a ValueMap>) -> Cow<'a, ValueMap> {
        if let Some(overrides) = overrides {
            if self.variables.ids().all(|id| overrides.contains_key(id.as_str())) {
                return Cow::Borrowed(overrides);
            }
        }
        let mut values = self.variable_values(step);
        for (key, value) in overrides.into_iter().flatten() {
            values.insert(key.clone(), *value);
        }
        Cow::Owned(values)
    }

    /// Kinematic state of an object read from a value map
    pub fn object_state_in(&self, id: &Identifier, values: &ValueMap) -> Result<ObjectState> {
        let object = self.object(id)?;
        let read = |var: &Identifier| {
            values
                .get(var.as_str())
                .copied()
                .ok_or_else(|| Error::VariableNotFound(var.clone()))
        };
        Ok(ObjectState {
            kind: object.kind(),
            mass: read(object.mass_var())?.expect_scalar()?,
            position: read(object.position_var())?.expect_vector()?,
            velocity: read(object.velocity_var())?.expect_vector()?,
        })
    }

    /// Kinematic state of an object at `step`
    pub fn object_state(&self, id: &Identifier, step: TimeStep) -> Result<ObjectState> {
        let values = self.variable_values(step);
        self.object_state_in(id, &values)
    }

    /// Scope of force-field expressions evaluated against object `id`
    pub fn object_scope(
        &self,
        id: &Identifier,
        step: TimeStep,
        overrides: Option<&ValueMap>,
    ) -> Result<ValueMap> {
        let values = self.resolved_values(step, overrides);
        let state = self.object_state_in(id, &values)?;
        let object = self.object(id)?;

        let mut scope = values.into_owned();
        for var_id in object.variable_refs() {
            if let Some(var) = self.variables.get(var_id) {
                let value = scope.get(var_id.as_str()).copied().unwrap_or_default();
                scope.insert(format!("TARGET_{}", var.display_name()), value);
            }
        }
        for (name, value) in state.bindings() {
            scope.insert(name.to_string(), value);
        }
        scope.insert("time".to_string(), Value::Scalar(step.time));
        scope.insert("dt".to_string(), Value::Scalar(step.dt));
        Ok(scope)
    }

    /// Values of a field's template parameters, read from `scope`
    pub fn field_params(&self, ff: &ForceField, scope: &ValueMap) -> ValueMap {
        ff.template()
            .params
            .iter()
            .map(|(name, var)| {
                let value = scope.get(var.as_str()).copied().unwrap_or_default();
                (name.clone(), value)
            })
            .collect()
    }

    /// Whether field `ff` applies to object `object`
    ///
    /// Derived fields are judged with a zero summed force.
    pub fn judge_condition(
        &self,
        ff: &Identifier,
        object: &Identifier,
        step: TimeStep,
        overrides: Option<&ValueMap>,
    ) -> Result<bool> {
        let field = self.force_field(ff)?;
        let scope = self.object_scope(object, step, overrides)?;
        let params = self.field_params(field, &scope);
        let layered = Layered::new(&params, &scope);
        if field.is_derived() {
            field.judge_condition_ffd(&layered, [0.0, 0.0])
        } else {
            field.judge_condition(&layered)
        }
    }

    /// Force of Immediate field `ff` on object `object`
    pub fn compute_force(
        &self,
        ff: &Identifier,
        object: &Identifier,
        step: TimeStep,
        overrides: Option<&ValueMap>,
    ) -> Result<Option<Vector>> {
        let field = self.force_field(ff)?;
        let scope = self.object_scope(object, step, overrides)?;
        let params = self.field_params(field, &scope);
        field.compute_force(&Layered::new(&params, &scope))
    }

    /// Force of Derived field `ff` on object `object` given the summed
    /// Immediate force
    pub fn compute_force_ffd(
        &self,
        ff: &Identifier,
        object: &Identifier,
        step: TimeStep,
        overrides: Option<&ValueMap>,
        total_force: Vector,
    ) -> Result<Option<Vector>> {
        let field = self.force_field(ff)?;
        let scope = self.object_scope(object, step, overrides)?;
        let params = self.field_params(field, &scope);
        field.compute_force_ffd(&Layered::new(&params, &scope), total_force)
    }
}
