//! The world registry
//!
//! A world owns every object, variable and force field of one simulation,
//! together with the id registry that issued their ids. Every edit either
//! succeeds completely or leaves the world untouched.

use fieldsim_core::{CompiledExpr, IdPrefix, IdRegistry, Identified, Identifier, Value, ZERO};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{
    Error, ForceField, ForceFieldKind, ObjectInit, ObjectKind, ParamSource, PhysicsObject,
    Quantity, Result, Template, TemplateKind, Variable, VariableTable,
};

/// Everything that makes up one simulation
#[derive(Debug, Clone)]
pub struct World {
    pub(crate) objects: IndexMap<Identifier, PhysicsObject>,
    pub(crate) variables: VariableTable,
    pub(crate) force_fields: IndexMap<Identifier, ForceField>,
    pub(crate) registry: IdRegistry,
    pub(crate) anchor: Identifier,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for World {
    fn eq(&self, other: &Self) -> bool {
        self.anchor == other.anchor
            && self.objects == other.objects
            && self.variables == other.variables
            && self.force_fields == other.force_fields
    }
}

impl World {
    /// Create a world containing only its anchor object
    pub fn new() -> Self {
        Self::with_registry(IdRegistry::new())
    }

    /// Create a world whose generated ids follow `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self::with_registry(IdRegistry::with_seed(seed))
    }

    fn with_registry(registry: IdRegistry) -> Self {
        let mut world = Self::empty(registry);
        let mass = world.insert_literal("m", Value::Scalar(0.0));
        let position = world.insert_literal("pos", Value::Vector(ZERO));
        let velocity = world.insert_literal("velocity", Value::Vector(ZERO));

        let id = world.registry.generate_id(IdPrefix::Object);
        let mut anchor = PhysicsObject::new(
            ObjectKind::WorldAnchor,
            ObjectKind::WorldAnchor.default_name().to_string(),
            mass,
            position,
            velocity,
        );
        *anchor.id_slot() = id.clone();
        world.objects.insert(id.clone(), anchor);
        world.anchor = id;
        world
    }

    /// A world with no anchor, used while rehydrating saved worlds
    pub(crate) fn empty(registry: IdRegistry) -> Self {
        Self {
            objects: IndexMap::new(),
            variables: VariableTable::new(),
            force_fields: IndexMap::new(),
            registry,
            anchor: Identifier::unassigned(),
        }
    }

    fn insert_literal(&mut self, name: &str, value: Value) -> Identifier {
        let id = self.registry.generate_id(IdPrefix::Variable);
        let mut var = Variable::literal(name, value);
        *var.id_slot() = id.clone();
        var.attach();
        self.variables.insert(var);
        id
    }

    /// Replace the whole world with another one
    pub fn reset(&mut self, other: World) {
        *self = other;
        debug!(objects = self.objects.len(), "world reset");
    }

    // ---- lookup ----

    /// Id of the immovable anchor object
    pub fn anchor(&self) -> &Identifier {
        &self.anchor
    }

    pub fn object(&self, id: &Identifier) -> Result<&PhysicsObject> {
        self.objects
            .get(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    pub fn objects(&self) -> impl Iterator<Item = &PhysicsObject> {
        self.objects.values()
    }

    pub fn variable(&self, id: &Identifier) -> Result<&Variable> {
        self.variables
            .get(id)
            .ok_or_else(|| Error::VariableNotFound(id.clone()))
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn force_field(&self, id: &Identifier) -> Result<&ForceField> {
        self.force_fields
            .get(id)
            .ok_or_else(|| Error::ForceFieldNotFound(id.clone()))
    }

    pub fn force_fields(&self) -> impl Iterator<Item = &ForceField> {
        self.force_fields.values()
    }

    pub fn registry(&self) -> &IdRegistry {
        &self.registry
    }

    fn object_mut(&mut self, id: &Identifier) -> Result<&mut PhysicsObject> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    fn variable_mut(&mut self, id: &Identifier) -> Result<&mut Variable> {
        self.variables
            .get_mut(id)
            .ok_or_else(|| Error::VariableNotFound(id.clone()))
    }

    fn force_field_mut(&mut self, id: &Identifier) -> Result<&mut ForceField> {
        self.force_fields
            .get_mut(id)
            .ok_or_else(|| Error::ForceFieldNotFound(id.clone()))
    }

    /// Claim a caller-supplied id, or issue a fresh one
    fn claim_id(&mut self, current: &Identifier, prefix: IdPrefix) -> Result<Identifier> {
        if current.is_unassigned() {
            Ok(self.registry.generate_id(prefix))
        } else {
            self.registry.reserve(current)?;
            Ok(current.clone())
        }
    }

    // ---- variables ----

    /// Register a variable
    ///
    /// Variables built with [`Variable::literal`]/[`Variable::derived`] get a
    /// fresh `VAR_` id; variables that already carry an id (e.g. loaded from
    /// JSON) keep it. A formula that closes a dependency loop is rejected.
    pub fn add_variable(&mut self, mut var: Variable) -> Result<Identifier> {
        let id = self.claim_id(var.id(), IdPrefix::Variable)?;
        if let Some(cycle_path) = var
            .dependencies()
            .and_then(|deps| self.variables.find_cycle_with(&id, deps))
        {
            self.registry.release(&id);
            warn!(variable = %id, "rejected variable with circular dependency");
            return Err(Error::CircularDependency { cycle_path });
        }
        if var.id().is_unassigned() {
            var.assign_id(id.clone())?;
        }
        var.attach();
        self.variables.insert(var);
        debug!(variable = %id, "variable added");
        Ok(id)
    }

    /// Register a variable and expose it to force fields through `object`
    pub fn add_object_variable(&mut self, object: &Identifier, var: Variable) -> Result<Identifier> {
        self.object(object)?;
        let id = self.add_variable(var)?;
        self.object_mut(object)?.add_variable_ref(id.clone());
        Ok(id)
    }

    /// Replace a variable's content
    ///
    /// A formula is compiled and checked against the dependency graph before
    /// anything changes; on error the old content is kept.
    pub fn update_variable(&mut self, id: &Identifier, quantity: Quantity) -> Result<()> {
        self.variable(id)?;
        match quantity {
            Quantity::Literal(value) => self.variable_mut(id)?.set_literal(value),
            Quantity::Formula(source) => {
                let expression = CompiledExpr::new(source)?;
                if let Some(cycle_path) = self
                    .variables
                    .find_cycle_with(id, expression.dependencies())
                {
                    warn!(variable = %id, "rejected edit with circular dependency");
                    return Err(Error::CircularDependency { cycle_path });
                }
                self.variable_mut(id)?.set_formula(expression);
            }
        }
        Ok(())
    }

    /// Replace a variable's formula
    pub fn update_expression(&mut self, id: &Identifier, source: &str) -> Result<()> {
        self.update_variable(id, Quantity::formula(source))
    }

    /// Overwrite a Literal variable's value
    ///
    /// Returns `false` without changing anything if the variable is Derived.
    pub fn write_literal(&mut self, id: &Identifier, value: Value) -> Result<bool> {
        let var = self.variable_mut(id)?;
        if var.is_derived() {
            return Ok(false);
        }
        var.set_literal(value);
        Ok(true)
    }

    pub fn rename_variable(&mut self, id: &Identifier, name: impl Into<String>) -> Result<()> {
        self.variable_mut(id)?.rename(name);
        Ok(())
    }

    /// Remove a free-standing variable
    ///
    /// Mass, position, velocity and radius variables go away with their object
    /// and template parameters with their field; removing those directly is an
    /// error. Derived variables that read the removed one see it as undefined.
    pub fn remove_variable(&mut self, id: &Identifier) -> Result<Variable> {
        self.variable(id)?;
        if let Some(obj) = self.objects.values().find(|o| o.core_vars().any(|v| v == id)) {
            return Err(Error::invalid(format!(
                "variable {id} belongs to object {}",
                obj.id()
            )));
        }
        if let Some(ff) = self.force_fields.values().find(|f| f.template().binds(id)) {
            return Err(Error::invalid(format!(
                "variable {id} is a parameter of force field {}",
                ff.id()
            )));
        }
        for obj in self.objects.values_mut() {
            obj.remove_variable_ref(id);
        }
        self.detach_variable(id)
    }

    fn detach_variable(&mut self, id: &Identifier) -> Result<Variable> {
        let var = self
            .variables
            .remove(id)
            .ok_or_else(|| Error::VariableNotFound(id.clone()))?;
        self.registry.release(id);
        debug!(variable = %id, "variable removed");
        Ok(var)
    }

    /// Current value of a variable, with no runtime names bound
    pub fn variable_value(&self, id: &Identifier) -> Result<Value> {
        self.variables.value(id)
    }

    // ---- objects ----

    /// Create an object of `kind` along with its state variables
    ///
    /// Rigidbodies also get a radius variable `r` and their pair of contact
    /// fields. A world holds exactly one anchor, so `WorldAnchor` is rejected.
    pub fn add_object(&mut self, kind: ObjectKind, init: ObjectInit) -> Result<Identifier> {
        if kind == ObjectKind::WorldAnchor {
            return Err(Error::invalid("a world has exactly one anchor"));
        }
        let ObjectInit {
            display_name,
            mass,
            position,
            velocity,
            radius,
            style,
        } = init;

        // compile everything up front so a bad formula registers nothing
        let mass = Variable::new("m", mass)?;
        let position = Variable::new("pos", position)?;
        let velocity = Variable::new("velocity", velocity)?;
        let radius = if kind.has_radius() {
            Some(Variable::new("r", radius)?)
        } else {
            None
        };

        let mut object = PhysicsObject::new(
            kind,
            display_name.unwrap_or_else(|| kind.default_name().to_string()),
            self.add_variable(mass)?,
            self.add_variable(position)?,
            self.add_variable(velocity)?,
        );
        object.style = style;
        if let Some(radius) = radius {
            let radius = self.add_variable(radius)?;
            object.set_radius(radius.clone());
            object.add_variable_ref(radius);
        }

        let id = self.registry.generate_id(IdPrefix::Object);
        object.assign_id(id.clone())?;
        self.objects.insert(id.clone(), object);

        if kind == ObjectKind::Rigidbody {
            self.add_template_field(TemplateKind::VelocityNeutralize, Some(&id))?;
            self.add_template_field(TemplateKind::AccelerationNeutralize, Some(&id))?;
        }
        debug!(object = %id, ?kind, "object added");
        Ok(id)
    }

    /// Remove an object with its variables and owned force fields
    pub fn remove_object(&mut self, id: &Identifier) -> Result<PhysicsObject> {
        if *id == self.anchor {
            return Err(Error::invalid("the world anchor cannot be removed"));
        }
        let owned = self.object(id)?.force_field_refs().to_vec();
        for ff in &owned {
            self.remove_force_field(ff)?;
        }

        let object = self
            .objects
            .shift_remove(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))?;
        for var in object.all_vars() {
            if self.variables.contains(var) {
                self.detach_variable(var)?;
            }
        }
        self.registry.release(id);
        debug!(object = %id, "object removed");
        Ok(object)
    }

    pub fn rename_object(&mut self, id: &Identifier, name: impl Into<String>) -> Result<()> {
        self.object_mut(id)?.display_name = name.into();
        Ok(())
    }

    // ---- force fields ----

    /// Register a force field, optionally owned by `owner`
    ///
    /// Without an explicit owner the field keeps the owner it carries, if any.
    pub fn add_force_field(
        &mut self,
        mut ff: ForceField,
        owner: Option<&Identifier>,
    ) -> Result<Identifier> {
        let owner = owner.cloned().or_else(|| ff.owner().cloned());
        if let Some(owner) = &owner {
            self.object(owner)?;
        }
        let prefix = match ff.kind() {
            ForceFieldKind::Immediate => IdPrefix::ForceField,
            ForceFieldKind::Derived => IdPrefix::DerivedForceField,
        };
        let id = self.claim_id(ff.id(), prefix)?;
        if ff.id().is_unassigned() {
            ff.assign_id(id.clone())?;
        }
        ff.set_owner(owner.clone());
        if let Some(owner) = &owner {
            self.object_mut(owner)?.add_force_field_ref(id.clone());
        }
        self.force_fields.insert(id.clone(), ff);
        debug!(force_field = %id, "force field added");
        Ok(id)
    }

    /// Create a field following `template`
    pub fn add_template_field(
        &mut self,
        template: TemplateKind,
        owner: Option<&Identifier>,
    ) -> Result<Identifier> {
        self.check_template_owner(template, owner)?;
        let kind = template.field_kind().unwrap_or(ForceFieldKind::Immediate);
        let ff = ForceField::new(kind, template.default_name(), "true", "[0, 0]")?;
        let id = self.add_force_field(ff, owner)?;
        self.set_template(&id, template)?;
        Ok(id)
    }

    /// Remove a force field and the variables its template created
    pub fn remove_force_field(&mut self, id: &Identifier) -> Result<ForceField> {
        self.clear_template_params(id)?;
        let ff = self
            .force_fields
            .shift_remove(id)
            .ok_or_else(|| Error::ForceFieldNotFound(id.clone()))?;
        if let Some(owner) = ff.owner() {
            if let Some(obj) = self.objects.get_mut(owner) {
                obj.remove_force_field_ref(id);
            }
        }
        self.registry.release(id);
        debug!(force_field = %id, "force field removed");
        Ok(ff)
    }

    pub fn rename_force_field(&mut self, id: &Identifier, name: impl Into<String>) -> Result<()> {
        self.force_field_mut(id)?.display_name = name.into();
        Ok(())
    }

    /// Replace a field's condition and expression
    ///
    /// A syntax error in either keeps the previous pair.
    pub fn update_force_field(
        &mut self,
        id: &Identifier,
        condition: &str,
        expression: &str,
    ) -> Result<()> {
        self.force_field_mut(id)?.update(condition, expression)
    }

    /// Switch a field to `template`
    ///
    /// Auxiliary variables of the previous template are removed first.
    /// Choosing `Custom` keeps the current condition and expression. A
    /// template of the other field kind is rejected, since the kind is
    /// fixed by the field's id prefix.
    pub fn set_template(&mut self, id: &Identifier, template: TemplateKind) -> Result<()> {
        let owner = self.force_field(id)?.owner().cloned();
        if let Some(kind) = template.field_kind() {
            self.check_field_kind(id, kind)?;
        }
        self.check_template_owner(template, owner.as_ref())?;
        self.clear_template_params(id)?;
        if template == TemplateKind::Custom {
            return Ok(());
        }
        let params = self.bind_params(template, owner.as_ref(), &IndexMap::new())?;
        self.apply_template(id, template, params)
    }

    /// Drop the template's auxiliary variables and revert the field to Custom
    pub fn clear_template_params(&mut self, id: &Identifier) -> Result<()> {
        let ff = self.force_field(id)?;
        let owner = ff.owner().cloned();
        let aux: Vec<Identifier> = ff.template().auxiliary_vars().cloned().collect();
        for var in &aux {
            if let Some(owner) = owner.as_ref().and_then(|o| self.objects.get_mut(o)) {
                owner.remove_variable_ref(var);
            }
            if self.variables.contains(var) {
                self.detach_variable(var)?;
            }
        }
        *self.force_field_mut(id)?.template_mut() = Template::custom();
        Ok(())
    }

    /// Copy the settings of force field `other` into field `id`
    ///
    /// Auxiliary parameters get fresh variables with the same content as the
    /// source's; owner-bound parameters bind to this field's own owner. Both
    /// fields must be of the same kind.
    pub fn reset_to_other(&mut self, id: &Identifier, other: &Identifier) -> Result<()> {
        if id == other {
            return Ok(());
        }
        let source = self.force_field(other)?.clone();
        self.check_field_kind(id, source.kind())?;
        let owner = self.force_field(id)?.owner().cloned();
        let template = source.template().kind;
        self.check_template_owner(template, owner.as_ref())?;

        let mut seed = IndexMap::new();
        for (name, var) in &source.template().params {
            if let Some(var) = self.variables.get(var) {
                seed.insert(name.clone(), var.quantity());
            }
        }

        self.clear_template_params(id)?;
        let ff = self.force_field_mut(id)?;
        ff.display_name = source.display_name.clone();
        ff.update(source.condition().source(), source.expression().source())?;
        if template != TemplateKind::Custom {
            let params = self.bind_params(template, owner.as_ref(), &seed)?;
            self.force_field_mut(id)?.template_mut().kind = template;
            self.force_field_mut(id)?.template_mut().params = params;
        }
        Ok(())
    }

    fn check_field_kind(&self, id: &Identifier, kind: ForceFieldKind) -> Result<()> {
        let current = self.force_field(id)?.kind();
        if current != kind {
            return Err(Error::invalid(format!(
                "force field {id} is {current:?} and cannot take {kind:?} settings"
            )));
        }
        Ok(())
    }

    fn check_template_owner(&self, template: TemplateKind, owner: Option<&Identifier>) -> Result<()> {
        if !template.needs_owner() {
            return Ok(());
        }
        let owner = owner.ok_or_else(|| {
            Error::invalid(format!("template {template:?} needs an owning object"))
        })?;
        let object = self.object(owner)?;
        let wants_radius = template
            .params()
            .iter()
            .any(|(_, source)| *source == ParamSource::OwnerRadius);
        if wants_radius && object.radius_var().is_none() {
            return Err(Error::invalid(format!(
                "template {template:?} needs an owner with a radius"
            )));
        }
        Ok(())
    }

    /// Resolve every parameter of `template` to a variable id
    ///
    /// Auxiliary parameters take their content from `seed` when present.
    fn bind_params(
        &mut self,
        template: TemplateKind,
        owner: Option<&Identifier>,
        seed: &IndexMap<String, Quantity>,
    ) -> Result<IndexMap<String, Identifier>> {
        let mut params = IndexMap::new();
        for (name, source) in template.params() {
            let bound = match source {
                ParamSource::Auxiliary(default) => {
                    let quantity = seed
                        .get(*name)
                        .cloned()
                        .unwrap_or(Quantity::Literal(*default));
                    let var = Variable::new(*name, quantity)?;
                    match owner {
                        Some(owner) => self.add_object_variable(owner, var)?,
                        None => self.add_variable(var)?,
                    }
                }
                owner_bound => {
                    let object = self.object(owner.ok_or_else(|| {
                        Error::invalid(format!("parameter {name} needs an owning object"))
                    })?)?;
                    match owner_bound {
                        ParamSource::OwnerMass => object.mass_var().clone(),
                        ParamSource::OwnerPosition => object.position_var().clone(),
                        ParamSource::OwnerVelocity => object.velocity_var().clone(),
                        _ => object.radius_var().cloned().ok_or_else(|| {
                            Error::invalid(format!("object {} has no radius", object.id()))
                        })?,
                    }
                }
            };
            params.insert(name.to_string(), bound);
        }
        Ok(params)
    }

    fn apply_template(
        &mut self,
        id: &Identifier,
        template: TemplateKind,
        params: IndexMap<String, Identifier>,
    ) -> Result<()> {
        let ff = self.force_field_mut(id)?;
        if let (Some(condition), Some(expression)) = (template.condition(), template.expression()) {
            ff.update(&condition, expression)?;
        }
        *ff.template_mut() = Template {
            kind: template,
            params,
        };
        Ok(())
    }
}
