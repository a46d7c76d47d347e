//! Physics objects
//!
//! An object does not store its mass, position or velocity directly; it holds
//! the ids of the world variables that do. That is what lets any of them be a
//! formula over other variables.

use fieldsim_core::{Identified, Identifier, Value, Vector, ZERO};
use serde::{Deserialize, Serialize};

use crate::Quantity;

/// What kind of body an object is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Basic,
    Particle,
    /// Finite-radius body that spawns its own contact fields
    Rigidbody,
    /// The immovable origin every world carries
    WorldAnchor,
}

impl ObjectKind {
    /// Value bound to `type` in force-field scopes
    pub fn type_code(self) -> f64 {
        match self {
            ObjectKind::Basic => 0.0,
            ObjectKind::Particle => 1.0,
            ObjectKind::Rigidbody => 2.0,
            ObjectKind::WorldAnchor => 3.0,
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            ObjectKind::Basic => "Object",
            ObjectKind::Particle => "Particle",
            ObjectKind::Rigidbody => "Rigidbody",
            ObjectKind::WorldAnchor => "World",
        }
    }

    pub fn has_radius(self) -> bool {
        matches!(self, ObjectKind::Rigidbody)
    }
}

/// An object registered in a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsObject {
    id: Identifier,
    pub display_name: String,
    kind: ObjectKind,
    mass: Identifier,
    position: Identifier,
    velocity: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    radius: Option<Identifier>,
    /// Variables exposed to force fields as `TARGET_<display name>`
    #[serde(default)]
    variable_refs: Vec<Identifier>,
    /// Force fields this object owns
    #[serde(default)]
    force_field_refs: Vec<Identifier>,
    /// Rendering hints, carried but never interpreted
    #[serde(default)]
    pub style: serde_json::Value,
}

impl PhysicsObject {
    pub(crate) fn new(
        kind: ObjectKind,
        display_name: String,
        mass: Identifier,
        position: Identifier,
        velocity: Identifier,
    ) -> Self {
        Self {
            id: Identifier::unassigned(),
            display_name,
            kind,
            mass,
            position,
            velocity,
            radius: None,
            variable_refs: Vec::new(),
            force_field_refs: Vec::new(),
            style: serde_json::Value::Null,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn mass_var(&self) -> &Identifier {
        &self.mass
    }

    pub fn position_var(&self) -> &Identifier {
        &self.position
    }

    pub fn velocity_var(&self) -> &Identifier {
        &self.velocity
    }

    pub fn radius_var(&self) -> Option<&Identifier> {
        self.radius.as_ref()
    }

    pub fn variable_refs(&self) -> &[Identifier] {
        &self.variable_refs
    }

    pub fn force_field_refs(&self) -> &[Identifier] {
        &self.force_field_refs
    }

    /// Variables the object cannot exist without
    pub fn core_vars(&self) -> impl Iterator<Item = &Identifier> {
        [&self.mass, &self.position, &self.velocity]
            .into_iter()
            .chain(self.radius.as_ref())
    }

    /// Every variable this object references
    pub fn all_vars(&self) -> Vec<&Identifier> {
        let mut out: Vec<&Identifier> = self.core_vars().collect();
        for id in &self.variable_refs {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    pub(crate) fn set_radius(&mut self, id: Identifier) {
        self.radius = Some(id);
    }

    pub(crate) fn add_variable_ref(&mut self, id: Identifier) {
        if !self.variable_refs.contains(&id) {
            self.variable_refs.push(id);
        }
    }

    pub(crate) fn remove_variable_ref(&mut self, id: &Identifier) -> bool {
        let before = self.variable_refs.len();
        self.variable_refs.retain(|r| r != id);
        before != self.variable_refs.len()
    }

    pub(crate) fn add_force_field_ref(&mut self, id: Identifier) {
        if !self.force_field_refs.contains(&id) {
            self.force_field_refs.push(id);
        }
    }

    pub(crate) fn remove_force_field_ref(&mut self, id: &Identifier) -> bool {
        let before = self.force_field_refs.len();
        self.force_field_refs.retain(|r| r != id);
        before != self.force_field_refs.len()
    }
}

impl Identified for PhysicsObject {
    fn id(&self) -> &Identifier {
        &self.id
    }

    fn id_slot(&mut self) -> &mut Identifier {
        &mut self.id
    }
}

/// Initial values for a new object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInit {
    pub display_name: Option<String>,
    pub mass: Quantity,
    pub position: Quantity,
    pub velocity: Quantity,
    /// Only used for rigidbodies
    pub radius: Quantity,
    pub style: serde_json::Value,
}

impl Default for ObjectInit {
    fn default() -> Self {
        Self {
            display_name: None,
            mass: Quantity::from(1.0),
            position: Quantity::from(ZERO),
            velocity: Quantity::from(ZERO),
            radius: Quantity::from(1.0),
            style: serde_json::Value::Null,
        }
    }
}

impl ObjectInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_mass(mut self, mass: impl Into<Quantity>) -> Self {
        self.mass = mass.into();
        self
    }

    pub fn with_position(mut self, position: impl Into<Quantity>) -> Self {
        self.position = position.into();
        self
    }

    pub fn with_velocity(mut self, velocity: impl Into<Quantity>) -> Self {
        self.velocity = velocity.into();
        self
    }

    pub fn with_radius(mut self, radius: impl Into<Quantity>) -> Self {
        self.radius = radius.into();
        self
    }

    pub fn with_style(mut self, style: serde_json::Value) -> Self {
        self.style = style;
        self
    }
}

/// Evaluated kinematic state of one object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub kind: ObjectKind,
    pub mass: f64,
    pub position: Vector,
    pub velocity: Vector,
}

impl ObjectState {
    /// Acceleration produced by `force`; zero mass gives zero acceleration
    pub fn acceleration(&self, force: Vector) -> Vector {
        force.map(|f| {
            let a = f / self.mass;
            if a.is_finite() {
                a
            } else {
                0.0
            }
        })
    }

    /// Bindings shared by every force-field scope for this object
    pub(crate) fn bindings(&self) -> [(&'static str, Value); 4] {
        [
            ("pos", Value::Vector(self.position)),
            ("v", Value::Vector(self.velocity)),
            ("mass", Value::Scalar(self.mass)),
            ("type", Value::Scalar(self.kind.type_code())),
        ]
    }
}
