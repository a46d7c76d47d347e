//! Fieldsim World - the simulated universe
//!
//! This crate owns everything a simulation is made of:
//! - **Variables** (`Variable`, `VariableTable`): literal or derived quantities
//!   forming an acyclic dependency graph
//! - **Objects** (`PhysicsObject`): bodies whose mass, position and velocity
//!   are variables
//! - **Force fields** (`ForceField`, `Template`): conditional vector forces,
//!   hand-written or built from templates
//! - **World** (`World`): the registry tying them together, with JSON and RON
//!   persistence
//!
//! ## Example
//!
//! ```
//! use fieldsim_world::{ForceField, ObjectInit, ObjectKind, TimeStep, World};
//!
//! let mut world = World::new();
//! let ball = world
//!     .add_object(ObjectKind::Particle, ObjectInit::new().with_mass(2.0))
//!     .unwrap();
//! let gravity = world
//!     .add_force_field(ForceField::immediate("gravity", "mass * [0, -10]").unwrap(), None)
//!     .unwrap();
//!
//! let force = world
//!     .compute_force(&gravity, &ball, TimeStep::new(0.0, 0.01), None)
//!     .unwrap();
//! assert_eq!(force, Some([0.0, -20.0]));
//! ```

mod error;
mod force_field;
mod graph;
mod object;
mod record;
mod scope;
mod template;
mod variable;
mod world;

pub use error::{Error, Result};
pub use force_field::{ForceField, ForceFieldKind};
pub use graph::VariableTable;
pub use object::{ObjectInit, ObjectKind, ObjectState, PhysicsObject};
pub use record::JsonRecord;
pub use scope::TimeStep;
pub use template::{ParamSource, Template, TemplateKind};
pub use variable::{Quantity, Variable, VariableKind};
pub use world::World;
