//! Fieldsim Engine - running a world forward in time
//!
//! ## Architecture
//!
//! ```text
//! Session (edit policy, collaborator sinks)
//!  │
//!  ├── Playback ── wall-clock frames → fixed steps
//!  ├── LiveMonitor ── probes sampled after each change
//!  │
//!  └── Simulation (clock, SimState)
//!       ├── World ── variables, objects, force fields
//!       └── StateHistory ── snapshots for seeking
//! ```
//!
//! ## Key Components
//!
//! - [`Simulation`]: explicit Euler stepping and `simulate_to` seeking from the
//!   nearest snapshot
//! - [`SnapshotStore`]: the default [`StateHistory`]
//! - [`Playback`]: fixed-timestep accumulator with a per-frame step cap
//! - [`Session`]: recovers from rejected edits, halts on failed steps, and
//!   reports both through a [`NotificationSink`]
//!
//! ## Example
//!
//! ```
//! use fieldsim_engine::{SimConfig, Simulation};
//! use fieldsim_world::{ForceField, ObjectInit, ObjectKind, World};
//!
//! let mut world = World::new();
//! let ball = world
//!     .add_object(ObjectKind::Particle, ObjectInit::new().with_mass(2.0))
//!     .unwrap();
//! world
//!     .add_force_field(ForceField::immediate("gravity", "mass * [0, -10]").unwrap(), None)
//!     .unwrap();
//!
//! let mut sim = Simulation::with_config(world, SimConfig::default().with_dt(0.1));
//! sim.step().unwrap();
//!
//! let state = sim.world().object_state(&ball, sim.clock()).unwrap();
//! assert!((state.velocity[1] + 1.0).abs() < 1e-12);
//! ```

mod config;
mod error;
mod history;
mod monitor;
mod notify;
mod playback;
mod render;
mod session;
mod simulation;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use history::{SimTime, SnapshotStore, StateHistory};
pub use monitor::{LiveMonitor, MonitorSink, Probe, Sample};
pub use notify::{Notification, NotificationKind, NotificationSink, TracingNotifier};
pub use playback::{FrameResult, Playback};
pub use render::{Display, ObjectFrame, RenderFrame, RenderSink};
pub use session::Session;
pub use simulation::{ObjectForce, SimState, Simulation};
