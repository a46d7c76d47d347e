//! Fixed-step simulation with snapshot seeking
//!
//! A step evaluates every variable once, sums the Immediate forces on each
//! object, adds at most one Derived force, then integrates with explicit
//! Euler. All forces are computed before anything is written, so a failed
//! step leaves the world exactly as it was.

use fieldsim_core::{Identified, Identifier, Layered, Value, ValueMap, Vector, ZERO};
use fieldsim_world::{ForceField, ObjectKind, ObjectState, TimeStep, World};
use tracing::{debug, info, warn};

use crate::{Error, Result, SimConfig, SnapshotStore, StateHistory};

/// Remaining time below this fraction of `dt` counts as arrived
const ARRIVAL_EPSILON: f64 = 1e-9;

/// What the simulator is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimState {
    #[default]
    Idle,
    /// Advancing by a single step
    Stepping,
    /// Replaying forward from a snapshot towards a target time
    Seeking,
}

/// Net force on one object for the step being computed
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectForce {
    pub object: Identifier,
    pub state: ObjectState,
    pub force: Vector,
}

/// A world together with its clock and snapshot history
#[derive(Debug, Clone)]
pub struct Simulation<H = SnapshotStore> {
    world: World,
    config: SimConfig,
    time: f64,
    steps: u64,
    history: H,
    state: SimState,
}

impl Simulation<SnapshotStore> {
    /// Start a simulation at time 0 with default settings
    pub fn new(world: World) -> Self {
        Self::with_config(world, SimConfig::default())
    }

    pub fn with_config(world: World, config: SimConfig) -> Self {
        Self::with_history(world, config, SnapshotStore::new())
    }
}

impl<H: StateHistory> Simulation<H> {
    /// Start a simulation at time 0 using `history` for snapshots
    ///
    /// Any snapshots already in `history` are dropped; the initial world is
    /// saved as the time-0 baseline.
    pub fn with_history(world: World, config: SimConfig, mut history: H) -> Self {
        history.clear();
        history.save_state(0.0, &world);
        Self {
            world,
            config,
            time: 0.0,
            steps: 0,
            history,
            state: SimState::Idle,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access for editing between steps
    ///
    /// Edits are not captured by existing snapshots; call
    /// [`rebase`](Self::rebase) or [`backup`](Self::backup) to keep them
    /// across seeks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SimConfig {
        &mut self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Steps integrated since the simulation started or was reset
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Times at which snapshots exist, ascending
    pub fn snapshot_times(&self) -> Vec<f64> {
        self.history.times()
    }

    /// Current time and configured step, for evaluations outside a step
    pub fn clock(&self) -> TimeStep {
        TimeStep::new(self.time, self.config.dt())
    }

    // A step interrupted by a panic leaves the state non-idle; only a
    // restore or rebase clears it.
    fn ensure_idle(&self) -> Result<()> {
        match self.state {
            SimState::Idle => Ok(()),
            _ => Err(Error::NotIdle),
        }
    }

    fn check_dt(dt: f64) -> Result<()> {
        if dt.is_finite() && dt > 0.0 {
            Ok(())
        } else {
            Err(Error::Config(format!("time step must be positive, got {dt}")))
        }
    }

    /// Advance by the configured `dt`
    pub fn step(&mut self) -> Result<()> {
        self.step_with(self.config.dt())
    }

    /// Advance by `dt`
    pub fn step_with(&mut self, dt: f64) -> Result<()> {
        self.ensure_idle()?;
        Self::check_dt(dt)?;
        self.state = SimState::Stepping;
        let result = self.advance(dt);
        self.state = SimState::Idle;
        result
    }

    /// Save the current world as the snapshot for the current time
    pub fn backup(&mut self) {
        self.backup_at(self.time);
    }

    /// Save the current world under an explicit time
    pub fn backup_at(&mut self, time: f64) {
        self.history.save_state(time, &self.world);
        debug!(time, snapshots = self.history.len(), "snapshot saved");
    }

    /// Replace the world with the snapshot taken at exactly `time`
    pub fn restore_backup(&mut self, time: f64) -> Result<()> {
        let snapshot = self
            .history
            .get_state(time)
            .ok_or(Error::NoBackupAtTime(time))?;
        self.world = snapshot.clone();
        self.time = time + 0.0;
        self.state = SimState::Idle;
        debug!(time, "snapshot restored");
        Ok(())
    }

    /// Seek to `target` with the configured `dt`
    pub fn simulate_to(&mut self, target: f64) -> Result<()> {
        self.simulate_to_with(target, self.config.dt())
    }

    /// Seek to `target`
    ///
    /// Restores the latest snapshot at or before `target` and steps forward,
    /// shortening the last step so the clock lands on `target` exactly. A
    /// snapshot is saved every `backup_frequency` full steps along the way.
    pub fn simulate_to_with(&mut self, target: f64, dt: f64) -> Result<()> {
        self.ensure_idle()?;
        Self::check_dt(dt)?;
        if !target.is_finite() {
            return Err(Error::NoSnapshotBefore(target));
        }
        let start = self
            .history
            .get_nearest_before(target)
            .map(|(t, _)| t)
            .ok_or(Error::NoSnapshotBefore(target))?;
        self.restore_backup(start)?;

        self.state = SimState::Seeking;
        let result = self.replay(target, dt);
        self.state = SimState::Idle;
        if result.is_ok() {
            info!(from = start, to = target, "seek complete");
        }
        result
    }

    fn replay(&mut self, target: f64, dt: f64) -> Result<()> {
        let frequency = u64::from(self.config.backup_frequency());
        let mut full_steps = 0u64;
        loop {
            let remaining = target - self.time;
            if remaining <= dt * ARRIVAL_EPSILON {
                self.time = target;
                return Ok(());
            }
            if remaining < dt {
                self.advance(remaining)?;
                self.time = target;
                return Ok(());
            }
            self.advance(dt)?;
            full_steps += 1;
            if full_steps % frequency == 0 {
                self.backup();
            }
        }
    }

    /// Drop all snapshots and save the current world as the new baseline
    pub fn rebase(&mut self) {
        self.history.clear();
        self.state = SimState::Idle;
        self.backup();
        info!(time = self.time, "history rebased");
    }

    /// Replace the world and start over from time 0
    pub fn reset(&mut self, world: World) {
        self.world = world;
        self.time = 0.0;
        self.steps = 0;
        self.rebase();
    }

    /// Net force on every movable object at the current state
    ///
    /// This is the force computation of one step without integrating it.
    pub fn net_forces(&self, dt: f64) -> Result<Vec<ObjectForce>> {
        let step = TimeStep::new(self.time, dt);
        let vars = self.world.variable_values(step);
        self.compute_forces(step, &vars)
    }

    fn advance(&mut self, dt: f64) -> Result<()> {
        let step = TimeStep::new(self.time, dt);
        let vars = self.world.variable_values(step);
        let forces = self.compute_forces(step, &vars)?;
        for ObjectForce {
            object,
            state,
            force,
        } in forces
        {
            self.integrate(&object, state, force, dt)?;
        }
        self.time += dt;
        self.steps += 1;
        Ok(())
    }

    fn compute_forces(&self, step: TimeStep, vars: &ValueMap) -> Result<Vec<ObjectForce>> {
        let (derived, immediate): (Vec<&ForceField>, Vec<&ForceField>) =
            self.world.force_fields().partition(|ff| ff.is_derived());

        let mut out = Vec::new();
        for object in self.world.objects() {
            if object.kind() == ObjectKind::WorldAnchor {
                continue;
            }
            let id = object.id();
            let scope = self.world.object_scope(id, step, Some(vars))?;
            let state = self.world.object_state_in(id, vars)?;

            let mut force = ZERO;
            for ff in &immediate {
                let params = self.world.field_params(ff, &scope);
                if let Some(f) = ff.compute_force(&Layered::new(&params, &scope))? {
                    force = add(force, f);
                }
            }

            let mut applying = Vec::new();
            for ff in &derived {
                let params = self.world.field_params(ff, &scope);
                if ff.judge_condition_ffd(&Layered::new(&params, &scope), force)? {
                    applying.push((*ff, params));
                }
            }
            if applying.len() > 1 {
                let fields: Vec<Identifier> =
                    applying.iter().map(|(ff, _)| ff.id().clone()).collect();
                warn!(object = %id, count = fields.len(), "overlapping derived force fields");
                return Err(Error::OverlappingDerivedFields {
                    object: id.clone(),
                    fields,
                });
            }
            if let Some((ff, params)) = applying.first() {
                if let Some(f) = ff.compute_force_ffd(&Layered::new(params, &scope), force)? {
                    force = add(force, f);
                }
            }

            out.push(ObjectForce {
                object: id.clone(),
                state,
                force,
            });
        }
        Ok(out)
    }

    fn integrate(&mut self, id: &Identifier, state: ObjectState, force: Vector, dt: f64) -> Result<()> {
        let accel = state.acceleration(force);
        let [vx, vy] = state.velocity;
        let [px, py] = state.position;
        let dx = [
            vx * dt + 0.5 * accel[0] * dt * dt,
            vy * dt + 0.5 * accel[1] * dt * dt,
        ];
        let dv = [accel[0] * dt, accel[1] * dt];

        let object = self.world.object(id)?;
        let position = object.position_var().clone();
        let velocity = object.velocity_var().clone();

        if dx.iter().all(|d| d.is_finite()) {
            self.world
                .write_literal(&position, Value::Vector([px + dx[0], py + dx[1]]))?;
        } else {
            warn!(object = %id, "skipped non-finite position update");
        }
        if dv.iter().all(|d| d.is_finite()) {
            self.world
                .write_literal(&velocity, Value::Vector([vx + dv[0], vy + dv[1]]))?;
        } else {
            warn!(object = %id, "skipped non-finite velocity update");
        }
        Ok(())
    }
}

fn add(a: Vector, b: Vector) -> Vector {
    [a[0] + b[0], a[1] + b[1]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsim_world::{ForceFieldKind, ObjectInit, Quantity, TemplateKind, Variable};
    use proptest::prelude::*;

    fn world_with_ball(mass: f64) -> (World, Identifier) {
        let mut world = World::with_seed(3);
        let ball = world
            .add_object(ObjectKind::Particle, ObjectInit::new().with_mass(mass))
            .unwrap();
        (world, ball)
    }

    fn state_of(sim: &Simulation, id: &Identifier) -> ObjectState {
        sim.world().object_state(id, sim.clock()).unwrap()
    }

    fn close(a: Vector, b: Vector) -> bool {
        (a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9
    }

    #[test]
    fn test_no_forces_no_motion() {
        let mut world = World::new();
        let obj = world
            .add_object(
                ObjectKind::Basic,
                ObjectInit::new().with_mass(3.0).with_position([1.0, 2.0]),
            )
            .unwrap();
        let mut sim = Simulation::new(world);
        sim.step().unwrap();

        let state = state_of(&sim, &obj);
        assert_eq!(state.position, [1.0, 2.0]);
        assert_eq!(state.velocity, [0.0, 0.0]);
        assert_eq!(sim.time(), 1.0 / 128.0);
        assert_eq!(sim.step_count(), 1);
    }

    #[test]
    fn test_constant_force_one_step() {
        let (mut world, ball) = world_with_ball(2.0);
        world
            .add_force_field(ForceField::immediate("g", "mass*[0,-10]").unwrap(), None)
            .unwrap();
        let mut sim = Simulation::new(world);
        sim.step_with(0.1).unwrap();

        let state = state_of(&sim, &ball);
        assert!(close(state.velocity, [0.0, -1.0]));
        assert!(close(state.position, [0.0, -0.05]));
    }

    #[test]
    fn test_overlapping_derived_fields() {
        let (mut world, ball) = world_with_ball(1.0);
        let a = world
            .add_force_field(
                ForceField::new(ForceFieldKind::Derived, "a", "true", "[0, 0]").unwrap(),
                None,
            )
            .unwrap();
        let b = world
            .add_force_field(
                ForceField::new(ForceFieldKind::Derived, "b", "true", "[0, 0]").unwrap(),
                None,
            )
            .unwrap();
        let mut sim = Simulation::new(world);
        let before = sim.world().clone();

        match sim.step() {
            Err(Error::OverlappingDerivedFields { object, fields }) => {
                assert_eq!(object, ball);
                assert_eq!(fields, vec![a, b]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sim.world(), &before);
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.state(), SimState::Idle);
    }

    #[test]
    fn test_derived_field_sees_immediate_sum() {
        let (mut world, ball) = world_with_ball(2.0);
        world
            .add_force_field(ForceField::immediate("push", "[4, 0]").unwrap(), None)
            .unwrap();
        world
            .add_force_field(
                ForceField::new(ForceFieldKind::Derived, "cancel", "true", "-F").unwrap(),
                None,
            )
            .unwrap();
        let sim = Simulation::new(world);
        let forces = sim.net_forces(0.1).unwrap();
        let net = forces.iter().find(|f| f.object == ball).unwrap();
        assert_eq!(net.force, [0.0, 0.0]);
    }

    #[test]
    fn test_failed_step_leaves_world_untouched() {
        let (mut world, _) = world_with_ball(1.0);
        world
            .add_force_field(ForceField::immediate("ok", "[1, 0]").unwrap(), None)
            .unwrap();
        world
            .add_force_field(ForceField::immediate("bad", "nowhere * 2").unwrap(), None)
            .unwrap();
        let mut sim = Simulation::new(world);
        let before = sim.world().clone();
        assert!(sim.step().is_err());
        assert_eq!(sim.world(), &before);
    }

    #[test]
    fn test_zero_mass_does_not_move() {
        let (mut world, ball) = world_with_ball(0.0);
        world
            .add_force_field(ForceField::immediate("push", "[1, 0]").unwrap(), None)
            .unwrap();
        let mut sim = Simulation::new(world);
        sim.step().unwrap();
        let state = state_of(&sim, &ball);
        assert_eq!(state.position, [0.0, 0.0]);
        assert_eq!(state.velocity, [0.0, 0.0]);
    }

    #[test]
    fn test_non_finite_update_skipped() {
        let mut world = World::new();
        let ball = world
            .add_object(
                ObjectKind::Particle,
                ObjectInit::new().with_velocity([f64::INFINITY, 0.0]),
            )
            .unwrap();
        let mut sim = Simulation::new(world);
        sim.step_with(0.5).unwrap();
        let state = state_of(&sim, &ball);
        assert_eq!(state.position, [0.0, 0.0]);
        assert_eq!(state.velocity, [f64::INFINITY, 0.0]);
    }

    #[test]
    fn test_kinematic_position_follows_formula() {
        let mut world = World::new();
        let obj = world
            .add_object(
                ObjectKind::Basic,
                ObjectInit::new()
                    .with_position(Quantity::formula("[time, 0]"))
                    .with_velocity([1.0, 0.0]),
            )
            .unwrap();
        let mut sim = Simulation::new(world);
        sim.step_with(0.25).unwrap();
        sim.step_with(0.25).unwrap();
        let state = state_of(&sim, &obj);
        assert_eq!(state.position, [0.5, 0.0]);
        assert_eq!(state.velocity, [1.0, 0.0]);
    }

    #[test]
    fn test_anchor_never_moves() {
        let mut world = World::new();
        world
            .add_force_field(ForceField::immediate("wind", "[5, 0]").unwrap(), None)
            .unwrap();
        let anchor = world.anchor().clone();
        let mut sim = Simulation::new(world);
        for _ in 0..10 {
            sim.step().unwrap();
        }
        assert_eq!(state_of(&sim, &anchor).position, [0.0, 0.0]);
    }

    #[test]
    fn test_restore_backup() {
        let (mut world, ball) = world_with_ball(1.0);
        world
            .add_force_field(ForceField::immediate("push", "[1, 0]").unwrap(), None)
            .unwrap();
        let mut sim = Simulation::new(world);
        let initial = sim.world().clone();
        for _ in 0..5 {
            sim.step().unwrap();
        }
        assert_ne!(state_of(&sim, &ball).position, [0.0, 0.0]);

        sim.restore_backup(0.0).unwrap();
        assert_eq!(sim.world(), &initial);
        let once = sim.world().clone();
        sim.restore_backup(0.0).unwrap();
        assert_eq!(sim.world(), &once);
        assert_eq!(sim.time(), 0.0);

        sim.step().unwrap();
        sim.restore_backup(-0.0).unwrap();
        assert_eq!(sim.world(), &initial);
        assert!(sim.time().is_sign_positive());

        assert!(matches!(
            sim.restore_backup(0.3),
            Err(Error::NoBackupAtTime(t)) if t == 0.3
        ));
    }

    #[test]
    fn test_simulate_to_lands_exactly() {
        let (mut world, _) = world_with_ball(1.0);
        world.add_template_field(TemplateKind::Gravity, None).unwrap();
        let config = SimConfig::default().with_dt(0.1).with_backup_frequency(3);
        let mut sim = Simulation::with_config(world, config);

        sim.simulate_to(1.05).unwrap();
        assert_eq!(sim.time(), 1.05);
        assert_eq!(sim.state(), SimState::Idle);
        // baseline plus a snapshot every three full steps
        assert_eq!(sim.snapshot_times().len(), 4);

        assert!(matches!(
            sim.simulate_to(-1.0),
            Err(Error::NoSnapshotBefore(_))
        ));
        assert!(matches!(sim.simulate_to_with(2.0, 0.0), Err(Error::Config(_))));
        assert!(matches!(sim.step_with(f64::NAN), Err(Error::Config(_))));
        assert_eq!(sim.time(), 1.05);
    }

    #[test]
    fn test_seek_matches_stepping() {
        let (mut world, ball) = world_with_ball(2.0);
        world.add_template_field(TemplateKind::Gravity, None).unwrap();
        world
            .add_force_field(ForceField::immediate("drag", "-0.1 * v").unwrap(), None)
            .unwrap();

        let mut stepped = Simulation::new(world.clone());
        for _ in 0..64 {
            stepped.step().unwrap();
        }

        let mut seeking = Simulation::new(world);
        seeking.simulate_to(0.5).unwrap();
        assert_eq!(seeking.time(), 0.5);
        assert_eq!(state_of(&seeking, &ball), state_of(&stepped, &ball));

        // seeking back replays from the snapshot taken after 30 steps
        seeking.simulate_to(0.25).unwrap();
        assert_eq!(seeking.time(), 0.25);
        let mut replay = Simulation::new(seeking.history().get_state(30.0 / 128.0).unwrap().clone());
        replay.step().unwrap();
        replay.step().unwrap();
        assert_eq!(state_of(&seeking, &ball), state_of(&replay, &ball));
    }

    #[test]
    fn test_rebase_keeps_edits() {
        let (world, ball) = world_with_ball(1.0);
        let mut sim = Simulation::new(world);
        sim.step().unwrap();
        sim.world_mut()
            .add_force_field(ForceField::immediate("push", "[1, 0]").unwrap(), None)
            .unwrap();
        sim.rebase();
        assert_eq!(sim.snapshot_times(), vec![sim.time()]);

        sim.step().unwrap();
        let t = sim.time();
        sim.simulate_to(t).unwrap();
        assert!(state_of(&sim, &ball).velocity[0] > 0.0);
        assert!(matches!(sim.simulate_to(0.0), Err(Error::NoSnapshotBefore(_))));
    }

    #[test]
    fn test_derived_variable_uses_step_time() {
        let (mut world, ball) = world_with_ball(1.0);
        let strength = world
            .add_variable(Variable::derived("strength", "time * 0 + 2").unwrap())
            .unwrap();
        world
            .add_force_field(
                ForceField::immediate("push", &format!("[{strength}, 0]")).unwrap(),
                None,
            )
            .unwrap();
        let mut sim = Simulation::new(world);
        sim.step_with(1.0).unwrap();
        assert!(close(state_of(&sim, &ball).velocity, [2.0, 0.0]));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_backups_do_not_change_seek_result(extra in proptest::collection::vec(1u32..40, 0..4)) {
            let (mut world, ball) = world_with_ball(1.5);
            world.add_template_field(TemplateKind::Gravity, None).unwrap();
            world
                .add_force_field(ForceField::immediate("spring", "-4 * pos").unwrap(), None)
                .unwrap();
            let target = 0.75;

            let mut plain = Simulation::new(world.clone());
            plain.simulate_to(target).unwrap();

            // extra backups at full-step boundaries along the way
            let mut noisy = Simulation::new(world);
            for n in extra {
                for _ in 0..n {
                    noisy.step().unwrap();
                }
                if noisy.time() < target {
                    noisy.backup();
                }
            }
            noisy.simulate_to(target).unwrap();

            prop_assert_eq!(state_of(&noisy, &ball), state_of(&plain, &ball));
        }
    }
}
