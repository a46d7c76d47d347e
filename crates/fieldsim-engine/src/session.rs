//! Interactive session
//!
//! `Session` ties a simulation to playback, live probes and the three
//! collaborator sinks, and applies the error policy of an editor:
//!
//! - Edits are validated before anything changes. A rejected edit leaves the
//!   world as it was, is reported to the notifier and returned to the caller.
//! - A failed step or seek halts playback and is reported. The world stays at
//!   its last integrated state; recovering is up to the user (seek back or
//!   restore a snapshot).
//!
//! Every visible change (edit, step, seek, load) is followed by a render
//! frame and a round of probe samples.

use fieldsim_core::{Identifier, Value};
use fieldsim_world::{
    ForceField, ObjectInit, ObjectKind, Quantity, TemplateKind, Variable, World,
};
use tracing::{info, warn};

use crate::{
    Error, FrameResult, LiveMonitor, MonitorSink, Notification, NotificationSink, Playback,
    RenderFrame, RenderSink, Result, Sample, SimConfig, Simulation, TracingNotifier,
};

/// Discards frames
impl RenderSink for () {
    fn render(&mut self, _frame: &RenderFrame) {}
}

/// Discards samples
impl MonitorSink for () {
    fn record(&mut self, _sample: Sample) {}
}

/// A simulation driven by a user
pub struct Session<N = TracingNotifier, R = (), M = ()> {
    sim: Simulation,
    playback: Playback,
    monitor: LiveMonitor,
    notifier: N,
    renderer: R,
    samples: M,
}

impl Session {
    pub fn new(world: World, config: SimConfig) -> Self {
        Self {
            sim: Simulation::with_config(world, config),
            playback: Playback::new(),
            monitor: LiveMonitor::new(),
            notifier: TracingNotifier,
            renderer: (),
            samples: (),
        }
    }
}

impl<N, R, M> Session<N, R, M>
where
    N: NotificationSink,
    R: RenderSink,
    M: MonitorSink,
{
    pub fn with_notifier<N2: NotificationSink>(self, notifier: N2) -> Session<N2, R, M> {
        Session {
            sim: self.sim,
            playback: self.playback,
            monitor: self.monitor,
            notifier,
            renderer: self.renderer,
            samples: self.samples,
        }
    }

    pub fn with_renderer<R2: RenderSink>(self, renderer: R2) -> Session<N, R2, M> {
        Session {
            sim: self.sim,
            playback: self.playback,
            monitor: self.monitor,
            notifier: self.notifier,
            renderer,
            samples: self.samples,
        }
    }

    pub fn with_monitor_sink<M2: MonitorSink>(self, samples: M2) -> Session<N, R, M2> {
        Session {
            sim: self.sim,
            playback: self.playback,
            monitor: self.monitor,
            notifier: self.notifier,
            renderer: self.renderer,
            samples,
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn world(&self) -> &World {
        self.sim.world()
    }

    pub fn time(&self) -> f64 {
        self.sim.time()
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn monitor(&self) -> &LiveMonitor {
        &self.monitor
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn monitor_sink(&self) -> &M {
        &self.samples
    }

    pub fn set_config(&mut self, config: SimConfig) {
        *self.sim.config_mut() = config;
    }

    /// Replace the configuration from RON text, keeping the old one on error
    pub fn load_config(&mut self, source: &str) -> Result<()> {
        match SimConfig::from_ron(source) {
            Ok(config) => {
                self.set_config(config);
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .notify(Notification::error("Invalid configuration", err.to_string()));
                Err(err)
            }
        }
    }

    // -- editing --

    /// Apply an edit to the world
    ///
    /// On success the history is rebased so later seeks replay the edited
    /// world. On failure the rejection is reported and nothing changes.
    pub fn edit<T>(
        &mut self,
        edit: impl FnOnce(&mut World) -> fieldsim_world::Result<T>,
    ) -> Result<T> {
        match edit(self.sim.world_mut()) {
            Ok(out) => {
                self.sim.rebase();
                self.after_change();
                Ok(out)
            }
            Err(err) => {
                warn!(%err, "edit rejected");
                self.notifier
                    .notify(Notification::error(edit_title(&err), err.to_string()));
                Err(err.into())
            }
        }
    }

    pub fn add_object(&mut self, kind: ObjectKind, init: ObjectInit) -> Result<Identifier> {
        self.edit(|w| w.add_object(kind, init))
    }

    pub fn remove_object(&mut self, id: &Identifier) -> Result<()> {
        self.edit(|w| w.remove_object(id).map(drop))
    }

    pub fn add_variable(&mut self, var: Variable) -> Result<Identifier> {
        self.edit(|w| w.add_variable(var))
    }

    pub fn update_variable(&mut self, id: &Identifier, quantity: Quantity) -> Result<()> {
        self.edit(|w| w.update_variable(id, quantity))
    }

    pub fn update_expression(&mut self, id: &Identifier, source: &str) -> Result<()> {
        self.edit(|w| w.update_expression(id, source))
    }

    pub fn write_literal(&mut self, id: &Identifier, value: Value) -> Result<bool> {
        self.edit(|w| w.write_literal(id, value))
    }

    pub fn remove_variable(&mut self, id: &Identifier) -> Result<()> {
        self.edit(|w| w.remove_variable(id).map(drop))
    }

    pub fn add_force_field(
        &mut self,
        ff: ForceField,
        owner: Option<&Identifier>,
    ) -> Result<Identifier> {
        self.edit(|w| w.add_force_field(ff, owner))
    }

    pub fn add_template_field(
        &mut self,
        template: TemplateKind,
        owner: Option<&Identifier>,
    ) -> Result<Identifier> {
        self.edit(|w| w.add_template_field(template, owner))
    }

    pub fn update_force_field(
        &mut self,
        id: &Identifier,
        condition: &str,
        expression: &str,
    ) -> Result<()> {
        self.edit(|w| w.update_force_field(id, condition, expression))
    }

    pub fn set_template(&mut self, id: &Identifier, template: TemplateKind) -> Result<()> {
        self.edit(|w| w.set_template(id, template))
    }

    pub fn remove_force_field(&mut self, id: &Identifier) -> Result<()> {
        self.edit(|w| w.remove_force_field(id).map(drop))
    }

    /// Watch `expression`, optionally in the scope of object `target`
    pub fn add_probe(
        &mut self,
        id: impl Into<String>,
        expression: &str,
        target: Option<Identifier>,
    ) -> Result<()> {
        let result = self.monitor.add_probe(id, expression, target);
        if let Err(err) = &result {
            self.notifier
                .notify(Notification::error("Invalid probe", err.to_string()));
        }
        result
    }

    pub fn remove_probe(&mut self, id: &str) -> bool {
        self.monitor.remove_probe(id).is_some()
    }

    // -- running --

    pub fn play(&mut self) {
        self.playback.play();
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn toggle_playback(&mut self) {
        self.playback.toggle();
    }

    /// Advance playback by one wall-clock frame
    pub fn frame(&mut self, frame_seconds: f64) -> Result<FrameResult> {
        match self.playback.advance(&mut self.sim, frame_seconds) {
            Ok(result) => {
                if result.steps > 0 {
                    self.after_change();
                }
                Ok(result)
            }
            Err(err) => Err(self.halt(err)),
        }
    }

    /// Take a single step
    pub fn step(&mut self) -> Result<()> {
        match self.sim.step() {
            Ok(()) => {
                self.after_change();
                Ok(())
            }
            Err(err) => Err(self.halt(err)),
        }
    }

    /// Jump to `target` using the snapshot history
    pub fn seek(&mut self, target: f64) -> Result<()> {
        match self.sim.simulate_to(target) {
            Ok(()) => {
                self.after_change();
                Ok(())
            }
            Err(err) => Err(self.halt(err)),
        }
    }

    /// Return to the snapshot taken at exactly `time`
    pub fn restore(&mut self, time: f64) -> Result<()> {
        match self.sim.restore_backup(time) {
            Ok(()) => {
                self.after_change();
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .notify(Notification::error("Restore failed", err.to_string()));
                Err(err)
            }
        }
    }

    // -- persistence --

    pub fn save_json(&self) -> Result<String> {
        Ok(self.sim.world().to_json_string()?)
    }

    /// Replace the world with a JSON document and start over from time 0
    pub fn load_json(&mut self, json: &str) -> Result<()> {
        match World::from_json_str(json) {
            Ok(world) => {
                self.playback.pause();
                self.sim.reset(world);
                info!(objects = self.sim.world().objects().count(), "world loaded");
                self.notifier.notify(Notification::info(
                    "World loaded",
                    format!("{} objects", self.sim.world().objects().count()),
                ));
                self.after_change();
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .notify(Notification::error("Load failed", err.to_string()));
                Err(err.into())
            }
        }
    }

    fn halt(&mut self, err: Error) -> Error {
        self.playback.pause();
        self.notifier.notify(Notification::error(
            "Simulation halted",
            format!("at t = {}: {err}", self.sim.time()),
        ));
        err
    }

    fn after_change(&mut self) {
        self.monitor.sample(&self.sim, &mut self.samples);
        let frame = RenderFrame::capture(self.sim.world(), self.sim.clock());
        self.renderer.render(&frame);
    }
}

fn edit_title(err: &fieldsim_world::Error) -> &'static str {
    use fieldsim_world::Error as E;
    match err {
        E::CircularDependency { .. } => "Circular dependency",
        E::Core(core) if core.is_syntax_error() => "Syntax error",
        E::Core(core) if core.is_evaluation_error() => "Evaluation error",
        E::VariableNotFound(_) | E::ObjectNotFound(_) | E::ForceFieldNotFound(_) => "Not found",
        _ => "Edit rejected",
    }
}
