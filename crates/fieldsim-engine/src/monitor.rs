//! Live expression monitoring
//!
//! Probes are expressions compiled once. A session samples them after each
//! visible change, so playback yields one sample per frame at the frame's
//! final time, however many steps the frame took.
//!
//! A probe with a target object sees the same scope a force field sees for
//! that object; one without a target sees the world's variables plus `time`
//! and `dt`. A failing probe yields an error sample and never stops the run.

use fieldsim_core::{CompiledExpr, Identifier, Layered, Value};
use indexmap::IndexMap;
use tracing::debug;

use crate::{Error, Result, Simulation, StateHistory};

/// An expression watched over time
#[derive(Debug, Clone)]
pub struct Probe {
    expression: CompiledExpr,
    target: Option<Identifier>,
}

impl Probe {
    pub fn expression(&self) -> &CompiledExpr {
        &self.expression
    }

    pub fn target(&self) -> Option<&Identifier> {
        self.target.as_ref()
    }
}

/// One probe reading
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub id: String,
    pub value: Result<Value>,
}

/// Receiver of probe samples
pub trait MonitorSink {
    fn record(&mut self, sample: Sample);
}

impl MonitorSink for Vec<Sample> {
    fn record(&mut self, sample: Sample) {
        self.push(sample);
    }
}

/// Named probes, sampled in insertion order
#[derive(Debug, Clone, Default)]
pub struct LiveMonitor {
    probes: IndexMap<String, Probe>,
}

impl LiveMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace probe `id`
    ///
    /// Fails only if `expression` does not parse.
    pub fn add_probe(
        &mut self,
        id: impl Into<String>,
        expression: &str,
        target: Option<Identifier>,
    ) -> Result<()> {
        let expression = CompiledExpr::new(expression)?;
        self.probes.insert(id.into(), Probe { expression, target });
        Ok(())
    }

    pub fn remove_probe(&mut self, id: &str) -> Option<Probe> {
        self.probes.shift_remove(id)
    }

    pub fn probe(&self, id: &str) -> Option<&Probe> {
        self.probes.get(id)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Evaluate every probe at the simulation's current time
    pub fn sample<H: StateHistory>(&self, sim: &Simulation<H>, sink: &mut dyn MonitorSink) {
        if self.probes.is_empty() {
            return;
        }
        let clock = sim.clock();
        let world = sim.world();
        let vars = world.variable_values(clock);
        let runtime = clock.runtime();

        for (id, probe) in &self.probes {
            let value = match &probe.target {
                Some(target) => world
                    .object_scope(target, clock, Some(&vars))
                    .map_err(Error::from)
                    .and_then(|scope| probe.expression.evaluate(&scope).map_err(Error::from)),
                None => probe
                    .expression
                    .evaluate(&Layered::new(&vars, &runtime))
                    .map_err(Error::from),
            };
            if let Err(err) = &value {
                debug!(probe = %id, %err, "probe failed");
            }
            sink.record(Sample {
                time: clock.time,
                id: id.clone(),
                value,
            });
        }
    }
}
