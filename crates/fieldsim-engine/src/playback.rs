//! Real-time playback
//!
//! Converts wall-clock frame deltas into whole simulation steps with a
//! fixed-timestep accumulator. Simulated time per frame is
//! `min(delta, max_frame_seconds) * playback_speed`; leftover time smaller
//! than one step carries over to the next frame. Every `backup_frequency`
//! steps taken here the world is saved to the simulation's history, so later
//! seeks replay from a nearby snapshot.

use tracing::{error, warn};

use crate::{Result, Simulation, StateHistory};

/// Result of one playback frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameResult {
    /// Steps integrated during the frame
    pub steps: u32,
    /// Simulated seconds dropped because the step cap was reached
    pub discarded: f64,
    /// Simulation time after the frame
    pub time: f64,
}

/// Fixed-timestep playback controller
#[derive(Debug, Clone, Default)]
pub struct Playback {
    playing: bool,
    accumulator: f64,
    since_backup: u32,
}

impl Playback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Stop playback and drop any carried-over time
    pub fn pause(&mut self) {
        self.playing = false;
        self.accumulator = 0.0;
    }

    pub fn toggle(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Simulated time waiting to be stepped
    pub fn pending(&self) -> f64 {
        self.accumulator
    }

    /// Advance `sim` by the steps owed for a frame of `frame_seconds`
    ///
    /// A failing step pauses playback and returns the error; steps already
    /// taken in the frame are kept.
    pub fn advance<H: StateHistory>(
        &mut self,
        sim: &mut Simulation<H>,
        frame_seconds: f64,
    ) -> Result<FrameResult> {
        let mut result = FrameResult {
            time: sim.time(),
            ..FrameResult::default()
        };
        if !self.playing {
            return Ok(result);
        }

        let config = sim.config();
        let dt = config.dt();
        let max_steps = config.max_steps_per_frame();
        let delta = if frame_seconds.is_finite() {
            frame_seconds.clamp(0.0, config.max_frame_seconds())
        } else {
            0.0
        };
        self.accumulator += delta * config.playback_speed();

        while self.accumulator >= dt {
            if result.steps == max_steps {
                result.discarded = self.accumulator - self.accumulator % dt;
                self.accumulator %= dt;
                warn!(
                    discarded = result.discarded,
                    steps = result.steps,
                    "playback fell behind, dropping time"
                );
                break;
            }
            if let Err(err) = sim.step() {
                error!(time = sim.time(), %err, "step failed, playback stopped");
                self.pause();
                return Err(err);
            }
            self.accumulator -= dt;
            result.steps += 1;

            self.since_backup += 1;
            if self.since_backup >= sim.config().backup_frequency() {
                sim.backup();
                self.since_backup = 0;
            }
        }

        result.time = sim.time();
        Ok(result)
    }
}
