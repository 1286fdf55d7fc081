//! Simulation state for the front end, advanced by a pure reducer.
//!
//! The front end owns one [`SimulationState`] and feeds it [`Event`]s through [`update`]. A
//! trajectory is kept as two chained segments: `current` covers the clock, `next` is already
//! solved from `current`'s endpoint so advancing past a boundary never stalls on integration.

use anyhow::{bail, Result};
use geodesic_core::{
    compile, geodesic_system, solve_with, CompiledSystem, Coordinates, Environment,
    IntegratorSettings, Solution, TwoForm,
};
use log::{debug, warn};
use std::fmt;

/// Segments solved in one `Advance` before the trajectory jumps ahead to the clock.
const MAX_CATCH_UP: usize = 64;

pub enum Event {
    SetMetric(TwoForm),
    Launch { state: Environment },
    Advance { dt: f64 },
}

pub struct SimulationState {
    pub coords: Coordinates,
    pub metric: TwoForm,
    pub settings: IntegratorSettings,
    /// Parameter length of each solved segment.
    pub segment_length: f64,
    pub clock: f64,
    pub current: Option<Solution>,
    pub next: Option<Solution>,
    system: CompiledSystem,
}

/// An event [`update`] refused, together with the unchanged state it was given.
pub struct Rejected {
    pub state: SimulationState,
    pub error: anyhow::Error,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("clock", &self.state.clock)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl SimulationState {
    pub fn new(
        coords: Coordinates,
        metric: TwoForm,
        settings: IntegratorSettings,
        segment_length: f64,
    ) -> Result<Self> {
        if !segment_length.is_finite() || segment_length <= 0.0 {
            bail!("Segment length must be positive and finite, got {segment_length}.");
        }
        settings.validate()?;
        let system = compile(&geodesic_system(&metric, &coords)?);
        Ok(Self {
            coords,
            metric,
            settings,
            segment_length,
            clock: 0.0,
            current: None,
            next: None,
            system,
        })
    }

    pub fn system(&self) -> &CompiledSystem {
        &self.system
    }

    /// State on the trajectory at the current clock.
    pub fn position(&self) -> Option<Environment> {
        self.current.as_ref().map(|segment| segment.at(self.clock))
    }

    /// Samples of the current segment from `length` before the clock up to the clock.
    pub fn trail(&self, length: f64) -> Vec<(f64, Environment)> {
        match &self.current {
            Some(segment) => segment.segment(self.clock - length, self.clock),
            None => Vec::new(),
        }
    }

    /// Current and next segments starting at `t0` from `start`.
    fn solve_pair(
        &self,
        system: &CompiledSystem,
        t0: f64,
        start: &Environment,
    ) -> Result<(Solution, Solution)> {
        let current = solve_with(t0, t0 + self.segment_length, start, system, &self.settings)?;
        let next = current.continue_from(self.segment_length, system, &self.settings)?;
        Ok((current, next))
    }

    fn set_segments(&mut self, (current, next): (Solution, Solution)) {
        self.current = Some(current);
        self.next = Some(next);
    }

    fn set_metric(&mut self, metric: TwoForm) -> Result<()> {
        debug!("Metric changed at clock {}", self.clock);
        let system = compile(&geodesic_system(&metric, &self.coords)?);
        // The trajectory continues from where it is now under the new metric.
        let segments = match self.position() {
            Some(here) => Some(self.solve_pair(&system, self.clock, &here)?),
            None => None,
        };
        self.metric = metric;
        self.system = system;
        if let Some(segments) = segments {
            self.set_segments(segments);
        }
        Ok(())
    }

    fn launch(&mut self, start: &Environment) -> Result<()> {
        debug!("Launching geodesic at clock {}", self.clock);
        let segments = self.solve_pair(&self.system, self.clock, start)?;
        self.set_segments(segments);
        Ok(())
    }

    fn advance(&mut self, dt: f64) -> Result<()> {
        if !dt.is_finite() || dt < 0.0 {
            bail!("Advance step must be non-negative and finite, got {dt}.");
        }
        let clock = self.clock + dt;
        let (Some(current), Some(next)) = (&self.current, &self.next) else {
            self.clock = clock;
            return Ok(());
        };

        // Segments solved past `next`, in order. Nothing is committed until all succeed.
        let mut chain: Vec<Solution> = Vec::new();
        let mut covered = current.t_stop();
        let mut jump = None;
        while covered <= clock {
            let tail = chain.last().unwrap_or(next);
            if chain.len() == MAX_CATCH_UP {
                warn!(
                    "Clock {clock} ran {} past the solved trajectory; restarting from t = {}",
                    clock - tail.t_stop(),
                    tail.t_stop()
                );
                jump = Some(self.solve_pair(&self.system, clock, &tail.end_state())?);
                break;
            }
            covered = tail.t_stop();
            let following = tail.continue_from(self.segment_length, &self.system, &self.settings)?;
            chain.push(following);
        }

        self.clock = clock;
        if let Some(segments) = jump {
            self.set_segments(segments);
        } else if let Some(following) = chain.pop() {
            if let Some(promoted) = chain.pop().or_else(|| self.next.take()) {
                self.set_segments((promoted, following));
            }
        }
        Ok(())
    }
}

/// Applies one event. Either the whole event takes effect or the state comes back untouched
/// inside [`Rejected`].
pub fn update(event: Event, mut state: SimulationState) -> Result<SimulationState, Rejected> {
    let applied = match event {
        Event::SetMetric(metric) => state.set_metric(metric),
        Event::Launch { state: start } => state.launch(&start),
        Event::Advance { dt } => state.advance(dt),
    };
    match applied {
        Ok(()) => Ok(state),
        Err(error) => Err(Rejected { state, error }),
    }
}
