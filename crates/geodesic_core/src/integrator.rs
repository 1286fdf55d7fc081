use crate::equation_engine::CompiledSystem;
use crate::expression::Environment;
use crate::solution::{Solution, SolveStatus};
use crate::solvers::Method;
use crate::traits::Steppable;
use anyhow::{bail, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: Method,
    pub step_size: f64,
    /// Safety bound on the number of steps; exhausting it truncates the solution.
    pub max_steps: usize,
    /// Record every n-th step. The final state is always recorded.
    pub sample_stride: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: Method::Rk4,
            step_size: 1e-3,
            max_steps: 1_000_000,
            sample_stride: 1,
        }
    }
}

impl IntegratorSettings {
    /// Checks the settings on their own, independent of any interval.
    pub fn validate(&self) -> Result<()> {
        let dt = self.step_size;
        if !dt.is_finite() || dt <= 0.0 {
            bail!("Step size must be positive and finite, got {dt}.");
        }
        if self.max_steps == 0 {
            bail!("max_steps must be greater than zero.");
        }
        if self.sample_stride == 0 {
            bail!("sample_stride must be at least 1.");
        }
        Ok(())
    }
}

/// Distance from `x` to the next representable value away from zero.
fn ulp(x: f64) -> f64 {
    let x = x.abs();
    f64::from_bits(x.to_bits() + 1) - x
}

/// Integrates `system` from `initial` over `[t_start, t_stop]` with RK4, recording every step.
///
/// See [`solve_with`].
pub fn solve(
    t_start: f64,
    t_stop: f64,
    initial: &Environment,
    system: &CompiledSystem,
    step_size: f64,
    max_steps: usize,
) -> Result<Solution> {
    let settings = IntegratorSettings {
        step_size,
        max_steps,
        ..IntegratorSettings::default()
    };
    solve_with(t_start, t_stop, initial, system, &settings)
}

/// Fixed-step integration over `[t_start, t_stop]`.
///
/// Steps land on `t_start + k * step_size`; the last step is shortened so the final sample sits
/// exactly at `t_stop`. If `max_steps` steps are taken first, the returned solution ends early
/// with [`SolveStatus::BudgetExhausted`].
///
/// # Panics
/// Panics if `initial` lacks one of the system's state variables.
pub fn solve_with(
    t_start: f64,
    t_stop: f64,
    initial: &Environment,
    system: &CompiledSystem,
    settings: &IntegratorSettings,
) -> Result<Solution> {
    let dt = settings.step_size;
    if system.names().is_empty() {
        bail!("System has zero dimension.");
    }
    if !t_start.is_finite() || !t_stop.is_finite() {
        bail!("Integration bounds must be finite, got [{t_start}, {t_stop}].");
    }
    if t_stop < t_start {
        bail!("t_stop ({t_stop}) must not precede t_start ({t_start}).");
    }
    settings.validate()?;
    // Grid points closer than two ulps can round onto each other.
    let spacing = ulp(t_start.abs().max(t_stop.abs()));
    if dt < 2.0 * spacing {
        bail!("Step size {dt} is too small to advance near t = {t_stop}.");
    }

    let mut state = system.state_vector(initial);
    let mut stepper = settings.method.stepper::<f64>(state.len());
    let mut solution = Solution::start(system.names().to_vec(), t_start, &state);

    debug!(
        "Integrating [{t_start}, {t_stop}] with {:?}, dt = {dt}, budget {} steps",
        settings.method, settings.max_steps
    );

    let mut t = t_start;
    let mut steps = 0usize;
    while t < t_stop {
        if steps == settings.max_steps {
            solution.status = SolveStatus::BudgetExhausted;
            break;
        }

        // Advance from the grid point rather than accumulating dt to avoid drift.
        let nominal = t_start + (steps + 1) as f64 * dt;
        let last = nominal >= t_stop || t_stop - t <= dt;
        let next = if last { t_stop } else { nominal };
        if next <= t {
            bail!("Step size {dt} is too small to advance from t = {t}.");
        }

        let mut t_step = t;
        stepper.step(system, &mut t_step, &mut state, next - t);
        t = next;
        steps += 1;

        if last || steps % settings.sample_stride == 0 {
            solution.push(t, &state);
        }
    }

    if t > solution.t_stop() {
        solution.push(t, &state);
    }
    solution.steps = steps;

    match solution.status {
        SolveStatus::Complete => debug!("Integration complete after {steps} steps"),
        SolveStatus::BudgetExhausted => warn!(
            "Step budget of {} exhausted at t = {t} before reaching t = {t_stop}",
            settings.max_steps
        ),
    }

    Ok(solution)
}
