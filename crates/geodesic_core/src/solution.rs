use crate::equation_engine::CompiledSystem;
use crate::expression::Environment;
use crate::integrator::{solve_with, IntegratorSettings};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// How an integration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// The last sample sits exactly at the requested stop parameter.
    Complete,
    /// The step budget ran out first; the solution covers only part of the interval.
    BudgetExhausted,
}

/// Sampled trajectory from one integration run.
///
/// Parameters are strictly increasing. States are stored flat, one row of `names.len()` values
/// per parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    /// Integration steps taken, which may exceed the number of recorded samples.
    pub steps: usize,
    names: Vec<String>,
    parameters: Vec<f64>,
    states: Vec<f64>,
}

impl Solution {
    pub(crate) fn start(names: Vec<String>, t: f64, state: &[f64]) -> Self {
        Self {
            status: SolveStatus::Complete,
            steps: 0,
            names,
            parameters: vec![t],
            states: state.to_vec(),
        }
    }

    pub(crate) fn push(&mut self, t: f64, state: &[f64]) {
        debug_assert!(t > self.t_stop());
        self.parameters.push(t);
        self.states.extend_from_slice(state);
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.status == SolveStatus::Complete
    }

    pub fn t_start(&self) -> f64 {
        self.parameters[0]
    }

    /// Last recorded parameter. Equals the requested stop unless the budget ran out.
    pub fn t_stop(&self) -> f64 {
        self.parameters[self.parameters.len() - 1]
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn state(&self, index: usize) -> &[f64] {
        let dim = self.dimension();
        &self.states[index * dim..(index + 1) * dim]
    }

    /// Raw state vectors in parameter order.
    pub fn states(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.len()).map(move |i| self.state(i))
    }

    /// Recorded states as environments, in parameter order.
    pub fn values(&self) -> Vec<Environment> {
        self.states().map(|s| self.environment(s)).collect()
    }

    pub fn end_state(&self) -> Environment {
        self.environment(self.state(self.len() - 1))
    }

    /// State at `t`, linearly interpolated between the bracketing samples and clamped to the
    /// first/last sample outside the recorded range.
    pub fn state_at(&self, t: f64) -> Vec<f64> {
        let last = self.len() - 1;
        if t.is_nan() {
            return vec![f64::NAN; self.dimension()];
        }
        if t <= self.parameters[0] {
            return self.state(0).to_vec();
        }
        if t >= self.parameters[last] {
            return self.state(last).to_vec();
        }

        let hi = self.parameters.partition_point(|&p| p < t);
        if self.parameters[hi] == t {
            return self.state(hi).to_vec();
        }
        let lo = hi - 1;
        let (t0, t1) = (self.parameters[lo], self.parameters[hi]);
        let w = (t - t0) / (t1 - t0);
        self.state(lo)
            .iter()
            .zip(self.state(hi))
            .map(|(a, b)| a + w * (b - a))
            .collect()
    }

    pub fn at(&self, t: f64) -> Environment {
        self.environment(&self.state_at(t))
    }

    /// Samples inside `[from, to]` (clamped to the recorded range), with both window ends
    /// interpolated. Empty if the clamped window is reversed.
    pub fn segment(&self, from: f64, to: f64) -> Vec<(f64, Environment)> {
        let a = from.clamp(self.t_start(), self.t_stop());
        let b = to.clamp(self.t_start(), self.t_stop());
        if a.is_nan() || b.is_nan() || a > b {
            return Vec::new();
        }

        let mut out = vec![(a, self.at(a))];
        let first = self.parameters.partition_point(|&p| p <= a);
        for i in first..self.len() {
            let t = self.parameters[i];
            if t >= b {
                break;
            }
            out.push((t, self.environment(self.state(i))));
        }
        if b > a {
            out.push((b, self.at(b)));
        }
        out
    }

    /// Solves the segment following this one, starting from its last sample.
    pub fn continue_from(
        &self,
        duration: f64,
        system: &CompiledSystem,
        settings: &IntegratorSettings,
    ) -> Result<Solution> {
        let t0 = self.t_stop();
        solve_with(t0, t0 + duration, &self.end_state(), system, settings)
    }

    fn environment(&self, state: &[f64]) -> Environment {
        self.names.iter().cloned().zip(state.iter().copied()).collect()
    }
}
