use crate::simulation::{update, Event, Rejected, SimulationState};
use geodesic_core::metric::christoffel_second;
use geodesic_core::{
    compile, geodesic_system, solve_with, CompiledSystem, Coordinates, IntegratorSettings,
    Method, TwoForm,
};
use wasm_bindgen::prelude::*;

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn method_from_name(name: &str) -> Result<Method, JsValue> {
    match name {
        "euler" => Ok(Method::Euler),
        "rk4" => Ok(Method::Rk4),
        "tsit5" => Ok(Method::Tsit5),
        _ => Err(JsValue::from_str("Unknown solver")),
    }
}

fn parse_metric(sources: &[String], coords: &Coordinates) -> Result<TwoForm, JsValue> {
    let [g11, g12, g21, g22] = sources else {
        return Err(JsValue::from_str("Expected four metric components"));
    };
    TwoForm::parse([g11.as_str(), g12.as_str(), g21.as_str(), g22.as_str()], coords)
        .map_err(js_error)
}

/// A metric being edited in the UI, with its geodesic system compiled alongside.
#[wasm_bindgen]
pub struct WasmGeodesic {
    coords: Coordinates,
    metric: TwoForm,
    system: CompiledSystem,
}

#[wasm_bindgen]
impl WasmGeodesic {
    #[wasm_bindgen(constructor)]
    pub fn new(
        components: Vec<String>,
        first: String,
        second: String,
    ) -> Result<WasmGeodesic, JsValue> {
        console_error_panic_hook::set_once();
        let coords = Coordinates::new(first, second);
        let metric = parse_metric(&components, &coords)?;
        let system = compile(&geodesic_system(&metric, &coords).map_err(js_error)?);
        Ok(WasmGeodesic {
            coords,
            metric,
            system,
        })
    }

    /// Replaces one component (`0..4` in `g11, g12, g21, g22` order). Editing either
    /// off-diagonal entry updates both.
    pub fn set_component(&mut self, index: usize, text: &str) -> Result<(), JsValue> {
        let expr = self.coords.parse(text).map_err(js_error)?;
        let metric = match index {
            0 => TwoForm { g11: expr, ..self.metric.clone() },
            1 | 2 => self.metric.clone().with_off_diagonal(expr),
            3 => TwoForm { g22: expr, ..self.metric.clone() },
            _ => return Err(JsValue::from_str("Component index out of range")),
        };
        self.system = compile(&geodesic_system(&metric, &self.coords).map_err(js_error)?);
        self.metric = metric;
        Ok(())
    }

    pub fn metric_strings(&self) -> Vec<String> {
        [&self.metric.g11, &self.metric.g12, &self.metric.g21, &self.metric.g22]
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    /// `Γ^k_ij` for `k = 1, 2`, each family in `11, 12, 21, 22` order.
    pub fn christoffel_strings(&self) -> Vec<String> {
        christoffel_second(&self.metric, &self.coords)
            .iter()
            .flat_map(|family| family.iter().map(|(_, e)| e.to_string()).collect::<Vec<_>>())
            .collect()
    }

    pub fn state_names(&self) -> Vec<String> {
        self.system.names().to_vec()
    }

    /// Solves from `state` (in `state_names` order) and returns the serialized solution.
    pub fn solve(
        &self,
        t_start: f64,
        t_stop: f64,
        state: &[f64],
        step_size: f64,
        max_steps: usize,
        solver_name: &str,
    ) -> Result<JsValue, JsValue> {
        if state.len() != self.system.names().len() {
            return Err(JsValue::from_str("State length does not match the system"));
        }
        let settings = IntegratorSettings {
            method: method_from_name(solver_name)?,
            step_size,
            max_steps,
            ..IntegratorSettings::default()
        };
        let initial = self.system.environment(state);
        let solution =
            solve_with(t_start, t_stop, &initial, &self.system, &settings).map_err(js_error)?;
        serde_wasm_bindgen::to_value(&solution).map_err(js_error)
    }
}

/// Front-end handle around [`SimulationState`].
#[wasm_bindgen]
pub struct WasmSimulation {
    state: Option<SimulationState>,
}

impl WasmSimulation {
    fn apply(&mut self, event: Event) -> Result<(), JsValue> {
        // `update` hands the state back on rejection, so it is only absent mid-call.
        let state = self
            .state
            .take()
            .ok_or_else(|| JsValue::from_str("Simulation state is unavailable"))?;
        match update(event, state) {
            Ok(state) => {
                self.state = Some(state);
                Ok(())
            }
            Err(Rejected { state, error }) => {
                self.state = Some(state);
                Err(js_error(error))
            }
        }
    }

    fn current(&self) -> Result<&SimulationState, JsValue> {
        self.state
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Simulation state is unavailable"))
    }
}

#[wasm_bindgen]
impl WasmSimulation {
    #[wasm_bindgen(constructor)]
    pub fn new(
        components: Vec<String>,
        first: String,
        second: String,
        step_size: f64,
        segment_length: f64,
    ) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();
        let coords = Coordinates::new(first, second);
        let metric = parse_metric(&components, &coords)?;
        let settings = IntegratorSettings {
            step_size,
            ..IntegratorSettings::default()
        };
        let state =
            SimulationState::new(coords, metric, settings, segment_length).map_err(js_error)?;
        Ok(WasmSimulation { state: Some(state) })
    }

    pub fn set_metric(&mut self, components: Vec<String>) -> Result<(), JsValue> {
        let metric = parse_metric(&components, &self.current()?.coords)?;
        self.apply(Event::SetMetric(metric))
    }

    pub fn launch(&mut self, state: &[f64]) -> Result<(), JsValue> {
        let current = self.current()?;
        if state.len() != current.system().names().len() {
            return Err(JsValue::from_str("State length does not match the system"));
        }
        let start = current.system().environment(state);
        self.apply(Event::Launch { state: start })
    }

    pub fn advance(&mut self, dt: f64) -> Result<(), JsValue> {
        self.apply(Event::Advance { dt })
    }

    pub fn clock(&self) -> Result<f64, JsValue> {
        Ok(self.current()?.clock)
    }

    /// State vector at the clock, empty before the first launch.
    pub fn position(&self) -> Result<Vec<f64>, JsValue> {
        let current = self.current()?;
        Ok(match current.position() {
            Some(env) => current.system().state_vector(&env),
            None => Vec::new(),
        })
    }

    /// Flat `[t, state...]` rows covering `length` before the clock.
    pub fn trail(&self, length: f64) -> Result<Vec<f64>, JsValue> {
        let current = self.current()?;
        let system = current.system();
        Ok(current
            .trail(length)
            .into_iter()
            .flat_map(|(t, env)| std::iter::once(t).chain(system.state_vector(&env)))
            .collect())
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    fn polar() -> Vec<String> {
        ["1", "0", "0", "r^2"].iter().map(|s| s.to_string()).collect()
    }

    #[wasm_bindgen_test]
    fn off_diagonal_edits_stay_symmetric() {
        let mut geodesic = WasmGeodesic::new(polar(), "r".into(), "t".into()).unwrap();
        geodesic.set_component(2, "r").unwrap();
        let strings = geodesic.metric_strings();
        assert_eq!(strings[1], strings[2]);
        assert!(geodesic.set_component(0, "z").is_err());
        assert_eq!(geodesic.christoffel_strings().len(), 8);
    }

    #[wasm_bindgen_test]
    fn simulation_follows_clock() {
        assert!(WasmSimulation::new(polar(), "r".into(), "t".into(), 0.0, 0.5).is_err());
        let mut sim = WasmSimulation::new(polar(), "r".into(), "t".into(), 1e-2, 0.5).unwrap();
        assert!(sim.position().unwrap().is_empty());
        sim.launch(&[1.0, 0.0, 0.0, 1.0]).unwrap();
        sim.advance(0.75).unwrap();
        assert_eq!(sim.clock().unwrap(), 0.75);
        assert_eq!(sim.position().unwrap().len(), 4);
        assert!(sim.launch(&[1.0]).is_err());
        assert!(sim.advance(-1.0).is_err());
        assert_eq!(sim.clock().unwrap(), 0.75);
        sim.advance(0.25).unwrap();
        assert_eq!(sim.clock().unwrap(), 1.0);
    }
}
