//! Bridge for the 1-variable parametrized simulation tools (dose curves,
//! decay models, and similar single-state consumers).

use phaseflow_core::system::ScalarSystem;
use wasm_bindgen::prelude::*;

/// A parametrized `X' = f(X; params)` system. Parameter values live on the
/// bridge (the sliders write them here); the underlying system itself is a
/// pure function of `(state, params, dt)`.
#[wasm_bindgen]
pub struct ParamSimulation {
    system: ScalarSystem,
    values: Vec<f64>,
}

#[wasm_bindgen]
impl ParamSimulation {
    #[wasm_bindgen(constructor)]
    pub fn new(x_prime: &str, parameter_names: Vec<String>) -> ParamSimulation {
        console_error_panic_hook::set_once();
        let names: Vec<&str> = parameter_names.iter().map(String::as_str).collect();
        let system = ScalarSystem::new(x_prime, &names);
        let values = vec![0.0; parameter_names.len()];
        ParamSimulation { system, values }
    }

    pub fn is_valid(&self) -> bool {
        self.system.is_valid()
    }

    pub fn error(&self) -> String {
        self.system.error_message()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.system.parameters().to_vec()
    }

    /// Sets one parameter by name; false when the name was not declared.
    pub fn set_param(&mut self, name: &str, value: f64) -> bool {
        match self.system.parameters().iter().position(|p| p == name) {
            Some(idx) => {
                self.values[idx] = value;
                true
            }
            None => false,
        }
    }

    /// Replaces the formula, keeping declarations and parameter values.
    pub fn set_equation(&mut self, x_prime: &str) {
        self.system = self.system.update_equation(x_prime);
    }

    pub fn derivative(&self, x: f64) -> f64 {
        self.system.derivative(x, &self.values)
    }

    pub fn euler_step(&self, x: f64, dt: f64) -> f64 {
        self.system.euler_step(x, &self.values, dt)
    }

    pub fn rk4_step(&self, x: f64, dt: f64) -> f64 {
        self.system.rk4_step(x, &self.values, dt)
    }

    /// Integrates from `x0` to `t_max` with step `dt`; returns an array of
    /// `{t, x}` objects, truncated at the last finite sample.
    pub fn time_series(&self, x0: f64, t_max: f64, dt: f64) -> Result<JsValue, JsValue> {
        let series = self
            .system
            .time_series(x0, &self.values, t_max, dt)
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        serde_wasm_bindgen::to_value(&series)
            .map_err(|err| JsValue::from_str(&format!("failed to serialize series: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_route_by_name() {
        let mut sim = ParamSimulation::new("-k * X + c", vec!["k".into(), "c".into()]);
        assert!(sim.is_valid(), "{}", sim.error());
        assert!(sim.set_param("k", 2.0));
        assert!(sim.set_param("c", 1.0));
        assert!(!sim.set_param("missing", 5.0));
        assert_eq!(sim.derivative(3.0), -5.0);
    }

    #[test]
    fn undeclared_parameter_reports_error() {
        let sim = ParamSimulation::new("-k * X", Vec::new());
        assert!(!sim.is_valid());
        assert!(sim.error().contains("undeclared parameter"));
        assert!(sim.derivative(1.0).is_nan());
    }

    #[test]
    fn set_equation_keeps_parameter_values() {
        let mut sim = ParamSimulation::new("-k * X", vec!["k".into()]);
        sim.set_param("k", 3.0);
        sim.set_equation("k * X");
        assert!(sim.is_valid());
        assert_eq!(sim.derivative(1.0), 3.0);
    }
}
