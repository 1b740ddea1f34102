//! Bridge for the 2-variable phase-portrait tools.

use phaseflow_core::field::{find_equilibria, sample_field, FieldBounds};
use phaseflow_core::system::PlanarSystem;
use wasm_bindgen::prelude::*;

/// A coupled `X' = f(X, Y)`, `Y' = g(X, Y)` system plus the current
/// simulation state `(x, y, t)`.
///
/// Construction always succeeds: an invalid formula is carried as state,
/// `is_valid` goes false, `error` holds the message to display, and every
/// evaluation reports NaN. The canvas layer truncates its trajectory at the
/// last finite sample.
#[wasm_bindgen]
pub struct PhasePortrait {
    system: PlanarSystem,
    x: f64,
    y: f64,
    t: f64,
}

#[wasm_bindgen]
impl PhasePortrait {
    #[wasm_bindgen(constructor)]
    pub fn new(x_prime: &str, y_prime: &str) -> PhasePortrait {
        console_error_panic_hook::set_once();
        PhasePortrait {
            system: PlanarSystem::new(x_prime, y_prime),
            x: 0.0,
            y: 0.0,
            t: 0.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.system.is_valid()
    }

    pub fn error(&self) -> String {
        self.system.error_message()
    }

    /// Recompiles both equations. The previous system is replaced wholesale
    /// (compiled equations are immutable; "updating" means rebuilding).
    pub fn set_equations(&mut self, x_prime: &str, y_prime: &str) {
        self.system = self.system.update_equations(x_prime, y_prime);
    }

    pub fn set_state(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn set_t(&mut self, t: f64) {
        self.t = t;
    }

    /// The derivative vector at `(x, y)` as `[vx, vy]` (NaNs when the
    /// system is invalid).
    pub fn evaluate_field(&self, x: f64, y: f64) -> Vec<f64> {
        let (vx, vy) = self.system.evaluate_field(x, y);
        vec![vx, vy]
    }

    /// Advances one RK4 step. Returns false — leaving state and time
    /// untouched — when the step lands on a non-finite value, so a blown-up
    /// simulation freezes at its last good state instead of poisoning it.
    pub fn step(&mut self, dt: f64) -> bool {
        let (next_x, next_y) = self.system.rk4_step(self.x, self.y, dt);
        if next_x.is_finite() && next_y.is_finite() {
            self.x = next_x;
            self.y = next_y;
            self.t += dt;
            true
        } else {
            false
        }
    }

    /// Samples the normalized vector field over a rectangle; returns an
    /// array of `{x, y, dx, dy, ndx, ndy, magnitude}` objects.
    pub fn sample_field(
        &self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        grid_size: usize,
    ) -> Result<JsValue, JsValue> {
        let bounds = FieldBounds::new(x_min, x_max, y_min, y_max);
        let samples = sample_field(&self.system, bounds, grid_size)
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        serde_wasm_bindgen::to_value(&samples)
            .map_err(|err| JsValue::from_str(&format!("failed to serialize field: {err}")))
    }

    /// Scans for equilibria; returns an array of `{x, y, stability}`
    /// objects with stability one of "stable" | "unstable" | "saddle" |
    /// "unknown".
    pub fn find_equilibria(
        &self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        grid_size: usize,
        tolerance: f64,
    ) -> Result<JsValue, JsValue> {
        let bounds = FieldBounds::new(x_min, x_max, y_min, y_max);
        let points = find_equilibria(&self.system, bounds, grid_size, tolerance)
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        serde_wasm_bindgen::to_value(&points)
            .map_err(|err| JsValue::from_str(&format!("failed to serialize equilibria: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_formula_is_carried_not_thrown() {
        let portrait = PhasePortrait::new("Y +", "-X");
        assert!(!portrait.is_valid());
        assert!(portrait.error().starts_with("X':"));
        let field = portrait.evaluate_field(1.0, 0.0);
        assert!(field[0].is_nan() && field[1].is_nan());
    }

    #[test]
    fn step_advances_state_and_time() {
        let mut portrait = PhasePortrait::new("Y", "-X");
        portrait.set_state(1.0, 0.0);
        assert!(portrait.step(0.01));
        assert!((portrait.t() - 0.01).abs() < 1e-15);
        assert!(portrait.y() < 0.0);
    }

    #[test]
    fn failed_step_freezes_state() {
        let mut portrait = PhasePortrait::new("-sqrt(X)", "0");
        portrait.set_state(1.0e-9, 0.0);
        assert!(!portrait.step(1.0));
        assert_eq!(portrait.x(), 1.0e-9);
        assert_eq!(portrait.t(), 0.0);
    }

    #[test]
    fn returned_field_vector_is_a_copy() {
        let portrait = PhasePortrait::new("Y", "-X");
        let mut field = portrait.evaluate_field(1.0, 0.0);
        field[0] = 7.0;
        field[1] = 7.0;
        assert_eq!(portrait.evaluate_field(1.0, 0.0), vec![0.0, -1.0]);
    }

    #[test]
    fn set_equations_recompiles() {
        let mut portrait = PhasePortrait::new("Y +", "-X");
        assert!(!portrait.is_valid());
        portrait.set_equations("Y", "-X");
        assert!(portrait.is_valid());
        assert_eq!(portrait.error(), "");
        assert_eq!(portrait.evaluate_field(1.0, 0.0), vec![0.0, -1.0]);
    }
}
