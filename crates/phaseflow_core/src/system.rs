//! Dynamical-system wrappers: a coupled planar system (X′, Y′) and a
//! parametrized scalar system, both built from compiled formula text.

use crate::equation::CompiledEquation;
use crate::traits::VectorField;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// One sample of a 1-variable trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample1 {
    pub t: f64,
    pub x: f64,
}

/// Two coupled equations `X' = f(X, Y)`, `Y' = g(X, Y)`.
///
/// The system is valid only when both sides compiled; an invalid system
/// evaluates to `(NaN, NaN)` everywhere and never panics.
#[derive(Debug, Clone)]
pub struct PlanarSystem {
    x_prime: CompiledEquation,
    y_prime: CompiledEquation,
}

impl PlanarSystem {
    pub fn new(x_prime_text: &str, y_prime_text: &str) -> Self {
        Self {
            x_prime: CompiledEquation::with_variables(x_prime_text, &["X", "Y"]),
            y_prime: CompiledEquation::with_variables(y_prime_text, &["X", "Y"]),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x_prime.is_valid() && self.y_prime.is_valid()
    }

    /// Combined error text, each failing side prefixed with which equation
    /// it came from. Empty when the system is valid.
    pub fn error_message(&self) -> String {
        let mut parts = Vec::new();
        if !self.x_prime.is_valid() {
            parts.push(format!("X': {}", self.x_prime.error_message()));
        }
        if !self.y_prime.is_valid() {
            parts.push(format!("Y': {}", self.y_prime.error_message()));
        }
        parts.join("; ")
    }

    pub fn x_prime(&self) -> &CompiledEquation {
        &self.x_prime
    }

    pub fn y_prime(&self) -> &CompiledEquation {
        &self.y_prime
    }

    /// The derivative vector at `(x, y)`; `(NaN, NaN)` when invalid.
    pub fn evaluate_field(&self, x: f64, y: f64) -> (f64, f64) {
        let point = [x, y];
        (self.x_prime.evaluate(&point), self.y_prime.evaluate(&point))
    }

    /// One classic RK4 step of size `dt`.
    ///
    /// The stages are coupled: both equations see the same intermediate
    /// state at each stage, so `k2` for X and Y is evaluated at the
    /// identical midpoint. If any of the eight stage values goes
    /// non-finite the step reports `(NaN, NaN)` and no partial state
    /// escapes.
    pub fn rk4_step(&self, x: f64, y: f64, dt: f64) -> (f64, f64) {
        let (k1x, k1y) = self.evaluate_field(x, y);
        let (k2x, k2y) = self.evaluate_field(x + 0.5 * dt * k1x, y + 0.5 * dt * k1y);
        let (k3x, k3y) = self.evaluate_field(x + 0.5 * dt * k2x, y + 0.5 * dt * k2y);
        let (k4x, k4y) = self.evaluate_field(x + dt * k3x, y + dt * k3y);

        let stages = [k1x, k1y, k2x, k2y, k3x, k3y, k4x, k4y];
        if !stages.iter().all(|k| k.is_finite()) {
            return (f64::NAN, f64::NAN);
        }

        let next_x = x + dt / 6.0 * (k1x + 2.0 * k2x + 2.0 * k3x + k4x);
        let next_y = y + dt / 6.0 * (k1y + 2.0 * k2y + 2.0 * k3y + k4y);
        if next_x.is_finite() && next_y.is_finite() {
            (next_x, next_y)
        } else {
            (f64::NAN, f64::NAN)
        }
    }

    /// Builds a new system from new formula text; `self` stays as-is.
    pub fn update_equations(&self, x_prime_text: &str, y_prime_text: &str) -> PlanarSystem {
        PlanarSystem::new(x_prime_text, y_prime_text)
    }
}

impl VectorField<f64> for PlanarSystem {
    fn dimension(&self) -> usize {
        2
    }

    // Autonomous: t is ignored.
    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let (vx, vy) = self.evaluate_field(x[0], x[1]);
        out[0] = vx;
        out[1] = vy;
    }
}

/// One equation `X' = f(X; params)` with parameter values supplied per
/// call — the system itself is a pure function of `(state, params, dt)`.
#[derive(Debug, Clone)]
pub struct ScalarSystem {
    equation: CompiledEquation,
}

impl ScalarSystem {
    pub fn new(x_prime_text: &str, parameter_names: &[&str]) -> Self {
        Self {
            equation: CompiledEquation::parametrized(x_prime_text, parameter_names),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.equation.is_valid()
    }

    pub fn error_message(&self) -> String {
        self.equation.error_message()
    }

    pub fn equation(&self) -> &CompiledEquation {
        &self.equation
    }

    pub fn parameters(&self) -> &[String] {
        self.equation.parameters()
    }

    pub fn derivative(&self, x: f64, params: &[f64]) -> f64 {
        self.equation.evaluate_with(&[x], params)
    }

    /// First-order step, kept for speed/comparison against RK4.
    pub fn euler_step(&self, x: f64, params: &[f64], dt: f64) -> f64 {
        let k = self.derivative(x, params);
        if !k.is_finite() {
            return f64::NAN;
        }
        let next = x + dt * k;
        if next.is_finite() {
            next
        } else {
            f64::NAN
        }
    }

    /// Scalar RK4 step with the same finiteness gate as the planar form.
    pub fn rk4_step(&self, x: f64, params: &[f64], dt: f64) -> f64 {
        let k1 = self.derivative(x, params);
        let k2 = self.derivative(x + 0.5 * dt * k1, params);
        let k3 = self.derivative(x + 0.5 * dt * k2, params);
        let k4 = self.derivative(x + dt * k3, params);

        if ![k1, k2, k3, k4].iter().all(|k| k.is_finite()) {
            return f64::NAN;
        }
        let next = x + dt / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
        if next.is_finite() {
            next
        } else {
            f64::NAN
        }
    }

    /// Integrates from `t = 0` to `t_max` with fixed step `dt`, collecting
    /// `{t, x}` samples. The first sample is always the initial condition.
    /// The loop stops early, keeping everything collected so far, the
    /// first time a step produces a non-finite value: a trajectory that
    /// blows up comes back shorter, not full of NaNs.
    pub fn time_series(&self, x0: f64, params: &[f64], t_max: f64, dt: f64) -> Result<Vec<Sample1>> {
        if !(dt > 0.0) || !dt.is_finite() {
            bail!("dt must be positive and finite, got {dt}");
        }
        if !(t_max >= 0.0) || !t_max.is_finite() {
            bail!("t_max must be non-negative and finite, got {t_max}");
        }
        if params.len() != self.parameters().len() {
            bail!(
                "expected {} parameter value(s), got {}",
                self.parameters().len(),
                params.len()
            );
        }

        let mut series = vec![Sample1 { t: 0.0, x: x0 }];
        let mut x = x0;
        let mut step = 0u64;
        loop {
            // Times come from the step counter so they stay strictly
            // increasing without accumulated drift.
            let t_next = (step + 1) as f64 * dt;
            if t_next > t_max * (1.0 + 1e-12) {
                break;
            }
            let next = self.rk4_step(x, params, dt);
            if !next.is_finite() {
                break;
            }
            x = next;
            series.push(Sample1 { t: t_next, x });
            step += 1;
        }
        Ok(series)
    }

    pub fn update_equation(&self, x_prime_text: &str) -> ScalarSystem {
        Self {
            equation: self.equation.recompile(x_prime_text),
        }
    }
}
