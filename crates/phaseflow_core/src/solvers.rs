//! Generic RK4 integration over any [`VectorField`]: a buffer-reusing
//! single-step scheme, a fixed-step driver, and a step-doubling adaptive
//! driver with local-error control.

use crate::traits::{Scalar, Steppable, VectorField};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Absolute floor for the adaptive step size. At this size a step is
/// accepted regardless of its error estimate so integration always makes
/// progress.
pub const MIN_STEP: f64 = 1.0e-10;

/// Upper bound on accepted plus rejected adaptive iterations; a tolerance
/// that forces the floor everywhere would otherwise loop for ~1e10 steps.
const MAX_ADAPTIVE_ITERATIONS: usize = 1_000_000;

/// One `{t, state}` trajectory sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: f64,
    pub state: Vec<f64>,
}

/// An ordered, append-only integration result. Times are strictly
/// increasing and the first sample is always the initial condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    samples: Vec<Sample>,
}

impl Trajectory {
    fn push(&mut self, t: f64, state: &[f64]) {
        debug_assert!(self.samples.last().map_or(true, |s| t > s.t));
        self.samples.push(Sample {
            t,
            state: state.to_vec(),
        });
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

/// Result of an adaptive integration: the trajectory plus the local-error
/// estimate of every accepted step and how many proposals were rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveRun {
    pub trajectory: Trajectory,
    pub error_estimates: Vec<f64>,
    pub rejected_steps: usize,
}

/// Classic 4th-order Runge–Kutta, one step at a time. Stage buffers are
/// allocated once and reused across steps.
pub struct Rk4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    probe: Vec<T>,
}

impl<T: Scalar> Rk4<T> {
    pub fn new(dim: usize) -> Self {
        let zero = T::zero();
        Self {
            k1: vec![zero; dim],
            k2: vec![zero; dim],
            k3: vec![zero; dim],
            k4: vec![zero; dim],
            probe: vec![zero; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Rk4<T> {
    fn step(&mut self, field: &impl VectorField<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::from_f64(0.5).unwrap_or_else(T::zero);
        let two = T::from_f64(2.0).unwrap_or_else(T::zero);
        let sixth = T::from_f64(1.0 / 6.0).unwrap_or_else(T::zero);
        let t0 = *t;
        let half_dt = dt * half;

        field.apply(t0, state, &mut self.k1);

        for (i, probe) in self.probe.iter_mut().enumerate() {
            *probe = state[i] + half_dt * self.k1[i];
        }
        field.apply(t0 + half_dt, &self.probe, &mut self.k2);

        for (i, probe) in self.probe.iter_mut().enumerate() {
            *probe = state[i] + half_dt * self.k2[i];
        }
        field.apply(t0 + half_dt, &self.probe, &mut self.k3);

        for (i, probe) in self.probe.iter_mut().enumerate() {
            *probe = state[i] + dt * self.k3[i];
        }
        field.apply(t0 + dt, &self.probe, &mut self.k4);

        for (i, value) in state.iter_mut().enumerate() {
            *value = *value
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }
        *t = t0 + dt;
    }
}

/// Integrates `steps` fixed RK4 steps of size `h` from `(t0, y0)`.
///
/// The returned trajectory starts with the initial condition. If a step
/// produces a non-finite component the run stops there, keeping everything
/// already collected.
pub fn integrate_fixed(
    field: &impl VectorField<f64>,
    t0: f64,
    y0: &[f64],
    h: f64,
    steps: usize,
) -> Result<Trajectory> {
    if y0.len() != field.dimension() {
        bail!(
            "initial state has {} component(s), system expects {}",
            y0.len(),
            field.dimension()
        );
    }
    if !(h > 0.0) || !h.is_finite() {
        bail!("step size must be positive and finite, got {h}");
    }
    if steps == 0 {
        bail!("at least one integration step is required");
    }

    let mut trajectory = Trajectory::default();
    trajectory.push(t0, y0);

    let mut stepper = Rk4::new(y0.len());
    let mut t = t0;
    let mut state = y0.to_vec();
    for _ in 0..steps {
        stepper.step(field, &mut t, &mut state, h);
        if !state.iter().all(|v| v.is_finite()) {
            break;
        }
        trajectory.push(t, &state);
    }
    Ok(trajectory)
}

/// Adaptive RK4 by step doubling, from `t0` to `t_end`.
///
/// Each proposal compares one full step of size `h` against two half
/// steps over the same interval; the Euclidean norm of the difference is
/// the local error estimate. Within tolerance (or with `h` at the
/// [`MIN_STEP`] floor) the half-step result — the more accurate of the
/// two — is accepted. An estimate an order of magnitude under tolerance
/// grows `h` by 1.5×, capped at four times the original step; a failed
/// proposal halves `h` and retries without advancing time. The final step
/// is clipped so the run ends exactly at `t_end`.
pub fn integrate_adaptive(
    field: &impl VectorField<f64>,
    t0: f64,
    y0: &[f64],
    t_end: f64,
    h0: f64,
    tolerance: f64,
) -> Result<AdaptiveRun> {
    if y0.len() != field.dimension() {
        bail!(
            "initial state has {} component(s), system expects {}",
            y0.len(),
            field.dimension()
        );
    }
    if !(h0 > 0.0) || !h0.is_finite() {
        bail!("initial step size must be positive and finite, got {h0}");
    }
    if !(tolerance > 0.0) {
        bail!("tolerance must be positive, got {tolerance}");
    }
    if !(t_end > t0) {
        bail!("t_end ({t_end}) must be greater than t0 ({t0})");
    }

    let dim = y0.len();
    let h_max = 4.0 * h0;
    let mut stepper = Rk4::new(dim);

    let mut trajectory = Trajectory::default();
    trajectory.push(t0, y0);
    let mut error_estimates = Vec::new();
    let mut rejected_steps = 0usize;

    let mut t = t0;
    let mut state = y0.to_vec();
    let mut h = h0;
    let mut full = vec![0.0; dim];
    let mut half = vec![0.0; dim];

    for _ in 0..MAX_ADAPTIVE_ITERATIONS {
        if t >= t_end - MIN_STEP * 0.5 {
            return Ok(AdaptiveRun {
                trajectory,
                error_estimates,
                rejected_steps,
            });
        }
        // Clip the last step so we land on t_end exactly.
        if t + h > t_end {
            h = t_end - t;
        }

        // One full step.
        full.copy_from_slice(&state);
        let mut t_full = t;
        stepper.step(field, &mut t_full, &mut full, h);

        // Two half steps over the same interval.
        half.copy_from_slice(&state);
        let mut t_half = t;
        stepper.step(field, &mut t_half, &mut half, 0.5 * h);
        stepper.step(field, &mut t_half, &mut half, 0.5 * h);

        let finite = full.iter().chain(half.iter()).all(|v| v.is_finite());
        if !finite {
            // The field blew up inside this interval; shrink and retry,
            // or stop with what we have if the step cannot shrink.
            if h <= MIN_STEP {
                break;
            }
            h = (0.5 * h).max(MIN_STEP);
            rejected_steps += 1;
            continue;
        }

        let error: f64 = full
            .iter()
            .zip(half.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();

        if error <= tolerance || h <= MIN_STEP {
            t += h;
            state.copy_from_slice(&half);
            trajectory.push(t, &state);
            error_estimates.push(error);
            if error < 0.1 * tolerance {
                h = (1.5 * h).min(h_max);
            }
        } else {
            h = (0.5 * h).max(MIN_STEP);
            rejected_steps += 1;
        }
    }

    // Ran out of iterations or the field blew up: hand back the truncated
    // trajectory, same contract as the fixed-step driver.
    Ok(AdaptiveRun {
        trajectory,
        error_estimates,
        rejected_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// X' = Y, Y' = -X: solution from (1, 0) is (cos t, -sin t).
    struct Circle;

    impl VectorField<f64> for Circle {
        fn dimension(&self) -> usize {
            2
        }
        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    /// X' = X^2 from x0 = 1: finite-time blowup at t = 1.
    struct Blowup;

    impl VectorField<f64> for Blowup {
        fn dimension(&self) -> usize {
            1
        }
        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[0] * x[0];
        }
    }

    fn endpoint_error(h: f64, steps: usize) -> f64 {
        let run = integrate_fixed(&Circle, 0.0, &[1.0, 0.0], h, steps).unwrap();
        let last = run.last().unwrap();
        let exact = (last.t.cos(), -last.t.sin());
        ((last.state[0] - exact.0).powi(2) + (last.state[1] - exact.1).powi(2)).sqrt()
    }

    #[test]
    fn fixed_run_starts_at_initial_condition() {
        let run = integrate_fixed(&Circle, 0.0, &[1.0, 0.0], 0.1, 10).unwrap();
        assert_eq!(run.len(), 11);
        assert_eq!(run.samples()[0].t, 0.0);
        assert_eq!(run.samples()[0].state, vec![1.0, 0.0]);
    }

    #[test]
    fn rk4_shows_fourth_order_convergence() {
        // Halving h should shrink the endpoint error by about 2^4 = 16.
        let coarse = endpoint_error(0.1, 63);
        let fine = endpoint_error(0.05, 126);
        let ratio = coarse / fine;
        assert!(
            (10.0..24.0).contains(&ratio),
            "expected ~16x error reduction, got {ratio}"
        );
    }

    #[test]
    fn fixed_run_matches_circle() {
        let run = integrate_fixed(&Circle, 0.0, &[1.0, 0.0], 0.01, 628).unwrap();
        let last = run.last().unwrap();
        assert_relative_eq!(last.state[0], last.t.cos(), epsilon = 1e-7);
        assert_relative_eq!(last.state[1], -last.t.sin(), epsilon = 1e-7);
    }

    #[test]
    fn fixed_run_validates_inputs() {
        assert!(integrate_fixed(&Circle, 0.0, &[1.0], 0.1, 10).is_err());
        assert!(integrate_fixed(&Circle, 0.0, &[1.0, 0.0], 0.0, 10).is_err());
        assert!(integrate_fixed(&Circle, 0.0, &[1.0, 0.0], -0.1, 10).is_err());
        assert!(integrate_fixed(&Circle, 0.0, &[1.0, 0.0], 0.1, 0).is_err());
    }

    #[test]
    fn fixed_run_truncates_on_blowup() {
        let run = integrate_fixed(&Blowup, 0.0, &[1.0], 0.01, 200).unwrap();
        assert!(run.len() < 201);
        assert!(run
            .samples()
            .iter()
            .all(|s| s.state.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn adaptive_respects_tolerance() {
        let tolerance = 1.0e-8;
        let run =
            integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 10.0, 0.5, tolerance).unwrap();
        assert!(!run.error_estimates.is_empty());
        for estimate in &run.error_estimates {
            assert!(*estimate <= tolerance, "estimate {estimate} over tolerance");
        }
    }

    #[test]
    fn adaptive_lands_exactly_on_t_end() {
        let run = integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 5.0, 0.3, 1.0e-7).unwrap();
        let last = run.trajectory.last().unwrap();
        assert!((last.t - 5.0).abs() < 1.0e-9, "ended at t = {}", last.t);
        assert_relative_eq!(last.state[0], 5.0f64.cos(), epsilon = 1e-5);
        assert_relative_eq!(last.state[1], -(5.0f64.sin()), epsilon = 1e-5);
    }

    #[test]
    fn adaptive_rejects_and_shrinks_on_rough_start() {
        // A deliberately huge initial step forces rejections before the
        // controller settles.
        let run = integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 2.0, 2.0, 1.0e-10).unwrap();
        assert!(run.rejected_steps > 0);
        for estimate in &run.error_estimates {
            assert!(*estimate <= 1.0e-10);
        }
    }

    #[test]
    fn adaptive_grows_step_under_easy_tolerance() {
        // With a slack tolerance the controller takes fewer steps than the
        // fixed-step baseline over the same interval.
        let run = integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 10.0, 0.05, 1.0e-3).unwrap();
        let fixed_equivalent = (10.0 / 0.05) as usize;
        assert!(run.trajectory.len() < fixed_equivalent);
    }

    #[test]
    fn adaptive_validates_inputs() {
        assert!(integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 0.0, 0.1, 1e-6).is_err());
        assert!(integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 1.0, -0.1, 1e-6).is_err());
        assert!(integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 1.0, 0.1, 0.0).is_err());
        assert!(integrate_adaptive(&Circle, 0.0, &[1.0], 1.0, 0.1, 1e-6).is_err());
    }

    #[test]
    fn trajectory_times_strictly_increase() {
        let run = integrate_adaptive(&Circle, 0.0, &[1.0, 0.0], 3.0, 0.2, 1.0e-6).unwrap();
        for pair in run.trajectory.samples().windows(2) {
            assert!(pair[1].t > pair[0].t);
        }
    }
}
