//! Grid sampling of a planar system: a normalized vector field for flow
//! visualization and a coarse equilibrium scan with linear-stability tags.

use crate::system::PlanarSystem;
use anyhow::{bail, Result};
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

/// Rectangular sampling domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl FieldBounds {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    fn validate(&self) -> Result<()> {
        let edges = [self.x_min, self.x_max, self.y_min, self.y_max];
        if !edges.iter().all(|v| v.is_finite()) {
            bail!("field bounds must be finite");
        }
        if self.x_max <= self.x_min || self.y_max <= self.y_min {
            bail!("field bounds must have max > min on both axes");
        }
        Ok(())
    }
}

/// One grid point of the sampled field: the raw derivative vector, its
/// unit-normalized direction, and its magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub ndx: f64,
    pub ndy: f64,
    pub magnitude: f64,
}

/// Linear-stability tag of an equilibrium, from the eigenvalues of the
/// local Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Unstable,
    Saddle,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumPoint {
    pub x: f64,
    pub y: f64,
    pub stability: Stability,
}

/// Samples the system on a `(grid_size + 1) × (grid_size + 1)` regular grid
/// in row-major order (y outer, x inner). Systems are treated as
/// autonomous. Each vector is normalized to unit length when its magnitude
/// is positive and finite, and to the zero vector otherwise (including the
/// all-NaN samples of an invalid system).
pub fn sample_field(
    system: &PlanarSystem,
    bounds: FieldBounds,
    grid_size: usize,
) -> Result<Vec<FieldSample>> {
    bounds.validate()?;
    if grid_size == 0 {
        bail!("grid_size must be at least 1");
    }

    let step_x = (bounds.x_max - bounds.x_min) / grid_size as f64;
    let step_y = (bounds.y_max - bounds.y_min) / grid_size as f64;
    let mut samples = Vec::with_capacity((grid_size + 1) * (grid_size + 1));

    for iy in 0..=grid_size {
        let y = bounds.y_min + step_y * iy as f64;
        for ix in 0..=grid_size {
            let x = bounds.x_min + step_x * ix as f64;
            let (dx, dy) = system.evaluate_field(x, y);
            let magnitude = (dx * dx + dy * dy).sqrt();
            let (ndx, ndy) = if magnitude.is_finite() && magnitude > 0.0 {
                (dx / magnitude, dy / magnitude)
            } else {
                (0.0, 0.0)
            };
            samples.push(FieldSample {
                x,
                y,
                dx,
                dy,
                ndx,
                ndy,
                magnitude,
            });
        }
    }
    Ok(samples)
}

/// Scans a regular grid for points where the field magnitude drops below
/// `tolerance`. Candidates within `10 × tolerance` Euclidean distance of an
/// already-accepted point are dropped; row-major scan order decides which
/// one wins. Each accepted point carries a [`Stability`] tag from the local
/// Jacobian.
pub fn find_equilibria(
    system: &PlanarSystem,
    bounds: FieldBounds,
    grid_size: usize,
    tolerance: f64,
) -> Result<Vec<EquilibriumPoint>> {
    bounds.validate()?;
    if grid_size == 0 {
        bail!("grid_size must be at least 1");
    }
    if !(tolerance > 0.0) || !tolerance.is_finite() {
        bail!("tolerance must be positive and finite, got {tolerance}");
    }

    let step_x = (bounds.x_max - bounds.x_min) / grid_size as f64;
    let step_y = (bounds.y_max - bounds.y_min) / grid_size as f64;
    let dedup_radius_sq = (10.0 * tolerance) * (10.0 * tolerance);
    let mut accepted: Vec<EquilibriumPoint> = Vec::new();

    for iy in 0..=grid_size {
        let y = bounds.y_min + step_y * iy as f64;
        for ix in 0..=grid_size {
            let x = bounds.x_min + step_x * ix as f64;
            let (dx, dy) = system.evaluate_field(x, y);
            let magnitude = (dx * dx + dy * dy).sqrt();
            if !magnitude.is_finite() || magnitude >= tolerance {
                continue;
            }
            let duplicate = accepted.iter().any(|p| {
                let (ex, ey) = (p.x - x, p.y - y);
                ex * ex + ey * ey < dedup_radius_sq
            });
            if duplicate {
                continue;
            }
            accepted.push(EquilibriumPoint {
                x,
                y,
                stability: classify(system, x, y),
            });
        }
    }
    Ok(accepted)
}

/// Classifies an equilibrium from the eigenvalues of a central-difference
/// Jacobian of the field. Both real parts negative is a sink, both
/// positive a source, real eigenvalues of opposite sign a saddle.
/// Degenerate cases (non-finite Jacobian, a real part too close to zero
/// to call, as for a center) stay `Unknown`.
pub fn classify(system: &PlanarSystem, x: f64, y: f64) -> Stability {
    let h = 1.0e-5 * (1.0 + x.abs().max(y.abs()));

    let (fx_e, fy_e) = system.evaluate_field(x + h, y);
    let (fx_w, fy_w) = system.evaluate_field(x - h, y);
    let (fx_n, fy_n) = system.evaluate_field(x, y + h);
    let (fx_s, fy_s) = system.evaluate_field(x, y - h);

    let j = Matrix2::new(
        (fx_e - fx_w) / (2.0 * h),
        (fx_n - fx_s) / (2.0 * h),
        (fy_e - fy_w) / (2.0 * h),
        (fy_n - fy_s) / (2.0 * h),
    );
    if !j.iter().all(|v| v.is_finite()) {
        return Stability::Unknown;
    }

    let eigenvalues = j.complex_eigenvalues();
    let (re_a, re_b) = (eigenvalues[0].re, eigenvalues[1].re);
    // Anything this close to the imaginary axis is not worth calling.
    let threshold = 1.0e-6 * (1.0 + j.norm());

    if re_a < -threshold && re_b < -threshold {
        Stability::Stable
    } else if re_a > threshold && re_b > threshold {
        Stability::Unstable
    } else if (re_a < -threshold && re_b > threshold) || (re_a > threshold && re_b < -threshold) {
        Stability::Saddle
    } else {
        Stability::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds() -> FieldBounds {
        FieldBounds::new(-1.0, 1.0, -1.0, 1.0)
    }

    #[test]
    fn grid_has_expected_shape() {
        let system = PlanarSystem::new("Y", "-X");
        let samples = sample_field(&system, unit_bounds(), 4).unwrap();
        assert_eq!(samples.len(), 25);
        // Row-major: first sample at the min corner, x varies fastest.
        assert_eq!((samples[0].x, samples[0].y), (-1.0, -1.0));
        assert_eq!((samples[1].x, samples[1].y), (-0.5, -1.0));
        assert_eq!((samples[5].x, samples[5].y), (-1.0, -0.5));
        let last = samples.last().unwrap();
        assert_eq!((last.x, last.y), (1.0, 1.0));
    }

    #[test]
    fn vectors_normalize_to_unit_length() {
        let system = PlanarSystem::new("2*Y", "-2*X");
        let samples = sample_field(&system, unit_bounds(), 4).unwrap();
        for sample in &samples {
            let norm = (sample.ndx * sample.ndx + sample.ndy * sample.ndy).sqrt();
            if sample.magnitude > 0.0 {
                assert!((norm - 1.0).abs() < 1e-12);
            } else {
                assert_eq!((sample.ndx, sample.ndy), (0.0, 0.0));
            }
        }
        // The origin sits on the grid and has zero magnitude.
        let origin = samples
            .iter()
            .find(|s| s.x == 0.0 && s.y == 0.0)
            .expect("origin should be a grid point");
        assert_eq!(origin.magnitude, 0.0);
        assert_eq!((origin.ndx, origin.ndy), (0.0, 0.0));
    }

    #[test]
    fn invalid_system_yields_nan_field_and_zero_directions() {
        let system = PlanarSystem::new("Y +", "-X");
        let samples = sample_field(&system, unit_bounds(), 2).unwrap();
        for sample in &samples {
            assert!(sample.dx.is_nan() && sample.dy.is_nan());
            assert!(sample.magnitude.is_nan());
            assert_eq!((sample.ndx, sample.ndy), (0.0, 0.0));
        }
        // And no spurious equilibria.
        let found = find_equilibria(&system, unit_bounds(), 8, 1e-3).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn stable_node_is_found_and_classified() {
        let system = PlanarSystem::new("-X", "-Y");
        let found = find_equilibria(&system, unit_bounds(), 16, 1e-6).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].x, 0.0);
        assert_eq!(found[0].y, 0.0);
        assert_eq!(found[0].stability, Stability::Stable);
    }

    #[test]
    fn source_and_saddle_classification() {
        let source = PlanarSystem::new("X", "Y");
        let found = find_equilibria(&source, unit_bounds(), 16, 1e-6).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].stability, Stability::Unstable);

        let saddle = PlanarSystem::new("X", "-Y");
        let found = find_equilibria(&saddle, unit_bounds(), 16, 1e-6).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].stability, Stability::Saddle);
    }

    #[test]
    fn center_stays_unknown() {
        // Harmonic oscillator: purely imaginary eigenvalues.
        let system = PlanarSystem::new("Y", "-X");
        assert_eq!(classify(&system, 0.0, 0.0), Stability::Unknown);
    }

    #[test]
    fn nearby_candidates_deduplicate_first_found_wins() {
        // X' = X^2, Y' = Y: every grid point on the line x = 0 close to
        // y = 0 has a tiny magnitude, but only the first (lowest y, by
        // row-major order) within the dedup radius is kept.
        let system = PlanarSystem::new("X*X", "Y");
        let bounds = FieldBounds::new(-1.0, 1.0, -1.0, 1.0);
        let tolerance = 0.05;
        let found = find_equilibria(&system, bounds, 100, tolerance).unwrap();
        assert!(!found.is_empty());
        for pair in found.windows(2) {
            let dx = pair[1].x - pair[0].x;
            let dy = pair[1].y - pair[0].y;
            assert!((dx * dx + dy * dy).sqrt() >= 10.0 * tolerance);
        }
    }

    #[test]
    fn sampler_validates_inputs() {
        let system = PlanarSystem::new("Y", "-X");
        let inverted = FieldBounds::new(1.0, -1.0, -1.0, 1.0);
        assert!(sample_field(&system, inverted, 4).is_err());
        assert!(sample_field(&system, unit_bounds(), 0).is_err());
        assert!(find_equilibria(&system, unit_bounds(), 8, 0.0).is_err());
        assert!(find_equilibria(&system, unit_bounds(), 0, 1e-3).is_err());
    }
}
