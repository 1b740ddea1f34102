use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Scalar type usable by the generic integrators. `f64` in practice; the
/// bound is kept open so the solver seam does not hard-code a float width.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A vector-valued derivative function: the right-hand side of an ODE system
/// `dy/dt = f(t, y)`.
///
/// Implementations must be pure with respect to `apply`: the same `(t, x)`
/// always produces the same output, and evaluation never panics. Domain
/// failures surface as NaN in `out`.
pub trait VectorField<T: Scalar> {
    /// Number of state components.
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`. `out` has length `dimension()`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A single-step integration scheme over a [`VectorField`].
pub trait Steppable<T: Scalar> {
    /// Advances `state` and `t` by one step of size `dt`.
    fn step(&mut self, field: &impl VectorField<T>, t: &mut T, state: &mut [T], dt: T);
}
