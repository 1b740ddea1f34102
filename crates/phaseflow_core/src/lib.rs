//! `phaseflow_core` is the numeric engine behind the Phaseflow simulation
//! tools: it compiles user-typed formula text into safely-evaluable
//! equations and advances 1- and 2-variable dynamical systems with
//! 4th-order Runge–Kutta integration.
//!
//! Key components:
//! - **formula / compile**: tokenizer, structural validator,
//!   recursive-descent parser, and a small stack VM — formula errors come
//!   back as classified [`formula::FormulaError`] values, never panics.
//! - **equation / system**: the immutable [`equation::CompiledEquation`]
//!   artifact and the [`system::PlanarSystem`] / [`system::ScalarSystem`]
//!   wrappers. Runtime domain errors surface as NaN and poison downstream
//!   arithmetic; every evaluator boundary seals non-finite values to NaN.
//! - **solvers**: generic fixed-step and adaptive (step-doubling) RK4 over
//!   the [`traits::VectorField`] seam.
//! - **field**: grid sampling for flow visualization and the equilibrium
//!   scan with linear-stability tags.

pub mod compile;
pub mod equation;
pub mod field;
pub mod formula;
pub mod safe_math;
pub mod solvers;
pub mod system;
pub mod traits;
