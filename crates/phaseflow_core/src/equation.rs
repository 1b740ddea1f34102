//! The compiled artifact a tool holds on to: formula text plus an
//! evaluator, or a stored error when the text did not survive validation.
//!
//! A `CompiledEquation` is immutable once constructed. "Updating" a formula
//! always means building a new instance via [`CompiledEquation::recompile`];
//! other code may hold references to the old one and expects its behavior
//! to stay fixed.

use crate::compile::{Bytecode, Compiler, Vm};
use crate::formula::{self, Convention, FormulaError};
use crate::safe_math;
use std::cell::RefCell;

/// Sample magnitudes for the post-compile smoke battery: origin, unit
/// points, π/e-based points, large points.
const SMOKE_VALUES: [f64; 7] = [
    0.0,
    1.0,
    -1.0,
    std::f64::consts::PI,
    std::f64::consts::E,
    1.0e6,
    -1.0e6,
];

#[derive(Debug, Clone)]
pub struct CompiledEquation {
    source: String,
    convention: Convention,
    variables: Vec<String>,
    parameters: Vec<String>,
    bytecode: Option<Bytecode>,
    error: Option<FormulaError>,
    // Scratch stack for the VM; interior mutability keeps `evaluate` taking
    // `&self` without allocating per call. Makes the type !Sync, which is
    // fine for the single-threaded animation loop it serves.
    stack: RefCell<Vec<f64>>,
}

impl CompiledEquation {
    /// Compiles `text` against declared uppercase state variables, e.g.
    /// `["X", "Y"]`. Construction never fails: an invalid formula produces
    /// an instance with `is_valid() == false` and every evaluation NaN.
    pub fn with_variables(text: &str, variables: &[&str]) -> Self {
        let variables: Vec<String> = variables.iter().map(|s| s.to_string()).collect();
        if let Some(bad) = variables.iter().find(|v| !is_variable_name(v)) {
            return Self::broken(
                text,
                Convention::StateVariables,
                variables.clone(),
                Vec::new(),
                FormulaError::InvalidVariableName(bad.clone()),
            );
        }
        Self::build(text, Convention::StateVariables, variables, Vec::new())
    }

    /// Compiles `text` in the 1-variable parametrized form: the state
    /// variable is `X` and every other identifier must be a declared
    /// lowercase parameter, a function, or a constant.
    pub fn parametrized(text: &str, parameters: &[&str]) -> Self {
        let variables = vec!["X".to_string()];
        let parameters: Vec<String> = parameters.iter().map(|s| s.to_string()).collect();
        if let Some(bad) = parameters.iter().find(|p| !is_parameter_name(p)) {
            return Self::broken(
                text,
                Convention::Parametrized,
                variables,
                parameters.clone(),
                FormulaError::InvalidParameterName(bad.clone()),
            );
        }
        Self::build(text, Convention::Parametrized, variables, parameters)
    }

    fn build(
        text: &str,
        convention: Convention,
        variables: Vec<String>,
        parameters: Vec<String>,
    ) -> Self {
        let compiled = formula::analyze(text, convention, &variables, &parameters)
            .and_then(|expr| Compiler::new(&variables, &parameters).compile(&expr))
            .and_then(|code| {
                smoke_test(&code, variables.len(), parameters.len())?;
                Ok(code)
            });

        let (bytecode, error) = match compiled {
            Ok(code) => (Some(code), None),
            Err(err) => (None, Some(err)),
        };

        Self {
            source: text.to_string(),
            convention,
            variables,
            parameters,
            bytecode,
            error,
            stack: RefCell::new(Vec::with_capacity(32)),
        }
    }

    fn broken(
        text: &str,
        convention: Convention,
        variables: Vec<String>,
        parameters: Vec<String>,
        error: FormulaError,
    ) -> Self {
        Self {
            source: text.to_string(),
            convention,
            variables,
            parameters,
            bytecode: None,
            error: Some(error),
            stack: RefCell::new(Vec::new()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.bytecode.is_some()
    }

    pub fn error(&self) -> Option<&FormulaError> {
        self.error.as_ref()
    }

    /// User-facing error text; empty when the equation is valid.
    pub fn error_message(&self) -> String {
        self.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Evaluates at `vars`, one value per declared state variable.
    /// Invalid equation, wrong argument count, or any non-finite result
    /// all yield NaN; this never panics.
    pub fn evaluate(&self, vars: &[f64]) -> f64 {
        self.evaluate_with(vars, &[])
    }

    /// Evaluates with parameter values in declared-name order.
    pub fn evaluate_with(&self, vars: &[f64], params: &[f64]) -> f64 {
        let Some(code) = &self.bytecode else {
            return f64::NAN;
        };
        if vars.len() != self.variables.len() || params.len() != self.parameters.len() {
            return f64::NAN;
        }
        let mut stack = self.stack.borrow_mut();
        safe_math::seal(Vm::execute(code, vars, params, &mut stack))
    }

    /// Produces a fresh equation from new formula text, keeping this
    /// instance's declarations. `self` is untouched.
    pub fn recompile(&self, text: &str) -> CompiledEquation {
        Self::build(
            text,
            self.convention,
            self.variables.clone(),
            self.parameters.clone(),
        )
    }
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        _ => return false,
    }
    name.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn is_parameter_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    let well_formed = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    // A parameter may not shadow a function or constant.
    well_formed && !safe_math::is_function_name(name) && safe_math::constant_value(name).is_none()
}

/// Evaluates the fresh bytecode at a fixed battery of points. NaN results
/// are fine (domain errors are a runtime condition); a structural
/// evaluation failure marks the compilation itself as failed.
fn smoke_test(code: &Bytecode, n_vars: usize, n_params: usize) -> Result<(), FormulaError> {
    let params = vec![1.0; n_params];
    let mut stack = Vec::with_capacity(32);
    for value in SMOKE_VALUES {
        let vars = vec![value; n_vars];
        Vm::try_execute(code, &vars, &params, &mut stack)?;
    }
    // One mixed-sign point so 2-variable formulas see asymmetric input.
    let mixed: Vec<f64> = (0..n_vars)
        .map(|i| if i % 2 == 0 { 2.5 } else { -2.5 })
        .collect();
    Vm::try_execute(code, &mixed, &params, &mut stack)?;
    Ok(())
}
