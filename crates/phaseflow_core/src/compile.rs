//! Lowering of a validated expression tree to stack-machine bytecode, and
//! the virtual machine that evaluates it.
//!
//! The VM is the hot path: it runs thousands of times per rendered frame,
//! so it operates on a caller-provided scratch stack and allocates nothing.
//! It also never panics — a malformed program (impossible for bytecode
//! produced from a checked tree, but guarded anyway) evaluates to NaN.

use crate::formula::{BinOp, Expr, FormulaError};
use crate::safe_math::{self, Func1, Func2};

/// Instructions for the stack machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Push a literal.
    Const(f64),
    /// Push a state variable by index in the declared order.
    Var(usize),
    /// Push a parameter by index in the declared order.
    Param(usize),
    /// Pop `b` then `a`, push `a + b`.
    Add,
    /// Pop `b` then `a`, push `a - b`.
    Sub,
    /// Pop `b` then `a`, push `a * b`.
    Mul,
    /// Pop `b` then `a`, push `a / b`.
    Div,
    /// Pop `b` then `a`, push `pow(a, b)`. The source operator `^` lowers
    /// to this.
    Pow,
    /// Pop `a`, push `-a`.
    Neg,
    /// Pop `a`, push `f(a)`.
    Call1(Func1),
    /// Pop `b` then `a`, push `f(a, b)`.
    Call2(Func2),
}

/// A compiled, immutable instruction sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }
}

/// Resolves identifiers against the declared variable and parameter lists
/// and flattens the tree into postfix [`Bytecode`].
pub struct Compiler<'a> {
    variables: &'a [String],
    parameters: &'a [String],
}

impl<'a> Compiler<'a> {
    pub fn new(variables: &'a [String], parameters: &'a [String]) -> Self {
        Self {
            variables,
            parameters,
        }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, FormulaError> {
        let mut ops = Vec::new();
        self.emit(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn emit(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), FormulaError> {
        match expr {
            Expr::Number(value) => ops.push(OpCode::Const(*value)),
            Expr::Ident(name) => {
                if let Some(idx) = self.variables.iter().position(|v| v == name) {
                    ops.push(OpCode::Var(idx));
                } else if let Some(idx) = self.parameters.iter().position(|p| p == name) {
                    ops.push(OpCode::Param(idx));
                } else if let Some(value) = safe_math::constant_value(name) {
                    ops.push(OpCode::Const(value));
                } else {
                    // The semantic pass rejects these before compilation;
                    // keep the error contract rather than panicking.
                    return Err(FormulaError::UnknownVariable(name.clone()));
                }
            }
            Expr::Neg(inner) => {
                self.emit(inner, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Binary(op, left, right) => {
                self.emit(left, ops)?;
                self.emit(right, ops)?;
                ops.push(match op {
                    BinOp::Add => OpCode::Add,
                    BinOp::Sub => OpCode::Sub,
                    BinOp::Mul => OpCode::Mul,
                    BinOp::Div => OpCode::Div,
                    BinOp::Pow => OpCode::Pow,
                });
            }
            Expr::Call(name, args) => {
                for arg in args {
                    self.emit(arg, ops)?;
                }
                if let Some(f) = Func1::from_name(name) {
                    ops.push(OpCode::Call1(f));
                } else if let Some(f) = Func2::from_name(name) {
                    ops.push(OpCode::Call2(f));
                } else {
                    return Err(FormulaError::UnknownFunction(name.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Stack machine. Stateless; the scratch stack lives with the caller so
/// repeated evaluation reuses one allocation.
pub struct Vm;

impl Vm {
    /// Evaluates bytecode. Any structural failure (stack underflow, index
    /// out of range) yields NaN, keeping the no-panic contract on the
    /// animation hot path.
    pub fn execute(code: &Bytecode, vars: &[f64], params: &[f64], stack: &mut Vec<f64>) -> f64 {
        Self::run(code, vars, params, stack).unwrap_or(f64::NAN)
    }

    /// Like [`Vm::execute`], but reports structural failures. Used by the
    /// post-compile smoke test to distinguish "NaN from a domain error"
    /// (acceptable) from "the program itself is broken" (compile failure).
    pub fn try_execute(
        code: &Bytecode,
        vars: &[f64],
        params: &[f64],
        stack: &mut Vec<f64>,
    ) -> Result<f64, FormulaError> {
        Self::run(code, vars, params, stack).ok_or_else(|| {
            FormulaError::EvaluationFailed("compiled program is structurally invalid".to_string())
        })
    }

    fn run(code: &Bytecode, vars: &[f64], params: &[f64], stack: &mut Vec<f64>) -> Option<f64> {
        stack.clear();

        for op in code.ops() {
            match op {
                OpCode::Const(value) => stack.push(*value),
                OpCode::Var(idx) => stack.push(*vars.get(*idx)?),
                OpCode::Param(idx) => stack.push(*params.get(*idx)?),
                OpCode::Neg => {
                    let a = stack.pop()?;
                    stack.push(-a);
                }
                OpCode::Call1(f) => {
                    let a = stack.pop()?;
                    stack.push(f.eval(a));
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    stack.push(match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    });
                }
                OpCode::Call2(f) => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    stack.push(f.eval(a, b));
                }
            }
        }

        let result = stack.pop()?;
        if stack.is_empty() {
            Some(result)
        } else {
            // Leftover operands mean the program did not consume its stack.
            None
        }
    }
}
