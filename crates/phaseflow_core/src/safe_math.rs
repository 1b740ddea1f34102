//! The closed set of math functions and constants a formula may name.
//!
//! Domain-invalid calls (`sqrt` of a negative, `log` of a non-positive)
//! produce NaN through IEEE semantics rather than an error; NaN then poisons
//! the rest of the expression arithmetically. Callers that need a hard
//! boundary pass results through [`seal`].

/// Unary functions recognized by the formula language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func1 {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Exp,
    Log,
    Abs,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Log10,
    Floor,
    Ceil,
    Round,
    Sign,
}

/// Binary functions recognized by the formula language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func2 {
    Pow,
    Min,
    Max,
}

impl Func1 {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "abs" => Self::Abs,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "log10" => Self::Log10,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "sign" => Self::Sign,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Abs => "abs",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Log10 => "log10",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Sign => "sign",
        }
    }

    pub fn eval(self, a: f64) -> f64 {
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Sqrt => a.sqrt(),
            Self::Exp => a.exp(),
            Self::Log => a.ln(),
            Self::Abs => a.abs(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Sinh => a.sinh(),
            Self::Cosh => a.cosh(),
            Self::Tanh => a.tanh(),
            Self::Log10 => a.log10(),
            Self::Floor => a.floor(),
            Self::Ceil => a.ceil(),
            Self::Round => a.round(),
            // signum(NaN) is NaN, signum(±0) is ±1; we want sign(0) = 0.
            Self::Sign => {
                if a == 0.0 {
                    0.0
                } else {
                    a.signum()
                }
            }
        }
    }
}

impl Func2 {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "pow" => Self::Pow,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    pub fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Pow => a.powf(b),
            // f64::min/max ignore a single NaN operand; a NaN argument must
            // poison the result instead.
            Self::Min => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.min(b)
                }
            }
            Self::Max => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.max(b)
                }
            }
        }
    }
}

/// True when `name` is any recognized function name.
pub fn is_function_name(name: &str) -> bool {
    Func1::from_name(name).is_some() || Func2::from_name(name).is_some()
}

/// Resolves a constant name (`pi`, `e`, any letter case) to its value.
pub fn constant_value(name: &str) -> Option<f64> {
    if name.eq_ignore_ascii_case("pi") {
        Some(std::f64::consts::PI)
    } else if name.eq_ignore_ascii_case("e") {
        Some(std::f64::consts::E)
    } else {
        None
    }
}

/// Normalizes a result at an evaluator boundary: any non-finite value
/// (`inf`, `-inf`, NaN) becomes NaN, so callers only ever see a real number
/// or NaN.
pub fn seal(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::NAN
    }
}
