//! Formula front end: tokenizer, structural validation, recursive-descent
//! parser, and the naming-convention pass.
//!
//! The formula language is a small numeric DSL: `+ - * / ^`, parentheses,
//! a closed function set ([`crate::safe_math`]), the constants `pi` and `e`,
//! uppercase state variables, and (in the parametrized form) lowercase
//! parameters. Every reject carries a distinct [`FormulaError`] variant so
//! callers and tests can tell which rule fired.

use crate::safe_math::{self, Func1, Func2};
use thiserror::Error;

/// One variant per validation rule. The `Display` strings are user-facing:
/// the UI layer shows them verbatim next to the formula input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,
    #[error("invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("invalid number \"{0}\"")]
    InvalidNumber(String),
    #[error("mismatched parentheses")]
    UnbalancedParens,
    #[error("empty parentheses \"()\"")]
    EmptyParens,
    #[error("doubled operator \"{0}{0}\"")]
    DoubledOperator(char),
    #[error("expression cannot start with '{0}'")]
    LeadingOperator(char),
    #[error("expression cannot end with '{0}'")]
    TrailingOperator(char),
    #[error("operator '{1}' cannot follow '{0}'")]
    AdjacentOperators(char, char),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unknown function \"{0}\"")]
    UnknownFunction(String),
    #[error("function \"{name}\" takes {expected} argument(s), got {got}")]
    FunctionArity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("function \"{0}\" must be called with parentheses")]
    BareFunction(String),
    #[error("unknown variable \"{0}\"")]
    UnknownVariable(String),
    #[error("use uppercase variables: \"{0}\" is not a function, constant, or declared name")]
    LowercaseVariable(String),
    #[error("undeclared parameter \"{0}\"")]
    UndeclaredParameter(String),
    #[error("invalid variable name \"{0}\": state variables are uppercase letters")]
    InvalidVariableName(String),
    #[error("invalid parameter name \"{0}\": parameters are lowercase and must not shadow a function or constant")]
    InvalidParameterName(String),
    #[error("formula failed its evaluation check: {0}")]
    EvaluationFailed(String),
}

/// Which naming convention the identifier pass enforces.
///
/// * `StateVariables` — the 2-variable form: uppercase identifiers must be
///   declared state variables; any other lowercase identifier that is not a
///   function or constant is a "use uppercase" error.
/// * `Parametrized` — the 1-variable form: the sole state variable is `X`;
///   lowercase identifiers must be declared parameters or constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    StateVariables,
    Parametrized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl Token {
    /// The operator character, for the five infix operators only.
    fn operator_char(&self) -> Option<char> {
        match self {
            Token::Plus => Some('+'),
            Token::Minus => Some('-'),
            Token::Star => Some('*'),
            Token::Slash => Some('/'),
            Token::Caret => Some('^'),
            _ => None,
        }
    }
}

/// Binary operators in the expression tree. `^` survives parsing as `Pow`
/// and is lowered to an explicit power operation by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Expression tree produced by the parser. Identifiers are still names at
/// this stage; the semantic pass classifies them and the compiler resolves
/// them to indices or literals.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Runs the whole front end: tokenize, structural scan, parse, identifier
/// pass. Returns the expression tree ready for compilation.
pub fn analyze(
    text: &str,
    convention: Convention,
    variables: &[String],
    parameters: &[String],
) -> Result<Expr, FormulaError> {
    let tokens = tokenize(text)?;
    structural_check(&tokens)?;
    let expr = parse(&tokens)?;
    check_identifiers(&expr, convention, variables, parameters)?;
    Ok(expr)
}

pub fn tokenize(text: &str) -> Result<Vec<Token>, FormulaError> {
    if text.trim().is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut lexeme = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    lexeme.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = lexeme
                .parse::<f64>()
                .map_err(|_| FormulaError::InvalidNumber(lexeme.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_ascii_alphabetic() {
            let mut name = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_alphanumeric() {
                    name.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(name));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                other => return Err(FormulaError::InvalidCharacter(other)),
            };
            tokens.push(token);
            chars.next();
        }
    }

    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    Ok(tokens)
}

/// Token-level structural rules, checked before parsing so each reject has
/// a precise classification rather than a generic parse error.
pub fn structural_check(tokens: &[Token]) -> Result<(), FormulaError> {
    let first = tokens.first().ok_or(FormulaError::Empty)?;
    if let Some(op) = first.operator_char() {
        // A leading unary minus is the only operator allowed to open the
        // expression.
        if op != '-' {
            return Err(FormulaError::LeadingOperator(op));
        }
    }
    if let Some(op) = tokens.last().and_then(Token::operator_char) {
        return Err(FormulaError::TrailingOperator(op));
    }

    let mut depth: i32 = 0;
    for pair in tokens.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if *a == Token::LParen && *b == Token::RParen {
            return Err(FormulaError::EmptyParens);
        }
        if let (Some(x), Some(y)) = (a.operator_char(), b.operator_char()) {
            if x == y {
                return Err(FormulaError::DoubledOperator(x));
            }
            // Unary minus may follow `+ - * /`; every other operator pair
            // is malformed.
            if !(y == '-' && matches!(x, '+' | '-' | '*' | '/')) {
                return Err(FormulaError::AdjacentOperators(x, y));
            }
        }
    }

    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(FormulaError::UnbalancedParens);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(FormulaError::UnbalancedParens);
    }
    Ok(())
}

/// Recursive-descent parse with precedence `^` (tightest), unary minus,
/// `* /`, `+ -`.
pub fn parse(tokens: &[Token]) -> Result<Expr, FormulaError> {
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if let Some(extra) = parser.peek() {
        return Err(FormulaError::Syntax(format!(
            "unexpected {} after expression",
            describe(extra)
        )));
    }
    Ok(expr)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {n}"),
        Token::Ident(name) => format!("\"{name}\""),
        Token::Comma => "','".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        other => match other.operator_char() {
            Some(op) => format!("'{op}'"),
            None => "token".to_string(),
        },
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.term()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.unary()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(Token::Minus) = self.peek() {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.primary()?;
        while let Some(Token::Caret) = self.peek() {
            self.advance();
            // `^` binds tighter than unary minus on its left; the right
            // operand may itself be negated.
            let right = self.unary()?;
            left = Expr::Binary(BinOp::Pow, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.advance();
                    let args = self.call_args(&name)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FormulaError::Syntax("expected ')'".to_string())),
                }
            }
            Some(other) => Err(FormulaError::Syntax(format!(
                "expected a value, found {}",
                describe(&other)
            ))),
            None => Err(FormulaError::Syntax(
                "expected a value at end of formula".to_string(),
            )),
        }
    }

    fn call_args(&mut self, name: &str) -> Result<Vec<Expr>, FormulaError> {
        let mut args = vec![self.expression()?];
        loop {
            match self.advance() {
                Some(Token::Comma) => args.push(self.expression()?),
                Some(Token::RParen) => return Ok(args),
                _ => {
                    return Err(FormulaError::Syntax(format!(
                        "expected ')' to close call to \"{name}\""
                    )))
                }
            }
        }
    }
}

/// Semantic pass: classify every identifier as a declared variable, a
/// constant, a declared parameter, or a mistake — with the error class
/// depending on the active [`Convention`].
pub fn check_identifiers(
    expr: &Expr,
    convention: Convention,
    variables: &[String],
    parameters: &[String],
) -> Result<(), FormulaError> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Neg(inner) => check_identifiers(inner, convention, variables, parameters),
        Expr::Binary(_, left, right) => {
            check_identifiers(left, convention, variables, parameters)?;
            check_identifiers(right, convention, variables, parameters)
        }
        Expr::Call(name, args) => {
            let expected = if Func1::from_name(name).is_some() {
                1
            } else if Func2::from_name(name).is_some() {
                2
            } else {
                return Err(FormulaError::UnknownFunction(name.clone()));
            };
            if args.len() != expected {
                return Err(FormulaError::FunctionArity {
                    name: name.clone(),
                    expected,
                    got: args.len(),
                });
            }
            for arg in args {
                check_identifiers(arg, convention, variables, parameters)?;
            }
            Ok(())
        }
        Expr::Ident(name) => classify_ident(name, convention, variables, parameters),
    }
}

fn classify_ident(
    name: &str,
    convention: Convention,
    variables: &[String],
    parameters: &[String],
) -> Result<(), FormulaError> {
    if variables.iter().any(|v| v == name) {
        return Ok(());
    }
    if safe_math::constant_value(name).is_some() {
        return Ok(());
    }
    if safe_math::is_function_name(name) {
        return Err(FormulaError::BareFunction(name.to_string()));
    }
    if name.chars().all(|c| !c.is_ascii_lowercase()) {
        // Uppercase identifier that is not a declared state variable.
        return Err(FormulaError::UnknownVariable(name.to_string()));
    }
    match convention {
        Convention::StateVariables => Err(FormulaError::LowercaseVariable(name.to_string())),
        Convention::Parametrized => {
            if parameters.iter().any(|p| p == name) {
                Ok(())
            } else {
                Err(FormulaError::UndeclaredParameter(name.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn analyze_xy(text: &str) -> Result<Expr, FormulaError> {
        analyze(text, Convention::StateVariables, &vars(&["X", "Y"]), &[])
    }

    fn analyze_param(text: &str, params: &[&str]) -> Result<Expr, FormulaError> {
        analyze(text, Convention::Parametrized, &vars(&["X"]), &vars(params))
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert_eq!(analyze_xy(""), Err(FormulaError::Empty));
        assert_eq!(analyze_xy("   \t "), Err(FormulaError::Empty));
    }

    #[test]
    fn rejects_invalid_characters() {
        assert_eq!(analyze_xy("X + #"), Err(FormulaError::InvalidCharacter('#')));
        assert_eq!(analyze_xy("X_1"), Err(FormulaError::InvalidCharacter('_')));
        assert_eq!(analyze_xy("X = Y"), Err(FormulaError::InvalidCharacter('=')));
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert_eq!(
            analyze_xy("1.2.3 + X"),
            Err(FormulaError::InvalidNumber("1.2.3".to_string()))
        );
    }

    #[test]
    fn rejects_unbalanced_parentheses() {
        assert_eq!(analyze_xy("(X + Y"), Err(FormulaError::UnbalancedParens));
        assert_eq!(analyze_xy("X + Y)"), Err(FormulaError::UnbalancedParens));
        assert_eq!(analyze_xy(")X("), Err(FormulaError::UnbalancedParens));
    }

    #[test]
    fn rejects_empty_parentheses() {
        assert_eq!(analyze_xy("X + ()"), Err(FormulaError::EmptyParens));
    }

    #[test]
    fn rejects_doubled_operators() {
        assert_eq!(analyze_xy("X ++ Y"), Err(FormulaError::DoubledOperator('+')));
        assert_eq!(analyze_xy("X -- Y"), Err(FormulaError::DoubledOperator('-')));
        assert_eq!(analyze_xy("X ** Y"), Err(FormulaError::DoubledOperator('*')));
        assert_eq!(analyze_xy("X // Y"), Err(FormulaError::DoubledOperator('/')));
        assert_eq!(analyze_xy("X ^^ Y"), Err(FormulaError::DoubledOperator('^')));
    }

    #[test]
    fn rejects_misplaced_operators() {
        assert_eq!(analyze_xy("* X"), Err(FormulaError::LeadingOperator('*')));
        assert_eq!(analyze_xy("+X"), Err(FormulaError::LeadingOperator('+')));
        assert_eq!(analyze_xy("X + "), Err(FormulaError::TrailingOperator('+')));
        assert_eq!(
            analyze_xy("X*/Y"),
            Err(FormulaError::AdjacentOperators('*', '/'))
        );
        assert_eq!(
            analyze_xy("X^-2"),
            Err(FormulaError::AdjacentOperators('^', '-'))
        );
    }

    #[test]
    fn allows_unary_minus() {
        assert!(analyze_xy("-X").is_ok());
        assert!(analyze_xy("X * -Y").is_ok());
        assert!(analyze_xy("X + -Y").is_ok());
        assert!(analyze_xy("(-X)").is_ok());
    }

    #[test]
    fn rejects_unknown_functions() {
        assert_eq!(
            analyze_xy("foo(X)"),
            Err(FormulaError::UnknownFunction("foo".to_string()))
        );
    }

    #[test]
    fn rejects_wrong_arity() {
        assert_eq!(
            analyze_xy("pow(X)"),
            Err(FormulaError::FunctionArity {
                name: "pow".to_string(),
                expected: 2,
                got: 1,
            })
        );
        assert_eq!(
            analyze_xy("sin(X, Y)"),
            Err(FormulaError::FunctionArity {
                name: "sin".to_string(),
                expected: 1,
                got: 2,
            })
        );
    }

    #[test]
    fn rejects_bare_function_names() {
        assert_eq!(
            analyze_xy("sin + X"),
            Err(FormulaError::BareFunction("sin".to_string()))
        );
    }

    #[test]
    fn enforces_uppercase_state_variables() {
        assert_eq!(
            analyze_xy("x + y"),
            Err(FormulaError::LowercaseVariable("x".to_string()))
        );
        assert_eq!(
            analyze_xy("X + z"),
            Err(FormulaError::LowercaseVariable("z".to_string()))
        );
        assert_eq!(
            analyze_xy("X + Z"),
            Err(FormulaError::UnknownVariable("Z".to_string()))
        );
    }

    #[test]
    fn parametrized_form_accepts_declared_parameters() {
        assert!(analyze_param("-k * X + b", &["k", "b"]).is_ok());
        assert_eq!(
            analyze_param("-k * X", &["b"]),
            Err(FormulaError::UndeclaredParameter("k".to_string()))
        );
        assert_eq!(
            analyze_param("X + Y", &["k"]),
            Err(FormulaError::UnknownVariable("Y".to_string()))
        );
    }

    #[test]
    fn constants_pass_in_any_case() {
        assert!(analyze_xy("pi * X").is_ok());
        assert!(analyze_xy("PI * X").is_ok());
        assert!(analyze_xy("e + E").is_ok());
        assert!(analyze_param("pi * X", &[]).is_ok());
    }

    #[test]
    fn precedence_power_then_unary_minus() {
        // -X^2 parses as -(X^2).
        let expr = analyze_xy("-X^2").unwrap();
        assert_eq!(
            expr,
            Expr::Neg(Box::new(Expr::Binary(
                BinOp::Pow,
                Box::new(Expr::Ident("X".to_string())),
                Box::new(Expr::Number(2.0)),
            )))
        );
    }

    #[test]
    fn precedence_power_over_product() {
        // 2*X^3 parses as 2*(X^3).
        let expr = analyze_xy("2*X^3").unwrap();
        match expr {
            Expr::Binary(BinOp::Mul, left, right) => {
                assert_eq!(*left, Expr::Number(2.0));
                assert!(matches!(*right, Expr::Binary(BinOp::Pow, _, _)));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(matches!(analyze_xy("X Y"), Err(FormulaError::Syntax(_))));
        assert!(matches!(analyze_xy("2 3"), Err(FormulaError::Syntax(_))));
        assert!(matches!(analyze_xy("X, Y"), Err(FormulaError::Syntax(_))));
    }
}
