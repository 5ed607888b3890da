//! Calculation expression parser
//!
//! Parses arithmetic over row labels into an [`Expression`] that can be used
//! as a calculation function.
//!
//! # Supported Syntax
//!
//! ```text
//! in * 8
//! (in + out) / 2
//! -delta
//! abs(in - out)
//! max(in, out, 0)
//! ```
//!
//! Labels start with a letter or underscore and may contain letters, digits,
//! `_`, `.` and `:`. Operators follow the usual precedence and associate left.
//! Parentheses and unary minus nest at most [`MAX_NESTING`] levels deep.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, one_of},
    combinator::{all_consuming, map, map_res, peek, recognize},
    multi::{many0, separated_list1},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::aggregation::CalculationFunction;

// ============================================================================
// AST
// ============================================================================

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

/// Built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Absolute value, one argument
    Abs,
    /// Smallest argument
    Min,
    /// Largest argument
    Max,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Reference to a row label
    Label(String),
    /// Unary minus
    Negate(Box<Expr>),
    /// Binary arithmetic
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Function call
    Call {
        /// Function
        function: Function,
        /// Arguments
        args: Vec<Expr>,
    },
}

/// Expression tree with labels resolved to argument positions
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Input(usize),
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

impl Node {
    fn evaluate(&self, args: &[f64]) -> f64 {
        match self {
            Node::Number(v) => *v,
            Node::Input(index) => args.get(*index).copied().unwrap_or(f64::NAN),
            Node::Negate(inner) => -inner.evaluate(args),
            Node::Binary(op, left, right) => {
                let (l, r) = (left.evaluate(args), right.evaluate(args));
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Subtract => l - r,
                    BinaryOp::Multiply => l * r,
                    BinaryOp::Divide => l / r,
                }
            }
            Node::Call(function, call_args) => {
                let mut values = call_args.iter().map(|arg| arg.evaluate(args));
                match function {
                    Function::Abs => values.next().map(f64::abs).unwrap_or(f64::NAN),
                    // NaN propagates: an unknown input makes the result unknown
                    Function::Min => values.fold(f64::INFINITY, |acc, v| {
                        if acc.is_nan() || v.is_nan() {
                            f64::NAN
                        } else {
                            acc.min(v)
                        }
                    }),
                    Function::Max => values.fold(f64::NEG_INFINITY, |acc, v| {
                        if acc.is_nan() || v.is_nan() {
                            f64::NAN
                        } else {
                            acc.max(v)
                        }
                    }),
                }
            }
        }
    }
}

/// A compiled calculation expression
///
/// [`Expression::labels`] lists the referenced labels in first-use order;
/// evaluation takes their values in that same order.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    labels: Vec<String>,
    root: Node,
}

impl Expression {
    /// Parse and compile `input`
    pub fn parse(input: &str) -> Result<Self, String> {
        let expr = parse_expression(input)?;
        let mut labels = Vec::new();
        let root = bind(&expr, &mut labels);
        Ok(Self {
            source: input.trim().to_string(),
            labels,
            root,
        })
    }

    /// Labels the expression reads, in argument order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Expression text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with label values given in [`Self::labels`] order
    pub fn evaluate(&self, args: &[f64]) -> f64 {
        self.root.evaluate(args)
    }
}

impl CalculationFunction for Expression {
    fn apply(&self, args: &[f64]) -> f64 {
        self.evaluate(args)
    }
}

fn bind(expr: &Expr, labels: &mut Vec<String>) -> Node {
    match expr {
        Expr::Number(v) => Node::Number(*v),
        Expr::Label(name) => {
            let index = match labels.iter().position(|l| l == name) {
                Some(index) => index,
                None => {
                    labels.push(name.clone());
                    labels.len() - 1
                }
            };
            Node::Input(index)
        }
        Expr::Negate(inner) => Node::Negate(Box::new(bind(inner, labels))),
        Expr::Binary { op, left, right } => Node::Binary(
            *op,
            Box::new(bind(left, labels)),
            Box::new(bind(right, labels)),
        ),
        Expr::Call { function, args } => Node::Call(
            *function,
            args.iter().map(|arg| bind(arg, labels)).collect(),
        ),
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Deepest allowed nesting of parentheses and unary minus
pub const MAX_NESTING: usize = 64;

/// Parse an expression into its syntax tree
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    if input.trim().is_empty() {
        return Err("empty expression".to_string());
    }
    if nesting_depth(input) > MAX_NESTING {
        return Err(format!("expression nested deeper than {} levels", MAX_NESTING));
    }

    match all_consuming(ws(expr))(input) {
        Ok((_, expr)) => {
            check_arity(&expr)?;
            Ok(expr)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(format!("unexpected input at '{}'", e.input))
        }
        Err(nom::Err::Incomplete(_)) => Err("incomplete expression".to_string()),
    }
}

/// Open parentheses plus pending minus signs at the deepest point of `input`
fn nesting_depth(input: &str) -> usize {
    let mut parens = 0usize;
    let mut minus_run = 0usize;
    let mut deepest = 0;
    for c in input.chars() {
        match c {
            '(' => parens += 1,
            ')' => parens = parens.saturating_sub(1),
            '-' => minus_run += 1,
            c if c.is_whitespace() => {}
            _ => minus_run = 0,
        }
        if c == '(' || c == ')' {
            minus_run = 0;
        }
        deepest = deepest.max(parens + minus_run);
    }
    deepest
}

fn check_arity(expr: &Expr) -> Result<(), String> {
    match expr {
        Expr::Number(_) | Expr::Label(_) => Ok(()),
        Expr::Negate(inner) => check_arity(inner),
        Expr::Binary { left, right, .. } => {
            check_arity(left)?;
            check_arity(right)
        }
        Expr::Call { function, args } => {
            if *function == Function::Abs && args.len() != 1 {
                return Err(format!("abs() takes one argument, got {}", args.len()));
            }
            args.iter().try_for_each(check_arity)
        }
    }
}

/// Wrap a parser with optional surrounding whitespace
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// expr = term (("+" | "-") term)*
fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(map(one_of("+-"), |c| {
            if c == '+' {
                BinaryOp::Add
            } else {
                BinaryOp::Subtract
            }
        })),
        term,
    ))(input)?;

    Ok((input, fold_binary(first, rest)))
}

/// term = factor (("*" | "/") factor)*
fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(pair(
        ws(map(one_of("*/"), |c| {
            if c == '*' {
                BinaryOp::Multiply
            } else {
                BinaryOp::Divide
            }
        })),
        factor,
    ))(input)?;

    Ok((input, fold_binary(first, rest)))
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// factor = "-" factor | atom
fn factor(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), factor), |inner| {
            Expr::Negate(Box::new(inner))
        }),
        atom,
    ))(input)
}

/// atom = number | call | label | "(" expr ")"
fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        call,
        map(identifier, |name: &str| Expr::Label(name.to_string())),
        delimited(char('('), expr, char(')')),
    )))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    // Literals are unsigned; a leading minus is handled as negation
    preceded(
        peek(one_of("0123456789.")),
        map_res(recognize_float, |s: &str| s.parse::<f64>().map(Expr::Number)),
    )(input)
}

fn call(input: &str) -> IResult<&str, Expr> {
    let (input, function) = alt((
        map(tag("abs"), |_| Function::Abs),
        map(tag("min"), |_| Function::Min),
        map(tag("max"), |_| Function::Max),
    ))(input)?;
    let (input, args) = delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), expr),
        char(')'),
    )(input)?;

    Ok((input, Expr::Call { function, args }))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ':'),
    ))(input)
}
