//! Symbolic expression trees.
//!
//! An [`Expression`] is an owned, immutable tree. Text goes in through [`parse`] and comes back
//! out through `Display`; [`Expression::derivative`] and [`Expression::optimize`] build new trees
//! and never touch their input.

mod derivative;
mod optimize;
mod parse;

pub use parse::{parse, parse_restricted};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Variable bindings used for evaluation, keyed by name.
pub type Environment = HashMap<String, f64>;

/// Symbolic expression over named real variables.
///
/// There is no subtraction or division node: `a - b` is `a + (-1 * b)` and `1 / a` is `a ^ -1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Var(String),
    Const(f64),
    Mul(Box<Expression>, Box<Expression>),
    Add(Box<Expression>, Box<Expression>),
    /// `base ^ exponent` with a literal base.
    Exp { base: f64, exponent: Box<Expression> },
    /// `base ^ exponent` with a literal exponent.
    Pow { base: Box<Expression>, exponent: f64 },
    /// Logarithm of `arg` in a literal base.
    LogBase { base: f64, arg: Box<Expression> },
    Sin(Box<Expression>),
    Cos(Box<Expression>),
}

impl Expression {
    pub fn var(name: impl Into<String>) -> Self {
        Expression::Var(name.into())
    }

    pub fn constant(value: f64) -> Self {
        Expression::Const(value)
    }

    pub fn pow(self, exponent: f64) -> Self {
        Expression::Pow {
            base: Box::new(self),
            exponent,
        }
    }

    pub fn exp(base: f64, exponent: Expression) -> Self {
        Expression::Exp {
            base,
            exponent: Box::new(exponent),
        }
    }

    pub fn log(base: f64, arg: Expression) -> Self {
        Expression::LogBase {
            base,
            arg: Box::new(arg),
        }
    }

    /// Natural logarithm.
    pub fn ln(arg: Expression) -> Self {
        Expression::log(std::f64::consts::E, arg)
    }

    pub fn sin(arg: Expression) -> Self {
        Expression::Sin(Box::new(arg))
    }

    pub fn cos(arg: Expression) -> Self {
        Expression::Cos(Box::new(arg))
    }

    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expression::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Evaluates the tree, returning `None` when a referenced variable is unbound.
    pub fn evaluate(&self, env: &Environment) -> Option<f64> {
        Some(match self {
            Expression::Var(name) => *env.get(name)?,
            Expression::Const(c) => *c,
            Expression::Mul(a, b) => a.evaluate(env)? * b.evaluate(env)?,
            Expression::Add(a, b) => a.evaluate(env)? + b.evaluate(env)?,
            Expression::Exp { base, exponent } => base.powf(exponent.evaluate(env)?),
            Expression::Pow { base, exponent } => base.evaluate(env)?.powf(*exponent),
            Expression::LogBase { base, arg } => arg.evaluate(env)?.log(*base),
            Expression::Sin(a) => a.evaluate(env)?.sin(),
            Expression::Cos(a) => a.evaluate(env)?.cos(),
        })
    }

    /// Evaluates the tree against an environment the caller guarantees is complete.
    ///
    /// # Panics
    /// Panics, naming the variable, if `env` does not bind every free variable.
    pub fn evaluate_exn(&self, env: &Environment) -> f64 {
        match self.evaluate(env) {
            Some(value) => value,
            None => {
                let missing = self
                    .variables()
                    .into_iter()
                    .find(|name| !env.contains_key(name))
                    .unwrap_or_default();
                panic!("Missing variable '{missing}' while evaluating {self}");
            }
        }
    }

    /// Free variable names appearing in the tree.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expression::Var(name) => {
                names.insert(name.clone());
            }
            Expression::Const(_) => {}
            Expression::Mul(a, b) | Expression::Add(a, b) => {
                a.collect_variables(names);
                b.collect_variables(names);
            }
            Expression::Exp { exponent: a, .. }
            | Expression::Pow { base: a, .. }
            | Expression::LogBase { arg: a, .. }
            | Expression::Sin(a)
            | Expression::Cos(a) => a.collect_variables(names),
        }
    }
}

impl Add for Expression {
    type Output = Expression;
    fn add(self, rhs: Expression) -> Expression {
        Expression::Add(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expression {
    type Output = Expression;
    fn mul(self, rhs: Expression) -> Expression {
        Expression::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expression {
    type Output = Expression;
    fn neg(self) -> Expression {
        match self {
            Expression::Const(c) => Expression::Const(-c),
            other => Expression::Const(-1.0) * other,
        }
    }
}

impl Sub for Expression {
    type Output = Expression;
    fn sub(self, rhs: Expression) -> Expression {
        self + (-rhs)
    }
}

/// Literals render bare unless negative; negative literals are parenthesized so the output
/// re-parses under the `^` literal rules. Non-finite values print as `inf` and `NaN`, which
/// the parser reads back as constants.
struct Literal(f64);

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_sign_negative() && !self.0.is_nan() {
            write!(f, "(-{})", -self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Var(name) => write!(f, "{name}"),
            Expression::Const(c) => write!(f, "{}", Literal(*c)),
            Expression::Mul(a, b) => write!(f, "({a} * {b})"),
            Expression::Add(a, b) => write!(f, "({a} + {b})"),
            Expression::Exp { base, exponent } => write!(f, "({} ^ {exponent})", Literal(*base)),
            Expression::Pow { base, exponent } => write!(f, "({base} ^ {})", Literal(*exponent)),
            Expression::LogBase { base, arg } => write!(f, "log({}, {arg})", Literal(*base)),
            Expression::Sin(a) => write!(f, "sin({a})"),
            Expression::Cos(a) => write!(f, "cos({a})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, f64)]) -> Environment {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn evaluate_covers_every_node() {
        let x = Expression::var("x");
        let e = Expression::sin(x.clone()) * Expression::cos(x.clone())
            + Expression::exp(2.0, x.clone())
            + x.clone().pow(3.0)
            + Expression::log(10.0, x.clone())
            + Expression::constant(0.5);
        let value = e.evaluate(&env(&[("x", 2.0)])).expect("x is bound");
        let expected = 2.0_f64.sin() * 2.0_f64.cos() + 4.0 + 8.0 + 2.0_f64.log10() + 0.5;
        assert!((value - expected).abs() < 1e-12);
    }

    #[test]
    fn evaluate_returns_none_for_unbound_variable() {
        let e = Expression::var("x") + Expression::var("y");
        assert_eq!(e.evaluate(&env(&[("x", 1.0)])), None);
        assert_eq!(e.evaluate(&env(&[("x", 1.0), ("y", 2.0)])), Some(3.0));
    }

    #[test]
    fn evaluate_exn_matches_evaluate() {
        let e = Expression::var("x").pow(2.0) * Expression::constant(3.0);
        let bindings = env(&[("x", 1.5)]);
        assert_eq!(e.evaluate_exn(&bindings), e.evaluate(&bindings).unwrap());
    }

    #[test]
    #[should_panic(expected = "Missing variable 'y'")]
    fn evaluate_exn_panics_on_missing_variable() {
        let e = Expression::var("x") * Expression::var("y");
        e.evaluate_exn(&env(&[("x", 1.0)]));
    }

    #[test]
    fn variables_collects_each_name_once() {
        let e = Expression::var("x") * Expression::sin(Expression::var("y") + Expression::var("x"));
        let names: Vec<String> = e.variables().into_iter().collect();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
        assert!(Expression::constant(1.0).variables().is_empty());
    }

    #[test]
    fn display_is_fully_parenthesized() {
        let e = Expression::var("x") * (Expression::var("y") + Expression::constant(-2.0));
        assert_eq!(e.to_string(), "(x * (y + (-2)))");
        assert_eq!(Expression::var("x").pow(-1.0).to_string(), "(x ^ (-1))");
        assert_eq!(Expression::exp(2.0, Expression::var("y")).to_string(), "(2 ^ y)");
        assert_eq!(Expression::log(3.0, Expression::var("x")).to_string(), "log(3, x)");
    }

    #[test]
    fn neg_folds_literals_and_scales_otherwise() {
        assert_eq!(-Expression::constant(2.0), Expression::constant(-2.0));
        assert_eq!(
            -Expression::var("x"),
            Expression::constant(-1.0) * Expression::var("x")
        );
    }
}
