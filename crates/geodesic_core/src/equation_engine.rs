use crate::expression::{Environment, Expression};
use crate::traits::{DynamicalSystem, Scalar};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

/// Symbolic first-order system: each state variable paired with the expression for its
/// derivative. Order of insertion is the state-vector order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    names: Vec<String>,
    equations: Vec<Expression>,
}

impl System {
    pub fn new(equations: Vec<(String, Expression)>) -> Result<Self> {
        let mut names = Vec::with_capacity(equations.len());
        let mut rhs = Vec::with_capacity(equations.len());
        for (name, expr) in equations {
            if names.contains(&name) {
                bail!("Duplicate state variable: {name}");
            }
            names.push(name);
            rhs.push(expr);
        }
        Ok(Self {
            names,
            equations: rhs,
        })
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&Expression> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.equations[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.equations.iter())
    }
}

/// OpCodes for the stack machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant.
    LoadConst(f64),
    /// Pushes the state component at the given index.
    LoadVar(usize),
    /// Pops (b, a), pushes a + b.
    Add,
    /// Pops (b, a), pushes a * b.
    Mul,
    /// Pops a, pushes base ^ a.
    Exp(f64),
    /// Pops a, pushes a ^ exponent.
    Pow(f64),
    /// Pops a, pushes log_base(a).
    Log(f64),
    Sin,
    Cos,
}

/// A compiled right-hand side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stateless evaluator for [`Bytecode`]; the caller owns the stack buffer.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, vars: &[T], stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(constant(val)),
                OpCode::LoadVar(idx) => stack.push(vars[idx]),
                OpCode::Add => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a + b);
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a * b);
                }
                OpCode::Exp(base) => {
                    let a = pop(stack);
                    stack.push(constant::<T>(base).powf(a));
                }
                OpCode::Pow(exponent) => {
                    let a = pop(stack);
                    stack.push(a.powf(constant(exponent)));
                }
                OpCode::Log(base) => {
                    let a = pop(stack);
                    stack.push(a.log(constant(base)));
                }
                OpCode::Sin => {
                    let a = pop(stack);
                    stack.push(a.sin());
                }
                OpCode::Cos => {
                    let a = pop(stack);
                    stack.push(a.cos());
                }
            }
        }

        pop(stack)
    }
}

fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

// Well-formed bytecode never underflows; the compiler emits operands before operators.
fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
    stack.pop().expect("bytecode stack underflow")
}

fn pop_pair<T: Scalar>(stack: &mut Vec<T>) -> (T, T) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

/// Lowers expressions to [`Bytecode`], resolving variable names to state indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map }
    }

    /// # Panics
    /// Panics if the expression references a name outside the state variables.
    pub fn compile(&self, expr: &Expression) -> Bytecode {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops);
        Bytecode { ops }
    }

    fn compile_recursive(&self, expr: &Expression, ops: &mut Vec<OpCode>) {
        match expr {
            Expression::Const(c) => ops.push(OpCode::LoadConst(*c)),
            Expression::Var(name) => match self.var_map.get(name) {
                Some(&idx) => ops.push(OpCode::LoadVar(idx)),
                None => panic!("Missing variable '{name}': not a state variable of the system"),
            },
            Expression::Add(a, b) => {
                self.compile_recursive(a, ops);
                self.compile_recursive(b, ops);
                ops.push(OpCode::Add);
            }
            Expression::Mul(a, b) => {
                self.compile_recursive(a, ops);
                self.compile_recursive(b, ops);
                ops.push(OpCode::Mul);
            }
            Expression::Exp { base, exponent } => {
                self.compile_recursive(exponent, ops);
                ops.push(OpCode::Exp(*base));
            }
            Expression::Pow { base, exponent } => {
                self.compile_recursive(base, ops);
                ops.push(OpCode::Pow(*exponent));
            }
            Expression::LogBase { base, arg } => {
                self.compile_recursive(arg, ops);
                ops.push(OpCode::Log(*base));
            }
            Expression::Sin(a) => {
                self.compile_recursive(a, ops);
                ops.push(OpCode::Sin);
            }
            Expression::Cos(a) => {
                self.compile_recursive(a, ops);
                ops.push(OpCode::Cos);
            }
        }
    }
}

/// Numerically evaluable form of a [`System`].
///
/// Holds one bytecode program per state variable, in state-vector order.
pub struct CompiledSystem {
    names: Vec<String>,
    pub equations: Vec<Bytecode>,
    // Interior mutability for the VM stack to avoid allocation in apply.
    // This makes the system !Sync, which is fine for the single-threaded integrator.
    stack: RefCell<Vec<f64>>,
}

/// Compiles every right-hand side of `system` against its own state variables.
///
/// # Panics
/// Panics if a right-hand side references a variable that is not a state variable; a geodesic
/// system built from a complete coordinate/velocity basis never does.
pub fn compile(system: &System) -> CompiledSystem {
    let compiler = Compiler::new(system.names());
    let equations = system.iter().map(|(_, rhs)| compiler.compile(rhs)).collect();
    CompiledSystem {
        names: system.names().to_vec(),
        equations,
        stack: RefCell::new(Vec::with_capacity(64)),
    }
}

impl CompiledSystem {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Derivative of every state variable at the given state.
    ///
    /// # Panics
    /// Panics if `state` lacks a state variable.
    pub fn derivative(&self, state: &Environment) -> Environment {
        let x = self.state_vector(state);
        let mut out = vec![0.0; x.len()];
        self.apply(0.0, &x, &mut out);
        self.environment(&out)
    }

    /// Orders an environment into a state vector.
    ///
    /// # Panics
    /// Panics if `env` lacks a state variable.
    pub fn state_vector(&self, env: &Environment) -> Vec<f64> {
        self.names
            .iter()
            .map(|name| match env.get(name) {
                Some(&value) => value,
                None => panic!("Missing variable '{name}' in state"),
            })
            .collect()
    }

    pub fn environment(&self, state: &[f64]) -> Environment {
        self.names.iter().cloned().zip(state.iter().copied()).collect()
    }
}

impl DynamicalSystem<f64> for CompiledSystem {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let mut stack = self.stack.borrow_mut();
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = VM::execute(eq, x, &mut stack);
        }
    }
}
