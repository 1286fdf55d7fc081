//! The `geodesic_core` crate turns a symbolic metric on a 2D chart into sampled geodesics.
//!
//! Data flows one way:
//! metric (`TwoForm`) → Christoffel symbols → geodesic `System` → `CompiledSystem` → `Solution`.
//!
//! Key components:
//! - **Expression**: Symbolic trees with parsing, evaluation, differentiation and simplification.
//! - **Metric**: Symbolic inverse, Christoffel symbols of both kinds and the geodesic equations.
//! - **Equation Engine**: Lowers a symbolic system to stack bytecode evaluated by a small VM.
//! - **Integrator / Solvers**: Fixed-step explicit Runge-Kutta integration into queryable solutions.
//!
//! The library keeps no global state and logs through the `log` facade without installing a
//! logger.

pub mod equation_engine;
pub mod error;
pub mod expression;
pub mod integrator;
pub mod metric;
pub mod solution;
pub mod solvers;
pub mod traits;

pub use equation_engine::{compile, CompiledSystem, System};
pub use error::ParseError;
pub use expression::{parse, parse_restricted, Environment, Expression};
pub use integrator::{solve, solve_with, IntegratorSettings};
pub use metric::{geodesic_system, invert, Coordinates, TwoForm};
pub use solution::{Solution, SolveStatus};
pub use solvers::Method;
