//! Metric tensors on a two-dimensional chart and the geodesic equations they induce.
//!
//! With metric `g` and inverse `h`, the Christoffel symbols are
//!
//! ```text
//! Γ_{ij,k} = ½ (∂_i g_{jk} + ∂_j g_{ik} − ∂_k g_{ij})      (first kind)
//! Γ_{ij}^k = Σ_m h^{km} Γ_{ij,m}                           (second kind)
//! ```
//!
//! and a geodesic `(x, y)` with velocity `(vx, vy)` satisfies `dv^k/dt = −Σ_ij Γ_{ij}^k v^i v^j`.
//! Nothing here guards against singular metrics: where `det g = 0` the inverse evaluates to
//! infinities or NaN.

use crate::equation_engine::System;
use crate::error::ParseError;
use crate::expression::{parse_restricted, Environment, Expression};
use anyhow::Result;
use log::{debug, trace};
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Names of the two chart coordinates. The velocity of coordinate `c` is named `v{c}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub first: String,
    pub second: String,
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::new("x", "y")
    }
}

impl Coordinates {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn names(&self) -> [&str; 2] {
        [self.first.as_str(), self.second.as_str()]
    }

    pub fn velocity_names(&self) -> [String; 2] {
        [format!("v{}", self.first), format!("v{}", self.second)]
    }

    /// Coordinates followed by velocities: the geodesic state-vector order.
    pub fn state_names(&self) -> [String; 4] {
        let [vx, vy] = self.velocity_names();
        [self.first.clone(), self.second.clone(), vx, vy]
    }

    /// Parses an expression that may only reference the two coordinates.
    pub fn parse(&self, input: &str) -> Result<Expression, ParseError> {
        parse_restricted(input, &self.names())
    }
}

/// Symmetric rank-2 tensor field `(g11, g12, g21, g22)`.
///
/// `g12` and `g21` are expected to be the same expression; [`TwoForm::symmetric`] and
/// [`TwoForm::with_off_diagonal`] keep them that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoForm {
    pub g11: Expression,
    pub g12: Expression,
    pub g21: Expression,
    pub g22: Expression,
}

impl TwoForm {
    pub fn new(g11: Expression, g12: Expression, g21: Expression, g22: Expression) -> Self {
        Self { g11, g12, g21, g22 }
    }

    pub fn symmetric(g11: Expression, g12: Expression, g22: Expression) -> Self {
        Self::new(g11, g12.clone(), g12, g22)
    }

    /// The Euclidean metric `(1, 0, 0, 1)`.
    pub fn flat() -> Self {
        Self::symmetric(
            Expression::Const(1.0),
            Expression::Const(0.0),
            Expression::Const(1.0),
        )
    }

    /// Parses `[g11, g12, g21, g22]`, allowing only the chart coordinates as variables.
    pub fn parse(components: [&str; 4], coords: &Coordinates) -> Result<Self, ParseError> {
        let [g11, g12, g21, g22] = components;
        Ok(Self::new(
            coords.parse(g11)?,
            coords.parse(g12)?,
            coords.parse(g21)?,
            coords.parse(g22)?,
        ))
    }

    /// Replaces both off-diagonal entries.
    pub fn with_off_diagonal(self, g12: Expression) -> Self {
        Self::new(self.g11, g12.clone(), g12, self.g22)
    }

    /// Entry `(i, j)` with zero-based indices.
    pub fn component(&self, i: usize, j: usize) -> &Expression {
        match (i, j) {
            (0, 0) => &self.g11,
            (0, 1) => &self.g12,
            (1, 0) => &self.g21,
            (1, 1) => &self.g22,
            _ => panic!("TwoForm index ({i}, {j}) out of range"),
        }
    }

    /// Numeric matrix at a point, `None` if a variable is unbound.
    pub fn evaluate(&self, env: &Environment) -> Option<Matrix2<f64>> {
        Some(Matrix2::new(
            self.g11.evaluate(env)?,
            self.g12.evaluate(env)?,
            self.g21.evaluate(env)?,
            self.g22.evaluate(env)?,
        ))
    }

    fn map(&self, f: impl Fn(&Expression) -> Expression) -> Self {
        Self::new(f(&self.g11), f(&self.g12), f(&self.g21), f(&self.g22))
    }
}

/// Symbolic `g11 * g22 - g12 * g21`.
pub fn determinant(g: &TwoForm) -> Expression {
    (g.g11.clone() * g.g22.clone() - g.g12.clone() * g.g21.clone()).optimize()
}

/// Symbolic inverse `(g22, -g12, -g21, g11) * det^-1`.
pub fn invert(g: &TwoForm) -> TwoForm {
    let inv_det = determinant(g).pow(-1.0);
    TwoForm::new(
        g.g22.clone() * inv_det.clone(),
        -(g.g12.clone() * inv_det.clone()),
        -(g.g21.clone() * inv_det.clone()),
        g.g11.clone() * inv_det,
    )
    .map(Expression::optimize)
}

/// Christoffel symbols for one fixed upper or lower index, laid out by the remaining `(i, j)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Christoffel {
    pub c11: Expression,
    pub c12: Expression,
    pub c21: Expression,
    pub c22: Expression,
}

impl Christoffel {
    pub fn get(&self, i: usize, j: usize) -> &Expression {
        match (i, j) {
            (0, 0) => &self.c11,
            (0, 1) => &self.c12,
            (1, 0) => &self.c21,
            (1, 1) => &self.c22,
            _ => panic!("Christoffel index ({i}, {j}) out of range"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &Expression)> {
        [
            ((0, 0), &self.c11),
            ((0, 1), &self.c12),
            ((1, 0), &self.c21),
            ((1, 1), &self.c22),
        ]
        .into_iter()
    }
}

/// `Γ_{ij,k}` for the lower index `k` (0 or 1).
fn christoffel_first(g: &TwoForm, k: usize, coords: &Coordinates) -> Christoffel {
    let names = coords.names();
    let d = |i: usize, j: usize, wrt: usize| g.component(i, j).derivative(names[wrt]);
    let symbol = |i: usize, j: usize| {
        (Expression::Const(0.5) * (d(j, k, i) + d(i, k, j) - d(i, j, k))).optimize()
    };

    let c12 = symbol(0, 1);
    Christoffel {
        c11: symbol(0, 0),
        c21: c12.clone(),
        c12,
        c22: symbol(1, 1),
    }
}

/// `Γ_{ij,1}`, the first-kind symbols with lower index on the first coordinate.
pub fn christoffel_first1(g: &TwoForm, coords: &Coordinates) -> Christoffel {
    christoffel_first(g, 0, coords)
}

/// `Γ_{ij,2}`.
pub fn christoffel_first2(g: &TwoForm, coords: &Coordinates) -> Christoffel {
    christoffel_first(g, 1, coords)
}

/// Both second-kind families `[Γ_{ij}^1, Γ_{ij}^2]`, sharing one inverse and one set of
/// first-kind symbols.
pub fn christoffel_second(g: &TwoForm, coords: &Coordinates) -> [Christoffel; 2] {
    let h = invert(g);
    let first = [christoffel_first1(g, coords), christoffel_first2(g, coords)];
    let raise = |k: usize| {
        let symbol = |i: usize, j: usize| {
            (h.component(k, 0).clone() * first[0].get(i, j).clone()
                + h.component(k, 1).clone() * first[1].get(i, j).clone())
            .optimize()
        };
        let c12 = symbol(0, 1);
        Christoffel {
            c11: symbol(0, 0),
            c21: c12.clone(),
            c12,
            c22: symbol(1, 1),
        }
    };
    [raise(0), raise(1)]
}

/// `Γ_{ij}^1`.
pub fn christoffel_second1(g: &TwoForm, coords: &Coordinates) -> Christoffel {
    let [first, _] = christoffel_second(g, coords);
    first
}

/// `Γ_{ij}^2`.
pub fn christoffel_second2(g: &TwoForm, coords: &Coordinates) -> Christoffel {
    let [_, second] = christoffel_second(g, coords);
    second
}

/// The first-order geodesic system over `(x, y, vx, vy)`.
///
/// Fails only if the coordinate names collide with each other or with the velocity names.
pub fn geodesic_system(g: &TwoForm, coords: &Coordinates) -> Result<System> {
    let [x, y, vx, vy] = coords.state_names();
    let velocity = [Expression::var(vx.clone()), Expression::var(vy.clone())];
    let symbols = christoffel_second(g, coords);

    let acceleration = |k: usize| {
        let mut sum = Expression::Const(0.0);
        for ((i, j), gamma) in symbols[k].iter() {
            trace!("Γ^{}_{}{} = {}", k + 1, i + 1, j + 1, gamma);
            sum = sum + gamma.clone() * velocity[i].clone() * velocity[j].clone();
        }
        (-sum).optimize()
    };

    let equations = vec![
        (x, velocity[0].clone()),
        (y, velocity[1].clone()),
        (vx, acceleration(0)),
        (vy, acceleration(1)),
    ];
    debug!(
        "Built geodesic system for metric ({}, {}, {}, {})",
        g.g11, g.g12, g.g21, g.g22
    );
    System::new(equations)
}

/// `g(v, v)` at a geodesic state; constant along exact geodesics.
pub fn speed_squared(g: &TwoForm, coords: &Coordinates, state: &Environment) -> Option<f64> {
    let [vx, vy] = coords.velocity_names();
    let v = Vector2::new(*state.get(&vx)?, *state.get(&vy)?);
    Some(v.dot(&(g.evaluate(state)? * v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::compile;
    use crate::integrator::solve;

    fn point(x: f64, y: f64) -> Environment {
        [("x".to_string(), x), ("y".to_string(), y)].into()
    }

    fn polar() -> TwoForm {
        TwoForm::parse(["1", "0", "0", "x^2"], &Coordinates::default()).unwrap()
    }

    fn skewed() -> TwoForm {
        TwoForm::parse(
            ["2 + sin(y)", "0.3 * x * y", "0.3 * x * y", "1 + x^2"],
            &Coordinates::default(),
        )
        .unwrap()
    }

    fn assert_close(a: &Matrix2<f64>, b: &Matrix2<f64>, tol: f64) {
        assert!((a - b).abs().max() < tol, "{a} vs {b}");
    }

    #[test]
    fn parse_restricts_to_coordinates() {
        let coords = Coordinates::new("u", "w");
        assert!(TwoForm::parse(["1", "0", "0", "u*w"], &coords).is_ok());
        let err = TwoForm::parse(["1", "0", "0", "x"], &coords).expect_err("x is foreign");
        assert!(matches!(err, ParseError::UnknownVariable { .. }));
    }

    #[test]
    fn off_diagonal_edits_stay_symmetric() {
        let g = TwoForm::flat().with_off_diagonal(Expression::var("x"));
        assert_eq!(g.g12, g.g21);
        assert_eq!(g.g12, Expression::var("x"));
    }

    #[test]
    fn inverse_times_metric_is_identity() {
        let g = skewed();
        let h = invert(&g);
        for &(x, y) in &[(0.5, 0.2), (1.3, -0.7), (-2.0, 1.1)] {
            let env = point(x, y);
            let gm = g.evaluate(&env).unwrap();
            let hm = h.evaluate(&env).unwrap();
            assert_close(&(gm * hm), &Matrix2::identity(), 1e-12);
            assert_close(&hm, &gm.try_inverse().unwrap(), 1e-12);
        }
    }

    #[test]
    fn double_inverse_recovers_metric() {
        let g = skewed();
        let hh = invert(&invert(&g));
        for &(x, y) in &[(0.5, 0.2), (1.3, -0.7)] {
            let env = point(x, y);
            assert_close(&hh.evaluate(&env).unwrap(), &g.evaluate(&env).unwrap(), 1e-10);
        }
    }

    #[test]
    fn singular_metric_inverse_diverges_without_error() {
        let g = TwoForm::parse(["x", "0", "0", "1"], &Coordinates::default()).unwrap();
        let h = invert(&g).evaluate(&point(0.0, 1.0)).unwrap();
        assert!(!h[(0, 0)].is_finite());
    }

    #[test]
    fn flat_metric_has_vanishing_symbols() {
        let coords = Coordinates::default();
        let g = TwoForm::flat();
        for symbols in christoffel_second(&g, &coords) {
            for (_, gamma) in symbols.iter() {
                assert_eq!(*gamma, Expression::Const(0.0));
            }
        }
        let system = geodesic_system(&g, &coords).unwrap();
        assert_eq!(system.get("vx"), Some(&Expression::Const(0.0)));
        assert_eq!(system.get("vy"), Some(&Expression::Const(0.0)));
    }

    #[test]
    fn polar_metric_matches_known_symbols() {
        let coords = Coordinates::default();
        let g = polar();
        let first1 = christoffel_first1(&g, &coords);
        let first2 = christoffel_first2(&g, &coords);
        let [second1, second2] = christoffel_second(&g, &coords);
        for &(r, theta) in &[(0.5, 0.3), (2.0, -1.0)] {
            let env = point(r, theta);
            // Γ_{22,1} = -r, Γ_{12,2} = Γ_{21,2} = r
            assert!((first1.c22.evaluate(&env).unwrap() + r).abs() < 1e-12);
            assert!((first2.c12.evaluate(&env).unwrap() - r).abs() < 1e-12);
            assert!((first2.c21.evaluate(&env).unwrap() - r).abs() < 1e-12);
            // Γ^1_{22} = -r, Γ^2_{12} = Γ^2_{21} = 1/r
            assert!((second1.c22.evaluate(&env).unwrap() + r).abs() < 1e-12);
            assert!((second2.c12.evaluate(&env).unwrap() - 1.0 / r).abs() < 1e-12);
            assert!((second2.c21.evaluate(&env).unwrap() - 1.0 / r).abs() < 1e-12);
            assert_eq!(second1.c11.evaluate(&env), Some(0.0));
        }
        assert_eq!(christoffel_second1(&g, &coords), second1);
        assert_eq!(christoffel_second2(&g, &coords), second2);
    }

    #[test]
    fn geodesic_system_has_complete_basis() {
        let coords = Coordinates::new("u", "w");
        let system = geodesic_system(&skewed_in(&coords), &coords).unwrap();
        assert_eq!(system.names(), ["u", "w", "vu", "vw"].map(String::from));
        for (_, rhs) in system.iter() {
            for name in rhs.variables() {
                assert!(system.get(&name).is_some(), "{name} is not a state variable");
            }
        }
    }

    #[test]
    fn colliding_coordinate_names_are_rejected() {
        let coords = Coordinates::new("x", "vx");
        let err = geodesic_system(&TwoForm::flat(), &coords).expect_err("vx collides");
        assert!(format!("{err}").contains("Duplicate state variable: vx"));
    }

    fn skewed_in(coords: &Coordinates) -> TwoForm {
        TwoForm::parse(["2 + sin(w)", "0.3 * u * w", "0.3 * u * w", "1 + u^2"], coords).unwrap()
    }

    #[test]
    fn flat_geodesics_are_straight_lines() {
        let coords = Coordinates::default();
        let system = compile(&geodesic_system(&TwoForm::flat(), &coords).unwrap());
        let initial: Environment = [
            ("x".to_string(), 0.5),
            ("y".to_string(), -1.0),
            ("vx".to_string(), 0.6),
            ("vy".to_string(), -0.8),
        ]
        .into();
        let solution = solve(0.0, 1.0, &initial, &system, 1e-2, 1000).unwrap();
        for t in [0.0, 0.25, 0.5, 1.0] {
            let s = solution.at(t);
            assert!((s["x"] - (0.5 + 0.6 * t)).abs() < 1e-12);
            assert!((s["y"] - (-1.0 - 0.8 * t)).abs() < 1e-12);
            assert!((s["vx"] - 0.6).abs() < 1e-15);
            assert!((s["vy"] + 0.8).abs() < 1e-15);
        }
    }

    #[test]
    fn polar_geodesic_is_a_straight_line_in_the_plane() {
        let coords = Coordinates::default();
        let system = compile(&geodesic_system(&polar(), &coords).unwrap());
        // Start at (r, θ) = (1, 0) moving in the Cartesian +y direction: the line x = 1.
        let initial: Environment = [
            ("x".to_string(), 1.0),
            ("y".to_string(), 0.0),
            ("vx".to_string(), 0.0),
            ("vy".to_string(), 1.0),
        ]
        .into();
        let solution = solve(0.0, 1.0, &initial, &system, 1e-3, 10_000).unwrap();
        let end = solution.at(1.0);
        let (px, py) = (end["x"] * end["y"].cos(), end["x"] * end["y"].sin());
        assert!((px - 1.0).abs() < 1e-9);
        assert!((py - 1.0).abs() < 1e-9);
    }

    #[test]
    fn speed_is_conserved_along_geodesics() {
        let coords = Coordinates::default();
        let g = skewed();
        let system = compile(&geodesic_system(&g, &coords).unwrap());
        let initial: Environment = [
            ("x".to_string(), 0.4),
            ("y".to_string(), 0.1),
            ("vx".to_string(), 0.3),
            ("vy".to_string(), -0.5),
        ]
        .into();
        let solution = solve(0.0, 2.0, &initial, &system, 1e-3, 10_000).unwrap();
        let start = speed_squared(&g, &coords, &initial).unwrap();
        for state in solution.values().iter().step_by(250) {
            let speed = speed_squared(&g, &coords, state).unwrap();
            assert!((speed - start).abs() < 1e-8, "{speed} vs {start}");
        }
    }
}
