use crate::traits::{DynamicalSystem, Scalar, Steppable};
use serde::{Deserialize, Serialize};

/// Coefficients of an explicit Runge-Kutta method.
/// `a` is strictly lower triangular and stored row by row without the diagonal.
#[derive(Debug)]
pub struct ButcherTableau {
    pub order: u32,
    pub a: &'static [&'static [f64]],
    pub b: &'static [f64],
    pub c: &'static [f64],
}

impl ButcherTableau {
    pub fn stages(&self) -> usize {
        self.b.len()
    }
}

pub const EULER: ButcherTableau = ButcherTableau {
    order: 1,
    a: &[&[]],
    b: &[1.0],
    c: &[0.0],
};

/// Classic Runge-Kutta 4th order.
pub const RK4: ButcherTableau = ButcherTableau {
    order: 4,
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    c: &[0.0, 0.5, 0.5, 1.0],
};

/// Tsitouras 5(4), propagated with the 5th order weights and no error control.
pub const TSIT5: ButcherTableau = ButcherTableau {
    order: 5,
    a: &[
        &[],
        &[0.161],
        &[-0.008480655492356989, 0.335480655492357],
        &[2.897153057105493, -6.359448489975075, 4.3622954328695815],
        &[
            5.325864828439257,
            -11.748883564062828,
            7.4955393428898365,
            -0.09249506636175525,
        ],
        &[
            5.86145544294642,
            -12.92096931784711,
            8.159367898576159,
            -0.071584973281401,
            -0.028269050394068383,
        ],
    ],
    b: &[
        0.09646076681806523,
        0.01,
        0.4798896504144996,
        1.379008574103742,
        -3.290069515436081,
        2.324710524099774,
    ],
    c: &[0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0],
};

/// Fixed-step integration scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Euler,
    #[default]
    Rk4,
    Tsit5,
}

impl Method {
    pub fn tableau(self) -> &'static ButcherTableau {
        match self {
            Method::Euler => &EULER,
            Method::Rk4 => &RK4,
            Method::Tsit5 => &TSIT5,
        }
    }

    pub fn stepper<T: Scalar>(self, dim: usize) -> ExplicitRk<T> {
        ExplicitRk::new(self.tableau(), dim)
    }
}

/// Explicit Runge-Kutta stepper with preallocated stage buffers.
pub struct ExplicitRk<T: Scalar> {
    tableau: &'static ButcherTableau,
    k: Vec<Vec<T>>,
    tmp: Vec<T>,
}

impl<T: Scalar> ExplicitRk<T> {
    pub fn new(tableau: &'static ButcherTableau, dim: usize) -> Self {
        let zero = T::zero();
        Self {
            tableau,
            k: vec![vec![zero; dim]; tableau.stages()],
            tmp: vec![zero; dim],
        }
    }
}

fn coefficient<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

impl<T: Scalar> Steppable<T> for ExplicitRk<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;
        let tableau = self.tableau;

        for stage in 0..tableau.stages() {
            // tmp = y + dt * sum_j a[stage][j] * k_j
            self.tmp.copy_from_slice(state);
            for (j, &a) in tableau.a[stage].iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let a = coefficient::<T>(a);
                for (tmp, k) in self.tmp.iter_mut().zip(&self.k[j]) {
                    *tmp = *tmp + dt * a * *k;
                }
            }
            let stage_t = t0 + coefficient::<T>(tableau.c[stage]) * dt;
            system.apply(stage_t, &self.tmp, &mut self.k[stage]);
        }

        for (i, y) in state.iter_mut().enumerate() {
            let mut increment = T::zero();
            for (k, &b) in self.k.iter().zip(tableau.b) {
                increment = increment + coefficient::<T>(b) * k[i];
            }
            *y = *y + dt * increment;
        }

        *t = t0 + dt;
    }
}
