use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Floating-point type a compiled geodesic system and its steppers operate on.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side of a first-order system over the geodesic state `(x, y, vx, vy)`, laid out
/// in the system's state-vector order.
pub trait DynamicalSystem<T: Scalar> {
    /// Length of the state vector.
    fn dimension(&self) -> usize;

    /// Writes `d(state)/dt` at curve parameter `t` into `out`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// Fixed-step integrator over a [`DynamicalSystem`].
pub trait Steppable<T: Scalar> {
    /// Advances `state` from `t` by `dt` and moves `t` forward with it.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
