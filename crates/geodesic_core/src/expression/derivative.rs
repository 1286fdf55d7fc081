use super::Expression;

impl Expression {
    /// Symbolic partial derivative with respect to `var`.
    ///
    /// The result is not simplified; pipe it through [`Expression::optimize`].
    pub fn derivative(&self, var: &str) -> Expression {
        match self {
            Expression::Var(name) => Expression::Const(if name == var { 1.0 } else { 0.0 }),
            Expression::Const(_) => Expression::Const(0.0),
            Expression::Mul(a, b) => {
                a.derivative(var) * (**b).clone() + (**a).clone() * b.derivative(var)
            }
            Expression::Add(a, b) => a.derivative(var) + b.derivative(var),
            // d(b^u) = b^u * ln(b) * du
            Expression::Exp { base, exponent } => {
                self.clone() * Expression::Const(base.ln()) * exponent.derivative(var)
            }
            // d(u^n) = n * u^(n-1) * du
            Expression::Pow { base, exponent } => {
                Expression::Const(*exponent)
                    * (**base).clone().pow(exponent - 1.0)
                    * base.derivative(var)
            }
            // d(log_b u) = du / (u * ln(b))
            Expression::LogBase { base, arg } => {
                arg.derivative(var) * (**arg).clone().pow(-1.0) * Expression::Const(1.0 / base.ln())
            }
            Expression::Sin(a) => Expression::cos((**a).clone()) * a.derivative(var),
            Expression::Cos(a) => -Expression::sin((**a).clone()) * a.derivative(var),
        }
    }
}
