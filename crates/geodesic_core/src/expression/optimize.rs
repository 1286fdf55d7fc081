use super::Expression;

impl Expression {
    /// One bottom-up simplification pass.
    ///
    /// Folds constant subtrees and drops `x * 0`, `x * 1` and `x + 0`. Every rule looks only at
    /// already simplified children, so a second pass returns the same tree. This is not a normal
    /// form: `x + x` and `x * 2` stay distinct.
    pub fn optimize(&self) -> Expression {
        match self {
            Expression::Var(_) | Expression::Const(_) => self.clone(),
            Expression::Mul(a, b) => match (a.optimize(), b.optimize()) {
                (Expression::Const(x), Expression::Const(y)) => Expression::Const(x * y),
                (Expression::Const(z), _) | (_, Expression::Const(z)) if z == 0.0 => {
                    Expression::Const(0.0)
                }
                (Expression::Const(one), other) | (other, Expression::Const(one))
                    if one == 1.0 =>
                {
                    other
                }
                (a, b) => a * b,
            },
            Expression::Add(a, b) => match (a.optimize(), b.optimize()) {
                (Expression::Const(x), Expression::Const(y)) => Expression::Const(x + y),
                (Expression::Const(zero), other) | (other, Expression::Const(zero))
                    if zero == 0.0 =>
                {
                    other
                }
                (a, b) => a + b,
            },
            Expression::Exp { base, exponent } => match exponent.optimize() {
                Expression::Const(e) => Expression::Const(base.powf(e)),
                exponent => Expression::exp(*base, exponent),
            },
            Expression::Pow { base, exponent } => match base.optimize() {
                Expression::Const(b) => Expression::Const(b.powf(*exponent)),
                _ if *exponent == 0.0 => Expression::Const(1.0),
                base if *exponent == 1.0 => base,
                base => base.pow(*exponent),
            },
            Expression::LogBase { base, arg } => match arg.optimize() {
                Expression::Const(a) => Expression::Const(a.log(*base)),
                arg => Expression::log(*base, arg),
            },
            Expression::Sin(a) => match a.optimize() {
                Expression::Const(c) => Expression::Const(c.sin()),
                a => Expression::sin(a),
            },
            Expression::Cos(a) => match a.optimize() {
                Expression::Const(c) => Expression::Const(c.cos()),
                a => Expression::cos(a),
            },
        }
    }
}
