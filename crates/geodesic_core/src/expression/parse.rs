use super::Expression;
use crate::error::ParseError;

/// Parses surface syntax into an [`Expression`], accepting any identifier.
///
/// ```text
/// expr    := term ('+' term)*
/// term    := unary ('*' unary)*
/// unary   := '-' unary | power
/// power   := primary ('^' ['-'] primary)*
/// primary := number | identifier | sin(expr) | cos(expr)
///          | log(expr) | log(number, expr) | '(' expr ')'
/// ```
///
/// One side of every `^` must be a numeric literal: `x ^ 2` is a power, `2 ^ x` an exponential.
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    Parser::new(tokenize(input)?, None).parse_all()
}

/// Like [`parse`], but rejects identifiers outside `allowed`.
pub fn parse_restricted(input: &str, allowed: &[&str]) -> Result<Expression, ParseError> {
    Parser::new(tokenize(input)?, Some(allowed)).parse_all()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Caret,
    Comma,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Identifier(name) => format!("'{name}'"),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Caret => "'^'".into(),
            Token::Comma => "','".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse()
                .map_err(|_| ParseError::InvalidNumber(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '^' => Token::Caret,
                ',' => Token::Comma,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(ParseError::UnexpectedCharacter(other)),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    allowed: Option<&'a [&'a str]>,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, allowed: Option<&'a [&'a str]>) -> Self {
        Self {
            tokens,
            pos: 0,
            allowed,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ParseError> {
        match self.consume() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ParseError::UnexpectedToken(token.describe())),
            None => Err(ParseError::UnexpectedEnd(what)),
        }
    }

    fn parse_all(mut self) -> Result<Expression, ParseError> {
        let expr = self.parse_expression()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(ParseError::TrailingInput(token.describe())),
        }
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_term()?;
        while self.eat(&Token::Plus) {
            let right = self.parse_term()?;
            left = left + right;
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::Star) {
            let right = self.parse_unary()?;
            left = left * right;
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if self.eat(&Token::Minus) {
            return Ok(-self.parse_unary()?);
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_primary()?;
        while self.eat(&Token::Caret) {
            let right = self.parse_exponent_operand()?;
            left = match (&left, &right) {
                (_, Expression::Const(exponent)) => left.pow(*exponent),
                (Expression::Const(base), _) => Expression::exp(*base, right),
                _ => {
                    return Err(ParseError::NonLiteralPower {
                        base: left.to_string(),
                        exponent: right.to_string(),
                    })
                }
            };
        }
        Ok(left)
    }

    fn parse_exponent_operand(&mut self) -> Result<Expression, ParseError> {
        if self.eat(&Token::Minus) {
            return Ok(-self.parse_exponent_operand()?);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expression::Const(n)),
            Some(Token::Identifier(name)) => {
                if self.eat(&Token::LParen) {
                    self.parse_call(name)
                } else if let Some(value) = non_finite_literal(&name) {
                    Ok(Expression::Const(value))
                } else {
                    self.check_allowed(&name)?;
                    Ok(Expression::Var(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(token) => Err(ParseError::UnexpectedToken(token.describe())),
            None => Err(ParseError::UnexpectedEnd("an operand")),
        }
    }

    /// Parses the argument list after `name(`.
    fn parse_call(&mut self, name: String) -> Result<Expression, ParseError> {
        let expr = match name.as_str() {
            "sin" => Expression::sin(self.parse_expression()?),
            "cos" => Expression::cos(self.parse_expression()?),
            "log" => {
                let first = self.parse_expression()?;
                if self.eat(&Token::Comma) {
                    let base = first
                        .as_const()
                        .ok_or_else(|| ParseError::NonLiteralLogBase(first.to_string()))?;
                    Expression::log(base, self.parse_expression()?)
                } else {
                    Expression::ln(first)
                }
            }
            _ => return Err(ParseError::UnknownFunction(name)),
        };
        self.expect(Token::RParen, "')'")?;
        Ok(expr)
    }

    fn check_allowed(&self, name: &str) -> Result<(), ParseError> {
        match self.allowed {
            Some(allowed) if !allowed.contains(&name) => Err(ParseError::UnknownVariable {
                name: name.to_string(),
                allowed: allowed.join(", "),
            }),
            _ => Ok(()),
        }
    }
}

/// Spellings `Display` uses for non-finite constants, which constant folding can produce.
fn non_finite_literal(name: &str) -> Option<f64> {
    match name {
        "inf" => Some(f64::INFINITY),
        "NaN" => Some(f64::NAN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Environment;

    fn at(expr: &Expression, x: f64, y: f64) -> f64 {
        let env: Environment = [("x".to_string(), x), ("y".to_string(), y)].into();
        expr.evaluate(&env).expect("x and y are bound")
    }

    #[test]
    fn parses_precedence_of_sum_product_and_power() {
        let e = parse("1 + 2 * x ^ 2").expect("valid input");
        assert_eq!(
            e,
            Expression::constant(1.0)
                + Expression::constant(2.0) * Expression::var("x").pow(2.0)
        );
    }

    #[test]
    fn caret_disambiguates_by_literal_side() {
        assert_eq!(parse("x^3").unwrap(), Expression::var("x").pow(3.0));
        assert_eq!(
            parse("2^x").unwrap(),
            Expression::exp(2.0, Expression::var("x"))
        );
        assert_eq!(parse("x^-1").unwrap(), Expression::var("x").pow(-1.0));
        assert_eq!(parse("x^(-0.5)").unwrap(), Expression::var("x").pow(-0.5));
        assert!(matches!(
            parse("x^y"),
            Err(ParseError::NonLiteralPower { .. })
        ));
    }

    #[test]
    fn parses_functions_and_log_bases() {
        let e = parse("sin(x) + cos(y) + log(x) + log(2, y)").unwrap();
        let expected = 1.5_f64.sin() + 0.25_f64.cos() + 1.5_f64.ln() + 0.25_f64.log2();
        assert!((at(&e, 1.5, 0.25) - expected).abs() < 1e-12);
        assert!(matches!(
            parse("log(x, y)"),
            Err(ParseError::NonLiteralLogBase(_))
        ));
        assert!(matches!(
            parse("tan(x)"),
            Err(ParseError::UnknownFunction(name)) if name == "tan"
        ));
    }

    #[test]
    fn unary_minus_lowers_to_constants() {
        assert_eq!(parse("-3").unwrap(), Expression::constant(-3.0));
        assert_eq!(
            parse("-x^2").unwrap(),
            Expression::constant(-1.0) * Expression::var("x").pow(2.0)
        );
    }

    #[test]
    fn restricted_parse_rejects_foreign_identifiers() {
        assert!(parse_restricted("x * y + 1", &["x", "y"]).is_ok());
        let err = parse_restricted("x + z", &["x", "y"]).expect_err("z is not a coordinate");
        assert_eq!(
            err,
            ParseError::UnknownVariable {
                name: "z".into(),
                allowed: "x, y".into()
            }
        );
        assert!(format!("{err}").contains("Unknown variable: z"));
    }

    #[test]
    fn malformed_input_is_reported() {
        assert!(matches!(parse("x +"), Err(ParseError::UnexpectedEnd(_))));
        assert!(matches!(parse("(x"), Err(ParseError::UnexpectedEnd(_))));
        assert!(matches!(parse("x y"), Err(ParseError::TrailingInput(_))));
        assert!(matches!(parse("x / y"), Err(ParseError::UnexpectedCharacter('/'))));
        assert!(matches!(parse("1.2.3"), Err(ParseError::InvalidNumber(_))));
        assert!(matches!(parse("* x"), Err(ParseError::UnexpectedToken(_))));
        assert!(matches!(parse(""), Err(ParseError::UnexpectedEnd(_))));
    }

    #[test]
    fn folded_non_finite_constants_round_trip() {
        let folded = parse("(0 ^ (-1)) * x").unwrap().optimize();
        assert_eq!(folded.to_string(), "(inf * x)");
        let reparsed = parse_restricted(&folded.to_string(), &["x", "y"]).unwrap();
        assert_eq!(reparsed, folded);
        assert_eq!(at(&reparsed, 2.0, 0.0), f64::INFINITY);

        let negative = parse("(-1) * (0 ^ (-1))").unwrap().optimize();
        assert_eq!(parse(&negative.to_string()).unwrap(), negative);

        let nan = parse("log(-1) + y").unwrap().optimize();
        let reparsed = parse_restricted(&nan.to_string(), &["x", "y"]).unwrap();
        assert!(at(&reparsed, 0.0, 1.0).is_nan());
    }

    #[test]
    fn rendered_text_round_trips() {
        let sources = [
            "1 + x * y",
            "sin(x) * cos(y * 2)",
            "2 ^ (x + y)",
            "(x + 1) ^ -2",
            "log(10, x * x + 1) + log(y + 3)",
            "-1 * x + 0.125 * y ^ 3",
            "cos(sin(x) ^ 2) * 3 ^ y",
        ];
        for source in sources {
            let original = parse(source).expect("source parses");
            let reparsed = parse(&original.to_string()).expect("rendered text parses");
            for &(x, y) in &[(0.3, 0.7), (1.1, -0.4), (2.5, 1.9)] {
                let a = at(&original, x, y);
                let b = at(&reparsed, x, y);
                assert!((a - b).abs() < 1e-12, "{source}: {a} vs {b}");
            }
        }
    }
}
