//! Declarative image quality predicates.
//!
//! A query like
//! `hillas_intensity > 100 && leakage_intensity_width_2 < 0.3` is parsed
//! once at startup into an expression tree with identifiers resolved
//! against the parameter schema; evaluation per image is then a cheap
//! tree walk. Unknown identifiers fail construction, not evaluation.

use showerpipe_core::error::ConfigError;
use showerpipe_core::ImageParameters;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Gt => lhs > rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

/// A comparison operand: a resolved field name or a literal.
#[derive(Clone, Debug)]
enum Operand {
    Field(String),
    Literal(f64),
}

impl Operand {
    fn value(&self, params: &ImageParameters) -> f64 {
        match self {
            // Field names were validated at parse time.
            Operand::Field(name) => params.value_of(name).unwrap_or(f64::NAN),
            Operand::Literal(v) => *v,
        }
    }
}

/// Parsed predicate expression.
#[derive(Clone, Debug)]
enum Expr {
    Compare(Operand, CmpOp, Operand),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn evaluate(&self, params: &ImageParameters) -> bool {
        match self {
            Expr::Compare(lhs, op, rhs) => op.apply(lhs.value(params), rhs.value(params)),
            Expr::And(a, b) => a.evaluate(params) && b.evaluate(params),
            Expr::Or(a, b) => a.evaluate(params) || b.evaluate(params),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Cmp(CmpOp),
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' | '|' => {
                if i + 1 >= chars.len() || chars[i + 1] != c {
                    return Err(ConfigError::Query(format!(
                        "expected \"{c}{c}\" at position {i}"
                    )));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '>' | '<' | '=' | '!' => {
                let two = i + 1 < chars.len() && chars[i + 1] == '=';
                let op = match (c, two) {
                    ('>', true) => CmpOp::Ge,
                    ('>', false) => CmpOp::Gt,
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    _ => {
                        return Err(ConfigError::Query(format!(
                            "stray \"{c}\" at position {i}"
                        )))
                    }
                };
                tokens.push(Token::Cmp(op));
                i += if two { 2 } else { 1 };
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '-' || chars[i] == '+')
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| {
                    ConfigError::Query(format!("bad numeric literal \"{text}\""))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(ConfigError::Query(format!(
                    "unexpected character \"{other}\" at position {i}"
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// or := and ("||" and)*
    fn parse_or(&mut self) -> Result<Expr, ConfigError> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    /// and := term ("&&" term)*
    fn parse_and(&mut self) -> Result<Expr, ConfigError> {
        let mut expr = self.parse_term()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.parse_term()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    /// term := "(" or ")" | operand cmp operand
    fn parse_term(&mut self) -> Result<Expr, ConfigError> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.parse_or()?;
            match self.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err(ConfigError::Query("unbalanced parenthesis".to_string())),
            }
        } else {
            let lhs = self.parse_operand()?;
            let op = match self.next() {
                Some(Token::Cmp(op)) => op,
                other => {
                    return Err(ConfigError::Query(format!(
                        "expected comparison operator, found {other:?}"
                    )))
                }
            };
            let rhs = self.parse_operand()?;
            Ok(Expr::Compare(lhs, op, rhs))
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ConfigError> {
        match self.next() {
            Some(Token::Ident(name)) => {
                if ImageParameters::default().value_of(&name).is_none() {
                    return Err(ConfigError::Query(format!(
                        "unknown parameter \"{name}\""
                    )));
                }
                Ok(Operand::Field(name))
            }
            Some(Token::Number(value)) => Ok(Operand::Literal(value)),
            other => Err(ConfigError::Query(format!(
                "expected identifier or number, found {other:?}"
            ))),
        }
    }
}

/// A compiled image quality predicate.
#[derive(Clone, Debug)]
pub struct ImageQuery {
    source: String,
    expr: Expr,
}

impl ImageQuery {
    /// Parse a predicate string.
    ///
    /// # Errors
    /// Fails on syntax errors and on identifiers that are not image
    /// parameter names.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ConfigError::Query("empty query".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(ConfigError::Query(format!(
                "trailing tokens after position {}",
                parser.pos
            )));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The original query text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one parameter set. NaN fields fail every
    /// comparison except `!=`, so unparameterized images are rejected
    /// by any meaningful cut.
    #[must_use]
    pub fn evaluate(&self, params: &ImageParameters) -> bool {
        self.expr.evaluate(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> ImageParameters {
        let mut params = ImageParameters::default();
        params.hillas.intensity = 150.0;
        params.hillas.width = 0.02;
        params.leakage.intensity_width_2 = 0.1;
        params.morphology.n_pixels = 8;
        params
    }

    #[test]
    fn test_default_pipeline_query() {
        let query = ImageQuery::parse(
            "hillas_intensity > 100 && leakage_intensity_width_2 < 0.3 \
             && hillas_width > 0 && morphology_n_pixels >= 5",
        )
        .unwrap();
        assert!(query.evaluate(&sample_params()));

        let mut faint = sample_params();
        faint.hillas.intensity = 50.0;
        assert!(!query.evaluate(&faint));
    }

    #[test]
    fn test_or_and_parentheses() {
        let query =
            ImageQuery::parse("(hillas_intensity > 1000 || morphology_n_pixels >= 5) && hillas_width > 0")
                .unwrap();
        assert!(query.evaluate(&sample_params()));

        let query2 = ImageQuery::parse("hillas_intensity > 1000 || morphology_n_pixels < 5").unwrap();
        assert!(!query2.evaluate(&sample_params()));
    }

    #[test]
    fn test_equality_operators() {
        let query = ImageQuery::parse("morphology_n_pixels == 8").unwrap();
        assert!(query.evaluate(&sample_params()));
        let query = ImageQuery::parse("morphology_n_pixels != 8").unwrap();
        assert!(!query.evaluate(&sample_params()));
    }

    #[test]
    fn test_nan_fails_cuts() {
        let query = ImageQuery::parse("hillas_intensity > 0").unwrap();
        assert!(!query.evaluate(&ImageParameters::default()));
        let query = ImageQuery::parse("hillas_intensity < 1e12").unwrap();
        assert!(!query.evaluate(&ImageParameters::default()));
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let err = ImageQuery::parse("hillas_intensitty > 100").unwrap_err();
        assert!(matches!(err, ConfigError::Query(_)));
    }

    #[test]
    fn test_syntax_errors_rejected() {
        for bad in [
            "",
            "hillas_intensity >",
            "hillas_intensity > 100 &&",
            "(hillas_intensity > 100",
            "hillas_intensity > 100) ",
            "hillas_intensity & 100",
            "100 100",
        ] {
            assert!(ImageQuery::parse(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn test_literal_on_left() {
        let query = ImageQuery::parse("100 < hillas_intensity").unwrap();
        assert!(query.evaluate(&sample_params()));
    }

    #[test]
    fn test_scientific_notation() {
        let query = ImageQuery::parse("hillas_width > 1e-3").unwrap();
        assert!(query.evaluate(&sample_params()));
    }
}
