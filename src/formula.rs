//! Per-series value formulas.
//!
//! A formula is a small arithmetic expression over the raw sample value `x`
//! and its timestamp `t`, for example `x*1000`, `Math.log(x)/2.303` or
//! `x > 0 ? sqrt(x) : 0`. It is parsed once into an [`Expr`] tree and then
//! evaluated per sample. Only the operators and functions listed here exist;
//! nothing else can be reached from a formula.
//!
//! A leading `Math.` on identifiers is accepted so formulas written for the
//! browser plotter keep working. `log` is the natural logarithm for the same
//! reason.

use crate::error::{ChartError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Ident(usize, usize),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Abs,
    Sqrt,
    Cbrt,
    Exp,
    Ln,
    Log10,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sign,
    Min,
    Max,
    Pow,
    Hypot,
}

impl Func {
    fn lookup(name: &str) -> Option<(Func, usize)> {
        let f = match name {
            "abs" => (Func::Abs, 1),
            "sqrt" => (Func::Sqrt, 1),
            "cbrt" => (Func::Cbrt, 1),
            "exp" => (Func::Exp, 1),
            "ln" | "log" => (Func::Ln, 1),
            "log10" => (Func::Log10, 1),
            "log2" => (Func::Log2, 1),
            "sin" => (Func::Sin, 1),
            "cos" => (Func::Cos, 1),
            "tan" => (Func::Tan, 1),
            "asin" => (Func::Asin, 1),
            "acos" => (Func::Acos, 1),
            "atan" => (Func::Atan, 1),
            "atan2" => (Func::Atan2, 2),
            "sinh" => (Func::Sinh, 1),
            "cosh" => (Func::Cosh, 1),
            "tanh" => (Func::Tanh, 1),
            "floor" => (Func::Floor, 1),
            "ceil" => (Func::Ceil, 1),
            "round" => (Func::Round, 1),
            "trunc" => (Func::Trunc, 1),
            "sign" => (Func::Sign, 1),
            "min" => (Func::Min, 2),
            "max" => (Func::Max, 2),
            "pow" => (Func::Pow, 2),
            "hypot" => (Func::Hypot, 2),
            _ => return None,
        };
        Some(f)
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Func::Abs => a.abs(),
            Func::Sqrt => a.sqrt(),
            Func::Cbrt => a.cbrt(),
            Func::Exp => a.exp(),
            Func::Ln => a.ln(),
            Func::Log10 => a.log10(),
            Func::Log2 => a.log2(),
            Func::Sin => a.sin(),
            Func::Cos => a.cos(),
            Func::Tan => a.tan(),
            Func::Asin => a.asin(),
            Func::Acos => a.acos(),
            Func::Atan => a.atan(),
            Func::Atan2 => a.atan2(b),
            Func::Sinh => a.sinh(),
            Func::Cosh => a.cosh(),
            Func::Tanh => a.tanh(),
            Func::Floor => a.floor(),
            Func::Ceil => a.ceil(),
            // JS rounds halves towards +inf
            Func::Round => (a + 0.5).floor(),
            Func::Trunc => a.trunc(),
            Func::Sign => {
                if a > 0.0 {
                    1.0
                } else if a < 0.0 {
                    -1.0
                } else {
                    a
                }
            }
            Func::Min => a.min(b),
            Func::Max => a.max(b),
            Func::Pow => a.powf(b),
            Func::Hypot => a.hypot(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Value,
    Time,
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

fn bool_val(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    pub fn eval(&self, t: f64, x: f64) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Value => x,
            Expr::Time => t,
            Expr::Neg(e) => -e.eval(t, x),
            Expr::Not(e) => bool_val(!truthy(e.eval(t, x))),
            Expr::Cond(c, a, b) => {
                if truthy(c.eval(t, x)) {
                    a.eval(t, x)
                } else {
                    b.eval(t, x)
                }
            }
            Expr::Call(f, args) => {
                let a = args.first().map_or(f64::NAN, |e| e.eval(t, x));
                let b = args.get(1).map_or(f64::NAN, |e| e.eval(t, x));
                f.apply(a, b)
            }
            Expr::Bin(op, l, r) => {
                let a = l.eval(t, x);
                match op {
                    BinOp::And => return bool_val(truthy(a) && truthy(r.eval(t, x))),
                    BinOp::Or => return bool_val(truthy(a) || truthy(r.eval(t, x))),
                    _ => {}
                }
                let b = r.eval(t, x);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Rem => a % b,
                    BinOp::Pow => a.powf(b),
                    BinOp::Lt => bool_val(a < b),
                    BinOp::Le => bool_val(a <= b),
                    BinOp::Gt => bool_val(a > b),
                    BinOp::Ge => bool_val(a >= b),
                    BinOp::Eq => bool_val(a == b),
                    BinOp::Ne => bool_val(a != b),
                    BinOp::And | BinOp::Or => unreachable!(),
                }
            }
        }
    }
}

/// A compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut p = Parser {
            src: source,
            tokens,
            pos: 0,
        };
        let expr = p.expr()?;
        if p.pos != p.tokens.len() {
            return Err(p.error("unexpected trailing input"));
        }
        Ok(Formula {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn apply(&self, t: f64, x: f64) -> f64 {
        self.expr.eval(t, x)
    }
}

const OPERATORS: [&str; 19] = [
    "===", "!==", "**", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "^", "<", ">",
    "!", "=",
];

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    'outer: while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    i = j;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let n = src[start..i].parse().map_err(|_| ChartError::Formula {
                formula: src.to_string(),
                reason: format!("bad number '{}'", &src[start..i]),
            })?;
            out.push(Token::Num(n));
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.') {
                i += 1;
            }
            out.push(Token::Ident(start, i));
            continue;
        }
        match c {
            b'(' => out.push(Token::LParen),
            b')' => out.push(Token::RParen),
            b',' => out.push(Token::Comma),
            b'?' => out.push(Token::Question),
            b':' => out.push(Token::Colon),
            _ => {
                for op in OPERATORS {
                    if src[i..].starts_with(op) {
                        if op == "=" {
                            return Err(ChartError::Formula {
                                formula: src.to_string(),
                                reason: "assignment is not allowed".to_string(),
                            });
                        }
                        out.push(Token::Op(op));
                        i += op.len();
                        continue 'outer;
                    }
                }
                return Err(ChartError::Formula {
                    formula: src.to_string(),
                    reason: format!("unexpected character '{}'", c as char),
                });
            }
        }
        i += 1;
    }
    Ok(out)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> ChartError {
        ChartError::Formula {
            formula: self.src.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        if let Some(Token::Op(op)) = self.peek() {
            if ops.contains(&op) {
                self.pos += 1;
                return Some(op);
            }
        }
        None
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<()> {
        if self.peek() == Some(tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let cond = self.or()?;
        if self.peek() == Some(Token::Question) {
            self.pos += 1;
            let a = self.expr()?;
            self.expect(Token::Colon, "':'")?;
            let b = self.expr()?;
            return Ok(Expr::Cond(Box::new(cond), Box::new(a), Box::new(b)));
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let rhs = self.and()?;
            lhs = Expr::Bin(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.cmp()?;
        while self.eat_op(&["&&"]).is_some() {
            let rhs = self.cmp()?;
            lhs = Expr::Bin(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn cmp(&mut self) -> Result<Expr> {
        let lhs = self.add()?;
        let op = match self.eat_op(&["<", "<=", ">", ">=", "==", "===", "!=", "!=="]) {
            Some("<") => BinOp::Lt,
            Some("<=") => BinOp::Le,
            Some(">") => BinOp::Gt,
            Some(">=") => BinOp::Ge,
            Some("==") | Some("===") => BinOp::Eq,
            Some(_) => BinOp::Ne,
            None => return Ok(lhs),
        };
        let rhs = self.add()?;
        Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
    }

    fn add(&mut self) -> Result<Expr> {
        let mut lhs = self.mul()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.mul()?;
            let op = if op == "+" { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn mul(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let rhs = self.unary()?;
            let op = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                _ => BinOp::Rem,
            };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.eat_op(&["-", "+", "!"]) {
            Some("-") => Ok(Expr::Neg(Box::new(self.unary()?))),
            Some("!") => Ok(Expr::Not(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if self.eat_op(&["^", "**"]).is_some() {
            let exp = self.unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Num(n)) => {
                self.pos += 1;
                Ok(Expr::Num(n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let e = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(e)
            }
            Some(Token::Ident(s, e)) => {
                self.pos += 1;
                let raw = &self.src[s..e];
                let name = raw.strip_prefix("Math.").unwrap_or(raw);
                if self.peek() == Some(Token::LParen) {
                    self.pos += 1;
                    let (func, arity) = Func::lookup(name)
                        .ok_or_else(|| self.error(format!("unknown function '{raw}'")))?;
                    let mut args = Vec::with_capacity(arity);
                    if self.peek() != Some(Token::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.peek() == Some(Token::Comma) {
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    if args.len() != arity {
                        return Err(self.error(format!(
                            "'{raw}' takes {arity} argument(s), got {}",
                            args.len()
                        )));
                    }
                    return Ok(Expr::Call(func, args));
                }
                match name {
                    "x" | "v" => Ok(Expr::Value),
                    "t" => Ok(Expr::Time),
                    "PI" | "pi" => Ok(Expr::Num(std::f64::consts::PI)),
                    "E" | "e" => Ok(Expr::Num(std::f64::consts::E)),
                    _ => Err(self.error(format!("unknown identifier '{raw}'"))),
                }
            }
            Some(_) => Err(self.error("unexpected token")),
            None => Err(self.error("unexpected end of formula")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, t: f64, x: f64) -> f64 {
        Formula::parse(src).unwrap().apply(t, x)
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("x*2+1", 0.0, 3.0), 7.0);
        assert_eq!(eval("(x+1)*2", 0.0, 3.0), 8.0);
        assert_eq!(eval("-x^2", 0.0, 3.0), -9.0);
        assert_eq!(eval("2**3", 0.0, 0.0), 8.0);
        assert_eq!(eval("10 % 4", 0.0, 0.0), 2.0);
        assert_eq!(eval("1.5e3", 0.0, 0.0), 1500.0);
        assert_eq!(eval("t - 100", 150.0, 0.0), 50.0);
    }

    #[test]
    fn functions_and_math_prefix() {
        assert!((eval("Math.log(x)", 0.0, std::f64::consts::E) - 1.0).abs() < 1e-12);
        assert_eq!(eval("sqrt(x)", 0.0, 16.0), 4.0);
        assert_eq!(eval("max(x, 2)", 0.0, 1.0), 2.0);
        assert_eq!(eval("Math.round(2.5)", 0.0, 0.0), 3.0);
        assert!((eval("Math.PI", 0.0, 0.0) - std::f64::consts::PI).abs() < 1e-15);
    }

    #[test]
    fn comparisons_and_conditionals() {
        assert_eq!(eval("x > 0 ? x : 0", 0.0, -4.0), 0.0);
        assert_eq!(eval("x > 0 ? x : 0", 0.0, 4.0), 4.0);
        assert_eq!(eval("x >= 1 && x <= 2", 0.0, 1.5), 1.0);
        assert_eq!(eval("x == 3 || !x", 0.0, 0.0), 1.0);
    }

    #[test]
    fn rejects_anything_else() {
        assert!(Formula::parse("alert(1)").is_err());
        assert!(Formula::parse("x = 3").is_err());
        assert!(Formula::parse("window.location").is_err());
        assert!(Formula::parse("x +").is_err());
        assert!(Formula::parse("max(1)").is_err());
        assert!(Formula::parse("x; y").is_err());
    }
}
