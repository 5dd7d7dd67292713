//! 学习计算器：受限语法的安全表达式求值
//!
//! 只接受数字、`+ - * / % **`、一元正负号、括号，以及 sqrt / abs / round / pow 四个函数；
//! 不解析任何标识符以外的语法，也不执行任意代码。
//! `**` 右结合且优先级高于一元负号（`-2 ** 2 = -4`），`%` 的符号跟随除数。

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tools::{query_from_args, Tool};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token at position {0}")]
    UnexpectedToken(usize),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// 括号、一元符号与 `**` 右侧的最大嵌套层数
const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // 科学计数法：1e3、2.5E-4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CalcError::UnexpectedChar(c, start))?;
                tokens.push((Token::Number(value), start));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((Token::Ident(chars[start..i].iter().collect()), start));
                continue;
            }
            '+' => tokens.push((Token::Plus, start)),
            '-' => tokens.push((Token::Minus, start)),
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    tokens.push((Token::Pow, start));
                    i += 1;
                } else {
                    tokens.push((Token::Star, start));
                }
            }
            '^' => tokens.push((Token::Pow, start)),
            '/' => tokens.push((Token::Slash, start)),
            '%' => tokens.push((Token::Percent, start)),
            '(' => tokens.push((Token::LParen, start)),
            ')' => tokens.push((Token::RParen, start)),
            ',' => tokens.push((Token::Comma, start)),
            other => return Err(CalcError::UnexpectedChar(other, start)),
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(usize::MAX)
    }

    fn expect(&mut self, expected: Token) -> Result<(), CalcError> {
        match self.peek() {
            Some(t) if *t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(CalcError::UnexpectedToken(self.position())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= rhs;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    value = floor_mod(value, rhs)?;
                }
                _ => return Ok(value),
            }
        }
    }

    // unary := ('-' | '+') unary | power
    // 所有递归路径都经过 unary，在此统一限制嵌套深度
    fn unary(&mut self) -> Result<f64, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let value = self.unary_inner();
        self.depth -= 1;
        value
    }

    fn unary_inner(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power := atom ('**' unary)?
    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.atom()?;
        if let Some(Token::Pow) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        let position = self.position();
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.expr()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                        args.push(self.expr()?);
                    }
                }
                self.expect(Token::RParen)?;
                call_function(&name, &args)
            }
            Some(_) => Err(CalcError::UnexpectedToken(position)),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

/// 取模结果与除数同号
fn floor_mod(a: f64, b: f64) -> Result<f64, CalcError> {
    if b == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(a - b * (a / b).floor())
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    let arity = |expected: &'static str| CalcError::Arity {
        name: name.to_string(),
        expected,
        got: args.len(),
    };
    match name {
        "sqrt" => match args {
            [x] => Ok(x.sqrt()),
            _ => Err(arity("1")),
        },
        "abs" => match args {
            [x] => Ok(x.abs()),
            _ => Err(arity("1")),
        },
        "round" => match args {
            [x] => Ok(x.round_ties_even()),
            [x, digits] => {
                let digits = digits.trunc().clamp(-308.0, 308.0) as i32;
                if digits < 0 {
                    let factor = 10f64.powi(-digits);
                    return Ok((x / factor).round_ties_even() * factor);
                }
                let factor = 10f64.powi(digits);
                let scaled = x * factor;
                // 精度超出 f64 可表示范围时原样返回
                if !scaled.is_finite() {
                    return Ok(*x);
                }
                Ok(scaled.round_ties_even() / factor)
            }
            _ => Err(arity("1 or 2")),
        },
        "pow" => match args {
            [x, y] => Ok(x.powf(*y)),
            _ => Err(arity("2")),
        },
        other => Err(CalcError::UnknownFunction(other.to_string())),
    }
}

/// 对表达式求值
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.peek().is_some() {
        return Err(CalcError::UnexpectedToken(parser.position()));
    }
    if !value.is_finite() {
        return Err(CalcError::NonFinite);
    }
    Ok(value)
}

/// 整数结果不带小数点，其余保留 4 位小数
pub fn format_result(value: f64) -> String {
    if value.fract() == 0.0 {
        // 避免输出 -0
        let v = if value == 0.0 { 0.0 } else { value };
        format!("{}", v)
    } else {
        let rounded = (value * 10_000.0).round() / 10_000.0;
        if rounded.fract() == 0.0 {
            // 非整数经舍入后变为整数时仍保留一位小数（0.99999 -> 1.0）
            format!("{:.1}", rounded)
        } else {
            format!("{}", rounded)
        }
    }
}

/// 学习计算器工具
#[derive(Debug, Default)]
pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        Self
    }

    /// 求值并格式化；失败时返回提示文本而非错误，让模型能据此改写表达式
    pub fn calculate(&self, query: &str) -> String {
        let query = query.trim();
        match evaluate(query) {
            Ok(value) => {
                let result = format_result(value);
                tracing::info!(expression = %query, result = %result, "calculator");
                format!("Calculation: {} = {}", query, result)
            }
            Err(e) => {
                tracing::warn!(expression = %query, error = %e, "calculator failed");
                format!(
                    "Error: Unable to calculate '{}'. Please check the expression format.",
                    query
                )
            }
        }
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "educational_calculator"
    }

    fn description(&self) -> &str {
        "Perform mathematical calculations for educational problems and examples. \
         Supports arithmetic operations (+, -, *, /, %, **), square roots (sqrt), absolute values (abs), \
         rounding (round) and powers (pow). Use it to verify solutions and build step-by-step examples. \
         Args: {\"query\": \"2 ** 3 + sqrt(16)\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = query_from_args(&args).ok_or_else(|| "Missing expression".to_string())?;
        Ok(self.calculate(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> f64 {
        evaluate(s).unwrap_or_else(|e| panic!("{s}: {e}"))
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("5 * 10 / 2"), 25.0);
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("-2 ** 2"), -4.0);
        assert_eq!(eval("2 ** -1"), 0.5);
        assert_eq!(eval("--3"), 3.0);
        assert_eq!(eval("1.5e2 + .5"), 150.5);
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        assert_eq!(eval("7 % 3"), 1.0);
        assert_eq!(eval("-7 % 3"), 2.0);
        assert_eq!(eval("7 % -3"), -2.0);
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("sqrt(16) + abs(-3)"), 7.0);
        assert_eq!(eval("pow(2, 10)"), 1024.0);
        assert_eq!(eval("round(2.5)"), 2.0);
        assert_eq!(eval("round(3.14159, 2)"), 3.14);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate(""), Err(CalcError::Empty));
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("1 % 0"), Err(CalcError::DivisionByZero));
        assert!(matches!(evaluate("exp(1)"), Err(CalcError::UnknownFunction(_))));
        assert!(matches!(evaluate("sqrt(1, 2)"), Err(CalcError::Arity { .. })));
        assert!(matches!(evaluate("__import__('os')"), Err(_)));
        assert!(matches!(evaluate("2 +"), Err(CalcError::UnexpectedEnd)));
        assert!(matches!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd)));
        assert!(matches!(evaluate("1 2"), Err(CalcError::UnexpectedToken(_))));
        assert_eq!(evaluate("sqrt(-1)"), Err(CalcError::NonFinite));
    }

    #[test]
    fn test_format_result() {
        assert_eq!(format_result(4.0), "4");
        assert_eq!(format_result(-0.0), "0");
        assert_eq!(format_result(1.0 / 3.0), "0.3333");
        assert_eq!(format_result(2.5), "2.5");
        assert_eq!(format_result(0.99999), "1.0");
    }

    #[test]
    fn test_round_with_extreme_digits() {
        assert_eq!(eval("round(1.5, 400)"), 1.5);
        assert_eq!(eval("round(1234.5, -400)"), 0.0);
        assert_eq!(eval("round(1234.5, -2)"), 1200.0);
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(eval(&ok), 1.0);
        let deep = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert_eq!(evaluate(&deep), Err(CalcError::TooDeep(MAX_DEPTH)));
        let signs = format!("{}1", "-".repeat(5_000));
        assert_eq!(evaluate(&signs), Err(CalcError::TooDeep(MAX_DEPTH)));
    }

    #[tokio::test]
    async fn test_tool_output() {
        let tool = CalculatorTool::new();
        assert_eq!(tool.run("2 + 2").await.unwrap(), "Calculation: 2 + 2 = 4");
        assert_eq!(tool.run(" 10 / 4 ").await.unwrap(), "Calculation: 10 / 4 = 2.5");
        let err = tool.run("2 +* x").await.unwrap();
        assert!(err.starts_with("Error: Unable to calculate '2 +* x'"));

        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let out = tool.run(&deep).await.unwrap();
        assert!(out.starts_with("Error: Unable to calculate '((("));
        assert!(out.ends_with("Please check the expression format."));
    }
}
