//! Tokenizer and precedence-climbing parser for expression source
//!
//! Precedence, lowest first:
//! `?:` < `or` < `and` < comparison < `+ -` < `* / %` < unary < `^` < postfix.
//! `^` is right-associative and binds tighter than unary minus, so `-2^2 == -4`.

use crate::expr::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use crate::{Error, Result};

/// Deepest expression tree the parser will build
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Question,
    Colon,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Ident(name) => format!("'{}'", name),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
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
            let text = &source[start..i];
            let number = text
                .parse::<f64>()
                .map_err(|_| Error::syntax(start, format!("invalid number '{}'", text)))?;
            tokens.push((start, Token::Number(number)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(source[start..i].to_string())));
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (token, width) = match (c, next) {
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'!', Some(b'=')) => (Token::NotEq, 2),
            (b'&', Some(b'&')) => (Token::AndAnd, 2),
            (b'|', Some(b'|')) => (Token::OrOr, 2),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'%', _) => (Token::Percent, 1),
            (b'^', _) => (Token::Caret, 1),
            (b'!', _) => (Token::Bang, 1),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b'[', _) => (Token::LBracket, 1),
            (b']', _) => (Token::RBracket, 1),
            (b',', _) => (Token::Comma, 1),
            (b'?', _) => (Token::Question, 1),
            (b':', _) => (Token::Colon, 1),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(Error::syntax(start, format!("unexpected character '{}'", ch)));
            }
        };
        tokens.push((start, token));
        i += width;
    }

    tokens.push((source.len(), Token::Eof));
    Ok(tokens)
}

/// Parse expression source into an AST
pub(crate) fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.peek() == &Token::Eof {
        return Err(Error::syntax(0, "empty expression"));
    }
    let expr = parser.conditional()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(Error::syntax(
            parser.offset(),
            format!("unexpected {}", other.describe()),
        )),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    /// Levels of nesting above the node being parsed
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == word)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.peek() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(Error::syntax(
                self.offset(),
                format!(
                    "expected {}, found {}",
                    expected.describe(),
                    self.peek().describe()
                ),
            ))
        }
    }

    /// Count one more level of nesting
    ///
    /// Callers put `self.depth` back once the nested node is built, so the
    /// counter bounds both the tree depth and the parser's own recursion.
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::syntax(
                self.offset(),
                format!("expression nested deeper than {} levels", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn conditional(&mut self) -> Result<Expr> {
        let depth = self.depth;
        self.descend()?;
        let condition = self.or()?;
        if self.peek() != &Token::Question {
            self.depth = depth;
            return Ok(condition);
        }
        self.advance();
        let then_branch = self.conditional()?;
        self.expect(Token::Colon)?;
        let else_branch = self.conditional()?;
        self.depth = depth;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then_branch),
            Box::new(else_branch),
        ))
    }

    fn or(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut lhs = self.and()?;
        while self.peek() == &Token::OrOr || self.is_keyword("or") {
            self.advance();
            self.descend()?;
            let rhs = self.and()?;
            lhs = Expr::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut lhs = self.comparison()?;
        while self.peek() == &Token::AndAnd || self.is_keyword("and") {
            self.advance();
            self.descend()?;
            let rhs = self.comparison()?;
            lhs = Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => CompareOp::Lt,
                Token::Le => CompareOp::Le,
                Token::Gt => CompareOp::Gt,
                Token::Ge => CompareOp::Ge,
                Token::EqEq => CompareOp::Eq,
                Token::NotEq => CompareOp::Ne,
                _ => {
                    self.depth = depth;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.descend()?;
            let rhs = self.additive()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => {
                    self.depth = depth;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.descend()?;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => {
                    self.depth = depth;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.descend()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            Token::Ident(name) if name == "not" => UnaryOp::Not,
            _ => return self.power(),
        };
        self.advance();
        let depth = self.depth;
        self.descend()?;
        let operand = self.unary()?;
        self.depth = depth;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.peek() != &Token::Caret {
            return Ok(base);
        }
        self.advance();
        // right-assoc; the exponent may carry its own sign (`2^-1`)
        let depth = self.depth;
        self.descend()?;
        let exponent = self.unary()?;
        self.depth = depth;
        Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut expr = self.primary()?;
        while self.peek() == &Token::LBracket {
            self.advance();
            self.descend()?;
            let index = self.conditional()?;
            self.expect(Token::RBracket)?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        self.depth = depth;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "and" | "or" | "not" => Err(Error::syntax(
                    offset,
                    format!("unexpected keyword '{}'", name),
                )),
                _ if self.peek() == &Token::LParen => {
                    self.advance();
                    let args = self.arguments(Token::RParen)?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Symbol(name)),
            },
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = self.arguments(Token::RBracket)?;
                if items.len() != 2 {
                    return Err(Error::syntax(
                        offset,
                        format!("vector literal needs 2 components, found {}", items.len()),
                    ));
                }
                let y = items.pop();
                let x = items.pop();
                match (x, y) {
                    (Some(x), Some(y)) => Ok(Expr::VectorLit(Box::new(x), Box::new(y))),
                    _ => Err(Error::syntax(offset, "malformed vector literal")),
                }
            }
            other => Err(Error::syntax(
                offset,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == &close {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                t if t == &close => {
                    self.advance();
                    return Ok(args);
                }
                other => {
                    return Err(Error::syntax(
                        self.offset(),
                        format!("expected ',' or {}, found {}", close.describe(), other.describe()),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Box<Expr> {
        Box::new(Expr::Symbol(name.to_string()))
    }

    #[test]
    fn test_tokenize_numbers() {
        let tokens = tokenize("1.5e3 + .25 - 2E-2").unwrap();
        let numbers: Vec<f64> = tokens
            .iter()
            .filter_map(|(_, t)| match t {
                Token::Number(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![1500.0, 0.25, 0.02]);
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                sym("a"),
                Box::new(Expr::Binary(BinaryOp::Mul, sym("b"), sym("c")))
            )
        );
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        let expr = parse("-a^b").unwrap();
        assert_eq!(
            expr,
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Binary(BinaryOp::Pow, sym("a"), sym("b")))
            )
        );
    }

    #[test]
    fn test_calls_vectors_and_index() {
        let expr = parse("norm([x, 2])[1]").unwrap();
        assert!(matches!(expr, Expr::Index(..)));

        let expr = parse("max(1, 2, 3)").unwrap();
        assert!(matches!(expr, Expr::Call(ref name, ref args) if name == "max" && args.len() == 3));
    }

    #[test]
    fn test_keywords() {
        let expr = parse("not a and b or c").unwrap();
        assert!(matches!(expr, Expr::Logical(LogicalOp::Or, ..)));
        assert_eq!(parse("true").unwrap(), Expr::Bool(true));
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["", "1 +", "(1", "[1, 2, 3]", "a $ b", "f(1,", "1 2", "a ? b"] {
            let err = parse(source).unwrap_err();
            assert!(err.is_syntax_error(), "{} should fail to parse", source);
        }
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let n = 200_000;
        let sources = [
            format!("{}1{}", "(".repeat(n), ")".repeat(n)),
            format!("{}1", "-".repeat(n)),
            format!("{}1{}", "[1, ".repeat(n), "]".repeat(n)),
            format!("{}1", "1 + ".repeat(n)),
            format!("{}1", "2 ^ ".repeat(n)),
            format!("a{}", "[0]".repeat(n)),
            format!("{}1", "c ? 1 : ".repeat(n)),
        ];
        for source in &sources {
            let err = parse(source).unwrap_err();
            assert!(err.is_syntax_error(), "{:?}", err);
        }
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let source = format!("{}x{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse(&source).unwrap(), Expr::Symbol("x".into()));
        assert!(parse(&format!("{}1", "-".repeat(50))).is_ok());
        assert!(parse(&format!("{}1", "1 + ".repeat(100))).is_ok());
    }
}
