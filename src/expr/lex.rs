//! Tokenizing debugger expressions.
//!
//! This module holds the tokens of the expression language ([`Token`])
//! and the function which produces them ([`tokenize`]).
//!
//! Scanning is done by a [`logos`] lexer over raw lexemes. [`tokenize`] then
//! decides whether each `*` and `-` is a unary or binary operator,
//! based on whether the lexer is currently expecting an operand or an operator:
//!
//! ```
//! use sdb::expr::lex::{tokenize, Token};
//!
//! let tokens = tokenize("-1 - *$sp").unwrap();
//! assert_eq!(tokens, [
//!     Token::Neg,
//!     Token::Dec("1".to_string()),
//!     Token::Sub,
//!     Token::Deref,
//!     Token::Reg("sp".to_string()),
//! ]);
//! ```

use logos::Logos;

/// The maximum number of tokens an expression can consist of.
pub const MAX_TOKENS: usize = 32;
/// The maximum length (in bytes) of a literal's source text.
///
/// Literals are stored in a 32-byte buffer which includes a terminator.
pub const MAX_LITERAL_LEN: usize = 31;

/// The raw units recognized by the scanner, before operators are disambiguated.
#[derive(Debug, Logos, PartialEq, Eq, Clone, Copy)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Lexeme {
    #[regex(r"\$[A-Za-z0-9_]+")]
    Reg,
    #[regex(r"0[xX][0-9A-Fa-f]+")]
    Hex,
    #[regex(r"[0-9]+")]
    Dec,
    #[token("&&")]
    AndAnd,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

/// A unit of a debugger expression.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    /// A decimal literal (e.g., `42`).
    Dec(String),
    /// A hexadecimal literal (e.g., `0x80000000`, stored without the `0x` prefix).
    Hex(String),
    /// A register reference (e.g., `$sp`, holding `sp`).
    Reg(String),

    /// Binary `+`
    Add,
    /// Binary `-`
    Sub,
    /// Binary `*`
    Mul,
    /// Binary `/`
    Div,
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `&&`
    And,

    /// Unary `-`
    Neg,
    /// Unary `*`, which reads a word from memory.
    Deref,

    /// `(`
    LParen,
    /// `)`
    RParen,
}
impl Token {
    /// Whether this token is a terminal (i.e., a literal or register).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Token::Dec(_) | Token::Hex(_) | Token::Reg(_))
    }

    /// Whether this token is a unary operator.
    pub fn is_unary(&self) -> bool {
        matches!(self, Token::Neg | Token::Deref)
    }

    /// The precedence level of this token, if it is an operator.
    ///
    /// Lower levels bind tighter:
    /// - `0`: unary `-`, unary `*`
    /// - `1`: `*`, `/`
    /// - `2`: `+`, `-`
    /// - `3`: `==`, `!=`
    /// - `4`: `&&`
    pub fn precedence(&self) -> Option<u8> {
        match self {
            Token::Neg | Token::Deref => Some(0),
            Token::Mul | Token::Div   => Some(1),
            Token::Add | Token::Sub   => Some(2),
            Token::Eq  | Token::Neq   => Some(3),
            Token::And                => Some(4),
            _ => None
        }
    }
}
impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Dec(s) => f.write_str(s),
            Token::Hex(s) => write!(f, "0x{s}"),
            Token::Reg(s) => write!(f, "${s}"),
            Token::Add    => f.write_str("+"),
            Token::Sub    => f.write_str("-"),
            Token::Mul    => f.write_str("*"),
            Token::Div    => f.write_str("/"),
            Token::Eq     => f.write_str("=="),
            Token::Neq    => f.write_str("!="),
            Token::And    => f.write_str("&&"),
            Token::Neg    => f.write_str("-"),
            Token::Deref  => f.write_str("*"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

/// What the lexer expects to see next.
///
/// A `*` or `-` found where an operand is expected is a unary operator.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Expect {
    Operand,
    Operator,
}
impl Expect {
    /// The state after `token` is accepted.
    fn after(token: &Token) -> Self {
        match token.is_terminal() || *token == Token::RParen {
            true  => Expect::Operator,
            false => Expect::Operand,
        }
    }
}

/// Any errors raised in attempting to tokenize an expression.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LexErr {
    /// No token matches the input at the given byte offset.
    NoMatch(usize),
    /// The expression has more than [`MAX_TOKENS`] tokens.
    TooManyTokens,
    /// A literal is longer than [`MAX_LITERAL_LEN`] bytes.
    LiteralTooLong,
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::NoMatch(pos)   => write!(f, "no match at position {pos}"),
            LexErr::TooManyTokens  => f.write_str("expression has too many tokens"),
            LexErr::LiteralTooLong => f.write_str("literal is too long"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        match *self {
            LexErr::NoMatch(pos) => Some(pos..pos + 1),
            _ => None
        }
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::NoMatch(_)     => Some("expressions consist of numbers, $registers, parentheses, and + - * / == != &&".into()),
            LexErr::TooManyTokens  => Some(format!("expressions are limited to {MAX_TOKENS} tokens").into()),
            LexErr::LiteralTooLong => Some(format!("literals are limited to {MAX_LITERAL_LEN} characters").into()),
        }
    }
}

fn literal(slice: &str) -> Result<&str, LexErr> {
    match slice.len() <= MAX_LITERAL_LEN {
        true  => Ok(slice),
        false => Err(LexErr::LiteralTooLong),
    }
}

/// Converts an expression into its token sequence.
///
/// This fails if part of the input is not a token,
/// if there are more than [`MAX_TOKENS`] tokens,
/// or if a literal is longer than [`MAX_LITERAL_LEN`] bytes.
///
/// Parentheses are not checked for balance here.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexErr> {
    let mut tokens = Vec::new();
    let mut expect = Expect::Operand;
    let mut lexer = Lexeme::lexer(text);

    while let Some(m_lexeme) = lexer.next() {
        let span = lexer.span();
        let Ok(lexeme) = m_lexeme else {
            return Err(LexErr::NoMatch(span.start));
        };
        if tokens.len() >= MAX_TOKENS {
            return Err(LexErr::TooManyTokens);
        }

        let token = match lexeme {
            Lexeme::Reg    => Token::Reg(literal(lexer.slice())?[1..].to_string()),
            Lexeme::Hex    => Token::Hex(literal(lexer.slice())?[2..].to_string()),
            Lexeme::Dec    => Token::Dec(literal(lexer.slice())?.to_string()),
            Lexeme::AndAnd => Token::And,
            Lexeme::EqEq   => Token::Eq,
            Lexeme::BangEq => Token::Neq,
            Lexeme::Plus   => Token::Add,
            Lexeme::Slash  => Token::Div,
            Lexeme::LParen => Token::LParen,
            Lexeme::RParen => Token::RParen,
            Lexeme::Minus  => match expect {
                Expect::Operand  => Token::Neg,
                Expect::Operator => Token::Sub,
            },
            Lexeme::Star   => match expect {
                Expect::Operand  => Token::Deref,
                Expect::Operator => Token::Mul,
            },
        };
        tracing::trace!("match {lexeme:?} at {span:?}: {:?} -> {token}", lexer.slice());

        expect = Expect::after(&token);
        tokens.push(token);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::{tokenize, LexErr, Token, MAX_LITERAL_LEN, MAX_TOKENS};

    fn dec(s: &str) -> Token {
        Token::Dec(s.to_string())
    }
    fn hex(s: &str) -> Token {
        Token::Hex(s.to_string())
    }
    fn reg(s: &str) -> Token {
        Token::Reg(s.to_string())
    }

    #[test]
    fn test_literals() {
        assert_eq!(tokenize("0 123 0x1F 0XaBc $sp $0 $a0"), Ok(vec![
            dec("0"), dec("123"), hex("1F"), hex("aBc"), reg("sp"), reg("0"), reg("a0")
        ]));
        assert_eq!(tokenize(""), Ok(vec![]));
        assert_eq!(tokenize(" \t \n"), Ok(vec![]));
    }

    #[test]
    fn test_punct() {
        assert_eq!(tokenize("1+2/3==4!=5&&(6)"), Ok(vec![
            dec("1"), Token::Add, dec("2"), Token::Div, dec("3"),
            Token::Eq, dec("4"), Token::Neq, dec("5"), Token::And,
            Token::LParen, dec("6"), Token::RParen
        ]));
    }

    #[test]
    fn test_unary_disambiguation() {
        // first token
        assert_eq!(tokenize("-3+4").unwrap()[0], Token::Neg);
        assert_eq!(tokenize("*0x80000000").unwrap()[0], Token::Deref);

        // after a binary operator
        assert_eq!(tokenize("4*-1"), Ok(vec![dec("4"), Token::Mul, Token::Neg, dec("1")]));
        assert_eq!(tokenize("1*2"), Ok(vec![dec("1"), Token::Mul, dec("2")]));
        assert_eq!(tokenize("1 == *$sp"), Ok(vec![dec("1"), Token::Eq, Token::Deref, reg("sp")]));
        assert_eq!(tokenize("1 && -1"), Ok(vec![dec("1"), Token::And, Token::Neg, dec("1")]));

        // after another unary operator (which was itself reclassified)
        assert_eq!(tokenize("--1"), Ok(vec![Token::Neg, Token::Neg, dec("1")]));
        assert_eq!(tokenize("-*$sp"), Ok(vec![Token::Neg, Token::Deref, reg("sp")]));
        assert_eq!(tokenize("**$sp"), Ok(vec![Token::Deref, Token::Deref, reg("sp")]));

        // after parentheses
        assert_eq!(tokenize("(-1)"), Ok(vec![Token::LParen, Token::Neg, dec("1"), Token::RParen]));
        assert_eq!(tokenize("(1)-1"), Ok(vec![Token::LParen, dec("1"), Token::RParen, Token::Sub, dec("1")]));
        assert_eq!(tokenize("(1)*$a0"), Ok(vec![Token::LParen, dec("1"), Token::RParen, Token::Mul, reg("a0")]));

        // after registers
        assert_eq!(tokenize("$t0-1"), Ok(vec![reg("t0"), Token::Sub, dec("1")]));
    }

    #[test]
    fn test_display() {
        let render = |s: &str| -> String {
            tokenize(s).unwrap()
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };

        assert_eq!(render("-1*  *$a0"), "- 1 * * $a0");
        assert_eq!(render("(0x1F!=2)&&3/4==5"), "( 0x1F != 2 ) && 3 / 4 == 5");
        assert_eq!(Token::Neg.to_string(), Token::Sub.to_string());
        assert_eq!(Token::Deref.to_string(), Token::Mul.to_string());
    }

    #[test]
    fn test_no_match() {
        assert_eq!(tokenize("1 % 2"), Err(LexErr::NoMatch(2)));
        assert_eq!(tokenize("&"), Err(LexErr::NoMatch(0)));
        assert_eq!(tokenize("1 = 1"), Err(LexErr::NoMatch(2)));
        assert_eq!(tokenize("!1"), Err(LexErr::NoMatch(0)));
        assert_eq!(tokenize("$"), Err(LexErr::NoMatch(0)));
        assert_eq!(tokenize("sp"), Err(LexErr::NoMatch(0)));
        // `0x` without digits is the decimal `0` followed by garbage
        assert_eq!(tokenize("0x"), Err(LexErr::NoMatch(1)));
    }

    #[test]
    fn test_capacity() {
        let exact = vec!["1"; MAX_TOKENS / 2 + 1].join("+");
        assert_eq!(tokenize(&exact[..exact.len() - 2]).map(|t| t.len()), Ok(MAX_TOKENS - 1));
        let exact = format!("({})", vec!["1"; MAX_TOKENS / 2 - 1].join("+"));
        assert_eq!(tokenize(&exact).map(|t| t.len()), Ok(MAX_TOKENS - 1));
        let exact = format!("-({})", vec!["1"; MAX_TOKENS / 2 - 1].join("+"));
        assert_eq!(tokenize(&exact).map(|t| t.len()), Ok(MAX_TOKENS));

        let over = vec!["1"; MAX_TOKENS / 2 + 1].join("+");
        assert_eq!(tokenize(&over), Err(LexErr::TooManyTokens));
    }

    #[test]
    fn test_literal_length() {
        let ok = "9".repeat(MAX_LITERAL_LEN);
        assert_eq!(tokenize(&ok), Ok(vec![dec(&ok)]));
        assert_eq!(tokenize(&"9".repeat(MAX_LITERAL_LEN + 1)), Err(LexErr::LiteralTooLong));

        let ok = format!("0x{}", "f".repeat(MAX_LITERAL_LEN - 2));
        assert_eq!(tokenize(&ok).map(|t| t.len()), Ok(1));
        let long = format!("0x{}", "f".repeat(MAX_LITERAL_LEN - 1));
        assert_eq!(tokenize(&long), Err(LexErr::LiteralTooLong));

        let long = format!("${}", "a".repeat(MAX_LITERAL_LEN));
        assert_eq!(tokenize(&long), Err(LexErr::LiteralTooLong));
    }
}
