//! Debugger expressions.
//!
//! Expressions are C-like integer expressions over the state of the simulated machine.
//! They consist of:
//! - decimal (`42`) and hexadecimal (`0x2a`) literals,
//! - registers (`$sp`, `$a0`, `$pc`),
//! - binary `+ - * /`, `==`, `!=`, and `&&`,
//! - unary `-` (negation) and unary `*` (reads a word from memory),
//! - parentheses.
//!
//! All arithmetic wraps at the width of the machine word ([`Word`]).
//!
//! This module consists of:
//! - [`lex`]: converting expression text into tokens
//! - [`eval`]: evaluating tokens
//! - [`gen`]: generating random expressions (with their expected values) for testing
//!
//! The main entry point is [`evaluate`], which does both steps:
//!
//! ```
//! use sdb::expr::{evaluate, EvalContext};
//! use sdb::Word;
//!
//! struct NoMachine;
//! impl EvalContext for NoMachine {
//!     fn reg_value(&self, _name: &str) -> Option<Word> { None }
//!     fn vaddr_read(&self, _addr: Word, _len: usize) -> Option<Word> { None }
//! }
//!
//! assert_eq!(evaluate("(1 + 2) * 3 == 9", &NoMachine), Ok(1));
//! assert_eq!(evaluate("0 - 1", &NoMachine), Ok(u32::MAX));
//! assert!(evaluate("1 / 0", &NoMachine).is_err());
//! ```
pub mod lex;
pub mod eval;
pub mod gen;

use crate::Word;
use lex::LexErr;

/// The machine state an expression can observe.
pub trait EvalContext {
    /// Gets the value of the register with the given name (without the `$` sigil).
    ///
    /// This returns `None` if no such register exists.
    fn reg_value(&self, name: &str) -> Option<Word>;

    /// Reads `len` bytes at the given virtual address as a little-endian word.
    ///
    /// This returns `None` if the address is not mapped.
    fn vaddr_read(&self, addr: Word, len: usize) -> Option<Word>;
}

/// Errors that can occur while evaluating an expression.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EvalErr {
    /// The expression could not be tokenized.
    Lex(LexErr),
    /// An operand was missing (e.g., `1 +`, `()`).
    EmptyRange,
    /// A single token that is not a literal or register was used as an operand.
    NotATerminal,
    /// The register does not exist.
    UnknownRegister(String),
    /// No operator joins the operands (e.g., `1 2`).
    NoDominantOperator,
    /// A unary operator appeared after its operand.
    MisplacedUnaryOperator,
    /// The right side of a division evaluated to zero.
    DivisionByZero,
    /// Parentheses are not balanced.
    UnbalancedParentheses,
    /// A literal does not fit in a machine word.
    LiteralOutOfRange,
    /// A dereference read from an unmapped address.
    BadAddress(Word),
}
impl From<LexErr> for EvalErr {
    fn from(value: LexErr) -> Self {
        Self::Lex(value)
    }
}
impl std::fmt::Display for EvalErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalErr::Lex(e)                 => write!(f, "{e}"),
            EvalErr::EmptyRange             => f.write_str("missing operand"),
            EvalErr::NotATerminal           => f.write_str("operator used as an operand"),
            EvalErr::UnknownRegister(name)  => write!(f, "unknown register ${name}"),
            EvalErr::NoDominantOperator     => f.write_str("missing operator between operands"),
            EvalErr::MisplacedUnaryOperator => f.write_str("unary operator does not precede its operand"),
            EvalErr::DivisionByZero         => f.write_str("division by zero"),
            EvalErr::UnbalancedParentheses  => f.write_str("unbalanced parentheses"),
            EvalErr::LiteralOutOfRange      => f.write_str("literal does not fit in a machine word"),
            EvalErr::BadAddress(addr)       => write!(f, "cannot read memory at address 0x{addr:08x}"),
        }
    }
}
impl std::error::Error for EvalErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalErr::Lex(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for EvalErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        match self {
            EvalErr::Lex(e) => crate::err::Error::span(e),
            _ => None
        }
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            EvalErr::Lex(e)                 => crate::err::Error::help(e),
            EvalErr::EmptyRange             => Some("every operator needs an operand on each side".into()),
            EvalErr::NotATerminal           => None,
            EvalErr::UnknownRegister(_)     => Some("`info r` lists the available registers".into()),
            EvalErr::NoDominantOperator     => Some("operands must be joined by an operator".into()),
            EvalErr::MisplacedUnaryOperator => None,
            EvalErr::DivisionByZero         => None,
            EvalErr::UnbalancedParentheses  => Some("every ( must be closed by a matching )".into()),
            EvalErr::LiteralOutOfRange      => Some(format!("the largest literal is {}", Word::MAX).into()),
            EvalErr::BadAddress(_)          => Some("only mapped memory can be read".into()),
        }
    }
}

/// Evaluates an expression against the given machine state.
///
/// The result is the unsigned representation of the value.
pub fn evaluate(text: &str, ctx: &dyn EvalContext) -> Result<Word, EvalErr> {
    let tokens = lex::tokenize(text)?;
    eval::eval_expr(&tokens, ctx).map(|v| v as Word)
}
