//! Error interface for this crate.
//!
//! Every error type in this crate implements [`Error`],
//! which extends [`std::error::Error`] with optional diagnostic information:
//! the span of the input that caused the error, and a help message.
//!
//! The command layer uses these to print a caret under the failing part of an
//! expression and a hint after the error itself.
use std::borrow::Cow;
use std::ops::Range;

pub use crate::expr::lex::LexErr;
pub use crate::expr::EvalErr;
pub use crate::sdb::watch::{PollErr, WpErr};
pub use crate::sdb::SdbErr;
pub use crate::sim::SimErr;

/// A byte range in the source text of an expression.
pub type ErrSpan = Range<usize>;

/// Diagnostic information about an error.
pub trait Error: std::error::Error {
    /// The range of the input associated with this error, if one exists.
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A hint on how to fix this error, if one exists.
    fn help(&self) -> Option<Cow<str>>;
}
