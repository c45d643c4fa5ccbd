//! Random expression generation.
//!
//! [`ExprGen`] produces random well-formed expressions over literals
//! alongside the value they should evaluate to.
//! The expected value is computed from the generated syntax tree directly,
//! so it does not depend on the evaluator's precedence handling.
//!
//! These are used to test the evaluator and to write fixture files
//! for the monitor's `test` command (see the `gen-expr` binary).
//!
//! ```
//! use sdb::expr::gen::ExprGen;
//!
//! let mut gen = ExprGen::seeded(2110);
//! let case = gen.generate();
//! println!("{}", case.fixture_line()); // e.g. "21 (3 + 4) * 3"
//! ```
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{SWord, Word};

use super::lex::MAX_TOKENS;

/// A generated expression and its expected value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenExpr {
    /// The source text of the expression.
    pub text: String,
    /// The value the expression should evaluate to.
    pub value: Word,
}
impl GenExpr {
    /// Formats this case as a fixture line (`<expected> <expression>`).
    pub fn fixture_line(&self) -> String {
        format!("{} {}", self.value, self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add, Sub, Mul, Div, Eq, Neq, And
}
impl BinOp {
    const ALL: [BinOp; 7] = [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Eq, BinOp::Neq, BinOp::And];

    fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div => 1,
            BinOp::Add | BinOp::Sub => 2,
            BinOp::Eq  | BinOp::Neq => 3,
            BinOp::And => 4,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq  => "==",
            BinOp::Neq => "!=",
            BinOp::And => "&&",
        }
    }

    /// Applies the operator with host arithmetic, or `None` on division by zero.
    fn apply(self, l: SWord, r: SWord) -> Option<SWord> {
        match self {
            BinOp::Add => Some(l.wrapping_add(r)),
            BinOp::Sub => Some(l.wrapping_sub(r)),
            BinOp::Mul => Some(l.wrapping_mul(r)),
            BinOp::Div => (r != 0).then(|| l.wrapping_div(r)),
            BinOp::Eq  => Some(SWord::from(l == r)),
            BinOp::Neq => Some(SWord::from(l != r)),
            BinOp::And => Some(SWord::from(l != 0 && r != 0)),
        }
    }
}

enum Node {
    Dec(Word),
    Hex(Word),
    Neg(Box<Node>),
    Paren(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
}
impl Node {
    fn value(&self) -> Option<SWord> {
        match self {
            Node::Dec(n) | Node::Hex(n) => Some(*n as SWord),
            Node::Neg(e) => e.value().map(SWord::wrapping_neg),
            Node::Paren(e) => e.value(),
            Node::Bin(op, l, r) => op.apply(l.value()?, r.value()?),
        }
    }

    /// The precedence of the operator at the root of this node
    /// (`None` for nodes which never need parentheses).
    fn precedence(&self) -> Option<u8> {
        match self {
            Node::Bin(op, _, _) => Some(op.precedence()),
            _ => None
        }
    }
}

/// Writes nodes into text, counting the tokens written.
struct Renderer<'r, R> {
    rng: &'r mut R,
    text: String,
    tokens: usize,
}
impl<R: Rng> Renderer<'_, R> {
    fn push(&mut self, token: &str) {
        if !self.text.is_empty() && self.rng.gen_bool(0.5) {
            self.text.push(' ');
        }
        self.text.push_str(token);
        self.tokens += 1;
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Dec(n) => self.push(&n.to_string()),
            Node::Hex(n) => self.push(&format!("0x{n:x}")),
            Node::Neg(e) => {
                self.push("-");
                self.wrapped(e, e.precedence().is_some());
            },
            Node::Paren(e) => self.wrapped(e, true),
            Node::Bin(op, l, r) => {
                let prec = op.precedence();
                // left-associative: only the right side needs parentheses at equal precedence
                self.wrapped(l, l.precedence().is_some_and(|p| p > prec));
                self.push(op.symbol());
                self.wrapped(r, r.precedence().is_some_and(|p| p >= prec));
            },
        }
    }

    fn wrapped(&mut self, node: &Node, parens: bool) {
        if parens { self.push("(") };
        self.node(node);
        if parens { self.push(")") };
    }
}

/// Generator of random expressions.
pub struct ExprGen<R> {
    rng: R,
    max_depth: u32,
}
impl ExprGen<StdRng> {
    /// Creates a generator with a seeded RNG, so that its output is reproducible.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}
impl<R: Rng> ExprGen<R> {
    /// Creates a generator from an RNG.
    pub fn new(rng: R) -> Self {
        Self { rng, max_depth: 4 }
    }

    /// Generates an expression which fits in [`MAX_TOKENS`] tokens
    /// and which does not divide by zero.
    pub fn generate(&mut self) -> GenExpr {
        loop {
            let node = self.node(0);
            let Some(value) = node.value() else { continue };

            let mut renderer = Renderer { rng: &mut self.rng, text: String::new(), tokens: 0 };
            renderer.node(&node);
            if renderer.tokens <= MAX_TOKENS {
                return GenExpr { text: renderer.text, value: value as Word };
            }
        }
    }

    fn literal(&mut self) -> Node {
        let n = match self.rng.gen_ratio(1, 8) {
            true  => self.rng.gen(),
            false => self.rng.gen_range(0..100),
        };
        match self.rng.gen_ratio(1, 4) {
            true  => Node::Hex(n),
            false => Node::Dec(n),
        }
    }

    fn node(&mut self, depth: u32) -> Node {
        if depth >= self.max_depth {
            return self.literal();
        }
        match self.rng.gen_range(0..8) {
            0 | 1 => self.literal(),
            2 => Node::Paren(Box::new(self.node(depth + 1))),
            3 => Node::Neg(Box::new(self.node(depth + 1))),
            _ => {
                let op = BinOp::ALL[self.rng.gen_range(0..BinOp::ALL.len())];
                let l = self.node(depth + 1);
                let r = self.node(depth + 1);
                Node::Bin(op, Box::new(l), Box::new(r))
            }
        }
    }
}
