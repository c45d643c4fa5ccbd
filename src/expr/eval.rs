//! Evaluating token sequences.
//!
//! No syntax tree is built. Instead, a token range is evaluated by finding its
//! *dominant operator* (the operator applied last), splitting the range there,
//! and evaluating each side recursively.
//!
//! The dominant operator of a range is the depth-zero operator with the loosest precedence.
//! Among binary operators of the same precedence, the rightmost one is dominant
//! (so `10 - 3 - 2` splits at the second `-`, making binary operators left-associative).
//! Among unary operators, the leftmost one is dominant.
use crate::{SWord, Word};

use super::lex::Token;
use super::{EvalContext, EvalErr};

/// Evaluates a full token sequence.
///
/// Unlike [`eval`], this verifies that the parentheses of the sequence are balanced.
pub fn eval_expr(tokens: &[Token], ctx: &dyn EvalContext) -> Result<SWord, EvalErr> {
    check_balanced(tokens)?;
    eval(tokens, ctx)
}

/// Evaluates a range of tokens.
///
/// The range is expected to be part of a balanced token sequence
/// (see [`eval_expr`]).
pub fn eval(tokens: &[Token], ctx: &dyn EvalContext) -> Result<SWord, EvalErr> {
    match tokens {
        [] => Err(EvalErr::EmptyRange),
        [token] => eval_terminal(token, ctx),
        [Token::LParen, inner @ .., Token::RParen] if is_enclosed(tokens) => eval(inner, ctx),
        _ => {
            let op = dominant_operator(tokens)?;
            let (lhs, op_token, rhs) = (&tokens[..op], &tokens[op], &tokens[op + 1..]);

            if op_token.is_unary() {
                if op != 0 {
                    return Err(EvalErr::MisplacedUnaryOperator);
                }
                let operand = eval(rhs, ctx)?;
                return match op_token {
                    Token::Neg => Ok(operand.wrapping_neg()),
                    Token::Deref => {
                        let addr = operand as Word;
                        ctx.vaddr_read(addr, 4)
                            .map(|v| v as SWord)
                            .ok_or(EvalErr::BadAddress(addr))
                    },
                    _ => unreachable!("{op_token} should be a unary operator"),
                };
            }

            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            match op_token {
                Token::Add => Ok(l.wrapping_add(r)),
                Token::Sub => Ok(l.wrapping_sub(r)),
                Token::Mul => Ok(l.wrapping_mul(r)),
                Token::Div => match r {
                    0 => Err(EvalErr::DivisionByZero),
                    _ => Ok(l.wrapping_div(r)),
                },
                Token::Eq  => Ok(SWord::from(l == r)),
                Token::Neq => Ok(SWord::from(l != r)),
                Token::And => Ok(SWord::from(l != 0 && r != 0)),
                _ => unreachable!("{op_token} should be a binary operator"),
            }
        }
    }
}

fn eval_terminal(token: &Token, ctx: &dyn EvalContext) -> Result<SWord, EvalErr> {
    let value = match token {
        Token::Dec(lit) => Word::from_str_radix(lit, 10).map_err(|_| EvalErr::LiteralOutOfRange)?,
        Token::Hex(lit) => Word::from_str_radix(lit, 16).map_err(|_| EvalErr::LiteralOutOfRange)?,
        Token::Reg(name) => ctx.reg_value(name).ok_or_else(|| EvalErr::UnknownRegister(name.clone()))?,
        _ => return Err(EvalErr::NotATerminal),
    };

    Ok(value as SWord)
}

fn check_balanced(tokens: &[Token]) -> Result<(), EvalErr> {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.checked_sub(1).ok_or(EvalErr::UnbalancedParentheses)?,
            _ => {}
        }
    }

    match depth {
        0 => Ok(()),
        _ => Err(EvalErr::UnbalancedParentheses),
    }
}

/// Checks whether the first and last tokens of the range are a matching pair of parentheses.
///
/// `(1) + (2)` starts and ends with parentheses but is not enclosed.
fn is_enclosed(tokens: &[Token]) -> bool {
    let [Token::LParen, .., Token::RParen] = tokens else { return false };

    let last = tokens.len() - 1;
    let mut depth = 0isize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            _ => {}
        }
        if depth <= 0 && i < last {
            return false;
        }
    }
    depth == 0
}

/// Finds the index of the dominant operator of the range.
fn dominant_operator(tokens: &[Token]) -> Result<usize, EvalErr> {
    let mut depth = 0isize;
    // (index, precedence)
    let mut best: Option<(usize, u8)> = None;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            _ if depth != 0 => {},
            _ => if let Some(level) = token.precedence() {
                // unary: keep the first, binary: keep the last of the loosest level
                let replace = match best {
                    None => true,
                    Some((_, best_level)) => level != 0 && level >= best_level,
                };
                if replace {
                    best = Some((i, level));
                }
            }
        }
    }

    best.map(|(i, _)| i).ok_or(EvalErr::NoDominantOperator)
}
