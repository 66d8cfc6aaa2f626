//! Operator table and arithmetic for `#if` expressions.
//!
//! Binary operators are listed from loosest to tightest binding, following C. The conditional
//! operator `?:` binds looser than all of them and groups to the right.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    BitNot,
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

#[derive(Debug, Clone, Copy)]
pub struct BinaryOp {
    pub symbol: &'static str,
    pub operator: BinaryOperator,
    pub precedence: u8,
    pub assoc: Assoc,
}

/// Precedence of `?:`, below every binary operator.
pub const TERNARY_PRECEDENCE: u8 = 0;

const fn op(symbol: &'static str, operator: BinaryOperator, precedence: u8) -> BinaryOp {
    BinaryOp {
        symbol,
        operator,
        precedence,
        assoc: Assoc::Left,
    }
}

pub const BINARY_OPERATORS: &[BinaryOp] = &[
    op("||", BinaryOperator::LogicalOr, 1),
    op("&&", BinaryOperator::LogicalAnd, 2),
    op("|", BinaryOperator::BitOr, 3),
    op("^", BinaryOperator::BitXor, 4),
    op("&", BinaryOperator::BitAnd, 5),
    op("==", BinaryOperator::Equal, 6),
    op("!=", BinaryOperator::NotEqual, 6),
    op("<", BinaryOperator::Less, 7),
    op("<=", BinaryOperator::LessEqual, 7),
    op(">", BinaryOperator::Greater, 7),
    op(">=", BinaryOperator::GreaterEqual, 7),
    op("<<", BinaryOperator::ShiftLeft, 8),
    op(">>", BinaryOperator::ShiftRight, 8),
    op("+", BinaryOperator::Add, 9),
    op("-", BinaryOperator::Subtract, 9),
    op("*", BinaryOperator::Multiply, 10),
    op("/", BinaryOperator::Divide, 10),
    op("%", BinaryOperator::Remainder, 10),
];

static BINARY_LOOKUP: Lazy<HashMap<&'static str, &'static BinaryOp>> =
    Lazy::new(|| BINARY_OPERATORS.iter().map(|op| (op.symbol, op)).collect());

pub fn binary_op(symbol: &str) -> Option<&'static BinaryOp> {
    BINARY_LOOKUP.get(symbol).copied()
}

pub fn unary_op(symbol: &str) -> Option<UnaryOperator> {
    Some(match symbol {
        "-" => UnaryOperator::Negate,
        "+" => UnaryOperator::Plus,
        "~" => UnaryOperator::BitNot,
        "!" => UnaryOperator::LogicalNot,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy)]
pub enum Operation {
    Prefix(UnaryOperator, i64),
    Binary(i64, BinaryOperator, i64),
    Ternary(i64, i64, i64),
}

/// Arithmetic wraps on overflow. Division by zero and out of range shifts are errors.
pub fn apply(operation: Operation) -> Result<i64> {
    use BinaryOperator::*;
    Ok(match operation {
        Operation::Prefix(UnaryOperator::Negate, o) => o.wrapping_neg(),
        Operation::Prefix(UnaryOperator::Plus, o) => o,
        Operation::Prefix(UnaryOperator::BitNot, o) => !o,
        Operation::Prefix(UnaryOperator::LogicalNot, o) => bool_to_int(!int_to_bool(o)),
        Operation::Binary(lhs, operator, rhs) => match operator {
            LogicalOr => bool_to_int(int_to_bool(lhs) || int_to_bool(rhs)),
            LogicalAnd => bool_to_int(int_to_bool(lhs) && int_to_bool(rhs)),
            BitOr => lhs | rhs,
            BitXor => lhs ^ rhs,
            BitAnd => lhs & rhs,
            Equal => bool_to_int(lhs == rhs),
            NotEqual => bool_to_int(lhs != rhs),
            Less => bool_to_int(lhs < rhs),
            LessEqual => bool_to_int(lhs <= rhs),
            Greater => bool_to_int(lhs > rhs),
            GreaterEqual => bool_to_int(lhs >= rhs),
            ShiftLeft => lhs.wrapping_shl(shift_amount(rhs)?),
            ShiftRight => lhs.wrapping_shr(shift_amount(rhs)?),
            Add => lhs.wrapping_add(rhs),
            Subtract => lhs.wrapping_sub(rhs),
            Multiply => lhs.wrapping_mul(rhs),
            Divide => {
                if rhs == 0 {
                    return Err(Error::syntax("Division by zero in conditional expression"));
                }
                lhs.wrapping_div(rhs)
            }
            Remainder => {
                if rhs == 0 {
                    return Err(Error::syntax("Division by zero in conditional expression"));
                }
                lhs.wrapping_rem(rhs)
            }
        },
        Operation::Ternary(condition, then, otherwise) => {
            if int_to_bool(condition) {
                then
            } else {
                otherwise
            }
        }
    })
}

fn shift_amount(rhs: i64) -> Result<u32> {
    match u32::try_from(rhs) {
        Ok(amount) if amount < i64::BITS => Ok(amount),
        _ => Err(Error::syntax(format!(
            "Shift by {rhs} is out of range in conditional expression"
        ))),
    }
}

pub fn bool_to_int(b: bool) -> i64 {
    match b {
        true => 1,
        false => 0,
    }
}

pub fn int_to_bool(i: i64) -> bool {
    i != 0
}

#[cfg(test)]
mod test {
    use super::{apply, binary_op, unary_op, BinaryOperator, Operation, UnaryOperator};
    use test_log::test;

    #[test]
    fn test_lookup() {
        let star = binary_op("*").unwrap();
        let plus = binary_op("+").unwrap();
        assert!(star.precedence > plus.precedence);
        assert!(binary_op("||").unwrap().precedence < binary_op("&&").unwrap().precedence);
        assert!(binary_op("?").is_none());
        assert_eq!(unary_op("!"), Some(UnaryOperator::LogicalNot));
    }

    #[test]
    fn test_apply() {
        assert_eq!(
            apply(Operation::Binary(7, BinaryOperator::Remainder, 3)).unwrap(),
            1
        );
        assert_eq!(
            apply(Operation::Binary(i64::MAX, BinaryOperator::Add, 1)).unwrap(),
            i64::MIN
        );
        assert_eq!(
            apply(Operation::Binary(2, BinaryOperator::LogicalAnd, 5)).unwrap(),
            1
        );
        assert_eq!(apply(Operation::Prefix(UnaryOperator::BitNot, 0)).unwrap(), -1);
        assert_eq!(apply(Operation::Ternary(0, 1, 2)).unwrap(), 2);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(apply(Operation::Binary(1, BinaryOperator::Divide, 0)).is_err());
        assert!(apply(Operation::Binary(1, BinaryOperator::Remainder, 0)).is_err());
        assert!(apply(Operation::Binary(1, BinaryOperator::ShiftLeft, 64)).is_err());
    }
}
