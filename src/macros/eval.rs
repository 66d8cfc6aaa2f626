//! Evaluation of `#if` conditions.
//!
//! The token stream is first reduced to numbers, operator symbols and macro uses: `defined`
//! checks are answered and unknown identifiers become `0`. The reduced stream is then parsed by
//! precedence climbing over the table in [`crate::precedence`]. A macro use is only expanded and
//! evaluated as a nested expression once the parser knows its value is needed.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::macros::MacroDefinition;
use crate::parser::MAX_PAREN_DEPTH;
use crate::precedence::{
    apply, binary_op, bool_to_int, int_to_bool, unary_op, Assoc, BinaryOperator, Operation,
    TERNARY_PRECEDENCE,
};
use crate::state::State;

/// Maximum nesting of macro expansions inside a single condition.
pub const MAX_EVALUATION_DEPTH: usize = 64;

#[derive(Debug, Clone)]
enum Operand {
    Number(i64),
    Symbol(String),
    Macro(MacroUse),
}

/// A macro named in a condition, with the argument tokens of a call.
#[derive(Debug, Clone)]
struct MacroUse {
    definition: Rc<MacroDefinition>,
    args: Option<Vec<Vec<Token>>>,
    line: usize,
}

/// Evaluate the tokens following `#if`.
pub fn evaluate_condition(tokens: &[Token], state: &State) -> Result<i64> {
    evaluate(tokens, state, 0, 0)
}

/// `depth` counts macro expansions, `nesting` the parentheses and operators already open in
/// the expressions that contain this one.
fn evaluate(tokens: &[Token], state: &State, depth: usize, nesting: usize) -> Result<i64> {
    if depth > MAX_EVALUATION_DEPTH {
        return Err(Error::syntax(format!(
            "Macro expansion in conditional exceeded the maximum depth of {MAX_EVALUATION_DEPTH}"
        )));
    }
    let operands = reduce(tokens, state)?;
    log::trace!("evaluate(): depth {depth} operands {operands:?}");
    if operands.is_empty() {
        return Err(Error::syntax("Empty conditional expression"));
    }

    let mut parser = ExpressionParser {
        operands: &operands,
        position: 0,
        state,
        depth,
        nesting,
    };
    let value = parser.expression(TERNARY_PRECEDENCE, true)?;
    match parser.peek() {
        None => Ok(value),
        Some(operand) => Err(unexpected(operand)),
    }
}

fn reduce(tokens: &[Token], state: &State) -> Result<Vec<Operand>> {
    let significant: Vec<&Token> = tokens.iter().filter(|t| !t.is_blank()).collect();
    let mut operands = Vec::with_capacity(significant.len());
    let mut i = 0;
    while i < significant.len() {
        let token = significant[i];
        i += 1;
        let operand = match token.kind {
            TokenKind::IntLiteral => Operand::Number(token.text.parse().map_err(|_| {
                Error::syntax(format!(
                    "Line {}: integer constant {} is too large",
                    token.line, token.text
                ))
            })?),
            TokenKind::CharLiteral => Operand::Number(char_value(token)?),
            TokenKind::TwoCharOperator | TokenKind::Punctuation => {
                Operand::Symbol(token.text.clone())
            }
            TokenKind::Defined => {
                let (name, consumed) = defined_operand(token, &significant[i..])?;
                i += consumed;
                Operand::Number(bool_to_int(state.is_defined(name)))
            }
            TokenKind::Identifier => match state.lookup(&token.text) {
                Some(definition) if definition.is_function_like() => {
                    if !significant.get(i).is_some_and(|t| t.is_punctuation("(")) {
                        // not a call, so just an unknown name
                        operands.push(Operand::Number(0));
                        continue;
                    }
                    let (args, consumed) = call_arguments(token, &significant[i..])?;
                    i += consumed;
                    let args: Vec<Vec<Token>> = args
                        .iter()
                        .map(|arg| arg.iter().map(|&t| t.clone()).collect())
                        .collect();
                    Operand::Macro(MacroUse {
                        definition,
                        args: Some(args),
                        line: token.line,
                    })
                }
                Some(definition) => Operand::Macro(MacroUse {
                    definition,
                    args: None,
                    line: token.line,
                }),
                None => match token.text.as_str() {
                    "true" => Operand::Number(1),
                    _ => Operand::Number(0),
                },
            },
            TokenKind::PreprocessingNumber => {
                return Err(Error::syntax(format!(
                    "Line {}: {} is not an integer constant",
                    token.line, token.text
                )))
            }
            TokenKind::StringLiteral
            | TokenKind::SystemIncludeLiteral
            | TokenKind::Keyword(_)
            | TokenKind::Whitespace
            | TokenKind::Newline => {
                return Err(Error::syntax(format!(
                    "Line {}: {} is not valid in a conditional expression",
                    token.line, token.text
                )))
            }
        };
        operands.push(operand);
    }
    Ok(operands)
}

/// `defined NAME` or `defined(NAME)`. Returns the name and how many tokens it used.
fn defined_operand<'t>(token: &Token, rest: &[&'t Token]) -> Result<(&'t str, usize)> {
    let missing = || {
        Error::syntax(format!(
            "Line {}: defined must be followed by a macro name",
            token.line
        ))
    };
    match rest {
        [name, ..] if name.kind == TokenKind::Identifier => Ok((name.text.as_str(), 1)),
        [open, name, close, ..]
            if open.is_punctuation("(")
                && name.kind == TokenKind::Identifier
                && close.is_punctuation(")") =>
        {
            Ok((name.text.as_str(), 3))
        }
        _ => Err(missing()),
    }
}

/// Split a call's argument list, starting at its `(`, at top-level commas. Returns the
/// arguments and how many tokens the list used, parentheses included.
fn call_arguments<'a, 't>(
    token: &Token,
    rest: &'a [&'t Token],
) -> Result<(Vec<&'a [&'t Token]>, usize)> {
    let mut args = Vec::new();
    let mut level = 0usize;
    let mut start = 1;
    for (i, t) in rest.iter().enumerate() {
        if t.is_punctuation("(") {
            level += 1;
        } else if t.is_punctuation(")") {
            level -= 1;
            if level == 0 {
                if i > start || !args.is_empty() {
                    args.push(&rest[start..i]);
                }
                return Ok((args, i + 1));
            }
        } else if level == 1 && t.is_punctuation(",") {
            args.push(&rest[start..i]);
            start = i + 1;
        }
    }
    Err(Error::syntax(format!(
        "Line {}: unterminated argument list for {}",
        token.line, token.text
    )))
}

fn char_value(token: &Token) -> Result<i64> {
    let inner = token
        .text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or_default();
    let mut chars = inner.chars();
    let value = match (chars.next(), chars.next()) {
        (Some('\\'), Some(escaped)) => match escaped {
            'n' => '\n',
            't' => '\t',
            '0' => '\0',
            other => other,
        },
        (Some(c), None) => c,
        _ => {
            return Err(Error::syntax(format!(
                "Line {}: invalid character constant {}",
                token.line, token.text
            )))
        }
    };
    Ok(i64::from(u32::from(value)))
}

fn unexpected(operand: &Operand) -> Error {
    match operand {
        Operand::Number(n) => Error::syntax(format!(
            "Unexpected number {n} in conditional expression"
        )),
        Operand::Symbol(s) => Error::syntax(format!("Unexpected {s} in conditional expression")),
        Operand::Macro(m) => Error::syntax(format!(
            "Unexpected {} in conditional expression",
            m.definition.name
        )),
    }
}

struct ExpressionParser<'a> {
    operands: &'a [Operand],
    position: usize,
    state: &'a State,
    depth: usize,
    nesting: usize,
}

impl<'a> ExpressionParser<'a> {
    fn peek(&self) -> Option<&'a Operand> {
        self.operands.get(self.position)
    }

    fn peek_symbol(&self) -> Option<&'a str> {
        match self.peek() {
            Some(Operand::Symbol(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<&'a Operand> {
        let operand = self.operands.get(self.position);
        self.position += 1;
        operand
    }

    fn expect(&mut self, symbol: &str) -> Result<()> {
        match self.next() {
            Some(Operand::Symbol(s)) if s == symbol => Ok(()),
            Some(other) => Err(unexpected(other)),
            None => Err(Error::syntax(format!(
                "Expected {symbol} before the end of the conditional expression"
            ))),
        }
    }

    /// Run `parse` one level deeper, failing once [`MAX_PAREN_DEPTH`] levels are open.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting >= MAX_PAREN_DEPTH {
            return Err(Error::syntax(format!(
                "Conditional expression is nested more than {MAX_PAREN_DEPTH} levels deep"
            )));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn expression(&mut self, min_precedence: u8, live: bool) -> Result<i64> {
        self.nested(|parser| parser.binary(min_precedence, live))
    }

    /// Operators are applied and macros evaluated only when `live`, so the untaken side of
    /// `&&`, `||` and `?:` cannot fail on division by zero.
    fn binary(&mut self, min_precedence: u8, live: bool) -> Result<i64> {
        let mut lhs = self.unary(live)?;
        while let Some(symbol) = self.peek_symbol() {
            if symbol == "?" {
                if min_precedence > TERNARY_PRECEDENCE {
                    break;
                }
                self.position += 1;
                let taken = int_to_bool(lhs);
                let then = self.expression(TERNARY_PRECEDENCE, live && taken)?;
                self.expect(":")?;
                let otherwise = self.expression(TERNARY_PRECEDENCE, live && !taken)?;
                lhs = apply(Operation::Ternary(lhs, then, otherwise))?;
                continue;
            }

            let Some(op) = binary_op(symbol) else {
                break;
            };
            if op.precedence < min_precedence {
                break;
            }
            self.position += 1;
            let rhs_live = match op.operator {
                BinaryOperator::LogicalAnd => live && int_to_bool(lhs),
                BinaryOperator::LogicalOr => live && !int_to_bool(lhs),
                _ => live,
            };
            let next_precedence = match op.assoc {
                Assoc::Left => op.precedence + 1,
                Assoc::Right => op.precedence,
            };
            let rhs = self.expression(next_precedence, rhs_live)?;
            lhs = if rhs_live {
                apply(Operation::Binary(lhs, op.operator, rhs))?
            } else if live {
                // short circuit: the result only depends on `lhs`
                bool_to_int(int_to_bool(lhs))
            } else {
                0
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self, live: bool) -> Result<i64> {
        match self.next() {
            Some(Operand::Number(n)) => Ok(*n),
            Some(Operand::Macro(m)) if live => self.macro_value(m),
            Some(Operand::Macro(_)) => Ok(0),
            Some(Operand::Symbol(s)) if s == "(" => {
                let value = self.expression(TERNARY_PRECEDENCE, live)?;
                self.expect(")")?;
                Ok(value)
            }
            Some(Operand::Symbol(s)) => match unary_op(s) {
                Some(operator) => {
                    let operand = self.nested(|parser| parser.unary(live))?;
                    apply(Operation::Prefix(operator, operand))
                }
                None => Err(Error::syntax(format!(
                    "Unexpected {s} in conditional expression"
                ))),
            },
            None => Err(Error::syntax("Unexpected end of conditional expression")),
        }
    }

    fn macro_value(&self, m: &MacroUse) -> Result<i64> {
        let text = match &m.args {
            Some(args) => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg).map(|v| v.to_string()))
                    .collect::<Result<Vec<_>>>()?;
                m.definition.expand(Some(&values))?
            }
            None => m.definition.expansion.clone(),
        };
        self.evaluate(&tokenize(&text, m.line)?)
    }

    fn evaluate(&self, tokens: &[Token]) -> Result<i64> {
        evaluate(tokens, self.state, self.depth + 1, self.nesting)
    }
}
