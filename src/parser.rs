//! Builds the [`Node`] tree for a chunk of input.
//!
//! The input is split into statements at newlines. A statement whose first significant token is
//! a `#keyword` is a directive; anything else is code. Conditional directives update the
//! [`State`]'s conditional stack as they are parsed, so that the driver knows whether the
//! statements that follow should be rendered.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::macros::eval::evaluate_condition;
use crate::macros::{MacroDefinition, MacroName};
use crate::node::{LiteralKind, Node};
use crate::state::State;

/// How deeply parentheses may nest within one line.
pub const MAX_PAREN_DEPTH: usize = 256;

pub fn parse(input: &str, state: &mut State) -> Result<Node> {
    let tokens = tokenize(input, state.line_number)?;
    let mut nodes = Vec::new();
    for statement in tokens.split_inclusive(|t| t.kind == TokenKind::Newline) {
        let (body, newline) = match statement.split_last() {
            Some((last, body)) if last.kind == TokenKind::Newline => (body, true),
            _ => (statement, false),
        };
        if !body.is_empty() {
            nodes.push(parse_statement(body, state)?);
        }
        if newline {
            nodes.push(Node::Newline);
        }
    }
    let tree = Node::Lines(nodes);
    log::debug!("parse(): {tree:?}");
    Ok(tree)
}

fn parse_statement(tokens: &[Token], state: &mut State) -> Result<Node> {
    let start = tokens
        .iter()
        .position(|t| t.kind != TokenKind::Whitespace)
        .unwrap_or(tokens.len());
    match tokens.get(start) {
        Some(Token {
            kind: TokenKind::Keyword(keyword),
            line,
            ..
        }) => {
            let directive = Directive {
                keyword: *keyword,
                line: *line,
                cursor: Cursor {
                    tokens: &tokens[start + 1..],
                    position: 0,
                },
            };
            directive.parse(state)
        }
        _ => Ok(Node::Lines(parse_code(tokens)?)),
    }
}

fn syntax_error(line: usize, message: impl std::fmt::Display) -> Error {
    Error::syntax(format!("Line {line}: {message}"))
}

struct Cursor<'t> {
    tokens: &'t [Token],
    position: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.position);
        self.position += 1;
        token
    }

    /// Returns whether any whitespace was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let before = self.position;
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Whitespace)
        {
            self.position += 1;
        }
        self.position != before
    }

    fn rest(&self) -> &'t [Token] {
        &self.tokens[self.position.min(self.tokens.len())..]
    }
}

struct Directive<'t> {
    keyword: Keyword,
    line: usize,
    cursor: Cursor<'t>,
}

impl<'t> Directive<'t> {
    fn error(&self, message: impl std::fmt::Display) -> Error {
        syntax_error(self.line, format_args!("#{} {message}", self.keyword.as_str()))
    }

    /// Nothing but whitespace may follow.
    fn expect_end(&mut self) -> Result<()> {
        self.cursor.skip_whitespace();
        match self.cursor.next() {
            None => Ok(()),
            Some(token) => Err(self.error(format_args!("has unexpected {:?}", token.text))),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'t Token> {
        self.cursor.skip_whitespace();
        match self.cursor.next() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(self.error(format_args!("expects {what}, found {:?}", token.text))),
            None => Err(self.error(format_args!("expects {what}"))),
        }
    }

    fn expect_name(&mut self) -> Result<&'t Token> {
        let token = self.expect(TokenKind::Identifier, "a macro name")?;
        if token.is_variadic() {
            return Err(self.error(format_args!("expects a macro name, found {:?}", token.text)));
        }
        Ok(token)
    }

    fn parse(mut self, state: &mut State) -> Result<Node> {
        match self.keyword {
            Keyword::Include => self.include(),
            Keyword::Define => self.define(),
            Keyword::Ifdef | Keyword::Ifndef => self.ifdef(state),
            Keyword::If => self.if_expression(state),
            Keyword::Else => {
                self.expect_end()?;
                state
                    .conditionals
                    .flip_top()
                    .map_err(|e| syntax_error(self.line, e))?;
                Ok(Node::Comment("// else expression ".to_owned()))
            }
            Keyword::Endif => {
                self.expect_end()?;
                state
                    .conditionals
                    .pop_frame()
                    .map_err(|e| syntax_error(self.line, e))?;
                Ok(Node::Comment("// endif expression ".to_owned()))
            }
            Keyword::Error | Keyword::Warning => self.diagnostic(state),
            Keyword::Pragma => self.pragma(),
            Keyword::Py => Err(self.error("directives are not supported")),
        }
    }

    fn include(&mut self) -> Result<Node> {
        self.cursor.skip_whitespace();
        let (target, system) = match self.cursor.next() {
            Some(token) if token.kind == TokenKind::StringLiteral => (unquote(&token.text), false),
            Some(token) if token.kind == TokenKind::SystemIncludeLiteral => {
                (unquote(&token.text), true)
            }
            _ => return Err(self.error("expects \"FILENAME\" or <FILENAME>")),
        };
        self.expect_end()?;
        Ok(Node::Include {
            target: target.to_owned(),
            system,
            line: self.line,
        })
    }

    fn define(&mut self) -> Result<Node> {
        let name = self.expect_name()?;
        let name = MacroName::try_from_str(&name.text)?;

        // Only `NAME(` with no space in between starts a parameter list.
        let params = match self.cursor.peek() {
            Some(token) if token.is_punctuation("(") => {
                self.cursor.next();
                Some(self.parameters()?)
            }
            _ => None,
        };

        self.cursor.skip_whitespace();
        let mut body = self.cursor.rest();
        while let Some((last, rest)) = body.split_last() {
            if last.kind != TokenKind::Whitespace {
                break;
            }
            body = rest;
        }

        let body = if body.is_empty() && params.is_none() {
            vec![Node::identifier("true")]
        } else {
            parse_code(body)?
        };
        let definition =
            MacroDefinition::new(name, body, params).map_err(|e| syntax_error(self.line, e))?;
        Ok(Node::Define(Rc::new(definition)))
    }

    /// Parameters after the opening parenthesis, as written. A variadic parameter keeps its
    /// `...`.
    fn parameters(&mut self) -> Result<Vec<String>> {
        let mut params = Vec::new();
        loop {
            self.cursor.skip_whitespace();
            match self.cursor.next() {
                Some(token) if token.is_punctuation(")") && params.is_empty() => break,
                Some(token) if token.kind == TokenKind::Identifier => {
                    params.push(token.text.clone())
                }
                Some(token) if token.is_punctuation(".") => {
                    for _ in 0..2 {
                        if !self.cursor.next().is_some_and(|t| t.is_punctuation(".")) {
                            return Err(self.error("has a malformed ... parameter"));
                        }
                    }
                    params.push("...".to_owned());
                }
                _ => return Err(self.error("expects a parameter name")),
            }
            self.cursor.skip_whitespace();
            match self.cursor.next() {
                Some(token) if token.is_punctuation(",") => continue,
                Some(token) if token.is_punctuation(")") => break,
                _ => return Err(self.error("expects , or ) in the parameter list")),
            }
        }
        Ok(params)
    }

    fn ifdef(&mut self, state: &mut State) -> Result<Node> {
        let name = self.expect_name()?;
        self.expect_end()?;
        let defined = state.is_defined(&name.text);
        let active = match self.keyword {
            Keyword::Ifndef => !defined,
            _ => defined,
        };
        state.conditionals.push_frame(name.text.clone(), active);
        Ok(Node::Comment(format!(
            "// {} expression {}",
            self.keyword.as_str(),
            name.text
        )))
    }

    fn if_expression(&mut self, state: &mut State) -> Result<Node> {
        let expression = self.cursor.rest();
        if expression.iter().all(Token::is_blank) {
            return Err(self.error("has no expression"));
        }
        // Conditions inside a skipped block are never evaluated
        let active = if state.conditionals.is_emitting() {
            evaluate_condition(expression, state).map_err(|e| syntax_error(self.line, e))? != 0
        } else {
            false
        };
        let label = state.next_if_label();
        state.conditionals.push_frame(label.clone(), active);
        Ok(Node::Comment(format!("// if expression {label}")))
    }

    fn diagnostic(&mut self, state: &State) -> Result<Node> {
        let message = self.expect(TokenKind::StringLiteral, "a string literal")?;
        let message = unquote(&message.text).to_owned();
        self.expect_end()?;
        let file = state.current_file_name();
        Ok(match self.keyword {
            Keyword::Error => Node::Error {
                message,
                file,
                line: self.line,
            },
            _ => Node::Warning {
                message,
                file,
                line: self.line,
            },
        })
    }

    fn pragma(&mut self) -> Result<Node> {
        let name = self.expect(TokenKind::Identifier, "a pragma name")?;
        self.cursor.skip_whitespace();
        let rest = self.cursor.rest();
        let args = if rest.iter().all(|t| t.kind == TokenKind::Whitespace) {
            None
        } else {
            Some(Box::new(Node::Lines(parse_code(rest)?)))
        };
        Ok(Node::Pragma {
            name: name.text.clone(),
            args,
        })
    }
}

/// Strip the delimiters from a string or `<...>` literal.
fn unquote(text: &str) -> &str {
    let mut chars = text.chars();
    chars.next();
    chars.next_back();
    chars.as_str()
}

/// For every `(`, the index of its matching `)`, if it has one.
fn matching_parens(tokens: &[Token]) -> Vec<Option<usize>> {
    let mut closing = vec![None; tokens.len()];
    let mut open = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_punctuation("(") {
            open.push(i);
        } else if token.is_punctuation(")") {
            if let Some(start) = open.pop() {
                closing[start] = Some(i);
            }
        }
    }
    closing
}

/// Split the contents of a call's parentheses at top-level commas. Nested parentheses are
/// already grouped into their own [`Node::Lines`], so every comma seen here is a separator.
fn split_arguments(nodes: Vec<Node>) -> Vec<Node> {
    if nodes.is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = Vec::new();
    for node in nodes {
        if node.is_comma() {
            args.push(Node::Lines(std::mem::take(&mut current)));
        } else {
            current.push(node);
        }
    }
    args.push(Node::Lines(current));
    args
}

/// Parse a run of code tokens, which contains no newlines and no directives.
pub fn parse_code(tokens: &[Token]) -> Result<Vec<Node>> {
    let closing = matching_parens(tokens);
    CodeParser {
        tokens,
        closing: &closing,
    }
    .group(0, tokens.len(), 0)
}

struct CodeParser<'t> {
    tokens: &'t [Token],
    closing: &'t [Option<usize>],
}

impl CodeParser<'_> {
    fn enter(&self, token: &Token, depth: usize) -> Result<usize> {
        if depth >= MAX_PAREN_DEPTH {
            return Err(syntax_error(
                token.line,
                format_args!("parentheses nested more than {MAX_PAREN_DEPTH} levels deep"),
            ));
        }
        Ok(depth + 1)
    }

    /// Parse `tokens[start..end]`, which sits inside `depth` pairs of parentheses.
    fn group(&self, start: usize, end: usize, depth: usize) -> Result<Vec<Node>> {
        let tokens = self.tokens;
        let mut nodes = Vec::with_capacity(end - start);
        let mut i = start;
        while i < end {
            let token = &tokens[i];
            let node = match token.kind {
                TokenKind::Identifier | TokenKind::Defined => {
                    let call = tokens
                        .get(i + 1)
                        .filter(|next| next.is_punctuation("("))
                        .and_then(|_| self.closing[i + 1]);
                    if let Some(close) = call {
                        let inner = self.enter(token, depth)?;
                        let args = split_arguments(self.group(i + 2, close, inner)?);
                        nodes.push(Node::Identifier {
                            name: token.text.clone(),
                            args: Some(args),
                        });
                        i = close + 1;
                        continue;
                    }
                    Node::identifier(token.text.clone())
                }
                TokenKind::Punctuation if token.text == "(" => {
                    if let Some(close) = self.closing[i] {
                        let inner = self.enter(token, depth)?;
                        nodes.push(Node::Lines(vec![
                            Node::literal(LiteralKind::Punctuation, "("),
                            Node::Lines(self.group(i + 1, close, inner)?),
                            Node::literal(LiteralKind::Punctuation, ")"),
                        ]));
                        i = close + 1;
                        continue;
                    }
                    Node::literal(LiteralKind::Punctuation, "(")
                }
                TokenKind::Punctuation => {
                    Node::literal(LiteralKind::Punctuation, token.text.clone())
                }
                TokenKind::TwoCharOperator => {
                    Node::literal(LiteralKind::Operator, token.text.clone())
                }
                TokenKind::IntLiteral => Node::literal(LiteralKind::Number, token.text.clone()),
                TokenKind::PreprocessingNumber => {
                    Node::literal(LiteralKind::PreprocessingNumber, token.text.clone())
                }
                TokenKind::StringLiteral | TokenKind::SystemIncludeLiteral => {
                    Node::literal(LiteralKind::String, token.text.clone())
                }
                TokenKind::CharLiteral => Node::literal(LiteralKind::Char, token.text.clone()),
                TokenKind::Whitespace => Node::Whitespace(token.text.clone()),
                TokenKind::Newline => Node::Newline,
                TokenKind::Keyword(_) => {
                    return Err(syntax_error(
                        token.line,
                        format_args!("unexpected {} in the middle of a line", token.text),
                    ))
                }
            };
            nodes.push(node);
            i += 1;
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod test {
    use super::{parse, MAX_PAREN_DEPTH};
    use crate::error::ErrorKind;
    use crate::node::Node;
    use crate::state::State;
    use test_log::test;

    fn state() -> State {
        let mut state = State::default();
        state.line_number = 1;
        state
    }

    fn source(input: &str) -> String {
        parse(input, &mut state()).unwrap().to_source()
    }

    #[test]
    fn test_code_round_trips() {
        for input in [
            "int main(void) {\n",
            "foo(a, (b, c), d);\n",
            "x = f( ) + g();\n",
            "  \"string\" 'c' 1.5e3 a<=b\n",
            "unbalanced(\n",
            "no newline",
        ] {
            assert_eq!(source(input), input);
        }
    }

    #[test]
    fn test_call_arguments() {
        let tree = parse("foo(1, (2, 3))", &mut state()).unwrap();
        let Node::Lines(statements) = tree else {
            panic!("expected lines");
        };
        let Node::Lines(code) = &statements[0] else {
            panic!("expected code");
        };
        match &code[0] {
            Node::Identifier { name, args } => {
                assert_eq!(name, "foo");
                let args = args.as_ref().unwrap();
                assert_eq!(args.len(), 2);
                assert_eq!(args[1].to_source(), " (2, 3)");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn define(input: &str) -> std::rc::Rc<crate::macros::MacroDefinition> {
        let tree = parse(input, &mut state()).unwrap();
        let Node::Lines(statements) = tree else {
            panic!("expected lines");
        };
        match &statements[0] {
            Node::Define(definition) => definition.clone(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_define() {
        let definition = define("#define FOO 12345\n");
        assert_eq!(definition.name.as_str(), "FOO");
        assert_eq!(definition.expansion, "12345");
        assert!(!definition.is_function_like());

        let definition = define("  #define ADD(a, b)  a + b  \n");
        assert_eq!(definition.params, Some(vec!["a".to_owned(), "b".to_owned()]));
        assert_eq!(definition.expansion, "a + b");

        let definition = define("#define EMPTY()");
        assert_eq!(definition.params, Some(vec![]));
        assert_eq!(definition.expansion, "");
    }

    #[test]
    fn test_define_with_space_before_paren_is_object_like() {
        let definition = define("#define PAREN (a)");
        assert!(!definition.is_function_like());
        assert_eq!(definition.expansion, "(a)");
    }

    #[test]
    fn test_define_without_body_is_true() {
        assert_eq!(define("#define FLAG\n").expansion, "true");
    }

    #[test]
    fn test_define_variadic() {
        let definition = define("#define LOG(fmt, args...) printf(fmt, args)");
        assert!(definition.variadic);
        assert_eq!(
            definition.params,
            Some(vec!["fmt".to_owned(), "args".to_owned()])
        );
        let definition = define("#define ALL(...) f(__VA_ARGS__)");
        assert_eq!(definition.params, Some(vec!["__VA_ARGS__".to_owned()]));

        let error = parse("#define BAD(a..., b) a", &mut state()).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Line 1: Variadic macro argument must be at the end of the argument definition list"
        );
    }

    #[test]
    fn test_define_errors() {
        assert!(parse("#define", &mut state()).is_err());
        assert!(parse("#define 123", &mut state()).is_err());
        assert!(parse("#define F(a b) a", &mut state()).is_err());
        assert!(parse("#define F(a,", &mut state()).is_err());
    }

    #[test]
    fn test_include() {
        let tree = parse("#include \"local.h\"\n", &mut state()).unwrap();
        assert_eq!(
            tree,
            Node::Lines(vec![
                Node::Include {
                    target: "local.h".to_owned(),
                    system: false,
                    line: 1
                },
                Node::Newline
            ])
        );
        let tree = parse("#include <vector>", &mut state()).unwrap();
        assert_eq!(tree.to_source(), "#include <vector>");
        assert!(parse("#include vector", &mut state()).is_err());
    }

    #[test]
    fn test_conditionals_update_state() {
        let mut state = state();
        parse("#define FOO 1\n", &mut state).unwrap();
        // definitions only take effect when rendered
        assert!(!state.is_defined("FOO"));

        let tree = parse("#ifndef FOO\n", &mut state).unwrap();
        assert_eq!(tree.to_source(), "// ifndef expression FOO\n");
        assert!(state.conditionals.is_emitting());

        assert_eq!(
            parse("#else\n", &mut state).unwrap().to_source(),
            "// else expression \n"
        );
        assert!(!state.conditionals.is_emitting());

        assert_eq!(
            parse("#if 1\n", &mut state).unwrap().to_source(),
            "// if expression if_1\n"
        );
        assert!(!state.conditionals.is_emitting());
        parse("#endif\n", &mut state).unwrap();
        assert_eq!(
            parse("#endif\n", &mut state).unwrap().to_source(),
            "// endif expression \n"
        );
        assert!(state.conditionals.is_emitting());
        assert_eq!(state.conditionals.depth(), 0);
    }

    #[test]
    fn test_if_is_not_evaluated_when_skipped() {
        let mut state = state();
        parse("#if 0\n", &mut state).unwrap();
        // would be a division by zero if evaluated
        parse("#if 1 / 0\n", &mut state).unwrap();
        assert_eq!(state.conditionals.depth(), 2);
        assert!(parse("#endif\n#endif\n#if 1 / 0\n", &mut state).is_err());
    }

    #[test]
    fn test_unmatched_else_and_endif() {
        assert!(parse("#else", &mut state()).is_err());
        assert!(parse("#endif", &mut state()).is_err());
    }

    #[test]
    fn test_error_and_warning() {
        let mut state = state();
        state.line_number = 7;
        let tree = parse("#error \"bad thing\"", &mut state).unwrap();
        assert_eq!(
            tree,
            Node::Lines(vec![Node::Error {
                message: "bad thing".to_owned(),
                file: "<unknown>".to_owned(),
                line: 7
            }])
        );
        assert!(parse("#warning oops", &mut state).is_err());
    }

    #[test]
    fn test_pragma() {
        let tree = parse("#pragma once\n", &mut state()).unwrap();
        assert_eq!(tree.to_source(), "#pragma once\n");
        let tree = parse("#pragma GCC  diagnostic push", &mut state()).unwrap();
        assert_eq!(tree.to_source(), "#pragma GCC diagnostic push");
        let tree = parse("#pragma pack 4", &mut state()).unwrap();
        assert_eq!(tree.to_source(), "#pragma pack 4");
    }

    #[test]
    fn test_py_is_rejected() {
        let error = parse("#py print(1)", &mut state()).unwrap_err();
        assert_eq!(error.to_string(), "Line 1: #py directives are not supported");
    }

    #[test]
    fn test_keyword_inside_code() {
        let error = parse("int x; #define Y", &mut state()).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn test_paren_nesting_is_bounded() {
        let deep = format!("x = {}1{};\n", "(".repeat(5000), ")".repeat(5000));
        let error = parse(&deep, &mut state()).unwrap_err();
        assert_eq!(
            error.to_string(),
            format!("Line 1: parentheses nested more than {MAX_PAREN_DEPTH} levels deep")
        );

        let calls = format!("{}1{};\n", "f(".repeat(5000), ")".repeat(5000));
        assert!(parse(&calls, &mut state()).is_err());

        let nested = format!(
            "x = {}1{};\n",
            "(".repeat(MAX_PAREN_DEPTH),
            ")".repeat(MAX_PAREN_DEPTH)
        );
        assert_eq!(source(&nested), nested);
    }

    #[test]
    fn test_unbalanced_parens_inside_groups() {
        for input in ["f((a);\n", "(a)) + (b\n", "g(h(1), (2);\n"] {
            assert_eq!(source(input), input);
        }
    }
}
