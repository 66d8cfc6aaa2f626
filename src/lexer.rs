//! Tokenizer for the preprocessing language.
//!
//! Every input character ends up in exactly one [`Token`], except for comments which are
//! recognised and then dropped. Tokens are produced lazily by [`Tokenizer`], which keeps a
//! running line counter so that diagnostics can point at the right line of a multi-line buffer.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while, take_while1};
use nom::character::complete::{anychar, char, none_of, one_of, satisfy};
use nom::combinator::{map, map_opt, opt, recognize};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair, tuple};
use nom::IResult;

use crate::error::{Error, ErrorKind, Result};

/// Characters that are accepted as single character punctuation.
const PUNCTUATION: &str = "+-*/|&()=,{}[].;!<>:~^@#'%?\\";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Include,
    Define,
    Ifdef,
    Ifndef,
    Endif,
    Else,
    If,
    Py,
    Error,
    Warning,
    Pragma,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        use Keyword::*;
        Some(match word {
            "include" => Include,
            "define" => Define,
            "ifdef" => Ifdef,
            "ifndef" => Ifndef,
            "endif" => Endif,
            "else" => Else,
            "if" => If,
            "py" => Py,
            "error" => Error,
            "warning" => Warning,
            "pragma" => Pragma,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        use Keyword::*;
        match self {
            Include => "include",
            Define => "define",
            Ifdef => "ifdef",
            Ifndef => "ifndef",
            Endif => "endif",
            Else => "else",
            If => "if",
            Py => "py",
            Error => "error",
            Warning => "warning",
            Pragma => "pragma",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    IntLiteral,
    PreprocessingNumber,
    StringLiteral,
    CharLiteral,
    SystemIncludeLiteral,
    Whitespace,
    Newline,
    TwoCharOperator,
    /// A `#keyword`, scanned as a single token.
    Keyword(Keyword),
    /// The `defined` operator, only meaningful inside `#if`.
    Defined,
    Punctuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    /// Whitespace and newlines, which the expression grammar skips.
    pub fn is_blank(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Newline)
    }

    pub fn is_punctuation(&self, c: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == c
    }

    /// An identifier written with a trailing `...`, marking a variadic parameter.
    pub fn is_variadic(&self) -> bool {
        self.kind == TokenKind::Identifier && self.text.ends_with("...")
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            TokenKind::Identifier => "IDENTIFIER".to_owned(),
            TokenKind::IntLiteral => "INT_LITERAL".to_owned(),
            TokenKind::PreprocessingNumber => "PREPROCESSING_NUMBER".to_owned(),
            TokenKind::StringLiteral => "STRING_LITERAL".to_owned(),
            TokenKind::CharLiteral => "CHAR_LITERAL".to_owned(),
            TokenKind::SystemIncludeLiteral => "SYSTEM_INCLUDE_LITERAL".to_owned(),
            TokenKind::Whitespace => "WHITESPACE".to_owned(),
            TokenKind::Newline => "NEWLINE".to_owned(),
            TokenKind::TwoCharOperator => "OPERATOR".to_owned(),
            TokenKind::Keyword(keyword) => format!(
                "PREPROCESSING_KEYWORD_{}",
                keyword.as_str().to_ascii_uppercase()
            ),
            TokenKind::Defined => "DEFINED".to_owned(),
            TokenKind::Punctuation => "ASCII_LITERAL".to_owned(),
        };
        write!(f, "{kind}: {}", self.text.escape_debug())
    }
}

pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether the whole of `s` is a single identifier, `[_a-zA-Z][_a-zA-Z0-9]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_char)
}

type Lexed<'a> = (TokenKind, &'a str);

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_identifier_start), take_while(is_identifier_char)))(input)
}

fn two_char_operator(input: &str) -> IResult<&str, Lexed<'_>> {
    map(
        alt((
            tag("<="),
            tag(">="),
            tag("=="),
            tag("!="),
            tag("&&"),
            tag("||"),
            tag("<<"),
            tag(">>"),
        )),
        |op| (TokenKind::TwoCharOperator, op),
    )(input)
}

fn keyword(input: &str) -> IResult<&str, Lexed<'_>> {
    map_opt(recognize(pair(char('#'), word)), |text: &str| {
        Keyword::from_word(&text[1..]).map(|k| (TokenKind::Keyword(k), text))
    })(input)
}

fn defined(input: &str) -> IResult<&str, Lexed<'_>> {
    map_opt(word, |w: &str| (w == "defined").then_some((TokenKind::Defined, w)))(input)
}

fn system_include_literal(input: &str) -> IResult<&str, Lexed<'_>> {
    map(
        recognize(delimited(
            char('<'),
            take_while(|c| !matches!(c, '\'' | '"' | '<' | '>' | '\n')),
            char('>'),
        )),
        |text| (TokenKind::SystemIncludeLiteral, text),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, Lexed<'_>> {
    map(recognize(pair(word, opt(tag("...")))), |text| {
        (TokenKind::Identifier, text)
    })(input)
}

/// Integer literals are the all-digit subset of preprocessing numbers, with an optional `L`
/// suffix that is dropped.
fn number(input: &str) -> IResult<&str, Lexed<'_>> {
    map(
        recognize(tuple((
            opt(char('.')),
            satisfy(|c| c.is_ascii_digit()),
            many0_count(alt((
                recognize(pair(one_of("eEpP"), one_of("+-"))),
                recognize(satisfy(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')),
            ))),
        ))),
        |text: &str| {
            let digits = text.strip_suffix('L').unwrap_or(text);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                (TokenKind::IntLiteral, digits)
            } else {
                (TokenKind::PreprocessingNumber, text)
            }
        },
    )(input)
}

fn escape(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('\\'), one_of("'\"tn\\0")))(input)
}

fn char_literal(input: &str) -> IResult<&str, Lexed<'_>> {
    map(
        recognize(delimited(
            char('\''),
            alt((
                recognize(pair(char('\\'), anychar)),
                recognize(none_of("'\\\n")),
            )),
            char('\''),
        )),
        |text| (TokenKind::CharLiteral, text),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Lexed<'_>> {
    map(
        alt((
            recognize(delimited(
                char('"'),
                many0_count(alt((escape, recognize(none_of("\"\\\n"))))),
                char('"'),
            )),
            recognize(delimited(
                char('\''),
                many0_count(alt((escape, recognize(none_of("'\\\n"))))),
                char('\''),
            )),
        )),
        |text| (TokenKind::StringLiteral, text),
    )(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), take_while(|c| c != '\n')))(input)
}

fn whitespace(input: &str) -> IResult<&str, Lexed<'_>> {
    map(take_while1(|c| matches!(c, ' ' | '\t' | '\r')), |text| {
        (TokenKind::Whitespace, text)
    })(input)
}

fn newline(input: &str) -> IResult<&str, Lexed<'_>> {
    map(tag("\n"), |text| (TokenKind::Newline, text))(input)
}

fn punctuation(input: &str) -> IResult<&str, Lexed<'_>> {
    map(recognize(one_of(PUNCTUATION)), |text| {
        (TokenKind::Punctuation, text)
    })(input)
}

fn token(input: &str) -> IResult<&str, Lexed<'_>> {
    alt((
        two_char_operator,
        keyword,
        defined,
        identifier,
        number,
        char_literal,
        string_literal,
        whitespace,
        newline,
        punctuation,
    ))(input)
}

/// Lazily splits a buffer into tokens. Each tokenizer is independent; after the first error it
/// yields nothing more.
pub struct Tokenizer<'a> {
    remaining: &'a str,
    line: usize,
    /// Set right after an `#include` keyword, the only place a `<...>` literal may appear.
    after_include: bool,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    /// `line` is the 1-based line number of the first line in `input`.
    pub fn new(input: &'a str, line: usize) -> Self {
        Self {
            remaining: input,
            line,
            after_include: false,
            failed: false,
        }
    }

    fn fail(&mut self, kind: ErrorKind) -> Option<Result<Token>> {
        self.failed = true;
        Some(Err(Error::new(kind)))
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed || self.remaining.is_empty() {
                return None;
            }
            let input = self.remaining;
            let line = self.line;

            if let Ok((remaining, comment)) = block_comment(input) {
                self.line += comment.matches('\n').count();
                self.remaining = remaining;
                continue;
            }
            if input.starts_with("/*") {
                return self.fail(ErrorKind::UnterminatedComment { line });
            }
            if let Ok((remaining, _)) = line_comment(input) {
                self.remaining = remaining;
                continue;
            }

            let lexed = if self.after_include {
                system_include_literal(input).or_else(|_| token(input))
            } else {
                token(input)
            };

            return match lexed {
                Ok((remaining, (kind, text))) => {
                    self.remaining = remaining;
                    match kind {
                        TokenKind::Newline => {
                            self.line += 1;
                            self.after_include = false;
                        }
                        TokenKind::Keyword(Keyword::Include) => self.after_include = true,
                        TokenKind::Whitespace => {}
                        _ => self.after_include = false,
                    }
                    Some(Ok(Token::new(kind, text, line)))
                }
                Err(_) => {
                    let character = input.chars().next()?;
                    self.fail(ErrorKind::Lex { line, character })
                }
            };
        }
    }
}

/// Tokenize all of `input`, whose first line is numbered `line`.
pub fn tokenize(input: &str, line: usize) -> Result<Vec<Token>> {
    let tokens = Tokenizer::new(input, line).collect::<Result<Vec<_>>>()?;
    if log::log_enabled!(log::Level::Debug) {
        for token in &tokens {
            log::debug!("{token}");
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod test {
    use super::{is_identifier, tokenize, Keyword, Token, TokenKind, Tokenizer};
    use crate::error::ErrorKind;
    use test_log::test;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input, 1)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_blank())
            .map(|t| t.kind)
            .collect()
    }

    fn texts(input: &str) -> Vec<String> {
        tokenize(input, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_two_char_operators_not_split() {
        assert_eq!(
            texts("a<=b>=c==d!=e&&f||g<<h>>i"),
            vec![
                "a", "<=", "b", ">=", "c", "==", "d", "!=", "e", "&&", "f", "||", "g", "<<", "h",
                ">>", "i"
            ]
        );
    }

    #[test]
    fn test_keywords_need_hash_and_word_boundary() {
        assert_eq!(
            kinds("#ifdef X"),
            vec![TokenKind::Keyword(Keyword::Ifdef), TokenKind::Identifier]
        );
        assert_eq!(kinds("#if"), vec![TokenKind::Keyword(Keyword::If)]);
        assert_eq!(
            kinds("#ifx"),
            vec![TokenKind::Punctuation, TokenKind::Identifier]
        );
        assert_eq!(kinds("define"), vec![TokenKind::Identifier]);
        assert_eq!(kinds("#py"), vec![TokenKind::Keyword(Keyword::Py)]);
    }

    #[test]
    fn test_system_include_only_after_include() {
        assert_eq!(
            kinds("#include <stdio.h>"),
            vec![
                TokenKind::Keyword(Keyword::Include),
                TokenKind::SystemIncludeLiteral
            ]
        );
        assert_eq!(
            kinds("a < b > c"),
            vec![
                TokenKind::Identifier,
                TokenKind::Punctuation,
                TokenKind::Identifier,
                TokenKind::Punctuation,
                TokenKind::Identifier
            ]
        );
    }

    #[test]
    fn test_variadic_identifier() {
        let tokens = tokenize("rest...", 1).unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_variadic());
        assert_eq!(tokens[0].text, "rest...");
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("12345 42L 1.5e+3 0x1F", 1).unwrap();
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| !t.is_blank())
            .map(|t| (t.kind, t.text.as_str()))
            .collect();
        assert_eq!(
            numbers,
            vec![
                (TokenKind::IntLiteral, "12345"),
                (TokenKind::IntLiteral, "42"),
                (TokenKind::PreprocessingNumber, "1.5e+3"),
                (TokenKind::PreprocessingNumber, "0x1F"),
            ]
        );
    }

    #[test]
    fn test_char_and_string_literals() {
        assert_eq!(
            kinds(r#"'a' '\n' "hello \"world\"" 'two'"#),
            vec![
                TokenKind::CharLiteral,
                TokenKind::CharLiteral,
                TokenKind::StringLiteral,
                TokenKind::StringLiteral
            ]
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(texts("a // trailing"), vec!["a", " "]);
        assert_eq!(texts("a/* x */b"), vec!["a", "b"]);
    }

    #[test]
    fn test_block_comment_counts_lines() {
        let tokens = tokenize("/* one\ntwo\n*/ x\ny", 1).unwrap();
        let x = tokens.iter().find(|t| t.text == "x").unwrap();
        let y = tokens.iter().find(|t| t.text == "y").unwrap();
        assert_eq!(x.line, 3);
        assert_eq!(y.line, 4);
    }

    #[test]
    fn test_unterminated_comment() {
        let error = tokenize("int x; /* open", 7).unwrap_err();
        assert!(matches!(
            error.kind,
            ErrorKind::UnterminatedComment { line: 7 }
        ));
    }

    #[test]
    fn test_unknown_character() {
        let error = tokenize("int x;\nint ©;\n", 23).unwrap_err();
        match error.kind {
            ErrorKind::Lex { line, character } => {
                assert_eq!(line, 24);
                assert_eq!(character, '©');
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(error.to_string(), "Unknown token on line 24: ©");
    }

    #[test]
    fn test_tokenizer_stops_after_error() {
        let mut tokenizer = Tokenizer::new("$ a", 1);
        assert!(tokenizer.next().unwrap().is_err());
        assert!(tokenizer.next().is_none());
    }

    #[test]
    fn test_whitespace_and_newlines_are_tokens() {
        let tokens = tokenize("a \t\n", 1).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Identifier, "a", 1),
                Token::new(TokenKind::Whitespace, " \t", 1),
                Token::new(TokenKind::Newline, "\n", 1),
            ]
        );
    }

    #[test]
    fn test_display() {
        let token = Token::new(TokenKind::Keyword(Keyword::Define), "#define", 1);
        assert_eq!(token.to_string(), "PREPROCESSING_KEYWORD_DEFINE: #define");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("some_word_23"));
        assert!(!is_identifier("22word"));
        assert!(!is_identifier(""));
    }
}
