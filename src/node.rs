use std::rc::Rc;

use crate::macros::MacroDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Punctuation,
    Operator,
    Number,
    PreprocessingNumber,
    String,
    Char,
}

/// One node of the tree built for a logical line or a macro body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A sequence of nodes, rendered one after the other.
    Lines(Vec<Node>),
    /// A name, optionally followed by a call style argument list. Each argument is a
    /// [`Node::Lines`].
    Identifier {
        name: String,
        args: Option<Vec<Node>>,
    },
    Literal {
        kind: LiteralKind,
        text: String,
    },
    Newline,
    Whitespace(String),
    /// Text emitted for directives, so the output can be traced back to the input.
    Comment(String),
    Define(Rc<MacroDefinition>),
    Include {
        target: String,
        system: bool,
        line: usize,
    },
    Error {
        message: String,
        file: String,
        line: usize,
    },
    Warning {
        message: String,
        file: String,
        line: usize,
    },
    Pragma {
        name: String,
        args: Option<Box<Node>>,
    },
}

impl Node {
    pub fn literal(kind: LiteralKind, text: impl Into<String>) -> Self {
        Self::Literal {
            kind,
            text: text.into(),
        }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier {
            name: name.into(),
            args: None,
        }
    }

    pub fn is_comma(&self) -> bool {
        matches!(self, Node::Literal { kind: LiteralKind::Punctuation, text } if text == ",")
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Node::Whitespace(_) | Node::Newline => true,
            Node::Lines(children) => children.iter().all(Node::is_blank),
            _ => false,
        }
    }

    /// The text of this node exactly as written, without expanding any macros.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write_source(&mut out);
        out
    }

    pub fn write_source(&self, out: &mut String) {
        match self {
            Node::Lines(children) => {
                for child in children {
                    child.write_source(out);
                }
            }
            Node::Identifier { name, args } => {
                out.push_str(name);
                if let Some(args) = args {
                    write_arguments(args, out, |arg, out| arg.write_source(out));
                }
            }
            Node::Literal { text, .. } | Node::Whitespace(text) | Node::Comment(text) => {
                out.push_str(text)
            }
            Node::Newline => out.push('\n'),
            Node::Define(definition) => {
                out.push_str("// ");
                out.push_str(&definition.to_string());
            }
            Node::Include { target, system, .. } => {
                out.push_str("#include ");
                if *system {
                    out.push('<');
                    out.push_str(target);
                    out.push('>');
                } else {
                    out.push('"');
                    out.push_str(target);
                    out.push('"');
                }
            }
            Node::Error { message, .. } => {
                out.push_str("#error \"");
                out.push_str(message);
                out.push('"');
            }
            Node::Warning { message, .. } => {
                out.push_str("#warning \"");
                out.push_str(message);
                out.push('"');
            }
            Node::Pragma { name, args } => {
                out.push_str("#pragma ");
                out.push_str(name);
                if let Some(args) = args {
                    out.push(' ');
                    args.write_source(out);
                }
            }
        }
    }
}

/// Writes `(arg,arg,...)`, rendering each argument with `f`.
pub(crate) fn write_arguments<F>(args: &[Node], out: &mut String, mut f: F)
where
    F: FnMut(&Node, &mut String),
{
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        f(arg, out);
    }
    out.push(')');
}

#[cfg(test)]
mod test {
    use super::{LiteralKind, Node};
    use test_log::test;

    #[test]
    fn test_call_source() {
        let node = Node::Identifier {
            name: "foo".to_owned(),
            args: Some(vec![
                Node::Lines(vec![Node::literal(LiteralKind::Number, "1")]),
                Node::Lines(vec![
                    Node::Whitespace(" ".to_owned()),
                    Node::identifier("bar"),
                ]),
            ]),
        };
        assert_eq!(node.to_source(), "foo(1, bar)");
    }

    #[test]
    fn test_blank() {
        assert!(Node::Lines(vec![Node::Whitespace("\t".to_owned()), Node::Newline]).is_blank());
        assert!(!Node::identifier("x").is_blank());
    }
}
