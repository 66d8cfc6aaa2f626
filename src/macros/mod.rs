//! Macro definitions and their expansion.

pub mod eval;
pub mod expand;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::lexer::is_identifier;
use crate::node::{write_arguments, Node};

/// Name given to a variadic parameter written as a bare `...`.
pub const VA_ARGS: &str = "__VA_ARGS__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacroName(String);

impl MacroName {
    pub fn try_from_str(name: &str) -> Result<Self> {
        if is_identifier(name) {
            Ok(Self(name.to_owned()))
        } else {
            Err(Error::syntax(format!("{name:?} is not a valid macro name")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MacroName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for MacroName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDefinition {
    pub name: MacroName,
    /// The body as written, with leading and trailing whitespace removed.
    pub expansion: String,
    /// `None` for object-like macros. Variadic parameters are stored without their `...`.
    pub params: Option<Vec<String>>,
    pub variadic: bool,
    pub body: Vec<Node>,
}

impl MacroDefinition {
    /// `params` are the parameter names as written, so a variadic parameter still carries its
    /// trailing `...` (or is just `...`).
    pub fn new(name: MacroName, body: Vec<Node>, params: Option<Vec<String>>) -> Result<Self> {
        let mut variadic = false;
        let params = match params {
            None => None,
            Some(raw) => {
                let count = raw.len();
                let mut params = Vec::with_capacity(count);
                for (i, param) in raw.into_iter().enumerate() {
                    match param.strip_suffix("...") {
                        Some(_) if i + 1 != count => {
                            return Err(Error::syntax(
                                "Variadic macro argument must be at the end of the argument \
                                 definition list",
                            ))
                        }
                        Some("") => {
                            variadic = true;
                            params.push(VA_ARGS.to_owned());
                        }
                        Some(stripped) => {
                            variadic = true;
                            params.push(stripped.to_owned());
                        }
                        None => params.push(param),
                    }
                }
                Some(params)
            }
        };

        let expansion = Node::Lines(body.clone()).to_source().trim().to_owned();
        Ok(Self {
            name,
            expansion,
            params,
            variadic,
            body,
        })
    }

    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }

    /// Expand this macro for a use with `args`, which is `None` when the name was not followed
    /// by a parenthesised argument list. Arguments are already rendered text.
    pub fn expand(&self, args: Option<&[String]>) -> Result<String> {
        // `F()` and `F( )` both pass no arguments
        let args = args.map(|args| match args {
            [only] if only.trim().is_empty() => &args[..0],
            _ => args,
        });

        match (&self.params, args) {
            (None, None) => Ok(self.expansion.clone()),
            (None, Some([])) => Ok(self.expansion.clone()),
            (None, Some(args)) => Err(Error::syntax(format!(
                "Macro {} doesn't take any args, but was given {}",
                self.name,
                args.len()
            ))),
            (Some(_), None) if self.variadic => Err(Error::syntax(format!(
                "Macro {} invoked without args, but is variadic",
                self.name
            ))),
            (Some(_), None) => Err(Error::syntax(format!(
                "Macro {} expects args, but was given none",
                self.name
            ))),
            (Some(params), Some(args)) => {
                let bindings = self.bind(params, args)?;
                let mut out = String::new();
                for node in &self.body {
                    substitute(node, &bindings, &mut out);
                }
                Ok(out.trim().to_owned())
            }
        }
    }

    fn bind<'p>(&self, params: &'p [String], args: &[String]) -> Result<HashMap<&'p str, String>> {
        if self.variadic {
            if args.len() < params.len() {
                return Err(Error::syntax(format!(
                    "{} was given {} arguments, but takes a minimum of {}",
                    self.name,
                    args.len(),
                    params.len()
                )));
            }
        } else if args.len() != params.len() {
            return Err(Error::syntax(format!(
                "Wrong number of arguments in macro expansion for {}; expected {}, got {}",
                self.name,
                params.len(),
                args.len()
            )));
        }

        let mut bindings = HashMap::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let value = if self.variadic && i + 1 == params.len() {
                args[i..]
                    .iter()
                    .map(|arg| arg.trim())
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                args[i].trim().to_owned()
            };
            bindings.insert(param.as_str(), value);
        }
        Ok(bindings)
    }
}

/// Replaces whole identifiers only, so a parameter `a` leaves `abc` alone.
fn substitute(node: &Node, bindings: &HashMap<&str, String>, out: &mut String) {
    match node {
        Node::Identifier { name, args } => {
            match bindings.get(name.as_str()) {
                Some(value) => out.push_str(value),
                None => out.push_str(name),
            }
            if let Some(args) = args {
                write_arguments(args, out, |arg, out| substitute(arg, bindings, out));
            }
        }
        Node::Lines(children) => {
            for child in children {
                substitute(child, bindings, out);
            }
        }
        other => other.write_source(out),
    }
}

impl std::fmt::Display for MacroDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.params {
            None => write!(f, "Macro {} with no args", self.name)?,
            Some(params) => {
                write!(f, "Macro {} with args (", self.name)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(param)?;
                    if self.variadic && i + 1 == params.len() {
                        f.write_str("...")?;
                    }
                }
                f.write_str(")")?;
            }
        }
        write!(f, " expanding to '{}'", self.expansion)
    }
}
