//! Dialect detection for function source text.
use std::fmt;

/// Execution dialect of a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `function (x) { ... }` / `x => ...`, evaluated in-process.
    FunctionLiteral,
    /// `def f(x): ...`, `lambda x: ...` or a bare expression in `x`,
    /// evaluated by an external interpreter.
    Definition,
}

impl Dialect {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FunctionLiteral => "JS",
            Self::Definition => "Python",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify function source text.
///
/// Anything that does not look like a function literal is handed to the
/// definition dialect. That fallback is policy: the interpreter reports
/// whatever it cannot make sense of.
pub fn detect(text: &str) -> Dialect {
    let t = text.trim();
    if t.starts_with("function") || t.contains("return") || t.contains("=>") {
        Dialect::FunctionLiteral
    } else {
        Dialect::Definition
    }
}
