use colored::Colorize;

use crate::{
    frontend::Span,
    middle::{pattern::PatternError, type_checking::TypeError},
};

/// A problem with the program being compiled, as opposed to a problem with
/// the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} {} {}",
            "error".red().bold(),
            ":".bold(),
            self.message.bold(),
            format!("({})", self.span).bright_black()
        )
    }
}

impl From<&TypeError> for Diagnostic {
    fn from(error: &TypeError) -> Self {
        Self::new(error.to_string(), error.span)
    }
}

impl From<&PatternError> for Diagnostic {
    fn from(error: &PatternError) -> Self {
        Self::new(error.to_string(), error.span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_message_and_span() {
        let diagnostic = Diagnostic::from(&PatternError::UnreachableArm {
            arm: 1,
            span: Span::new(4, 19),
        });

        assert_eq!(
            strip_ansi_escapes::strip_str(diagnostic.to_string()),
            "error: unreachable pattern in match arm 2 (4..19)"
        );
    }
}
