//! The frontend boundary of the compiler. Lexing and parsing happen outside
//! of this crate; what arrives here is an already well-formed AST whose spans
//! are opaque metadata we carry along for error reporting.

pub mod ast;
pub mod intern;

/// A region of the original source text. The compiler never interprets the
/// offsets, it only hands them back in diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Used for nodes synthesized by the compiler itself
    pub const DUMMY: Self = Self { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both inputs
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
