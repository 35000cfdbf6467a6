use thiserror::Error;

use crate::{
    frontend::{Span, ast::BinaryOperatorKind, intern::InternedSymbol},
    middle::ty::Type,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TypeError {
    pub span: Span,
    /// Where in the program the failing constraint came from
    pub boundary: TypeBoundary,
    pub kind: TypeErrorKind,
}

impl std::error::Error for TypeError {}

impl core::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(description) = self.boundary.description() {
            write!(f, " in {description}")?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeErrorKind {
    /// The expected type did not match the type we found in that position
    /// (semantics depend a lot on the boundary which caused this error)
    #[error("mismatched types: expected `{expected}`, found `{found}`")]
    Mismatch { expected: Type, found: Type },
    #[error("cannot construct the infinite type `{variable}` = `{ty}`")]
    InfinitelyRecursiveType { variable: Type, ty: Type },
    #[error("cannot find value `{0}` in this scope")]
    UnknownName(InternedSymbol),
    #[error("cannot find type `{0}`")]
    UnknownType(InternedSymbol),
    #[error("cannot find record `{0}`")]
    UnknownRecord(InternedSymbol),
    #[error("record `{record}` has no field `{field}`")]
    UnknownField {
        record: InternedSymbol,
        field: InternedSymbol,
    },
    #[error("record `{record}` has no field or method named `{member}`")]
    UnknownMember {
        record: InternedSymbol,
        member: InternedSymbol,
    },
    #[error("missing field `{field}` in initializer of `{record}`")]
    MissingField {
        record: InternedSymbol,
        field: InternedSymbol,
    },
    #[error("field `{field}` of `{record}` is specified more than once")]
    DuplicateField {
        record: InternedSymbol,
        field: InternedSymbol,
    },
    #[error("the name `{0}` is defined multiple times")]
    DuplicateDefinition(InternedSymbol),
    #[error("identifier `{0}` is bound more than once in the same pattern")]
    DuplicateBinding(InternedSymbol),
    #[error("expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("expected a function, found `{0}`")]
    NotCallable(Type),
    #[error("type `{0}` is not a record and has no members")]
    NotARecord(Type),
    #[error("the type of this value must be known before accessing its members")]
    UnknownReceiver,
    #[error("cannot apply `{operator}` to values of type `{ty}`")]
    UnsupportedOperator {
        operator: BinaryOperatorKind,
        ty: Type,
    },
    #[error("type annotations needed: could not infer `{0}`")]
    CannotInfer(Type),
}

/// A kind of place in the source code where a constraint may be generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeBoundary {
    /// Record, function, and method declarations
    Declaration,
    /// Anything without a more specific boundary
    Expression,
    /// If an explicit type is specified for a let binding, the value must
    /// have that type
    LetAnnotation,
    /// Function argument type must match function parameter type
    FunctionArgument,
    /// The body of a function must have its declared return type
    FunctionReturn,
    /// If conditions must be the bool type
    IfCondition,
    /// Both branches of an if must have the same type
    IfBranches,
    /// An if without an else can only produce unit
    IfWithoutElse,
    /// Field initializers must match the declared field type
    RecordField,
    /// All elements of a list literal have the same type
    ListElement,
    /// Operands of a binary operator
    BinaryOperand,
    /// Operand of a unary operator
    UnaryOperand,
    /// Patterns must have the type of the scrutinee
    MatchPattern,
    /// Guards must be the bool type
    MatchGuard,
    /// All arms of a match must have the same type
    MatchArm,
}

impl TypeBoundary {
    pub fn description(self) -> Option<&'static str> {
        match self {
            TypeBoundary::Declaration | TypeBoundary::Expression => None,
            TypeBoundary::LetAnnotation => Some("let binding"),
            TypeBoundary::FunctionArgument => Some("function argument"),
            TypeBoundary::FunctionReturn => Some("function return value"),
            TypeBoundary::IfCondition => Some("if condition"),
            TypeBoundary::IfBranches => Some("if branches"),
            TypeBoundary::IfWithoutElse => Some("if without else"),
            TypeBoundary::RecordField => Some("record field"),
            TypeBoundary::ListElement => Some("list element"),
            TypeBoundary::BinaryOperand => Some("binary operation"),
            TypeBoundary::UnaryOperand => Some("unary operation"),
            TypeBoundary::MatchPattern => Some("match pattern"),
            TypeBoundary::MatchGuard => Some("match guard"),
            TypeBoundary::MatchArm => Some("match arm"),
        }
    }
}
