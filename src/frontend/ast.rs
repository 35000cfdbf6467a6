//! The parsed program handed to us by the parser. Every node carries the span
//! it was parsed from; nothing in here has been checked yet beyond being
//! syntactically well formed.

use super::{Span, intern::InternedSymbol};

pub mod build;

#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Top level items in declaration order
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct Item {
    pub span: Span,
    pub kind: ItemKind,
}

#[derive(Debug, Clone)]
pub enum ItemKind {
    /// type Record = { lang: str, time: int }
    Record(Box<RecordDefinition>),
    /// def name(param: Type, ...) -> Type = expr
    Function(Box<FunctionDefinition>),
    /// from Record def |> def method(...) -> T = expr
    Methods(Box<MethodBlock>),
}

#[derive(Debug, Clone)]
pub struct RecordDefinition {
    pub span: Span,
    pub name: Identifier,
    pub fields: Vec<RecordField>,
}

#[derive(Debug, Clone)]
pub struct RecordField {
    pub span: Span,
    pub name: Identifier,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct MethodBlock {
    pub span: Span,
    /// The record the methods get attached to
    pub record: Identifier,
    pub methods: Vec<FunctionDefinition>,
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub span: Span,
    pub name: Identifier,
    pub parameters: Vec<FunctionParameter>,
    pub return_type: Option<Type>,
    pub body: Expression,
}

#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub span: Span,
    pub name: Identifier,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Type {
    pub span: Span,
    pub kind: TypeKind,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    /// int, bool, str, none, or the name of a record
    Named(Identifier),
    /// list or list[T]. A bare `list` leaves the element type to inference.
    List(Option<Box<Type>>),
    /// fn(int, str) -> bool
    Function {
        parameters: Vec<Type>,
        return_type: Box<Type>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Identifier {
    pub span: Span,
    pub symbol: InternedSymbol,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    Literal(Literal),
    Identifier(Identifier),
    /// let name = value
    /// body
    Let {
        name: Identifier,
        ty: Option<Box<Type>>,
        value: Box<Expression>,
        body: Box<Expression>,
    },
    /// A sequence of expressions evaluated in order. The value of the block
    /// is the value of the last expression (unit if empty).
    Block(Vec<Expression>),
    If {
        condition: Box<Expression>,
        positive: Box<Expression>,
        negative: Option<Box<Expression>>,
    },
    /// Record { lang: "choco", time: 2 }
    Record {
        name: Identifier,
        fields: Vec<FieldInitializer>,
    },
    /// value.time
    Field {
        target: Box<Expression>,
        field: Identifier,
    },
    /// something(1, 2)
    Call {
        target: Box<Expression>,
        arguments: Vec<Expression>,
    },
    /// value.method(1, 2)
    MethodCall {
        receiver: Box<Expression>,
        method: Identifier,
        arguments: Vec<Expression>,
    },
    Match {
        scrutinee: Box<Expression>,
        arms: Vec<MatchArm>,
    },
    /// [1, 2, 3]
    List(Vec<Expression>),
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperatorKind,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
}

#[derive(Debug, Clone)]
pub struct FieldInitializer {
    pub span: Span,
    pub name: Identifier,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub span: Span,
    pub pattern: Pattern,
    pub guard: Option<Expression>,
    pub body: Expression,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    /// _
    Wildcard,
    /// x
    Binding(Identifier),
    /// 1, true, "choco"
    Literal(Literal),
    /// Record { time: 2, lang: l }
    ///
    /// Fields that are left out match anything
    Record {
        name: Identifier,
        fields: Vec<FieldPattern>,
    },
}

#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub span: Span,
    pub name: Identifier,
    pub pattern: Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Literal {
    Integer(i64),
    Boolean(bool),
    String(InternedSymbol),
    Unit,
}

impl core::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Integer(value) => write!(f, "{value}"),
            Literal::Boolean(value) => write!(f, "{value}"),
            Literal::String(symbol) => write!(f, "{:?}", symbol.value()),
            Literal::Unit => write!(f, "()"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperatorKind {
    Add,                  // +
    Subtract,             // -
    Multiply,             // *
    Divide,               // /
    Modulus,              // %
    Equals,               // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // and
    LogicalOr,            // or
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Comparison,
    Logical,
    Equality,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulus => {
                BinaryOperatorClass::Arithmetic
            }
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Comparison,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
        }
    }
}

impl core::fmt::Display for BinaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Subtract => write!(f, "-"),
            Self::Multiply => write!(f, "*"),
            Self::Divide => write!(f, "/"),
            Self::Modulus => write!(f, "%"),
            Self::Equals => write!(f, "=="),
            Self::NotEquals => write!(f, "!="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqualTo => write!(f, "<="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqualTo => write!(f, ">="),
            Self::LogicalAnd => write!(f, "and"),
            Self::LogicalOr => write!(f, "or"),
        }
    }
}

/// `not` only exists in prefix position. There is no infix `x not y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperatorKind {
    LogicalNot, // not
    Negate,     // -
}

impl core::fmt::Display for UnaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LogicalNot => write!(f, "not"),
            Self::Negate => write!(f, "-"),
        }
    }
}
