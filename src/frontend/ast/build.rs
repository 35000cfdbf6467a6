//! Small constructors for assembling ASTs by hand. Everything built here gets
//! a dummy span.

use super::{
    BinaryOperatorKind, Expression, ExpressionKind, FieldInitializer, FieldPattern,
    FunctionDefinition, FunctionParameter, Identifier, Item, ItemKind, Literal, MatchArm,
    MethodBlock, Pattern, PatternKind, Program, RecordDefinition, RecordField, Type, TypeKind,
    UnaryOperatorKind,
};
use crate::frontend::{Span, intern::InternedSymbol};

pub fn ident(name: &str) -> Identifier {
    Identifier {
        span: Span::DUMMY,
        symbol: InternedSymbol::new(name),
    }
}

fn expression(kind: ExpressionKind) -> Expression {
    Expression {
        span: Span::DUMMY,
        kind,
    }
}

/* Types */

pub fn ty(name: &str) -> Type {
    Type {
        span: Span::DUMMY,
        kind: TypeKind::Named(ident(name)),
    }
}

/// `list` with the element type left to inference
pub fn bare_list() -> Type {
    Type {
        span: Span::DUMMY,
        kind: TypeKind::List(None),
    }
}

pub fn function_type(parameters: Vec<Type>, return_type: Type) -> Type {
    Type {
        span: Span::DUMMY,
        kind: TypeKind::Function {
            parameters,
            return_type: Box::new(return_type),
        },
    }
}

/* Items */

pub fn program(items: Vec<Item>) -> Program {
    Program { items }
}

pub fn record_def(name: &str, fields: &[(&str, Type)]) -> Item {
    Item {
        span: Span::DUMMY,
        kind: ItemKind::Record(Box::new(RecordDefinition {
            span: Span::DUMMY,
            name: ident(name),
            fields: fields
                .iter()
                .map(|(name, ty)| RecordField {
                    span: Span::DUMMY,
                    name: ident(name),
                    ty: ty.clone(),
                })
                .collect(),
        })),
    }
}

pub fn function_def(
    name: &str,
    parameters: &[(&str, Type)],
    return_type: Option<Type>,
    body: Expression,
) -> FunctionDefinition {
    FunctionDefinition {
        span: Span::DUMMY,
        name: ident(name),
        parameters: parameters
            .iter()
            .map(|(name, ty)| FunctionParameter {
                span: Span::DUMMY,
                name: ident(name),
                ty: ty.clone(),
            })
            .collect(),
        return_type,
        body,
    }
}

pub fn function(
    name: &str,
    parameters: &[(&str, Type)],
    return_type: Option<Type>,
    body: Expression,
) -> Item {
    Item {
        span: Span::DUMMY,
        kind: ItemKind::Function(Box::new(function_def(
            name,
            parameters,
            return_type,
            body,
        ))),
    }
}

pub fn methods(record: &str, methods: Vec<FunctionDefinition>) -> Item {
    Item {
        span: Span::DUMMY,
        kind: ItemKind::Methods(Box::new(MethodBlock {
            span: Span::DUMMY,
            record: ident(record),
            methods,
        })),
    }
}

/* Expressions */

pub fn int(value: i64) -> Expression {
    expression(ExpressionKind::Literal(Literal::Integer(value)))
}

pub fn boolean(value: bool) -> Expression {
    expression(ExpressionKind::Literal(Literal::Boolean(value)))
}

pub fn string(value: &str) -> Expression {
    expression(ExpressionKind::Literal(Literal::String(InternedSymbol::new(
        value,
    ))))
}

pub fn unit() -> Expression {
    expression(ExpressionKind::Literal(Literal::Unit))
}

pub fn var(name: &str) -> Expression {
    expression(ExpressionKind::Identifier(ident(name)))
}

pub fn let_in(name: &str, value: Expression, body: Expression) -> Expression {
    expression(ExpressionKind::Let {
        name: ident(name),
        ty: None,
        value: Box::new(value),
        body: Box::new(body),
    })
}

pub fn let_typed(name: &str, ty: Type, value: Expression, body: Expression) -> Expression {
    expression(ExpressionKind::Let {
        name: ident(name),
        ty: Some(Box::new(ty)),
        value: Box::new(value),
        body: Box::new(body),
    })
}

pub fn block(expressions: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Block(expressions))
}

pub fn if_else(condition: Expression, positive: Expression, negative: Expression) -> Expression {
    expression(ExpressionKind::If {
        condition: Box::new(condition),
        positive: Box::new(positive),
        negative: Some(Box::new(negative)),
    })
}

pub fn if_then(condition: Expression, positive: Expression) -> Expression {
    expression(ExpressionKind::If {
        condition: Box::new(condition),
        positive: Box::new(positive),
        negative: None,
    })
}

pub fn record(name: &str, fields: Vec<(&str, Expression)>) -> Expression {
    expression(ExpressionKind::Record {
        name: ident(name),
        fields: fields
            .into_iter()
            .map(|(name, value)| FieldInitializer {
                span: Span::DUMMY,
                name: ident(name),
                value,
            })
            .collect(),
    })
}

pub fn field(target: Expression, name: &str) -> Expression {
    expression(ExpressionKind::Field {
        target: Box::new(target),
        field: ident(name),
    })
}

pub fn call(name: &str, arguments: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Call {
        target: Box::new(var(name)),
        arguments,
    })
}

pub fn call_value(target: Expression, arguments: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Call {
        target: Box::new(target),
        arguments,
    })
}

pub fn method_call(receiver: Expression, method: &str, arguments: Vec<Expression>) -> Expression {
    expression(ExpressionKind::MethodCall {
        receiver: Box::new(receiver),
        method: ident(method),
        arguments,
    })
}

pub fn match_on(scrutinee: Expression, arms: Vec<MatchArm>) -> Expression {
    expression(ExpressionKind::Match {
        scrutinee: Box::new(scrutinee),
        arms,
    })
}

pub fn list(elements: Vec<Expression>) -> Expression {
    expression(ExpressionKind::List(elements))
}

pub fn binary(lhs: Expression, operator: BinaryOperatorKind, rhs: Expression) -> Expression {
    expression(ExpressionKind::Binary {
        lhs: Box::new(lhs),
        operator,
        rhs: Box::new(rhs),
    })
}

pub fn unary(operator: UnaryOperatorKind, operand: Expression) -> Expression {
    expression(ExpressionKind::Unary {
        operator,
        operand: Box::new(operand),
    })
}

/* Match arms and patterns */

pub fn arm(pattern: Pattern, body: Expression) -> MatchArm {
    MatchArm {
        span: Span::DUMMY,
        pattern,
        guard: None,
        body,
    }
}

pub fn guarded_arm(pattern: Pattern, guard: Expression, body: Expression) -> MatchArm {
    MatchArm {
        span: Span::DUMMY,
        pattern,
        guard: Some(guard),
        body,
    }
}

fn pattern(kind: PatternKind) -> Pattern {
    Pattern {
        span: Span::DUMMY,
        kind,
    }
}

pub fn wildcard() -> Pattern {
    pattern(PatternKind::Wildcard)
}

pub fn bind(name: &str) -> Pattern {
    pattern(PatternKind::Binding(ident(name)))
}

pub fn int_pattern(value: i64) -> Pattern {
    pattern(PatternKind::Literal(Literal::Integer(value)))
}

pub fn bool_pattern(value: bool) -> Pattern {
    pattern(PatternKind::Literal(Literal::Boolean(value)))
}

pub fn string_pattern(value: &str) -> Pattern {
    pattern(PatternKind::Literal(Literal::String(InternedSymbol::new(
        value,
    ))))
}

pub fn record_pattern(name: &str, fields: Vec<(&str, Pattern)>) -> Pattern {
    pattern(PatternKind::Record {
        name: ident(name),
        fields: fields
            .into_iter()
            .map(|(name, pattern)| FieldPattern {
                span: Span::DUMMY,
                name: ident(name),
                pattern,
            })
            .collect(),
    })
}
