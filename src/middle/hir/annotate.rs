//! Turns a typed program back into source form with every type spelled out.
//! Checking the output again must give exactly the same types.

use super::{
    Callee, FunctionKind, LocalId, TypedExpression, TypedExpressionKind, TypedFunction,
    TypedPattern, TypedPatternKind, TypedProgram,
};
use crate::{
    frontend::{
        Span,
        ast::{self, Identifier},
        intern::InternedSymbol,
    },
    middle::ty::{Type, TypeKind},
};

impl TypedProgram {
    /// Records first, then functions in declaration order. Consecutive
    /// methods of the same record share one method block.
    pub fn annotated(&self) -> ast::Program {
        let mut items = Vec::new();

        for record in self.records.iter() {
            items.push(ast::Item {
                span: record.span,
                kind: ast::ItemKind::Record(Box::new(ast::RecordDefinition {
                    span: record.span,
                    name: identifier(record.span, record.name),
                    fields: record
                        .fields
                        .iter()
                        .map(|field| ast::RecordField {
                            span: field.span,
                            name: identifier(field.span, field.name),
                            ty: annotation(&field.ty, field.span),
                        })
                        .collect(),
                })),
            });
        }

        for function in &self.functions {
            let definition = FunctionAnnotator { function }.definition();

            match function.kind {
                FunctionKind::Free => items.push(ast::Item {
                    span: function.span,
                    kind: ast::ItemKind::Function(Box::new(definition)),
                }),
                FunctionKind::Method { record, .. } => {
                    if let Some(ast::Item {
                        kind: ast::ItemKind::Methods(block),
                        ..
                    }) = items.last_mut()
                    {
                        if block.record.symbol == record {
                            block.methods.push(definition);
                            continue;
                        }
                    }

                    items.push(ast::Item {
                        span: function.span,
                        kind: ast::ItemKind::Methods(Box::new(ast::MethodBlock {
                            span: function.span,
                            record: identifier(function.span, record),
                            methods: vec![definition],
                        })),
                    });
                }
            }
        }

        ast::Program { items }
    }
}

fn identifier(span: Span, symbol: InternedSymbol) -> Identifier {
    Identifier { span, symbol }
}

/// Spells a resolved type the way it would be written in an annotation
pub fn annotation(ty: &Type, span: Span) -> ast::Type {
    let kind = match &**ty {
        TypeKind::List(element) => ast::TypeKind::List(Some(Box::new(annotation(element, span)))),
        TypeKind::Function {
            parameters,
            return_type,
        } => ast::TypeKind::Function {
            parameters: parameters.iter().map(|ty| annotation(ty, span)).collect(),
            return_type: Box::new(annotation(return_type, span)),
        },
        TypeKind::Record(name) => ast::TypeKind::Named(identifier(span, *name)),
        // Primitives print as their source spelling. Unresolved types never
        // reach a checked program.
        other => ast::TypeKind::Named(identifier(span, InternedSymbol::new(&other.to_string()))),
    };

    ast::Type { span, kind }
}

struct FunctionAnnotator<'a> {
    function: &'a TypedFunction,
}

impl FunctionAnnotator<'_> {
    fn local_name(&self, local: LocalId) -> Identifier {
        let local = &self.function.locals[local];
        identifier(local.span, local.name)
    }

    fn definition(&self) -> ast::FunctionDefinition {
        let function = self.function;

        let (name, explicit_parameters) = match function.kind {
            FunctionKind::Free => (function.name, &function.parameters[..]),
            // The receiver is implicit in source
            FunctionKind::Method { method, .. } => {
                (method, function.parameters.get(1..).unwrap_or_default())
            }
        };

        ast::FunctionDefinition {
            span: function.span,
            name: identifier(function.span, name),
            parameters: explicit_parameters
                .iter()
                .map(|&local| {
                    let declared = &function.locals[local];
                    ast::FunctionParameter {
                        span: declared.span,
                        name: identifier(declared.span, declared.name),
                        ty: annotation(&declared.ty, declared.span),
                    }
                })
                .collect(),
            return_type: Some(annotation(&function.return_type, function.span)),
            body: self.expression(&function.body),
        }
    }

    fn boxed(&self, expression: &TypedExpression) -> Box<ast::Expression> {
        Box::new(self.expression(expression))
    }

    fn expressions(&self, expressions: &[TypedExpression]) -> Vec<ast::Expression> {
        expressions.iter().map(|e| self.expression(e)).collect()
    }

    fn expression(&self, expression: &TypedExpression) -> ast::Expression {
        let span = expression.span;

        let kind = match &expression.kind {
            TypedExpressionKind::Literal(literal) => ast::ExpressionKind::Literal(*literal),
            TypedExpressionKind::Local(local) => {
                ast::ExpressionKind::Identifier(identifier(span, self.local_name(*local).symbol))
            }
            TypedExpressionKind::Function(symbol) => {
                ast::ExpressionKind::Identifier(identifier(span, *symbol))
            }
            TypedExpressionKind::Let { local, value, body } => {
                let declared = &self.function.locals[*local];

                ast::ExpressionKind::Let {
                    name: self.local_name(*local),
                    ty: Some(Box::new(annotation(&declared.ty, declared.span))),
                    value: self.boxed(value),
                    body: self.boxed(body),
                }
            }
            TypedExpressionKind::Block(expressions) => {
                ast::ExpressionKind::Block(self.expressions(expressions))
            }
            TypedExpressionKind::If {
                condition,
                positive,
                negative,
            } => ast::ExpressionKind::If {
                condition: self.boxed(condition),
                positive: self.boxed(positive),
                negative: negative.as_ref().map(|n| self.boxed(n)),
            },
            TypedExpressionKind::Record { record, fields } => ast::ExpressionKind::Record {
                name: identifier(span, *record),
                fields: fields
                    .iter()
                    .map(|field| ast::FieldInitializer {
                        span: field.span,
                        name: identifier(field.span, field.name),
                        value: self.expression(&field.value),
                    })
                    .collect(),
            },
            TypedExpressionKind::Field { target, name, .. } => ast::ExpressionKind::Field {
                target: self.boxed(target),
                field: identifier(span, *name),
            },
            TypedExpressionKind::Call { callee, arguments } => match callee {
                Callee::Function(symbol) => ast::ExpressionKind::Call {
                    target: Box::new(ast::Expression {
                        span,
                        kind: ast::ExpressionKind::Identifier(identifier(span, *symbol)),
                    }),
                    arguments: self.expressions(arguments),
                },
                Callee::Method { method, .. } => match arguments.split_first() {
                    Some((receiver, rest)) => ast::ExpressionKind::MethodCall {
                        receiver: self.boxed(receiver),
                        method: identifier(span, *method),
                        arguments: self.expressions(rest),
                    },
                    None => ast::ExpressionKind::Literal(ast::Literal::Unit),
                },
                Callee::Value(target) => ast::ExpressionKind::Call {
                    target: self.boxed(target),
                    arguments: self.expressions(arguments),
                },
            },
            TypedExpressionKind::Match {
                scrutinee, arms, ..
            } => ast::ExpressionKind::Match {
                scrutinee: self.boxed(scrutinee),
                arms: arms
                    .iter()
                    .map(|arm| ast::MatchArm {
                        span: arm.span,
                        pattern: self.pattern(&arm.pattern),
                        guard: arm.guard.as_ref().map(|g| self.expression(g)),
                        body: self.expression(&arm.body),
                    })
                    .collect(),
            },
            TypedExpressionKind::List(elements) => {
                ast::ExpressionKind::List(self.expressions(elements))
            }
            TypedExpressionKind::Binary { lhs, operator, rhs } => ast::ExpressionKind::Binary {
                lhs: self.boxed(lhs),
                operator: *operator,
                rhs: self.boxed(rhs),
            },
            TypedExpressionKind::Unary { operator, operand } => ast::ExpressionKind::Unary {
                operator: *operator,
                operand: self.boxed(operand),
            },
        };

        ast::Expression { span, kind }
    }

    fn pattern(&self, pattern: &TypedPattern) -> ast::Pattern {
        let span = pattern.span;

        let kind = match &pattern.kind {
            TypedPatternKind::Wildcard => ast::PatternKind::Wildcard,
            TypedPatternKind::Binding(local) => ast::PatternKind::Binding(self.local_name(*local)),
            TypedPatternKind::Literal(literal) => ast::PatternKind::Literal(*literal),
            TypedPatternKind::Record { record, fields } => ast::PatternKind::Record {
                name: identifier(span, *record),
                fields: fields
                    .iter()
                    .map(|field| ast::FieldPattern {
                        span: field.span,
                        name: identifier(field.span, field.name),
                        pattern: self.pattern(&field.pattern),
                    })
                    .collect(),
            },
        };

        ast::Pattern { span, kind }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::ast::{BinaryOperatorKind, build::*},
        middle::{
            hir::visit::{Visitor, walk_function},
            type_checking::infer,
        },
    };

    /// Every type mentioned in each function, keyed by function name
    struct TypeCollector {
        types: Vec<String>,
    }

    impl Visitor for TypeCollector {
        fn visit_type(&mut self, ty: &Type) {
            self.types.push(ty.to_string());
        }
    }

    fn collect_types(program: &TypedProgram) -> BTreeMap<String, Vec<String>> {
        program
            .functions
            .iter()
            .map(|function| {
                let mut collector = TypeCollector { types: Vec::new() };
                walk_function(&mut collector, function);
                (function.name.value().to_owned(), collector.types)
            })
            .collect()
    }

    #[test]
    fn annotated_program_infers_the_same_types() {
        let program = program(vec![
            record_def("Record", &[("lang", ty("str")), ("time", ty("int"))]),
            methods(
                "Record",
                vec![
                    function_def(
                        "method",
                        &[("s", ty("int")), ("i", ty("int"))],
                        Some(ty("int")),
                        binary(var("s"), BinaryOperatorKind::Add, var("i")),
                    ),
                    function_def("later", &[], None, field(var("self"), "time")),
                ],
            ),
            function(
                "foofoo",
                &[("value", ty("Record"))],
                None,
                let_in(
                    "ys",
                    list(vec![var("value")]),
                    match_on(
                        field(var("value"), "lang"),
                        vec![
                            arm(string_pattern("rill"), method_call(var("value"), "later", vec![])),
                            arm(bind("other"), int(0)),
                        ],
                    ),
                ),
            ),
        ]);

        let first = infer(&program).unwrap();
        let annotated = first.annotated();
        let second = infer(&annotated).unwrap();

        assert_eq!(collect_types(&first), collect_types(&second));
        assert_eq!(first.functions.len(), second.functions.len());
    }

    #[test]
    fn consecutive_methods_share_a_block() {
        let program = program(vec![
            record_def("Point", &[("x", ty("int"))]),
            methods(
                "Point",
                vec![
                    function_def("a", &[], None, int(1)),
                    function_def("b", &[], None, int(2)),
                ],
            ),
        ]);

        let annotated = infer(&program).unwrap().annotated();

        assert_eq!(annotated.items.len(), 2);
        let ast::ItemKind::Methods(block) = &annotated.items[1].kind else {
            panic!("expected a method block");
        };
        assert_eq!(block.methods.len(), 2);
        assert!(block.methods.iter().all(|m| m.parameters.is_empty()));
    }
}
