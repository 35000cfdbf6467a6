use super::{
    Callee, TypedExpression, TypedExpressionKind, TypedFunction, TypedMatchArm, TypedPattern,
    TypedPatternKind,
};
use crate::middle::ty::Type;

pub trait Visitor: Sized {
    fn visit_function(&mut self, function: &TypedFunction) {
        walk_function(self, function)
    }

    fn visit_expression(&mut self, expression: &TypedExpression) {
        walk_expression(self, expression)
    }

    fn visit_match_arm(&mut self, arm: &TypedMatchArm) {
        walk_match_arm(self, arm)
    }

    fn visit_pattern(&mut self, pattern: &TypedPattern) {
        walk_pattern(self, pattern)
    }

    fn visit_type(&mut self, _ty: &Type) {}
}

pub fn walk_function(visitor: &mut impl Visitor, function: &TypedFunction) {
    for local in function.locals.iter() {
        visitor.visit_type(&local.ty);
    }

    visitor.visit_type(&function.return_type);
    visitor.visit_expression(&function.body);
}

pub fn walk_expression(visitor: &mut impl Visitor, expression: &TypedExpression) {
    visitor.visit_type(&expression.ty);

    match &expression.kind {
        TypedExpressionKind::Literal(_)
        | TypedExpressionKind::Local(_)
        | TypedExpressionKind::Function(_) => {}
        TypedExpressionKind::Let { value, body, .. } => {
            visitor.visit_expression(value);
            visitor.visit_expression(body);
        }
        TypedExpressionKind::Block(expressions) | TypedExpressionKind::List(expressions) => {
            for expression in expressions {
                visitor.visit_expression(expression);
            }
        }
        TypedExpressionKind::If {
            condition,
            positive,
            negative,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(positive);
            if let Some(negative) = negative {
                visitor.visit_expression(negative);
            }
        }
        TypedExpressionKind::Record { fields, .. } => {
            for field in fields {
                visitor.visit_expression(&field.value);
            }
        }
        TypedExpressionKind::Field { target, .. } => visitor.visit_expression(target),
        TypedExpressionKind::Call { callee, arguments } => {
            if let Callee::Value(target) = callee {
                visitor.visit_expression(target);
            }

            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
        TypedExpressionKind::Match {
            scrutinee, arms, ..
        } => {
            visitor.visit_expression(scrutinee);
            for arm in arms {
                visitor.visit_match_arm(arm);
            }
        }
        TypedExpressionKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        TypedExpressionKind::Unary { operand, .. } => visitor.visit_expression(operand),
    }
}

pub fn walk_match_arm(visitor: &mut impl Visitor, arm: &TypedMatchArm) {
    visitor.visit_pattern(&arm.pattern);
    if let Some(guard) = &arm.guard {
        visitor.visit_expression(guard);
    }
    visitor.visit_expression(&arm.body);
}

pub fn walk_pattern(visitor: &mut impl Visitor, pattern: &TypedPattern) {
    visitor.visit_type(&pattern.ty);

    if let TypedPatternKind::Record { fields, .. } = &pattern.kind {
        for field in fields {
            visitor.visit_pattern(&field.pattern);
        }
    }
}

/// Same traversal as [`Visitor`] but with mutable access to the tree. Used to
/// substitute resolved types back into a body once inference is done.
pub trait VisitorMut: Sized {
    fn visit_function_mut(&mut self, function: &mut TypedFunction) {
        walk_function_mut(self, function)
    }

    fn visit_expression_mut(&mut self, expression: &mut TypedExpression) {
        walk_expression_mut(self, expression)
    }

    fn visit_pattern_mut(&mut self, pattern: &mut TypedPattern) {
        walk_pattern_mut(self, pattern)
    }

    fn visit_type_mut(&mut self, _ty: &mut Type) {}
}

pub fn walk_function_mut(visitor: &mut impl VisitorMut, function: &mut TypedFunction) {
    for local in function.locals.iter_mut() {
        visitor.visit_type_mut(&mut local.ty);
    }

    visitor.visit_type_mut(&mut function.return_type);
    visitor.visit_expression_mut(&mut function.body);
}

pub fn walk_expression_mut(visitor: &mut impl VisitorMut, expression: &mut TypedExpression) {
    visitor.visit_type_mut(&mut expression.ty);

    match &mut expression.kind {
        TypedExpressionKind::Literal(_)
        | TypedExpressionKind::Local(_)
        | TypedExpressionKind::Function(_) => {}
        TypedExpressionKind::Let { value, body, .. } => {
            visitor.visit_expression_mut(value);
            visitor.visit_expression_mut(body);
        }
        TypedExpressionKind::Block(expressions) | TypedExpressionKind::List(expressions) => {
            for expression in expressions {
                visitor.visit_expression_mut(expression);
            }
        }
        TypedExpressionKind::If {
            condition,
            positive,
            negative,
        } => {
            visitor.visit_expression_mut(condition);
            visitor.visit_expression_mut(positive);
            if let Some(negative) = negative {
                visitor.visit_expression_mut(negative);
            }
        }
        TypedExpressionKind::Record { fields, .. } => {
            for field in fields {
                visitor.visit_expression_mut(&mut field.value);
            }
        }
        TypedExpressionKind::Field { target, .. } => visitor.visit_expression_mut(target),
        TypedExpressionKind::Call { callee, arguments } => {
            if let Callee::Value(target) = callee {
                visitor.visit_expression_mut(target);
            }

            for argument in arguments {
                visitor.visit_expression_mut(argument);
            }
        }
        TypedExpressionKind::Match {
            scrutinee, arms, ..
        } => {
            visitor.visit_expression_mut(scrutinee);
            for arm in arms {
                visitor.visit_pattern_mut(&mut arm.pattern);
                if let Some(guard) = &mut arm.guard {
                    visitor.visit_expression_mut(guard);
                }
                visitor.visit_expression_mut(&mut arm.body);
            }
        }
        TypedExpressionKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expression_mut(lhs);
            visitor.visit_expression_mut(rhs);
        }
        TypedExpressionKind::Unary { operand, .. } => visitor.visit_expression_mut(operand),
    }
}

pub fn walk_pattern_mut(visitor: &mut impl VisitorMut, pattern: &mut TypedPattern) {
    visitor.visit_type_mut(&mut pattern.ty);

    if let TypedPatternKind::Record { fields, .. } = &mut pattern.kind {
        for field in fields {
            visitor.visit_pattern_mut(&mut field.pattern);
        }
    }
}
