use super::FunctionPass;
use crate::{
    frontend::ast::{BinaryOperatorKind, UnaryOperatorKind},
    middle::lir::{self, Immediate, Instruction, Operand},
};

/// Evaluates operations whose operands are all immediates, and turns
/// branches on an immediate condition into jumps
pub struct ConstantFoldingPass;

impl FunctionPass for ConstantFoldingPass {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run_on_function(&mut self, function: &mut lir::Function) -> bool {
        let mut changed = false;
        let mut cfg_changed = false;

        for block in function.blocks.iter_mut() {
            for instruction in &mut block.instructions {
                let folded = match instruction {
                    Instruction::BinaryOperation {
                        operator,
                        destination,
                        lhs: Operand::Immediate(lhs),
                        rhs: Operand::Immediate(rhs),
                    } => fold_binary(*operator, *lhs, *rhs).map(|value| Instruction::Move {
                        destination: *destination,
                        source: Operand::Immediate(value),
                    }),
                    Instruction::UnaryOperation {
                        operator,
                        destination,
                        operand: Operand::Immediate(operand),
                    } => fold_unary(*operator, *operand).map(|value| Instruction::Move {
                        destination: *destination,
                        source: Operand::Immediate(value),
                    }),
                    Instruction::Branch {
                        condition: Operand::Immediate(Immediate::Bool(condition)),
                        positive,
                        negative,
                    } => {
                        cfg_changed = true;
                        Some(Instruction::Jump {
                            destination: if *condition { *positive } else { *negative },
                        })
                    }
                    _ => None,
                };

                if let Some(folded) = folded {
                    *instruction = folded;
                    changed = true;
                }
            }
        }

        if cfg_changed {
            function.recompute_predecessors();
        }

        changed
    }
}

pub fn fold_binary(operator: BinaryOperatorKind, lhs: Immediate, rhs: Immediate) -> Option<Immediate> {
    use BinaryOperatorKind as Op;

    let value = match (lhs, rhs) {
        (Immediate::Int(lhs), Immediate::Int(rhs)) => match operator {
            Op::Add => Immediate::Int(lhs.wrapping_add(rhs)),
            Op::Subtract => Immediate::Int(lhs.wrapping_sub(rhs)),
            Op::Multiply => Immediate::Int(lhs.wrapping_mul(rhs)),
            // Division by zero is left for the program to trip over
            Op::Divide => Immediate::Int(lhs.checked_div(rhs)?),
            Op::Modulus => Immediate::Int(lhs.checked_rem(rhs)?),
            Op::Equals => Immediate::Bool(lhs == rhs),
            Op::NotEquals => Immediate::Bool(lhs != rhs),
            Op::LessThan => Immediate::Bool(lhs < rhs),
            Op::LessThanOrEqualTo => Immediate::Bool(lhs <= rhs),
            Op::GreaterThan => Immediate::Bool(lhs > rhs),
            Op::GreaterThanOrEqualTo => Immediate::Bool(lhs >= rhs),
            Op::LogicalAnd | Op::LogicalOr => return None,
        },
        (Immediate::Bool(lhs), Immediate::Bool(rhs)) => match operator {
            Op::LogicalAnd => Immediate::Bool(lhs && rhs),
            Op::LogicalOr => Immediate::Bool(lhs || rhs),
            Op::Equals => Immediate::Bool(lhs == rhs),
            Op::NotEquals => Immediate::Bool(lhs != rhs),
            _ => return None,
        },
        (lhs, rhs) if std::mem::discriminant(&lhs) == std::mem::discriminant(&rhs) => {
            match operator {
                Op::Equals => Immediate::Bool(lhs == rhs),
                Op::NotEquals => Immediate::Bool(lhs != rhs),
                _ => return None,
            }
        }
        _ => return None,
    };

    Some(value)
}

pub fn fold_unary(operator: UnaryOperatorKind, operand: Immediate) -> Option<Immediate> {
    match (operator, operand) {
        (UnaryOperatorKind::LogicalNot, Immediate::Bool(value)) => Some(Immediate::Bool(!value)),
        (UnaryOperatorKind::Negate, Immediate::Int(value)) => {
            Some(Immediate::Int(value.wrapping_neg()))
        }
        _ => None,
    }
}
