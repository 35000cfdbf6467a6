use super::FunctionPass;
use crate::{backend::liveness::Liveness, middle::lir};

/// Removes pure instructions whose result is never read
pub struct DeadCodeEliminationPass;

impl FunctionPass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run_on_function(&mut self, function: &mut lir::Function) -> bool {
        let liveness = Liveness::compute(function);
        let mut changed = false;

        for block in function.blocks.iter_mut() {
            let mut live = liveness.live_out[block.id].clone();
            let mut kept = Vec::with_capacity(block.instructions.len());

            for instruction in block.instructions.drain(..).rev() {
                if let Some(def) = instruction.def() {
                    if instruction.is_pure() && !live.contains(&def) {
                        changed = true;
                        continue;
                    }

                    live.remove(&def);
                }

                live.extend(instruction.uses());
                kept.push(instruction);
            }

            kept.reverse();
            block.instructions = kept;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        frontend::{ast::BinaryOperatorKind, intern::InternedSymbol},
        index::{Index, IndexVec},
        middle::{
            lir::{Block, BlockId, Callee, Immediate, Instruction, Operand, Register, RegisterId},
            primitive::PrimitiveKind,
            ty::TypeContext,
        },
    };

    fn r(n: usize) -> RegisterId {
        RegisterId::new(n)
    }

    fn function(instructions: Vec<Instruction>) -> lir::Function {
        let mut types = TypeContext::new();
        let int = types.get_primitive_type(PrimitiveKind::Int);

        lir::Function {
            name: InternedSymbol::new("dead"),
            parameters: vec![r(0)],
            registers: (0..4)
                .map(|n| Register {
                    id: r(n),
                    ty: int.clone(),
                })
                .collect(),
            blocks: IndexVec::from_raw(vec![Block {
                id: BlockId::ZERO,
                instructions,
                predecessors: BTreeSet::new(),
            }]),
        }
    }

    #[test]
    fn unused_chains_disappear_in_one_run() {
        let mut function = function(vec![
            Instruction::BinaryOperation {
                operator: BinaryOperatorKind::Add,
                destination: r(1),
                lhs: Operand::Register(r(0)),
                rhs: Operand::Immediate(Immediate::Int(1)),
            },
            Instruction::Move {
                destination: r(2),
                source: Operand::Register(r(1)),
            },
            Instruction::Return {
                value: Operand::Register(r(0)),
            },
        ]);

        assert!(DeadCodeEliminationPass.run_on_function(&mut function));
        assert_eq!(function.instruction_count(), 1);
    }

    #[test]
    fn calls_and_divisions_are_kept() {
        let mut function = function(vec![
            Instruction::Call {
                callee: Callee::Direct(InternedSymbol::new("effect")),
                arguments: vec![],
                destination: r(1),
            },
            Instruction::BinaryOperation {
                operator: BinaryOperatorKind::Divide,
                destination: r(2),
                lhs: Operand::Register(r(0)),
                rhs: Operand::Immediate(Immediate::Int(0)),
            },
            Instruction::Return {
                value: Operand::Register(r(0)),
            },
        ]);

        assert!(!DeadCodeEliminationPass.run_on_function(&mut function));
        assert_eq!(function.instruction_count(), 3);
    }
}
