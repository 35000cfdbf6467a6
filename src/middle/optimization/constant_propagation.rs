use hashbrown::HashMap;

use super::FunctionPass;
use crate::middle::lir::{self, Immediate, Operand, RegisterId};

/// Replaces reads of registers which only ever hold one immediate with the
/// immediate itself. The moves stay behind for dead code elimination.
pub struct ConstantPropagationPass;

impl FunctionPass for ConstantPropagationPass {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn run_on_function(&mut self, function: &mut lir::Function) -> bool {
        let constants = find_constants(function);

        if constants.is_empty() {
            return false;
        }

        let mut changed = false;
        for block in function.blocks.iter_mut() {
            for instruction in &mut block.instructions {
                instruction.for_each_operand_mut(|operand| {
                    let Operand::Register(register) = operand else {
                        return;
                    };

                    if let Some(&value) = constants.get(register) {
                        *operand = Operand::Immediate(value);
                        changed = true;
                    }
                });
            }
        }

        changed
    }
}

/// Registers with exactly one definition, that definition being a move of an
/// immediate. Parameters are defined by the caller so never qualify.
fn find_constants(function: &lir::Function) -> HashMap<RegisterId, Immediate> {
    let mut constant_map = HashMap::new();
    let mut definitions: HashMap<RegisterId, usize> = HashMap::new();

    for instruction in function.blocks.iter().flat_map(|b| &b.instructions) {
        let Some(destination) = instruction.def() else {
            continue;
        };

        *definitions.entry(destination).or_default() += 1;

        if let lir::Instruction::Move {
            source: Operand::Immediate(value),
            ..
        } = instruction
        {
            constant_map.insert(destination, *value);
        }
    }

    constant_map.retain(|register, _| {
        definitions.get(register) == Some(&1) && !function.parameters.contains(register)
    });

    constant_map
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        frontend::intern::InternedSymbol,
        index::{Index, IndexVec},
        middle::{
            lir::{Block, BlockId, Instruction, Register},
            primitive::PrimitiveKind,
            ty::TypeContext,
        },
    };

    fn r(n: usize) -> RegisterId {
        RegisterId::new(n)
    }

    fn function(parameters: Vec<RegisterId>, instructions: Vec<Instruction>) -> lir::Function {
        let mut types = TypeContext::new();
        let int = types.get_primitive_type(PrimitiveKind::Int);

        lir::Function {
            name: InternedSymbol::new("propagated"),
            parameters,
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
    fn single_immediate_definition_is_propagated() {
        let mut function = function(
            vec![],
            vec![
                Instruction::Move {
                    destination: r(0),
                    source: Operand::Immediate(Immediate::Int(3)),
                },
                Instruction::Return {
                    value: Operand::Register(r(0)),
                },
            ],
        );

        assert!(ConstantPropagationPass.run_on_function(&mut function));
        assert_eq!(
            function.blocks[BlockId::ZERO].instructions[1],
            Instruction::Return {
                value: Operand::Immediate(Immediate::Int(3))
            }
        );
        assert!(!ConstantPropagationPass.run_on_function(&mut function));
    }

    #[test]
    fn registers_assigned_twice_are_left_alone() {
        let mut function = function(
            vec![],
            vec![
                Instruction::Move {
                    destination: r(0),
                    source: Operand::Immediate(Immediate::Int(3)),
                },
                Instruction::Move {
                    destination: r(0),
                    source: Operand::Immediate(Immediate::Int(4)),
                },
                Instruction::Return {
                    value: Operand::Register(r(0)),
                },
            ],
        );

        assert!(!ConstantPropagationPass.run_on_function(&mut function));
    }

    #[test]
    fn parameters_are_never_constant() {
        let mut function = function(
            vec![r(0)],
            vec![
                Instruction::Move {
                    destination: r(0),
                    source: Operand::Immediate(Immediate::Int(3)),
                },
                Instruction::Return {
                    value: Operand::Register(r(0)),
                },
            ],
        );

        assert!(!ConstantPropagationPass.run_on_function(&mut function));
    }

    #[test]
    fn field_objects_keep_their_register() {
        let mut function = function(
            vec![],
            vec![
                Instruction::Move {
                    destination: r(0),
                    source: Operand::Immediate(Immediate::Unit),
                },
                Instruction::LoadField {
                    destination: r(1),
                    object: r(0),
                    index: 0,
                },
                Instruction::Return {
                    value: Operand::Register(r(1)),
                },
            ],
        );

        assert!(!ConstantPropagationPass.run_on_function(&mut function));
        assert!(matches!(
            function.blocks[BlockId::ZERO].instructions[1],
            Instruction::LoadField { object, .. } if object == r(0)
        ));
    }
}
