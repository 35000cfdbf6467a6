//! Structural checks on lowered functions. Lowering and every optimization
//! pass must leave a function in a shape these checks accept, so a failure
//! here is always a bug in the compiler and never in the program.

use std::collections::BTreeSet;

use thiserror::Error;

use super::{BlockId, Function, RegisterId};
use crate::{
    frontend::intern::InternedSymbol,
    index::Index,
    middle::hir::{LocalId, MatchId},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoweringError {
    #[error("`{function}` has no blocks")]
    EmptyFunction { function: InternedSymbol },
    #[error("block {block} in `{function}` does not end in a terminator")]
    MissingTerminator {
        function: InternedSymbol,
        block: BlockId,
    },
    #[error("block {block} in `{function}` has a terminator before its last instruction")]
    MisplacedTerminator {
        function: InternedSymbol,
        block: BlockId,
    },
    #[error("block {block} in `{function}` branches to missing block {target}")]
    InvalidSuccessor {
        function: InternedSymbol,
        block: BlockId,
        target: BlockId,
    },
    #[error("predecessors of block {block} in `{function}` are out of date")]
    StalePredecessors {
        function: InternedSymbol,
        block: BlockId,
    },
    #[error("register %{} in `{function}` was never created", register.index())]
    UnknownRegister {
        function: InternedSymbol,
        register: RegisterId,
    },
    #[error("no return is reachable from the entry of `{function}`")]
    NoReachableReturn { function: InternedSymbol },
    #[error("local #{} in `{function}` is used before it has a register", local.index())]
    UnknownLocal {
        function: InternedSymbol,
        local: LocalId,
    },
    #[error("match #{} in `{function}` has no decision tree", id.index())]
    MissingDecisionTree {
        function: InternedSymbol,
        id: MatchId,
    },
    #[error("`{function}` contains a match failure which pattern checking should have rejected")]
    UnexpectedMatchFailure { function: InternedSymbol },
    #[error("no type is known for `{occurrence}` of match #{} in `{function}`", id.index())]
    UnknownOccurrence {
        function: InternedSymbol,
        id: MatchId,
        occurrence: String,
    },
    #[error("type `{ty}` of a value in `{function}` was never resolved")]
    UnresolvedType {
        function: InternedSymbol,
        ty: String,
    },
}

pub fn verify(function: &Function) -> Result<(), LoweringError> {
    let name = function.name;

    if function.blocks.is_empty() {
        return Err(LoweringError::EmptyFunction { function: name });
    }

    for block in function.blocks.iter() {
        let Some((last, rest)) = block.instructions.split_last() else {
            return Err(LoweringError::MissingTerminator {
                function: name,
                block: block.id,
            });
        };

        if !last.is_terminator() {
            return Err(LoweringError::MissingTerminator {
                function: name,
                block: block.id,
            });
        }

        if rest.iter().any(|i| i.is_terminator()) {
            return Err(LoweringError::MisplacedTerminator {
                function: name,
                block: block.id,
            });
        }

        for target in last.successors() {
            if target.index() >= function.blocks.len() {
                return Err(LoweringError::InvalidSuccessor {
                    function: name,
                    block: block.id,
                    target,
                });
            }
        }

        for instruction in &block.instructions {
            let registers = instruction.def().into_iter().chain(instruction.uses());
            for register in registers {
                if register.index() >= function.registers.len() {
                    return Err(LoweringError::UnknownRegister {
                        function: name,
                        register,
                    });
                }
            }
        }
    }

    let mut expected = function.clone();
    expected.recompute_predecessors();
    for (actual, expected) in function.blocks.iter().zip(expected.blocks.iter()) {
        if actual.predecessors != expected.predecessors {
            return Err(LoweringError::StalePredecessors {
                function: name,
                block: actual.id,
            });
        }
    }

    if !reachable_blocks(function)
        .iter()
        .any(|&block| function.blocks[block].returns())
    {
        return Err(LoweringError::NoReachableReturn { function: name });
    }

    Ok(())
}

/// Blocks reachable from the entry following terminators
pub fn reachable_blocks(function: &Function) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::new();
    let mut worklist = vec![function.entry()];

    while let Some(block) = worklist.pop() {
        if !seen.insert(block) {
            continue;
        }

        if let Some(block) = function.blocks.get(block) {
            worklist.extend(block.successors());
        }
    }

    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::IndexVec,
        middle::{
            lir::{Block, Immediate, Instruction, Operand, Register},
            ty::TypeContext,
        },
    };

    fn function(blocks: Vec<Vec<Instruction>>) -> Function {
        let mut types = TypeContext::new();
        let mut function = Function {
            name: InternedSymbol::new("verified"),
            parameters: vec![],
            registers: IndexVec::from_raw(vec![Register {
                id: RegisterId::new(0),
                ty: types.get_primitive_type(crate::middle::primitive::PrimitiveKind::Bool),
            }]),
            blocks: blocks
                .into_iter()
                .enumerate()
                .map(|(i, instructions)| Block {
                    id: BlockId::new(i),
                    instructions,
                    predecessors: BTreeSet::new(),
                })
                .collect(),
        };
        function.recompute_predecessors();
        function
    }

    fn ret() -> Instruction {
        Instruction::Return {
            value: Operand::Immediate(Immediate::Unit),
        }
    }

    #[test]
    fn accepts_a_diamond() {
        let branch = Instruction::Branch {
            condition: Operand::Immediate(Immediate::Bool(true)),
            positive: BlockId::new(1),
            negative: BlockId::new(2),
        };
        let jump = Instruction::Jump {
            destination: BlockId::new(3),
        };

        let diamond = function(vec![vec![branch], vec![jump.clone()], vec![jump], vec![ret()]]);
        assert_eq!(verify(&diamond), Ok(()));
    }

    #[test]
    fn rejects_a_block_without_terminator() {
        let unterminated = function(vec![vec![Instruction::Move {
            destination: RegisterId::new(0),
            source: Operand::Immediate(Immediate::Bool(false)),
        }]]);

        assert!(matches!(
            verify(&unterminated),
            Err(LoweringError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn rejects_jumps_to_missing_blocks() {
        let dangling = function(vec![vec![Instruction::Jump {
            destination: BlockId::new(7),
        }]]);

        assert!(matches!(
            verify(&dangling),
            Err(LoweringError::InvalidSuccessor { .. })
        ));
    }

    #[test]
    fn rejects_functions_that_never_return() {
        let looping = function(vec![vec![Instruction::Jump {
            destination: BlockId::new(0),
        }]]);

        assert_eq!(
            verify(&looping),
            Err(LoweringError::NoReachableReturn {
                function: InternedSymbol::new("verified")
            })
        );
    }

    #[test]
    fn rejects_instructions_after_a_terminator() {
        let trailing = function(vec![vec![ret(), ret()]]);

        assert!(matches!(
            verify(&trailing),
            Err(LoweringError::MisplacedTerminator { .. })
        ));
    }
}
