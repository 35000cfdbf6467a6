//! LIR (Low-level Intermediate Representation). In this form, conditionals
//! and matches are simplified to labels and jumps, expression trees are
//! flattened into ordered operations on virtual registers, and records and
//! lists become calls into the allocation service plus field stores.
//!
//! Functions are generic over what names a value. Lowering produces virtual
//! [`RegisterId`]s; register allocation swaps them for machine locations.

use std::{collections::BTreeSet, convert::Infallible};

use crate::{
    frontend::{
        ast::{BinaryOperatorKind, UnaryOperatorKind},
        intern::InternedSymbol,
    },
    index::{IndexVec, simple_index},
    middle::ty,
};

pub mod hir_lowering;
pub mod pretty_print;
pub mod verify;

#[derive(Debug, Clone, PartialEq)]
pub struct Function<R = RegisterId> {
    pub name: InternedSymbol,
    pub parameters: Vec<R>,
    /// Every virtual register the function was lowered with, including
    /// temporaries created by spilling
    pub registers: IndexVec<RegisterId, Register>,
    /// The entry block is always [`BlockId::ZERO`]
    pub blocks: IndexVec<BlockId, Block<R>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block<R = RegisterId> {
    pub id: BlockId,
    pub instructions: Vec<Instruction<R>>,
    pub predecessors: BTreeSet<BlockId>,
}

impl<R: Copy> Block<R> {
    pub fn terminator(&self) -> Option<&Instruction<R>> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn returns(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|i| matches!(i, Instruction::Return { .. }))
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator()
            .map(|terminator| terminator.successors())
            .unwrap_or_default()
    }
}

simple_index! {
    /// Identifies an LIR block
    pub struct BlockId;
}

impl BlockId {
    pub const ZERO: Self = Self(0);
}

/// A temporary virtual register holding a value of some type
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Register {
    pub id: RegisterId,
    pub ty: ty::Type,
}

simple_index! {
    /// Identifies a virtual LIR register which holds a temporary value
    pub struct RegisterId;
}

simple_index! {
    /// A stack slot a spilled register lives in
    pub struct SpillSlot;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction<R = RegisterId> {
    Move {
        destination: R,
        source: Operand<R>,
    },
    UnaryOperation {
        operator: UnaryOperatorKind,
        destination: R,
        operand: Operand<R>,
    },
    BinaryOperation {
        operator: BinaryOperatorKind,
        destination: R,
        lhs: Operand<R>,
        rhs: Operand<R>,
    },
    Call {
        callee: Callee<R>,
        arguments: Vec<Operand<R>>,
        destination: R,
    },
    /// Loads the address of a function so it can be passed around as a value
    FunctionAddress {
        destination: R,
        function: InternedSymbol,
    },
    /// Asks the runtime for a new heap object of the given shape
    Allocate {
        destination: R,
        shape: AllocationShape,
        /// Registers holding values still needed after this instruction.
        /// Filled in by register allocation for the collector's stack maps.
        live_across: Vec<R>,
    },
    StoreField {
        object: R,
        index: u32,
        value: Operand<R>,
    },
    LoadField {
        destination: R,
        object: R,
        index: u32,
    },
    SpillStore {
        slot: SpillSlot,
        source: R,
    },
    SpillLoad {
        destination: R,
        slot: SpillSlot,
    },
    Jump {
        destination: BlockId,
    },
    Branch {
        condition: Operand<R>,
        positive: BlockId,
        negative: BlockId,
    },
    Return {
        value: Operand<R>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationShape {
    Record { name: InternedSymbol, fields: u32 },
    List { length: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee<R = RegisterId> {
    Direct(InternedSymbol),
    Indirect(R),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    Int(i64),
    Bool(bool),
    Str(InternedSymbol),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<R = RegisterId> {
    Immediate(Immediate),
    Register(R),
}

impl<R: Copy> Operand<R> {
    pub fn as_register(&self) -> Option<R> {
        match self {
            Operand::Register(register) => Some(*register),
            Operand::Immediate(_) => None,
        }
    }

    pub fn map<S>(self, f: impl FnOnce(R) -> S) -> Operand<S> {
        match self {
            Operand::Immediate(immediate) => Operand::Immediate(immediate),
            Operand::Register(register) => Operand::Register(f(register)),
        }
    }

    pub fn try_map<S, E>(self, f: impl FnOnce(R) -> Result<S, E>) -> Result<Operand<S>, E> {
        Ok(match self {
            Operand::Immediate(immediate) => Operand::Immediate(immediate),
            Operand::Register(register) => Operand::Register(f(register)?),
        })
    }
}

impl<R: Copy> Instruction<R> {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump { .. } | Instruction::Branch { .. } | Instruction::Return { .. }
        )
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instruction::Jump { destination } => vec![*destination],
            Instruction::Branch {
                positive, negative, ..
            } => vec![*positive, *negative],
            _ => Vec::new(),
        }
    }

    /// The register written by this instruction
    pub fn def(&self) -> Option<R> {
        match self {
            Instruction::Move { destination, .. }
            | Instruction::UnaryOperation { destination, .. }
            | Instruction::BinaryOperation { destination, .. }
            | Instruction::Call { destination, .. }
            | Instruction::FunctionAddress { destination, .. }
            | Instruction::Allocate { destination, .. }
            | Instruction::LoadField { destination, .. }
            | Instruction::SpillLoad { destination, .. } => Some(*destination),
            Instruction::StoreField { .. }
            | Instruction::SpillStore { .. }
            | Instruction::Jump { .. }
            | Instruction::Branch { .. }
            | Instruction::Return { .. } => None,
        }
    }

    /// Registers read by this instruction, in operand order. The registers
    /// recorded as live across an allocation are not read by it.
    pub fn uses(&self) -> Vec<R> {
        let mut uses = Vec::new();
        let mut push = |operand: &Operand<R>| uses.extend(operand.as_register());

        match self {
            Instruction::Move { source, .. } => push(source),
            Instruction::UnaryOperation { operand, .. } => push(operand),
            Instruction::BinaryOperation { lhs, rhs, .. } => {
                push(lhs);
                push(rhs);
            }
            Instruction::Call {
                callee, arguments, ..
            } => {
                if let Callee::Indirect(register) = callee {
                    push(&Operand::Register(*register));
                }
                arguments.iter().for_each(push);
            }
            Instruction::StoreField { object, value, .. } => {
                push(&Operand::Register(*object));
                push(value);
            }
            Instruction::LoadField { object, .. } => push(&Operand::Register(*object)),
            Instruction::SpillStore { source, .. } => push(&Operand::Register(*source)),
            Instruction::Branch { condition, .. } => push(condition),
            Instruction::Return { value } => push(value),
            Instruction::FunctionAddress { .. }
            | Instruction::Allocate { .. }
            | Instruction::SpillLoad { .. }
            | Instruction::Jump { .. } => {}
        }

        uses
    }

    /// Removing a pure instruction whose result is unused can't change what
    /// the program does
    pub fn is_pure(&self) -> bool {
        match self {
            Instruction::BinaryOperation { operator, .. } => !matches!(
                operator,
                BinaryOperatorKind::Divide | BinaryOperatorKind::Modulus
            ),
            Instruction::Move { .. }
            | Instruction::UnaryOperation { .. }
            | Instruction::FunctionAddress { .. }
            | Instruction::LoadField { .. } => true,
            _ => false,
        }
    }

    /// Visits every operand which may hold either a register or an immediate
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand<R>)) {
        match self {
            Instruction::Move { source, .. } => f(source),
            Instruction::UnaryOperation { operand, .. } => f(operand),
            Instruction::BinaryOperation { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Instruction::Call { arguments, .. } => arguments.iter_mut().for_each(f),
            Instruction::StoreField { value, .. } => f(value),
            Instruction::Branch { condition, .. } => f(condition),
            Instruction::Return { value } => f(value),
            Instruction::FunctionAddress { .. }
            | Instruction::Allocate { .. }
            | Instruction::LoadField { .. }
            | Instruction::SpillStore { .. }
            | Instruction::SpillLoad { .. }
            | Instruction::Jump { .. } => {}
        }
    }

    /// Visits every register read by this instruction
    pub fn for_each_use_mut(&mut self, mut f: impl FnMut(&mut R)) {
        match self {
            Instruction::Call {
                callee: Callee::Indirect(register),
                ..
            } => f(register),
            Instruction::StoreField { object, .. } | Instruction::LoadField { object, .. } => {
                f(object)
            }
            Instruction::SpillStore { source, .. } => f(source),
            _ => {}
        }

        self.for_each_operand_mut(|operand| {
            if let Operand::Register(register) = operand {
                f(register);
            }
        });
    }

    pub fn def_mut(&mut self) -> Option<&mut R> {
        match self {
            Instruction::Move { destination, .. }
            | Instruction::UnaryOperation { destination, .. }
            | Instruction::BinaryOperation { destination, .. }
            | Instruction::Call { destination, .. }
            | Instruction::FunctionAddress { destination, .. }
            | Instruction::Allocate { destination, .. }
            | Instruction::LoadField { destination, .. }
            | Instruction::SpillLoad { destination, .. } => Some(destination),
            _ => None,
        }
    }

    /// Rewrites every register in the instruction, including the ones only
    /// recorded as live across an allocation
    pub fn map_registers<S>(&self, mut f: impl FnMut(R) -> S) -> Instruction<S> {
        match self.try_map_registers(|register| Ok::<_, Infallible>(f(register))) {
            Ok(instruction) => instruction,
            Err(never) => match never {},
        }
    }

    /// Like [`Instruction::map_registers`], stopping at the first error
    pub fn try_map_registers<S, E>(
        &self,
        mut f: impl FnMut(R) -> Result<S, E>,
    ) -> Result<Instruction<S>, E> {
        let instruction = match self {
            Instruction::Move {
                destination,
                source,
            } => Instruction::Move {
                destination: f(*destination)?,
                source: source.try_map(&mut f)?,
            },
            Instruction::UnaryOperation {
                operator,
                destination,
                operand,
            } => Instruction::UnaryOperation {
                operator: *operator,
                destination: f(*destination)?,
                operand: operand.try_map(&mut f)?,
            },
            Instruction::BinaryOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => Instruction::BinaryOperation {
                operator: *operator,
                destination: f(*destination)?,
                lhs: lhs.try_map(&mut f)?,
                rhs: rhs.try_map(&mut f)?,
            },
            Instruction::Call {
                callee,
                arguments,
                destination,
            } => Instruction::Call {
                callee: match callee {
                    Callee::Direct(symbol) => Callee::Direct(*symbol),
                    Callee::Indirect(register) => Callee::Indirect(f(*register)?),
                },
                arguments: arguments
                    .iter()
                    .map(|a| a.try_map(&mut f))
                    .collect::<Result<_, _>>()?,
                destination: f(*destination)?,
            },
            Instruction::FunctionAddress {
                destination,
                function,
            } => Instruction::FunctionAddress {
                destination: f(*destination)?,
                function: *function,
            },
            Instruction::Allocate {
                destination,
                shape,
                live_across,
            } => Instruction::Allocate {
                destination: f(*destination)?,
                shape: shape.clone(),
                live_across: live_across
                    .iter()
                    .map(|r| f(*r))
                    .collect::<Result<_, _>>()?,
            },
            Instruction::StoreField {
                object,
                index,
                value,
            } => Instruction::StoreField {
                object: f(*object)?,
                index: *index,
                value: value.try_map(&mut f)?,
            },
            Instruction::LoadField {
                destination,
                object,
                index,
            } => Instruction::LoadField {
                destination: f(*destination)?,
                object: f(*object)?,
                index: *index,
            },
            Instruction::SpillStore { slot, source } => Instruction::SpillStore {
                slot: *slot,
                source: f(*source)?,
            },
            Instruction::SpillLoad { destination, slot } => Instruction::SpillLoad {
                destination: f(*destination)?,
                slot: *slot,
            },
            Instruction::Jump { destination } => Instruction::Jump {
                destination: *destination,
            },
            Instruction::Branch {
                condition,
                positive,
                negative,
            } => Instruction::Branch {
                condition: condition.try_map(&mut f)?,
                positive: *positive,
                negative: *negative,
            },
            Instruction::Return { value } => Instruction::Return {
                value: value.try_map(&mut f)?,
            },
        };

        Ok(instruction)
    }
}

impl<R: Copy> Function<R> {
    pub fn entry(&self) -> BlockId {
        BlockId::ZERO
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    /// Rebuilds every block's predecessor set from the terminators
    pub fn recompute_predecessors(&mut self) {
        for block in self.blocks.iter_mut() {
            block.predecessors.clear();
        }

        let edges: Vec<(BlockId, BlockId)> = self
            .blocks
            .iter()
            .flat_map(|block| block.successors().into_iter().map(move |s| (block.id, s)))
            .collect();

        for (from, to) in edges {
            if let Some(block) = self.blocks.get_mut(to) {
                block.predecessors.insert(from);
            }
        }
    }

    /// Rewrites every register in the function
    pub fn map_registers<S: Copy>(&self, mut f: impl FnMut(R) -> S) -> Function<S> {
        match self.try_map_registers(|register| Ok::<_, Infallible>(f(register))) {
            Ok(function) => function,
            Err(never) => match never {},
        }
    }

    pub fn try_map_registers<S: Copy, E>(
        &self,
        mut f: impl FnMut(R) -> Result<S, E>,
    ) -> Result<Function<S>, E> {
        let parameters = self
            .parameters
            .iter()
            .map(|r| f(*r))
            .collect::<Result<_, _>>()?;

        let mut blocks = IndexVec::with_capacity(self.blocks.len());
        for block in self.blocks.iter() {
            blocks.push(Block {
                id: block.id,
                instructions: block
                    .instructions
                    .iter()
                    .map(|i| i.try_map_registers(&mut f))
                    .collect::<Result<_, _>>()?,
                predecessors: block.predecessors.clone(),
            });
        }

        Ok(Function {
            name: self.name,
            parameters,
            registers: self.registers.clone(),
            blocks,
        })
    }
}

impl Function {
    pub fn register_type(&self, register: RegisterId) -> Option<&ty::Type> {
        self.registers.get(register).map(|r| &r.ty)
    }

    pub fn create_register(&mut self, ty: ty::Type) -> RegisterId {
        let id = self.registers.next_index();
        self.registers.push(Register { id, ty })
    }
}
