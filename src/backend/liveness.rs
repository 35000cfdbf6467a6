//! Liveness of virtual registers.
//!
//! Block level live-in and live-out sets come from the usual backward fixed
//! point. For allocation, blocks are laid out in reverse postorder and every
//! instruction gets two positions: the even one is where it reads its
//! operands, the odd one is where its result appears. A register occupies a
//! position if it is live there, so a value dying at an instruction and the
//! value it defines never overlap.

use std::collections::BTreeSet;

use log::trace;

use crate::{
    index::{Index, IndexVec},
    middle::lir::{Block, BlockId, Function, RegisterId},
};

pub type RegisterSet = BTreeSet<RegisterId>;

/// Registers a block reads before writing them, and registers it writes
pub fn compute_block_def_use(block: &Block) -> (RegisterSet, RegisterSet) {
    let mut uses = RegisterSet::new();
    let mut defs = RegisterSet::new();

    for instruction in &block.instructions {
        for register in instruction.uses() {
            if !defs.contains(&register) {
                uses.insert(register);
            }
        }

        defs.extend(instruction.def());
    }

    (uses, defs)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
    pub live_in: IndexVec<BlockId, RegisterSet>,
    pub live_out: IndexVec<BlockId, RegisterSet>,
}

impl Liveness {
    pub fn compute(function: &Function) -> Self {
        let (uses, defs): (Vec<_>, Vec<_>) = function.blocks.iter().map(compute_block_def_use).unzip();

        let mut live_in: IndexVec<BlockId, RegisterSet> =
            IndexVec::from_elem_n(RegisterSet::new(), function.blocks.len());
        let mut live_out = live_in.clone();

        // Successors come later in reverse postorder, so walking it backwards
        // settles acyclic graphs in one pass
        let order = linearize(function);
        let mut rounds = 0;

        loop {
            rounds += 1;
            let mut changed = false;

            for &block in order.iter().rev() {
                let out: RegisterSet = function.blocks[block]
                    .successors()
                    .into_iter()
                    .filter_map(|successor| live_in.get(successor))
                    .flatten()
                    .copied()
                    .collect();

                let mut inn = uses[block.index()].clone();
                inn.extend(out.difference(&defs[block.index()]));

                if out != live_out[block] || inn != live_in[block] {
                    changed = true;
                    live_out[block] = out;
                    live_in[block] = inn;
                }
            }

            if !changed {
                break;
            }
        }

        trace!("liveness of `{}` settled after {rounds} rounds", function.name);

        Self { live_in, live_out }
    }

    /// The registers live right after each instruction of a block
    pub fn live_after(&self, function: &Function, block: BlockId) -> Vec<RegisterSet> {
        let instructions = &function.blocks[block].instructions;
        let mut live = self.live_out[block].clone();
        let mut after = vec![RegisterSet::new(); instructions.len()];

        for (i, instruction) in instructions.iter().enumerate().rev() {
            after[i] = live.clone();

            if let Some(def) = instruction.def() {
                live.remove(&def);
            }
            live.extend(instruction.uses());
        }

        after
    }
}

/// Reverse postorder from the entry block. Blocks the entry can't reach come
/// last, in id order.
pub fn linearize<R: Copy>(function: &Function<R>) -> Vec<BlockId> {
    if function.blocks.is_empty() {
        return Vec::new();
    }

    let successors = |block: BlockId| {
        function
            .blocks
            .get(block)
            .map(|b| b.successors())
            .unwrap_or_default()
    };

    let mut visited = BTreeSet::from([function.entry()]);
    let mut postorder = Vec::with_capacity(function.blocks.len());
    let mut stack = vec![(function.entry(), 0usize)];

    while let Some(&(block, next)) = stack.last() {
        match successors(block).get(next) {
            Some(&successor) => {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if visited.insert(successor) {
                    stack.push((successor, 0));
                }
            }
            None => {
                postorder.push(block);
                stack.pop();
            }
        }
    }

    postorder.reverse();
    postorder.extend(function.blocks.indices().filter(|b| !visited.contains(b)));
    postorder
}

/// An inclusive run of positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub start: usize,
    pub end: usize,
}

impl LiveRange {
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInterval {
    pub register: RegisterId,
    /// Sorted and disjoint
    pub ranges: Vec<LiveRange>,
    /// Number of instructions reading or writing the register
    pub uses: usize,
}

impl LiveInterval {
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn start(&self) -> usize {
        self.ranges.first().map_or(0, |r| r.start)
    }

    pub fn end(&self) -> usize {
        self.ranges.last().map_or(0, |r| r.end)
    }

    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        let (mut i, mut j) = (0, 0);

        while let (Some(a), Some(b)) = (self.ranges.get(i), other.ranges.get(j)) {
            if a.overlaps(b) {
                return true;
            }

            if a.end < b.end {
                i += 1;
            } else {
                j += 1;
            }
        }

        false
    }

    fn mark(&mut self, position: usize) {
        match self.ranges.last_mut() {
            Some(last) if last.end == position => {}
            Some(last) if last.end + 1 == position => last.end = position,
            _ => self.ranges.push(LiveRange {
                start: position,
                end: position,
            }),
        }
    }
}

/// Live intervals for every register of the function. Parameters are live
/// at position zero even if nothing reads them. Registers that never appear
/// get empty intervals.
pub fn compute_intervals(
    function: &Function,
    liveness: &Liveness,
) -> IndexVec<RegisterId, LiveInterval> {
    let mut intervals: IndexVec<RegisterId, LiveInterval> = function
        .registers
        .indices()
        .map(|register| LiveInterval {
            register,
            ranges: Vec::new(),
            uses: 0,
        })
        .collect();

    for &parameter in &function.parameters {
        if let Some(interval) = intervals.get_mut(parameter) {
            interval.mark(0);
        }
    }

    let mut index = 0;
    for block in linearize(function) {
        let after = liveness.live_after(function, block);

        for (instruction, live_after) in function.blocks[block].instructions.iter().zip(after) {
            let def = instruction.def();
            let uses = instruction.uses();

            let mut live_before = live_after.clone();
            if let Some(def) = def {
                live_before.remove(&def);
            }
            live_before.extend(uses.iter().copied());

            for register in live_before {
                if let Some(interval) = intervals.get_mut(register) {
                    interval.mark(2 * index);
                }
            }

            for register in live_after.into_iter().chain(def) {
                if let Some(interval) = intervals.get_mut(register) {
                    interval.mark(2 * index + 1);
                }
            }

            for register in uses.into_iter().chain(def).collect::<BTreeSet<_>>() {
                if let Some(interval) = intervals.get_mut(register) {
                    interval.uses += 1;
                }
            }

            index += 1;
        }
    }

    intervals
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::{ast::BinaryOperatorKind, intern::InternedSymbol},
        middle::{
            lir::{Immediate, Instruction, Operand, Register},
            primitive::PrimitiveKind,
            ty::TypeContext,
        },
    };

    fn r(n: usize) -> RegisterId {
        RegisterId::new(n)
    }

    fn b(n: usize) -> BlockId {
        BlockId::new(n)
    }

    /// ```text
    /// .label_0: %1 = %0 + 1; br %0 .label_1 .label_2
    /// .label_1: %2 = %1; jmp .label_3
    /// .label_2: %2 = %0; jmp .label_3
    /// .label_3: ret %2
    /// ```
    fn diamond() -> Function {
        let mut types = TypeContext::new();
        let int = types.get_primitive_type(PrimitiveKind::Int);

        let blocks = vec![
            vec![
                Instruction::BinaryOperation {
                    operator: BinaryOperatorKind::Add,
                    destination: r(1),
                    lhs: Operand::Register(r(0)),
                    rhs: Operand::Immediate(Immediate::Int(1)),
                },
                Instruction::Branch {
                    condition: Operand::Register(r(0)),
                    positive: b(1),
                    negative: b(2),
                },
            ],
            vec![
                Instruction::Move {
                    destination: r(2),
                    source: Operand::Register(r(1)),
                },
                Instruction::Jump { destination: b(3) },
            ],
            vec![
                Instruction::Move {
                    destination: r(2),
                    source: Operand::Register(r(0)),
                },
                Instruction::Jump { destination: b(3) },
            ],
            vec![Instruction::Return {
                value: Operand::Register(r(2)),
            }],
        ];

        let mut function = Function {
            name: InternedSymbol::new("diamond"),
            parameters: vec![r(0)],
            registers: (0..3)
                .map(|n| Register {
                    id: r(n),
                    ty: int.clone(),
                })
                .collect(),
            blocks: blocks
                .into_iter()
                .enumerate()
                .map(|(i, instructions)| Block {
                    id: b(i),
                    instructions,
                    predecessors: BTreeSet::new(),
                })
                .collect(),
        };
        function.recompute_predecessors();
        function
    }

    fn set(registers: &[usize]) -> RegisterSet {
        registers.iter().map(|&n| r(n)).collect()
    }

    #[test]
    fn block_def_use_only_counts_upward_exposed_uses() {
        let function = diamond();
        let (uses, defs) = compute_block_def_use(&function.blocks[b(0)]);

        assert_eq!(uses, set(&[0]));
        assert_eq!(defs, set(&[1]));
    }

    #[test]
    fn diamond_live_sets() {
        let function = diamond();
        let liveness = Liveness::compute(&function);

        assert_eq!(liveness.live_in.raw, vec![set(&[0]), set(&[1]), set(&[0]), set(&[2])]);
        assert_eq!(
            liveness.live_out.raw,
            vec![set(&[0, 1]), set(&[2]), set(&[2]), set(&[])]
        );
    }

    #[test]
    fn reverse_postorder_visits_the_join_last() {
        let function = diamond();
        assert_eq!(linearize(&function), [b(0), b(2), b(1), b(3)]);
    }

    #[test]
    fn unreachable_blocks_are_appended() {
        let mut function = diamond();
        function.blocks[b(0)].instructions[1] = Instruction::Jump { destination: b(2) };
        function.recompute_predecessors();

        assert_eq!(linearize(&function), [b(0), b(2), b(3), b(1)]);
    }

    #[test]
    fn intervals_follow_the_layout() {
        // Layout: 0: %1 = %0 + 1, 1: br, 2: %2 = %0, 3: jmp, 4: %2 = %1,
        // 5: jmp, 6: ret %2
        let function = diamond();
        let liveness = Liveness::compute(&function);
        let intervals = compute_intervals(&function, &liveness);

        let ranges = |n: usize| -> Vec<(usize, usize)> {
            intervals[r(n)]
                .ranges
                .iter()
                .map(|range| (range.start, range.end))
                .collect()
        };

        // %0 dies reading into %2 in block 2
        assert_eq!(ranges(0), [(0, 4)]);
        // %1 has a hole across block 2, which never reads it
        assert_eq!(ranges(1), [(1, 3), (8, 8)]);
        assert_eq!(ranges(2), [(5, 7), (9, 12)]);

        assert!(intervals[r(0)].overlaps(&intervals[r(1)]));
        assert!(!intervals[r(0)].overlaps(&intervals[r(2)]));
        assert_eq!(intervals[r(2)].uses, 3);
    }
}
