//! Chaitin style graph coloring with optimistic spilling. Registers that
//! can't be colored are spilled to the stack, the function is rewritten and
//! coloring starts over. Spill temporaries and spilled parameters that still
//! can't be colored are left on the stack for good.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use super::{
    Allocation, AllocationError, Location, PhysicalRegister, StrategyOutput,
    spill::spill_register,
};
use crate::{
    backend::liveness::{LiveInterval, Liveness, compute_intervals},
    index::{Index, IndexVec},
    middle::lir::{self, RegisterId, SpillSlot},
};

/// Which registers are live at the same time. Only registers that appear in
/// the function are nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterferenceGraph {
    edges: BTreeMap<RegisterId, BTreeSet<RegisterId>>,
}

impl InterferenceGraph {
    pub fn build(intervals: &IndexVec<RegisterId, LiveInterval>) -> Self {
        let live: Vec<&LiveInterval> = intervals.iter().filter(|i| !i.is_empty()).collect();
        let mut edges: BTreeMap<RegisterId, BTreeSet<RegisterId>> = live
            .iter()
            .map(|interval| (interval.register, BTreeSet::new()))
            .collect();

        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                if a.overlaps(b) {
                    edges.entry(a.register).or_default().insert(b.register);
                    edges.entry(b.register).or_default().insert(a.register);
                }
            }
        }

        Self { edges }
    }

    pub fn nodes(&self) -> impl Iterator<Item = RegisterId> + '_ {
        self.edges.keys().copied()
    }

    pub fn neighbors(&self, register: RegisterId) -> impl Iterator<Item = RegisterId> + '_ {
        self.edges.get(&register).into_iter().flatten().copied()
    }

    pub fn interferes(&self, a: RegisterId, b: RegisterId) -> bool {
        self.edges.get(&a).is_some_and(|n| n.contains(&b))
    }
}

pub fn allocate(
    mut function: lir::Function,
    num_physical: u16,
) -> Result<StrategyOutput, AllocationError> {
    let k = num_physical as usize;
    // Every round but the last spills at least one register of the input
    let max_rounds = function.registers.len() + 1;

    let mut temporaries = BTreeSet::new();
    let mut spilled = BTreeSet::new();
    let mut spill_slots = 0;

    for round in 1..=max_rounds {
        let liveness = Liveness::compute(&function);
        let intervals = compute_intervals(&function, &liveness);
        let graph = InterferenceGraph::build(&intervals);

        let stack = simplify(&graph, &intervals, &temporaries, k);
        let (colors, uncolored) = select(&graph, stack, k);

        let actual_spills: Vec<RegisterId> = uncolored
            .iter()
            .copied()
            .filter(|register| !temporaries.contains(register))
            .collect();

        if actual_spills.is_empty() {
            let mut allocation: Allocation = colors
                .into_iter()
                .map(|(register, color)| {
                    (register, Location::Register(PhysicalRegister(color as u16)))
                })
                .collect();

            // What is left are operands of a single instruction, or incoming
            // parameters, which can't all be in registers at once. They are
            // used straight from the stack.
            for register in uncolored {
                debug!(
                    "`{}` keeps %{} on the stack",
                    function.name,
                    register.index()
                );
                allocation.insert(register, Location::Stack(SpillSlot::new(spill_slots)));
                spill_slots += 1;
            }

            return Ok(StrategyOutput {
                function,
                allocation,
                rounds: round,
                spilled,
                spill_slots,
            });
        }

        debug!(
            "round {round} of `{}` spills {} registers",
            function.name,
            actual_spills.len()
        );

        for register in actual_spills {
            spill_register(
                &mut function,
                register,
                SpillSlot::new(spill_slots),
                &mut temporaries,
            );
            spill_slots += 1;
            spilled.insert(register);
        }
    }

    // Every round spills a register of the input, so running out of rounds
    // means liveness and spilling disagree
    Err(AllocationError::SpillExhaustion {
        function: function.name,
    })
}

/// Removes nodes from the graph one at a time, returning them in removal
/// order. A node with fewer than `k` remaining neighbors is always colorable
/// once its neighbors are, so those go first.
fn simplify(
    graph: &InterferenceGraph,
    intervals: &IndexVec<RegisterId, LiveInterval>,
    temporaries: &BTreeSet<RegisterId>,
    k: usize,
) -> Vec<RegisterId> {
    let mut remaining: BTreeSet<RegisterId> = graph.nodes().collect();
    let mut stack = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let degree = |register: RegisterId| {
            graph
                .neighbors(register)
                .filter(|n| remaining.contains(n))
                .count()
        };

        let next = remaining
            .iter()
            .copied()
            .find(|&register| degree(register) < k)
            .or_else(|| {
                // Stuck: optimistically push the cheapest spill candidate,
                // i.e. the lowest uses per neighbor. Cross multiplying keeps
                // this exact.
                remaining
                    .iter()
                    .copied()
                    .filter(|register| !temporaries.contains(register))
                    .min_by(|&a, &b| {
                        let uses = |r: RegisterId| intervals.get(r).map_or(0, |i| i.uses);
                        (uses(a) * degree(b)).cmp(&(uses(b) * degree(a)))
                    })
            })
            .or_else(|| remaining.first().copied());

        let Some(next) = next else {
            break;
        };

        remaining.remove(&next);
        stack.push(next);
    }

    stack
}

/// Colors nodes in reverse removal order with the lowest color none of their
/// neighbors has. Returns the coloring and the nodes left without a color.
fn select(
    graph: &InterferenceGraph,
    mut stack: Vec<RegisterId>,
    k: usize,
) -> (BTreeMap<RegisterId, usize>, Vec<RegisterId>) {
    let mut colors = BTreeMap::new();
    let mut uncolored = Vec::new();

    while let Some(register) = stack.pop() {
        let taken: BTreeSet<usize> = graph
            .neighbors(register)
            .filter_map(|n| colors.get(&n).copied())
            .collect();

        match (0..k).find(|color| !taken.contains(color)) {
            Some(color) => {
                colors.insert(register, color);
            }
            None => uncolored.push(register),
        }
    }

    uncolored.sort();
    (colors, uncolored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::liveness::LiveRange;

    fn interval(register: usize, ranges: &[(usize, usize)], uses: usize) -> LiveInterval {
        LiveInterval {
            register: RegisterId::new(register),
            ranges: ranges
                .iter()
                .map(|&(start, end)| LiveRange { start, end })
                .collect(),
            uses,
        }
    }

    #[test]
    fn overlapping_ranges_interfere() {
        let intervals = IndexVec::from_raw(vec![
            interval(0, &[(0, 4)], 2),
            interval(1, &[(1, 3), (8, 8)], 2),
            interval(2, &[(5, 7)], 2),
            interval(3, &[], 0),
        ]);
        let graph = InterferenceGraph::build(&intervals);

        let r = RegisterId::new;
        assert!(graph.interferes(r(0), r(1)));
        assert!(!graph.interferes(r(0), r(2)));
        assert!(!graph.interferes(r(1), r(2)));
        assert_eq!(graph.nodes().count(), 3);
    }

    #[test]
    fn triangle_needs_three_colors() {
        let intervals = IndexVec::from_raw(vec![
            interval(0, &[(0, 6)], 4),
            interval(1, &[(1, 6)], 1),
            interval(2, &[(2, 6)], 3),
        ]);
        let graph = InterferenceGraph::build(&intervals);

        let stack = simplify(&graph, &intervals, &BTreeSet::new(), 3);
        let (colors, uncolored) = select(&graph, stack, 3);
        assert!(uncolored.is_empty());
        assert_eq!(colors.values().collect::<BTreeSet<_>>().len(), 3);

        // With two colors the register used least per neighbor is pushed
        // first when stuck, so it is colored last and loses
        let stack = simplify(&graph, &intervals, &BTreeSet::new(), 2);
        assert_eq!(stack[0], RegisterId::new(1));
        let (_, uncolored) = select(&graph, stack, 2);
        assert_eq!(uncolored, [RegisterId::new(1)]);
    }

    #[test]
    fn temporaries_are_only_chosen_as_a_last_resort() {
        let intervals = IndexVec::from_raw(vec![
            interval(0, &[(0, 6)], 4),
            interval(1, &[(1, 6)], 1),
            interval(2, &[(2, 6)], 3),
        ]);
        let graph = InterferenceGraph::build(&intervals);
        let temporaries = BTreeSet::from([RegisterId::new(1)]);

        let stack = simplify(&graph, &intervals, &temporaries, 2);
        assert_eq!(stack[0], RegisterId::new(2));
    }
}
