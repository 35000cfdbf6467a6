//! Linear scan over live intervals. Holes in an interval are ignored, a
//! register is treated as live from its first position to its last.

use std::collections::BTreeSet;

use log::trace;

use super::{Allocation, Location, PhysicalRegister, StrategyOutput};
use crate::{
    backend::liveness::{Liveness, compute_intervals},
    index::Index,
    middle::lir::{self, RegisterId, SpillSlot},
};

#[derive(Debug, Clone, Copy)]
struct Interval {
    register: RegisterId,
    start: usize,
    /// Inclusive
    end: usize,
}

pub fn allocate(function: lir::Function, num_physical: u16) -> StrategyOutput {
    let liveness = Liveness::compute(&function);

    let mut intervals: Vec<Interval> = compute_intervals(&function, &liveness)
        .iter()
        .filter(|interval| !interval.is_empty())
        .map(|interval| Interval {
            register: interval.register,
            start: interval.start(),
            end: interval.end(),
        })
        .collect();
    intervals.sort_by_key(|iv| (iv.start, iv.end, iv.register));

    // Popping hands out the lowest numbered register first
    let mut free: Vec<PhysicalRegister> = (0..num_physical).rev().map(PhysicalRegister).collect();
    let mut active: Vec<(Interval, PhysicalRegister)> = Vec::new();

    let mut allocation = Allocation::new();
    let mut spilled = BTreeSet::new();
    let mut spill_slots = 0;

    for current in intervals {
        expire_old(&mut active, &mut free, current.start);

        if let Some(register) = free.pop() {
            allocation.insert(current.register, Location::Register(register));
            active.push((current, register));
            continue;
        }

        // Whichever interval lives longest gives up its register, the lowest
        // register id going first among equals
        let victim = active
            .iter()
            .enumerate()
            .max_by(|(_, (a, _)), (_, (b, _))| {
                a.end.cmp(&b.end).then_with(|| b.register.cmp(&a.register))
            })
            .map(|(index, (interval, _))| (index, *interval));

        let slot = Location::Stack(SpillSlot::new(spill_slots));
        spill_slots += 1;

        match victim {
            Some((index, victim))
                if victim.end > current.end
                    || (victim.end == current.end && victim.register < current.register) =>
            {
                let (_, register) = active.remove(index);
                trace!("spilling %{} for %{}", victim.register.index(), current.register.index());

                allocation.insert(victim.register, slot);
                spilled.insert(victim.register);

                allocation.insert(current.register, Location::Register(register));
                active.push((current, register));
            }
            _ => {
                trace!("spilling %{}", current.register.index());

                allocation.insert(current.register, slot);
                spilled.insert(current.register);
            }
        }
    }

    StrategyOutput {
        function,
        allocation,
        rounds: 1,
        spilled,
        spill_slots,
    }
}

fn expire_old(
    active: &mut Vec<(Interval, PhysicalRegister)>,
    free: &mut Vec<PhysicalRegister>,
    start: usize,
) {
    // Intervals are inclusive, so only the ones ending before `start` are done
    active.retain(|(interval, register)| {
        if interval.end < start {
            free.push(*register);
            false
        } else {
            true
        }
    });

    free.sort_by_key(|p| std::cmp::Reverse(p.0));
}
