//! Register allocation. Maps the virtual registers of a function onto a
//! fixed number of physical registers, either by linear scan over live
//! intervals or by coloring the interference graph. Both produce an
//! [`Allocation`] which [`validate`] can check independently.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    backend::liveness::{Liveness, compute_intervals},
    frontend::intern::InternedSymbol,
    index::Index,
    middle::lir::{self, Instruction, RegisterId, SpillSlot},
};

pub mod graph_coloring;
pub mod linear_scan;
pub mod spill;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumString, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum AllocationStrategy {
    #[default]
    LinearScan,
    GraphColoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalRegister(pub u16);

impl core::fmt::Display for PhysicalRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Where a virtual register lives for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Register(PhysicalRegister),
    Stack(SpillSlot),
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Register(register) => write!(f, "{register}"),
            Location::Stack(slot) => write!(f, "[{slot}]"),
        }
    }
}

/// Locations of every register that appears in the allocated function
pub type Allocation = BTreeMap<RegisterId, Location>;

/// A function whose operands name physical registers and spill slots
pub type ResolvedFunction = lir::Function<Location>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationStats {
    pub strategy: AllocationStrategy,
    /// Number of times the allocator ran over the function. Anything above
    /// one means spill code was inserted and allocation retried.
    pub rounds: usize,
    /// Registers of the input function which did not get a physical register
    pub spilled: BTreeSet<RegisterId>,
    pub registers_used: usize,
    pub spill_slots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("can't allocate with {0} physical registers")]
    BadRegisterCount(u16),
    #[error("ran out of registers to spill in `{function}`")]
    SpillExhaustion { function: InternedSymbol },
    #[error("%{} and %{} are both in {location} while live at the same time", first.index(), second.index())]
    InterferenceViolation {
        first: RegisterId,
        second: RegisterId,
        location: Location,
    },
    #[error("%{} was given {location}, but only {available} registers exist", register.index())]
    RegisterOutOfRange {
        register: RegisterId,
        location: Location,
        available: u16,
    },
    #[error("%{} is live but has no location", register.index())]
    UnallocatedRegister { register: RegisterId },
}

/// A function after register allocation. The function may contain spill
/// code the allocator inserted, and every `alloc` lists what is live
/// across it.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedFunction {
    pub function: lir::Function,
    pub allocation: Allocation,
    pub stats: AllocationStats,
}

impl AllocatedFunction {
    /// Replaces every register with its location
    pub fn resolve(&self) -> Result<ResolvedFunction, AllocationError> {
        self.function.try_map_registers(|register| {
            self.allocation
                .get(&register)
                .copied()
                .ok_or(AllocationError::UnallocatedRegister { register })
        })
    }
}

/// What a strategy hands back: the possibly rewritten function and where
/// each of its registers lives
pub struct StrategyOutput {
    pub function: lir::Function,
    pub allocation: Allocation,
    pub rounds: usize,
    pub spilled: BTreeSet<RegisterId>,
    pub spill_slots: usize,
}

pub fn allocate(
    function: &lir::Function,
    num_physical: u16,
    strategy: AllocationStrategy,
) -> Result<AllocatedFunction, AllocationError> {
    if num_physical == 0 {
        return Err(AllocationError::BadRegisterCount(num_physical));
    }

    let StrategyOutput {
        mut function,
        allocation,
        rounds,
        spilled,
        spill_slots,
    } = match strategy {
        AllocationStrategy::LinearScan => linear_scan::allocate(function.clone(), num_physical),
        AllocationStrategy::GraphColoring => {
            graph_coloring::allocate(function.clone(), num_physical)?
        }
    };

    annotate_live_across(&mut function);
    validate(&function, &allocation, num_physical)?;

    let registers_used = allocation
        .values()
        .filter_map(|location| match location {
            Location::Register(register) => Some(*register),
            Location::Stack(_) => None,
        })
        .collect::<BTreeSet<_>>()
        .len();

    debug!(
        "allocated `{}` with {strategy}: {rounds} rounds, {} spilled, {registers_used} registers",
        function.name,
        spilled.len()
    );

    Ok(AllocatedFunction {
        function,
        allocation,
        stats: AllocationStats {
            strategy,
            rounds,
            spilled,
            registers_used,
            spill_slots,
        },
    })
}

/// Records on every `alloc` the registers live right after it, except its
/// own result
pub fn annotate_live_across(function: &mut lir::Function) {
    let liveness = Liveness::compute(function);

    for block in function.blocks.indices() {
        let after = liveness.live_after(function, block);

        for (instruction, live) in function.blocks[block].instructions.iter_mut().zip(after) {
            if let Instruction::Allocate {
                destination,
                live_across,
                ..
            } = instruction
            {
                let destination = *destination;
                *live_across = live.into_iter().filter(|&r| r != destination).collect();
            }
        }
    }
}

/// Checks that every live register has a location, that physical registers
/// are in range, and that no two registers sharing a location are ever live
/// at the same time
pub fn validate(
    function: &lir::Function,
    allocation: &Allocation,
    num_physical: u16,
) -> Result<(), AllocationError> {
    let liveness = Liveness::compute(function);
    let intervals = compute_intervals(function, &liveness);
    let live: Vec<_> = intervals.iter().filter(|i| !i.is_empty()).collect();

    for interval in &live {
        let register = interval.register;
        let location = *allocation
            .get(&register)
            .ok_or(AllocationError::UnallocatedRegister { register })?;

        if let Location::Register(physical) = location {
            if physical.0 >= num_physical {
                return Err(AllocationError::RegisterOutOfRange {
                    register,
                    location,
                    available: num_physical,
                });
            }
        }
    }

    for (i, first) in live.iter().enumerate() {
        for second in &live[i + 1..] {
            let location = allocation.get(&first.register);
            if location != allocation.get(&second.register) || !first.overlaps(second) {
                continue;
            }

            if let Some(&location) = location {
                return Err(AllocationError::InterferenceViolation {
                    first: first.register,
                    second: second.register,
                    location,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
