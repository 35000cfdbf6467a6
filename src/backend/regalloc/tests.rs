use std::{collections::BTreeSet, str::FromStr};

use pretty_assertions::assert_eq;
use strum::IntoEnumIterator;

use super::*;
use crate::{
    frontend::ast::{self, BinaryOperatorKind, build::*},
    middle::{
        lir::{BlockId, Operand, hir_lowering::lower, pretty_print::render},
        pattern::check_matches,
        type_checking::infer,
    },
};

fn lowered(body: ast::Expression) -> lir::Function {
    let typed = infer(&program(vec![function(
        "f",
        &[("x", ty("int"))],
        None,
        body,
    )]))
    .unwrap();
    let function = typed.function("f").unwrap();
    let (decisions, _) = check_matches(function, &typed.records);
    lower(function, &decisions).unwrap()
}

/// %0 = x, %1 = x + 1, %2 = y, %3 = y * x
fn straight_line() -> lir::Function {
    lowered(let_in(
        "y",
        binary(var("x"), BinaryOperatorKind::Add, int(1)),
        binary(var("y"), BinaryOperatorKind::Multiply, var("x")),
    ))
}

/// Keeps `x`, `a` and `b` alive together
fn pressured() -> lir::Function {
    lowered(let_in(
        "a",
        binary(var("x"), BinaryOperatorKind::Add, int(1)),
        let_in(
            "b",
            binary(var("x"), BinaryOperatorKind::Multiply, int(2)),
            binary(
                binary(var("a"), BinaryOperatorKind::Add, var("b")),
                BinaryOperatorKind::Add,
                var("x"),
            ),
        ),
    ))
}

fn r(n: usize) -> RegisterId {
    RegisterId::new(n)
}

fn p(n: u16) -> Location {
    Location::Register(PhysicalRegister(n))
}

#[test]
fn strategies_parse_from_their_names() {
    assert_eq!(
        AllocationStrategy::from_str("graph-coloring"),
        Ok(AllocationStrategy::GraphColoring)
    );
    assert_eq!(AllocationStrategy::LinearScan.to_string(), "linear-scan");
    assert!(AllocationStrategy::from_str("round-robin").is_err());
    assert_eq!(AllocationStrategy::default(), AllocationStrategy::LinearScan);
}

#[test]
fn zero_registers_is_rejected() {
    for strategy in AllocationStrategy::iter() {
        assert_eq!(
            allocate(&straight_line(), 0, strategy),
            Err(AllocationError::BadRegisterCount(0))
        );
    }
}

#[test]
fn linear_scan_reuses_expired_registers() {
    let allocated = allocate(&straight_line(), 2, AllocationStrategy::LinearScan).unwrap();

    assert_eq!(
        allocated.allocation,
        Allocation::from([(r(0), p(0)), (r(1), p(1)), (r(2), p(1)), (r(3), p(0))])
    );
    assert_eq!(allocated.stats.rounds, 1);
    assert_eq!(allocated.stats.registers_used, 2);
    assert!(allocated.stats.spilled.is_empty());
}

#[test]
fn linear_scan_spills_the_interval_ending_last() {
    let allocated = allocate(&straight_line(), 1, AllocationStrategy::LinearScan).unwrap();

    assert_eq!(
        allocated.allocation,
        Allocation::from([
            (r(0), Location::Stack(SpillSlot::new(0))),
            (r(1), p(0)),
            (r(2), p(0)),
            (r(3), p(0)),
        ])
    );
    assert_eq!(allocated.stats.spilled, BTreeSet::from([r(0)]));
    assert_eq!(allocated.stats.spill_slots, 1);
    // Linear scan never rewrites the function
    assert_eq!(allocated.function, straight_line());
}

#[test]
fn graph_coloring_without_pressure_takes_one_round() {
    let allocated = allocate(&straight_line(), 2, AllocationStrategy::GraphColoring).unwrap();

    assert_eq!(allocated.stats.rounds, 1);
    assert!(allocated.stats.spilled.is_empty());
    assert!(
        allocated
            .allocation
            .values()
            .all(|location| matches!(location, Location::Register(_)))
    );
}

#[test]
fn graph_coloring_spills_and_retries() {
    let allocated = allocate(&pressured(), 2, AllocationStrategy::GraphColoring).unwrap();

    assert!(allocated.stats.rounds > 1);
    // `a` is live across the whole computation of `b`
    assert!(allocated.stats.spilled.contains(&r(2)));
    assert_eq!(allocated.stats.spill_slots, allocated.stats.spilled.len());
    assert!(allocated.function.registers.len() > pressured().registers.len());
    assert_eq!(
        validate(&allocated.function, &allocated.allocation, 2),
        Ok(())
    );
}

#[test]
fn graph_coloring_reads_operands_from_the_stack_when_registers_run_out() {
    // The multiplication reads two registers at once
    let allocated = allocate(&straight_line(), 1, AllocationStrategy::GraphColoring).unwrap();

    assert!(allocated.stats.rounds > 1);
    assert_eq!(allocated.stats.registers_used, 1);
    assert!(
        allocated
            .allocation
            .values()
            .any(|location| matches!(location, Location::Stack(_)))
    );
    assert!(allocated.stats.spill_slots > allocated.stats.spilled.len());
    assert!(allocated.resolve().is_ok());
}

#[test]
fn both_strategies_agree_on_validity() {
    for strategy in AllocationStrategy::iter() {
        for k in 2..5 {
            let allocated = allocate(&pressured(), k, strategy).unwrap();
            assert_eq!(allocated.stats.strategy, strategy);
            assert!(allocated.stats.registers_used <= k as usize);
        }
    }
}

#[test]
fn validate_catches_shared_locations() {
    let function = straight_line();
    let allocation = Allocation::from([(r(0), p(0)), (r(1), p(0)), (r(2), p(1)), (r(3), p(0))]);

    assert_eq!(
        validate(&function, &allocation, 2),
        Err(AllocationError::InterferenceViolation {
            first: r(0),
            second: r(1),
            location: p(0),
        })
    );
}

#[test]
fn validate_catches_missing_and_out_of_range_registers() {
    let function = straight_line();

    assert_eq!(
        validate(&function, &Allocation::new(), 2),
        Err(AllocationError::UnallocatedRegister { register: r(0) })
    );

    let allocation = Allocation::from([(r(0), p(5)), (r(1), p(1)), (r(2), p(1)), (r(3), p(0))]);
    assert_eq!(
        validate(&function, &allocation, 2),
        Err(AllocationError::RegisterOutOfRange {
            register: r(0),
            location: p(5),
            available: 2,
        })
    );
}

#[test]
fn resolve_replaces_registers_with_locations() {
    let allocated = allocate(&straight_line(), 2, AllocationStrategy::LinearScan).unwrap();
    let resolved = allocated.resolve().unwrap();

    assert_eq!(
        strip_ansi_escapes::strip_str(render(&resolved)),
        concat!(
            "fn f(r0) {\n",
            ".label_0:\n",
            "    r1 = r0 + 1\n",
            "    r1 = r1\n",
            "    r0 = r1 * r0\n",
            "    ret r0\n",
            "}\n",
        )
    );
}

#[test]
fn allocations_list_what_survives_them() {
    // let l = [x] in x + 1
    let function = lowered(let_in(
        "l",
        list(vec![var("x")]),
        binary(var("x"), BinaryOperatorKind::Add, int(1)),
    ));
    let allocated = allocate(&function, 4, AllocationStrategy::LinearScan).unwrap();

    let first = &allocated.function.blocks[BlockId::ZERO].instructions[0];
    assert_eq!(
        first,
        &Instruction::Allocate {
            destination: r(1),
            shape: lir::AllocationShape::List { length: 1 },
            live_across: vec![r(0)],
        }
    );
    assert!(matches!(
        allocated.function.blocks[BlockId::ZERO].instructions[1],
        Instruction::StoreField {
            value: Operand::Register(_),
            ..
        }
    ));
}
