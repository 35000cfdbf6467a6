use paste::paste;
use rillc::{
    backend::regalloc::{self, AllocationStrategy, Location, validate},
    frontend::ast::{self, BinaryOperatorKind, build::*},
    index::Index,
    middle::{
        lir::{self, Instruction, hir_lowering::lower, verify::verify},
        pattern::check_matches,
        type_checking::infer,
    },
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Lowers every function of a program without optimizing
fn lowered(program: &ast::Program) -> Vec<lir::Function> {
    let typed = infer(program).unwrap();

    typed
        .functions
        .iter()
        .map(|function| {
            let (decisions, errors) = check_matches(function, &typed.records);
            assert!(errors.is_empty(), "{errors:?}");
            lower(function, &decisions).unwrap()
        })
        .collect()
}

/// Records, lists, a call and short-circuit logic under register pressure
fn samples() -> ast::Program {
    let add = |a, b| binary(a, BinaryOperatorKind::Add, b);

    program(vec![
        record_def("Point", &[("x", ty("int")), ("y", ty("int"))]),
        // let a = x + 1 in let b = x * 2 in let c = x - 3 in a + b + c + x
        function(
            "pressure",
            &[("x", ty("int"))],
            Some(ty("int")),
            let_in(
                "a",
                add(var("x"), int(1)),
                let_in(
                    "b",
                    binary(var("x"), BinaryOperatorKind::Multiply, int(2)),
                    let_in(
                        "c",
                        binary(var("x"), BinaryOperatorKind::Subtract, int(3)),
                        add(add(add(var("a"), var("b")), var("c")), var("x")),
                    ),
                ),
            ),
        ),
        // match p with | Point { x: 0, y } -> y | Point { x, y: 1 } -> x | _ -> 7
        function(
            "corner",
            &[("p", ty("Point"))],
            Some(ty("int")),
            match_on(
                var("p"),
                vec![
                    arm(
                        record_pattern("Point", vec![("x", int_pattern(0)), ("y", bind("y"))]),
                        var("y"),
                    ),
                    arm(
                        record_pattern("Point", vec![("x", bind("x")), ("y", int_pattern(1))]),
                        var("x"),
                    ),
                    arm(wildcard(), int(7)),
                ],
            ),
        ),
        // let l = [n, n + 1, n + 2] in
        // let q = corner(Point { x: n, y: n }) in
        // if q > n then q else n * 2
        function(
            "gather",
            &[("n", ty("int"))],
            Some(ty("int")),
            let_in(
                "l",
                list(vec![
                    var("n"),
                    add(var("n"), int(1)),
                    add(var("n"), int(2)),
                ]),
                let_in(
                    "q",
                    call(
                        "corner",
                        vec![record("Point", vec![("x", var("n")), ("y", var("n"))])],
                    ),
                    if_else(
                        binary(var("q"), BinaryOperatorKind::GreaterThan, var("n")),
                        var("q"),
                        binary(var("n"), BinaryOperatorKind::Multiply, int(2)),
                    ),
                ),
            ),
        ),
        // if a and b then 1 else 2
        function(
            "both",
            &[("a", ty("bool")), ("b", ty("bool"))],
            Some(ty("int")),
            if_else(
                binary(var("a"), BinaryOperatorKind::LogicalAnd, var("b")),
                int(1),
                int(2),
            ),
        ),
    ])
}

/// Passes and receives more values at once than there are registers
fn wide() -> ast::Program {
    let int_parameters = |names: &[&'static str]| -> Vec<(&'static str, ast::Type)> {
        names.iter().map(|&name| (name, ty("int"))).collect()
    };

    program(vec![
        // def many(a, b, c, d) = a + d
        function(
            "many",
            &int_parameters(&["a", "b", "c", "d"]),
            Some(ty("int")),
            binary(var("a"), BinaryOperatorKind::Add, var("d")),
        ),
        // def caller(x) = many(x, x + 1, x + 2, x * 3)
        function(
            "caller",
            &int_parameters(&["x"]),
            Some(ty("int")),
            call(
                "many",
                vec![
                    var("x"),
                    binary(var("x"), BinaryOperatorKind::Add, int(1)),
                    binary(var("x"), BinaryOperatorKind::Add, int(2)),
                    binary(var("x"), BinaryOperatorKind::Multiply, int(3)),
                ],
            ),
        ),
    ])
}

macro_rules! strategy_tests {
    ($($name:ident => $strategy:expr),* $(,)?) => {
        paste! {
            $(
                #[test]
                fn [<$name _allocations_respect_interference>]() {
                    init_logging();

                    for function in lowered(&samples()) {
                        for k in 2..=5 {
                            let allocated = regalloc::allocate(&function, k, $strategy).unwrap();

                            assert_eq!(verify(&allocated.function), Ok(()));
                            assert_eq!(validate(&allocated.function, &allocated.allocation, k), Ok(()));
                            assert!(allocated.stats.registers_used <= k as usize);
                            assert!(allocated.resolve().is_ok());
                        }
                    }
                }

                #[test]
                fn [<$name _spill_rounds_are_bounded>]() {
                    for function in lowered(&samples()) {
                        let allocated = regalloc::allocate(&function, 2, $strategy).unwrap();
                        assert!(allocated.stats.rounds <= function.registers.len() + 1);
                        assert!(allocated.stats.spilled.iter().all(|r| r.index() < function.registers.len()));
                    }
                }

                #[test]
                fn [<$name _handles_more_operands_than_registers>]() {
                    init_logging();

                    for function in lowered(&wide()) {
                        for k in 1..=3 {
                            let allocated = regalloc::allocate(&function, k, $strategy).unwrap();

                            assert_eq!(verify(&allocated.function), Ok(()));
                            assert_eq!(validate(&allocated.function, &allocated.allocation, k), Ok(()));
                            assert!(allocated.stats.registers_used <= k as usize);
                            assert!(
                                allocated
                                    .allocation
                                    .values()
                                    .any(|location| matches!(location, Location::Stack(_)))
                            );
                            assert!(allocated.resolve().is_ok());
                        }
                    }
                }

                #[test]
                fn [<$name _allocations_exclude_their_own_result>]() {
                    for function in lowered(&samples()) {
                        let allocated = regalloc::allocate(&function, 3, $strategy).unwrap();

                        for instruction in allocated.function.blocks.iter().flat_map(|b| &b.instructions) {
                            if let Instruction::Allocate { destination, live_across, .. } = instruction {
                                assert!(!live_across.contains(destination));
                            }
                        }
                    }
                }
            )*
        }
    };
}

strategy_tests! {
    linear_scan => AllocationStrategy::LinearScan,
    graph_coloring => AllocationStrategy::GraphColoring,
}

#[test]
fn enough_registers_means_no_spills() {
    for function in lowered(&samples()) {
        let k = function.registers.len() as u16;

        for strategy in [AllocationStrategy::LinearScan, AllocationStrategy::GraphColoring] {
            let allocated = regalloc::allocate(&function, k, strategy).unwrap();

            assert!(allocated.stats.spilled.is_empty());
            assert_eq!(allocated.stats.rounds, 1);
            assert!(
                allocated
                    .allocation
                    .values()
                    .all(|location| matches!(location, Location::Register(_)))
            );
        }
    }
}

#[test]
fn linear_scan_keeps_the_function_as_is() {
    for function in lowered(&samples()) {
        let allocated = regalloc::allocate(&function, 2, AllocationStrategy::LinearScan).unwrap();

        // Only the `live_across` annotations may differ
        assert_eq!(
            allocated.function.instruction_count(),
            function.instruction_count()
        );
        assert_eq!(allocated.stats.spill_slots, allocated.stats.spilled.len());
    }
}
