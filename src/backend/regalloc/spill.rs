use std::collections::BTreeSet;

use crate::middle::{
    lir::{self, Instruction, RegisterId, SpillSlot},
    ty::Type,
};

/// Moves a register into a stack slot. Every read becomes a load into a
/// fresh temporary right before the instruction, every write goes to a
/// fresh temporary stored right after it. A spilled parameter is stored on
/// entry and stays behind as a short lived register of its own.
///
/// Every register this creates is added to `temporaries`, and so is a
/// spilled parameter. None of them should ever be spilled again.
pub fn spill_register(
    function: &mut lir::Function,
    register: RegisterId,
    slot: SpillSlot,
    temporaries: &mut BTreeSet<RegisterId>,
) {
    let Some(ty) = function.register_type(register).cloned() else {
        return;
    };

    if function.parameters.contains(&register) {
        temporaries.insert(register);
    }

    for block in function.blocks.indices() {
        let instructions = std::mem::take(&mut function.blocks[block].instructions);
        let mut rewritten = Vec::with_capacity(instructions.len() + 2);

        if block == function.entry() && function.parameters.contains(&register) {
            rewritten.push(Instruction::SpillStore {
                slot,
                source: register,
            });
        }

        for mut instruction in instructions {
            if instruction.uses().contains(&register) {
                let temporary = create_temporary(function, &ty, temporaries);
                rewritten.push(Instruction::SpillLoad {
                    destination: temporary,
                    slot,
                });

                instruction.for_each_use_mut(|r| {
                    if *r == register {
                        *r = temporary;
                    }
                });
            }

            let mut store = None;
            if instruction.def() == Some(register) {
                let temporary = create_temporary(function, &ty, temporaries);
                if let Some(def) = instruction.def_mut() {
                    *def = temporary;
                }

                store = Some(Instruction::SpillStore {
                    slot,
                    source: temporary,
                });
            }

            rewritten.push(instruction);
            rewritten.extend(store);
        }

        function.blocks[block].instructions = rewritten;
    }
}

fn create_temporary(
    function: &mut lir::Function,
    ty: &Type,
    temporaries: &mut BTreeSet<RegisterId>,
) -> RegisterId {
    let temporary = function.create_register(ty.clone());
    temporaries.insert(temporary);
    temporary
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        index::Index,
        frontend::{
            ast::{BinaryOperatorKind, build::*},
            intern::InternedSymbol,
        },
        middle::{
            lir::{BlockId, Operand, hir_lowering::lower, pretty_print::render, verify::verify},
            pattern::check_matches,
            type_checking::infer,
        },
    };

    fn lowered() -> lir::Function {
        // def f(x: int) = let y = x + 1 in y * x
        let typed = infer(&program(vec![function(
            "f",
            &[("x", ty("int"))],
            None,
            let_in(
                "y",
                binary(var("x"), BinaryOperatorKind::Add, int(1)),
                binary(var("y"), BinaryOperatorKind::Multiply, var("x")),
            ),
        )]))
        .unwrap();
        let function = typed.function("f").unwrap();
        let (decisions, _) = check_matches(function, &typed.records);
        lower(function, &decisions).unwrap()
    }

    #[test]
    fn reads_and_writes_go_through_the_slot() {
        let mut function = lowered();
        let mut temporaries = BTreeSet::new();

        // %2 is `y`
        spill_register(
            &mut function,
            RegisterId::new(2),
            SpillSlot::new(0),
            &mut temporaries,
        );

        assert_eq!(verify(&function), Ok(()));
        assert_eq!(
            strip_ansi_escapes::strip_str(render(&function)),
            concat!(
                "fn f(%0) {\n",
                ".label_0:\n",
                "    %1 = %0 + 1\n",
                "    %4 = %1\n",
                "    spill_store slot0, %4\n",
                "    %5 = spill_load slot0\n",
                "    %3 = %5 * %0\n",
                "    ret %3\n",
                "}\n",
            )
        );
        assert_eq!(temporaries, BTreeSet::from([RegisterId::new(4), RegisterId::new(5)]));
    }

    #[test]
    fn spilled_parameters_are_stored_on_entry() {
        let mut function = lowered();
        let mut temporaries = BTreeSet::new();

        spill_register(
            &mut function,
            RegisterId::new(0),
            SpillSlot::new(3),
            &mut temporaries,
        );

        let entry = &function.blocks[BlockId::ZERO].instructions;
        assert_eq!(
            entry[0],
            Instruction::SpillStore {
                slot: SpillSlot::new(3),
                source: RegisterId::new(0)
            }
        );
        assert!(temporaries.contains(&RegisterId::new(0)));

        // Only the entry store still reads the parameter itself
        let reads = entry
            .iter()
            .filter(|i| i.uses().contains(&RegisterId::new(0)))
            .count();
        assert_eq!(reads, 1);
        assert_eq!(function.name, InternedSymbol::new("f"));
        assert!(matches!(
            entry.last(),
            Some(Instruction::Return {
                value: Operand::Register(_)
            })
        ));
    }
}
