use core::fmt::Display;

use colored::Colorize;
use itertools::Itertools;

use crate::{index::Index, middle::lir};

/// Renders a function as text. Colors are included when `colored` has them
/// enabled.
pub fn render<R: Display>(function: &lir::Function<R>) -> String {
    let mut output = format!(
        "{} {}{}{}{}\n",
        "fn".magenta(),
        function.name.value().blue(),
        "(".white(),
        function.parameters.iter().map(|p| p.to_string()).join(", "),
        ") {".white()
    );

    for block in function.blocks.iter() {
        output.push_str(&format!("{}\n", format!("{}:", block.id).bright_red()));

        for instruction in &block.instructions {
            output.push_str(&format!("    {instruction}\n"));
        }
    }

    output.push_str(&format!("{}\n", "}".white()));
    output
}

pub fn pretty_print_lir<R: Display>(function: &lir::Function<R>) {
    print!("{}", render(function));
}

impl<R: Display> Display for lir::Instruction<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Instruction::Move {
                destination,
                source,
            } => write!(f, "{destination} {} {source}", "=".white()),
            lir::Instruction::UnaryOperation {
                operator,
                destination,
                operand,
            } => write!(
                f,
                "{destination} {} {} {operand}",
                "=".white(),
                operator.to_string().white()
            ),
            lir::Instruction::BinaryOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{destination} {} {lhs} {} {rhs}",
                "=".white(),
                operator.to_string().white()
            ),
            lir::Instruction::Call {
                callee,
                arguments,
                destination,
            } => {
                write!(f, "{destination} {} {} ", "=".white(), "call".cyan())?;
                match callee {
                    lir::Callee::Direct(symbol) => write!(f, "{}", symbol.value().blue())?,
                    lir::Callee::Indirect(register) => write!(f, "{register}")?,
                }
                write!(
                    f,
                    "({})",
                    arguments.iter().map(|op| op.to_string()).join(", ")
                )
            }
            lir::Instruction::FunctionAddress {
                destination,
                function,
            } => write!(
                f,
                "{destination} {} {} {}",
                "=".white(),
                "fnaddr".cyan(),
                function.value().blue()
            ),
            lir::Instruction::Allocate {
                destination,
                shape,
                live_across,
            } => {
                write!(f, "{destination} {} {} ", "=".white(), "alloc".cyan())?;
                match shape {
                    lir::AllocationShape::Record { name, fields } => {
                        write!(f, "record {name}, {}", fields.to_string().purple())?
                    }
                    lir::AllocationShape::List { length } => {
                        write!(f, "list {}", length.to_string().purple())?
                    }
                }

                if !live_across.is_empty() {
                    write!(
                        f,
                        " live({})",
                        live_across.iter().map(|r| r.to_string()).join(", ")
                    )?;
                }

                Ok(())
            }
            lir::Instruction::StoreField {
                object,
                index,
                value,
            } => write!(
                f,
                "{} {object}, {}, {value}",
                "store_field".cyan(),
                index.to_string().purple()
            ),
            lir::Instruction::LoadField {
                destination,
                object,
                index,
            } => write!(
                f,
                "{destination} {} {} {object}, {}",
                "=".white(),
                "load_field".cyan(),
                index.to_string().purple()
            ),
            lir::Instruction::SpillStore { slot, source } => {
                write!(f, "{} {slot}, {source}", "spill_store".cyan())
            }
            lir::Instruction::SpillLoad { destination, slot } => write!(
                f,
                "{destination} {} {} {slot}",
                "=".white(),
                "spill_load".cyan()
            ),
            lir::Instruction::Jump { destination } => {
                write!(f, "{} {}", "jmp".cyan(), destination.to_string().blue())
            }
            lir::Instruction::Branch {
                condition,
                positive,
                negative,
            } => write!(
                f,
                "{} {condition} {} {}",
                "br".cyan(),
                positive.to_string().blue(),
                negative.to_string().blue()
            ),
            lir::Instruction::Return { value } => write!(f, "{} {value}", "ret".cyan()),
        }
    }
}

impl Display for lir::RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("%{}", self.index()).yellow())
    }
}

impl Display for lir::BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".label_{}", self.index())
    }
}

impl Display for lir::SpillSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot{}", self.index())
    }
}

impl Display for lir::Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Immediate::Int(value) => write!(f, "{value}"),
            lir::Immediate::Bool(value) => write!(f, "{value}"),
            lir::Immediate::Str(value) => write!(f, "{:?}", value.value()),
            lir::Immediate::Unit => write!(f, "()"),
        }
    }
}

impl<R: Display> Display for lir::Operand<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Operand::Immediate(immediate) => write!(f, "{}", immediate.to_string().purple()),
            lir::Operand::Register(register) => write!(f, "{register}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::{ast::BinaryOperatorKind, intern::InternedSymbol},
        index::IndexVec,
        middle::{
            lir::{
                AllocationShape, Block, BlockId, Function, Immediate, Instruction, Operand,
                Register, RegisterId,
            },
            primitive::PrimitiveKind,
            ty::TypeContext,
        },
    };

    #[test]
    fn renders_blocks_and_instructions() {
        let mut types = TypeContext::new();
        let int = types.get_primitive_type(PrimitiveKind::Int);
        let r = |n| RegisterId::new(n);

        let function = Function {
            name: InternedSymbol::new("shown"),
            parameters: vec![r(0)],
            registers: (0..3)
                .map(|n| Register {
                    id: r(n),
                    ty: int.clone(),
                })
                .collect(),
            blocks: IndexVec::from_raw(vec![Block {
                id: BlockId::ZERO,
                instructions: vec![
                    Instruction::BinaryOperation {
                        operator: BinaryOperatorKind::Add,
                        destination: r(1),
                        lhs: Operand::Register(r(0)),
                        rhs: Operand::Immediate(Immediate::Int(4)),
                    },
                    Instruction::Allocate {
                        destination: r(2),
                        shape: AllocationShape::List { length: 1 },
                        live_across: vec![r(1)],
                    },
                    Instruction::StoreField {
                        object: r(2),
                        index: 0,
                        value: Operand::Immediate(Immediate::Str(InternedSymbol::new("rill"))),
                    },
                    Instruction::Return {
                        value: Operand::Register(r(1)),
                    },
                ],
                predecessors: BTreeSet::new(),
            }]),
        };

        assert_eq!(
            strip_ansi_escapes::strip_str(render(&function)),
            concat!(
                "fn shown(%0) {\n",
                ".label_0:\n",
                "    %1 = %0 + 4\n",
                "    %2 = alloc list 1 live(%1)\n",
                "    store_field %2, 0, \"rill\"\n",
                "    ret %1\n",
                "}\n",
            )
        );
    }
}
