//! Lowers a typed function into LIR.
//!
//! Every local gets exactly one register for its whole lifetime, and every
//! expression producing a value gets a fresh one. Control flow joins through
//! moves into a shared destination register instead of phis, so the output
//! is not in SSA form.

use std::collections::BTreeMap;

use log::trace;

use super::{
    AllocationShape, Block, BlockId, Callee, Function, Immediate, Instruction, Operand, Register,
    RegisterId, verify::LoweringError,
};
use crate::{
    frontend::ast::{BinaryOperatorKind, Literal},
    index::IndexVec,
    middle::{
        hir::{self, LocalId, MatchId, TypedExpression, TypedExpressionKind, TypedMatchArm},
        pattern::{Binding, DecisionTree, MatchDecisions, Occurrence},
        primitive::PrimitiveKind,
        ty::{self, TypeContext},
    },
};

/// Lowers a function using the decision trees compiled for its matches
pub fn lower(
    function: &hir::TypedFunction,
    decisions: &MatchDecisions,
) -> Result<Function, LoweringError> {
    let mut lcx = BodyLoweringContext {
        function,
        decisions,
        types: TypeContext::new(),
        register_map: IndexVec::new(),
        local_to_register_map: BTreeMap::new(),
        block_map: IndexVec::new(),
        current_block: BlockId::ZERO,
    };

    lcx.current_block = lcx.create_block();

    let parameters = function
        .parameters
        .iter()
        .map(|&local| lcx.declare_local(local))
        .collect();

    let value = lcx.lower_expression(&function.body)?;
    lcx.push_instruction(Instruction::Return { value });

    if let Some(register) = lcx.register_map.iter().find(|r| r.ty.is_unresolved()) {
        return Err(LoweringError::UnresolvedType {
            function: function.name,
            ty: register.ty.to_string(),
        });
    }

    Ok(lcx.into_output(parameters))
}

struct BodyLoweringContext<'hir> {
    function: &'hir hir::TypedFunction,
    decisions: &'hir MatchDecisions,
    /// Only used for the bool registers of comparisons we introduce
    types: TypeContext,

    register_map: IndexVec<RegisterId, Register>,
    local_to_register_map: BTreeMap<LocalId, RegisterId>,

    block_map: IndexVec<BlockId, Block>,
    current_block: BlockId,
}

/// The parts of a match every node of its decision tree needs
struct MatchLowering<'a> {
    id: MatchId,
    arms: &'a [TypedMatchArm],
    occurrences: BTreeMap<Occurrence, RegisterId>,
    /// Arm bodies are only given a block once some path reaches them
    arm_blocks: Vec<Option<BlockId>>,
}

impl<'hir> BodyLoweringContext<'hir> {
    fn create_register(&mut self, ty: ty::Type) -> RegisterId {
        let id = self.register_map.next_index();
        self.register_map.push(Register { id, ty })
    }

    fn create_bool_register(&mut self) -> RegisterId {
        let ty = self.types.get_primitive_type(PrimitiveKind::Bool);
        self.create_register(ty)
    }

    fn create_block(&mut self) -> BlockId {
        let id = self.block_map.next_index();
        self.block_map.push(Block {
            id,
            instructions: Vec::new(),
            predecessors: Default::default(),
        })
    }

    fn push_instruction(&mut self, instruction: Instruction) {
        self.block_map[self.current_block]
            .instructions
            .push(instruction);
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current_block = block;
    }

    fn into_output(self, parameters: Vec<RegisterId>) -> Function {
        let mut function = Function {
            name: self.function.name,
            parameters,
            registers: self.register_map,
            blocks: self.block_map,
        };
        function.recompute_predecessors();
        function
    }

    /// The register of a local, created the first time it is bound
    fn declare_local(&mut self, local: LocalId) -> RegisterId {
        if let Some(&register) = self.local_to_register_map.get(&local) {
            return register;
        }

        let ty = self.function.locals[local].ty.clone();
        let register = self.create_register(ty);
        self.local_to_register_map.insert(local, register);
        register
    }

    fn local_register(&self, local: LocalId) -> Result<RegisterId, LoweringError> {
        self.local_to_register_map
            .get(&local)
            .copied()
            .ok_or(LoweringError::UnknownLocal {
                function: self.function.name,
                local,
            })
    }

    /// Places an operand in a register, moving immediates into a new one
    fn into_register(&mut self, operand: Operand, ty: &ty::Type) -> RegisterId {
        match operand {
            Operand::Register(register) => register,
            Operand::Immediate(_) => {
                let register = self.create_register(ty.clone());
                self.push_instruction(Instruction::Move {
                    destination: register,
                    source: operand,
                });
                register
            }
        }
    }

    fn lower_expressions(
        &mut self,
        expressions: &[TypedExpression],
    ) -> Result<Vec<Operand>, LoweringError> {
        expressions
            .iter()
            .map(|expression| self.lower_expression(expression))
            .collect()
    }

    fn lower_expression(&mut self, expression: &TypedExpression) -> Result<Operand, LoweringError> {
        match &expression.kind {
            TypedExpressionKind::Literal(literal) => {
                Ok(Operand::Immediate(literal_immediate(*literal)))
            }
            TypedExpressionKind::Local(local) => Ok(Operand::Register(self.local_register(*local)?)),
            TypedExpressionKind::Function(symbol) => {
                let destination = self.create_register(expression.ty.clone());
                self.push_instruction(Instruction::FunctionAddress {
                    destination,
                    function: *symbol,
                });
                Ok(Operand::Register(destination))
            }
            TypedExpressionKind::Let { local, value, body } => {
                let source = self.lower_expression(value)?;
                let destination = self.declare_local(*local);
                self.push_instruction(Instruction::Move {
                    destination,
                    source,
                });

                self.lower_expression(body)
            }
            TypedExpressionKind::Block(expressions) => {
                let mut last = Operand::Immediate(Immediate::Unit);
                for expression in expressions {
                    last = self.lower_expression(expression)?;
                }
                Ok(last)
            }
            TypedExpressionKind::If {
                condition,
                positive,
                negative,
            } => self.lower_if(expression, condition, positive, negative.as_deref()),
            TypedExpressionKind::Record { record, fields } => {
                // Initializers run in source order, stores go by field index
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push((field.index, self.lower_expression(&field.value)?));
                }

                let shape = AllocationShape::Record {
                    name: *record,
                    fields: fields.len() as u32,
                };
                Ok(self.lower_allocation(expression, shape, values))
            }
            TypedExpressionKind::List(elements) => {
                let values = self
                    .lower_expressions(elements)?
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| (index as u32, value))
                    .collect();

                let shape = AllocationShape::List {
                    length: elements.len() as u32,
                };
                Ok(self.lower_allocation(expression, shape, values))
            }
            TypedExpressionKind::Field { target, index, .. } => {
                let object = self.lower_expression(target)?;
                let object = self.into_register(object, &target.ty);

                let destination = self.create_register(expression.ty.clone());
                self.push_instruction(Instruction::LoadField {
                    destination,
                    object,
                    index: *index,
                });
                Ok(Operand::Register(destination))
            }
            TypedExpressionKind::Call { callee, arguments } => {
                let callee = match callee {
                    hir::Callee::Function(symbol) => Callee::Direct(*symbol),
                    hir::Callee::Method { symbol, .. } => Callee::Direct(*symbol),
                    // The callee is evaluated before the arguments
                    hir::Callee::Value(target) => {
                        let value = self.lower_expression(target)?;
                        Callee::Indirect(self.into_register(value, &target.ty))
                    }
                };
                let arguments = self.lower_expressions(arguments)?;

                let destination = self.create_register(expression.ty.clone());
                self.push_instruction(Instruction::Call {
                    callee,
                    arguments,
                    destination,
                });
                Ok(Operand::Register(destination))
            }
            TypedExpressionKind::Match {
                id,
                scrutinee,
                arms,
            } => self.lower_match(expression, *id, scrutinee, arms),
            TypedExpressionKind::Binary { lhs, operator, rhs } => match operator {
                BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr => {
                    self.lower_short_circuit(*operator, lhs, rhs)
                }
                _ => {
                    let lhs = self.lower_expression(lhs)?;
                    let rhs = self.lower_expression(rhs)?;

                    let destination = self.create_register(expression.ty.clone());
                    self.push_instruction(Instruction::BinaryOperation {
                        operator: *operator,
                        destination,
                        lhs,
                        rhs,
                    });
                    Ok(Operand::Register(destination))
                }
            },
            TypedExpressionKind::Unary { operator, operand } => {
                let operand = self.lower_expression(operand)?;

                let destination = self.create_register(expression.ty.clone());
                self.push_instruction(Instruction::UnaryOperation {
                    operator: *operator,
                    destination,
                    operand,
                });
                Ok(Operand::Register(destination))
            }
        }
    }

    fn lower_allocation(
        &mut self,
        expression: &TypedExpression,
        shape: AllocationShape,
        values: Vec<(u32, Operand)>,
    ) -> Operand {
        let object = self.create_register(expression.ty.clone());
        self.push_instruction(Instruction::Allocate {
            destination: object,
            shape,
            live_across: Vec::new(),
        });

        for (index, value) in values {
            self.push_instruction(Instruction::StoreField {
                object,
                index,
                value,
            });
        }

        Operand::Register(object)
    }

    fn lower_if(
        &mut self,
        expression: &TypedExpression,
        condition: &TypedExpression,
        positive: &TypedExpression,
        negative: Option<&TypedExpression>,
    ) -> Result<Operand, LoweringError> {
        let condition = self.lower_expression(condition)?;

        // Without an else there is no value to merge, the negative edge goes
        // straight to the merge block
        let Some(negative) = negative else {
            let positive_block = self.create_block();
            let merge_block = self.create_block();

            self.push_instruction(Instruction::Branch {
                condition,
                positive: positive_block,
                negative: merge_block,
            });

            self.switch_to(positive_block);
            self.lower_expression(positive)?;
            self.push_instruction(Instruction::Jump {
                destination: merge_block,
            });

            self.switch_to(merge_block);
            return Ok(Operand::Immediate(Immediate::Unit));
        };

        let destination = self.create_register(expression.ty.clone());
        let positive_block = self.create_block();
        let negative_block = self.create_block();
        let merge_block = self.create_block();

        self.push_instruction(Instruction::Branch {
            condition,
            positive: positive_block,
            negative: negative_block,
        });

        for (block, branch) in [(positive_block, positive), (negative_block, negative)] {
            self.switch_to(block);
            let source = self.lower_expression(branch)?;
            self.push_instruction(Instruction::Move {
                destination,
                source,
            });
            self.push_instruction(Instruction::Jump {
                destination: merge_block,
            });
        }

        self.switch_to(merge_block);
        Ok(Operand::Register(destination))
    }

    /// `a and b` only evaluates `b` when `a` holds, `a or b` only when it
    /// doesn't
    fn lower_short_circuit(
        &mut self,
        operator: BinaryOperatorKind,
        lhs: &TypedExpression,
        rhs: &TypedExpression,
    ) -> Result<Operand, LoweringError> {
        let lhs = self.lower_expression(lhs)?;

        let destination = self.create_bool_register();
        self.push_instruction(Instruction::Move {
            destination,
            source: lhs,
        });

        let rhs_block = self.create_block();
        let merge_block = self.create_block();

        let (positive, negative) = match operator {
            BinaryOperatorKind::LogicalAnd => (rhs_block, merge_block),
            _ => (merge_block, rhs_block),
        };
        self.push_instruction(Instruction::Branch {
            condition: lhs,
            positive,
            negative,
        });

        self.switch_to(rhs_block);
        let source = self.lower_expression(rhs)?;
        self.push_instruction(Instruction::Move {
            destination,
            source,
        });
        self.push_instruction(Instruction::Jump {
            destination: merge_block,
        });

        self.switch_to(merge_block);
        Ok(Operand::Register(destination))
    }

    fn lower_match(
        &mut self,
        expression: &TypedExpression,
        id: MatchId,
        scrutinee: &TypedExpression,
        arms: &[TypedMatchArm],
    ) -> Result<Operand, LoweringError> {
        let decisions = self.decisions;
        let tree = decisions
            .get(&id)
            .ok_or(LoweringError::MissingDecisionTree {
                function: self.function.name,
                id,
            })?;

        let value = self.lower_expression(scrutinee)?;
        let root = self.into_register(value, &scrutinee.ty);

        // Every part of the scrutinee the tree looks at is loaded once up
        // front, parents before children
        let mut types = BTreeMap::new();
        types.insert(Occurrence::root(), scrutinee.ty.clone());
        for arm in arms {
            collect_occurrence_types(&arm.pattern, Occurrence::root(), &mut types);
        }

        let mut occurrences = BTreeMap::new();
        for occurrence in tree.occurrences() {
            let (Some(parent), Some(index)) = (occurrence.parent(), occurrence.last_field()) else {
                occurrences.insert(occurrence, root);
                continue;
            };

            let (Some(&object), Some(ty)) = (occurrences.get(&parent), types.get(&occurrence))
            else {
                return Err(LoweringError::UnknownOccurrence {
                    function: self.function.name,
                    id,
                    occurrence: occurrence.to_string(),
                });
            };

            let destination = self.create_register(ty.clone());
            self.push_instruction(Instruction::LoadField {
                destination,
                object,
                index,
            });
            occurrences.insert(occurrence, destination);
        }

        let destination = self.create_register(expression.ty.clone());
        let merge_block = self.create_block();

        let mut lowering = MatchLowering {
            id,
            arms,
            occurrences,
            arm_blocks: vec![None; arms.len()],
        };
        self.lower_decision(tree, &mut lowering)?;

        trace!(
            "lowered match #{:?} in `{}` with {} reachable arms",
            id,
            self.function.name,
            lowering.arm_blocks.iter().flatten().count()
        );

        for (arm, block) in arms.iter().zip(lowering.arm_blocks) {
            let Some(block) = block else {
                continue;
            };

            self.switch_to(block);
            let source = self.lower_expression(&arm.body)?;
            self.push_instruction(Instruction::Move {
                destination,
                source,
            });
            self.push_instruction(Instruction::Jump {
                destination: merge_block,
            });
        }

        self.switch_to(merge_block);
        Ok(Operand::Register(destination))
    }

    /// Lowers a decision tree node into the current block, terminating it
    fn lower_decision(
        &mut self,
        tree: &DecisionTree,
        lowering: &mut MatchLowering<'_>,
    ) -> Result<(), LoweringError> {
        match tree {
            DecisionTree::Leaf { arm, bindings } => {
                self.bind(bindings, lowering)?;
                let body = self.arm_block(*arm, lowering);
                self.push_instruction(Instruction::Jump { destination: body });
            }
            DecisionTree::Guard {
                arm,
                bindings,
                fallback,
            } => {
                self.bind(bindings, lowering)?;

                let Some(guard) = lowering.arms.get(*arm).and_then(|a| a.guard.as_ref()) else {
                    let body = self.arm_block(*arm, lowering);
                    self.push_instruction(Instruction::Jump { destination: body });
                    return Ok(());
                };

                let condition = self.lower_expression(guard)?;
                let body = self.arm_block(*arm, lowering);
                let fallback_block = self.create_block();

                self.push_instruction(Instruction::Branch {
                    condition,
                    positive: body,
                    negative: fallback_block,
                });

                self.switch_to(fallback_block);
                self.lower_decision(fallback, lowering)?;
            }
            DecisionTree::Test {
                occurrence,
                branches,
                default,
            } => {
                let value = self.occurrence_register(occurrence, lowering)?;

                for (i, (literal, branch)) in branches.iter().enumerate() {
                    // With no default the last literal is the only value left
                    if default.is_none() && i == branches.len() - 1 {
                        return self.lower_decision(branch, lowering);
                    }

                    let condition = self.create_bool_register();
                    self.push_instruction(Instruction::BinaryOperation {
                        operator: BinaryOperatorKind::Equals,
                        destination: condition,
                        lhs: Operand::Register(value),
                        rhs: Operand::Immediate(literal_immediate(*literal)),
                    });

                    let matched = self.create_block();
                    let next = self.create_block();
                    self.push_instruction(Instruction::Branch {
                        condition: Operand::Register(condition),
                        positive: matched,
                        negative: next,
                    });

                    self.switch_to(matched);
                    self.lower_decision(branch, lowering)?;
                    self.switch_to(next);
                }

                if let Some(default) = default {
                    self.lower_decision(default, lowering)?;
                }
            }
            DecisionTree::Fail => {
                return Err(LoweringError::UnexpectedMatchFailure {
                    function: self.function.name,
                });
            }
        }

        Ok(())
    }

    fn bind(
        &mut self,
        bindings: &[Binding],
        lowering: &MatchLowering<'_>,
    ) -> Result<(), LoweringError> {
        for binding in bindings {
            let source = self.occurrence_register(&binding.occurrence, lowering)?;
            let destination = self.declare_local(binding.local);
            self.push_instruction(Instruction::Move {
                destination,
                source: Operand::Register(source),
            });
        }

        Ok(())
    }

    fn occurrence_register(
        &self,
        occurrence: &Occurrence,
        lowering: &MatchLowering<'_>,
    ) -> Result<RegisterId, LoweringError> {
        lowering
            .occurrences
            .get(occurrence)
            .copied()
            .ok_or_else(|| LoweringError::UnknownOccurrence {
                function: self.function.name,
                id: lowering.id,
                occurrence: occurrence.to_string(),
            })
    }

    fn arm_block(&mut self, arm: usize, lowering: &mut MatchLowering<'_>) -> BlockId {
        if let Some(Some(block)) = lowering.arm_blocks.get(arm) {
            return *block;
        }

        let block = self.create_block();
        if let Some(slot) = lowering.arm_blocks.get_mut(arm) {
            *slot = Some(block);
        }
        block
    }
}

fn collect_occurrence_types(
    pattern: &hir::TypedPattern,
    occurrence: Occurrence,
    types: &mut BTreeMap<Occurrence, ty::Type>,
) {
    if let hir::TypedPatternKind::Record { fields, .. } = &pattern.kind {
        for field in fields {
            collect_occurrence_types(&field.pattern, occurrence.child(field.index), types);
        }
    }

    types.entry(occurrence).or_insert_with(|| pattern.ty.clone());
}

fn literal_immediate(literal: Literal) -> Immediate {
    match literal {
        Literal::Integer(value) => Immediate::Int(value),
        Literal::Boolean(value) => Immediate::Bool(value),
        Literal::String(value) => Immediate::Str(value),
        Literal::Unit => Immediate::Unit,
    }
}
