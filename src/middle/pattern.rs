//! Match compilation
//!
//! The arms of a `match` are compiled into a decision tree which tests every
//! part of the scrutinee at most once on any path. Records only have a single
//! shape, so a record pattern never needs a runtime test of its own; it is
//! just the conjunction of the patterns on its fields. What remains for each
//! arm is a list of literal tests on occurrences (field paths into the
//! scrutinee) plus the locals it binds.
//!
//! Compilation looks at the first remaining arm. If it has no tests left it
//! wins, guarded or not. Otherwise we test the first occurrence it cares
//! about, with one branch per distinct literal any arm expects there and a
//! default branch for the values nobody mentioned.
//!
//! Any arm which never makes it into the tree can't ever be selected, and any
//! `Fail` node in the tree is a value nothing handles.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::{
    frontend::{Span, ast::Literal, intern::InternedSymbol},
    middle::{
        hir::{
            LocalId, MatchId, RecordTable, TypedExpression, TypedExpressionKind, TypedFunction,
            TypedMatchArm, TypedPattern, TypedPatternKind,
            visit::{Visitor, walk_expression},
        },
        primitive::PrimitiveKind,
        ty::{Type, TypeKind},
    },
};

/// A path of field indices leading from the scrutinee to some part of it.
/// The empty path is the scrutinee itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Occurrence(Vec<u32>);

impl Occurrence {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, field: u32) -> Self {
        let mut path = self.0.clone();
        path.push(field);
        Self(path)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.0.split_last()?;
        Some(Self(parent.to_vec()))
    }

    /// Field index taken from the parent to reach this occurrence
    pub fn last_field(&self) -> Option<u32> {
        self.0.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True if `self` is `other` or lies somewhere inside it
    pub fn starts_with(&self, other: &Occurrence) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl core::fmt::Display for Occurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$")?;
        for field in &self.0 {
            write!(f, ".{field}")?;
        }
        Ok(())
    }
}

/// A local bound by an arm's pattern to the value found at an occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub local: LocalId,
    pub occurrence: Occurrence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionTree {
    /// The arm is selected unconditionally
    Leaf { arm: usize, bindings: Vec<Binding> },
    /// The arm is selected if its guard holds, otherwise continue with
    /// `fallback`. The bindings are visible to the guard.
    Guard {
        arm: usize,
        bindings: Vec<Binding>,
        fallback: Box<DecisionTree>,
    },
    /// Compare the value at `occurrence` against each literal in order
    Test {
        occurrence: Occurrence,
        branches: Vec<(Literal, DecisionTree)>,
        /// Absent when the branches cover every possible value
        default: Option<Box<DecisionTree>>,
    },
    /// No arm matches
    Fail,
}

impl DecisionTree {
    /// Arms which can be selected through this tree, ascending
    pub fn reachable_arms(&self) -> BTreeSet<usize> {
        let mut arms = BTreeSet::new();
        self.collect_arms(&mut arms);
        arms
    }

    fn collect_arms(&self, arms: &mut BTreeSet<usize>) {
        match self {
            DecisionTree::Leaf { arm, .. } => {
                arms.insert(*arm);
            }
            DecisionTree::Guard { arm, fallback, .. } => {
                arms.insert(*arm);
                fallback.collect_arms(arms);
            }
            DecisionTree::Test {
                branches, default, ..
            } => {
                for (_, branch) in branches {
                    branch.collect_arms(arms);
                }
                if let Some(default) = default {
                    default.collect_arms(arms);
                }
            }
            DecisionTree::Fail => {}
        }
    }

    /// Every occurrence that is tested or bound anywhere in the tree, plus
    /// the occurrences on the way to them. Shallowest first, so loading them
    /// in order always finds the parent already loaded.
    pub fn occurrences(&self) -> Vec<Occurrence> {
        let mut used = BTreeSet::new();
        self.collect_occurrences(&mut used);

        let mut all = BTreeSet::new();
        for occurrence in used {
            let mut current = Some(occurrence);
            while let Some(occurrence) = current {
                current = occurrence.parent();
                all.insert(occurrence);
            }
        }

        all.into_iter()
            .sorted_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.cmp(b)))
            .collect()
    }

    fn collect_occurrences(&self, used: &mut BTreeSet<Occurrence>) {
        match self {
            DecisionTree::Leaf { bindings, .. } => {
                used.extend(bindings.iter().map(|b| b.occurrence.clone()));
            }
            DecisionTree::Guard {
                bindings, fallback, ..
            } => {
                used.extend(bindings.iter().map(|b| b.occurrence.clone()));
                fallback.collect_occurrences(used);
            }
            DecisionTree::Test {
                occurrence,
                branches,
                default,
            } => {
                used.insert(occurrence.clone());
                for (_, branch) in branches {
                    branch.collect_occurrences(used);
                }
                if let Some(default) = default {
                    default.collect_occurrences(used);
                }
            }
            DecisionTree::Fail => {}
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            DecisionTree::Leaf { .. } | DecisionTree::Fail => 1,
            DecisionTree::Guard { fallback, .. } => 1 + fallback.depth(),
            DecisionTree::Test {
                branches, default, ..
            } => {
                let deepest = branches
                    .iter()
                    .map(|(_, branch)| branch.depth())
                    .chain(default.iter().map(|d| d.depth()))
                    .max()
                    .unwrap_or(0);

                1 + deepest
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unreachable pattern in match arm {}", arm + 1)]
    UnreachableArm { arm: usize, span: Span },
    #[error("non-exhaustive patterns: `{witness}` not covered")]
    NonExhaustive { witness: String, span: Span },
}

impl PatternError {
    pub fn span(&self) -> Span {
        match self {
            PatternError::UnreachableArm { span, .. } | PatternError::NonExhaustive { span, .. } => {
                *span
            }
        }
    }
}

/// Decision trees for every `match` in a function
pub type MatchDecisions = BTreeMap<MatchId, DecisionTree>;

/// Compiles every `match` in a function, reporting the problems found in all
/// of them
pub fn check_matches(
    function: &TypedFunction,
    records: &RecordTable,
) -> (MatchDecisions, Vec<PatternError>) {
    let mut checker = MatchChecker {
        records,
        decisions: BTreeMap::new(),
        errors: Vec::new(),
    };
    checker.visit_function(function);

    (checker.decisions, checker.errors)
}

struct MatchChecker<'r> {
    records: &'r RecordTable,
    decisions: MatchDecisions,
    errors: Vec<PatternError>,
}

impl Visitor for MatchChecker<'_> {
    fn visit_expression(&mut self, expression: &TypedExpression) {
        if let TypedExpressionKind::Match {
            id,
            scrutinee,
            arms,
        } = &expression.kind
        {
            let (tree, errors) = compile(arms, &scrutinee.ty, self.records, expression.span);
            self.decisions.insert(*id, tree);
            self.errors.extend(errors);
        }

        walk_expression(self, expression);
    }
}

/// Compiles the arms of a single match against a scrutinee of the given
/// type. The tree is produced even when problems are found.
pub fn compile(
    arms: &[TypedMatchArm],
    scrutinee_type: &Type,
    records: &RecordTable,
    span: Span,
) -> (DecisionTree, Vec<PatternError>) {
    let rows: Vec<Row> = arms
        .iter()
        .enumerate()
        .map(|(index, arm)| {
            let mut row = Row {
                arm: index,
                tests: Vec::new(),
                bindings: Vec::new(),
                guarded: arm.guard.is_some(),
            };
            row.flatten(&arm.pattern, Occurrence::root());
            row
        })
        .collect();

    let mut compiler = MatchCompiler {
        path: Vec::new(),
        failure: None,
    };
    let tree = compiler.compile_rows(&rows);

    debug!("compiled match with {} arms, depth {}", arms.len(), tree.depth());

    let reachable = tree.reachable_arms();
    let mut errors: Vec<PatternError> = arms
        .iter()
        .enumerate()
        .filter(|(index, _)| !reachable.contains(index))
        .map(|(arm, a)| PatternError::UnreachableArm { arm, span: a.span })
        .collect();

    if let Some(constraints) = compiler.failure {
        let witness = Witness {
            records,
            constraints: &constraints,
        }
        .describe(scrutinee_type, &Occurrence::root());

        errors.push(PatternError::NonExhaustive { witness, span });
    }

    (tree, errors)
}

/// An arm reduced to the literal tests it needs to pass
#[derive(Debug, Clone)]
struct Row {
    arm: usize,
    tests: Vec<(Occurrence, Literal)>,
    bindings: Vec<Binding>,
    guarded: bool,
}

impl Row {
    fn flatten(&mut self, pattern: &TypedPattern, occurrence: Occurrence) {
        match &pattern.kind {
            TypedPatternKind::Wildcard => {}
            TypedPatternKind::Binding(local) => self.bindings.push(Binding {
                local: *local,
                occurrence,
            }),
            TypedPatternKind::Literal(literal) => self.tests.push((occurrence, *literal)),
            TypedPatternKind::Record { fields, .. } => {
                for field in fields {
                    self.flatten(&field.pattern, occurrence.child(field.index));
                }
            }
        }
    }

    fn test_at(&self, occurrence: &Occurrence) -> Option<Literal> {
        self.tests
            .iter()
            .find(|(o, _)| o == occurrence)
            .map(|(_, literal)| *literal)
    }

    fn without_test_at(&self, occurrence: &Occurrence) -> Row {
        let mut row = self.clone();
        row.tests.retain(|(o, _)| o != occurrence);
        row
    }
}

#[derive(Debug, Clone)]
enum Constraint {
    Is(Literal),
    IsNot(Vec<Literal>),
}

struct MatchCompiler {
    /// What we know about the scrutinee at the current point of the tree
    path: Vec<(Occurrence, Constraint)>,
    /// The knowledge at the first `Fail` node we produced
    failure: Option<Vec<(Occurrence, Constraint)>>,
}

impl MatchCompiler {
    fn compile_rows(&mut self, rows: &[Row]) -> DecisionTree {
        let Some(first) = rows.first() else {
            if self.failure.is_none() {
                self.failure = Some(self.path.clone());
            }
            return DecisionTree::Fail;
        };

        let Some((occurrence, _)) = first.tests.first().cloned() else {
            let bindings = first.bindings.clone();

            if first.guarded {
                return DecisionTree::Guard {
                    arm: first.arm,
                    bindings,
                    fallback: Box::new(self.compile_rows(&rows[1..])),
                };
            }

            return DecisionTree::Leaf {
                arm: first.arm,
                bindings,
            };
        };

        let literals: Vec<Literal> = rows
            .iter()
            .filter_map(|row| row.test_at(&occurrence))
            .unique()
            .collect();

        let mut branches = Vec::with_capacity(literals.len());
        for literal in &literals {
            let specialized: Vec<Row> = rows
                .iter()
                .filter_map(|row| match row.test_at(&occurrence) {
                    None => Some(row.clone()),
                    Some(expected) if expected == *literal => Some(row.without_test_at(&occurrence)),
                    Some(_) => None,
                })
                .collect();

            self.path.push((occurrence.clone(), Constraint::Is(*literal)));
            branches.push((*literal, self.compile_rows(&specialized)));
            self.path.pop();
        }

        let default = if covers_every_value(&literals) {
            None
        } else {
            let remaining: Vec<Row> = rows
                .iter()
                .filter(|row| row.test_at(&occurrence).is_none())
                .cloned()
                .collect();

            self.path
                .push((occurrence.clone(), Constraint::IsNot(literals.clone())));
            let default = self.compile_rows(&remaining);
            self.path.pop();

            Some(Box::new(default))
        };

        DecisionTree::Test {
            occurrence,
            branches,
            default,
        }
    }
}

fn literal_primitive(literal: &Literal) -> PrimitiveKind {
    match literal {
        Literal::Integer(_) => PrimitiveKind::Int,
        Literal::Boolean(_) => PrimitiveKind::Bool,
        Literal::String(_) => PrimitiveKind::Str,
        Literal::Unit => PrimitiveKind::Unit,
    }
}

/// Only bool and unit have few enough values to be covered by literals
fn covers_every_value(literals: &[Literal]) -> bool {
    let Some(primitive) = literals.first().map(literal_primitive) else {
        return false;
    };

    if !primitive.is_finite() {
        return false;
    }

    match primitive {
        PrimitiveKind::Bool => {
            literals.contains(&Literal::Boolean(true)) && literals.contains(&Literal::Boolean(false))
        }
        PrimitiveKind::Unit => literals.contains(&Literal::Unit),
        PrimitiveKind::Int | PrimitiveKind::Str => false,
    }
}

/// Builds an example of a value reaching a `Fail` node
struct Witness<'a> {
    records: &'a RecordTable,
    constraints: &'a [(Occurrence, Constraint)],
}

impl Witness<'_> {
    fn describe(&self, ty: &Type, occurrence: &Occurrence) -> String {
        if let Some((_, constraint)) = self.constraints.iter().find(|(o, _)| o == occurrence) {
            return match constraint {
                Constraint::Is(literal) => literal.to_string(),
                Constraint::IsNot(excluded) => value_outside(excluded),
            };
        }

        if let TypeKind::Record(name) = &**ty {
            let constrained_inside = self
                .constraints
                .iter()
                .any(|(o, _)| o.starts_with(occurrence));

            if let (true, Some(record)) = (constrained_inside, self.records.get(*name)) {
                let fields = record
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(index, field)| {
                        let value = self.describe(&field.ty, &occurrence.child(index as u32));
                        format!("{}: {value}", field.name)
                    })
                    .join(", ");

                return format!("{name} {{ {fields} }}");
            }
        }

        "_".to_owned()
    }
}

/// Smallest value of the literals' type that isn't one of them
fn value_outside(excluded: &[Literal]) -> String {
    let Some(first) = excluded.first() else {
        return "_".to_owned();
    };

    let witness = match literal_primitive(first) {
        PrimitiveKind::Int => {
            let value = (0..)
                .find(|n| !excluded.contains(&Literal::Integer(*n)))
                .unwrap_or_default();
            Literal::Integer(value)
        }
        PrimitiveKind::Str => {
            let value = (0..)
                .map(|n| "a".repeat(n))
                .find(|s| !excluded.contains(&Literal::String(InternedSymbol::new(s))))
                .unwrap_or_default();
            Literal::String(InternedSymbol::new(&value))
        }
        PrimitiveKind::Bool => Literal::Boolean(excluded.contains(&Literal::Boolean(false))),
        PrimitiveKind::Unit => Literal::Unit,
    };

    witness.to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::ast::{self, BinaryOperatorKind, build::*},
        middle::{hir::TypedProgram, type_checking::infer},
    };

    fn checked(parameter: ast::Type, arms: Vec<ast::MatchArm>) -> (TypedProgram, MatchDecisions, Vec<PatternError>) {
        let program = program(vec![
            record_def("Record", &[("lang", ty("str")), ("time", ty("int"))]),
            function("f", &[("x", parameter)], None, match_on(var("x"), arms)),
        ]);

        let typed = infer(&program).unwrap();
        let function = typed.function("f").unwrap();
        let (decisions, errors) = check_matches(function, &typed.records);

        (typed, decisions, errors)
    }

    fn only_tree(decisions: &MatchDecisions) -> &DecisionTree {
        assert_eq!(decisions.len(), 1);
        decisions.values().next().unwrap()
    }

    #[test]
    fn both_booleans_need_no_default() {
        let (_, decisions, errors) = checked(
            ty("bool"),
            vec![arm(bool_pattern(true), int(1)), arm(bool_pattern(false), int(0))],
        );

        assert!(errors.is_empty(), "{errors:?}");
        let DecisionTree::Test {
            branches, default, ..
        } = only_tree(&decisions)
        else {
            panic!("expected a test");
        };
        assert_eq!(branches.len(), 2);
        assert!(default.is_none());
    }

    #[test]
    fn repeated_literal_is_unreachable() {
        let (_, decisions, errors) = checked(
            ty("int"),
            vec![
                arm(int_pattern(1), int(10)),
                arm(int_pattern(2), int(20)),
                arm(int_pattern(2), int(30)),
                arm(wildcard(), int(40)),
            ],
        );

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PatternError::UnreachableArm { arm: 2, .. }));

        let tree = only_tree(&decisions);
        assert_eq!(tree.reachable_arms(), BTreeSet::from([0, 1, 3]));
        let DecisionTree::Test {
            branches, default, ..
        } = tree
        else {
            panic!("expected a test");
        };
        assert_eq!(
            branches.iter().map(|(literal, _)| *literal).collect::<Vec<_>>(),
            [Literal::Integer(1), Literal::Integer(2)]
        );
        assert_eq!(
            default.as_deref(),
            Some(&DecisionTree::Leaf {
                arm: 3,
                bindings: vec![]
            })
        );
    }

    #[test]
    fn arms_after_a_wildcard_are_unreachable() {
        let (_, _, errors) = checked(
            ty("int"),
            vec![arm(wildcard(), int(0)), arm(int_pattern(1), int(1))],
        );

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PatternError::UnreachableArm { arm: 1, .. }));
    }

    #[test]
    fn integers_need_a_catch_all() {
        let (_, _, errors) = checked(
            ty("int"),
            vec![arm(int_pattern(0), int(0)), arm(int_pattern(1), int(1))],
        );

        assert_eq!(
            errors,
            [PatternError::NonExhaustive {
                witness: "2".to_owned(),
                span: Span::DUMMY
            }]
        );
        assert_eq!(errors[0].to_string(), "non-exhaustive patterns: `2` not covered");
    }

    #[test]
    fn missing_bool_is_named() {
        let (_, _, errors) = checked(ty("bool"), vec![arm(bool_pattern(true), int(1))]);

        assert!(matches!(
            &errors[..],
            [PatternError::NonExhaustive { witness, .. }] if witness == "false"
        ));
    }

    #[test]
    fn strings_need_a_catch_all() {
        let (_, _, errors) = checked(ty("str"), vec![arm(string_pattern(""), int(1))]);

        assert!(matches!(
            &errors[..],
            [PatternError::NonExhaustive { witness, .. }] if witness == "\"a\""
        ));
    }

    #[test]
    fn record_witness_names_every_field() {
        let (_, _, errors) = checked(
            ty("Record"),
            vec![arm(record_pattern("Record", vec![("time", int_pattern(0))]), int(1))],
        );

        assert!(matches!(
            &errors[..],
            [PatternError::NonExhaustive { witness, .. }] if witness == "Record { lang: _, time: 1 }"
        ));
    }

    #[test]
    fn closed_record_shape_needs_no_catch_all() {
        // match s with | Switch { on: true } -> 1 | Switch { on: false, count: n } -> n
        let program = program(vec![
            record_def("Switch", &[("on", ty("bool")), ("count", ty("int"))]),
            function(
                "f",
                &[("s", ty("Switch"))],
                None,
                match_on(
                    var("s"),
                    vec![
                        arm(record_pattern("Switch", vec![("on", bool_pattern(true))]), int(1)),
                        arm(
                            record_pattern(
                                "Switch",
                                vec![("on", bool_pattern(false)), ("count", bind("n"))],
                            ),
                            var("n"),
                        ),
                    ],
                ),
            ),
        ]);

        let typed = infer(&program).unwrap();
        let (decisions, errors) = check_matches(typed.function("f").unwrap(), &typed.records);
        assert!(errors.is_empty(), "{errors:?}");

        let tree = only_tree(&decisions);
        let DecisionTree::Test {
            occurrence,
            branches,
            default,
        } = tree
        else {
            panic!("expected a test");
        };
        assert_eq!(occurrence, &Occurrence::root().child(0));
        assert_eq!(branches.len(), 2);
        assert!(default.is_none());
        assert_eq!(tree.reachable_arms().into_iter().collect::<Vec<_>>(), [0, 1]);
    }

    #[test]
    fn record_fields_expand_without_a_test() {
        let (typed, decisions, errors) = checked(
            ty("Record"),
            vec![
                arm(
                    record_pattern("Record", vec![("lang", string_pattern("rill")), ("time", bind("t"))]),
                    var("t"),
                ),
                arm(bind("other"), int(0)),
            ],
        );

        assert!(errors.is_empty(), "{errors:?}");

        let DecisionTree::Test {
            occurrence,
            branches,
            default,
        } = only_tree(&decisions)
        else {
            panic!("expected a test");
        };
        assert_eq!(occurrence, &Occurrence::root().child(0));

        let (_, DecisionTree::Leaf { arm: 0, bindings }) = &branches[0] else {
            panic!("expected the first arm");
        };
        let function = typed.function("f").unwrap();
        assert_eq!(function.locals[bindings[0].local].name.value(), "t");
        assert_eq!(bindings[0].occurrence, Occurrence::root().child(1));

        assert!(matches!(
            default.as_deref(),
            Some(DecisionTree::Leaf { arm: 1, .. })
        ));
        assert_eq!(
            only_tree(&decisions).occurrences(),
            [
                Occurrence::root(),
                Occurrence::root().child(0),
                Occurrence::root().child(1)
            ]
        );
    }

    #[test]
    fn failed_guard_falls_through() {
        let (_, decisions, errors) = checked(
            ty("int"),
            vec![
                guarded_arm(
                    bind("n"),
                    binary(var("n"), BinaryOperatorKind::GreaterThan, int(0)),
                    int(1),
                ),
                arm(wildcard(), int(0)),
            ],
        );

        assert!(errors.is_empty(), "{errors:?}");
        assert!(matches!(
            only_tree(&decisions),
            DecisionTree::Guard { arm: 0, fallback, .. }
                if **fallback == DecisionTree::Leaf { arm: 1, bindings: vec![] }
        ));
    }

    #[test]
    fn lone_guard_is_not_exhaustive() {
        let (_, _, errors) = checked(
            ty("int"),
            vec![guarded_arm(
                bind("n"),
                binary(var("n"), BinaryOperatorKind::GreaterThan, int(0)),
                int(1),
            )],
        );

        assert!(matches!(
            &errors[..],
            [PatternError::NonExhaustive { witness, .. }] if witness == "_"
        ));
    }
}
