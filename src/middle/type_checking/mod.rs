//! Rill Type Checker
//!
//! Type checking a program has 2 main components:
//!
//!   1) analyzing record definitions, method blocks, and function signatures
//!      to build up a typing environment
//!   2) type checking all the executable bodies to make sure they comply with
//!      our type system's rules
//!
//! The first step is mostly collecting information, and because it runs
//! before any body is looked at, bodies may refer to records and functions
//! declared anywhere in the program. The second step assigns a type to every
//! node bottom-up. Whenever two types must agree they are unified right away
//! through a union-find table over the type variables, so the first
//! disagreement is reported at the node which caused it.
//!
//! A body stops at its first error. Everything the failing body did to the
//! unification table is rolled back so it can't leak into the bodies checked
//! after it. Once every body has been checked, the types of the successful
//! ones are resolved through the table and any variable which is still free
//! is reported as a type which could not be inferred.

use std::str::FromStr;

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};

use crate::{
    frontend::{Span, ast, intern::InternedSymbol},
    index::{Index, IndexVec},
    middle::{
        hir::{
            self, Callee, FunctionKind, LocalId, MatchId, TypedExpression, TypedExpressionKind,
            TypedPattern, TypedPatternKind,
            visit::{VisitorMut, walk_expression_mut, walk_pattern_mut},
        },
        primitive::PrimitiveKind,
        ty::{Type, TypeContext, TypeKind, TypeVariableId},
    },
};

pub mod error;
pub mod unify;

pub use error::{TypeBoundary, TypeError, TypeErrorKind};
use unify::UnificationTable;

/// Everything we learned about a program, including the functions which
/// checked successfully when others did not
#[derive(Debug)]
pub struct TypeCheckResults {
    pub program: hir::TypedProgram,
    pub errors: Vec<TypeError>,
}

/// Infers and checks the types of a whole program
pub fn infer(program: &ast::Program) -> Result<hir::TypedProgram, Vec<TypeError>> {
    let results = check_program(program);

    if results.errors.is_empty() {
        Ok(results.program)
    } else {
        Err(results.errors)
    }
}

pub fn check_program(program: &ast::Program) -> TypeCheckResults {
    let mut icx = InferenceContext::default();

    // Compute types for records and signatures we might reference in bodies
    let mut indexer = GlobalTypeEnvironmentIndexer {
        icx: &mut icx,
        errors: Vec::new(),
        bodies: Vec::new(),
    };
    indexer.index_program(program);

    let GlobalTypeEnvironmentIndexer {
        mut errors, bodies, ..
    } = indexer;

    // Check the content of bodies and assign types to all nodes
    let mut checked = Vec::new();
    for body in &bodies {
        let snapshot = icx.table.snapshot();

        match check_function_body(&mut icx, body) {
            Ok(function) => {
                icx.table.commit(snapshot);
                debug!("checked body of `{}`", function.name);
                checked.push(function);
            }
            Err(error) => {
                icx.table.rollback_to(snapshot);
                // Callers of this function are skipped instead of failing to
                // infer whatever it would have returned
                icx.poison_free_variables(&body.signature.return_type);
                debug!("body of `{}` failed to check: {error}", body.symbol);
                errors.push(error);
            }
        }
    }

    // Substitute the solved types back into every body
    let mut functions = Vec::new();
    for mut function in checked {
        let mut resolver = TypeResolver {
            icx: &mut icx,
            current_span: function.span,
            unresolved: None,
            poisoned: false,
        };
        resolver.visit_function_mut(&mut function);

        let TypeResolver {
            unresolved,
            poisoned,
            ..
        } = resolver;

        if let Some((span, ty)) = unresolved {
            errors.push(TypeError {
                span,
                boundary: TypeBoundary::Expression,
                kind: TypeErrorKind::CannotInfer(ty),
            });
            continue;
        }

        // Bodies touching a broken declaration have already been reported
        if poisoned {
            continue;
        }

        functions.push(function);
    }

    let mut records = icx.records.clone();
    for record in records.iter_mut() {
        for field in &mut record.fields {
            field.ty = icx.resolve_type(&field.ty);
        }
        for method in &mut record.methods {
            method.ty = icx.resolve_type(&method.ty);
        }
    }

    TypeCheckResults {
        program: hir::TypedProgram { records, functions },
        errors,
    }
}

#[derive(Debug, Default)]
struct InferenceContext {
    /// Type interning table to prevent duplicate types
    types: TypeContext,
    /// Disjoint set of type variables shared by every body in the program
    table: UnificationTable,

    records: hir::RecordTable,
    functions: HashMap<InternedSymbol, FunctionSignature>,
}

#[derive(Debug, Clone)]
struct FunctionSignature {
    parameters: Vec<Type>,
    return_type: Type,
    /// The whole signature as a function type
    ty: Type,
}

impl FunctionSignature {
    fn new(types: &mut TypeContext, parameters: Vec<Type>, return_type: Type) -> Self {
        let ty = types.get_function_type(parameters.clone(), return_type.clone());

        Self {
            parameters,
            return_type,
            ty,
        }
    }
}

impl InferenceContext {
    fn fresh_variable(&mut self) -> Type {
        let id = self.table.new_variable();
        self.types.intern_type(TypeKind::Infer(id))
    }

    fn primitive(&mut self, primitive: PrimitiveKind) -> Type {
        self.types.get_primitive_type(primitive)
    }

    fn record_type(&mut self, name: InternedSymbol) -> Type {
        self.types.intern_type(TypeKind::Record(name))
    }

    /// Follows variable bindings until we reach either a concrete type
    /// constructor or a free variable, which is returned as its root
    fn shallow_resolve(&mut self, ty: &Type) -> Type {
        let TypeKind::Infer(variable) = &**ty else {
            return ty.clone();
        };

        match self.table.probe(*variable) {
            Some(bound) => self.shallow_resolve(&bound),
            None => {
                let root = self.table.find(*variable);
                self.types.intern_type(TypeKind::Infer(root))
            }
        }
    }

    /// Recursively applies the solved bindings to the provided type to
    /// generate a new type with less or ideally no type variables
    fn resolve_type(&mut self, ty: &Type) -> Type {
        let ty = self.shallow_resolve(ty);

        match &*ty {
            TypeKind::List(element) => {
                let element = self.resolve_type(element);
                self.types.get_list_type(element)
            }
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                let parameters = parameters
                    .iter()
                    .map(|ty| self.resolve_type(ty))
                    .collect();
                let return_type = self.resolve_type(return_type);

                self.types.get_function_type(parameters, return_type)
            }
            _ => ty.clone(),
        }
    }

    /// Binds every variable still free in `ty` to the error type
    fn poison_free_variables(&mut self, ty: &Type) {
        let ty = self.shallow_resolve(ty);

        match &*ty {
            TypeKind::Infer(variable) => {
                let error = self.types.get_error_type();
                self.table.bind(*variable, error);
            }
            TypeKind::List(element) => self.poison_free_variables(element),
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                for parameter in parameters.iter() {
                    self.poison_free_variables(parameter);
                }
                self.poison_free_variables(return_type);
            }
            _ => {}
        }
    }

    fn unify(&mut self, expected: &Type, found: &Type) -> Result<(), TypeErrorKind> {
        let expected = self.shallow_resolve(expected);
        let found = self.shallow_resolve(found);

        match (&*expected, &*found) {
            (TypeKind::Infer(a), TypeKind::Infer(b)) => {
                self.table.union(*a, *b);
                Ok(())
            }
            (TypeKind::Infer(variable), _) => self.bind_variable(*variable, &found),
            (_, TypeKind::Infer(variable)) => self.bind_variable(*variable, &expected),

            // Already reported when the broken declaration was indexed
            (TypeKind::Error, _) | (_, TypeKind::Error) => Ok(()),

            (TypeKind::List(a), TypeKind::List(b)) => self
                .unify(a, b)
                .map_err(|e| self.widen_mismatch(e, &expected, &found)),

            (
                TypeKind::Function {
                    parameters: a_parameters,
                    return_type: a_return,
                },
                TypeKind::Function {
                    parameters: b_parameters,
                    return_type: b_return,
                },
            ) => {
                if a_parameters.len() != b_parameters.len() {
                    return Err(self.mismatch(&expected, &found));
                }

                let result = a_parameters
                    .iter()
                    .zip(b_parameters.iter())
                    .try_for_each(|(a, b)| self.unify(a, b))
                    .and_then(|_| self.unify(a_return, b_return));

                result.map_err(|e| self.widen_mismatch(e, &expected, &found))
            }

            // Both same concrete type
            (a, b) if a == b => Ok(()),

            // Any other type combination
            _ => Err(self.mismatch(&expected, &found)),
        }
    }

    /// Reports a mismatch deep inside a type as a mismatch of the whole type
    fn widen_mismatch(&mut self, error: TypeErrorKind, expected: &Type, found: &Type) -> TypeErrorKind {
        match error {
            TypeErrorKind::Mismatch { .. } => self.mismatch(expected, found),
            other => other,
        }
    }

    fn mismatch(&mut self, expected: &Type, found: &Type) -> TypeErrorKind {
        TypeErrorKind::Mismatch {
            expected: self.resolve_type(expected),
            found: self.resolve_type(found),
        }
    }

    fn bind_variable(&mut self, variable: TypeVariableId, ty: &Type) -> Result<(), TypeErrorKind> {
        if self.occurs_in(variable, ty) {
            return Err(TypeErrorKind::InfinitelyRecursiveType {
                variable: self.types.intern_type(TypeKind::Infer(variable)),
                ty: self.resolve_type(ty),
            });
        }

        self.table.bind(variable, ty.clone());
        Ok(())
    }

    fn occurs_in(&mut self, variable: TypeVariableId, ty: &Type) -> bool {
        let ty = self.shallow_resolve(ty);

        match &*ty {
            TypeKind::Infer(other) => self.table.find(*other) == self.table.find(variable),
            TypeKind::List(element) => self.occurs_in(variable, element),
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                parameters.iter().any(|ty| self.occurs_in(variable, ty))
                    || self.occurs_in(variable, return_type)
            }
            _ => false,
        }
    }

    /// Computes the type named by an annotation. A bare `list` gets a fresh
    /// element type which is inferred from how the value is used.
    fn lower_type_annotation(&mut self, ty: &ast::Type) -> Result<Type, TypeError> {
        match &ty.kind {
            ast::TypeKind::Named(name) => {
                let text = name.symbol.value();

                if text == "list" {
                    let element = self.fresh_variable();
                    return Ok(self.types.get_list_type(element));
                }

                if let Ok(primitive) = PrimitiveKind::from_str(text) {
                    return Ok(self.primitive(primitive));
                }

                if self.records.contains(name.symbol) {
                    return Ok(self.record_type(name.symbol));
                }

                Err(TypeError {
                    span: name.span,
                    boundary: TypeBoundary::Declaration,
                    kind: TypeErrorKind::UnknownType(name.symbol),
                })
            }
            ast::TypeKind::List(element) => {
                let element = match element {
                    Some(element) => self.lower_type_annotation(element)?,
                    None => self.fresh_variable(),
                };

                Ok(self.types.get_list_type(element))
            }
            ast::TypeKind::Function {
                parameters,
                return_type,
            } => {
                let parameters = parameters
                    .iter()
                    .map(|ty| self.lower_type_annotation(ty))
                    .collect::<Result<Vec<_>, _>>()?;
                let return_type = self.lower_type_annotation(return_type)?;

                Ok(self.types.get_function_type(parameters, return_type))
            }
        }
    }

    /// Same as [`Self::lower_type_annotation`] but records the error and
    /// poisons the type instead of failing
    fn lower_type_annotation_or_error(
        &mut self,
        ty: &ast::Type,
        errors: &mut Vec<TypeError>,
    ) -> Type {
        match self.lower_type_annotation(ty) {
            Ok(ty) => ty,
            Err(error) => {
                errors.push(error);
                self.types.get_error_type()
            }
        }
    }
}

/// A body which was declared successfully and still needs to be checked
#[derive(Debug)]
struct BodyToCheck<'ast> {
    definition: &'ast ast::FunctionDefinition,
    kind: FunctionKind,
    symbol: InternedSymbol,
    signature: FunctionSignature,
}

/// Traverses the top level items in a program and computes their types,
/// adding them to the typing environment
#[derive(Debug)]
struct GlobalTypeEnvironmentIndexer<'icx, 'ast> {
    icx: &'icx mut InferenceContext,
    errors: Vec<TypeError>,
    bodies: Vec<BodyToCheck<'ast>>,
}

impl<'icx, 'ast> GlobalTypeEnvironmentIndexer<'icx, 'ast> {
    fn index_program(&mut self, program: &'ast ast::Program) {
        // Record names go first so fields and signatures can mention records
        // declared further down
        let mut records = Vec::new();
        for item in &program.items {
            if let ast::ItemKind::Record(definition) = &item.kind {
                if self.declare_record(definition) {
                    records.push(&**definition);
                }
            }
        }

        for definition in records {
            self.compute_record_fields(definition);
        }

        for item in &program.items {
            match &item.kind {
                ast::ItemKind::Record(_) => {}
                ast::ItemKind::Function(definition) => self.declare_function(definition),
                ast::ItemKind::Methods(block) => self.declare_methods(block),
            }
        }
    }

    fn duplicate(&mut self, name: ast::Identifier) {
        self.errors.push(TypeError {
            span: name.span,
            boundary: TypeBoundary::Declaration,
            kind: TypeErrorKind::DuplicateDefinition(name.symbol),
        });
    }

    fn declare_record(&mut self, definition: &ast::RecordDefinition) -> bool {
        let name = definition.name;

        let is_builtin = name.symbol.value() == "list"
            || PrimitiveKind::from_str(name.symbol.value()).is_ok();

        if is_builtin
            || !self.icx.records.insert(hir::RecordDefinition {
                span: definition.span,
                name: name.symbol,
                fields: Vec::new(),
                methods: Vec::new(),
            })
        {
            self.duplicate(name);
            return false;
        }

        true
    }

    fn compute_record_fields(&mut self, definition: &ast::RecordDefinition) {
        let mut fields: Vec<hir::RecordField> = Vec::new();

        for field in &definition.fields {
            if fields.iter().any(|f| f.name == field.name.symbol) {
                self.errors.push(TypeError {
                    span: field.name.span,
                    boundary: TypeBoundary::Declaration,
                    kind: TypeErrorKind::DuplicateField {
                        record: definition.name.symbol,
                        field: field.name.symbol,
                    },
                });
                continue;
            }

            let ty = self
                .icx
                .lower_type_annotation_or_error(&field.ty, &mut self.errors);

            fields.push(hir::RecordField {
                span: field.span,
                name: field.name.symbol,
                ty,
            });
        }

        if let Some(record) = self.icx.records.get_mut(definition.name.symbol) {
            record.fields = fields;
        }
    }

    fn compute_signature(
        &mut self,
        definition: &ast::FunctionDefinition,
        receiver: Option<Type>,
    ) -> (FunctionSignature, bool) {
        let errors_before = self.errors.len();

        let mut parameters: Vec<Type> = receiver.into_iter().collect();
        for parameter in &definition.parameters {
            let ty = self
                .icx
                .lower_type_annotation_or_error(&parameter.ty, &mut self.errors);
            parameters.push(ty);
        }

        let return_type = match &definition.return_type {
            Some(ty) => self
                .icx
                .lower_type_annotation_or_error(ty, &mut self.errors),
            None => self.icx.fresh_variable(),
        };

        let signature = FunctionSignature::new(&mut self.icx.types, parameters, return_type);
        (signature, self.errors.len() == errors_before)
    }

    fn declare_function(&mut self, definition: &'ast ast::FunctionDefinition) {
        let name = definition.name;

        if self.icx.functions.contains_key(&name.symbol) {
            self.duplicate(name);
            return;
        }

        let (signature, is_valid) = self.compute_signature(definition, None);
        self.icx.functions.insert(name.symbol, signature.clone());

        // Callers still see the signature so they don't report the same
        // problem again, but there is no point checking the body
        if is_valid {
            self.bodies.push(BodyToCheck {
                definition,
                kind: FunctionKind::Free,
                symbol: name.symbol,
                signature,
            });
        }
    }

    fn declare_methods(&mut self, block: &'ast ast::MethodBlock) {
        let record = block.record.symbol;

        if !self.icx.records.contains(record) {
            self.errors.push(TypeError {
                span: block.record.span,
                boundary: TypeBoundary::Declaration,
                kind: TypeErrorKind::UnknownRecord(record),
            });
            return;
        }

        for definition in &block.methods {
            let name = definition.name;

            let already_declared = self
                .icx
                .records
                .get(record)
                .is_some_and(|r| r.method(name.symbol).is_some());

            if already_declared {
                self.duplicate(name);
                continue;
            }

            let receiver = self.icx.record_type(record);
            let (signature, is_valid) = self.compute_signature(definition, Some(receiver));
            let symbol = hir::method_symbol(record, name.symbol);

            if let Some(r) = self.icx.records.get_mut(record) {
                r.methods.push(hir::MethodSignature {
                    span: definition.span,
                    name: name.symbol,
                    symbol,
                    ty: signature.ty.clone(),
                });
            }

            if is_valid {
                self.bodies.push(BodyToCheck {
                    definition,
                    kind: FunctionKind::Method {
                        record,
                        method: name.symbol,
                    },
                    symbol,
                    signature,
                });
            }
        }
    }
}

fn check_function_body(
    icx: &mut InferenceContext,
    body: &BodyToCheck<'_>,
) -> Result<hir::TypedFunction, TypeError> {
    let definition = body.definition;

    let mut checker = BodyTypeChecker {
        icx,
        locals: IndexVec::new(),
        scopes: vec![Vec::new()],
        next_match_id: MatchId::new(0),
    };

    let mut declared_names = Vec::new();
    if let FunctionKind::Method { .. } = body.kind {
        declared_names.push(ast::Identifier {
            span: definition.span,
            symbol: InternedSymbol::new("self"),
        });
    }
    declared_names.extend(definition.parameters.iter().map(|p| p.name));

    let parameters: Vec<LocalId> = declared_names
        .into_iter()
        .zip(body.signature.parameters.iter())
        .map(|(name, ty)| checker.declare_local(name, ty.clone()))
        .collect();

    let typed_body = checker.check_expression(&definition.body)?;

    checker.create_type_constraint(
        &body.signature.return_type,
        &typed_body.ty,
        TypeConstraintOrigin {
            span: definition.body.span,
            kind: TypeBoundary::FunctionReturn,
        },
    )?;

    Ok(hir::TypedFunction {
        span: definition.span,
        name: body.symbol,
        kind: body.kind,
        parameters,
        locals: checker.locals,
        return_type: body.signature.return_type.clone(),
        body: typed_body,
        match_count: checker.next_match_id.index(),
    })
}

/// The context associated with type checking an individual executable body
struct BodyTypeChecker<'icx> {
    icx: &'icx mut InferenceContext,

    locals: IndexVec<LocalId, hir::Local>,
    /// Names visible at the current point of the traversal, innermost scope
    /// last. Later bindings shadow earlier ones.
    scopes: Vec<Vec<(InternedSymbol, LocalId)>>,

    next_match_id: MatchId,
}

#[derive(Debug, Clone, Copy)]
struct TypeConstraintOrigin {
    /// The span enclosing the entire node which generated the constraint
    span: Span,
    /// Used to format error messages better
    kind: TypeBoundary,
}

impl TypeConstraintOrigin {
    fn new(span: Span, kind: TypeBoundary) -> Self {
        Self { span, kind }
    }
}

/// What a member access on a record resolved to
enum Member {
    Field { index: u32, ty: Type },
    Method { symbol: InternedSymbol, ty: Type },
}

impl<'icx> BodyTypeChecker<'icx> {
    /// Requires that the left type equals the right type, solving the
    /// constraint immediately
    fn create_type_constraint(
        &mut self,
        expected: &Type,
        found: &Type,
        origin: TypeConstraintOrigin,
    ) -> Result<(), TypeError> {
        trace!("constraint {expected} == {found} ({:?})", origin.kind);

        self.icx
            .unify(expected, found)
            .map_err(|kind| TypeError {
                span: origin.span,
                boundary: origin.kind,
                kind,
            })
    }

    fn error(span: Span, kind: TypeErrorKind) -> TypeError {
        TypeError {
            span,
            boundary: TypeBoundary::Expression,
            kind,
        }
    }

    fn declare_local(&mut self, name: ast::Identifier, ty: Type) -> LocalId {
        let id = self.locals.push(hir::Local {
            span: name.span,
            name: name.symbol,
            ty,
        });

        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.symbol, id));
        }

        id
    }

    fn lookup_local(&self, name: InternedSymbol) -> Option<LocalId> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(symbol, _)| *symbol == name)
            .map(|(_, local)| *local)
    }

    fn primitive(&mut self, primitive: PrimitiveKind) -> Type {
        self.icx.primitive(primitive)
    }

    fn literal_type(&mut self, literal: &ast::Literal) -> Type {
        match literal {
            ast::Literal::Integer(_) => self.primitive(PrimitiveKind::Int),
            ast::Literal::Boolean(_) => self.primitive(PrimitiveKind::Bool),
            ast::Literal::String(_) => self.primitive(PrimitiveKind::Str),
            ast::Literal::Unit => self.primitive(PrimitiveKind::Unit),
        }
    }

    /// Member access needs the receiver to already be known to be a record.
    /// Returns `None` for receivers poisoned by an earlier error.
    fn expect_record(&mut self, ty: &Type, span: Span) -> Result<Option<InternedSymbol>, TypeError> {
        let ty = self.icx.shallow_resolve(ty);

        match &*ty {
            TypeKind::Record(name) => Ok(Some(*name)),
            TypeKind::Error => Ok(None),
            TypeKind::Infer(_) => Err(Self::error(span, TypeErrorKind::UnknownReceiver)),
            _ => {
                let ty = self.icx.resolve_type(&ty);
                Err(Self::error(span, TypeErrorKind::NotARecord(ty)))
            }
        }
    }

    /// Looks up `name` on a record. Fields are looked at first, so a field
    /// shadows a method with the same name.
    fn lookup_member(
        &self,
        record: InternedSymbol,
        name: ast::Identifier,
    ) -> Result<Member, TypeError> {
        let Some(definition) = self.icx.records.get(record) else {
            return Err(Self::error(name.span, TypeErrorKind::UnknownRecord(record)));
        };

        if let Some((index, field)) = definition.field(name.symbol) {
            return Ok(Member::Field {
                index,
                ty: field.ty.clone(),
            });
        }

        if let Some(method) = definition.method(name.symbol) {
            return Ok(Member::Method {
                symbol: method.symbol,
                ty: method.ty.clone(),
            });
        }

        Err(Self::error(
            name.span,
            TypeErrorKind::UnknownMember {
                record,
                member: name.symbol,
            },
        ))
    }

    /// Checks the arguments of a call against whatever is being called and
    /// returns the type the call produces
    fn check_call(
        &mut self,
        callee_ty: &Type,
        arguments: &[TypedExpression],
        span: Span,
    ) -> Result<Type, TypeError> {
        let callee_ty = self.icx.shallow_resolve(callee_ty);

        match &*callee_ty {
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                if parameters.len() != arguments.len() {
                    return Err(Self::error(
                        span,
                        TypeErrorKind::ArityMismatch {
                            expected: parameters.len(),
                            found: arguments.len(),
                        },
                    ));
                }

                for (parameter, argument) in parameters.iter().zip(arguments) {
                    self.create_type_constraint(
                        parameter,
                        &argument.ty,
                        TypeConstraintOrigin::new(argument.span, TypeBoundary::FunctionArgument),
                    )?;
                }

                Ok(return_type.clone())
            }
            TypeKind::Infer(_) => {
                // Calling a value of unknown type tells us it is a function
                let parameters = arguments.iter().map(|a| a.ty.clone()).collect();
                let return_type = self.icx.fresh_variable();
                let function_ty = self
                    .icx
                    .types
                    .get_function_type(parameters, return_type.clone());

                self.create_type_constraint(
                    &callee_ty,
                    &function_ty,
                    TypeConstraintOrigin::new(span, TypeBoundary::Expression),
                )?;

                Ok(return_type)
            }
            TypeKind::Error => Ok(self.icx.types.get_error_type()),
            _ => {
                let ty = self.icx.resolve_type(&callee_ty);
                Err(Self::error(span, TypeErrorKind::NotCallable(ty)))
            }
        }
    }

    fn check_arguments(
        &mut self,
        arguments: &[ast::Expression],
    ) -> Result<Vec<TypedExpression>, TypeError> {
        arguments
            .iter()
            .map(|argument| self.check_expression(argument))
            .collect()
    }

    fn check_expression(&mut self, expression: &ast::Expression) -> Result<TypedExpression, TypeError> {
        let span = expression.span;

        let (ty, kind) = match &expression.kind {
            ast::ExpressionKind::Literal(literal) => {
                (self.literal_type(literal), TypedExpressionKind::Literal(*literal))
            }
            ast::ExpressionKind::Identifier(identifier) => {
                if let Some(local) = self.lookup_local(identifier.symbol) {
                    (
                        self.locals[local].ty.clone(),
                        TypedExpressionKind::Local(local),
                    )
                } else if let Some(signature) = self.icx.functions.get(&identifier.symbol) {
                    (
                        signature.ty.clone(),
                        TypedExpressionKind::Function(identifier.symbol),
                    )
                } else {
                    return Err(Self::error(
                        identifier.span,
                        TypeErrorKind::UnknownName(identifier.symbol),
                    ));
                }
            }
            ast::ExpressionKind::Let {
                name,
                ty: annotation,
                value,
                body,
            } => {
                let value = self.check_expression(value)?;

                let local_ty = match annotation {
                    Some(annotation) => {
                        let annotated = self.icx.lower_type_annotation(annotation)?;
                        self.create_type_constraint(
                            &annotated,
                            &value.ty,
                            TypeConstraintOrigin::new(value.span, TypeBoundary::LetAnnotation),
                        )?;
                        annotated
                    }
                    None => value.ty.clone(),
                };

                self.scopes.push(Vec::new());
                let local = self.declare_local(*name, local_ty);
                let body = self.check_expression(body)?;
                self.scopes.pop();

                (
                    body.ty.clone(),
                    TypedExpressionKind::Let {
                        local,
                        value: Box::new(value),
                        body: Box::new(body),
                    },
                )
            }
            ast::ExpressionKind::Block(expressions) => {
                let expressions = self.check_arguments(expressions)?;

                let ty = match expressions.last() {
                    Some(last) => last.ty.clone(),
                    None => self.primitive(PrimitiveKind::Unit),
                };

                (ty, TypedExpressionKind::Block(expressions))
            }
            ast::ExpressionKind::If {
                condition,
                positive,
                negative,
            } => {
                let condition = self.check_expression(condition)?;
                let bool_ty = self.primitive(PrimitiveKind::Bool);
                self.create_type_constraint(
                    &bool_ty,
                    &condition.ty,
                    TypeConstraintOrigin::new(condition.span, TypeBoundary::IfCondition),
                )?;

                let positive = self.check_expression(positive)?;

                let (ty, negative) = match negative {
                    Some(negative) => {
                        let negative = self.check_expression(negative)?;
                        self.create_type_constraint(
                            &positive.ty,
                            &negative.ty,
                            TypeConstraintOrigin::new(negative.span, TypeBoundary::IfBranches),
                        )?;

                        (positive.ty.clone(), Some(Box::new(negative)))
                    }
                    None => {
                        let unit = self.primitive(PrimitiveKind::Unit);
                        self.create_type_constraint(
                            &unit,
                            &positive.ty,
                            TypeConstraintOrigin::new(positive.span, TypeBoundary::IfWithoutElse),
                        )?;

                        (unit, None)
                    }
                };

                (
                    ty,
                    TypedExpressionKind::If {
                        condition: Box::new(condition),
                        positive: Box::new(positive),
                        negative,
                    },
                )
            }
            ast::ExpressionKind::Record { name, fields } => {
                let Some(record) = self.icx.records.get(name.symbol) else {
                    return Err(Self::error(
                        name.span,
                        TypeErrorKind::UnknownRecord(name.symbol),
                    ));
                };

                let declared: Vec<(InternedSymbol, Type)> = record
                    .fields
                    .iter()
                    .map(|field| (field.name, field.ty.clone()))
                    .collect();

                let mut seen = HashSet::new();
                let mut initializers = Vec::with_capacity(fields.len());

                for initializer in fields {
                    let field = initializer.name;

                    let Some(index) = declared.iter().position(|(n, _)| *n == field.symbol)
                    else {
                        return Err(Self::error(
                            field.span,
                            TypeErrorKind::UnknownField {
                                record: name.symbol,
                                field: field.symbol,
                            },
                        ));
                    };

                    if !seen.insert(field.symbol) {
                        return Err(Self::error(
                            field.span,
                            TypeErrorKind::DuplicateField {
                                record: name.symbol,
                                field: field.symbol,
                            },
                        ));
                    }

                    let value = self.check_expression(&initializer.value)?;
                    self.create_type_constraint(
                        &declared[index].1,
                        &value.ty,
                        TypeConstraintOrigin::new(value.span, TypeBoundary::RecordField),
                    )?;

                    initializers.push(hir::TypedFieldInitializer {
                        span: initializer.span,
                        name: field.symbol,
                        index: index as u32,
                        value,
                    });
                }

                if let Some((missing, _)) = declared.iter().find(|(n, _)| !seen.contains(n)) {
                    return Err(Self::error(
                        span,
                        TypeErrorKind::MissingField {
                            record: name.symbol,
                            field: *missing,
                        },
                    ));
                }

                (
                    self.icx.record_type(name.symbol),
                    TypedExpressionKind::Record {
                        record: name.symbol,
                        fields: initializers,
                    },
                )
            }
            ast::ExpressionKind::Field { target, field } => {
                let target = self.check_expression(target)?;

                let Some(record) = self.expect_record(&target.ty, target.span)? else {
                    return Ok(TypedExpression {
                        span,
                        ty: self.icx.types.get_error_type(),
                        kind: TypedExpressionKind::Field {
                            target: Box::new(target),
                            name: field.symbol,
                            index: 0,
                        },
                    });
                };

                let found = self
                    .icx
                    .records
                    .get(record)
                    .and_then(|r| r.field(field.symbol))
                    .map(|(index, f)| (index, f.ty.clone()));

                let Some((index, ty)) = found else {
                    return Err(Self::error(
                        field.span,
                        TypeErrorKind::UnknownField {
                            record,
                            field: field.symbol,
                        },
                    ));
                };

                (
                    ty,
                    TypedExpressionKind::Field {
                        target: Box::new(target),
                        name: field.symbol,
                        index,
                    },
                )
            }
            ast::ExpressionKind::Call { target, arguments } => {
                // Calling a function by name is a direct call unless a local
                // with the same name shadows it
                let direct = match &target.kind {
                    ast::ExpressionKind::Identifier(identifier)
                        if self.lookup_local(identifier.symbol).is_none() =>
                    {
                        self.icx
                            .functions
                            .get(&identifier.symbol)
                            .map(|signature| (identifier.symbol, signature.ty.clone()))
                    }
                    _ => None,
                };

                let (callee, callee_ty) = match direct {
                    Some((symbol, ty)) => (Callee::Function(symbol), ty),
                    None => {
                        let target = self.check_expression(target)?;
                        let ty = target.ty.clone();
                        (Callee::Value(Box::new(target)), ty)
                    }
                };

                let arguments = self.check_arguments(arguments)?;
                let ty = self.check_call(&callee_ty, &arguments, span)?;

                (ty, TypedExpressionKind::Call { callee, arguments })
            }
            ast::ExpressionKind::MethodCall {
                receiver,
                method,
                arguments,
            } => {
                let receiver = self.check_expression(receiver)?;

                let Some(record) = self.expect_record(&receiver.ty, receiver.span)? else {
                    let arguments = self.check_arguments(arguments)?;
                    return Ok(TypedExpression {
                        span,
                        ty: self.icx.types.get_error_type(),
                        kind: TypedExpressionKind::Call {
                            callee: Callee::Value(Box::new(receiver)),
                            arguments,
                        },
                    });
                };

                match self.lookup_member(record, *method)? {
                    Member::Field { index, ty } => {
                        // Calling a function stored in a field
                        let target = TypedExpression {
                            span: receiver.span.to(method.span),
                            ty: ty.clone(),
                            kind: TypedExpressionKind::Field {
                                target: Box::new(receiver),
                                name: method.symbol,
                                index,
                            },
                        };

                        let arguments = self.check_arguments(arguments)?;
                        let return_type = self.check_call(&ty, &arguments, span)?;

                        (
                            return_type,
                            TypedExpressionKind::Call {
                                callee: Callee::Value(Box::new(target)),
                                arguments,
                            },
                        )
                    }
                    Member::Method { symbol, ty } => {
                        let mut all_arguments = vec![receiver];
                        all_arguments.extend(self.check_arguments(arguments)?);

                        let return_type = self.check_call(&ty, &all_arguments, span)?;

                        (
                            return_type,
                            TypedExpressionKind::Call {
                                callee: Callee::Method {
                                    record,
                                    method: method.symbol,
                                    symbol,
                                },
                                arguments: all_arguments,
                            },
                        )
                    }
                }
            }
            ast::ExpressionKind::Match { scrutinee, arms } => {
                let scrutinee = self.check_expression(scrutinee)?;
                let ty = self.icx.fresh_variable();

                let mut typed_arms = Vec::with_capacity(arms.len());
                for arm in arms {
                    self.scopes.push(Vec::new());

                    let pattern =
                        self.check_pattern(&arm.pattern, &scrutinee.ty, &mut HashSet::new())?;

                    let guard = match &arm.guard {
                        Some(guard) => {
                            let guard = self.check_expression(guard)?;
                            let bool_ty = self.primitive(PrimitiveKind::Bool);
                            self.create_type_constraint(
                                &bool_ty,
                                &guard.ty,
                                TypeConstraintOrigin::new(guard.span, TypeBoundary::MatchGuard),
                            )?;
                            Some(guard)
                        }
                        None => None,
                    };

                    let body = self.check_expression(&arm.body)?;
                    self.create_type_constraint(
                        &ty,
                        &body.ty,
                        TypeConstraintOrigin::new(body.span, TypeBoundary::MatchArm),
                    )?;

                    self.scopes.pop();

                    typed_arms.push(hir::TypedMatchArm {
                        span: arm.span,
                        pattern,
                        guard,
                        body,
                    });
                }

                let id = self.next_match_id;
                self.next_match_id.increment_by(1);

                (
                    ty,
                    TypedExpressionKind::Match {
                        id,
                        scrutinee: Box::new(scrutinee),
                        arms: typed_arms,
                    },
                )
            }
            ast::ExpressionKind::List(elements) => {
                let element_ty = self.icx.fresh_variable();

                let elements = self.check_arguments(elements)?;
                for element in &elements {
                    self.create_type_constraint(
                        &element_ty,
                        &element.ty,
                        TypeConstraintOrigin::new(element.span, TypeBoundary::ListElement),
                    )?;
                }

                (
                    self.icx.types.get_list_type(element_ty),
                    TypedExpressionKind::List(elements),
                )
            }
            ast::ExpressionKind::Binary { lhs, operator, rhs } => {
                let lhs = self.check_expression(lhs)?;
                let rhs = self.check_expression(rhs)?;

                let ty = self.check_binary_operation(*operator, &lhs, &rhs)?;

                (
                    ty,
                    TypedExpressionKind::Binary {
                        lhs: Box::new(lhs),
                        operator: *operator,
                        rhs: Box::new(rhs),
                    },
                )
            }
            ast::ExpressionKind::Unary { operator, operand } => {
                let operand = self.check_expression(operand)?;

                let ty = match operator {
                    ast::UnaryOperatorKind::LogicalNot => self.primitive(PrimitiveKind::Bool),
                    ast::UnaryOperatorKind::Negate => self.primitive(PrimitiveKind::Int),
                };

                self.create_type_constraint(
                    &ty,
                    &operand.ty,
                    TypeConstraintOrigin::new(operand.span, TypeBoundary::UnaryOperand),
                )?;

                (
                    ty,
                    TypedExpressionKind::Unary {
                        operator: *operator,
                        operand: Box::new(operand),
                    },
                )
            }
        };

        Ok(TypedExpression { span, ty, kind })
    }

    fn check_binary_operation(
        &mut self,
        operator: ast::BinaryOperatorKind,
        lhs: &TypedExpression,
        rhs: &TypedExpression,
    ) -> Result<Type, TypeError> {
        let (operand_ty, result_ty) = match operator.class() {
            ast::BinaryOperatorClass::Arithmetic => (PrimitiveKind::Int, PrimitiveKind::Int),
            ast::BinaryOperatorClass::Comparison => (PrimitiveKind::Int, PrimitiveKind::Bool),
            ast::BinaryOperatorClass::Logical => (PrimitiveKind::Bool, PrimitiveKind::Bool),
            ast::BinaryOperatorClass::Equality => {
                // Both sides must agree, and the shared type must be something
                // we know how to compare
                self.create_type_constraint(
                    &lhs.ty,
                    &rhs.ty,
                    TypeConstraintOrigin::new(rhs.span, TypeBoundary::BinaryOperand),
                )?;

                let shared = self.icx.shallow_resolve(&lhs.ty);
                let supported = match shared.as_primitive() {
                    Some(primitive) => primitive.supports_binary_op(operator),
                    None => matches!(&*shared, TypeKind::Infer(_) | TypeKind::Error),
                };

                if !supported {
                    let ty = self.icx.resolve_type(&shared);
                    return Err(Self::error(
                        lhs.span.to(rhs.span),
                        TypeErrorKind::UnsupportedOperator { operator, ty },
                    ));
                }

                return Ok(self.primitive(PrimitiveKind::Bool));
            }
        };

        let operand_ty = self.primitive(operand_ty);
        let result_ty = self.primitive(result_ty);

        for side in [lhs, rhs] {
            self.create_type_constraint(
                &operand_ty,
                &side.ty,
                TypeConstraintOrigin::new(side.span, TypeBoundary::BinaryOperand),
            )?;
        }

        Ok(result_ty)
    }

    fn check_pattern(
        &mut self,
        pattern: &ast::Pattern,
        expected: &Type,
        bound: &mut HashSet<InternedSymbol>,
    ) -> Result<TypedPattern, TypeError> {
        let span = pattern.span;

        let kind = match &pattern.kind {
            ast::PatternKind::Wildcard => TypedPatternKind::Wildcard,
            ast::PatternKind::Binding(name) => {
                if !bound.insert(name.symbol) {
                    return Err(Self::error(
                        name.span,
                        TypeErrorKind::DuplicateBinding(name.symbol),
                    ));
                }

                TypedPatternKind::Binding(self.declare_local(*name, expected.clone()))
            }
            ast::PatternKind::Literal(literal) => {
                let ty = self.literal_type(literal);
                self.create_type_constraint(
                    expected,
                    &ty,
                    TypeConstraintOrigin::new(span, TypeBoundary::MatchPattern),
                )?;

                TypedPatternKind::Literal(*literal)
            }
            ast::PatternKind::Record { name, fields } => {
                let Some(record) = self.icx.records.get(name.symbol) else {
                    return Err(Self::error(
                        name.span,
                        TypeErrorKind::UnknownRecord(name.symbol),
                    ));
                };

                let declared: Vec<(InternedSymbol, Type)> = record
                    .fields
                    .iter()
                    .map(|field| (field.name, field.ty.clone()))
                    .collect();

                let record_ty = self.icx.record_type(name.symbol);
                self.create_type_constraint(
                    expected,
                    &record_ty,
                    TypeConstraintOrigin::new(span, TypeBoundary::MatchPattern),
                )?;

                let mut seen = HashSet::new();
                let mut typed_fields = Vec::with_capacity(fields.len());

                for field in fields {
                    let Some(index) = declared.iter().position(|(n, _)| *n == field.name.symbol)
                    else {
                        return Err(Self::error(
                            field.name.span,
                            TypeErrorKind::UnknownField {
                                record: name.symbol,
                                field: field.name.symbol,
                            },
                        ));
                    };

                    if !seen.insert(field.name.symbol) {
                        return Err(Self::error(
                            field.name.span,
                            TypeErrorKind::DuplicateField {
                                record: name.symbol,
                                field: field.name.symbol,
                            },
                        ));
                    }

                    let field_ty = declared[index].1.clone();
                    let pattern = self.check_pattern(&field.pattern, &field_ty, bound)?;

                    typed_fields.push(hir::TypedFieldPattern {
                        span: field.span,
                        name: field.name.symbol,
                        index: index as u32,
                        pattern,
                    });
                }

                TypedPatternKind::Record {
                    record: name.symbol,
                    fields: typed_fields,
                }
            }
        };

        Ok(TypedPattern {
            span,
            ty: expected.clone(),
            kind,
        })
    }
}

/// Substitutes the solved types into a checked body and remembers the first
/// type which is still not fully known
struct TypeResolver<'icx> {
    icx: &'icx mut InferenceContext,
    current_span: Span,
    unresolved: Option<(Span, Type)>,
    poisoned: bool,
}

impl<'icx> VisitorMut for TypeResolver<'icx> {
    fn visit_function_mut(&mut self, function: &mut hir::TypedFunction) {
        for local in function.locals.iter_mut() {
            self.current_span = local.span;
            self.visit_type_mut(&mut local.ty);
        }

        self.current_span = function.span;
        self.visit_type_mut(&mut function.return_type);
        self.visit_expression_mut(&mut function.body);
    }

    fn visit_expression_mut(&mut self, expression: &mut TypedExpression) {
        self.current_span = expression.span;
        walk_expression_mut(self, expression);
    }

    fn visit_pattern_mut(&mut self, pattern: &mut TypedPattern) {
        self.current_span = pattern.span;
        walk_pattern_mut(self, pattern);
    }

    fn visit_type_mut(&mut self, ty: &mut Type) {
        *ty = self.icx.resolve_type(ty);

        if ty.contains_error() {
            self.poisoned = true;
        } else if ty.is_unresolved() && self.unresolved.is_none() {
            self.unresolved = Some((self.current_span, ty.clone()));
        }
    }
}
