//! The typed form of a program. Every expression and pattern carries its fully
//! resolved type, names are resolved to locals, functions, or record fields,
//! and method calls are split from calls through values. This is what the
//! match compiler and LIR lowering consume.

use hashbrown::HashMap;

use crate::{
    frontend::{
        Span,
        ast::{BinaryOperatorKind, Literal, UnaryOperatorKind},
        intern::InternedSymbol,
    },
    index::{IndexVec, simple_index},
    middle::ty::Type,
};

pub mod annotate;
pub mod visit;

simple_index! {
    /// Identifies a local binding (parameter, `let`, or pattern binding)
    /// within a single function
    pub struct LocalId;
}

simple_index! {
    /// Identifies a `match` expression within a single function
    pub struct MatchId;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedProgram {
    pub records: RecordTable,
    /// Free functions and methods in declaration order
    pub functions: Vec<TypedFunction>,
}

impl TypedProgram {
    pub fn function(&self, name: &str) -> Option<&TypedFunction> {
        self.functions.iter().find(|f| f.name.value() == name)
    }
}

/// Records in declaration order, looked up by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    definitions: Vec<RecordDefinition>,
    by_name: HashMap<InternedSymbol, usize>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a record with the same name already exists
    pub fn insert(&mut self, definition: RecordDefinition) -> bool {
        if self.by_name.contains_key(&definition.name) {
            return false;
        }

        self.by_name
            .insert(definition.name, self.definitions.len());
        self.definitions.push(definition);
        true
    }

    pub fn get(&self, name: InternedSymbol) -> Option<&RecordDefinition> {
        self.by_name.get(&name).map(|&i| &self.definitions[i])
    }

    pub fn get_mut(&mut self, name: InternedSymbol) -> Option<&mut RecordDefinition> {
        self.by_name
            .get(&name)
            .map(|&i| &mut self.definitions[i])
    }

    pub fn contains(&self, name: InternedSymbol) -> bool {
        self.by_name.contains_key(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordDefinition> {
        self.definitions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RecordDefinition> {
        self.definitions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordDefinition {
    pub span: Span,
    pub name: InternedSymbol,
    /// Ordered and unique by name. The position of a field is its index in
    /// the runtime object.
    pub fields: Vec<RecordField>,
    pub methods: Vec<MethodSignature>,
}

impl RecordDefinition {
    pub fn field(&self, name: InternedSymbol) -> Option<(u32, &RecordField)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
            .map(|(i, field)| (i as u32, field))
    }

    pub fn method(&self, name: InternedSymbol) -> Option<&MethodSignature> {
        self.methods.iter().find(|method| method.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub span: Span,
    pub name: InternedSymbol,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    pub span: Span,
    pub name: InternedSymbol,
    /// The name the method is compiled under
    pub symbol: InternedSymbol,
    /// Function type including the receiver as the first parameter
    pub ty: Type,
}

/// The symbol a method is compiled under, `Record::method`
pub fn method_symbol(record: InternedSymbol, method: InternedSymbol) -> InternedSymbol {
    InternedSymbol::new(&format!("{}::{}", record.value(), method.value()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Method {
        record: InternedSymbol,
        method: InternedSymbol,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub span: Span,
    /// Symbol the function is compiled under
    pub name: InternedSymbol,
    pub kind: FunctionKind,
    /// Parameter locals in order. Methods start with the implicit `self`.
    pub parameters: Vec<LocalId>,
    pub locals: IndexVec<LocalId, Local>,
    pub return_type: Type,
    pub body: TypedExpression,
    /// Number of `match` expressions in the body. Ids are dense below this.
    pub match_count: usize,
}

impl TypedFunction {
    pub fn parameter_types(&self) -> impl Iterator<Item = &Type> {
        self.parameters.iter().map(|&local| &self.locals[local].ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub span: Span,
    pub name: InternedSymbol,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpression {
    pub span: Span,
    pub ty: Type,
    pub kind: TypedExpressionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExpressionKind {
    Literal(Literal),
    Local(LocalId),
    /// A reference to a free function used as a value
    Function(InternedSymbol),
    Let {
        local: LocalId,
        value: Box<TypedExpression>,
        body: Box<TypedExpression>,
    },
    Block(Vec<TypedExpression>),
    If {
        condition: Box<TypedExpression>,
        positive: Box<TypedExpression>,
        negative: Option<Box<TypedExpression>>,
    },
    /// Fields are kept in source order since that is the evaluation order
    Record {
        record: InternedSymbol,
        fields: Vec<TypedFieldInitializer>,
    },
    Field {
        target: Box<TypedExpression>,
        name: InternedSymbol,
        index: u32,
    },
    Call {
        callee: Callee,
        arguments: Vec<TypedExpression>,
    },
    Match {
        id: MatchId,
        scrutinee: Box<TypedExpression>,
        arms: Vec<TypedMatchArm>,
    },
    List(Vec<TypedExpression>),
    Binary {
        lhs: Box<TypedExpression>,
        operator: BinaryOperatorKind,
        rhs: Box<TypedExpression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<TypedExpression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFieldInitializer {
    pub span: Span,
    pub name: InternedSymbol,
    pub index: u32,
    pub value: TypedExpression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// Direct call to a free function
    Function(InternedSymbol),
    /// Direct call to a method. The receiver is passed as the first argument.
    Method {
        record: InternedSymbol,
        method: InternedSymbol,
        symbol: InternedSymbol,
    },
    /// Indirect call through a function typed value
    Value(Box<TypedExpression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedMatchArm {
    pub span: Span,
    pub pattern: TypedPattern,
    pub guard: Option<TypedExpression>,
    pub body: TypedExpression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedPattern {
    pub span: Span,
    pub ty: Type,
    pub kind: TypedPatternKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedPatternKind {
    Wildcard,
    Binding(LocalId),
    Literal(Literal),
    /// Only the fields named in the source pattern are listed
    Record {
        record: InternedSymbol,
        fields: Vec<TypedFieldPattern>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFieldPattern {
    pub span: Span,
    pub name: InternedSymbol,
    pub index: u32,
    pub pattern: TypedPattern,
}

impl TypedPattern {
    /// Wildcards and bindings match every value
    pub fn is_irrefutable(&self) -> bool {
        matches!(
            self.kind,
            TypedPatternKind::Wildcard | TypedPatternKind::Binding(_)
        )
    }
}
