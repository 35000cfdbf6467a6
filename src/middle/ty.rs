use std::sync::Arc;

use colored::Colorize;
use hashbrown::HashSet;

use crate::{
    frontend::intern::InternedSymbol,
    index::{Index, simple_index},
    middle::primitive::PrimitiveKind,
};

#[doc(hidden)]
mod private {
    #[doc(hidden)]
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct PrivateZst;
}

/// Thin pointer to an interned type kind. Do not construct directly. Instead,
/// use [`TypeContext::intern_type`]
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type(Arc<TypeKind>, private::PrivateZst);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// int
    Int,
    /// true, false
    Bool,
    /// "choco"
    Str,
    /// unit, spelled `none` in source
    Unit,
    /// list[T]
    List(Type),
    /// A user defined record. Records are nominal, so the name is enough to
    /// identify the type. The fields live in the record table.
    Record(InternedSymbol),
    /// fn(int, str) -> bool
    Function {
        parameters: Arc<[Type]>,
        return_type: Type,
    },
    /// An unresolved type variable whose type must be inferred
    Infer(TypeVariableId),
    /// The type which is created as a result of some illegal declaration we
    /// can't compute the type of. If you find this in your type, there is no
    /// use emitting another error since one has already been created.
    Error,
}

simple_index! {
    /// A type variable to be inferred
    pub struct TypeVariableId;
}

/// Owns the interning table for types
#[derive(Debug, Default)]
pub struct TypeContext {
    type_table: HashSet<Arc<TypeKind>>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_type(&mut self, kind: TypeKind) -> Type {
        let arc = self.type_table.get_or_insert(Arc::new(kind));
        Type(arc.clone(), private::PrivateZst)
    }

    pub fn get_unit_type(&mut self) -> Type {
        self.get_primitive_type(PrimitiveKind::Unit)
    }

    pub fn get_primitive_type(&mut self, primitive: PrimitiveKind) -> Type {
        match primitive {
            PrimitiveKind::Int => self.intern_type(TypeKind::Int),
            PrimitiveKind::Bool => self.intern_type(TypeKind::Bool),
            PrimitiveKind::Str => self.intern_type(TypeKind::Str),
            PrimitiveKind::Unit => self.intern_type(TypeKind::Unit),
        }
    }

    pub fn get_error_type(&mut self) -> Type {
        self.intern_type(TypeKind::Error)
    }

    pub fn get_list_type(&mut self, element: Type) -> Type {
        self.intern_type(TypeKind::List(element))
    }

    pub fn get_function_type(&mut self, parameters: Vec<Type>, return_type: Type) -> Type {
        self.intern_type(TypeKind::Function {
            parameters: parameters.into(),
            return_type,
        })
    }
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Type").field(&self.0).finish()
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl TypeKind {
    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            TypeKind::Int => Some(PrimitiveKind::Int),
            TypeKind::Bool => Some(PrimitiveKind::Bool),
            TypeKind::Str => Some(PrimitiveKind::Str),
            TypeKind::Unit => Some(PrimitiveKind::Unit),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, TypeKind::Unit)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, TypeKind::Bool)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TypeKind::Error)
    }

    /// Returns true if a type variable or the error type appears anywhere in
    /// this type
    pub fn is_unresolved(&self) -> bool {
        match self {
            TypeKind::Infer(_) | TypeKind::Error => true,
            TypeKind::List(element) => element.is_unresolved(),
            TypeKind::Function {
                parameters,
                return_type,
            } => parameters.iter().any(|ty| ty.is_unresolved()) || return_type.is_unresolved(),
            TypeKind::Int
            | TypeKind::Bool
            | TypeKind::Str
            | TypeKind::Unit
            | TypeKind::Record(_) => false,
        }
    }

    pub fn contains_error(&self) -> bool {
        match self {
            TypeKind::Error => true,
            TypeKind::List(element) => element.contains_error(),
            TypeKind::Function {
                parameters,
                return_type,
            } => parameters.iter().any(|ty| ty.contains_error()) || return_type.contains_error(),
            _ => false,
        }
    }
}

impl core::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
            Self::Str => write!(f, "str"),
            Self::Unit => write!(f, "unit"),
            Self::List(element) => write!(f, "list[{}]", **element),
            Self::Record(name) => write!(f, "{name}"),
            Self::Function {
                parameters,
                return_type,
            } => {
                write!(f, "fn(")?;
                for (i, ty) in parameters.iter().enumerate() {
                    write!(f, "{}", **ty)?;

                    if i != parameters.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, ") -> {}", **return_type)
            }
            Self::Infer(id) => write!(f, "{{unknown@{}}}", id.index()),
            Self::Error => write!(f, "{{error}}"),
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", **self)
    }
}

impl Type {
    pub fn colored(&self) -> colored::ColoredString {
        self.to_string().yellow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_types_share_storage() {
        let mut tcx = TypeContext::new();

        let int = tcx.get_primitive_type(PrimitiveKind::Int);
        let a = tcx.get_list_type(int.clone());
        let b = tcx.get_list_type(int);

        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn displays_nested_types() {
        let mut tcx = TypeContext::new();

        let int = tcx.get_primitive_type(PrimitiveKind::Int);
        let list = tcx.get_list_type(int.clone());
        let record = tcx.intern_type(TypeKind::Record(InternedSymbol::new("Record")));
        let function = tcx.get_function_type(vec![list, record], int);

        assert_eq!(function.to_string(), "fn(list[int], Record) -> int");
    }

    #[test]
    fn detects_unresolved_variables() {
        let mut tcx = TypeContext::new();

        let variable = tcx.intern_type(TypeKind::Infer(TypeVariableId::new(0)));
        let list = tcx.get_list_type(variable);
        let int = tcx.get_primitive_type(PrimitiveKind::Int);

        assert!(list.is_unresolved());
        assert!(!int.is_unresolved());
    }
}
