use strum::{EnumIter, EnumString};

use crate::frontend::ast::{BinaryOperatorClass, BinaryOperatorKind};

/// Type names which are built into the language and can not be redefined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter)]
pub enum PrimitiveKind {
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "str")]
    Str,
    #[strum(serialize = "unit", serialize = "none")]
    Unit,
}

impl core::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveKind::Int => write!(f, "int"),
            PrimitiveKind::Bool => write!(f, "bool"),
            PrimitiveKind::Str => write!(f, "str"),
            PrimitiveKind::Unit => write!(f, "unit"),
        }
    }
}

impl PrimitiveKind {
    pub fn supports_binary_op(&self, kind: BinaryOperatorKind) -> bool {
        match kind.class() {
            BinaryOperatorClass::Arithmetic | BinaryOperatorClass::Comparison => {
                matches!(self, PrimitiveKind::Int)
            }
            BinaryOperatorClass::Logical => matches!(self, PrimitiveKind::Bool),
            // Every primitive can be compared for equality
            BinaryOperatorClass::Equality => true,
        }
    }

    /// Values of this type have a fixed number of shapes a match can cover
    /// without a catch-all arm
    pub fn is_finite(&self) -> bool {
        matches!(self, PrimitiveKind::Bool | PrimitiveKind::Unit)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn parses_source_spellings() {
        assert_eq!(PrimitiveKind::from_str("int"), Ok(PrimitiveKind::Int));
        assert_eq!(PrimitiveKind::from_str("none"), Ok(PrimitiveKind::Unit));
        assert_eq!(PrimitiveKind::from_str("unit"), Ok(PrimitiveKind::Unit));
        assert!(PrimitiveKind::from_str("Record").is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for primitive in PrimitiveKind::iter() {
            assert_eq!(
                PrimitiveKind::from_str(&primitive.to_string()),
                Ok(primitive)
            );
        }
    }

    #[test]
    fn only_ints_support_arithmetic() {
        assert!(PrimitiveKind::Int.supports_binary_op(BinaryOperatorKind::Add));
        assert!(!PrimitiveKind::Str.supports_binary_op(BinaryOperatorKind::Add));
        assert!(PrimitiveKind::Str.supports_binary_op(BinaryOperatorKind::Equals));
        assert!(PrimitiveKind::Bool.supports_binary_op(BinaryOperatorKind::LogicalOr));
    }
}
