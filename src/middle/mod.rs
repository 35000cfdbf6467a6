//! Types are inferred here and the AST is turned into HIR. Match expressions
//! are compiled to decision trees before the HIR is lowered and flattened to
//! LIR, which is then optimized before being handed to the backend.

pub mod hir;
pub mod lir;
pub mod optimization;
pub mod pattern;
pub mod primitive;
pub mod ty;
pub mod type_checking;
