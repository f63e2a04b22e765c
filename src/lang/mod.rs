//! # Language-level data
//!
//! Primitive kinds and the implicit-conversion rules between them, the
//! symbol record kept by the symbol table, and the operand and expression
//! values the front end passes back and forth.

pub mod expr;
pub mod kind;
pub mod operand;
pub mod symbol;

pub use expr::Expr;
pub use kind::{ExpressionKind, ReturnKind, SymbolKind};
pub use operand::Operand;
pub use symbol::{Symbol, SymbolId};
