//! Single-pass intermediate code generation for a small C-like language.
//!
//! A front end drives a [`Context`] while it parses: declarations fill the
//! symbol table, statements and expressions append three-address
//! instructions, and forward jumps are collected in backpatch lists that are
//! resolved once their targets are known. [`Context::finish`] hands back a
//! [`Program`] ready for a back end.

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod ir;
pub mod lang;
pub mod symtab;

pub use config::ContextConfig;
pub use context::{Condition, Context};
pub use diagnostic::{CompileError, Diagnostic, DiagnosticSource, ErrorPolicy, Span};
pub use ir::{AssignOp, BackpatchList, CompareOp, Instruction, Ip, Op, Program, ScopeKind};
pub use lang::{Expr, ExpressionKind, Operand, ReturnKind, Symbol, SymbolId, SymbolKind};
