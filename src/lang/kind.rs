use serde::{Deserialize, Serialize};

use crate::diagnostic::CompileError;

/// Every kind of entry the symbol table can hold.
///
/// The order of the variants matters: `Bool..=Uint32` form the ordered
/// integer/boolean family used for widening checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Unknown,
    None,

    Label,

    Function,
    FunctionPrototype,
    EntryPoint,

    Bool,
    Uint8,
    Uint16,
    Uint32,
    String,

    /// Type tag for "array of something". Array symbols are stored under
    /// their element kind with a nonzero `size`, so this tag is never a
    /// storage kind and declarations using it are rejected.
    Array,
}

/// Kinds a callable may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnKind {
    Unknown,

    Void,
    Bool,
    Uint8,
    Uint16,
    Uint32,
    String,
}

/// Whether an expression is a compile-time constant or reads a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionKind {
    None,

    Constant,
    Variable,
}

impl SymbolKind {
    /// Position in the widening order `bool < uint8 < uint16 < uint32`.
    pub fn rank(self) -> Option<u8> {
        match self {
            SymbolKind::Bool => Some(0),
            SymbolKind::Uint8 => Some(1),
            SymbolKind::Uint16 => Some(2),
            SymbolKind::Uint32 => Some(3),
            _ => None,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, SymbolKind::Uint8 | SymbolKind::Uint16 | SymbolKind::Uint32)
    }

    pub fn is_int_or_bool(self) -> bool {
        self.rank().is_some()
    }

    pub fn is_callable(self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::FunctionPrototype | SymbolKind::EntryPoint
        )
    }

    /// Kinds that may be stored in a variable slot.
    pub fn is_storage(self) -> bool {
        self.is_int_or_bool() || self == SymbolKind::String
    }

    /// Smallest unsigned kind able to hold `value`.
    pub fn for_literal(value: u32) -> SymbolKind {
        if value <= u8::MAX as u32 {
            SymbolKind::Uint8
        } else if value <= u16::MAX as u32 {
            SymbolKind::Uint16
        } else {
            SymbolKind::Uint32
        }
    }
}

impl ReturnKind {
    /// Kind of the value produced by a call, `None` for void.
    pub fn value_kind(self) -> Option<SymbolKind> {
        match self {
            ReturnKind::Bool => Some(SymbolKind::Bool),
            ReturnKind::Uint8 => Some(SymbolKind::Uint8),
            ReturnKind::Uint16 => Some(SymbolKind::Uint16),
            ReturnKind::Uint32 => Some(SymbolKind::Uint32),
            ReturnKind::String => Some(SymbolKind::String),
            ReturnKind::Void | ReturnKind::Unknown => None,
        }
    }

    /// Bytes needed to hand the return value back to the caller.
    pub fn size(self) -> Result<u32, CompileError> {
        match self {
            ReturnKind::Void => Ok(0),
            ReturnKind::Bool | ReturnKind::Uint8 => Ok(1),
            ReturnKind::Uint16 => Ok(2),
            ReturnKind::Uint32 => Ok(4),
            other => Err(CompileError::internal(format!(
                "return kind '{}' has no fixed size",
                other
            ))),
        }
    }
}

/// Whether a value of kind `from` may be stored into `to` without an
/// explicit conversion.
///
/// Constants convert freely between integer widths; range checks happen
/// elsewhere. Variables only widen inside the `bool..=uint32` family.
pub fn can_implicitly_cast(to: SymbolKind, from: SymbolKind, expression: ExpressionKind) -> bool {
    if to == from {
        return true;
    }

    if expression == ExpressionKind::Constant && to.is_int() && from.is_int() {
        return true;
    }

    match (to.rank(), from.rank()) {
        (Some(to), Some(from)) => to >= from,
        _ => false,
    }
}

/// Widest integer kind of the two operands, or `Unknown` when neither is an
/// integer.
pub fn largest_for_arithmetic(a: SymbolKind, b: SymbolKind) -> SymbolKind {
    [SymbolKind::Uint32, SymbolKind::Uint16, SymbolKind::Uint8]
        .into_iter()
        .find(|k| *k == a || *k == b)
        .unwrap_or(SymbolKind::Unknown)
}

/// Storage size in bytes of a sized primitive.
pub fn size_of(kind: SymbolKind) -> Result<u32, CompileError> {
    match kind {
        SymbolKind::Bool | SymbolKind::Uint8 => Ok(1),
        SymbolKind::Uint16 => Ok(2),
        SymbolKind::Uint32 => Ok(4),
        other => Err(CompileError::internal(format!(
            "size of '{}' requested",
            other
        ))),
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SymbolKind::Label => "Label",
            SymbolKind::Bool => "bool",
            SymbolKind::Uint8 => "uint8",
            SymbolKind::Uint16 => "uint16",
            SymbolKind::Uint32 => "uint32",
            SymbolKind::String => "string",
            SymbolKind::Array => "Array",
            _ => "-",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReturnKind::Void => "void",
            ReturnKind::Bool => "bool",
            ReturnKind::Uint8 => "uint8",
            ReturnKind::Uint16 => "uint16",
            ReturnKind::Uint32 => "uint32",
            ReturnKind::String => "string",
            ReturnKind::Unknown => "-",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpressionKind::Constant => "Const.",
            ExpressionKind::Variable => "Var.",
            ExpressionKind::None => "-",
        };
        write!(f, "{}", s)
    }
}
