use serde::{Deserialize, Serialize};

use super::kind::{ExpressionKind, ReturnKind, SymbolKind};
use crate::ir::Ip;

/// Stable index of a symbol inside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A name bound in some scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,

    /// Only meaningful for callables.
    pub return_kind: ReturnKind,

    pub expression: ExpressionKind,

    /// Entry ip of a function or position of a label.
    pub ip: Option<Ip>,

    /// Globals: per-kind slot until the layout is finalized, byte offset
    /// afterwards. Locals and parameters: byte offset in the frame.
    /// Callables: frame size in bytes.
    pub offset_or_size: u32,

    /// Element count for arrays, byte capacity for strings, 0 for scalars.
    pub size: u32,

    /// 1-based index for parameters, 0 otherwise. Callables store their
    /// parameter count here.
    pub parameter: u16,

    /// Owning function, `None` for globals.
    pub parent: Option<String>,

    pub temporary: bool,
    pub in_use: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            return_kind: ReturnKind::Unknown,
            expression: ExpressionKind::None,
            ip: None,
            offset_or_size: 0,
            size: 0,
            parameter: 0,
            parent: None,
            temporary: false,
            in_use: false,
        }
    }

    pub fn with_return(mut self, return_kind: ReturnKind) -> Self {
        self.return_kind = return_kind;
        self
    }

    pub fn with_expression(mut self, expression: ExpressionKind) -> Self {
        self.expression = expression;
        self
    }

    pub fn with_ip(mut self, ip: Ip) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_offset(mut self, offset_or_size: u32) -> Self {
        self.offset_or_size = offset_or_size;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_parameter(mut self, parameter: u16) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn with_parent(mut self, parent: Option<&str>) -> Self {
        self.parent = parent.map(str::to_string);
        self
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self.in_use = true;
        self
    }

    pub fn is_array(&self) -> bool {
        self.size > 0 && self.kind != SymbolKind::String
    }

    pub fn is_parameter(&self) -> bool {
        self.parameter > 0 && !self.kind.is_callable()
    }

    /// Globals, including temporaries created outside any function.
    pub fn is_static_storage(&self) -> bool {
        self.kind.is_storage() && self.parent.is_none()
    }
}
