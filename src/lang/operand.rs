use serde::{Deserialize, Serialize};

use super::kind::{ExpressionKind, SymbolKind};

/// A value token used by instructions: either a literal or a variable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub value: String,
    pub kind: SymbolKind,
    pub expression: ExpressionKind,

    /// Element index for `name[index]` reads and writes.
    pub index: Option<Box<Operand>>,
}

impl Operand {
    pub fn constant(value: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            value: value.into(),
            kind,
            expression: ExpressionKind::Constant,
            index: None,
        }
    }

    /// Integer literal typed with the smallest kind that holds it.
    pub fn int(value: u32) -> Self {
        Self::constant(value.to_string(), SymbolKind::for_literal(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::constant(if value { "1" } else { "0" }, SymbolKind::Bool)
    }

    pub fn variable(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            value: name.into(),
            kind,
            expression: ExpressionKind::Variable,
            index: None,
        }
    }

    pub fn indexed(mut self, index: Operand) -> Self {
        self.index = Some(Box::new(index));
        self
    }

    pub fn is_constant(&self) -> bool {
        self.expression == ExpressionKind::Constant
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            SymbolKind::String if self.is_constant() => write!(f, "\"{}\"", self.value)?,
            _ => write!(f, "{}", self.value)?,
        }
        if let Some(index) = &self.index {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}
