use super::kind::{ExpressionKind, SymbolKind};
use super::operand::Operand;
use super::symbol::SymbolId;

/// Result of an expression production.
///
/// Once a fault has been reported for an expression it becomes `Poisoned`;
/// every operation receiving a poisoned input stays quiet and yields a
/// poisoned result, so partially built operands never reach the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Value {
        operand: Operand,
        /// Temporary holding the value, released once it is consumed.
        temp: Option<SymbolId>,
    },
    Poisoned,
}

impl Expr {
    pub fn operand(operand: Operand) -> Self {
        Expr::Value {
            operand,
            temp: None,
        }
    }

    pub fn int(value: u32) -> Self {
        Self::operand(Operand::int(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::operand(Operand::bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::operand(Operand::constant(value, SymbolKind::String))
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self, Expr::Poisoned)
    }

    pub fn kind(&self) -> SymbolKind {
        match self {
            Expr::Value { operand, .. } => operand.kind,
            Expr::Poisoned => SymbolKind::Unknown,
        }
    }

    pub fn expression(&self) -> ExpressionKind {
        match self {
            Expr::Value { operand, .. } => operand.expression,
            Expr::Poisoned => ExpressionKind::None,
        }
    }

    pub fn as_operand(&self) -> Option<&Operand> {
        match self {
            Expr::Value { operand, .. } => Some(operand),
            Expr::Poisoned => None,
        }
    }

    pub fn temp(&self) -> Option<SymbolId> {
        match self {
            Expr::Value { temp, .. } => *temp,
            Expr::Poisoned => None,
        }
    }
}
