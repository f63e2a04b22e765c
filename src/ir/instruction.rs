use serde::{Deserialize, Serialize};

use crate::lang::{Operand, SymbolId};

/// Zero-based position of an instruction in the stream.
pub type Ip = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `dst = lhs`
    None,
    /// `dst = -lhs`
    Negation,

    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    ShiftLeft,
    ShiftRight,
}

impl AssignOp {
    pub fn is_binary(self) -> bool {
        !matches!(self, AssignOp::None | AssignOp::Negation)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::None => "",
            AssignOp::Negation => "-",
            AssignOp::Add => "+",
            AssignOp::Subtract => "-",
            AssignOp::Multiply => "*",
            AssignOp::Divide => "/",
            AssignOp::Remainder => "%",
            AssignOp::ShiftLeft => "<<",
            AssignOp::ShiftRight => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    LogOr,
    LogAnd,

    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

impl CompareOp {
    pub fn is_logical(self) -> bool {
        matches!(self, CompareOp::LogOr | CompareOp::LogAnd)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Equal | CompareOp::NotEqual)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::LogOr => "||",
            CompareOp::LogAnd => "&&",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Greater => ">",
            CompareOp::Less => "<",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::LessOrEqual => "<=",
        }
    }
}

// =============================================================================
// OP - three-address instructions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// `dst = lhs <op> rhs`; `rhs` is absent for plain copies and negation.
    Assign {
        op: AssignOp,
        dst: Operand,
        lhs: Operand,
        rhs: Option<Operand>,
    },

    /// Unconditional jump to the instruction's target.
    Goto,

    /// Jump to a named label, resolved when the enclosing function ends.
    GotoLabel { label: String },

    /// Jump to the instruction's target when `lhs <compare> rhs` holds.
    If {
        compare: CompareOp,
        lhs: Operand,
        rhs: Operand,
    },

    /// Push one call argument.
    Push { value: Operand },

    Call {
        target: SymbolId,
        result: Option<String>,
    },

    Return { value: Option<Operand> },
}

impl Op {
    pub fn is_branch(&self) -> bool {
        matches!(self, Op::Goto | Op::GotoLabel { .. } | Op::If { .. })
    }
}

/// One entry of the instruction stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,

    /// Source snippet the instruction was generated from.
    pub content: String,

    /// Jump target; `None` while a branch is still waiting for backpatching.
    pub target: Option<Ip>,
}
