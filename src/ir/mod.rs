pub mod backpatch;
pub mod disasm;
pub mod instruction;
pub mod program;
pub mod scope;
pub mod stream;

pub use backpatch::{BackpatchList, SwitchCase, SwitchList, merge_lists};
pub use instruction::{AssignOp, CompareOp, Instruction, Ip, Op};
pub use program::Program;
pub use scope::{ScopeKind, ScopeStack};
pub use stream::InstructionStream;
