use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::ir::Instruction;
use crate::lang::{Symbol, SymbolId, SymbolKind};
use crate::symtab::Layout;

/// Everything the native emitter needs from one compilation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub symbols: Vec<Symbol>,

    /// Fully backpatched stream, indexed by ip.
    pub instructions: Vec<Instruction>,

    pub layout: Layout,

    /// Recoverable faults recorded during generation. The front end decides
    /// whether they block emission.
    pub diagnostics: Vec<Diagnostic>,
}

impl Program {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn entry_point(&self) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.kind == SymbolKind::EntryPoint)
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Encode the program image handed to the emitter.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
