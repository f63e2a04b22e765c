//! # Compilation context
//!
//! One `Context` owns every structure of a single compilation run: the
//! symbol table, the instruction stream, the scope stack and the
//! diagnostics. The front end calls into it as grammar productions are
//! reduced; nothing here decides *when* a construct starts or ends.
//!
//! Operations return `Result<_, CompileError>`. Under the accumulate policy
//! a user error is recorded and the call still returns `Ok`, leaving the
//! stream consistent; an `Err` always ends the run.

mod control;
mod decl;
mod expr;

pub use expr::Condition;

use std::collections::{BTreeSet, HashMap};

use crate::config::ContextConfig;
use crate::diagnostic::{CompileError, Diagnostic, DiagnosticSource, Diagnostics, Span};
use crate::ir::{BackpatchList, InstructionStream, Ip, Op, Program, ScopeKind, ScopeStack};
use crate::lang::{Expr, ReturnKind, SymbolId, SymbolKind};
use crate::symtab::SymbolTable;

/// A `goto label;` waiting for the end of its function.
#[derive(Debug)]
struct PendingGoto {
    ip: Ip,
    label: String,
    span: Option<Span>,
}

/// The function whose body is being generated.
#[derive(Debug)]
struct FunctionState {
    /// Canonical table entry, `None` for a rejected redefinition.
    id: Option<SymbolId>,
    name: String,
    /// Owner tag of locals, parameters and labels. Equals `name` except for
    /// rejected bodies, which get a private scope so nothing leaks.
    scope: String,
    return_kind: ReturnKind,
    gotos: Vec<PendingGoto>,
}

pub struct Context {
    config: ContextConfig,
    symbols: SymbolTable,
    stream: InstructionStream,
    scopes: ScopeStack,
    diagnostics: Diagnostics,
    function: Option<FunctionState>,
    /// Parameter kinds of every callable, keyed by name.
    signatures: HashMap<String, Vec<SymbolKind>>,
    called: BTreeSet<SymbolId>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Self {
        let diagnostics = Diagnostics::new(config.policy, config.max_diagnostics);
        Self {
            config,
            symbols: SymbolTable::new(),
            stream: InstructionStream::new(),
            scopes: ScopeStack::new(),
            diagnostics,
            function: None,
            signatures: HashMap::new(),
            called: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.items()
    }

    /// Name of the function being generated.
    pub fn current_function(&self) -> Option<&str> {
        self.function.as_ref().map(|f| f.name.as_str())
    }

    /// Owner tag for symbols declared right now.
    fn scope(&self) -> Option<String> {
        self.function.as_ref().map(|f| f.scope.clone())
    }

    pub fn find_by_name(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .find_by_name(name, self.function.as_ref().map(|f| f.scope.as_str()))
    }

    pub fn report(
        &mut self,
        source: DiagnosticSource,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        self.diagnostics.report(source, message, span)
    }

    // -------------------------------------------------------------------------
    // Stream primitives
    // -------------------------------------------------------------------------

    pub fn next_ip(&self) -> Ip {
        self.stream.next_ip()
    }

    pub fn emit(&mut self, op: Op, content: impl Into<String>) -> Ip {
        self.stream.emit(op, content)
    }

    pub fn emit_with_backpatch(&mut self, op: Op, content: impl Into<String>) -> BackpatchList {
        self.stream.emit_with_backpatch(op, content)
    }

    /// Unconditional jump to a known ip, e.g. the back edge of a loop.
    pub fn emit_goto(&mut self, target: Ip, content: impl Into<String>) -> Ip {
        self.stream.emit_to(Op::Goto, target, content)
    }

    /// Unconditional jump to be patched later.
    pub fn emit_goto_pending(&mut self, content: impl Into<String>) -> BackpatchList {
        self.stream.emit_with_backpatch(Op::Goto, content)
    }

    pub fn patch(&mut self, list: BackpatchList, target: Ip) -> Result<(), CompileError> {
        self.stream.patch(list, target)
    }

    // -------------------------------------------------------------------------
    // Scopes
    // -------------------------------------------------------------------------

    pub fn enter_scope(&mut self, kind: ScopeKind) -> usize {
        self.scopes.enter(kind)
    }

    pub fn exit_scope(&mut self, kind: ScopeKind, resume: Ip) -> Result<(), CompileError> {
        self.scopes.exit(kind, resume, &mut self.stream)
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    // -------------------------------------------------------------------------
    // Temporaries
    // -------------------------------------------------------------------------

    /// A free temporary of `kind` in the current function, or in static
    /// storage outside any function. `None` after reporting that no storage
    /// is left.
    pub fn get_unused_temporary(
        &mut self,
        kind: SymbolKind,
        span: Option<Span>,
    ) -> Result<Option<SymbolId>, CompileError> {
        let scope = self.scope();
        let temp = self.symbols.get_unused_temporary(kind, scope.as_deref())?;
        if temp.is_none() {
            let message = format!("no storage left for a '{}' temporary", kind);
            self.report(DiagnosticSource::Expression, message, span)?;
        }
        Ok(temp)
    }

    /// Give back the temporary an expression occupies, if any.
    pub fn release(&mut self, expr: &Expr) {
        if let Some(temp) = expr.temp() {
            self.symbols.release_temporary(temp);
        }
    }

    // -------------------------------------------------------------------------
    // Finish
    // -------------------------------------------------------------------------

    /// Close the run and hand over the finalized program.
    pub fn finish(mut self) -> Result<Program, CompileError> {
        if let Some(function) = &self.function {
            return Err(CompileError::internal(format!(
                "function '{}' is still open",
                function.name
            )));
        }
        if !self.scopes.is_empty() {
            return Err(CompileError::internal(format!(
                "{} scope(s) still open",
                self.scopes.depth()
            )));
        }
        if !self.symbols.declaration_queue().is_empty() {
            return Err(CompileError::internal("declaration queue was never committed"));
        }

        let has_entry = self
            .symbols
            .iter()
            .any(|(_, s)| s.kind == SymbolKind::EntryPoint);
        if !has_entry {
            let message = format!("entry point '{}' is not defined", self.config.entry_point);
            self.report(DiagnosticSource::Declaration, message, None)?;
        }

        let undefined: Vec<String> = self
            .called
            .iter()
            .map(|id| self.symbols.get(*id))
            .filter(|s| s.kind == SymbolKind::FunctionPrototype)
            .map(|s| s.name.clone())
            .collect();
        for name in undefined {
            let message = format!("function '{}' is called but never defined", name);
            self.report(DiagnosticSource::Declaration, message, None)?;
        }

        if let Some(ip) = self.stream.unresolved().next() {
            return Err(CompileError::internal(format!(
                "branch at {:04} has no target",
                ip
            )));
        }
        if let Some(ip) = self.stream.out_of_range().next() {
            return Err(CompileError::internal(format!(
                "branch at {:04} jumps past the end of the stream",
                ip
            )));
        }

        let layout = self.symbols.finalize_layout()?;
        log::debug!(
            "finished: {} symbol(s), {} instruction(s), {} diagnostic(s)",
            self.symbols.len(),
            self.stream.len(),
            self.diagnostics.len()
        );

        Ok(Program {
            symbols: self.symbols.into_vec(),
            instructions: self.stream.into_vec(),
            layout,
            diagnostics: self.diagnostics.into_vec(),
        })
    }
}
