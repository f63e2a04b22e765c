use serde::{Deserialize, Serialize};

use crate::diagnostic::{CompileError, Span};
use crate::lang::kind::size_of;
use crate::lang::{Expr, ExpressionKind, ReturnKind, Symbol, SymbolId, SymbolKind};

/// A name waiting for its statement's type keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedDeclaration {
    pub name: String,
    /// Array length, 0 for scalars.
    pub size: u32,
    pub initializer: Option<Expr>,
    pub span: Option<Span>,
}

/// A formal parameter waiting for its function header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedParameter {
    pub kind: SymbolKind,
    pub name: String,
}

/// Outcome of committing one queued name.
#[derive(Debug, PartialEq)]
pub enum Commit {
    Declared {
        id: SymbolId,
        initializer: Option<Expr>,
        span: Option<Span>,
    },
    Duplicate(QueuedDeclaration),
    /// The storage it needs does not fit in the address space.
    TooLarge(QueuedDeclaration),
}

/// Packed static storage produced by [`SymbolTable::finalize_layout`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Static symbols grouped by kind, declaration order within a kind.
    pub order: Vec<SymbolId>,
    pub static_size: u32,
}

/// Running counters kept separately for each storable kind.
#[derive(Debug, Default)]
struct KindCounters {
    bool: u32,
    uint8: u32,
    uint16: u32,
    uint32: u32,
    string: u32,
}

impl KindCounters {
    fn next(&mut self, kind: SymbolKind, step: u32) -> Result<u32, CompileError> {
        let counter = match kind {
            SymbolKind::Bool => &mut self.bool,
            SymbolKind::Uint8 => &mut self.uint8,
            SymbolKind::Uint16 => &mut self.uint16,
            SymbolKind::Uint32 => &mut self.uint32,
            SymbolKind::String => &mut self.string,
            other => {
                return Err(CompileError::internal(format!(
                    "no storage counter for '{}'",
                    other
                )));
            }
        };
        let current = *counter;
        *counter = current.checked_add(step).ok_or_else(|| {
            CompileError::internal(format!("slot counter for '{}' overflowed", kind))
        })?;
        Ok(current)
    }
}

fn temporary_prefix(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Bool => "#b",
        SymbolKind::Uint8 => "#u8",
        SymbolKind::Uint16 => "#u16",
        SymbolKind::Uint32 => "#u32",
        SymbolKind::String => "#s",
        _ => "#t",
    }
}

/// Bytes a string variable occupies: a reference to its data.
pub const STRING_SLOT_SIZE: u32 = 4;

/// Bytes occupied by a variable of `kind` with the given array length, or
/// `None` when that does not fit in 32 bits.
pub fn storage_size(kind: SymbolKind, size: u32) -> Result<Option<u32>, CompileError> {
    match kind {
        SymbolKind::String => Ok(Some(STRING_SLOT_SIZE)),
        _ => Ok(size_of(kind)?.checked_mul(size.max(1))),
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    declaration_queue: Vec<QueuedDeclaration>,
    parameter_queue: Vec<QueuedParameter>,
    statics: KindCounters,
    temporaries: KindCounters,
    /// Bytes of static storage handed out so far.
    static_bytes: u32,
    frame_offset: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unconditionally. Uniqueness is the caller's business.
    pub fn declare_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        log::debug!(
            "declare {} '{}' in {}",
            symbol.kind,
            symbol.name,
            symbol.parent.as_deref().unwrap_or("<global>")
        );
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    /// Lookup restricted to exactly one scope.
    pub fn find_in_scope(&self, name: &str, scope: Option<&str>) -> Option<SymbolId> {
        self.iter()
            .find(|(_, s)| !s.temporary && s.name == name && s.parent.as_deref() == scope)
            .map(|(id, _)| id)
    }

    /// Innermost-first lookup: the function scope, then globals.
    pub fn find_by_name(&self, name: &str, scope: Option<&str>) -> Option<SymbolId> {
        scope
            .and_then(|function| self.find_in_scope(name, Some(function)))
            .or_else(|| self.find_in_scope(name, None))
    }

    pub fn find_function(&self, name: &str) -> Option<SymbolId> {
        self.find_in_scope(name, None)
            .filter(|id| self.get(*id).kind.is_callable())
    }

    pub fn find_parameter(&self, function: &str, name: &str) -> Option<SymbolId> {
        self.find_in_scope(name, Some(function))
            .filter(|id| self.get(*id).is_parameter())
    }

    /// Parameters of `function` in declaration order.
    pub fn parameters_of(&self, function: &str) -> Vec<SymbolId> {
        let mut params: Vec<SymbolId> = self
            .iter()
            .filter(|(_, s)| s.is_parameter() && s.parent.as_deref() == Some(function))
            .map(|(id, _)| id)
            .collect();
        params.sort_by_key(|id| self.get(*id).parameter);
        params
    }

    // -------------------------------------------------------------------------
    // Variables
    // -------------------------------------------------------------------------

    /// Reserve static storage and return the per-kind slot, `None` when the
    /// total would overflow.
    fn reserve_static(&mut self, kind: SymbolKind, size: u32) -> Result<Option<u32>, CompileError> {
        let Some(bytes) = storage_size(kind, size)? else {
            return Ok(None);
        };
        let Some(total) = self.static_bytes.checked_add(bytes) else {
            return Ok(None);
        };
        let step = if kind == SymbolKind::String { 1 } else { size.max(1) };
        let slot = self.statics.next(kind, step)?;
        self.static_bytes = total;
        Ok(Some(slot))
    }

    /// Reserve room in the current frame and return its offset, `None` when
    /// the frame would overflow.
    fn reserve_frame(&mut self, kind: SymbolKind, size: u32) -> Result<Option<u32>, CompileError> {
        let Some(bytes) = storage_size(kind, size)? else {
            return Ok(None);
        };
        let Some(end) = self.frame_offset.checked_add(bytes) else {
            return Ok(None);
        };
        Ok(Some(std::mem::replace(&mut self.frame_offset, end)))
    }

    /// Global variable. Offsets count slots per kind so that storage can be
    /// laid out contiguously by kind. `None` when it does not fit.
    pub fn declare_static_variable(
        &mut self,
        kind: SymbolKind,
        size: u32,
        name: &str,
    ) -> Result<Option<SymbolId>, CompileError> {
        let Some(slot) = self.reserve_static(kind, size)? else {
            return Ok(None);
        };
        Ok(Some(
            self.declare_symbol(
                Symbol::new(name, kind)
                    .with_expression(ExpressionKind::Variable)
                    .with_offset(slot)
                    .with_size(size),
            ),
        ))
    }

    /// Variable in the frame of `function`. `None` when it does not fit.
    pub fn declare_local_variable(
        &mut self,
        kind: SymbolKind,
        size: u32,
        name: &str,
        function: &str,
    ) -> Result<Option<SymbolId>, CompileError> {
        let Some(offset) = self.reserve_frame(kind, size)? else {
            return Ok(None);
        };
        Ok(Some(
            self.declare_symbol(
                Symbol::new(name, kind)
                    .with_expression(ExpressionKind::Variable)
                    .with_offset(offset)
                    .with_size(size)
                    .with_parent(Some(function)),
            ),
        ))
    }

    /// Parameters open a fresh frame, so they always fit.
    pub fn declare_parameter(
        &mut self,
        kind: SymbolKind,
        name: &str,
        function: &str,
        index: u16,
    ) -> Result<SymbolId, CompileError> {
        let offset = self.reserve_frame(kind, 0)?.ok_or_else(|| {
            CompileError::internal(format!("parameter '{}' overflows the frame", name))
        })?;
        Ok(self.declare_symbol(
            Symbol::new(name, kind)
                .with_expression(ExpressionKind::Variable)
                .with_offset(offset)
                .with_parameter(index)
                .with_parent(Some(function)),
        ))
    }

    /// Close the current frame and return its size.
    pub fn reset_frame(&mut self) -> u32 {
        std::mem::take(&mut self.frame_offset)
    }

    pub fn frame_offset(&self) -> u32 {
        self.frame_offset
    }

    // -------------------------------------------------------------------------
    // Callables
    // -------------------------------------------------------------------------

    pub fn declare_callable(
        &mut self,
        name: &str,
        kind: SymbolKind,
        return_kind: ReturnKind,
        parameter_count: u16,
    ) -> SymbolId {
        self.declare_symbol(
            Symbol::new(name, kind)
                .with_return(return_kind)
                .with_parameter(parameter_count),
        )
    }

    // -------------------------------------------------------------------------
    // Temporaries
    // -------------------------------------------------------------------------

    /// Reuse a free temporary of `kind` owned by `scope`, or allocate a new
    /// one: in the current frame inside a function, in static storage
    /// outside. `None` when no storage is left.
    pub fn get_unused_temporary(
        &mut self,
        kind: SymbolKind,
        scope: Option<&str>,
    ) -> Result<Option<SymbolId>, CompileError> {
        let free = self.symbols.iter().position(|s| {
            s.temporary && s.kind == kind && !s.in_use && s.parent.as_deref() == scope
        });

        if let Some(index) = free {
            let symbol = &mut self.symbols[index];
            symbol.in_use = true;
            log::trace!("reuse temporary {}", symbol.name);
            return Ok(Some(SymbolId(index as u32)));
        }

        let offset = match scope {
            Some(_) => self.reserve_frame(kind, 0)?,
            None => self.reserve_static(kind, 0)?,
        };
        let Some(offset) = offset else {
            return Ok(None);
        };
        let slot = self.temporaries.next(kind, 1)?;
        let name = format!("{}_{}", temporary_prefix(kind), slot);
        log::trace!("new temporary {} in {}", name, scope.unwrap_or("<global>"));
        Ok(Some(
            self.declare_symbol(
                Symbol::new(name, kind)
                    .with_expression(ExpressionKind::Variable)
                    .with_offset(offset)
                    .with_parent(scope)
                    .temporary(),
            ),
        ))
    }

    pub fn release_temporary(&mut self, id: SymbolId) {
        let symbol = &mut self.symbols[id.index()];
        if symbol.temporary {
            symbol.in_use = false;
        }
    }

    // -------------------------------------------------------------------------
    // Declaration and parameter queues
    // -------------------------------------------------------------------------

    pub fn queue_declaration(&mut self, declaration: QueuedDeclaration) {
        self.declaration_queue.push(declaration);
    }

    pub fn declaration_queue(&self) -> &[QueuedDeclaration] {
        &self.declaration_queue
    }

    /// Drop the queue without declaring anything.
    pub fn take_declaration_queue(&mut self) -> Vec<QueuedDeclaration> {
        std::mem::take(&mut self.declaration_queue)
    }

    /// Promote every queued name to a symbol of `kind` owned by `parent` and
    /// empty the queue.
    pub fn commit_declaration_queue(
        &mut self,
        kind: SymbolKind,
        parent: Option<&str>,
    ) -> Result<Vec<Commit>, CompileError> {
        let queue = std::mem::take(&mut self.declaration_queue);
        let mut commits = Vec::with_capacity(queue.len());

        for declaration in queue {
            if self.find_in_scope(&declaration.name, parent).is_some() {
                commits.push(Commit::Duplicate(declaration));
                continue;
            }

            let declared = match parent {
                Some(function) => self.declare_local_variable(
                    kind,
                    declaration.size,
                    &declaration.name,
                    function,
                )?,
                None => self.declare_static_variable(kind, declaration.size, &declaration.name)?,
            };
            let Some(id) = declared else {
                commits.push(Commit::TooLarge(declaration));
                continue;
            };
            commits.push(Commit::Declared {
                id,
                initializer: declaration.initializer,
                span: declaration.span,
            });
        }

        Ok(commits)
    }

    pub fn queue_parameter(&mut self, kind: SymbolKind, name: &str) {
        self.parameter_queue.push(QueuedParameter {
            kind,
            name: name.to_string(),
        });
    }

    pub fn take_parameters(&mut self) -> Vec<QueuedParameter> {
        std::mem::take(&mut self.parameter_queue)
    }

    // -------------------------------------------------------------------------
    // Layout
    // -------------------------------------------------------------------------

    /// Group static storage by kind and assign packed byte offsets. Ties keep
    /// declaration order, so the result is reproducible.
    pub fn finalize_layout(&mut self) -> Result<Layout, CompileError> {
        let mut order: Vec<SymbolId> = self
            .iter()
            .filter(|(_, s)| s.is_static_storage())
            .map(|(id, _)| id)
            .collect();
        order.sort_by_key(|id| self.get(*id).kind);

        let mut offset: u32 = 0;
        for id in &order {
            let symbol = &mut self.symbols[id.index()];
            let end = storage_size(symbol.kind, symbol.size)?
                .and_then(|bytes| offset.checked_add(bytes))
                .ok_or_else(|| {
                    CompileError::internal(format!("'{}' overflows static storage", symbol.name))
                })?;
            symbol.offset_or_size = offset;
            offset = end;
        }

        Ok(Layout {
            order,
            static_size: offset,
        })
    }

    pub fn into_vec(self) -> Vec<Symbol> {
        self.symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(name: &str) -> QueuedDeclaration {
        QueuedDeclaration {
            name: name.to_string(),
            size: 0,
            initializer: None,
            span: None,
        }
    }

    fn global(t: &mut SymbolTable, kind: SymbolKind, size: u32, name: &str) -> SymbolId {
        t.declare_static_variable(kind, size, name).unwrap().unwrap()
    }

    fn local(t: &mut SymbolTable, kind: SymbolKind, size: u32, name: &str) -> SymbolId {
        t.declare_local_variable(kind, size, name, "f")
            .unwrap()
            .unwrap()
    }

    fn temp(t: &mut SymbolTable, kind: SymbolKind, scope: Option<&str>) -> SymbolId {
        t.get_unused_temporary(kind, scope).unwrap().unwrap()
    }

    #[test]
    fn test_find_prefers_function_scope() {
        let mut t = SymbolTable::new();
        let global = global(&mut t, SymbolKind::Uint8, 0, "x");
        let local = local(&mut t, SymbolKind::Uint16, 0, "x");

        assert_eq!(t.find_by_name("x", Some("f")), Some(local));
        assert_eq!(t.find_by_name("x", Some("g")), Some(global));
        assert_eq!(t.find_by_name("x", None), Some(global));
        assert_eq!(t.find_by_name("y", Some("f")), None);
    }

    #[test]
    fn test_static_offsets_count_per_kind() {
        let mut t = SymbolTable::new();
        let a = global(&mut t, SymbolKind::Uint8, 0, "a");
        let b = global(&mut t, SymbolKind::Uint16, 0, "b");
        let c = global(&mut t, SymbolKind::Uint8, 4, "c");
        let d = global(&mut t, SymbolKind::Uint8, 0, "d");

        assert_eq!(t.get(a).offset_or_size, 0);
        assert_eq!(t.get(b).offset_or_size, 0);
        assert_eq!(t.get(c).offset_or_size, 1);
        assert_eq!(t.get(d).offset_or_size, 5);
    }

    #[test]
    fn test_temporaries_are_reused_after_release() {
        let mut t = SymbolTable::new();
        let first = temp(&mut t, SymbolKind::Uint8, None);
        let second = temp(&mut t, SymbolKind::Uint8, None);
        assert_ne!(first, second);
        assert!(t.get(first).in_use && t.get(second).in_use);

        t.release_temporary(first);
        let third = temp(&mut t, SymbolKind::Uint8, None);
        assert_eq!(third, first);

        let wide = temp(&mut t, SymbolKind::Uint32, None);
        assert_ne!(wide, first);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_temporaries_stay_in_their_function() {
        let mut t = SymbolTable::new();
        local(&mut t, SymbolKind::Uint16, 0, "x");
        let in_f = temp(&mut t, SymbolKind::Uint8, Some("f"));
        assert_eq!(t.get(in_f).parent.as_deref(), Some("f"));
        assert_eq!(t.get(in_f).offset_or_size, 2);
        assert_eq!(t.reset_frame(), 3);
        t.release_temporary(in_f);

        let in_g = temp(&mut t, SymbolKind::Uint8, Some("g"));
        assert_ne!(in_g, in_f);
        assert_eq!(t.get(in_g).offset_or_size, 0);
        assert_ne!(t.get(in_g).name, t.get(in_f).name);
        assert!(!t.get(in_g).is_static_storage());

        t.release_temporary(in_g);
        assert_eq!(temp(&mut t, SymbolKind::Uint8, Some("g")), in_g);
    }

    #[test]
    fn test_temporaries_are_not_found_by_name() {
        let mut t = SymbolTable::new();
        let id = temp(&mut t, SymbolKind::Bool, None);
        let name = t.get(id).name.clone();
        assert_eq!(t.find_by_name(&name, None), None);
    }

    #[test]
    fn test_commit_declaration_queue() {
        let mut t = SymbolTable::new();
        global(&mut t, SymbolKind::Uint8, 0, "b");
        for name in ["a", "b", "c"] {
            t.queue_declaration(queued(name));
        }

        let commits = t.commit_declaration_queue(SymbolKind::Uint8, None).unwrap();
        assert_eq!(commits.len(), 3);
        assert!(matches!(&commits[1], Commit::Duplicate(d) if d.name == "b"));
        assert!(t.declaration_queue().is_empty());
        assert!(t.find_by_name("a", None).is_some());
        assert!(t.find_by_name("c", None).is_some());
    }

    #[test]
    fn test_local_frame_offsets() {
        let mut t = SymbolTable::new();
        let p = t.declare_parameter(SymbolKind::Uint16, "p", "f", 1).unwrap();
        t.queue_declaration(queued("a"));
        t.queue_declaration(QueuedDeclaration {
            size: 3,
            ..queued("arr")
        });
        t.commit_declaration_queue(SymbolKind::Uint32, Some("f"))
            .unwrap();

        assert_eq!(t.get(p).offset_or_size, 0);
        let a = t.find_by_name("a", Some("f")).unwrap();
        let arr = t.find_by_name("arr", Some("f")).unwrap();
        assert_eq!(t.get(a).offset_or_size, 2);
        assert_eq!(t.get(arr).offset_or_size, 6);
        assert_eq!(t.reset_frame(), 18);
        assert_eq!(t.frame_offset(), 0);
        assert_eq!(t.find_parameter("f", "p"), Some(p));
        assert_eq!(t.find_parameter("f", "a"), None);
    }

    #[test]
    fn test_oversized_storage_is_refused() {
        let mut t = SymbolTable::new();
        assert_eq!(storage_size(SymbolKind::Uint32, 2_000_000_000).unwrap(), None);

        global(&mut t, SymbolKind::Uint32, 1_000_000_000, "big");
        assert_eq!(
            t.declare_static_variable(SymbolKind::Uint32, 1_000_000_000, "bigger")
                .unwrap(),
            None
        );
        assert!(t.find_by_name("bigger", None).is_none());

        assert_eq!(
            t.declare_local_variable(SymbolKind::Uint32, 2_000_000_000, "huge", "f")
                .unwrap(),
            None
        );
        assert_eq!(t.frame_offset(), 0);

        t.queue_declaration(QueuedDeclaration {
            size: 1_000_000_000,
            ..queued("again")
        });
        let commits = t.commit_declaration_queue(SymbolKind::Uint16, None).unwrap();
        assert!(matches!(&commits[0], Commit::TooLarge(d) if d.name == "again"));

        let layout = t.finalize_layout().unwrap();
        assert_eq!(layout.static_size, 4_000_000_000);
    }

    #[test]
    fn test_strings_get_a_reference_slot() {
        let mut t = SymbolTable::new();
        for name in ["s", "t"] {
            t.queue_declaration(queued(name));
        }
        t.commit_declaration_queue(SymbolKind::String, None).unwrap();
        let flag = global(&mut t, SymbolKind::Bool, 0, "flag");
        let s_temp = temp(&mut t, SymbolKind::String, Some("f"));

        let layout = t.finalize_layout().unwrap();
        let s = t.find_by_name("s", None).unwrap();
        let t_id = t.find_by_name("t", None).unwrap();
        assert_eq!(layout.order, vec![flag, s, t_id]);
        assert_eq!(t.get(s).offset_or_size, 1);
        assert_eq!(t.get(t_id).offset_or_size, 1 + STRING_SLOT_SIZE);
        assert_eq!(layout.static_size, 1 + 2 * STRING_SLOT_SIZE);
        assert_eq!(t.get(s_temp).offset_or_size, 0);
        assert_eq!(t.frame_offset(), STRING_SLOT_SIZE);
    }

    #[test]
    fn test_finalize_layout_groups_by_kind_stably() {
        let mut t = SymbolTable::new();
        let w = global(&mut t, SymbolKind::Uint32, 0, "w");
        let a = global(&mut t, SymbolKind::Uint8, 0, "a");
        let flag = global(&mut t, SymbolKind::Bool, 0, "flag");
        let b = global(&mut t, SymbolKind::Uint8, 2, "b");
        local(&mut t, SymbolKind::Uint8, 0, "local");
        t.declare_callable("f", SymbolKind::Function, ReturnKind::Void, 0);

        let layout = t.finalize_layout().unwrap();
        assert_eq!(layout.order, vec![flag, a, b, w]);
        assert_eq!(t.get(flag).offset_or_size, 0);
        assert_eq!(t.get(a).offset_or_size, 1);
        assert_eq!(t.get(b).offset_or_size, 2);
        assert_eq!(t.get(w).offset_or_size, 4);
        assert_eq!(layout.static_size, 8);
    }
}
