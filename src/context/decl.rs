use super::{Context, FunctionState};
use crate::diagnostic::{CompileError, DiagnosticSource, Span};
use crate::ir::Op;
use crate::lang::{Expr, ExpressionKind, Operand, ReturnKind, Symbol, SymbolKind};
use crate::symtab::{Commit, QueuedDeclaration, QueuedParameter};

impl Context {
    // -------------------------------------------------------------------------
    // Variables
    // -------------------------------------------------------------------------

    /// Stage a name until the statement's type keyword is known.
    pub fn queue_declaration(
        &mut self,
        name: &str,
        size: u32,
        initializer: Option<Expr>,
        span: Option<Span>,
    ) {
        self.symbols.queue_declaration(QueuedDeclaration {
            name: name.to_string(),
            size,
            initializer,
            span,
        });
    }

    /// Declare every queued name with `kind` in the current scope and emit
    /// their initializers.
    pub fn commit_declaration_queue(
        &mut self,
        kind: SymbolKind,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if !kind.is_storage() {
            let queue = self.symbols.take_declaration_queue();
            for declaration in &queue {
                if let Some(init) = &declaration.initializer {
                    self.release(init);
                }
            }
            return self.report(
                DiagnosticSource::Declaration,
                "specified type is not allowed",
                span,
            );
        }

        let scope = self.scope();
        let commits = self
            .symbols
            .commit_declaration_queue(kind, scope.as_deref())?;

        for commit in commits {
            match commit {
                Commit::Duplicate(declaration) => {
                    if let Some(init) = &declaration.initializer {
                        self.release(init);
                    }
                    let message = format!("'{}' is already declared", declaration.name);
                    self.report(DiagnosticSource::Declaration, message, declaration.span)?;
                }
                Commit::TooLarge(declaration) => {
                    if let Some(init) = &declaration.initializer {
                        self.release(init);
                    }
                    let message = format!("storage for '{}' is too large", declaration.name);
                    self.report(DiagnosticSource::Declaration, message, declaration.span)?;
                }
                Commit::Declared {
                    id,
                    initializer: Some(init),
                    span,
                } => {
                    let symbol = self.symbols.get(id);
                    let dst = Operand::variable(symbol.name.clone(), symbol.kind);
                    let content = format!("{} {} = ...", kind, symbol.name);
                    if symbol.is_array() {
                        self.release(&init);
                        let message = format!("array '{}' cannot have an initializer", dst.value);
                        self.report(DiagnosticSource::Declaration, message, span)?;
                        continue;
                    }
                    self.store(dst, init, content, span)?;
                }
                Commit::Declared { .. } => {}
            }
        }
        Ok(())
    }

    /// Global variable declared directly, without going through the queue.
    pub fn declare_static_variable(
        &mut self,
        kind: SymbolKind,
        size: u32,
        name: &str,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if !kind.is_storage() {
            return self.report(
                DiagnosticSource::Declaration,
                "specified type is not allowed",
                span,
            );
        }
        if self.symbols.find_in_scope(name, None).is_some() {
            let message = format!("'{}' is already declared", name);
            return self.report(DiagnosticSource::Declaration, message, span);
        }
        if self.symbols.declare_static_variable(kind, size, name)?.is_none() {
            let message = format!("storage for '{}' is too large", name);
            return self.report(DiagnosticSource::Declaration, message, span);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Functions
    // -------------------------------------------------------------------------

    /// Stage a formal parameter for the next function header.
    pub fn queue_parameter(&mut self, kind: SymbolKind, name: &str) {
        self.symbols.queue_parameter(kind, name);
    }

    fn check_parameters(
        &mut self,
        function: &str,
        params: &[QueuedParameter],
        span: Option<Span>,
    ) -> Result<bool, CompileError> {
        let mut ok = true;
        for (i, param) in params.iter().enumerate() {
            if !param.kind.is_storage() {
                let message = format!(
                    "parameter '{}' of '{}' has a type that is not allowed",
                    param.name, function
                );
                self.report(DiagnosticSource::Declaration, message, span)?;
                ok = false;
            }
            if params[..i].iter().any(|p| p.name == param.name) {
                let message = format!(
                    "parameter '{}' of '{}' is declared twice",
                    param.name, function
                );
                self.report(DiagnosticSource::Declaration, message, span)?;
                ok = false;
            }
        }
        Ok(ok)
    }

    fn check_signature(
        &mut self,
        name: &str,
        existing_return: ReturnKind,
        return_kind: ReturnKind,
        kinds: &[SymbolKind],
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        let matches = existing_return == return_kind
            && self.signatures.get(name).map(Vec::as_slice) == Some(kinds);
        if !matches {
            let message = format!("conflicting declaration of function '{}'", name);
            self.report(DiagnosticSource::Declaration, message, span)?;
        }
        Ok(())
    }

    /// Register a function prototype from the staged parameters.
    pub fn declare_prototype(
        &mut self,
        name: &str,
        return_kind: ReturnKind,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        let params = self.symbols.take_parameters();
        self.check_parameters(name, &params, span)?;
        let kinds: Vec<SymbolKind> = params.iter().map(|p| p.kind).collect();

        match self.symbols.find_in_scope(name, None) {
            Some(id) if self.symbols.get(id).kind.is_callable() => {
                // Repeating a matching prototype is harmless.
                let existing = self.symbols.get(id).return_kind;
                self.check_signature(name, existing, return_kind, &kinds, span)
            }
            Some(_) => {
                let message = format!("'{}' redeclared as a different kind of symbol", name);
                self.report(DiagnosticSource::Declaration, message, span)
            }
            None => {
                self.symbols.declare_callable(
                    name,
                    SymbolKind::FunctionPrototype,
                    return_kind,
                    kinds.len() as u16,
                );
                self.signatures.insert(name.to_string(), kinds);
                Ok(())
            }
        }
    }

    /// Start the body of `name`. Parameters come from the parameter queue.
    pub fn declare_function(
        &mut self,
        name: &str,
        return_kind: ReturnKind,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if let Some(open) = &self.function {
            return Err(CompileError::internal(format!(
                "function '{}' started inside '{}'",
                name, open.name
            )));
        }

        let params = self.symbols.take_parameters();
        let params_ok = self.check_parameters(name, &params, span)?;
        let kinds: Vec<SymbolKind> = params.iter().map(|p| p.kind).collect();
        let ip = self.next_ip();

        let kind = if name == self.config.entry_point {
            if !params.is_empty() || return_kind != ReturnKind::Void {
                let message = format!(
                    "entry point '{}' must take no parameters and return void",
                    name
                );
                self.report(DiagnosticSource::Declaration, message, span)?;
            }
            SymbolKind::EntryPoint
        } else {
            SymbolKind::Function
        };

        let id = match self.symbols.find_in_scope(name, None) {
            Some(id) if self.symbols.get(id).kind == SymbolKind::FunctionPrototype => {
                let existing = self.symbols.get(id).return_kind;
                self.check_signature(name, existing, return_kind, &kinds, span)?;
                let symbol = self.symbols.get_mut(id);
                symbol.kind = kind;
                symbol.return_kind = return_kind;
                symbol.parameter = kinds.len() as u16;
                symbol.ip = Some(ip);
                Some(id)
            }
            Some(id) => {
                let message = if self.symbols.get(id).kind.is_callable() {
                    format!("function '{}' is already defined", name)
                } else {
                    format!("'{}' redeclared as a different kind of symbol", name)
                };
                self.report(DiagnosticSource::Declaration, message, span)?;
                None
            }
            None => {
                let id = self
                    .symbols
                    .declare_callable(name, kind, return_kind, kinds.len() as u16);
                self.symbols.get_mut(id).ip = Some(ip);
                Some(id)
            }
        };

        let scope = match id {
            Some(_) => name.to_string(),
            None => format!("{}#{}", name, ip),
        };
        if id.is_some() {
            self.signatures.insert(name.to_string(), kinds);
        }

        log::debug!("function '{}' starts at {:04}", name, ip);
        self.symbols.reset_frame();
        if params_ok {
            for (i, param) in params.iter().enumerate() {
                self.symbols
                    .declare_parameter(param.kind, &param.name, &scope, i as u16 + 1)?;
            }
        }

        self.function = Some(FunctionState {
            id,
            name: name.to_string(),
            scope,
            return_kind,
            gotos: Vec::new(),
        });
        Ok(())
    }

    /// Close the current function: trailing return, named gotos, frame size.
    pub fn end_function(&mut self, content: impl Into<String>) -> Result<(), CompileError> {
        let state = self
            .function
            .take()
            .ok_or_else(|| CompileError::internal("end of function without one open"))?;
        if !self.scopes.is_empty() {
            return Err(CompileError::internal(format!(
                "function '{}' ends with {} scope(s) open",
                state.name,
                self.scopes.depth()
            )));
        }

        let exit = self.emit(Op::Return { value: None }, content);

        for goto in state.gotos {
            let label = self
                .symbols
                .find_in_scope(&goto.label, Some(&state.scope))
                .map(|id| self.symbols.get(id))
                .filter(|s| s.kind == SymbolKind::Label)
                .and_then(|s| s.ip);

            match label {
                Some(target) => self.stream.resolve_label(goto.ip, target),
                None => {
                    self.stream.resolve_label(goto.ip, exit);
                    let message = format!("label '{}' is not defined", goto.label);
                    self.report(DiagnosticSource::Statement, message, goto.span)?;
                }
            }
        }

        let frame = self.symbols.reset_frame();
        if let Some(id) = state.id {
            self.symbols.get_mut(id).offset_or_size = frame;
        }
        log::debug!("function '{}' ends at {:04}, frame {} byte(s)", state.name, exit, frame);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Labels
    // -------------------------------------------------------------------------

    /// Bind `name` to the next ip inside the current function.
    pub fn declare_label(&mut self, name: &str, span: Option<Span>) -> Result<(), CompileError> {
        let Some(scope) = self.scope() else {
            let message = format!("label '{}' outside of a function", name);
            return self.report(DiagnosticSource::Statement, message, span);
        };
        if self.symbols.find_in_scope(name, Some(&scope)).is_some() {
            let message = format!("'{}' is already declared", name);
            return self.report(DiagnosticSource::Declaration, message, span);
        }

        let ip = self.next_ip();
        self.symbols.declare_symbol(
            Symbol::new(name, SymbolKind::Label)
                .with_expression(ExpressionKind::None)
                .with_ip(ip)
                .with_parent(Some(&scope)),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::diagnostic::DiagnosticSource;
    use crate::ir::Op;
    use crate::lang::{Expr, ReturnKind, SymbolKind};

    #[test]
    fn test_multi_name_declaration() {
        let mut c = Context::new();
        for name in ["a", "b", "c"] {
            c.queue_declaration(name, 0, None, None);
        }
        c.commit_declaration_queue(SymbolKind::Uint8, None).unwrap();

        for name in ["a", "b", "c"] {
            let id = c.find_by_name(name).unwrap();
            assert_eq!(c.symbols().get(id).kind, SymbolKind::Uint8);
        }
        assert!(c.diagnostics().is_empty());
        assert!(c.stream().is_empty());
    }

    #[test]
    fn test_initializer_is_emitted_at_commit() {
        let mut c = Context::new();
        c.queue_declaration("a", 0, Some(Expr::int(7)), None);
        c.queue_declaration("b", 0, None, None);
        c.commit_declaration_queue(SymbolKind::Uint16, None).unwrap();

        assert_eq!(c.stream().len(), 1);
        match &c.stream().get(0).unwrap().op {
            Op::Assign { dst, lhs, .. } => {
                assert_eq!(dst.value, "a");
                assert_eq!(lhs.value, "7");
            }
            other => panic!("unexpected op: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_variable() {
        let mut c = Context::new();
        c.queue_declaration("a", 0, None, None);
        c.commit_declaration_queue(SymbolKind::Uint8, None).unwrap();
        c.queue_declaration("a", 0, None, None);
        c.commit_declaration_queue(SymbolKind::Uint32, None).unwrap();

        assert_eq!(c.diagnostics().len(), 1);
        assert_eq!(c.diagnostics()[0].source, DiagnosticSource::Declaration);
    }

    #[test]
    fn test_bad_declaration_type_clears_queue() {
        let mut c = Context::new();
        c.queue_declaration("f", 0, None, None);
        c.commit_declaration_queue(SymbolKind::Label, None).unwrap();
        assert_eq!(c.diagnostics().len(), 1);
        assert!(c.symbols().declaration_queue().is_empty());
        assert!(c.find_by_name("f").is_none());
    }

    #[test]
    fn test_array_tag_is_not_a_declaration_type() {
        let mut c = Context::new();
        c.queue_declaration("xs", 4, None, None);
        c.commit_declaration_queue(SymbolKind::Array, None).unwrap();
        c.declare_static_variable(SymbolKind::Array, 4, "ys", None)
            .unwrap();

        assert_eq!(c.diagnostics().len(), 2);
        assert!(c.find_by_name("xs").is_none());
        assert!(c.find_by_name("ys").is_none());

        c.queue_declaration("xs", 4, None, None);
        c.commit_declaration_queue(SymbolKind::Uint16, None).unwrap();
        let id = c.find_by_name("xs").unwrap();
        assert_eq!(c.symbols().get(id).kind, SymbolKind::Uint16);
        assert!(c.symbols().get(id).is_array());
    }

    #[test]
    fn test_prototype_completed_by_definition() {
        let mut c = Context::new();
        c.queue_parameter(SymbolKind::Uint8, "x");
        c.declare_prototype("f", ReturnKind::Uint8, None).unwrap();
        assert_eq!(
            c.symbols().get(c.find_by_name("f").unwrap()).kind,
            SymbolKind::FunctionPrototype
        );

        c.queue_parameter(SymbolKind::Uint8, "x");
        c.declare_function("f", ReturnKind::Uint8, None).unwrap();
        c.end_function("}").unwrap();

        let matches: Vec<_> = c
            .symbols()
            .iter()
            .filter(|(_, s)| s.name == "f")
            .collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1.kind, SymbolKind::Function);
        assert_eq!(matches[0].1.ip, Some(0));
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn test_prototype_mismatch_is_reported() {
        let mut c = Context::new();
        c.queue_parameter(SymbolKind::Uint8, "x");
        c.declare_prototype("f", ReturnKind::Void, None).unwrap();
        c.queue_parameter(SymbolKind::Uint16, "x");
        c.declare_function("f", ReturnKind::Void, None).unwrap();
        c.end_function("}").unwrap();

        assert_eq!(c.diagnostics().len(), 1);
        assert!(c.diagnostics()[0].message.contains("conflicting"));
    }

    #[test]
    fn test_entry_point_signature() {
        let mut c = Context::new();
        c.queue_parameter(SymbolKind::Uint8, "argc");
        c.declare_function("Main", ReturnKind::Void, None).unwrap();
        c.end_function("}").unwrap();

        let id = c.find_by_name("Main").unwrap();
        assert_eq!(c.symbols().get(id).kind, SymbolKind::EntryPoint);
        assert_eq!(c.diagnostics().len(), 1);
    }

    #[test]
    fn test_parameters_and_frame_size() {
        let mut c = Context::new();
        c.queue_parameter(SymbolKind::Uint16, "a");
        c.queue_parameter(SymbolKind::Uint32, "b");
        c.declare_function("f", ReturnKind::Void, None).unwrap();
        c.queue_declaration("x", 0, None, None);
        c.commit_declaration_queue(SymbolKind::Uint8, None).unwrap();
        c.end_function("}").unwrap();

        let params = c.symbols().parameters_of("f");
        assert_eq!(params.len(), 2);
        assert_eq!(c.symbols().get(params[0]).name, "a");
        assert_eq!(c.symbols().get(params[1]).parameter, 2);
        assert_eq!(c.symbols().find_parameter("f", "b"), Some(params[1]));

        let f = c.symbols().find_function("f").unwrap();
        assert_eq!(c.symbols().get(f).offset_or_size, 7);
        assert_eq!(c.symbols().get(f).parameter, 2);
    }

    #[test]
    fn test_labels_and_named_goto() {
        let mut c = Context::new();
        c.declare_function("f", ReturnKind::Void, None).unwrap();
        c.goto_label("done", "goto done", None).unwrap();
        c.emit(
            Op::Return { value: None },
            "return",
        );
        c.declare_label("done", None).unwrap();
        c.goto_label("missing", "goto missing", None).unwrap();
        c.end_function("}").unwrap();

        assert_eq!(c.stream().get(0).unwrap().target, Some(2));
        assert_eq!(c.stream().get(2).unwrap().target, Some(3));
        assert_eq!(c.diagnostics().len(), 1);
        assert_eq!(c.diagnostics()[0].source, DiagnosticSource::Statement);
    }

    #[test]
    fn test_label_outside_function() {
        let mut c = Context::new();
        c.declare_label("l", None).unwrap();
        assert_eq!(c.diagnostics().len(), 1);
        assert!(c.find_by_name("l").is_none());
    }
}
