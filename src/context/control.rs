use super::{Context, PendingGoto};
use crate::diagnostic::{CompileError, DiagnosticSource, Span};
use crate::ir::scope::SwitchFrame;
use crate::ir::{CompareOp, Ip, Op, ScopeKind, SwitchCase, SwitchList};
use crate::lang::kind::can_implicitly_cast;
use crate::lang::{Expr, Operand, ReturnKind, SymbolKind};

impl Context {
    // -------------------------------------------------------------------------
    // Return and named gotos
    // -------------------------------------------------------------------------

    pub fn emit_return(
        &mut self,
        value: Option<Expr>,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        let Some(function) = &self.function else {
            if let Some(value) = &value {
                self.release(value);
            }
            return self.report(
                DiagnosticSource::Statement,
                "return statement outside of a function",
                span,
            );
        };
        let (name, return_kind) = (function.name.clone(), function.return_kind);

        let operand = match (&value, return_kind) {
            (Some(Expr::Poisoned), _) => return Ok(()),
            (Some(_), ReturnKind::Void) => {
                let message = format!("void function '{}' cannot return a value", name);
                self.report(DiagnosticSource::Statement, message, span)?;
                None
            }
            (None, ReturnKind::Void) => Some(None),
            (None, _) => {
                let message = format!("function '{}' must return a value", name);
                self.report(DiagnosticSource::Statement, message, span)?;
                None
            }
            (Some(Expr::Value { operand, .. }), kind) => {
                let expected = kind.value_kind().unwrap_or(SymbolKind::Unknown);
                if can_implicitly_cast(expected, operand.kind, operand.expression) {
                    Some(Some(operand.clone()))
                } else {
                    let message = format!(
                        "cannot return '{}' from function '{}' returning '{}'",
                        operand.kind, name, kind
                    );
                    self.report(DiagnosticSource::Statement, message, span)?;
                    None
                }
            }
        };

        if let Some(value) = &value {
            self.release(value);
        }
        if let Some(operand) = operand {
            self.emit(Op::Return { value: operand }, content);
        }
        Ok(())
    }

    /// `goto name;` resolved against the function's labels when it ends.
    pub fn goto_label(
        &mut self,
        label: &str,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if self.function.is_none() {
            let message = format!("goto '{}' outside of a function", label);
            return self.report(DiagnosticSource::Statement, message, span);
        }

        let ip = self.emit(
            Op::GotoLabel {
                label: label.to_string(),
            },
            content,
        );
        if let Some(function) = self.function.as_mut() {
            function.gotos.push(PendingGoto {
                ip,
                label: label.to_string(),
                span,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Loops
    // -------------------------------------------------------------------------

    /// Open a loop scope. Returns the ip of the loop head.
    pub fn enter_loop(&mut self) -> Ip {
        self.scopes.enter(ScopeKind::Loop);
        self.next_ip()
    }

    /// Where `continue` in the innermost loop jumps to.
    pub fn set_continue_target(&mut self, target: Ip) -> Result<(), CompileError> {
        self.scopes.set_continue_target(target, &mut self.stream)
    }

    /// Close the innermost loop; breaks resume at `resume`.
    pub fn exit_loop(&mut self, resume: Ip) -> Result<(), CompileError> {
        self.scopes.exit(ScopeKind::Loop, resume, &mut self.stream)
    }

    pub fn emit_break(
        &mut self,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if !self.scopes.can_break() {
            return self.report(
                DiagnosticSource::Statement,
                "break statement outside of loop or switch",
                span,
            );
        }

        let list = self.emit_goto_pending(content);
        match self.scopes.add_pending_break(list) {
            Ok(_) => Ok(()),
            Err(_) => Err(CompileError::internal("break lost its scope")),
        }
    }

    pub fn emit_continue(
        &mut self,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if !self.scopes.can_continue() {
            return self.report(
                DiagnosticSource::Statement,
                "continue statement outside of loop",
                span,
            );
        }

        let list = self.emit_goto_pending(content);
        match self.scopes.add_pending_continue(list, &mut self.stream)? {
            Ok(_) => Ok(()),
            Err(_) => Err(CompileError::internal("continue lost its scope")),
        }
    }

    // -------------------------------------------------------------------------
    // Switch
    // -------------------------------------------------------------------------

    /// Open a switch over `selector`. The dispatch block is emitted by
    /// [`Context::end_switch`].
    pub fn begin_switch(
        &mut self,
        selector: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        let selector_temp = selector.temp();
        let operand = match selector.as_operand() {
            Some(operand) if operand.kind.is_int() => Some(operand.clone()),
            Some(operand) => {
                let message = format!("switch selector must be an integer, got '{}'", operand.kind);
                self.report(DiagnosticSource::Statement, message, span)?;
                self.release(&selector);
                None
            }
            None => None,
        };

        let dispatch = self.emit_goto_pending(content);
        self.scopes.enter_switch(SwitchFrame {
            selector_temp: operand.as_ref().and(selector_temp),
            selector: operand,
            dispatch,
            cases: SwitchList::new(),
        });
        Ok(())
    }

    /// `case value:` of the innermost switch; the arm starts at the next ip.
    pub fn add_case(&mut self, value: u32, span: Option<Span>) -> Result<(), CompileError> {
        let source_ip = self.next_ip();
        let kind = SymbolKind::for_literal(value);
        let text = value.to_string();

        let Some(switch) = self.scopes.innermost_switch_mut() else {
            return self.report(
                DiagnosticSource::Statement,
                "case label outside of switch",
                span,
            );
        };

        let problem = if switch.cases.find_value(&text).is_some() {
            Some(format!("duplicate case value {}", text))
        } else {
            match &switch.selector {
                Some(sel) if kind.rank() > sel.kind.rank() => Some(format!(
                    "case value {} does not fit switch type '{}'",
                    text, sel.kind
                )),
                _ => None,
            }
        };

        if problem.is_none() {
            switch.cases.push(SwitchCase {
                source_ip,
                is_default: false,
                value: Some(text),
                kind,
                line: span.map_or(0, |s| s.line),
            });
        }

        match problem {
            Some(message) => self.report(DiagnosticSource::Statement, message, span),
            None => Ok(()),
        }
    }

    pub fn add_default(&mut self, span: Option<Span>) -> Result<(), CompileError> {
        let source_ip = self.next_ip();

        let Some(switch) = self.scopes.innermost_switch_mut() else {
            return self.report(
                DiagnosticSource::Statement,
                "default label outside of switch",
                span,
            );
        };

        if let Some(previous) = switch.cases.default_case() {
            let message = format!(
                "multiple default labels in one switch (first on line {})",
                previous.line
            );
            return self.report(DiagnosticSource::Statement, message, span);
        }

        switch.cases.push(SwitchCase {
            source_ip,
            is_default: true,
            value: None,
            kind: SymbolKind::Unknown,
            line: span.map_or(0, |s| s.line),
        });
        Ok(())
    }

    /// Close the innermost switch: leave the last arm, emit the dispatch
    /// block, and resolve every break past it.
    pub fn end_switch(&mut self, content: impl Into<String>) -> Result<(), CompileError> {
        let content = content.into();
        let switch = self
            .scopes
            .top_mut()
            .filter(|frame| frame.kind == ScopeKind::Switch)
            .and_then(|frame| frame.switch.take())
            .ok_or_else(|| CompileError::internal("end of switch without one open"))?;

        let leave = self.emit_goto_pending(content.clone());
        if self.scopes.add_pending_break(leave).is_err() {
            return Err(CompileError::internal("switch frame vanished"));
        }

        let dispatch_start = self.next_ip();
        self.patch(switch.dispatch, dispatch_start)?;

        if let Some(selector) = &switch.selector {
            for case in switch.cases.valued() {
                let value = case.value.clone().unwrap_or_default();
                self.stream.emit_to(
                    Op::If {
                        compare: CompareOp::Equal,
                        lhs: selector.clone(),
                        rhs: Operand::constant(value, selector.kind),
                    },
                    case.source_ip,
                    content.clone(),
                );
            }
        }
        if let Some(default) = switch.cases.default_case() {
            self.stream.emit_to(Op::Goto, default.source_ip, content);
        }

        if let Some(temp) = switch.selector_temp {
            self.symbols.release_temporary(temp);
        }
        let resume = self.next_ip();
        self.scopes.exit(ScopeKind::Switch, resume, &mut self.stream)
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::diagnostic::{DiagnosticSource, Span};
    use crate::ir::{AssignOp, CompareOp, Op, ScopeKind};
    use crate::lang::{Expr, Operand, ReturnKind, SymbolKind};

    fn uint8(c: &mut Context, name: &str) {
        c.queue_declaration(name, 0, None, None);
        c.commit_declaration_queue(SymbolKind::Uint8, None).unwrap();
    }

    fn bump(c: &mut Context, name: &str) {
        let v = c.variable(name, None).unwrap();
        let sum = c.binary(AssignOp::Add, v, Expr::int(1), "+ 1", None).unwrap();
        c.assign(name, sum, "x = x + 1", None).unwrap();
    }

    #[test]
    fn test_break_outside_loop() {
        let mut c = Context::new();
        c.emit_break("break", Some(Span::new(4, 9))).unwrap();

        assert_eq!(c.diagnostics().len(), 1);
        assert_eq!(c.diagnostics()[0].source, DiagnosticSource::Statement);
        assert_eq!(c.diagnostics()[0].span, Some(Span::new(4, 9)));
        assert_eq!(c.next_ip(), 0);
    }

    #[test]
    fn test_continue_inside_switch_only() {
        let mut c = Context::new();
        c.begin_switch(Expr::int(1), "switch", None).unwrap();
        c.emit_continue("continue", None).unwrap();
        c.end_switch("}").unwrap();
        assert_eq!(c.diagnostics().len(), 1);
    }

    #[test]
    fn test_while_loop_with_break_and_continue() {
        let mut c = Context::new();
        uint8(&mut c, "i");

        // while (i < 10) { if (i == 5) break; i = i + 1; continue; }
        let head = c.enter_loop();
        c.set_continue_target(head).unwrap();
        let i = c.variable("i", None).unwrap();
        let cond = c
            .compare(CompareOp::Less, i, Expr::int(10), "i < 10", None)
            .unwrap();
        let body = c.next_ip();
        c.patch(cond.true_list, body).unwrap();

        let i = c.variable("i", None).unwrap();
        let eq = c
            .compare(CompareOp::Equal, i, Expr::int(5), "i == 5", None)
            .unwrap();
        let then = c.next_ip();
        c.patch(eq.true_list, then).unwrap();
        c.emit_break("break", None).unwrap();
        let after_if = c.next_ip();
        c.patch(eq.false_list, after_if).unwrap();

        bump(&mut c, "i");
        c.emit_continue("continue", None).unwrap();
        c.emit_goto(head, "loop");
        let exit = c.next_ip();
        c.patch(cond.false_list, exit).unwrap();
        c.exit_loop(exit).unwrap();

        // 0 if, 1 goto, 2 if, 3 goto, 4 break, 5 add, 6 assign, 7 continue, 8 loop
        assert_eq!(c.stream().get(1).unwrap().target, Some(9));
        assert_eq!(c.stream().get(4).unwrap().target, Some(9));
        assert_eq!(c.stream().get(7).unwrap().target, Some(0));
        assert_eq!(c.stream().get(8).unwrap().target, Some(0));
        assert_eq!(c.stream().unresolved().count(), 0);
        assert_eq!(c.scope_depth(), 0);
    }

    #[test]
    fn test_for_loop_continue_resolved_late() {
        let mut c = Context::new();
        uint8(&mut c, "i");

        c.enter_loop();
        c.emit_continue("continue", None).unwrap();
        let step = c.next_ip();
        bump(&mut c, "i");
        c.set_continue_target(step).unwrap();
        c.emit_goto(0, "loop");
        c.exit_loop(c.next_ip()).unwrap();

        assert_eq!(c.stream().get(0).unwrap().target, Some(1));
    }

    #[test]
    fn test_nested_loops_break_innermost() {
        let mut c = Context::new();
        c.enter_loop();
        c.enter_loop();
        c.emit_break("inner break", None).unwrap();
        c.exit_loop(1).unwrap();
        c.emit_break("outer break", None).unwrap();
        c.exit_loop(2).unwrap();

        assert_eq!(c.stream().get(0).unwrap().target, Some(1));
        assert_eq!(c.stream().get(1).unwrap().target, Some(2));
    }

    #[test]
    fn test_block_scope_is_transparent_to_break() {
        let mut c = Context::new();
        c.enter_loop();
        c.enter_scope(ScopeKind::Block);
        c.emit_break("break", None).unwrap();
        c.exit_scope(ScopeKind::Block, 1).unwrap();
        c.exit_loop(1).unwrap();
        assert_eq!(c.stream().get(0).unwrap().target, Some(1));
    }

    #[test]
    fn test_switch_dispatch() {
        let mut c = Context::new();
        uint8(&mut c, "x");
        uint8(&mut c, "y");

        let x = c.variable("x", None).unwrap();
        c.begin_switch(x, "switch (x)", None).unwrap();
        c.add_case(1, Some(Span::new(2, 1))).unwrap();
        c.assign("y", Expr::int(10), "y = 10", None).unwrap();
        c.emit_break("break", None).unwrap();
        c.add_case(2, Some(Span::new(4, 1))).unwrap();
        c.add_default(Some(Span::new(5, 1))).unwrap();
        c.assign("y", Expr::int(20), "y = 20", None).unwrap();
        c.end_switch("}").unwrap();

        // 0 goto dispatch, 1 y=10, 2 break, 3 y=20, 4 leave,
        // 5 if x==1, 6 if x==2, 7 goto default
        let s = c.stream();
        assert_eq!(s.len(), 8);
        assert_eq!(s.get(0).unwrap().target, Some(5));
        assert_eq!(s.get(2).unwrap().target, Some(8));
        assert_eq!(s.get(4).unwrap().target, Some(8));
        assert_eq!(s.get(5).unwrap().target, Some(1));
        assert_eq!(s.get(6).unwrap().target, Some(3));
        assert_eq!(s.get(7).unwrap().target, Some(3));
        match &s.get(6).unwrap().op {
            Op::If { compare, lhs, rhs } => {
                assert_eq!(*compare, CompareOp::Equal);
                assert_eq!(lhs, &Operand::variable("x", SymbolKind::Uint8));
                assert_eq!(rhs.value, "2");
            }
            other => panic!("unexpected op: {:?}", other),
        }
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn test_switch_case_errors() {
        let mut c = Context::new();
        uint8(&mut c, "x");
        let x = c.variable("x", None).unwrap();
        c.begin_switch(x, "switch (x)", None).unwrap();
        c.add_case(1, None).unwrap();
        c.add_case(1, None).unwrap();
        c.add_case(300, None).unwrap();
        c.add_default(Some(Span::new(7, 3))).unwrap();
        c.add_default(None).unwrap();
        c.end_switch("}").unwrap();

        assert_eq!(c.diagnostics().len(), 3);
        assert!(c.diagnostics()[2].message.contains("line 7"));
        assert_eq!(c.stream().unresolved().count(), 0);
    }

    #[test]
    fn test_case_outside_switch() {
        let mut c = Context::new();
        c.add_case(1, None).unwrap();
        c.add_default(None).unwrap();
        assert_eq!(c.diagnostics().len(), 2);
        assert!(c.stream().is_empty());
    }

    #[test]
    fn test_return_checks_function_kind() {
        let mut c = Context::new();
        c.declare_function("f", ReturnKind::Uint8, None).unwrap();
        c.emit_return(Some(Expr::int(1)), "return 1", None).unwrap();
        c.emit_return(None, "return", None).unwrap();
        c.emit_return(Some(Expr::string("no")), "return \"no\"", None)
            .unwrap();
        c.end_function("}").unwrap();

        c.declare_function("g", ReturnKind::Void, None).unwrap();
        c.emit_return(Some(Expr::int(1)), "return 1", None).unwrap();
        c.emit_return(None, "return", None).unwrap();
        c.end_function("}").unwrap();

        assert_eq!(c.diagnostics().len(), 3);
        let returns = c
            .stream()
            .iter()
            .filter(|i| matches!(i.op, Op::Return { .. }))
            .count();
        // two accepted returns plus one trailing return per function
        assert_eq!(returns, 4);
    }
}
