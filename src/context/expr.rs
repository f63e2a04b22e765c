use super::Context;
use crate::diagnostic::{CompileError, DiagnosticSource, Span};
use crate::ir::{AssignOp, BackpatchList, CompareOp, Ip, Op, merge_lists};
use crate::lang::kind::{can_implicitly_cast, largest_for_arithmetic};
use crate::lang::{Expr, Operand, SymbolId, SymbolKind};

/// Jumps taken when a boolean expression is true or false.
///
/// A poisoned comparison yields two empty lists.
#[derive(Debug, Default)]
pub struct Condition {
    pub true_list: BackpatchList,
    pub false_list: BackpatchList,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.true_list.is_empty() && self.false_list.is_empty()
    }
}

impl Context {
    fn poison(&mut self, exprs: &[&Expr]) -> Expr {
        for expr in exprs {
            self.release(expr);
        }
        Expr::Poisoned
    }

    fn temporary_operand(
        &mut self,
        kind: SymbolKind,
        span: Option<Span>,
    ) -> Result<Option<(SymbolId, Operand)>, CompileError> {
        let Some(id) = self.get_unused_temporary(kind, span)? else {
            return Ok(None);
        };
        let name = self.symbols.get(id).name.clone();
        Ok(Some((id, Operand::variable(name, kind))))
    }

    // -------------------------------------------------------------------------
    // Operands
    // -------------------------------------------------------------------------

    /// Read of a scalar variable.
    pub fn variable(&mut self, name: &str, span: Option<Span>) -> Result<Expr, CompileError> {
        let Some(id) = self.find_by_name(name) else {
            let message = format!("'{}' is not declared", name);
            self.report(DiagnosticSource::Expression, message, span)?;
            return Ok(Expr::Poisoned);
        };

        let symbol = self.symbols.get(id);
        if !symbol.kind.is_storage() {
            let message = format!("'{}' is not a variable", name);
            self.report(DiagnosticSource::Expression, message, span)?;
            return Ok(Expr::Poisoned);
        }
        if symbol.is_array() {
            let message = format!("array '{}' used without an index", name);
            self.report(DiagnosticSource::Expression, message, span)?;
            return Ok(Expr::Poisoned);
        }

        Ok(Expr::operand(Operand::variable(name, symbol.kind)))
    }

    /// Element `name[index]` of an array.
    pub fn indexed_variable(
        &mut self,
        name: &str,
        index: Expr,
        span: Option<Span>,
    ) -> Result<Expr, CompileError> {
        let Expr::Value { operand: index_op, temp } = &index else {
            return Ok(Expr::Poisoned);
        };

        let symbol = self.find_by_name(name).map(|id| self.symbols.get(id));
        let kind = match symbol {
            Some(s) if s.is_array() => s.kind,
            Some(_) => {
                let message = format!("'{}' is not an array", name);
                self.report(DiagnosticSource::Expression, message, span)?;
                return Ok(self.poison(&[&index]));
            }
            None => {
                let message = format!("'{}' is not declared", name);
                self.report(DiagnosticSource::Expression, message, span)?;
                return Ok(self.poison(&[&index]));
            }
        };
        if !index_op.kind.is_int() {
            let message = format!("index of '{}' must be an integer", name);
            self.report(DiagnosticSource::Expression, message, span)?;
            return Ok(self.poison(&[&index]));
        }

        // The index temporary stays alive for as long as the element is.
        Ok(Expr::Value {
            operand: Operand::variable(name, kind).indexed(index_op.clone()),
            temp: *temp,
        })
    }

    // -------------------------------------------------------------------------
    // Arithmetic
    // -------------------------------------------------------------------------

    /// `a <op> b` into a fresh temporary of the wider operand kind.
    pub fn binary(
        &mut self,
        op: AssignOp,
        a: Expr,
        b: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<Expr, CompileError> {
        if !op.is_binary() {
            return Err(CompileError::internal(format!("{:?} is not a binary operator", op)));
        }
        let (Some(lhs), Some(rhs)) = (a.as_operand(), b.as_operand()) else {
            return Ok(self.poison(&[&a, &b]));
        };
        if !lhs.kind.is_int() || !rhs.kind.is_int() {
            let message = format!(
                "operator '{}' requires integer operands, got '{}' and '{}'",
                op.symbol(),
                lhs.kind,
                rhs.kind
            );
            self.report(DiagnosticSource::Expression, message, span)?;
            return Ok(self.poison(&[&a, &b]));
        }

        let kind = largest_for_arithmetic(lhs.kind, rhs.kind);
        let (lhs, rhs) = (lhs.clone(), rhs.clone());
        self.release(&a);
        self.release(&b);

        let Some((temp, dst)) = self.temporary_operand(kind, span)? else {
            return Ok(Expr::Poisoned);
        };
        self.emit(
            Op::Assign {
                op,
                dst: dst.clone(),
                lhs,
                rhs: Some(rhs),
            },
            content,
        );
        Ok(Expr::Value {
            operand: dst,
            temp: Some(temp),
        })
    }

    pub fn negate(
        &mut self,
        a: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<Expr, CompileError> {
        let Some(value) = a.as_operand() else {
            return Ok(Expr::Poisoned);
        };
        if !value.kind.is_int() {
            let message = format!("cannot negate a value of type '{}'", value.kind);
            self.report(DiagnosticSource::Expression, message, span)?;
            return Ok(self.poison(&[&a]));
        }

        let value = value.clone();
        self.release(&a);
        let Some((temp, dst)) = self.temporary_operand(value.kind, span)? else {
            return Ok(Expr::Poisoned);
        };
        self.emit(
            Op::Assign {
                op: AssignOp::Negation,
                dst: dst.clone(),
                lhs: value,
                rhs: None,
            },
            content,
        );
        Ok(Expr::Value {
            operand: dst,
            temp: Some(temp),
        })
    }

    // -------------------------------------------------------------------------
    // Assignment
    // -------------------------------------------------------------------------

    /// `dst = value` after an implicit-cast check.
    pub(super) fn store(
        &mut self,
        dst: Operand,
        value: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        let Some(src) = value.as_operand() else {
            return Ok(());
        };
        if !can_implicitly_cast(dst.kind, src.kind, src.expression) {
            let message = format!(
                "cannot implicitly convert '{}' to '{}'",
                src.kind, dst.kind
            );
            self.report(DiagnosticSource::Expression, message, span)?;
            self.release(&value);
            return Ok(());
        }

        let src = src.clone();
        self.release(&value);
        self.emit(
            Op::Assign {
                op: AssignOp::None,
                dst,
                lhs: src,
                rhs: None,
            },
            content,
        );
        Ok(())
    }

    pub fn assign(
        &mut self,
        name: &str,
        value: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        match self.variable(name, span)? {
            Expr::Value { operand, .. } => self.store(operand, value, content, span),
            Expr::Poisoned => {
                self.release(&value);
                Ok(())
            }
        }
    }

    /// `name[index] = value`. `target` comes from [`Context::indexed_variable`].
    pub fn assign_element(
        &mut self,
        target: Expr,
        value: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        let Expr::Value { operand, temp } = target else {
            self.release(&value);
            return Ok(());
        };
        let result = self.store(operand, value, content, span);
        if let Some(temp) = temp {
            self.symbols.release_temporary(temp);
        }
        result
    }

    // -------------------------------------------------------------------------
    // Conditions
    // -------------------------------------------------------------------------

    /// `a <compare> b` as a pair of pending jumps.
    pub fn compare(
        &mut self,
        compare: CompareOp,
        a: Expr,
        b: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<Condition, CompileError> {
        let (Some(lhs), Some(rhs)) = (a.as_operand(), b.as_operand()) else {
            let _ = self.poison(&[&a, &b]);
            return Ok(Condition::default());
        };

        let valid = if compare.is_logical() {
            lhs.kind == SymbolKind::Bool && rhs.kind == SymbolKind::Bool
        } else if compare.is_equality() {
            (lhs.kind.is_int() && rhs.kind.is_int())
                || (lhs.kind == SymbolKind::Bool && rhs.kind == SymbolKind::Bool)
        } else {
            lhs.kind.is_int() && rhs.kind.is_int()
        };
        if !valid {
            let message = format!(
                "operator '{}' cannot compare '{}' with '{}'",
                compare.symbol(),
                lhs.kind,
                rhs.kind
            );
            self.report(DiagnosticSource::Expression, message, span)?;
            let _ = self.poison(&[&a, &b]);
            return Ok(Condition::default());
        }

        let (lhs, rhs) = (lhs.clone(), rhs.clone());
        self.release(&a);
        self.release(&b);

        let content = content.into();
        let true_list = self.emit_with_backpatch(Op::If { compare, lhs, rhs }, content.clone());
        let false_list = self.emit_goto_pending(content);
        Ok(Condition {
            true_list,
            false_list,
        })
    }

    /// Use a boolean value directly as a condition.
    pub fn truthy(
        &mut self,
        value: Expr,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<Condition, CompileError> {
        if !value.is_poisoned() && value.kind() != SymbolKind::Bool {
            let message = format!("condition must be 'bool', got '{}'", value.kind());
            self.report(DiagnosticSource::Expression, message, span)?;
            self.release(&value);
            return Ok(Condition::default());
        }
        self.compare(CompareOp::Equal, value, Expr::bool(true), content, span)
    }

    /// `left && right`; `right_start` is the first ip of the right operand.
    pub fn logical_and(
        &mut self,
        left: Condition,
        right_start: Ip,
        right: Condition,
    ) -> Result<Condition, CompileError> {
        self.patch(left.true_list, right_start)?;
        Ok(Condition {
            true_list: right.true_list,
            false_list: merge_lists(left.false_list, right.false_list),
        })
    }

    /// `left || right`; `right_start` is the first ip of the right operand.
    pub fn logical_or(
        &mut self,
        left: Condition,
        right_start: Ip,
        right: Condition,
    ) -> Result<Condition, CompileError> {
        self.patch(left.false_list, right_start)?;
        Ok(Condition {
            true_list: merge_lists(left.true_list, right.true_list),
            false_list: right.false_list,
        })
    }

    pub fn logical_not(&mut self, cond: Condition) -> Condition {
        Condition {
            true_list: cond.false_list,
            false_list: cond.true_list,
        }
    }

    /// Turn a condition into a `bool` temporary holding 1 or 0.
    pub fn materialize(
        &mut self,
        cond: Condition,
        content: impl Into<String>,
    ) -> Result<Expr, CompileError> {
        if cond.is_empty() {
            return Ok(Expr::Poisoned);
        }

        let content = content.into();
        let Some((temp, dst)) = self.temporary_operand(SymbolKind::Bool, None)? else {
            let end = self.next_ip();
            self.patch(merge_lists(cond.true_list, cond.false_list), end)?;
            return Ok(Expr::Poisoned);
        };
        let set = |value: bool| Op::Assign {
            op: AssignOp::None,
            dst: dst.clone(),
            lhs: Operand::bool(value),
            rhs: None,
        };

        let true_ip = self.emit(set(true), content.clone());
        let skip = self.emit_goto_pending(content.clone());
        let false_ip = self.emit(set(false), content);
        let end = self.next_ip();

        self.patch(cond.true_list, true_ip)?;
        self.patch(cond.false_list, false_ip)?;
        self.patch(skip, end)?;
        Ok(Expr::Value {
            operand: dst,
            temp: Some(temp),
        })
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    /// Validate a call and emit its argument pushes. `None` means the call
    /// was rejected and nothing was emitted.
    fn prepare_call(
        &mut self,
        name: &str,
        args: &[Expr],
        want_result: bool,
        span: Option<Span>,
    ) -> Result<Option<SymbolId>, CompileError> {
        let release_all = |ctx: &mut Context| {
            for arg in args {
                ctx.release(arg);
            }
        };

        let Some(id) = self.symbols.find_function(name) else {
            let message = format!("call to undeclared function '{}'", name);
            self.report(DiagnosticSource::Expression, message, span)?;
            release_all(self);
            return Ok(None);
        };
        if args.iter().any(Expr::is_poisoned) {
            release_all(self);
            return Ok(None);
        }

        let signature = self.signatures.get(name).cloned().unwrap_or_default();
        if signature.len() != args.len() {
            let message = format!(
                "function '{}' expects {} argument(s), got {}",
                name,
                signature.len(),
                args.len()
            );
            self.report(DiagnosticSource::Expression, message, span)?;
            release_all(self);
            return Ok(None);
        }

        let mut ok = true;
        for (i, (arg, kind)) in args.iter().zip(&signature).enumerate() {
            if !can_implicitly_cast(*kind, arg.kind(), arg.expression()) {
                let message = format!(
                    "argument {} of '{}' must be '{}', got '{}'",
                    i + 1,
                    name,
                    kind,
                    arg.kind()
                );
                self.report(DiagnosticSource::Expression, message, span)?;
                ok = false;
            }
        }

        if want_result && self.symbols.get(id).return_kind.value_kind().is_none() {
            let message = format!("function '{}' does not return a value", name);
            self.report(DiagnosticSource::Expression, message, span)?;
            ok = false;
        }

        if !ok {
            release_all(self);
            return Ok(None);
        }

        for arg in args {
            if let Some(value) = arg.as_operand() {
                self.emit(
                    Op::Push {
                        value: value.clone(),
                    },
                    format!("push {}", value),
                );
            }
        }
        release_all(self);
        self.called.insert(id);
        Ok(Some(id))
    }

    /// Call whose return value is used.
    pub fn call(
        &mut self,
        name: &str,
        args: Vec<Expr>,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<Expr, CompileError> {
        let Some(id) = self.prepare_call(name, &args, true, span)? else {
            return Ok(Expr::Poisoned);
        };

        let kind = self
            .symbols
            .get(id)
            .return_kind
            .value_kind()
            .ok_or_else(|| CompileError::internal(format!("'{}' has no return value", name)))?;
        let Some((temp, dst)) = self.temporary_operand(kind, span)? else {
            self.emit(
                Op::Call {
                    target: id,
                    result: None,
                },
                content,
            );
            return Ok(Expr::Poisoned);
        };
        self.emit(
            Op::Call {
                target: id,
                result: Some(dst.value.clone()),
            },
            content,
        );
        Ok(Expr::Value {
            operand: dst,
            temp: Some(temp),
        })
    }

    /// Call used as a statement; any return value is discarded.
    pub fn call_statement(
        &mut self,
        name: &str,
        args: Vec<Expr>,
        content: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if let Some(id) = self.prepare_call(name, &args, false, span)? {
            self.emit(
                Op::Call {
                    target: id,
                    result: None,
                },
                content,
            );
        }
        Ok(())
    }
}
