use super::backpatch::{BackpatchList, SwitchList};
use super::instruction::Ip;
use super::stream::InstructionStream;
use crate::diagnostic::CompileError;
use crate::lang::{Operand, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Loop,
    Switch,
    Block,
}

/// Dispatch state of an open switch statement.
#[derive(Debug)]
pub struct SwitchFrame {
    /// `None` when the selector expression was poisoned.
    pub selector: Option<Operand>,
    pub selector_temp: Option<SymbolId>,
    /// Jump from the switch head to the dispatch block.
    pub dispatch: BackpatchList,
    pub cases: SwitchList,
}

#[derive(Debug)]
pub struct ScopeFrame {
    pub kind: ScopeKind,
    pub depth: usize,
    breaks: BackpatchList,
    continues: BackpatchList,
    continue_target: Option<Ip>,
    pub switch: Option<SwitchFrame>,
}

/// Break/continue resolution for nested loops and switches.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn enter(&mut self, kind: ScopeKind) -> usize {
        let depth = self.frames.len();
        log::debug!("enter {:?} scope at depth {}", kind, depth);
        self.frames.push(ScopeFrame {
            kind,
            depth,
            breaks: BackpatchList::new(),
            continues: BackpatchList::new(),
            continue_target: None,
            switch: None,
        });
        depth
    }

    pub fn enter_switch(&mut self, switch: SwitchFrame) -> usize {
        let depth = self.enter(ScopeKind::Switch);
        self.frames[depth].switch = Some(switch);
        depth
    }

    fn break_frame(&mut self) -> Option<&mut ScopeFrame> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| matches!(f.kind, ScopeKind::Loop | ScopeKind::Switch))
    }

    fn continue_frame(&mut self) -> Option<&mut ScopeFrame> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.kind == ScopeKind::Loop)
    }

    pub fn can_break(&self) -> bool {
        self.frames
            .iter()
            .any(|f| matches!(f.kind, ScopeKind::Loop | ScopeKind::Switch))
    }

    pub fn can_continue(&self) -> bool {
        self.frames.iter().any(|f| f.kind == ScopeKind::Loop)
    }

    /// Attach a break to the nearest loop or switch. Hands the list back when
    /// there is none.
    pub fn add_pending_break(&mut self, list: BackpatchList) -> Result<usize, BackpatchList> {
        match self.break_frame() {
            Some(frame) => {
                frame.breaks.append(list);
                Ok(frame.depth)
            }
            None => Err(list),
        }
    }

    /// Attach a continue to the nearest loop. If that loop already knows where
    /// continues go, the list is patched right away.
    pub fn add_pending_continue(
        &mut self,
        list: BackpatchList,
        stream: &mut InstructionStream,
    ) -> Result<Result<usize, BackpatchList>, CompileError> {
        let Some(frame) = self.continue_frame() else {
            return Ok(Err(list));
        };
        match frame.continue_target {
            Some(target) => stream.patch(list, target)?,
            None => frame.continues.append(list),
        }
        Ok(Ok(frame.depth))
    }

    /// Fix where continues of the nearest loop go, resolving the ones already
    /// pending.
    pub fn set_continue_target(
        &mut self,
        target: Ip,
        stream: &mut InstructionStream,
    ) -> Result<(), CompileError> {
        let frame = self
            .continue_frame()
            .ok_or_else(|| CompileError::internal("continue target set outside of a loop"))?;
        frame.continue_target = Some(target);
        let pending = std::mem::take(&mut frame.continues);
        stream.patch(pending, target)
    }

    pub fn innermost_switch_mut(&mut self) -> Option<&mut SwitchFrame> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|f| f.switch.as_mut())
    }

    pub fn top_mut(&mut self) -> Option<&mut ScopeFrame> {
        self.frames.last_mut()
    }

    /// Pop the innermost frame, resolving its breaks (and for loops any
    /// continues still pending) to `resume`.
    pub fn exit(
        &mut self,
        kind: ScopeKind,
        resume: Ip,
        stream: &mut InstructionStream,
    ) -> Result<(), CompileError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| CompileError::internal(format!("exit of {:?} scope with none open", kind)))?;
        if frame.kind != kind {
            return Err(CompileError::internal(format!(
                "exit of {:?} scope while {:?} is innermost",
                kind, frame.kind
            )));
        }

        log::debug!(
            "exit {:?} scope at depth {}, {} break(s) -> {:04}",
            kind,
            frame.depth,
            frame.breaks.len(),
            resume
        );
        stream.patch(frame.breaks, resume)?;
        if frame.kind == ScopeKind::Loop {
            stream.patch(frame.continues, resume)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instruction::Op;

    #[test]
    fn test_break_without_scope_is_returned() {
        let mut stack = ScopeStack::new();
        stack.enter(ScopeKind::Block);
        let mut stream = InstructionStream::new();
        let list = stream.emit_with_backpatch(Op::Goto, "break");
        assert!(stack.add_pending_break(list).is_err());
    }

    #[test]
    fn test_continue_skips_switch() {
        let mut stack = ScopeStack::new();
        let mut stream = InstructionStream::new();
        stack.enter(ScopeKind::Loop);
        stack.enter_switch(SwitchFrame {
            selector: None,
            selector_temp: None,
            dispatch: BackpatchList::new(),
            cases: SwitchList::new(),
        });

        let brk = stream.emit_with_backpatch(Op::Goto, "break");
        assert_eq!(stack.add_pending_break(brk), Ok(1));

        let cont = stream.emit_with_backpatch(Op::Goto, "continue");
        assert_eq!(stack.add_pending_continue(cont, &mut stream).unwrap(), Ok(0));

        stack.exit(ScopeKind::Switch, 2, &mut stream).unwrap();
        assert_eq!(stream.get(0).unwrap().target, Some(2));
        assert_eq!(stream.get(1).unwrap().target, None);

        stack.exit(ScopeKind::Loop, 5, &mut stream).unwrap();
        assert_eq!(stream.get(1).unwrap().target, Some(5));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_known_continue_target_patches_immediately() {
        let mut stack = ScopeStack::new();
        let mut stream = InstructionStream::new();
        stack.enter(ScopeKind::Loop);
        let early = stream.emit_with_backpatch(Op::Goto, "continue");
        assert!(stack.add_pending_continue(early, &mut stream).unwrap().is_ok());

        stack.set_continue_target(0, &mut stream).unwrap();
        assert_eq!(stream.get(0).unwrap().target, Some(0));

        let late = stream.emit_with_backpatch(Op::Goto, "continue");
        assert!(stack.add_pending_continue(late, &mut stream).unwrap().is_ok());
        assert_eq!(stream.get(1).unwrap().target, Some(0));
    }

    #[test]
    fn test_exit_kind_mismatch_is_internal() {
        let mut stack = ScopeStack::new();
        let mut stream = InstructionStream::new();
        stack.enter(ScopeKind::Loop);
        assert!(stack.exit(ScopeKind::Switch, 0, &mut stream).is_err());
        assert!(stack.exit(ScopeKind::Loop, 0, &mut stream).is_err());
    }
}
