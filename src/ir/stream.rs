use super::backpatch::BackpatchList;
use super::instruction::{Instruction, Ip, Op};
use crate::diagnostic::CompileError;

/// Append-only instruction sequence. The ip of an instruction is its index.
#[derive(Debug, Default)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
}

impl InstructionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ip the next `emit` will hand out.
    pub fn next_ip(&self) -> Ip {
        self.instructions.len() as Ip
    }

    pub fn emit(&mut self, op: Op, content: impl Into<String>) -> Ip {
        let ip = self.next_ip();
        let content = content.into();
        log::debug!("emit {:04} {:?} ; {}", ip, op, content);
        self.instructions.push(Instruction {
            op,
            content,
            target: None,
        });
        ip
    }

    /// Emit a branch whose target is filled in later.
    pub fn emit_with_backpatch(&mut self, op: Op, content: impl Into<String>) -> BackpatchList {
        BackpatchList::single(self.emit(op, content))
    }

    /// Emit a branch to an already known ip, e.g. a loop-back edge.
    pub fn emit_to(&mut self, op: Op, target: Ip, content: impl Into<String>) -> Ip {
        let ip = self.emit(op, content);
        self.instructions[ip as usize].target = Some(target);
        ip
    }

    /// Resolve every branch in `list` to `target`.
    pub fn patch(&mut self, list: BackpatchList, target: Ip) -> Result<(), CompileError> {
        for ip in list.into_ips() {
            let instruction = self
                .instructions
                .get_mut(ip as usize)
                .ok_or_else(|| CompileError::internal(format!("patch of missing ip {}", ip)))?;

            if !instruction.op.is_branch() {
                return Err(CompileError::internal(format!(
                    "patch of non-branch instruction at {}",
                    ip
                )));
            }
            if let Some(existing) = instruction.target {
                return Err(CompileError::internal(format!(
                    "instruction {} already jumps to {}",
                    ip, existing
                )));
            }

            log::debug!("patch {:04} -> {:04}", ip, target);
            instruction.target = Some(target);
        }
        Ok(())
    }

    pub fn get(&self, ip: Ip) -> Option<&Instruction> {
        self.instructions.get(ip as usize)
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    /// Branches that still have no target.
    pub fn unresolved(&self) -> impl Iterator<Item = Ip> + '_ {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| i.op.is_branch() && i.target.is_none())
            .map(|(ip, _)| ip as Ip)
    }

    /// Branches whose target lies past the end of the stream.
    pub fn out_of_range(&self) -> impl Iterator<Item = Ip> + '_ {
        let len = self.next_ip();
        self.instructions
            .iter()
            .enumerate()
            .filter(move |(_, i)| i.target.is_some_and(|t| t >= len))
            .map(|(ip, _)| ip as Ip)
    }

    pub(crate) fn resolve_label(&mut self, ip: Ip, target: Ip) {
        if let Some(instruction) = self.instructions.get_mut(ip as usize) {
            instruction.target = Some(target);
        }
    }

    pub fn into_vec(self) -> Vec<Instruction> {
        self.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::backpatch::merge_lists;
    use crate::ir::instruction::{AssignOp, CompareOp};
    use crate::lang::{Operand, SymbolKind};

    fn copy(dst: &str, value: u32) -> Op {
        Op::Assign {
            op: AssignOp::None,
            dst: Operand::variable(dst, SymbolKind::Uint8),
            lhs: Operand::int(value),
            rhs: None,
        }
    }

    fn cond() -> Op {
        Op::If {
            compare: CompareOp::Greater,
            lhs: Operand::variable("a", SymbolKind::Uint8),
            rhs: Operand::int(1),
        }
    }

    #[test]
    fn test_ips_are_dense() {
        let mut s = InstructionStream::new();
        for n in 0..5 {
            assert_eq!(s.next_ip(), n);
            assert_eq!(s.emit(copy("a", n), "a = n"), n);
        }
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn test_patch_sets_every_target() {
        let mut s = InstructionStream::new();
        let a = s.emit_with_backpatch(cond(), "if a > 1");
        s.emit(copy("a", 0), "a = 0");
        let b = s.emit_with_backpatch(Op::Goto, "goto");
        let c = s.emit_with_backpatch(cond(), "if a > 1");

        let list = merge_lists(merge_lists(a, b), c);
        s.patch(list, 7).unwrap();

        assert_eq!(s.get(0).unwrap().target, Some(7));
        assert_eq!(s.get(1).unwrap().target, None);
        assert_eq!(s.get(2).unwrap().target, Some(7));
        assert_eq!(s.get(3).unwrap().target, Some(7));
        assert_eq!(s.unresolved().count(), 0);
    }

    #[test]
    fn test_merge_order_does_not_change_result() {
        let build = |swap: bool| {
            let mut s = InstructionStream::new();
            let a = s.emit_with_backpatch(Op::Goto, "goto");
            let b = s.emit_with_backpatch(Op::Goto, "goto");
            let list = if swap { merge_lists(b, a) } else { merge_lists(a, b) };
            s.patch(list, 2).unwrap();
            s.iter().map(|i| i.target).collect::<Vec<_>>()
        };
        assert_eq!(build(false), build(true));
    }

    #[test]
    fn test_double_patch_is_internal_error() {
        let mut s = InstructionStream::new();
        s.emit_to(Op::Goto, 0, "goto");
        let result = s.patch(BackpatchList::single(0), 1);
        assert!(matches!(result, Err(CompileError::Internal(_))));
    }

    #[test]
    fn test_patch_rejects_non_branch() {
        let mut s = InstructionStream::new();
        s.emit(copy("a", 1), "a = 1");
        assert!(s.patch(BackpatchList::single(0), 1).is_err());
    }

    #[test]
    fn test_if_else_targets() {
        let mut s = InstructionStream::new();
        let to_else = s.emit_with_backpatch(cond(), "if a > 1");
        s.emit(copy("a", 1), "a = 1");
        let skip_else = s.emit_with_backpatch(Op::Goto, "else");
        let else_start = s.next_ip();
        s.emit(copy("a", 2), "a = 2");
        let after = s.next_ip();

        s.patch(to_else, else_start).unwrap();
        s.patch(skip_else, after).unwrap();

        assert_eq!(s.get(0).unwrap().target, Some(3));
        assert_eq!(s.get(2).unwrap().target, Some(4));
        assert_ne!(s.get(0).unwrap().target, s.get(2).unwrap().target);
    }
}
