use std::collections::BTreeSet;
use std::fmt::{self, Write};

use crate::ir::{AssignOp, Instruction, Ip, Op, Program};
use crate::lang::Symbol;

/// Print the symbol table and instruction stream of a program.
pub fn print_program(program: &Program) {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_program(&mut out, program);
    print!("{}", out);
}

pub fn write_program(out: &mut impl Write, program: &Program) -> fmt::Result {
    writeln!(out, "=== SYMBOL TABLE ===")?;
    writeln!(out)?;
    write_symbols(out, &program.symbols)?;
    writeln!(out)?;
    writeln!(
        out,
        "static storage: {} byte(s), {} slot(s)",
        program.layout.static_size,
        program.layout.order.len()
    )?;
    writeln!(out)?;

    writeln!(out, "=== INSTRUCTION STREAM ===")?;
    writeln!(out, " {} instructions", program.instructions.len())?;
    writeln!(out)?;
    write_instructions(out, program)?;

    if !program.diagnostics.is_empty() {
        writeln!(out)?;
        writeln!(out, "=== DIAGNOSTICS ===")?;
        for diagnostic in &program.diagnostics {
            writeln!(out, "{}", diagnostic)?;
        }
    }
    Ok(())
}

fn write_symbols(out: &mut impl Write, symbols: &[Symbol]) -> fmt::Result {
    writeln!(
        out,
        "{:<16} {:<8} {:<7} {:<6} {:>5} {:>8} {:>5}  {:<12} {}",
        "Name", "Kind", "Return", "Expr", "Ip", "Offset", "Param", "Parent", "Temp"
    )?;

    for s in symbols {
        let ip = s.ip.map(|ip| format!("{:04}", ip)).unwrap_or_else(|| "-".into());
        writeln!(
            out,
            "{:<16} {:<8} {:<7} {:<6} {:>5} {:>8} {:>5}  {:<12} {}",
            s.name,
            s.kind,
            s.return_kind,
            s.expression,
            ip,
            s.offset_or_size,
            s.parameter,
            s.parent.as_deref().unwrap_or("-"),
            if s.temporary { "yes" } else { "" }
        )?;
    }
    Ok(())
}

fn write_instructions(out: &mut impl Write, program: &Program) -> fmt::Result {
    let jump_targets = collect_jump_targets(&program.instructions);

    for (ip, instruction) in program.instructions.iter().enumerate() {
        if jump_targets.contains(&(ip as Ip)) {
            writeln!(out, "      ┌──────────────────────────────────")?;
            write!(out, "{:04} ► ", ip)?;
        } else {
            write!(out, "{:04}   ", ip)?;
        }

        write!(out, "{:<36}", format_instruction(instruction, program))?;
        writeln!(out, " ; {}", instruction.content)?;
    }
    Ok(())
}

fn collect_jump_targets(instructions: &[Instruction]) -> BTreeSet<Ip> {
    instructions
        .iter()
        .filter(|i| i.op.is_branch())
        .filter_map(|i| i.target)
        .collect()
}

fn format_target(target: Option<Ip>) -> String {
    match target {
        Some(ip) => format!("{:04}", ip),
        None => "????".to_string(),
    }
}

fn format_instruction(instruction: &Instruction, program: &Program) -> String {
    let target = format_target(instruction.target);

    match &instruction.op {
        Op::Assign { op, dst, lhs, rhs } => match (op, rhs) {
            (AssignOp::None, _) => format!("{} = {}", dst, lhs),
            (AssignOp::Negation, _) => format!("{} = -{}", dst, lhs),
            (op, Some(rhs)) => format!("{} = {} {} {}", dst, lhs, op.symbol(), rhs),
            (op, None) => format!("{} = {} {} ?", dst, lhs, op.symbol()),
        },
        Op::Goto => format!("GOTO {}", target),
        Op::GotoLabel { label } => format!("GOTO {} ({})", label, target),
        Op::If { compare, lhs, rhs } => {
            format!("IF {} {} {} GOTO {}", lhs, compare.symbol(), rhs, target)
        }
        Op::Push { value } => format!("PUSH {}", value),
        Op::Call {
            target: callee,
            result,
        } => {
            let name = &program.symbol(*callee).name;
            match result {
                Some(result) => format!("{} = CALL {}", result, name),
                None => format!("CALL {}", name),
            }
        }
        Op::Return { value: Some(value) } => format!("RETURN {}", value),
        Op::Return { value: None } => "RETURN".to_string(),
    }
}
