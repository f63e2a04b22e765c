use std::{env, fs};

use clx::ir::disasm::print_program;
use clx::{AssignOp, CompareOp, CompileError, Context, Expr, Program, ReturnKind, SymbolKind};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return;
    }

    let quiet = args.contains(&"--quiet".to_string());
    let image = args
        .iter()
        .position(|a| a == "--image")
        .map(|i| args.get(i + 1));

    let program = match build_sample() {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            std::process::exit(1);
        }
    };

    if !quiet {
        print_program(&program);
    }

    match image {
        Some(Some(path)) => write_image(&program, path),
        Some(None) => {
            eprintln!("Error: --image expects a path");
            std::process::exit(1);
        }
        None => {}
    }
}

fn print_usage() {
    println!("CLX - intermediate code generator demo");
    println!();
    println!("Usage:");
    println!("  clx                       Dump the sample program");
    println!("  clx --image <path>        Also write the encoded program image");
    println!("  clx --quiet               Skip the dump");
    println!("  clx --help, -h            Show this help");
}

fn write_image(program: &Program, path: &str) {
    let bytes = match program.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Encode error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = fs::write(path, &bytes) {
        eprintln!("Failed to write '{}': {}", path, e);
        std::process::exit(1);
    }
    println!("wrote {} byte(s) to {}", bytes.len(), path);
}

/// Drives the context the way a parser would for:
///
/// ```text
/// uint8 total;
///
/// uint8 twice(uint8 v) {
///     return v + v;
/// }
///
/// void Main() {
///     uint8 i;
///     while (i < 10) {
///         if (i == 5) {
///             total = twice(i);
///             break;
///         }
///         i = i + 1;
///     }
/// }
/// ```
fn build_sample() -> Result<Program, CompileError> {
    let mut c = Context::new();

    c.queue_declaration("total", 0, None, None);
    c.commit_declaration_queue(SymbolKind::Uint8, None)?;

    c.queue_parameter(SymbolKind::Uint8, "v");
    c.declare_function("twice", ReturnKind::Uint8, None)?;
    let a = c.variable("v", None)?;
    let b = c.variable("v", None)?;
    let sum = c.binary(AssignOp::Add, a, b, "v + v", None)?;
    c.emit_return(Some(sum), "return v + v", None)?;
    c.end_function("}")?;

    c.declare_function("Main", ReturnKind::Void, None)?;
    c.queue_declaration("i", 0, None, None);
    c.commit_declaration_queue(SymbolKind::Uint8, None)?;

    let head = c.enter_loop();
    c.set_continue_target(head)?;
    let i = c.variable("i", None)?;
    let cond = c.compare(CompareOp::Less, i, Expr::int(10), "while (i < 10)", None)?;
    let body = c.next_ip();
    c.patch(cond.true_list, body)?;

    let i = c.variable("i", None)?;
    let hit = c.compare(CompareOp::Equal, i, Expr::int(5), "if (i == 5)", None)?;
    let then = c.next_ip();
    c.patch(hit.true_list, then)?;
    let i = c.variable("i", None)?;
    let result = c.call("twice", vec![i], "twice(i)", None)?;
    c.assign("total", result, "total = twice(i)", None)?;
    c.emit_break("break", None)?;
    let after_if = c.next_ip();
    c.patch(hit.false_list, after_if)?;

    let i = c.variable("i", None)?;
    let next = c.binary(AssignOp::Add, i, Expr::int(1), "i + 1", None)?;
    c.assign("i", next, "i = i + 1", None)?;
    c.emit_goto(head, "while");
    let exit = c.next_ip();
    c.patch(cond.false_list, exit)?;
    c.exit_loop(exit)?;
    c.end_function("}")?;

    c.finish()
}
