//! The `boxc` command-line interface: compile a Box source file and
//! optionally dump the installed procedures.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "boxc", version, about = "Compiler for the Box language")]
struct Args {
    /// Source file to compile.
    file: PathBuf,

    /// Print the disassembly of every installed procedure.
    #[arg(long)]
    disasm: bool,

    /// Dump the parse tree instead of compiling.
    #[arg(long)]
    dump_ast: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if args.dump_ast {
        let source = std::fs::read_to_string(&args.file)?;
        match boxc_parser::parse(&source) {
            Ok(program) => {
                print!("{}", program);
                return Ok(());
            }
            Err(e) => bail!("{}: {}", args.file.display(), e),
        }
    }

    match boxc_compiler::compile_file(&args.file) {
        Ok(compiled) => {
            for diag in &compiled.diags {
                eprintln!("{}", diag);
            }
            println!(
                "compiled {} -> {} ({} procedure slots)",
                args.file.display(),
                compiled.main,
                compiled.vm.call_nums().count()
            );
            if args.disasm {
                print!("{}", compiled.vm.disasm_all());
            }
            Ok(())
        }
        Err(boxc_compiler::CompileError::Insane { diags }) => {
            for diag in &diags {
                eprintln!("{}", diag);
            }
            bail!("{}: compilation failed", args.file.display());
        }
        Err(e) => bail!("{}: {}", args.file.display(), e),
    }
}
