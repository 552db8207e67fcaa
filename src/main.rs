//! MxLang Compiler
//!
//! Checks a MxLang source file and lowers it to Mx IR.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};

use mxc::diagnostics::ErrorRecorder;
use mxc::driver::{compile, CompileOptions, Target};
use mxc::middle::ir_printer::print_module;
use mxc::utils::Error;

/// MxLang Compiler
#[derive(Parser, Debug)]
#[command(name = "mxc")]
#[command(version = "0.1.0")]
#[command(about = "MxLang compiler - semantic analysis and IR lowering")]
struct Cli {
    /// Input source file (.mx)
    #[arg(value_name = "FILE", required_unless_present = "stdin")]
    input: Option<PathBuf>,

    /// Read the source from standard input
    #[arg(long, conflicts_with = "input")]
    stdin: bool,

    /// Output file for the IR
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the IR to standard output
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Stop after semantic analysis instead of emitting Mx IR
    #[arg(long)]
    semantic: bool,

    /// Diagnostic output format
    #[arg(long, value_enum, default_value_t = ErrorFormat::Human)]
    error_format: ErrorFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ErrorFormat {
    Human,
    Json,
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() { 2 } else { 0 };
            process::exit(code);
        }
    };

    if let Err(e) = run(&cli) {
        let error = e.downcast_ref::<Error>();
        // The JSON report on stderr stays the only output for diagnostics
        let aborted = matches!(error, Some(Error::PhaseAborted { .. }));
        if !aborted || cli.error_format == ErrorFormat::Human {
            eprintln!("error: {:#}", e);
        }
        process::exit(error.map_or(2, Error::exit_code));
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let (source, file) = read_source(cli)?;
    let module_name = cli
        .input
        .as_ref()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();
    let options = CompileOptions {
        target: if cli.semantic { Target::Semantic } else { Target::Ir },
        module_name,
    };

    let mut recorder = ErrorRecorder::new(file.as_str());
    let result = compile(&source, &file, &options, &mut recorder);
    report(cli, &recorder);
    let output = result?;

    let Some(module) = output.module else {
        log::info!("{}: no errors found", file);
        return Ok(());
    };

    let text = print_module(&module);
    if cli.stdout {
        print!("{}", text);
        return Ok(());
    }
    let path = match (&cli.output, &cli.input) {
        (Some(path), _) => path.clone(),
        (None, Some(input)) => input.with_extension("ir"),
        (None, None) => {
            print!("{}", text);
            return Ok(());
        }
    };
    fs::write(&path, text).with_context(|| format!("cannot write {}", path.display()))?;
    log::info!("wrote IR to {}", path.display());
    Ok(())
}

fn read_source(cli: &Cli) -> anyhow::Result<(String, String)> {
    if cli.stdin {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("cannot read standard input")?;
        return Ok((source, "<stdin>".to_string()));
    }
    let Some(input) = &cli.input else {
        bail!("no input file specified");
    };
    let source = fs::read_to_string(input).with_context(|| format!("cannot read {}", input.display()))?;
    Ok((source, input.display().to_string()))
}

/// Write recorded diagnostics to stderr in the chosen format
fn report(cli: &Cli, recorder: &ErrorRecorder) {
    if recorder.diagnostics().is_empty() {
        return;
    }
    match cli.error_format {
        ErrorFormat::Human => eprint!("{}", recorder.render()),
        ErrorFormat::Json => eprintln!("{}", recorder.to_json()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_targets() {
        let cli = Cli::try_parse_from(["mxc", "a.mx"]).unwrap();
        assert!(!cli.semantic);
        let cli = Cli::try_parse_from(["mxc", "a.mx", "--semantic", "--error-format", "json"]).unwrap();
        assert!(cli.semantic);
        assert_eq!(cli.error_format, ErrorFormat::Json);
    }

    #[test]
    fn test_cli_rejects_unknown_flags() {
        assert!(Cli::try_parse_from(["mxc", "a.mx", "--emit-ir"]).is_err());
        assert!(Cli::try_parse_from(["mxc", "--stdin", "a.mx"]).is_err());
    }
}
