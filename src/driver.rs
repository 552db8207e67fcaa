//! Compilation pipeline
//!
//! Runs the phases of one compilation unit in order and stops at the first
//! phase whose checkpoint reports errors.

use crate::diagnostics::{ErrorRecorder, Phase};
use crate::frontend::parser::parse_source;
use crate::frontend::semantic::{analyze, Analysis};
use crate::middle::ir::IRModule;
use crate::middle::ir_gen::lower;
use crate::utils::Result;

/// Last stage to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Stop after semantic analysis
    Semantic,
    #[default]
    Ir,
}

/// Resolved settings for one compilation
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub target: Target,
    /// Name of the produced IR module
    pub module_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: Target::default(),
            module_name: "module".to_string(),
        }
    }
}

/// Result of a successful compilation
#[derive(Debug)]
pub struct Output {
    pub analysis: Analysis,
    /// `None` when the target is `Semantic`
    pub module: Option<IRModule>,
}

/// Compile `source`, recording diagnostics against `file`
pub fn compile(source: &str, file: &str, options: &CompileOptions, recorder: &mut ErrorRecorder) -> Result<Output> {
    recorder.reset(file);

    log::info!("compiling {}", file);
    let mut program = parse_source(source, recorder);
    recorder.checkpoint(Phase::Parser)?;
    recorder.checkpoint(Phase::AstBuild)?;
    log::debug!("parsed {} declaration(s)", program.decls.len());

    let analysis = analyze(&mut program, recorder);
    recorder.checkpoint(Phase::Semantic)?;
    log::debug!("semantic analysis passed ({} symbols)", analysis.symbols.len());

    if options.target == Target::Semantic {
        return Ok(Output { analysis, module: None });
    }

    let module = lower(&options.module_name, &program, &analysis)?;
    log::info!("generated IR ({} functions)", module.functions.len());
    Ok(Output { analysis, module: Some(module) })
}
