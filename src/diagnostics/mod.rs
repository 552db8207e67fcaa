//! Diagnostic collection
//!
//! Every user-facing problem found while compiling a unit is recorded here,
//! keyed by the phase that found it. The driver asks for a checkpoint after
//! each phase and stops the pipeline when that phase recorded errors.

use std::fmt;

use serde::Serialize;

use crate::utils::{Error, Location, Result};

// ==================== Diagnostic ====================

/// Compilation phase a diagnostic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parser,
    AstBuild,
    Semantic,
}

impl Phase {
    const ALL: [Phase; 3] = [Phase::Parser, Phase::AstBuild, Phase::Semantic];

    fn index(self) -> usize {
        match self {
            Phase::Parser => 0,
            Phase::AstBuild => 1,
            Phase::Semantic => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Parser => "parsing",
            Phase::AstBuild => "syntax tree construction",
            Phase::Semantic => "semantic analysis",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Marker printed between the location and the message
    pub fn marker(&self) -> &'static str {
        match self {
            Severity::Error => "error:",
            Severity::Warning => "warning:",
        }
    }
}

/// A single recorded problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub phase: Phase,
    pub severity: Severity,
    pub file: String,
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.location.in_file(&self.file),
            self.severity.marker(),
            self.message
        )
    }
}

// ==================== Error Recorder ====================

/// Accumulates diagnostics for one compilation unit
#[derive(Debug, Clone)]
pub struct ErrorRecorder {
    file: String,
    diagnostics: Vec<Diagnostic>,
    error_counts: [usize; 3],
}

impl ErrorRecorder {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            diagnostics: Vec::new(),
            error_counts: [0; 3],
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Record an error. Never fails.
    pub fn record(&mut self, phase: Phase, location: Location, message: impl Into<String>) {
        self.push(phase, Severity::Error, location, message.into());
        self.error_counts[phase.index()] += 1;
    }

    /// Record a warning; warnings do not stop the pipeline
    pub fn warn(&mut self, phase: Phase, location: Location, message: impl Into<String>) {
        self.push(phase, Severity::Warning, location, message.into());
    }

    fn push(&mut self, phase: Phase, severity: Severity, location: Location, message: String) {
        log::debug!("{:?} {:?} at {}: {}", phase, severity, location, message);
        self.diagnostics.push(Diagnostic {
            phase,
            severity,
            file: self.file.clone(),
            location,
            message,
        });
    }

    /// Number of errors recorded during `phase`
    pub fn error_count(&self, phase: Phase) -> usize {
        self.error_counts[phase.index()]
    }

    pub fn total_errors(&self) -> usize {
        Phase::ALL.iter().map(|&p| self.error_count(p)).sum()
    }

    /// Abort signal for the driver when `phase` recorded any error
    pub fn checkpoint(&self, phase: Phase) -> Result<()> {
        match self.error_count(phase) {
            0 => Ok(()),
            count => Err(Error::PhaseAborted { phase, count }),
        }
    }

    /// Forget everything; used at the start of a new compilation unit
    pub fn reset(&mut self, file: impl Into<String>) {
        self.file = file.into();
        self.diagnostics.clear();
        self.error_counts = [0; 3];
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics of one phase, in recording order
    pub fn diagnostics_of(&self, phase: Phase) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.phase == phase)
    }

    /// One line per diagnostic, in recording order
    pub fn render(&self) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            out.push_str(&diag.to_string());
            out.push('\n');
        }
        out
    }

    /// Machine-readable report
    pub fn to_json(&self) -> String {
        let report = Report {
            file: &self.file,
            errors: self.total_errors(),
            diagnostics: &self.diagnostics,
        };
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Serialize)]
struct Report<'a> {
    file: &'a str,
    errors: usize,
    diagnostics: &'a [Diagnostic],
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_format() {
        let mut recorder = ErrorRecorder::new("a.mx");
        recorder.record(Phase::Semantic, Location::new(2, 5), "\"x\" cannot be resolved as a variable");
        recorder.warn(Phase::AstBuild, Location::new(7, 1), "unused value");

        assert_eq!(
            recorder.render(),
            "a.mx:2:5 error: \"x\" cannot be resolved as a variable\n\
             a.mx:7:1 warning: unused value\n"
        );
    }

    #[test]
    fn test_counters_are_per_phase() {
        let mut recorder = ErrorRecorder::new("a.mx");
        recorder.record(Phase::Parser, Location::new(1, 1), "expected \";\"");
        recorder.record(Phase::Semantic, Location::new(3, 1), "bad");
        recorder.record(Phase::Semantic, Location::new(4, 1), "worse");

        assert_eq!(recorder.error_count(Phase::Parser), 1);
        assert_eq!(recorder.error_count(Phase::AstBuild), 0);
        assert_eq!(recorder.error_count(Phase::Semantic), 2);
        assert_eq!(recorder.total_errors(), 3);
    }

    #[test]
    fn test_checkpoint() {
        let mut recorder = ErrorRecorder::new("a.mx");
        recorder.warn(Phase::Semantic, Location::new(1, 1), "just a warning");
        assert_eq!(recorder.checkpoint(Phase::Semantic), Ok(()));

        recorder.record(Phase::Semantic, Location::new(1, 1), "an error");
        assert_eq!(
            recorder.checkpoint(Phase::Semantic),
            Err(Error::PhaseAborted { phase: Phase::Semantic, count: 1 })
        );
        assert_eq!(recorder.checkpoint(Phase::Parser), Ok(()));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut recorder = ErrorRecorder::new("a.mx");
        recorder.record(Phase::Parser, Location::new(1, 1), "oops");
        recorder.reset("b.mx");

        assert!(recorder.diagnostics().is_empty());
        assert_eq!(recorder.total_errors(), 0);
        assert_eq!(recorder.file(), "b.mx");
    }

    #[test]
    fn test_json_report() {
        let mut recorder = ErrorRecorder::new("a.mx");
        recorder.record(Phase::Semantic, Location::new(2, 3), "bad");

        let value: serde_json::Value = serde_json::from_str(&recorder.to_json()).unwrap();
        assert_eq!(value["errors"], 1);
        assert_eq!(value["diagnostics"][0]["phase"], "semantic");
        assert_eq!(value["diagnostics"][0]["location"]["line"], 2);
    }
}
