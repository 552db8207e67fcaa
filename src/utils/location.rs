//! Source location tracking

use serde::Serialize;
use std::fmt;

/// A position in the source text, 1-based line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// Create a new location
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Location of compiler-provided entities (built-ins, default constructors)
    pub fn builtin() -> Self {
        Self { line: 0, column: 0 }
    }

    /// Attach a file name, producing the rendered `file:line:column` form
    pub fn in_file<'a>(&self, file: &'a str) -> FileLocation<'a> {
        FileLocation { file, location: *self }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A location paired with the file it belongs to
#[derive(Debug, Clone, Copy)]
pub struct FileLocation<'a> {
    pub file: &'a str,
    pub location: Location,
}

impl fmt::Display for FileLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.location)
    }
}
