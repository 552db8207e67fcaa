//! mxc - MxLang compiler
//!
//! Front end, semantic analysis and lowering to Mx IR.

pub mod diagnostics;
pub mod driver;
pub mod frontend;
pub mod middle;
pub mod types;
pub mod utils;
