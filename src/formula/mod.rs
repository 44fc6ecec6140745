// src/formula/mod.rs

//! Formula descriptors
//!
//! A formula names a piece of software, where its source lives, what it
//! depends on, and the shell commands that install and verify it.
//!
//! # Example Formula
//!
//! ```toml
//! [formula]
//! name = "muon"
//! description = "A fast stateless VPN with simple obfuscation"
//! homepage = "https://github.com/puxxustc/muon"
//!
//! [source]
//! head = "https://github.com/puxxustc/muon.git"
//!
//! [[depends_on]]
//! name = "libmill"
//!
//! [[depends_on]]
//! name = "autoconf"
//! kind = "build"
//!
//! [steps]
//! install = [
//!     "autoreconf -if",
//!     "./configure --prefix={prefix} --sysconfdir={sysconfdir} --mandir={mandir}",
//!     "make",
//!     "make install",
//! ]
//! test = ["make check"]
//! ```

mod format;
pub mod index;
pub mod parser;

pub use format::{
    Dependency, DependencyKind, Formula, FormulaFile, SourceLocator, SourceSpec,
};
pub use index::{DuplicateFormulaName, FormulaIndex, Lookup, Resolution};
pub use parser::{
    build_formula, lint_formula, parse_formula, parse_formula_file, DEFAULT_REPOSITORY,
};
