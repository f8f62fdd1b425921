//! Guardian Filter List Compiler
//!
//! This crate compiles filter list text into network rules and cosmetic
//! selectors for the Guardian policy engine.

pub mod compiler;
pub mod optimizer;
pub mod parser;

pub use compiler::{compile_entries, compile_sources, CompileStats, CompiledRuleset, RuleCompiler};
pub use optimizer::dedupe_selectors;
pub use parser::{parse_filter_list, parse_line};
