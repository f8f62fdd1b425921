//! Rule compiler
//!
//! Turns parsed entries into the two rule collections the engine installs:
//! host-anchored network block rules with dense IDs starting at 1, and a
//! de-duplicated cosmetic selector set.

use gd_core::types::{
    NetworkRule, ParsedEntry, RuleAction, LIST_RULE_PRIORITY, RESERVED_OVERRIDE_ID_OFFSET,
};

use crate::optimizer::dedupe_selectors;
use crate::parser::parse_line;

/// Output of one compilation round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledRuleset {
    /// Ordered by ID
    pub network_rules: Vec<NetworkRule>,
    /// First-seen order, no duplicates
    pub cosmetic_selectors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub source_id: String,
    pub lines: usize,
    pub network_rules: usize,
    pub cosmetic_rules: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub lines: usize,
    pub skipped_lines: usize,
    pub network_rules: usize,
    pub cosmetic_before: usize,
    pub cosmetic_after: usize,
    /// Network entries dropped because the list range ran into the override range
    pub dropped_over_offset: usize,
    pub sources: Vec<SourceStats>,
}

/// Incremental compiler. Feed sources in declared order, then `finish`.
pub struct RuleCompiler {
    next_id: u32,
    network_rules: Vec<NetworkRule>,
    selectors: Vec<String>,
    stats: CompileStats,
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            network_rules: Vec::new(),
            selectors: Vec::new(),
            stats: CompileStats::default(),
        }
    }

    /// Add one parsed entry. Returns false when the entry was dropped.
    pub fn push_entry(&mut self, entry: ParsedEntry) -> bool {
        match entry {
            ParsedEntry::NetworkBlock { domain_fragment } => {
                if self.next_id >= RESERVED_OVERRIDE_ID_OFFSET {
                    self.stats.dropped_over_offset += 1;
                    return false;
                }
                self.network_rules.push(NetworkRule::host_anchored(
                    self.next_id,
                    LIST_RULE_PRIORITY,
                    RuleAction::Block,
                    &domain_fragment,
                ));
                self.next_id += 1;
            }
            ParsedEntry::CosmeticHide { selector } => {
                self.selectors.push(selector);
            }
        }
        true
    }

    /// Parse and add the full text of one source.
    pub fn add_source(&mut self, source_id: &str, text: &str) {
        let mut source = SourceStats {
            source_id: source_id.to_string(),
            ..SourceStats::default()
        };

        for line in text.lines() {
            source.lines += 1;
            match parse_line(line) {
                Some(entry) => {
                    let is_network = matches!(entry, ParsedEntry::NetworkBlock { .. });
                    if self.push_entry(entry) {
                        if is_network {
                            source.network_rules += 1;
                        } else {
                            source.cosmetic_rules += 1;
                        }
                    }
                }
                None => self.stats.skipped_lines += 1,
            }
        }

        log::debug!(
            "Compiled source '{}': {} lines, {} network rules, {} cosmetic rules",
            source.source_id,
            source.lines,
            source.network_rules,
            source.cosmetic_rules
        );

        self.stats.lines += source.lines;
        self.stats.sources.push(source);
    }

    pub fn finish(mut self) -> (CompiledRuleset, CompileStats) {
        let optimize_stats = dedupe_selectors(&mut self.selectors);

        self.stats.network_rules = self.network_rules.len();
        self.stats.cosmetic_before = optimize_stats.before;
        self.stats.cosmetic_after = optimize_stats.after;

        if self.stats.dropped_over_offset > 0 {
            log::warn!(
                "Dropped {} network rules past ID {}",
                self.stats.dropped_over_offset,
                RESERVED_OVERRIDE_ID_OFFSET - 1
            );
        }

        let ruleset = CompiledRuleset {
            network_rules: self.network_rules,
            cosmetic_selectors: self.selectors,
        };
        (ruleset, self.stats)
    }
}

/// Compile an ordered stream of parsed entries.
pub fn compile_entries<I>(entries: I) -> CompiledRuleset
where
    I: IntoIterator<Item = ParsedEntry>,
{
    let mut compiler = RuleCompiler::new();
    for entry in entries {
        compiler.push_entry(entry);
    }
    compiler.finish().0
}

/// Compile `(source_id, text)` pairs, in the order given.
pub fn compile_sources<'a, I>(sources: I) -> (CompiledRuleset, CompileStats)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut compiler = RuleCompiler::new();
    for (source_id, text) in sources {
        compiler.add_source(source_id, text);
    }
    compiler.finish()
}
