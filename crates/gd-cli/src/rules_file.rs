use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use gd_compiler::{CompileStats, CompiledRuleset, RuleCompiler};
use gd_core::types::NetworkRule;

/// Compiled output as written to disk: host rule JSON plus cosmetic selectors.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesFile {
    pub rules: Vec<NetworkRule>,
    pub cosmetic_rules: Vec<String>,
}

impl From<CompiledRuleset> for RulesFile {
    fn from(ruleset: CompiledRuleset) -> Self {
        Self {
            rules: ruleset.network_rules,
            cosmetic_rules: ruleset.cosmetic_selectors,
        }
    }
}

pub fn compile_list_files(inputs: &[String], verbose: bool) -> Result<(CompiledRuleset, CompileStats, f64), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let start = Instant::now();
    let mut compiler = RuleCompiler::new();

    for (idx, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let name = Path::new(path).file_name().unwrap_or_default().to_string_lossy().into_owned();
        compiler.add_source(&name, &content);

        if verbose {
            println!("  [{}] {} - {} lines", idx, name, content.lines().count());
        }
    }

    let (ruleset, stats) = compiler.finish();
    Ok((ruleset, stats, start.elapsed().as_secs_f64() * 1000.0))
}

pub fn print_stats(stats: &CompileStats) {
    for source in &stats.sources {
        println!(
            "  {:<24} {} lines, {} network, {} cosmetic",
            source.source_id, source.lines, source.network_rules, source.cosmetic_rules
        );
    }
    println!("  Lines:    {} ({} skipped)", stats.lines, stats.skipped_lines);
    println!("  Network:  {}", stats.network_rules);
    println!(
        "  Cosmetic: {} -> {} (dedupe removed {})",
        stats.cosmetic_before,
        stats.cosmetic_after,
        stats.cosmetic_before - stats.cosmetic_after
    );
    if stats.dropped_over_offset > 0 {
        println!("  Dropped:  {} rules past the list ID range", stats.dropped_over_offset);
    }
}

pub fn write_rules_file(path: &Path, rules: &RulesFile) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
    }
    let json = serde_json::to_string_pretty(rules).map_err(|e| format!("Failed to encode rules: {}", e))?;
    fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    Ok(())
}

pub fn read_rules_file(path: &Path) -> Result<RulesFile, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Invalid rules file '{}': {}", path.display(), e))
}
