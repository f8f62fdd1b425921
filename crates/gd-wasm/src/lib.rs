//! WebAssembly bindings for Guardian
//!
//! Lets an extension background page compile filter lists into host rule
//! JSON and check requests against the installed rules.

use std::cell::RefCell;

use gd_compiler::{parse_line, RuleCompiler};
use gd_core::{
    decide, resolve,
    types::{MatchDecision, NetworkRule, ParsedEntry, ResourceTypes},
    url::extract_host,
};
use wasm_bindgen::prelude::*;

thread_local! {
    static ACTIVE_RULES: RefCell<Vec<NetworkRule>> = const { RefCell::new(Vec::new()) };
}

fn set(target: &js_sys::Object, key: &str, value: &JsValue) {
    let _ = js_sys::Reflect::set(target, &key.into(), value);
}

fn to_js_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(|e| JsValue::from_str(&format!("Failed to encode: {}", e)))?;
    js_sys::JSON::parse(&json)
}

#[wasm_bindgen]
pub fn compile_filter_lists(list_texts: JsValue) -> Result<JsValue, JsValue> {
    let list_array = js_sys::Array::from(&list_texts);
    let list_count = list_array.length() as usize;

    if list_count == 0 {
        return Err(JsValue::from_str("No list texts provided"));
    }

    let mut compiler = RuleCompiler::new();
    for (idx, value) in list_array.iter().enumerate() {
        let text = value
            .as_string()
            .ok_or_else(|| JsValue::from_str("List text must be a string"))?;
        compiler.add_source(&format!("list-{idx}"), &text);
    }
    let (ruleset, stats) = compiler.finish();
    if stats.dropped_over_offset > 0 {
        web_sys::console::warn_1(
            &format!("Guardian: dropped {} network rules past the list ID range", stats.dropped_over_offset).into(),
        );
    }

    let js_result = js_sys::Object::new();
    set(&js_result, "rules", &to_js_json(&ruleset.network_rules)?);
    set(&js_result, "cosmeticRules", &to_js_json(&ruleset.cosmetic_selectors)?);
    set(&js_result, "lines", &JsValue::from(stats.lines as u32));
    set(&js_result, "skippedLines", &JsValue::from(stats.skipped_lines as u32));
    set(&js_result, "networkRules", &JsValue::from(stats.network_rules as u32));
    set(&js_result, "cosmeticBefore", &JsValue::from(stats.cosmetic_before as u32));
    set(&js_result, "cosmeticAfter", &JsValue::from(stats.cosmetic_after as u32));
    set(&js_result, "droppedOverOffset", &JsValue::from(stats.dropped_over_offset as u32));

    let list_stats = js_sys::Array::new_with_length(list_count as u32);
    for (i, source) in stats.sources.iter().enumerate() {
        let stat = js_sys::Object::new();
        set(&stat, "lines", &JsValue::from(source.lines as u32));
        set(&stat, "networkRules", &JsValue::from(source.network_rules as u32));
        set(&stat, "cosmeticRules", &JsValue::from(source.cosmetic_rules as u32));
        list_stats.set(i as u32, stat.into());
    }
    set(&js_result, "listStats", &list_stats);

    Ok(js_result.into())
}

/// Parse one filter list line. Returns `null` for lines that are skipped.
#[wasm_bindgen]
pub fn parse_line_js(line: &str) -> JsValue {
    let Some(entry) = parse_line(line) else {
        return JsValue::NULL;
    };

    let result = js_sys::Object::new();
    match entry {
        ParsedEntry::NetworkBlock { domain_fragment } => {
            set(&result, "type", &JsValue::from_str("networkBlock"));
            set(&result, "domainFragment", &JsValue::from_str(&domain_fragment));
        }
        ParsedEntry::CosmeticHide { selector } => {
            set(&result, "type", &JsValue::from_str("cosmeticHide"));
            set(&result, "selector", &JsValue::from_str(&selector));
        }
    }
    result.into()
}

/// Replace the rules used by the match functions. Takes host rule JSON.
#[wasm_bindgen]
pub fn set_active_rules(rules_json: &str) -> Result<u32, JsValue> {
    let rules: Vec<NetworkRule> = serde_json::from_str(rules_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid rule JSON: {}", e)))?;
    let count = rules.len() as u32;
    ACTIVE_RULES.with(|active| *active.borrow_mut() = rules);
    Ok(count)
}

#[wasm_bindgen]
pub fn active_rule_count() -> u32 {
    ACTIVE_RULES.with(|active| active.borrow().len() as u32)
}

#[wasm_bindgen]
pub fn match_request(url: &str, request_type: &str) -> JsValue {
    let request_type = parse_request_type(request_type);
    let js_result = js_sys::Object::new();

    ACTIVE_RULES.with(|active| {
        let rules = active.borrow();
        match resolve(&rules, url, request_type) {
            Some(rule) => {
                let decision = MatchDecision::from(rule.action);
                set(&js_result, "decision", &JsValue::from_str(decision_name(decision)));
                set(&js_result, "ruleId", &JsValue::from(rule.id));
                set(&js_result, "priority", &JsValue::from(rule.priority));
            }
            None => {
                set(&js_result, "decision", &JsValue::from_str(decision_name(MatchDecision::Allow)));
                set(&js_result, "ruleId", &JsValue::from(-1));
            }
        }
    });

    js_result.into()
}

#[wasm_bindgen]
pub fn should_block(url: &str, request_type: &str) -> bool {
    let request_type = parse_request_type(request_type);
    ACTIVE_RULES.with(|active| decide(&active.borrow(), url, request_type) == MatchDecision::Block)
}

#[wasm_bindgen]
pub fn extract_host_js(url: &str) -> Option<String> {
    extract_host(url).map(|h| h.to_string())
}

fn decision_name(decision: MatchDecision) -> &'static str {
    match decision {
        MatchDecision::Allow => "allow",
        MatchDecision::Block => "block",
    }
}

fn parse_request_type(request_type: &str) -> ResourceTypes {
    match request_type {
        "document" => ResourceTypes::MAIN_FRAME,
        "subdocument" => ResourceTypes::SUB_FRAME,
        "css" => ResourceTypes::STYLESHEET,
        "js" => ResourceTypes::SCRIPT,
        "img" => ResourceTypes::IMAGE,
        "xhr" | "fetch" => ResourceTypes::XMLHTTPREQUEST,
        "beacon" => ResourceTypes::PING,
        "ws" => ResourceTypes::WEBSOCKET,
        other => ResourceTypes::from_host_name(other).unwrap_or(ResourceTypes::OTHER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_type_aliases() {
        assert_eq!(parse_request_type("document"), ResourceTypes::MAIN_FRAME);
        assert_eq!(parse_request_type("script"), ResourceTypes::SCRIPT);
        assert_eq!(parse_request_type("xhr"), ResourceTypes::XMLHTTPREQUEST);
        assert_eq!(parse_request_type("csp_report"), ResourceTypes::OTHER);
    }
}
