use gd_core::types::{ParsedEntry, HOST_ANCHOR};

/// Separates the (ignored) domain scope from the selector in a cosmetic line.
pub const COSMETIC_SEPARATOR: &str = "##";

/// Ends the domain fragment of a host-anchored line.
pub const SCOPE_TERMINATOR: char = '^';

/// Parse a whole filter list, skipping every line that is not a recognized rule.
pub fn parse_filter_list(text: &str) -> Vec<ParsedEntry> {
    text.lines().filter_map(parse_line).collect()
}

/// Parse a single filter list line.
///
/// Only two shapes are recognized: `||fragment^...` network block lines and
/// `scope##selector` cosmetic lines. Everything else yields `None`.
pub fn parse_line(raw_line: &str) -> Option<ParsedEntry> {
    let line = raw_line.trim();
    if line.is_empty() || is_comment_line(line) {
        return None;
    }

    if let Some(rest) = line.strip_prefix(HOST_ANCHOR) {
        return parse_host_anchor_rule(rest);
    }

    parse_cosmetic_rule(line)
}

fn parse_host_anchor_rule(rest: &str) -> Option<ParsedEntry> {
    let end = rest.find(SCOPE_TERMINATOR).unwrap_or(rest.len());
    let fragment = rest[..end].trim();
    if fragment.is_empty() {
        return None;
    }

    Some(ParsedEntry::NetworkBlock {
        domain_fragment: fragment.to_string(),
    })
}

fn parse_cosmetic_rule(line: &str) -> Option<ParsedEntry> {
    let pos = line.find(COSMETIC_SEPARATOR)?;
    let rest = &line[pos + COSMETIC_SEPARATOR.len()..];
    // Only the segment up to a further separator is the selector.
    let end = rest.find(COSMETIC_SEPARATOR).unwrap_or(rest.len());
    let selector = rest[..end].trim();
    if selector.is_empty() {
        return None;
    }

    Some(ParsedEntry::CosmeticHide {
        selector: selector.to_string(),
    })
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(fragment: &str) -> Option<ParsedEntry> {
        Some(ParsedEntry::NetworkBlock {
            domain_fragment: fragment.to_string(),
        })
    }

    fn hide(selector: &str) -> Option<ParsedEntry> {
        Some(ParsedEntry::CosmeticHide {
            selector: selector.to_string(),
        })
    }

    #[test]
    fn parses_host_anchor_lines() {
        assert_eq!(parse_line("||ads.example.com^"), block("ads.example.com"));
        assert_eq!(parse_line("||ads.example.com^$third-party"), block("ads.example.com"));
        assert_eq!(parse_line("||tracker.example.net"), block("tracker.example.net"));
        assert_eq!(parse_line("||example.com/banners/^"), block("example.com/banners/"));
        assert_eq!(parse_line("||ads.example.com^\r"), block("ads.example.com"));
    }

    #[test]
    fn rejects_empty_fragments() {
        assert_eq!(parse_line("||"), None);
        assert_eq!(parse_line("||^"), None);
        assert_eq!(parse_line("||^$script"), None);
    }

    #[test]
    fn parses_cosmetic_lines() {
        assert_eq!(parse_line("example.com##.sponsor-block"), hide(".sponsor-block"));
        assert_eq!(parse_line("##div[id^=\"ad-\"]"), hide("div[id^=\"ad-\"]"));
        assert_eq!(parse_line("a.com,b.org##.ad > span"), hide(".ad > span"));
    }

    #[test]
    fn selector_stops_at_a_second_separator() {
        assert_eq!(parse_line("a##b##c"), hide("b"));
        assert_eq!(parse_line("example.com##.ad ##.promo"), hide(".ad"));
        assert_eq!(parse_line("####.ad"), None);
    }

    #[test]
    fn rejects_empty_selectors() {
        assert_eq!(parse_line("example.com##"), None);
        assert_eq!(parse_line("##   "), None);
    }

    #[test]
    fn skips_unsupported_lines() {
        assert_eq!(parse_line("not a rule line"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("! Title: EasyList ## general"), None);
        assert_eq!(parse_line("[Adblock Plus 2.0]"), None);
        assert_eq!(parse_line("@@||ads.example.com^"), None);
        assert_eq!(parse_line("example.com#@#.ad"), None);
        assert_eq!(parse_line("/banner/*/img^"), None);
    }

    #[test]
    fn malformed_input_does_not_panic() {
        for line in ["|", "||\u{00e9}^", "#", "###", "\u{1F600}##\u{1F600}", "^^^||"] {
            let _ = parse_line(line);
        }
        assert_eq!(parse_line("###"), hide("#"));
    }

    #[test]
    fn parses_whole_lists() {
        let entries = parse_filter_list("||ads.example.com^\nexample.com##.sponsor-block\nnot a rule line");
        assert_eq!(
            entries,
            vec![
                ParsedEntry::NetworkBlock {
                    domain_fragment: "ads.example.com".to_string()
                },
                ParsedEntry::CosmeticHide {
                    selector: ".sponsor-block".to_string()
                },
            ]
        );
    }
}
