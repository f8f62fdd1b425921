use std::collections::HashSet;

pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Drop repeated cosmetic selectors, keeping the first occurrence in place.
pub fn dedupe_selectors(selectors: &mut Vec<String>) -> OptimizeStats {
    let before = selectors.len();

    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    let mut deduped = 0usize;
    selectors.retain(|selector| {
        if seen.contains(selector) {
            deduped += 1;
            false
        } else {
            seen.insert(selector.clone());
            true
        }
    });

    OptimizeStats {
        before,
        after: selectors.len(),
        deduped,
    }
}
