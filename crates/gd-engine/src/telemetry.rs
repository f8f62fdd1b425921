//! Block counter and badge
//!
//! The counter only moves forward. Every confirmed block bumps it once, the
//! new value is persisted by the engine and mirrored on the toolbar badge.

use crate::host::Badge;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCounter {
    count: u64,
}

impl BlockCounter {
    pub fn new(count: u64) -> Self {
        Self { count }
    }

    pub fn get(&self) -> u64 {
        self.count
    }

    /// Count one block. Returns the new total.
    pub fn increment(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }
}

pub fn badge_text(count: u64) -> String {
    count.to_string()
}

/// Show `count` on the badge. Badge failures are logged, never surfaced.
pub async fn reflect_on_badge(badge: &dyn Badge, count: u64, color: &str) {
    if let Err(e) = badge.set_text(&badge_text(count)).await {
        log::warn!("Failed to update badge text: {}", e);
        return;
    }
    if let Err(e) = badge.set_color(color).await {
        log::warn!("Failed to update badge color: {}", e);
    }
}
