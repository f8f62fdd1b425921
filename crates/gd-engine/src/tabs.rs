//! Per-tab request log
//!
//! Remembers the most recent requests of every open tab so the UI can show
//! a network log, and so a block notification is counted once per request.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use ts_rs::TS;

use crate::host::TabId;

/// One observed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub request_id: String,
    pub url: String,
    pub blocked: bool,
}

/// Result of marking a request blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMark {
    /// First block notification for this request.
    New,
    /// Already counted.
    Duplicate,
}

#[derive(Debug)]
pub struct TabRequestLog {
    limit: usize,
    tabs: HashMap<TabId, VecDeque<RequestRecord>>,
}

impl TabRequestLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            tabs: HashMap::new(),
        }
    }

    /// Append a request unless it is already logged. Background requests
    /// (negative tab handles) are not logged.
    pub fn record(&mut self, tab: TabId, request_id: &str, url: &str) -> bool {
        if tab < 0 {
            return false;
        }
        let records = self.tabs.entry(tab).or_default();
        if records.iter().any(|r| r.request_id == request_id) {
            return false;
        }
        if records.len() == self.limit {
            records.pop_front();
        }
        records.push_back(RequestRecord {
            request_id: request_id.to_string(),
            url: url.to_string(),
            blocked: false,
        });
        true
    }

    /// Mark a request blocked, logging it first if it was never observed.
    pub fn mark_blocked(&mut self, tab: TabId, request_id: &str, url: &str) -> BlockMark {
        if tab < 0 {
            return BlockMark::New;
        }
        self.record(tab, request_id, url);

        let Some(record) = self
            .tabs
            .get_mut(&tab)
            .and_then(|records| records.iter_mut().find(|r| r.request_id == request_id))
        else {
            return BlockMark::New;
        };

        if record.blocked {
            BlockMark::Duplicate
        } else {
            record.blocked = true;
            BlockMark::New
        }
    }

    pub fn clear_tab(&mut self, tab: TabId) -> usize {
        self.tabs.remove(&tab).map_or(0, |records| records.len())
    }

    /// Records of `tab`, oldest first.
    pub fn records(&self, tab: TabId) -> Vec<RequestRecord> {
        self.tabs
            .get(&tab)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }
}
