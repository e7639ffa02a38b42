use crate::scheduler::types::{ResourceNode, Tier};
use crate::service::types::RemoteId;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// A materialized node and the order in which it materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    #[serde(flatten)]
    pub node: ResourceNode,
}

/// Concurrent record of every materialized node, keyed by tier and remote id.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    entries: DashMap<(Tier, RemoteId), LedgerEntry>,
    sequence: AtomicU64,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a materialized node. Returns its sequence number, or `None` if
    /// the node carries no remote id.
    ///
    /// Recording the same remote id twice (an organization recovered through
    /// conflict resolution, for instance) keeps the first entry.
    pub fn record(&self, node: &ResourceNode) -> Option<u64> {
        let remote_id = node.remote_id()?.to_string();
        let entry = self
            .entries
            .entry((node.tier, remote_id))
            .or_insert_with(|| LedgerEntry {
                sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
                node: node.clone(),
            });
        Some(entry.sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.entries.iter().filter(|e| e.key().0 == tier).count()
    }

    pub fn get(&self, tier: Tier, remote_id: &str) -> Option<LedgerEntry> {
        self.entries
            .get(&(tier, remote_id.to_string()))
            .map(|e| e.value().clone())
    }

    /// All entries in materialization order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Entries whose parent is missing from the ledger or materialized later
    /// than the entry itself. Empty for any tree built parent-first.
    pub fn causality_violations(&self) -> Vec<LedgerEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| {
                let (Some(parent_tier), Some(parent_id)) =
                    (entry.node.tier.parent(), entry.node.parent_id.as_deref())
                else {
                    return entry.node.tier.parent().is_some();
                };
                match self.get(parent_tier, parent_id) {
                    Some(parent) => parent.sequence >= entry.sequence,
                    None => true,
                }
            })
            .collect()
    }
}
