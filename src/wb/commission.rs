use super::{CommissionEntry, MarketplaceApi};
use crate::config::CommissionKind;
use anyhow::{anyhow, Context};
use pricing_types::CommissionRate;
use std::collections::HashMap;

/// Category id to whole commission percent, for one commission column.
#[derive(Debug, Clone, Default)]
pub struct CommissionTable(HashMap<u64, CommissionRate>);

impl CommissionTable {
    pub fn from_entries(entries: &[CommissionEntry], kind: CommissionKind) -> Self {
        Self(
            entries
                .iter()
                .map(|e| {
                    (
                        e.subject_id,
                        CommissionRate {
                            category_id: e.subject_id,
                            percent: e.percent(kind).trunc(),
                        },
                    )
                })
                .collect(),
        )
    }

    pub fn rate(&self, category_id: u64) -> Option<CommissionRate> {
        self.0.get(&category_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub async fn resolve(
    api: &dyn MarketplaceApi,
    category_id: u64,
    kind: CommissionKind,
) -> Result<CommissionRate, anyhow::Error> {
    let entries = api
        .commissions()
        .await
        .context("Unable to fetch commissions")?;
    let table = CommissionTable::from_entries(&entries, kind);
    log::debug!("Loaded commissions for {} categories", table.len());
    table
        .rate(category_id)
        .ok_or_else(|| anyhow!("No commission for category {category_id}"))
}
