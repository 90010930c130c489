//! Change set status tracking

use crate::schema::{ChangeItem, CheckStatus};
use serde::Serialize;

/// Change items grouped by check status, each group in change set order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaStatus<'a> {
    pub unchecked: Vec<&'a ChangeItem>,
    pub ok: Vec<&'a ChangeItem>,
    pub error: Vec<&'a ChangeItem>,
    pub skipped: Vec<&'a ChangeItem>,
}

/// Item counts per status, for renderers that only show totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub unchecked: usize,
    pub ok: usize,
    pub error: usize,
    pub skipped: usize,
    pub total: usize,
}

impl<'a> SchemaStatus<'a> {
    /// Partition items by their current check status
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = &'a ChangeItem>) -> Self {
        let mut status = Self::default();
        for item in items {
            match item.check_status() {
                CheckStatus::Unchecked => status.unchecked.push(item),
                CheckStatus::Ok => status.ok.push(item),
                CheckStatus::Error => status.error.push(item),
                CheckStatus::Skipped => status.skipped.push(item),
            }
        }
        status
    }

    /// Items in one status group
    #[must_use]
    pub fn bucket(&self, status: CheckStatus) -> &[&'a ChangeItem] {
        match status {
            CheckStatus::Unchecked => &self.unchecked,
            CheckStatus::Ok => &self.ok,
            CheckStatus::Error => &self.error,
            CheckStatus::Skipped => &self.skipped,
        }
    }

    #[must_use]
    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            unchecked: self.unchecked.len(),
            ok: self.ok.len(),
            error: self.error.len(),
            skipped: self.skipped.len(),
            total: self.unchecked.len() + self.ok.len() + self.error.len() + self.skipped.len(),
        }
    }

    /// No item failed its check and none is left unchecked
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.error.is_empty() && self.unchecked.is_empty()
    }
}
