//! Persisted inventory snapshots.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inventory::Inventory;

/// Format tag written into every snapshot record.
pub const SNAPSHOT_FORMAT_VERSION: &str = "1";

/// An inventory captured against a root at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version of the record.
    pub version: String,

    /// Root directory the inventory was taken against.
    pub root_path: PathBuf,

    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,

    /// The captured inventory.
    pub inventory: Inventory,
}

impl Snapshot {
    /// Wrap an inventory captured now.
    pub fn new(root_path: impl Into<PathBuf>, inventory: Inventory) -> Self {
        Self::captured_at(root_path, Utc::now(), inventory)
    }

    /// Wrap an inventory with an explicit capture time.
    pub fn captured_at(
        root_path: impl Into<PathBuf>,
        captured_at: DateTime<Utc>,
        inventory: Inventory,
    ) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION.to_string(),
            root_path: root_path.into(),
            captured_at,
            inventory,
        }
    }

    /// Whether this record was written by the current format.
    pub fn is_current_version(&self) -> bool {
        self.version == SNAPSHOT_FORMAT_VERSION
    }

    /// Unwrap the inventory.
    pub fn into_inventory(self) -> Inventory {
        self.inventory
    }
}
