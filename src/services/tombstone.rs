//! Soft deletion. Removed objects are parked under a `tombstone/` prefix and
//! expired by a bucket lifecycle rule after a grace period.

use crate::services::{
    object_client::{CopyOptions, SharedClient},
    s3_store::{KeyLayout, StoreResult},
};
use tracing::{info, warn};

/// Lifecycle rule id owned by this manager. Re-applying replaces it.
pub const TOMBSTONE_RULE_ID: &str = "purge-tombstone";

#[derive(Clone)]
pub struct TombstoneManager {
    client: SharedClient,
    layout: KeyLayout,
}

impl TombstoneManager {
    pub fn new(client: SharedClient, layout: KeyLayout) -> Self {
        Self { client, layout }
    }

    /// `[folder/]tombstone/[tenant/]`
    pub fn prefix(&self) -> String {
        self.layout.tombstone_prefix()
    }

    pub fn tombstone_key(&self, path: &str) -> String {
        self.layout.tombstone_key(path)
    }

    /// Copy the object at `path` into the tombstone area, then delete the
    /// original. The original is only deleted once the copy has succeeded.
    pub async fn remove(&self, path: &str) -> StoreResult<()> {
        let key = self.layout.qualify(path);
        let tombstone = self.layout.tombstone_key(path);

        if let Err(err) = self
            .client
            .copy_object(&key, &tombstone, CopyOptions::Preserve)
            .await
        {
            warn!("failed to tombstone {}: {}", key, err);
            return Err(err.into());
        }
        self.client.delete_object(&key).await?;

        info!("moved {} to {}", key, tombstone);
        Ok(())
    }

    /// Expire everything under the tombstone prefix after `grace_days`.
    pub async fn purge_tombstone(&self, grace_days: u32) -> StoreResult<()> {
        let prefix = self.prefix();
        self.client
            .configure_lifecycle_rule(TOMBSTONE_RULE_ID, &prefix, grace_days)
            .await?;
        info!("tombstones under `{}` expire after {} days", prefix, grace_days);
        Ok(())
    }
}
