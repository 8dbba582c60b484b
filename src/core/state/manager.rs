//! State manager for watermark persistence

use crate::adapters::database::traits::StateStorage;
use crate::core::state::watermark::Watermark;
use crate::domain::Result;
use std::sync::Arc;

/// Loads and saves the export watermark through a [`StateStorage`] backend
#[derive(Clone)]
pub struct StateManager {
    storage: Arc<dyn StateStorage>,
    watermark_id: String,
}

impl StateManager {
    /// Create a manager for the watermark identified by `watermark_id`
    pub fn new_with_storage(storage: Arc<dyn StateStorage>, watermark_id: impl Into<String>) -> Self {
        Self {
            storage,
            watermark_id: watermark_id.into(),
        }
    }

    pub fn watermark_id(&self) -> &str {
        &self.watermark_id
    }

    /// Load the stored watermark, `None` before the first export
    pub async fn load(&self) -> Result<Option<Watermark>> {
        self.storage.load_watermark(&self.watermark_id).await
    }

    /// Load the stored watermark or start a fresh one
    pub async fn load_or_new(&self) -> Result<Watermark> {
        Ok(self
            .load()
            .await?
            .unwrap_or_else(|| Watermark::new(self.watermark_id.clone())))
    }

    /// Upsert the watermark
    pub async fn save(&self, watermark: &Watermark) -> Result<()> {
        tracing::debug!(
            watermark_id = %watermark.id,
            last_exported_at = ?watermark.last_exported_at,
            status = watermark.last_export_status.as_str(),
            "Saving watermark"
        );
        self.storage.save_watermark(watermark).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStateStorage;
    use chrono::Utc;

    #[tokio::test]
    async fn test_load_or_new_then_save() {
        let storage = Arc::new(MemoryStateStorage::default());
        let manager = StateManager::new_with_storage(storage, "recorder:public.sensor_data");

        assert!(manager.load().await.unwrap().is_none());

        let mut watermark = manager.load_or_new().await.unwrap();
        assert_eq!(watermark.id, "recorder:public.sensor_data");

        let now = Utc::now();
        watermark.advance(now, 42);
        manager.save(&watermark).await.unwrap();

        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded.last_exported_at, Some(now));
        assert_eq!(loaded.records_exported_count, 42);
    }
}
