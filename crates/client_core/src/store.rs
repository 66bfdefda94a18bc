use anyhow::Result;
use async_trait::async_trait;
use storage::Storage;

/// Read side of the persistent key-value store. Values are raw JSON text.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
}

#[async_trait]
impl KeyValueStore for Storage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Storage::get_item(self, key).await
    }
}
