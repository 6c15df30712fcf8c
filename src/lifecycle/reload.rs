use crate::error::Result;
use async_trait::async_trait;

/// Invoked when a HangupReload arrives while the daemon is Ready
#[async_trait]
pub trait ReloadHandler: Send + Sync {
    async fn reload(&self) -> Result<()>;
}

/// Reload handler for daemons without reloadable settings
pub struct NoReload;

#[async_trait]
impl ReloadHandler for NoReload {
    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}
