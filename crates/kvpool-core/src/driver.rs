//! Connector trait implemented by backends

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Connection, Endpoint, Result};

/// Opens connections to a key-value endpoint
///
/// `connect` resolves once the new connection is ready to serve commands
/// (for Redis: after a successful PING). Errors from this method are
/// reported to whichever caller triggered the creation.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Get the backend identifier (e.g., "redis")
    fn id(&self) -> &'static str;

    /// Open a new connection
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>> {
        (**self).connect(endpoint).await
    }
}
