use std::future::Future;

use bytes::Bytes;

use crate::errors::GatewayError;
use crate::ipc::SessionPool;

// -----------------------------------------------------------------------------
// ----- NodeClient ------------------------------------------------------------

/// One JSON action in, one JSON reply out.
pub trait NodeClient: Send + Sync + 'static {
    fn request(&self, payload: Bytes) -> impl Future<Output = Result<Bytes, GatewayError>> + Send;
}

impl NodeClient for SessionPool {
    async fn request(&self, payload: Bytes) -> Result<Bytes, GatewayError> {
        let session = self.acquire().await?;
        self.execute(&session, &payload).await
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
