use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use super::{FieldTransform, NodeClient, build_action};
use crate::errors::GatewayError;

// -----------------------------------------------------------------------------
// ----- ProtocolTranslator ----------------------------------------------------

#[derive(Debug)]
pub struct ProtocolTranslator<C> {
    client: Arc<C>,
}

impl<C> Clone for ProtocolTranslator<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<C: NodeClient> ProtocolTranslator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Build the action, submit it once and decode the reply strictly.
    pub async fn call<Req, Rep>(
        &self,
        request: &Req,
        action: &str,
        transforms: &[FieldTransform],
    ) -> Result<Rep, GatewayError>
    where
        Req: Serialize,
        Rep: DeserializeOwned,
    {
        let payload = build_action(request, action, transforms)?;
        debug!("IPC -> {}", String::from_utf8_lossy(&payload));

        let raw = self.client.request(payload).await?;
        decode_reply(raw)
    }
}

// -----------------------------------------------------------------------------
// ----- decode_reply ----------------------------------------------------------

/// Decode a reply into `Rep`. When that fails, a top-level `"error"` string is
/// surfaced as an application error; anything else is a decode error carrying
/// the raw payload.
pub fn decode_reply<Rep: DeserializeOwned>(raw: Bytes) -> Result<Rep, GatewayError> {
    let source = match serde_json::from_slice::<Rep>(&raw) {
        Ok(reply) => return Ok(reply),
        Err(e) => e,
    };

    if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(&raw) {
        if let Some(Value::String(message)) = fields.get("error") {
            return Err(GatewayError::Application(message.clone()));
        }
    }

    error!("error unmarshalling node reply: {source}");
    error!("{}", String::from_utf8_lossy(&raw));

    Err(GatewayError::Decode { source, raw })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
