//! Newline-delimited JSON framing for the RPC front-end.
//!
//! Inbound, one call per line:
//! `{"id": 7, "method": "BlockInfo", "metadata": {...}, "params": {...}}`.
//! Outbound, one frame per line, tied to the call by `id`: a unary `result`,
//! zero or more stream `item`s closed by `done`, or an `error`.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::auth::AUTH_METADATA_KEY;
use crate::errors::{ErrorResponse, GatewayError};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Longest call line accepted before the connection is dropped.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

// -----------------------------------------------------------------------------
// ----- Method ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    AccountBalance,
    AccountsBalances,
    BlockInfo,
    BlocksInfo,
    AccountCreate,
    ValidateAccountNumber,
    Send,
    Subscribe,
    Cancel,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::AccountBalance => "AccountBalance",
            Method::AccountsBalances => "AccountsBalances",
            Method::BlockInfo => "BlockInfo",
            Method::BlocksInfo => "BlocksInfo",
            Method::AccountCreate => "AccountCreate",
            Method::ValidateAccountNumber => "ValidateAccountNumber",
            Method::Send => "Send",
            Method::Subscribe => "Subscribe",
            Method::Cancel => "Cancel",
        }
    }
}

impl FromStr for Method {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "AccountBalance" => Method::AccountBalance,
            "AccountsBalances" => Method::AccountsBalances,
            "BlockInfo" => Method::BlockInfo,
            "BlocksInfo" => Method::BlocksInfo,
            "AccountCreate" => Method::AccountCreate,
            "ValidateAccountNumber" => Method::ValidateAccountNumber,
            "Send" => Method::Send,
            "Subscribe" => Method::Subscribe,
            "Cancel" => Method::Cancel,
            other => return Err(GatewayError::UnknownMethod(other.to_string())),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- CallEnvelope ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CallEnvelope {
    pub id: u64,
    pub method: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub params: Value,
}

impl CallEnvelope {
    pub fn token(&self) -> Option<SecretString> {
        self.metadata
            .get(AUTH_METADATA_KEY)
            .map(|token| SecretString::new(token.clone().into_boxed_str()))
    }

    /// Absent params read as `{}` so calls without arguments need no body.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        let params = match &self.params {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        serde_json::from_value(params).map_err(|e| {
            GatewayError::InvalidArgument(format!("bad params for {}: {e}", self.method))
        })
    }
}

// -----------------------------------------------------------------------------
// ----- ResponseFrame ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseFrame {
    Result { id: u64, result: Value },
    Item { id: u64, item: Value },
    Done { id: u64, done: bool },
    Error { id: Option<u64>, error: ErrorResponse },
}

impl ResponseFrame {
    pub fn result<T: Serialize>(id: u64, reply: &T) -> Self {
        match serde_json::to_value(reply) {
            Ok(result) => ResponseFrame::Result { id, result },
            Err(e) => Self::failure(Some(id), ErrorResponse::internal_error(format!("unserializable reply: {e}"))),
        }
    }

    pub fn item<T: Serialize>(id: u64, item: &T) -> Self {
        match serde_json::to_value(item) {
            Ok(item) => ResponseFrame::Item { id, item },
            Err(e) => Self::failure(Some(id), ErrorResponse::internal_error(format!("unserializable item: {e}"))),
        }
    }

    pub fn done(id: u64) -> Self {
        ResponseFrame::Done { id, done: true }
    }

    pub fn error(id: Option<u64>, err: &GatewayError) -> Self {
        Self::failure(id, ErrorResponse::from(err))
    }

    pub fn failure(id: Option<u64>, error: ErrorResponse) -> Self {
        ResponseFrame::Error { id, error }
    }

    /// Serialized frame including the trailing newline.
    pub fn to_line(&self) -> Bytes {
        match serde_json::to_vec(self) {
            Ok(mut line) => {
                line.push(b'\n');
                Bytes::from(line)
            }
            Err(e) => {
                error!("failed to encode response frame: {e}");
                Bytes::new()
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Line framing ----------------------------------------------------------

/// Split the next complete line off `buf`, without its terminator. Blank
/// lines are skipped. `None` means more bytes are needed.
pub fn next_line(buf: &mut BytesMut) -> Result<Option<Bytes>, ErrorResponse> {
    loop {
        let Some(end) = memchr(b'\n', buf) else {
            if buf.len() > MAX_LINE_LEN {
                return Err(ErrorResponse::protocol_violation(format!(
                    "call exceeds {MAX_LINE_LEN} bytes"
                )));
            }
            return Ok(None);
        };

        let mut line = buf.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        return Ok(Some(line.freeze()));
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn next_line_splits_and_keeps_remainder() {
        let mut buf = BytesMut::from(&b"{\"a\":1}\r\n\n{\"b\""[..]);

        assert_eq!(next_line(&mut buf).unwrap().unwrap(), &b"{\"a\":1}"[..]);
        assert!(next_line(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"{\"b\"");
    }

    #[test]
    fn oversized_line_is_rejected() {
        let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_LEN + 1].as_slice());
        let err = next_line(&mut buf).unwrap_err();
        assert_eq!(err.code, "invalid_argument");
    }

    #[test]
    fn envelope_exposes_token_and_params() {
        let call: CallEnvelope = serde_json::from_value(json!({
            "id": 3,
            "method": "BlockInfo",
            "metadata": {"auth-token-bin": "tok"},
            "params": {"hash": "1234"},
        }))
        .unwrap();

        assert_eq!(call.token().unwrap().expose_secret(), "tok");

        let params: crate::rpc::messages::BlockInfoRequest = call.params().unwrap();
        assert_eq!(params.hash, "1234");
    }

    #[test]
    fn missing_params_read_as_empty_object() {
        let call: CallEnvelope =
            serde_json::from_value(json!({"id": 1, "method": "Subscribe"})).unwrap();

        let params: crate::rpc::messages::SubscribeRequest = call.params().unwrap();
        assert!(params.accounts.is_empty());
        assert!(call.token().is_none());
    }

    #[test]
    fn unknown_param_is_invalid_argument() {
        let call: CallEnvelope = serde_json::from_value(json!({
            "id": 1,
            "method": "BlockInfo",
            "params": {"hash": "1", "extra": true},
        }))
        .unwrap();

        let err = call
            .params::<crate::rpc::messages::BlockInfoRequest>()
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("BlocksInfo".parse::<Method>().unwrap(), Method::BlocksInfo);
        assert_eq!(Method::Subscribe.as_str(), "Subscribe");

        let err = "Nope".parse::<Method>().unwrap_err();
        assert_eq!(err.code(), "unimplemented");
    }

    #[test]
    fn frames_serialize_to_single_lines() {
        let done = ResponseFrame::done(4).to_line();
        assert_eq!(&done[..], b"{\"id\":4,\"done\":true}\n");

        let err = ResponseFrame::error(Some(5), &GatewayError::Application("myerror".into()));
        let value: Value = serde_json::from_slice(&err.to_line()).unwrap();
        assert_eq!(
            value,
            json!({"id": 5, "error": {"code": "application", "message": "myerror"}})
        );
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
