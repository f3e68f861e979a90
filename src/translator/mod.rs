//! Translation between typed requests and the node's flat JSON actions.

pub mod action;
pub mod client;
pub mod translator;

pub use action::{ActionDocument, FieldTransform, Transform, build_action};
pub use client::NodeClient;
pub use translator::{ProtocolTranslator, decode_reply};
