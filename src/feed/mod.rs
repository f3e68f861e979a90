//! Live confirmation feed: one WebSocket connection to the node, fanned out
//! to any number of filtered subscribers.

pub mod connection;
pub mod error;
pub mod event;
pub mod registry;

pub use connection::{FeedState, FeedStatus, LiveFeed, subscribe_handshake, wait_terminated};
pub use error::FeedError;
pub use event::{ConfirmationEvent, ConfirmationMessage, ElectionInfo, StateBlock};
pub use registry::{DispatchStats, Subscriber, SubscriptionId, SubscriptionRegistry};
