use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::debug;

use super::messages::*;
use crate::auth::AuthGate;
use crate::errors::GatewayError;
use crate::feed::{FeedError, FeedState, FeedStatus, Subscriber, SubscriptionRegistry};
use crate::translator::{NodeClient, ProtocolTranslator, Transform};

// -----------------------------------------------------------------------------
// ----- NodeService -----------------------------------------------------------

/// One handler per RPC. Unary calls are a single translated action; the batch
/// block lookup fans out into one action per hash.
pub struct NodeService<C> {
    translator: ProtocolTranslator<C>,
    registry: Arc<SubscriptionRegistry>,
    feed: FeedStatus,
    auth: AuthGate,
}

// -----------------------------------------------------------------------------
// ----- NodeService: Static ---------------------------------------------------

impl<C: NodeClient> NodeService<C> {
    pub fn new(
        translator: ProtocolTranslator<C>,
        registry: Arc<SubscriptionRegistry>,
        feed: FeedStatus,
        auth: AuthGate,
    ) -> Self {
        Self {
            translator,
            registry,
            feed,
            auth,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- NodeService: Public ---------------------------------------------------

impl<C: NodeClient> NodeService<C> {
    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.feed.clone()
    }

    pub async fn account_balance(
        &self,
        request: &AccountBalanceRequest,
    ) -> Result<AccountBalanceReply, GatewayError> {
        self.translator
            .call(
                request,
                "account_balance",
                &[("include_only_confirmed", Transform::BoolAsString)],
            )
            .await
    }

    pub async fn accounts_balances(
        &self,
        request: &AccountsBalancesRequest,
    ) -> Result<AccountsBalancesReply, GatewayError> {
        self.translator
            .call(
                request,
                "accounts_balances",
                &[("include_only_confirmed", Transform::BoolAsString)],
            )
            .await
    }

    pub async fn block_info(&self, request: &BlockInfoRequest) -> Result<BlockInfoReply, GatewayError> {
        block_info(&self.translator, request).await
    }

    /// Looks hashes up one at a time, in request order. The stream ends after
    /// the first failure.
    pub fn blocks_info(
        &self,
        request: BlocksInfoRequest,
    ) -> impl Stream<Item = Result<BlockInfoEntry, GatewayError>> + Send + 'static {
        let translator = self.translator.clone();

        // `None` once a lookup has failed, so no further action reaches the node.
        stream::unfold(Some(request.hashes.into_iter()), move |pending| {
            let translator = translator.clone();
            async move {
                let mut hashes = pending?;
                let request = BlockInfoRequest {
                    hash: hashes.next()?,
                };

                match block_info(&translator, &request).await {
                    Ok(block) => {
                        let entry = BlockInfoEntry {
                            hash: request.hash,
                            block,
                        };
                        Some((Ok(entry), Some(hashes)))
                    }
                    Err(err) => Some((Err(err), None)),
                }
            }
        })
    }

    pub async fn account_create(
        &self,
        request: &AccountCreateRequest,
    ) -> Result<AccountCreateReply, GatewayError> {
        let transforms = match request.work {
            Some(_) => vec![("work", Transform::BoolAsString)],
            None => Vec::new(),
        };

        self.translator
            .call(request, "account_create", &transforms)
            .await
    }

    pub async fn validate_account_number(
        &self,
        request: &ValidateAccountNumberRequest,
    ) -> Result<ValidateAccountNumberReply, GatewayError> {
        self.translator
            .call(request, "validate_account_number", &[])
            .await
    }

    pub async fn send(&self, request: &SendRequest) -> Result<SendReply, GatewayError> {
        self.translator.call(request, "send", &[]).await
    }

    /// Register with the live feed. Refused once the feed is gone.
    pub fn subscribe(&self, request: &SubscribeRequest) -> Result<Subscriber, GatewayError> {
        match &*self.feed.borrow() {
            FeedState::Failed(reason) => {
                return Err(GatewayError::Feed(FeedError::Terminated(reason.clone())));
            }
            FeedState::Closing | FeedState::Closed => {
                return Err(GatewayError::Unavailable("live feed is shut down".to_string()));
            }
            FeedState::Connecting | FeedState::Connected => {}
        }

        let subscriber = self.registry.register(request.accounts.iter().cloned());
        debug!(
            "subscription {} for {} account(s)",
            subscriber.id(),
            request.accounts.len()
        );

        Ok(subscriber)
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

async fn block_info<C: NodeClient>(
    translator: &ProtocolTranslator<C>,
    request: &BlockInfoRequest,
) -> Result<BlockInfoReply, GatewayError> {
    translator
        .call(
            request,
            "block_info",
            &[("json_block", Transform::constant("true"))],
        )
        .await
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
