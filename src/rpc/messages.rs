//! Request and reply shapes for every call. Field names are the node's own,
//! so a request serializes straight into an action.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// ----- AccountBalance --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountBalanceRequest {
    pub account: String,

    #[serde(default = "default_true")]
    pub include_only_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountBalanceReply {
    pub balance: String,
    pub pending: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receivable: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- AccountsBalances ------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountsBalancesRequest {
    pub accounts: Vec<String>,

    #[serde(default = "default_true")]
    pub include_only_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountsBalancesReply {
    pub balances: BTreeMap<String, AccountBalanceReply>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

// -----------------------------------------------------------------------------
// ----- BlockInfo / BlocksInfo ------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockInfoRequest {
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockInfoReply {
    pub block_account: String,
    pub amount: String,
    pub balance: String,
    pub height: String,
    pub local_timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successor: Option<String>,

    pub confirmed: String,
    pub contents: BlockContents,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockContents {
    #[serde(rename = "type")]
    pub block_type: String,
    pub account: String,
    pub previous: String,
    pub representative: String,
    pub balance: String,
    pub link: String,
    pub link_as_account: String,
    pub signature: String,
    pub work: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlocksInfoRequest {
    pub hashes: Vec<String>,
}

/// One streamed answer of a `BlocksInfo` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfoEntry {
    pub hash: String,
    pub block: BlockInfoReply,
}

// -----------------------------------------------------------------------------
// ----- AccountCreate ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountCreateRequest {
    pub wallet: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountCreateReply {
    pub account: String,
}

// -----------------------------------------------------------------------------
// ----- ValidateAccountNumber -------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateAccountNumberRequest {
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateAccountNumberReply {
    pub valid: String,
}

// -----------------------------------------------------------------------------
// ----- Send ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendRequest {
    pub wallet: String,
    pub source: String,
    pub destination: String,
    pub amount: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendReply {
    pub block: String,
}

// -----------------------------------------------------------------------------
// ----- Subscribe -------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelRequest {
    pub id: u64,
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

fn default_true() -> bool {
    true
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
