use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// ----- ConfirmationEvent -----------------------------------------------------

/// One `confirmation` topic frame from the node's WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEvent {
    pub topic: String,
    pub time: String,
    pub message: ConfirmationMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationMessage {
    pub account: String,
    pub amount: String,
    pub hash: String,
    pub confirmation_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_info: Option<ElectionInfo>,

    pub block: StateBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionInfo {
    pub duration: String,
    pub time: String,
    pub tally: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_count: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlock {
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

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtype: String,
}

impl ConfirmationEvent {
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    /// The account on the other side of the block; subscription filters
    /// match against it.
    pub fn counterparty_account(&self) -> &str {
        &self.message.block.link_as_account
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CONFIRMATION: &str = r#"
    {
      "topic": "confirmation",
      "time": "1564935350664",
      "message": {
        "account": "nano_1tgkjkq9r96zd3pkr7edj8e4qbu3wr3ps6ettzse8hmoa37nurua7faupjhc",
        "amount": "15621963968634827029081574961",
        "hash": "0E889F83E28152A70E87B92D846CA3D8966F3AEEC65E11B25F7B4E6760C57CA3",
        "confirmation_type": "active_quorum",
        "election_info": {
          "duration": "546",
          "time": "1564935348219",
          "tally": "42535295865117307936387010521258262528",
          "request_count": "1"
        },
        "block": {
          "type": "state",
          "account": "nano_1tgkjkq9r96zd3pkr7edj8e4qbu3wr3ps6ettzse8hmoa37nurua7faupjhc",
          "previous": "4E9003ABD469D1F58A70518234016797FA654B494A2627B8583052629A91689E",
          "representative": "nano_3rw4un6ys57hrb39sy1qx8qy5wukst1iiponztrz9qiz6qqa55kxzx4491or",
          "balance": "0",
          "link": "3098F4C0D1D8BD889AF078CDFF81E982B8EFA6D6D8FAE954CF0CDC7A256C3F8B",
          "link_as_account": "nano_1e6rym1f5p7xj4fh1y8fzy1ym1orxymffp9tx7cey58whakprhwdzuk533th",
          "signature": "D5C332587B1A4DEA35B6F03B0A9BEB45C5BBE582060B0252C313CF411F72478721F8E7DA83A779BA5006D571266F32BDE34C1447247F417F8F12101D3ADAF705",
          "work": "c950fc037d61e372",
          "subtype": "send"
        }
      }
    }
    "#;

    pub(crate) const COUNTERPARTY: &str =
        "nano_1e6rym1f5p7xj4fh1y8fzy1ym1orxymffp9tx7cey58whakprhwdzuk533th";

    #[test]
    fn decodes_confirmation_frame() {
        let event = ConfirmationEvent::decode(CONFIRMATION.as_bytes()).unwrap();
        assert_eq!(event.message.block.work, "c950fc037d61e372");
        assert_eq!(event.counterparty_account(), COUNTERPARTY);
        assert_eq!(
            event.message.election_info.as_ref().and_then(|e| e.request_count.as_deref()),
            Some("1")
        );
    }

    #[test]
    fn rejects_frame_without_block() {
        let frame = br#"{"topic":"confirmation","time":"1","message":{"account":"a"}}"#;
        assert!(ConfirmationEvent::decode(frame).is_err());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
