//! Wire messages exchanged between peers.

use gossipchain_core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// What a node says about itself during a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub version: String,
    pub height: u64,
    pub listen_addr: String,
    /// Listen addresses of the peers the sender is connected to.
    pub peers: Vec<String>,
}

/// A request from one peer to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Handshake(Announcement),
    Transaction(Transaction),
    Block(Block),
}

/// Response to a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Announcement(Announcement),
    Ack,
    Error(String),
}

impl Message {
    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Handshake(_) => "handshake",
            Message::Transaction(_) => "transaction",
            Message::Block(_) => "block",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gossipchain_core::{Address, Hash};

    #[test]
    fn test_message_bincode() {
        let message = Message::Block(Block::new(
            Hash::ZERO,
            vec![Transaction::mint(10, Address::ZERO)],
        ));
        let bytes = bincode::serialize(&message).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.type_name(), "block");
    }

    #[test]
    fn test_announcement_json() {
        let announcement = Announcement {
            version: "gossipchain-0.1".into(),
            height: 7,
            listen_addr: "127.0.0.1:3000".into(),
            peers: vec!["127.0.0.1:4000".into()],
        };
        let json = serde_json::to_string(&Reply::Announcement(announcement.clone())).unwrap();
        let decoded: Reply = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, Reply::Announcement(announcement));
    }
}
