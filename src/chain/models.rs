//! Core data models for the IOU ledger and its transaction log
//!
//! This module defines participants, blocks, raw transactions, decoded
//! contract calls and the events the log scanner yields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Debt amounts are non-negative integers
pub type Amount = u64;

/// Participant or contract address
///
/// Addresses are case-insensitive; the inner string is always lower case so
/// that equality, hashing and ordering agree with that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for tables (`0x1234…abcd`)
    pub fn short(&self) -> String {
        if self.0.len() > 14 && self.0.is_ascii() {
            format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
        } else {
            self.0.clone()
        }
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a block, either by height or by hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockRef {
    Number(u64),
    Hash(String),
}

impl BlockRef {
    pub fn hash(hash: impl AsRef<str>) -> Self {
        Self::Hash(hash.as_ref().to_lowercase())
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockRef::Number(n) => write!(f, "#{}", n),
            BlockRef::Hash(h) => write!(f, "{}", h),
        }
    }
}

/// A block of the transaction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block hash
    pub hash: String,

    /// Block height
    pub number: u64,

    /// Hash of the parent block (the genesis sentinel for the first block)
    pub parent_hash: String,

    /// Block timestamp, seconds since the Unix epoch
    pub timestamp: u64,

    /// Transactions in block order
    pub transactions: Vec<ChainTransaction>,
}

/// A raw transaction as stored in a block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: String,
    pub from: Address,

    /// Destination, `None` for contract creation
    pub to: Option<Address>,

    /// Raw call payload
    #[serde(with = "hex_bytes")]
    pub input: Vec<u8>,
}

/// A decoded argument of a contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallArg {
    Address(Address),
    Uint(Amount),
    AddressList(Vec<Address>),
}

impl CallArg {
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            CallArg::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<Amount> {
        match self {
            CallArg::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

/// A contract call decoded from transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedCall {
    pub name: String,
    pub args: Vec<CallArg>,
}

/// One historical contract call, as yielded by the log scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Caller (lower-cased)
    pub sender: Address,

    /// Function name of the call
    pub function: String,

    /// Decoded arguments in declaration order
    pub args: Vec<CallArg>,

    /// Block timestamp, seconds since the Unix epoch
    pub timestamp: u64,

    pub block_number: u64,
    pub tx_hash: String,
}

impl Event {
    /// The call's first argument when it is an address.
    /// For `add_IOU` this is the creditor.
    pub fn counterparty(&self) -> Option<&Address> {
        self.args.first().and_then(CallArg::as_address)
    }

    /// Whether `participant` is the sender or the first-argument party
    pub fn mentions(&self, participant: &Address) -> bool {
        &self.sender == participant || self.counterparty() == Some(participant)
    }
}

/// A closed debt loop `i -> j -> ... -> k -> i`
///
/// `participants` holds `[i, j, ..., k]`; the wrap edge back to the first
/// participant is implied. `amount` is the smallest edge weight on the loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CyclePath {
    pub participants: Vec<Address>,
    pub amount: Amount,
}

impl CyclePath {
    /// Consecutive (debtor, creditor) pairs, wrap edge included
    pub fn edges(&self) -> impl Iterator<Item = (&Address, &Address)> {
        let n = self.participants.len();
        (0..n).map(move |i| (&self.participants[i], &self.participants[(i + 1) % n]))
    }

    /// The participant list with the first participant repeated at the end
    pub fn closed(&self) -> Vec<Address> {
        let mut path = self.participants.clone();
        if let Some(first) = self.participants.first() {
            path.push(first.clone());
        }
        path
    }

    /// Rotation starting at the smallest address, used to recognise the same
    /// loop discovered from different starting edges
    pub fn canonical_key(&self) -> Vec<Address> {
        let Some(start) = self
            .participants
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(idx, _)| idx)
        else {
            return Vec::new();
        };
        let mut key = self.participants[start..].to_vec();
        key.extend_from_slice(&self.participants[..start]);
        key
    }
}

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<String> = self.closed().iter().map(Address::short).collect();
        write!(f, "{} ({})", names.join(" -> "), self.amount)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_case_insensitive() {
        let a = Address::new("0xABCDEF0000000000000000000000000000000001");
        let b = Address::new("0xabcdef0000000000000000000000000000000001");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef0000000000000000000000000000000001");
    }

    #[test]
    fn test_address_short() {
        let a = Address::new("0xabcdef0000000000000000000000000000000001");
        assert_eq!(a.short(), "0xabcd…0001");
        assert_eq!(Address::new("alice").short(), "alice");
    }

    #[test]
    fn test_event_mentions() {
        let event = Event {
            sender: Address::new("alice"),
            function: "add_IOU".to_string(),
            args: vec![CallArg::Address(Address::new("Bob")), CallArg::Uint(10)],
            timestamp: 1_700_000_000,
            block_number: 1,
            tx_hash: "0x01".to_string(),
        };

        assert_eq!(event.counterparty(), Some(&Address::new("bob")));
        assert!(event.mentions(&Address::new("ALICE")));
        assert!(event.mentions(&Address::new("bob")));
        assert!(!event.mentions(&Address::new("carol")));
    }

    #[test]
    fn test_cycle_edges_include_wrap() {
        let cycle = CyclePath {
            participants: vec![Address::new("a"), Address::new("b"), Address::new("c")],
            amount: 5,
        };

        let edges: Vec<(String, String)> = cycle
            .edges()
            .map(|(d, c)| (d.to_string(), c.to_string()))
            .collect();
        assert_eq!(
            edges,
            vec![
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "c".to_string()),
                ("c".to_string(), "a".to_string()),
            ]
        );
        assert_eq!(cycle.closed().len(), 4);
        assert_eq!(cycle.to_string(), "a -> b -> c -> a (5)");
    }

    #[test]
    fn test_cycle_canonical_key_ignores_rotation() {
        let rotations = [["b", "c", "a"], ["c", "a", "b"], ["a", "b", "c"]];
        let keys: Vec<Vec<Address>> = rotations
            .iter()
            .map(|names| CyclePath {
                participants: names.iter().map(|n| Address::new(n)).collect(),
                amount: 1,
            })
            .map(|c| c.canonical_key())
            .collect();

        assert!(keys.windows(2).all(|w| w[0] == w[1]));

        let reversed = CyclePath {
            participants: vec![Address::new("a"), Address::new("c"), Address::new("b")],
            amount: 1,
        };
        assert_ne!(reversed.canonical_key(), keys[0]);
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = ChainTransaction {
            hash: "0xaa".to_string(),
            from: Address::new("0xF00"),
            to: Some(Address::new("0xC0FFEE")),
            input: vec![0xd1, 0x20, 0x99, 0xe4],
        };

        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"0xd12099e4\""));
        assert!(json.contains("\"0xf00\""));

        let back: ChainTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.input, tx.input);
        assert_eq!(back.to, tx.to);
    }
}
