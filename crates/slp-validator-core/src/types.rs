//! Shared value types for the validation core (§3, §9 Design Notes).

use serde::{Deserialize, Serialize};

/// A token's identifying txid, as a lowercase hex string (matches the
/// wire/JSON representation used by `token_id_hex` throughout spec.md).
pub type TokenId = String;

/// Validity codes (§3, GLOSSARY). `Unknown` is the only non-final state;
/// once a node reaches any other value it is final until an explicit
/// `TokenGraph::reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Validity {
    Unknown = 0,
    Valid = 1,
    Malformed = 2,
    InsufficientValidInputs = 3,
    TypeOrParentMismatch = 4,
}

impl Validity {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_final(self) -> bool {
        !matches!(self, Validity::Unknown)
    }
}

/// A node's self-derived summary, produced by `get_info` (§3, §4.1,
/// Design Notes: replaces the dynamic string-or-integer sentinel with a
/// tagged variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MyInfo {
    Genesis,
    Mint,
    SendSum(u64),
}

/// Per-output token quantity or sentinel (§3, Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSlot {
    None,
    Mint,
    Amount(u64),
}

/// The result of `get_info` (§4.1): either a final prune verdict, or the
/// self-contained classification of the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetInfoResult {
    Prune(Validity),
    Info {
        /// `vin_mask[i]` is true when input `i`'s verdict is
        /// consensus-relevant (§3 invariant).
        vin_mask: Vec<bool>,
        myinfo: MyInfo,
        outputs: Vec<OutputSlot>,
    },
}

/// One parent's contribution to `validate` (§4.1): `(parent_txid,
/// parent_validity, parent_out_slot)`. `parent_out_slot` is the amount
/// already unwrapped from `OutputSlot` since `check_needed` has already
/// filtered out `None`/`Mint` slots for SEND/MINT respectively.
#[derive(Debug, Clone, Copy)]
pub struct ParentInfo {
    pub parent_validity: Validity,
    pub parent_out_slot: u64,
}

/// The result of `validate` (§4.1): a final verdict, or "pending" (more
/// input verdicts are needed before a decision can be made).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateResult {
    Decided(Validity),
    Pending,
}
