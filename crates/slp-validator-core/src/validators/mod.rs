//! Per-type consensus validators (§4.1).
//!
//! Each validator is a pure value exposing the `get_info` / `check_needed`
//! / `validate` triad. Validators carry no interior mutability and no
//! back-reference to their graph (Design Notes: "validators are values
//! (plain data) stored once per graph").

mod nft1;
mod slp1;

pub use nft1::{resolve_genesis_from_parent, Nft1ChildValidator};
pub(crate) use nft1::NFT1_CHILD_TOKEN_TYPE;
pub use slp1::Slp1Validator;

use crate::tx::Tx;
use crate::types::{GetInfoResult, MyInfo, OutputSlot, ParentInfo, ValidateResult};

/// A per-token-type consensus validator.
pub trait TokenValidator {
    /// Classify a transaction using only self-contained rules (§4.1).
    fn get_info(&self, tx: &Tx) -> GetInfoResult;

    /// Whether a given parent output slot is consensus-relevant for a
    /// node with the given `myinfo` (§4.1). Never called for `Genesis`.
    fn check_needed(&self, myinfo: MyInfo, out_slot: OutputSlot) -> bool;

    /// Decide a node's verdict from its already-decided/pending parents
    /// (§4.1). Returns `Pending` when more information is needed.
    fn validate(&self, myinfo: MyInfo, inputs_info: &[ParentInfo]) -> ValidateResult;
}

/// Align a message's output list to the transaction's actual output
/// count: pad with `OutputSlot::None` on the right, truncate on the right
/// if the message lists more outputs than the transaction has (§4.1).
pub(crate) fn align_outputs(mut outputs: Vec<OutputSlot>, tx_output_count: usize) -> Vec<OutputSlot> {
    outputs.truncate(tx_output_count);
    outputs.resize(tx_output_count, OutputSlot::None);
    outputs
}

/// A validator instance for one graph, dispatching to the concrete
/// per-type implementation. Plain data, `Clone`, no trait objects needed
/// since the set of token types is closed (§4.1).
#[derive(Clone)]
pub enum Validator {
    Slp1(Slp1Validator),
    Nft1Child(Nft1ChildValidator),
}

impl TokenValidator for Validator {
    fn get_info(&self, tx: &Tx) -> GetInfoResult {
        match self {
            Validator::Slp1(v) => v.get_info(tx),
            Validator::Nft1Child(v) => v.get_info(tx),
        }
    }

    fn check_needed(&self, myinfo: MyInfo, out_slot: OutputSlot) -> bool {
        match self {
            Validator::Slp1(v) => v.check_needed(myinfo, out_slot),
            Validator::Nft1Child(v) => v.check_needed(myinfo, out_slot),
        }
    }

    fn validate(&self, myinfo: MyInfo, inputs_info: &[ParentInfo]) -> ValidateResult {
        match self {
            Validator::Slp1(v) => v.validate(myinfo, inputs_info),
            Validator::Nft1Child(v) => v.validate(myinfo, inputs_info),
        }
    }
}

impl Validator {
    pub fn token_id(&self) -> &str {
        match self {
            Validator::Slp1(v) => &v.token_id,
            Validator::Nft1Child(v) => &v.token_id,
        }
    }

    pub fn is_nft1_child(&self) -> bool {
        matches!(self, Validator::Nft1Child(_))
    }
}
