//! NFT1 child-token validator (token type 65), §4.1.
//!
//! NFT1 child GENESIS is cross-graph: its validity depends on the parent
//! group transaction's verdict in a *different* token graph (type 1/129).
//! That resolution cannot be expressed as a pure function of
//! `(myinfo, inputs_info)` alone, so `validate` treats the already-
//! resolved parent verdict as the sole synthetic input the orchestration
//! layer (`crate::job`) supplies once it has asked the `GraphContext` for
//! the parent's graph.

use crate::slp_script::{parse_slp_output_script, SlpTransactionType};
use crate::tx::Tx;
use crate::types::{GetInfoResult, MyInfo, OutputSlot, ParentInfo, TokenId, ValidateResult, Validity};

use super::slp1::validate_send;
use super::{align_outputs, TokenValidator};

pub(crate) const NFT1_CHILD_TOKEN_TYPE: u8 = 65;

#[derive(Debug, Clone)]
pub struct Nft1ChildValidator {
    pub token_id: TokenId,
}

impl Nft1ChildValidator {
    pub fn new(token_id: TokenId) -> Self {
        Self { token_id }
    }
}

impl TokenValidator for Nft1ChildValidator {
    fn get_info(&self, tx: &Tx) -> GetInfoResult {
        if tx.outputs.is_empty() {
            return GetInfoResult::Prune(Validity::Malformed);
        }

        let msg = match parse_slp_output_script(&tx.outputs[0].script_pubkey) {
            Ok(msg) => msg,
            Err(crate::error::SlpParseError::NotSlp) => return GetInfoResult::Prune(Validity::Unknown),
            Err(crate::error::SlpParseError::Malformed(_)) => {
                return GetInfoResult::Prune(Validity::Malformed)
            }
        };

        if msg.token_type != NFT1_CHILD_TOKEN_TYPE {
            return GetInfoResult::Prune(Validity::Unknown);
        }

        let (token_id_hex, vin_mask, myinfo, outputs) = match msg.transaction_type {
            SlpTransactionType::Mint { .. } => return GetInfoResult::Prune(Validity::Malformed),
            SlpTransactionType::Commit => return GetInfoResult::Prune(Validity::Unknown),
            SlpTransactionType::Genesis {
                initial_token_mint_quantity,
                mint_baton_vout,
            } => {
                if mint_baton_vout.is_some() {
                    return GetInfoResult::Prune(Validity::Malformed);
                }
                if initial_token_mint_quantity > 1 {
                    return GetInfoResult::Prune(Validity::Malformed);
                }
                let token_id_hex = tx.txid.to_string();
                let vin_mask = vec![false; tx.inputs.len()];
                let outputs = vec![OutputSlot::None, OutputSlot::Amount(initial_token_mint_quantity)];
                (token_id_hex, vin_mask, MyInfo::Genesis, outputs)
            }
            SlpTransactionType::Send {
                token_id_hex,
                token_output,
            } => {
                if token_output.len() != 2 || token_output[1] != 1 {
                    return GetInfoResult::Prune(Validity::Malformed);
                }
                let vin_mask = vec![true; tx.inputs.len()];
                let myinfo = MyInfo::SendSum(token_output.iter().sum());
                let outputs = token_output
                    .into_iter()
                    .map(OutputSlot::Amount)
                    .collect::<Vec<_>>();
                (token_id_hex, vin_mask, myinfo, outputs)
            }
        };

        if token_id_hex != self.token_id {
            return GetInfoResult::Prune(Validity::Unknown);
        }

        GetInfoResult::Info {
            vin_mask,
            myinfo,
            outputs: align_outputs(outputs, tx.outputs.len()),
        }
    }

    fn check_needed(&self, myinfo: MyInfo, out_slot: OutputSlot) -> bool {
        match myinfo {
            MyInfo::Genesis => unreachable!("GENESIS has no parents to check_needed against"),
            MyInfo::Mint => unreachable!("NFT1 child has no MINT transactions"),
            MyInfo::SendSum(_) => matches!(out_slot, OutputSlot::Amount(n) if n > 0),
        }
    }

    fn validate(&self, myinfo: MyInfo, inputs_info: &[ParentInfo]) -> ValidateResult {
        match myinfo {
            // The job layer resolves GENESIS directly from the parent
            // group's verdict (§4.1) rather than calling through here;
            // this validator never sees a GENESIS `validate` call.
            MyInfo::Genesis => ValidateResult::Pending,
            MyInfo::Mint => unreachable!("NFT1 child has no MINT transactions"),
            MyInfo::SendSum(required) => validate_send(required, inputs_info),
        }
    }
}

/// Resolve an NFT1 child GENESIS verdict from its parent group
/// transaction's verdict (§4.1 last bullet): valid with a nonzero amount
/// at the output the child spends resolves the child genesis to valid;
/// anything else is a parent mismatch.
pub fn resolve_genesis_from_parent(parent_validity: Validity, parent_spent_amount: u64) -> Validity {
    if parent_validity == Validity::Valid && parent_spent_amount > 0 {
        Validity::Valid
    } else {
        Validity::TypeOrParentMismatch
    }
}
