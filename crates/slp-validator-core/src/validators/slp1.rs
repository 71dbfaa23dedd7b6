//! SLP1 fungible-token validator (token type 1 / 129), §4.1.

use crate::slp_script::{parse_slp_output_script, SlpTransactionType};
use crate::tx::Tx;
use crate::types::{GetInfoResult, MyInfo, OutputSlot, ParentInfo, TokenId, ValidateResult, Validity};

use super::{align_outputs, TokenValidator};

/// Validates SLP1 fungible-token transactions for one token-id.
///
/// `enforced_token_type` is 1 or 129: the graph's validator is
/// instantiated for whichever of the two this token-id's GENESIS declared
/// (§4.1: "token_type does not match the enforced type").
#[derive(Debug, Clone)]
pub struct Slp1Validator {
    pub token_id: TokenId,
    pub enforced_token_type: u8,
}

impl Slp1Validator {
    pub fn new(token_id: TokenId, enforced_token_type: u8) -> Self {
        Self {
            token_id,
            enforced_token_type,
        }
    }
}

impl TokenValidator for Slp1Validator {
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

        if !matches!(msg.token_type, 1 | 129) {
            return GetInfoResult::Prune(Validity::Unknown);
        }
        if msg.token_type != self.enforced_token_type {
            return GetInfoResult::Prune(Validity::TypeOrParentMismatch);
        }

        let (token_id_hex, vin_mask, myinfo, outputs) = match msg.transaction_type {
            SlpTransactionType::Genesis {
                initial_token_mint_quantity,
                mint_baton_vout,
            } => {
                let token_id_hex = tx.txid.to_string();
                let vin_mask = vec![false; tx.inputs.len()];
                let outputs =
                    genesis_or_mint_outputs(initial_token_mint_quantity, mint_baton_vout);
                (token_id_hex, vin_mask, MyInfo::Genesis, outputs)
            }
            SlpTransactionType::Mint {
                token_id_hex,
                additional_token_quantity,
                mint_baton_vout,
            } => {
                let vin_mask = vec![true; tx.inputs.len()];
                let outputs = genesis_or_mint_outputs(additional_token_quantity, mint_baton_vout);
                (token_id_hex, vin_mask, MyInfo::Mint, outputs)
            }
            SlpTransactionType::Send {
                token_id_hex,
                token_output,
            } => {
                let vin_mask = vec![true; tx.inputs.len()];
                // Sum computed before length alignment, per §4.1.
                let myinfo = MyInfo::SendSum(token_output.iter().sum());
                let outputs = token_output
                    .into_iter()
                    .map(OutputSlot::Amount)
                    .collect::<Vec<_>>();
                (token_id_hex, vin_mask, myinfo, outputs)
            }
            SlpTransactionType::Commit => return GetInfoResult::Prune(Validity::Unknown),
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
            MyInfo::Mint => matches!(out_slot, OutputSlot::Mint),
            MyInfo::Genesis => unreachable!("GENESIS has no parents to check_needed against"),
            MyInfo::SendSum(_) => matches!(out_slot, OutputSlot::Amount(n) if n > 0),
        }
    }

    fn validate(&self, myinfo: MyInfo, inputs_info: &[ParentInfo]) -> ValidateResult {
        match myinfo {
            MyInfo::Genesis => {
                assert!(inputs_info.is_empty(), "GENESIS must have no parent inputs");
                ValidateResult::Decided(Validity::Valid)
            }
            MyInfo::Mint => {
                if inputs_info.is_empty() {
                    return ValidateResult::Decided(Validity::InsufficientValidInputs);
                }
                if inputs_info
                    .iter()
                    .any(|inp| inp.parent_validity == Validity::Valid)
                {
                    return ValidateResult::Decided(Validity::Valid);
                }
                ValidateResult::Pending
            }
            MyInfo::SendSum(required) => validate_send(required, inputs_info),
        }
    }
}

/// Shared output-shape logic for GENESIS and MINT (§4.1 table): output 1
/// carries the minted quantity, and the designated baton vout (if any)
/// carries the `Mint` sentinel.
fn genesis_or_mint_outputs(qty: u64, mint_baton_vout: Option<u8>) -> Vec<OutputSlot> {
    let mut outputs = vec![OutputSlot::None, OutputSlot::None];
    if let Some(k) = mint_baton_vout {
        let k = k as usize;
        if outputs.len() <= k {
            outputs.resize(k + 1, OutputSlot::None);
        }
        outputs[k] = OutputSlot::Mint;
    }
    outputs[1] = OutputSlot::Amount(qty);
    outputs
}

/// SEND validation shared by SLP1 and NFT1 (§4.1).
pub(super) fn validate_send(required: u64, inputs_info: &[ParentInfo]) -> ValidateResult {
    let insum_all: u64 = inputs_info
        .iter()
        .filter(|inp| matches!(inp.parent_validity, Validity::Unknown | Validity::Valid))
        .map(|inp| inp.parent_out_slot)
        .sum();
    if insum_all < required {
        return ValidateResult::Decided(Validity::InsufficientValidInputs);
    }

    let insum_valid: u64 = inputs_info
        .iter()
        .filter(|inp| inp.parent_validity == Validity::Valid)
        .map(|inp| inp.parent_out_slot)
        .sum();
    if insum_valid >= required {
        return ValidateResult::Decided(Validity::Valid);
    }

    ValidateResult::Pending
}
