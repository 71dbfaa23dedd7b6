//! Minimal transaction model used by the validation core.
//!
//! Trimmed from the teacher's `TxNode`/`TxInput`/`TxOutput` shape down to
//! what SLP consensus rules need: a txid, the inputs' prevouts (to walk
//! the ancestor DAG), and the outputs' scripts (to decode the SLP message
//! and to know the output count for alignment, §4.1).

use bitcoin::{OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A transaction, as consumed by the validation core. Raw byte decoding
/// into this shape is the job of the (external, per spec.md §1)
/// `parse_slp_output_script`'s sibling transaction parser; this type is
/// the boundary the core actually operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tx {
    pub txid: Txid,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

/// A transaction input. `prevout` is `None` for coinbase inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: Option<OutPoint>,
}

/// A transaction output; only the script is relevant to SLP validation
/// (amounts are carried in the token message itself, not the BTC value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOut {
    pub script_pubkey: ScriptBuf,
}

impl Tx {
    /// A coinbase transaction has exactly one input with no prevout.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_none()
    }

    /// Decode a consensus-serialized transaction, the raw form returned by
    /// both the tx-fetch interface and the graph-search client (§6).
    pub fn from_raw(raw: &[u8]) -> Result<Tx, CoreError> {
        let decoded: bitcoin::Transaction = bitcoin::consensus::deserialize(raw)
            .map_err(|e| CoreError::InvalidTxData(e.to_string()))?;
        let txid = decoded.compute_txid();
        let is_coinbase = decoded.input.len() == 1 && decoded.input[0].previous_output.is_null();

        let inputs = decoded
            .input
            .iter()
            .map(|txin| TxIn {
                prevout: if is_coinbase {
                    None
                } else {
                    Some(txin.previous_output)
                },
            })
            .collect();
        let outputs = decoded
            .output
            .iter()
            .map(|txout| TxOut {
                script_pubkey: txout.script_pubkey.clone(),
            })
            .collect();

        Ok(Tx {
            txid,
            inputs,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_decodes_a_coinbase_transaction() {
        let tx = bitcoin::Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![bitcoin::TxIn {
                previous_output: OutPoint::null(),
                ..Default::default()
            }],
            output: vec![bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(5_000_000_000),
                script_pubkey: ScriptBuf::new(),
            }],
        };
        let raw = bitcoin::consensus::serialize(&tx);
        let decoded = Tx::from_raw(&raw).unwrap();
        assert!(decoded.is_coinbase());
        assert_eq!(decoded.outputs.len(), 1);
    }
}
