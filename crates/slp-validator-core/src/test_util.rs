//! Test fixtures shared by the validator and graph test modules.
//!
//! Not part of the public API; only compiled under `#[cfg(test)]` via
//! `lib.rs`.

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::Builder;
use bitcoin::{OutPoint, ScriptBuf, Txid};

use crate::tx::{Tx, TxIn, TxOut};

/// A deterministic txid derived from a short label, so tests can write
/// `"g1"` instead of a real 32-byte hash.
pub fn txid(label: &str) -> Txid {
    let hash = bitcoin::hashes::sha256d::Hash::hash(label.as_bytes());
    Txid::from_raw_hash(hash)
}

pub fn outpoint(label: &str, vout: u32) -> OutPoint {
    OutPoint {
        txid: txid(label),
        vout,
    }
}

pub fn input(prevout: Option<OutPoint>) -> TxIn {
    TxIn { prevout }
}

pub fn make_tx(txid_label: &str, inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Tx {
    Tx {
        txid: txid(txid_label),
        inputs,
        outputs,
    }
}

fn op_return_output(script: ScriptBuf) -> TxOut {
    TxOut { script_pubkey: script }
}

fn push(builder: Builder, bytes: &[u8]) -> Builder {
    builder.push_slice(<&bitcoin::script::PushBytes>::try_from(bytes).unwrap())
}

pub fn commit_script() -> TxOut {
    let mut b = Builder::new().push_opcode(OP_RETURN);
    b = push(b, b"SLP\0");
    b = push(b, &[0x01]);
    b = push(b, b"COMMIT");
    op_return_output(b.into_script())
}

/// A GENESIS transaction with `num_outputs` real (non-OP_RETURN) outputs
/// plus the OP_RETURN itself, so `tx.outputs.len() == num_outputs + 1`.
pub fn make_genesis_tx(
    txid_label: &str,
    initial_qty: u64,
    mint_baton_vout: Option<u8>,
    num_outputs: usize,
) -> Tx {
    let mut b = Builder::new().push_opcode(OP_RETURN);
    b = push(b, b"SLP\0");
    b = push(b, &[0x01]);
    b = push(b, b"GENESIS");
    b = push(b, b"TICK");
    b = push(b, b"Name");
    b = push(b, b"");
    b = push(b, b"");
    b = push(b, &[0u8]);
    match mint_baton_vout {
        Some(v) => b = push(b, &[v]),
        None => b = push(b, b""),
    }
    b = push(b, &initial_qty.to_be_bytes());

    let mut outputs = vec![op_return_output(b.into_script())];
    outputs.extend((0..num_outputs).map(|_| TxOut {
        script_pubkey: ScriptBuf::new(),
    }));

    Tx {
        txid: txid(txid_label),
        inputs: vec![input(Some(outpoint("parent", 0)))],
        outputs,
    }
}

/// A SEND transaction. `token_output_amounts[i]` is the quantity for
/// vout `i + 1`; `num_outputs` pads/truncates the real-output list to
/// match (mirrors `align_outputs`). Its sole input spends `parent:0`.
pub fn make_send_tx(token_id: &str, token_output_amounts: Vec<u64>, num_outputs: usize) -> Tx {
    make_send_tx_spending(token_id, token_output_amounts, num_outputs, outpoint("parent", 0))
}

/// As [`make_send_tx`], but the caller chooses which outpoint the SEND's
/// sole input spends — needed when a test seeds a parent node at a
/// specific txid/vout and the graph walk must actually reach it.
pub fn make_send_tx_spending(
    token_id: &str,
    token_output_amounts: Vec<u64>,
    num_outputs: usize,
    spends: OutPoint,
) -> Tx {
    let token_id_bytes = hex_decode(&pad_token_id(token_id));

    let mut b = Builder::new().push_opcode(OP_RETURN);
    b = push(b, b"SLP\0");
    b = push(b, &[0x01]);
    b = push(b, b"SEND");
    b = push(b, &token_id_bytes);
    for amount in &token_output_amounts {
        b = push(b, &amount.to_be_bytes());
    }

    let mut outputs = vec![op_return_output(b.into_script())];
    outputs.extend((0..num_outputs).map(|_| TxOut {
        script_pubkey: ScriptBuf::new(),
    }));

    Tx {
        txid: txid("send-tx"),
        inputs: vec![input(Some(spends))],
        outputs,
    }
}

/// An NFT1 child GENESIS (token_type 65, quantity 1, no baton) whose sole
/// input spends `parent_txid:parent_vout` — the group token output the
/// child's validity is resolved against.
pub fn make_nft1_genesis_tx(txid_label: &str, parent_txid: Txid, parent_vout: u32) -> Tx {
    let mut tx = make_nft1_genesis_tx_with(txid_label, 1, None, 1);
    tx.inputs = vec![input(Some(OutPoint {
        txid: parent_txid,
        vout: parent_vout,
    }))];
    tx
}

/// An NFT1 child GENESIS (token_type 65) with a caller-chosen quantity and
/// mint baton, for exercising `get_info`'s malformed-shape rejections.
pub fn make_nft1_genesis_tx_with(
    txid_label: &str,
    initial_qty: u64,
    mint_baton_vout: Option<u8>,
    num_outputs: usize,
) -> Tx {
    let mut b = Builder::new().push_opcode(OP_RETURN);
    b = push(b, b"SLP\0");
    b = push(b, &[65u8]);
    b = push(b, b"GENESIS");
    b = push(b, b"TICK");
    b = push(b, b"Name");
    b = push(b, b"");
    b = push(b, b"");
    b = push(b, &[0u8]);
    match mint_baton_vout {
        Some(v) => b = push(b, &[v]),
        None => b = push(b, b""),
    }
    b = push(b, &initial_qty.to_be_bytes());

    let mut outputs = vec![op_return_output(b.into_script())];
    outputs.extend((0..num_outputs).map(|_| TxOut {
        script_pubkey: ScriptBuf::new(),
    }));

    Tx {
        txid: txid(txid_label),
        inputs: vec![input(Some(outpoint("parent", 0)))],
        outputs,
    }
}

/// An NFT1 child SEND (token_type 65).
pub fn make_nft1_send_tx(token_id: &str, token_output_amounts: Vec<u64>, num_outputs: usize) -> Tx {
    let token_id_bytes = hex_decode(&pad_token_id(token_id));

    let mut b = Builder::new().push_opcode(OP_RETURN);
    b = push(b, b"SLP\0");
    b = push(b, &[65u8]);
    b = push(b, b"SEND");
    b = push(b, &token_id_bytes);
    for amount in &token_output_amounts {
        b = push(b, &amount.to_be_bytes());
    }

    let mut outputs = vec![op_return_output(b.into_script())];
    outputs.extend((0..num_outputs).map(|_| TxOut {
        script_pubkey: ScriptBuf::new(),
    }));

    Tx {
        txid: txid("nft1-send-tx"),
        inputs: vec![input(Some(outpoint("parent", 0)))],
        outputs,
    }
}

/// Pads/truncates a short test label (e.g. `"tok"`) out to 64 hex chars
/// so it round-trips through the 32-byte on-chain `token_id` field. Tests
/// that construct a validator for a `make_send_tx`/`make_mint_tx` fixture
/// must build the validator's `token_id` with this same function.
pub fn pad_token_id(label: &str) -> String {
    let mut hex: String = label.bytes().map(|b| format!("{b:02x}")).collect();
    hex.truncate(64);
    while hex.len() < 64 {
        hex.push('0');
    }
    hex
}

fn hex_decode(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}
