//! Decoding the SLP OP_RETURN message carried in a token transaction's
//! first output.
//!
//! This is the "on-chain transaction parser" spec.md §1 names as an
//! assumed-external collaborator (`parse_slp_output_script`). No such
//! crate exists in the pack, so it is implemented here as a small, clearly
//! separated leaf module: push-data framing only, no consensus logic.
//! Consensus rules live in [`crate::validators`].

use bitcoin::script::{Instruction, Script};

use crate::error::SlpParseError;

const LOKAD_ID: &[u8] = b"SLP\0";

/// The decoded transaction-type-specific fields of an SLP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlpTransactionType {
    Genesis {
        initial_token_mint_quantity: u64,
        mint_baton_vout: Option<u8>,
    },
    Mint {
        token_id_hex: String,
        additional_token_quantity: u64,
        mint_baton_vout: Option<u8>,
    },
    Send {
        token_id_hex: String,
        /// Index 0 is unused, matching the on-chain output numbering
        /// (vout 0 is the OP_RETURN itself).
        token_output: Vec<u64>,
    },
    Commit,
}

/// A decoded SLP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlpMessage {
    pub token_type: u8,
    pub transaction_type: SlpTransactionType,
}

/// Decode the first output's script as an SLP message.
///
/// Returns `Err(SlpParseError::NotSlp)` for any script that does not start
/// with the SLP lokad id (this is treated the same as "unsupported token
/// type" by callers — see §4.1's `get_info`, which prunes both as
/// validity 0).
pub fn parse_slp_output_script(script: &Script) -> Result<SlpMessage, SlpParseError> {
    let mut chunks = PushChunks::new(script);

    let lokad = chunks.next_required("lokad id")?;
    if lokad != LOKAD_ID {
        return Err(SlpParseError::NotSlp);
    }

    let token_type = parse_token_type(&chunks.next_required("token_type")?)?;

    let tx_type_bytes = chunks.next_required("transaction_type")?;
    let tx_type = std::str::from_utf8(&tx_type_bytes)
        .map_err(|_| SlpParseError::Malformed("transaction_type is not ASCII".into()))?;

    let transaction_type = match tx_type {
        "GENESIS" => parse_genesis(&mut chunks)?,
        "MINT" => parse_mint(&mut chunks)?,
        "SEND" => parse_send(&mut chunks)?,
        "COMMIT" => SlpTransactionType::Commit,
        other => {
            return Err(SlpParseError::Malformed(format!(
                "unknown transaction_type: {other}"
            )))
        }
    };

    Ok(SlpMessage {
        token_type,
        transaction_type,
    })
}

fn parse_token_type(bytes: &[u8]) -> Result<u8, SlpParseError> {
    match bytes {
        [b] => Ok(*b),
        // Two-byte encodings (e.g. 0x2001 for "01") are sometimes used on
        // the wire; the meaningful value is the trailing byte.
        [_, b] => Ok(*b),
        _ => Err(SlpParseError::Malformed(
            "token_type field has unexpected length".into(),
        )),
    }
}

fn parse_genesis(chunks: &mut PushChunks<'_>) -> Result<SlpTransactionType, SlpParseError> {
    let _ticker = chunks.next_required("ticker")?;
    let _name = chunks.next_required("name")?;
    let _document_uri = chunks.next_required("document_uri")?;
    let _document_hash = chunks.next_required("document_hash")?;
    let decimals_bytes = chunks.next_required("decimals")?;
    if decimals_bytes.len() != 1 {
        return Err(SlpParseError::Malformed("decimals must be 1 byte".into()));
    }
    let mint_baton_vout = parse_mint_baton_vout(&chunks.next_required("mint_baton_vout")?)?;
    let initial_token_mint_quantity = parse_u64_be(&chunks.next_required("initial_qty")?)?;

    Ok(SlpTransactionType::Genesis {
        initial_token_mint_quantity,
        mint_baton_vout,
    })
}

fn parse_mint(chunks: &mut PushChunks<'_>) -> Result<SlpTransactionType, SlpParseError> {
    let token_id_hex = parse_token_id(&chunks.next_required("token_id")?)?;
    let mint_baton_vout = parse_mint_baton_vout(&chunks.next_required("mint_baton_vout")?)?;
    let additional_token_quantity = parse_u64_be(&chunks.next_required("additional_qty")?)?;

    Ok(SlpTransactionType::Mint {
        token_id_hex,
        additional_token_quantity,
        mint_baton_vout,
    })
}

fn parse_send(chunks: &mut PushChunks<'_>) -> Result<SlpTransactionType, SlpParseError> {
    let token_id_hex = parse_token_id(&chunks.next_required("token_id")?)?;

    let mut token_output = vec![0u64]; // vout 0 (the OP_RETURN) is unused.
    for chunk in chunks.by_ref() {
        token_output.push(parse_u64_be(&chunk)?);
    }
    if token_output.len() < 2 {
        return Err(SlpParseError::Malformed(
            "SEND message has no output quantities".into(),
        ));
    }

    Ok(SlpTransactionType::Send {
        token_id_hex,
        token_output,
    })
}

fn parse_mint_baton_vout(bytes: &[u8]) -> Result<Option<u8>, SlpParseError> {
    match bytes.len() {
        0 => Ok(None),
        1 => Ok(Some(bytes[0])),
        _ => Err(SlpParseError::Malformed(
            "mint_baton_vout must be 0 or 1 bytes".into(),
        )),
    }
}

fn parse_token_id(bytes: &[u8]) -> Result<String, SlpParseError> {
    if bytes.len() != 32 {
        return Err(SlpParseError::Malformed(
            "token_id must be 32 bytes".into(),
        ));
    }
    Ok(hex_encode(bytes))
}

fn parse_u64_be(bytes: &[u8]) -> Result<u64, SlpParseError> {
    if bytes.len() != 8 {
        return Err(SlpParseError::Malformed(
            "amount field must be 8 bytes".into(),
        ));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String never fails");
    }
    s
}

/// Iterator over the push-data chunks of an OP_RETURN script, skipping the
/// leading `OP_RETURN` opcode itself.
struct PushChunks<'a> {
    inner: bitcoin::script::Instructions<'a>,
}

impl<'a> PushChunks<'a> {
    fn new(script: &'a Script) -> Self {
        let mut inner = script.instructions();
        // Consume the OP_RETURN opcode, if present; a script that starts
        // with push data instead is treated the same by `next_required`
        // failing on the lokad id check.
        let mut peek = script.instructions();
        if matches!(peek.next(), Some(Ok(Instruction::Op(op))) if op == bitcoin::opcodes::all::OP_RETURN)
        {
            inner.next();
        }
        Self { inner }
    }

    fn next_required(&mut self, field: &str) -> Result<Vec<u8>, SlpParseError> {
        match self.inner.next() {
            Some(Ok(Instruction::PushBytes(bytes))) => Ok(bytes.as_bytes().to_vec()),
            Some(Ok(Instruction::Op(_))) | None => {
                Err(SlpParseError::Malformed(format!("missing field: {field}")))
            }
            Some(Err(_)) => Err(SlpParseError::Malformed(format!(
                "invalid script data reading field: {field}"
            ))),
        }
    }
}

impl<'a> Iterator for PushChunks<'a> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        match self.inner.next() {
            Some(Ok(Instruction::PushBytes(bytes))) => Some(bytes.as_bytes().to_vec()),
            _ => None,
        }
    }
}
