//! JSON-file-backed `WalletStore`, for demonstration only (SPEC_FULL.md
//! §5 Non-goals: persistence of wallet-level validity is an external
//! collaborator's concern; this is a minimal stand-in, not a reusable
//! library surface).
//!
//! Grounded on the teacher's `LabelStore::with_persistence` (load on
//! startup, write the whole file back out on every mutation) but over a
//! single JSON document instead of a directory of JSONL files, since a
//! wallet's known-transaction set and validity cache are much smaller
//! and less concurrently-edited than a label pack.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use slp_validator_core::{Validity, WalletStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct WalletFile {
    /// txid (lowercase hex) -> hex-encoded raw transaction.
    #[serde(default)]
    transactions: HashMap<String, String>,
    /// txid (lowercase hex) -> validity code (§3 GLOSSARY).
    #[serde(default)]
    validity: HashMap<String, u8>,
}

/// A `WalletStore` backed by a single JSON file on disk, reloaded into
/// memory on construction and flushed back out after every write.
pub struct JsonWalletStore {
    path: PathBuf,
    state: Mutex<WalletFile>,
}

impl JsonWalletStore {
    pub fn open(path: PathBuf) -> eyre::Result<Self> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            WalletFile::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn flush(&self, state: &WalletFile) -> eyre::Result<()> {
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn validity_from_code(code: u8) -> Option<Validity> {
        match code {
            0 => Some(Validity::Unknown),
            1 => Some(Validity::Valid),
            2 => Some(Validity::Malformed),
            3 => Some(Validity::InsufficientValidInputs),
            4 => Some(Validity::TypeOrParentMismatch),
            _ => None,
        }
    }
}

#[async_trait]
impl WalletStore for JsonWalletStore {
    async fn get_transaction(&self, txid: &Txid) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        let hex = state.transactions.get(&txid.to_string())?;
        hex_decode(hex)
    }

    async fn get_validity(&self, txid: &Txid) -> Option<Validity> {
        let state = self.state.lock().await;
        let code = *state.validity.get(&txid.to_string())?;
        Self::validity_from_code(code).filter(|v| v.is_final())
    }

    async fn put_validity(&self, txid: Txid, validity: Validity) {
        let mut state = self.state.lock().await;
        state.validity.insert(txid.to_string(), validity.code());
        if let Err(err) = self.flush(&state) {
            tracing::warn!(%txid, error = %err, "wallet store: failed to persist validity");
        }
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if !s.len().is_multiple_of(2) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
