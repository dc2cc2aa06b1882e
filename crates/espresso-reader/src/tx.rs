//! Typed signed transactions submitted through the external sequencer.
//!
//! A transaction is a JSON envelope carrying EIP-712 typed data and the
//! sender's signature over its digest. The digest doubles as the
//! transaction id persisted with the resulting input.

use alloy_primitives::{Address, Signature, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use serde::Deserialize;
use thiserror::Error;

use rollups_primitives::{Buf20, Buf32};

sol! {
    /// What the user actually signs.
    struct CartesiMessage {
        address app;
        uint64 nonce;
        bytes data;
    }
}

#[derive(Debug, Error)]
pub enum TxError {
    #[error("malformed transaction envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad hex field: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("bad address `{0}`")]
    Address(String),

    #[error("signature rejected: {0}")]
    Signature(String),
}

#[derive(Debug, Deserialize)]
struct SignedTransaction {
    #[serde(rename = "typedData")]
    typed_data: TypedData,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct TypedData {
    domain: Domain,
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Domain {
    name: String,
    version: String,
    #[serde(rename = "chainId")]
    chain_id: u64,
    #[serde(rename = "verifyingContract")]
    verifying_contract: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    app: String,
    nonce: u64,
    data: String,
}

/// A fully validated transaction: sender recovered, payload decoded.
#[derive(Clone, Debug)]
pub struct ExtractedTransaction {
    pub sender: Buf20,
    pub app: Buf20,
    pub nonce: u64,
    pub payload: Vec<u8>,
    /// EIP-712 digest of the typed data, the transaction id.
    pub sig_hash: Buf32,
}

fn parse_address(raw: &str) -> Result<Address, TxError> {
    raw.parse::<Address>()
        .map_err(|_| TxError::Address(raw.to_string()))
}

/// `0x`-prefixed fields are hex payloads; anything else is taken verbatim.
fn decode_payload(data: &str) -> Result<Vec<u8>, TxError> {
    match data.strip_prefix("0x") {
        Some(digits) => Ok(hex::decode(digits)?),
        None => Ok(data.as_bytes().to_vec()),
    }
}

/// Parses a raw sequencer transaction, recovers the signer and returns the
/// validated fields.
pub fn extract_sig_and_data(raw: &[u8]) -> Result<ExtractedTransaction, TxError> {
    let tx: SignedTransaction = serde_json::from_slice(raw)?;

    let app = parse_address(&tx.typed_data.message.app)?;
    let verifying_contract = parse_address(&tx.typed_data.domain.verifying_contract)?;
    let domain = Eip712Domain {
        name: Some(tx.typed_data.domain.name.clone().into()),
        version: Some(tx.typed_data.domain.version.clone().into()),
        chain_id: Some(U256::from(tx.typed_data.domain.chain_id)),
        verifying_contract: Some(verifying_contract),
        salt: None,
    };

    let payload = decode_payload(&tx.typed_data.message.data)?;
    let message = CartesiMessage {
        app,
        nonce: tx.typed_data.message.nonce,
        data: payload.clone().into(),
    };
    let digest = message.eip712_signing_hash(&domain);

    let sig_hex = tx.signature.strip_prefix("0x").unwrap_or(&tx.signature);
    let sig_bytes = hex::decode(sig_hex)?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| TxError::Signature(e.to_string()))?;
    let sender = signature
        .recover_address_from_prehash(&digest)
        .map_err(|e| TxError::Signature(e.to_string()))?;

    Ok(ExtractedTransaction {
        sender: sender.into(),
        app: app.into(),
        nonce: tx.typed_data.message.nonce,
        payload,
        sig_hash: digest.into(),
    })
}


#[cfg(test)]
mod tests {
    use super::testing::signed_envelope;
    use super::*;
    use alloy_signer_local::PrivateKeySigner;

    #[test]
    fn test_recovers_signer() {
        let signer = PrivateKeySigner::random();
        let app = Buf20::from([0x11; 20]);
        let raw = signed_envelope(&signer, app, 3, "0xdeadbeef", 31337);

        let tx = extract_sig_and_data(&raw).unwrap();
        assert_eq!(tx.sender, signer.address().into());
        assert_eq!(tx.app, app);
        assert_eq!(tx.nonce, 3);
        assert_eq!(tx.payload, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_plain_text_payload_taken_verbatim() {
        let signer = PrivateKeySigner::random();
        let raw = signed_envelope(&signer, Buf20::from([0x22; 20]), 0, "hello", 1);
        let tx = extract_sig_and_data(&raw).unwrap();
        assert_eq!(tx.payload, b"hello");
    }

    #[test]
    fn test_tampered_message_changes_sender() {
        let signer = PrivateKeySigner::random();
        let app = Buf20::from([0x11; 20]);
        let raw = signed_envelope(&signer, app, 0, "0xff", 1);

        // flip the nonce after signing
        let mut doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        doc["typedData"]["message"]["nonce"] = 1.into();
        let tx = extract_sig_and_data(doc.to_string().as_bytes()).unwrap();
        assert_ne!(tx.sender, signer.address().into());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(extract_sig_and_data(b"not json").is_err());
        assert!(extract_sig_and_data(br#"{"typedData":{},"signature":"0x"}"#).is_err());
    }
}
