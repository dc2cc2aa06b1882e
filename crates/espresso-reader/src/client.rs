//! Client for the external sequencer's availability API.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

pub type EspressoResult<T> = Result<T, EspressoClientError>;

#[derive(Debug, Error)]
pub enum EspressoClientError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode sequencer response: {0}")]
    Decode(String),
}

impl EspressoClientError {
    fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// L1 commitment carried by a sequencer block header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct L1Finalized {
    pub number: u64,
    pub timestamp: u64,
}

/// The slice of a sequencer block header the reader uses.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EspressoHeader {
    pub l1_finalized: Option<L1Finalized>,
}

/// Capability surface the espresso reader needs from the sequencer.
#[async_trait]
pub trait EspressoClient: Send + Sync + 'static {
    async fn latest_block_height(&self) -> EspressoResult<u64>;

    async fn header(&self, height: u64) -> EspressoResult<EspressoHeader>;

    /// Raw namespace tables for blocks `from..=to`, one entry per block.
    async fn namespace_tables(&self, from: u64, to: u64) -> EspressoResult<Vec<Vec<u8>>>;

    /// Raw transaction payloads of one block, restricted to `namespace`.
    async fn transactions_in_block(
        &self,
        height: u64,
        namespace: u64,
    ) -> EspressoResult<Vec<Vec<u8>>>;
}

// wire types

#[derive(Deserialize)]
struct HeaderEnvelope {
    fields: HeaderFields,
}

#[derive(Deserialize)]
struct HeaderFields {
    #[serde(default)]
    l1_finalized: Option<RawL1Finalized>,
    #[serde(default)]
    ns_table: Option<RawNsTable>,
}

#[derive(Deserialize)]
struct RawL1Finalized {
    number: u64,
    /// Hex-encoded (`0x…`) seconds.
    timestamp: String,
}

#[derive(Deserialize)]
struct RawNsTable {
    bytes: String,
}

#[derive(Deserialize)]
struct NamespaceBlock {
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

#[derive(Deserialize)]
struct RawTransaction {
    payload: String,
}

fn parse_hex_timestamp(raw: &str) -> EspressoResult<u64> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|e| EspressoClientError::Decode(format!("timestamp {raw}: {e}")))
}

/// HTTP implementation over the availability endpoints.
pub struct HttpEspressoClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEspressoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: String) -> EspressoResult<T> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl EspressoClient for HttpEspressoClient {
    async fn latest_block_height(&self) -> EspressoResult<u64> {
        self.get_json("status/block-height".to_string()).await
    }

    async fn header(&self, height: u64) -> EspressoResult<EspressoHeader> {
        let envelope: HeaderEnvelope = self
            .get_json(format!("availability/header/{height}"))
            .await?;
        let l1_finalized = envelope
            .fields
            .l1_finalized
            .map(|raw| {
                Ok::<_, EspressoClientError>(L1Finalized {
                    number: raw.number,
                    timestamp: parse_hex_timestamp(&raw.timestamp)?,
                })
            })
            .transpose()?;
        Ok(EspressoHeader { l1_finalized })
    }

    async fn namespace_tables(&self, from: u64, to: u64) -> EspressoResult<Vec<Vec<u8>>> {
        // the range endpoint is exclusive of its upper bound
        let envelopes: Vec<HeaderEnvelope> = self
            .get_json(format!("availability/header/{from}/{}", to + 1))
            .await?;
        envelopes
            .into_iter()
            .map(|envelope| {
                let encoded = envelope
                    .fields
                    .ns_table
                    .map(|t| t.bytes)
                    .unwrap_or_default();
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(EspressoClientError::decode)
            })
            .collect()
    }

    async fn transactions_in_block(
        &self,
        height: u64,
        namespace: u64,
    ) -> EspressoResult<Vec<Vec<u8>>> {
        let block: NamespaceBlock = self
            .get_json(format!("availability/block/{height}/namespace/{namespace}"))
            .await?;
        block
            .transactions
            .into_iter()
            .map(|tx| {
                base64::engine::general_purpose::STANDARD
                    .decode(tx.payload)
                    .map_err(EspressoClientError::decode)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_timestamp() {
        assert_eq!(parse_hex_timestamp("0x66fbd63b").unwrap(), 0x66fbd63b);
        assert!(parse_hex_timestamp("0xnope").is_err());
    }

    #[test]
    fn test_header_envelope_decodes() {
        let raw = r#"{"fields":{"l1_finalized":{"number":42,"timestamp":"0x2a"},"ns_table":{"bytes":"AQIDBA=="}}}"#;
        let envelope: HeaderEnvelope = serde_json::from_str(raw).unwrap();
        let l1 = envelope.fields.l1_finalized.unwrap();
        assert_eq!(l1.number, 42);
        assert_eq!(parse_hex_timestamp(&l1.timestamp).unwrap(), 42);
        assert_eq!(envelope.fields.ns_table.unwrap().bytes, "AQIDBA==");
    }

    #[test]
    fn test_header_without_l1_finalized() {
        let raw = r#"{"fields":{}}"#;
        let envelope: HeaderEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.fields.l1_finalized.is_none());
    }
}
