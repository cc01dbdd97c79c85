//! Row encoding: bincode (serde mode) with optional zstd compression.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use zstd::{decode_all, encode_all};

use crate::StoreError;

/// Compression codec options for stored rows.
#[derive(Clone, Debug, Default)]
pub enum CompressionCodec {
    /// No compression (useful for debugging or when storage is not a concern).
    None,
    /// Zstd compression (default, good balance of speed and ratio).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, higher = smaller but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn encode<T: Serialize>(&self, row: &T) -> Result<Vec<u8>, StoreError> {
        let encoded = encode_to_vec(row, standard())?;
        match self.codec {
            CompressionCodec::None => Ok(encoded),
            CompressionCodec::Zstd => Ok(encode_all(encoded.as_slice(), self.level)?),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, StoreError> {
        let decompressed = match self.codec {
            CompressionCodec::None => data.to_vec(),
            CompressionCodec::Zstd => decode_all(data)?,
        };
        let (row, _) = decode_from_slice(&decompressed, standard())?;
        Ok(row)
    }
}
