//! Remote Value Codec
//!
//! Pluggable encoding for envelopes sent to the remote tier, chosen once when
//! the façade is built.
//!
//! # Example
//!
//! ```
//! use tradecache::cache::codec::{CodecKind, ValueCodec};
//!
//! let codec = CodecKind::Lz4.build();
//! let data = br#"{"data":"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"}"#;
//!
//! let encoded = codec.encode(data).unwrap();
//! assert_eq!(codec.decode(&encoded).unwrap().as_ref(), &data[..]);
//! ```

use std::str::FromStr;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Codec Selection
// =============================================================================

/// Available codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Bytes go over the wire as produced
    #[default]
    None,
    /// LZ4 block compression for payloads above a size threshold
    Lz4,
}

impl CodecKind {
    pub fn name(&self) -> &'static str {
        match self {
            CodecKind::None => "none",
            CodecKind::Lz4 => "lz4",
        }
    }

    /// Instantiate the codec
    pub fn build(&self) -> Arc<dyn ValueCodec> {
        match self {
            CodecKind::None => Arc::new(PassthroughCodec),
            CodecKind::Lz4 => Arc::new(Lz4Codec::default()),
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "passthrough" => Ok(CodecKind::None),
            "lz4" => Ok(CodecKind::Lz4),
            other => Err(Error::Config(format!("unknown codec: {}", other))),
        }
    }
}

// =============================================================================
// Codec Trait
// =============================================================================

/// Envelope encoder/decoder
pub trait ValueCodec: Send + Sync {
    fn kind(&self) -> CodecKind;

    fn encode(&self, data: &[u8]) -> Result<Bytes>;

    fn decode(&self, data: &[u8]) -> Result<Bytes>;
}

/// Identity codec
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl ValueCodec for PassthroughCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::None
    }

    fn encode(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn decode(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

// =============================================================================
// LZ4 Codec
// =============================================================================

const TAG_RAW: u8 = 0;
const TAG_LZ4: u8 = 1;

/// LZ4 codec
///
/// Output is one tag byte followed by the body. Payloads smaller than
/// `min_size` (or that do not shrink) are stored raw.
#[derive(Debug, Clone, Copy)]
pub struct Lz4Codec {
    min_size: usize,
}

impl Lz4Codec {
    pub fn with_min_size(min_size: usize) -> Self {
        Self { min_size }
    }
}

impl Default for Lz4Codec {
    fn default() -> Self {
        Self::with_min_size(256)
    }
}

fn framed(tag: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_u8(tag);
    buf.put_slice(body);
    buf.freeze()
}

impl ValueCodec for Lz4Codec {
    fn kind(&self) -> CodecKind {
        CodecKind::Lz4
    }

    fn encode(&self, data: &[u8]) -> Result<Bytes> {
        if data.len() < self.min_size {
            return Ok(framed(TAG_RAW, data));
        }

        let compressed =
            lz4::block::compress(data, None, true).map_err(|e| Error::CompressionFailed {
                algorithm: "LZ4".into(),
                reason: e.to_string(),
            })?;

        if compressed.len() >= data.len() {
            Ok(framed(TAG_RAW, data))
        } else {
            Ok(framed(TAG_LZ4, &compressed))
        }
    }

    fn decode(&self, data: &[u8]) -> Result<Bytes> {
        match data.split_first() {
            Some((&TAG_RAW, body)) => Ok(Bytes::copy_from_slice(body)),
            Some((&TAG_LZ4, body)) => lz4::block::decompress(body, None)
                .map(Bytes::from)
                .map_err(|e| Error::DecompressionFailed {
                    algorithm: "LZ4".into(),
                    reason: e.to_string(),
                }),
            Some((tag, _)) => Err(Error::DecompressionFailed {
                algorithm: "LZ4".into(),
                reason: format!("unknown frame tag {}", tag),
            }),
            None => Err(Error::DecompressionFailed {
                algorithm: "LZ4".into(),
                reason: "empty frame".into(),
            }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
