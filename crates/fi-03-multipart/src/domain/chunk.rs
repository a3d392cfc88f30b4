//! # Chunk Codec
//!
//! | Tag | Encoding |
//! |-----|----------|
//! | `z64:` | zstd, then base64 |
//! | `b64:` | base64 |
//! | none | raw text |
//!
//! The tag on part 0 decides for the whole chain. A chain whose part 0 is
//! untagged is raw from end to end, so a later chunk that happens to start
//! with `b64:` is still taken verbatim.

use super::errors::ChunkError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Tag of compressed chunks.
pub const ZSTD_TAG: &str = "z64:";

/// Tag of base64-only chunks.
pub const BASE64_TAG: &str = "b64:";

/// Ceiling on one decompressed chunk.
pub const MAX_DECODED_CHUNK: usize = 1 << 20;

/// How a chunk is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEncoding {
    /// Untagged text.
    Raw,
    /// `b64:`
    Base64,
    /// `z64:`
    Zstd,
}

/// Encode `bytes` with a specific encoding.
pub fn encode_chunk(bytes: &[u8], encoding: ChunkEncoding, level: i32) -> Result<String, ChunkError> {
    match encoding {
        ChunkEncoding::Raw => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ChunkEncoding::Base64 => Ok(format!("{BASE64_TAG}{}", STANDARD.encode(bytes))),
        ChunkEncoding::Zstd => {
            let compressed = zstd::bulk::compress(bytes, level)
                .map_err(|e| ChunkError::Compression(e.to_string()))?;
            Ok(format!("{ZSTD_TAG}{}", STANDARD.encode(compressed)))
        }
    }
}

/// Encode `bytes` both ways and keep the shorter (base64 on a tie).
pub fn encode_shortest(bytes: &[u8], level: i32) -> Result<String, ChunkError> {
    let plain = encode_chunk(bytes, ChunkEncoding::Base64, level)?;
    let packed = encode_chunk(bytes, ChunkEncoding::Zstd, level)?;
    Ok(if packed.len() < plain.len() { packed } else { plain })
}

/// Encoding named by a chunk's tag.
pub fn chunk_encoding(chunk: &str) -> ChunkEncoding {
    if chunk.starts_with(ZSTD_TAG) {
        ChunkEncoding::Zstd
    } else if chunk.starts_with(BASE64_TAG) {
        ChunkEncoding::Base64
    } else {
        ChunkEncoding::Raw
    }
}

/// Decode a chunk back to payload bytes.
pub fn decode_chunk(chunk: &str) -> Result<Vec<u8>, ChunkError> {
    match chunk_encoding(chunk) {
        ChunkEncoding::Raw => Ok(chunk.as_bytes().to_vec()),
        ChunkEncoding::Base64 => decode_base64(&chunk[BASE64_TAG.len()..]),
        ChunkEncoding::Zstd => {
            let compressed = decode_base64(&chunk[ZSTD_TAG.len()..])?;
            zstd::bulk::decompress(&compressed, MAX_DECODED_CHUNK)
                .map_err(|e| ChunkError::Compression(e.to_string()))
        }
    }
}

/// Decode a chain's chunks, given in part order.
///
/// An untagged (or missing) head makes every chunk raw. A tagged head makes
/// every chunk decode by its own tag, and an untagged later chunk is an error.
pub fn decode_chain<'a, I>(chunks: I) -> Result<Vec<u8>, ChunkError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut chunks = chunks.into_iter().peekable();
    let encoded = chunks
        .peek()
        .is_some_and(|head| chunk_encoding(head) != ChunkEncoding::Raw);

    let mut payload = Vec::new();
    for (part, chunk) in (0u32..).zip(chunks) {
        if !encoded {
            payload.extend_from_slice(chunk.as_bytes());
        } else if chunk_encoding(chunk) == ChunkEncoding::Raw {
            return Err(ChunkError::UntaggedPart(part));
        } else {
            payload.extend(decode_chunk(chunk)?);
        }
    }
    Ok(payload)
}

fn decode_base64(text: &str) -> Result<Vec<u8>, ChunkError> {
    STANDARD
        .decode(text)
        .map_err(|e| ChunkError::InvalidBase64(e.to_string()))
}
