//! Content digests and the streaming digest engine
//!
//! Every blob is addressed by the lowercase hex BLAKE3-256 of its content.
//! `digest_stream` folds an arbitrary byte stream through a hasher and is a
//! pure function of the byte sequence: two streams yielding equal bytes
//! produce equal `(digest, length)` pairs.

use std::fmt;
use std::str::FromStr;

use futures::StreamExt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;
use crate::store::ByteStream;

/// Chunk size used when reading blob content (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A validated blob digest: 64 lowercase hex characters of BLAKE3-256.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Length of the hex encoding.
    pub const HEX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_hash(hash: blake3::Hash) -> Self {
        Digest(hash.to_hex().to_string())
    }
}

impl FromStr for Digest {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(StoreError::InvalidDigest(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(StoreError::InvalidDigest(format!(
                "not lowercase hex: {}",
                s
            )));
        }
        Ok(Digest(s.to_string()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.0[..8])
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the digest of an in-memory byte slice.
pub fn digest_bytes(data: &[u8]) -> Digest {
    Digest::from_hash(blake3::hash(data))
}

/// Read a stream to the end, returning its digest and total byte count.
///
/// The stream is consumed; callers that need the content again must re-open
/// their source. I/O errors from the stream propagate unchanged.
pub async fn digest_stream(mut stream: ByteStream) -> Result<(Digest, u64), StoreError> {
    let mut hasher = blake3::Hasher::new();
    let mut content_length: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        content_length += chunk.len() as u64;
    }
    Ok((Digest::from_hash(hasher.finalize()), content_length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn stream_of(chunks: Vec<&'static [u8]>) -> ByteStream {
        let chunks: Vec<Result<Bytes, StoreError>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c)))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    #[test]
    fn empty_input_digest() {
        // Well-known BLAKE3 hash of the empty input.
        assert_eq!(
            digest_bytes(b"").as_str(),
            "af1349b9f5f9a1a6a0404dee36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[tokio::test]
    async fn stream_matches_bytes() {
        let (d, len) = digest_stream(stream_of(vec![b"hello ", b"world"]))
            .await
            .unwrap();
        assert_eq!(len, 11);
        assert_eq!(d, digest_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn chunking_is_irrelevant() {
        let (a, _) = digest_stream(stream_of(vec![b"abc", b"def"])).await.unwrap();
        let (b, _) = digest_stream(stream_of(vec![b"a", b"bcde", b"f"]))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parse_rejects_bad_digests() {
        assert!("deadbeef".parse::<Digest>().is_err());
        let upper = "AF1349B9F5F9A1A6A0404DEE36DCC9499BCB25C9ADC112B7CC9A93CAE41F3262";
        assert!(upper.parse::<Digest>().is_err());
        let ok = "af1349b9f5f9a1a6a0404dee36dcc9499bcb25c9adc112b7cc9a93cae41f3262";
        assert!(ok.parse::<Digest>().is_ok());
    }
}
