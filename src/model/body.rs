//! Inline body encoding.
//!
//! Bodies at or below the outsourcing threshold ride inside the message as
//! base64 so every transport can carry them as plain JSON.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(body: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match body {
        Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
        .map(|text| {
            STANDARD
                .decode(text)
                .map(Bytes::from)
                .map_err(serde::de::Error::custom)
        })
        .transpose()
}

/// True when a body has a known, non-zero size but no inline content.
pub fn is_outsourced(body_size: Option<u64>, body_content: &Option<Bytes>) -> bool {
    body_content.is_none() && body_size.unwrap_or(0) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outsourced_detection() {
        assert!(is_outsourced(Some(10), &None));
        assert!(!is_outsourced(Some(0), &None));
        assert!(!is_outsourced(None, &None));
        assert!(!is_outsourced(Some(3), &Some(Bytes::from_static(b"abc"))));
    }
}
