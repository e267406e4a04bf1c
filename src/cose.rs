// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structural decoding of COSE_Sign1 envelopes (RFC 9052).
//!
//! This module only confirms the envelope's shape and extracts the payload.
//! It performs no signature verification: a successful decode is not proof
//! of authenticity. A caller that needs authenticity must verify the
//! envelope's signature element against an appropriate key itself.

use ciborium::de::from_reader;
use ciborium::Value;
use std::io::Cursor;
use thiserror::Error;

/// CBOR tag for COSE_Sign1.
const COSE_SIGN1_TAG: u64 = 18;
/// One-byte CBOR head for tag 18.
const COSE_SIGN1_TAG_HEAD: u8 = 0xD2;
/// One-byte CBOR head for a definite-length array of four elements.
const ARRAY_OF_4_HEAD: u8 = 0x84;

#[derive(Error, Debug)]
pub enum CoseError {
    #[error("buffer does not start with a COSE_Sign1 envelope")]
    NotCoseSign1,
    #[error("invalid COSE_Sign1 envelope")]
    InvalidEnvelope,
}

/// Extract the payload from a COSE_Sign1 envelope.
///
/// The buffer must start with the tag-18 head followed by an array-of-4
/// head; anything else is fast-rejected as [`CoseError::NotCoseSign1`]
/// without a full parse. The full decode then scans the top-level CBOR
/// items for a tag-18 four-element array and returns its third element,
/// which must be a byte string.
pub fn extract_payload(buf: &[u8]) -> Result<Vec<u8>, CoseError> {
    if buf.len() < 2 || buf[0] != COSE_SIGN1_TAG_HEAD || buf[1] != ARRAY_OF_4_HEAD {
        return Err(CoseError::NotCoseSign1);
    }

    let mut cursor = Cursor::new(buf);
    while (cursor.position() as usize) < buf.len() {
        let item: Value = from_reader(&mut cursor).map_err(|_| CoseError::InvalidEnvelope)?;
        if let Some(payload) = sign1_payload(&item)? {
            return Ok(payload);
        }
    }
    Err(CoseError::InvalidEnvelope)
}

/// If `item` is a tag-18 four-element array, return its payload element.
/// A matching envelope whose payload is not a byte string is an error;
/// any other item is simply not a match.
fn sign1_payload(item: &Value) -> Result<Option<Vec<u8>>, CoseError> {
    let Value::Tag(tag, inner) = item else {
        return Ok(None);
    };
    if *tag != COSE_SIGN1_TAG {
        return Ok(None);
    }
    let Value::Array(elements) = inner.as_ref() else {
        return Ok(None);
    };
    if elements.len() != 4 {
        return Ok(None);
    }
    let Value::Bytes(payload) = &elements[2] else {
        return Err(CoseError::InvalidEnvelope);
    };
    Ok(Some(payload.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::ser::into_writer;

    fn sign1(payload: Value) -> Vec<u8> {
        let envelope = Value::Tag(
            COSE_SIGN1_TAG,
            Box::new(Value::Array(vec![
                Value::Bytes(vec![0xA0]), // protected headers
                Value::Map(vec![]),       // unprotected headers
                payload,
                Value::Bytes(vec![0u8; 96]), // signature
            ])),
        );
        let mut buf = Vec::new();
        into_writer(&envelope, &mut buf).unwrap();
        buf
    }

    #[test]
    fn extracts_payload() {
        let payload = b"{\"x-ms-sevsnpvm-guestsvn\":1}".to_vec();
        let buf = sign1(Value::Bytes(payload.clone()));
        assert_eq!(buf[0], 0xD2);
        assert_eq!(buf[1], 0x84);
        assert_eq!(extract_payload(&buf).unwrap(), payload);
    }

    #[test]
    fn rejects_wrong_leading_bytes() {
        // untagged array of 4
        let mut buf = sign1(Value::Bytes(vec![1, 2, 3]));
        buf.remove(0);
        assert!(matches!(
            extract_payload(&buf),
            Err(CoseError::NotCoseSign1)
        ));

        assert!(matches!(extract_payload(&[]), Err(CoseError::NotCoseSign1)));
        assert!(matches!(
            extract_payload(&[0xD2]),
            Err(CoseError::NotCoseSign1)
        ));
        assert!(matches!(
            extract_payload(b"random bytes"),
            Err(CoseError::NotCoseSign1)
        ));
    }

    #[test]
    fn rejects_non_bytestring_payload() {
        let buf = sign1(Value::Null);
        assert!(matches!(
            extract_payload(&buf),
            Err(CoseError::InvalidEnvelope)
        ));
    }

    #[test]
    fn rejects_truncated_envelope() {
        let buf = sign1(Value::Bytes(vec![1, 2, 3]));
        assert!(matches!(
            extract_payload(&buf[..buf.len() - 4]),
            Err(CoseError::InvalidEnvelope)
        ));
    }
}
