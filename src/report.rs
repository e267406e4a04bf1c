// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fixed-layout SEV-SNP report structures and their binary codec.
//!
//! The layouts follow the SEV-SNP Firmware ABI Specification: the guest
//! request message (Table 20), the attestation report (Table 21) and the
//! report response message (Table 22). The structs are `repr(C)` and are
//! serialized with bincode, which writes fixed-width little-endian integers
//! and raw fixed-size arrays, so the encoded form is exactly the in-memory
//! ABI layout.

#[cfg(feature = "verifier")]
use openssl::bn::BigNum;
#[cfg(feature = "verifier")]
use openssl::ecdsa::EcdsaSig;
#[cfg(feature = "verifier")]
use openssl::sha::Sha384;
#[cfg(feature = "verifier")]
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use static_assertions::const_assert_eq;
use std::mem::size_of;
use thiserror::Error;

/// Report version this crate understands.
pub const REPORT_VERSION: u32 = 2;
/// ECDSA P-384 with SHA-384, the only signature algorithm AMD defines.
pub const SIG_ALGO_ECDSA_P384_SHA384: u32 = 1;

pub const REPORT_SIZE: usize = size_of::<SnpReport>();
pub const REQUEST_SIZE: usize = size_of::<ReportRequest>();
pub const RESPONSE_SIZE: usize = size_of::<ReportResponse>();
pub const SIGNATURE_SIZE: usize = size_of::<Signature>();
/// The signature covers everything before the signature field.
pub const SIGNED_REGION_SIZE: usize = REPORT_SIZE - SIGNATURE_SIZE;

const_assert_eq!(REPORT_SIZE, 1184);
const_assert_eq!(REQUEST_SIZE, 96);
const_assert_eq!(RESPONSE_SIZE, 1280);
const_assert_eq!(SIGNATURE_SIZE, 512);
const_assert_eq!(SIGNED_REGION_SIZE, 672);

/// Caller-supplied nonce, reflected verbatim in the report's report_data.
pub type ReportData = [u8; 64];

/// Build a 64-byte report_data field from a hex string, zero-padding or
/// truncating the decoded bytes as needed.
pub fn report_data_from_hex(hex_str: &str) -> Result<ReportData, hex::FromHexError> {
    let bytes = hex::decode(hex_str)?;
    let mut report_data = [0u8; 64];
    let len = bytes.len().min(report_data.len());
    report_data[..len].copy_from_slice(&bytes[..len]);
    Ok(report_data)
}

/// ECDSA signature as laid out in the report: two 72-byte little-endian
/// unsigned integers followed by reserved space.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "BigArray")]
    pub r: [u8; 72],
    #[serde(with = "BigArray")]
    pub s: [u8; 72],
    #[serde(with = "BigArray")]
    reserved: [u8; 368],
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            r: [0; 72],
            s: [0; 72],
            reserved: [0; 368],
        }
    }
}

/// SEV-SNP attestation report, Firmware ABI Table 21.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnpReport {
    pub version: u32,
    pub guest_svn: u32,
    pub policy: u64,
    pub family_id: [u8; 16],
    pub image_id: [u8; 16],
    pub vmpl: u32,
    pub signature_algo: u32,
    pub platform_version: u64,
    pub platform_info: u64,
    pub author_key_en: u32,
    reserved_0: u32,
    #[serde(with = "BigArray")]
    pub report_data: [u8; 64],
    #[serde(with = "BigArray")]
    pub measurement: [u8; 48],
    pub host_data: [u8; 32],
    #[serde(with = "BigArray")]
    pub id_key_digest: [u8; 48],
    #[serde(with = "BigArray")]
    pub author_key_digest: [u8; 48],
    pub report_id: [u8; 32],
    pub report_id_ma: [u8; 32],
    pub reported_tcb: u64,
    reserved_1: [u8; 24],
    #[serde(with = "BigArray")]
    pub chip_id: [u8; 64],
    pub committed_svn: [u8; 8],
    pub committed_version: [u8; 8],
    pub launch_svn: [u8; 8],
    #[serde(with = "BigArray")]
    reserved_2: [u8; 168],
    pub signature: Signature,
}

impl Default for SnpReport {
    fn default() -> Self {
        Self {
            version: REPORT_VERSION,
            guest_svn: 0,
            policy: 0,
            family_id: [0; 16],
            image_id: [0; 16],
            vmpl: 0,
            signature_algo: SIG_ALGO_ECDSA_P384_SHA384,
            platform_version: 0,
            platform_info: 0,
            author_key_en: 0,
            reserved_0: 0,
            report_data: [0; 64],
            measurement: [0; 48],
            host_data: [0; 32],
            id_key_digest: [0; 48],
            author_key_digest: [0; 48],
            report_id: [0; 32],
            report_id_ma: [0; 32],
            reported_tcb: 0,
            reserved_1: [0; 24],
            chip_id: [0; 64],
            committed_svn: [0; 8],
            committed_version: [0; 8],
            launch_svn: [0; 8],
            reserved_2: [0; 168],
            signature: Signature::default(),
        }
    }
}

/// Guest report request message, Firmware ABI Table 20.
#[repr(C)]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(with = "BigArray")]
    pub report_data: [u8; 64],
    pub vmpl: u32,
    reserved: [u8; 28],
}

impl ReportRequest {
    pub fn new(report_data: ReportData, vmpl: u32) -> Self {
        Self {
            report_data,
            vmpl,
            reserved: [0; 28],
        }
    }
}

/// Report response message, Firmware ABI Table 22.
#[repr(C)]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub status: u32,
    pub report_size: u32,
    reserved: [u8; 24],
    pub report: SnpReport,
    #[serde(with = "BigArray")]
    padding: [u8; 64],
}

impl ReportResponse {
    #[cfg(feature = "attester")]
    pub(crate) fn zeroed() -> Self {
        Self {
            status: 0,
            report_size: 0,
            reserved: [0; 24],
            report: SnpReport::default(),
            padding: [0; 64],
        }
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed report (expected {expected} bytes, got {actual})")]
    MalformedReport { expected: usize, actual: usize },
    #[error("binary layout error")]
    Bincode(#[from] bincode::Error),
}

/// Serialize a report into its ABI byte layout.
pub fn encode(report: &SnpReport) -> Result<Vec<u8>, CodecError> {
    let bytes = bincode::serialize(report)?;
    Ok(bytes)
}

/// Parse a report from its ABI byte layout. The buffer must be exactly
/// [`REPORT_SIZE`] bytes.
pub fn decode(bytes: &[u8]) -> Result<SnpReport, CodecError> {
    if bytes.len() != REPORT_SIZE {
        return Err(CodecError::MalformedReport {
            expected: REPORT_SIZE,
            actual: bytes.len(),
        });
    }
    let report = bincode::deserialize(bytes)?;
    Ok(report)
}

/// Parse a report response from its ABI byte layout.
#[cfg(feature = "attester")]
pub(crate) fn decode_response(bytes: &[u8]) -> Result<ReportResponse, CodecError> {
    if bytes.len() < RESPONSE_SIZE {
        return Err(CodecError::MalformedReport {
            expected: RESPONSE_SIZE,
            actual: bytes.len(),
        });
    }
    let response = bincode::deserialize(&bytes[..RESPONSE_SIZE])?;
    Ok(response)
}

#[cfg(feature = "verifier")]
pub trait Validateable {
    /// Verify the report's embedded signature against the VCEK leaf
    /// certificate. Returns false for any structural or cryptographic
    /// failure; untrusted input never yields a distinguishable error.
    fn validate(&self, vcek: &X509) -> bool;
}

#[cfg(feature = "verifier")]
impl Validateable for SnpReport {
    fn validate(&self, vcek: &X509) -> bool {
        verify_signature(self, vcek)
    }
}

/// Verify the report signature: SHA-384 over the pre-signature region,
/// checked as an ECDSA P-384 signature under the leaf certificate's key.
#[cfg(feature = "verifier")]
pub fn verify_signature(report: &SnpReport, leaf: &X509) -> bool {
    let Ok(base_message) = signed_region(report) else {
        return false;
    };
    let mut hasher = Sha384::new();
    hasher.update(&base_message);
    let digest = hasher.finish();

    let Ok(r) = bignum_from_le(&report.signature.r) else {
        return false;
    };
    let Ok(s) = bignum_from_le(&report.signature.s) else {
        return false;
    };
    let Ok(report_sig) = EcdsaSig::from_private_components(r, s) else {
        return false;
    };

    let Ok(pubkey) = leaf.public_key() else {
        return false;
    };
    let Ok(ec_key) = pubkey.ec_key() else {
        return false;
    };
    report_sig.verify(&digest, &ec_key).unwrap_or(false)
}

/// The report bytes covered by the signature: offset 0 up to, but
/// excluding, the trailing signature field.
#[cfg(feature = "verifier")]
fn signed_region(report: &SnpReport) -> Result<Vec<u8>, CodecError> {
    let bytes = bincode::serialize(report)?;
    Ok(bytes[..SIGNED_REGION_SIZE].to_vec())
}

#[cfg(feature = "verifier")]
fn bignum_from_le(bytes: &[u8]) -> Result<BigNum, openssl::error::ErrorStack> {
    let mut be: Vec<u8> = bytes.to_vec();
    be.reverse();
    BigNum::from_slice(&be)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_roundtrip() {
        let mut report = SnpReport::default();
        report.report_data[0] = 0x42;
        report.report_data[63] = 0x24;
        report.measurement = [0xAB; 48];
        report.reported_tcb = 0xDB18000000000004;

        let bytes = encode(&report).unwrap();
        assert_eq!(bytes.len(), REPORT_SIZE);
        let parsed = decode(&bytes).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let short = vec![0u8; REPORT_SIZE - 1];
        assert!(matches!(
            decode(&short),
            Err(CodecError::MalformedReport { .. })
        ));
        let long = vec![0u8; REPORT_SIZE + 1];
        assert!(matches!(
            decode(&long),
            Err(CodecError::MalformedReport { .. })
        ));
    }

    #[test]
    fn encoded_field_offsets() {
        let mut report = SnpReport::default();
        report.report_data = [0x11; 64];
        report.host_data = [0x22; 32];
        let bytes = encode(&report).unwrap();
        // report_data at offset 80, host_data at 192, per ABI Table 21
        assert_eq!(&bytes[80..144], &[0x11; 64]);
        assert_eq!(&bytes[192..224], &[0x22; 32]);
    }

    #[test]
    fn report_data_hex_padding() {
        let report_data = report_data_from_hex("41424344").unwrap();
        assert_eq!(&report_data[..4], b"ABCD");
        assert_eq!(&report_data[4..], &[0u8; 60]);

        // longer than 64 bytes is truncated
        let long_hex = "aa".repeat(80);
        let report_data = report_data_from_hex(&long_hex).unwrap();
        assert_eq!(report_data, [0xAA; 64]);

        assert!(report_data_from_hex("zz").is_err());
    }
}
