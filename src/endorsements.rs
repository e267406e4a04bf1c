// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The host endorsement store.
//!
//! On SNP hosts the utility VM is furnished with a security-context
//! directory holding the platform endorsements: a base64 JSON document
//! with the VCEK certificate, the AMD certificate chain and the `tcbm`
//! value, plus a separate base64 COSE_Sign1 document endorsing the UVM
//! measurement. The directory is passed in explicitly; the binary resolves
//! it from `UVM_SECURITY_CONTEXT_DIR` or a filesystem scan.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the security-context directory. Read by the
/// CLI only, never inside library logic.
pub const SECURITY_CONTEXT_DIR_ENV: &str = "UVM_SECURITY_CONTEXT_DIR";

/// Base64 JSON document with the host AMD certificates.
pub const HOST_AMD_CERTS_FILE: &str = "host-amd-certs-base64";
/// Base64 COSE_Sign1 document with the UVM endorsements.
pub const UVM_ENDORSEMENTS_FILE: &str = "reference-info-base64";

const SECURITY_CONTEXT_GLOB_ROOT: &str = "/";
const SECURITY_CONTEXT_PREFIX: &str = "security_context_";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("endorsement store not found")]
    NotFound,
    #[error("failed to read endorsement file")]
    Io(#[from] std::io::Error),
    #[error("base64 decode error")]
    Base64(#[from] base64::DecodeError),
    #[error("JSON parse error")]
    Json(#[from] serde_json::Error),
    #[error("tcbm is not an even-length hex string")]
    InvalidTcbm,
}

/// Undo JSON string escaping in PEM text: `\n`, `\r` and `\\` become the
/// characters they name. Text without escapes passes through unchanged.
pub fn unescape_pem(pem: &str) -> String {
    let mut out = String::with_capacity(pem.len());
    let mut chars = pem.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Host-furnished AMD certificates, as decoded from
/// [`HOST_AMD_CERTS_FILE`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HostAmdCerts {
    #[serde(rename = "vcekCert")]
    pub vcek_cert: String,
    #[serde(rename = "certificateChain")]
    pub certificate_chain: String,
    pub tcbm: String,
}

/// Resolve the endorsement store directory. An explicitly supplied
/// directory wins; otherwise the filesystem root is scanned for a
/// `security_context_*` entry, the discovery mechanism used on ACI hosts.
pub fn locate_store(base_dir: Option<&Path>) -> Result<PathBuf, StoreError> {
    if let Some(dir) = base_dir {
        if dir.is_dir() {
            return Ok(dir.to_path_buf());
        }
        return Err(StoreError::NotFound);
    }
    scan_for_security_context(Path::new(SECURITY_CONTEXT_GLOB_ROOT))
}

fn scan_for_security_context(root: &Path) -> Result<PathBuf, StoreError> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(SECURITY_CONTEXT_PREFIX) && entry.path().is_dir() {
            return Ok(entry.path());
        }
    }
    Err(StoreError::NotFound)
}

/// Read and decode the host AMD certificates document from the store.
pub fn read_host_amd_certs(store_dir: &Path) -> Result<HostAmdCerts, StoreError> {
    let b64 = fs::read_to_string(store_dir.join(HOST_AMD_CERTS_FILE))?;
    decode_host_amd_certs(&b64)
}

/// Decode a base64 host AMD certificates document.
pub fn decode_host_amd_certs(b64: &str) -> Result<HostAmdCerts, StoreError> {
    let raw = BASE64.decode(b64.trim())?;
    let certs = serde_json::from_slice(&raw)?;
    Ok(certs)
}

/// Read the base64 UVM endorsements (COSE_Sign1) document from the store.
/// Returned still base64-encoded, as the bundle carries it.
pub fn read_uvm_endorsements(store_dir: &Path) -> Result<String, StoreError> {
    let b64 = fs::read_to_string(store_dir.join(UVM_ENDORSEMENTS_FILE))?;
    Ok(b64.trim().to_string())
}

/// Derive the `endorsed_tcb` value from the host `tcbm` hex string: the
/// sequence of 2-hex-digit groups is reversed end-to-end (groups
/// `AA BB CC` become `CC BB AA`), not each group internally.
pub fn endorsed_tcb(tcbm: &str) -> Result<String, StoreError> {
    let bytes = tcbm.as_bytes();
    if bytes.is_empty() || bytes.len() % 2 != 0 || !bytes.iter().all(u8::is_ascii_hexdigit) {
        return Err(StoreError::InvalidTcbm);
    }
    let mut out = String::with_capacity(bytes.len());
    for pair in bytes.chunks(2).rev() {
        out.push(pair[0] as char);
        out.push(pair[1] as char);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn unescape_pem_variants() {
        assert_eq!(unescape_pem("a\\nb"), "a\nb");
        assert_eq!(unescape_pem("a\\rb"), "a\rb");
        assert_eq!(unescape_pem("a\\\\nb"), "a\\nb");
        // already-unescaped text passes through
        assert_eq!(unescape_pem("a\nb"), "a\nb");
        // trailing lone backslash is kept
        assert_eq!(unescape_pem("a\\"), "a\\");
    }

    #[test]
    fn endorsed_tcb_reverses_byte_pairs() {
        assert_eq!(endorsed_tcb("AABBCC").unwrap(), "CCBBAA");
        assert_eq!(endorsed_tcb("0102030405").unwrap(), "0504030201");
        // group order is swapped, not the nibbles within a group
        assert_eq!(endorsed_tcb("DB18000000000004").unwrap(), "04000000000018DB");
    }

    #[test]
    fn endorsed_tcb_rejects_bad_input() {
        assert!(matches!(endorsed_tcb(""), Err(StoreError::InvalidTcbm)));
        assert!(matches!(endorsed_tcb("ABC"), Err(StoreError::InvalidTcbm)));
        assert!(matches!(endorsed_tcb("zz"), Err(StoreError::InvalidTcbm)));
    }

    #[test]
    fn host_amd_certs_roundtrip() {
        let json = r#"{"vcekCert":"-----BEGIN CERTIFICATE-----\n...","certificateChain":"-----BEGIN CERTIFICATE-----\n...","tcbm":"DB18000000000004"}"#;
        let b64 = BASE64.encode(json);
        let certs = decode_host_amd_certs(&b64).unwrap();
        assert!(certs.vcek_cert.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(certs.tcbm, "DB18000000000004");
    }

    #[test]
    fn store_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{"vcekCert":"a","certificateChain":"b","tcbm":"0004"}"#;
        let mut f = File::create(dir.path().join(HOST_AMD_CERTS_FILE)).unwrap();
        f.write_all(BASE64.encode(json).as_bytes()).unwrap();
        let mut f = File::create(dir.path().join(UVM_ENDORSEMENTS_FILE)).unwrap();
        f.write_all(b"0gRk\n").unwrap();

        let store = locate_store(Some(dir.path())).unwrap();
        let certs = read_host_amd_certs(&store).unwrap();
        assert_eq!(certs.tcbm, "0004");
        assert_eq!(read_uvm_endorsements(&store).unwrap(), "0gRk");

        let missing = dir.path().join("nope");
        assert!(matches!(
            locate_store(Some(&missing)),
            Err(StoreError::NotFound)
        ));
    }
}
