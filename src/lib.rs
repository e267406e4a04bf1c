// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! This library produces and verifies hardware-rooted attestation evidence
//! for AMD SEV-SNP guests. The attester side requests an attestation
//! report from the SNP guest device and assembles it with the
//! host-furnished endorsements into a bundle; the verifier side validates
//! the certificate chain against AMD's root of trust, checks the report
//! signature under the VCEK, and correlates the report with the caller's
//! expected nonce and security policy.
//!
//! # SNP report verification
//!
//! ```no_run
//! use snp_attest::{certs, report, verify};
//! use std::error::Error;
//!
//! fn main() -> Result<(), Box<dyn Error>> {
//!     let report_bytes = std::fs::read("report.bin")?;
//!     let snp_report = report::decode(&report_bytes)?;
//!
//!     let pem_blocks = std::fs::read_to_string("chain.pem")?;
//!     let mut chain = certs::CertChain::new();
//!     chain.add_pem_chain(&pem_blocks)?;
//!
//!     let trusted_key = certs::amd_root_public_key()?;
//!     let nonce = [0u8; 64];
//!     let policy_b64 = "eyJhbGxvd19hbGwiOnRydWV9";
//!     verify::verify_report(&snp_report, &chain, &trusted_key, &nonce, policy_b64)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Decoding a UVM endorsements document only checks its COSE_Sign1 shape
//! and extracts the payload; see [`cose`] for the authenticity caveat.

#[cfg(feature = "verifier")]
pub mod certs;
pub mod cose;
#[cfg(feature = "attester")]
pub mod device;
pub mod endorsements;
#[cfg(feature = "attester")]
pub mod evidence;
pub mod report;
#[cfg(feature = "verifier")]
pub mod verify;
