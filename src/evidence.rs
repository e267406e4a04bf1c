// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Attestation bundle assembly.
//!
//! A bundle collects everything a remote verifier needs: the base64 SNP
//! report, the base64 host certificate material, the base64 UVM
//! endorsements document and the endorsed TCB value. Assembly is
//! all-or-nothing; a bundle is never returned with a missing field.

use crate::device::{self, EvidenceRequest, Fallback};
use crate::endorsements::{self, unescape_pem, HostAmdCerts};
use crate::report;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AttestationBundle {
    pub evidence: String,
    pub endorsements: String,
    pub uvm_endorsements: String,
    pub endorsed_tcb: String,
}

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("report acquisition failed")]
    Acquire(#[from] device::AcquireError),
    #[error("report encoding failed")]
    Codec(#[from] report::CodecError),
    #[error("endorsement store error")]
    Store(#[from] endorsements::StoreError),
}

/// Assemble an attestation bundle: acquire a report carrying the given
/// nonce, then gather the platform endorsements from the store at
/// `store_dir` (or the discovered default when `None`).
pub fn assemble(
    request: &EvidenceRequest,
    store_dir: Option<&Path>,
    fallback: Fallback,
) -> Result<AttestationBundle, BundleError> {
    let snp_report = device::acquire(request, fallback)?;
    let evidence = BASE64.encode(report::encode(&snp_report)?);

    let store = endorsements::locate_store(store_dir)?;
    let host_certs = endorsements::read_host_amd_certs(&store)?;
    let uvm_endorsements = endorsements::read_uvm_endorsements(&store)?;
    let endorsed_tcb = endorsements::endorsed_tcb(&host_certs.tcbm)?;

    Ok(AttestationBundle {
        evidence,
        endorsements: encode_endorsements(&host_certs),
        uvm_endorsements,
        endorsed_tcb,
    })
}

/// The bundle's `endorsements` field: the unescaped VCEK and chain PEM
/// text concatenated, re-encoded as base64.
pub fn encode_endorsements(host_certs: &HostAmdCerts) -> String {
    let mut pem = unescape_pem(&host_certs.vcek_cert);
    pem.push_str(&unescape_pem(&host_certs.certificate_chain));
    BASE64.encode(pem)
}
