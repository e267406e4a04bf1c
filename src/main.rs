// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use serde::Deserialize;
use snp_attest::device::{EvidenceRequest, Fallback};
use snp_attest::report::{self, report_data_from_hex};
use snp_attest::{certs, endorsements, evidence, verify};
use std::error::Error;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(clap::Subcommand)]
enum Action {
    /// Assemble an attestation bundle and print it as JSON
    Fetch {
        /// Hex-encoded nonce for the report_data field (up to 64 bytes)
        #[arg(short, long, default_value = "")]
        report_data: String,

        /// Endorsement store directory; defaults to $UVM_SECURITY_CONTEXT_DIR
        /// or a filesystem scan
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Return a deterministic placeholder report when no SNP device is
        /// available, instead of failing
        #[arg(long)]
        allow_fallback: bool,
    },
    /// Verify an attestation document against a nonce and security policy
    Verify {
        /// JSON document with `evidence` and `endorsements` keys
        file: PathBuf,

        /// Hex-encoded nonce the report_data field must match
        #[arg(long)]
        report_data: String,

        /// Base64 security policy whose SHA-256 the host_data field must match
        #[arg(long)]
        security_policy_b64: String,
    },
}

#[derive(Deserialize)]
struct AttestationDocument {
    evidence: String,
    endorsements: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    match args.action {
        Action::Fetch {
            report_data,
            store,
            allow_fallback,
        } => {
            let nonce = report_data_from_hex(&report_data)?;
            let fallback = if allow_fallback {
                Fallback::Enabled
            } else {
                Fallback::Disabled
            };
            let store = store.or_else(|| {
                std::env::var(endorsements::SECURITY_CONTEXT_DIR_ENV)
                    .ok()
                    .map(PathBuf::from)
            });
            let request = EvidenceRequest::new(nonce);
            let bundle = evidence::assemble(&request, store.as_deref(), fallback)?;
            println!("{}", serde_json::to_string(&bundle)?);
        }
        Action::Verify {
            file,
            report_data,
            security_policy_b64,
        } => {
            let document: AttestationDocument = serde_json::from_slice(&read_file(&file)?)?;
            let nonce = report_data_from_hex(&report_data)?;

            let report_bytes = BASE64.decode(document.evidence.trim())?;
            let snp_report = report::decode(&report_bytes)?;

            let endorsements_json = BASE64.decode(document.endorsements.trim())?;
            let host_certs: endorsements::HostAmdCerts =
                serde_json::from_slice(&endorsements_json)?;

            let mut chain = certs::CertChain::new();
            chain.add_pem(&host_certs.vcek_cert)?;
            chain.add_pem_chain(&host_certs.certificate_chain)?;

            let trusted_key = certs::amd_root_public_key()?;
            verify::verify_report(
                &snp_report,
                &chain,
                &trusted_key,
                &nonce,
                &security_policy_b64,
            )?;
            eprintln!("attestation verification successful");
        }
    }

    Ok(())
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>, std::io::Error> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}
