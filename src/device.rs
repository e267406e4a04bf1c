// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Report acquisition from the SNP guest device interfaces.
//!
//! Two kernel interfaces exist for requesting an attestation report. The
//! `/dev/sev-guest` interface (kernel 5.19+) is preferred as the more
//! capable one; the legacy `/dev/sev` interface (5.15-era sev-snp driver)
//! is tried second. Probing order is fixed. When neither backend works a
//! deterministic placeholder report can be returned instead, but only if
//! the caller opted in — silently substituting a fake report for a failed
//! hardware read is a trust decision the caller has to make.

use crate::report::{self, ReportRequest, ReportResponse, SnpReport};
use log::debug;
use nix::ioctl_readwrite;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use thiserror::Error;

const SEV_GUEST_DEVICE: &str = "/dev/sev-guest";
const SEV_LEGACY_DEVICE: &str = "/dev/sev";

// SNP guest message types, Firmware ABI Table 19
const SNP_MSG_REPORT_REQ: u8 = 5;
const SNP_MSG_REPORT_RSP: u8 = 6;

const SNP_GUEST_MSG_VERSION: u8 = 1;

// /dev/sev-guest request payload, include/uapi/linux/sev-guest.h
#[repr(C)]
struct GuestRequest {
    msg_version: u8,
    req_data: u64,
    resp_data: u64,
    fw_err: u64,
}

// /dev/sev request payload, 5.15 sev-snp driver psp-sev-guest.h
#[repr(C)]
struct LegacyGuestRequest {
    req_msg_type: u8,
    rsp_msg_type: u8,
    msg_version: u8,
    request_len: u16,
    request_uaddr: u64,
    response_len: u16,
    response_uaddr: u64,
    error: u32,
}

// The kernel wraps the report response in a larger buffer.
const RESPONSE_WRAPPER_SIZE: usize = 4000;

ioctl_readwrite!(snp_get_report, b'S', 0x0, GuestRequest);
ioctl_readwrite!(snp_legacy_msg_report, b'S', 0x1, LegacyGuestRequest);

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open device")]
    Open(#[from] std::io::Error),
    #[error("device request failed")]
    Request(#[from] nix::Error),
    #[error("device returned firmware status {0:#x}")]
    Firmware(u32),
    #[error("malformed device response")]
    Response(#[from] report::CodecError),
}

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("no SNP report backend available")]
    NoBackendAvailable,
}

/// Whether [`acquire`] may substitute a deterministic placeholder report
/// when every device backend fails.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Fallback {
    Disabled,
    Enabled,
}

/// The device backends, in probing order.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SnpBackend {
    SevGuest,
    SevLegacy,
}

/// A report request: the caller nonce plus the privilege level the report
/// should be generated at.
#[derive(Clone, Debug)]
pub struct EvidenceRequest {
    pub report_data: report::ReportData,
    pub vmpl: u32,
}

impl EvidenceRequest {
    pub fn new(report_data: report::ReportData) -> Self {
        Self {
            report_data,
            vmpl: 0,
        }
    }
}

/// Probe which SNP device backend is present, without issuing a request.
pub fn detect_backend() -> Option<SnpBackend> {
    if Path::new(SEV_GUEST_DEVICE).exists() {
        return Some(SnpBackend::SevGuest);
    }
    if Path::new(SEV_LEGACY_DEVICE).exists() {
        return Some(SnpBackend::SevLegacy);
    }
    None
}

pub fn has_snp() -> bool {
    detect_backend().is_some()
}

/// Acquire an attestation report, trying each backend in turn.
///
/// The nonce in `request.report_data` is copied verbatim into the outgoing
/// report request. A backend failure is non-fatal and triggers the next
/// backend; only when every backend fails (including the fallback, if
/// enabled) does this return [`AcquireError::NoBackendAvailable`].
pub fn acquire(request: &EvidenceRequest, fallback: Fallback) -> Result<SnpReport, AcquireError> {
    match sev_guest_report(request) {
        Ok(report) => return Ok(report),
        Err(e) => debug!("{SEV_GUEST_DEVICE} backend failed: {e}"),
    }
    match sev_legacy_report(request) {
        Ok(report) => return Ok(report),
        Err(e) => debug!("{SEV_LEGACY_DEVICE} backend failed: {e}"),
    }
    if fallback == Fallback::Enabled {
        debug!("falling back to placeholder report");
        return Ok(placeholder_report());
    }
    Err(AcquireError::NoBackendAvailable)
}

/// A fixed, deterministic report for environments without SNP hardware.
/// Carries no signature and verifies under no key.
pub fn placeholder_report() -> SnpReport {
    SnpReport::default()
}

fn open_device(path: &str) -> Result<File, DeviceError> {
    let device = OpenOptions::new().read(true).write(true).open(path)?;
    Ok(device)
}

fn sev_guest_report(request: &EvidenceRequest) -> Result<SnpReport, DeviceError> {
    let device = open_device(SEV_GUEST_DEVICE)?;

    let snp_request = ReportRequest::new(request.report_data, request.vmpl);
    let mut response_wrapper = [0u8; RESPONSE_WRAPPER_SIZE];
    let mut payload = GuestRequest {
        msg_version: SNP_GUEST_MSG_VERSION,
        req_data: &snp_request as *const ReportRequest as u64,
        resp_data: response_wrapper.as_mut_ptr() as u64,
        fw_err: 0,
    };

    unsafe { snp_get_report(device.as_raw_fd(), &mut payload) }?;

    let response = report::decode_response(&response_wrapper)?;
    check_response(response)
}

fn sev_legacy_report(request: &EvidenceRequest) -> Result<SnpReport, DeviceError> {
    let device = open_device(SEV_LEGACY_DEVICE)?;

    let snp_request = ReportRequest::new(request.report_data, request.vmpl);
    let mut response = ReportResponse::zeroed();
    let mut payload = LegacyGuestRequest {
        req_msg_type: SNP_MSG_REPORT_REQ,
        rsp_msg_type: SNP_MSG_REPORT_RSP,
        msg_version: SNP_GUEST_MSG_VERSION,
        request_len: report::REQUEST_SIZE as u16,
        request_uaddr: &snp_request as *const ReportRequest as u64,
        response_len: report::RESPONSE_SIZE as u16,
        response_uaddr: &mut response as *mut ReportResponse as u64,
        error: 0,
    };

    unsafe { snp_legacy_msg_report(device.as_raw_fd(), &mut payload) }?;

    check_response(response)
}

fn check_response(response: ReportResponse) -> Result<SnpReport, DeviceError> {
    if response.status != 0 {
        return Err(DeviceError::Firmware(response.status));
    }
    Ok(response.report)
}
