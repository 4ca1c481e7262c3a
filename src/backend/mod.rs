//! Real-Backend Collaborator
//!
//! The engine never talks X11 itself; it drives whatever actually carries
//! the protocol (in production a dynamically resolved libxcb-randr) through
//! the [`RandrBackend`] trait. The trait mirrors xcb's pipelined shape:
//! issuing a query returns a [`Cookie`] immediately, fetching blocks until
//! the reply for that cookie arrives. The one extra entry point is the raw
//! EDID property fetch the matcher needs.
//!
//! Backend errors are the real server's own; the engine forwards them
//! without masking or rewriting.

use thiserror::Error;

use crate::wire::{CrtcInfoReply, OutputInfoReply, ScreenResourcesReply};
use crate::xid::Xid;

pub mod mock;

/// Handle for an issued, not yet fetched query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cookie {
    /// X11 sequence number of the request
    pub sequence: u16,
}

/// Which screen-resources request variant was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcesKind {
    /// GetScreenResourcesCurrent: answer from the server's current state
    Current,
    /// GetScreenResources: may force a probe of all outputs
    Historical,
}

/// Error answering or addressing a backend query
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// The X server answered the request with a protocol error
    #[error("X error {code} answering sequence {sequence}")]
    XError {
        /// X11 error code
        code: u8,
        /// Sequence number of the failed request
        sequence: u16,
    },

    /// Fetch for a cookie that was never issued
    #[error("no outstanding request with sequence {sequence}")]
    UnknownCookie {
        /// Sequence number presented
        sequence: u16,
    },

    /// Output carries no EDID property
    #[error("output {output:#x} has no EDID property")]
    NoEdid {
        /// Output queried
        output: Xid,
    },

    /// EDID property length disagrees with its payload
    ///
    /// The property fetch reports the fingerprint length, which must be
    /// exactly twice the raw EDID byte count (two hex digits per byte).
    #[error("EDID length {reported} != 2 x {raw} raw bytes")]
    EdidLength {
        /// Length the property fetch reported
        reported: u32,
        /// Raw bytes actually returned
        raw: usize,
    },
}

/// Raw EDID property as fetched from an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdidProperty {
    /// Raw EDID bytes
    pub data: Vec<u8>,
    /// Fingerprint length the property fetch reported
    pub reported_len: u32,
}

impl EdidProperty {
    /// Hex-encode the EDID into the fingerprint form the configuration
    /// stores, enforcing the length contract.
    pub fn hex_fingerprint(&self) -> Result<Vec<u8>, BackendError> {
        if self.reported_len as usize != 2 * self.data.len() {
            return Err(BackendError::EdidLength {
                reported: self.reported_len,
                raw: self.data.len(),
            });
        }
        let mut hex = Vec::with_capacity(self.data.len() * 2);
        for byte in &self.data {
            hex.push(HEX_DIGITS[(byte >> 4) as usize]);
            hex.push(HEX_DIGITS[(byte & 0xf) as usize]);
        }
        Ok(hex)
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// The queryable real RandR implementation.
pub trait RandrBackend {
    /// Issue a screen-resources request.
    fn issue_screen_resources(&mut self, kind: ResourcesKind) -> Cookie;

    /// Fetch the reply for an issued screen-resources request.
    fn fetch_screen_resources(
        &mut self,
        cookie: Cookie,
        kind: ResourcesKind,
    ) -> Result<ScreenResourcesReply, BackendError>;

    /// Issue a GetOutputInfo request for a real output id.
    fn issue_output_info(&mut self, output: Xid, config_timestamp: u32) -> Cookie;

    /// Fetch the reply for an issued GetOutputInfo request.
    fn fetch_output_info(&mut self, cookie: Cookie) -> Result<OutputInfoReply, BackendError>;

    /// Issue a GetCrtcInfo request for a real CRTC id.
    fn issue_crtc_info(&mut self, crtc: Xid, config_timestamp: u32) -> Cookie;

    /// Fetch the reply for an issued GetCrtcInfo request.
    fn fetch_crtc_info(&mut self, cookie: Cookie) -> Result<CrtcInfoReply, BackendError>;

    /// Fetch an output's raw EDID property.
    fn fetch_output_edid(&mut self, output: Xid) -> Result<EdidProperty, BackendError>;
}
