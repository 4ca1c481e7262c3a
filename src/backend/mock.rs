//! Scripted in-memory backend.
//!
//! Plays the role of the X server for the test suite: resources, output and
//! CRTC details and EDID properties are seeded up front, queries are answered
//! from that script with real sequence-number bookkeeping. Every issued
//! request is logged so tests can assert what actually went over the wire.

use std::collections::HashMap;

use super::{BackendError, Cookie, EdidProperty, RandrBackend, ResourcesKind};
use crate::wire::{CrtcInfoReply, OutputInfoReply, ScreenResourcesReply};
use crate::xid::Xid;

/// Core X BadMatch; stands in for the extension's resource errors here.
const BAD_MATCH: u8 = 8;

/// One request the mock has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuedRequest {
    /// Screen-resources query of either variant
    ScreenResources(ResourcesKind),
    /// GetOutputInfo for this output id
    OutputInfo(Xid),
    /// GetCrtcInfo for this CRTC id
    CrtcInfo(Xid),
    /// EDID property fetch for this output id
    Edid(Xid),
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    ScreenResources(ResourcesKind),
    OutputInfo(Xid),
    CrtcInfo(Xid),
}

/// A scripted RandR server.
#[derive(Debug)]
pub struct MockBackend {
    resources: ScreenResourcesReply,
    outputs: HashMap<Xid, OutputInfoReply>,
    crtcs: HashMap<Xid, CrtcInfoReply>,
    edids: HashMap<Xid, EdidProperty>,
    next_sequence: u16,
    pending: HashMap<u16, Pending>,
    log: Vec<IssuedRequest>,
}

impl MockBackend {
    /// A server whose screen-resources answer is `resources`.
    pub fn new(resources: ScreenResourcesReply) -> Self {
        MockBackend {
            resources,
            outputs: HashMap::new(),
            crtcs: HashMap::new(),
            edids: HashMap::new(),
            next_sequence: 0,
            pending: HashMap::new(),
            log: Vec::new(),
        }
    }

    /// Script the GetOutputInfo answer for an output.
    pub fn with_output(mut self, output: Xid, info: OutputInfoReply) -> Self {
        self.outputs.insert(output, info);
        self
    }

    /// Script the GetCrtcInfo answer for a CRTC.
    pub fn with_crtc(mut self, crtc: Xid, info: CrtcInfoReply) -> Self {
        self.crtcs.insert(crtc, info);
        self
    }

    /// Attach an EDID whose reported length honors the hex contract.
    pub fn with_edid(mut self, output: Xid, raw: &[u8]) -> Self {
        self.edids.insert(
            output,
            EdidProperty {
                data: raw.to_vec(),
                reported_len: raw.len() as u32 * 2,
            },
        );
        self
    }

    /// Attach an EDID whose reported length is deliberately wrong.
    pub fn with_bad_edid(mut self, output: Xid, raw: &[u8], reported_len: u32) -> Self {
        self.edids.insert(
            output,
            EdidProperty {
                data: raw.to_vec(),
                reported_len,
            },
        );
        self
    }

    /// Everything issued so far, in order.
    pub fn issued(&self) -> &[IssuedRequest] {
        &self.log
    }

    fn issue(&mut self, pending: Pending) -> Cookie {
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.pending.insert(self.next_sequence, pending);
        Cookie {
            sequence: self.next_sequence,
        }
    }

    fn take(&mut self, cookie: Cookie) -> Result<Pending, BackendError> {
        self.pending
            .remove(&cookie.sequence)
            .ok_or(BackendError::UnknownCookie {
                sequence: cookie.sequence,
            })
    }
}

impl RandrBackend for MockBackend {
    fn issue_screen_resources(&mut self, kind: ResourcesKind) -> Cookie {
        self.log.push(IssuedRequest::ScreenResources(kind));
        self.issue(Pending::ScreenResources(kind))
    }

    fn fetch_screen_resources(
        &mut self,
        cookie: Cookie,
        kind: ResourcesKind,
    ) -> Result<ScreenResourcesReply, BackendError> {
        match self.take(cookie)? {
            Pending::ScreenResources(issued) if issued == kind => {
                let mut reply = self.resources.clone();
                reply.sequence = cookie.sequence;
                Ok(reply)
            }
            _ => Err(BackendError::UnknownCookie {
                sequence: cookie.sequence,
            }),
        }
    }

    fn issue_output_info(&mut self, output: Xid, _config_timestamp: u32) -> Cookie {
        self.log.push(IssuedRequest::OutputInfo(output));
        self.issue(Pending::OutputInfo(output))
    }

    fn fetch_output_info(&mut self, cookie: Cookie) -> Result<OutputInfoReply, BackendError> {
        match self.take(cookie)? {
            Pending::OutputInfo(output) => match self.outputs.get(&output) {
                Some(info) => {
                    let mut reply = info.clone();
                    reply.sequence = cookie.sequence;
                    Ok(reply)
                }
                None => Err(BackendError::XError {
                    code: BAD_MATCH,
                    sequence: cookie.sequence,
                }),
            },
            _ => Err(BackendError::UnknownCookie {
                sequence: cookie.sequence,
            }),
        }
    }

    fn issue_crtc_info(&mut self, crtc: Xid, _config_timestamp: u32) -> Cookie {
        self.log.push(IssuedRequest::CrtcInfo(crtc));
        self.issue(Pending::CrtcInfo(crtc))
    }

    fn fetch_crtc_info(&mut self, cookie: Cookie) -> Result<CrtcInfoReply, BackendError> {
        match self.take(cookie)? {
            Pending::CrtcInfo(crtc) => match self.crtcs.get(&crtc) {
                Some(info) => {
                    let mut reply = info.clone();
                    reply.sequence = cookie.sequence;
                    Ok(reply)
                }
                None => Err(BackendError::XError {
                    code: BAD_MATCH,
                    sequence: cookie.sequence,
                }),
            },
            _ => Err(BackendError::UnknownCookie {
                sequence: cookie.sequence,
            }),
        }
    }

    fn fetch_output_edid(&mut self, output: Xid) -> Result<EdidProperty, BackendError> {
        self.log.push(IssuedRequest::Edid(output));
        self.edids
            .get(&output)
            .cloned()
            .ok_or(BackendError::NoEdid { output })
    }
}
