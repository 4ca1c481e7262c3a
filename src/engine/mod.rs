//! Per-Connection Engine
//!
//! One [`Engine`] sits on one client connection and owns everything that
//! connection sees: the backend handle, the parsed rule set, the live
//! resource snapshot and the pending-query table. There are no process-wide
//! globals; two connections are two engines.
//!
//! The request flow mirrors the client's: a screen-resources query rebuilds
//! the snapshot and answers with real plus virtual resources; detail queries
//! are issued against the real backend (with split bits stripped) and their
//! replies shaped on fetch according to what the client actually asked for.

use tracing::{debug, info, warn};

use crate::backend::{BackendError, Cookie, RandrBackend, ResourcesKind};
use crate::config::SplitConfig;
use crate::correlate::{Correlator, QueryKind};
use crate::snapshot::Snapshot;
use crate::wire::{Connection, CrtcInfoReply, OutputInfoReply, ScreenResourcesReply};
use crate::xid::{self, Xid};

/// What a shaped detail fetch produced.
///
/// `NotFound` means the client named a synthetic resource that does not
/// exist in the live snapshot; the caller answers with the protocol's
/// not-found error rather than a fabricated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome<T> {
    /// A reply to hand to the client, shaped or passed through
    Reply(T),
    /// The requested synthetic resource is stale or unknown
    NotFound,
}

/// Engine state for one client connection.
#[derive(Debug)]
pub struct Engine<B: RandrBackend> {
    backend: B,
    config: SplitConfig,
    snapshot: Snapshot,
    correlator: Correlator,
}

impl<B: RandrBackend> Engine<B> {
    /// Build an engine over a backend and an optional raw configuration
    /// stream. A missing or malformed stream means no splitting; the engine
    /// still interposes, passing everything through.
    pub fn new(backend: B, config_stream: Option<&[u8]>) -> Self {
        let config = match config_stream {
            Some(stream) => match SplitConfig::parse(stream) {
                Ok(config) => {
                    info!(rules = config.rules().len(), "split configuration loaded");
                    config
                }
                Err(err) => {
                    warn!(%err, "unusable split configuration, running with no rules");
                    SplitConfig::default()
                }
            },
            None => {
                debug!("no split configuration, running with no rules");
                SplitConfig::default()
            }
        };

        Engine {
            backend,
            config,
            snapshot: Snapshot::default(),
            correlator: Correlator::default(),
        }
    }

    /// Answer a screen-resources query of either variant.
    ///
    /// Fetches the real reply, rebuilds the snapshot from it (replacing the
    /// previous generation wholesale) and returns the composed real+virtual
    /// reply.
    pub fn screen_resources(
        &mut self,
        kind: ResourcesKind,
    ) -> Result<ScreenResourcesReply, BackendError> {
        let cookie = self.backend.issue_screen_resources(kind);
        let real = self.backend.fetch_screen_resources(cookie, kind)?;
        self.snapshot = Snapshot::rebuild(&mut self.backend, &self.config, real);
        Ok(self.snapshot.compose_reply())
    }

    /// Forward a GetOutputInfo issue, remembering what the client asked for.
    ///
    /// Synthetic ids are stripped to their real parent before forwarding;
    /// the real server never sees a split bit.
    pub fn issue_output_info(&mut self, output: Xid) -> Cookie {
        let cookie = self
            .backend
            .issue_output_info(xid::real(output), self.snapshot.real().config_timestamp);
        self.correlator
            .record(QueryKind::OutputInfo, cookie.sequence, output);
        cookie
    }

    /// Fetch and shape a GetOutputInfo reply.
    pub fn fetch_output_info(
        &mut self,
        cookie: Cookie,
    ) -> Result<ReplyOutcome<OutputInfoReply>, BackendError> {
        let requested = self.correlator.resolve(QueryKind::OutputInfo, cookie.sequence);
        let reply = self.backend.fetch_output_info(cookie)?;

        let requested = match requested {
            Some(requested) => requested,
            // Issued outside this engine; hand the reply over untouched.
            None => return Ok(ReplyOutcome::Reply(reply)),
        };

        if !xid::is_synthetic(requested) {
            if self.snapshot.is_split_parent(requested) {
                // The parent's panel is spoken for by its sub-outputs.
                let mut shaped = reply;
                shaped.connection = Connection::Disconnected;
                return Ok(ReplyOutcome::Reply(shaped));
            }
            return Ok(ReplyOutcome::Reply(reply));
        }

        match self.snapshot.find_output(requested) {
            Some(output) => {
                let mut shaped = output.info.clone();
                shaped.sequence = reply.sequence;
                Ok(ReplyOutcome::Reply(shaped))
            }
            None => {
                debug!(output = requested, "stale virtual output queried");
                Ok(ReplyOutcome::NotFound)
            }
        }
    }

    /// Forward a GetCrtcInfo issue, remembering what the client asked for.
    pub fn issue_crtc_info(&mut self, crtc: Xid) -> Cookie {
        let cookie = self
            .backend
            .issue_crtc_info(xid::real(crtc), self.snapshot.real().config_timestamp);
        self.correlator
            .record(QueryKind::CrtcInfo, cookie.sequence, crtc);
        cookie
    }

    /// Fetch and shape a GetCrtcInfo reply.
    pub fn fetch_crtc_info(
        &mut self,
        cookie: Cookie,
    ) -> Result<ReplyOutcome<CrtcInfoReply>, BackendError> {
        let requested = self.correlator.resolve(QueryKind::CrtcInfo, cookie.sequence);
        let reply = self.backend.fetch_crtc_info(cookie)?;

        let requested = match requested {
            Some(requested) => requested,
            None => return Ok(ReplyOutcome::Reply(reply)),
        };

        if !xid::is_synthetic(requested) {
            if self.snapshot.crtc_is_split_parent(requested) {
                // Parent CRTC shows up disabled; its region belongs to the
                // virtual CRTCs now.
                let mut shaped = reply;
                shaped.mode = 0;
                shaped.x = 0;
                shaped.y = 0;
                shaped.width = 0;
                shaped.height = 0;
                return Ok(ReplyOutcome::Reply(shaped));
            }
            return Ok(ReplyOutcome::Reply(reply));
        }

        match self.snapshot.find_crtc(requested) {
            Some(crtc) => {
                let mut shaped = crtc.info.clone();
                shaped.sequence = reply.sequence;
                Ok(ReplyOutcome::Reply(shaped))
            }
            None => {
                debug!(crtc = requested, "stale virtual CRTC queried");
                Ok(ReplyOutcome::NotFound)
            }
        }
    }

    /// The live snapshot.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The backend this engine drives.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend handle, for requests that bypass the engine's
    /// interposition (everything that is not a resources or detail query
    /// goes straight through).
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
