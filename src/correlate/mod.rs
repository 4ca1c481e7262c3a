//! Issue/Fetch Correlation
//!
//! Detail queries are two-phase: the id the client asked about is only on
//! hand at issue time, but the reply has to be shaped at fetch time. The
//! [`Correlator`] bridges the two by remembering, per query kind and X11
//! sequence number, which id an outstanding request was issued for.
//!
//! A fetch for a sequence the correlator never saw is a legitimate outcome,
//! not a bug: the client may have issued the request before this engine was
//! in the path, or through some channel that bypassed it. Those replies pass
//! through untouched.

use std::collections::HashMap;

use tracing::trace;

use crate::xid::Xid;

/// Which detail query a pending entry belongs to. Output and CRTC queries
/// correlate independently; their sequence numbers share one X11 counter but
/// never collide within a kind while outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// GetOutputInfo
    OutputInfo,
    /// GetCrtcInfo
    CrtcInfo,
}

/// Pending-query table keyed by kind and sequence number.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<(QueryKind, u16), Xid>,
}

impl Correlator {
    /// Remember which id an issued request asked about.
    ///
    /// Sequence numbers wrap at 65536; an entry left behind by a fetch that
    /// never happened is simply overwritten when its sequence comes around
    /// again.
    pub fn record(&mut self, kind: QueryKind, sequence: u16, requested: Xid) {
        if let Some(stale) = self.pending.insert((kind, sequence), requested) {
            trace!(?kind, sequence, stale, "overwrote stale pending query");
        }
    }

    /// Claim the pending entry for a fetched reply, removing it.
    ///
    /// `None` means the request was never issued through this engine.
    pub fn resolve(&mut self, kind: QueryKind, sequence: u16) -> Option<Xid> {
        self.pending.remove(&(kind, sequence))
    }

    /// Number of outstanding queries.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}
