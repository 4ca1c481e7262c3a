//! # splitrandr
//!
//! RandR interposition engine that makes one physical monitor look like
//! several independent outputs. Sits between an X11 client and the real
//! RandR implementation and rewrites the four replies that describe display
//! topology; everything else passes through.
//!
//! # Architecture
//!
//! ```text
//! client request
//!   ├─> engine      (per-connection context, owns everything below)
//!   ├─> config      (which monitors to split, matched by EDID + geometry)
//!   ├─> plan        (how to carve a monitor's rectangle)
//!   ├─> snapshot    (live real + virtual resource generation)
//!   ├─> correlate   (pending two-phase detail queries)
//!   ├─> wire        (byte-exact RandR reply codecs)
//!   └─> backend     (trait over the real RandR implementation)
//! ```
//!
//! The library is I/O-free: the configuration arrives as a byte slice and
//! the real server is reached through the [`backend::RandrBackend`] trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Real-backend collaborator trait and scripted mock
pub mod backend;

/// Split configuration parsing and monitor matching
pub mod config;

/// Two-phase query correlation
pub mod correlate;

/// Per-connection engine context
pub mod engine;

/// Split-plan parsing and application
pub mod plan;

/// Real + virtual resource snapshot
pub mod snapshot;

/// RandR reply wire codecs
pub mod wire;

/// Split-identifier codec
pub mod xid;
