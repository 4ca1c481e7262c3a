//! Split Configuration
//!
//! Parses the binary rule stream that says which monitors to split and how,
//! and matches monitors against it. The stream is a concatenation of
//! variable-length records:
//!
//! ```text
//! u32 size          bytes in this record after the size field
//! name[128]         human-readable label, NUL padded
//! fingerprint[768]  hex-encoded EDID, NUL padded
//! u32 width         pixel width the rule was authored for
//! u32 height        pixel height the rule was authored for
//! u32 plan_len      split-plan payload length
//! plan[plan_len]    see [`crate::plan`]
//! ```
//!
//! All integers are little-endian. A monitor matches a rule only when its
//! EDID fingerprint is byte-identical *and* its current mode size equals the
//! rule's target size exactly; a reconfigured monitor silently stops
//! matching and passes through unsplit. The first matching record wins.
//!
//! Reading the file from disk is the caller's concern; this module consumes
//! a byte slice. Any structural problem fails the parse of the whole stream
//! with a [`ConfigError`], which callers treat as "no splitting configured".

use thiserror::Error;
use tracing::{debug, trace};

use crate::plan::{PlanError, SplitPlan};

const NAME_LEN: usize = 128;
const FINGERPRINT_LEN: usize = 768;
/// Fixed record bytes after the size field: name, fingerprint, target
/// geometry and the plan-length field.
const FIXED_LEN: usize = NAME_LEN + FINGERPRINT_LEN + 12;

/// Configuration stream parse error
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Stream ended inside a record
    #[error("configuration truncated at byte {0}")]
    Truncated(usize),

    /// Record size field smaller than the fixed record layout
    #[error("record at byte {offset} declares {size} bytes, minimum is {FIXED_LEN}")]
    RecordTooShort {
        /// Stream offset of the record
        offset: usize,
        /// Declared record size
        size: usize,
    },

    /// Declared plan length disagrees with the record size
    #[error("record at byte {offset}: plan length {declared} does not fill the record ({actual} bytes left)")]
    PlanLenMismatch {
        /// Stream offset of the record
        offset: usize,
        /// Plan length field
        declared: usize,
        /// Bytes actually left in the record
        actual: usize,
    },

    /// Rule targets a degenerate monitor size
    #[error("record at byte {offset}: zero target geometry {width}x{height}")]
    BadGeometry {
        /// Stream offset of the record
        offset: usize,
        /// Target width
        width: u32,
        /// Target height
        height: u32,
    },

    /// Split-plan payload failed to parse
    #[error("record at byte {offset}: {source}")]
    Plan {
        /// Stream offset of the record
        offset: usize,
        /// Underlying plan error
        #[source]
        source: PlanError,
    },
}

/// One monitor-splitting rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRule {
    /// Label from the configuration tool, for diagnostics only
    pub name: String,
    /// Hex-encoded EDID this rule applies to
    pub fingerprint: Vec<u8>,
    /// Pixel width the monitor must currently have
    pub width: u32,
    /// Pixel height the monitor must currently have
    pub height: u32,
    /// How to carve the monitor up
    pub plan: SplitPlan,
}

/// The parsed rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitConfig {
    rules: Vec<MonitorRule>,
}

fn trim_nul(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ConfigError> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or(ConfigError::Truncated(offset))?;
    Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
}

impl SplitConfig {
    /// Parse a complete configuration stream.
    pub fn parse(stream: &[u8]) -> Result<Self, ConfigError> {
        let mut rules = Vec::new();
        let mut offset = 0usize;

        while offset < stream.len() {
            let size = read_u32(stream, offset)? as usize;
            let body_start = offset + 4;
            if size < FIXED_LEN {
                return Err(ConfigError::RecordTooShort { offset, size });
            }
            let body = stream
                .get(body_start..body_start + size)
                .ok_or(ConfigError::Truncated(offset))?;

            let name = String::from_utf8_lossy(trim_nul(&body[..NAME_LEN])).into_owned();
            let fingerprint = trim_nul(&body[NAME_LEN..NAME_LEN + FINGERPRINT_LEN]).to_vec();
            let width = read_u32(body, NAME_LEN + FINGERPRINT_LEN)?;
            let height = read_u32(body, NAME_LEN + FINGERPRINT_LEN + 4)?;
            let plan_len = read_u32(body, NAME_LEN + FINGERPRINT_LEN + 8)? as usize;

            if width == 0 || height == 0 {
                return Err(ConfigError::BadGeometry {
                    offset,
                    width,
                    height,
                });
            }

            let plan_payload = &body[FIXED_LEN..];
            if plan_len != plan_payload.len() {
                return Err(ConfigError::PlanLenMismatch {
                    offset,
                    declared: plan_len,
                    actual: plan_payload.len(),
                });
            }

            let plan = SplitPlan::parse(plan_payload)
                .map_err(|source| ConfigError::Plan { offset, source })?;

            trace!(name = %name, width, height, leaves = plan.leaf_count(), "parsed split rule");
            rules.push(MonitorRule {
                name,
                fingerprint,
                width,
                height,
                plan,
            });

            offset = body_start + size;
        }

        debug!(rules = rules.len(), "parsed split configuration");
        Ok(SplitConfig { rules })
    }

    /// Find the rule for a monitor, by exact fingerprint and exact current
    /// geometry. `None` means the monitor passes through unsplit.
    pub fn matched_rule(
        &self,
        fingerprint: &[u8],
        width: u32,
        height: u32,
    ) -> Option<&MonitorRule> {
        self.rules.iter().find(|rule| {
            rule.fingerprint == fingerprint && rule.width == width && rule.height == height
        })
    }

    /// All parsed rules, in stream order.
    pub fn rules(&self) -> &[MonitorRule] {
        &self.rules
    }

    /// True when no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP_A: &[u8] = b"00ffffffffffff004c2d0c0c00000000";
    const FP_B: &[u8] = b"00ffffffffffff0010ac33a055383234";

    /// Build one record the way the configuration tool writes it.
    fn record(name: &str, fingerprint: &[u8], width: u32, height: u32, plan: &[u8]) -> Vec<u8> {
        let mut name_field = [0u8; NAME_LEN];
        name_field[..name.len()].copy_from_slice(name.as_bytes());
        let mut fp_field = [0u8; FINGERPRINT_LEN];
        fp_field[..fingerprint.len()].copy_from_slice(fingerprint);

        let size = FIXED_LEN + plan.len();
        let mut out = Vec::with_capacity(4 + size);
        out.extend_from_slice(&(size as u32).to_le_bytes());
        out.extend_from_slice(&name_field);
        out.extend_from_slice(&fp_field);
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&(plan.len() as u32).to_le_bytes());
        out.extend_from_slice(plan);
        out
    }

    fn vsplit(at: u32) -> Vec<u8> {
        let mut plan = vec![b'V'];
        plan.extend_from_slice(&at.to_le_bytes());
        plan.extend_from_slice(b"NN");
        plan
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn parses_empty_stream() {
        let config = SplitConfig::parse(&[]).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn parses_two_records() {
        let mut stream = record("wide", FP_A, 3840, 1080, &vsplit(1920));
        stream.extend_from_slice(&record("tall", FP_B, 2560, 2880, b"N"));

        let config = SplitConfig::parse(&stream).unwrap();
        assert_eq!(config.rules().len(), 2);
        assert_eq!(config.rules()[0].name, "wide");
        assert_eq!(config.rules()[0].plan.leaf_count(), 2);
        assert_eq!(config.rules()[1].name, "tall");
        assert_eq!(config.rules()[1].fingerprint, FP_B);
    }

    #[test]
    fn truncated_record_fails() {
        let mut stream = record("wide", FP_A, 3840, 1080, &vsplit(1920));
        stream.truncate(stream.len() - 3);
        assert!(matches!(
            SplitConfig::parse(&stream),
            Err(ConfigError::Truncated(0))
        ));
    }

    #[test]
    fn truncated_size_field_fails() {
        assert!(matches!(
            SplitConfig::parse(&[0x10, 0x00]),
            Err(ConfigError::Truncated(0))
        ));
    }

    #[test]
    fn undersized_record_fails() {
        let mut stream = vec![];
        stream.extend_from_slice(&8u32.to_le_bytes());
        stream.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            SplitConfig::parse(&stream),
            Err(ConfigError::RecordTooShort { offset: 0, size: 8 })
        ));
    }

    #[test]
    fn plan_length_mismatch_fails() {
        let mut stream = record("wide", FP_A, 3840, 1080, &vsplit(1920));
        // Corrupt the plan-length field (offset 4 + 128 + 768 + 8).
        let pos = 4 + NAME_LEN + FINGERPRINT_LEN + 8;
        stream[pos..pos + 4].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            SplitConfig::parse(&stream),
            Err(ConfigError::PlanLenMismatch { declared: 2, .. })
        ));
    }

    #[test]
    fn zero_geometry_fails() {
        let stream = record("wide", FP_A, 0, 1080, b"N");
        assert!(matches!(
            SplitConfig::parse(&stream),
            Err(ConfigError::BadGeometry { width: 0, .. })
        ));
    }

    #[test]
    fn bad_plan_poisons_stream() {
        let stream = record("wide", FP_A, 3840, 1080, b"Q");
        assert!(matches!(
            SplitConfig::parse(&stream),
            Err(ConfigError::Plan { offset: 0, .. })
        ));
    }

    // =========================================================================
    // Matching
    // =========================================================================

    #[test]
    fn matches_on_fingerprint_and_geometry() {
        let stream = record("wide", FP_A, 3840, 1080, &vsplit(1920));
        let config = SplitConfig::parse(&stream).unwrap();

        assert!(config.matched_rule(FP_A, 3840, 1080).is_some());
    }

    #[test]
    fn geometry_mismatch_skips_rule() {
        let stream = record("wide", FP_A, 3840, 1080, &vsplit(1920));
        let config = SplitConfig::parse(&stream).unwrap();

        // Monitor was reconfigured since the rule was authored.
        assert!(config.matched_rule(FP_A, 1920, 1080).is_none());
        assert!(config.matched_rule(FP_A, 3840, 1079).is_none());
    }

    #[test]
    fn fingerprint_mismatch_skips_rule() {
        let stream = record("wide", FP_A, 3840, 1080, &vsplit(1920));
        let config = SplitConfig::parse(&stream).unwrap();

        assert!(config.matched_rule(FP_B, 3840, 1080).is_none());
        // Prefix of the right fingerprint is not a match.
        assert!(config.matched_rule(&FP_A[..16], 3840, 1080).is_none());
    }

    #[test]
    fn first_matching_record_wins() {
        let mut stream = record("first", FP_A, 3840, 1080, &vsplit(1920));
        stream.extend_from_slice(&record("second", FP_A, 3840, 1080, b"N"));
        let config = SplitConfig::parse(&stream).unwrap();

        assert_eq!(config.matched_rule(FP_A, 3840, 1080).unwrap().name, "first");
    }

    #[test]
    fn same_fingerprint_different_geometry_selects_by_size() {
        let mut stream = record("wide", FP_A, 3840, 1080, &vsplit(1920));
        stream.extend_from_slice(&record("half", FP_A, 1920, 1080, b"N"));
        let config = SplitConfig::parse(&stream).unwrap();

        assert_eq!(config.matched_rule(FP_A, 1920, 1080).unwrap().name, "half");
        assert_eq!(config.matched_rule(FP_A, 3840, 1080).unwrap().name, "wide");
    }
}
