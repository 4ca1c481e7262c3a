//! Split Plans
//!
//! A split plan is a binary tree describing how one monitor's rectangle is
//! carved into virtual sub-outputs. On disk it is a flat tag stream: `N` is a
//! leaf ("place a virtual output here"), `H` and `V` are splits carrying a
//! 32-bit offset followed by their two child payloads in document order.
//!
//! Parsing runs over a length-bounded cursor and rejects anything malformed
//! (unknown tag, truncated offset, trailing bytes) instead of reading past
//! the record. Offsets are validated against the actual rectangle when the
//! plan is applied, since the monitor geometry is not known at parse time.
//! Either way a bad plan fails the whole monitor atomically; a plan is never
//! applied partially.

use thiserror::Error;
use tracing::trace;

use crate::snapshot::{SplitSet, VirtualCrtc, VirtualMode, VirtualOutput};
use crate::wire::{CrtcInfoReply, ModeInfo, OutputInfoReply};
use crate::xid::{self, Xid};

const TAG_LEAF: u8 = b'N';
const TAG_HORIZONTAL: u8 = b'H';
const TAG_VERTICAL: u8 = b'V';

/// Nesting bound for the parser; a plan this deep would need more leaves
/// than the XID split range can number anyway.
const MAX_DEPTH: u32 = 1024;

/// Split-plan parse or application error
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    /// Payload byte that is not `N`, `H` or `V`
    #[error("unknown split-plan tag 0x{0:02x}")]
    UnknownTag(u8),

    /// Payload ended inside a node
    #[error("truncated split plan")]
    Truncated,

    /// Bytes left over after the root node
    #[error("{0} trailing bytes after split plan")]
    TrailingBytes(usize),

    /// Tree nests deeper than any valid plan can
    #[error("split plan nests deeper than {MAX_DEPTH}")]
    TooDeep,

    /// Split offset outside the rectangle it divides
    #[error("split offset {at} outside extent {extent}")]
    BadOffset {
        /// Stored offset
        at: u32,
        /// Extent of the rectangle being divided
        extent: u32,
    },

    /// More leaves than the XID split range can number
    #[error("plan has more than {} leaves", xid::MAX_INDEX)]
    TooManyLeaves,
}

/// Axis of a split node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    /// Divide the height: first child on top
    Horizontal,
    /// Divide the width: first child on the left
    Vertical,
}

/// One monitor's split plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitPlan {
    /// Place a virtual output covering the current rectangle
    Leaf,
    /// Divide the current rectangle at `at` pixels along `axis`
    Split {
        /// Split direction
        axis: SplitAxis,
        /// Offset of the cut, in pixels from the rectangle's origin
        at: u32,
        /// Child before the cut (top or left)
        first: Box<SplitPlan>,
        /// Child after the cut (bottom or right)
        second: Box<SplitPlan>,
    },
}

impl SplitPlan {
    /// Parse a plan payload; the whole slice must be consumed.
    pub fn parse(payload: &[u8]) -> Result<Self, PlanError> {
        let mut rest = payload;
        let plan = Self::parse_node(&mut rest, 0)?;
        if !rest.is_empty() {
            return Err(PlanError::TrailingBytes(rest.len()));
        }
        if plan.leaf_count() > xid::MAX_INDEX as usize {
            return Err(PlanError::TooManyLeaves);
        }
        Ok(plan)
    }

    fn parse_node(rest: &mut &[u8], depth: u32) -> Result<Self, PlanError> {
        if depth > MAX_DEPTH {
            return Err(PlanError::TooDeep);
        }
        let (&tag, tail) = rest.split_first().ok_or(PlanError::Truncated)?;
        *rest = tail;

        let axis = match tag {
            TAG_LEAF => return Ok(SplitPlan::Leaf),
            TAG_HORIZONTAL => SplitAxis::Horizontal,
            TAG_VERTICAL => SplitAxis::Vertical,
            other => return Err(PlanError::UnknownTag(other)),
        };

        if rest.len() < 4 {
            return Err(PlanError::Truncated);
        }
        let at = u32::from_le_bytes(rest[..4].try_into().expect("4-byte slice"));
        *rest = &rest[4..];

        let first = Self::parse_node(rest, depth + 1)?;
        let second = Self::parse_node(rest, depth + 1)?;
        Ok(SplitPlan::Split {
            axis,
            at,
            first: Box::new(first),
            second: Box::new(second),
        })
    }

    /// Number of leaves, which is the number of virtual outputs the plan
    /// produces.
    pub fn leaf_count(&self) -> usize {
        match self {
            SplitPlan::Leaf => 1,
            SplitPlan::Split { first, second, .. } => first.leaf_count() + second.leaf_count(),
        }
    }
}

/// The real objects a plan is applied against.
///
/// `crtc_info` must describe the CRTC named by `output_info.crtc`, and
/// `base_mode` must be that CRTC's active mode out of the screen-resources
/// mode table.
#[derive(Debug, Clone, Copy)]
pub struct ParentInfo<'a> {
    /// Real output being split
    pub output: Xid,
    /// Real output's info reply
    pub output_info: &'a OutputInfoReply,
    /// Info of the CRTC driving the output
    pub crtc_info: &'a CrtcInfoReply,
    /// The CRTC's active mode descriptor
    pub base_mode: &'a ModeInfo,
}

/// Apply a plan to a parent rectangle, emitting one virtual
/// output/CRTC/mode triple per leaf.
///
/// The rectangle starts at the parent CRTC's origin with the matched
/// `width`/`height`; leaves number themselves 1..=L in document order via a
/// counter shared across the whole walk. Returns the complete set or fails
/// without emitting anything.
pub fn apply(
    plan: &SplitPlan,
    parent: &ParentInfo<'_>,
    width: u32,
    height: u32,
) -> Result<SplitSet, PlanError> {
    let mut set = SplitSet::default();
    let mut counter = 0u32;
    walk(plan, parent, 0, 0, width, height, &mut counter, &mut set)?;
    trace!(
        output = parent.output,
        leaves = counter,
        "applied split plan"
    );
    Ok(set)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    plan: &SplitPlan,
    parent: &ParentInfo<'_>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    counter: &mut u32,
    set: &mut SplitSet,
) -> Result<(), PlanError> {
    match plan {
        SplitPlan::Leaf => {
            *counter += 1;
            emit_leaf(parent, x, y, width, height, *counter, set);
            Ok(())
        }
        SplitPlan::Split {
            axis: SplitAxis::Horizontal,
            at,
            first,
            second,
        } => {
            if *at == 0 || *at >= height {
                return Err(PlanError::BadOffset {
                    at: *at,
                    extent: height,
                });
            }
            walk(first, parent, x, y, width, *at, counter, set)?;
            walk(second, parent, x, y + at, width, height - at, counter, set)
        }
        SplitPlan::Split {
            axis: SplitAxis::Vertical,
            at,
            first,
            second,
        } => {
            if *at == 0 || *at >= width {
                return Err(PlanError::BadOffset {
                    at: *at,
                    extent: width,
                });
            }
            walk(first, parent, x, y, *at, height, counter, set)?;
            walk(second, parent, x + at, y, width - at, height, counter, set)
        }
    }
}

fn emit_leaf(
    parent: &ParentInfo<'_>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    index: u32,
    set: &mut SplitSet,
) {
    let info = parent.output_info;
    let crtc = parent.crtc_info;
    let output_xid = xid::encode(parent.output, index);
    let crtc_xid = xid::encode(info.crtc, index);

    let mut name = info.name.clone();
    name.extend_from_slice(format!("~{index}").as_bytes());

    // Physical size shrinks by the same fraction as each pixel dimension,
    // so the area scales by the split's area ratio.
    let mm_width = (u64::from(info.mm_width) * u64::from(width) / u64::from(crtc.width)) as u32;
    let mm_height = (u64::from(info.mm_height) * u64::from(height) / u64::from(crtc.height)) as u32;

    set.outputs.push(VirtualOutput {
        xid: output_xid,
        parent: parent.output,
        info: OutputInfoReply {
            status: info.status,
            sequence: 0,
            timestamp: info.timestamp,
            crtc: crtc_xid,
            mm_width,
            mm_height,
            connection: info.connection,
            subpixel_order: info.subpixel_order,
            crtcs: vec![crtc_xid],
            modes: vec![crtc_xid],
            num_preferred: 0,
            clones: info
                .clones
                .iter()
                .map(|&clone| xid::encode(clone, index))
                .collect(),
            name,
        },
    });

    set.crtcs.push(VirtualCrtc {
        xid: crtc_xid,
        parent: info.crtc,
        info: CrtcInfoReply {
            status: crtc.status,
            sequence: 0,
            timestamp: crtc.timestamp,
            x: crtc.x + x as i16,
            y: crtc.y + y as i16,
            width: width as u16,
            height: height as u16,
            mode: crtc_xid,
            rotation: crtc.rotation,
            rotations: crtc.rotations,
            outputs: vec![output_xid],
            possible: vec![output_xid],
        },
    });

    let mode_name = format!("{width}x{height}");
    set.modes.push(VirtualMode {
        info: ModeInfo {
            id: crtc_xid,
            width: width as u16,
            height: height as u16,
            name_len: mode_name.len() as u16,
            ..parent.base_mode.clone()
        },
        name: mode_name,
    });
}
