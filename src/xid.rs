//! Split-Identifier Codec
//!
//! Virtual outputs and CRTCs share the XID namespace with the real resources
//! they were carved out of. A reserved bit-range of the XID carries the split
//! index: `xid & !SPLIT_MASK` is the real resource, `xid >> SPLIT_SHIFT` is
//! the nonzero index of the virtual sub-output. Index 0 means "not synthetic".
//!
//! The X server allocates client XIDs as `client_id | (xid_mask & value)`;
//! RandR resource ids are server-owned and leave the upper bits clear, which
//! is what makes the reserved range safe to repurpose. [`fits_real`] checks
//! that assumption against the deployment instead of assuming it.

/// Bit position where the split index starts.
pub const SPLIT_SHIFT: u32 = 21;

/// Reserved bit-range holding the split index.
pub const SPLIT_MASK: u32 = 0x7FE0_0000;

/// Largest split index the reserved range can carry.
pub const MAX_INDEX: u32 = SPLIT_MASK >> SPLIT_SHIFT;

/// A RandR resource identifier (output, CRTC, or mode).
pub type Xid = u32;

/// Combine a real identifier with a split index.
///
/// `encode(real, 0)` returns `real` unchanged. The caller is responsible for
/// checking [`fits_real`] on `real` first; encoding an id whose reserved bits
/// are already set would silently alias another resource.
#[inline]
pub fn encode(real: Xid, index: u32) -> Xid {
    debug_assert!(index <= MAX_INDEX);
    (real & !SPLIT_MASK) | (index << SPLIT_SHIFT)
}

/// Split an identifier into its real id and split index.
///
/// Index 0 means the id names a real resource.
#[inline]
pub fn decode(xid: Xid) -> (Xid, u32) {
    (xid & !SPLIT_MASK, (xid & SPLIT_MASK) >> SPLIT_SHIFT)
}

/// True when the identifier carries a nonzero split index.
#[inline]
pub fn is_synthetic(xid: Xid) -> bool {
    xid & SPLIT_MASK != 0
}

/// Strip any split index, yielding the real identifier.
#[inline]
pub fn real(xid: Xid) -> Xid {
    xid & !SPLIT_MASK
}

/// Check that a real identifier leaves the reserved bit-range clear.
///
/// Real ids that fail this cannot be split: any index we stored would decode
/// back to a different real id.
#[inline]
pub fn fits_real(real: Xid) -> bool {
    real & SPLIT_MASK == 0
}
