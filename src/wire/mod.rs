//! RandR Reply Wire Codecs
//!
//! Typed models of the four RandR replies this engine rewrites, with
//! byte-exact encoding: GetScreenResources (both the "current" and the
//! historical variant share one layout), GetOutputInfo and GetCrtcInfo.
//!
//! X11 replies are a 32-byte fixed header followed by `4 * length` bytes of
//! variable payload; the `length` field counts 4-byte units past the header.
//! Clients parse these replies with stock libxcb accessors, so the encoders
//! here must reproduce the server's layout exactly, padding included.
//!
//! Byte order is the connection's native order; this codec emits
//! little-endian, which is what every deployment this engine targets speaks.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::xid::Xid;

/// X11 reply opcode in the first byte of every reply.
const RESPONSE_TYPE_REPLY: u8 = 1;

/// Wire decode error
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    /// Buffer ended before the fixed reply header
    #[error("truncated reply: need {need} bytes, have {have}")]
    Truncated {
        /// Bytes required by the layout
        need: usize,
        /// Bytes actually present
        have: usize,
    },

    /// First byte is not the reply opcode
    #[error("not a reply: response type {0}")]
    NotAReply(u8),
}

fn ensure(buf: &[u8], need: usize) -> Result<(), WireError> {
    if buf.len() < need {
        return Err(WireError::Truncated {
            need,
            have: buf.len(),
        });
    }
    Ok(())
}

/// Round a payload size up to the 4-byte reply granularity.
fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Output connection state, as RandR reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Connection {
    /// Monitor attached and active
    Connected = 0,
    /// Nothing attached (also how split parents are reported)
    Disconnected = 1,
    /// Connection state cannot be determined
    Unknown = 2,
}

impl From<u8> for Connection {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Connection::Connected,
            1 => Connection::Disconnected,
            _ => Connection::Unknown,
        }
    }
}

/// A RandR mode descriptor (`xcb_randr_mode_info_t`), 32 bytes on the wire.
///
/// The mode's name lives in the screen-resources name blob; `name_len` is
/// the only reference to it here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    /// Mode XID
    pub id: Xid,
    /// Horizontal resolution
    pub width: u16,
    /// Vertical resolution
    pub height: u16,
    /// Pixel clock in Hz
    pub dot_clock: u32,
    /// Horizontal sync start
    pub hsync_start: u16,
    /// Horizontal sync end
    pub hsync_end: u16,
    /// Total horizontal timing
    pub htotal: u16,
    /// Horizontal skew
    pub hskew: u16,
    /// Vertical sync start
    pub vsync_start: u16,
    /// Vertical sync end
    pub vsync_end: u16,
    /// Total vertical timing
    pub vtotal: u16,
    /// Length of this mode's slice of the name blob
    pub name_len: u16,
    /// Mode flags (interlace, sync polarity, ...)
    pub mode_flags: u32,
}

impl ModeInfo {
    /// Wire size of one mode descriptor.
    pub const WIRE_LEN: usize = 32;

    pub(crate) fn parse(buf: &mut &[u8]) -> Result<Self, WireError> {
        ensure(buf, Self::WIRE_LEN)?;
        Ok(ModeInfo {
            id: buf.get_u32_le(),
            width: buf.get_u16_le(),
            height: buf.get_u16_le(),
            dot_clock: buf.get_u32_le(),
            hsync_start: buf.get_u16_le(),
            hsync_end: buf.get_u16_le(),
            htotal: buf.get_u16_le(),
            hskew: buf.get_u16_le(),
            vsync_start: buf.get_u16_le(),
            vsync_end: buf.get_u16_le(),
            vtotal: buf.get_u16_le(),
            name_len: buf.get_u16_le(),
            mode_flags: buf.get_u32_le(),
        })
    }

    pub(crate) fn encode_into(&self, out: &mut BytesMut) {
        out.put_u32_le(self.id);
        out.put_u16_le(self.width);
        out.put_u16_le(self.height);
        out.put_u32_le(self.dot_clock);
        out.put_u16_le(self.hsync_start);
        out.put_u16_le(self.hsync_end);
        out.put_u16_le(self.htotal);
        out.put_u16_le(self.hskew);
        out.put_u16_le(self.vsync_start);
        out.put_u16_le(self.vsync_end);
        out.put_u16_le(self.vtotal);
        out.put_u16_le(self.name_len);
        out.put_u32_le(self.mode_flags);
    }
}

/// GetScreenResources / GetScreenResourcesCurrent reply.
///
/// Both request variants answer with the same layout: 32-byte header, then
/// CRTC ids, output ids, mode descriptors, and the concatenated mode-name
/// blob. The `names` field holds exactly `names_len` bytes; trailing wire
/// padding is not part of the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenResourcesReply {
    /// Sequence number of the answered request
    pub sequence: u16,
    /// Time of the last configuration change
    pub timestamp: u32,
    /// Time of the last screen reconfiguration
    pub config_timestamp: u32,
    /// All CRTC ids
    pub crtcs: Vec<Xid>,
    /// All output ids
    pub outputs: Vec<Xid>,
    /// All mode descriptors
    pub modes: Vec<ModeInfo>,
    /// Mode names, concatenated in mode order
    pub names: Vec<u8>,
}

impl ScreenResourcesReply {
    /// Decode a full reply from wire bytes.
    pub fn parse(mut buf: &[u8]) -> Result<Self, WireError> {
        ensure(buf, 32)?;
        let response_type = buf.get_u8();
        if response_type != RESPONSE_TYPE_REPLY {
            return Err(WireError::NotAReply(response_type));
        }
        buf.advance(1); // pad
        let sequence = buf.get_u16_le();
        let _length = buf.get_u32_le();
        let timestamp = buf.get_u32_le();
        let config_timestamp = buf.get_u32_le();
        let num_crtcs = buf.get_u16_le() as usize;
        let num_outputs = buf.get_u16_le() as usize;
        let num_modes = buf.get_u16_le() as usize;
        let names_len = buf.get_u16_le() as usize;
        buf.advance(8); // pad

        let payload = num_crtcs * 4 + num_outputs * 4 + num_modes * ModeInfo::WIRE_LEN + names_len;
        ensure(buf, payload)?;

        let mut crtcs = Vec::with_capacity(num_crtcs);
        for _ in 0..num_crtcs {
            crtcs.push(buf.get_u32_le());
        }
        let mut outputs = Vec::with_capacity(num_outputs);
        for _ in 0..num_outputs {
            outputs.push(buf.get_u32_le());
        }
        let mut modes = Vec::with_capacity(num_modes);
        for _ in 0..num_modes {
            modes.push(ModeInfo::parse(&mut buf)?);
        }
        let names = buf[..names_len].to_vec();

        Ok(ScreenResourcesReply {
            sequence,
            timestamp,
            config_timestamp,
            crtcs,
            outputs,
            modes,
            names,
        })
    }

    /// Encode to wire bytes, recomputing the `length` field.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.crtcs.len() * 4
            + self.outputs.len() * 4
            + self.modes.len() * ModeInfo::WIRE_LEN
            + self.names.len();
        let padded = pad4(payload);

        let mut out = BytesMut::with_capacity(32 + padded);
        out.put_u8(RESPONSE_TYPE_REPLY);
        out.put_u8(0);
        out.put_u16_le(self.sequence);
        out.put_u32_le((padded / 4) as u32);
        out.put_u32_le(self.timestamp);
        out.put_u32_le(self.config_timestamp);
        out.put_u16_le(self.crtcs.len() as u16);
        out.put_u16_le(self.outputs.len() as u16);
        out.put_u16_le(self.modes.len() as u16);
        out.put_u16_le(self.names.len() as u16);
        out.put_bytes(0, 8);

        for crtc in &self.crtcs {
            out.put_u32_le(*crtc);
        }
        for output in &self.outputs {
            out.put_u32_le(*output);
        }
        for mode in &self.modes {
            mode.encode_into(&mut out);
        }
        out.put_slice(&self.names);
        out.put_bytes(0, padded - payload);

        out.to_vec()
    }
}

/// GetOutputInfo reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfoReply {
    /// RandR config status byte
    pub status: u8,
    /// Sequence number of the answered request
    pub sequence: u16,
    /// Time of the last output change
    pub timestamp: u32,
    /// CRTC currently driving this output (0 = none)
    pub crtc: Xid,
    /// Physical width in millimeters
    pub mm_width: u32,
    /// Physical height in millimeters
    pub mm_height: u32,
    /// Connection state
    pub connection: Connection,
    /// Subpixel ordering
    pub subpixel_order: u8,
    /// CRTCs this output can be driven by
    pub crtcs: Vec<Xid>,
    /// Modes this output supports
    pub modes: Vec<Xid>,
    /// How many leading entries of `modes` are preferred
    pub num_preferred: u16,
    /// Outputs this one can be cloned with
    pub clones: Vec<Xid>,
    /// Output name, not NUL-terminated
    pub name: Vec<u8>,
}

impl OutputInfoReply {
    /// Decode a full reply from wire bytes.
    pub fn parse(mut buf: &[u8]) -> Result<Self, WireError> {
        ensure(buf, 36)?;
        let response_type = buf.get_u8();
        if response_type != RESPONSE_TYPE_REPLY {
            return Err(WireError::NotAReply(response_type));
        }
        let status = buf.get_u8();
        let sequence = buf.get_u16_le();
        let _length = buf.get_u32_le();
        let timestamp = buf.get_u32_le();
        let crtc = buf.get_u32_le();
        let mm_width = buf.get_u32_le();
        let mm_height = buf.get_u32_le();
        let connection = Connection::from(buf.get_u8());
        let subpixel_order = buf.get_u8();
        let num_crtcs = buf.get_u16_le() as usize;
        let num_modes = buf.get_u16_le() as usize;
        let num_preferred = buf.get_u16_le();
        let num_clones = buf.get_u16_le() as usize;
        let name_len = buf.get_u16_le() as usize;

        let payload = (num_crtcs + num_modes + num_clones) * 4 + name_len;
        ensure(buf, payload)?;

        let mut crtcs = Vec::with_capacity(num_crtcs);
        for _ in 0..num_crtcs {
            crtcs.push(buf.get_u32_le());
        }
        let mut modes = Vec::with_capacity(num_modes);
        for _ in 0..num_modes {
            modes.push(buf.get_u32_le());
        }
        let mut clones = Vec::with_capacity(num_clones);
        for _ in 0..num_clones {
            clones.push(buf.get_u32_le());
        }
        let name = buf[..name_len].to_vec();

        Ok(OutputInfoReply {
            status,
            sequence,
            timestamp,
            crtc,
            mm_width,
            mm_height,
            connection,
            subpixel_order,
            crtcs,
            modes,
            num_preferred,
            clones,
            name,
        })
    }

    /// Encode to wire bytes, recomputing the `length` field.
    pub fn encode(&self) -> Vec<u8> {
        let payload =
            4 + (self.crtcs.len() + self.modes.len() + self.clones.len()) * 4 + self.name.len();
        let padded = pad4(payload);

        let mut out = BytesMut::with_capacity(32 + padded);
        out.put_u8(RESPONSE_TYPE_REPLY);
        out.put_u8(self.status);
        out.put_u16_le(self.sequence);
        out.put_u32_le((padded / 4) as u32);
        out.put_u32_le(self.timestamp);
        out.put_u32_le(self.crtc);
        out.put_u32_le(self.mm_width);
        out.put_u32_le(self.mm_height);
        out.put_u8(self.connection as u8);
        out.put_u8(self.subpixel_order);
        out.put_u16_le(self.crtcs.len() as u16);
        out.put_u16_le(self.modes.len() as u16);
        out.put_u16_le(self.num_preferred);
        out.put_u16_le(self.clones.len() as u16);
        out.put_u16_le(self.name.len() as u16);

        for crtc in &self.crtcs {
            out.put_u32_le(*crtc);
        }
        for mode in &self.modes {
            out.put_u32_le(*mode);
        }
        for clone in &self.clones {
            out.put_u32_le(*clone);
        }
        out.put_slice(&self.name);
        out.put_bytes(0, 32 + padded - out.len());

        out.to_vec()
    }

    /// Output name as UTF-8, lossy.
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// GetCrtcInfo reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcInfoReply {
    /// RandR config status byte
    pub status: u8,
    /// Sequence number of the answered request
    pub sequence: u16,
    /// Time of the last CRTC change
    pub timestamp: u32,
    /// X position on the screen
    pub x: i16,
    /// Y position on the screen
    pub y: i16,
    /// Width of the driven region
    pub width: u16,
    /// Height of the driven region
    pub height: u16,
    /// Active mode (0 = disabled)
    pub mode: Xid,
    /// Current rotation
    pub rotation: u16,
    /// Supported rotations
    pub rotations: u16,
    /// Outputs currently driven by this CRTC
    pub outputs: Vec<Xid>,
    /// Outputs this CRTC could drive
    pub possible: Vec<Xid>,
}

impl CrtcInfoReply {
    /// Decode a full reply from wire bytes.
    pub fn parse(mut buf: &[u8]) -> Result<Self, WireError> {
        ensure(buf, 32)?;
        let response_type = buf.get_u8();
        if response_type != RESPONSE_TYPE_REPLY {
            return Err(WireError::NotAReply(response_type));
        }
        let status = buf.get_u8();
        let sequence = buf.get_u16_le();
        let _length = buf.get_u32_le();
        let timestamp = buf.get_u32_le();
        let x = buf.get_i16_le();
        let y = buf.get_i16_le();
        let width = buf.get_u16_le();
        let height = buf.get_u16_le();
        let mode = buf.get_u32_le();
        let rotation = buf.get_u16_le();
        let rotations = buf.get_u16_le();
        let num_outputs = buf.get_u16_le() as usize;
        let num_possible = buf.get_u16_le() as usize;

        ensure(buf, (num_outputs + num_possible) * 4)?;
        let mut outputs = Vec::with_capacity(num_outputs);
        for _ in 0..num_outputs {
            outputs.push(buf.get_u32_le());
        }
        let mut possible = Vec::with_capacity(num_possible);
        for _ in 0..num_possible {
            possible.push(buf.get_u32_le());
        }

        Ok(CrtcInfoReply {
            status,
            sequence,
            timestamp,
            x,
            y,
            width,
            height,
            mode,
            rotation,
            rotations,
            outputs,
            possible,
        })
    }

    /// Encode to wire bytes, recomputing the `length` field.
    pub fn encode(&self) -> Vec<u8> {
        let payload = (self.outputs.len() + self.possible.len()) * 4;

        let mut out = BytesMut::with_capacity(32 + payload);
        out.put_u8(RESPONSE_TYPE_REPLY);
        out.put_u8(self.status);
        out.put_u16_le(self.sequence);
        out.put_u32_le((payload / 4) as u32);
        out.put_u32_le(self.timestamp);
        out.put_i16_le(self.x);
        out.put_i16_le(self.y);
        out.put_u16_le(self.width);
        out.put_u16_le(self.height);
        out.put_u32_le(self.mode);
        out.put_u16_le(self.rotation);
        out.put_u16_le(self.rotations);
        out.put_u16_le(self.outputs.len() as u16);
        out.put_u16_le(self.possible.len() as u16);

        for output in &self.outputs {
            out.put_u32_le(*output);
        }
        for possible in &self.possible {
            out.put_u32_le(*possible);
        }

        out.to_vec()
    }
}
