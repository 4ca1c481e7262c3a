//! Virtual Resource Snapshot
//!
//! The snapshot is the engine's picture of the world: the real
//! screen-resources reply it was derived from plus every virtual output,
//! CRTC and mode synthesized for it. It is rebuilt from scratch on every
//! screen-resources query and replaced atomically, so detail queries always
//! answer against the same generation of resources the client last listed.
//!
//! Rebuilding walks each real output through a fixed pipeline: fetch its
//! EDID, hex it into a fingerprint, fetch the output and CRTC details, look
//! the rule up by fingerprint and exact current geometry, and apply the
//! rule's split plan. Any miss along the way drops that one output from
//! splitting and keeps the rest of the rebuild going; a monitor with no rule
//! is the normal case, not an error.

use tracing::{debug, warn};

use crate::backend::RandrBackend;
use crate::config::SplitConfig;
use crate::plan::{self, ParentInfo};
use crate::wire::{CrtcInfoReply, ModeInfo, OutputInfoReply, ScreenResourcesReply};
use crate::xid::{self, Xid};

/// A synthesized output and its shaped GetOutputInfo answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualOutput {
    /// Split-encoded output id
    pub xid: Xid,
    /// Real output this was carved from
    pub parent: Xid,
    /// Shaped reply, minus the sequence number
    pub info: OutputInfoReply,
}

/// A synthesized CRTC and its shaped GetCrtcInfo answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualCrtc {
    /// Split-encoded CRTC id
    pub xid: Xid,
    /// Real CRTC this was carved from
    pub parent: Xid,
    /// Shaped reply, minus the sequence number
    pub info: CrtcInfoReply,
}

/// A synthesized mode and the name it contributes to the name blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualMode {
    /// Mode descriptor advertised in screen resources
    pub info: ModeInfo,
    /// Name appended to the resources name blob
    pub name: String,
}

/// Everything one applied split plan produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitSet {
    /// Virtual outputs, in leaf order
    pub outputs: Vec<VirtualOutput>,
    /// Virtual CRTCs, one per output
    pub crtcs: Vec<VirtualCrtc>,
    /// Virtual modes, one per CRTC
    pub modes: Vec<VirtualMode>,
}

/// One generation of real plus virtual resources.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    real: ScreenResourcesReply,
    outputs: Vec<VirtualOutput>,
    crtcs: Vec<VirtualCrtc>,
    modes: Vec<VirtualMode>,
}

impl Snapshot {
    /// Build a fresh snapshot from a just-fetched real reply.
    pub fn rebuild<B: RandrBackend>(
        backend: &mut B,
        config: &SplitConfig,
        real: ScreenResourcesReply,
    ) -> Snapshot {
        let mut outputs = Vec::new();
        let mut crtcs = Vec::new();
        let mut modes = Vec::new();

        if !config.is_empty() {
            for &output in &real.outputs {
                if let Some(set) = split_one_output(backend, config, &real, output) {
                    outputs.extend(set.outputs);
                    crtcs.extend(set.crtcs);
                    modes.extend(set.modes);
                }
            }
        }

        debug!(
            real_outputs = real.outputs.len(),
            virtual_outputs = outputs.len(),
            "rebuilt resource snapshot"
        );
        Snapshot {
            real,
            outputs,
            crtcs,
            modes,
        }
    }

    /// The real reply this snapshot was derived from.
    pub fn real(&self) -> &ScreenResourcesReply {
        &self.real
    }

    /// Compose the screen-resources reply the client sees: the real reply
    /// with every virtual id, mode and mode name appended after the real
    /// entries.
    pub fn compose_reply(&self) -> ScreenResourcesReply {
        let mut reply = self.real.clone();
        reply.crtcs.extend(self.crtcs.iter().map(|c| c.xid));
        reply.outputs.extend(self.outputs.iter().map(|o| o.xid));
        for mode in &self.modes {
            reply.modes.push(mode.info.clone());
            reply.names.extend_from_slice(mode.name.as_bytes());
        }
        reply
    }

    /// Look a virtual output up by its split-encoded id.
    pub fn find_output(&self, xid: Xid) -> Option<&VirtualOutput> {
        self.outputs.iter().find(|o| o.xid == xid)
    }

    /// Look a virtual CRTC up by its split-encoded id.
    pub fn find_crtc(&self, xid: Xid) -> Option<&VirtualCrtc> {
        self.crtcs.iter().find(|c| c.xid == xid)
    }

    /// True when a real output has been carved into virtual sub-outputs.
    pub fn is_split_parent(&self, output: Xid) -> bool {
        self.outputs.iter().any(|o| o.parent == output)
    }

    /// True when a real CRTC backs virtual CRTCs.
    pub fn crtc_is_split_parent(&self, crtc: Xid) -> bool {
        self.crtcs.iter().any(|c| c.parent == crtc)
    }

    /// All virtual outputs in this generation.
    pub fn outputs(&self) -> &[VirtualOutput] {
        &self.outputs
    }

    /// All virtual CRTCs in this generation.
    pub fn crtcs(&self) -> &[VirtualCrtc] {
        &self.crtcs
    }
}

/// Run one output through the matching pipeline. `None` means the output
/// passes through unsplit, for whatever reason.
fn split_one_output<B: RandrBackend>(
    backend: &mut B,
    config: &SplitConfig,
    real: &ScreenResourcesReply,
    output: Xid,
) -> Option<SplitSet> {
    if !xid::fits_real(output) {
        warn!(output, "output id collides with the split bit-range, passing through");
        return None;
    }

    let edid = match backend.fetch_output_edid(output) {
        Ok(edid) => edid,
        Err(err) => {
            debug!(output, %err, "no usable EDID, passing through");
            return None;
        }
    };
    let fingerprint = match edid.hex_fingerprint() {
        Ok(fingerprint) => fingerprint,
        Err(err) => {
            warn!(output, %err, "EDID length contract broken, passing through");
            return None;
        }
    };

    let cookie = backend.issue_output_info(output, real.config_timestamp);
    let output_info = match backend.fetch_output_info(cookie) {
        Ok(info) => info,
        Err(err) => {
            warn!(output, %err, "output detail query failed, passing through");
            return None;
        }
    };
    if output_info.crtc == 0 {
        debug!(output, "output not driven by a CRTC, passing through");
        return None;
    }
    if !xid::fits_real(output_info.crtc) {
        warn!(
            output,
            crtc = output_info.crtc,
            "CRTC id collides with the split bit-range, passing through"
        );
        return None;
    }

    let cookie = backend.issue_crtc_info(output_info.crtc, real.config_timestamp);
    let crtc_info = match backend.fetch_crtc_info(cookie) {
        Ok(info) => info,
        Err(err) => {
            warn!(output, crtc = output_info.crtc, %err, "CRTC detail query failed, passing through");
            return None;
        }
    };

    let rule = config.matched_rule(
        &fingerprint,
        u32::from(crtc_info.width),
        u32::from(crtc_info.height),
    )?;

    let base_mode = match real.modes.iter().find(|m| m.id == crtc_info.mode) {
        Some(mode) => mode,
        None => {
            warn!(
                output,
                mode = crtc_info.mode,
                "active mode missing from resources, passing through"
            );
            return None;
        }
    };

    let parent = ParentInfo {
        output,
        output_info: &output_info,
        crtc_info: &crtc_info,
        base_mode,
    };
    match plan::apply(&rule.plan, &parent, rule.width, rule.height) {
        Ok(set) => {
            debug!(output, rule = %rule.name, leaves = set.outputs.len(), "split output");
            Some(set)
        }
        Err(err) => {
            warn!(output, rule = %rule.name, %err, "split plan failed to apply, passing through");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::backend::{Cookie, ResourcesKind};
    use crate::wire::Connection;

    const EDID: &[u8] = &[0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
    const FINGERPRINT: &[u8] = b"00ffffffffffff00";

    // =========================================================================
    // Scenario plumbing
    // =========================================================================

    fn mode(id: Xid, width: u16, height: u16, name_len: u16) -> ModeInfo {
        ModeInfo {
            id,
            width,
            height,
            dot_clock: 266_500_000,
            hsync_start: 3888,
            hsync_end: 3920,
            htotal: 4000,
            hskew: 0,
            vsync_start: 1083,
            vsync_end: 1088,
            vtotal: 1111,
            name_len,
            mode_flags: 0x9,
        }
    }

    fn resources() -> ScreenResourcesReply {
        ScreenResourcesReply {
            sequence: 0,
            timestamp: 100,
            config_timestamp: 90,
            crtcs: vec![0x3f],
            outputs: vec![0x41],
            modes: vec![mode(0x50, 3840, 1080, 9)],
            names: b"3840x1080".to_vec(),
        }
    }

    fn output_info(crtc: Xid) -> OutputInfoReply {
        OutputInfoReply {
            status: 0,
            sequence: 0,
            timestamp: 100,
            crtc,
            mm_width: 1200,
            mm_height: 340,
            connection: Connection::Connected,
            subpixel_order: 0,
            crtcs: vec![0x3f],
            modes: vec![0x50],
            num_preferred: 1,
            clones: vec![],
            name: b"DP-1".to_vec(),
        }
    }

    fn crtc_info(width: u16, height: u16) -> CrtcInfoReply {
        CrtcInfoReply {
            status: 0,
            sequence: 0,
            timestamp: 100,
            x: 0,
            y: 0,
            width,
            height,
            mode: 0x50,
            rotation: 1,
            rotations: 0x3f,
            outputs: vec![0x41],
            possible: vec![0x41],
        }
    }

    fn vsplit_config(at: u32, width: u32, height: u32) -> SplitConfig {
        let mut plan = vec![b'V'];
        plan.extend_from_slice(&at.to_le_bytes());
        plan.extend_from_slice(b"NN");

        let mut name = [0u8; 128];
        name[..4].copy_from_slice(b"wide");
        let mut fp = [0u8; 768];
        fp[..FINGERPRINT.len()].copy_from_slice(FINGERPRINT);

        let size = 128 + 768 + 12 + plan.len();
        let mut stream = Vec::new();
        stream.extend_from_slice(&(size as u32).to_le_bytes());
        stream.extend_from_slice(&name);
        stream.extend_from_slice(&fp);
        stream.extend_from_slice(&width.to_le_bytes());
        stream.extend_from_slice(&height.to_le_bytes());
        stream.extend_from_slice(&(plan.len() as u32).to_le_bytes());
        stream.extend_from_slice(&plan);
        SplitConfig::parse(&stream).unwrap()
    }

    fn fetch_resources(backend: &mut MockBackend) -> ScreenResourcesReply {
        let cookie = backend.issue_screen_resources(ResourcesKind::Current);
        backend
            .fetch_screen_resources(cookie, ResourcesKind::Current)
            .unwrap()
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    #[test]
    fn splits_a_matching_monitor() {
        let mut backend = MockBackend::new(resources())
            .with_output(0x41, output_info(0x3f))
            .with_crtc(0x3f, crtc_info(3840, 1080))
            .with_edid(0x41, EDID);
        let config = vsplit_config(1920, 3840, 1080);

        let real = fetch_resources(&mut backend);
        let snapshot = Snapshot::rebuild(&mut backend, &config, real);

        assert_eq!(snapshot.outputs().len(), 2);
        assert_eq!(snapshot.crtcs().len(), 2);
        assert!(snapshot.is_split_parent(0x41));
        assert!(snapshot.crtc_is_split_parent(0x3f));
        assert_eq!(
            snapshot.find_output(xid::encode(0x41, 1)).unwrap().parent,
            0x41
        );
        assert!(snapshot.find_output(0x41).is_none());
    }

    #[test]
    fn geometry_mismatch_passes_through() {
        // Rule authored for 3840x1080; monitor now runs 1920x1080.
        let real_reply = ScreenResourcesReply {
            modes: vec![mode(0x50, 1920, 1080, 9)],
            ..resources()
        };
        let mut backend = MockBackend::new(real_reply)
            .with_output(0x41, output_info(0x3f))
            .with_crtc(0x3f, crtc_info(1920, 1080))
            .with_edid(0x41, EDID);
        let config = vsplit_config(1920, 3840, 1080);

        let real = fetch_resources(&mut backend);
        let snapshot = Snapshot::rebuild(&mut backend, &config, real);

        assert!(snapshot.outputs().is_empty());
        assert!(!snapshot.is_split_parent(0x41));
    }

    #[test]
    fn missing_edid_passes_through() {
        let mut backend = MockBackend::new(resources())
            .with_output(0x41, output_info(0x3f))
            .with_crtc(0x3f, crtc_info(3840, 1080));
        let config = vsplit_config(1920, 3840, 1080);

        let real = fetch_resources(&mut backend);
        let snapshot = Snapshot::rebuild(&mut backend, &config, real);
        assert!(snapshot.outputs().is_empty());
    }

    #[test]
    fn broken_edid_length_passes_through() {
        let mut backend = MockBackend::new(resources())
            .with_output(0x41, output_info(0x3f))
            .with_crtc(0x3f, crtc_info(3840, 1080))
            .with_bad_edid(0x41, EDID, EDID.len() as u32);
        let config = vsplit_config(1920, 3840, 1080);

        let real = fetch_resources(&mut backend);
        let snapshot = Snapshot::rebuild(&mut backend, &config, real);
        assert!(snapshot.outputs().is_empty());
    }

    #[test]
    fn idle_output_passes_through() {
        let mut backend = MockBackend::new(resources())
            .with_output(0x41, output_info(0))
            .with_edid(0x41, EDID);
        let config = vsplit_config(1920, 3840, 1080);

        let real = fetch_resources(&mut backend);
        let snapshot = Snapshot::rebuild(&mut backend, &config, real);
        assert!(snapshot.outputs().is_empty());
    }

    #[test]
    fn one_failing_output_does_not_poison_the_rest() {
        // Two outputs; only 0x42 has details scripted and a matching rule.
        let real_reply = ScreenResourcesReply {
            crtcs: vec![0x3f, 0x40],
            outputs: vec![0x41, 0x42],
            ..resources()
        };
        let second_output = OutputInfoReply {
            crtc: 0x40,
            name: b"DP-2".to_vec(),
            ..output_info(0x40)
        };
        let mut backend = MockBackend::new(real_reply)
            .with_output(0x42, second_output)
            .with_crtc(0x40, crtc_info(3840, 1080))
            .with_edid(0x41, EDID)
            .with_edid(0x42, EDID);
        let config = vsplit_config(1920, 3840, 1080);

        let real = fetch_resources(&mut backend);
        let snapshot = Snapshot::rebuild(&mut backend, &config, real);

        assert_eq!(snapshot.outputs().len(), 2);
        assert!(snapshot.is_split_parent(0x42));
        assert!(!snapshot.is_split_parent(0x41));
    }

    #[test]
    fn empty_config_skips_all_queries() {
        let mut backend = MockBackend::new(resources());
        let real = fetch_resources(&mut backend);
        let before = backend.issued().len();

        let snapshot = Snapshot::rebuild(&mut backend, &SplitConfig::default(), real);
        assert!(snapshot.outputs().is_empty());
        assert_eq!(backend.issued().len(), before);
    }

    // =========================================================================
    // Reply composition
    // =========================================================================

    #[test]
    fn composed_reply_appends_virtual_resources() {
        let mut backend = MockBackend::new(resources())
            .with_output(0x41, output_info(0x3f))
            .with_crtc(0x3f, crtc_info(3840, 1080))
            .with_edid(0x41, EDID);
        let config = vsplit_config(1920, 3840, 1080);

        let real = fetch_resources(&mut backend);
        let snapshot = Snapshot::rebuild(&mut backend, &config, real);
        let reply = snapshot.compose_reply();

        assert_eq!(
            reply.outputs,
            vec![0x41, xid::encode(0x41, 1), xid::encode(0x41, 2)]
        );
        assert_eq!(
            reply.crtcs,
            vec![0x3f, xid::encode(0x3f, 1), xid::encode(0x3f, 2)]
        );
        assert_eq!(reply.modes.len(), 3);
        assert_eq!(reply.names, b"3840x10801920x10801920x1080".to_vec());
        // Name blob offsets stay consistent with the per-mode name_len fields.
        let total: usize = reply.modes.iter().map(|m| m.name_len as usize).sum();
        assert_eq!(total, reply.names.len());
        // Still encodes to valid wire bytes.
        let bytes = reply.encode();
        assert_eq!(ScreenResourcesReply::parse(&bytes).unwrap(), reply);
    }

    #[test]
    fn composed_reply_without_rules_is_the_real_reply() {
        let mut backend = MockBackend::new(resources());
        let real = fetch_resources(&mut backend);
        let expected = real.clone();
        let snapshot = Snapshot::rebuild(&mut backend, &SplitConfig::default(), real);
        assert_eq!(snapshot.compose_reply(), expected);
    }

    #[test]
    fn unknown_cookie_is_rejected_by_the_backend() {
        let mut backend = MockBackend::new(resources());
        let err = backend.fetch_output_info(Cookie { sequence: 999 });
        assert!(err.is_err());
    }
}
