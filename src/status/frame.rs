//! The 8-byte status frame pushed to web UI clients.
//!
//! ```text
//! 0  '#' marker
//! 1  slot id + '0'
//! 2  resolution id
//! 3  scanlines, VDS line filter, step response, peaking, auto gain, frame-time lock
//! 4  deint motion adaptive, deint bob, full height, match preset source, PAL force 60
//! 5  output component, calibration ADC, prefer scaling RGBHV, no external clock gen
//! 6  print infos, invert sync, OSR active, ADC filter, debug view
//! 7  OTA updates allowed
//! ```
//!
//! Flags occupy bits from bit 0 upwards in the order listed.

use crate::config::{RuntimeOptions, UserOptions};
use std::fmt;

/// Frame length in bytes.
pub const FRAME_LEN: usize = 8;

/// First byte of every status frame. The UI filters messages on it.
pub const FRAME_MARKER: u8 = b'#';

/// Deinterlacer modes as stored in [`UserOptions::deint_mode`].
const DEINT_MOTION_ADAPTIVE: u8 = 0;
const DEINT_BOB: u8 = 1;

/// Flattened view of everything a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub slot_id: u8,
    pub resolution_id: u8,

    pub scanlines: bool,
    pub vds_line_filter: bool,
    pub step_response: bool,
    pub peaking: bool,
    pub auto_gain: bool,
    pub frame_time_lock: bool,

    pub deint_motion_adaptive: bool,
    pub deint_bob: bool,
    pub full_height: bool,
    pub match_preset_source: bool,
    pub pal_force_60: bool,

    pub output_component: bool,
    pub calibration_adc: bool,
    pub prefer_scaling_rgbhv: bool,
    pub disable_external_clock_generator: bool,

    pub print_infos: bool,
    pub invert_sync: bool,
    pub osr_active: bool,
    /// Read from the ADC filter register by the caller.
    pub adc_filter_active: bool,
    pub debug_view: bool,

    pub updates_ota: bool,
}

impl StatusSnapshot {
    /// Collect the frame contents from the option sets.
    pub fn compose(user: &UserOptions, runtime: &RuntimeOptions, adc_filter_active: bool) -> Self {
        Self {
            slot_id: user.slot_id,
            resolution_id: user.resolution.id(),

            scanlines: user.want_scanlines,
            vds_line_filter: user.want_vds_line_filter,
            step_response: user.want_step_response,
            peaking: user.want_peaking,
            auto_gain: user.enable_auto_gain,
            frame_time_lock: user.enable_frame_time_lock,

            deint_motion_adaptive: user.deint_mode == DEINT_MOTION_ADAPTIVE,
            deint_bob: user.deint_mode == DEINT_BOB,
            full_height: user.want_full_height,
            match_preset_source: user.match_preset_source,
            pal_force_60: user.pal_force_60,

            output_component: user.want_output_component,
            calibration_adc: user.enable_calibration_adc,
            prefer_scaling_rgbhv: user.prefer_scaling_rgbhv,
            disable_external_clock_generator: user.disable_external_clock_generator,

            print_infos: runtime.print_infos,
            invert_sync: runtime.invert_sync,
            osr_active: runtime.osr != 0,
            adc_filter_active,
            debug_view: runtime.debug_view,

            updates_ota: runtime.allow_updates_ota,
        }
    }

    /// Names of the set flags, in frame bit order.
    pub fn active_flags(&self) -> Vec<&'static str> {
        [
            ("scanlines", self.scanlines),
            ("vds_line_filter", self.vds_line_filter),
            ("step_response", self.step_response),
            ("peaking", self.peaking),
            ("auto_gain", self.auto_gain),
            ("frame_time_lock", self.frame_time_lock),
            ("deint_motion_adaptive", self.deint_motion_adaptive),
            ("deint_bob", self.deint_bob),
            ("full_height", self.full_height),
            ("match_preset_source", self.match_preset_source),
            ("pal_force_60", self.pal_force_60),
            ("output_component", self.output_component),
            ("calibration_adc", self.calibration_adc),
            ("prefer_scaling_rgbhv", self.prefer_scaling_rgbhv),
            ("disable_external_clock_generator", self.disable_external_clock_generator),
            ("print_infos", self.print_infos),
            ("invert_sync", self.invert_sync),
            ("osr_active", self.osr_active),
            ("adc_filter_active", self.adc_filter_active),
            ("debug_view", self.debug_view),
            ("updates_ota", self.updates_ota),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

fn pack(flags: &[bool]) -> u8 {
    flags
        .iter()
        .enumerate()
        .fold(0, |byte, (bit, &set)| byte | (u8::from(set) << bit))
}

fn bit(byte: u8, n: u8) -> bool {
    byte & (1 << n) != 0
}

/// Pack a snapshot into a frame.
pub fn build_frame(s: &StatusSnapshot) -> [u8; FRAME_LEN] {
    [
        FRAME_MARKER,
        s.slot_id.wrapping_add(b'0'),
        s.resolution_id,
        pack(&[
            s.scanlines,
            s.vds_line_filter,
            s.step_response,
            s.peaking,
            s.auto_gain,
            s.frame_time_lock,
        ]),
        pack(&[
            s.deint_motion_adaptive,
            s.deint_bob,
            s.full_height,
            s.match_preset_source,
            s.pal_force_60,
        ]),
        pack(&[
            s.output_component,
            s.calibration_adc,
            s.prefer_scaling_rgbhv,
            s.disable_external_clock_generator,
        ]),
        pack(&[
            s.print_infos,
            s.invert_sync,
            s.osr_active,
            s.adc_filter_active,
            s.debug_view,
        ]),
        pack(&[s.updates_ota]),
    ]
}

/// Read a frame back. Unused bits are ignored.
pub fn decode_frame(frame: &[u8]) -> Result<StatusSnapshot, FrameError> {
    let f: &[u8; FRAME_LEN] = frame
        .try_into()
        .map_err(|_| FrameError::Length(frame.len()))?;
    if f[0] != FRAME_MARKER {
        return Err(FrameError::Marker(f[0]));
    }

    Ok(StatusSnapshot {
        slot_id: f[1].wrapping_sub(b'0'),
        resolution_id: f[2],

        scanlines: bit(f[3], 0),
        vds_line_filter: bit(f[3], 1),
        step_response: bit(f[3], 2),
        peaking: bit(f[3], 3),
        auto_gain: bit(f[3], 4),
        frame_time_lock: bit(f[3], 5),

        deint_motion_adaptive: bit(f[4], 0),
        deint_bob: bit(f[4], 1),
        full_height: bit(f[4], 2),
        match_preset_source: bit(f[4], 3),
        pal_force_60: bit(f[4], 4),

        output_component: bit(f[5], 0),
        calibration_adc: bit(f[5], 1),
        prefer_scaling_rgbhv: bit(f[5], 2),
        disable_external_clock_generator: bit(f[5], 3),

        print_infos: bit(f[6], 0),
        invert_sync: bit(f[6], 1),
        osr_active: bit(f[6], 2),
        adc_filter_active: bit(f[6], 3),
        debug_view: bit(f[6], 4),

        updates_ota: bit(f[7], 0),
    })
}

/// Why a byte sequence is not a status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Wrong length.
    Length(usize),
    /// First byte is not `'#'`.
    Marker(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length(len) => write!(f, "status frame must be {} bytes, got {}", FRAME_LEN, len),
            Self::Marker(b) => write!(f, "not a status frame (marker 0x{:02x})", b),
        }
    }
}

impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputResolution;

    #[test]
    fn test_scanlines_only() {
        let snapshot = StatusSnapshot {
            slot_id: 3,
            resolution_id: OutputResolution::Output720p.id(),
            scanlines: true,
            ..Default::default()
        };
        assert_eq!(
            build_frame(&snapshot),
            [0x23, b'0' + 3, 6, 0x01, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_auto_gain_and_frame_time_lock() {
        let snapshot = StatusSnapshot {
            auto_gain: true,
            frame_time_lock: true,
            ..Default::default()
        };
        assert_eq!(build_frame(&snapshot)[3], 0b0011_0000);
    }

    #[test]
    fn test_compose_from_options() {
        let user = UserOptions {
            resolution: OutputResolution::Output1080p,
            slot_id: 2,
            deint_mode: 1,
            want_full_height: true,
            want_output_component: true,
            disable_external_clock_generator: true,
            ..Default::default()
        };
        let runtime = RuntimeOptions {
            invert_sync: true,
            osr: 4,
            allow_updates_ota: true,
            ..Default::default()
        };

        let frame = build_frame(&StatusSnapshot::compose(&user, &runtime, true));
        assert_eq!(
            frame,
            [b'#', b'2', 10, 0x00, 0b0000_0110, 0b0000_1001, 0b0000_1110, 0x01]
        );
    }

    #[test]
    fn test_deint_mode_outside_known_values() {
        let user = UserOptions {
            deint_mode: 7,
            ..Default::default()
        };
        let s = StatusSnapshot::compose(&user, &RuntimeOptions::default(), false);
        assert!(!s.deint_motion_adaptive);
        assert!(!s.deint_bob);
    }

    #[test]
    fn test_decode_reads_back_every_flag() {
        let all = StatusSnapshot {
            slot_id: 9,
            resolution_id: 20,
            scanlines: true,
            vds_line_filter: true,
            step_response: true,
            peaking: true,
            auto_gain: true,
            frame_time_lock: true,
            deint_motion_adaptive: true,
            deint_bob: true,
            full_height: true,
            match_preset_source: true,
            pal_force_60: true,
            output_component: true,
            calibration_adc: true,
            prefer_scaling_rgbhv: true,
            disable_external_clock_generator: true,
            print_infos: true,
            invert_sync: true,
            osr_active: true,
            adc_filter_active: true,
            debug_view: true,
            updates_ota: true,
        };
        let frame = build_frame(&all);
        assert_eq!(&frame[3..], &[0x3F, 0x1F, 0x0F, 0x1F, 0x01]);
        assert_eq!(decode_frame(&frame), Ok(all));
    }

    #[test]
    fn test_active_flags() {
        let snapshot = decode_frame(&[b'#', b'0', 0, 0x30, 0, 0, 0x08, 0x01]).unwrap();
        assert_eq!(
            snapshot.active_flags(),
            ["auto_gain", "frame_time_lock", "adc_filter_active", "updates_ota"]
        );
        assert!(StatusSnapshot::default().active_flags().is_empty());
    }

    #[test]
    fn test_decode_rejects_foreign_messages() {
        assert_eq!(decode_frame(&[0x23; 5]), Err(FrameError::Length(5)));
        assert_eq!(
            decode_frame(&[b'{', 0, 0, 0, 0, 0, 0, 0]),
            Err(FrameError::Marker(b'{'))
        );
    }
}
