//! Option sets owned by the video-processing side of the firmware.
//!
//! The connectivity core never writes these. It reads the fields listed here
//! when composing a [`StatusSnapshot`](crate::status::StatusSnapshot) and
//! watches the web server flags to decide whether to serve UI clients at all.

/// Output resolution requested by the user.
///
/// The discriminant is what goes on the wire in byte 2 of the status frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputResolution {
    #[default]
    Output240p = 0,
    Output960p = 2,
    Output960p50 = 3,
    Output1024p = 4,
    Output1024p50 = 5,
    Output720p = 6,
    Output720p50 = 7,
    Output480p = 8,
    Output480p50 = 9,
    Output1080p = 10,
    Output1080p50 = 11,
    Output15kHz = 12,
    Output15kHz50 = 13,
    Output576p50 = 15,
    OutputHdBypass = 18,
    OutputRgbhvBypass = 20,
}

impl OutputResolution {
    /// Raw identifier as stored in presets and sent to the UI.
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OutputResolution {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Output240p,
            2 => Self::Output960p,
            3 => Self::Output960p50,
            4 => Self::Output1024p,
            5 => Self::Output1024p50,
            6 => Self::Output720p,
            7 => Self::Output720p50,
            8 => Self::Output480p,
            9 => Self::Output480p50,
            10 => Self::Output1080p,
            11 => Self::Output1080p50,
            12 => Self::Output15kHz,
            13 => Self::Output15kHz50,
            15 => Self::Output576p50,
            18 => Self::OutputHdBypass,
            20 => Self::OutputRgbhvBypass,
            other => return Err(other),
        })
    }
}

/// User preferences relevant to the status frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserOptions {
    pub resolution: OutputResolution,
    pub slot_id: u8,
    pub enable_frame_time_lock: bool,
    pub enable_auto_gain: bool,
    pub want_scanlines: bool,
    pub want_output_component: bool,
    /// 0 = motion adaptive, 1 = bob.
    pub deint_mode: u8,
    pub want_vds_line_filter: bool,
    pub want_peaking: bool,
    pub prefer_scaling_rgbhv: bool,
    pub pal_force_60: bool,
    pub disable_external_clock_generator: bool,
    pub match_preset_source: bool,
    pub want_step_response: bool,
    pub want_full_height: bool,
    pub enable_calibration_adc: bool,
}

/// Runtime state relevant to the status frame and the web UI lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub print_infos: bool,
    pub invert_sync: bool,
    pub osr: u8,
    pub debug_view: bool,
    pub allow_updates_ota: bool,
    pub web_server_enabled: bool,
    pub web_server_started: bool,
}

impl RuntimeOptions {
    /// UI services (mDNS, captive DNS, status broadcast) only run while the
    /// web server is both enabled and started.
    pub fn web_ui_active(&self) -> bool {
        self.web_server_enabled && self.web_server_started
    }
}
