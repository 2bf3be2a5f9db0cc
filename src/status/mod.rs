//! Live status reporting to web UI clients.
//!
//! - [`frame`] - the 8-byte status frame
//! - [`broadcaster`] - ping and data cadences, memory-pressure shedding
//! - `ws` - WebSocket sink on the ESP-IDF HTTP server (ESP32 only)

pub mod broadcaster;
pub mod frame;
#[cfg(feature = "esp32")]
mod ws;

pub use broadcaster::{
    HeartbeatState, RecordingSink, StatusBroadcaster, StatusSink, TickReport, BROADCAST_INTERVAL,
    MIN_FREE_HEAP_BYTES, PING_INTERVAL, RECORDED_FRAMES,
};
pub use frame::{build_frame, decode_frame, FrameError, StatusSnapshot, FRAME_LEN, FRAME_MARKER};
#[cfg(feature = "esp32")]
pub use ws::EspWsSink;
