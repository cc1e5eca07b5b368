//! Raw HID protocol driver for the gaming mouse command channel
//!
//! The device exposes several logical HID collections; only the multi-function
//! interface (`mi_01`, collection `col05`) accepts these 17-byte configuration
//! packets. DPI changes go out as an ordered four-packet burst with mandatory
//! inter-packet pacing; the firmware corrupts its internal state on
//! back-to-back writes. Poll-rate commands are single packets but must wait
//! for the DPI burst to settle, because the burst reconfigures registers the
//! rate command depends on.
//!
//! Everything here is best-effort: an absent or unplugged device degrades to
//! a no-op driver, never an error reaching the engine.

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::engine::MouseBackend;

// ============================================================================
// Device identity
// ============================================================================

/// Vendor ID of the ATK/VXE receiver
pub const VENDOR_ID: u16 = 0x373B;

/// Product ID of the 8K dongle
pub const PRODUCT_ID: u16 = 0x1040;

/// Interface path markers selecting the command collection
const INTERFACE_MARKERS: [&str; 2] = ["mi_01", "col05"];

// ============================================================================
// Protocol
// ============================================================================

/// Fixed command packet length
pub const COMMAND_LEN: usize = 17;

/// One 17-byte command packet
pub type Command = [u8; COMMAND_LEN];

/// Minimum delay between packets of a burst (bus safety)
pub const INTER_PACKET_DELAY: Duration = Duration::from_millis(20);

/// Settle delay between a DPI burst and the following rate command
pub const RATE_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Set polling rate to 8000 Hz
pub const CMD_POLL_8K: Command = [
    0x08, 0x07, 0x00, 0x00, 0x00, 0x06, 0x40, 0x15, 0x04, 0x51, 0x01, 0x54, 0x00, 0x00, 0x00,
    0x00, 0x41,
];

/// Set polling rate to 1000 Hz
pub const CMD_POLL_1K: Command = [
    0x08, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, 0x54, 0x04, 0x51, 0x01, 0x54, 0x00, 0x00, 0x00,
    0x00, 0x41,
];

/// DPI stage burst for the 1600 DPI game preset
pub const SEQ_DPI_1600: [Command; 4] = [
    [
        0x08, 0x07, 0x00, 0x00, 0x0c, 0x08, 0x07, 0x07, 0x00, 0x47, 0x1f, 0x1f, 0x00, 0x17, 0x00,
        0x00, 0x88,
    ],
    [
        0x08, 0x07, 0x00, 0x00, 0x14, 0x08, 0x1f, 0x1f, 0x00, 0x17, 0x3f, 0x3f, 0x00, 0xd7, 0x00,
        0x00, 0x80,
    ],
    [
        0x08, 0x07, 0x00, 0x00, 0x1c, 0x08, 0x3f, 0x3f, 0x00, 0xd7, 0x3f, 0x3f, 0x00, 0xd7, 0x00,
        0x00, 0x78,
    ],
    [
        0x08, 0x07, 0x00, 0x00, 0x24, 0x08, 0x3f, 0x3f, 0x00, 0xd7, 0x3f, 0x3f, 0x00, 0xd7, 0x00,
        0x00, 0x70,
    ],
];

/// DPI stage burst for the 800 DPI desktop preset
pub const SEQ_DPI_800: [Command; 4] = [
    [
        0x08, 0x07, 0x00, 0x00, 0x0c, 0x08, 0x07, 0x07, 0x00, 0x47, 0x0f, 0x0f, 0x00, 0x37, 0x00,
        0x00, 0x88,
    ],
    [
        0x08, 0x07, 0x00, 0x00, 0x14, 0x08, 0x1f, 0x1f, 0x00, 0x17, 0x3f, 0x3f, 0x00, 0xd7, 0x00,
        0x00, 0x80,
    ],
    [
        0x08, 0x07, 0x00, 0x00, 0x1c, 0x08, 0x3f, 0x3f, 0x00, 0xd7, 0x3f, 0x3f, 0x00, 0xd7, 0x00,
        0x00, 0x78,
    ],
    [
        0x08, 0x07, 0x00, 0x00, 0x24, 0x08, 0x3f, 0x3f, 0x00, 0xd7, 0x3f, 0x3f, 0x00, 0xd7, 0x00,
        0x00, 0x70,
    ],
];

// ============================================================================
// Driver
// ============================================================================

/// HID driver owning the command channel connection
pub struct MouseDriver {
    device: Option<HidDevice>,
}

impl MouseDriver {
    /// Create a driver with no connection; call [`connect`](Self::connect)
    pub fn new() -> Self {
        Self { device: None }
    }

    /// Enumerate HID interfaces and open the command collection
    ///
    /// Returns false when no matching interface exists; an absent device is a
    /// normal outcome, not an error.
    pub fn connect(&mut self) -> bool {
        let api = match HidApi::new() {
            Ok(api) => api,
            Err(e) => {
                warn!(error = %e, "HID subsystem unavailable");
                return false;
            }
        };

        for device_info in api.device_list() {
            if device_info.vendor_id() != VENDOR_ID || device_info.product_id() != PRODUCT_ID {
                continue;
            }

            let path = device_info.path().to_string_lossy().to_lowercase();
            if !INTERFACE_MARKERS.iter().all(|m| path.contains(m)) {
                continue;
            }

            match device_info.open_device(&api) {
                Ok(device) => {
                    info!(path = %path, "Mouse command channel opened");
                    self.device = Some(device);
                    return true;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to open mouse command channel");
                }
            }
        }

        info!(
            vendor = format!("0x{:04X}", VENDOR_ID),
            product = format!("0x{:04X}", PRODUCT_ID),
            "Mouse not found, hardware commands disabled"
        );
        false
    }

    /// Send a single command packet, best-effort
    pub fn send(&self, command: &Command) {
        let Some(device) = &self.device else {
            return;
        };
        if let Err(e) = device.write(command) {
            warn!(error = %e, "Mouse command write failed");
        }
    }

    /// Send an ordered burst with inter-packet pacing
    ///
    /// Not transactional: a failure mid-burst is logged by [`send`](Self::send)
    /// and the remaining packets are still attempted.
    pub async fn send_burst(&mut self, sequence: &[Command]) {
        if self.device.is_none() {
            return;
        }
        for packet in sequence {
            self.send(packet);
            sleep(INTER_PACKET_DELAY).await;
        }
    }

    /// DPI burst followed, after the settle delay, by a poll-rate command
    async fn apply_profile(&mut self, dpi_burst: &[Command], rate: &Command) {
        if self.device.is_none() {
            return;
        }
        self.send_burst(dpi_burst).await;
        sleep(RATE_SETTLE_DELAY).await;
        self.send(rate);
    }
}

impl Default for MouseDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MouseBackend for MouseDriver {
    fn connected(&self) -> bool {
        self.device.is_some()
    }

    async fn apply_game_profile(&mut self) {
        debug!("Applying game mouse profile (1600 DPI, 8000 Hz)");
        self.apply_profile(&SEQ_DPI_1600, &CMD_POLL_8K).await;
    }

    async fn apply_desktop_profile(&mut self) {
        debug!("Applying desktop mouse profile (800 DPI, 1000 Hz)");
        self.apply_profile(&SEQ_DPI_800, &CMD_POLL_1K).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout() {
        assert_eq!(CMD_POLL_8K.len(), COMMAND_LEN);
        assert_eq!(CMD_POLL_1K.len(), COMMAND_LEN);
        // Shared command header
        assert_eq!(&CMD_POLL_8K[..2], &[0x08, 0x07]);
        assert_eq!(&CMD_POLL_1K[..2], &[0x08, 0x07]);
        // The two rate commands differ only in the rate selector bytes
        assert_ne!(CMD_POLL_8K[6..8], CMD_POLL_1K[6..8]);
        assert_eq!(CMD_POLL_8K[8..], CMD_POLL_1K[8..]);
    }

    #[test]
    fn test_dpi_bursts_are_four_ordered_packets() {
        assert_eq!(SEQ_DPI_1600.len(), 4);
        assert_eq!(SEQ_DPI_800.len(), 4);
        // The register offset byte advances through the burst
        let offsets: Vec<u8> = SEQ_DPI_1600.iter().map(|p| p[4]).collect();
        assert_eq!(offsets, vec![0x0c, 0x14, 0x1c, 0x24]);
        // Presets diverge only in the first stage packet
        assert_ne!(SEQ_DPI_1600[0], SEQ_DPI_800[0]);
        assert_eq!(SEQ_DPI_1600[1..], SEQ_DPI_800[1..]);
    }

    #[test]
    fn test_protocol_delays() {
        assert!(INTER_PACKET_DELAY >= Duration::from_millis(20));
        assert!(RATE_SETTLE_DELAY >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_disconnected_driver_is_a_noop() {
        let mut driver = MouseDriver::new();
        assert!(!driver.connected());
        // All of these must be safe with no underlying connection
        driver.send(&CMD_POLL_1K);
        driver.send_burst(&SEQ_DPI_800).await;
        driver.apply_desktop_profile().await;
        driver.apply_game_profile().await;
    }
}
