//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place. Everything
//! the user may change at runtime lives in the JSON keymap instead.

// Matrix

/// Row lines driven by the scanner (outputs).
pub const ROWS: usize = 4;

/// Column lines sampled by the scanner (inputs with pull-up).
pub const COLS: usize = 4;

/// Total number of keys on the pad.
pub const BUTTON_COUNT: usize = ROWS * COLS;

// GPIO pin assignments (nRF52840 Pro Micro style board)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   Rows 0..3    → P0.02, P0.29, P0.31, P1.13
//   Cols 0..3    → P0.17, P0.20, P0.22, P0.24
//   Status LED   → P0.15

/// Lower bound on the re-scan interval (ms), whatever `debounce_ms` says.
pub const MIN_SCAN_INTERVAL_MS: u64 = 10;

/// Time a driven row is given to propagate before the columns are read (µs).
pub const ROW_SETTLE_US: u32 = 50;

/// Idle time between two main-loop iterations (µs).
pub const LOOP_IDLE_US: u64 = 500;

/// Back-off after a failed loop iteration (ms).
pub const LOOP_ERROR_BACKOFF_MS: u64 = 100;

// Macro playback

/// Hold time between press and release of a tapped key (ms).
pub const KEY_TAP_SETTLE_MS: u32 = 10;

// Status LED

/// Duration the LED goes dark to acknowledge a key press (ms).
pub const KEY_FLASH_MS: u32 = 50;

/// Slow blink (advertising) period, counted in scan passes.
pub const LED_SLOW_BLINK_PERIOD: u32 = 200;

/// Fast blink (USB mode) period, counted in scan passes.
pub const LED_FAST_BLINK_PERIOD: u32 = 40;

// BLE

/// Minimum time between two connection-status polls (ms).
pub const CONNECTION_POLL_INTERVAL_MS: u64 = 2_000;

/// GAP appearance advertised by the keypad: Generic HID Keyboard.
pub const BLE_APPEARANCE_HID_KEYBOARD: u16 = 961;

/// Manufacturer string exposed through the Device Information Service.
pub const BLE_MANUFACTURER: &str = "Kyupad";

/// Longest device name we advertise (bytes).
pub const BLE_MAX_NAME_LEN: usize = 29;

/// BLE connection interval range (in 1.25 ms units).
/// 6 = 7.5 ms (lowest latency for HID).
pub const BLE_CONN_INTERVAL_MIN: u16 = 6;
pub const BLE_CONN_INTERVAL_MAX: u16 = 12;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Maximum number of bonded hosts remembered for the session.
pub const MAX_BONDED_HOSTS: usize = 4;

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "Kyupad";
pub const USB_PRODUCT: &str = "Kyupad 4x4 Macropad";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// USB HID polling interval (ms). 1 ms = 1000 Hz for lowest latency.
pub const USB_HID_POLL_MS: u8 = 1;

// Keymap storage

/// Largest keymap document we accept, in bytes.
pub const KEYMAP_MAX_SIZE: usize = 8 * 1024;

/// Size of one flash chunk of the stored keymap document.
pub const KEYMAP_CHUNK_SIZE: usize = 512;

/// Flash page index where keymap storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for keymap storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 8;
