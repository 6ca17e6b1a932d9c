//! Unified error type for kyupad.
//!
//! All error variants carry only fixed-size data so the enum stays
//! `Copy` and cheap to log.  Implements `defmt::Format` for on-target
//! logging when the `defmt` feature is enabled.

/// Top-level error type used across the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Keymap
    /// The stored document is not a keymap (bad JSON, missing sections).
    InvalidKeymap,

    /// The stored document does not fit the read buffer.
    KeymapTooLarge,

    // Storage
    /// Flash read/write/erase failed.
    Storage,

    // Matrix
    /// A row or column pin could not be driven or sampled.
    Gpio,

    // HID
    /// More than six non-modifier keys held at once.
    RolloverFull,

    /// The active endpoint refused a keyboard report.
    ReportWrite,

    // USB
    /// The USB keyboard endpoint could not be acquired.
    UsbUnavailable,

    // BLE
    /// The SoftDevice returned a BLE-level error.
    Ble(BleError),

    /// No BLE radio is present on this board.
    BleNotAvailable,

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// GAP / GATT raw error code from the SoftDevice.
    Raw(u32),
    /// GATT service registration failed.
    ServiceRegistration,
    /// Advertising could not be started.
    AdvertiseFailed,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}
