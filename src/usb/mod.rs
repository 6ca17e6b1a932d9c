//! USB device subsystem - presents a boot keyboard to the host.
//!
//! The nRF52840's built-in USB 2.0 Full-Speed controller is driven by
//! `embassy-usb` with a single HID interface.  The USB task services
//! enumeration while the main loop writes reports straight to the
//! endpoint through [`hid_device::UsbKeyboard`].

pub mod hid_device;
