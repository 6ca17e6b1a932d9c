//! kyupad - firmware core for a 16-key macro keypad.
//!
//! Everything here is hardware independent: pins, delays, the HID
//! endpoint, the BLE radio and flash are reached through traits, so the
//! whole core runs under `cargo test` on the host.
//!
//! The embedded binary (`src/main.rs`, feature `embedded`) binds those
//! traits to embassy-nrf, embassy-usb and the Nordic SoftDevice.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod hid;
pub mod keycode;
pub mod keymap;
pub mod keypad;
pub mod macros;
pub mod matrix;
pub mod status_led;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;
