//! Bluetooth Low Energy subsystem.
//!
//! This module drives the Nordic SoftDevice S140 in **Peripheral** role:
//!
//! 1. **GATT server** - HID-over-GATT keyboard service plus the Device
//!    Information service.
//! 2. **Peripheral task** - advertises on request, serves one central at
//!    a time and forwards keyboard reports as HID notifications.
//! 3. **Bonder** - Just Works pairing with bonds kept in RAM.
//!
//! The main loop never touches the SoftDevice directly.  [`BleRadio`] and
//! [`BleKeyboard`] talk to the peripheral task through the statics below.

pub mod bonder;
pub mod gatt;
pub mod peripheral;

use core::sync::atomic::{AtomicBool, Ordering};

use alloc::string::String;
use defmt::{debug, Format};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use kyupad::error::Error;
use kyupad::hid::keyboard::KeyboardReport;
use kyupad::hid::ReportWriter;
use kyupad::transport::{Advertisement, Radio};

/// Depth of the report queue between the main loop and the notifier.
pub const REPORT_QUEUE_DEPTH: usize = 16;

/// Requests from the main loop to the peripheral task.
#[derive(Clone, Format)]
pub enum AdvCommand {
    /// Advertise under the given name until a central connects.
    Start(String),
    Stop,
}

pub(crate) static CONNECTED: AtomicBool = AtomicBool::new(false);
pub(crate) static ADV_COMMAND: Signal<CriticalSectionRawMutex, AdvCommand> = Signal::new();
pub(crate) static ADV_RESULT: Signal<CriticalSectionRawMutex, Result<(), Error>> = Signal::new();
pub(crate) static REPORTS: Channel<CriticalSectionRawMutex, KeyboardReport, REPORT_QUEUE_DEPTH> = Channel::new();

/// Handle the transport uses to steer advertising.
pub struct BleRadio {
    _private: (),
}

impl BleRadio {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

impl Radio for BleRadio {
    fn is_connected(&self) -> bool {
        CONNECTED.load(Ordering::Acquire)
    }

    async fn start_advertising(&mut self, adv: &Advertisement) -> Result<(), Error> {
        ADV_RESULT.reset();
        ADV_COMMAND.signal(AdvCommand::Start(adv.name.clone()));
        ADV_RESULT.wait().await
    }

    async fn stop_advertising(&mut self) -> Result<(), Error> {
        // connectable advertising already ends when a central connects
        if !self.is_connected() {
            ADV_COMMAND.signal(AdvCommand::Stop);
        }
        debug!("Advertising stopped");
        Ok(())
    }
}

/// Keyboard endpoint that queues reports for HID notification.
pub struct BleKeyboard {
    _private: (),
}

impl BleKeyboard {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

impl ReportWriter for BleKeyboard {
    async fn write_report(&mut self, report: &KeyboardReport) -> Result<(), Error> {
        if !CONNECTED.load(Ordering::Acquire) {
            return Err(Error::ReportWrite);
        }
        REPORTS.try_send(*report).map_err(|_| Error::BufferOverflow)
    }
}
