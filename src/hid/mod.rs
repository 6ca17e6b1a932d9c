//! HID keyboard output.
//!
//! The keypad only ever speaks one report type: the 8-byte boot keyboard
//! report.  `HidKeyboard` keeps the currently held keys and pushes the
//! whole report to the active endpoint after every change, whichever
//! transport (USB or BLE) that endpoint belongs to.

pub mod keyboard;

use crate::error::Error;
use crate::keycode::KeyCode;
use keyboard::KeyboardReport;

/// An endpoint that can deliver keyboard reports to the host.
pub trait ReportWriter {
    async fn write_report(&mut self, report: &KeyboardReport) -> Result<(), Error>;
}

/// Stateful keyboard on top of a report endpoint.
pub struct HidKeyboard<W> {
    writer: W,
    report: KeyboardReport,
}

impl<W: ReportWriter> HidKeyboard<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            report: KeyboardReport::empty(),
        }
    }

    /// Hold every key in `keys` and send one report.
    ///
    /// All or nothing: if a key does not fit or the endpoint rejects the
    /// report, the held set is left as it was before the call.
    pub async fn press(&mut self, keys: &[KeyCode]) -> Result<(), Error> {
        let before = self.report;
        let result = match keys.iter().try_for_each(|&key| self.report.press(key)) {
            Ok(()) => self.writer.write_report(&self.report).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.report = before;
        }
        result
    }

    /// Let go of every key in `keys` and send one report.  The keys count
    /// as released even when the endpoint rejects the report.
    pub async fn release(&mut self, keys: &[KeyCode]) -> Result<(), Error> {
        for &key in keys {
            self.report.release(key);
        }
        self.writer.write_report(&self.report).await
    }

    /// Let go of everything and send an empty report.
    pub async fn release_all(&mut self) -> Result<(), Error> {
        self.report = KeyboardReport::empty();
        self.writer.write_report(&self.report).await
    }

    /// Keys currently held.
    pub fn report(&self) -> &KeyboardReport {
        &self.report
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}
