//! The keypad main loop context.
//!
//! Everything the loop touches is owned here and only ever accessed from
//! the one task that calls [`Keypad::tick`].  A tick polls the link, runs
//! a matrix pass if one is due, and plays the macro of every key that went
//! down.  While a macro plays the matrix is not scanned.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;

use crate::error::Error;
use crate::hid::ReportWriter;
use crate::keymap::Keymap;
use crate::macros;
use crate::matrix::Matrix;
use crate::status_led::StatusLed;
use crate::transport::{Radio, Transport};

pub struct Keypad<R, C, L, Rd, W, D> {
    keymap: Keymap,
    matrix: Matrix<R, C>,
    transport: Transport<Rd, W>,
    led: StatusLed<L>,
    delay: D,
}

impl<R, C, L, Rd, W, D> Keypad<R, C, L, Rd, W, D>
where
    R: OutputPin,
    C: InputPin,
    L: OutputPin,
    Rd: Radio,
    W: ReportWriter,
    D: DelayNs,
{
    pub fn new(keymap: Keymap, matrix: Matrix<R, C>, transport: Transport<Rd, W>, led: StatusLed<L>, delay: D) -> Self {
        Self {
            keymap,
            matrix,
            transport,
            led,
            delay,
        }
    }

    /// One loop iteration at time `now_ms`.
    pub async fn tick(&mut self, now_ms: u64) -> Result<(), Error> {
        self.transport.poll(now_ms).await;

        let debounce_ms = self.keymap.settings.debounce_ms;
        let Some(downs) = self.matrix.scan(now_ms, debounce_ms, &mut self.delay).await? else {
            return Ok(());
        };

        self.led.update(self.transport.indicator());
        for index in downs {
            self.handle_key_press(index).await;
        }
        Ok(())
    }

    /// Play the macro bound to button `index`.
    pub async fn handle_key_press(&mut self, index: u8) {
        if !self.transport.ready() {
            info!("Not connected, ignoring button {}", index);
            return;
        }

        let button = self.keymap.button(index);
        info!(
            "[{}] Key pressed: {} (button {})",
            self.transport.tag(),
            button.name.as_str(),
            index
        );

        self.led.flash(&mut self.delay).await;

        let speed = self.keymap.settings.playback_speed();
        macros::run(&button.actions, self.transport.keyboard(), &mut self.delay, speed).await;
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn transport(&self) -> &Transport<Rd, W> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<Rd, W> {
        &mut self.transport
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }
}
