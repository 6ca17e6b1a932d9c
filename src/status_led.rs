//! Connection status LED.
//!
//! Blink timing is counted in scan passes rather than wall time, so the
//! pattern speeds up or slows down with the configured debounce interval.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::config::{KEY_FLASH_MS, LED_FAST_BLINK_PERIOD, LED_SLOW_BLINK_PERIOD};
use crate::transport::Indicator;

pub struct StatusLed<P> {
    pin: P,
    ticks: u32,
}

impl<P: OutputPin> StatusLed<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, ticks: 0 }
    }

    /// Advance the pattern by one scan pass.
    pub fn update(&mut self, indicator: Indicator) {
        let on = match indicator {
            Indicator::Off => false,
            Indicator::Solid => true,
            Indicator::SlowBlink => self.ticks % LED_SLOW_BLINK_PERIOD < LED_SLOW_BLINK_PERIOD / 2,
            Indicator::FastBlink => self.ticks % LED_FAST_BLINK_PERIOD < LED_FAST_BLINK_PERIOD / 2,
        };
        self.ticks = self.ticks.wrapping_add(1);
        self.set(on);
    }

    /// Blink off briefly to acknowledge a key press.
    pub async fn flash<D: DelayNs>(&mut self, delay: &mut D) {
        self.set(false);
        delay.delay_ms(KEY_FLASH_MS).await;
        self.set(true);
    }

    fn set(&mut self, on: bool) {
        // a stuck LED is not worth interrupting the scan loop for
        let _ = if on { self.pin.set_high() } else { self.pin.set_low() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{led, MockDelay};
    use embassy_futures::block_on;

    fn on_count(levels: &[bool]) -> usize {
        levels.iter().filter(|&&on| on).count()
    }

    #[test]
    fn solid_stays_on() {
        let (pin, levels) = led();
        let mut status = StatusLed::new(pin);
        for _ in 0..10 {
            status.update(Indicator::Solid);
        }
        assert!(levels.borrow().iter().all(|&on| on));
    }

    #[test]
    fn slow_blink_is_half_duty() {
        let (pin, levels) = led();
        let mut status = StatusLed::new(pin);
        for _ in 0..LED_SLOW_BLINK_PERIOD {
            status.update(Indicator::SlowBlink);
        }
        let levels = levels.borrow();
        assert_eq!(levels.len(), LED_SLOW_BLINK_PERIOD as usize);
        assert_eq!(on_count(&levels), 100);
    }

    #[test]
    fn fast_blink_toggles_every_twenty_passes() {
        let (pin, levels) = led();
        let mut status = StatusLed::new(pin);
        for _ in 0..LED_FAST_BLINK_PERIOD * 2 {
            status.update(Indicator::FastBlink);
        }
        let levels = levels.borrow();
        assert_eq!(on_count(&levels), 40);
        let edges = levels.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(edges, 3);
    }

    #[test]
    fn flash_goes_off_then_on() {
        let (pin, levels) = led();
        let mut status = StatusLed::new(pin);
        let mut delay = MockDelay::default();
        block_on(status.flash(&mut delay));
        assert_eq!(*levels.borrow(), [false, true]);
        assert_eq!(delay.calls_us, [50_000]);
    }
}
