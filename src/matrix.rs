//! 4x4 key matrix scanner.
//!
//! Rows are push-pull outputs, columns are inputs with pull-ups.  A pass
//! drives each row high in turn, lets it settle, and samples every column;
//! a column reading low while its row is driven means that key is down.
//!
//! Debouncing comes from the scan rate alone: a pass is skipped until the
//! debounce interval has elapsed since the previous one, so a contact that
//! bounces faster than that is seen as a single transition.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::config::{BUTTON_COUNT, COLS, MIN_SCAN_INTERVAL_MS, ROWS, ROW_SETTLE_US};
use crate::error::Error;

/// Button indices that went from released to pressed during one pass,
/// in scan order (`row * COLS + col`).
pub type KeyDowns = Vec<u8, BUTTON_COUNT>;

/// Position of a key in the matrix.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyPos {
    pub row: u8,
    pub col: u8,
}

impl KeyPos {
    /// Flat button index used by the keymap.
    pub const fn index(self) -> u8 {
        self.row * COLS as u8 + self.col
    }
}

pub struct Matrix<R, C> {
    rows: [R; ROWS],
    cols: [C; COLS],
    pressed: [[bool; COLS]; ROWS],
    last_scan_ms: Option<u64>,
}

impl<R: OutputPin, C: InputPin> Matrix<R, C> {
    pub fn new(rows: [R; ROWS], cols: [C; COLS]) -> Self {
        Self {
            rows,
            cols,
            pressed: [[false; COLS]; ROWS],
            last_scan_ms: None,
        }
    }

    /// Effective re-scan interval for a configured debounce time.
    pub fn scan_interval_ms(debounce_ms: u32) -> u64 {
        u64::from(debounce_ms).max(MIN_SCAN_INTERVAL_MS)
    }

    /// Run one pass if the debounce interval has elapsed.
    ///
    /// Returns `None` when the pass was skipped, otherwise the key-down
    /// transitions it observed (possibly none).  Key-ups are tracked but
    /// not reported.
    pub async fn scan<D: DelayNs>(
        &mut self,
        now_ms: u64,
        debounce_ms: u32,
        delay: &mut D,
    ) -> Result<Option<KeyDowns>, Error> {
        if let Some(last) = self.last_scan_ms {
            if now_ms.saturating_sub(last) < Self::scan_interval_ms(debounce_ms) {
                return Ok(None);
            }
        }
        self.last_scan_ms = Some(now_ms);

        let mut observed = [[false; COLS]; ROWS];
        for (row_idx, row) in self.rows.iter_mut().enumerate() {
            row.set_high().map_err(|_| Error::Gpio)?;
            // delay so the row propagates
            delay.delay_us(ROW_SETTLE_US).await;

            let sampled = Self::sample_cols(&mut self.cols, &mut observed[row_idx]);
            // always release the row, even when a column read failed
            let released = row.set_low().map_err(|_| Error::Gpio);
            sampled?;
            released?;
        }

        let mut downs = KeyDowns::new();
        for (row, (old, new)) in self.pressed.iter().zip(observed.iter()).enumerate() {
            for col in 0..COLS {
                if new[col] && !old[col] {
                    let pos = KeyPos {
                        row: row as u8,
                        col: col as u8,
                    };
                    // capacity equals the number of keys, cannot overflow
                    let _ = downs.push(pos.index());
                }
            }
        }
        self.pressed = observed;

        Ok(Some(downs))
    }

    fn sample_cols(cols: &mut [C; COLS], out: &mut [bool; COLS]) -> Result<(), Error> {
        for (col, slot) in cols.iter_mut().zip(out.iter_mut()) {
            *slot = col.is_low().map_err(|_| Error::Gpio)?;
        }
        Ok(())
    }

    /// Whether the key at `pos` was down in the last completed pass.
    pub fn is_pressed(&self, pos: KeyPos) -> bool {
        self.pressed[pos.row as usize][pos.col as usize]
    }
}
