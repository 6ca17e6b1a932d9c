//! Host-side stand-ins for the hardware traits, shared by unit tests.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;

use crate::config::{COLS, ROWS};
use crate::error::Error;
use crate::hid::keyboard::KeyboardReport;
use crate::hid::ReportWriter;
use crate::matrix::Matrix;
use crate::store::ConfigStorage;
use crate::transport::{Advertisement, Board, Radio};

/// Delay that returns immediately and remembers every request in µs.
#[derive(Default)]
pub struct MockDelay {
    pub calls_us: Vec<u64>,
}

impl MockDelay {
    pub fn total_us(&self) -> u64 {
        self.calls_us.iter().sum()
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.calls_us.push(u64::from(ns) / 1_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.calls_us.push(u64::from(us));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.calls_us.push(u64::from(ms) * 1_000);
    }
}

/// Report endpoint that records what it was asked to send.
#[derive(Default)]
pub struct RecordingWriter {
    pub reports: Vec<KeyboardReport>,
    pub failures_left: usize,
}

impl RecordingWriter {
    pub fn failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            reports: Vec::new(),
            failures_left: n,
        }
    }
}

impl ReportWriter for RecordingWriter {
    async fn write_report(&mut self, report: &KeyboardReport) -> Result<(), Error> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(Error::ReportWrite);
        }
        self.reports.push(*report);
        Ok(())
    }
}

/// In-memory keymap storage.
pub struct MemoryStorage {
    pub data: Option<Vec<u8>>,
    pub writes: usize,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl MemoryStorage {
    pub fn empty() -> Self {
        Self {
            data: None,
            writes: 0,
            fail_reads: false,
            fail_writes: false,
        }
    }

    pub fn with(data: &[u8]) -> Self {
        Self {
            data: Some(data.to_vec()),
            ..Self::empty()
        }
    }
}

impl ConfigStorage for MemoryStorage {
    async fn read<'a>(&mut self, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, Error> {
        if self.fail_reads {
            return Err(Error::Storage);
        }
        match &self.data {
            None => Ok(None),
            Some(data) if data.len() > buf.len() => Err(Error::KeymapTooLarge),
            Some(data) => {
                buf[..data.len()].copy_from_slice(data);
                Ok(Some(&buf[..data.len()]))
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.fail_writes {
            return Err(Error::Storage);
        }
        self.data = Some(data.to_vec());
        self.writes += 1;
        Ok(())
    }
}

/// Radio whose link state the test flips by hand.
#[derive(Default)]
pub struct MockRadio {
    pub connected: bool,
    pub advertising: bool,
    pub starts: usize,
    pub stops: usize,
    pub fail_starts: usize,
    pub last_advertisement: Option<Advertisement>,
}

impl Radio for MockRadio {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn start_advertising(&mut self, adv: &Advertisement) -> Result<(), Error> {
        if self.fail_starts > 0 {
            self.fail_starts -= 1;
            return Err(crate::error::BleError::AdvertiseFailed.into());
        }
        self.starts += 1;
        self.advertising = true;
        self.last_advertisement = Some(adv.clone());
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), Error> {
        self.stops += 1;
        self.advertising = false;
        Ok(())
    }
}

/// Board with an optional radio and a USB port that may refuse to start.
pub struct TestBoard {
    pub wireless: bool,
    pub radio: Option<MockRadio>,
    pub usb_ok: bool,
    pub usb_inits: usize,
}

impl TestBoard {
    pub fn with_radio() -> Self {
        Self {
            wireless: true,
            radio: Some(MockRadio::default()),
            usb_ok: true,
            usb_inits: 0,
        }
    }

    pub fn usb_only() -> Self {
        Self {
            wireless: false,
            radio: None,
            usb_ok: true,
            usb_inits: 0,
        }
    }
}

impl Board for TestBoard {
    type Radio = MockRadio;
    type Writer = RecordingWriter;

    fn wireless_available(&self) -> bool {
        self.wireless
    }

    async fn init_wireless(&mut self, _adv: &Advertisement) -> Result<(MockRadio, RecordingWriter), Error> {
        let radio = self.radio.take().ok_or(Error::BleNotAvailable)?;
        Ok((radio, RecordingWriter::default()))
    }

    async fn init_usb(&mut self) -> Result<RecordingWriter, Error> {
        self.usb_inits += 1;
        if self.usb_ok {
            Ok(RecordingWriter::default())
        } else {
            Err(Error::ReportWrite)
        }
    }
}

#[derive(Default)]
struct BoardState {
    keys: [[bool; COLS]; ROWS],
    driven: [bool; ROWS],
}

/// Simulated switch matrix shared by the row and column pins.
#[derive(Clone, Default)]
pub struct MatrixBoard(Rc<RefCell<BoardState>>);

impl MatrixBoard {
    pub fn set(&self, row: usize, col: usize, pressed: bool) {
        self.0.borrow_mut().keys[row][col] = pressed;
    }

    pub fn row_driven(&self, row: usize) -> bool {
        self.0.borrow().driven[row]
    }
}

/// One pin of the simulated hardware.
pub enum MockPin {
    Row(MatrixBoard, usize),
    Col(MatrixBoard, usize),
    Led(Rc<RefCell<Vec<bool>>>),
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        match self {
            MockPin::Row(board, row) => board.0.borrow_mut().driven[*row] = false,
            MockPin::Led(levels) => levels.borrow_mut().push(false),
            MockPin::Col(..) => {}
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        match self {
            MockPin::Row(board, row) => board.0.borrow_mut().driven[*row] = true,
            MockPin::Led(levels) => levels.borrow_mut().push(true),
            MockPin::Col(..) => {}
        }
        Ok(())
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        let MockPin::Col(board, col) = self else {
            return Ok(false);
        };
        let state = board.0.borrow();
        Ok((0..ROWS).any(|row| state.driven[row] && state.keys[row][*col]))
    }
}

pub struct TestMatrix;

impl TestMatrix {
    pub fn build() -> (Matrix<MockPin, MockPin>, MatrixBoard) {
        let board = MatrixBoard::default();
        let rows = core::array::from_fn(|r| MockPin::Row(board.clone(), r));
        let cols = core::array::from_fn(|c| MockPin::Col(board.clone(), c));
        (Matrix::new(rows, cols), board)
    }
}

/// A status LED pin plus the history of levels written to it.
pub fn led() -> (MockPin, Rc<RefCell<Vec<bool>>>) {
    let levels = Rc::new(RefCell::new(Vec::new()));
    (MockPin::Led(levels.clone()), levels)
}
