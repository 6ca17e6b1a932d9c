//! End-to-end tests: keymap document in, HID reports out.
//!
//! The keypad is assembled from the public API exactly as the firmware
//! does it, with mock hardware behind every trait.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embassy_futures::block_on;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use kyupad::error::Error;
use kyupad::hid::keyboard::KeyboardReport;
use kyupad::hid::ReportWriter;
use kyupad::keymap::Keymap;
use kyupad::keypad::Keypad;
use kyupad::matrix::Matrix;
use kyupad::status_led::StatusLed;
use kyupad::store::{self, ConfigStorage, Persist};
use kyupad::transport::{Advertisement, Board, ConnectionState, Radio, Transport};

// ═══════════════════════════════════════════════════════════════════════════
// Mock hardware
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Switches {
    closed: [[bool; 4]; 4],
    driven: [bool; 4],
}

type Shared<T> = Rc<RefCell<T>>;

enum Pin {
    Row(Shared<Switches>, usize),
    Col(Shared<Switches>, usize),
    Led,
}

impl ErrorType for Pin {
    type Error = Infallible;
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        if let Pin::Row(sw, row) = self {
            sw.borrow_mut().driven[*row] = false;
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        if let Pin::Row(sw, row) = self {
            sw.borrow_mut().driven[*row] = true;
        }
        Ok(())
    }
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(match self {
            Pin::Col(sw, col) => {
                let sw = sw.borrow();
                (0..4).any(|row| sw.driven[row] && sw.closed[row][*col])
            }
            _ => false,
        })
    }
}

/// Records every pause, in µs.
#[derive(Default)]
struct Sleeps {
    calls_us: Vec<u32>,
}

impl DelayNs for Sleeps {
    async fn delay_ns(&mut self, ns: u32) {
        self.calls_us.push(ns / 1_000);
    }
}

#[derive(Clone, Default)]
struct Host {
    reports: Shared<Vec<KeyboardReport>>,
}

impl ReportWriter for Host {
    async fn write_report(&mut self, report: &KeyboardReport) -> Result<(), Error> {
        self.reports.borrow_mut().push(*report);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Link {
    connected: Shared<bool>,
    advertised: Shared<Vec<String>>,
}

impl Radio for Link {
    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn start_advertising(&mut self, adv: &Advertisement) -> Result<(), Error> {
        self.advertised.borrow_mut().push(adv.name.clone());
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

struct Hardware {
    radio: bool,
    link: Link,
    host: Host,
}

impl Board for Hardware {
    type Radio = Link;
    type Writer = Host;

    fn wireless_available(&self) -> bool {
        self.radio
    }

    async fn init_wireless(&mut self, _adv: &Advertisement) -> Result<(Link, Host), Error> {
        Ok((self.link.clone(), self.host.clone()))
    }

    async fn init_usb(&mut self) -> Result<Host, Error> {
        Ok(self.host.clone())
    }
}

struct Flash(Option<Vec<u8>>);

impl ConfigStorage for Flash {
    async fn read<'a>(&mut self, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, Error> {
        match &self.0 {
            None => Ok(None),
            Some(doc) => {
                let out = buf.get_mut(..doc.len()).ok_or(Error::KeymapTooLarge)?;
                out.copy_from_slice(doc);
                Ok(Some(out))
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.0 = Some(data.to_vec());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Rig
// ═══════════════════════════════════════════════════════════════════════════

struct Rig {
    keypad: Keypad<Pin, Pin, Pin, Link, Host, Sleeps>,
    switches: Shared<Switches>,
    link: Link,
    host: Host,
    now_ms: u64,
}

impl Rig {
    fn boot(document: Option<&[u8]>, radio: bool) -> Self {
        let mut flash = Flash(document.map(<[u8]>::to_vec));
        let mut buf = vec![0u8; 8192];
        let keymap: Keymap = block_on(store::load(&mut flash, &mut buf, Persist::Disabled));

        let mut hw = Hardware {
            radio,
            link: Link::default(),
            host: Host::default(),
        };
        let transport = block_on(Transport::init(&mut hw, &keymap.settings)).unwrap();

        let switches: Shared<Switches> = Rc::default();
        let rows = std::array::from_fn(|r| Pin::Row(switches.clone(), r));
        let cols = std::array::from_fn(|c| Pin::Col(switches.clone(), c));
        let keypad = Keypad::new(
            keymap,
            Matrix::new(rows, cols),
            transport,
            StatusLed::new(Pin::Led),
            Sleeps::default(),
        );

        Rig {
            keypad,
            switches,
            link: hw.link,
            host: hw.host,
            now_ms: 0,
        }
    }

    /// Advance the clock and run one loop iteration.
    fn tick(&mut self, step_ms: u64) {
        self.now_ms += step_ms;
        block_on(self.keypad.tick(self.now_ms)).unwrap();
    }

    /// Press and release button `index`, letting the matrix see both edges.
    fn tap(&mut self, index: usize) {
        self.switches.borrow_mut().closed[index / 4][index % 4] = true;
        self.tick(100);
        self.switches.borrow_mut().closed[index / 4][index % 4] = false;
        self.tick(100);
    }

    fn sleeps(&self) -> &[u32] {
        &self.keypad.delay().calls_us
    }

    fn sent(&self) -> Vec<(u8, [u8; 6])> {
        self.host
            .reports
            .borrow()
            .iter()
            .map(|r| (r.modifier, r.keycodes))
            .collect()
    }
}

const DOCUMENT: &[u8] = br#"{
  "buttons": {
    "0": { "name": "Copy", "description": "", "macro": [
      { "keys": ["Ctrl_press", "C_press", "C_release", "Ctrl_release"], "delay": 0 } ] },
    "5": { "name": "Save as", "description": "legacy", "macro": [
      { "action": "key", "keys": "Ctrl+Shift+S", "delay": 50 } ] },
    "15": { "name": "Hello", "macro": [ { "keys": ["H", "I"], "delay": 0 } ] },
    "99": { "name": "ignored", "macro": [] }
  },
  "settings": {
    "debounce_ms": 20,
    "macro_playback_speed": 1.0,
    "connection_mode": "usb",
    "device_id": 3,
    "device_name": "Desk pad",
    "sleep_timeout_minutes": 10,
    "power_save_mode": false,
    "auto_reconnect": true
  }
}"#;

fn with_mode(mode: &str) -> Vec<u8> {
    String::from_utf8_lossy(DOCUMENT)
        .replace(r#""connection_mode": "usb""#, &format!(r#""connection_mode": "{}""#, mode))
        .into_bytes()
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn legacy_shortcut_reaches_the_host_as_one_chord() {
    let mut rig = Rig::boot(Some(DOCUMENT), true);
    rig.tap(5);

    let s = 0x16;
    assert_eq!(rig.sent(), vec![(0x03, [s, 0, 0, 0, 0, 0]), (0x00, [0; 6])]);
}

#[test]
fn explicit_halves_build_a_chord() {
    let mut rig = Rig::boot(Some(DOCUMENT), false);
    rig.tap(0);

    let c = 0x06;
    assert_eq!(
        rig.sent(),
        vec![
            (0x01, [0; 6]),
            (0x01, [c, 0, 0, 0, 0, 0]),
            (0x01, [0; 6]),
            (0x00, [0; 6]),
        ]
    );
}

#[test]
fn bare_tokens_tap_in_order() {
    let mut rig = Rig::boot(Some(DOCUMENT), false);
    rig.tap(15);

    let (h, i) = (0x0B, 0x0C);
    let keys: Vec<u8> = rig.sent().iter().map(|(_, k)| k[0]).collect();
    assert_eq!(keys, vec![h, 0, i, 0]);
}

#[test]
fn button_missing_from_document_does_nothing() {
    let mut rig = Rig::boot(Some(DOCUMENT), false);
    rig.tap(7);
    assert!(rig.sent().is_empty());
}

#[test]
fn missing_document_boots_the_default_keymap() {
    let mut rig = Rig::boot(None, false);
    rig.tap(9);
    assert_eq!(rig.sent(), vec![(0, [0x2C, 0, 0, 0, 0, 0]), (0, [0; 6])]);
}

#[test]
fn corrupt_document_boots_the_default_keymap() {
    let mut rig = Rig::boot(Some(b"[1, 2, 3]"), false);
    rig.tap(3);
    assert_eq!(rig.sent().first(), Some(&(0, [0x2C, 0, 0, 0, 0, 0])));
}

#[test]
fn bluetooth_drops_presses_until_a_host_connects() {
    let doc = with_mode("bluetooth");
    let mut rig = Rig::boot(Some(&doc), true);
    assert_eq!(*rig.link.advertised.borrow(), vec!["Desk pad".to_string()]);

    rig.tap(5);
    assert!(rig.sent().is_empty());

    *rig.link.connected.borrow_mut() = true;
    // let the next connection poll fall due
    rig.tick(2_000);
    assert_eq!(rig.keypad.transport().state(), Some(ConnectionState::Connected));

    rig.tap(5);
    assert_eq!(rig.sent().len(), 2);

    *rig.link.connected.borrow_mut() = false;
    rig.tick(2_000);
    assert_eq!(rig.keypad.transport().state(), Some(ConnectionState::Advertising));
    assert_eq!(rig.link.advertised.borrow().len(), 2);

    rig.tap(5);
    assert_eq!(rig.sent().len(), 2);
}

#[test]
fn auto_without_radio_uses_usb() {
    let doc = with_mode("auto");
    let mut rig = Rig::boot(Some(&doc), false);
    assert!(!rig.keypad.transport().is_wireless());
    rig.tap(5);
    assert_eq!(rig.sent().len(), 2);
}

#[test]
fn holding_a_key_plays_its_macro_once() {
    let mut rig = Rig::boot(Some(DOCUMENT), false);
    rig.switches.borrow_mut().closed[3][3] = true;
    for _ in 0..10 {
        rig.tick(25);
    }
    assert_eq!(rig.sent().len(), 4);
}

#[test]
fn playback_speed_from_the_document_scales_macro_delays() {
    let doc = String::from_utf8_lossy(DOCUMENT)
        .replace(r#""macro_playback_speed": 1.0"#, r#""macro_playback_speed": 2.0"#)
        .into_bytes();
    let mut rig = Rig::boot(Some(&doc), false);
    rig.tap(5);

    // 50 ms configured, played twice as fast; the only full 50 ms pause
    // left is the LED flash
    assert!(rig.sleeps().contains(&25_000));
    assert_eq!(rig.sleeps().iter().filter(|&&us| us == 50_000).count(), 1);
}

#[test]
fn document_without_connection_mode_types_over_usb() {
    let doc = String::from_utf8_lossy(DOCUMENT)
        .replace(r#""connection_mode": "usb","#, "")
        .into_bytes();
    let mut rig = Rig::boot(Some(&doc), true);
    assert!(!rig.keypad.transport().is_wireless());
    assert!(rig.link.advertised.borrow().is_empty());

    rig.tap(5);
    assert_eq!(rig.sent().len(), 2);
}

#[test]
fn one_mistyped_setting_does_not_cost_the_buttons() {
    let doc = String::from_utf8_lossy(DOCUMENT)
        .replace(r#""debounce_ms": 20"#, r#""debounce_ms": "fast""#)
        .replace(r#""device_id": 3"#, r#""device_id": -1"#)
        .into_bytes();
    let mut rig = Rig::boot(Some(&doc), false);
    assert_eq!(rig.keypad.keymap().button(5).name, "Save as");
    assert_eq!(rig.keypad.keymap().settings.debounce_ms, 50);

    rig.tap(5);
    assert_eq!(rig.sent().first().map(|r| r.0), Some(0x03));
}
