//! kyupad firmware entry point (nRF52840 + SoftDevice S140).
//!
//! Boot order:
//! 1. Heap, Embassy HAL (interrupt priorities kept clear of the SoftDevice)
//! 2. SoftDevice enable, GATT services, SoftDevice task
//! 3. Keymap from flash (needs the SoftDevice running)
//! 4. Transport: BLE or USB per `connection_mode`
//! 5. Main loop: poll link, scan matrix, play macros

#![no_std]
#![no_main]

extern crate alloc;

mod ble;
mod flash;
mod usb;

use alloc::vec;
use core::mem;
use core::mem::MaybeUninit;

use defmt::{error, info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::peripherals;
use embassy_time::{Delay, Instant, Timer};
use embassy_usb::UsbDevice;
use embedded_alloc::LlffHeap as Heap;
use kyupad::config::{BLE_MAX_NAME_LEN, KEYMAP_MAX_SIZE, LOOP_ERROR_BACKOFF_MS, LOOP_IDLE_US};
use kyupad::error::Error;
use kyupad::hid::keyboard::KeyboardReport;
use kyupad::hid::ReportWriter;
use kyupad::keypad::Keypad;
use kyupad::matrix::Matrix;
use kyupad::status_led::StatusLed;
use kyupad::store::{self, Persist};
use kyupad::transport::{Advertisement, Board, Transport};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;

use crate::ble::bonder::{self, Bonder};
use crate::ble::gatt::Server;
use crate::ble::{BleKeyboard, BleRadio};
use crate::flash::KeymapFlash;
use crate::usb::hid_device::{self, UsbDriver, UsbKeyboard};

use {defmt_rtt as _, panic_probe as _};

#[global_allocator]
static HEAP: Heap = Heap::empty();

const HEAP_SIZE: usize = 32 * 1024;

/// GAP name until the keymap has been read.
const BOOT_NAME: &[u8] = b"Kyupad";

static SERVER: StaticCell<Server> = StaticCell::new();

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn usb_task(device: UsbDevice<'static, UsbDriver>) -> ! {
    hid_device::run_usb_device(device).await
}

#[embassy_executor::task]
async fn ble_task(sd: &'static Softdevice, server: &'static Server, bonder: &'static Bonder) -> ! {
    ble::peripheral::run(sd, server, bonder).await
}

// ═══════════════════════════════════════════════════════════════════════════
// Board
// ═══════════════════════════════════════════════════════════════════════════

/// Whichever keyboard endpoint the transport picked.
enum Endpoint {
    Usb(UsbKeyboard),
    Ble(BleKeyboard),
}

impl ReportWriter for Endpoint {
    async fn write_report(&mut self, report: &KeyboardReport) -> Result<(), Error> {
        match self {
            Endpoint::Usb(usb) => usb.write_report(report).await,
            Endpoint::Ble(ble) => ble.write_report(report).await,
        }
    }
}

struct Nrf52840 {
    spawner: Spawner,
    sd: &'static Softdevice,
    server: Option<&'static Server>,
    usbd: Option<peripherals::USBD>,
}

impl Board for Nrf52840 {
    type Radio = BleRadio;
    type Writer = Endpoint;

    fn wireless_available(&self) -> bool {
        self.server.is_some()
    }

    async fn init_wireless(&mut self, adv: &Advertisement) -> Result<(BleRadio, Endpoint), Error> {
        let server = self.server.take().ok_or(Error::BleNotAvailable)?;
        let bonder = bonder::bonder().ok_or(Error::BleNotAvailable)?;
        ble::peripheral::configure_gap(&adv.name)?;
        self.spawner
            .spawn(ble_task(self.sd, server, bonder))
            .map_err(|_| Error::BleNotAvailable)?;
        Ok((BleRadio::new(), Endpoint::Ble(BleKeyboard::new())))
    }

    async fn init_usb(&mut self) -> Result<Endpoint, Error> {
        let usbd = self.usbd.take().ok_or(Error::UsbUnavailable)?;
        let (device, keyboard) = hid_device::init(usbd)?;
        self.spawner
            .spawn(usb_task(device))
            .map_err(|_| Error::UsbUnavailable)?;
        Ok(Endpoint::Usb(keyboard))
    }
}

fn init_heap() {
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    // SAFETY: called once, before the first allocation.
    unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 128 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: BOOT_NAME.as_ptr() as _,
            current_len: BOOT_NAME.len() as u16,
            max_len: BLE_MAX_NAME_LEN as u16,
            // SAFETY: all-zero is "no access", the SoftDevice default.
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(raw::BLE_GATTS_VLOC_STACK as u8),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    init_heap();
    info!("kyupad starting");

    // The SoftDevice owns priorities 0, 1 and 4.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);
    interrupt::USBD.set_priority(Priority::P2);
    interrupt::CLOCK_POWER.set_priority(Priority::P2);

    let sd = Softdevice::enable(&softdevice_config());
    let server = match Server::new(sd) {
        Ok(server) => Some(&*SERVER.init(server)),
        Err(e) => {
            warn!("GATT setup failed ({:?}), BLE disabled", e);
            None
        }
    };
    let sd: &'static Softdevice = sd;
    unwrap!(spawner.spawn(softdevice_task(sd)));

    let mut storage = KeymapFlash::new(nrf_softdevice::Flash::take(sd));
    let mut buf = vec![0u8; KEYMAP_MAX_SIZE];
    let keymap = store::load(&mut storage, &mut buf, Persist::Enabled).await;
    drop(buf);

    if let Some(server) = server {
        if let Err(e) = server.dis.set_model(sd, keymap.settings.device_id) {
            warn!("Could not publish model string: {:?}", e);
        }
    }

    // rows P0.02 P0.29 P0.31 P1.13, cols P0.17 P0.20 P0.22 P0.24
    let rows = [
        Output::new(p.P0_02, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_29, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_31, Level::Low, OutputDrive::Standard),
        Output::new(p.P1_13, Level::Low, OutputDrive::Standard),
    ];
    let cols = [
        Input::new(p.P0_17, Pull::Up),
        Input::new(p.P0_20, Pull::Up),
        Input::new(p.P0_22, Pull::Up),
        Input::new(p.P0_24, Pull::Up),
    ];
    let led = StatusLed::new(Output::new(p.P0_15, Level::Low, OutputDrive::Standard));

    let mut board = Nrf52840 {
        spawner,
        sd,
        server,
        usbd: Some(p.USBD),
    };
    let transport = match Transport::init(&mut board, &keymap.settings).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("No HID transport ({:?}), resetting", e);
            Timer::after_millis(LOOP_ERROR_BACKOFF_MS).await;
            cortex_m::peripheral::SCB::sys_reset();
        }
    };

    let mut keypad = Keypad::new(keymap, Matrix::new(rows, cols), transport, led, Delay);
    info!("Scanning");

    loop {
        if let Err(e) = keypad.tick(Instant::now().as_millis()).await {
            warn!("Loop error: {:?}", e);
            Timer::after_millis(LOOP_ERROR_BACKOFF_MS).await;
        }
        Timer::after_micros(LOOP_IDLE_US).await;
    }
}
