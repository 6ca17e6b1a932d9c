//! USB HID keyboard device.
//!
//! Initialises the Embassy USB stack on the nRF52840 hardware USB
//! peripheral and exposes one keyboard endpoint.

use defmt::{info, warn};
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{self, bind_interrupts, peripherals};
use embassy_usb::class::hid::{Config as HidConfig, HidWriter, State};
use embassy_usb::{Builder, Config, UsbDevice};
use kyupad::config;
use kyupad::error::Error;
use kyupad::hid::keyboard::{KeyboardReport, KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};
use kyupad::hid::ReportWriter;
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => embassy_nrf::usb::vbus_detect::InterruptHandler;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, HardwareVbusDetect>;

static KB_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 128]> = StaticCell::new();

/// Keyboard endpoint handed to the transport.
pub struct UsbKeyboard {
    writer: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>,
}

impl ReportWriter for UsbKeyboard {
    async fn write_report(&mut self, report: &KeyboardReport) -> Result<(), Error> {
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        let n = report.serialize(&mut buf);
        self.writer.write(&buf[..n]).await.map_err(|_| {
            warn!("USB keyboard write failed");
            Error::ReportWrite
        })
    }
}

/// Initialise the USB stack and create the keyboard device.
///
/// Can succeed only once; the static buffers are consumed here and a
/// second call reports `Error::UsbUnavailable`.
pub fn init(usbd: peripherals::USBD) -> Result<(UsbDevice<'static, UsbDriver>, UsbKeyboard), Error> {
    let config_desc = USB_CONFIG_DESC.try_init([0u8; 256]).ok_or(Error::UsbUnavailable)?;
    let bos_desc = USB_BOS_DESC.try_init([0u8; 256]).ok_or(Error::UsbUnavailable)?;
    let msos_desc = USB_MSOS_DESC.try_init([0u8; 256]).ok_or(Error::UsbUnavailable)?;
    let ctrl_buf = USB_CTRL_BUF.try_init([0u8; 128]).ok_or(Error::UsbUnavailable)?;
    let kb_state = KB_STATE.try_init(State::new()).ok_or(Error::UsbUnavailable)?;

    let driver = Driver::new(usbd, Irqs, HardwareVbusDetect::new(Irqs));

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;

    let mut builder = Builder::new(driver, usb_config, config_desc, bos_desc, msos_desc, ctrl_buf);

    let kb_config = HidConfig {
        report_descriptor: KEYBOARD_REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: config::USB_HID_POLL_MS,
        max_packet_size: KEYBOARD_REPORT_SIZE as u16,
    };
    let writer = HidWriter::new(&mut builder, kb_state, kb_config);

    let device = builder.build();
    info!("USB HID keyboard initialised");

    Ok((device, UsbKeyboard { writer }))
}

/// Run the USB device stack - must be spawned as a dedicated Embassy task.
pub async fn run_usb_device(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    info!("USB device task started");
    device.run().await
}
