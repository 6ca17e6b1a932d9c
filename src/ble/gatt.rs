//! GATT server: HID-over-GATT keyboard and Device Information.
//!
//! Built with the SoftDevice `ServiceBuilder` rather than the attribute
//! macros because the HID report characteristic needs a Report Reference
//! descriptor and the DIS model string is only known once the keymap has
//! been read.

use alloc::format;

use defmt::{debug, info, warn};
use kyupad::config::{BLE_MANUFACTURER, USB_PID, USB_VID};
use kyupad::error::{BleError, Error};
use kyupad::hid::keyboard::{KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, RegisterError, WriteOp};
use nrf_softdevice::ble::{Connection, SecurityMode, Uuid};
use nrf_softdevice::Softdevice;

const DEVICE_INFORMATION: Uuid = Uuid::new_16(0x180a);
const HID_SERVICE: Uuid = Uuid::new_16(0x1812);

const MANUFACTURER_NAME: Uuid = Uuid::new_16(0x2a29);
const MODEL_NUMBER: Uuid = Uuid::new_16(0x2a24);
const PNP_ID: Uuid = Uuid::new_16(0x2a50);

const HID_INFO: Uuid = Uuid::new_16(0x2a4a);
const REPORT_MAP: Uuid = Uuid::new_16(0x2a4b);
const HID_CONTROL_POINT: Uuid = Uuid::new_16(0x2a4c);
const HID_REPORT: Uuid = Uuid::new_16(0x2a4d);
const PROTOCOL_MODE: Uuid = Uuid::new_16(0x2a4e);
const HID_REPORT_REF: Uuid = Uuid::new_16(0x2908);

/// bcdHID 1.11, country 0, flags: remote wake + normally connectable.
const HID_INFO_VALUE: [u8; 4] = [0x11, 0x01, 0x00, 0x03];

/// Report ID 0, input report.
const REPORT_REFERENCE_INPUT: [u8; 2] = [0x00, 0x01];

/// Longest model string the Model Number characteristic can hold.
const MODEL_MAX_LEN: u16 = 32;

pub struct DeviceInformationService {
    model: u16,
}

impl DeviceInformationService {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut sb = ServiceBuilder::new(sd, DEVICE_INFORMATION)?;

        sb.add_characteristic(
            MANUFACTURER_NAME,
            Attribute::new(BLE_MANUFACTURER.as_bytes()),
            Metadata::new(Properties::new().read()),
        )?
        .build();
        let model = sb
            .add_characteristic(
                MODEL_NUMBER,
                Attribute::new(&b"4x4 Macropad"[..]).variable_len(MODEL_MAX_LEN),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        // vendor id source 0x02 = USB-IF
        let [vid_lo, vid_hi] = USB_VID.to_le_bytes();
        let [pid_lo, pid_hi] = USB_PID.to_le_bytes();
        let pnp = [0x02, vid_lo, vid_hi, pid_lo, pid_hi, 0x00, 0x01];
        sb.add_characteristic(PNP_ID, Attribute::new(pnp), Metadata::new(Properties::new().read()))?
            .build();

        let _ = sb.build();
        Ok(Self {
            model: model.value_handle,
        })
    }

    /// Publish the model string for this keypad's device id.
    pub fn set_model(&self, sd: &Softdevice, device_id: u32) -> Result<(), Error> {
        let model = format!("4x4 Macropad #{}", device_id);
        if model.len() > MODEL_MAX_LEN as usize {
            return Err(Error::BufferOverflow);
        }
        gatt_server::set_value(sd, self.model, model.as_bytes()).map_err(|e| {
            warn!("DIS model update failed: {:?}", e);
            Error::Ble(BleError::ServiceRegistration)
        })
    }
}

pub struct HidService {
    /// Value handle of the keyboard input report.
    pub input_report: u16,
    protocol_mode: u16,
    control_point: u16,
}

impl HidService {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut sb = ServiceBuilder::new(sd, HID_SERVICE)?;

        let protocol_mode = sb
            .add_characteristic(
                PROTOCOL_MODE,
                Attribute::new([1u8]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read().write_without_response()),
            )?
            .build();

        sb.add_characteristic(
            HID_INFO,
            Attribute::new(HID_INFO_VALUE).security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read()),
        )?
        .build();

        sb.add_characteristic(
            REPORT_MAP,
            Attribute::new(KEYBOARD_REPORT_DESCRIPTOR).security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read()),
        )?
        .build();

        let mut input = sb.add_characteristic(
            HID_REPORT,
            Attribute::new([0u8; KEYBOARD_REPORT_SIZE]).security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read().notify()),
        )?;
        input.add_descriptor(
            HID_REPORT_REF,
            Attribute::new(REPORT_REFERENCE_INPUT).security(SecurityMode::JustWorks),
        )?;
        let input = input.build();

        let control_point = sb
            .add_characteristic(
                HID_CONTROL_POINT,
                Attribute::new([0u8]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().write_without_response()),
            )?
            .build();

        let _ = sb.build();

        Ok(Self {
            input_report: input.value_handle,
            protocol_mode: protocol_mode.value_handle,
            control_point: control_point.value_handle,
        })
    }

    fn on_write(&self, handle: u16, data: &[u8]) {
        let Some(&value) = data.first() else {
            return;
        };
        if handle == self.protocol_mode {
            debug!("HID protocol mode set to {}", value);
        } else if handle == self.control_point {
            // 0 = suspend, 1 = exit suspend
            debug!("HID control point: {}", value);
        }
    }
}

pub struct Server {
    pub dis: DeviceInformationService,
    pub hid: HidService,
}

impl Server {
    pub fn new(sd: &mut Softdevice) -> Result<Self, Error> {
        let registration_failed = |_| Error::Ble(BleError::ServiceRegistration);
        let dis = DeviceInformationService::new(sd).map_err(registration_failed)?;
        let hid = HidService::new(sd).map_err(registration_failed)?;
        info!("GATT services registered");
        Ok(Self { dis, hid })
    }
}

impl gatt_server::Server for Server {
    type Event = ();

    fn on_write(
        &self,
        _conn: &Connection,
        handle: u16,
        _op: WriteOp,
        _offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        self.hid.on_write(handle, data);
        None
    }
}
