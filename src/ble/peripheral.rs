//! Advertising and connection handling for the HID peripheral.
//!
//! The task waits for an [`AdvCommand`], advertises until a central
//! connects or the command is withdrawn, and then serves that connection
//! until it drops.  Only one central is served at a time.

use core::pin::pin;
use core::sync::atomic::Ordering;
use core::task::Poll;

use defmt::{info, warn};
use embassy_futures::poll_once;
use embassy_futures::select::{select, Either};
use kyupad::config::{self, BLE_APPEARANCE_HID_KEYBOARD};
use kyupad::error::{BleError, Error};
use kyupad::hid::keyboard::KEYBOARD_REPORT_SIZE;
use nrf_softdevice::ble::advertisement_builder::{
    AdvertisementDataType, Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList, ServiceUuid16,
};
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::{raw, Softdevice};

use super::bonder::Bonder;
use super::gatt::Server;
use super::{AdvCommand, ADV_COMMAND, ADV_RESULT, CONNECTED, REPORTS};

/// Set the GAP device name and preferred connection parameters.
pub fn configure_gap(name: &str) -> Result<(), Error> {
    let len = u16::try_from(name.len()).map_err(|_| Error::BufferOverflow)?;

    // SAFETY: plain-old-data struct; the SoftDevice copies both arguments.
    let ret = unsafe {
        let mut perm: raw::ble_gap_conn_sec_mode_t = core::mem::zeroed();
        perm.set_sm(1);
        perm.set_lv(1);
        raw::sd_ble_gap_device_name_set(&perm, name.as_ptr(), len)
    };
    if ret != raw::NRF_SUCCESS {
        return Err(BleError::Raw(ret).into());
    }

    let params = raw::ble_gap_conn_params_t {
        min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
        max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
        slave_latency: config::BLE_SLAVE_LATENCY,
        conn_sup_timeout: config::BLE_SUP_TIMEOUT,
    };
    // SAFETY: see above.
    let ret = unsafe { raw::sd_ble_gap_ppcp_set(&params) };
    if ret != raw::NRF_SUCCESS {
        return Err(BleError::Raw(ret).into());
    }
    Ok(())
}

fn adv_payload() -> LegacyAdvertisementPayload {
    LegacyAdvertisementBuilder::new()
        .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
        .services_16(ServiceList::Complete, &[ServiceUuid16::HUMAN_INTERFACE_DEVICE])
        .raw(AdvertisementDataType::APPEARANCE, &BLE_APPEARANCE_HID_KEYBOARD.to_le_bytes())
        .build()
}

fn scan_payload(name: &str) -> LegacyAdvertisementPayload {
    LegacyAdvertisementBuilder::new().full_name(name).build()
}

/// Serve HID notifications until the link drops.
async fn serve(conn: &Connection, server: &Server) {
    let forward = async {
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        loop {
            let report = REPORTS.receive().await;
            let n = report.serialize(&mut buf);
            if let Err(e) = gatt_server::notify_value(conn, server.hid.input_report, &buf[..n]) {
                warn!("HID notify failed: {:?}", e);
            }
        }
    };

    match select(gatt_server::run(conn, server, |_| {}), forward).await {
        Either::First(reason) => info!("Central disconnected: {:?}", reason),
        Either::Second(_) => {}
    }
}

/// Advertise under `name`; returns the connection or `None` when stopped.
async fn advertise(
    sd: &'static Softdevice,
    name: &str,
    bonder: &'static Bonder,
) -> Option<Connection> {
    let adv_data = adv_payload();
    let scan_data = scan_payload(name);
    let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
        adv_data: &adv_data,
        scan_data: &scan_data,
    };
    let config = peripheral::Config::default();

    let mut fut = pin!(peripheral::advertise_pairable(sd, adv, &config, bonder));

    // the first poll configures and starts advertising in the SoftDevice
    match poll_once(fut.as_mut()) {
        Poll::Ready(Ok(conn)) => {
            ADV_RESULT.signal(Ok(()));
            return Some(conn);
        }
        Poll::Ready(Err(e)) => {
            warn!("Advertising failed: {:?}", e);
            ADV_RESULT.signal(Err(BleError::AdvertiseFailed.into()));
            return None;
        }
        Poll::Pending => ADV_RESULT.signal(Ok(())),
    }
    info!("Advertising as {}", name);

    loop {
        match select(fut.as_mut(), ADV_COMMAND.wait()).await {
            Either::First(Ok(conn)) => return Some(conn),
            Either::First(Err(e)) => {
                warn!("Advertising ended: {:?}", e);
                return None;
            }
            Either::Second(AdvCommand::Stop) => return None,
            // already advertising; the name cannot change at runtime
            Either::Second(AdvCommand::Start(_)) => ADV_RESULT.signal(Ok(())),
        }
    }
}

/// BLE peripheral task - must be spawned as a dedicated Embassy task.
pub async fn run(sd: &'static Softdevice, server: &'static Server, bonder: &'static Bonder) -> ! {
    info!("BLE peripheral task started");

    loop {
        let name = match ADV_COMMAND.wait().await {
            AdvCommand::Start(name) => name,
            AdvCommand::Stop => continue,
        };

        let Some(conn) = advertise(sd, &name, bonder).await else {
            continue;
        };

        info!("Central connected");
        CONNECTED.store(true, Ordering::Release);
        serve(&conn, server).await;
        CONNECTED.store(false, Ordering::Release);

        // reports queued for the old link are meaningless to the next host
        while REPORTS.try_receive().is_ok() {}
    }
}
