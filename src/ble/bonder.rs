//! Just Works pairing with an in-RAM bond table.
//!
//! Bonds survive reconnects but not a reset; a host that paired before
//! the last power cycle pairs again.

use core::cell::RefCell;

use defmt::info;
use heapless::Vec;
use kyupad::config::MAX_BONDED_HOSTS;
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{Connection, EncryptionInfo, IdentityKey, MasterId, SecurityMode};
use static_cell::StaticCell;

struct HostBond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
}

pub struct Bonder {
    hosts: RefCell<Vec<HostBond, MAX_BONDED_HOSTS>>,
}

impl Bonder {
    fn new() -> Self {
        Self {
            hosts: RefCell::new(Vec::new()),
        }
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::None
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn on_bonded(&self, conn: &Connection, master_id: MasterId, key: EncryptionInfo, peer_id: IdentityKey) {
        let mut hosts = self.hosts.borrow_mut();
        if let Some(existing) = hosts.iter_mut().find(|h| h.peer_id.is_match(conn.peer_address())) {
            existing.master_id = master_id;
            existing.key = key;
            existing.peer_id = peer_id;
            info!("Host bond refreshed");
            return;
        }

        if hosts.is_full() {
            hosts.remove(0);
        }
        let _ = hosts.push(HostBond {
            master_id,
            key,
            peer_id,
        });
        info!("Host bonded ({} stored)", hosts.len());
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.hosts
            .borrow()
            .iter()
            .find_map(|h| (h.master_id == master_id).then_some(h.key))
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        info!("BLE security mode updated: {}", mode);
    }
}

/// The process-wide bonder.  Call once.
pub fn bonder() -> Option<&'static Bonder> {
    static BONDER: StaticCell<Bonder> = StaticCell::new();
    BONDER.try_init(Bonder::new()).map(|b| &*b)
}
