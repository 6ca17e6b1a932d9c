//! Keymap persistence.
//!
//! The keymap is read once at boot.  Loading never fails: a missing or
//! unreadable document is replaced by the default keymap (which is then
//! written back so the editor has something to start from), and a
//! document that reads fine but is not a keymap is replaced in memory
//! only, leaving the stored bytes for the editor to repair.

use crate::error::Error;
use crate::keymap::Keymap;

/// Backing store for the keymap document.
pub trait ConfigStorage {
    /// Read the whole document into `buf`.  `Ok(None)` means no document
    /// has ever been stored.
    async fn read<'a>(&mut self, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, Error>;

    /// Replace the stored document.
    async fn write(&mut self, data: &[u8]) -> Result<(), Error>;
}

/// Whether `load` may write the default keymap back to storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persist {
    Enabled,
    Disabled,
}

/// Load the keymap, falling back to the default one.
pub async fn load<S: ConfigStorage>(storage: &mut S, buf: &mut [u8], persist: Persist) -> Keymap {
    let document = match storage.read(buf).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            info!("No keymap stored, creating default");
            return materialize_default(storage, persist).await;
        }
        Err(e) => {
            warn!("Keymap read failed: {:?}", e);
            return materialize_default(storage, persist).await;
        }
    };

    match Keymap::from_json(document) {
        Ok(keymap) => {
            info!("Keymap loaded ({} buttons configured)", keymap.buttons.len());
            keymap
        }
        Err(e) => {
            error!("Stored keymap rejected ({:?}), using defaults", e);
            Keymap::default()
        }
    }
}

async fn materialize_default<S: ConfigStorage>(storage: &mut S, persist: Persist) -> Keymap {
    let keymap = Keymap::default();
    if persist == Persist::Disabled {
        return keymap;
    }

    let result = match keymap.to_json() {
        Ok(json) => storage.write(&json).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => info!("Default keymap stored"),
        Err(e) => warn!("Could not store default keymap: {:?}", e),
    }
    keymap
}
