//! Keymap document storage in internal flash.
//!
//! Uses the nRF52840's internal flash via `sequential-storage`.  A map
//! item has to fit the scratch buffer, so the JSON document is split:
//!
//!   - key 0: document length, 4 bytes little endian
//!   - key 1..: consecutive `KEYMAP_CHUNK_SIZE` slices of the document
//!
//! `sequential-storage` handles wear levelling and garbage collection of
//! the pages in `STORAGE_FLASH_PAGE_START..+STORAGE_FLASH_PAGE_COUNT`.

use core::ops::Range;

use defmt::{debug, error};
use embedded_storage_async::nor_flash::NorFlash;
use kyupad::config::{KEYMAP_CHUNK_SIZE, KEYMAP_MAX_SIZE, STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use kyupad::error::Error;
use kyupad::store::ConfigStorage;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

const KEY_LENGTH: u8 = 0;

/// Room for one chunk plus the item header and key.
const SCRATCH_SIZE: usize = KEYMAP_CHUNK_SIZE + 32;

pub struct KeymapFlash<F> {
    flash: F,
    scratch: [u8; SCRATCH_SIZE],
}

impl<F: NorFlash> KeymapFlash<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            scratch: [0; SCRATCH_SIZE],
        }
    }

    fn range() -> Range<u32> {
        STORAGE_START..STORAGE_END
    }

    async fn fetch(&mut self, key: u8) -> Result<Option<&[u8]>, Error> {
        map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            Self::range(),
            &mut NoCache::new(),
            &mut self.scratch,
            &key,
        )
        .await
        .map_err(|e| {
            error!("Flash read error: {:?}", defmt::Debug2Format(&e));
            Error::Storage
        })
    }

    async fn store(&mut self, key: u8, item: &[u8]) -> Result<(), Error> {
        map::store_item::<u8, &[u8], _>(
            &mut self.flash,
            Self::range(),
            &mut NoCache::new(),
            &mut self.scratch,
            &key,
            &item,
        )
        .await
        .map_err(|e| {
            error!("Flash write error: {:?}", defmt::Debug2Format(&e));
            Error::Storage
        })
    }
}

impl<F: NorFlash> ConfigStorage for KeymapFlash<F> {
    async fn read<'a>(&mut self, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, Error> {
        let len = match self.fetch(KEY_LENGTH).await? {
            None => return Ok(None),
            Some(raw) => {
                let bytes: [u8; 4] = raw.try_into().map_err(|_| Error::Storage)?;
                u32::from_le_bytes(bytes) as usize
            }
        };
        if len > KEYMAP_MAX_SIZE || len > buf.len() {
            return Err(Error::KeymapTooLarge);
        }

        for (index, chunk) in buf[..len].chunks_mut(KEYMAP_CHUNK_SIZE).enumerate() {
            let key = index as u8 + 1;
            let data = self.fetch(key).await?.ok_or(Error::Storage)?;
            if data.len() != chunk.len() {
                return Err(Error::Storage);
            }
            chunk.copy_from_slice(data);
        }

        debug!("Read {} byte keymap from flash", len);
        Ok(Some(&buf[..len]))
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > KEYMAP_MAX_SIZE {
            return Err(Error::KeymapTooLarge);
        }

        for (index, chunk) in data.chunks(KEYMAP_CHUNK_SIZE).enumerate() {
            self.store(index as u8 + 1, chunk).await?;
        }
        // length last: an interrupted first write reads back as no document
        self.store(KEY_LENGTH, &(data.len() as u32).to_le_bytes()).await?;

        debug!("Wrote {} byte keymap to flash", data.len());
        Ok(())
    }
}
