//! HID transport selection and the wireless connection state machine.
//!
//! Exactly one keyboard endpoint is active.  Over USB the host enumerates
//! the device once and there is no session to track, so the transport is
//! permanently connected.  Over BLE the link is polled at a fixed interval
//! and advertising is turned off while a host is connected.

use alloc::format;
use alloc::string::String;

use crate::config::{BLE_APPEARANCE_HID_KEYBOARD, BLE_MANUFACTURER, BLE_MAX_NAME_LEN, CONNECTION_POLL_INTERVAL_MS};
use crate::error::Error;
use crate::hid::{HidKeyboard, ReportWriter};
use crate::keymap::{ConnectionMode, Settings};

/// State of the wireless link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// Not advertising and not connected; advertising is retried on poll.
    Disconnected,
    Advertising,
    Connected,
}

/// What the status LED should show for the current link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    Off,
    Solid,
    SlowBlink,
    FastBlink,
}

/// Identity the keypad presents over BLE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub name: String,
    pub appearance: u16,
    pub manufacturer: &'static str,
    pub model: String,
}

impl Advertisement {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut name = settings.advertised_name();
        if name.len() > BLE_MAX_NAME_LEN {
            let mut end = BLE_MAX_NAME_LEN;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }

        Self {
            name,
            appearance: BLE_APPEARANCE_HID_KEYBOARD,
            manufacturer: BLE_MANUFACTURER,
            model: format!("4x4 Macropad #{}", settings.device_id),
        }
    }
}

/// Control surface of a BLE peripheral radio.
pub trait Radio {
    /// Whether a central currently holds a link to us.
    fn is_connected(&self) -> bool;

    async fn start_advertising(&mut self, adv: &Advertisement) -> Result<(), Error>;

    async fn stop_advertising(&mut self) -> Result<(), Error>;
}

/// Hardware that can provide a keyboard endpoint.
pub trait Board {
    type Radio: Radio;
    type Writer: ReportWriter;

    /// Whether this board has a usable BLE radio at all.
    fn wireless_available(&self) -> bool;

    /// Bring up the BLE HID service.  Advertising is not started yet.
    async fn init_wireless(&mut self, adv: &Advertisement) -> Result<(Self::Radio, Self::Writer), Error>;

    /// Acquire the USB HID keyboard endpoint.
    async fn init_usb(&mut self) -> Result<Self::Writer, Error>;
}

enum Link<R> {
    Usb,
    Wireless {
        radio: R,
        state: ConnectionState,
        last_poll_ms: Option<u64>,
    },
}

pub struct Transport<R, W> {
    link: Link<R>,
    keyboard: HidKeyboard<W>,
    advertisement: Advertisement,
}

impl<R: Radio, W: ReportWriter> Transport<R, W> {
    /// Choose and bring up the transport for `settings`.
    ///
    /// Wireless is tried first when the mode allows it and the board has a
    /// radio; any failure there falls back to USB.  A USB failure is
    /// returned as `Error::UsbUnavailable` and is not recoverable.
    pub async fn init<B>(board: &mut B, settings: &Settings) -> Result<Self, Error>
    where
        B: Board<Radio = R, Writer = W>,
    {
        let advertisement = Advertisement::from_settings(settings);
        let wants_wireless = matches!(settings.connection_mode, ConnectionMode::Bluetooth | ConnectionMode::Auto);

        if wants_wireless && board.wireless_available() {
            match Self::init_wireless(board, &advertisement).await {
                Ok((radio, writer)) => {
                    info!("Transport: BLE, advertising as {}", advertisement.name.as_str());
                    return Ok(Self {
                        link: Link::Wireless {
                            radio,
                            state: ConnectionState::Advertising,
                            last_poll_ms: None,
                        },
                        keyboard: HidKeyboard::new(writer),
                        advertisement,
                    });
                }
                Err(e) => warn!("BLE init failed ({:?}), falling back to USB", e),
            }
        } else if wants_wireless {
            info!("No BLE radio on this board, using USB");
        }

        let writer = board.init_usb().await.map_err(|e| {
            error!("USB HID unavailable: {:?}", e);
            Error::UsbUnavailable
        })?;
        info!("Transport: USB");
        Ok(Self {
            link: Link::Usb,
            keyboard: HidKeyboard::new(writer),
            advertisement,
        })
    }

    async fn init_wireless<B>(board: &mut B, adv: &Advertisement) -> Result<(R, W), Error>
    where
        B: Board<Radio = R, Writer = W>,
    {
        let (mut radio, writer) = board.init_wireless(adv).await?;
        radio.start_advertising(adv).await?;
        Ok((radio, writer))
    }

    /// Refresh the wireless link state.  Rate limited; a no-op over USB.
    pub async fn poll(&mut self, now_ms: u64) {
        let Link::Wireless {
            radio,
            state,
            last_poll_ms,
        } = &mut self.link
        else {
            return;
        };

        if let Some(last) = *last_poll_ms {
            if now_ms.saturating_sub(last) < CONNECTION_POLL_INTERVAL_MS {
                return;
            }
        }
        *last_poll_ms = Some(now_ms);

        let connected = radio.is_connected();
        let next = match (*state, connected) {
            (ConnectionState::Advertising, true) => {
                if let Err(e) = radio.stop_advertising().await {
                    warn!("Failed to stop advertising: {:?}", e);
                }
                ConnectionState::Connected
            }
            (ConnectionState::Disconnected, true) => ConnectionState::Connected,
            (ConnectionState::Connected, false) | (ConnectionState::Disconnected, false) => {
                match radio.start_advertising(&self.advertisement).await {
                    Ok(()) => ConnectionState::Advertising,
                    Err(e) => {
                        warn!("Re-advertising failed, retrying next poll: {:?}", e);
                        ConnectionState::Disconnected
                    }
                }
            }
            (current, _) => current,
        };

        if next != *state {
            info!("BLE: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Link state, `None` over USB.
    pub fn state(&self) -> Option<ConnectionState> {
        match &self.link {
            Link::Usb => None,
            Link::Wireless { state, .. } => Some(*state),
        }
    }

    pub fn is_wireless(&self) -> bool {
        matches!(self.link, Link::Wireless { .. })
    }

    /// Whether key presses can be delivered right now.
    pub fn ready(&self) -> bool {
        match &self.link {
            Link::Usb => true,
            Link::Wireless { state, .. } => *state == ConnectionState::Connected,
        }
    }

    /// Short tag used in key press logs.
    pub fn tag(&self) -> &'static str {
        if self.is_wireless() {
            "BT"
        } else {
            "USB"
        }
    }

    pub fn indicator(&self) -> Indicator {
        match self.state() {
            None => Indicator::FastBlink,
            Some(ConnectionState::Connected) => Indicator::Solid,
            Some(ConnectionState::Advertising) => Indicator::SlowBlink,
            Some(ConnectionState::Disconnected) => Indicator::Off,
        }
    }

    pub fn keyboard(&mut self) -> &mut HidKeyboard<W> {
        &mut self.keyboard
    }

    #[cfg(test)]
    pub(crate) fn radio(&mut self) -> Option<&mut R> {
        match &mut self.link {
            Link::Usb => None,
            Link::Wireless { radio, .. } => Some(radio),
        }
    }
}
