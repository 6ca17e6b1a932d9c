//! Keymap document: per-button macros plus device settings.
//!
//! The document is JSON written by the desktop editor.  Parsing is
//! lenient wherever a single entry can be dropped without losing the
//! rest (unknown fields, malformed buttons or actions) and strict only
//! about the overall shape: a document without both `buttons` and
//! `settings` objects is rejected so the caller can substitute the
//! default keymap.

use alloc::borrow::Cow;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::config::BUTTON_COUNT;
use crate::error::Error;

/// Root configuration object.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Keymap {
    pub buttons: BTreeMap<u8, ButtonConfig>,
    pub settings: Settings,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ButtonConfig {
    pub name: String,
    pub description: String,
    #[serde(rename = "macro")]
    pub actions: Vec<MacroAction>,
}

/// One entry of a button macro, in either of the two encodings the
/// editor has produced over time.  The variant is picked from the shape
/// of the JSON object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MacroAction {
    /// `{ "keys": ["Ctrl_press", "A", ...], "delay": 20 }`
    Keys {
        keys: Vec<String>,
        #[serde(default, alias = "delay_ms", deserialize_with = "lenient_delay")]
        delay: i64,
    },
    /// `{ "action": "key", "keys": "Ctrl+Shift+S", "delay": 50 }`
    Shortcut {
        #[serde(default = "default_action")]
        action: String,
        keys: String,
        #[serde(default, alias = "delay_ms", deserialize_with = "lenient_delay")]
        delay: i64,
    },
    /// Anything else; kept so one bad entry does not reject the button.
    Unrecognized(Value),
}

impl MacroAction {
    /// Leading delay of this action; negative values count as zero.
    pub fn delay_ms(&self) -> u32 {
        let delay = match self {
            MacroAction::Keys { delay, .. } | MacroAction::Shortcut { delay, .. } => *delay,
            MacroAction::Unrecognized(_) => 0,
        };
        u32::try_from(delay.max(0)).unwrap_or(u32::MAX)
    }

    /// A legacy `Mod+Key` action with no delay.
    pub fn shortcut(keys: &str) -> Self {
        MacroAction::Shortcut {
            action: default_action(),
            keys: keys.to_string(),
            delay: 0,
        }
    }
}

fn default_action() -> String {
    "key".to_string()
}

/// Accept integers and floats; JSON from older editors stored both.
/// `null` counts as no delay.
fn lenient_delay<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map_or(0, |v| v as i64))
}

/// Which HID transport the firmware should bring up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Usb,
    Bluetooth,
    Auto,
    /// Unknown value in the document; treated like `Usb`.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Settings {
    pub debounce_ms: u32,
    pub macro_playback_speed: f32,
    pub connection_mode: ConnectionMode,
    pub device_id: u32,
    pub device_name: String,
    pub sleep_timeout_minutes: u32,
    pub power_save_mode: bool,
    pub auto_reconnect: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            macro_playback_speed: 1.0,
            connection_mode: ConnectionMode::Auto,
            device_id: 1,
            device_name: "Kyupad-1".to_string(),
            sleep_timeout_minutes: 30,
            power_save_mode: false,
            auto_reconnect: true,
        }
    }
}

impl Settings {
    /// Playback speed divisor, never zero, negative or NaN.
    pub fn playback_speed(&self) -> f32 {
        if self.macro_playback_speed.is_finite() && self.macro_playback_speed > 0.0 {
            self.macro_playback_speed
        } else {
            1.0
        }
    }

    /// Name used for advertising and the GAP device name.
    pub fn advertised_name(&self) -> String {
        let name = self.device_name.trim();
        if name.is_empty() {
            format!("Kyupad-{}", self.device_id)
        } else {
            name.to_string()
        }
    }
}

/// Settings are read field by field: a field that is missing or has the
/// wrong type takes its default and the rest of the document survives.
/// A document that omits `connection_mode` predates wireless support and
/// stays on USB.
impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let defaults = Settings::default();
        let field = |name: &str| map.get(name).filter(|v| !v.is_null());

        Ok(Self {
            debounce_ms: count(field("debounce_ms"), "debounce_ms", defaults.debounce_ms),
            macro_playback_speed: match field("macro_playback_speed") {
                None => defaults.macro_playback_speed,
                Some(v) => v.as_f64().map_or_else(
                    || mistyped("macro_playback_speed", defaults.macro_playback_speed),
                    |speed| speed as f32,
                ),
            },
            connection_mode: match field("connection_mode") {
                None => ConnectionMode::Usb,
                Some(v) => ConnectionMode::deserialize(v).unwrap_or(ConnectionMode::Unknown),
            },
            device_id: count(field("device_id"), "device_id", defaults.device_id),
            device_name: match field("device_name") {
                None => defaults.device_name,
                Some(v) => v
                    .as_str()
                    .map_or_else(|| mistyped("device_name", defaults.device_name), ToString::to_string),
            },
            sleep_timeout_minutes: count(
                field("sleep_timeout_minutes"),
                "sleep_timeout_minutes",
                defaults.sleep_timeout_minutes,
            ),
            power_save_mode: flag(field("power_save_mode"), "power_save_mode", defaults.power_save_mode),
            auto_reconnect: flag(field("auto_reconnect"), "auto_reconnect", defaults.auto_reconnect),
        })
    }
}

fn mistyped<T>(name: &str, fallback: T) -> T {
    warn!("keymap: setting '{}' has the wrong type, using default", name);
    fallback
}

/// Non-negative number; fractions are truncated.
fn count(value: Option<&Value>, name: &str, fallback: u32) -> u32 {
    match value.map(|v| v.as_f64().filter(|n| n.is_finite() && *n >= 0.0)) {
        None => fallback,
        Some(Some(n)) if n >= u32::MAX as f64 => u32::MAX,
        Some(Some(n)) => n as u32,
        Some(None) => mistyped(name, fallback),
    }
}

fn flag(value: Option<&Value>, name: &str, fallback: bool) -> bool {
    match value {
        None => fallback,
        Some(v) => v.as_bool().unwrap_or_else(|| mistyped(name, fallback)),
    }
}

impl ButtonConfig {
    /// Configuration of a button the document does not mention.
    pub fn unassigned(index: u8) -> Self {
        Self {
            name: format!("Key{}", index),
            description: String::new(),
            actions: Vec::new(),
        }
    }
}

impl Default for Keymap {
    /// Sixteen buttons that each type a space.
    fn default() -> Self {
        let buttons = (0..BUTTON_COUNT as u8)
            .map(|i| {
                let button = ButtonConfig {
                    name: format!("Key{}", i),
                    description: format!("Button {}", i),
                    actions: vec![MacroAction::shortcut("Space")],
                };
                (i, button)
            })
            .collect();
        Self {
            buttons,
            settings: Settings::default(),
        }
    }
}

impl Keymap {
    /// Parse a keymap document.
    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        let raw: RawKeymap = serde_json::from_slice(data).map_err(|_| Error::InvalidKeymap)?;

        let mut buttons = BTreeMap::new();
        for (key, entry) in raw.buttons {
            let index = match key.trim().parse::<u8>() {
                Ok(i) if (i as usize) < BUTTON_COUNT => i,
                _ => {
                    warn!("keymap: ignoring out-of-range button '{}'", key.as_str());
                    continue;
                }
            };
            match entry {
                RawEntry::Button(button) => {
                    buttons.insert(index, button.into_config(index));
                }
                RawEntry::Invalid(_) => {
                    warn!("keymap: button {} is not an object, ignoring", index);
                }
            }
        }

        Ok(Self {
            buttons,
            settings: raw.settings,
        })
    }

    /// Serialise the keymap back to its JSON document form.
    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|_| Error::InvalidKeymap)
    }

    /// Configuration for `index`, or the generated default when absent.
    pub fn button(&self, index: u8) -> Cow<'_, ButtonConfig> {
        match self.buttons.get(&index) {
            Some(button) => Cow::Borrowed(button),
            None => Cow::Owned(ButtonConfig::unassigned(index)),
        }
    }
}

// Wire shapes, only used while parsing.

#[derive(Deserialize)]
struct RawKeymap {
    buttons: BTreeMap<String, RawEntry>,
    settings: Settings,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Button(RawButton),
    Invalid(Value),
}

#[derive(Deserialize)]
struct RawButton {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "macro")]
    actions: MacroField,
}

/// `macro` is normally a list, but a bare `"Ctrl+C"` string is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum MacroField {
    Sequence(Vec<MacroAction>),
    Shortcut(String),
    Invalid(Value),
}

impl Default for MacroField {
    fn default() -> Self {
        MacroField::Sequence(Vec::new())
    }
}

impl RawButton {
    fn into_config(self, index: u8) -> ButtonConfig {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => format!("Key{}", index),
        };
        let actions = match self.actions {
            MacroField::Sequence(actions) => actions,
            MacroField::Shortcut(keys) => vec![MacroAction::shortcut(&keys)],
            MacroField::Invalid(_) => {
                warn!("keymap: button {} has an unreadable macro", index);
                Vec::new()
            }
        };
        ButtonConfig {
            name,
            description: self.description.unwrap_or_default(),
            actions,
        }
    }
}
