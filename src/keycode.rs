//! Key-name to HID usage resolution.
//!
//! Macro tokens name keys the way the configuration editor records them
//! (`"A"`, `"Enter"`, `"Ctrl"`, ...).  Resolution is case-sensitive and
//! anything outside the table resolves to `None`.

/// A USB HID keyboard usage code (page 0x07).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyCode(pub u8);

impl KeyCode {
    pub const A: KeyCode = KeyCode(0x04);
    pub const ONE: KeyCode = KeyCode(0x1E);
    pub const ZERO: KeyCode = KeyCode(0x27);
    pub const ENTER: KeyCode = KeyCode(0x28);
    pub const ESCAPE: KeyCode = KeyCode(0x29);
    pub const BACKSPACE: KeyCode = KeyCode(0x2A);
    pub const TAB: KeyCode = KeyCode(0x2B);
    pub const SPACE: KeyCode = KeyCode(0x2C);
    pub const F1: KeyCode = KeyCode(0x3A);
    pub const HOME: KeyCode = KeyCode(0x4A);
    pub const PAGE_UP: KeyCode = KeyCode(0x4B);
    pub const DELETE: KeyCode = KeyCode(0x4C);
    pub const END: KeyCode = KeyCode(0x4D);
    pub const PAGE_DOWN: KeyCode = KeyCode(0x4E);
    pub const RIGHT: KeyCode = KeyCode(0x4F);
    pub const LEFT: KeyCode = KeyCode(0x50);
    pub const DOWN: KeyCode = KeyCode(0x51);
    pub const UP: KeyCode = KeyCode(0x52);

    pub const LEFT_CTRL: KeyCode = KeyCode(0xE0);
    pub const LEFT_SHIFT: KeyCode = KeyCode(0xE1);
    pub const LEFT_ALT: KeyCode = KeyCode(0xE2);
    pub const LEFT_GUI: KeyCode = KeyCode(0xE3);

    /// Usage codes 0xE0..=0xE7 are reported through the modifier byte.
    pub const fn is_modifier(self) -> bool {
        self.0 >= 0xE0 && self.0 <= 0xE7
    }

    /// Bit of the modifier byte for this key, or 0 for ordinary keys.
    pub const fn modifier_bit(self) -> u8 {
        if self.is_modifier() {
            1 << (self.0 - 0xE0)
        } else {
            0
        }
    }
}

/// Resolve a modifier name used in `Mod+Mod+Key` shortcuts.
pub fn modifier(name: &str) -> Option<KeyCode> {
    match name {
        "Ctrl" => Some(KeyCode::LEFT_CTRL),
        "Alt" => Some(KeyCode::LEFT_ALT),
        "Shift" => Some(KeyCode::LEFT_SHIFT),
        "Win" => Some(KeyCode::LEFT_GUI),
        _ => None,
    }
}

/// Resolve any key name (including modifiers) to its usage code.
pub fn resolve(name: &str) -> Option<KeyCode> {
    if let Some(code) = modifier(name) {
        return Some(code);
    }

    let bytes = name.as_bytes();
    match bytes {
        [c @ b'A'..=b'Z'] => return Some(KeyCode(KeyCode::A.0 + (c - b'A'))),
        [b'0'] => return Some(KeyCode::ZERO),
        [c @ b'1'..=b'9'] => return Some(KeyCode(KeyCode::ONE.0 + (c - b'1'))),
        [b'F', digits @ ..] if !digits.is_empty() && digits[0] != b'0' => {
            if let Some(n) = name[1..].parse::<u8>().ok().filter(|n| (1..=12).contains(n)) {
                return Some(KeyCode(KeyCode::F1.0 + n - 1));
            }
        }
        _ => {}
    }

    let code = match name {
        "Tab" => KeyCode::TAB,
        "Enter" => KeyCode::ENTER,
        "Escape" => KeyCode::ESCAPE,
        "Backspace" => KeyCode::BACKSPACE,
        "Delete" => KeyCode::DELETE,
        "Space" => KeyCode::SPACE,
        "Home" => KeyCode::HOME,
        "End" => KeyCode::END,
        "PageUp" => KeyCode::PAGE_UP,
        "PageDown" => KeyCode::PAGE_DOWN,
        "Up" => KeyCode::UP,
        "Down" => KeyCode::DOWN,
        "Left" => KeyCode::LEFT,
        "Right" => KeyCode::RIGHT,
        _ => return None,
    };
    Some(code)
}
