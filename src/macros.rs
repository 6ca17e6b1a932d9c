//! Macro engine.
//!
//! A button macro is first flattened into `Step`s, each one primitive
//! keyboard operation with the delay that precedes it, so playback never
//! has to care which JSON encoding an action came from.  Playback then
//! sleeps and performs each step in order.
//!
//! Playback is fail-soft: unknown key names vanish during normalisation
//! and a step the endpoint rejects is logged and skipped.

use alloc::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use heapless::Vec as HVec;

use crate::config::KEY_TAP_SETTLE_MS;
use crate::error::Error;
use crate::hid::{HidKeyboard, ReportWriter};
use crate::keycode::{self, KeyCode};
use crate::keymap::MacroAction;

/// Modifiers a shortcut can hold (`Ctrl`, `Alt`, `Shift`, `Win`).
pub type Modifiers = HVec<KeyCode, 4>;

/// Primitive keyboard operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyOp {
    /// Hold a key until an explicit release.
    Press(KeyCode),
    /// Let go of a held key.
    Release(KeyCode),
    /// Press, settle, release the same key.
    Tap(KeyCode),
    /// Press modifiers and key together, settle, release everything.
    Chord { modifiers: Modifiers, key: KeyCode },
}

/// One primitive operation and the pause before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub delay_ms: u32,
    pub op: KeyOp,
}

/// Flatten a macro into playback steps.
pub fn normalize(actions: &[MacroAction]) -> Vec<Step> {
    let mut steps = Vec::new();
    for action in actions {
        let first = steps.len();
        match action {
            MacroAction::Keys { keys, .. } => steps.extend(keys.iter().filter_map(|t| token_op(t))),
            MacroAction::Shortcut { action: kind, keys, .. } => {
                if kind == "key" {
                    steps.extend(shortcut_op(keys));
                }
            }
            MacroAction::Unrecognized(_) => {}
        }
        // the action's delay belongs to its first surviving step only
        if let Some(step) = steps.get_mut(first) {
            step.delay_ms = action.delay_ms();
        }
    }
    steps
}

/// `"A"` taps, `"A_press"` / `"A_release"` hold and let go.
fn token_op(token: &str) -> Option<Step> {
    let op = if let Some(name) = token.strip_suffix("_press") {
        KeyOp::Press(keycode::resolve(name)?)
    } else if let Some(name) = token.strip_suffix("_release") {
        KeyOp::Release(keycode::resolve(name)?)
    } else {
        KeyOp::Tap(keycode::resolve(token)?)
    };
    Some(Step { delay_ms: 0, op })
}

/// `"Ctrl+Shift+S"`: modifiers plus the last non-modifier token.
fn shortcut_op(spec: &str) -> Option<Step> {
    let mut modifiers = Modifiers::new();
    let mut key = None;
    for part in spec.split('+').map(str::trim) {
        match keycode::modifier(part) {
            Some(m) => {
                if !modifiers.contains(&m) {
                    // at most four distinct modifiers exist
                    let _ = modifiers.push(m);
                }
            }
            None => key = Some(part),
        }
    }
    let key = keycode::resolve(key?)?;
    Some(Step {
        delay_ms: 0,
        op: KeyOp::Chord { modifiers, key },
    })
}

/// Sleep time for a configured delay at the given playback speed, in µs.
pub fn scaled_delay_us(delay_ms: u32, speed: f32) -> u32 {
    if delay_ms == 0 {
        return 0;
    }
    let us = delay_ms as f32 * 1000.0 / speed;
    if us >= u32::MAX as f32 {
        u32::MAX
    } else {
        us as u32
    }
}

/// Play a macro on `keyboard`.  Never fails; bad steps are skipped.
pub async fn run<W: ReportWriter, D: DelayNs>(
    actions: &[MacroAction],
    keyboard: &mut HidKeyboard<W>,
    delay: &mut D,
    speed: f32,
) {
    for step in normalize(actions) {
        let pause = scaled_delay_us(step.delay_ms, speed);
        if pause > 0 {
            delay.delay_us(pause).await;
        }
        if let Err(e) = perform(&step.op, keyboard, delay).await {
            warn!("Macro step failed: {:?}", e);
        }
    }
}

async fn perform<W: ReportWriter, D: DelayNs>(
    op: &KeyOp,
    keyboard: &mut HidKeyboard<W>,
    delay: &mut D,
) -> Result<(), Error> {
    match op {
        KeyOp::Press(key) => keyboard.press(&[*key]).await,
        KeyOp::Release(key) => keyboard.release(&[*key]).await,
        // the release half always runs so a failed press cannot leave a key held
        KeyOp::Tap(key) => {
            let pressed = keyboard.press(&[*key]).await;
            if pressed.is_ok() {
                delay.delay_ms(KEY_TAP_SETTLE_MS).await;
            }
            let released = keyboard.release(&[*key]).await;
            pressed.and(released)
        }
        KeyOp::Chord { modifiers, key } => {
            let mut keys: HVec<KeyCode, 5> = modifiers.iter().copied().collect();
            // one slot beyond the modifiers is always free
            let _ = keys.push(*key);
            let pressed = keyboard.press(&keys).await;
            if pressed.is_ok() {
                delay.delay_ms(KEY_TAP_SETTLE_MS).await;
            }
            let released = keyboard.release_all().await;
            pressed.and(released)
        }
    }
}
