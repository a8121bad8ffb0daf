//! Key-combination matching
//!
//! - `KeyToken`: a normalized key, either a character key or a modifier
//! - `HotkeyBinding`: the configured combination, parsed from strings like `ctrl+alt+s`
//! - `KeyEventMatcher`: tracks held keys and reports when the combination becomes held
//! - `KeyDecoder` / `KeySource`: the platform side, see `device`

mod device;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::AtomicBool;

use crate::error::HotkeyError;

pub use device::DevicePoller;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyToken {
    Character(String),
    Modifier(Modifier),
}

impl KeyToken {
    /// Normalize a key name. Left/right variants and platform names of a modifier
    /// collapse to the same token; everything else is lower-cased.
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        match lower.as_str() {
            "ctrl" | "control" | "lcontrol" | "rcontrol" | "ctrl_l" | "ctrl_r" => {
                KeyToken::Modifier(Modifier::Ctrl)
            }
            "alt" | "option" | "altgr" | "alt_gr" | "lalt" | "ralt" | "alt_l" | "alt_r"
            | "loption" | "roption" => KeyToken::Modifier(Modifier::Alt),
            "shift" | "lshift" | "rshift" | "shift_l" | "shift_r" => {
                KeyToken::Modifier(Modifier::Shift)
            }
            "meta" | "super" | "win" | "cmd" | "command" | "rcommand" | "lmeta" | "rmeta" => {
                KeyToken::Modifier(Modifier::Meta)
            }
            _ => KeyToken::Character(lower),
        }
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::Character(c) => f.write_str(c),
            KeyToken::Modifier(Modifier::Ctrl) => f.write_str("ctrl"),
            KeyToken::Modifier(Modifier::Alt) => f.write_str("alt"),
            KeyToken::Modifier(Modifier::Shift) => f.write_str("shift"),
            KeyToken::Modifier(Modifier::Meta) => f.write_str("meta"),
        }
    }
}

/// Set of keys that must be held together; order does not matter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HotkeyBinding {
    keys: HashSet<KeyToken>,
}

impl HotkeyBinding {
    /// Parse `ctrl+alt+s`. Returns `None` for a string with no keys in it.
    pub fn parse(combo: &str) -> Option<Self> {
        let keys: HashSet<KeyToken> = combo
            .split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(KeyToken::from_name)
            .collect();

        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    #[cfg(test)]
    pub fn keys(&self) -> &HashSet<KeyToken> {
        &self.keys
    }

    pub fn is_held(&self, pressed: &HashSet<KeyToken>) -> bool {
        self.keys.is_subset(pressed)
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Modifiers first, for stable log output
        let mut names: Vec<(bool, String)> = self
            .keys
            .iter()
            .map(|key| (matches!(key, KeyToken::Character(_)), key.to_string()))
            .collect();
        names.sort();
        let names: Vec<String> = names.into_iter().map(|(_, name)| name).collect();
        f.write_str(&names.join("+"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

#[derive(Clone, Debug)]
pub struct KeyEvent<K> {
    pub key: K,
    pub action: KeyAction,
}

impl<K> KeyEvent<K> {
    pub fn press(key: K) -> Self {
        Self { key, action: KeyAction::Press }
    }

    pub fn release(key: K) -> Self {
        Self { key, action: KeyAction::Release }
    }
}

/// Turns a platform key into a token. Layout-aware decoding plugs in here.
pub trait KeyDecoder: Send + 'static {
    type Key: Send + 'static;

    fn decode(&self, key: &Self::Key) -> Option<KeyToken>;
}

/// Delivers raw key events from the platform.
pub trait KeySource: Send + Sync + 'static {
    type Decoder: KeyDecoder;
    /// Platform handle, opened and used on the listener thread only
    type Session;

    fn decoder(&self) -> Self::Decoder;

    /// Acquire the platform key state. Runs on the listener thread before `run`.
    fn open(&self) -> Result<Self::Session, HotkeyError>;

    /// Deliver events to `emit` until `stop` is set. Runs on the listener thread.
    fn run(
        &self,
        session: Self::Session,
        stop: &AtomicBool,
        emit: &mut dyn FnMut(KeyEvent<<Self::Decoder as KeyDecoder>::Key>),
    );
}

/// Fires once each time every key of the binding becomes held.
pub struct KeyEventMatcher<D: KeyDecoder> {
    decoder: D,
    binding: HotkeyBinding,
    pressed: HashSet<KeyToken>,
    engaged: bool,
}

impl<D: KeyDecoder> KeyEventMatcher<D> {
    pub fn new(decoder: D, binding: HotkeyBinding) -> Self {
        Self {
            decoder,
            binding,
            pressed: HashSet::new(),
            engaged: false,
        }
    }

    /// Feed one event. Returns `true` when this event completes the combination.
    pub fn handle(&mut self, event: &KeyEvent<D::Key>) -> bool {
        let Some(token) = self.decoder.decode(&event.key) else {
            return false;
        };

        match event.action {
            KeyAction::Press => {
                self.pressed.insert(token);
                tracing::trace!(pressed = ?self.pressed, "Key pressed");
                // Auto-repeat and extra keys keep the combination held without refiring
                if !self.engaged && self.binding.is_held(&self.pressed) {
                    self.engaged = true;
                    return true;
                }
                false
            }
            KeyAction::Release => {
                self.pressed.remove(&token);
                if !self.binding.is_held(&self.pressed) {
                    self.engaged = false;
                }
                false
            }
        }
    }

    #[cfg(test)]
    pub fn pressed_keys(&self) -> &HashSet<KeyToken> {
        &self.pressed
    }
}
