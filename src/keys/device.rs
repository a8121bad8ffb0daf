//! Global key state via `device_query`

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use device_query::{DeviceQuery, DeviceState, Keycode};

use super::{KeyDecoder, KeyEvent, KeySource, KeyToken};
use crate::error::HotkeyError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Decodes `device_query` keycodes by physical key. Digit keys map to `0`-`9`
/// whatever the active layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceQueryDecoder;

impl KeyDecoder for DeviceQueryDecoder {
    type Key = Keycode;

    fn decode(&self, key: &Keycode) -> Option<KeyToken> {
        Some(KeyToken::from_name(&keycode_name(&format!("{key:?}"))))
    }
}

/// `Key7` -> `7`, `LControl` -> `lcontrol`, `A` -> `a`
fn keycode_name(debug_name: &str) -> String {
    match debug_name.strip_prefix("Key") {
        Some(digit) if digit.len() == 1 && digit.chars().all(|c| c.is_ascii_digit()) => {
            digit.to_string()
        }
        _ => debug_name.to_lowercase(),
    }
}

/// Polls the global keyboard state and reports differences as press/release events.
#[derive(Clone, Debug)]
pub struct DevicePoller {
    poll_interval: Duration,
}

impl Default for DevicePoller {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl KeySource for DevicePoller {
    type Decoder = DeviceQueryDecoder;
    type Session = DeviceState;

    fn decoder(&self) -> DeviceQueryDecoder {
        DeviceQueryDecoder
    }

    // `DeviceState::new` panics without a display server (or input permission on macOS)
    fn open(&self) -> Result<DeviceState, HotkeyError> {
        DeviceState::checked_new().ok_or(HotkeyError::Unavailable(
            "could not connect to the display server or input monitoring is not permitted",
        ))
    }

    fn run(
        &self,
        device_state: DeviceState,
        stop: &AtomicBool,
        emit: &mut dyn FnMut(KeyEvent<Keycode>),
    ) {
        let mut previous: HashSet<Keycode> = HashSet::new();

        while !stop.load(Ordering::Acquire) {
            let current: HashSet<Keycode> = device_state.get_keys().into_iter().collect();

            for key in previous.difference(&current) {
                emit(KeyEvent::release(key.clone()));
            }
            for key in current.difference(&previous) {
                emit(KeyEvent::press(key.clone()));
            }

            previous = current;
            thread::sleep(self.poll_interval);
        }

        tracing::debug!("Key polling stopped");
    }
}
