//! Global hotkey listener lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use crate::error::HotkeyError;
use crate::keys::{HotkeyBinding, KeyEventMatcher, KeySource};

/// Invoked on the listener thread when the combination is pressed
pub type MatchCallback = Arc<dyn Fn() + Send + Sync>;

struct ActiveListener {
    combo: String,
    binding: HotkeyBinding,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Owns at most one running key listener.
pub struct HotkeyController<S: KeySource> {
    source: Arc<S>,
    on_match: MatchCallback,
    active: Option<ActiveListener>,
}

impl<S: KeySource> HotkeyController<S> {
    pub fn new(source: S, on_match: MatchCallback) -> Self {
        Self {
            source: Arc::new(source),
            on_match,
            active: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.active.is_some()
    }

    /// The combination string currently listened for, empty when unbound
    pub fn combo(&self) -> &str {
        self.active.as_ref().map(|a| a.combo.as_str()).unwrap_or("")
    }

    /// Stop any previous listener, then listen for `combo` and call `on_match` on each match.
    /// An empty combination leaves the controller unbound. Returns whether a listener is
    /// running afterwards.
    pub fn bind(&mut self, combo: &str, on_match: MatchCallback) -> bool {
        self.on_match = on_match;
        self.rebind(combo)
    }

    /// Listen for `combo` with the callback from the last `bind`.
    pub fn rebind(&mut self, combo: &str) -> bool {
        self.unbind();

        let Some(binding) = HotkeyBinding::parse(combo) else {
            tracing::warn!("Empty hotkey string provided; hotkey not registered");
            return false;
        };

        let stop = Arc::new(AtomicBool::new(false));
        let source = self.source.clone();
        let thread_stop = stop.clone();
        let thread_binding = binding.clone();
        let on_match = self.on_match.clone();
        let (started_tx, started_rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                let session = match source.open() {
                    Ok(session) => {
                        let _ = started_tx.send(Ok(()));
                        session
                    }
                    Err(e) => {
                        let _ = started_tx.send(Err(e));
                        return;
                    }
                };
                let mut matcher = KeyEventMatcher::new(source.decoder(), thread_binding);
                source.run(session, &thread_stop, &mut |event| {
                    if matcher.handle(&event) {
                        tracing::info!("Hotkey pressed");
                        on_match();
                    }
                });
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                tracing::error!(error = %e, "Could not start hotkey listener");
                return false;
            }
        };

        // A dropped sender means the thread died before reporting
        let started = started_rx
            .recv()
            .unwrap_or(Err(HotkeyError::ListenerExited));
        if let Err(e) = started {
            if thread.join().is_err() {
                tracing::error!("Hotkey listener thread panicked");
            }
            tracing::error!(error = %e, hotkey = %binding, "Hotkey not registered");
            return false;
        }

        tracing::info!(hotkey = %binding, "Hotkey registered");
        self.active = Some(ActiveListener {
            combo: combo.to_string(),
            binding,
            stop,
            thread: Some(thread),
        });
        true
    }

    /// Stop the listener and wait for its thread to exit. Safe to call when unbound.
    pub fn unbind(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.stop.store(true, Ordering::Release);
        if let Some(thread) = active.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Hotkey listener thread panicked");
            }
        }
        tracing::info!(hotkey = %active.binding, "Hotkey unregistered");
    }
}

impl<S: KeySource> Drop for HotkeyController<S> {
    fn drop(&mut self) {
        self.unbind();
    }
}
