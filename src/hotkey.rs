//! Global toggle key via evdev.
//!
//! Watches every keyboard device for the configured combos and sends one
//! event per press. Key names use the kernel spelling, e.g. `KEY_LEFTALT`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use evdev::{Device, EventType, InputEventKind, Key};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use voice_nav::config::HotkeyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    Pressed,
}

fn resolve_key(name: &str) -> Option<Key> {
    match name.trim().parse::<Key>() {
        Ok(key) => Some(key),
        Err(_) => {
            warn!("Unknown key name: {name}");
            None
        }
    }
}

fn resolve_combo(names: &[String]) -> Option<HashSet<Key>> {
    let combo: HashSet<Key> = names.iter().filter_map(|s| resolve_key(s)).collect();
    (!combo.is_empty() && combo.len() == names.len()).then_some(combo)
}

#[derive(Default)]
struct PressedKeys {
    keys: HashSet<Key>,
    combo_down: bool,
}

pub struct HotkeyMonitor {
    combos: Vec<HashSet<Key>>,
    pressed: Arc<Mutex<PressedKeys>>,
    tx: mpsc::Sender<HotkeyEvent>,
}

impl HotkeyMonitor {
    pub fn new(config: &HotkeyConfig, tx: mpsc::Sender<HotkeyEvent>) -> Self {
        let combos: Vec<HashSet<Key>> = std::iter::once(&config.combo)
            .chain(&config.alt_combos)
            .filter_map(|names| resolve_combo(names))
            .collect();

        info!("Toggle key: {} combo(s) configured", combos.len());

        Self {
            combos,
            pressed: Arc::default(),
            tx,
        }
    }

    fn find_keyboards() -> Vec<Device> {
        evdev::enumerate()
            .map(|(_, device)| device)
            .filter(|device| {
                device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER))
            })
            .inspect(|device| debug!("Found keyboard: {}", device.name().unwrap_or("unknown")))
            .collect()
    }

    async fn watch(
        device: Device,
        combos: Vec<HashSet<Key>>,
        pressed: Arc<Mutex<PressedKeys>>,
        tx: mpsc::Sender<HotkeyEvent>,
    ) {
        let name = device.name().unwrap_or("unknown").to_string();

        let mut events = match device.into_event_stream() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Cannot read {name}: {e}");
                return;
            }
        };

        loop {
            let event = match events.next_event().await {
                Ok(event) => event,
                Err(e) => {
                    warn!("Keyboard {name} disconnected: {e}");
                    return;
                }
            };
            if event.event_type() != EventType::KEY {
                continue;
            }
            let InputEventKind::Key(key) = event.kind() else {
                continue;
            };

            let Ok(mut state) = pressed.lock() else {
                return;
            };
            // 0 = release, 1 = press, 2 = repeat
            match event.value() {
                1 => {
                    state.keys.insert(key);
                }
                0 => {
                    state.keys.remove(&key);
                }
                _ => continue,
            }

            let down = combos.iter().any(|combo| combo.is_subset(&state.keys));
            if down && !state.combo_down {
                debug!("Toggle key pressed");
                let _ = tx.try_send(HotkeyEvent::Pressed);
            }
            state.combo_down = down;
        }
    }

    /// Watch all keyboards until they disconnect. Without readable keyboards
    /// the toggle key is unavailable but the service keeps running.
    pub async fn run(self) {
        if self.combos.is_empty() {
            warn!("No valid toggle key combo configured");
            return;
        }

        let keyboards = Self::find_keyboards();
        if keyboards.is_empty() {
            warn!("No readable keyboards, toggle key disabled (is this user in the 'input' group?)");
            return;
        }

        info!("Watching {} keyboard(s) for the toggle key", keyboards.len());

        let handles: Vec<_> = keyboards
            .into_iter()
            .map(|device| {
                tokio::spawn(Self::watch(
                    device,
                    self.combos.clone(),
                    Arc::clone(&self.pressed),
                    self.tx.clone(),
                ))
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }
    }
}
