//! Listener doubles shared by tests outside this module

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::permission::InputPermission;
use super::router::EventRouter;
use super::tap::{HotkeyError, TapBackend};

pub struct Granted;

impl InputPermission for Granted {
    fn is_granted(&self) -> bool {
        true
    }
}

/// Tap that never reports installation, so `register` waits out its timeout
pub struct StalledBackend;

impl TapBackend for StalledBackend {
    fn run(
        &self,
        _router: EventRouter,
        running: Arc<AtomicBool>,
        _installed: std_mpsc::Sender<Result<(), HotkeyError>>,
    ) {
        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));
        }
    }
}
