//! Low-level input tap backends
//!
//! A backend owns the OS tap on the dedicated listener thread. On macOS it
//! is a `CGEventTap` on its own `CFRunLoop`; elsewhere installation fails.

use std::sync::atomic::AtomicBool;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use super::router::EventRouter;

/// Errors that can occur while installing or running a tap
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("failed to create event tap - check Input Monitoring / Accessibility permissions")]
    EventTapCreation,

    #[error("failed to attach event tap to run loop")]
    RunLoopSource,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global hotkeys are not supported on this platform")]
    Unsupported,
}

/// Installs and drives an input tap.
///
/// `run` is called on the listener thread. It must report installation
/// through `installed` exactly once, then block feeding events to `router`
/// until `running` is cleared.
pub trait TapBackend: Send + Sync + 'static {
    fn run(
        &self,
        router: EventRouter,
        running: Arc<AtomicBool>,
        installed: std_mpsc::Sender<Result<(), HotkeyError>>,
    );
}

/// The tap backend for the current platform
pub fn platform_backend() -> Arc<dyn TapBackend> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::CGEventTapBackend)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(UnsupportedBackend)
    }
}

/// Backend for platforms without a supported tap
pub struct UnsupportedBackend;

impl TapBackend for UnsupportedBackend {
    fn run(
        &self,
        _router: EventRouter,
        _running: Arc<AtomicBool>,
        installed: std_mpsc::Sender<Result<(), HotkeyError>>,
    ) {
        let _ = installed.send(Err(HotkeyError::Unsupported));
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType, EventField,
    };
    use tracing::{error, info, warn};

    use super::{HotkeyError, TapBackend};
    use crate::hotkey::keys::Modifiers;
    use crate::hotkey::router::{EventRouter, TapAction, TapEvent};

    /// Session-level `CGEventTap` that can swallow matched key-downs
    pub struct CGEventTapBackend;

    impl TapBackend for CGEventTapBackend {
        fn run(
            &self,
            router: EventRouter,
            running: Arc<AtomicBool>,
            installed: std_mpsc::Sender<Result<(), HotkeyError>>,
        ) {
            if let Err(e) = run_event_loop(router, running, &installed) {
                error!(?e, "hotkey listener error");
                let _ = installed.send(Err(e));
            }
        }
    }

    fn decode(event_type: CGEventType, event: &CGEvent) -> TapEvent {
        match event_type {
            CGEventType::KeyDown => TapEvent::KeyDown {
                key_code: event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16,
                modifiers: Modifiers::from_flags(event.get_flags()),
                autorepeat: event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT)
                    != 0,
            },
            CGEventType::TapDisabledByTimeout => TapEvent::DisabledByTimeout,
            CGEventType::TapDisabledByUserInput => TapEvent::DisabledByUserInput,
            _ => TapEvent::Other,
        }
    }

    /// Run the CFRunLoop with the event tap
    fn run_event_loop(
        router: EventRouter,
        running: Arc<AtomicBool>,
        installed: &std_mpsc::Sender<Result<(), HotkeyError>>,
    ) -> Result<(), HotkeyError> {
        // The callback can't reach the tap, so it flags and the loop re-enables
        let reenable = Arc::new(AtomicBool::new(false));
        let reenable_flag = Arc::clone(&reenable);

        // CGEventTap callback - must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            match router.route(decode(event_type, event)) {
                TapAction::PassThrough => Some(event.clone()),
                TapAction::Suppress => {
                    // A `None` return delivers the original event, so null it out
                    event.set_type(CGEventType::Null);
                    Some(event.clone())
                }
                TapAction::ReEnable => {
                    reenable_flag.store(true, Ordering::SeqCst);
                    Some(event.clone())
                }
            }
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::Default,
            vec![CGEventType::KeyDown],
            callback,
        )
        .map_err(|_| HotkeyError::EventTapCreation)?;

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::RunLoopSource)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }
        tap.enable();

        info!("event tap created and enabled");
        let _ = installed.send(Ok(()));

        while running.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
            }

            if reenable.swap(false, Ordering::SeqCst) {
                warn!("re-enabling event tap");
                tap.enable();
            }
        }

        unsafe {
            run_loop.remove_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        Ok(())
    }
}
