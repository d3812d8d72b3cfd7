//! Process lifecycle: signals for shutdown and reload

mod signals;

pub use signals::{SignalEvent, Signals};
