//! Live-serving session handle.
//!
//! Components that change served assets receive a [`Session`] at construction
//! and signal it when the server should pick up the new files.

use crate::log;

/// A long-running serving session that can be told to restart.
///
/// `restart` is fire-and-forget: it returns immediately and the session
/// restarts on its own schedule.
pub trait Session: Send + Sync {
    fn restart(&self);
}

/// Stand-in used when no server is attached (plain `watch`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl Session for Detached {
    fn restart(&self) {
        log!("watch"; "assets updated");
    }
}
