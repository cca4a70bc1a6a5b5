/// Process-wide liveness/readiness flags (§5, §6 of SPEC_FULL.md), grounded
/// directly on `examples/original_source/global/global.go`'s `Ready`/`Alive`
/// package-level booleans: set once the lifecycle owner has everything up,
/// cleared on interrupt/terminate before the rest of shutdown runs. Exposed
/// through `AppState` so a future `/healthz`-style handler has something to
/// read; no such route is wired up here, only the flags themselves.
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Liveness {
    alive: AtomicBool,
    ready: AtomicBool,
}

impl Liveness {
    pub const fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        }
    }

    /// Flips both flags true once storage, RPC, tailer, backfill, and the
    /// HTTP server are all spawned.
    pub fn mark_up(&self) {
        self.alive.store(true, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Clears both flags on SIGINT/SIGTERM, before cancellation is requested.
    pub fn mark_down(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// The single process-wide instance; `main` is the only writer.
pub static LIVENESS: Liveness = Liveness::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_down_then_tracks_mark_up_and_mark_down() {
        let liveness = Liveness::new();
        assert!(!liveness.is_alive());
        assert!(!liveness.is_ready());

        liveness.mark_up();
        assert!(liveness.is_alive());
        assert!(liveness.is_ready());

        liveness.mark_down();
        assert!(!liveness.is_alive());
        assert!(!liveness.is_ready());
    }
}
