// Layer 1: Standard library imports
use std::process;

/// Guard for code paths that must not unwind.
///
/// Deregistration notificators, stop-guard `stop()` calls, envelope access
/// hooks and timer firings all run on threads where an unwind would tear
/// through runtime bookkeeping. The guard converts a panic on such a path
/// into an immediate process abort with a diagnostic.
pub(crate) struct AbortOnPanic {
    context: &'static str,
    armed: bool,
}

impl AbortOnPanic {
    pub(crate) fn new(context: &'static str) -> Self {
        Self {
            context,
            armed: true,
        }
    }

    /// Disarm after the guarded section completed normally.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if self.armed && std::thread::panicking() {
            eprintln!("agentry: panic on a no-unwind path ({}); aborting", self.context);
            process::abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_guard_is_silent() {
        let guard = AbortOnPanic::new("test");
        guard.disarm();
    }

    #[test]
    fn test_guard_without_panic_is_silent() {
        {
            let guard = AbortOnPanic::new("test");
            guard.disarm();
        }
        // Reaching this point means the guard did not abort.
    }
}
