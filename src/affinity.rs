//! Scheduler requests for the measuring thread. Migrating between cores mid-sweep throws away
//! the private-cache state the protocol builds up, so the sweep asks to stay on one core. The
//! request is advisory: a refusal only degrades accuracy.
use log::{debug, info, warn};

/// Platform capability to pin the calling thread to a CPU core
pub trait AffinityControl {
    /// Returns `true` if the calling thread is now pinned to `core`
    fn pin_current_thread(&self, core: usize) -> bool;
}

/// Pins through the `core_affinity` crate
#[derive(Clone, Copy, Debug, Default)]
pub struct CoreAffinity;

impl AffinityControl for CoreAffinity {
    fn pin_current_thread(&self, core: usize) -> bool {
        let available = core_affinity::get_core_ids().unwrap_or_default();
        if !available.iter().any(|c| c.id == core) {
            debug!(
                "CPU core {} not among the {} cores available to this process",
                core,
                available.len()
            );
            return false;
        }
        core_affinity::set_for_current(core_affinity::CoreId { id: core })
    }
}

/// For platforms without affinity control; always refuses
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAffinity;

impl AffinityControl for NoAffinity {
    fn pin_current_thread(&self, _core: usize) -> bool {
        false
    }
}

/// Request `core` through `control`, logging the outcome. Returns whether the thread is pinned.
pub fn request_pin(control: &dyn AffinityControl, core: usize) -> bool {
    if control.pin_current_thread(core) {
        info!("Measuring thread pinned to CPU core {}", core);
        true
    } else {
        let err = crate::ProfilerError::AffinityRequest { core };
        warn!("{} (NOTE: this is expected on macOS), measurements may be less consistent", err);
        false
    }
}

/// Ask for maximum scheduling priority for the measuring thread
pub fn raise_priority() -> bool {
    if thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max).is_err() {
        warn!("Couldn't set measuring thread to maximum thread priority");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata, Record};
    use std::cell::Cell;

    thread_local! {
        static WARNINGS: Cell<usize> = const { Cell::new(0) };
    }

    /// Counts warnings logged on the current thread
    struct WarningCounter;

    impl Log for WarningCounter {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if record.level() == Level::Warn {
                WARNINGS.with(|w| w.set(w.get() + 1));
            }
        }

        fn flush(&self) {}
    }

    static COUNTER: WarningCounter = WarningCounter;

    fn warnings_during(f: impl FnOnce()) -> usize {
        // another test may have installed it already
        let _ = log::set_logger(&COUNTER);
        log::set_max_level(log::LevelFilter::Trace);
        WARNINGS.with(|w| w.set(0));
        f();
        WARNINGS.with(|w| w.get())
    }

    #[test]
    fn missing_core_warns_once() {
        let warnings = warnings_during(|| {
            assert!(!request_pin(&CoreAffinity, usize::MAX));
        });
        assert_eq!(warnings, 1);
    }

    #[test]
    fn no_affinity_always_refuses() {
        assert!(!request_pin(&NoAffinity, 0));
    }

    #[test]
    fn nonexistent_core_is_refused() {
        assert!(!CoreAffinity.pin_current_thread(usize::MAX));
    }
}
