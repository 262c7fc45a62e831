//! Observability events for the sigil registry
//!
//! Events are explicit and typed. Each maps to one stable upper-snake name
//! that appears as the `event` key of a log line.

use std::fmt;

/// Observable events in the registry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Process startup begins
    BootStart,
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Persisted registry state loaded
    RegistryLoaded,
    /// Persisted state could not be loaded (FATAL)
    RegistryLoadFailed,
    /// Primary state file unusable, backup used instead
    StateRecoveredFromBackup,
    /// HTTP listener bound, ready for requests
    Serving,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,

    // Inhale
    /// Batch received
    InhaleReceived,
    /// Batch changed content and was committed
    InhaleCommitted,
    /// Batch accepted with no content change
    InhaleUnchanged,
    /// Batch refused as a whole
    InhaleRejected,
    /// Persistence refused a commit; snapshot not advanced
    CommitFailed,
    /// Retention cap dropped entries
    RegistryPruned,

    // Krystal
    /// Krystal document harvested into a batch
    KrystalHarvested,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RegistryLoaded => "REGISTRY_LOADED",
            Event::RegistryLoadFailed => "REGISTRY_LOAD_FAILED",
            Event::StateRecoveredFromBackup => "STATE_RECOVERED_FROM_BACKUP",
            Event::Serving => "SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            Event::InhaleReceived => "INHALE_RECEIVED",
            Event::InhaleCommitted => "INHALE_COMMITTED",
            Event::InhaleUnchanged => "INHALE_UNCHANGED",
            Event::InhaleRejected => "INHALE_REJECTED",
            Event::CommitFailed => "COMMIT_FAILED",
            Event::RegistryPruned => "REGISTRY_PRUNED",

            Event::KrystalHarvested => "KRYSTAL_HARVESTED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::RegistryLoadFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
