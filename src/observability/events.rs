//! Observability events for nestdb
//!
//! Every lifecycle transition of the registry, environments, stores and the
//! rescue protocol is a typed event with a fixed name and severity.

use std::fmt;

use super::logger::Severity;

/// Observable events in nestdb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration file loaded
    ConfigLoaded,
    /// Environment registry constructed
    RegistryCreated,
    /// Default names registered
    DefaultsRegistered,
    /// Defaults re-registered after the first environment; ignored
    DefaultsIgnored,
    /// Recovery policy registered
    PolicyRegistered,
    /// Recovery policy re-registered after the first environment; ignored
    PolicyIgnored,

    // Model catalog
    /// Model definition loaded and cached
    ModelResolved,

    // Store
    /// Fresh store file created
    StoreCreated,
    /// Existing store file replayed
    StoreOpened,
    /// Store file removed by the rescue protocol
    StoreDiscarded,
    /// Live shared coordinator handed to another environment
    CoordinatorShared,

    // Environments
    /// Environment constructed
    EnvironmentCreated,
    /// Last handle to an environment dropped
    EnvironmentReleased,
    /// Background environment refused: cap reached
    BackgroundRejected,
    /// Background queue worker started
    BackgroundQueueStarted,

    // Rescue protocol
    /// Coordinator creation failed
    RescueInitFailed,
    /// Policy declined to rescue
    RescueDeclined,
    /// Discard-and-recreate started
    RescueStart,
    /// Store recreated
    RescueComplete,
    /// Recreation failed
    RescueFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            // Configuration
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RegistryCreated => "REGISTRY_CREATED",
            Event::DefaultsRegistered => "DEFAULTS_REGISTERED",
            Event::DefaultsIgnored => "DEFAULTS_IGNORED",
            Event::PolicyRegistered => "RECOVERY_POLICY_REGISTERED",
            Event::PolicyIgnored => "RECOVERY_POLICY_IGNORED",

            // Model catalog
            Event::ModelResolved => "MODEL_RESOLVED",

            // Store
            Event::StoreCreated => "STORE_CREATED",
            Event::StoreOpened => "STORE_OPENED",
            Event::StoreDiscarded => "STORE_DISCARDED",
            Event::CoordinatorShared => "COORDINATOR_SHARED",

            // Environments
            Event::EnvironmentCreated => "ENVIRONMENT_CREATED",
            Event::EnvironmentReleased => "ENVIRONMENT_RELEASED",
            Event::BackgroundRejected => "BACKGROUND_INSTANCE_REJECTED",
            Event::BackgroundQueueStarted => "BACKGROUND_QUEUE_STARTED",

            // Rescue protocol
            Event::RescueInitFailed => "STORE_INIT_FAILED",
            Event::RescueDeclined => "RESCUE_DECLINED",
            Event::RescueStart => "RESCUE_BEGIN",
            Event::RescueComplete => "RESCUE_COMPLETE",
            Event::RescueFailed => "RESCUE_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::EnvironmentReleased => Severity::Trace,
            Event::DefaultsIgnored
            | Event::PolicyIgnored
            | Event::BackgroundRejected
            | Event::RescueInitFailed
            | Event::RescueStart
            | Event::StoreDiscarded => Severity::Warn,
            Event::RescueDeclined | Event::RescueFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ConfigLoaded,
            Event::RegistryCreated,
            Event::DefaultsRegistered,
            Event::DefaultsIgnored,
            Event::PolicyRegistered,
            Event::PolicyIgnored,
            Event::ModelResolved,
            Event::StoreCreated,
            Event::StoreOpened,
            Event::StoreDiscarded,
            Event::CoordinatorShared,
            Event::EnvironmentCreated,
            Event::EnvironmentReleased,
            Event::BackgroundRejected,
            Event::BackgroundQueueStarted,
            Event::RescueInitFailed,
            Event::RescueDeclined,
            Event::RescueStart,
            Event::RescueComplete,
            Event::RescueFailed,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_rescue_severities() {
        assert_eq!(Event::RescueStart.severity(), Severity::Warn);
        assert_eq!(Event::RescueFailed.severity(), Severity::Error);
        assert_eq!(Event::RescueComplete.severity(), Severity::Info);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::StoreOpened), "STORE_OPENED");
        assert_eq!(
            format!("{}", Event::BackgroundRejected),
            "BACKGROUND_INSTANCE_REJECTED"
        );
    }
}
