//! Canonical structured event names used across `gs-streamer`.

// Broker events.
pub const BROKER_BIND_OK: &str = "broker_bind_ok";
pub const BROKER_ACCEPT_FAILED: &str = "broker_accept_failed";
pub const BROKER_MALFORMED_MESSAGE: &str = "broker_malformed_message";
pub const BROKER_SUBSCRIBER_REGISTER: &str = "broker_subscriber_register";
pub const BROKER_SUBSCRIBER_DROPPED: &str = "broker_subscriber_dropped";
pub const BROKER_QUEUE_FULL: &str = "broker_queue_full";

// Subscription-plan events.
pub const SUBSCRIPTION_OUTPUT_UNMATCHED: &str = "subscription_output_unmatched";

// Stream and plugin run-loop events.
pub const COMPONENT_START: &str = "component_start";
pub const COMPONENT_STOPPED: &str = "component_stopped";
pub const PIPELINE_VETO: &str = "pipeline_veto";
pub const PUBLISH_FAILED: &str = "publish_failed";

// Transport events.
pub const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
pub const RECONNECT_EXHAUSTED: &str = "reconnect_exhausted";

// Topology-loading events.
pub const TOPOLOGY_ENTRY_SKIPPED: &str = "topology_entry_skipped";
pub const TOPOLOGY_WARNING: &str = "topology_warning";
