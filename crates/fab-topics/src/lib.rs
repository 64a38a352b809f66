//! Canonical event topic constants shared across services.
//!
//! This crate centralizes the string constants used when publishing events
//! so the bridge server and the observer surfaces stay in sync. Store
//! mutation topics double as wire discriminators consumed by pre-existing
//! clients, so they keep their UPPER_SNAKE form; service-local topics use
//! dot.case names.

// Store mutations (fanned out to every observer surface)
pub const TOPIC_ENTITLEMENTS_UPDATED: &str = "ENTITLEMENTS_UPDATED";
pub const TOPIC_ENTITLEMENTS_CLEARED: &str = "ENTITLEMENTS_CLEARED";

// Service lifecycle
pub const TOPIC_SERVICE_START: &str = "service.start";
pub const TOPIC_SERVICE_STOP: &str = "service.stop";
