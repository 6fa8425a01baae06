//! Synchronization flows
//!
//! # Flows
//!
//! 1. **Card moved** (Trello → GitLab): a card lands in the in-progress list,
//!    an issue is created with the card's name, and the card/issue mapping is
//!    stored as `open`.
//! 2. **Issue closed** (GitLab → Trello): the mapping for the closed issue is
//!    looked up, the card is moved to the testing list, and the mapping is
//!    marked `closed`.
//!
//! # Ordering
//!
//! In both flows the store write waits on the remote call through a one-shot
//! hand-off ([`crate::handoff`]). A mapping therefore only exists for an issue
//! that was created, and is only closed for a card that was moved.
//!
//! # Failures
//!
//! A failing flow is logged and counted, then dropped. Nothing it does can take
//! the server down. Redelivered events are absorbed: an open mapping blocks a
//! second issue for the same card, a closed mapping blocks a second card move,
//! and concurrent deliveries of the same event are turned away by the
//! in-flight claims. Redelivery across a restart while a remote call was in
//! progress can still create a duplicate issue.

mod claims;
mod orchestrator;
#[cfg(test)]
pub(crate) mod testing;

pub use claims::{Claim, InFlight};
pub use orchestrator::{FlowConfig, FlowOutcome, SyncOrchestrator};
