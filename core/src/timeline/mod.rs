//! Per-entity lifecycle timelines: event types, the legality table and
//! the scheduler that merges DATA_DRIVEN and RANDOM events.

pub mod event;
pub mod scheduler;
pub mod state;

pub use event::{Channel, EventKind, EventPayload, LifecycleEvent, Provenance, ReviewStatus};
pub use scheduler::EventScheduler;
pub use state::{replay, DormancyWindow, EntityStateMachine, LifecycleState};
