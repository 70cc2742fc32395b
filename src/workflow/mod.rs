//! Stage state machine, identity rules and per-actor projections.

pub mod engine;
pub mod identity;
pub mod projection;
pub mod sanitize;
pub mod transitions;

pub use engine::{Applied, Outcome, TransitionRequest, WorkflowEngine};
pub use projection::{project, tab_counts, Tab, TabCounts, ViewFilter};
pub use transitions::{Action, Transition};
