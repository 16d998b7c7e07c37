//! # Actions
//!
//! An [`Action`] is one unit of remediation work against a cluster. Its
//! lifecycle is a small state machine:
//!
//! ```text
//! pending --start--> running --succeed--> succeeded
//!                    running --fail-----> failed
//!                    running --attempt_failed--> running
//! ```
//!
//! Every transition is audited. Terminal states are final and freeze the
//! action's result attributes. [`ActionEngine`] owns the per-cluster set of
//! tracked actions and the in-flight registry that keeps equivalent work
//! from running twice.

pub mod engine;
pub mod events;
pub mod handler;
pub mod lifecycle;
pub mod record;
pub mod registry;
pub mod states;

pub use engine::{ActionEngine, DispatchOutcome};
pub use events::ActionEvent;
pub use handler::{ActionContext, ActionHandler, NODE_ID_PARAMETER};
pub use lifecycle::{ChildHandle, LifecycleSnapshot, Transition};
pub use record::{Action, ActionBuilder};
pub use registry::{EquivalenceKey, InFlightRegistry, Reservation};
pub use states::{ActionState, ActionType, ChildPolicy};
