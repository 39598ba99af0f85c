//! Deterministic planning engine: chip lists per sequencer run, then library
//! layouts with adapter slots and control blocks.

pub mod codec;
pub mod engine;
pub mod error;
pub mod layout;
pub mod libraries;
pub mod range;
pub mod units;

pub use engine::{
    Capabilities, Engine, OpResult, Operation, OperationRecord, PlanInputs, PlanParameters,
    PlanState, PlanningEngine, StateSummary, Workflow,
};
pub use error::{ErrorCode, PlanError};
pub use labplan_protocol as protocol;
