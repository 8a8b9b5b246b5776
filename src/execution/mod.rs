// Fill simulation and the position state machine
pub mod executor;
pub mod grid;
pub mod position_manager;

pub use executor::{ExecutionSimulator, Fill, RejectReason, Rejection};
pub use grid::{weighted_entry, GridLadder};
pub use position_manager::{
    BreakoutPosition, ExitTrigger, GridPosition, Holding, PositionError, PositionManager,
    PositionState,
};
