pub mod coordinator;
pub mod fanout;
pub mod gate;
pub mod state_machine;

pub use coordinator::{ActivationOptions, AlertCoordinator, AlertView};
pub use gate::{CancellationGate, GateState};
