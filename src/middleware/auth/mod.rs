pub mod bearer;
pub mod gate;

pub use bearer::extract_bearer;
pub use gate::{AuthGate, GateDecision, RejectReason};
