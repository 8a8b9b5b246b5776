// Risk management module
pub mod circuit_breakers;
pub mod sizing;

pub use circuit_breakers::{CircuitBreakerTrip, CircuitBreakers};
pub use sizing::{RiskSizer, RiskState};
