//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod upstream_models {
    pub use crate::upstream_models::*;
}

pub mod circuit_breaker {
    pub use crate::circuit_breaker::*;
}
