// Decision stages, the orchestrator and shared errors/models
pub mod blacklist {
    pub use crate::blacklist::*;
}

pub mod customer_category {
    pub use crate::customer_category::*;
}

pub mod credit_bureau {
    pub use crate::credit_bureau::*;
}

pub mod scheme {
    pub use crate::scheme::*;
}

pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
