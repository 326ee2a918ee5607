pub mod api;
pub mod config;
pub mod envelope;
pub mod error;
pub mod model;
pub mod overview;
pub mod projection;
pub mod scheduler;
pub mod shutdown;
pub mod worker;
