pub mod callback;
pub mod gate;
pub mod jwe;
pub mod matcher;
pub mod metrics;
pub mod paths;
pub mod token;
