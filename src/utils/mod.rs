pub mod error;
pub mod logger;
pub mod monitor;
pub mod proximity;
pub mod validation;
