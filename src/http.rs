pub mod breaker;
pub mod client;
