// sleepme-api: Async Rust client for the Sleep.me developer REST API

pub mod client;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use client::{DEFAULT_API_URL, SleepMeClient};
pub use error::{Error, ErrorKind};
pub use models::{
    ClaimedDevice, DevicePatch, DeviceStatus, MAX_TEMPERATURE_C, MIN_TEMPERATURE_C,
    ThermalControlStatus, normalize_temperature,
};
pub use rate_limit::RateLimiter;
pub use retry::{RetryAction, RetryAttempt, RetryPolicy};
pub use transport::TransportConfig;
