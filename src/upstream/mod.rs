mod client;
mod rate_limiter;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ApodClient;
pub use rate_limiter::{RateLimiter, RateLimits, RatePermit, RateSnapshot};
pub use transport::{ApodQuery, ApodTransport, HttpTransport, RawResponse};
