mod client;
mod config;
mod error;
pub mod media;
pub mod session;
mod speaker;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::*;
pub use config::*;
pub use error::*;
pub use speaker::*;
