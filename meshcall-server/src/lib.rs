mod config;
mod error;
mod http;
mod room;
mod signaling;
mod state;

pub use config::*;
pub use error::*;
pub use http::*;
pub use room::*;
pub use signaling::*;
pub use state::*;
