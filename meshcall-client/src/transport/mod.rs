mod transport_event;
mod ws_transport;

pub use transport_event::*;
pub use ws_transport::*;
