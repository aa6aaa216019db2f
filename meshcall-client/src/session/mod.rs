mod negotiation_role;
mod peer_session;
mod peer_state;
mod session_manager;
mod signal_outbox;

pub use negotiation_role::*;
pub use peer_session::*;
pub use peer_state::*;
pub use session_manager::*;
pub use signal_outbox::*;
