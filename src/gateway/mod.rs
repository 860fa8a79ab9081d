pub mod events;
#[allow(clippy::module_inception)]
pub mod gateway;
pub mod refresh;
pub mod transport;

pub use events::{LogoutReason, SessionEvent, SessionEvents};
pub use gateway::Gateway;
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use transport::{ReqwestTransport, Transport};
