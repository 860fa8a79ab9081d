pub mod envelope;
pub mod request;
pub mod session;

pub use envelope::{Envelope, LoginData, RefreshData};
pub use request::{ApiRequest, ApiResponse};
pub use session::{CredentialPair, Session, SessionKey};
