//! Sessions driving a party through the protocol rounds, and the errors they can return.

mod error;
mod session;

pub use error::{AbortKind, Error, Failure, LocalError, RemoteError};
pub use session::{Envelope, Session, SessionId, SessionOutcome, SessionOutput};
