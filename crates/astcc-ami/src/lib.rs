//! astcc-ami: Asterisk Manager Interface IO boundary.
//! Framing, login/logoff, credential discovery and the session task that
//! pushes events to the dispatcher. No coin-line logic lives here.

pub mod codec;
pub mod credentials;
pub mod error;
pub mod session;

pub use codec::{ManagerAction, ManagerCodec, ManagerFrame, ManagerMessage};
pub use credentials::{DEFAULT_MANAGER_CONF, is_loopback, lookup_secret, resolve_secret};
pub use error::{CodecError, CredentialError, SessionError};
pub use session::{
    DEFAULT_PORT, DisconnectReason, EventStream, ManagerSession, SessionOptions, SessionState,
};
