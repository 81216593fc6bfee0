//! Store-and-forward mail server implementation

pub mod access;
pub mod auth;
pub mod dispatch;
pub mod error;
pub mod locks;
pub mod message;
pub mod response;
pub mod server;
pub mod session;
pub mod store;

pub use access::AccessControl;
pub use auth::{Authenticator, StaticCredentials};
pub use dispatch::Dispatcher;
pub use error::{Limits, MailError};
pub use locks::LockRegistry;
pub use message::Message;
pub use response::Response;
pub use server::{MailConfig, MailServer, ShutdownHandle};
pub use session::{Session, SessionHandler, SessionState};
pub use store::MailboxStore;
