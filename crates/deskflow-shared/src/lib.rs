//! # deskflow-shared
//!
//! Domain vocabulary shared by the store and the HTTP server: ticket types,
//! statuses and roles, the ticket/document numbering scheme, the injectable
//! clock, and the signed bearer credential.

pub mod clock;
pub mod constants;
pub mod credential;
pub mod error;
pub mod numbering;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CredentialError, SharedError};
pub use types::{Caller, Role, TicketStatus, TicketType};
