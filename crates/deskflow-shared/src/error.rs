use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Unknown ticket type: {0}")]
    UnknownTicketType(String),

    #[error("Unknown ticket status: {0}")]
    UnknownStatus(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Malformed credential")]
    Malformed,

    #[error("Credential signature is invalid")]
    BadSignature,

    #[error("Credential expired")]
    Expired,

    #[error("Failed to encode credential: {0}")]
    Encoding(String),
}
