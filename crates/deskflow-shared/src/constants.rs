/// Application name
pub const APP_NAME: &str = "Deskflow";

/// Issuing authority embedded in every ticket and document number
pub const NUMBER_AUTHORITY: &str = "SV-HR";

/// Description given to the seed activity when the caller supplies none
pub const SEED_ACTIVITY_DESCRIPTION: &str = "Initial Activity";

/// Maximum uploaded document size in bytes (20 MiB)
pub const MAX_DOCUMENT_SIZE: usize = 20 * 1024 * 1024;

/// Access credential lifetime in seconds (1 hour)
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Refresh credential lifetime in seconds (3 hours)
pub const REFRESH_TOKEN_TTL_SECS: i64 = 3 * 3600;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Response envelope error codes
pub const ERROR_CODE_SUCCESS: &str = "000";
pub const ERROR_CODE_INVALID_BODY_REQUEST: &str = "010";
pub const ERROR_CODE_INVALID_QUERY_PARAMS: &str = "016";
pub const ERROR_CODE_DATA_ALREADY_EXIST: &str = "017";
pub const ERROR_CODE_INVALID_AUTH_TOKEN: &str = "020";
pub const ERROR_CODE_AUTH_TOKEN_EXPIRED: &str = "021";
pub const ERROR_CODE_AUTH_TOKEN_EMPTY: &str = "022";
pub const ERROR_CODE_FORBIDDEN_ACCESS: &str = "023";
pub const ERROR_CODE_DATA_NOT_FOUND: &str = "030";
pub const ERROR_CODE_DATABASE_ERROR: &str = "050";
pub const ERROR_CODE_TIMEOUT: &str = "059";
pub const ERROR_CODE_GENERAL_ERROR: &str = "999";

/// Response envelope messages
pub const RESPONSE_MESSAGE_SUCCESS: &str = "success";
pub const RESPONSE_MESSAGE_INVALID_BODY_REQ: &str = "invalid body request";
pub const RESPONSE_MESSAGE_INVALID_QUERY_PARAMS: &str = "invalid query parameters";
pub const RESPONSE_MESSAGE_DATA_ALREADY_EXIST: &str = "data already exist";
pub const RESPONSE_MESSAGE_INVALID_AUTH_TOKEN: &str = "invalid auth token";
pub const RESPONSE_MESSAGE_AUTH_TOKEN_EXPIRED: &str = "auth token expired";
pub const RESPONSE_MESSAGE_AUTH_TOKEN_EMPTY: &str = "auth token empty";
pub const RESPONSE_MESSAGE_DATA_NOT_FOUND: &str = "data not found";
pub const RESPONSE_MESSAGE_FORBIDDEN_ACCESS: &str = "forbidden access";
pub const RESPONSE_MESSAGE_DATABASE_ERROR: &str = "database error";
pub const RESPONSE_MESSAGE_TIMEOUT: &str = "timeout";
pub const RESPONSE_MESSAGE_GENERAL_ERROR: &str = "general error";
