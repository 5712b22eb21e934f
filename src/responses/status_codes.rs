//! FTP status code definitions

// Preliminary codes (1xx)
pub const OPENING_DATA_CONNECTION: u16 = 150;

// Completion codes (2xx)
pub const COMMAND_OKAY: u16 = 200;
pub const SERVICE_READY: u16 = 220;
pub const GOODBYE: u16 = 221;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const PASSIVE_MODE: u16 = 227;
pub const EXTENDED_PASSIVE_MODE: u16 = 229;
pub const USER_LOGGED_IN: u16 = 230;

// Intermediate codes (3xx)
pub const USER_NAME_OKAY_NEED_PASSWORD: u16 = 331;

// Error codes (4xx, 5xx)
pub const DATA_CONNECTION_FAILED: u16 = 425;
pub const TRANSFER_FAILED: u16 = 426;
pub const COMMAND_NOT_RECOGNIZED: u16 = 500;
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_NOT_FOUND: u16 = 550;

/// Check if status code is a positive preliminary reply (1xx)
pub fn is_preliminary(code: u16) -> bool {
    (100..200).contains(&code)
}

/// Check if status code indicates success (2xx)
pub fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

/// Check if status code is a positive intermediate reply (3xx)
pub fn is_intermediate(code: u16) -> bool {
    (300..400).contains(&code)
}

/// Check if status code indicates a transient failure (4xx)
pub fn is_transient_error(code: u16) -> bool {
    (400..500).contains(&code)
}

/// Check if status code indicates a permanent failure (5xx)
pub fn is_permanent_error(code: u16) -> bool {
    (500..600).contains(&code)
}
