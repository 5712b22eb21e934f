//! FTP reply model and framing

pub mod reader;
pub mod reply;
pub mod status_codes;

// Re-export main types
pub use reader::ReplyReader;
pub use reply::Reply;
