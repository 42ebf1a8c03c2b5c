pub const USER_AGENT: &str = concat!("invoice-sync-engine/", env!("CARGO_PKG_VERSION"));
pub const EVENT_STREAM_MIME: &str = "text/event-stream";
