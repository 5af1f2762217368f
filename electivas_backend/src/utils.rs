//! Shared helpers and constants.

use chrono::Utc;

pub const APP_NAME: &str = "electivas_backend";

/// Cookie lifetime for vote and like markers.
pub const ONE_YEAR_IN_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Milliseconds since the Unix epoch, the timestamp unit stored on comments.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn print_banner() {
    println!("{APP_NAME} v{}", env!("CARGO_PKG_VERSION"));
}
