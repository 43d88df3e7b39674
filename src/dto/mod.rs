pub mod admin;
pub mod events;
pub mod health;
pub mod room;
pub mod validation;
pub mod ws;

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
