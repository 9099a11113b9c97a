//! # Protocol Module
//!
//! The text subscription protocol spoken over the WebSocket: frame encoding,
//! decoding and the handful of frames this client builds itself.

/// Frame structure, encoder and decoder.
pub mod frame;

pub use frame::{commands, decode, Inbound, StompFrame};

use crate::models::Subscription;

/// Protocol version announced in CONNECT.
pub const ACCEPT_VERSION: &str = "1.2";

/// Builds the CONNECT frame announcing the protocol version, heartbeat
/// proposal and bearer token.
pub fn connect_frame(token: Option<&str>, heartbeat_out_ms: u64, heartbeat_in_ms: u64) -> StompFrame {
    let frame = StompFrame::new(commands::CONNECT)
        .header("accept-version", ACCEPT_VERSION)
        .header("heart-beat", format!("{},{}", heartbeat_out_ms, heartbeat_in_ms));
    match token {
        Some(token) => frame.header("Authorization", format!("Bearer {}", token)),
        None => frame,
    }
}

pub fn disconnect_frame() -> StompFrame {
    StompFrame::new(commands::DISCONNECT)
}

/// Per-user queue every status message is delivered on.
pub fn user_destination(user_id: &str) -> String {
    format!("/user/{}/queue/checkin-status", user_id)
}

/// SUBSCRIBE for one subject. `subject-type`/`subject-id` tell the server
/// which subject's changes to route to the user queue.
pub fn subscribe_frame(id: &str, user_id: &str, subscription: &Subscription) -> StompFrame {
    StompFrame::new(commands::SUBSCRIBE)
        .header("id", id)
        .header("destination", user_destination(user_id))
        .header("subject-type", subscription.subject_type.as_str())
        .header("subject-id", subscription.subject_id.as_str())
}

pub fn unsubscribe_frame(id: &str) -> StompFrame {
    StompFrame::new(commands::UNSUBSCRIBE).header("id", id)
}
