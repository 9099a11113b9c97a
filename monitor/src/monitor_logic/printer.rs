//! One-line renderings of stream events for the terminal.

use chrono::Local;
use lib_checkin::{ChildStatusUpdate, ConnectionState, ServiceStatusUpdate, StatusNotification};

pub fn child_line(update: &ChildStatusUpdate) -> String {
    let previous = update
        .previous_status
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| "-".to_string());
    let at = update
        .service_id
        .as_deref()
        .map(|s| format!(" @ {}", s))
        .unwrap_or_default();
    format!(
        "[{}] child {}: {} -> {}{}",
        update.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        update.child_id,
        previous,
        update.new_status.label(),
        at
    )
}

pub fn service_line(update: &ServiceStatusUpdate) -> String {
    let max = update
        .max_capacity
        .map(|m| format!("/{}", m))
        .unwrap_or_default();
    format!(
        "[{}] service {}: {} -> {}{}",
        update.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        update.service_id,
        update.previous_capacity,
        update.new_capacity,
        max
    )
}

pub fn notification_line(notification: &StatusNotification) -> String {
    format!("** {}: {}", notification.title, notification.message)
}

pub fn state_line(state: &ConnectionState) -> String {
    format!("-- connection {}", state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lib_checkin::ChildStatus;

    #[test]
    fn test_child_line_shows_transition_and_service() {
        let update = ChildStatusUpdate {
            child_id: "c1".to_string(),
            previous_status: Some(ChildStatus::CheckedOut),
            new_status: ChildStatus::CheckedIn,
            service_id: Some("s1".to_string()),
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        };

        let line = child_line(&update);

        assert!(line.ends_with("child c1: checked out -> checked in @ s1"), "{}", line);
    }

    #[test]
    fn test_service_line_includes_max_when_known() {
        let update = ServiceStatusUpdate {
            service_id: "s1".to_string(),
            previous_capacity: 9,
            new_capacity: 10,
            max_capacity: Some(10),
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        };

        assert!(service_line(&update).ends_with("service s1: 9 -> 10/10"));
    }

    #[test]
    fn test_state_line() {
        let state = ConnectionState::Reconnecting { attempt: 2, max_attempts: 5 };
        assert_eq!(state_line(&state), "-- connection reconnecting (2/5)");
    }
}
