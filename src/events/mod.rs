use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

/// The notification seam: membership and admission transitions are published
/// here as a side effect and consumers (activity projection, sockets) pick
/// them up asynchronously. Publishing never blocks the request path.
pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(name: String, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivityPayload {
    #[serde(rename = "new")]
    current: Value,
    severity: Severity,
}

/// Publish an activity event for any entity implementing `Loggable`.
/// Fire and forget: logging failures must not break the API.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);
    let severity = entity.severity_for_action(action);

    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        severity,
    };

    let event = DomainEvent::new(
        event_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(name: &str) -> &'static str {
    match name {
        "admission.requested" => "Admission requested",
        "admission.approved" => "Admission approved",
        "admission.rejected" => "Admission rejected",
        "admission.withdrawn" => "Admission withdrawn",
        "member.materialized" => "Member added to lab",
        "member.removed" => "Member removed from lab",
        "member.role_changed" => "Member role changed",
        "member.induction_toggled" => "Member induction flag toggled",
        "member.pci_set" => "Member PCI flag set",
        "member.status_set" => "Member status set",
        "user.registered" => "New user registered",
        _ => "System event",
    }
}

/// Drain the event bus into the `activity_log` projection table.
pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    while let Ok(event) = rx.recv().await {
        let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let actor_id = event
            .get("actor_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let subject_id = event
            .get("subject_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let occurred_at = event
            .get("occurred_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let severity = event
            .get("payload")
            .and_then(|p| p.get("severity"))
            .and_then(|s| s.as_str())
            .unwrap_or("important")
            .to_string();

        let properties = serde_json::to_string(&event).unwrap_or_default();

        let result = sqlx::query(
            "INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(describe(&name))
        .bind(actor_id)
        .bind(subject_id)
        .bind(occurred_at)
        .bind(&properties)
        .bind(&severity)
        .execute(&pool)
        .await;

        if let Err(e) = result {
            tracing::error!("failed to save activity log: {}", e);
        }
    }
}
