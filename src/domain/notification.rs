use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::enums::{ChangeType, RecipientKind};

/// Persisted notification record. Never deleted; only `lu` ever flips,
/// so the store doubles as an audit trail and the polling fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    /// Resident email, prestataire NEQ, or "STPM".
    pub destinataire: String,
    pub type_destinataire: RecipientKind,
    pub message: String,
    pub type_changement: ChangeType,
    pub date_creation: DateTime<Utc>,
    pub lu: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projet_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probleme_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quartier: Option<String>,
}

impl Notification {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        destinataire: impl Into<String>,
        type_destinataire: RecipientKind,
        message: impl Into<String>,
        type_changement: ChangeType,
        projet_id: Option<i64>,
        probleme_id: Option<i64>,
        quartier: Option<String>,
    ) -> Self {
        Self {
            id,
            destinataire: destinataire.into(),
            type_destinataire,
            message: message.into(),
            type_changement,
            date_creation: Utc::now(),
            lu: false,
            projet_id,
            probleme_id,
            quartier,
        }
    }

    /// Wire envelope pushed over live connections:
    /// `{id, message, type, date (ISO-8601), projetId}`.
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "id": self.id.to_string(),
            "message": self.message,
            "type": self.type_changement.name(),
            "date": self.date_creation.to_rfc3339(),
            "projetId": self.projet_id,
        })
    }
}
