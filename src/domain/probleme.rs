use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Priorite, TypeTravaux};

/// A problem reported by a resident: location, work type, reporter, description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probleme {
    pub id: i64,
    pub lieu: String,
    pub type_travaux: TypeTravaux,
    pub description: String,
    /// Reporter's email address.
    pub declarant: String,
    pub date_signalement: DateTime<Utc>,
    pub priorite: Priorite,
    pub resolu: bool,
}

impl Probleme {
    pub fn new(
        id: i64,
        lieu: impl Into<String>,
        type_travaux: TypeTravaux,
        description: impl Into<String>,
        declarant: impl Into<String>,
    ) -> Self {
        Self {
            id,
            lieu: lieu.into(),
            type_travaux,
            description: description.into(),
            declarant: declarant.into(),
            date_signalement: Utc::now(),
            priorite: Priorite::Moyenne,
            resolu: false,
        }
    }
}
