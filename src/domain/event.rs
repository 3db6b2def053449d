use super::enums::{ChangeType, TypeTravaux};

/// A state transition produced by the workflow services and consumed by the
/// notification dispatcher. Carries just enough context for subscription
/// matching: the raw location string (quartier/street rules) and the
/// optional work type (provider rules).
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub change: ChangeType,
    pub message: String,
    pub lieu: String,
    pub type_travaux: Option<TypeTravaux>,
    pub projet_id: Option<i64>,
    pub probleme_id: Option<i64>,
}

impl DomainEvent {
    pub fn nouveau_probleme(probleme_id: i64, lieu: impl Into<String>, type_travaux: TypeTravaux, message: impl Into<String>) -> Self {
        Self {
            change: ChangeType::NouveauProbleme,
            message: message.into(),
            lieu: lieu.into(),
            type_travaux: Some(type_travaux),
            projet_id: None,
            probleme_id: Some(probleme_id),
        }
    }

    pub fn nouveau_projet(projet_id: i64, lieu: impl Into<String>, type_travaux: Option<TypeTravaux>, message: impl Into<String>) -> Self {
        Self {
            change: ChangeType::NouveauProjet,
            message: message.into(),
            lieu: lieu.into(),
            type_travaux,
            projet_id: Some(projet_id),
            probleme_id: None,
        }
    }

    pub fn statut_change(projet_id: i64, lieu: impl Into<String>, type_travaux: Option<TypeTravaux>, message: impl Into<String>) -> Self {
        Self {
            change: ChangeType::StatutChange,
            message: message.into(),
            lieu: lieu.into(),
            type_travaux,
            projet_id: Some(projet_id),
            probleme_id: None,
        }
    }

    pub fn priorite_affectee(probleme_id: i64, lieu: impl Into<String>, type_travaux: TypeTravaux, message: impl Into<String>) -> Self {
        Self {
            change: ChangeType::PrioriteAffectee,
            message: message.into(),
            lieu: lieu.into(),
            type_travaux: Some(type_travaux),
            projet_id: None,
            probleme_id: Some(probleme_id),
        }
    }

    pub fn date_change(projet_id: i64, lieu: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            change: ChangeType::DateChange,
            message: message.into(),
            lieu: lieu.into(),
            type_travaux: None,
            projet_id: Some(projet_id),
            probleme_id: None,
        }
    }
}
