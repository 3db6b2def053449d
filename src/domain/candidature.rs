use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::StatutCandidature;

/// A provider's bid to perform work on one or more reported problems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidature {
    pub id: i64,
    /// Provider business registration number (NEQ).
    pub prestataire: String,
    /// Targeted problem ids, in submission order. Never empty.
    pub problemes_vises: Vec<i64>,
    pub description_projet: String,
    pub cout_estime: f64,
    pub date_debut_prevue: NaiveDate,
    pub date_fin_prevue: NaiveDate,
    pub date_depot: DateTime<Utc>,
    pub statut: StatutCandidature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentaire_rejet: Option<String>,
}

impl Candidature {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        prestataire: impl Into<String>,
        problemes_vises: Vec<i64>,
        description_projet: impl Into<String>,
        cout_estime: f64,
        date_debut_prevue: NaiveDate,
        date_fin_prevue: NaiveDate,
    ) -> Self {
        Self {
            id,
            prestataire: prestataire.into(),
            problemes_vises,
            description_projet: description_projet.into(),
            cout_estime,
            date_debut_prevue,
            date_fin_prevue,
            date_depot: Utc::now(),
            statut: StatutCandidature::Soumise,
            commentaire_rejet: None,
        }
    }

    /// Updates and withdrawals are only allowed before the STPM decision.
    pub fn peut_etre_modifiee(&self) -> bool {
        self.statut == StatutCandidature::Soumise
    }

    pub fn peut_etre_annulee(&self) -> bool {
        self.statut == StatutCandidature::Soumise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Candidature {
        Candidature::new(
            1,
            "NEQ1234",
            vec![1, 2],
            "Réparation",
            5000.0,
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
        )
    }

    #[test]
    fn starts_soumise_and_modifiable() {
        let c = sample();
        assert_eq!(c.statut, StatutCandidature::Soumise);
        assert!(c.peut_etre_modifiee());
        assert!(c.peut_etre_annulee());
    }

    #[test]
    fn decided_candidature_is_frozen() {
        let mut c = sample();
        c.statut = StatutCandidature::Approuvee;
        assert!(!c.peut_etre_modifiee());
        assert!(!c.peut_etre_annulee());
    }
}
