use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::candidature::Candidature;
use super::enums::{Priorite, StatutProjet, TypeTravaux};
use super::probleme::Probleme;

/// A work project created from an approved candidature.
///
/// Transition guards are deliberately no-ops rather than errors: duplicate or
/// out-of-order client requests leave the project unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projet {
    pub id: i64,
    pub candidature_id: i64,
    pub problemes_vises: Vec<i64>,
    pub localisation: String,
    pub type_travaux: Option<TypeTravaux>,
    pub priorite: Priorite,
    pub statut: StatutProjet,
    pub date_debut_prevue: NaiveDate,
    pub date_fin_prevue: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_debut_reelle: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_fin_reelle: Option<NaiveDate>,
    pub prestataire: String,
    pub description_projet: String,
    pub cout: f64,
    pub date_creation: DateTime<Utc>,
    pub derniere_mise_a_jour: DateTime<Utc>,
    pub nombre_rapports: usize,
}

impl Projet {
    /// Seeds a project from an approved candidature and the problems it
    /// covers. Location and work type come from the first covered problem;
    /// priority is the maximum over all of them.
    pub fn from_candidature(id: i64, candidature: &Candidature, problemes: &[Probleme]) -> Self {
        let now = Utc::now();
        Self {
            id,
            candidature_id: candidature.id,
            problemes_vises: candidature.problemes_vises.clone(),
            localisation: problemes
                .first()
                .map(|p| p.lieu.clone())
                .unwrap_or_default(),
            type_travaux: problemes.first().map(|p| p.type_travaux),
            priorite: problemes
                .iter()
                .map(|p| p.priorite)
                .max()
                .unwrap_or_default(),
            statut: StatutProjet::Approuve,
            date_debut_prevue: candidature.date_debut_prevue,
            date_fin_prevue: candidature.date_fin_prevue,
            date_debut_reelle: None,
            date_fin_reelle: None,
            prestataire: candidature.prestataire.clone(),
            description_projet: candidature.description_projet.clone(),
            cout: candidature.cout_estime,
            date_creation: now,
            derniere_mise_a_jour: now,
            nombre_rapports: problemes.len(),
        }
    }

    fn touch(&mut self) {
        self.derniere_mise_a_jour = Utc::now();
    }

    /// APPROUVE -> EN_COURS; records the actual start date.
    pub fn demarrer(&mut self) -> bool {
        if self.statut != StatutProjet::Approuve {
            return false;
        }
        self.statut = StatutProjet::EnCours;
        self.date_debut_reelle = Some(Utc::now().date_naive());
        self.touch();
        true
    }

    /// EN_COURS -> SUSPENDU.
    pub fn suspendre(&mut self) -> bool {
        if self.statut != StatutProjet::EnCours {
            return false;
        }
        self.statut = StatutProjet::Suspendu;
        self.touch();
        true
    }

    /// SUSPENDU -> EN_COURS.
    pub fn reprendre(&mut self) -> bool {
        if self.statut != StatutProjet::Suspendu {
            return false;
        }
        self.statut = StatutProjet::EnCours;
        self.touch();
        true
    }

    /// EN_COURS -> TERMINE; records the actual end date.
    pub fn terminer(&mut self) -> bool {
        if self.statut != StatutProjet::EnCours {
            return false;
        }
        self.statut = StatutProjet::Termine;
        self.date_fin_reelle = Some(Utc::now().date_naive());
        self.touch();
        true
    }

    /// Administrative cancellation from any non-terminal state.
    pub fn annuler(&mut self) -> bool {
        if self.statut.is_terminal() {
            return false;
        }
        self.statut = StatutProjet::Annule;
        self.touch();
        true
    }

    /// Re-derives priority as the maximum over the covered problems.
    /// Called when a covered problem's priority is reassigned.
    pub fn recalculer_priorite(&mut self, problemes: &[Probleme]) -> bool {
        let nouvelle = problemes
            .iter()
            .filter(|p| self.problemes_vises.contains(&p.id))
            .map(|p| p.priorite)
            .max()
            .unwrap_or(self.priorite);
        if nouvelle == self.priorite {
            return false;
        }
        self.priorite = nouvelle;
        self.touch();
        true
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description_projet = description.into();
        self.touch();
    }

    pub fn est_actif(&self) -> bool {
        matches!(self.statut, StatutProjet::EnCours | StatutProjet::Approuve)
    }
}
