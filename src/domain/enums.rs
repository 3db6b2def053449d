use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority assigned by STPM agents. The derive order matters:
/// FAIBLE < MOYENNE < ELEVEE drives project priority derivation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priorite {
    Faible,
    #[default]
    Moyenne,
    Elevee,
}

impl Priorite {
    pub fn label(&self) -> &'static str {
        match self {
            Priorite::Faible => "Faible",
            Priorite::Moyenne => "Moyenne",
            Priorite::Elevee => "Élevée",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match normalize(value).as_str() {
            "faible" => Some(Priorite::Faible),
            "moyenne" => Some(Priorite::Moyenne),
            "elevee" | "élevée" => Some(Priorite::Elevee),
            _ => None,
        }
    }
}

impl fmt::Display for Priorite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The ten categories of municipal work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeTravaux {
    TravauxRoutiers,
    TravauxGazElectricite,
    ConstructionRenovation,
    EntretienPaysager,
    TravauxTransportsCommun,
    TravauxSignalisationEclairage,
    TravauxSouterrains,
    TravauxResidentiel,
    EntretienUrbain,
    EntretienReseauxTelecom,
}

impl TypeTravaux {
    pub const ALL: [TypeTravaux; 10] = [
        TypeTravaux::TravauxRoutiers,
        TypeTravaux::TravauxGazElectricite,
        TypeTravaux::ConstructionRenovation,
        TypeTravaux::EntretienPaysager,
        TypeTravaux::TravauxTransportsCommun,
        TypeTravaux::TravauxSignalisationEclairage,
        TypeTravaux::TravauxSouterrains,
        TypeTravaux::TravauxResidentiel,
        TypeTravaux::EntretienUrbain,
        TypeTravaux::EntretienReseauxTelecom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TypeTravaux::TravauxRoutiers => "TRAVAUX_ROUTIERS",
            TypeTravaux::TravauxGazElectricite => "TRAVAUX_GAZ_ELECTRICITE",
            TypeTravaux::ConstructionRenovation => "CONSTRUCTION_RENOVATION",
            TypeTravaux::EntretienPaysager => "ENTRETIEN_PAYSAGER",
            TypeTravaux::TravauxTransportsCommun => "TRAVAUX_TRANSPORTS_COMMUN",
            TypeTravaux::TravauxSignalisationEclairage => "TRAVAUX_SIGNALISATION_ECLAIRAGE",
            TypeTravaux::TravauxSouterrains => "TRAVAUX_SOUTERRAINS",
            TypeTravaux::TravauxResidentiel => "TRAVAUX_RESIDENTIEL",
            TypeTravaux::EntretienUrbain => "ENTRETIEN_URBAIN",
            TypeTravaux::EntretienReseauxTelecom => "ENTRETIEN_RESEAUX_TELECOM",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TypeTravaux::TravauxRoutiers => "Travaux routiers",
            TypeTravaux::TravauxGazElectricite => "Travaux de gaz ou électricité",
            TypeTravaux::ConstructionRenovation => "Construction ou rénovation",
            TypeTravaux::EntretienPaysager => "Entretien paysager",
            TypeTravaux::TravauxTransportsCommun => "Travaux liés aux transports en commun",
            TypeTravaux::TravauxSignalisationEclairage => "Travaux de signalisation et éclairage",
            TypeTravaux::TravauxSouterrains => "Travaux souterrains",
            TypeTravaux::TravauxResidentiel => "Travaux résidentiel",
            TypeTravaux::EntretienUrbain => "Entretien urbain",
            TypeTravaux::EntretienReseauxTelecom => "Entretien des réseaux de télécommunication",
        }
    }

    /// Accepts the enum name, the French label, or any case / underscore /
    /// whitespace-insensitive variant of either.
    pub fn parse(value: &str) -> Option<Self> {
        let wanted = normalize(value);
        Self::ALL.into_iter().find(|t| {
            normalize(t.name()) == wanted || normalize(t.label()) == wanted
        })
    }
}

impl fmt::Display for TypeTravaux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// SOUMISE -> APPROUVEE | REJETEE (STPM decision, at most once)
/// SOUMISE -> ANNULEE (provider withdrawal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatutCandidature {
    #[default]
    Soumise,
    Approuvee,
    Rejetee,
    Annulee,
}

impl StatutCandidature {
    pub fn label(&self) -> &'static str {
        match self {
            StatutCandidature::Soumise => "Soumise",
            StatutCandidature::Approuvee => "Approuvée",
            StatutCandidature::Rejetee => "Rejetée",
            StatutCandidature::Annulee => "Annulée",
        }
    }
}

/// EN_ATTENTE -> APPROUVE -> EN_COURS <-> SUSPENDU; EN_COURS -> TERMINE;
/// any non-terminal -> ANNULE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatutProjet {
    EnAttente,
    Approuve,
    EnCours,
    Suspendu,
    Termine,
    Annule,
}

impl StatutProjet {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatutProjet::Termine | StatutProjet::Annule)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatutProjet::EnAttente => "En attente",
            StatutProjet::Approuve => "Approuvé",
            StatutProjet::EnCours => "En cours",
            StatutProjet::Suspendu => "Suspendu",
            StatutProjet::Termine => "Terminé",
            StatutProjet::Annule => "Annulé",
        }
    }
}

/// Event tag carried by every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    NouveauProbleme,
    NouveauProjet,
    StatutChange,
    PrioriteAffectee,
    DateChange,
    CandidatureRejetee,
}

impl ChangeType {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeType::NouveauProbleme => "NOUVEAU_PROBLEME",
            ChangeType::NouveauProjet => "NOUVEAU_PROJET",
            ChangeType::StatutChange => "STATUT_CHANGE",
            ChangeType::PrioriteAffectee => "PRIORITE_AFFECTEE",
            ChangeType::DateChange => "DATE_CHANGE",
            ChangeType::CandidatureRejetee => "CANDIDATURE_REJETEE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecipientKind {
    Resident,
    Prestataire,
    Stpm,
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}
