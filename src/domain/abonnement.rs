use serde::{Deserialize, Serialize};

use super::enums::TypeTravaux;

/// What a resident subscribes to: a quartier name or a street fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "valeur")]
pub enum CritereResident {
    #[serde(rename = "QUARTIER")]
    Quartier(String),
    #[serde(rename = "RUE")]
    Rue(String),
}

/// What a provider subscribes to: a quartier name or an exact work type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "valeur")]
pub enum CriterePrestataire {
    #[serde(rename = "QUARTIER")]
    Quartier(String),
    #[serde(rename = "TYPE_TRAVAUX")]
    TypeTravaux(TypeTravaux),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbonnementResident {
    pub email: String,
    #[serde(flatten)]
    pub critere: CritereResident,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbonnementPrestataire {
    /// Provider business registration number.
    pub neq: String,
    #[serde(flatten)]
    pub critere: CriterePrestataire,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_abonnement_wire_format() {
        let abo = AbonnementResident {
            email: "alice@example.com".into(),
            critere: CritereResident::Quartier("Plateau".into()),
        };
        let json = serde_json::to_value(&abo).unwrap();
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["type"], "QUARTIER");
        assert_eq!(json["valeur"], "Plateau");

        let back: AbonnementResident = serde_json::from_value(json).unwrap();
        assert_eq!(back, abo);
    }

    #[test]
    fn prestataire_type_travaux_round_trip() {
        let abo = AbonnementPrestataire {
            neq: "NEQ1234".into(),
            critere: CriterePrestataire::TypeTravaux(TypeTravaux::TravauxRoutiers),
        };
        let json = serde_json::to_value(&abo).unwrap();
        assert_eq!(json["type"], "TYPE_TRAVAUX");
        assert_eq!(json["valeur"], "TRAVAUX_ROUTIERS");
        let back: AbonnementPrestataire = serde_json::from_value(json).unwrap();
        assert_eq!(back, abo);
    }
}
