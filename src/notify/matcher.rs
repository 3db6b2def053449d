use std::collections::BTreeSet;

use crate::domain::{
    AbonnementPrestataire, AbonnementResident, CriterePrestataire, CritereResident, DomainEvent,
};

use super::quartier::extraire_quartier;

/// Residents whose subscription covers the event location: quartier
/// equality (case-insensitive) or street-fragment containment against the
/// raw `lieu`. The set is deduplicated, one notification per person no
/// matter how many of their criteria fired.
pub fn residents_concernes(
    event: &DomainEvent,
    abonnements: &[AbonnementResident],
) -> Vec<String> {
    let quartier = extraire_quartier(&event.lieu);
    let lieu_lower = event.lieu.to_lowercase();
    let mut matched = BTreeSet::new();
    for abo in abonnements {
        let hit = match &abo.critere {
            CritereResident::Quartier(q) => q.eq_ignore_ascii_case(&quartier),
            CritereResident::Rue(rue) => {
                !rue.trim().is_empty() && lieu_lower.contains(&rue.to_lowercase())
            }
        };
        if hit {
            matched.insert(abo.email.clone());
        }
    }
    matched.into_iter().collect()
}

/// Providers whose subscription covers the event: quartier equality or
/// exact work-type match.
pub fn prestataires_concernes(
    event: &DomainEvent,
    abonnements: &[AbonnementPrestataire],
) -> Vec<String> {
    let quartier = extraire_quartier(&event.lieu);
    let mut matched = BTreeSet::new();
    for abo in abonnements {
        let hit = match &abo.critere {
            CriterePrestataire::Quartier(q) => q.eq_ignore_ascii_case(&quartier),
            CriterePrestataire::TypeTravaux(t) => event.type_travaux == Some(*t),
        };
        if hit {
            matched.insert(abo.neq.clone());
        }
    }
    matched.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TypeTravaux;

    fn event(lieu: &str, tt: Option<TypeTravaux>) -> DomainEvent {
        DomainEvent::nouveau_projet(1, lieu, tt, "msg")
    }

    #[test]
    fn resident_matches_by_quartier_case_insensitive() {
        let abos = vec![
            AbonnementResident {
                email: "alice@example.com".into(),
                critere: CritereResident::Quartier("rosemont".into()),
            },
            AbonnementResident {
                email: "bob@example.com".into(),
                critere: CritereResident::Quartier("Verdun".into()),
            },
        ];
        let matched = residents_concernes(&event("3030 rue Masson, Rosemont", None), &abos);
        assert_eq!(matched, vec!["alice@example.com".to_string()]);
    }

    #[test]
    fn resident_matches_by_street_fragment() {
        let abos = vec![AbonnementResident {
            email: "carol@example.com".into(),
            critere: CritereResident::Rue("rue masson".into()),
        }];
        let matched = residents_concernes(&event("3030 Rue Masson, Rosemont", None), &abos);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn resident_deduplicated_across_criteria() {
        let abos = vec![
            AbonnementResident {
                email: "alice@example.com".into(),
                critere: CritereResident::Quartier("Rosemont".into()),
            },
            AbonnementResident {
                email: "alice@example.com".into(),
                critere: CritereResident::Rue("Masson".into()),
            },
        ];
        let matched = residents_concernes(&event("3030 rue Masson, Rosemont", None), &abos);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn empty_street_fragment_never_matches() {
        let abos = vec![AbonnementResident {
            email: "dave@example.com".into(),
            critere: CritereResident::Rue("   ".into()),
        }];
        assert!(residents_concernes(&event("10 rue X, Plateau", None), &abos).is_empty());
    }

    #[test]
    fn prestataire_matches_by_type_travaux() {
        let abos = vec![
            AbonnementPrestataire {
                neq: "NEQ1".into(),
                critere: CriterePrestataire::TypeTravaux(TypeTravaux::TravauxRoutiers),
            },
            AbonnementPrestataire {
                neq: "NEQ2".into(),
                critere: CriterePrestataire::TypeTravaux(TypeTravaux::EntretienPaysager),
            },
        ];
        let matched = prestataires_concernes(
            &event("10 rue X, Plateau", Some(TypeTravaux::TravauxRoutiers)),
            &abos,
        );
        assert_eq!(matched, vec!["NEQ1".to_string()]);
    }

    #[test]
    fn prestataire_type_rule_requires_event_type() {
        let abos = vec![AbonnementPrestataire {
            neq: "NEQ1".into(),
            critere: CriterePrestataire::TypeTravaux(TypeTravaux::TravauxRoutiers),
        }];
        assert!(prestataires_concernes(&event("10 rue X, Plateau", None), &abos).is_empty());
    }
}
