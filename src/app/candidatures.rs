use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

use super::StoreLock;
use crate::common::error::{MaVilleError, Result};
use crate::domain::{
    Candidature, ChangeType, DomainEvent, Projet, RecipientKind, StatutCandidature,
};
use crate::notify::NotificationDispatcher;
use crate::storage::EntityStore;

/// The STPM decision on a candidature: the updated record, plus the
/// project an approval created.
#[derive(Debug, Clone)]
pub struct Decision {
    pub candidature: Candidature,
    pub projet: Option<Projet>,
}

/// Candidature workflow: provider submission, STPM decision, and the
/// withdrawal/update window before the decision.
pub struct CandidatureService {
    store: Arc<dyn EntityStore>,
    dispatcher: Arc<NotificationDispatcher>,
    write_lock: StoreLock,
}

impl CandidatureService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        dispatcher: Arc<NotificationDispatcher>,
        write_lock: StoreLock,
    ) -> Self {
        Self {
            store,
            dispatcher,
            write_lock,
        }
    }

    pub async fn soumettre(
        &self,
        prestataire: &str,
        problemes_vises: Vec<i64>,
        description: &str,
        cout_estime: f64,
        date_debut: NaiveDate,
        date_fin: NaiveDate,
    ) -> Result<Candidature> {
        if prestataire.trim().is_empty() {
            return Err(MaVilleError::Validation("le NEQ est requis".into()));
        }
        valider_contenu(&problemes_vises, cout_estime, date_debut, date_fin)?;

        let _guard = self.write_lock.lock().await;
        let problemes = self.store.load_problemes().await?;
        for vise in &problemes_vises {
            if !problemes.iter().any(|p| p.id == *vise) {
                return Err(MaVilleError::NotFound {
                    entity: "probleme",
                    id: *vise,
                });
            }
        }

        let mut candidatures = self.store.load_candidatures().await?;
        let id = self.store.next_candidature_id().await?;
        let candidature = Candidature::new(
            id,
            prestataire,
            problemes_vises,
            description,
            cout_estime,
            date_debut,
            date_fin,
        );
        candidatures.push(candidature.clone());
        self.store.save_candidatures(&candidatures).await?;
        info!(id, prestataire, "Candidature soumise");
        Ok(candidature)
    }

    /// STPM decision, at most once per candidature. Approval resolves the
    /// targeted problems and creates exactly one project; rejection sends
    /// the comment straight to the provider.
    pub async fn decider(
        &self,
        id: i64,
        approuver: bool,
        commentaire: Option<String>,
    ) -> Result<Decision> {
        let decision = {
            let _guard = self.write_lock.lock().await;
            let mut candidatures = self.store.load_candidatures().await?;
            let candidature = candidatures
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or(MaVilleError::NotFound {
                    entity: "candidature",
                    id,
                })?;
            if candidature.statut != StatutCandidature::Soumise {
                return Err(MaVilleError::AlreadyProcessed(id));
            }

            if approuver {
                candidature.statut = StatutCandidature::Approuvee;
                let snapshot = candidature.clone();

                let mut problemes = self.store.load_problemes().await?;
                for p in problemes
                    .iter_mut()
                    .filter(|p| snapshot.problemes_vises.contains(&p.id))
                {
                    p.resolu = true;
                }
                let couverts: Vec<_> = problemes
                    .iter()
                    .filter(|p| snapshot.problemes_vises.contains(&p.id))
                    .cloned()
                    .collect();

                let projet_id = self.store.next_projet_id().await?;
                let projet = Projet::from_candidature(projet_id, &snapshot, &couverts);
                let mut projets = self.store.load_projets().await?;
                projets.push(projet.clone());

                self.store.save_problemes(&problemes).await?;
                self.store.save_projets(&projets).await?;
                self.store.save_candidatures(&candidatures).await?;
                Decision {
                    candidature: snapshot,
                    projet: Some(projet),
                }
            } else {
                candidature.statut = StatutCandidature::Rejetee;
                candidature.commentaire_rejet =
                    Some(commentaire.unwrap_or_else(|| "Candidature rejetée".into()));
                let snapshot = candidature.clone();
                self.store.save_candidatures(&candidatures).await?;
                Decision {
                    candidature: snapshot,
                    projet: None,
                }
            }
        };

        match &decision.projet {
            Some(projet) => {
                info!(id, projet_id = projet.id, "Candidature approuvée");
                self.dispatcher
                    .publish(&DomainEvent::nouveau_projet(
                        projet.id,
                        projet.localisation.clone(),
                        projet.type_travaux,
                        format!(
                            "Nouveau projet dans votre quartier: {}",
                            projet.description_projet
                        ),
                    ))
                    .await?;
            }
            None => {
                let c = &decision.candidature;
                info!(id, "Candidature rejetée");
                self.dispatcher
                    .notifier_direct(
                        &c.prestataire,
                        RecipientKind::Prestataire,
                        format!(
                            "Votre candidature #{} a été rejetée: {}",
                            c.id,
                            c.commentaire_rejet.as_deref().unwrap_or("")
                        ),
                        ChangeType::CandidatureRejetee,
                        None,
                    )
                    .await?;
            }
        }
        Ok(decision)
    }

    /// Provider withdrawal, only before the STPM decision.
    pub async fn annuler(&self, id: i64, prestataire: &str) -> Result<Candidature> {
        let _guard = self.write_lock.lock().await;
        let mut candidatures = self.store.load_candidatures().await?;
        let candidature = candidatures
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(MaVilleError::NotFound {
                entity: "candidature",
                id,
            })?;
        if candidature.prestataire != prestataire {
            return Err(MaVilleError::Validation(
                "cette candidature appartient à un autre prestataire".into(),
            ));
        }
        if !candidature.peut_etre_annulee() {
            return Err(MaVilleError::AlreadyProcessed(id));
        }
        candidature.statut = StatutCandidature::Annulee;
        let snapshot = candidature.clone();
        self.store.save_candidatures(&candidatures).await?;
        Ok(snapshot)
    }

    /// Provider update, only while the candidature is still SOUMISE.
    pub async fn modifier(
        &self,
        id: i64,
        prestataire: &str,
        description: Option<String>,
        cout_estime: Option<f64>,
        date_debut: Option<NaiveDate>,
        date_fin: Option<NaiveDate>,
    ) -> Result<Candidature> {
        let _guard = self.write_lock.lock().await;
        let mut candidatures = self.store.load_candidatures().await?;
        let candidature = candidatures
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(MaVilleError::NotFound {
                entity: "candidature",
                id,
            })?;
        if candidature.prestataire != prestataire {
            return Err(MaVilleError::Validation(
                "cette candidature appartient à un autre prestataire".into(),
            ));
        }
        if !candidature.peut_etre_modifiee() {
            return Err(MaVilleError::AlreadyProcessed(id));
        }

        if let Some(description) = description {
            candidature.description_projet = description;
        }
        if let Some(cout) = cout_estime {
            candidature.cout_estime = cout;
        }
        if let Some(debut) = date_debut {
            candidature.date_debut_prevue = debut;
        }
        if let Some(fin) = date_fin {
            candidature.date_fin_prevue = fin;
        }
        valider_contenu(
            &candidature.problemes_vises,
            candidature.cout_estime,
            candidature.date_debut_prevue,
            candidature.date_fin_prevue,
        )?;

        let snapshot = candidature.clone();
        self.store.save_candidatures(&candidatures).await?;
        Ok(snapshot)
    }

    pub async fn obtenir(&self, id: i64) -> Result<Candidature> {
        self.store
            .load_candidatures()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(MaVilleError::NotFound {
                entity: "candidature",
                id,
            })
    }

    pub async fn lister(&self) -> Result<Vec<Candidature>> {
        self.store.load_candidatures().await
    }

    pub async fn par_prestataire(&self, prestataire: &str) -> Result<Vec<Candidature>> {
        Ok(self
            .store
            .load_candidatures()
            .await?
            .into_iter()
            .filter(|c| c.prestataire == prestataire)
            .collect())
    }
}

fn valider_contenu(
    problemes_vises: &[i64],
    cout_estime: f64,
    date_debut: NaiveDate,
    date_fin: NaiveDate,
) -> Result<()> {
    if problemes_vises.is_empty() {
        return Err(MaVilleError::Validation(
            "au moins un problème doit être visé".into(),
        ));
    }
    if cout_estime <= 0.0 {
        return Err(MaVilleError::Validation(
            "le coût estimé doit être positif".into(),
        ));
    }
    if date_fin < date_debut {
        return Err(MaVilleError::Validation(
            "la date de fin précède la date de début".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priorite, StatutProjet, TypeTravaux};
    use crate::notify::ConnectionRegistry;
    use crate::storage::MemoryStorage;

    struct Fixture {
        service: CandidatureService,
        store: Arc<MemoryStorage>,
        dispatcher: Arc<NotificationDispatcher>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStorage::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            Arc::new(ConnectionRegistry::new()),
        ));
        let mut p1 = crate::domain::Probleme::new(
            1,
            "3030 rue Masson, Rosemont",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "alice@example.com",
        );
        p1.priorite = Priorite::Elevee;
        let p2 = crate::domain::Probleme::new(
            2,
            "3032 rue Masson, Rosemont",
            TypeTravaux::TravauxRoutiers,
            "Fissure",
            "bob@example.com",
        );
        store.save_problemes(&[p1, p2]).await.unwrap();
        Fixture {
            service: CandidatureService::new(
                store.clone(),
                dispatcher.clone(),
                crate::app::store_lock(),
            ),
            store,
            dispatcher,
        }
    }

    fn dates() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        )
    }

    #[tokio::test]
    async fn soumettre_validates_input() {
        let f = fixture().await;
        let (debut, fin) = dates();

        let empty = f
            .service
            .soumettre("NEQ1", vec![], "desc", 100.0, debut, fin)
            .await;
        assert!(matches!(empty, Err(MaVilleError::Validation(_))));

        let free = f
            .service
            .soumettre("NEQ1", vec![1], "desc", 0.0, debut, fin)
            .await;
        assert!(matches!(free, Err(MaVilleError::Validation(_))));

        let backwards = f
            .service
            .soumettre("NEQ1", vec![1], "desc", 100.0, fin, debut)
            .await;
        assert!(matches!(backwards, Err(MaVilleError::Validation(_))));

        let ghost = f
            .service
            .soumettre("NEQ1", vec![99], "desc", 100.0, debut, fin)
            .await;
        assert!(matches!(
            ghost,
            Err(MaVilleError::NotFound { entity: "probleme", id: 99 })
        ));
    }

    #[tokio::test]
    async fn approve_resolves_problems_and_creates_one_project() {
        let f = fixture().await;
        let (debut, fin) = dates();
        let c = f
            .service
            .soumettre("NEQ1", vec![1, 2], "Réfection", 12000.0, debut, fin)
            .await
            .unwrap();

        let decision = f.service.decider(c.id, true, None).await.unwrap();
        let projet = decision.projet.expect("approval creates a project");
        assert_eq!(projet.statut, StatutProjet::Approuve);
        assert_eq!(projet.priorite, Priorite::Elevee);
        assert_eq!(projet.nombre_rapports, 2);

        let problemes = f.store.load_problemes().await.unwrap();
        assert!(problemes.iter().all(|p| p.resolu));
        assert_eq!(f.store.load_projets().await.unwrap().len(), 1);

        // Deciding twice is rejected and no second project appears.
        let again = f.service.decider(c.id, true, None).await;
        assert!(matches!(again, Err(MaVilleError::AlreadyProcessed(_))));
        assert_eq!(f.store.load_projets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reject_notifies_provider_directly() {
        let f = fixture().await;
        let (debut, fin) = dates();
        let c = f
            .service
            .soumettre("NEQ1", vec![1], "Réfection", 100.0, debut, fin)
            .await
            .unwrap();

        let decision = f
            .service
            .decider(c.id, false, Some("Coût trop élevé".into()))
            .await
            .unwrap();
        assert!(decision.projet.is_none());
        assert_eq!(
            decision.candidature.commentaire_rejet.as_deref(),
            Some("Coût trop élevé")
        );

        let unread = f.dispatcher.list_unread("NEQ1").await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].type_changement, ChangeType::CandidatureRejetee);
    }

    #[tokio::test]
    async fn annuler_only_while_soumise_and_by_owner() {
        let f = fixture().await;
        let (debut, fin) = dates();
        let c = f
            .service
            .soumettre("NEQ1", vec![1], "desc", 100.0, debut, fin)
            .await
            .unwrap();

        let wrong_owner = f.service.annuler(c.id, "NEQ2").await;
        assert!(matches!(wrong_owner, Err(MaVilleError::Validation(_))));

        let cancelled = f.service.annuler(c.id, "NEQ1").await.unwrap();
        assert_eq!(cancelled.statut, StatutCandidature::Annulee);

        let again = f.service.annuler(c.id, "NEQ1").await;
        assert!(matches!(again, Err(MaVilleError::AlreadyProcessed(_))));
    }

    #[tokio::test]
    async fn modifier_applies_updates_and_revalidates() {
        let f = fixture().await;
        let (debut, fin) = dates();
        let c = f
            .service
            .soumettre("NEQ1", vec![1], "desc", 100.0, debut, fin)
            .await
            .unwrap();

        let updated = f
            .service
            .modifier(c.id, "NEQ1", Some("mieux".into()), Some(250.0), None, None)
            .await
            .unwrap();
        assert_eq!(updated.description_projet, "mieux");
        assert_eq!(updated.cout_estime, 250.0);

        let bad = f
            .service
            .modifier(c.id, "NEQ1", None, Some(-1.0), None, None)
            .await;
        assert!(matches!(bad, Err(MaVilleError::Validation(_))));

        f.service.decider(c.id, true, None).await.unwrap();
        let frozen = f
            .service
            .modifier(c.id, "NEQ1", Some("tard".into()), None, None, None)
            .await;
        assert!(matches!(frozen, Err(MaVilleError::AlreadyProcessed(_))));
    }
}
