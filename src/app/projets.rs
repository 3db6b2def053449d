use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

use super::StoreLock;
use crate::common::error::{MaVilleError, Result};
use crate::domain::{DomainEvent, Projet};
use crate::notify::NotificationDispatcher;
use crate::storage::EntityStore;

/// Project state machine use cases. Guard violations are no-ops: the
/// project comes back unchanged and nothing is emitted.
pub struct ProjetService {
    store: Arc<dyn EntityStore>,
    dispatcher: Arc<NotificationDispatcher>,
    write_lock: StoreLock,
}

impl ProjetService {
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

    pub async fn demarrer(&self, id: i64) -> Result<Projet> {
        self.transition(id, "est maintenant en cours", Projet::demarrer)
            .await
    }

    pub async fn suspendre(&self, id: i64) -> Result<Projet> {
        self.transition(id, "est suspendu", Projet::suspendre).await
    }

    pub async fn reprendre(&self, id: i64) -> Result<Projet> {
        self.transition(id, "a repris", Projet::reprendre).await
    }

    pub async fn terminer(&self, id: i64) -> Result<Projet> {
        self.transition(id, "est terminé", Projet::terminer).await
    }

    pub async fn annuler(&self, id: i64) -> Result<Projet> {
        self.transition(id, "a été annulé", Projet::annuler).await
    }

    /// Applies a guarded transition. Saves and emits STATUT_CHANGE only
    /// when the guard let the transition through.
    async fn transition(
        &self,
        id: i64,
        verbe: &str,
        apply: impl FnOnce(&mut Projet) -> bool,
    ) -> Result<Projet> {
        let (projet, changed) = {
            let _guard = self.write_lock.lock().await;
            let mut projets = self.store.load_projets().await?;
            let projet = projets
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(MaVilleError::NotFound {
                    entity: "projet",
                    id,
                })?;
            let changed = apply(projet);
            let snapshot = projet.clone();
            if changed {
                self.store.save_projets(&projets).await?;
            }
            (snapshot, changed)
        };

        if changed {
            info!(id, statut = projet.statut.label(), "Transition de projet");
            self.dispatcher
                .publish(&DomainEvent::statut_change(
                    id,
                    projet.localisation.clone(),
                    projet.type_travaux,
                    format!("Le projet #{} {}", id, verbe),
                ))
                .await?;
        }
        Ok(projet)
    }

    /// Reschedules the planned end. Rejected when the new date precedes
    /// the planned start; an unchanged date is a no-op.
    pub async fn replanifier_fin(&self, id: i64, date_fin: NaiveDate) -> Result<Projet> {
        let (projet, changed) = {
            let _guard = self.write_lock.lock().await;
            let mut projets = self.store.load_projets().await?;
            let projet = projets
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(MaVilleError::NotFound {
                    entity: "projet",
                    id,
                })?;
            if date_fin < projet.date_debut_prevue {
                return Err(MaVilleError::Validation(
                    "la date de fin précède la date de début prévue".into(),
                ));
            }
            let changed = projet.date_fin_prevue != date_fin;
            if changed {
                projet.date_fin_prevue = date_fin;
                projet.derniere_mise_a_jour = chrono::Utc::now();
            }
            let snapshot = projet.clone();
            if changed {
                self.store.save_projets(&projets).await?;
            }
            (snapshot, changed)
        };

        if changed {
            info!(id, date_fin = %date_fin, "Fin de projet replanifiée");
            self.dispatcher
                .publish(&DomainEvent::date_change(
                    id,
                    projet.localisation.clone(),
                    format!("La date de fin du projet #{} est maintenant le {}", id, date_fin),
                ))
                .await?;
        }
        Ok(projet)
    }

    pub async fn modifier_description(&self, id: i64, description: &str) -> Result<Projet> {
        let _guard = self.write_lock.lock().await;
        let mut projets = self.store.load_projets().await?;
        let projet = projets
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(MaVilleError::NotFound {
                entity: "projet",
                id,
            })?;
        projet.set_description(description);
        let snapshot = projet.clone();
        self.store.save_projets(&projets).await?;
        Ok(snapshot)
    }

    pub async fn obtenir(&self, id: i64) -> Result<Projet> {
        self.store
            .load_projets()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or(MaVilleError::NotFound {
                entity: "projet",
                id,
            })
    }

    pub async fn lister(&self) -> Result<Vec<Projet>> {
        self.store.load_projets().await
    }

    /// Projects visible to residents: approved or under way.
    pub async fn lister_actifs(&self) -> Result<Vec<Projet>> {
        Ok(self
            .store
            .load_projets()
            .await?
            .into_iter()
            .filter(Projet::est_actif)
            .collect())
    }

    pub async fn par_prestataire(&self, prestataire: &str) -> Result<Vec<Projet>> {
        Ok(self
            .store
            .load_projets()
            .await?
            .into_iter()
            .filter(|p| p.prestataire == prestataire)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AbonnementResident, Candidature, CritereResident, Probleme, StatutProjet, TypeTravaux,
    };
    use crate::notify::ConnectionRegistry;
    use crate::storage::{EntityStore, MemoryStorage};

    async fn fixture() -> (ProjetService, Arc<NotificationDispatcher>) {
        let store = Arc::new(MemoryStorage::new());
        store
            .save_abonnements_residents(&[AbonnementResident {
                email: "alice@example.com".into(),
                critere: CritereResident::Quartier("Rosemont".into()),
            }])
            .await
            .unwrap();

        let candidature = Candidature::new(
            1,
            "NEQ1",
            vec![1],
            "Réfection",
            1000.0,
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        );
        let probleme = Probleme::new(
            1,
            "3030 rue Masson, Rosemont",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "alice@example.com",
        );
        let projet = Projet::from_candidature(1, &candidature, &[probleme]);
        store.save_projets(&[projet]).await.unwrap();

        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            Arc::new(ConnectionRegistry::new()),
        ));
        (
            ProjetService::new(store, dispatcher.clone(), crate::app::store_lock()),
            dispatcher,
        )
    }

    #[tokio::test]
    async fn transitions_emit_statut_change_to_matched_residents() {
        let (service, dispatcher) = fixture().await;
        let p = service.demarrer(1).await.unwrap();
        assert_eq!(p.statut, StatutProjet::EnCours);

        let unread = dispatcher.list_unread("alice@example.com").await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].projet_id, Some(1));
    }

    #[tokio::test]
    async fn guarded_noop_emits_nothing() {
        let (service, dispatcher) = fixture().await;
        // Suspend before start: guard refuses, no event.
        let p = service.suspendre(1).await.unwrap();
        assert_eq!(p.statut, StatutProjet::Approuve);
        assert!(dispatcher
            .list_unread("alice@example.com")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let (service, _) = fixture().await;
        service.demarrer(1).await.unwrap();
        service.suspendre(1).await.unwrap();
        service.reprendre(1).await.unwrap();
        let p = service.terminer(1).await.unwrap();
        assert_eq!(p.statut, StatutProjet::Termine);
        assert!(p.date_fin_reelle.is_some());
        assert!(service.lister_actifs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replanifier_fin_validates_and_emits_date_change() {
        let (service, dispatcher) = fixture().await;
        let too_early = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let err = service.replanifier_fin(1, too_early).await;
        assert!(matches!(err, Err(MaVilleError::Validation(_))));

        let new_end = NaiveDate::from_ymd_opt(2026, 11, 30).unwrap();
        let p = service.replanifier_fin(1, new_end).await.unwrap();
        assert_eq!(p.date_fin_prevue, new_end);

        let unread = dispatcher.list_unread("alice@example.com").await.unwrap();
        assert_eq!(unread.len(), 1);
        // DATE_CHANGE goes to residents only, never the agent console.
        assert!(dispatcher.list_unread("stpm").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let (service, _) = fixture().await;
        let err = service.demarrer(99).await;
        assert!(matches!(
            err,
            Err(MaVilleError::NotFound { entity: "projet", id: 99 })
        ));
    }
}
