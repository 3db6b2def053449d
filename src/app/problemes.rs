use std::sync::Arc;
use tracing::info;

use super::StoreLock;
use crate::common::error::{MaVilleError, Result};
use crate::domain::{
    AbonnementResident, CritereResident, DomainEvent, Priorite, Probleme, TypeTravaux,
};
use crate::notify::quartier::extraire_quartier;
use crate::notify::NotificationDispatcher;
use crate::storage::EntityStore;

/// Problem registry use cases: resident reporting, STPM prioritization,
/// and filtered listing.
pub struct ProblemeService {
    store: Arc<dyn EntityStore>,
    dispatcher: Arc<NotificationDispatcher>,
    // Shared with the other services; see app module docs.
    write_lock: StoreLock,
}

impl ProblemeService {
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

    /// Records a resident's report. Also subscribes the reporter to their
    /// own quartier (deduplicated), so they hear about follow-up projects,
    /// and signals the STPM agent console.
    pub async fn signaler(
        &self,
        lieu: &str,
        type_travaux: TypeTravaux,
        description: &str,
        declarant: &str,
    ) -> Result<Probleme> {
        if lieu.trim().is_empty() {
            return Err(MaVilleError::Validation("le lieu est requis".into()));
        }
        if description.trim().is_empty() {
            return Err(MaVilleError::Validation("la description est requise".into()));
        }
        if declarant.trim().is_empty() {
            return Err(MaVilleError::Validation(
                "le courriel du déclarant est requis".into(),
            ));
        }

        let probleme = {
            let _guard = self.write_lock.lock().await;
            let mut problemes = self.store.load_problemes().await?;
            let id = self.store.next_probleme_id().await?;
            let probleme = Probleme::new(id, lieu, type_travaux, description, declarant);
            problemes.push(probleme.clone());
            self.store.save_problemes(&problemes).await?;

            let quartier = extraire_quartier(lieu);
            let abo = AbonnementResident {
                email: declarant.to_string(),
                critere: CritereResident::Quartier(quartier),
            };
            let mut abonnements = self.store.load_abonnements_residents().await?;
            if !abonnements.contains(&abo) {
                abonnements.push(abo);
                self.store.save_abonnements_residents(&abonnements).await?;
            }
            probleme
        };

        info!(id = probleme.id, lieu, "Nouveau problème signalé");
        self.dispatcher
            .publish(&DomainEvent::nouveau_probleme(
                probleme.id,
                lieu,
                type_travaux,
                format!("Nouveau problème signalé: {} à {}", type_travaux.label(), lieu),
            ))
            .await?;
        Ok(probleme)
    }

    /// STPM priority assignment. Propagates the new maximum to every
    /// project covering the problem, then alerts subscribed providers.
    pub async fn affecter_priorite(&self, id: i64, priorite: Priorite) -> Result<Probleme> {
        let (probleme, changed) = {
            let _guard = self.write_lock.lock().await;
            let mut problemes = self.store.load_problemes().await?;
            let p = problemes
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(MaVilleError::NotFound {
                    entity: "probleme",
                    id,
                })?;
            let changed = p.priorite != priorite;
            p.priorite = priorite;
            let snapshot = p.clone();
            if changed {
                self.store.save_problemes(&problemes).await?;

                let mut projets = self.store.load_projets().await?;
                let mut touched = false;
                for projet in projets
                    .iter_mut()
                    .filter(|pr| pr.problemes_vises.contains(&id))
                {
                    touched |= projet.recalculer_priorite(&problemes);
                }
                if touched {
                    self.store.save_projets(&projets).await?;
                }
            }
            (snapshot, changed)
        };

        if changed {
            info!(id, priorite = %priorite, "Priorité affectée");
            self.dispatcher
                .publish(&DomainEvent::priorite_affectee(
                    id,
                    probleme.lieu.clone(),
                    probleme.type_travaux,
                    format!(
                        "Priorité {} affectée au problème #{} ({})",
                        priorite.label(),
                        id,
                        probleme.lieu
                    ),
                ))
                .await?;
        }
        Ok(probleme)
    }

    pub async fn obtenir(&self, id: i64) -> Result<Probleme> {
        self.store
            .load_problemes()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or(MaVilleError::NotFound {
                entity: "probleme",
                id,
            })
    }

    pub async fn lister(&self) -> Result<Vec<Probleme>> {
        self.store.load_problemes().await
    }

    /// Open problems, optionally narrowed by quartier (substring on the
    /// address or equality with the extracted quartier) and work type
    /// (enum name, label, or any normalized variant).
    pub async fn lister_non_resolus(
        &self,
        quartier: Option<&str>,
        type_travaux: Option<&str>,
    ) -> Result<Vec<Probleme>> {
        let type_filtre = match type_travaux {
            Some(raw) => Some(TypeTravaux::parse(raw).ok_or_else(|| {
                MaVilleError::Validation(format!("type de travaux inconnu: {raw}"))
            })?),
            None => None,
        };

        let problemes = self.store.load_problemes().await?;
        Ok(problemes
            .into_iter()
            .filter(|p| !p.resolu)
            .filter(|p| match quartier {
                Some(q) => {
                    let q_lower = q.to_lowercase();
                    p.lieu.to_lowercase().contains(&q_lower)
                        || extraire_quartier(&p.lieu).eq_ignore_ascii_case(q)
                }
                None => true,
            })
            .filter(|p| match type_filtre {
                Some(t) => p.type_travaux == t,
                None => true,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ConnectionRegistry;
    use crate::storage::MemoryStorage;

    fn service() -> (ProblemeService, Arc<MemoryStorage>, Arc<NotificationDispatcher>) {
        let store = Arc::new(MemoryStorage::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            Arc::new(ConnectionRegistry::new()),
        ));
        (
            ProblemeService::new(store.clone(), dispatcher.clone(), crate::app::store_lock()),
            store,
            dispatcher,
        )
    }

    #[tokio::test]
    async fn signaler_assigns_id_and_notifies_stpm() {
        let (service, _, dispatcher) = service();
        let p = service
            .signaler(
                "3030 rue Masson, Rosemont",
                TypeTravaux::TravauxRoutiers,
                "Nid de poule",
                "alice@example.com",
            )
            .await
            .unwrap();
        assert_eq!(p.id, 1);
        assert_eq!(p.priorite, Priorite::Moyenne);
        assert_eq!(dispatcher.list_unread("stpm").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn signaler_auto_subscribes_reporter_once() {
        let (service, store, _) = service();
        for _ in 0..2 {
            service
                .signaler(
                    "3030 rue Masson, Rosemont",
                    TypeTravaux::TravauxRoutiers,
                    "Nid de poule",
                    "alice@example.com",
                )
                .await
                .unwrap();
        }
        let abos = store.load_abonnements_residents().await.unwrap();
        assert_eq!(abos.len(), 1);
        assert_eq!(
            abos[0].critere,
            CritereResident::Quartier("Rosemont".into())
        );
    }

    #[tokio::test]
    async fn signaler_rejects_blank_fields() {
        let (service, _, _) = service();
        let err = service
            .signaler("  ", TypeTravaux::TravauxRoutiers, "desc", "a@b.c")
            .await;
        assert!(matches!(err, Err(MaVilleError::Validation(_))));
    }

    #[tokio::test]
    async fn affecter_priorite_unknown_id() {
        let (service, _, _) = service();
        let err = service.affecter_priorite(42, Priorite::Elevee).await;
        assert!(matches!(
            err,
            Err(MaVilleError::NotFound { entity: "probleme", id: 42 })
        ));
    }

    #[tokio::test]
    async fn affecter_priorite_same_value_is_silent() {
        let (service, _, dispatcher) = service();
        let p = service
            .signaler(
                "10 rue X, Plateau",
                TypeTravaux::TravauxRoutiers,
                "desc",
                "a@b.c",
            )
            .await
            .unwrap();
        let before = dispatcher.list_unread("stpm").await.unwrap().len();
        service
            .affecter_priorite(p.id, Priorite::Moyenne)
            .await
            .unwrap();
        assert_eq!(dispatcher.list_unread("stpm").await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn lister_non_resolus_filters() {
        let (service, _, _) = service();
        service
            .signaler(
                "3030 rue Masson, Rosemont",
                TypeTravaux::TravauxRoutiers,
                "Nid de poule",
                "a@b.c",
            )
            .await
            .unwrap();
        service
            .signaler(
                "10 rue Wellington, Verdun",
                TypeTravaux::EntretienPaysager,
                "Arbre tombé",
                "b@c.d",
            )
            .await
            .unwrap();

        let rosemont = service
            .lister_non_resolus(Some("rosemont"), None)
            .await
            .unwrap();
        assert_eq!(rosemont.len(), 1);

        let paysager = service
            .lister_non_resolus(None, Some("Entretien paysager"))
            .await
            .unwrap();
        assert_eq!(paysager.len(), 1);
        assert_eq!(paysager[0].type_travaux, TypeTravaux::EntretienPaysager);

        let bad = service.lister_non_resolus(None, Some("inconnu")).await;
        assert!(matches!(bad, Err(MaVilleError::Validation(_))));
    }
}
