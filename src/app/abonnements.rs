use std::sync::Arc;
use tracing::info;

use super::StoreLock;
use crate::common::error::{MaVilleError, Result};
use crate::domain::{
    AbonnementPrestataire, AbonnementResident, CriterePrestataire, CritereResident,
};
use crate::storage::EntityStore;

/// Explicit subscription management: residents pick a quartier or a
/// street fragment, providers pick a quartier or a work type. Creation
/// is deduplicated, so re-subscribing is a no-op.
pub struct AbonnementService {
    store: Arc<dyn EntityStore>,
    write_lock: StoreLock,
}

impl AbonnementService {
    pub fn new(store: Arc<dyn EntityStore>, write_lock: StoreLock) -> Self {
        Self { store, write_lock }
    }

    pub async fn abonner_resident(
        &self,
        email: &str,
        critere: CritereResident,
    ) -> Result<AbonnementResident> {
        if email.trim().is_empty() {
            return Err(MaVilleError::Validation("le courriel est requis".into()));
        }
        let valeur = match &critere {
            CritereResident::Quartier(v) | CritereResident::Rue(v) => v,
        };
        if valeur.trim().is_empty() {
            return Err(MaVilleError::Validation(
                "la valeur du critère est requise".into(),
            ));
        }

        let abo = AbonnementResident {
            email: email.to_string(),
            critere,
        };
        let _guard = self.write_lock.lock().await;
        let mut abonnements = self.store.load_abonnements_residents().await?;
        if !abonnements.contains(&abo) {
            abonnements.push(abo.clone());
            self.store.save_abonnements_residents(&abonnements).await?;
            info!(email, "Abonnement résident créé");
        }
        Ok(abo)
    }

    pub async fn abonnements_resident(&self, email: &str) -> Result<Vec<AbonnementResident>> {
        Ok(self
            .store
            .load_abonnements_residents()
            .await?
            .into_iter()
            .filter(|a| a.email == email)
            .collect())
    }

    pub async fn abonner_prestataire(
        &self,
        neq: &str,
        critere: CriterePrestataire,
    ) -> Result<AbonnementPrestataire> {
        if neq.trim().is_empty() {
            return Err(MaVilleError::Validation("le NEQ est requis".into()));
        }
        if let CriterePrestataire::Quartier(v) = &critere {
            if v.trim().is_empty() {
                return Err(MaVilleError::Validation(
                    "la valeur du critère est requise".into(),
                ));
            }
        }

        let abo = AbonnementPrestataire {
            neq: neq.to_string(),
            critere,
        };
        let _guard = self.write_lock.lock().await;
        let mut abonnements = self.store.load_abonnements_prestataires().await?;
        if !abonnements.contains(&abo) {
            abonnements.push(abo.clone());
            self.store
                .save_abonnements_prestataires(&abonnements)
                .await?;
            info!(neq, "Abonnement prestataire créé");
        }
        Ok(abo)
    }

    pub async fn abonnements_prestataire(
        &self,
        neq: &str,
    ) -> Result<Vec<AbonnementPrestataire>> {
        Ok(self
            .store
            .load_abonnements_prestataires()
            .await?
            .into_iter()
            .filter(|a| a.neq == neq)
            .collect())
    }
}
