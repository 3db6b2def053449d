use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

use super::{EntityStore, IdAllocator};
use crate::common::error::Result;
use crate::domain::{
    AbonnementPrestataire, AbonnementResident, Candidature, Notification, Probleme, Projet,
};

/// In-memory storage implementation for development/testing.
#[derive(Default)]
pub struct MemoryStorage {
    problemes: Mutex<Vec<Probleme>>,
    candidatures: Mutex<Vec<Candidature>>,
    projets: Mutex<Vec<Projet>>,
    abonnements_residents: Mutex<Vec<AbonnementResident>>,
    abonnements_prestataires: Mutex<Vec<AbonnementPrestataire>>,
    notifications: Mutex<Vec<Notification>>,
    ids: IdAllocator,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStorage {
    async fn load_problemes(&self) -> Result<Vec<Probleme>> {
        Ok(self.problemes.lock().unwrap().clone())
    }

    async fn save_problemes(&self, problemes: &[Probleme]) -> Result<()> {
        *self.problemes.lock().unwrap() = problemes.to_vec();
        debug!(count = problemes.len(), "Saved problemes");
        Ok(())
    }

    async fn load_candidatures(&self) -> Result<Vec<Candidature>> {
        Ok(self.candidatures.lock().unwrap().clone())
    }

    async fn save_candidatures(&self, candidatures: &[Candidature]) -> Result<()> {
        *self.candidatures.lock().unwrap() = candidatures.to_vec();
        debug!(count = candidatures.len(), "Saved candidatures");
        Ok(())
    }

    async fn load_projets(&self) -> Result<Vec<Projet>> {
        Ok(self.projets.lock().unwrap().clone())
    }

    async fn save_projets(&self, projets: &[Projet]) -> Result<()> {
        *self.projets.lock().unwrap() = projets.to_vec();
        debug!(count = projets.len(), "Saved projets");
        Ok(())
    }

    async fn load_abonnements_residents(&self) -> Result<Vec<AbonnementResident>> {
        Ok(self.abonnements_residents.lock().unwrap().clone())
    }

    async fn save_abonnements_residents(&self, abonnements: &[AbonnementResident]) -> Result<()> {
        *self.abonnements_residents.lock().unwrap() = abonnements.to_vec();
        Ok(())
    }

    async fn load_abonnements_prestataires(&self) -> Result<Vec<AbonnementPrestataire>> {
        Ok(self.abonnements_prestataires.lock().unwrap().clone())
    }

    async fn save_abonnements_prestataires(
        &self,
        abonnements: &[AbonnementPrestataire],
    ) -> Result<()> {
        *self.abonnements_prestataires.lock().unwrap() = abonnements.to_vec();
        Ok(())
    }

    async fn load_notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.notifications.lock().unwrap().clone())
    }

    async fn save_notifications(&self, notifications: &[Notification]) -> Result<()> {
        *self.notifications.lock().unwrap() = notifications.to_vec();
        Ok(())
    }

    async fn next_probleme_id(&self) -> Result<i64> {
        Ok(self.ids.next_probleme())
    }

    async fn next_candidature_id(&self) -> Result<i64> {
        Ok(self.ids.next_candidature())
    }

    async fn next_projet_id(&self) -> Result<i64> {
        Ok(self.ids.next_projet())
    }

    async fn next_notification_id(&self) -> Result<i64> {
        Ok(self.ids.next_notification())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TypeTravaux;

    #[tokio::test]
    async fn empty_store_loads_empty_collections() {
        let store = MemoryStorage::new();
        assert!(store.load_problemes().await.unwrap().is_empty());
        assert!(store.load_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let store = MemoryStorage::new();
        let a = store.next_probleme_id().await.unwrap();
        let b = store.next_probleme_id().await.unwrap();
        assert_eq!(b, a + 1);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = MemoryStorage::new();
        let p = Probleme::new(
            1,
            "10 Rue X, Plateau",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "alice@example.com",
        );
        store.save_problemes(&[p.clone()]).await.unwrap();
        let loaded = store.load_problemes().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, p.id);
        assert_eq!(loaded[0].lieu, p.lieu);
    }
}
