use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{max_id, EntityStore, IdAllocator};
use crate::common::error::{MaVilleError, Result};
use crate::domain::{
    AbonnementPrestataire, AbonnementResident, Candidature, Notification, Probleme, Projet,
};

const PROBLEMES_FILE: &str = "problemes.json";
const CANDIDATURES_FILE: &str = "candidatures.json";
const PROJETS_FILE: &str = "projets.json";
const ABONNEMENTS_RESIDENTS_FILE: &str = "abonnements_residents.json";
const ABONNEMENTS_PRESTATAIRES_FILE: &str = "abonnements_prestataires.json";
const NOTIFICATIONS_FILE: &str = "notifications.json";

/// File-backed adapter: one JSON array per collection under a data directory.
/// A missing file reads as an empty collection, so a fresh data directory is
/// a valid first-run state.
pub struct JsonStorage {
    data_dir: PathBuf,
    ids: IdAllocator,
}

impl JsonStorage {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let problemes: Vec<Probleme> = read_collection(&data_dir.join(PROBLEMES_FILE))?;
        let candidatures: Vec<Candidature> = read_collection(&data_dir.join(CANDIDATURES_FILE))?;
        let projets: Vec<Projet> = read_collection(&data_dir.join(PROJETS_FILE))?;
        let notifications: Vec<Notification> = read_collection(&data_dir.join(NOTIFICATIONS_FILE))?;

        let ids = IdAllocator::seeded(
            max_id(&problemes, |p| p.id),
            max_id(&candidatures, |c| c.id),
            max_id(&projets, |p| p.id),
            max_id(&notifications, |n| n.id),
        );
        debug!(dir = %data_dir.display(), "Opened JSON storage");
        Ok(Self { data_dir, ids })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }
}

fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_collection<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(items)?;
    // Write through a temp file so a crash mid-write cannot truncate
    // already-committed data.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
        .map_err(|e| MaVilleError::Storage(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl EntityStore for JsonStorage {
    async fn load_problemes(&self) -> Result<Vec<Probleme>> {
        read_collection(&self.path(PROBLEMES_FILE))
    }

    async fn save_problemes(&self, problemes: &[Probleme]) -> Result<()> {
        write_collection(&self.path(PROBLEMES_FILE), problemes)
    }

    async fn load_candidatures(&self) -> Result<Vec<Candidature>> {
        read_collection(&self.path(CANDIDATURES_FILE))
    }

    async fn save_candidatures(&self, candidatures: &[Candidature]) -> Result<()> {
        write_collection(&self.path(CANDIDATURES_FILE), candidatures)
    }

    async fn load_projets(&self) -> Result<Vec<Projet>> {
        read_collection(&self.path(PROJETS_FILE))
    }

    async fn save_projets(&self, projets: &[Projet]) -> Result<()> {
        write_collection(&self.path(PROJETS_FILE), projets)
    }

    async fn load_abonnements_residents(&self) -> Result<Vec<AbonnementResident>> {
        read_collection(&self.path(ABONNEMENTS_RESIDENTS_FILE))
    }

    async fn save_abonnements_residents(&self, abonnements: &[AbonnementResident]) -> Result<()> {
        write_collection(&self.path(ABONNEMENTS_RESIDENTS_FILE), abonnements)
    }

    async fn load_abonnements_prestataires(&self) -> Result<Vec<AbonnementPrestataire>> {
        read_collection(&self.path(ABONNEMENTS_PRESTATAIRES_FILE))
    }

    async fn save_abonnements_prestataires(
        &self,
        abonnements: &[AbonnementPrestataire],
    ) -> Result<()> {
        write_collection(&self.path(ABONNEMENTS_PRESTATAIRES_FILE), abonnements)
    }

    async fn load_notifications(&self) -> Result<Vec<Notification>> {
        read_collection(&self.path(NOTIFICATIONS_FILE))
    }

    async fn save_notifications(&self, notifications: &[Notification]) -> Result<()> {
        write_collection(&self.path(NOTIFICATIONS_FILE), notifications)
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
