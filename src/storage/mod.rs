use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::common::error::Result;
use crate::domain::{
    AbonnementPrestataire, AbonnementResident, Candidature, Notification, Probleme, Projet,
};

mod json;
mod memory;
mod sqlite;

pub use json::JsonStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Durable records for every entity the workflow touches.
///
/// The contract is collection-level save/load plus monotonic id allocation.
/// Adapters must tolerate an empty backing store (first run) and
/// re-synchronize their id counters from the persisted maximum on open, so
/// ids survive process restarts without a hidden global counter.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn load_problemes(&self) -> Result<Vec<Probleme>>;
    async fn save_problemes(&self, problemes: &[Probleme]) -> Result<()>;

    async fn load_candidatures(&self) -> Result<Vec<Candidature>>;
    async fn save_candidatures(&self, candidatures: &[Candidature]) -> Result<()>;

    async fn load_projets(&self) -> Result<Vec<Projet>>;
    async fn save_projets(&self, projets: &[Projet]) -> Result<()>;

    async fn load_abonnements_residents(&self) -> Result<Vec<AbonnementResident>>;
    async fn save_abonnements_residents(&self, abonnements: &[AbonnementResident]) -> Result<()>;

    async fn load_abonnements_prestataires(&self) -> Result<Vec<AbonnementPrestataire>>;
    async fn save_abonnements_prestataires(
        &self,
        abonnements: &[AbonnementPrestataire],
    ) -> Result<()>;

    async fn load_notifications(&self) -> Result<Vec<Notification>>;
    async fn save_notifications(&self, notifications: &[Notification]) -> Result<()>;

    async fn next_probleme_id(&self) -> Result<i64>;
    async fn next_candidature_id(&self) -> Result<i64>;
    async fn next_projet_id(&self) -> Result<i64>;
    async fn next_notification_id(&self) -> Result<i64>;
}

/// Per-collection monotonic counters, seeded from the persisted maxima.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    problemes: AtomicI64,
    candidatures: AtomicI64,
    projets: AtomicI64,
    notifications: AtomicI64,
}

impl IdAllocator {
    pub(crate) fn seeded(
        max_probleme: i64,
        max_candidature: i64,
        max_projet: i64,
        max_notification: i64,
    ) -> Self {
        Self {
            problemes: AtomicI64::new(max_probleme),
            candidatures: AtomicI64::new(max_candidature),
            projets: AtomicI64::new(max_projet),
            notifications: AtomicI64::new(max_notification),
        }
    }

    pub(crate) fn next_probleme(&self) -> i64 {
        self.problemes.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_candidature(&self) -> i64 {
        self.candidatures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_projet(&self) -> i64 {
        self.projets.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_notification(&self) -> i64 {
        self.notifications.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub(crate) fn max_id<T>(items: &[T], id: impl Fn(&T) -> i64) -> i64 {
    items.iter().map(id).max().unwrap_or(0)
}
