//! Use cases over the entity store: problem registry, candidature
//! workflow, project state machine, and subscription management. Every
//! read-modify-write cycle serializes through one shared lock, because
//! the services touch each other's collections (an approval resolves
//! problems and creates a project in one step).

use std::sync::Arc;
use tokio::sync::Mutex;

mod abonnements;
mod candidatures;
mod problemes;
mod projets;

pub use abonnements::AbonnementService;
pub use candidatures::{CandidatureService, Decision};
pub use problemes::ProblemeService;
pub use projets::ProjetService;

/// Shared transactional boundary across all store-backed use cases.
pub type StoreLock = Arc<Mutex<()>>;

pub fn store_lock() -> StoreLock {
    Arc::new(Mutex::new(()))
}
