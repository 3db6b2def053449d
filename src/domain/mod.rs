mod abonnement;
mod candidature;
mod enums;
mod event;
mod notification;
mod probleme;
mod projet;

pub use abonnement::{AbonnementPrestataire, AbonnementResident, CriterePrestataire, CritereResident};
pub use candidature::Candidature;
pub use enums::{ChangeType, Priorite, RecipientKind, StatutCandidature, StatutProjet, TypeTravaux};
pub use event::DomainEvent;
pub use notification::Notification;
pub use probleme::Probleme;
pub use projet::Projet;
