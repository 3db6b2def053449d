use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::common::error::Result;
use crate::domain::{ChangeType, DomainEvent, Notification, RecipientKind};
use crate::storage::EntityStore;

use super::matcher::{prestataires_concernes, residents_concernes};
use super::quartier::extraire_quartier;
use super::registry::{ConnectionRegistry, EventFrame};

/// Recipient of the STPM broadcast record.
const STPM: &str = "STPM";

/// Routes workflow events to subscribers: persists one notification per
/// recipient, then pushes the same payload over any live connection.
/// Persist-then-push, so a subscriber that is offline still finds the
/// notification when it polls.
pub struct NotificationDispatcher {
    store: Arc<dyn EntityStore>,
    registry: Arc<ConnectionRegistry>,
    // Serializes load-append-save on the notifications collection.
    write_lock: Mutex<()>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn EntityStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            write_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Fans an event out to its audience. Who hears what:
    /// new problem -> STPM; new project and status changes -> matched
    /// residents plus STPM; priority changes -> matched providers plus
    /// STPM; date changes -> matched residents only.
    pub async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let quartier = extraire_quartier(&event.lieu);
        let (residents, prestataires, stpm) = match event.change {
            ChangeType::NouveauProbleme => (false, false, true),
            ChangeType::NouveauProjet | ChangeType::StatutChange => (true, false, true),
            ChangeType::PrioriteAffectee => (false, true, true),
            ChangeType::DateChange => (true, false, false),
            // Rejections are personal, routed through notifier_direct.
            ChangeType::CandidatureRejetee => (false, false, false),
        };

        let mut recorded = Vec::new();
        {
            let _guard = self.write_lock.lock().await;
            let mut notifications = self.store.load_notifications().await?;

            if residents {
                let abos = self.store.load_abonnements_residents().await?;
                for email in residents_concernes(event, &abos) {
                    let id = self.store.next_notification_id().await?;
                    let n = Notification::new(
                        id,
                        email,
                        RecipientKind::Resident,
                        event.message.clone(),
                        event.change,
                        event.projet_id,
                        event.probleme_id,
                        Some(quartier.clone()),
                    );
                    notifications.push(n.clone());
                    recorded.push(n);
                }
            }
            if prestataires {
                let abos = self.store.load_abonnements_prestataires().await?;
                for neq in prestataires_concernes(event, &abos) {
                    let id = self.store.next_notification_id().await?;
                    let n = Notification::new(
                        id,
                        neq,
                        RecipientKind::Prestataire,
                        event.message.clone(),
                        event.change,
                        event.projet_id,
                        event.probleme_id,
                        Some(quartier.clone()),
                    );
                    notifications.push(n.clone());
                    recorded.push(n);
                }
            }
            if stpm {
                // One shared record for the agent console, not one per agent.
                let id = self.store.next_notification_id().await?;
                let n = Notification::new(
                    id,
                    STPM,
                    RecipientKind::Stpm,
                    event.message.clone(),
                    event.change,
                    event.projet_id,
                    event.probleme_id,
                    Some(quartier.clone()),
                );
                notifications.push(n.clone());
                recorded.push(n);
            }

            self.store.save_notifications(&notifications).await?;
        }

        info!(
            change = event.change.name(),
            quartier = %quartier,
            count = recorded.len(),
            "Dispatched notifications"
        );
        for n in &recorded {
            self.push(n);
        }
        Ok(())
    }

    /// Persists and pushes a notification addressed to one subscriber,
    /// used for candidature rejections.
    pub async fn notifier_direct(
        &self,
        destinataire: &str,
        kind: RecipientKind,
        message: impl Into<String>,
        change: ChangeType,
        projet_id: Option<i64>,
    ) -> Result<Notification> {
        let n = {
            let _guard = self.write_lock.lock().await;
            let mut notifications = self.store.load_notifications().await?;
            let id = self.store.next_notification_id().await?;
            let n = Notification::new(
                id,
                destinataire,
                kind,
                message,
                change,
                projet_id,
                None,
                None,
            );
            notifications.push(n.clone());
            self.store.save_notifications(&notifications).await?;
            n
        };
        debug!(destinataire, id = n.id, "Dispatched direct notification");
        self.push(&n);
        Ok(n)
    }

    fn push(&self, notification: &Notification) {
        let frame = EventFrame::notification(notification.payload());
        match notification.type_destinataire {
            // Every connected agent sees the shared STPM record.
            RecipientKind::Stpm => self.registry.send_to_group(RecipientKind::Stpm, &frame),
            _ => self.registry.send_to(&notification.destinataire, frame),
        }
    }

    /// Unread notifications for a subscriber, newest first. "stpm" reads
    /// the shared agent feed; anyone else reads records addressed to them.
    pub async fn list_unread(&self, identifier: &str) -> Result<Vec<Notification>> {
        let notifications = self.store.load_notifications().await?;
        let mut unread: Vec<Notification> = notifications
            .into_iter()
            .filter(|n| {
                !n.lu
                    && if identifier.eq_ignore_ascii_case(STPM) {
                        n.type_destinataire == RecipientKind::Stpm
                    } else {
                        n.destinataire == identifier
                    }
            })
            .collect();
        unread.sort_by(|a, b| b.date_creation.cmp(&a.date_creation));
        Ok(unread)
    }

    /// Flips notifications to read. Unknown or already-read ids are
    /// silently skipped; returns how many actually flipped.
    pub async fn mark_read(&self, ids: &[i64]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut notifications = self.store.load_notifications().await?;
        let mut flipped = 0;
        for n in notifications.iter_mut() {
            if !n.lu && ids.contains(&n.id) {
                n.lu = true;
                flipped += 1;
            }
        }
        if flipped > 0 {
            self.store.save_notifications(&notifications).await?;
        }
        Ok(flipped)
    }
}
