use std::sync::Arc;

use chrono::NaiveDate;
use maville::app::{store_lock, CandidatureService, ProblemeService, ProjetService};
use maville::domain::{
    AbonnementPrestataire, CriterePrestataire, ChangeType, Priorite, StatutProjet, TypeTravaux,
};
use maville::notify::{ConnectionRegistry, EventFrame, NotificationDispatcher};
use maville::storage::{EntityStore, JsonStorage, MemoryStorage};

struct App {
    problemes: ProblemeService,
    candidatures: CandidatureService,
    projets: ProjetService,
    dispatcher: Arc<NotificationDispatcher>,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn EntityStore>,
}

fn app_with(store: Arc<dyn EntityStore>) -> App {
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), registry.clone()));
    let write_lock = store_lock();
    App {
        problemes: ProblemeService::new(store.clone(), dispatcher.clone(), write_lock.clone()),
        candidatures: CandidatureService::new(store.clone(), dispatcher.clone(), write_lock.clone()),
        projets: ProjetService::new(store.clone(), dispatcher.clone(), write_lock),
        dispatcher,
        registry,
        store,
    }
}

fn app() -> App {
    app_with(Arc::new(MemoryStorage::new()))
}

fn dates() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
    )
}

#[tokio::test]
async fn full_workflow_report_to_finished_project() {
    let app = app();

    // A resident reports; reporting auto-subscribes them to their quartier.
    let probleme = app
        .problemes
        .signaler(
            "3030 rue Masson, Rosemont",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule important",
            "alice@example.com",
        )
        .await
        .unwrap();
    assert_eq!(app.dispatcher.list_unread("stpm").await.unwrap().len(), 1);

    // STPM raises the priority.
    app.problemes
        .affecter_priorite(probleme.id, Priorite::Elevee)
        .await
        .unwrap();

    // A provider bids, STPM approves.
    let (debut, fin) = dates();
    let candidature = app
        .candidatures
        .soumettre("NEQ1", vec![probleme.id], "Réfection", 15000.0, debut, fin)
        .await
        .unwrap();
    let decision = app.candidatures.decider(candidature.id, true, None).await.unwrap();
    let projet = decision.projet.unwrap();
    assert_eq!(projet.statut, StatutProjet::Approuve);
    assert_eq!(projet.priorite, Priorite::Elevee);

    // The problem is now resolved and off the open list.
    assert!(app
        .problemes
        .lister_non_resolus(None, None)
        .await
        .unwrap()
        .is_empty());

    // The reporter hears about the project through their auto-subscription.
    let before = app
        .dispatcher
        .list_unread("alice@example.com")
        .await
        .unwrap()
        .len();
    assert!(before >= 1, "reporter should have heard about the new project");

    // Run the project to completion; each transition notifies the reporter.
    app.projets.demarrer(projet.id).await.unwrap();
    let fini = app.projets.terminer(projet.id).await.unwrap();
    assert_eq!(fini.statut, StatutProjet::Termine);
    assert!(fini.date_fin_reelle.is_some());

    let after = app
        .dispatcher
        .list_unread("alice@example.com")
        .await
        .unwrap()
        .len();
    assert_eq!(after, before + 2);
}

#[tokio::test]
async fn type_subscribed_provider_hears_only_matching_priorities() {
    let app = app();
    app.store
        .save_abonnements_prestataires(&[AbonnementPrestataire {
            neq: "NEQ-ROUTE".into(),
            critere: CriterePrestataire::TypeTravaux(TypeTravaux::TravauxRoutiers),
        }])
        .await
        .unwrap();

    let routier = app
        .problemes
        .signaler(
            "10 rue X, Plateau",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "a@b.c",
        )
        .await
        .unwrap();
    let paysager = app
        .problemes
        .signaler(
            "12 rue Y, Plateau",
            TypeTravaux::EntretienPaysager,
            "Haie envahissante",
            "a@b.c",
        )
        .await
        .unwrap();

    app.problemes
        .affecter_priorite(routier.id, Priorite::Elevee)
        .await
        .unwrap();
    app.problemes
        .affecter_priorite(paysager.id, Priorite::Elevee)
        .await
        .unwrap();

    let unread = app.dispatcher.list_unread("NEQ-ROUTE").await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].type_changement, ChangeType::PrioriteAffectee);
    assert_eq!(unread[0].probleme_id, Some(routier.id));
}

#[tokio::test]
async fn dead_connection_is_skipped_by_later_broadcasts() {
    let app = app();

    // Open then drop the receiver: the connection is dead but registered.
    drop(app.registry.open("stpm"));

    // Dispatch still succeeds and the registry heals itself.
    app.problemes
        .signaler(
            "10 rue X, Plateau",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "a@b.c",
        )
        .await
        .unwrap();
    assert!(!app.registry.is_connected("stpm"));

    // The record is still there for the polling fallback.
    assert_eq!(app.dispatcher.list_unread("stpm").await.unwrap().len(), 1);
}

#[tokio::test]
async fn live_subscriber_receives_push_frames() {
    let app = app();
    let mut sub = app.registry.open("stpm");
    let ack = sub.frames.recv().await.unwrap();
    assert_eq!(ack.kind, "connected");

    app.problemes
        .signaler(
            "10 rue X, Plateau",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "a@b.c",
        )
        .await
        .unwrap();

    let frame: EventFrame = sub.frames.recv().await.unwrap();
    assert_eq!(frame.kind, "notification");
    assert_eq!(frame.payload["type"], "NOUVEAU_PROBLEME");
}

#[tokio::test]
async fn concurrent_decision_and_priority_change_both_persist() {
    let app = app();
    let (debut, fin) = dates();

    let p1 = app
        .problemes
        .signaler(
            "10 rue X, Plateau",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "a@b.c",
        )
        .await
        .unwrap();
    let p2 = app
        .problemes
        .signaler(
            "12 rue Y, Plateau",
            TypeTravaux::EntretienPaysager,
            "Haie envahissante",
            "a@b.c",
        )
        .await
        .unwrap();
    let c = app
        .candidatures
        .soumettre("NEQ1", vec![p1.id], "Réfection", 1000.0, debut, fin)
        .await
        .unwrap();

    // Both use cases rewrite the problem collection. Run them at the
    // same time: neither write may be lost.
    let (decision, priorite) = tokio::join!(
        app.candidatures.decider(c.id, true, None),
        app.problemes.affecter_priorite(p2.id, Priorite::Elevee),
    );
    decision.unwrap();
    priorite.unwrap();

    assert!(app.problemes.obtenir(p1.id).await.unwrap().resolu);
    assert_eq!(
        app.problemes.obtenir(p2.id).await.unwrap().priorite,
        Priorite::Elevee
    );
}

#[tokio::test]
async fn reconnect_keeps_last_registration_live() {
    let app = app();

    // A reconnect replaces the first registration with a second one.
    let mut old = app.registry.open("stpm");
    let mut sub = app.registry.open("stpm");

    // The replaced stream sees its channel close, then tears itself down
    // the way the HTTP handler does. The fresh connection must survive.
    assert!(old.frames.recv().await.is_some()); // connected ack
    assert!(old.frames.recv().await.is_none());
    app.registry.close("stpm", old.generation);
    assert!(app.registry.is_connected("stpm"));

    assert_eq!(sub.frames.recv().await.unwrap().kind, "connected");
    app.problemes
        .signaler(
            "10 rue X, Plateau",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule",
            "a@b.c",
        )
        .await
        .unwrap();
    let frame = sub.frames.recv().await.unwrap();
    assert_eq!(frame.kind, "notification");
}

#[tokio::test]
async fn workflow_state_survives_json_storage_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (debut, fin) = dates();

    let projet_id = {
        let app = app_with(Arc::new(JsonStorage::open(dir.path()).unwrap()));
        let p = app
            .problemes
            .signaler(
                "3030 rue Masson, Rosemont",
                TypeTravaux::TravauxRoutiers,
                "Nid de poule",
                "alice@example.com",
            )
            .await
            .unwrap();
        let c = app
            .candidatures
            .soumettre("NEQ1", vec![p.id], "Réfection", 1000.0, debut, fin)
            .await
            .unwrap();
        let decision = app.candidatures.decider(c.id, true, None).await.unwrap();
        decision.projet.unwrap().id
    };

    // Fresh process over the same data directory.
    let app = app_with(Arc::new(JsonStorage::open(dir.path()).unwrap()));
    let projet = app.projets.obtenir(projet_id).await.unwrap();
    assert_eq!(projet.statut, StatutProjet::Approuve);

    // Transitions keep working, and new ids never collide with old ones.
    let demarre = app.projets.demarrer(projet_id).await.unwrap();
    assert_eq!(demarre.statut, StatutProjet::EnCours);
    let p2 = app
        .problemes
        .signaler(
            "99 rue Z, Verdun",
            TypeTravaux::EntretienUrbain,
            "Lampadaire brisé",
            "bob@example.com",
        )
        .await
        .unwrap();
    assert_eq!(p2.id, 2);
}
