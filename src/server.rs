use axum::{
    extract::{Extension, Path, Query},
    http::{Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use futures::Stream;
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app::{
    store_lock, AbonnementService, CandidatureService, ProblemeService, ProjetService,
};
use crate::common::error::MaVilleError;
use crate::config::Config;
use crate::domain::{CriterePrestataire, CritereResident, Priorite, TypeTravaux};
use crate::infra::montreal::MontrealApiClient;
use crate::notify::{ConnectionRegistry, NotificationDispatcher};
use crate::storage::EntityStore;

/// Shared state behind every handler.
pub struct AppState {
    pub problemes: ProblemeService,
    pub candidatures: CandidatureService,
    pub projets: ProjetService,
    pub abonnements: AbonnementService,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub registry: Arc<ConnectionRegistry>,
    pub montreal: MontrealApiClient,
    pub idle_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, config: &Config) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), registry.clone()));
        // One lock across all services: they write each other's collections.
        let write_lock = store_lock();
        Arc::new(Self {
            problemes: ProblemeService::new(store.clone(), dispatcher.clone(), write_lock.clone()),
            candidatures: CandidatureService::new(
                store.clone(),
                dispatcher.clone(),
                write_lock.clone(),
            ),
            projets: ProjetService::new(store.clone(), dispatcher.clone(), write_lock.clone()),
            abonnements: AbonnementService::new(store, write_lock),
            dispatcher,
            registry,
            montreal: MontrealApiClient::default(),
            idle_timeout: Duration::from_secs(config.notifications.idle_timeout_minutes * 60),
        })
    }
}

struct ApiError(MaVilleError);

impl From<MaVilleError> for ApiError {
    fn from(e: MaVilleError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            MaVilleError::NotFound { .. } => StatusCode::NOT_FOUND,
            MaVilleError::Validation(_) => StatusCode::BAD_REQUEST,
            MaVilleError::AlreadyProcessed(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct Page<T> {
    items: Vec<T>,
    page: usize,
    size: usize,
    total: usize,
}

fn paginate<T>(mut items: Vec<T>, page: Option<usize>, size: Option<usize>) -> Page<T> {
    let total = items.len();
    let size = size.unwrap_or(50).max(1);
    let page = page.unwrap_or(0);
    let start = (page * size).min(total);
    let end = (start + size).min(total);
    items.truncate(end);
    let items = items.split_off(start);
    Page {
        items,
        page,
        size,
        total,
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "maville",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct SignalerRequest {
    lieu: String,
    type_travaux: String,
    description: String,
    declarant: String,
}

async fn signaler_probleme(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SignalerRequest>,
) -> ApiResult<impl IntoResponse> {
    let type_travaux = parse_type(&req.type_travaux)?;
    let probleme = state
        .problemes
        .signaler(&req.lieu, type_travaux, &req.description, &req.declarant)
        .await?;
    Ok((StatusCode::CREATED, Json(probleme)))
}

#[derive(Debug, Deserialize)]
struct ProblemeFilters {
    quartier: Option<String>,
    type_travaux: Option<String>,
    page: Option<usize>,
    size: Option<usize>,
}

async fn lister_problemes(
    Extension(state): Extension<Arc<AppState>>,
    Query(filters): Query<ProblemeFilters>,
) -> ApiResult<impl IntoResponse> {
    let problemes = state
        .problemes
        .lister_non_resolus(filters.quartier.as_deref(), filters.type_travaux.as_deref())
        .await?;
    Ok(Json(paginate(problemes, filters.page, filters.size)))
}

async fn obtenir_probleme(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.problemes.obtenir(id).await?))
}

#[derive(Debug, Deserialize)]
struct PrioriteRequest {
    priorite: String,
}

async fn affecter_priorite(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<PrioriteRequest>,
) -> ApiResult<impl IntoResponse> {
    let priorite = Priorite::parse(&req.priorite)
        .ok_or_else(|| MaVilleError::Validation(format!("priorité inconnue: {}", req.priorite)))?;
    Ok(Json(state.problemes.affecter_priorite(id, priorite).await?))
}

#[derive(Debug, Deserialize)]
struct SoumettreRequest {
    prestataire: String,
    problemes_vises: Vec<i64>,
    description: String,
    cout_estime: f64,
    date_debut_prevue: NaiveDate,
    date_fin_prevue: NaiveDate,
}

async fn soumettre_candidature(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SoumettreRequest>,
) -> ApiResult<impl IntoResponse> {
    let candidature = state
        .candidatures
        .soumettre(
            &req.prestataire,
            req.problemes_vises,
            &req.description,
            req.cout_estime,
            req.date_debut_prevue,
            req.date_fin_prevue,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(candidature)))
}

#[derive(Debug, Deserialize)]
struct CandidatureFilters {
    prestataire: Option<String>,
    page: Option<usize>,
    size: Option<usize>,
}

async fn lister_candidatures(
    Extension(state): Extension<Arc<AppState>>,
    Query(filters): Query<CandidatureFilters>,
) -> ApiResult<impl IntoResponse> {
    let candidatures = match filters.prestataire.as_deref() {
        Some(neq) => state.candidatures.par_prestataire(neq).await?,
        None => state.candidatures.lister().await?,
    };
    Ok(Json(paginate(candidatures, filters.page, filters.size)))
}

async fn obtenir_candidature(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.candidatures.obtenir(id).await?))
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    approuver: bool,
    commentaire: Option<String>,
}

async fn decider_candidature(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<impl IntoResponse> {
    let decision = state
        .candidatures
        .decider(id, req.approuver, req.commentaire)
        .await?;
    Ok(Json(serde_json::json!({
        "candidature": decision.candidature,
        "projet": decision.projet,
    })))
}

#[derive(Debug, Deserialize)]
struct AnnulationRequest {
    prestataire: String,
}

async fn annuler_candidature(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AnnulationRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.candidatures.annuler(id, &req.prestataire).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ModifierCandidatureRequest {
    prestataire: String,
    description: Option<String>,
    cout_estime: Option<f64>,
    date_debut_prevue: Option<NaiveDate>,
    date_fin_prevue: Option<NaiveDate>,
}

async fn modifier_candidature(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ModifierCandidatureRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .candidatures
            .modifier(
                id,
                &req.prestataire,
                req.description,
                req.cout_estime,
                req.date_debut_prevue,
                req.date_fin_prevue,
            )
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ProjetFilters {
    prestataire: Option<String>,
    actifs: Option<bool>,
    page: Option<usize>,
    size: Option<usize>,
}

async fn lister_projets(
    Extension(state): Extension<Arc<AppState>>,
    Query(filters): Query<ProjetFilters>,
) -> ApiResult<impl IntoResponse> {
    let projets = match (filters.prestataire.as_deref(), filters.actifs) {
        (Some(neq), _) => state.projets.par_prestataire(neq).await?,
        (None, Some(true)) => state.projets.lister_actifs().await?,
        _ => state.projets.lister().await?,
    };
    Ok(Json(paginate(projets, filters.page, filters.size)))
}

async fn obtenir_projet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.projets.obtenir(id).await?))
}

async fn demarrer_projet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.projets.demarrer(id).await?))
}

async fn suspendre_projet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.projets.suspendre(id).await?))
}

async fn reprendre_projet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.projets.reprendre(id).await?))
}

async fn terminer_projet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.projets.terminer(id).await?))
}

async fn annuler_projet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.projets.annuler(id).await?))
}

#[derive(Debug, Deserialize)]
struct DateFinRequest {
    date_fin_prevue: NaiveDate,
}

async fn replanifier_fin(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DateFinRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.projets.replanifier_fin(id, req.date_fin_prevue).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct DescriptionRequest {
    description: String,
}

async fn modifier_description_projet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DescriptionRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .projets
            .modifier_description(id, &req.description)
            .await?,
    ))
}

async fn abonner_resident(
    Extension(state): Extension<Arc<AppState>>,
    Path(email): Path<String>,
    Json(critere): Json<CritereResident>,
) -> ApiResult<impl IntoResponse> {
    let abo = state.abonnements.abonner_resident(&email, critere).await?;
    Ok((StatusCode::CREATED, Json(abo)))
}

async fn lister_abonnements_resident(
    Extension(state): Extension<Arc<AppState>>,
    Path(email): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.abonnements.abonnements_resident(&email).await?))
}

async fn abonner_prestataire(
    Extension(state): Extension<Arc<AppState>>,
    Path(neq): Path<String>,
    Json(critere): Json<CriterePrestataire>,
) -> ApiResult<impl IntoResponse> {
    let abo = state.abonnements.abonner_prestataire(&neq, critere).await?;
    Ok((StatusCode::CREATED, Json(abo)))
}

async fn lister_abonnements_prestataire(
    Extension(state): Extension<Arc<AppState>>,
    Path(neq): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.abonnements.abonnements_prestataire(&neq).await?))
}

async fn notifications_non_lues(
    Extension(state): Extension<Arc<AppState>>,
    Path(identifiant): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.dispatcher.list_unread(&identifiant).await?))
}

#[derive(Debug, Deserialize)]
struct LectureRequest {
    ids: Vec<i64>,
}

async fn marquer_lues(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<LectureRequest>,
) -> ApiResult<impl IntoResponse> {
    let flipped = state.dispatcher.mark_read(&req.ids).await?;
    Ok(Json(serde_json::json!({ "marquees": flipped })))
}

/// Live notification stream. The first frame is the "connected" ack; the
/// stream ends (and the registry entry goes away) after the idle timeout.
async fn flux_notifications(
    Extension(state): Extension<Arc<AppState>>,
    Path(identifiant): Path<String>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let subscription = state.registry.open(&identifiant);
    let registry = state.registry.clone();
    let idle = state.idle_timeout;
    info!(identifiant = %identifiant, "Flux de notifications ouvert");

    let stream = futures::stream::unfold(
        (subscription, registry, identifiant, idle),
        |(mut sub, registry, identifiant, idle)| async move {
            match tokio::time::timeout(idle, sub.frames.recv()).await {
                Ok(Some(frame)) => {
                    let event = Event::default()
                        .json_data(&frame)
                        .unwrap_or_else(|_| Event::default().data("{}"));
                    Some((Ok(event), (sub, registry, identifiant, idle)))
                }
                _ => {
                    // Idle timeout or channel closed: tear down this
                    // registration only, never a newer replacement.
                    registry.close(&identifiant, sub.generation);
                    None
                }
            }
        },
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct TravauxQuery {
    limit: Option<usize>,
}

async fn travaux_montreal(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<TravauxQuery>,
) -> impl IntoResponse {
    Json(state.montreal.lister_travaux(q.limit).await)
}

fn parse_type(raw: &str) -> Result<TypeTravaux, MaVilleError> {
    TypeTravaux::parse(raw)
        .ok_or_else(|| MaVilleError::Validation(format!("type de travaux inconnu: {raw}")))
}

/// Create the HTTP server with all routes
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/problemes", post(signaler_probleme).get(lister_problemes))
        .route("/api/problemes/:id", get(obtenir_probleme))
        .route("/api/problemes/:id/priorite", put(affecter_priorite))
        .route(
            "/api/candidatures",
            post(soumettre_candidature).get(lister_candidatures),
        )
        .route(
            "/api/candidatures/:id",
            get(obtenir_candidature).put(modifier_candidature),
        )
        .route("/api/candidatures/:id/decision", post(decider_candidature))
        .route("/api/candidatures/:id/annulation", post(annuler_candidature))
        .route("/api/projets", get(lister_projets))
        .route("/api/projets/:id", get(obtenir_projet))
        .route("/api/projets/:id/demarrer", post(demarrer_projet))
        .route("/api/projets/:id/suspendre", post(suspendre_projet))
        .route("/api/projets/:id/reprendre", post(reprendre_projet))
        .route("/api/projets/:id/terminer", post(terminer_projet))
        .route("/api/projets/:id/annuler", post(annuler_projet))
        .route("/api/projets/:id/date-fin", put(replanifier_fin))
        .route("/api/projets/:id/description", put(modifier_description_projet))
        .route(
            "/api/residents/:email/abonnements",
            post(abonner_resident).get(lister_abonnements_resident),
        )
        .route(
            "/api/prestataires/:neq/abonnements",
            post(abonner_prestataire).get(lister_abonnements_prestataire),
        )
        .route("/api/notifications/:identifiant", get(notifications_non_lues))
        .route("/api/notifications/lecture", post(marquer_lues))
        .route(
            "/api/notifications/stream/:identifiant",
            get(flux_notifications),
        )
        .route("/api/montreal/travaux", get(travaux_montreal))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the configured address
pub async fn start_server(state: Arc<AppState>, config: &Config) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!(%addr, "Serveur MaVille démarré");
    println!("Serveur MaVille: http://{addr}");
    println!("Health check:   http://{addr}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
