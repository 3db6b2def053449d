use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::common::error::Result;

const BASE_URL: &str = "https://donnees.montreal.ca/api/3/action/datastore_search";
/// CKAN resource id of the "travaux en cours" dataset.
const RESOURCE_ID: &str = "cc41b532-f12d-40fb-9f55-eb58c9a2b12b";
const DEFAULT_LIMIT: usize = 100;

/// One row of the city's ongoing-works dataset, trimmed to the fields the
/// console displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravauxEnCours {
    #[serde(default, rename = "id")]
    pub reference: Option<String>,
    #[serde(default, rename = "boroughid")]
    pub arrondissement: Option<String>,
    #[serde(default, rename = "currentstatus")]
    pub statut: Option<String>,
    #[serde(default, rename = "reason_category")]
    pub motif: Option<String>,
    #[serde(default, rename = "organizationname")]
    pub organisation: Option<String>,
    #[serde(default, rename = "submittercategory")]
    pub demandeur: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatastoreResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<DatastoreResult>,
}

#[derive(Debug, Deserialize)]
struct DatastoreResult {
    #[serde(default)]
    records: Vec<TravauxEnCours>,
}

/// Read-only client for the Montréal CKAN datastore. Never sits on the
/// notification dispatch path.
pub struct MontrealApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for MontrealApiClient {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl MontrealApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    /// Fetches ongoing city works. Network or API failure degrades to a
    /// single simulated row so the console always has something to show.
    pub async fn lister_travaux(&self, limit: Option<usize>) -> Vec<TravauxEnCours> {
        match self.fetch(limit.unwrap_or(DEFAULT_LIMIT)).await {
            Ok(records) => {
                debug!(count = records.len(), "Travaux en cours récupérés");
                records
            }
            Err(e) => {
                warn!(error = %e, "Échec de l'API de Montréal, données simulées");
                vec![simulated_entry()]
            }
        }
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<TravauxEnCours>> {
        let response: DatastoreResponse = self
            .http
            .get(&self.base_url)
            .query(&[("resource_id", RESOURCE_ID), ("limit", &limit.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.success {
            warn!("Réponse CKAN non réussie");
        }
        Ok(response.result.map(|r| r.records).unwrap_or_default())
    }
}

fn simulated_entry() -> TravauxEnCours {
    TravauxEnCours {
        reference: Some("SIMULE-001".into()),
        arrondissement: Some("Ville-Marie".into()),
        statut: Some("En cours".into()),
        motif: Some("Réfection routière".into()),
        organisation: Some("Ville de Montréal".into()),
        demandeur: Some("Entrepreneur".into()),
    }
}
