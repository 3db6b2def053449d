use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::{EntityStore, IdAllocator};
use crate::common::error::{MaVilleError, Result};
use crate::domain::{
    AbonnementPrestataire, AbonnementResident, Candidature, CriterePrestataire, CritereResident,
    Notification, Probleme, Projet, TypeTravaux,
};

/// Relational adapter. Same collection-level contract as the JSON adapter:
/// each save replaces the collection inside one transaction, so a failed save
/// never leaves a half-written table behind.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    ids: IdAllocator,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS problemes (
    id INTEGER PRIMARY KEY,
    lieu TEXT NOT NULL,
    type_travaux TEXT NOT NULL,
    description TEXT NOT NULL,
    declarant TEXT NOT NULL,
    date_signalement TEXT NOT NULL,
    priorite TEXT NOT NULL,
    resolu INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS candidatures (
    id INTEGER PRIMARY KEY,
    prestataire TEXT NOT NULL,
    problemes_vises TEXT NOT NULL,
    description_projet TEXT NOT NULL,
    cout_estime REAL NOT NULL,
    date_debut_prevue TEXT NOT NULL,
    date_fin_prevue TEXT NOT NULL,
    date_depot TEXT NOT NULL,
    statut TEXT NOT NULL,
    commentaire_rejet TEXT
);
CREATE TABLE IF NOT EXISTS projets (
    id INTEGER PRIMARY KEY,
    candidature_id INTEGER NOT NULL,
    problemes_vises TEXT NOT NULL,
    localisation TEXT NOT NULL,
    type_travaux TEXT,
    priorite TEXT NOT NULL,
    statut TEXT NOT NULL,
    date_debut_prevue TEXT NOT NULL,
    date_fin_prevue TEXT NOT NULL,
    date_debut_reelle TEXT,
    date_fin_reelle TEXT,
    prestataire TEXT NOT NULL,
    description_projet TEXT NOT NULL,
    cout REAL NOT NULL,
    date_creation TEXT NOT NULL,
    derniere_mise_a_jour TEXT NOT NULL,
    nombre_rapports INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS abonnements_residents (
    email TEXT NOT NULL,
    type TEXT NOT NULL,
    valeur TEXT NOT NULL,
    UNIQUE(email, type, valeur)
);
CREATE TABLE IF NOT EXISTS abonnements_prestataires (
    neq TEXT NOT NULL,
    type TEXT NOT NULL,
    valeur TEXT NOT NULL,
    UNIQUE(neq, type, valeur)
);
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY,
    destinataire TEXT NOT NULL,
    type_destinataire TEXT NOT NULL,
    message TEXT NOT NULL,
    type_changement TEXT NOT NULL,
    date_creation TEXT NOT NULL,
    lu INTEGER NOT NULL,
    projet_id INTEGER,
    probleme_id INTEGER,
    quartier TEXT
);
";

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let ids = IdAllocator::seeded(
            table_max_id(&conn, "problemes")?,
            table_max_id(&conn, "candidatures")?,
            table_max_id(&conn, "projets")?,
            table_max_id(&conn, "notifications")?,
        );
        debug!("Opened SQLite storage");
        Ok(Self {
            conn: Mutex::new(conn),
            ids,
        })
    }
}

fn table_max_id(conn: &Connection, table: &str) -> Result<i64> {
    let max: Option<i64> =
        conn.query_row(&format!("SELECT MAX(id) FROM {table}"), [], |row| row.get(0))?;
    Ok(max.unwrap_or(0))
}

/// Serializes a unit-variant enum to its wire tag ("ELEVEE", "EN_COURS", ...).
fn to_tag<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(MaVilleError::Storage(format!(
            "expected string tag, got {other}"
        ))),
    }
}

fn from_tag<T: DeserializeOwned>(tag: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        tag.to_string(),
    ))?)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| MaVilleError::Storage(format!("bad timestamp {s:?}: {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse()
        .map_err(|e| MaVilleError::Storage(format!("bad date {s:?}: {e}")))
}

#[async_trait]
impl EntityStore for SqliteStorage {
    async fn load_problemes(&self) -> Result<Vec<Probleme>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, lieu, type_travaux, description, declarant, date_signalement, priorite, resolu
             FROM problemes ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, bool>(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, lieu, tt, description, declarant, date, priorite, resolu)| {
                Ok(Probleme {
                    id,
                    lieu,
                    type_travaux: from_tag(&tt)?,
                    description,
                    declarant,
                    date_signalement: parse_datetime(&date)?,
                    priorite: from_tag(&priorite)?,
                    resolu,
                })
            })
            .collect()
    }

    async fn save_problemes(&self, problemes: &[Probleme]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM problemes", [])?;
        for p in problemes {
            tx.execute(
                "INSERT INTO problemes (id, lieu, type_travaux, description, declarant, date_signalement, priorite, resolu)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    p.id,
                    p.lieu,
                    to_tag(&p.type_travaux)?,
                    p.description,
                    p.declarant,
                    p.date_signalement.to_rfc3339(),
                    to_tag(&p.priorite)?,
                    p.resolu,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn load_candidatures(&self) -> Result<Vec<Candidature>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, prestataire, problemes_vises, description_projet, cout_estime,
                    date_debut_prevue, date_fin_prevue, date_depot, statut, commentaire_rejet
             FROM candidatures ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, prestataire, vises, description, cout, debut, fin, depot, statut, rejet)| {
                    Ok(Candidature {
                        id,
                        prestataire,
                        problemes_vises: serde_json::from_str(&vises)?,
                        description_projet: description,
                        cout_estime: cout,
                        date_debut_prevue: parse_date(&debut)?,
                        date_fin_prevue: parse_date(&fin)?,
                        date_depot: parse_datetime(&depot)?,
                        statut: from_tag(&statut)?,
                        commentaire_rejet: rejet,
                    })
                },
            )
            .collect()
    }

    async fn save_candidatures(&self, candidatures: &[Candidature]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM candidatures", [])?;
        for c in candidatures {
            tx.execute(
                "INSERT INTO candidatures (id, prestataire, problemes_vises, description_projet, cout_estime,
                        date_debut_prevue, date_fin_prevue, date_depot, statut, commentaire_rejet)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    c.id,
                    c.prestataire,
                    serde_json::to_string(&c.problemes_vises)?,
                    c.description_projet,
                    c.cout_estime,
                    c.date_debut_prevue.to_string(),
                    c.date_fin_prevue.to_string(),
                    c.date_depot.to_rfc3339(),
                    to_tag(&c.statut)?,
                    c.commentaire_rejet,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn load_projets(&self) -> Result<Vec<Projet>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, candidature_id, problemes_vises, localisation, type_travaux, priorite,
                    statut, date_debut_prevue, date_fin_prevue, date_debut_reelle, date_fin_reelle,
                    prestataire, description_projet, cout, date_creation, derniere_mise_a_jour,
                    nombre_rapports
             FROM projets ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, String>(11)?,
                    row.get::<_, String>(12)?,
                    row.get::<_, f64>(13)?,
                    row.get::<_, String>(14)?,
                    row.get::<_, String>(15)?,
                    row.get::<_, i64>(16)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(
                    id,
                    candidature_id,
                    vises,
                    localisation,
                    tt,
                    priorite,
                    statut,
                    debut_prevue,
                    fin_prevue,
                    debut_reelle,
                    fin_reelle,
                    prestataire,
                    description,
                    cout,
                    creation,
                    maj,
                    rapports,
                )| {
                    Ok(Projet {
                        id,
                        candidature_id,
                        problemes_vises: serde_json::from_str(&vises)?,
                        localisation,
                        type_travaux: tt.as_deref().map(from_tag::<TypeTravaux>).transpose()?,
                        priorite: from_tag(&priorite)?,
                        statut: from_tag(&statut)?,
                        date_debut_prevue: parse_date(&debut_prevue)?,
                        date_fin_prevue: parse_date(&fin_prevue)?,
                        date_debut_reelle: debut_reelle.as_deref().map(parse_date).transpose()?,
                        date_fin_reelle: fin_reelle.as_deref().map(parse_date).transpose()?,
                        prestataire,
                        description_projet: description,
                        cout,
                        date_creation: parse_datetime(&creation)?,
                        derniere_mise_a_jour: parse_datetime(&maj)?,
                        nombre_rapports: rapports as usize,
                    })
                },
            )
            .collect()
    }

    async fn save_projets(&self, projets: &[Projet]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM projets", [])?;
        for p in projets {
            tx.execute(
                "INSERT INTO projets (id, candidature_id, problemes_vises, localisation, type_travaux,
                        priorite, statut, date_debut_prevue, date_fin_prevue, date_debut_reelle,
                        date_fin_reelle, prestataire, description_projet, cout, date_creation,
                        derniere_mise_a_jour, nombre_rapports)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    p.id,
                    p.candidature_id,
                    serde_json::to_string(&p.problemes_vises)?,
                    p.localisation,
                    p.type_travaux.as_ref().map(to_tag).transpose()?,
                    to_tag(&p.priorite)?,
                    to_tag(&p.statut)?,
                    p.date_debut_prevue.to_string(),
                    p.date_fin_prevue.to_string(),
                    p.date_debut_reelle.map(|d| d.to_string()),
                    p.date_fin_reelle.map(|d| d.to_string()),
                    p.prestataire,
                    p.description_projet,
                    p.cout,
                    p.date_creation.to_rfc3339(),
                    p.derniere_mise_a_jour.to_rfc3339(),
                    p.nombre_rapports as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn load_abonnements_residents(&self) -> Result<Vec<AbonnementResident>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT email, type, valeur FROM abonnements_residents ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(email, kind, valeur)| {
                let critere = match kind.as_str() {
                    "QUARTIER" => CritereResident::Quartier(valeur),
                    "RUE" => CritereResident::Rue(valeur),
                    other => {
                        return Err(MaVilleError::Storage(format!(
                            "unknown resident subscription kind {other:?}"
                        )))
                    }
                };
                Ok(AbonnementResident { email, critere })
            })
            .collect()
    }

    async fn save_abonnements_residents(&self, abonnements: &[AbonnementResident]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM abonnements_residents", [])?;
        for a in abonnements {
            let (kind, valeur) = match &a.critere {
                CritereResident::Quartier(v) => ("QUARTIER", v.clone()),
                CritereResident::Rue(v) => ("RUE", v.clone()),
            };
            tx.execute(
                "INSERT OR IGNORE INTO abonnements_residents (email, type, valeur) VALUES (?1, ?2, ?3)",
                params![a.email, kind, valeur],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn load_abonnements_prestataires(&self) -> Result<Vec<AbonnementPrestataire>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT neq, type, valeur FROM abonnements_prestataires ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(neq, kind, valeur)| {
                let critere = match kind.as_str() {
                    "QUARTIER" => CriterePrestataire::Quartier(valeur),
                    "TYPE_TRAVAUX" => CriterePrestataire::TypeTravaux(from_tag(&valeur)?),
                    other => {
                        return Err(MaVilleError::Storage(format!(
                            "unknown provider subscription kind {other:?}"
                        )))
                    }
                };
                Ok(AbonnementPrestataire { neq, critere })
            })
            .collect()
    }

    async fn save_abonnements_prestataires(
        &self,
        abonnements: &[AbonnementPrestataire],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM abonnements_prestataires", [])?;
        for a in abonnements {
            let (kind, valeur) = match &a.critere {
                CriterePrestataire::Quartier(v) => ("QUARTIER", v.clone()),
                CriterePrestataire::TypeTravaux(t) => ("TYPE_TRAVAUX", to_tag(t)?),
            };
            tx.execute(
                "INSERT OR IGNORE INTO abonnements_prestataires (neq, type, valeur) VALUES (?1, ?2, ?3)",
                params![a.neq, kind, valeur],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn load_notifications(&self) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, destinataire, type_destinataire, message, type_changement, date_creation,
                    lu, projet_id, probleme_id, quartier
             FROM notifications ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, dest, kind, message, change, date, lu, projet_id, probleme_id, quartier)| {
                    Ok(Notification {
                        id,
                        destinataire: dest,
                        type_destinataire: from_tag(&kind)?,
                        message,
                        type_changement: from_tag(&change)?,
                        date_creation: parse_datetime(&date)?,
                        lu,
                        projet_id,
                        probleme_id,
                        quartier,
                    })
                },
            )
            .collect()
    }

    async fn save_notifications(&self, notifications: &[Notification]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notifications", [])?;
        for n in notifications {
            tx.execute(
                "INSERT INTO notifications (id, destinataire, type_destinataire, message,
                        type_changement, date_creation, lu, projet_id, probleme_id, quartier)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    n.id,
                    n.destinataire,
                    to_tag(&n.type_destinataire)?,
                    n.message,
                    to_tag(&n.type_changement)?,
                    n.date_creation.to_rfc3339(),
                    n.lu,
                    n.projet_id,
                    n.probleme_id,
                    n.quartier,
                ],
            )?;
        }
        tx.commit()?;
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
