use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("store error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait ReportRepo: Send + Sync {
    /// Upsert: an existing open report for `(creator_id, repo_id)` has
    /// its flagged-issue payload overwritten and its timestamp refreshed,
    /// keeping the same id. Historical closed reports are untouched.
    async fn create_report(&self, new: NewReport) -> RepoResult<Id>;
    async fn get_report(&self, id: Id) -> RepoResult<Report>;
    /// Absence is a normal outcome, not an error.
    async fn get_open_report(&self, creator_id: &str, repo_id: &str)
        -> RepoResult<Option<Report>>;
    async fn update_report(&self, id: Id, upd: UpdateReport) -> RepoResult<Report>;
    /// Deletes only the currently open report for the pair.
    async fn delete_open_report(&self, creator_id: &str, repo_id: &str)
        -> RepoResult<Option<Id>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn upsert_user(&self, user: User) -> RepoResult<User>;
}

pub trait Repo: ReportRepo + UserRepo {}

impl<T> Repo for T where T: ReportRepo + UserRepo {}

/// Flagged issues are unique by number within one report; later entries
/// win but keep the earlier position.
fn dedup_flagged(issues: Vec<FlaggedIssue>) -> Vec<FlaggedIssue> {
    let mut out: Vec<FlaggedIssue> = Vec::with_capacity(issues.len());
    for fi in issues {
        match out.iter_mut().find(|e| e.number == fi.number) {
            Some(existing) => *existing = fi,
            None => out.push(fi),
        }
    }
    out
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        reports: HashMap<Id, Report>,
        users: HashMap<String, User>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("REPOCLEANUP_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    tracing::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl ReportRepo for InMemRepo {
        async fn create_report(&self, new: NewReport) -> RepoResult<Id> {
            let flagged = dedup_flagged(new.flagged_issues);
            let mut s = self.state.write().unwrap();
            // The write lock is what serializes concurrent creates here;
            // the pg backend leans on its partial unique index instead.
            if let Some(existing) = s
                .reports
                .values_mut()
                .find(|r| r.is_open && r.creator_id == new.creator_id && r.repo_id == new.repo_id)
            {
                existing.flagged_issues = flagged;
                existing.date_created = Utc::now();
                let id = existing.report_id;
                drop(s);
                self.persist();
                return Ok(id);
            }
            let id = Self::next_id(&mut s);
            let report = Report {
                report_id: id,
                creator_id: new.creator_id,
                repo_id: new.repo_id,
                repo_owner_id: new.repo_owner_id,
                date_created: Utc::now(),
                is_open: true,
                flagged_issues: flagged,
            };
            s.reports.insert(id, report);
            drop(s);
            self.persist();
            Ok(id)
        }

        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            let s = self.state.read().unwrap();
            s.reports.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_open_report(
            &self,
            creator_id: &str,
            repo_id: &str,
        ) -> RepoResult<Option<Report>> {
            let s = self.state.read().unwrap();
            Ok(s.reports
                .values()
                .find(|r| r.is_open && r.creator_id == creator_id && r.repo_id == repo_id)
                .cloned())
        }

        async fn update_report(&self, id: Id, upd: UpdateReport) -> RepoResult<Report> {
            let mut s = self.state.write().unwrap();
            let report = s.reports.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(flagged) = upd.flagged_issues {
                report.flagged_issues = dedup_flagged(flagged);
            }
            if let Some(is_open) = upd.is_open {
                report.is_open = is_open;
            }
            let updated = report.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_open_report(
            &self,
            creator_id: &str,
            repo_id: &str,
        ) -> RepoResult<Option<Id>> {
            let mut s = self.state.write().unwrap();
            let id = s
                .reports
                .values()
                .find(|r| r.is_open && r.creator_id == creator_id && r.repo_id == repo_id)
                .map(|r| r.report_id);
            if let Some(id) = id {
                s.reports.remove(&id);
                drop(s);
                self.persist();
                return Ok(Some(id));
            }
            Ok(None)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn upsert_user(&self, user: User) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            s.users.insert(user.id.clone(), user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    #[derive(sqlx::FromRow)]
    struct ReportRow {
        reportid: Id,
        creatorid: String,
        repoid: String,
        repoownerid: String,
        datecreated: DateTime<Utc>,
        isopen: bool,
        flaggedissues: Json<Vec<FlaggedIssue>>,
    }

    impl From<ReportRow> for Report {
        fn from(r: ReportRow) -> Self {
            Report {
                report_id: r.reportid,
                creator_id: r.creatorid,
                repo_id: r.repoid,
                repo_owner_id: r.repoownerid,
                date_created: r.datecreated,
                is_open: r.isopen,
                flagged_issues: r.flaggedissues.0,
            }
        }
    }

    const REPORT_COLUMNS: &str =
        "reportid, creatorid, repoid, repoownerid, datecreated, isopen, flaggedissues";

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    #[async_trait]
    impl ReportRepo for PgRepo {
        async fn create_report(&self, new: NewReport) -> RepoResult<Id> {
            let flagged = dedup_flagged(new.flagged_issues);
            // Conflict target is the partial unique index on
            // (creatorid, repoid) WHERE isopen, so closed history rows
            // are never overwritten.
            let (id,): (Id,) = sqlx::query_as(
                r#"
                INSERT INTO reports (creatorid, repoid, repoownerid, flaggedissues)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (creatorid, repoid) WHERE isopen
                DO UPDATE SET
                    flaggedissues = EXCLUDED.flaggedissues,
                    datecreated = now()
                RETURNING reportid
                "#,
            )
            .bind(&new.creator_id)
            .bind(&new.repo_id)
            .bind(&new.repo_owner_id)
            .bind(Json(flagged))
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(id)
        }

        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            let row = sqlx::query_as::<_, ReportRow>(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE reportid = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(Report::from).ok_or(RepoError::NotFound)
        }

        async fn get_open_report(
            &self,
            creator_id: &str,
            repo_id: &str,
        ) -> RepoResult<Option<Report>> {
            let row = sqlx::query_as::<_, ReportRow>(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE creatorid = $1 AND repoid = $2 AND isopen"
            ))
            .bind(creator_id)
            .bind(repo_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            Ok(row.map(Report::from))
        }

        async fn update_report(&self, id: Id, upd: UpdateReport) -> RepoResult<Report> {
            let flagged = upd.flagged_issues.map(dedup_flagged);
            let row = sqlx::query_as::<_, ReportRow>(&format!(
                r#"
                UPDATE reports SET
                    flaggedissues = COALESCE($2, flaggedissues),
                    isopen = COALESCE($3, isopen)
                WHERE reportid = $1
                RETURNING {REPORT_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(flagged.map(Json))
            .bind(upd.is_open)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(Report::from).ok_or(RepoError::NotFound)
        }

        async fn delete_open_report(
            &self,
            creator_id: &str,
            repo_id: &str,
        ) -> RepoResult<Option<Id>> {
            let row: Option<(Id,)> = sqlx::query_as(
                "DELETE FROM reports WHERE creatorid = $1 AND repoid = $2 AND isopen RETURNING reportid",
            )
            .bind(creator_id)
            .bind(repo_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            Ok(row.map(|(id,)| id))
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn upsert_user(&self, user: User) -> RepoResult<User> {
            let row: (String, String, Option<String>) = sqlx::query_as(
                r#"
                INSERT INTO users (githubid, username, email)
                VALUES ($1, $2, $3)
                ON CONFLICT (githubid)
                DO UPDATE SET username = EXCLUDED.username, email = EXCLUDED.email
                RETURNING githubid, username, email
                "#,
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(User { id: row.0, username: row.1, email: row.2 })
        }
    }
}
