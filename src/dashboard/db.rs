use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, Row, params};

use super::models::*;
use crate::board::dates::{format_date, parse_planned_date};
use crate::board::mutations::{NewProject, ProjectStore};

/// Async-safe handle to the dashboard database.
///
/// Wraps `DashboardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DashboardDb>>,
}

impl DbHandle {
    pub fn new(db: DashboardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DashboardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

#[async_trait]
impl ProjectStore for DbHandle {
    async fn insert_project(&self, project: NewProject) -> Result<i64> {
        self.call(move |db| db.create_project(&project).map(|p| p.id))
            .await
    }

    async fn insert_milestone(
        &self,
        project_id: i64,
        name: String,
        end_date: Option<NaiveDate>,
    ) -> Result<i64> {
        self.call(move |db| db.create_milestone(project_id, &name, end_date).map(|m| m.id))
            .await
    }
}

pub struct DashboardDb {
    conn: Connection,
}

fn to_sql_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(format_date)
}

fn from_sql_date(value: Option<String>) -> Option<NaiveDate> {
    value.as_deref().and_then(parse_planned_date)
}

const PROJECT_COLUMNS: &str =
    "id, name, client_name, project_type, description, status, start_date, end_date, created_at";

const SCHEDULE_COLUMNS: &str =
    "id, project_id, name, item_type, end_date, percent_complete, created_at";

struct ProjectRow {
    id: i64,
    name: String,
    client_name: String,
    project_type: String,
    description: String,
    status: String,
    start_date: Option<String>,
    end_date: Option<String>,
    created_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            client_name: row.get(2)?,
            project_type: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            start_date: row.get(6)?,
            end_date: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_project(self) -> Result<Project> {
        let status = ProjectStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Project {
            id: self.id,
            name: self.name,
            client_name: self.client_name,
            project_type: self.project_type,
            description: self.description,
            status,
            start_date: from_sql_date(self.start_date),
            end_date: from_sql_date(self.end_date),
            created_at: self.created_at,
        })
    }
}

struct ScheduleRow {
    id: i64,
    project_id: i64,
    name: String,
    item_type: String,
    end_date: Option<String>,
    percent_complete: i64,
    created_at: String,
}

impl ScheduleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            item_type: row.get(3)?,
            end_date: row.get(4)?,
            percent_complete: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_item(self) -> Result<ScheduleItem> {
        let item_type =
            ScheduleItemType::from_str(&self.item_type).map_err(|e| anyhow::anyhow!(e))?;
        Ok(ScheduleItem {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            item_type,
            end_date: from_sql_date(self.end_date),
            percent_complete: self.percent_complete.clamp(0, 100) as u32,
            created_at: self.created_at,
        })
    }
}

impl DashboardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    client_name TEXT NOT NULL,
                    project_type TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'not_started',
                    start_date TEXT,
                    end_date TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS schedule_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    item_type TEXT NOT NULL DEFAULT 'milestone',
                    end_date TEXT,
                    percent_complete INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_projects_client ON projects(client_name);
                CREATE INDEX IF NOT EXISTS idx_schedule_items_project ON schedule_items(project_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn create_project(&self, project: &NewProject) -> Result<Project> {
        self.conn
            .execute(
                "INSERT INTO projects (name, client_name, project_type, description, status, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    project.name,
                    project.client_name,
                    project.project_type,
                    project.description,
                    ProjectStatus::NotStarted.as_str(),
                    to_sql_date(project.start_date),
                    to_sql_date(project.end_date),
                ],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM projects ORDER BY id", PROJECT_COLUMNS))
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], ProjectRow::from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?.into_project()?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS))
            .context("Failed to prepare get_project")?;
        let mut rows = stmt
            .query_map(params![id], ProjectRow::from_row)
            .context("Failed to query project")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read project row")?.into_project()?)),
            None => Ok(None),
        }
    }

    pub fn update_project_status(&self, id: i64, status: ProjectStatus) -> Result<Option<Project>> {
        let changed = self
            .conn
            .execute(
                "UPDATE projects SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update project status")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_project(id)
    }

    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])
            .context("Failed to delete project")?;
        Ok(changed > 0)
    }

    // ── Schedule items ────────────────────────────────────────────────

    pub fn create_milestone(
        &self,
        project_id: i64,
        name: &str,
        end_date: Option<NaiveDate>,
    ) -> Result<ScheduleItem> {
        self.conn
            .execute(
                "INSERT INTO schedule_items (project_id, name, item_type, end_date, percent_complete)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                params![
                    project_id,
                    name,
                    ScheduleItemType::Milestone.as_str(),
                    to_sql_date(end_date),
                ],
            )
            .context("Failed to insert schedule item")?;
        let id = self.conn.last_insert_rowid();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM schedule_items WHERE id = ?1", SCHEDULE_COLUMNS))
            .context("Failed to prepare get_schedule_item")?;
        let row = stmt
            .query_row(params![id], ScheduleRow::from_row)
            .context("Schedule item not found after insert")?;
        row.into_item()
    }

    pub fn list_schedule(&self, project_id: i64) -> Result<Vec<ScheduleItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM schedule_items WHERE project_id = ?1 ORDER BY end_date IS NULL, end_date, id",
                SCHEDULE_COLUMNS
            ))
            .context("Failed to prepare list_schedule")?;
        let rows = stmt
            .query_map(params![project_id], ScheduleRow::from_row)
            .context("Failed to query schedule items")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read schedule item row")?.into_item()?);
        }
        Ok(items)
    }

    /// Milestone names scheduled for projects of `client` named `project`.
    pub fn milestone_names(&self, client: &str, project: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT s.name FROM schedule_items s
                 JOIN projects p ON p.id = s.project_id
                 WHERE p.client_name = ?1 AND p.name = ?2 AND s.item_type = 'milestone'
                 ORDER BY s.end_date IS NULL, s.end_date, s.id",
            )
            .context("Failed to prepare milestone_names")?;
        let rows = stmt
            .query_map(params![client, project], |row| row.get::<_, String>(0))
            .context("Failed to query milestone names")?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row.context("Failed to read milestone name")?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_project(client: &str, name: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            client_name: client.to_string(),
            project_type: name.to_string(),
            description: "Relaunch".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 10, 1),
            end_date: None,
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = DashboardDb::new_in_memory()?;
        let count: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('projects', 'schedule_items')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(count, 2);
        Ok(())
    }

    #[test]
    fn test_create_project() -> Result<()> {
        let db = DashboardDb::new_in_memory()?;
        let project = db.create_project(&new_project("Acme", "Website"))?;
        assert_eq!(project.name, "Website");
        assert_eq!(project.client_name, "Acme");
        assert_eq!(project.status, ProjectStatus::NotStarted);
        assert_eq!(project.start_date, NaiveDate::from_ymd_opt(2025, 10, 1));
        assert_eq!(project.end_date, None);
        assert!(!project.created_at.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_and_get_projects() -> Result<()> {
        let db = DashboardDb::new_in_memory()?;
        db.create_project(&new_project("Acme", "Website"))?;
        let second = db.create_project(&new_project("Globex", "Mobile App"))?;
        let all = db.list_projects()?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].client_name, "Globex");
        assert_eq!(db.get_project(second.id)?, Some(second));
        assert_eq!(db.get_project(999)?, None);
        Ok(())
    }

    #[test]
    fn test_update_project_status() -> Result<()> {
        let db = DashboardDb::new_in_memory()?;
        let project = db.create_project(&new_project("Acme", "Website"))?;
        let updated = db.update_project_status(project.id, ProjectStatus::OnHold)?;
        assert_eq!(updated.map(|p| p.status), Some(ProjectStatus::OnHold));
        assert_eq!(db.update_project_status(999, ProjectStatus::Completed)?, None);
        Ok(())
    }

    #[test]
    fn test_schedule_items_sorted_by_end_date() -> Result<()> {
        let db = DashboardDb::new_in_memory()?;
        let project = db.create_project(&new_project("Acme", "Website"))?;
        db.create_milestone(project.id, "Launch", NaiveDate::from_ymd_opt(2025, 12, 1))?;
        db.create_milestone(project.id, "Someday", None)?;
        let beta = db.create_milestone(project.id, "Beta", NaiveDate::from_ymd_opt(2025, 11, 1))?;
        assert_eq!(beta.item_type, ScheduleItemType::Milestone);
        assert_eq!(beta.percent_complete, 0);

        let names: Vec<_> = db
            .list_schedule(project.id)?
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Beta", "Launch", "Someday"]);
        Ok(())
    }

    #[test]
    fn test_milestone_names_match_client_and_project() -> Result<()> {
        let db = DashboardDb::new_in_memory()?;
        let site = db.create_project(&new_project("Acme", "Website"))?;
        let other = db.create_project(&new_project("Globex", "Website"))?;
        db.create_milestone(site.id, "Beta", None)?;
        db.create_milestone(other.id, "Other", None)?;

        assert_eq!(db.milestone_names("Acme", "Website")?, vec!["Beta"]);
        assert!(db.milestone_names("Acme", "Mobile App")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_project_cascades() -> Result<()> {
        let db = DashboardDb::new_in_memory()?;
        let project = db.create_project(&new_project("Acme", "Website"))?;
        db.create_milestone(project.id, "Beta", None)?;
        assert!(db.delete_project(project.id)?);
        assert!(db.list_schedule(project.id)?.is_empty());
        assert!(!db.delete_project(project.id)?);
        Ok(())
    }

    #[test]
    fn test_file_database_creates_parent_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("dashboard.db");
        DashboardDb::new(&path)?;
        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_implements_project_store() -> Result<()> {
        let handle = DbHandle::new(DashboardDb::new_in_memory()?);
        let id = handle.insert_project(new_project("Acme", "Website")).await?;
        let milestone = handle
            .insert_milestone(id, "Beta".into(), NaiveDate::from_ymd_opt(2025, 11, 1))
            .await?;
        let items = handle.call(move |db| db.list_schedule(id)).await?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, milestone);
        Ok(())
    }
}
