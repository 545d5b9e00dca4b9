//! Storage layer for taskdag: a single SQLite database.
//!
//! Row-level helpers take a `&Connection` so they compose inside a
//! transaction (`Transaction` derefs to `Connection`). [`SqlGraph`] exposes the
//! same connection to the graph engine.

use crate::graph::{GraphView, TaskSummary};
use crate::query::Filter;
use crate::types::{Edge, NewTask, Role, Status, Task, TaskId, User, UserId};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use eyre::{Context, Result};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params, params_from_iter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage directory name.
pub const TASKDAG_DIR: &str = ".taskdag";

/// SQLite database file.
pub const DB_FILE: &str = "taskdag.db";

/// Current schema version, stored in `meta`.
const SCHEMA_VERSION: &str = "1";

/// How long a writer waits for the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TASK_COLUMNS: &str =
    "t.id, t.title, t.description, t.status, t.due_date, t.assigned_to, t.created_by, t.created_at, t.updated_at";

/// Storage handle for reading/writing taskdag data.
pub struct Storage {
    root: PathBuf,
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(TASKDAG_DIR);
        fs::create_dir_all(&dir).context("Failed to create .taskdag directory")?;

        let storage = Self::connect(root)?;
        storage.init_schema()?;
        Ok(storage)
    }

    /// Open existing storage.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.join(TASKDAG_DIR).join(DB_FILE).exists() {
            eyre::bail!("No .taskdag store found in {}. Run 'td init' first.", root.display());
        }

        let storage = Self::connect(root)?;
        storage.init_schema()?;
        Ok(storage)
    }

    fn connect(root: &Path) -> Result<Self> {
        let db_path = root.join(TASKDAG_DIR).join(DB_FILE);
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        db.busy_timeout(BUSY_TIMEOUT).context("Failed to set busy timeout")?;
        db.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
            .context("Failed to configure SQLite")?;

        log::debug!("Opened database {}", db_path.display());

        Ok(Self {
            root: root.to_path_buf(),
            db,
        })
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL CHECK (role IN ('manager', 'user')),
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'completed', 'canceled')),
                    due_date TEXT,
                    assigned_to INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    created_by INTEGER NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks(assigned_to);

                CREATE TABLE IF NOT EXISTS task_dependencies (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    depends_on_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    UNIQUE (task_id, depends_on_task_id),
                    CHECK (task_id != depends_on_task_id)
                );
                CREATE INDEX IF NOT EXISTS idx_deps_depends_on ON task_dependencies(depends_on_task_id);

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
            "#,
            )
            .context("Failed to initialize schema")?;

        self.db
            .execute(
                "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?)",
                params![SCHEMA_VERSION],
            )
            .context("Failed to record schema version")?;

        Ok(())
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Plain connection for single-statement reads.
    pub fn conn(&self) -> &Connection {
        &self.db
    }

    /// Begin a write transaction. The write lock is taken immediately, so the
    /// reads performed inside it cannot be invalidated by another writer.
    pub fn write(&mut self) -> Result<Transaction<'_>> {
        self.db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin write transaction")
    }

    /// Begin a read transaction: every read inside it sees one snapshot.
    pub fn snapshot(&self) -> Result<Transaction<'_>> {
        self.db
            .unchecked_transaction()
            .context("Failed to begin read transaction")
    }
}

/// Graph view over a connection or an open transaction.
pub struct SqlGraph<'c> {
    conn: &'c Connection,
}

impl<'c> SqlGraph<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl GraphView for SqlGraph<'_> {
    fn task_exists(&self, id: TaskId) -> Result<bool> {
        task_exists(self.conn, id)
    }

    fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        dependency_ids(self.conn, id)
    }

    fn summary(&self, id: TaskId) -> Result<Option<TaskSummary>> {
        let summary = self
            .conn
            .query_row("SELECT id, title, status FROM tasks WHERE id = ?", params![id], |row| {
                Ok(TaskSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    status: parse_status(row, 2)?,
                })
            })
            .optional()?;
        Ok(summary)
    }

    fn task_ids(&self) -> Result<Vec<TaskId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM tasks ORDER BY id")?;
        let ids = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub fn insert_user(conn: &Connection, name: &str, role: Role, now: DateTime<Utc>) -> Result<User> {
    conn.execute(
        "INSERT INTO users (name, role, created_at) VALUES (?, ?, ?)",
        params![name, role.as_str(), format_timestamp(now)],
    )
    .context("Failed to insert user")?;

    Ok(User {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        role,
        created_at: now,
    })
}

pub fn get_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, role, created_at FROM users WHERE id = ?",
            params![id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_user_by_name(conn: &Connection, name: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, role, created_at FROM users WHERE name = ?",
            params![name],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, name, role, created_at FROM users ORDER BY id")?;
    let users = stmt.query_map([], row_to_user)?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

pub fn user_exists(conn: &Connection, id: UserId) -> Result<bool> {
    let exists = conn.query_row("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)", params![id], |row| {
        row.get(0)
    })?;
    Ok(exists)
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Insert a task row with status `pending`. Dependencies are not touched.
pub fn insert_task(conn: &Connection, created_by: UserId, new: &NewTask, now: DateTime<Utc>) -> Result<Task> {
    conn.execute(
        r#"
        INSERT INTO tasks (title, description, status, due_date, assigned_to, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            new.title,
            new.description,
            Status::Pending.as_str(),
            new.due_date.map(format_date),
            new.assigned_to,
            created_by,
            format_timestamp(now),
            format_timestamp(now),
        ],
    )
    .context("Failed to insert task")?;

    Ok(Task {
        id: conn.last_insert_rowid(),
        title: new.title.clone(),
        description: new.description.clone(),
        status: Status::Pending,
        due_date: new.due_date,
        assigned_to: new.assigned_to,
        created_by,
        created_at: now,
        updated_at: now,
    })
}

/// Write every mutable field of `task`.
pub fn write_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        r#"
        UPDATE tasks
        SET title = ?, description = ?, status = ?, due_date = ?, assigned_to = ?, updated_at = ?
        WHERE id = ?
        "#,
        params![
            task.title,
            task.description,
            task.status.as_str(),
            task.due_date.map(format_date),
            task.assigned_to,
            format_timestamp(task.updated_at),
            task.id,
        ],
    )
    .context("Failed to update task")?;
    Ok(())
}

/// Set a task's status. Returns false if the task does not exist.
pub fn set_status(conn: &Connection, id: TaskId, status: Status, now: DateTime<Utc>) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), format_timestamp(now), id],
        )
        .context("Failed to update task status")?;
    Ok(changed > 0)
}

/// Delete a task; its edges go with it. Returns false if it did not exist.
pub fn delete_task(conn: &Connection, id: TaskId) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM tasks WHERE id = ?", params![id])
        .context("Failed to delete task")?;
    Ok(deleted > 0)
}

pub fn get_task(conn: &Connection, id: TaskId) -> Result<Option<Task>> {
    let sql = format!("SELECT {} FROM tasks t WHERE t.id = ?", TASK_COLUMNS);
    let task = conn.query_row(&sql, params![id], row_to_task).optional()?;
    Ok(task)
}

pub fn task_exists(conn: &Connection, id: TaskId) -> Result<bool> {
    let exists = conn.query_row("SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?)", params![id], |row| {
        row.get(0)
    })?;
    Ok(exists)
}

/// Tasks matching a filter, newest first.
pub fn query_tasks(conn: &Connection, filter: &Filter) -> Result<Vec<Task>> {
    let (clause, values) = filter_clause(filter);
    let sql = format!(
        "SELECT {} FROM tasks t{} ORDER BY t.created_at DESC, t.id DESC",
        TASK_COLUMNS, clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params_from_iter(values), row_to_task)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Count tasks matching a filter.
pub fn count_tasks(conn: &Connection, filter: &Filter) -> Result<usize> {
    let (clause, values) = filter_clause(filter);
    let sql = format!("SELECT COUNT(*) FROM tasks t{}", clause);
    let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
    Ok(count as usize)
}

fn filter_clause(filter: &Filter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("t.status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(user) = filter.assigned_to {
        conditions.push("t.assigned_to = ?");
        values.push(Value::Integer(user));
    }
    if let Some(from) = filter.due_from {
        conditions.push("t.due_date >= ?");
        values.push(Value::Text(format_date(from)));
    }
    if let Some(to) = filter.due_to {
        conditions.push("t.due_date <= ?");
        values.push(Value::Text(format_date(to)));
    }
    if let Some(text) = &filter.title_contains {
        conditions.push("instr(lower(t.title), lower(?)) > 0");
        values.push(Value::Text(text.clone()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

/// Active tasks whose direct dependencies are all completed.
pub fn ready_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM tasks t
        WHERE t.status IN ('pending', 'in_progress')
        AND NOT EXISTS (
            SELECT 1 FROM task_dependencies d
            JOIN tasks dep ON d.depends_on_task_id = dep.id
            WHERE d.task_id = t.id AND dep.status != 'completed'
        )
        ORDER BY t.id
        "#,
        TASK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt.query_map([], row_to_task)?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Active tasks with at least one incomplete direct dependency.
pub fn blocked_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM tasks t
        WHERE t.status IN ('pending', 'in_progress')
        AND EXISTS (
            SELECT 1 FROM task_dependencies d
            JOIN tasks dep ON d.depends_on_task_id = dep.id
            WHERE d.task_id = t.id AND dep.status != 'completed'
        )
        ORDER BY t.id
        "#,
        TASK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt.query_map([], row_to_task)?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Ids `task_id` depends on, in insertion order.
pub fn dependency_ids(conn: &Connection, task_id: TaskId) -> Result<Vec<TaskId>> {
    let mut stmt = conn.prepare("SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ? ORDER BY id")?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Tasks `task_id` depends on.
pub fn dependency_tasks(conn: &Connection, task_id: TaskId) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM task_dependencies d
        JOIN tasks t ON d.depends_on_task_id = t.id
        WHERE d.task_id = ?
        ORDER BY d.id
        "#,
        TASK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params![task_id], row_to_task)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Tasks that depend on `task_id`.
pub fn dependent_tasks(conn: &Connection, task_id: TaskId) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM task_dependencies d
        JOIN tasks t ON d.task_id = t.id
        WHERE d.depends_on_task_id = ?
        ORDER BY d.id
        "#,
        TASK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params![task_id], row_to_task)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

pub fn get_edge(conn: &Connection, task_id: TaskId, depends_on: TaskId) -> Result<Option<Edge>> {
    let edge = conn
        .query_row(
            r#"
            SELECT task_id, depends_on_task_id, created_at
            FROM task_dependencies WHERE task_id = ? AND depends_on_task_id = ?
            "#,
            params![task_id, depends_on],
            row_to_edge,
        )
        .optional()?;
    Ok(edge)
}

/// Outgoing edges of `task_id`, in insertion order.
pub fn edges_from(conn: &Connection, task_id: TaskId) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT task_id, depends_on_task_id, created_at
        FROM task_dependencies WHERE task_id = ? ORDER BY id
        "#,
    )?;
    let edges = stmt
        .query_map(params![task_id], row_to_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

pub fn count_edges(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM task_dependencies", [], |row| row.get(0))?;
    Ok(count as usize)
}

pub fn insert_edge(conn: &Connection, task_id: TaskId, depends_on: TaskId, now: DateTime<Utc>) -> Result<Edge> {
    conn.execute(
        "INSERT INTO task_dependencies (task_id, depends_on_task_id, created_at) VALUES (?, ?, ?)",
        params![task_id, depends_on, format_timestamp(now)],
    )
    .context("Failed to insert dependency")?;

    Ok(Edge {
        task_id,
        depends_on_task_id: depends_on,
        created_at: now,
    })
}

pub fn delete_edge(conn: &Connection, task_id: TaskId, depends_on: TaskId) -> Result<usize> {
    let deleted = conn
        .execute(
            "DELETE FROM task_dependencies WHERE task_id = ? AND depends_on_task_id = ?",
            params![task_id, depends_on],
        )
        .context("Failed to delete dependency")?;
    Ok(deleted)
}

pub fn delete_all_edges(conn: &Connection, task_id: TaskId) -> Result<usize> {
    let deleted = conn
        .execute("DELETE FROM task_dependencies WHERE task_id = ?", params![task_id])
        .context("Failed to delete dependencies")?;
    Ok(deleted)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let due_date: Option<String> = row.get(4)?;
    let due_date = due_date
        .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_status(row, 3)?,
        due_date,
        assigned_to: row.get(5)?,
        created_by: row.get(6)?,
        created_at: parse_timestamp(row, 7)?,
        updated_at: parse_timestamp(row, 8)?,
    })
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(2)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        role,
        created_at: parse_timestamp(row, 3)?,
    })
}

fn row_to_edge(row: &Row) -> rusqlite::Result<Edge> {
    Ok(Edge {
        task_id: row.get(0)?,
        depends_on_task_id: row.get(1)?,
        created_at: parse_timestamp(row, 2)?,
    })
}

fn parse_status(row: &Row, idx: usize) -> rusqlite::Result<Status> {
    let status: String = row.get(idx)?;
    status
        .parse::<Status>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// Fixed precision keeps lexical order equal to chronological order.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
