use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;
use crate::create_timestamp;
use crate::sources::ExerciseDetail;

const DATABASE_NAME: &str = "codelab.sqlite3";

pub fn get_db_path(config: &DatabaseConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = &config.path {
        return Ok(path.clone());
    }

    use anyhow::Context;
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("", "", "codelab").context("Unable to find user directory")?;
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).context("Failed to create local data dir")?;

    Ok(data_dir.join(DATABASE_NAME))
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(0)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot be run inside a transaction
    for pragma_sql in &[
        "PRAGMA busy_timeout = 2000;",
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    create_schema(&db_pool).await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

/// Creates every table the service needs, leaving existing ones untouched
pub async fn create_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS exercises (
            source         TEXT     NOT NULL,
            slug           TEXT     NOT NULL,
            title          TEXT     NOT NULL,
            description    TEXT     NOT NULL,
            solution_code  TEXT     NOT NULL,
            starter_code   TEXT     NOT NULL,
            attribution    TEXT     NOT NULL,
            source_label   TEXT     NOT NULL,
            path           TEXT     NOT NULL,
            has_solution   BOOLEAN  NOT NULL DEFAULT FALSE,
            has_tests      BOOLEAN  NOT NULL DEFAULT FALSE,
            PRIMARY KEY (source, slug)
        );",
        r"
        CREATE TABLE IF NOT EXISTS user_code (
            source         TEXT     NOT NULL,
            slug           TEXT     NOT NULL,
            code           TEXT     NOT NULL,
            updated_at     TEXT     NOT NULL,
            PRIMARY KEY (source, slug)
        );",
        r"
        CREATE TABLE IF NOT EXISTS runs (
            id             TEXT     PRIMARY KEY,
            source         TEXT,
            slug           TEXT,
            code           TEXT     NOT NULL,
            mode           TEXT     NOT NULL,
            status         TEXT     NOT NULL,
            stdout         TEXT     NOT NULL,
            stderr         TEXT     NOT NULL,
            duration_ms    INTEGER  NOT NULL,
            created_time   TEXT     NOT NULL
        );",
        "CREATE INDEX IF NOT EXISTS idx_runs_exercise ON runs(source, slug);",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

#[derive(sqlx::FromRow)]
struct ExerciseRow {
    source: String,
    slug: String,
    title: String,
    description: String,
    solution_code: String,
    starter_code: String,
    attribution: String,
    source_label: String,
    path: String,
    has_solution: bool,
    has_tests: bool,
}

impl From<ExerciseRow> for ExerciseDetail {
    fn from(row: ExerciseRow) -> Self {
        Self {
            slug: row.slug,
            title: row.title,
            path: row.path,
            description: row.description,
            solution_code: row.solution_code,
            starter_code: row.starter_code,
            source: row.attribution,
            source_key: row.source,
            source_label: row.source_label,
            has_solution: row.has_solution,
            has_tests: row.has_tests,
        }
    }
}

pub async fn fetch_exercise(
    source: &str,
    slug: &str,
    pool: &SqlitePool,
) -> sqlx::Result<Option<ExerciseDetail>> {
    let row = sqlx::query_as::<_, ExerciseRow>(
        r"
        SELECT source, slug, title, description, solution_code, starter_code,
               attribution, source_label, path, has_solution, has_tests
        FROM exercises
        WHERE source = ? AND slug = ?
        ",
    )
    .bind(source)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ExerciseDetail::from))
}

pub async fn upsert_exercise(detail: &ExerciseDetail, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO exercises (source, slug, title, description, solution_code, starter_code,
                               attribution, source_label, path, has_solution, has_tests)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (source, slug) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            solution_code = excluded.solution_code,
            starter_code = excluded.starter_code,
            attribution = excluded.attribution,
            source_label = excluded.source_label,
            path = excluded.path,
            has_solution = excluded.has_solution,
            has_tests = excluded.has_tests
        ",
    )
    .bind(&detail.source_key)
    .bind(&detail.slug)
    .bind(&detail.title)
    .bind(&detail.description)
    .bind(&detail.solution_code)
    .bind(&detail.starter_code)
    .bind(&detail.source)
    .bind(&detail.source_label)
    .bind(&detail.path)
    .bind(detail.has_solution)
    .bind(detail.has_tests)
    .execute(pool)
    .await?;

    log::debug!("Cached exercise {}/{}", detail.source_key, detail.slug);
    Ok(())
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserCode {
    pub code: String,
    pub updated_at: String,
}

pub async fn fetch_user_code(
    source: &str,
    slug: &str,
    pool: &SqlitePool,
) -> sqlx::Result<Option<UserCode>> {
    sqlx::query_as::<_, UserCode>(
        "SELECT code, updated_at FROM user_code WHERE source = ? AND slug = ?",
    )
    .bind(source)
    .bind(slug)
    .fetch_optional(pool)
    .await
}

pub async fn save_user_code(
    source: &str,
    slug: &str,
    code: &str,
    pool: &SqlitePool,
) -> sqlx::Result<()> {
    let now = create_timestamp();
    sqlx::query(
        r"
        INSERT INTO user_code (source, slug, code, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (source, slug) DO UPDATE SET
            code = excluded.code,
            updated_at = excluded.updated_at
        ",
    )
    .bind(source)
    .bind(slug)
    .bind(code)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// One finished run or test invocation
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: String,
    pub source: Option<String>,
    pub slug: Option<String>,
    pub code: String,
    pub mode: String,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
    pub created_time: String,
}

pub async fn insert_run(record: &RunRecord, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO runs (id, source, slug, code, mode, status, stdout, stderr, duration_ms, created_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&record.id)
    .bind(&record.source)
    .bind(&record.slug)
    .bind(&record.code)
    .bind(&record.mode)
    .bind(&record.status)
    .bind(&record.stdout)
    .bind(&record.stderr)
    .bind(record.duration_ms)
    .bind(&record.created_time)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_run(id: &str, pool: &SqlitePool) -> sqlx::Result<Option<RunRecord>> {
    sqlx::query_as::<_, RunRecord>(
        r"
        SELECT id, source, slug, code, mode, status, stdout, stderr, duration_ms, created_time
        FROM runs
        WHERE id = ?
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
