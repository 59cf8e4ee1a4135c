use rusqlite::{Connection, OptionalExtension, Result, Transaction, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanoramaStatus {
    Pending,
    Processed,
}

impl PanoramaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanoramaStatus::Pending => "pending",
            PanoramaStatus::Processed => "processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PanoramaStatus::Pending),
            "processed" => Some(PanoramaStatus::Processed),
            _ => None,
        }
    }
}

/// The two adjacency relations reported for a panorama.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Spatially proximate panorama
    Neighbor,
    /// Explicitly authored connection, e.g. along a street
    Link,
}

impl EdgeKind {
    pub fn table(&self) -> &'static str {
        match self {
            EdgeKind::Neighbor => "neighbors",
            EdgeKind::Link => "links",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanoramaRow {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub status: PanoramaStatus,
    pub discovered_at: i64,
    pub processed_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: String,
    pub max_new: i64,
    pub processed: i64,
    pub failed: i64,
    pub discovered: i64,
    pub discarded: i64,
}

/// Counters recorded against a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub processed: usize,
    pub failed: usize,
    pub discovered: usize,
    pub discarded: usize,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS panoramas (
    id TEXT PRIMARY KEY NOT NULL,
    lat REAL NOT NULL CHECK(lat BETWEEN -90.0 AND 90.0),
    lon REAL NOT NULL CHECK(lon BETWEEN -180.0 AND 180.0),
    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'processed')),
    discovered_at INTEGER NOT NULL,
    processed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_panoramas_status ON panoramas(status);

-- Spatial proximity graph
CREATE TABLE IF NOT EXISTS neighbors (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    discovered_at INTEGER NOT NULL,
    FOREIGN KEY(source_id) REFERENCES panoramas(id),
    FOREIGN KEY(target_id) REFERENCES panoramas(id),
    UNIQUE(source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_neighbors_source ON neighbors(source_id);

-- Authored connections
CREATE TABLE IF NOT EXISTS links (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    direction REAL,           -- heading in degrees, when reported
    discovered_at INTEGER NOT NULL,
    FOREIGN KEY(source_id) REFERENCES panoramas(id),
    FOREIGN KEY(target_id) REFERENCES panoramas(id),
    UNIQUE(source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);

-- One row per crawl run
CREATE TABLE IF NOT EXISTS crawl_runs (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    max_new INTEGER NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    discovered INTEGER NOT NULL DEFAULT 0,
    discarded INTEGER NOT NULL DEFAULT 0
);
            ",
        )?;
        Ok(())
    }

    /// Inserts the panorama if its id is unknown. An existing row keeps its
    /// status, except that asking for `Processed` promotes it. Returns whether
    /// a new row was created.
    pub fn upsert_panorama(
        &self,
        id: &str,
        lat: f64,
        lon: f64,
        status: PanoramaStatus,
    ) -> Result<bool> {
        let timestamp = current_timestamp();
        let processed_at = (status == PanoramaStatus::Processed).then_some(timestamp);

        let inserted = self.conn.execute(
            "INSERT INTO panoramas (id, lat, lon, status, discovered_at, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO NOTHING",
            params![id, lat, lon, status.as_str(), timestamp, processed_at],
        )?;

        if inserted == 0 && status == PanoramaStatus::Processed {
            self.mark_processed(id)?;
        }

        Ok(inserted == 1)
    }

    pub fn mark_processed(&self, id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE panoramas SET status = 'processed', processed_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![current_timestamp(), id],
        )?;
        Ok(())
    }

    /// Records a directed edge. Duplicate pairs are ignored by the unique
    /// constraint; returns whether a row was written.
    pub fn insert_edge(
        &self,
        kind: EdgeKind,
        source_id: &str,
        target_id: &str,
        direction: Option<f64>,
    ) -> Result<bool> {
        let timestamp = current_timestamp();
        let written = match kind {
            EdgeKind::Neighbor => self.conn.execute(
                "INSERT OR IGNORE INTO neighbors (source_id, target_id, discovered_at)
                 VALUES (?1, ?2, ?3)",
                params![source_id, target_id, timestamp],
            )?,
            EdgeKind::Link => self.conn.execute(
                "INSERT OR IGNORE INTO links (source_id, target_id, direction, discovered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![source_id, target_id, direction, timestamp],
            )?,
        };
        Ok(written == 1)
    }

    /// Pending panorama ids in insertion order.
    pub fn get_pending(&self, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM panoramas WHERE status = 'pending' ORDER BY rowid LIMIT ?1",
        )?;

        let ids = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;

        Ok(ids)
    }

    pub fn get_panorama(&self, id: &str) -> Result<Option<PanoramaRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, lat, lon, status, discovered_at, processed_at FROM panoramas WHERE id = ?1",
        )?;

        let result = stmt
            .query_row(params![id], |row| {
                let status: String = row.get(3)?;
                Ok(PanoramaRow {
                    id: row.get(0)?,
                    lat: row.get(1)?,
                    lon: row.get(2)?,
                    status: PanoramaStatus::parse(&status).unwrap_or(PanoramaStatus::Pending),
                    discovered_at: row.get(4)?,
                    processed_at: row.get(5)?,
                })
            })
            .optional()?;
        Ok(result)
    }

    pub fn count_panoramas(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM panoramas", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_by_status(&self, status: PanoramaStatus) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM panoramas WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_edges(&self, kind: EdgeKind) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Edges leaving `source_id`, ordered by insertion.
    pub fn get_edges_from(&self, kind: EdgeKind, source_id: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT target_id FROM {} WHERE source_id = ?1 ORDER BY rowid",
            kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let targets = stmt
            .query_map(params![source_id], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;

        Ok(targets)
    }

    /// Starts a transaction on the shared connection. Writes issued through
    /// this `Database` while it is open become part of it.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        self.conn.unchecked_transaction()
    }

    // Run bookkeeping
    pub fn create_run(&self, max_new: usize) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();

        self.conn.execute(
            "INSERT INTO crawl_runs (id, start_time, status, max_new) VALUES (?1, ?2, ?3, ?4)",
            params![&run_id, current_timestamp(), "running", max_new as i64],
        )?;

        Ok(run_id)
    }

    pub fn complete_run(&self, run_id: &str, counts: &RunCounts) -> Result<()> {
        self.finish_run(run_id, "completed", counts)
    }

    pub fn fail_run(&self, run_id: &str, counts: &RunCounts) -> Result<()> {
        self.finish_run(run_id, "failed", counts)
    }

    fn finish_run(&self, run_id: &str, status: &str, counts: &RunCounts) -> Result<()> {
        self.conn.execute(
            "UPDATE crawl_runs
             SET status = ?1, end_time = ?2, processed = ?3, failed = ?4, discovered = ?5, discarded = ?6
             WHERE id = ?7",
            params![
                status,
                current_timestamp(),
                counts.processed as i64,
                counts.failed as i64,
                counts.discovered as i64,
                counts.discarded as i64,
                run_id,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn get_recent_runs(&self, limit: usize) -> Result<Vec<RunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, status, max_new, processed, failed, discovered, discarded
             FROM crawl_runs ORDER BY start_time DESC, rowid DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRow {
                    id: row.get(0)?,
                    start_time: row.get(1)?,
                    end_time: row.get(2)?,
                    status: row.get(3)?,
                    max_new: row.get(4)?,
                    processed: row.get(5)?,
                    failed: row.get(6)?,
                    discovered: row.get(7)?,
                    discarded: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(runs)
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
