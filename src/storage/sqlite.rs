//! Embedded SQLite backend.
//!
//! Opens the database file read-only; a missing file is a connection
//! failure rather than an empty new database. Query timeouts and
//! cancellation are enforced with SQLite's progress handler, which
//! interrupts the running statement.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::{OpenFlags, Row, params_from_iter};

use crate::model::*;
use crate::query::{self, ChannelFilter, NodeFilter, Query};
use crate::{Error, Result};
use super::{Backend, Connection, SessionOptions};
use super::rows::*;

/// VM instructions between progress-handler checks.
const PROGRESS_HANDLER_OPS: i32 = 1000;

// ============================================================================
// SqliteBackend
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: PathBuf,
}

impl SqliteBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for SqliteBackend {
    type Conn = SqliteConnection;

    fn connect(&self, session: &SessionOptions) -> Result<SqliteConnection> {
        if !self.path.is_file() {
            return Err(Error::ConnectionFailure(format!(
                "database file {} does not exist",
                self.path.display()
            )));
        }
        let conn = rusqlite::Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| Error::ConnectionFailure(format!("open {}: {e}", self.path.display())))?;

        // Fails on files that are not SQLite databases.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
            .map_err(|e| Error::ConnectionFailure(format!("open {}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), "sqlite connection opened");
        Ok(SqliteConnection { conn, session: session.clone() })
    }

    fn describe(&self) -> String {
        format!("Database in file {}.", self.path.display())
    }
}

// ============================================================================
// SqliteConnection
// ============================================================================

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    session: SessionOptions,
}

impl SqliteConnection {
    fn run<T>(
        &mut self,
        q: &Query,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        self.session.cancel.check()?;
        self.install_progress_handler();

        let result = self.conn.prepare(&q.sql).and_then(|mut stmt| {
            let rows = stmt
                .query_map(params_from_iter(q.params.iter()), map)?
                .collect::<rusqlite::Result<Vec<T>>>();
            rows
        });

        self.conn.progress_handler(0, None::<fn() -> bool>);
        result.map_err(|e| self.classify(e))
    }

    fn install_progress_handler(&self) {
        let deadline = self.session.query_timeout.map(|t| Instant::now() + t);
        let cancel = self.session.cancel.clone();
        self.conn.progress_handler(
            PROGRESS_HANDLER_OPS,
            Some(move || cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() > d)),
        );
    }

    fn classify(&self, e: rusqlite::Error) -> Error {
        if !is_interrupt_error(&e) {
            return Error::from(e);
        }
        if self.session.cancel.is_cancelled() {
            return Error::Cancelled;
        }
        match self.session.query_timeout {
            Some(t) => Error::Timeout(t),
            None => Error::from(e),
        }
    }
}

fn is_interrupt_error(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::OperationInterrupted,
                ..
            },
            _
        )
    )
}

fn point(row: &Row<'_>, first: usize) -> rusqlite::Result<Point3> {
    Ok(Point3::new(row.get(first)?, row.get(first + 1)?, row.get(first + 2)?))
}

impl Connection for SqliteConnection {
    fn fetch_nodes(&mut self, role: Role, filter: &NodeFilter) -> Result<Vec<NodeRow>> {
        self.run(&query::nodes(role, filter), |r| {
            Ok(NodeRow {
                id: NodeId(r.get(0)?),
                coords: point(r, 1)?,
                set_id: SetId(r.get(4)?),
            })
        })
    }

    fn fetch_channels(&mut self, filter: &ChannelFilter) -> Result<Vec<ChannelRow>> {
        self.run(&query::channels(filter), |r| {
            Ok(ChannelRow {
                id: ChannelId(r.get(0)?),
                received_power: r.get(1)?,
                mean_time_of_arrival: r.get(2)?,
                delay_spread: r.get(3)?,
                tx: NodeId(r.get(4)?),
                rx: NodeId(r.get(5)?),
            })
        })
    }

    fn fetch_paths(&mut self, channel: ChannelId, limit: Option<usize>) -> Result<Vec<PathRow>> {
        self.run(&query::paths(channel, limit), |r| {
            Ok(PathRow {
                id: PathId(r.get(0)?),
                received_power: r.get(1)?,
                time_of_arrival: r.get(2)?,
                departure_phi: r.get(3)?,
                departure_theta: r.get(4)?,
                arrival_phi: r.get(5)?,
                arrival_theta: r.get(6)?,
                freespace_path_loss: r.get(7)?,
                phase: r.get(8)?,
            })
        })
    }

    fn fetch_interactions(&mut self, channel: ChannelId) -> Result<Vec<InteractionRow>> {
        self.run(&query::interactions(channel), |r| {
            Ok(InteractionRow {
                coords: point(r, 0)?,
                kind: InteractionKind(r.get(3)?),
                path: PathId(r.get(4)?),
            })
        })
    }

    fn fetch_interaction_types(&mut self) -> Result<Vec<(i64, String)>> {
        self.run(&query::interaction_types(), |r| Ok((r.get(0)?, r.get(1)?)))
    }

    fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::from(e))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Query(e.to_string())
    }
}
