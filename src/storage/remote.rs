//! Remote MySQL backend (feature `remote`).
//!
//! Every connection is a fresh TLS session that selects the configured
//! schema. Query timeouts map onto the socket read/write timeouts.

use mysql::prelude::Queryable;
use mysql::{FromRowError, OptsBuilder, Params, Row, SslOpts};

use crate::config::Credentials;
use crate::model::*;
use crate::query::{self, ChannelFilter, NodeFilter, Query};
use crate::{Error, Result};
use super::{Backend, Connection, SessionOptions};
use super::rows::*;

// ============================================================================
// RemoteBackend
// ============================================================================

#[derive(Debug, Clone)]
pub struct RemoteBackend {
    credentials: Credentials,
    database: String,
}

impl RemoteBackend {
    pub fn new(credentials: Credentials, database: impl Into<String>) -> Self {
        Self { credentials, database: database.into() }
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl Backend for RemoteBackend {
    type Conn = RemoteConnection;

    fn connect(&self, session: &SessionOptions) -> Result<RemoteConnection> {
        let c = &self.credentials;
        tracing::debug!(host = %c.host, user = %c.user, db = %self.database, "connecting");

        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(c.host.clone()))
            .user(Some(c.user.clone()))
            .pass(Some(c.password.clone()))
            .db_name(Some(self.database.clone()))
            .ssl_opts(Some(SslOpts::default()))
            .tcp_connect_timeout(session.query_timeout)
            .read_timeout(session.query_timeout)
            .write_timeout(session.query_timeout);

        let mut conn = mysql::Conn::new(opts).map_err(|e| {
            Error::ConnectionFailure(format!("{}@{}: {e}", c.user, c.host))
        })?;
        conn.query_drop(format!("USE `{}`", self.database.replace('`', "``")))
            .map_err(|e| Error::ConnectionFailure(format!("select schema {}: {e}", self.database)))?;

        Ok(RemoteConnection { conn, session: session.clone() })
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("Database {} at {}.", self.database, self.credentials.host)
    }
}

// ============================================================================
// RemoteConnection
// ============================================================================

pub struct RemoteConnection {
    conn: mysql::Conn,
    session: SessionOptions,
}

impl RemoteConnection {
    fn run<T>(&mut self, q: &Query, decode: impl Fn(Row) -> std::result::Result<T, FromRowError>) -> Result<Vec<T>> {
        self.session.cancel.check()?;
        let params = if q.params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(q.params.iter().map(|v| mysql::Value::from(*v)).collect())
        };
        let rows: Vec<Row> = self.conn.exec(q.sql.as_str(), params).map_err(|e| self.classify(e))?;
        rows.into_iter()
            .map(|row| decode(row).map_err(|e| Error::Query(format!("decode row: {e}"))))
            .collect()
    }

    fn classify(&self, e: mysql::Error) -> Error {
        if let mysql::Error::IoError(io) = &e {
            if matches!(io.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) {
                if let Some(t) = self.session.query_timeout {
                    return Error::Timeout(t);
                }
            }
        }
        Error::Query(e.to_string())
    }
}

fn point(x: f64, y: f64, z: f64) -> Point3 {
    Point3::new(x, y, z)
}

impl Connection for RemoteConnection {
    fn fetch_nodes(&mut self, role: Role, filter: &NodeFilter) -> Result<Vec<NodeRow>> {
        self.run(&query::nodes(role, filter), |row| {
            let (id, x, y, z, set): (i64, f64, f64, f64, i64) = mysql::from_row_opt(row)?;
            Ok(NodeRow { id: NodeId(id), coords: point(x, y, z), set_id: SetId(set) })
        })
    }

    fn fetch_channels(&mut self, filter: &ChannelFilter) -> Result<Vec<ChannelRow>> {
        self.run(&query::channels(filter), |row| {
            let (id, power, toa, spread, tx, rx): (i64, f64, f64, f64, i64, i64) =
                mysql::from_row_opt(row)?;
            Ok(ChannelRow {
                id: ChannelId(id),
                received_power: power,
                mean_time_of_arrival: toa,
                delay_spread: spread,
                tx: NodeId(tx),
                rx: NodeId(rx),
            })
        })
    }

    fn fetch_paths(&mut self, channel: ChannelId, limit: Option<usize>) -> Result<Vec<PathRow>> {
        self.run(&query::paths(channel, limit), |row| {
            let (id, power, toa, dphi, dtheta, aphi, atheta, fspl, phase): (
                i64, f64, f64, f64, f64, f64, f64, f64, f64,
            ) = mysql::from_row_opt(row)?;
            Ok(PathRow {
                id: PathId(id),
                received_power: power,
                time_of_arrival: toa,
                departure_phi: dphi,
                departure_theta: dtheta,
                arrival_phi: aphi,
                arrival_theta: atheta,
                freespace_path_loss: fspl,
                phase,
            })
        })
    }

    fn fetch_interactions(&mut self, channel: ChannelId) -> Result<Vec<InteractionRow>> {
        self.run(&query::interactions(channel), |row| {
            let (x, y, z, kind, path): (f64, f64, f64, i64, i64) = mysql::from_row_opt(row)?;
            Ok(InteractionRow { coords: point(x, y, z), kind: InteractionKind(kind), path: PathId(path) })
        })
    }

    fn fetch_interaction_types(&mut self) -> Result<Vec<(i64, String)>> {
        self.run(&query::interaction_types(), |row| {
            let code = row.get_opt::<i64, usize>(0);
            let name = row.get_opt::<String, usize>(1);
            match (code, name) {
                (Some(Ok(code)), Some(Ok(name))) => Ok((code, name)),
                _ => Err(FromRowError(row)),
            }
        })
    }

    fn close(self) -> Result<()> {
        drop(self.conn);
        Ok(())
    }
}
