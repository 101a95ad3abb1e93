use chrono::{DateTime, Duration, DurationRound, Utc};
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};

pub type DbPool = Pool<AsyncPgConnection>;

/// Current time truncated to the microsecond precision of `TIMESTAMPTZ`, so a
/// value echoed before the insert matches the value read back later.
pub fn db_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::microseconds(1)).unwrap_or(now)
}

/// Connection handle that exists only inside an open database transaction.
///
/// Writes belonging to one unit of work take `&mut Transaction` instead of a
/// bare connection, so a call that must be transactional cannot be made
/// against the pool by accident.
pub struct Transaction<'c> {
    conn: &'c mut AsyncPgConnection,
}

impl<'c> Transaction<'c> {
    /// Wraps the connection handed to an `AsyncConnection::transaction` callback.
    pub(crate) fn begun(conn: &'c mut AsyncPgConnection) -> Self {
        Self { conn }
    }

    pub fn conn(&mut self) -> &mut AsyncPgConnection {
        self.conn
    }
}
