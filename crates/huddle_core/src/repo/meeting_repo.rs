//! Meeting repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide stable CRUD APIs over `meetings` and `meeting_participants`.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Meeting::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Multi-statement writes run under `BEGIN IMMEDIATE` so the write lock
//!   is held for the whole meeting + participant mutation.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::actor::UserId;
use crate::model::meeting::{Meeting, MeetingId, MeetingValidationError};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const MEETING_SELECT_SQL: &str = "SELECT
    m.uuid,
    m.title,
    m.description,
    m.date,
    m.start_time,
    m.duration_minutes,
    m.organizer
FROM meetings m";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for meeting persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Record failed domain validation before or after SQL.
    Validation(MeetingValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target meeting does not exist.
    NotFound(MeetingId),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "meeting not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted meeting data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "meeting repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "meeting repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "meeting repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MeetingValidationError> for RepoError {
    fn from(value: MeetingValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the meeting store.
pub trait MeetingRepository {
    /// Runs `op` while holding the store's write lock.
    ///
    /// Reads inside `op` observe a stable snapshot and writes commit
    /// atomically with it when `op` returns `Ok`; on `Err` nothing is
    /// persisted. Check-then-write sequences (conflict scan + insert)
    /// must go through here so two writers cannot interleave between the
    /// scan and the write.
    fn with_write_lock<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&Self) -> Result<T, E>;
    /// Persists one meeting with its participant set. Atomic.
    fn create_meeting(&self, meeting: &Meeting) -> RepoResult<MeetingId>;
    /// Replaces the stored meeting and its full participant set. Atomic.
    fn update_meeting(&self, meeting: &Meeting) -> RepoResult<()>;
    /// Loads one meeting by id, participants included.
    fn get_meeting(&self, id: MeetingId) -> RepoResult<Option<Meeting>>;
    /// Lists meetings where `user` is organizer or participant, ordered by
    /// date then start time.
    fn list_meetings_for_user(&self, user: UserId) -> RepoResult<Vec<Meeting>>;
    /// Lists `user`'s meetings starting on a date in `[from, to]`, skipping
    /// `exclude` when set. Backing query for conflict scans.
    fn meetings_for_user_between(
        &self,
        user: UserId,
        from: NaiveDate,
        to: NaiveDate,
        exclude: Option<MeetingId>,
    ) -> RepoResult<Vec<Meeting>>;
    /// Hard-deletes a meeting and all its participant associations.
    fn delete_meeting(&self, id: MeetingId) -> RepoResult<()>;
    /// Removes one participant association. Returns whether a row was
    /// removed; errors with `NotFound` when the meeting itself is missing.
    fn remove_participant(&self, id: MeetingId, user: UserId) -> RepoResult<bool>;
}

/// SQLite-backed meeting repository.
pub struct SqliteMeetingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMeetingRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    ///
    /// Rejects connections that skipped [`crate::db::open_db`] bootstrap,
    /// so later queries cannot fail half-way through a write.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl MeetingRepository for SqliteMeetingRepository<'_> {
    fn with_write_lock<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&Self) -> Result<T, E>,
    {
        // BEGIN IMMEDIATE takes the write lock before the first statement
        // in `op` runs, serializing competing writers across connections.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| E::from(RepoError::from(err)))?;
        let value = op(self)?;
        tx.commit().map_err(|err| E::from(RepoError::from(err)))?;
        Ok(value)
    }

    fn create_meeting(&self, meeting: &Meeting) -> RepoResult<MeetingId> {
        meeting.validate()?;

        if self.conn.is_autocommit() {
            return self.with_write_lock(|repo| repo.create_meeting(meeting));
        }

        self.conn.execute(
            "INSERT INTO meetings (
                uuid,
                title,
                description,
                date,
                start_time,
                duration_minutes,
                organizer
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                meeting.uuid.to_string(),
                meeting.title.as_str(),
                meeting.description.as_deref(),
                date_to_db(meeting.date),
                time_to_db(meeting.start_time),
                meeting.duration_minutes,
                meeting.organizer.to_string(),
            ],
        )?;
        insert_participants(self.conn, meeting)?;

        Ok(meeting.uuid)
    }

    fn update_meeting(&self, meeting: &Meeting) -> RepoResult<()> {
        meeting.validate()?;

        if self.conn.is_autocommit() {
            return self.with_write_lock(|repo| repo.update_meeting(meeting));
        }

        let changed = self.conn.execute(
            "UPDATE meetings
             SET
                title = ?1,
                description = ?2,
                date = ?3,
                start_time = ?4,
                duration_minutes = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?6;",
            params![
                meeting.title.as_str(),
                meeting.description.as_deref(),
                date_to_db(meeting.date),
                time_to_db(meeting.start_time),
                meeting.duration_minutes,
                meeting.uuid.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(meeting.uuid));
        }

        self.conn.execute(
            "DELETE FROM meeting_participants WHERE meeting_uuid = ?1;",
            [meeting.uuid.to_string()],
        )?;
        insert_participants(self.conn, meeting)?;

        Ok(())
    }

    fn get_meeting(&self, id: MeetingId) -> RepoResult<Option<Meeting>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEETING_SELECT_SQL} WHERE m.uuid = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_meeting_row(self.conn, row)?));
        }

        Ok(None)
    }

    fn list_meetings_for_user(&self, user: UserId) -> RepoResult<Vec<Meeting>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEETING_SELECT_SQL}
             LEFT JOIN meeting_participants mp ON mp.meeting_uuid = m.uuid
             WHERE m.organizer = ?1 OR mp.user_uuid = ?1
             GROUP BY m.uuid
             ORDER BY m.date ASC, m.start_time ASC, m.uuid ASC;"
        ))?;

        let mut rows = stmt.query([user.to_string()])?;
        collect_meetings(self.conn, &mut rows)
    }

    fn meetings_for_user_between(
        &self,
        user: UserId,
        from: NaiveDate,
        to: NaiveDate,
        exclude: Option<MeetingId>,
    ) -> RepoResult<Vec<Meeting>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEETING_SELECT_SQL}
             LEFT JOIN meeting_participants mp ON mp.meeting_uuid = m.uuid
             WHERE (m.organizer = ?1 OR mp.user_uuid = ?1)
               AND m.date >= ?2
               AND m.date <= ?3
               AND (?4 IS NULL OR m.uuid <> ?4)
             GROUP BY m.uuid
             ORDER BY m.date ASC, m.start_time ASC, m.uuid ASC;"
        ))?;

        let mut rows = stmt.query(params![
            user.to_string(),
            date_to_db(from),
            date_to_db(to),
            exclude.map(|id| id.to_string()),
        ])?;
        collect_meetings(self.conn, &mut rows)
    }

    fn delete_meeting(&self, id: MeetingId) -> RepoResult<()> {
        // Participant rows go with the meeting via ON DELETE CASCADE.
        let changed = self
            .conn
            .execute("DELETE FROM meetings WHERE uuid = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn remove_participant(&self, id: MeetingId, user: UserId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM meeting_participants
             WHERE meeting_uuid = ?1 AND user_uuid = ?2;",
            params![id.to_string(), user.to_string()],
        )?;

        if changed > 0 {
            self.conn.execute(
                "UPDATE meetings
                 SET updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                [id.to_string()],
            )?;
            return Ok(true);
        }

        if !meeting_exists(self.conn, id)? {
            return Err(RepoError::NotFound(id));
        }

        Ok(false)
    }
}

fn insert_participants(conn: &Connection, meeting: &Meeting) -> RepoResult<()> {
    let meeting_uuid = meeting.uuid.to_string();
    for participant in &meeting.participants {
        conn.execute(
            "INSERT OR IGNORE INTO meeting_participants (meeting_uuid, user_uuid)
             VALUES (?1, ?2);",
            params![meeting_uuid.as_str(), participant.to_string()],
        )?;
    }
    Ok(())
}

fn collect_meetings(
    conn: &Connection,
    rows: &mut rusqlite::Rows<'_>,
) -> RepoResult<Vec<Meeting>> {
    let mut meetings = Vec::new();
    while let Some(row) = rows.next()? {
        meetings.push(parse_meeting_row(conn, row)?);
    }
    Ok(meetings)
}

fn parse_meeting_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Meeting> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "meetings.uuid")?;

    let organizer_text: String = row.get("organizer")?;
    let organizer = parse_uuid(&organizer_text, "meetings.organizer")?;

    let date_text: String = row.get("date")?;
    let date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
        RepoError::InvalidData(format!("invalid date value `{date_text}` in meetings.date"))
    })?;

    let time_text: String = row.get("start_time")?;
    let start_time = NaiveTime::parse_from_str(&time_text, TIME_FORMAT).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid time value `{time_text}` in meetings.start_time"
        ))
    })?;

    let mut meeting = Meeting {
        uuid,
        title: row.get("title")?,
        description: row.get("description")?,
        date,
        start_time,
        duration_minutes: row.get("duration_minutes")?,
        organizer,
        participants: load_participants(conn, &uuid_text)?,
    };
    // The organizer is a participant by construction; rows written before
    // that rule are healed on read rather than rejected.
    meeting.participants.insert(organizer);
    meeting.validate()?;
    Ok(meeting)
}

fn load_participants(conn: &Connection, meeting_uuid: &str) -> RepoResult<BTreeSet<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_uuid
         FROM meeting_participants
         WHERE meeting_uuid = ?1;",
    )?;
    let mut rows = stmt.query([meeting_uuid])?;
    let mut participants = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        participants.insert(parse_uuid(&value, "meeting_participants.user_uuid")?);
    }
    Ok(participants)
}

fn meeting_exists(conn: &Connection, id: MeetingId) -> RepoResult<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM meetings WHERE uuid = ?1;",
            [id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(exists.is_some())
}

fn parse_uuid(value: &str, source: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {source}")))
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["meetings", "meeting_participants"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    for column in [
        "uuid",
        "title",
        "description",
        "date",
        "start_time",
        "duration_minutes",
        "organizer",
    ] {
        if !table_has_column(conn, "meetings", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "meetings",
                column,
            });
        }
    }

    for column in ["meeting_uuid", "user_uuid"] {
        if !table_has_column(conn, "meeting_participants", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "meeting_participants",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn time_to_db(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}
