use std::{path::Path, sync::RwLock};

use indoc::indoc;
use miette::{Context, IntoDiagnostic};
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef},
    Connection, OptionalExtension, ToSql,
};
use time::OffsetDateTime;
use tracing::debug;

use super::{Channel, ImportStore, User};
use crate::{
    result::{err_msg, Result},
    sync::{ChannelSyncSession, SyncState},
};

#[derive(Debug)]
pub struct Sqlite {
    conn: RwLock<Connection>,
}

unsafe impl Sync for Sqlite {}

impl Sqlite {
    /// Open the store file at the given path or create it if it does not
    /// exist. An existing file that is not a valid database is an error.
    pub fn read_or_create(p: &Path) -> Result<Self> {
        let store = Self {
            conn: RwLock::new(
                Connection::open(p)
                    .into_diagnostic()
                    .wrap_err("Could not open sqlite file")?,
            ),
        };

        store.create_tables().map_err(|err| {
            err.wrap_err_with(|| "Could not create tables")
        })?;

        Ok(store)
    }

    /// Create the tables if they do not already exist
    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.write().unwrap();

        conn.execute_batch(indoc! {"
            BEGIN;
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS channels (
                id              INTEGER PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                owner_user_id   INTEGER NOT NULL,

                FOREIGN KEY (owner_user_id)
                    REFERENCES users (id)
                    ON DELETE CASCADE
                    ON UPDATE NO ACTION
            );
            CREATE TABLE IF NOT EXISTS video_imports (
                channel_id  INTEGER,
                target_url  TEXT NOT NULL,

                PRIMARY KEY (channel_id, target_url),

                FOREIGN KEY (channel_id)
                    REFERENCES channels (id)
                    ON DELETE CASCADE
                    ON UPDATE NO ACTION
            );
            CREATE TABLE IF NOT EXISTS sync_sessions (
                id              INTEGER PRIMARY KEY,
                channel_id      INTEGER NOT NULL,
                external_url    TEXT NOT NULL,
                state           INTEGER NOT NULL,
                last_sync_at    INTEGER,

                FOREIGN KEY (channel_id)
                    REFERENCES channels (id)
                    ON DELETE CASCADE
                    ON UPDATE NO ACTION
            );
            COMMIT;",
        })
        .into_diagnostic()?;
        Ok(())
    }
}

impl ImportStore for Sqlite {
    fn ensure_channel(&self, name: &str) -> Result<Channel> {
        {
            let conn = self.conn.read().unwrap();

            if let Some(id) = conn
                .query_row("SELECT id FROM channels WHERE name = ?", [name], |row| {
                    row.get(0)
                })
                .optional()
                .into_diagnostic()
                .wrap_err("Could not query channel row")?
            {
                return Ok(Channel {
                    id,
                    // The local store has no separate actor entity
                    actor_id: id,
                    name: name.to_owned(),
                });
            }
        }

        let conn = self.conn.write().unwrap();

        debug!("Channel '{name}' not in the table, inserting it");
        let user_id: i64 = conn
            .query_row(
                "INSERT INTO users (username) VALUES (?)
                ON CONFLICT (username) DO UPDATE SET username = username
                RETURNING id",
                [name],
                |row| row.get(0),
            )
            .into_diagnostic()
            .wrap_err("Could not insert owning user row")?;

        let id = conn
            .query_row(
                "INSERT INTO channels (name, owner_user_id)
                VALUES (?, ?)
                RETURNING id",
                params![name, user_id],
                |row| row.get(0),
            )
            .into_diagnostic()
            .wrap_err("Could not insert new channel row")?;

        Ok(Channel {
            id,
            actor_id: id,
            name: name.to_owned(),
        })
    }

    fn load_user_by_channel_actor(&self, actor_id: i64) -> Result<User> {
        let conn = self.conn.read().unwrap();

        conn.query_row(
            "SELECT u.id, u.username FROM users u
            JOIN channels c ON c.owner_user_id = u.id
            WHERE c.id = ?",
            [actor_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()
        .into_diagnostic()
        .wrap_err("Could not query channel owner")?
        .ok_or_else(|| err_msg(format!("No user owns a channel with actor id {actor_id}")))
    }

    fn url_already_imported(&self, channel_id: i64, url: &str) -> Result<bool> {
        let conn = self.conn.read().unwrap();

        conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM video_imports
                WHERE channel_id = ? AND target_url = ?)",
            params![channel_id, url],
            |row| row.get(0),
        )
        .into_diagnostic()
        .wrap_err("Could not query imported urls")
        .map_err(Into::into)
    }

    fn record_import(&self, channel_id: i64, url: &str) -> Result<()> {
        let conn = self.conn.write().unwrap();

        conn.execute(
            "INSERT OR IGNORE INTO video_imports (channel_id, target_url) VALUES (?, ?)",
            params![channel_id, url],
        )
        .into_diagnostic()
        .wrap_err("Could not record imported url")?;
        Ok(())
    }

    fn create_session(&self, channel_id: i64, external_url: &str) -> Result<ChannelSyncSession> {
        let conn = self.conn.write().unwrap();

        let id = conn
            .query_row(
                "INSERT INTO sync_sessions (channel_id, external_url, state)
                VALUES (?, ?, ?)
                RETURNING id",
                params![channel_id, external_url, SqliteSyncState(SyncState::Pending)],
                |row| row.get(0),
            )
            .into_diagnostic()
            .wrap_err("Could not insert new session row")?;

        Ok(ChannelSyncSession::new(
            id,
            channel_id,
            external_url.to_owned(),
        ))
    }

    fn load_session(&self, id: i64) -> Result<ChannelSyncSession> {
        let conn = self.conn.read().unwrap();

        let (channel_id, external_url, state, last_sync_at) = conn
            .query_row(
                "SELECT channel_id, external_url, state, last_sync_at
                FROM sync_sessions WHERE id = ?",
                [id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get::<_, SqliteSyncState>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()
            .into_diagnostic()
            .wrap_err("Could not query session row")?
            .ok_or_else(|| err_msg(format!("No sync session with id {id}")))?;

        Ok(ChannelSyncSession {
            id,
            channel_id,
            external_channel_url: external_url,
            state: state.0,
            last_sync_at: last_sync_at.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok()),
        })
    }

    fn save_session(&self, session: &ChannelSyncSession) -> Result<()> {
        let conn = self.conn.write().unwrap();

        debug!(
            "Saving session {} in state {:?}",
            session.id, session.state
        );
        conn.execute(
            "UPDATE sync_sessions
            SET state = ?, last_sync_at = ?
            WHERE id = ?",
            params![
                SqliteSyncState(session.state),
                session.last_sync_at.map(OffsetDateTime::unix_timestamp),
                session.id
            ],
        )
        .into_diagnostic()
        .wrap_err("Could not save session")?;
        Ok(())
    }
}

/// Wrapper around [SyncState] so that it can be read from/written to sqlite
#[derive(Debug)]
struct SqliteSyncState(SyncState);

impl FromSql for SqliteSyncState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let state = match value.as_i64()? {
            0 => SyncState::Pending,
            1 => SyncState::Processing,
            2 => SyncState::Synced,
            3 => SyncState::Failed,
            n => return Err(FromSqlError::OutOfRange(n)),
        };

        Ok(SqliteSyncState(state))
    }
}

impl ToSql for SqliteSyncState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let val = match self.0 {
            SyncState::Pending => 0,
            SyncState::Processing => 1,
            SyncState::Synced => 2,
            SyncState::Failed => 3,
        };

        Ok(ToSqlOutput::Owned(Value::Integer(val)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, Sqlite) {
        let dir = tempfile::tempdir().unwrap();
        let store = Sqlite::read_or_create(&dir.path().join("store.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn ensure_channel_is_idempotent() {
        let (_dir, store) = open_store();

        let first = store.ensure_channel("archive").unwrap();
        let second = store.ensure_channel("archive").unwrap();
        assert_eq!(first, second);

        let other = store.ensure_channel("other").unwrap();
        assert_ne!(first.id, other.id);
    }

    #[test]
    fn channel_owner_is_resolvable_through_its_actor() {
        let (_dir, store) = open_store();

        let channel = store.ensure_channel("archive").unwrap();
        let user = store.load_user_by_channel_actor(channel.actor_id).unwrap();
        assert_eq!(user.username, "archive");
    }

    #[test]
    fn recorded_imports_guard_against_reimport() {
        let (_dir, store) = open_store();
        let channel = store.ensure_channel("archive").unwrap();

        let url = "https://e.com/w/42";
        assert!(!store.url_already_imported(channel.id, url).unwrap());

        store.record_import(channel.id, url).unwrap();
        assert!(store.url_already_imported(channel.id, url).unwrap());

        // Recording twice is not an error
        store.record_import(channel.id, url).unwrap();

        // Another channel is unaffected
        let other = store.ensure_channel("other").unwrap();
        assert!(!store.url_already_imported(other.id, url).unwrap());
    }

    #[test]
    fn sessions_round_trip_their_state() {
        let (_dir, store) = open_store();
        let channel = store.ensure_channel("archive").unwrap();

        let mut session = store
            .create_session(channel.id, "https://e.com/c/archive")
            .unwrap();
        assert_eq!(session.state, SyncState::Pending);

        session.start(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap());
        store.save_session(&session).unwrap();

        let loaded = store.load_session(session.id).unwrap();
        assert_eq!(loaded.state, SyncState::Processing);
        assert_eq!(
            loaded.last_sync_at.map(OffsetDateTime::unix_timestamp),
            Some(1_700_000_000)
        );

        session.fail();
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session(session.id).unwrap().state, SyncState::Failed);
    }
}
