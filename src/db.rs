use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use crate::edition::{Action, Edition, EditionState, EditionStore};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_rusqlite::from_rows;
use std::convert::TryFrom;
use std::path::Path;

pub struct Database {
    db: rusqlite::Connection,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let db = rusqlite::Connection::open(path)
            .with_context(|| format!("failed to open SQLite database {:?}", path))?;
        Self::init(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let db = rusqlite::Connection::open_in_memory()
            .context("failed to open in-memory SQLite database")?;
        Self::init(db)
    }

    fn init(db: rusqlite::Connection) -> anyhow::Result<Self> {
        // The address is filled in right after insert, once the row ID is known.
        db.execute("CREATE TABLE IF NOT EXISTS editions (\
            id INTEGER PRIMARY KEY NOT NULL,\
            title TEXT NOT NULL,\
            fact_check_email_address TEXT UNIQUE,\
            state TEXT NOT NULL\
        )", [])
            .context("failed to create 'editions' database table")?;

        db.execute("CREATE TABLE IF NOT EXISTS actions (\
            id INTEGER PRIMARY KEY NOT NULL,\
            edition_id INTEGER NOT NULL REFERENCES editions (id),\
            request_type TEXT NOT NULL,\
            comment TEXT NOT NULL,\
            created_at TEXT NOT NULL\
        )", [])
            .context("failed to create 'actions' database table")?;

        db.execute("CREATE INDEX IF NOT EXISTS idx_actions_edition ON actions (\
            edition_id\
        )", [])
            .context("failed to create index on 'actions' database table")?;

        Ok(Self { db })
    }

    /// Add a new edition. Its fact-check address is derived from the ID it gets assigned.
    pub fn create_edition(
        &mut self,
        title: &str,
        state: EditionState,
        address_for: impl FnOnce(i64) -> String,
    ) -> anyhow::Result<Edition> {
        let tx = self.db.transaction()?;

        tx.execute(
            "INSERT INTO editions (title, state) VALUES (?1, ?2)",
            params![title, state.as_str()],
        )
            .context("failed to insert edition")?;

        let id = tx.last_insert_rowid();
        let address = address_for(id);

        let update_result = tx.execute(
            "UPDATE editions SET fact_check_email_address = ?1 WHERE id = ?2",
            params![address, id],
        );
        if update_result.is_unique_constraint_error() {
            bail!("fact-check address {:?} is already assigned to another edition", address);
        }
        update_result.context("failed to set fact-check address")?;

        tx.commit().context("failed to commit db transaction")?;

        info!("created edition {} with fact-check address {}", id, address);
        Ok(Edition {
            id,
            title: title.to_owned(),
            fact_check_email_address: address,
            state,
            actions: vec![],
        })
    }

    fn get_actions(&self, edition_id: i64) -> anyhow::Result<Vec<Action>> {
        let mut stmt = self.db.prepare(
            "SELECT request_type, comment, created_at FROM actions \
                WHERE edition_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query([edition_id])?;
        let mut actions = vec![];
        for raw in from_rows::<ActionRaw>(rows) {
            let raw = raw.context("failed to deserialize action")?;
            actions.push(Action::try_from(raw)
                .with_context(|| format!("bad action row for edition {}", edition_id))?);
        }
        Ok(actions)
    }
}

impl EditionStore for Database {
    fn find_by_fact_check_address(&self, address: &str) -> anyhow::Result<Option<Edition>> {
        let mut stmt = self.db.prepare(
            "SELECT id, title, fact_check_email_address, state FROM editions \
                WHERE fact_check_email_address = ?1")?;
        let rows = stmt.query([address])?;
        let raw = match from_rows::<EditionRaw>(rows).next() {
            Some(raw) => raw.with_context(|| format!("failed to deserialize edition for {:?}", address))?,
            None => return Ok(None),
        };

        let state = raw.state.parse::<EditionState>()
            .with_context(|| format!("bad state for edition {}", raw.id))?;
        let actions = self.get_actions(raw.id)?;
        Ok(Some(Edition {
            id: raw.id,
            title: raw.title,
            fact_check_email_address: raw.fact_check_email_address,
            state,
            actions,
        }))
    }

    fn append_action(&mut self, edition: &Edition, action: &Action) -> anyhow::Result<()> {
        self.db.execute(
            "INSERT INTO actions (edition_id, request_type, comment, created_at) \
                VALUES (?1, ?2, ?3, ?4)",
            params![
                edition.id,
                action.request_type.as_str(),
                action.comment,
                action.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )
            .with_context(|| format!("failed to insert action for edition {}", edition.id))?;
        Ok(())
    }

    fn set_state(&mut self, edition: &Edition, state: EditionState) -> anyhow::Result<()> {
        let n = self.db.execute(
            "UPDATE editions SET state = ?1 WHERE id = ?2",
            params![state.as_str(), edition.id],
        )
            .with_context(|| format!("failed to update state of edition {}", edition.id))?;
        if n != 1 {
            return Err(anyhow!("no edition with ID {}", edition.id));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct EditionRaw {
    pub id: i64,
    pub title: String,
    pub fact_check_email_address: String,
    pub state: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ActionRaw {
    pub request_type: String,
    pub comment: String,
    pub created_at: String,
}

impl TryFrom<ActionRaw> for Action {
    type Error = anyhow::Error;
    fn try_from(raw: ActionRaw) -> Result<Self, Self::Error> {
        Ok(Action {
            created_at: DateTime::parse_from_rfc3339(&raw.created_at)
                .with_context(|| format!("bogus action time {:?}", raw.created_at))?
                .with_timezone(&Utc),
            request_type: raw.request_type.into(),
            comment: raw.comment,
        })
    }
}

trait RusqliteResultExt {
    fn is_unique_constraint_error(&self) -> bool;
}

impl<T> RusqliteResultExt for Result<T, rusqlite::Error> {
    fn is_unique_constraint_error(&self) -> bool {
        matches!(self,
            Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error {
                        code: rusqlite::ErrorCode::ConstraintViolation,
                        extended_code: 2067, // SQLITE_CONSTRAINT_UNIQUE
                    },
                    ..
            )))
    }
}
