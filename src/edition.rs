use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Where an edition is in the editorial workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditionState {
    LinedUp,
    Draft,
    InReview,
    AmendsNeeded,
    FactCheck,
    FactCheckReceived,
    Ready,
    ScheduledForPublishing,
    Published,
    Archived,
}

const ALL_STATES: &[EditionState] = &[
    EditionState::LinedUp,
    EditionState::Draft,
    EditionState::InReview,
    EditionState::AmendsNeeded,
    EditionState::FactCheck,
    EditionState::FactCheckReceived,
    EditionState::Ready,
    EditionState::ScheduledForPublishing,
    EditionState::Published,
    EditionState::Archived,
];

impl EditionState {
    pub fn as_str(self) -> &'static str {
        match self {
            EditionState::LinedUp => "lined_up",
            EditionState::Draft => "draft",
            EditionState::InReview => "in_review",
            EditionState::AmendsNeeded => "amends_needed",
            EditionState::FactCheck => "fact_check",
            EditionState::FactCheckReceived => "fact_check_received",
            EditionState::Ready => "ready",
            EditionState::ScheduledForPublishing => "scheduled_for_publishing",
            EditionState::Published => "published",
            EditionState::Archived => "archived",
        }
    }
}

impl FromStr for EditionState {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATES.iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| anyhow!("unknown edition state {:?}", s))
    }
}

impl fmt::Display for EditionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of workflow step an [`Action`] records. Other parts of the workflow write other
/// values; those are carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestType {
    ReceiveFactCheck,
    Other(String),
}

impl RequestType {
    pub fn as_str(&self) -> &str {
        match self {
            RequestType::ReceiveFactCheck => "receive_fact_check",
            RequestType::Other(s) => s,
        }
    }
}

impl From<String> for RequestType {
    fn from(s: String) -> Self {
        if s == "receive_fact_check" {
            RequestType::ReceiveFactCheck
        } else {
            RequestType::Other(s)
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub request_type: RequestType,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edition {
    pub id: i64,
    pub title: String,
    pub fact_check_email_address: String,
    pub state: EditionState,
    /// Oldest first. Only ever appended to.
    pub actions: Vec<Action>,
}

/// Persistence for editions, as far as fact-check ingestion needs it.
pub trait EditionStore {
    fn find_by_fact_check_address(&self, address: &str) -> anyhow::Result<Option<Edition>>;
    fn append_action(&mut self, edition: &Edition, action: &Action) -> anyhow::Result<()>;
    fn set_state(&mut self, edition: &Edition, state: EditionState) -> anyhow::Result<()>;
}

/// Record a fact-check response against an edition and move it to `fact_check_received`,
/// whatever state it was in before.
pub fn receive_fact_check(store: &mut dyn EditionStore, edition: &mut Edition, body: &str)
    -> anyhow::Result<()>
{
    let action = Action {
        request_type: RequestType::ReceiveFactCheck,
        comment: body.to_owned(),
        created_at: Utc::now(),
    };
    store.append_action(edition, &action)?;
    edition.actions.push(action);

    store.set_state(edition, EditionState::FactCheckReceived)?;
    edition.state = EditionState::FactCheckReceived;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_state_names() {
        for state in ALL_STATES {
            assert_eq!(*state, state.as_str().parse::<EditionState>().unwrap());
        }
        assert_eq!(10, ALL_STATES.len());
        assert_eq!("fact_check_received", EditionState::FactCheckReceived.as_str());
        assert_eq!(EditionState::InReview, "in_review".parse::<EditionState>().unwrap());
        assert!("bogus".parse::<EditionState>().is_err());
    }

    #[test]
    fn test_request_type() {
        assert_eq!(RequestType::ReceiveFactCheck, RequestType::from("receive_fact_check".to_owned()));
        let other = RequestType::from("send_fact_check".to_owned());
        assert_eq!(RequestType::Other("send_fact_check".to_owned()), other);
        assert_eq!("send_fact_check", other.as_str());
    }

    #[test]
    fn test_receive_from_any_state() {
        let mut db = Database::open_in_memory().unwrap();
        for state in &[EditionState::FactCheck, EditionState::InReview,
                       EditionState::FactCheckReceived, EditionState::Published]
        {
            let mut edition = db.create_edition("Answer", *state, |id| format!("fc+{}@example.com", id))
                .unwrap();
            receive_fact_check(&mut db, &mut edition, "I like it. Good work!").unwrap();
            assert_eq!(EditionState::FactCheckReceived, edition.state);

            let stored = db.find_by_fact_check_address(&edition.fact_check_email_address)
                .unwrap()
                .unwrap();
            assert_eq!(edition, stored);
            let action = stored.actions.last().unwrap();
            assert_eq!(RequestType::ReceiveFactCheck, action.request_type);
            assert_eq!("I like it. Good work!", action.comment);
        }
    }

    #[test]
    fn test_duplicates_recorded() {
        let mut db = Database::open_in_memory().unwrap();
        let mut edition = db.create_edition("Answer", EditionState::FactCheck, |id| format!("fc+{}@example.com", id))
            .unwrap();
        receive_fact_check(&mut db, &mut edition, "same").unwrap();
        receive_fact_check(&mut db, &mut edition, "same").unwrap();
        let stored = db.find_by_fact_check_address(&edition.fact_check_email_address)
            .unwrap()
            .unwrap();
        assert_eq!(2, stored.actions.len());
    }
}
