use anyhow::Context;
use crate::autoreply::classify;
use crate::config::{Config, IncomingMailConfig};
use crate::db::Database;
use crate::edition::{receive_fact_check, Action, Edition, EditionState, EditionStore};
use crate::mail::{MailSource, Message, RunStats};
use crate::maildir::MaildirSource;
use crate::resolve::resolve;
use crate::IngestArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not addressed to any edition; kept in the mailbox.
    Unmatched,
    /// Addressed to an edition but sent by a machine; consumed without recording anything.
    Ignored,
    /// Recorded against an edition.
    Recorded,
}

/// Run one ingestion pass over whatever `source` has waiting.
///
/// `on_each` is called once for every message in the batch, after it has been dealt with.
///
/// If the store fails partway through, the messages already dealt with are settled and the rest
/// are left in the source for next time.
pub fn process(
    source: &mut dyn MailSource,
    store: &mut dyn EditionStore,
    mut on_each: Option<&mut dyn FnMut(&Message, Outcome)>,
) -> anyhow::Result<RunStats> {
    let mut batch = source.fetch().context("failed to retrieve mail")?;
    let mut stats = RunStats::default();

    for i in 0 .. batch.len() {
        let outcome = match process_message(store, &mut batch[i]) {
            Ok(outcome) => outcome,
            Err(e) => {
                let failed_id = batch[i].id.clone();
                batch.truncate(i);
                if let Err(settle_err) = source.settle(batch, &mut stats) {
                    error!("failed to settle partially processed mail: {:#}", settle_err);
                }
                error!("aborted after {} messages: {:#?}", i, stats);
                return Err(e.context(format!("failed to process message {failed_id}")));
            }
        };

        stats.num_processed += 1;
        match outcome {
            Outcome::Unmatched => stats.num_unmatched += 1,
            Outcome::Ignored => stats.num_ignored += 1,
            Outcome::Recorded => stats.num_recorded += 1,
        }

        if let Some(f) = on_each.as_mut() {
            f(&batch[i], outcome);
        }
    }

    source.settle(batch, &mut stats).context("failed to settle processed mail")?;
    Ok(stats)
}

fn process_message(store: &mut dyn EditionStore, message: &mut Message) -> anyhow::Result<Outcome> {
    let mut edition = match resolve(&*store, message)? {
        Some(edition) => edition,
        None => {
            info!("message {} isn't addressed to any edition; keeping it", message.id);
            message.keep();
            return Ok(Outcome::Unmatched);
        }
    };

    let classification = classify(&*message);
    if let Some(rule) = classification.reason {
        info!("ignoring automatic reply {} for edition {} ({})", message.id, edition.id, rule);
        return Ok(Outcome::Ignored);
    }

    receive_fact_check(store, &mut edition, &message.body)?;
    message.mark_for_delete();
    info!("recorded fact check response {} for edition {}", message.id, edition.id);
    Ok(Outcome::Recorded)
}

/// Reads from the real store, but only logs writes.
struct DryRun<'a, S> {
    inner: &'a S,
}

impl<S: EditionStore> EditionStore for DryRun<'_, S> {
    fn find_by_fact_check_address(&self, address: &str) -> anyhow::Result<Option<Edition>> {
        self.inner.find_by_fact_check_address(address)
    }

    fn append_action(&mut self, edition: &Edition, action: &Action) -> anyhow::Result<()> {
        println!("edition {}: would add {} action:\n{}",
            edition.id, action.request_type, action.comment);
        Ok(())
    }

    fn set_state(&mut self, edition: &Edition, state: EditionState) -> anyhow::Result<()> {
        println!("edition {}: would change state {} -> {}", edition.id, edition.state, state);
        Ok(())
    }
}

pub fn ingest(config: &Config, args: IngestArgs) -> anyhow::Result<()> {
    let mut db = Database::open(&config.database_path)?;

    let mut source: Box<dyn MailSource> = match config.incoming_mail {
        IncomingMailConfig::Maildir { ref path } => {
            Box::new(MaildirSource::open(path, args.dry_run))
        }
    };

    let mut log_each = |message: &Message, outcome: Outcome| {
        debug!("message {} ({:?}): {:?}", message.id, message.subject, outcome);
    };

    let stats = if args.dry_run {
        let mut store = DryRun { inner: &db };
        process(source.as_mut(), &mut store, Some(&mut log_each))?
    } else {
        process(source.as_mut(), &mut db, Some(&mut log_each))?
    };

    info!("{:#?}", stats);

    Ok(())
}
