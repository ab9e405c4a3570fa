use anyhow::Context;
use crate::mail::{MailSource, Message, RunStats};
use maildir::{MailEntry, Maildir};
use std::collections::HashSet;
use std::path::Path;

/// Reads messages from a maildir: everything in `new`, plus anything it kept on earlier passes.
///
/// Messages pending deletion are deleted when the batch is settled. Kept messages are moved to
/// `cur` without flags, and are looked at again on every later pass, so a reply that arrives
/// before its edition is registered gets picked up once it is. Messages in `cur` with any flags
/// set belong to someone else and are skipped. Messages that can't be parsed at all never make
/// it into a batch and stay where they are.
pub struct MaildirSource {
    maildir: Maildir,
    dry_run: bool,
    in_new: HashSet<String>,
}

impl MaildirSource {
    pub fn open(path: &Path, dry_run: bool) -> Self {
        Self {
            maildir: Maildir::from(path.to_owned()),
            dry_run,
            in_new: HashSet::new(),
        }
    }
}

fn read_entry(mut entry: MailEntry) -> Option<Message> {
    let id = entry.id().to_owned();
    match entry.parsed() {
        Ok(parsed) => Some(Message::from_parsed(id, &parsed)),
        Err(e) => {
            warn!("failed to parse mail message {id}: {e}; leaving it alone");
            None
        }
    }
}

impl MailSource for MaildirSource {
    fn fetch(&mut self) -> anyhow::Result<Vec<Message>> {
        let mut batch = vec![];
        self.in_new.clear();

        for entry_result in self.maildir.list_new() {
            let entry = entry_result.context("failed to iterate maildir entries")?;
            if let Some(message) = read_entry(entry) {
                self.in_new.insert(message.id.clone());
                batch.push(message);
            }
        }

        for entry_result in self.maildir.list_cur() {
            let entry = entry_result.context("failed to iterate maildir entries")?;
            if !entry.flags().is_empty() {
                continue;
            }
            batch.extend(read_entry(entry));
        }

        debug!("fetched {} messages ({} new)", batch.len(), self.in_new.len());
        Ok(batch)
    }

    fn settle(&mut self, batch: Vec<Message>, stats: &mut RunStats) -> anyhow::Result<()> {
        for message in batch {
            let id = &message.id;
            debug!("settling message {id}: {:?}", message.intent());
            if message.pending_delete() {
                if self.dry_run {
                    info!("would delete message {id}");
                } else {
                    self.maildir.delete(id)
                        .with_context(|| format!("failed to delete message {id}"))?;
                }
                stats.num_deleted += 1;
            } else {
                if self.dry_run {
                    info!("would keep message {id}");
                } else if self.in_new.contains(id) {
                    self.maildir.move_new_to_cur(id)
                        .with_context(|| format!("failed to move message {id} from new to cur"))?;
                }
                stats.num_kept += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn setup() -> (tempfile::TempDir, Maildir) {
        let dir = tempfile::tempdir().unwrap();
        let maildir = Maildir::from(dir.path().to_owned());
        maildir.create_dirs().unwrap();
        (dir, maildir)
    }

    #[test]
    fn test_fetch_and_settle() {
        let (dir, maildir) = setup();
        let delete_id = maildir.store_new(b"To: a@example.com\r\nSubject: one\r\n\r\nfirst\r\n").unwrap();
        let keep_id = maildir.store_new(b"To: b@example.com\r\nSubject: two\r\n\r\nsecond\r\n").unwrap();

        let mut source = MaildirSource::open(dir.path(), false);
        let mut batch = source.fetch().unwrap();
        assert_eq!(2, batch.len());
        for message in &mut batch {
            assert!(message.pending_delete());
            if message.id == keep_id {
                message.keep();
            }
        }

        let mut stats = RunStats::default();
        source.settle(batch, &mut stats).unwrap();
        assert_eq!(1, stats.num_deleted);
        assert_eq!(1, stats.num_kept);

        assert_eq!(0, maildir.count_new());
        assert_eq!(1, maildir.count_cur());
        assert!(maildir.find(&delete_id).is_none());
        assert!(maildir.find(&keep_id).is_some());

        // Kept mail comes back on the next pass, and can be consumed then.
        let batch = source.fetch().unwrap();
        assert_eq!(vec![keep_id.clone()], batch.iter().map(|m| m.id.clone()).collect::<Vec<_>>());
        let mut stats = RunStats::default();
        source.settle(batch, &mut stats).unwrap();
        assert_eq!(1, stats.num_deleted);
        assert_eq!(0, maildir.count_cur());
        assert!(source.fetch().unwrap().is_empty());
    }

    #[test]
    fn test_kept_stays_kept() {
        let (dir, maildir) = setup();
        maildir.store_new(b"To: a@example.com\r\n\r\nfirst\r\n").unwrap();

        let mut source = MaildirSource::open(dir.path(), false);
        for _ in 0 .. 3 {
            let mut batch = source.fetch().unwrap();
            assert_eq!(1, batch.len());
            batch[0].keep();
            source.settle(batch, &mut RunStats::default()).unwrap();
            assert_eq!(0, maildir.count_new());
            assert_eq!(1, maildir.count_cur());
        }
    }

    #[test]
    fn test_flagged_cur_skipped() {
        let (dir, maildir) = setup();
        let id = maildir.store_cur_with_flags(b"To: a@example.com\r\n\r\nread already\r\n", "S")
            .unwrap();

        let mut source = MaildirSource::open(dir.path(), false);
        assert!(source.fetch().unwrap().is_empty());
        assert!(maildir.find(&id).is_some());
    }

    #[test]
    fn test_undecodable_body_consumed() {
        let (dir, maildir) = setup();
        maildir.store_new(b"To: fc+1@example.com\r\n\
            Content-Transfer-Encoding: base64\r\n\
            \r\n\
            !!!not base64###\r\n").unwrap();

        let mut source = MaildirSource::open(dir.path(), false);
        let batch = source.fetch().unwrap();
        assert_eq!(1, batch.len());
        assert_eq!(vec!["fc+1@example.com"], batch[0].to);

        let mut stats = RunStats::default();
        source.settle(batch, &mut stats).unwrap();
        assert_eq!(1, stats.num_deleted);
        assert_eq!(0, maildir.count_new());
        assert_eq!(0, maildir.count_cur());
    }

    #[test]
    fn test_unsettled_left_alone() {
        let (dir, maildir) = setup();
        maildir.store_new(b"To: a@example.com\r\n\r\nfirst\r\n").unwrap();

        let mut source = MaildirSource::open(dir.path(), false);
        let batch = source.fetch().unwrap();
        assert_eq!(1, batch.len());
        source.settle(vec![], &mut RunStats::default()).unwrap();
        assert_eq!(1, maildir.count_new());
    }

    #[test]
    fn test_dry_run() {
        let (dir, maildir) = setup();
        maildir.store_new(b"To: a@example.com\r\n\r\nfirst\r\n").unwrap();

        let mut source = MaildirSource::open(dir.path(), true);
        let batch = source.fetch().unwrap();
        let mut stats = RunStats::default();
        source.settle(batch, &mut stats).unwrap();
        assert_eq!(1, stats.num_deleted);
        assert_eq!(1, maildir.count_new());
    }
}
