use crate::edition::{Edition, EditionStore};
use crate::mail::Message;

/// Find the edition whose fact-check mailbox this message was sent to, looking at To, then Cc,
/// then Bcc. Addresses have to match exactly.
pub fn resolve(store: &dyn EditionStore, message: &Message) -> anyhow::Result<Option<Edition>> {
    for address in message.recipients() {
        if let Some(edition) = store.find_by_fact_check_address(address)? {
            debug!("message {} is addressed to edition {} via {}", message.id, edition.id, address);
            return Ok(Some(edition));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::Database;
    use crate::edition::EditionState;

    fn setup() -> (Database, Edition) {
        let mut db = Database::open_in_memory().unwrap();
        let edition = db.create_edition("Answer", EditionState::FactCheck,
            |id| format!("factcheck+{}@example.com", id)).unwrap();
        (db, edition)
    }

    fn mail(headers: &str) -> Message {
        let raw = format!("From: foo@example.com\r\n{}Subject: response\r\n\r\nI like it.\r\n", headers);
        Message::parse("1", raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_to() {
        let (db, edition) = setup();
        let msg = mail(&format!("To: {}\r\n", edition.fact_check_email_address));
        assert_eq!(Some(edition.id), resolve(&db, &msg).unwrap().map(|e| e.id));
    }

    #[test]
    fn test_cc_with_irrelevant_to() {
        let (db, edition) = setup();
        let msg = mail(&format!("To: something@example.com\r\nCc: {}\r\n",
            edition.fact_check_email_address));
        assert_eq!(Some(edition.id), resolve(&db, &msg).unwrap().map(|e| e.id));
    }

    #[test]
    fn test_bcc_without_to() {
        let (db, edition) = setup();
        let msg = mail(&format!("Bcc: {}\r\n", edition.fact_check_email_address));
        assert!(msg.to.is_empty());
        assert_eq!(Some(edition.id), resolve(&db, &msg).unwrap().map(|e| e.id));
    }

    #[test]
    fn test_display_name() {
        let (db, edition) = setup();
        let msg = mail(&format!("To: \"Fact Check\" <{}>\r\n", edition.fact_check_email_address));
        assert_eq!(Some(edition.id), resolve(&db, &msg).unwrap().map(|e| e.id));
    }

    #[test]
    fn test_first_listed_wins() {
        let (mut db, first) = setup();
        let second = db.create_edition("Other answer", EditionState::FactCheck,
            |id| format!("factcheck+{}@example.com", id)).unwrap();
        let msg = mail(&format!("To: {}, {}\r\n",
            second.fact_check_email_address, first.fact_check_email_address));
        assert_eq!(Some(second.id), resolve(&db, &msg).unwrap().map(|e| e.id));
    }

    #[test]
    fn test_no_match() {
        let (db, edition) = setup();
        assert!(resolve(&db, &mail("To: something@example.com\r\n")).unwrap().is_none());
        assert!(resolve(&db, &mail("")).unwrap().is_none());

        // no partial matches
        let domain_only = edition.fact_check_email_address.split('@').nth(1).unwrap();
        let msg = mail(&format!("To: other@{}\r\n", domain_only));
        assert!(resolve(&db, &msg).unwrap().is_none());
        let msg = mail(&format!("To: x{}\r\n", edition.fact_check_email_address));
        assert!(resolve(&db, &msg).unwrap().is_none());
    }
}
