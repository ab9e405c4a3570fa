use anyhow::Context;
use mailparse::body::Body;
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};

/// Something that hands out batches of inbound mail and afterwards disposes of each message
/// according to its [`DeleteIntent`].
pub trait MailSource {
    /// Retrieve the next batch of messages. Every message starts out with
    /// [`DeleteIntent::Unset`].
    fn fetch(&mut self) -> anyhow::Result<Vec<Message>>;

    /// Delete every message in `batch` still pending deletion, and retain the rest.
    /// Messages the source handed out but which are not in `batch` must be left untouched.
    fn settle(&mut self, batch: Vec<Message>, stats: &mut RunStats) -> anyhow::Result<()>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub num_processed: usize,
    pub num_recorded: usize,
    pub num_ignored: usize,
    pub num_unmatched: usize,
    pub num_deleted: usize,
    pub num_kept: usize,
}

/// What should happen to a message once the batch it came in is finished.
///
/// The mail source's policy is to delete whatever it hands out, so `Unset` means delete. A
/// consumer that can't handle a message has to opt out explicitly with `Keep`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteIntent {
    #[default]
    Unset,
    Delete,
    Keep,
}

impl DeleteIntent {
    pub fn pending_delete(self) -> bool {
        !matches!(self, DeleteIntent::Keep)
    }
}

/// Lookup of header values by case-insensitive name.
///
/// A header that is present with an empty value is `Some("")`, which is distinct from a header
/// that isn't there at all.
pub trait HeaderLookup {
    /// All values for the named header, in the order they appear.
    fn header_values<'a>(&'a self, name: &str) -> Box<dyn Iterator<Item = &'a str> + 'a>;

    fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }
}

impl HeaderLookup for Headers {
    fn header_values<'a>(&'a self, name: &str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        let name = name.to_owned();
        Box::new(self.entries.iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(&name))
            .map(|(_, value)| value.as_str()))
    }
}

/// An email message plucked from a MailSource.
#[derive(Debug, Clone)]
pub struct Message {
    /// Identifier assigned by the mail source; only meaningful to that source.
    pub id: String,
    pub headers: Headers,
    /// Recipient addresses in the order they appear, without duplicates.
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    intent: DeleteIntent,
}

impl Message {
    pub fn parse(id: impl Into<String>, raw: &[u8]) -> anyhow::Result<Self> {
        let parsed = mailparse::parse_mail(raw)
            .context("failed to parse email")?;
        Ok(Self::from_parsed(id, &parsed))
    }

    /// Never fails: anything missing or malformed comes out empty (or undecoded, for bodies).
    pub fn from_parsed(id: impl Into<String>, parsed: &ParsedMail<'_>) -> Self {
        let id = id.into();
        let mut headers = Headers::new();
        for header in &parsed.headers {
            headers.push(header.get_key(), header.get_value());
        }

        Message {
            to: address_list(parsed, "To"),
            cc: address_list(parsed, "Cc"),
            bcc: address_list(parsed, "Bcc"),
            subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
            body: body_text(&id, parsed),
            headers,
            id,
            intent: DeleteIntent::Unset,
        }
    }

    pub fn intent(&self) -> DeleteIntent {
        self.intent
    }

    pub fn pending_delete(&self) -> bool {
        self.intent.pending_delete()
    }

    pub fn keep(&mut self) {
        self.intent = DeleteIntent::Keep;
    }

    pub fn mark_for_delete(&mut self) {
        self.intent = DeleteIntent::Delete;
    }

    /// Every envelope recipient: To, then Cc, then Bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to.iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }
}

impl HeaderLookup for Message {
    fn header_values<'a>(&'a self, name: &str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        self.headers.header_values(name)
    }
}

/// Collect the addresses in every occurrence of the named header. Values that don't parse as
/// address lists are split on commas instead; this never fails.
fn address_list(parsed: &ParsedMail<'_>, name: &str) -> Vec<String> {
    let mut list = vec![];
    let mut add = |addr: &str| {
        if !list.iter().any(|a: &String| a == addr) {
            list.push(addr.to_owned());
        }
    };
    for value in parsed.headers.get_all_values(name) {
        match mailparse::addrparse(&value) {
            Ok(addrs) => {
                for addr in addrs.iter() {
                    match addr {
                        MailAddr::Single(info) => add(info.addr.as_str()),
                        MailAddr::Group(group) => {
                            for info in &group.addrs {
                                add(info.addr.as_str());
                            }
                        }
                    }
                }
            }
            Err(e) => {
                debug!("unparseable {} header {:?}: {}", name, value, e);
                value.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .for_each(&mut add);
            }
        }
    }
    list
}

/// Find parts with "inline" content disposition and "text/plain" mimetype and concatenate them
/// together. If there are none, settle for the first text part of any kind.
fn body_text(id: &str, parsed: &ParsedMail<'_>) -> String {
    if parsed.subparts.is_empty() {
        return part_text(id, parsed);
    }

    let mut body = String::new();
    let mut found_something = false;
    collect_plain_text(id, parsed, &mut body, &mut found_something);
    if found_something {
        return body;
    }

    match first_text_part(parsed) {
        Some(part) => part_text(id, part),
        None => {
            warn!("no text part found in message {id}; using empty body");
            String::new()
        }
    }
}

fn collect_plain_text(id: &str, part: &ParsedMail<'_>, body: &mut String, found: &mut bool) {
    for sub in &part.subparts {
        if !sub.subparts.is_empty() {
            collect_plain_text(id, sub, body, found);
            continue;
        }
        let disposition = sub.get_content_disposition().disposition;
        if disposition == mailparse::DispositionType::Inline && sub.ctype.mimetype == "text/plain" {
            if *found {
                *body += "\n\n";
            }
            *body += &part_text(id, sub);
            *found = true;
        }
    }
}

/// Decoded text of a single part. If the transfer encoding or charset is broken, use the raw
/// bytes as they came.
fn part_text(id: &str, part: &ParsedMail<'_>) -> String {
    match part.get_body() {
        Ok(text) => text,
        Err(e) => {
            warn!("unable to decode body of message {id} ({e}); using it undecoded");
            match part.get_body_encoded() {
                Body::Base64(body) | Body::QuotedPrintable(body) => {
                    String::from_utf8_lossy(body.get_raw()).into_owned()
                }
                Body::SevenBit(body) | Body::EightBit(body) => {
                    String::from_utf8_lossy(body.get_raw()).into_owned()
                }
                Body::Binary(body) => String::from_utf8_lossy(body.get_raw()).into_owned(),
            }
        }
    }
}

fn first_text_part<'a>(part: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    if part.subparts.is_empty() {
        return if part.ctype.mimetype.starts_with("text/") { Some(part) } else { None };
    }
    part.subparts.iter().find_map(first_text_part)
}
