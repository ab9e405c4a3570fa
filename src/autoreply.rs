//! Heuristics for spotting automatic replies (out-of-office notices, bulk mail, etc.) by their
//! headers.

use crate::mail::HeaderLookup;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The header is there at all, whatever its value (even empty).
    Present,

    /// The value is one of these, ignoring case.
    OneOf(&'static [&'static str]),

    /// The value contains this, ignoring case.
    Contains(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub header: &'static str,
    pub condition: Condition,
}

const PRECEDENCE_VALUES: &[&str] = &["bulk", "auto_reply", "junk"];

/// Any one of these matching means the message was sent by a machine.
pub const RULES: &[Rule] = &[
    Rule { header: "Auto-Submitted", condition: Condition::OneOf(&["auto-replied", "auto-generated"]) },
    Rule { header: "Precedence", condition: Condition::OneOf(PRECEDENCE_VALUES) },
    Rule { header: "X-Precedence", condition: Condition::OneOf(PRECEDENCE_VALUES) },
    Rule { header: "Return-Path", condition: Condition::Present },
    Rule { header: "Subject", condition: Condition::Contains("Out of Office") },
    Rule { header: "X-Autoreply", condition: Condition::OneOf(&["yes"]) },
    Rule { header: "X-Autorespond", condition: Condition::Present },
    Rule { header: "X-Auto-Response-Suppress", condition: Condition::Present },
];

impl Rule {
    pub fn matches(&self, headers: &(impl HeaderLookup + ?Sized)) -> bool {
        match self.condition {
            Condition::Present => headers.has_header(self.header),
            Condition::OneOf(values) => headers.header_values(self.header)
                .map(str::trim)
                .any(|value| values.iter().any(|v| value.eq_ignore_ascii_case(v))),
            Condition::Contains(needle) => {
                let needle = needle.to_ascii_lowercase();
                headers.header_values(self.header)
                    .any(|value| value.to_ascii_lowercase().contains(&needle))
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.condition {
            Condition::Present => write!(f, "{} header present", self.header),
            Condition::OneOf(values) => write!(f, "{} is one of {:?}", self.header, values),
            Condition::Contains(needle) => write!(f, "{} contains {:?}", self.header, needle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub ignore: bool,
    /// The first rule that matched. Only for diagnostics.
    pub reason: Option<&'static Rule>,
}

pub fn classify(headers: &(impl HeaderLookup + ?Sized)) -> Classification {
    let reason = RULES.iter().find(|rule| rule.matches(headers));
    Classification {
        ignore: reason.is_some(),
        reason,
    }
}
