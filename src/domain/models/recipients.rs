//! Email recipient list for a report schedule.
//!
//! The list is canonical at the API boundary. Storage uses a comma-joined
//! column, which is decoded strictly: an empty or malformed entry in the
//! stored value is a data error, never silently dropped.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Maximum length of a single address (RFC 5321 path limit).
const MAX_ADDRESS_LEN: usize = 254;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// Whether `address` is a syntactically valid email address.
pub fn is_valid_email(address: &str) -> bool {
    address.len() <= MAX_ADDRESS_LEN && EMAIL_RE.is_match(address)
}

/// Ordered, deduplicated list of valid email addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Recipients(Vec<String>);

impl Recipients {
    /// Validate and normalize raw entries.
    ///
    /// Entries are trimmed; duplicates (case-insensitive) keep their first
    /// occurrence. Returns one message per rejected entry.
    pub fn parse<I, S>(entries: I) -> Result<Self, Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut accepted: Vec<String> = Vec::new();
        let mut problems = Vec::new();

        for entry in entries {
            let address = entry.as_ref().trim();
            if address.is_empty() {
                problems.push("Recipient entries must not be empty.".to_string());
                continue;
            }
            if !is_valid_email(address) {
                problems.push(format!("'{address}' is not a valid email address."));
                continue;
            }
            if !accepted.iter().any(|a| a.eq_ignore_ascii_case(address)) {
                accepted.push(address.to_string());
            }
        }

        if problems.is_empty() {
            Ok(Self(accepted))
        } else {
            Err(problems)
        }
    }

    /// Decode the comma-joined storage form.
    pub fn from_storage(stored: &str) -> DomainResult<Self> {
        if stored.is_empty() {
            return Ok(Self::default());
        }
        Self::parse(stored.split(',')).map_err(|problems| {
            DomainError::SerializationError(format!(
                "invalid stored recipients: {}",
                problems.join(" ")
            ))
        })
    }

    /// Encode into the comma-joined storage form.
    pub fn to_storage(&self) -> String {
        self.0.join(",")
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for Recipients {
    type Error = String;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(entries).map_err(|problems| problems.join(" "))
    }
}

impl From<Recipients> for Vec<String> {
    fn from(recipients: Recipients) -> Self {
        recipients.0
    }
}

impl<'a> IntoIterator for &'a Recipients {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_dedups_in_order() {
        let recipients =
            Recipients::parse([" ops@ex.com", "qa@ex.com", "OPS@ex.com", "plant@ex.co.uk"]).unwrap();
        assert_eq!(
            recipients.as_slice(),
            &["ops@ex.com", "qa@ex.com", "plant@ex.co.uk"]
        );
    }

    #[test]
    fn test_parse_rejects_blank_and_malformed() {
        let problems = Recipients::parse(["ops@ex.com", "  ", "not-an-email", "a@b"]).unwrap_err();
        assert_eq!(problems.len(), 3);
        assert!(problems[1].contains("not-an-email"));
    }

    #[test]
    fn test_storage_round_trip() {
        let recipients = Recipients::parse(["a@ex.com", "b@ex.com"]).unwrap();
        let stored = recipients.to_storage();
        assert_eq!(stored, "a@ex.com,b@ex.com");
        assert_eq!(Recipients::from_storage(&stored).unwrap(), recipients);
        assert!(Recipients::from_storage("").unwrap().is_empty());
    }

    #[test]
    fn test_storage_decode_is_strict() {
        assert!(Recipients::from_storage("a@ex.com,,b@ex.com").is_err());
        assert!(Recipients::from_storage("a@ex.com, ").is_err());
        assert!(Recipients::from_storage("junk").is_err());
    }

    #[test]
    fn test_serde_uses_plain_array() {
        let recipients: Recipients = serde_json::from_str(r#"["ops@ex.com"]"#).unwrap();
        assert_eq!(serde_json::to_string(&recipients).unwrap(), r#"["ops@ex.com"]"#);
        assert!(serde_json::from_str::<Recipients>(r#"[""]"#).is_err());
    }
}
