use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EmailError {
    #[error("email is required")]
    Empty,

    #[error("not a valid email address: {0}")]
    Invalid(String),
}

/// Validated participant email, set once at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantEmail(String);

impl ParticipantEmail {
    /// Validate and wrap an email address.
    ///
    /// Accepts the minimal `local@domain.tld` shape: exactly one `@`, a
    /// non-empty local part, and a dot inside the domain. No attempt is made
    /// to chase the full RFC grammar.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Empty` for blank input and `EmailError::Invalid`
    /// for anything that does not look like an address.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, EmailError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(EmailError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(EmailError::Invalid(raw.to_string()));
        }

        let mut parts = raw.splitn(2, '@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        let domain_ok = domain
            .rsplit_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
            && !domain.contains('@');
        if local.is_empty() || !domain_ok {
            return Err(EmailError::Invalid(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantEmail {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
