//! Normalized OTP destinations.
//!
//! Email addresses are trimmed and case-folded. Phone numbers are reduced to
//! E.164 (`+` followed by 8..=15 digits); a 10-digit local number starting
//! with `0` is rewritten with the configured default country code.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    Email,
    Phone,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecipient {
    #[error("recipient is empty")]
    Empty,
    #[error("malformed email address")]
    MalformedEmail,
    #[error("malformed phone number")]
    MalformedPhone,
}

/// A normalized email address or E.164 phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    kind: RecipientKind,
    value: String,
}

impl Recipient {
    /// Normalize raw user input. Anything containing `@` is treated as email.
    pub fn parse(raw: &str, default_country_code: &str) -> Result<Self, InvalidRecipient> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidRecipient::Empty);
        }
        if raw.contains('@') {
            Self::email(raw)
        } else {
            Self::phone(raw, default_country_code)
        }
    }

    pub fn email(raw: &str) -> Result<Self, InvalidRecipient> {
        let value = raw.trim().to_lowercase();
        let (local, domain) = value
            .split_once('@')
            .ok_or(InvalidRecipient::MalformedEmail)?;
        let domain_ok = domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains('@');
        if local.is_empty() || !domain_ok || value.chars().any(char::is_whitespace) {
            return Err(InvalidRecipient::MalformedEmail);
        }
        Ok(Self {
            kind: RecipientKind::Email,
            value,
        })
    }

    pub fn phone(raw: &str, default_country_code: &str) -> Result<Self, InvalidRecipient> {
        let raw = raw.trim();
        let has_plus = raw.starts_with('+');
        let mut digits = String::with_capacity(raw.len());
        for (i, c) in raw.chars().enumerate() {
            match c {
                '0'..='9' => digits.push(c),
                '+' if i == 0 => {}
                ' ' | '-' | '(' | ')' | '.' => {}
                _ => return Err(InvalidRecipient::MalformedPhone),
            }
        }

        let e164 = if !has_plus && digits.len() == 10 && digits.starts_with('0') {
            format!("+{default_country_code}{}", &digits[1..])
        } else {
            format!("+{digits}")
        };

        let significant = e164.len() - 1;
        if !(8..=15).contains(&significant) || e164[1..].starts_with('0') {
            return Err(InvalidRecipient::MalformedPhone);
        }
        Ok(Self {
            kind: RecipientKind::Phone,
            value: e164,
        })
    }

    pub fn kind(&self) -> RecipientKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Log-safe rendering, e.g. `a***@example.com` or `+233*****678`.
    pub fn masked(&self) -> String {
        mask(&self.value)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Mask an already-normalized recipient string for logging.
pub fn mask(value: &str) -> String {
    if let Some((local, domain)) = value.split_once('@') {
        let first = local.chars().next().unwrap_or('*');
        return format!("{first}***@{domain}");
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 7 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 7))
}
