//! Why an OTP was issued. Scopes uniqueness and lookup of challenges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Registration,
    Login,
    PasswordReset,
    EmailVerification,
    PhoneVerification,
    AccountSecurity,
    ProfileUpdate,
    SensitiveAction,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown purpose: {0}")]
pub struct UnknownPurpose(pub String);

impl Purpose {
    pub const ALL: [Purpose; 8] = [
        Self::Registration,
        Self::Login,
        Self::PasswordReset,
        Self::EmailVerification,
        Self::PhoneVerification,
        Self::AccountSecurity,
        Self::ProfileUpdate,
        Self::SensitiveAction,
    ];

    /// Wire/storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Login => "login",
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
            Self::PhoneVerification => "phone_verification",
            Self::AccountSecurity => "account_security",
            Self::ProfileUpdate => "profile_update",
            Self::SensitiveAction => "sensitive_action",
        }
    }

    /// Human-readable label, used when rendering messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Login => "login verification",
            Self::PasswordReset => "password reset",
            Self::EmailVerification => "email verification",
            Self::PhoneVerification => "phone verification",
            Self::AccountSecurity => "account security",
            Self::ProfileUpdate => "profile update",
            Self::SensitiveAction => "action verification",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = UnknownPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPurpose(s.to_owned()))
    }
}
