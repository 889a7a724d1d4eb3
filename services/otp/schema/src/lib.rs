//! sea-orm entities for the OTP service tables.

pub mod otp_attempts;
pub mod otp_challenges;
