use rand::RngExt;

use agri_domain::challenge::CodeAlphabet;

const DIGITS: &[u8] = b"0123456789";
const NON_ZERO_DIGITS: &[u8] = b"123456789";
/// Uppercase alphanumeric charset.
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a passcode from the OS-seeded thread RNG.
///
/// Numeric codes never start with `0`.
pub fn generate_code(length: usize, alphabet: CodeAlphabet) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|i| {
            let charset = match alphabet {
                CodeAlphabet::Numeric if i == 0 => NON_ZERO_DIGITS,
                CodeAlphabet::Numeric => DIGITS,
                CodeAlphabet::Alphanumeric => ALPHANUMERIC,
            };
            charset[rng.random_range(0..charset.len())] as char
        })
        .collect()
}
