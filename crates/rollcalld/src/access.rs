//! Startup access gate.
//!
//! Runs once before any engine state exists; a denial means the daemon
//! never starts.

use std::io::{BufRead, Write};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied,
}

/// Compare a supplied secret against the configured one, both trimmed.
pub fn check(supplied: &str, expected: &str) -> AccessDecision {
    let supplied = supplied.trim().as_bytes();
    let expected = expected.trim().as_bytes();

    if bool::from(supplied.ct_eq(expected)) {
        AccessDecision::Granted
    } else {
        AccessDecision::Denied
    }
}

/// Obtain the secret from `ROLLCALL_ACCESS_SECRET`, or prompt on the terminal.
pub fn read_secret(
    env_secret: Option<String>,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> std::io::Result<String> {
    if let Some(secret) = env_secret {
        return Ok(secret);
    }
    write!(prompt, "Enter password: ")?;
    prompt.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line)
}
