//! Interactive prompts. Passwords and credentials go straight into secure
//! buffers; the intermediate `String`s from the prompt library are consumed
//! by value so no extra copies linger.

use std::io::Write;

use frostbox_core::{FbError, FbResult};
use frostbox_secure::SecureBytes;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 64;

/// Masked prompt for an existing password.
pub fn password(prompt: &str) -> FbResult<SecureBytes> {
    let entered = rpassword::prompt_password(prompt)?;
    Ok(SecureBytes::from_vec(entered.into_bytes()))
}

/// Masked prompt for a new password: length-checked and confirmed.
pub fn new_password() -> FbResult<SecureBytes> {
    for _ in 0..3 {
        let first = rpassword::prompt_password("New vault password: ")?;
        if first.len() < MIN_PASSWORD_LEN || first.len() > MAX_PASSWORD_LEN {
            eprintln!(
                "Password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters."
            );
            continue;
        }
        let second = rpassword::prompt_password("Confirm password: ")?;
        let a = SecureBytes::from_vec(first.into_bytes());
        let b = SecureBytes::from_vec(second.into_bytes());
        let matched = a.ct_eq(&b)?;
        b.destroy();
        if matched {
            return Ok(a);
        }
        a.destroy();
        eprintln!("Passwords do not match.");
    }
    Err(FbError::Format("too many password attempts".into()))
}

/// Plain line prompt with a default shown in brackets.
pub fn line(label: &str, default: &str) -> FbResult<String> {
    if default.is_empty() {
        print!("{label}: ");
    } else {
        print!("{label} [{default}]: ");
    }
    std::io::stdout().flush()?;

    let mut buf = String::new();
    std::io::stdin().read_line(&mut buf)?;
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Masked prompt for a credential that must not be empty.
pub fn secret(label: &str) -> FbResult<SecureBytes> {
    let entered = rpassword::prompt_password(format!("{label}: "))?;
    if entered.is_empty() {
        return Err(FbError::Format(format!("{label} must not be empty")));
    }
    Ok(SecureBytes::from_vec(entered.into_bytes()))
}
