//! Terminal input helpers
use std::io::{stdin, stdout, Write};

use crate::errors::{GitMigratorError, GitMigratorErrorKind};

/// Get input from the user
pub(crate) fn input() -> Result<String, GitMigratorError> {
    let mut s = String::new();
    let _ = stdout().flush();
    stdin().read_line(&mut s).map_err(|e| {
        GitMigratorError::new(GitMigratorErrorKind::Input)
            .with_text(&format!("Did not enter a correct string: {e}"))
    })?;
    Ok(trim_newline(s))
}

/// Remove the trailing line ending
fn trim_newline(mut s: String) -> String {
    if let Some('\n') = s.chars().next_back() {
        s.pop();
    }
    if let Some('\r') = s.chars().next_back() {
        s.pop();
    }
    s
}

/// Parse a yes/no answer
fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

/// Get a yes/no input from the user
pub(crate) fn yes_no_input<S: AsRef<str>>(msg: S) -> Result<bool, GitMigratorError> {
    let msg = msg.as_ref();
    loop {
        println!("{msg}");
        match parse_yes_no(&input()?) {
            Some(answer) => return Ok(answer),
            None => println!("Invalid input"),
        }
    }
}

/// Get password from the user
pub(crate) fn get_password() -> Result<String, GitMigratorError> {
    rpassword::read_password().map_err(|e| {
        GitMigratorError::new(GitMigratorErrorKind::Input)
            .with_text(&format!("Error reading password: {e}"))
    })
}
