use crate::command::{AuthRequirement, Command};

pub const LOG_OUT_FIRST: &str = "Log out first";
pub const LOG_IN_FIRST: &str = "Log in first";

/// Check a command against the session state before it runs.
///
/// The auth requirement is checked before the argument count. Unknown command
/// names always pass; the dispatcher answers them.
pub fn validate(identity: Option<&str>, command: &Command) -> Option<String> {
    let kind = command.kind()?;

    match (kind.auth(), identity) {
        (AuthRequirement::MustBeAbsent, Some(_)) => return Some(LOG_OUT_FIRST.to_string()),
        (AuthRequirement::MustBePresent, None) => return Some(LOG_IN_FIRST.to_string()),
        _ => {}
    }

    check_argument_count(kind.arity(), command.args.len())
}

fn check_argument_count(expected: usize, actual: usize) -> Option<String> {
    match expected {
        _ if expected == actual => None,
        1 => Some("1 argument expected".to_string()),
        n => Some(format!("{n} arguments expected")),
    }
}
