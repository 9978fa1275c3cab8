use crate::command::Command;

/// Decode one request line.
///
/// Blank input yields the empty command. Otherwise the line is split on runs
/// of whitespace; the first token is the name and the rest are the arguments.
pub fn decode(line: &str) -> Command {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(name) => Command {
            name: name.to_string(),
            args: tokens.map(str::to_string).collect(),
        },
        None => Command::empty(),
    }
}

/// Encode a response. Handler text goes out verbatim.
pub fn encode(response: String) -> String {
    response
}
