//! Interactive commands read from stdin during `join`.

use frames::{Reaction, Status};

pub const HELP: &str = "\
commands:
  vote <value>                  cast a vote (same value again clears it)
  status <status>               idle | deciding | confused | sleeping | ready
  reveal | reset                show or clear the votes
  emoji <name> <reaction>       heart | up | fire | party | poop | down
  add <column> <text>           add a board item
  edit <column> <item> <text>   edit one of your items
  delete <column> <item>        delete one of your items
  hover | unhover               pretend to hover over the cards
  who                           list participants
  retry                         retry after the connection was lost
  leave                         leave the room and exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Vote(String),
    Status(Status),
    Reveal,
    Reset,
    Emoji { target: String, reaction: Reaction },
    Add { column: String, content: String },
    Edit { column: String, item: String, content: String },
    Delete { column: String, item: String },
    Hover,
    Unhover,
    Who,
    Retry,
    Leave,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`; try `help`")]
    Unknown(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("`{0}` is not a status you can set")]
    InvalidStatus(String),
    #[error("{0}")]
    InvalidReaction(String),
}

/// Parse one input line.
///
/// # Errors
///
/// Returns a [`ParseError`] naming what is wrong with the line.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = split_word(line);
    match word {
        "" => Err(ParseError::Empty),
        "vote" => Ok(Command::Vote(required(rest, "vote value")?.to_owned())),
        "status" => parse_status(required(rest, "status")?).map(Command::Status),
        "reveal" => Ok(Command::Reveal),
        "reset" => Ok(Command::Reset),
        "emoji" => {
            let (target, reaction) = split_word(rest);
            let target = required(target, "participant name")?;
            let reaction = required(reaction, "reaction")?
                .parse::<Reaction>()
                .map_err(ParseError::InvalidReaction)?;
            Ok(Command::Emoji { target: target.to_owned(), reaction })
        }
        "add" => {
            let (column, content) = split_word(rest);
            Ok(Command::Add {
                column: required(column, "column")?.to_owned(),
                content: required(content, "text")?.to_owned(),
            })
        }
        "edit" => {
            let (column, rest) = split_word(rest);
            let (item, content) = split_word(rest);
            Ok(Command::Edit {
                column: required(column, "column")?.to_owned(),
                item: required(item, "item id")?.to_owned(),
                content: required(content, "text")?.to_owned(),
            })
        }
        "delete" => {
            let (column, item) = split_word(rest);
            Ok(Command::Delete {
                column: required(column, "column")?.to_owned(),
                item: required(item, "item id")?.to_owned(),
            })
        }
        "hover" => Ok(Command::Hover),
        "unhover" => Ok(Command::Unhover),
        "who" => Ok(Command::Who),
        "retry" => Ok(Command::Retry),
        "leave" | "quit" | "exit" => Ok(Command::Leave),
        "help" | "?" => Ok(Command::Help),
        other => Err(ParseError::Unknown(other.to_owned())),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn required<'a>(value: &'a str, what: &'static str) -> Result<&'a str, ParseError> {
    if value.is_empty() { Err(ParseError::Missing(what)) } else { Ok(value) }
}

fn parse_status(word: &str) -> Result<Status, ParseError> {
    serde_json::from_value::<Status>(serde_json::Value::String(word.to_ascii_lowercase()))
        .ok()
        .filter(|status| status.is_client_settable())
        .ok_or_else(|| ParseError::InvalidStatus(word.to_owned()))
}

#[cfg(test)]
#[path = "commands_test.rs"]
mod tests;
