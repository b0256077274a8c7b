// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client shell command parsing

use std::time::Duration;

use thiserror::Error;

pub const HELP: &str = "\
Commands:
  read <path> <offset> <count>     Read bytes (served from cache when fresh)
  insert <path> <offset> <text>    Insert text at a byte offset
  append <path> <text>             Append text to the end of a file
  touch <path>                     Create a file or update its access time
  ls [path]                        List a directory
  attr <path>                      Show server modification and access times
  register <path> <interval>       Receive updates for a path (e.g. 30s, 5m)
  help                             Show this message
  exit                             Leave the shell";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Read {
        path: String,
        offset: usize,
        count: usize,
    },
    Insert {
        path: String,
        offset: usize,
        text: String,
    },
    Append {
        path: String,
        text: String,
    },
    Touch {
        path: String,
    },
    List {
        path: String,
    },
    Attr {
        path: String,
    },
    Register {
        path: String,
        interval: Duration,
    },
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(String);

fn usage(text: &str) -> ParseError {
    ParseError(format!("usage: {}", text))
}

fn number(value: &str, name: &str) -> Result<usize, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

/// Bare integers are seconds
fn interval(value: &str) -> Result<Duration, ParseError> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| ParseError(format!("invalid interval '{}': {}", value, e)))
}

impl ShellCommand {
    /// `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        let Some((verb, rest)) = split_word(line) else {
            return Ok(None);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "read" | "cat" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next(), args.next()) {
                    (Some(path), Some(offset), Some(count), None) => ShellCommand::Read {
                        path: path.to_string(),
                        offset: number(offset, "offset")?,
                        count: number(count, "count")?,
                    },
                    _ => return Err(usage("read <path> <offset> <count>")),
                }
            }
            "insert" => {
                let (path, rest) = split_word(rest).ok_or_else(|| usage("insert <path> <offset> <text>"))?;
                let (offset, text) = split_word(rest).ok_or_else(|| usage("insert <path> <offset> <text>"))?;
                if text.is_empty() {
                    return Err(usage("insert <path> <offset> <text>"));
                }
                ShellCommand::Insert {
                    path: path.to_string(),
                    offset: number(offset, "offset")?,
                    text: text.to_string(),
                }
            }
            "append" => {
                let (path, text) = split_word(rest).ok_or_else(|| usage("append <path> <text>"))?;
                if text.is_empty() {
                    return Err(usage("append <path> <text>"));
                }
                ShellCommand::Append {
                    path: path.to_string(),
                    text: text.to_string(),
                }
            }
            "touch" => ShellCommand::Touch {
                path: single_path(rest, "touch <path>")?,
            },
            "ls" | "list" => ShellCommand::List {
                path: if rest.is_empty() {
                    "/".to_string()
                } else {
                    single_path(rest, "ls [path]")?
                },
            },
            "attr" | "stat" => ShellCommand::Attr {
                path: single_path(rest, "attr <path>")?,
            },
            "register" | "watch" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(path), Some(value), None) => ShellCommand::Register {
                        path: path.to_string(),
                        interval: interval(value)?,
                    },
                    _ => return Err(usage("register <path> <interval>")),
                }
            }
            "help" | "?" => ShellCommand::Help,
            "exit" | "quit" => ShellCommand::Exit,
            other => return Err(ParseError(format!("unknown command '{}' (try 'help')", other))),
        };

        Ok(Some(command))
    }
}

/// First whitespace-delimited word and the trimmed remainder
fn split_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim_start())),
        None => Some((input, "")),
    }
}

fn single_path(rest: &str, text: &str) -> Result<String, ParseError> {
    let mut args = rest.split_whitespace();
    match (args.next(), args.next()) {
        (Some(path), None) => Ok(path.to_string()),
        _ => Err(usage(text)),
    }
}
