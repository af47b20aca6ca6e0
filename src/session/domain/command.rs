//! Interactive commands typed at the session prompt.

use crate::tool_registry::domain::ServerName;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Bare word accepted as the end-session signal.
pub const STOP_WORD: &str = "STOP";

/// A command typed instead of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// List the commands.
    Help,
    /// List the tools offered to the model.
    Tools,
    /// Report the status and health of every server.
    Servers,
    /// Forget the conversation so far.
    Clear,
    /// Re-open one server's connection.
    Reconnect(ServerName),
    /// Re-list one server's tools.
    Refresh(ServerName),
    /// Write the conversation to a JSON file.
    Save(Utf8PathBuf),
    /// End the session.
    Exit,
}

impl SessionCommand {
    /// One line per command, for `/help`.
    pub const HELP: &'static str = "\
/help                 show this list
/tools                list the tools offered to the model
/servers              show server status and health
/clear                forget the conversation so far
/reconnect <server>   re-open a server connection
/refresh <server>     re-list a server's tools
/save <path>          write the conversation to a JSON file
/exit, /stop, STOP    end the session";

    /// Parses a line of human input.
    ///
    /// Returns `None` when the line is an ordinary message. Anything that
    /// starts with `/`, and the bare word `STOP`, is read as a command.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] when the line is a malformed command.
    pub fn parse(raw: &str) -> Option<Result<Self, CommandError>> {
        let trimmed = raw.trim();
        if trimmed == STOP_WORD {
            return Some(Ok(Self::Exit));
        }
        let body = trimmed.strip_prefix('/')?;
        Some(parse_command(body))
    }

    /// Returns the command name without the leading slash.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Tools => "tools",
            Self::Servers => "servers",
            Self::Clear => "clear",
            Self::Reconnect(_) => "reconnect",
            Self::Refresh(_) => "refresh",
            Self::Save(_) => "save",
            Self::Exit => "exit",
        }
    }
}

/// Errors for malformed commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command name is not known.
    #[error("unknown command '/{0}' (try /help)")]
    UnknownCommand(String),

    /// A required argument is missing.
    #[error("'/{command}' needs a {argument} argument")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// Missing argument name.
        argument: &'static str,
    },

    /// Too many arguments were given.
    #[error("too many arguments for '/{0}'")]
    TooManyArguments(&'static str),

    /// An argument is malformed.
    #[error("invalid argument for '/{command}': {reason}")]
    InvalidArgument {
        /// Command name.
        command: &'static str,
        /// Why the argument was rejected.
        reason: String,
    },

    /// A quoted argument was not terminated.
    #[error("unterminated quoted value in command")]
    UnterminatedQuotedValue,
}

fn parse_command(body: &str) -> Result<SessionCommand, CommandError> {
    let tokens = tokenize(body)?;
    let mut iter = tokens.into_iter();
    let name = iter.next().unwrap_or_default().to_ascii_lowercase();
    let argument = iter.next();
    let has_argument = argument.is_some();
    let extra = iter.next().is_some();
    let command = match name.as_str() {
        "help" | "?" => SessionCommand::Help,
        "tools" => SessionCommand::Tools,
        "servers" => SessionCommand::Servers,
        "clear" => SessionCommand::Clear,
        "exit" | "stop" | "quit" => SessionCommand::Exit,
        "reconnect" => SessionCommand::Reconnect(server_argument("reconnect", argument)?),
        "refresh" => SessionCommand::Refresh(server_argument("refresh", argument)?),
        "save" => SessionCommand::Save(Utf8PathBuf::from(argument.ok_or(
            CommandError::MissingArgument {
                command: "save",
                argument: "path",
            },
        )?)),
        _ => return Err(CommandError::UnknownCommand(name)),
    };
    let surplus = match command {
        SessionCommand::Reconnect(_) | SessionCommand::Refresh(_) | SessionCommand::Save(_) => {
            extra
        }
        _ => has_argument,
    };
    if surplus {
        return Err(CommandError::TooManyArguments(command.name()));
    }
    Ok(command)
}

fn server_argument(
    command: &'static str,
    argument: Option<String>,
) -> Result<ServerName, CommandError> {
    let raw = argument.ok_or(CommandError::MissingArgument {
        command,
        argument: "server",
    })?;
    ServerName::new(raw).map_err(|err| CommandError::InvalidArgument {
        command,
        reason: err.to_string(),
    })
}

/// Splits on whitespace, honouring single and double quotes and `\` escapes
/// inside quotes.
fn tokenize(input: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes: Option<char> = None;
    let mut escaped = false;

    for character in input.chars() {
        if let Some(quote_char) = in_quotes {
            if escaped {
                current.push(character);
                escaped = false;
                continue;
            }
            match character {
                '\\' => escaped = true,
                _ if character == quote_char => in_quotes = None,
                _ => current.push(character),
            }
            continue;
        }
        match character {
            '"' | '\'' => in_quotes = Some(character),
            _ if character.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(character),
        }
    }

    if in_quotes.is_some() || escaped {
        return Err(CommandError::UnterminatedQuotedValue);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
