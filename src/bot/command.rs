//! Command parsing for inbound chat text.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::CommandInfo;

/// `/name`, optionally addressed as `/name@botname`, followed by arguments.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([A-Za-z][A-Za-z0-9_]*)(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$").unwrap()
});

/// Commands advertised to every channel, in menu order.
pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "start",
        description: "Register your developer profile",
    },
    CommandInfo {
        name: "profile",
        description: "Show a profile: /profile [@handle]",
    },
    CommandInfo {
        name: "update",
        description: "Fill in your profile again",
    },
    CommandInfo {
        name: "search",
        description: "Find developers by city",
    },
    CommandInfo {
        name: "stats",
        description: "Profile count and average salary",
    },
    CommandInfo {
        name: "cancel",
        description: "Stop the current questionnaire",
    },
    CommandInfo {
        name: "help",
        description: "List commands",
    },
];

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Look up a profile; `None` means the caller's own.
    Profile(Option<String>),
    Update,
    Search,
    Stats,
    Cancel,
    Help,
    Unknown(String),
}

impl Command {
    /// Parse message text. Returns `None` for plain text.
    pub fn parse(content: &str) -> Option<Self> {
        let caps = COMMAND_RE.captures(content.trim())?;
        let name = caps.get(1)?.as_str().to_lowercase();
        let args = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

        let command = match name.as_str() {
            "start" => Self::Start,
            "profile" => Self::Profile(parse_handle(args)),
            "update" => Self::Update,
            "search" => Self::Search,
            "stats" => Self::Stats,
            "cancel" => Self::Cancel,
            "help" => Self::Help,
            _ => Self::Unknown(name),
        };
        Some(command)
    }
}

/// First argument as a handle, without the leading `@`.
fn parse_handle(args: &str) -> Option<String> {
    let first = args.split_whitespace().next()?;
    let handle = first.trim_start_matches('@');
    (!handle.is_empty()).then(|| handle.to_string())
}

/// The `/help` text.
pub fn help_text() -> String {
    let lines: Vec<String> = COMMANDS
        .iter()
        .map(|c| format!("/{} - {}", c.name, c.description))
        .collect();
    format!("Available commands:\n{}", lines.join("\n"))
}
