//! The bot: commands and the message loop that ties channels to flows.

pub mod bot_loop;
pub mod command;

pub use bot_loop::{Bot, BotDeps, TRANSIENT_FAILURE};
pub use command::{COMMANDS, Command};
