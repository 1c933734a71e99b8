//! Chat (`/manhunt`) and console (`mhunt`) commands.
//!
//! Replies go to the caller through the host's messenger. A disabled event
//! ignores every command.

use serde::Serialize;
use tracing::{info, warn};

use crate::constants::ADMIN_PERMISSION;
use crate::error::HuntError;
use crate::host::GameHost;
use crate::lang::{render, Message, MessageKey};
use crate::machine::{HuntEvent, JoinOutcome, StartOutcome};
use crate::state_store::StateStore;
use crate::types::Audience;

pub const CHAT_COMMAND: &str = "manhunt";
pub const CONSOLE_COMMAND: &str = "mhunt";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Disabled,
    Help,
    Denied,
    /// Console command from a participant holding temporary elevation.
    Refused,
    Unknown(String),
    Start(StartOutcome),
    NotEnoughPlayers,
    End { ended: bool },
    Join(JoinOutcome),
}

/// Splits `/name arg arg` into a lowercase name and its arguments.
pub fn parse_command_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut words = line.trim().trim_start_matches('/').split_whitespace();
    let name = words.next()?.to_ascii_lowercase();
    Some((name, words.map(str::to_string).collect()))
}

pub fn run_chat_command<H: GameHost, S: StateStore>(
    event: &mut HuntEvent<H, S>,
    caller: &str,
    args: &[String],
    now_ms: u64,
) -> Result<CommandOutcome, HuntError> {
    if !event.config().enabled {
        return Ok(CommandOutcome::Disabled);
    }

    let is_admin = event.host().has_permission(caller, ADMIN_PERMISSION);
    let Some(sub) = args.first().map(|arg| arg.to_ascii_lowercase()) else {
        send_help(event, caller, is_admin);
        return Ok(CommandOutcome::Help);
    };
    if sub != "join" && !is_admin {
        reply(event, Some(caller), Message::new(MessageKey::NeedPermission));
        return Ok(CommandOutcome::Denied);
    }

    match sub.as_str() {
        "start" => start(event, Some(caller), now_ms),
        "end" => Ok(end(event, Some(caller), now_ms)),
        "join" => Ok(CommandOutcome::Join(event.join_hunt(caller)?)),
        _ => {
            send_help(event, caller, is_admin);
            Ok(CommandOutcome::Unknown(sub))
        }
    }
}

/// Refuses any console command from a participant who currently holds
/// temporary elevation, and logs it as a possible cheat attempt. Server
/// console input (`caller == None`) always passes.
pub fn console_guard<H: GameHost + ?Sized>(host: &H, caller: Option<&str>, command: &str) -> bool {
    let Some(id) = caller else {
        return true;
    };
    if !host.is_temporarily_elevated(id) {
        return true;
    }

    let name = host
        .find(id)
        .map(|participant| participant.name)
        .unwrap_or_else(|| id.to_string());
    let warning = Message::with_args(MessageKey::CheatWarning, [name, command.to_string()]);
    warn!(participant = %id, command, "{}", render("en", &warning));
    false
}

pub fn run_console_command<H: GameHost, S: StateStore>(
    event: &mut HuntEvent<H, S>,
    caller: Option<&str>,
    line: &str,
    now_ms: u64,
) -> Result<CommandOutcome, HuntError> {
    if !console_guard(event.host(), caller, line) {
        return Ok(CommandOutcome::Refused);
    }
    let Some((name, args)) = parse_command_line(line) else {
        return Ok(CommandOutcome::Unknown(String::new()));
    };
    if name != CONSOLE_COMMAND {
        return Ok(CommandOutcome::Unknown(name));
    }
    if !event.config().enabled {
        return Ok(CommandOutcome::Disabled);
    }
    if let Some(id) = caller {
        if !event.host().has_permission(id, ADMIN_PERMISSION) {
            reply(event, caller, Message::new(MessageKey::NeedPermission));
            return Ok(CommandOutcome::Denied);
        }
    }

    let sub = args.first().map(|arg| arg.to_ascii_lowercase());
    match sub.as_deref() {
        Some("start") => start(event, caller, now_ms),
        Some("end") => Ok(end(event, caller, now_ms)),
        other => Ok(CommandOutcome::Unknown(other.unwrap_or_default().to_string())),
    }
}

fn start<H: GameHost, S: StateStore>(
    event: &mut HuntEvent<H, S>,
    caller: Option<&str>,
    now_ms: u64,
) -> Result<CommandOutcome, HuntError> {
    match event.request_start(now_ms) {
        Ok(StartOutcome::AlreadyRunning) => {
            reply(event, caller, Message::new(MessageKey::AlreadyStarted));
            Ok(CommandOutcome::Start(StartOutcome::AlreadyRunning))
        }
        Ok(started) => {
            info!(caller = caller.unwrap_or("console"), "manhunt started by command");
            Ok(CommandOutcome::Start(started))
        }
        Err(HuntError::InsufficientParticipants { found, required }) => {
            reply(
                event,
                caller,
                Message::with_args(MessageKey::NotEnoughPlayers, [found, required]),
            );
            Ok(CommandOutcome::NotEnoughPlayers)
        }
        Err(error) => Err(error),
    }
}

fn end<H: GameHost, S: StateStore>(
    event: &mut HuntEvent<H, S>,
    caller: Option<&str>,
    now_ms: u64,
) -> CommandOutcome {
    let ended = event.end_by_command(now_ms).is_some();
    if !ended {
        reply(event, caller, Message::new(MessageKey::ChatNoActiveEvent));
    }
    CommandOutcome::End { ended }
}

fn send_help<H: GameHost, S: StateStore>(event: &mut HuntEvent<H, S>, caller: &str, is_admin: bool) {
    reply(event, Some(caller), Message::new(MessageKey::CommandListHead));
    let mut entries = vec!["join"];
    if is_admin {
        entries.extend(["start", "end"]);
    }
    for entry in entries {
        let line = format!("/{CHAT_COMMAND} {entry}");
        reply(event, Some(caller), Message::with_args(MessageKey::CommandListEntry, [line]));
    }
}

/// Console replies without a participant only reach the log.
fn reply<H: GameHost, S: StateStore>(event: &mut HuntEvent<H, S>, caller: Option<&str>, message: Message) {
    match caller {
        Some(id) => event
            .host_mut()
            .emit(&Audience::One(id.to_string()), &message),
        None => info!("{}", render("en", &message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::config::HuntConfig;
    use crate::host::PrivilegeElevation;
    use crate::state_store::MemoryStateStore;
    use crate::types::{Phase, Vec3};

    fn event_with(config: HuntConfig, ids: &[&str]) -> HuntEvent<Arena, MemoryStateStore> {
        let mut arena = Arena::new();
        for id in ids {
            arena.connect(id, &id.to_uppercase(), Vec3::default());
        }
        if let Some(admin) = arena.player_mut("admin") {
            admin.admin = true;
        }
        HuntEvent::new(config, arena, MemoryStateStore::new(), 11)
    }

    fn event(ids: &[&str]) -> HuntEvent<Arena, MemoryStateStore> {
        event_with(HuntConfig::default(), ids)
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn parse_command_line_strips_slash_and_lowercases() {
        assert_eq!(
            parse_command_line("/ManHunt  JOIN now"),
            Some(("manhunt".to_string(), args(&["JOIN", "now"])))
        );
        assert_eq!(parse_command_line("   "), None);
    }

    #[test]
    fn help_lists_admin_commands_only_for_admins() {
        let mut event = event(&["admin", "p1"]);
        assert_eq!(
            run_chat_command(&mut event, "p1", &[], 0).expect("help"),
            CommandOutcome::Help
        );
        assert_eq!(event.host().chat_count(MessageKey::CommandListEntry), 1);

        run_chat_command(&mut event, "admin", &[], 0).expect("help");
        assert_eq!(event.host().chat_count(MessageKey::CommandListEntry), 4);
        assert_eq!(event.host().chat_count(MessageKey::CommandListHead), 2);
    }

    #[test]
    fn non_admin_may_only_join() {
        let mut event = event(&["admin", "p1", "p2"]);
        assert_eq!(
            run_chat_command(&mut event, "p1", &args(&["start"]), 0).expect("start"),
            CommandOutcome::Denied
        );
        assert_eq!(event.host().chat_count(MessageKey::NeedPermission), 1);
        assert_eq!(event.phase(), Phase::Idle);

        assert!(matches!(
            run_chat_command(&mut event, "admin", &args(&["START"]), 0).expect("start"),
            CommandOutcome::Start(StartOutcome::Started { .. })
        ));
        let joiner = ["admin", "p1", "p2"]
            .into_iter()
            .find(|id| !event.registry().is_hunted(id))
            .expect("someone is not hunted");
        assert_eq!(
            run_chat_command(&mut event, joiner, &args(&["join"]), 1).expect("join"),
            CommandOutcome::Join(JoinOutcome::Joined)
        );
    }

    #[test]
    fn start_reports_too_few_players_and_running_event() {
        let mut event = event(&["admin"]);
        assert_eq!(
            run_chat_command(&mut event, "admin", &args(&["start"]), 0).expect("start"),
            CommandOutcome::NotEnoughPlayers
        );
        assert_eq!(event.host().chat_count(MessageKey::NotEnoughPlayers), 1);

        event.host_mut().connect("p1", "P1", Vec3::default());
        run_chat_command(&mut event, "admin", &args(&["start"]), 0).expect("start");
        assert_eq!(
            run_chat_command(&mut event, "admin", &args(&["start"]), 1).expect("start"),
            CommandOutcome::Start(StartOutcome::AlreadyRunning)
        );
        assert_eq!(event.host().chat_count(MessageKey::AlreadyStarted), 1);
    }

    #[test]
    fn end_without_event_tells_caller() {
        let mut event = event(&["admin", "p1"]);
        assert_eq!(
            run_chat_command(&mut event, "admin", &args(&["end"]), 0).expect("end"),
            CommandOutcome::End { ended: false }
        );
        assert_eq!(event.host().chat_count(MessageKey::ChatNoActiveEvent), 1);
    }

    #[test]
    fn disabled_event_ignores_commands() {
        let config = HuntConfig {
            enabled: false,
            ..HuntConfig::default()
        };
        let mut event = event_with(config, &["admin", "p1"]);
        assert_eq!(
            run_chat_command(&mut event, "admin", &args(&["start"]), 0).expect("start"),
            CommandOutcome::Disabled
        );
        assert_eq!(
            run_console_command(&mut event, None, "mhunt start", 0).expect("console"),
            CommandOutcome::Disabled
        );
        assert!(event.host().events().is_empty());
        assert_eq!(event.phase(), Phase::Idle);
    }

    #[test]
    fn server_console_starts_and_ends() {
        let mut event = event(&["p1", "p2"]);
        assert!(matches!(
            run_console_command(&mut event, None, "mhunt start", 0).expect("console"),
            CommandOutcome::Start(StartOutcome::Started { .. })
        ));
        assert_eq!(
            run_console_command(&mut event, None, "mhunt end", 10).expect("console"),
            CommandOutcome::End { ended: true }
        );
        assert_eq!(event.phase(), Phase::Idle);
    }

    #[test]
    fn temp_elevated_caller_is_refused() {
        let mut event = event(&["admin", "p1"]);
        event
            .host_mut()
            .grant_elevation("p1")
            .expect("p1 connected");
        assert_eq!(
            run_console_command(&mut event, Some("p1"), "mhunt start", 0).expect("console"),
            CommandOutcome::Refused
        );
        assert!(!console_guard(event.host(), Some("p1"), "env.time 12"));
        assert!(console_guard(event.host(), Some("admin"), "env.time 12"));
        assert!(console_guard(event.host(), None, "env.time 12"));
        assert_eq!(event.phase(), Phase::Idle);
    }

    #[test]
    fn player_console_needs_permission() {
        let mut event = event(&["admin", "p1"]);
        assert_eq!(
            run_console_command(&mut event, Some("p1"), "mhunt start", 0).expect("console"),
            CommandOutcome::Denied
        );
        assert_eq!(
            run_console_command(&mut event, Some("p1"), "say hi", 0).expect("console"),
            CommandOutcome::Unknown("say".to_string())
        );
    }
}
