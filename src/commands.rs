//! MQTT command routing.
//!
//! Commands arrive on `<base>/cmd/<suffix>`. Each suffix pattern maps to one
//! handler; `+` matches one topic level (the pin number). The result is
//! published as a status word on `<base>/status` (retained).
//!
//! `restart` only announces itself here: the caller reboots on
//! [`Reply::Restart`] once the status word is out.

use serde::Deserialize;

use crate::config::{ConfigError, ExclusionRequest, PinRequest, TriggerRequest};
use crate::service::IoService;
use crate::trigger::TriggerError;

/// Command error with code and message.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command")]
    UnknownCommand,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid pin '{0}'")]
    InvalidPin(String),

    #[error("GPIO{0} is not configured")]
    NotConfigured(u8),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand => "E01",
            Self::InvalidPayload(_) => "E02",
            Self::InvalidPin(_) => "E03",
            Self::NotConfigured(_) => "E04",
            Self::Config(e) => e.code(),
            Self::Trigger(e) => e.code(),
        }
    }
}

/// Handler result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Status word for `<base>/status`.
    Status(&'static str),
    /// Document for `<base>/config`.
    Config(String),
    /// Pins published by a direct report.
    Reported(usize),
    /// "restarting" was published; the caller reboots the device.
    Restart,
}

type Handler = fn(&mut IoService, &[&str], &[u8]) -> Result<Reply, CommandError>;

/// Command descriptor.
pub struct CommandDescriptor {
    pub pattern: &'static str,
    pub brief: &'static str,
    /// Status word published when the handler fails.
    pub failure: Option<&'static str>,
    pub handler: Handler,
}

/// All available commands.
pub static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor { pattern: "io/config", brief: "Configure a pin", failure: Some("io_config_failed"), handler: cmd_config },
    CommandDescriptor { pattern: "io/remove", brief: "Remove a pin", failure: Some("io_remove_failed"), handler: cmd_remove },
    CommandDescriptor { pattern: "io/exclude", brief: "Replace the exclusion set", failure: Some("io_exclude_failed"), handler: cmd_exclude },
    CommandDescriptor { pattern: "io/+/trigger", brief: "Drive an output pin", failure: Some("io_trigger_failed"), handler: cmd_trigger },
    CommandDescriptor { pattern: "io/status", brief: "Publish the pin table", failure: None, handler: cmd_status },
    CommandDescriptor { pattern: "io/report", brief: "Publish every pin now", failure: None, handler: cmd_report },
    CommandDescriptor { pattern: RESTART, brief: "Reboot the device", failure: None, handler: cmd_restart },
];

/// Suffix of the reboot command.
pub const RESTART: &str = "restart";

/// Match `suffix` against a pattern, returning the `+` captures.
fn match_pattern<'t>(pattern: &str, suffix: &'t str) -> Option<Vec<&'t str>> {
    let mut captures = Vec::new();
    let mut levels = suffix.split('/');
    for part in pattern.split('/') {
        let level = levels.next()?;
        match part {
            "+" if !level.is_empty() => captures.push(level),
            "+" => return None,
            literal if literal == level => {}
            _ => return None,
        }
    }
    levels.next().is_none().then_some(captures)
}

/// Find and run the handler for a command suffix (the part after `cmd/`).
///
/// On failure, returns the descriptor's failure status word with the error.
pub fn execute(
    service: &mut IoService,
    suffix: &str,
    payload: &[u8],
) -> Result<Reply, (Option<&'static str>, CommandError)> {
    let (descriptor, captures) = COMMANDS
        .iter()
        .find_map(|c| match_pattern(c.pattern, suffix).map(|caps| (c, caps)))
        .ok_or((None, CommandError::UnknownCommand))?;

    (descriptor.handler)(service, &captures, payload).map_err(|e| (descriptor.failure, e))
}

/// Route one inbound message and publish the outcome.
pub fn handle(
    service: &mut IoService,
    base: &str,
    topic: &str,
    payload: &[u8],
) -> Result<Reply, CommandError> {
    let suffix = command_suffix(base, topic).ok_or(CommandError::UnknownCommand)?;

    let publisher = service.publisher().clone();
    let status_topic = format!("{}/status", base);

    match execute(service, suffix, payload) {
        Ok(reply) => {
            match &reply {
                Reply::Status(word) => publisher.publish(&status_topic, word, true),
                Reply::Config(doc) => publisher.publish(&format!("{}/config", base), doc, true),
                Reply::Reported(_) => {}
                Reply::Restart => publisher.publish(&status_topic, "restarting", true),
            }
            Ok(reply)
        }
        Err((failure, e)) => {
            log::warn!("{} {}: {}", e.code(), suffix, e);
            if let Some(word) = failure {
                publisher.publish(&status_topic, word, true);
            }
            Err(e)
        }
    }
}

/// The part of `topic` after `<base>/cmd/`, if it is a command topic.
pub fn command_suffix<'t>(base: &str, topic: &'t str) -> Option<&'t str> {
    topic.strip_prefix(base)?.strip_prefix("/cmd/")
}

/// Command names for help output.
pub fn command_patterns() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|c| c.pattern)
}

fn parse_json<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, CommandError> {
    serde_json::from_slice(payload).map_err(|e| CommandError::InvalidPayload(e.to_string()))
}

// --- Command Implementations ---

fn cmd_config(svc: &mut IoService, _: &[&str], payload: &[u8]) -> Result<Reply, CommandError> {
    let request: PinRequest = parse_json(payload)?;
    svc.configure(&request)?;
    Ok(Reply::Status("io_config_updated"))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoveRequest {
    pin: u8,
}

fn cmd_remove(svc: &mut IoService, _: &[&str], payload: &[u8]) -> Result<Reply, CommandError> {
    let RemoveRequest { pin } = parse_json(payload)?;
    if svc.remove(pin) {
        Ok(Reply::Status("io_remove_success"))
    } else {
        Err(CommandError::NotConfigured(pin))
    }
}

fn cmd_exclude(svc: &mut IoService, _: &[&str], payload: &[u8]) -> Result<Reply, CommandError> {
    let request: ExclusionRequest = parse_json(payload)?;
    svc.set_exclusion(request);
    Ok(Reply::Status("io_exclude_updated"))
}

fn default_action() -> String {
    String::from("set")
}

/// JSON trigger payload; the pin comes from the topic.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TriggerPayload {
    #[serde(default = "default_action")]
    action: String,
    #[serde(default, alias = "pulse_width_ms")]
    pulse: Option<u32>,
}

fn cmd_trigger(svc: &mut IoService, caps: &[&str], payload: &[u8]) -> Result<Reply, CommandError> {
    let level = caps.first().copied().unwrap_or_default();
    let pin: u8 = level
        .parse()
        .map_err(|_| CommandError::InvalidPin(level.to_string()))?;

    let text = core::str::from_utf8(payload)
        .map_err(|e| CommandError::InvalidPayload(e.to_string()))?
        .trim();

    let request = if text.starts_with('{') {
        let body: TriggerPayload = parse_json(text.as_bytes())?;
        TriggerRequest {
            pin,
            action: body.action,
            pulse_width_ms: body.pulse,
        }
    } else if text.is_empty() {
        TriggerRequest::new(pin, "set")
    } else {
        TriggerRequest::new(pin, text)
    };

    svc.trigger(&request)?;
    Ok(Reply::Status("io_trigger_success"))
}

fn cmd_status(svc: &mut IoService, _: &[&str], _: &[u8]) -> Result<Reply, CommandError> {
    Ok(Reply::Config(svc.status_json()))
}

fn cmd_report(svc: &mut IoService, _: &[&str], _: &[u8]) -> Result<Reply, CommandError> {
    Ok(Reply::Reported(svc.report_all()))
}

fn cmd_restart(_: &mut IoService, _: &[&str], _: &[u8]) -> Result<Reply, CommandError> {
    log::warn!("Restart requested");
    Ok(Reply::Restart)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert_eq!(match_pattern("io/config", "io/config"), Some(vec![]));
        assert_eq!(match_pattern("io/+/trigger", "io/4/trigger"), Some(vec!["4"]));
        assert_eq!(match_pattern("io/+/trigger", "io//trigger"), None);
        assert_eq!(match_pattern("io/+/trigger", "io/4/trigger/x"), None);
        assert_eq!(match_pattern("io/config", "io"), None);
    }

    #[test]
    fn test_command_suffix() {
        assert_eq!(command_suffix("dev/1", "dev/1/cmd/restart"), Some("restart"));
        assert_eq!(command_suffix("dev/1", "dev/1/status"), None);
        assert_eq!(command_suffix("dev/1", "dev/12/cmd/restart"), None);
    }

    #[test]
    fn test_patterns_are_unique() {
        let patterns: Vec<_> = command_patterns().collect();
        for (i, p) in patterns.iter().enumerate() {
            assert!(!patterns[i + 1..].contains(p), "duplicate {}", p);
        }
    }
}
