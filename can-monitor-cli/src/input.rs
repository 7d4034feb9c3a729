//! Operator input
//!
//! Parses interactive commands and the hex notation used for identifiers and
//! payload bytes.

use anyhow::{bail, Context, Result};
use can_monitor_core::{Frame, StrategyKind, MAX_DATA_LEN, MAX_EXTENDED_ID, MAX_STANDARD_ID};
use std::time::Duration;

/// Commands accepted on stdin while the monitor runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Manual mode: read a single frame
    Read,
    /// Switch the acquisition strategy
    Mode(StrategyKind),
    /// Set period mode (`None` toggles)
    Period(Option<bool>),
    /// Transmit a frame once
    Send(Frame),
    /// Transmit a frame repeatedly, replacing any running cyclic send
    SendEvery(Frame, Duration),
    /// Cancel the cyclic send
    StopSend,
    /// Clear the message table
    Clear,
    /// Print and clear the operator info log
    Info,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  r, read                    read one frame (manual mode)
  mode polling|event|manual  switch the reading mode
  p, period [on|off]         toggle or set period display
  s, send <id> [bytes..] [ext] [rtr] [every <ms>]
                             transmit a frame, e.g. `send 603 2F 60 60 00`
                             or cyclically, e.g. `send 603 2F60600003000000 every 100`
  ss, stop-send              stop the cyclic send
  c, clear                   clear the message table
  i, info                    show operator messages
  h, help                    show this help
  q, quit                    exit";

/// Parse one line of operator input; empty lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "r" | "read" => Command::Read,
        "c" | "clear" => Command::Clear,
        "i" | "info" => Command::Info,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        "p" | "period" => match args.first().map(|a| a.to_ascii_lowercase()) {
            None => Command::Period(None),
            Some(arg) if arg == "on" => Command::Period(Some(true)),
            Some(arg) if arg == "off" => Command::Period(Some(false)),
            Some(arg) => bail!("expected `on` or `off`, got `{}`", arg),
        },
        "mode" => match args.first().map(|a| a.to_ascii_lowercase()).as_deref() {
            Some("polling") | Some("timer") => Command::Mode(StrategyKind::Polling),
            Some("event") => Command::Mode(StrategyKind::EventDriven),
            Some("manual") => Command::Mode(StrategyKind::Manual),
            _ => bail!("expected `polling`, `event` or `manual`"),
        },
        "ss" | "stop-send" => Command::StopSend,
        "s" | "send" => match parse_send(&args)? {
            (frame, Some(interval)) => Command::SendEvery(frame, interval),
            (frame, None) => Command::Send(frame),
        },
        other => bail!("unknown command `{}` (type `help`)", other),
    };
    Ok(Some(command))
}

fn parse_send(args: &[&str]) -> Result<(Frame, Option<Duration>)> {
    let Some((id_text, rest)) = args.split_first() else {
        bail!("send needs an identifier");
    };

    let mut extended = false;
    let mut remote = false;
    let mut interval = None;
    let mut bytes = Vec::new();
    let mut rest = rest.iter();
    while let Some(arg) = rest.next() {
        match arg.to_ascii_lowercase().as_str() {
            "ext" => extended = true,
            "rtr" => remote = true,
            "every" => {
                let Some(ms) = rest.next() else {
                    bail!("`every` needs an interval in ms");
                };
                interval = Some(parse_interval(ms)?);
            }
            _ if arg.len() > 2 => bytes.extend(parse_packed_bytes(arg)?),
            _ => bytes.push(parse_byte(arg)?),
        }
    }

    if bytes.len() > MAX_DATA_LEN as usize {
        bail!("at most {} data bytes, got {}", MAX_DATA_LEN, bytes.len());
    }
    let id = parse_id(id_text, extended)?;
    let frame = if remote {
        Frame::remote(id, extended, bytes.len() as u8)
    } else if extended {
        Frame::extended(id, &bytes)
    } else {
        Frame::standard(id, &bytes)
    };
    Ok((frame, interval))
}

fn parse_interval(text: &str) -> Result<Duration> {
    let ms: u64 = text
        .trim_end_matches("ms")
        .parse()
        .with_context(|| format!("`{}` is not an interval in ms", text))?;
    if ms == 0 {
        bail!("the send interval must be at least 1 ms");
    }
    Ok(Duration::from_millis(ms))
}

/// Parse a hex identifier, clamped to the maximum for its frame kind
pub fn parse_id(text: &str, extended: bool) -> Result<u32> {
    let digits = text.trim_end_matches(['h', 'H']);
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    let id = u32::from_str_radix(digits, 16)
        .with_context(|| format!("`{}` is not a hex identifier", text))?;
    let max = if extended {
        MAX_EXTENDED_ID
    } else {
        MAX_STANDARD_ID
    };
    if id > max {
        log::warn!("ID 0x{:X} clamped to 0x{:X}", id, max);
    }
    Ok(id.min(max))
}

/// Parse a packed payload such as `2F60600003000000`, two hex digits per byte
pub fn parse_packed_bytes(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        bail!("`{}` has an odd number of hex digits", text);
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .with_context(|| format!("`{}` is not a hex payload", text))
                .and_then(parse_byte)
        })
        .collect()
}

/// Parse one payload byte written as one or two hex digits
pub fn parse_byte(text: &str) -> Result<u8> {
    if text.is_empty() || text.len() > 2 {
        bail!("`{}` is not a hex byte", text);
    }
    u8::from_str_radix(text, 16).with_context(|| format!("`{}` is not a hex byte", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("123", false).unwrap(), 0x123);
        assert_eq!(parse_id("0x7ff", false).unwrap(), 0x7FF);
        assert_eq!(parse_id("1ABCDEFh", true).unwrap(), 0x1AB_CDEF);
        assert_eq!(parse_id("FFF", false).unwrap(), 0x7FF);
        assert_eq!(parse_id("FFFFFFFF", true).unwrap(), 0x1FFF_FFFF);
        assert!(parse_id("xyz", false).is_err());
    }

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("F").unwrap(), 0x0F);
        assert_eq!(parse_byte("2f").unwrap(), 0x2F);
        assert!(parse_byte("100").is_err());
        assert!(parse_byte("").is_err());
    }

    #[test]
    fn test_parse_send() {
        let command = parse_command("send 603 2F 60 60 00 03").unwrap().unwrap();
        let Command::Send(frame) = command else {
            panic!("expected send");
        };
        assert_eq!(frame.id, 0x603);
        assert!(!frame.extended);
        assert_eq!(frame.payload(), &[0x2F, 0x60, 0x60, 0x00, 0x03]);

        let Some(Command::Send(frame)) = parse_command("s 18FEF100 ext rtr").unwrap() else {
            panic!("expected send");
        };
        assert!(frame.extended && frame.remote);
        assert_eq!(frame.id, 0x18FE_F100);

        assert!(parse_command("send 1 0 1 2 3 4 5 6 7 8").is_err());
        assert!(parse_command("send 1 rtr 0 1 2 3 4 5 6 7 8").is_err());
        assert!(parse_command("send").is_err());
    }

    #[test]
    fn test_parse_packed_payload() {
        assert_eq!(
            parse_packed_bytes("2F60600003000000").unwrap(),
            vec![0x2F, 0x60, 0x60, 0x00, 0x03, 0x00, 0x00, 0x00]
        );
        assert!(parse_packed_bytes("2F6").is_err());
        assert!(parse_packed_bytes("2G").is_err());

        let Some(Command::Send(frame)) = parse_command("send 603 2F6060 00 03").unwrap() else {
            panic!("expected send");
        };
        assert_eq!(frame.payload(), &[0x2F, 0x60, 0x60, 0x00, 0x03]);
        assert!(parse_command("send 603 2F60600003000000 FF").is_err());
    }

    #[test]
    fn test_parse_cyclic_send() {
        let command = parse_command("send 603 2F60600003000000 every 100").unwrap();
        let Some(Command::SendEvery(frame, interval)) = command else {
            panic!("expected cyclic send");
        };
        assert_eq!(frame.id, 0x603);
        assert_eq!(frame.len, 8);
        assert_eq!(interval, Duration::from_millis(100));

        let Some(Command::SendEvery(_, interval)) = parse_command("s 10 every 25ms").unwrap() else {
            panic!("expected cyclic send");
        };
        assert_eq!(interval, Duration::from_millis(25));

        assert!(parse_command("send 603 every").is_err());
        assert!(parse_command("send 603 every 0").is_err());
        assert!(parse_command("send 603 every soon").is_err());
        assert_eq!(parse_command("stop-send").unwrap(), Some(Command::StopSend));
        assert_eq!(parse_command("ss").unwrap(), Some(Command::StopSend));
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("R").unwrap(), Some(Command::Read));
        assert_eq!(parse_command("period").unwrap(), Some(Command::Period(None)));
        assert_eq!(parse_command("p off").unwrap(), Some(Command::Period(Some(false))));
        assert_eq!(
            parse_command("mode event").unwrap(),
            Some(Command::Mode(StrategyKind::EventDriven))
        );
        assert!(parse_command("mode fast").is_err());
        assert!(parse_command("frobnicate").is_err());
    }
}
