//! Line-oriented console session.
//!
//! Each input line is either a `/` command or something said to the current
//! NPC. Failed turns never end the session; only `/exit`, end of input, or
//! cancellation do.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{Engine, TurnOutcome};
use crate::error::Result;

/// A console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/state`
    State,
    /// `/reset`
    Reset,
    /// `/exit`
    Exit,
    /// Any other `/` input.
    Unknown(String),
}

/// One classified input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Nothing but whitespace.
    Blank,
    /// A command, matched case-insensitively.
    Command(Command),
    /// Words for the NPC, trimmed.
    Utterance(String),
}

/// Classify a raw input line.
#[must_use]
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    if !line.starts_with('/') {
        return Input::Utterance(line.to_string());
    }
    Input::Command(match line.to_lowercase().as_str() {
        "/state" => Command::State,
        "/reset" => Command::Reset,
        "/exit" => Command::Exit,
        _ => Command::Unknown(line.to_string()),
    })
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The player typed `/exit`.
    Exit,
    /// Input ran out.
    EndOfInput,
    /// The cancellation token fired.
    Cancelled,
}

/// Print the greeting banner.
///
/// # Errors
/// Returns an error if `out` cannot be written.
pub fn write_banner<W: Write>(engine: &Engine, out: &mut W) -> Result<()> {
    let state = engine.state();
    writeln!(out, "=== Belfry: Clocktower ===")?;
    writeln!(out, "Commands: /state /reset /exit")?;
    writeln!(
        out,
        "You are in the {} talking to {}. Replies by: {}.",
        state.location,
        state.current_npc,
        engine.provider_name()
    )?;
    Ok(())
}

/// Run turns from `input` until the session ends.
///
/// # Errors
/// Returns an error only if reading input or writing output fails.
pub async fn run_session<R, W>(
    engine: &mut Engine,
    input: R,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<SessionEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write_banner(engine, out)?;
    let mut lines = input.lines();

    loop {
        write!(out, "\nYou> ")?;
        out.flush()?;

        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(SessionEnd::EndOfInput);
        };

        match parse_input(&line) {
            Input::Blank => {}
            Input::Command(Command::Exit) => {
                info!(session = %engine.state().session_id, "Player left");
                return Ok(SessionEnd::Exit);
            }
            Input::Command(Command::Reset) => {
                engine.reset();
                writeln!(out, "(chat history cleared)")?;
            }
            Input::Command(Command::State) => {
                writeln!(out, "{}", engine.dump_state()?)?;
            }
            Input::Command(Command::Unknown(_)) => {
                writeln!(out, "Unknown command.")?;
            }
            Input::Utterance(text) => {
                let report = engine.handle_turn(&text).await;
                match &report.outcome {
                    TurnOutcome::Reply { npc, text } => writeln!(out, "\n{npc}> {text}")?,
                    TurnOutcome::AiFailed { error, .. } => {
                        writeln!(out, "\n(AI error) {error}")?;
                        if let Some((npc, line)) = report.outcome.npc_line() {
                            writeln!(out, "\n{npc}> {line}")?;
                        }
                    }
                    TurnOutcome::Cancelled => return Ok(SessionEnd::Cancelled),
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(SessionEnd::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(parse_input("  /STATE "), Input::Command(Command::State));
        assert_eq!(parse_input("/Reset"), Input::Command(Command::Reset));
        assert_eq!(parse_input("/exit"), Input::Command(Command::Exit));
        assert_eq!(
            parse_input("/dance"),
            Input::Command(Command::Unknown("/dance".into()))
        );
    }

    #[test]
    fn blank_and_speech() {
        assert_eq!(parse_input("   "), Input::Blank);
        assert_eq!(
            parse_input("  hello Iris  "),
            Input::Utterance("hello Iris".into())
        );
    }
}
