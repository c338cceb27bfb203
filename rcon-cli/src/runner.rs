//! Command execution for the CLI.
//!
//! Positional commands run in order and stop at the first error. Commands
//! read from a line stream keep going past per-command failures, but stop
//! as soon as the connection is lost.

use std::io::Write;

use rcon_core::RconClient;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Run `commands` in order, writing each response to `out`.
pub async fn run_commands<W: Write>(
    client: &RconClient,
    commands: &[String],
    out: &mut W,
) -> Result<usize> {
    for command in commands {
        debug!(%command, "running");
        let body = client.send_command(command).await?;
        write_response(out, &body)?;
    }
    Ok(commands.len())
}

/// Run one command per non-blank input line until EOF or disconnect.
/// Returns the number of commands answered.
pub async fn run_lines<R, W>(client: &RconClient, input: R, out: &mut W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        let line = tokio::select! {
            biased;
            reason = client.disconnected() => {
                return Err(format!("connection lost: {reason}").into());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        match client.send_command(command).await {
            Ok(body) => {
                write_response(out, &body)?;
                answered += 1;
            }
            Err(e) if e.is_connection_loss() => return Err(e.into()),
            Err(e) => warn!(%command, "command failed: {e}"),
        }
    }
    Ok(answered)
}

fn write_response<W: Write>(out: &mut W, body: &str) -> std::io::Result<()> {
    out.write_all(body.as_bytes())?;
    if !body.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()
}
