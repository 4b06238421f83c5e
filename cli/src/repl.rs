use anyhow::Result;
use std::{fmt::Display, future::Future, io::Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Reads one query per line until EOF or `exit`, printing each answer or error before
/// prompting again. Blank lines are ignored.
pub async fn run<R, W, F, Fut, E>(
    input: R,
    output: &mut W,
    prompt: &str,
    mut handle: F,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, E>>,
    E: Display,
{
    let mut lines = input.lines();

    loop {
        write!(output, "{prompt}")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            break;
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" {
            break;
        }

        match handle(query.to_string()).await {
            Ok(answer) => writeln!(output, "{answer}\n")?,
            Err(err) => writeln!(output, "error: {err}\n")?,
        }
    }

    Ok(())
}
