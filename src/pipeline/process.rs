//! External-process runner shared by every tool-driven backend.
//!
//! Each call spawns one program, waits for it to exit and maps the result
//! onto [`BackendError`]:
//!
//! | Situation | Error |
//! |-----------|-------|
//! | program not on `PATH` | [`BackendError::Unavailable`] |
//! | non-zero exit (and not in `ok_codes`) | [`BackendError::ProcessFailed`] |
//! | timeout elapsed | [`BackendError::Timeout`] (child is killed) |
//!
//! The child gets no stdin and `kill_on_drop`, so a cancelled or timed-out
//! call never leaves a converter process behind.

use crate::error::BackendError;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT: usize = 400;

/// Run `program` with `args` and wait for it.
///
/// `ok_codes` lists extra exit codes to treat as success (qpdf exits 3 on
/// warnings, for example). Exit code 0 is always success.
pub async fn run_tool<I, S>(
    program: &Path,
    args: I,
    timeout: Option<Duration>,
    ok_codes: &[i32],
) -> Result<Output, BackendError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program_name = program.display().to_string();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {:?}", cmd.as_std());

    let fut = cmd.output();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(r) => r,
            Err(_) => {
                return Err(BackendError::Timeout {
                    program: program_name,
                    secs: limit.as_secs(),
                })
            }
        },
        None => fut.await,
    };

    let output = result.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackendError::Unavailable {
                backend: program_name.clone(),
                reason: "program not found on PATH".into(),
            }
        } else {
            BackendError::failed(&program_name, format!("spawn failed: {e}"))
        }
    })?;

    let accepted = output.status.success()
        || output
            .status
            .code()
            .is_some_and(|code| ok_codes.contains(&code));
    if !accepted {
        return Err(BackendError::ProcessFailed {
            program: program_name,
            status: output.status.to_string(),
            stderr: stderr_excerpt(&output.stderr),
        });
    }

    Ok(output)
}

/// Last few hundred bytes of stderr, trimmed. Tools put the useful line last.
fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_EXCERPT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("\u{2026}{}", &text[start..])
}
