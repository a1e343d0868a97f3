//! Process bridge between a suite and the test files it spawns.
//!
//! The child writes one envelope per line to its stdout. The parent reads
//! stdout and stderr concurrently, forwards every envelope as soon as its line
//! arrives, and keeps everything else so a crashing file can be diagnosed.

use crate::config::TestOptions;
use aaa_proto::{Envelope, Message};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Set to `1` in the environment of every spawned test file.
pub const AAA_TEST_FILE: &str = "AAA_TEST_FILE";

/// JSON-encoded `TestOptions` for a spawned test file.
pub const AAA_TEST_OPTIONS: &str = "AAA_TEST_OPTIONS";

/// How to launch a test file.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Command and leading arguments placed before the file path.
    pub prefix: Vec<String>,
    pub test_options: TestOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn test file {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Test file ended with exit code: {code}.\n- Output:\n{stdout}\n- Error:\n{stderr}")]
    ExitCode {
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Invalid test options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] aaa_proto::ProtoError),
}

/// Runs one test file to completion, forwarding its messages to `on_message`.
///
/// The command is `prefix[0] prefix[1..] path`, or `path` itself when the
/// prefix is empty. A non-zero exit fails with the captured output.
pub async fn spawn_test_file<F>(
    path: &Path,
    options: &SpawnOptions,
    mut on_message: F,
) -> Result<(), BridgeError>
where
    F: FnMut(Message),
{
    let mut command = match options.prefix.split_first() {
        Some((program, args)) => {
            let mut command = Command::new(program);
            command.args(args).arg(path);
            command
        }
        None => Command::new(path),
    };
    command
        .env(AAA_TEST_FILE, "1")
        .env(AAA_TEST_OPTIONS, serde_json::to_string(&options.test_options)?)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(path = %path.display(), prefix = ?options.prefix, "Spawning test file");
    let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
        path: path.to_path_buf(),
        source,
    })?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_future = async {
        let mut captured = String::new();
        if let Some(stdout) = stdout_handle {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            while read_line_lossy(&mut reader, &mut buf).await? {
                let line = String::from_utf8_lossy(&buf);
                match Envelope::decode_line(&line) {
                    Ok(Some(msg)) => on_message(msg),
                    Ok(None) => {
                        captured.push_str(&line);
                        captured.push('\n');
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Malformed runner envelope");
                        captured.push_str(&line);
                        captured.push('\n');
                    }
                }
            }
        }
        Ok::<_, io::Error>(captured)
    };

    let stderr_future = async {
        let mut captured = String::new();
        if let Some(stderr) = stderr_handle {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while read_line_lossy(&mut reader, &mut buf).await? {
                captured.push_str(&String::from_utf8_lossy(&buf));
                captured.push('\n');
            }
        }
        Ok::<_, io::Error>(captured)
    };

    let (stdout, stderr) = tokio::try_join!(stdout_future, stderr_future)?;
    let status = child.wait().await?;
    debug!(path = %path.display(), status = %status, "Test file exited");

    if status.success() {
        Ok(())
    } else {
        Err(BridgeError::ExitCode {
            code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

/// Reads the next line into `buf` without its terminator.
///
/// Child output is not required to be UTF-8, so lines stay raw bytes here and
/// are decoded lossily by the caller. Returns false at end of stream.
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

/// Child-side writer of envelopes.
pub struct ChildChannel {
    writer: Box<dyn Write>,
}

impl ChildChannel {
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }

    /// Channel on the process stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Writes one message as a single envelope line.
    pub fn send(&mut self, msg: &Message) -> Result<(), BridgeError> {
        let line = Envelope::new(msg.clone()).encode()?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// True when this process was spawned by a suite.
pub fn is_child_process() -> bool {
    std::env::var_os(AAA_TEST_FILE).is_some_and(|value| !value.is_empty())
}

/// Options passed down by the parent, or defaults when run standalone.
pub fn test_options_from_env() -> Result<TestOptions, BridgeError> {
    match std::env::var(AAA_TEST_OPTIONS) {
        Ok(json) if !json.trim().is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(TestOptions::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedBuffer;
    use aaa_proto::{ROOT_ID, TestKind};

    #[test]
    fn test_channel_writes_one_envelope_per_line() {
        let buffer = SharedBuffer::new();
        let mut channel = ChildChannel::new(Box::new(buffer.clone()));
        channel
            .send(&Message::added(1, ROOT_ID, "t", TestKind::Test))
            .unwrap();
        channel.send(&Message::Start { id: 1 }).unwrap();

        let contents = buffer.contents();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            Envelope::decode_line(lines[1]).unwrap(),
            Some(Message::Start { id: 1 })
        );
    }

    #[tokio::test]
    async fn test_lines_are_read_as_raw_bytes() {
        let input: &[u8] = b"\xff\xfe noise\r\nnext\nlast";
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        let mut lines = Vec::new();
        while read_line_lossy(&mut reader, &mut buf).await.unwrap() {
            lines.push(String::from_utf8_lossy(&buf).into_owned());
        }
        assert_eq!(lines, vec!["\u{fffd}\u{fffd} noise", "next", "last"]);
    }

    #[test]
    fn test_exit_code_message_includes_output() {
        let err = BridgeError::ExitCode {
            code: 3,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Test file ended with exit code: 3.\n- Output:\nout\n\n- Error:\nerr\n"
        );
    }
}
