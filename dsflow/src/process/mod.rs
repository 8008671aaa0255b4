//! Local command execution and filesystem measurements.

use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::info;

/// Read size used when hashing files.
const CHECKSUM_CHUNK: usize = 4096;

/// Errors raised by local commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command ran and exited non-zero.
    #[error("command {args:?} exited with {return_code:?}: {stderr}")]
    Failed {
        /// Exit code, absent when the process was killed by a signal.
        return_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
        /// The command line.
        args: Vec<String>,
    },

    /// The command could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The command's output did not have the expected shape.
    #[error("unexpected output from {program}: {output:?}")]
    Parse {
        /// Program name.
        program: String,
        /// The output that could not be parsed.
        output: String,
    },

    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Returns the exit code of a failed command.
    #[must_use]
    pub fn return_code(&self) -> Option<i32> {
        match self {
            Self::Failed { return_code, .. } => *return_code,
            _ => None,
        }
    }
}

/// Runs `args[0]` with the remaining arguments and captures its output.
///
/// Returns `(stdout, stderr)` on a zero exit status.
pub async fn execute<S>(args: &[S], cwd: Option<&Path>) -> Result<(String, String), CommandError>
where
    S: AsRef<str>,
{
    let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
    let Some((program, rest)) = args.split_first() else {
        return Err(CommandError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    info!(command = ?args, cwd = ?cwd, "executing command");

    let mut command = Command::new(program);
    command.args(rest).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command.output().await.map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(CommandError::Failed {
            return_code: output.status.code(),
            stdout,
            stderr,
            args,
        });
    }
    Ok((stdout, stderr))
}

/// Archives `source_dir` into `tar_path`, handling sparse files.
pub async fn tar(tar_path: &Path, source_dir: &Path) -> Result<(), CommandError> {
    let tar_path = tar_path.display().to_string();
    let source_dir = source_dir.display().to_string();
    execute(&["tar", "cf", tar_path.as_str(), "--sparse", source_dir.as_str()], None).await?;
    Ok(())
}

/// Returns the disk usage of `dir` in bytes, as reported by `du -sb`.
pub async fn total_size(dir: &Path) -> Result<u64, CommandError> {
    let dir = dir.display().to_string();
    let (stdout, _) = execute(&["du", "-sb", dir.as_str()], None).await?;
    parse_du_output(&stdout)
}

fn parse_du_output(stdout: &str) -> Result<u64, CommandError> {
    stdout
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| CommandError::Parse {
            program: "du".to_string(),
            output: stdout.to_string(),
        })
}

/// Returns the hex MD5 digest of the file at `path`.
pub async fn checksum(path: &Path) -> Result<String, CommandError> {
    let io_err = |source| CommandError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHECKSUM_CHUNK];
    loop {
        let n = file.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_du_output() {
        assert_eq!(parse_du_output("4096\t/data/ds1\n").unwrap(), 4096);
        assert!(matches!(
            parse_du_output("du: cannot access"),
            Err(CommandError::Parse { .. })
        ));
        assert!(parse_du_output("").is_err());
    }

    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let (stdout, stderr) = execute(&["echo", "hello"], None).await.unwrap();
        assert_eq!(stdout.trim(), "hello");
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn test_execute_nonzero_exit() {
        let err = execute(&["sh", "-c", "echo oops >&2; exit 3"], None)
            .await
            .unwrap_err();
        match err {
            CommandError::Failed {
                return_code,
                stderr,
                args,
                ..
            } => {
                assert_eq!(return_code, Some(3));
                assert_eq!(stderr.trim(), "oops");
                assert_eq!(args[0], "sh");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_missing_program() {
        let err = execute(&["dsflow-no-such-binary"], None).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_execute_respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let (stdout, _) = execute(&["pwd"], Some(dir.path())).await.unwrap();
        let reported = std::fs::canonicalize(stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            checksum(&path).await.unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn test_checksum_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![7u8; CHECKSUM_CHUNK * 3 + 17];
        std::fs::write(&path, &data).unwrap();

        let expected = hex::encode(Md5::digest(&data));
        assert_eq!(checksum(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_tar_and_total_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("ds");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join("a.txt"), vec![1u8; 2048]).unwrap();

        let tar_path = dir.path().join("ds.tar");
        tar(&tar_path, &source).await.unwrap();
        assert!(tar_path.exists());

        assert!(total_size(&source).await.unwrap() >= 2048);
    }
}
