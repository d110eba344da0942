// Metadata writer: embeds a description into an image file via exiftool
//
// The description lands in three fields: the general image description, the
// Windows comment field, and the XMP description. The target file is
// overwritten in place — no backup copy is kept.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::core::config::WriterConfig;
use crate::core::errors::{WriterError, WriterResult};

/// Wrapper around one exiftool invocation per image.
pub struct MetadataWriter {
    binary: String,
    timeout: Duration,
}

impl MetadataWriter {
    pub fn new(config: &WriterConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: config.timeout,
        }
    }

    /// Build the exiftool argument vector.
    ///
    /// Each field assignment is one discrete argument handed straight to the
    /// process-spawning primitive — the description is never interpolated
    /// into a shell command string, so its content cannot be interpreted.
    fn build_args(path: &Path, description: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-overwrite_original".into()];
        for field in ["ImageDescription", "XPComment", "XMP-dc:Description"] {
            args.push(format!("-{field}={description}").into());
        }
        args.push(path.as_os_str().to_os_string());
        args
    }

    /// Write `description` into the metadata fields of `path`, in place.
    #[instrument(skip(self, description), fields(path = %path.display()))]
    pub async fn write_description(&self, path: &Path, description: &str) -> WriterResult<()> {
        let mut command = Command::new(&self.binary);
        command
            .args(Self::build_args(path, description))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Reap the child if it outlives the timeout
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(WriterError::TimedOut {
                    timeout: self.timeout,
                })
            }
            Ok(Err(source)) => {
                return Err(WriterError::SpawnFailed {
                    binary: self.binary.clone(),
                    source,
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(WriterError::ExitedNonZero {
                code: output.status.code(),
                stderr: if stderr.is_empty() {
                    "unknown error".to_string()
                } else {
                    stderr
                },
            });
        }

        debug!("metadata written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(binary: &str, timeout: Duration) -> MetadataWriter {
        MetadataWriter::new(&WriterConfig {
            binary: binary.to_string(),
            timeout,
        })
    }

    #[test]
    fn test_args_are_discrete_and_unescaped() {
        let description = "a \"sunset\"; $(rm -rf /) && `echo oops` over the bay";
        let args = MetadataWriter::build_args(Path::new("/photos/pier.jpg"), description);

        assert_eq!(args.len(), 5);
        assert_eq!(args[0], OsString::from("-overwrite_original"));
        assert_eq!(
            args[1],
            OsString::from(format!("-ImageDescription={description}"))
        );
        assert_eq!(args[2], OsString::from(format!("-XPComment={description}")));
        assert_eq!(
            args[3],
            OsString::from(format!("-XMP-dc:Description={description}"))
        );
        assert_eq!(args[4], OsString::from("/photos/pier.jpg"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failed() {
        let w = writer("/no/such/exiftool", Duration::from_secs(8));
        let err = w
            .write_description(Path::new("/tmp/x.jpg"), "desc")
            .await
            .unwrap_err();
        assert!(matches!(err, WriterError::SpawnFailed { .. }));
        assert_eq!(err.kind(), "WRITER_SPAWN_FAILED");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_preserves_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("exiftool");
        std::fs::write(&fake, "#!/bin/sh\necho 'tag rejected' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let w = writer(fake.to_str().unwrap(), Duration::from_secs(8));
        let err = w
            .write_description(Path::new("/tmp/x.jpg"), "desc")
            .await
            .unwrap_err();
        match err {
            WriterError::ExitedNonZero { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "tag rejected");
            }
            other => panic!("expected ExitedNonZero, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_process_is_timed_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("exiftool");
        std::fs::write(&fake, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let w = writer(fake.to_str().unwrap(), Duration::from_millis(100));
        let err = w
            .write_description(Path::new("/tmp/x.jpg"), "desc")
            .await
            .unwrap_err();
        assert!(matches!(err, WriterError::TimedOut { .. }));
        assert_eq!(err.kind(), "WRITER_TIMED_OUT");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("exiftool");
        std::fs::write(&fake, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let w = writer(fake.to_str().unwrap(), Duration::from_secs(8));
        assert!(w
            .write_description(Path::new("/tmp/x.jpg"), "desc")
            .await
            .is_ok());
    }
}
