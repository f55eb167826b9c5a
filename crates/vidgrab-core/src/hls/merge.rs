//! Container merge of separate video and audio tracks.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge tool not found: {0}")]
    ToolMissing(PathBuf),
    #[error("merge tool exited with {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("merge io error: {0}")]
    Io(#[from] io::Error),
}

/// External mux step.
pub trait Muxer: Send + Sync {
    fn is_available(&self) -> bool;
    /// Mux `video` and `audio` into `output` without re-encoding.
    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MergeError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(video: &Path, audio: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.extend(["-i".into(), video.as_os_str().to_owned()]);
        args.extend(["-i".into(), audio.as_os_str().to_owned()]);
        args.extend(["-map", "0:v:0", "-map", "1:a:0", "-c", "copy"].map(std::ffi::OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Muxer for FfmpegMuxer {
    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MergeError> {
        let result = Command::new(&self.program)
            .args(Self::args(video, audio, output))
            .output();
        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MergeError::ToolMissing(self.program.clone()))
            }
            Err(e) => return Err(MergeError::Io(e)),
        };
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(MergeError::Failed {
                status: out.status.code(),
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }
        tracing::debug!("merged {} + {} into {}", video.display(), audio.display(), output.display());
        Ok(())
    }
}
