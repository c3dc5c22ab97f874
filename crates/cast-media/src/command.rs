//! FFmpeg command and cancelable runner.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::templates::{CommandTemplates, TemplateKind, TemplateParams};

/// Number of trailing stderr bytes kept on a failed run.
const STDERR_TAIL: usize = 2048;

/// A fully rendered argument list for one media-tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FfmpegCommand {
    args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a command from raw arguments.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Render one of the configured templates.
    pub fn from_template(
        templates: &CommandTemplates,
        kind: TemplateKind,
        params: &TemplateParams,
    ) -> MediaResult<Self> {
        Ok(Self {
            args: templates.render(kind, params)?,
        })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs media-tool commands, killing the child when the token fires.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: String,
    cancel: Option<CancellationToken>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner for `ffmpeg`.
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            cancel: None,
        }
    }

    /// Run a different executable with the same contract.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Bind the run to a cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run a command, discarding its output.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_capture(cmd).await.map(|_| ())
    }

    /// Run a command and return what it wrote.
    pub async fn run_capture(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(MediaError::Cancelled);
        }

        which::which(&self.program).map_err(|_| MediaError::ToolNotFound(self.program.clone()))?;

        debug!("Running {} {}", self.program, cmd.args().join(" "));

        let mut child = Command::new(&self.program)
            .args(cmd.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancelled => {
                info!("{} cancelled, killing process", self.program);
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;

        if status.success() {
            Ok(ToolOutput { stdout, stderr })
        } else {
            Err(MediaError::tool_failed(
                format!("{} exited with {}", self.program, status),
                Some(tail(&stderr)),
                status.code(),
            ))
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(handle: JoinHandle<String>) -> String {
    handle.await.unwrap_or_default()
}

fn tail(s: &str) -> String {
    if s.len() <= STDERR_TAIL {
        return s.to_string();
    }
    let mut start = s.len() - STDERR_TAIL;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound("ffmpeg".to_string()))
}
