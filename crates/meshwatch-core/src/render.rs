//! Downstream renderer interface.
//!
//! The orchestrator only emits [`RenderRequest`]s. What happens next is up to
//! the [`Renderer`]; a failure is logged and never affects collection.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::{ProcessError, run_with_timeout};
use crate::record::NodeId;

/// Why a render was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReason {
    /// The configured plot interval elapsed since the last render.
    IntervalElapsed,
    /// These nodes transitioned to completed during the cycle.
    NodesCompleted(Vec<NodeId>),
    /// Every known node is completed.
    AllCompleted,
    /// Rendering after every cycle that persisted data.
    EveryCycle,
    /// Final render on shutdown.
    Shutdown,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntervalElapsed => f.write_str("plot interval elapsed"),
            Self::NodesCompleted(nodes) => {
                let ids: Vec<&str> = nodes.iter().map(NodeId::as_str).collect();
                write!(f, "node(s) completed: {}", ids.join(", "))
            }
            Self::AllCompleted => f.write_str("all nodes completed"),
            Self::EveryCycle => f.write_str("cycle finished"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Everything a renderer needs to locate the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub reason: TriggerReason,
    pub telemetry_csv: PathBuf,
    pub traceroute_csv: PathBuf,
    pub output_dir: PathBuf,
}

pub trait Renderer {
    fn render(&mut self, request: &RenderRequest) -> Result<()>;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, request: &RenderRequest) -> Result<()> {
        (**self).render(request)
    }
}

/// Renderer that spawns an external plotting command:
/// `<program> [args…] --telemetry <csv> --traceroute <csv> --outdir <dir>`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    regenerate_charts: bool,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            regenerate_charts: false,
            timeout: Duration::from_secs(300),
        }
    }

    /// Leading arguments placed before the generated ones, e.g. a script path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn regenerate_charts(mut self, yes: bool) -> Self {
        self.regenerate_charts = yes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_args(&self, request: &RenderRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "--telemetry".to_string(),
            request.telemetry_csv.display().to_string(),
            "--traceroute".to_string(),
            request.traceroute_csv.display().to_string(),
            "--outdir".to_string(),
            request.output_dir.display().to_string(),
        ]);
        if self.regenerate_charts {
            args.push("--regenerate-charts".to_string());
        }
        args
    }
}

impl Renderer for CommandRenderer {
    fn render(&mut self, request: &RenderRequest) -> Result<()> {
        std::fs::create_dir_all(&request.output_dir)
            .map_err(|e| Error::persistence(&request.output_dir, e))?;
        let args = self.command_args(request);
        log::debug!("running {} {}", self.program, args.join(" "));
        match run_with_timeout(&self.program, &args, self.timeout) {
            Ok(_) => Ok(()),
            Err(ProcessError::TimedOut) => Err(Error::Render(format!(
                "{} timed out after {}s",
                self.program,
                self.timeout.as_secs()
            ))),
            Err(ProcessError::Failed(reason)) => Err(Error::Render(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &std::path::Path) -> RenderRequest {
        RenderRequest {
            reason: TriggerReason::IntervalElapsed,
            telemetry_csv: dir.join("telemetry.csv"),
            traceroute_csv: dir.join("traceroute.csv"),
            output_dir: dir.join("plots"),
        }
    }

    #[test]
    fn command_line_layout() {
        let r = CommandRenderer::new("python3")
            .with_args(vec!["plot.py".into()])
            .regenerate_charts(true);
        let args = r.command_args(&request(std::path::Path::new("/data")));
        assert_eq!(
            args,
            vec![
                "plot.py",
                "--telemetry",
                "/data/telemetry.csv",
                "--traceroute",
                "/data/traceroute.csv",
                "--outdir",
                "/data/plots",
                "--regenerate-charts",
            ]
        );
    }

    #[test]
    fn trigger_reason_display() {
        let reason = TriggerReason::NodesCompleted(vec![
            NodeId::parse("!a").unwrap(),
            NodeId::parse("!b").unwrap(),
        ]);
        assert_eq!(reason.to_string(), "node(s) completed: !a, !b");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_render_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut r = CommandRenderer::new("false");
        let err = r.render(&request(tmp.path())).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
        assert!(tmp.path().join("plots").is_dir());
    }
}
