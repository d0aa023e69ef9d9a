//! Command executor: the only path by which the engine talks to a node.
//!
//! The engine treats the executor as an opaque, slow, possibly failing black
//! box. [`MeshtasticCli`] is the production implementation. It shells out to
//! the `meshtastic` command line tool once per request and enforces the
//! timeout by killing the child.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::record::NodeId;
use crate::request::RequestKind;

/// Issues one request to one node and returns the raw reply text.
///
/// `Ok` means the transport succeeded. It says nothing about whether the
/// text parses. Timeouts surface as [`Error::TransportTimeout`] and every
/// other transport problem as [`Error::TransportFailure`].
pub trait CommandExecutor {
    fn execute(&mut self, node: &NodeId, kind: RequestKind, timeout: Duration) -> Result<String>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for Box<E> {
    fn execute(&mut self, node: &NodeId, kind: RequestKind, timeout: Duration) -> Result<String> {
        (**self).execute(node, kind, timeout)
    }
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &mut E {
    fn execute(&mut self, node: &NodeId, kind: RequestKind, timeout: Duration) -> Result<String> {
        (**self).execute(node, kind, timeout)
    }
}

// ---------------------------------------------------------------------------
// Subprocess helper
// ---------------------------------------------------------------------------

/// Why a subprocess did not produce usable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    TimedOut,
    Failed(String),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimedOut => f.write_str("timed out"),
            Self::Failed(reason) => f.write_str(reason),
        }
    }
}

/// Run `program args…`, capturing stdout and stderr interleaved as one text,
/// and kill it if it outlives `timeout`.
///
/// Output is drained on background threads while waiting so that a chatty
/// child cannot block on a full pipe and be mistaken for a hung one.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> std::result::Result<String, ProcessError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProcessError::Failed(format!("cannot start {program}: {e}")))?;

    let drain = |pipe: Option<Box<dyn Read + Send>>| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut p) = pipe {
                let _ = p.read_to_end(&mut buf);
            }
            buf
        })
    };
    let stdout = drain(child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>));
    let stderr = drain(child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>));

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProcessError::TimedOut);
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(ProcessError::Failed(format!("wait failed: {e}"))),
        }
    };

    let mut out = stdout.join().unwrap_or_default();
    out.extend(stderr.join().unwrap_or_default());
    let text = String::from_utf8_lossy(&out).into_owned();
    if status.success() {
        Ok(text)
    } else {
        let detail = text.trim();
        Err(ProcessError::Failed(if detail.is_empty() {
            format!("exited with {status}")
        } else {
            format!("exited with {status}: {}", last_line(detail))
        }))
    }
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text)
}

// ---------------------------------------------------------------------------
// Meshtastic CLI transport
// ---------------------------------------------------------------------------

/// Executor backed by the `meshtastic` CLI over serial or TCP.
#[derive(Debug, Clone)]
pub struct MeshtasticCli {
    program: String,
    port: Option<String>,
    host: Option<String>,
}

impl Default for MeshtasticCli {
    fn default() -> Self {
        Self::new("meshtastic")
    }
}

impl MeshtasticCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            port: None,
            host: None,
        }
    }

    /// Serial device, e.g. `/dev/ttyACM0`.
    pub fn with_port(mut self, port: Option<String>) -> Self {
        self.port = port;
        self
    }

    /// TCP host of a network-attached radio.
    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    /// Full argument list for a request to `node`.
    pub fn request_args(&self, node: &NodeId, kind: RequestKind) -> Vec<String> {
        let mut args: Vec<String> = match kind {
            RequestKind::DeviceMetrics => vec!["--request-telemetry".into()],
            RequestKind::Sensor(probe) => {
                vec!["--request-telemetry".into(), probe.as_str().into()]
            }
            RequestKind::Traceroute => vec!["--traceroute".into(), node.to_string()],
        };
        if kind.is_telemetry() {
            args.push("--dest".into());
            args.push(node.to_string());
        }
        self.push_connection_args(&mut args);
        args
    }

    fn push_connection_args(&self, args: &mut Vec<String>) {
        if let Some(port) = &self.port {
            args.push("--port".into());
            args.push(port.clone());
        }
        if let Some(host) = &self.host {
            args.push("--host".into());
            args.push(host.clone());
        }
    }

    /// Raw node table as printed by `--nodes`.
    pub fn list_nodes(&self, timeout: Duration) -> std::result::Result<String, ProcessError> {
        let mut args = vec!["--nodes".to_string()];
        self.push_connection_args(&mut args);
        run_with_timeout(&self.program, &args, timeout)
    }
}

impl CommandExecutor for MeshtasticCli {
    fn execute(&mut self, node: &NodeId, kind: RequestKind, timeout: Duration) -> Result<String> {
        let args = self.request_args(node, kind);
        log::debug!("running {} {}", self.program, args.join(" "));
        run_with_timeout(&self.program, &args, timeout).map_err(|e| match e {
            ProcessError::TimedOut => Error::TransportTimeout {
                node: node.to_string(),
                kind,
                timeout,
            },
            ProcessError::Failed(reason) => Error::TransportFailure {
                node: node.to_string(),
                kind,
                reason,
            },
        })
    }
}
