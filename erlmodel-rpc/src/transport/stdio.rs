use super::Transport;
use crate::channel::ReplyRouter;
use crate::error::{Result, RpcError};
use crate::message::{Reply, Request};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// External runtime process speaking one JSON object per line.
///
/// Requests are written to the child's stdin, replies read from its stdout.
/// The child is killed when the transport closes. If the child exits or its
/// pipes break, every waiting call fails with a transport error.
pub struct StdioTransport {
    command: Vec<String>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Request>>>,
}

impl StdioTransport {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            outgoing: Mutex::new(None),
        }
    }
}

impl Transport for StdioTransport {
    fn start(&self, router: ReplyRouter, runtime: &Handle) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(RpcError::Transport("empty runtime command".to_string()));
        };

        // Process spawning needs the runtime's reactor
        let _enter = runtime.enter();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RpcError::Transport(format!("cannot start {}: {}", program, e)))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(RpcError::Transport("runtime pipes unavailable".to_string()));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(write_requests(stdin, rx, child, router.clone()));
        runtime.spawn(read_replies(stdout, router));

        *self.outgoing.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        tracing::debug!(program = %program, "runtime process started");
        Ok(())
    }

    fn send(&self, request: Request) -> Result<()> {
        let outgoing = self.outgoing.lock().unwrap_or_else(|e| e.into_inner());
        let tx = outgoing.as_ref().ok_or(RpcError::Closed)?;
        tx.send(request).map_err(|_| RpcError::Closed)
    }

    fn close(&self) {
        // Dropping the sender ends the writer task, which kills the child
        self.outgoing.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

async fn write_requests(
    mut stdin: ChildStdin,
    mut rx: mpsc::UnboundedReceiver<Request>,
    mut child: tokio::process::Child,
    router: ReplyRouter,
) {
    while let Some(request) = rx.recv().await {
        let tag = request.tag;
        let mut line = match serde_json::to_string(&request) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(tag = tag.0, error = %e, "cannot encode request");
                router.fail(tag, &format!("cannot encode request: {}", e));
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "runtime stdin closed");
            router.fail_all(&format!("runtime stdin closed: {}", e));
            break;
        }
        if let Err(e) = stdin.flush().await {
            tracing::error!(error = %e, "runtime stdin flush failed");
            router.fail_all(&format!("runtime stdin closed: {}", e));
            break;
        }
    }

    drop(stdin);
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "runtime process already gone");
    }
}

async fn read_replies(stdout: ChildStdout, router: ReplyRouter) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Reply>(&line) {
                    Ok(reply) => {
                        router.deliver(reply);
                    }
                    Err(e) => tracing::warn!(error = %e, line = %line, "malformed reply line"),
                }
            }
            Ok(None) => {
                tracing::info!("runtime closed its output");
                router.fail_all("runtime exited");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "error reading from runtime");
                router.fail_all(&format!("error reading from runtime: {}", e));
                break;
            }
        }
    }
}
