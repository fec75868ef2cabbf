use super::messages::WorkerMessage;
use crate::error::Error;
use crate::events::{JobState, JobStatus, Output};
use crate::types::{JobName, OutputBlob};

use futures::future::{self, FutureExt};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    select,
    sync::{mpsc, oneshot, watch},
    time,
};

pub const DEADLINE_EXCEEDED: &str = "DeadlineExceeded";
pub const STOPPED: &str = "Stopped by request";

pub struct Actor {
    name: JobName,
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    kill_tx: Option<oneshot::Sender<()>>,
    state_tx: watch::Sender<JobState>,
}

impl Actor {
    pub fn spawn(
        name: JobName,
        inbox: mpsc::UnboundedReceiver<WorkerMessage>,
        state_tx: watch::Sender<JobState>,
        output_tx: mpsc::UnboundedSender<Output>,
        command: Command,
        timeout: Option<Duration>,
    ) {
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(async move {
            let actor = Self {
                name,
                inbox,
                kill_tx: Some(kill_tx),
                state_tx,
            };
            actor.run(output_tx, kill_rx, command, timeout).await;
        });
    }

    async fn run(
        mut self,
        output_tx: mpsc::UnboundedSender<Output>,
        kill_rx: oneshot::Receiver<()>,
        mut command: Command,
        timeout: Option<Duration>,
    ) {
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(job = %self.name, error = %err, "Failed to spawn job process");
                self.set_state(JobState::with_reason(
                    JobStatus::Crashed,
                    format!("spawn failed: {}", err),
                ));
                self.kill_tx = None;
                drop(output_tx);
                self.handle_messages(None).await;
                return;
            }
        };
        tracing::debug!(job = %self.name, pid = ?child.id(), "Job process started");
        self.set_state(JobState::new(JobStatus::Running));

        // a killed shell can leave children holding its pipes, so readers stop on kill
        let (abandon_tx, abandon_rx) = watch::channel(false);

        // grab stdout and stderr, if they've been piped
        if let Some(stdout) = child.stdout.take() {
            pipe_lines(stdout, output_tx.clone(), Output::Stdout, abandon_rx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pipe_lines(stderr, output_tx.clone(), Output::Stderr, abandon_rx);
        }
        drop(output_tx);

        let (child_exit_tx, child_exit_rx) = oneshot::channel();
        tokio::spawn(watch_child(child, kill_rx, timeout, child_exit_tx, abandon_tx));
        self.handle_messages(Some(child_exit_rx)).await;
    }

    fn set_state(&self, state: JobState) {
        let _ = self.state_tx.send(state);
    }

    fn is_finished(&self) -> bool {
        self.state_tx.borrow().status.is_finished()
    }

    async fn handle_messages(&mut self, child_exit_rx: Option<oneshot::Receiver<JobState>>) {
        use WorkerMessage::*;
        let mut exited = child_exit_rx.is_none();
        let mut child_exit_rx = match child_exit_rx {
            Some(rx) => rx.boxed(),
            None => future::pending().boxed(),
        };
        loop {
            select! {
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(Stop { response }) => {
                            match self.kill_tx.take() {
                                Some(kill_tx) if !self.is_finished() => {
                                    let _ = kill_tx.send(());
                                    let _ = response.send(Ok(()));
                                }
                                _ => {
                                    let _ = response.send(Err(Error::AlreadyStopped(self.name.clone())));
                                }
                            }
                        }
                        None => {
                            // every handle dropped, make sure the process goes with them
                            if let Some(kill_tx) = self.kill_tx.take() {
                                let _ = kill_tx.send(());
                            }
                            return;
                        }
                    }
                }
                exit_state = &mut child_exit_rx, if !exited => {
                    exited = true;
                    if let Ok(state) = exit_state {
                        tracing::debug!(job = %self.name, status = %state.status, "Job process exited");
                        self.set_state(state);
                    }
                }
            }
        }
    }
}

/// Wait for the process to exit, be killed, or run out of time.
async fn watch_child(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    timeout: Option<Duration>,
    child_exit_tx: oneshot::Sender<JobState>,
    abandon_tx: watch::Sender<bool>,
) {
    let deadline = async move {
        match timeout {
            Some(timeout) => time::sleep(timeout).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    // a dropped kill sender is not a kill request
    let kill = async move {
        if kill_rx.await.is_err() {
            future::pending::<()>().await;
        }
    };
    tokio::pin!(kill);

    let state = select! {
        _ = &mut kill => {
            let _ = child.kill().await;
            let _ = abandon_tx.send(true);
            JobState::with_reason(JobStatus::Killed, STOPPED)
        }
        _ = &mut deadline => {
            let _ = child.kill().await;
            let _ = abandon_tx.send(true);
            JobState::with_reason(JobStatus::Crashed, DEADLINE_EXCEEDED)
        }
        exit_status = child.wait() => exit_state(exit_status),
    };
    let _ = child_exit_tx.send(state);
}

fn exit_state(exit_status: io::Result<ExitStatus>) -> JobState {
    match exit_status {
        Ok(status) if status.success() => JobState::new(JobStatus::Done),
        Ok(status) => match (status.code(), status.signal()) {
            (Some(code), _) => {
                JobState::with_reason(JobStatus::Crashed, format!("Error (exit code {})", code))
            }
            (None, Some(signal)) => JobState::with_reason(
                JobStatus::Crashed,
                format!("Terminated by signal {}", signal),
            ),
            (None, None) => JobState::new(JobStatus::Crashed),
        },
        Err(err) => JobState::with_reason(JobStatus::Crashed, format!("wait failed: {}", err)),
    }
}

/// Forward a pipe to the broadcaster one line at a time, until it closes or the job is killed.
fn pipe_lines<R>(
    pipe: R,
    output_tx: mpsc::UnboundedSender<Output>,
    wrap: fn(OutputBlob) -> Output,
    mut abandon: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut line = Vec::with_capacity(4096);
        let mut watching = true;
        loop {
            select! {
                read = reader.read_until(b'\n', &mut line) => match read {
                    Ok(n) if n > 0 => {
                        let blob = OutputBlob::copy_from_slice(&line);
                        line.clear();
                        if output_tx.send(wrap(blob)).is_err() {
                            break;
                        }
                    }
                    _ => break,
                },
                changed = abandon.changed(), if watching => {
                    if changed.is_err() {
                        // the process exited on its own, read to the end
                        watching = false;
                    } else if *abandon.borrow() {
                        break;
                    }
                }
            }
        }
    });
}
