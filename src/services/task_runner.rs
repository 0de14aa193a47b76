use super::esptool::Invocation;
use super::lines::LineSplitter;
use super::progress::ProgressParser;
use crate::metrics::Metrics;
use crate::models::{MAX_CONCURRENT_TASKS, OutputEvent};
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub type OutputSender = mpsc::UnboundedSender<OutputEvent>;
pub type OutputReceiver = mpsc::UnboundedReceiver<OutputEvent>;

/// Create the task runner's output queue.
pub fn output_channel() -> (OutputSender, OutputReceiver) {
    mpsc::unbounded_channel()
}

/// Errors returned synchronously by [`TaskRunner::start`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TaskError {
    #[error("Another operation is still running")]
    Busy,
}

/// Runs one flashing-tool subprocess at a time and streams its output.
///
/// Everything the subprocess prints goes onto the output queue as
/// [`OutputEvent::Line`] (stdout and stderr both), followed by an
/// [`OutputEvent::Progress`] whenever a line carries a write percentage.
/// Exactly one [`OutputEvent::Completion`] is sent per started invocation,
/// whatever happens: success, non-zero exit, missing executable or a read
/// error. Nothing here touches front-end state.
///
/// Clones share the same permit, so a runner handed to several callers still
/// refuses overlapping work with [`TaskError::Busy`].
#[derive(Clone)]
pub struct TaskRunner {
    runtime: tokio::runtime::Handle,
    output_tx: OutputSender,
    permits: Arc<Semaphore>,
    parser: Arc<ProgressParser>,
    metrics: Arc<Metrics>,
}

impl TaskRunner {
    pub fn new(
        runtime: tokio::runtime::Handle,
        output_tx: OutputSender,
        parser: ProgressParser,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            runtime,
            output_tx,
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_TASKS)),
            parser: Arc::new(parser),
            metrics,
        }
    }

    /// True while an invocation holds the permit.
    pub fn is_running(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Spawn the invocation on the runtime.
    ///
    /// Returns [`TaskError::Busy`] without spawning anything if another
    /// invocation is still running. The returned handle resolves to the
    /// success flag that was sent with the completion event.
    pub fn start(&self, invocation: Invocation) -> Result<JoinHandle<bool>, TaskError> {
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| {
                tracing::warn!(
                    "Refusing to start {}: another operation is running",
                    invocation.operation
                );
                TaskError::Busy
            })?;

        let output = self.output_tx.clone();
        let parser = Arc::clone(&self.parser);
        let metrics = Arc::clone(&self.metrics);

        tracing::info!("Starting {}: {}", invocation.operation, invocation);

        Ok(self.runtime.spawn(async move {
            let started = Instant::now();
            let success = run_invocation(&invocation, &output, &parser, &metrics).await;
            metrics.record_task_finished(success, started.elapsed());

            // The permit is released only after Completion is queued, so the
            // next invocation's output always follows it.
            send(&output, OutputEvent::Completion { success });
            drop(permit);

            tracing::info!(
                "{} finished in {:.2}s (success: {})",
                invocation.operation,
                started.elapsed().as_secs_f32(),
                success
            );
            success
        }))
    }

    /// Start the invocation and wait for it to finish.
    pub async fn run(&self, invocation: Invocation) -> Result<bool, TaskError> {
        let handle = self.start(invocation)?;
        Ok(handle.await.unwrap_or_else(|e| {
            tracing::error!("Task runner join error: {}", e);
            false
        }))
    }
}

async fn run_invocation(
    invocation: &Invocation,
    output: &OutputSender,
    parser: &ProgressParser,
    metrics: &Metrics,
) -> bool {
    send(output, OutputEvent::info(invocation.operation.banner()));

    match execute(invocation, output, parser, metrics).await {
        Ok(0) => {
            send(output, OutputEvent::success("Operation completed successfully!"));
            true
        }
        Ok(code) => {
            tracing::warn!("{} exited with code {}", invocation.program, code);
            send(
                output,
                OutputEvent::error(format!("Operation failed with error code: {}", code)),
            );
            false
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::error!("Flashing tool not found: {}", invocation.program);
            send(
                output,
                OutputEvent::error(format!(
                    "ERROR: '{}' not found. Is it installed? (pip install esptool)",
                    invocation.program
                )),
            );
            false
        }
        Err(e) => {
            tracing::error!("Flashing tool failed: {}", e);
            send(
                output,
                OutputEvent::error(format!("An unexpected error occurred: {}", e)),
            );
            false
        }
    }
}

/// Spawn the process with stdout and stderr sharing one pipe, pump it to EOF
/// and return the exit code. A process killed by a signal reports -1.
async fn execute(
    invocation: &Invocation,
    output: &OutputSender,
    parser: &ProgressParser,
    metrics: &Metrics,
) -> io::Result<i32> {
    let (reader, writer) = io::pipe()?;
    let stderr_writer = writer.try_clone()?;

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr_writer);

    #[cfg(windows)]
    command.creation_flags(CREATE_NO_WINDOW);

    let spawned = command.spawn();
    // The command still owns the parent's write ends; the reader only sees
    // EOF once they are closed.
    drop(command);
    let mut child = spawned?;

    let (pump_result, status) = tokio::join!(
        pump_lines(merged_output(reader), output, parser, metrics),
        child.wait(),
    );

    pump_result?;
    let status = status?;

    Ok(status.code().unwrap_or(-1))
}

/// Async view of the read end of the merged output pipe.
fn merged_output(reader: io::PipeReader) -> tokio::fs::File {
    #[cfg(unix)]
    let handle = std::os::fd::OwnedFd::from(reader);
    #[cfg(windows)]
    let handle = std::os::windows::io::OwnedHandle::from(reader);

    tokio::fs::File::from_std(std::fs::File::from(handle))
}

async fn pump_lines<R>(
    mut reader: R,
    output: &OutputSender,
    parser: &ProgressParser,
    metrics: &Metrics,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::with_carriage_return();
    let mut buf = [0u8; 4096];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for line in splitter.feed(&buf[..n]) {
            publish_line(output, parser, metrics, line);
        }
    }

    if let Some(line) = splitter.flush() {
        publish_line(output, parser, metrics, line);
    }

    Ok(())
}

fn publish_line(output: &OutputSender, parser: &ProgressParser, metrics: &Metrics, line: String) {
    tracing::debug!(target: "espforge::esptool", "{}", line);
    metrics.record_task_line();

    let progress = parser.parse(&line);
    send(output, OutputEvent::info(line));

    if let Some(percent) = progress {
        metrics.record_progress_update();
        send(output, OutputEvent::Progress(percent));
    }
}

fn send(output: &OutputSender, event: OutputEvent) {
    if output.send(event).is_err() {
        tracing::trace!("Output queue closed, dropping task event");
    }
}
