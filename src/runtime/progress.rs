use std::io::Write;
use futures::stream::{Stream, StreamExt};
use regex::Regex;
use crate::runtime::engine::BuildEvent;
use crate::runtime::error::RuntimeError;

// Classic builder prints `Successfully built <id>`, older engines `sha:<id>`.
const BUILD_ID_PATTERN: &str = r"^(?:sha:|Successfully built )(\S+)";

/// Receives `(step, message)` notifications while an operation runs.
///
/// `(Some(step), _)` opens a step and finishes the previous one,
/// `(None, Some(message))` adds a line to the open step and
/// `(None, None)` closes it.
pub(crate) trait ProgressFollower: Send {
    fn follow(&mut self, step: Option<&str>, message: Option<&str>);

    fn step(&mut self, step: &str) {
        self.follow(Some(step), None);
    }

    fn message(&mut self, message: &str) {
        self.follow(None, Some(message));
    }

    fn done(&mut self) {
        self.follow(None, None);
    }
}

/// Which step is open for one top-level operation.
#[derive(Debug, Default)]
pub(crate) struct StepTracker {
    current: Option<String>,
}

impl StepTracker {
    /// Opens `step` and returns the step it finished, if any.
    pub(crate) fn open(&mut self, step: &str) -> Option<String> {
        self.current.replace(step.to_string())
    }

    pub(crate) fn close(&mut self) -> Option<String> {
        self.current.take()
    }

    pub(crate) fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

/// Terminal rendering: `step...message` while running, `step...done.` once finished.
/// One instance per top-level operation.
pub(crate) struct CliFollower<W: Write + Send> {
    out: W,
    steps: StepTracker,
}

impl<W: Write + Send> CliFollower<W> {
    pub(crate) fn new(out: W) -> Self {
        CliFollower { out, steps: StepTracker::default() }
    }

    #[cfg(test)]
    pub(crate) fn current_step(&self) -> Option<&str> {
        self.steps.current()
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: String) {
        if let Err(e) = writeln!(self.out, "{}", line) {
            debug!("Unable to write progress line: {}", e);
        }
    }

    fn finish(&mut self, step: Option<String>) {
        if let Some(step) = step {
            self.write_line(format!("{}...done.", step));
        }
    }
}

impl CliFollower<std::io::Stdout> {
    pub(crate) fn stdout() -> Self {
        CliFollower::new(std::io::stdout())
    }
}

impl<W: Write + Send> ProgressFollower for CliFollower<W> {
    fn follow(&mut self, step: Option<&str>, message: Option<&str>) {
        // only the first line with text is shown
        let message = message.and_then(|m| m.trim().lines().next()).filter(|m| !m.is_empty());

        match (step, message) {
            (Some(step), message) => {
                let prior = self.steps.open(step);
                self.finish(prior);
                self.write_line(format!("{}...{}", step, message.unwrap_or("")));
            }
            (None, Some(message)) => {
                let line = match self.steps.current() {
                    Some(step) => format!("{}...{}", step, message),
                    None => format!("...{}", message),
                };
                self.write_line(line);
            }
            (None, None) => {
                let prior = self.steps.close();
                self.finish(prior);
            }
        }
    }
}

/// Sends progress to the logger instead of the terminal.
#[derive(Default)]
pub(crate) struct LogFollower {
    steps: StepTracker,
}

impl ProgressFollower for LogFollower {
    fn follow(&mut self, step: Option<&str>, message: Option<&str>) {
        match (step, message) {
            (Some(step), _) => {
                if let Some(prior) = self.steps.open(step) {
                    info!("{} done", prior);
                }
                info!("{}", step);
            }
            (None, Some(message)) => {
                debug!("[{}] {}", self.steps.current().unwrap_or("-"), message.trim());
            }
            (None, None) => {
                if let Some(prior) = self.steps.close() {
                    info!("{} done", prior);
                }
            }
        }
    }
}

/// Drains a build event stream, forwarding messages to `follower`, and
/// returns the id of the built image.
pub(crate) async fn follow_build_stream<S>(mut stream: S, follower: &mut dyn ProgressFollower) -> Result<String, RuntimeError>
where
    S: Stream<Item = Result<BuildEvent, RuntimeError>> + Unpin,
{
    let id_pattern = Regex::new(BUILD_ID_PATTERN)
        .map_err(|e| RuntimeError::Other(format!("Invalid build id pattern: {}", e)))?;
    let mut pending_id: Option<String> = None;

    while let Some(event) = stream.next().await {
        let event = event?;

        if let Some(error) = event.error {
            error!("Docker build error: {}", error);
            return Err(RuntimeError::BuildStreamError(error));
        }

        if let Some(message) = event.message.as_deref() {
            let trimmed = message.trim();

            let first_line = trimmed.lines().map(str::trim).find(|line| !line.is_empty());
            if let Some(captures) = first_line.and_then(|line| id_pattern.captures(line)) {
                pending_id = Some(captures[1].to_string());
            }

            if !trimmed.is_empty() {
                follower.message(trimmed);
            }
        }

        if let Some(aux_id) = event.aux_id {
            pending_id = Some(aux_id);
        }
    }

    match pending_id {
        Some(id) => {
            debug!("Build stream finished with id {}", id);
            Ok(id)
        }
        None => Err(RuntimeError::BuildStreamIncomplete),
    }
}
