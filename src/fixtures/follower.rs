use crate::runtime::progress::ProgressFollower;

/// Keeps every `(step, message)` notification for later assertions.
#[derive(Debug, Default)]
pub struct RecordingFollower {
    pub calls: Vec<(Option<String>, Option<String>)>,
}

impl RecordingFollower {
    pub fn messages(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter(|(step, _)| step.is_none())
            .filter_map(|(_, message)| message.clone())
            .collect()
    }

    pub fn steps(&self) -> Vec<String> {
        self.calls.iter().filter_map(|(step, _)| step.clone()).collect()
    }
}

impl ProgressFollower for RecordingFollower {
    fn follow(&mut self, step: Option<&str>, message: Option<&str>) {
        self.calls.push((step.map(str::to_string), message.map(str::to_string)));
    }
}
