use std::collections::VecDeque;

use tracing::info;

/// Bounded log of operator-facing status lines. Every line is also emitted
/// through `tracing` under the `capture::status` target.
#[derive(Clone, Debug)]
pub struct StatusLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!(target: "capture::status", "{line}");
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_lines() {
        let mut log = StatusLog::new(3);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines, ["line 2", "line 3", "line 4"]);
        assert_eq!(log.last(), Some("line 4"));
    }
}
