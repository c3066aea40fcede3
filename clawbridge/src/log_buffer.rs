use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default number of lines kept from a child process.
pub const DEFAULT_CAPACITY: usize = 2000;

/// Bounded FIFO of the most recent lines a child process printed.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

/// Log buffer shared between the process readers and context assembly.
pub type SharedLogBuffer = Arc<Mutex<LogBuffer>>;

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity,
        }
    }

    pub fn shared(capacity: usize) -> SharedLogBuffer {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Split `text` into lines, drop empty ones, append the rest and evict
    /// from the head until the buffer fits its capacity.
    pub fn append(&mut self, text: &str) {
        for line in text.split(['\n', '\r']) {
            if line.is_empty() {
                continue;
            }
            self.lines.push_back(line.to_string());
        }
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// The last `n` lines joined with newlines.
    pub fn tail(&self, n: usize) -> String {
        let skip = self.lines.len().saturating_sub(n);
        self.lines
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn reset(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
