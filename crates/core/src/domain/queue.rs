// Queue Domain Model

/// A configured queue and the number of polling loops it should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub name: String,
    pub polling_threads: usize,
}

impl QueueDescriptor {
    pub fn new(name: impl Into<String>, polling_threads: usize) -> Self {
        Self {
            name: name.into(),
            polling_threads,
        }
    }

    /// Queues configured with zero polling threads are skipped
    pub fn is_enabled(&self) -> bool {
        self.polling_threads > 0
    }
}

/// A queue address resolved by the transport (e.g. an SQS queue URL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRef {
    pub name: String,
    pub url: String,
}

impl QueueRef {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}
