#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Loaded,
    /// Loaded, but with decode errors or rejected chunks
    Partial,
    Failed,
}

/// Progress message sent by a loader worker each time it finishes a stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadStatus {
    pub progress: f32,
    pub stream: String,
    pub worker_id: usize,
    pub state: StreamState,
}

impl LoadStatus {
    pub fn new(progress: f32, stream: &str, worker_id: usize, state: StreamState) -> Self {
        Self {
            progress,
            stream: stream.to_string(),
            worker_id,
            state,
        }
    }
}
