use crate::cli::config::DEFAULT_BUFFER_POOL_SIZE;

// Define the global arguments
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub quiet: bool,
    pub workers: usize,
    pub buffer_pool: u64,
}

impl Default for GlobalArgs {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalArgs {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quiet: false,
            workers: 1,
            buffer_pool: DEFAULT_BUFFER_POOL_SIZE,
        }
    }

    pub fn set_workers(&mut self, workers: usize) {
        self.workers = workers.max(1);
    }

    pub fn set_buffer_pool(&mut self, size: u64) {
        self.buffer_pool = size;
    }
}
