use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::{ConnectionHandler, ConnectionStream};

/// Counts accepted connections and drops them immediately.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new(count: Arc<AtomicUsize>) -> Self {
        Self { count }
    }

    /// Polls until `count` reaches `expected`, giving up after two seconds.
    pub(crate) fn wait_for(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
