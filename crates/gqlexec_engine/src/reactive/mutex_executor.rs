use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    running: bool,
}

/// Runs submitted tasks one at a time, in submission order, without blocking submitters.
///
/// Whichever thread finds the executor idle runs the queue until it is empty; every other
/// submitter only enqueues. Tasks submitted from inside a running task are queued behind
/// it rather than run re-entrantly.
#[derive(Default)]
pub struct MutexExecutor {
    queue: Mutex<Queue>,
}

impl MutexExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
        {
            let mut queue = self.queue.lock();
            queue.tasks.push_back(Box::new(task));
            if queue.running {
                return;
            }
            queue.running = true;
        }
        loop {
            let task = {
                let mut queue = self.queue.lock();
                match queue.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        queue.running = false;
                        return;
                    }
                }
            };
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!("task panicked inside the mutex executor");
            }
        }
    }
}
