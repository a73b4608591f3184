use std::time::Duration;

/// The event loop a channel runs on.
pub trait Scheduler {
    /// Runs `task` on a later turn of the loop.
    fn post(&self, task: Box<dyn FnOnce()>);

    /// Runs `task` once `delay` has passed.
    fn post_delayed(&self, delay: Duration, task: Box<dyn FnOnce()>);
}
