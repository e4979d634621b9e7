use std::collections::VecDeque;
use std::sync::Arc;

use crate::Job;

/// Pending jobs ordered by priority, FIFO among equals.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<Arc<Job>>,
}

impl JobQueue {
    pub fn new() -> Self { Self::default() }

    /// Insert ahead of every queued job with a strictly lower priority.
    pub fn push(&mut self, job: Arc<Job>) {
        let priority = job.spec().priority;
        let at = self
            .jobs
            .iter()
            .position(|queued| queued.spec().priority < priority)
            .unwrap_or(self.jobs.len());
        self.jobs.insert(at, job);
    }

    pub fn pop(&mut self) -> Option<Arc<Job>> { self.jobs.pop_front() }

    pub fn len(&self) -> usize { self.jobs.len() }

    pub fn is_empty(&self) -> bool { self.jobs.is_empty() }

    pub fn find(&self, name: &str) -> Option<&Arc<Job>> { self.jobs.iter().find(|j| j.name() == name) }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Job>> {
        let at = self.jobs.iter().position(|j| j.name() == name)?;
        self.jobs.remove(at)
    }

    pub fn drain(&mut self) -> Vec<Arc<Job>> { self.jobs.drain(..).collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobSpec;
    use stowage_fs::PackageLayout;

    fn job(name: &str, priority: i32) -> Arc<Job> {
        let spec = JobSpec::new(name, name, &PackageLayout::new("/tmp")).priority(priority);
        Arc::new(Job::new(spec, |_| {}))
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = JobQueue::new();
        queue.push(job("a", 0));
        queue.push(job("b", 0));
        queue.push(job("urgent", 5));
        queue.push(job("c", 0));
        queue.push(job("urgent2", 5));
        queue.push(job("low", -1));

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|j| j.name().to_string())
            .collect();
        assert_eq!(order, vec!["urgent", "urgent2", "a", "b", "c", "low"]);
    }

    #[test]
    fn test_find_and_drain() {
        let mut queue = JobQueue::new();
        queue.push(job("a", 0));
        queue.push(job("b", 1));
        assert!(queue.find("a").is_some());
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut queue = JobQueue::new();
        queue.push(job("a", 0));
        queue.push(job("b", 0));
        queue.push(job("c", 0));

        assert_eq!(queue.remove("b").map(|j| j.name().to_string()).as_deref(), Some("b"));
        assert!(queue.remove("b").is_none());
        assert_eq!(queue.pop().unwrap().name(), "a");
        assert_eq!(queue.pop().unwrap().name(), "c");
    }
}
