use std::cell::RefCell;
use std::collections::VecDeque;

type Step = Box<dyn FnOnce()>;

/// FIFO of deferred main-context work, run one step per tick.
#[derive(Default)]
pub struct SerialQueue {
    steps: RefCell<VecDeque<Step>>,
}

impl SerialQueue {
    pub fn new() -> Self { Self::default() }

    pub fn push(&self, step: impl FnOnce() + 'static) { self.steps.borrow_mut().push_back(Box::new(step)); }

    /// Run the oldest step. Returns `false` when the queue was empty.
    pub fn run_one(&self) -> bool {
        let step = self.steps.borrow_mut().pop_front();
        match step {
            Some(step) => {
                step();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize { self.steps.borrow().len() }

    pub fn is_empty(&self) -> bool { self.steps.borrow().is_empty() }

    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.steps.borrow_mut());
        drop(dropped);
    }
}
