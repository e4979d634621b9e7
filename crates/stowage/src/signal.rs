use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Callback = Box<dyn FnOnce()>;

/// One-shot completion event.
///
/// Subscribing after completion runs the callback inline. A callback added
/// from inside another callback during completion also runs exactly once.
#[derive(Default)]
pub struct Completion {
    done:      Cell<bool>,
    callbacks: RefCell<Vec<Callback>>,
}

impl Completion {
    pub fn new() -> Self { Self::default() }

    pub fn is_done(&self) -> bool { self.done.get() }

    pub fn subscribe(&self, f: impl FnOnce() + 'static) {
        if self.done.get() {
            f();
        } else {
            self.callbacks.borrow_mut().push(Box::new(f));
        }
    }

    /// Fire every pending callback. Returns `false` if already completed.
    pub fn complete(&self) -> bool {
        if self.done.replace(true) {
            return false;
        }
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        for f in callbacks {
            f();
        }
        true
    }
}

/// Latch that fires once its count drops to zero.
///
/// Starts at one so work can be added before the owner calls
/// [`Countdown::signal`] for the initial count.
pub struct Countdown {
    remaining: Cell<usize>,
    on_zero:   RefCell<Option<Callback>>,
}

impl Countdown {
    pub fn new(on_zero: impl FnOnce() + 'static) -> Rc<Self> {
        Rc::new(Self {
            remaining: Cell::new(1),
            on_zero:   RefCell::new(Some(Box::new(on_zero))),
        })
    }

    pub fn add(&self) { self.remaining.set(self.remaining.get() + 1); }

    pub fn signal(&self) {
        let left = self.remaining.get().saturating_sub(1);
        self.remaining.set(left);
        if left == 0 {
            let f = self.on_zero.borrow_mut().take();
            if let Some(f) = f {
                f();
            }
        }
    }

    pub fn remaining(&self) -> usize { self.remaining.get() }
}
