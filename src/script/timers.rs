//! Deferred callbacks (`set_timeout`).
//!
//! Callbacks run after the main body, earliest due first, ties in scheduling
//! order. A run only signals completion once the queue is empty.

use rhai::{Engine, EvalAltResult, FnPtr, INT};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// One scheduled callback
pub struct Timer {
    pub id: INT,
    pub due: Instant,
    pub callback: FnPtr,
}

/// Pending callbacks for a single execution
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: INT,
    scheduled: usize,
    max_timers: usize,
}

pub type SharedTimers = Rc<RefCell<TimerQueue>>;

impl TimerQueue {
    pub fn new(max_timers: usize) -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
            scheduled: 0,
            max_timers,
        }
    }

    /// Schedule `callback` after `delay_ms` (negative delays count as zero).
    pub fn schedule(
        &mut self,
        callback: FnPtr,
        delay_ms: INT,
    ) -> Result<INT, Box<EvalAltResult>> {
        if self.scheduled >= self.max_timers {
            return Err(format!("too many timers scheduled (limit {})", self.max_timers).into());
        }

        let delay = Duration::from_millis(delay_ms.max(0) as u64);
        let id = self.next_id;
        self.next_id += 1;
        self.scheduled += 1;
        self.timers.push(Timer {
            id,
            due: Instant::now() + delay,
            callback,
        });
        Ok(id)
    }

    /// Drop a pending timer. Returns false if it already ran or never existed.
    pub fn cancel(&mut self, id: INT) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    /// Remove and return the next timer to fire.
    pub fn pop_next(&mut self) -> Option<Timer> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;
        Some(self.timers.remove(index))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// Register `set_timeout(callback[, delay_ms])` and `clear_timeout(id)`.
pub fn register_timers(engine: &mut Engine, timers: &SharedTimers) {
    let queue = Rc::clone(timers);
    engine.register_fn(
        "set_timeout",
        move |callback: FnPtr, delay_ms: INT| -> Result<INT, Box<EvalAltResult>> {
            queue.borrow_mut().schedule(callback, delay_ms)
        },
    );

    let queue = Rc::clone(timers);
    engine.register_fn(
        "set_timeout",
        move |callback: FnPtr| -> Result<INT, Box<EvalAltResult>> {
            queue.borrow_mut().schedule(callback, 0)
        },
    );

    let queue = Rc::clone(timers);
    engine.register_fn("clear_timeout", move |id: INT| queue.borrow_mut().cancel(id));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(name: &str) -> FnPtr {
        FnPtr::new(name).unwrap()
    }

    #[test]
    fn pops_earliest_due_first() {
        let mut queue = TimerQueue::new(10);
        queue.schedule(callback("late"), 50).unwrap();
        queue.schedule(callback("early"), 0).unwrap();
        assert_eq!(queue.pop_next().unwrap().callback.fn_name(), "early");
        assert_eq!(queue.pop_next().unwrap().callback.fn_name(), "late");
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn equal_delays_keep_scheduling_order() {
        let mut queue = TimerQueue::new(10);
        queue.schedule(callback("a"), 0).unwrap();
        queue.schedule(callback("b"), 0).unwrap();
        queue.schedule(callback("c"), 0).unwrap();
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next())
            .map(|t| t.callback.fn_name().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn limit_counts_every_schedule() {
        let mut queue = TimerQueue::new(2);
        queue.schedule(callback("a"), 0).unwrap();
        queue.pop_next();
        queue.schedule(callback("b"), 0).unwrap();
        assert!(queue.schedule(callback("c"), 0).is_err());
    }

    #[test]
    fn cancel_removes_pending_timer() {
        let mut queue = TimerQueue::new(10);
        let id = queue.schedule(callback("a"), 0).unwrap();
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert!(queue.is_empty());
    }
}
