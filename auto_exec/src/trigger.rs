//! # Triggers
//!
//! A [`PollLoop`] holds an ordered list of bindings, each pairing a boolean condition with an
//! action. Every call to [`PollLoop::poll`] evaluates each bound condition once, in registration
//! order, and runs the action on the edge the binding asked for.
//!
//! A [`Trigger`] is a condition together with the loop it belongs to. Triggers compose with
//! [`Trigger::and`], [`Trigger::or`] and [`Trigger::negate`] into new triggers which recompute
//! their value from their operands every time they are read. Conditions which carry memory between
//! cycles (edge detectors, pulses) latch their value for the current cycle, so reading the same
//! trigger twice in one cycle gives the same answer.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{trace, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::command::{Command, CommandScheduler};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A boolean condition which can be evaluated at any time.
pub trait Condition {
    fn evaluate(&self) -> bool;
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Shared count of how many times a poll loop has been polled.
#[derive(Debug, Clone, Default)]
pub struct CycleCounter(Rc<Cell<u64>>);

/// An ordered list of condition/action bindings, evaluated once per poll.
///
/// Cloning gives another handle to the same loop.
#[derive(Clone, Default)]
pub struct PollLoop {
    inner: Rc<PollLoopInner>,
}

#[derive(Default)]
struct PollLoopInner {
    bindings: RefCell<Vec<Rc<RefCell<Binding>>>>,
    cycle: CycleCounter,
    polling: Cell<bool>,
}

struct Binding {
    condition: Rc<dyn Condition>,
    kind: BindingKind,

    /// Value of the condition at the previous poll, owned by this binding alone
    previous: bool,

    action: Box<dyn FnMut()>,
}

/// Memoises the value of a stateful condition for one poll cycle.
#[derive(Debug, Default)]
pub struct CycleLatch {
    cycle: Cell<Option<u64>>,
    value: Cell<bool>,
}

/// A condition bound to a poll loop.
#[derive(Clone)]
pub struct Trigger {
    poll_loop: PollLoop,
    condition: Rc<dyn Condition>,
}

/// True for a single cycle when the source changes in the watched direction.
struct EdgeDetector {
    source: Rc<dyn Condition>,
    rising: bool,
    last: Cell<bool>,
    cycle: CycleCounter,
    latch: CycleLatch,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    Rising,
    Falling,
    Change,
    WhileHigh,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl<F> Condition for F
where
    F: Fn() -> bool,
{
    fn evaluate(&self) -> bool {
        self()
    }
}

impl CycleCounter {
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    fn increment(&self) -> u64 {
        let next = self.0.get() + 1;
        self.0.set(next);
        next
    }
}

impl PollLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every binding once, in the order they were added.
    ///
    /// Bindings added while polling are first evaluated on the next poll.
    pub fn poll(&self) {
        if self.inner.polling.replace(true) {
            warn!("Poll loop polled from inside one of its own actions, ignoring");
            return;
        }

        let cycle = self.inner.cycle.increment();
        let bindings: Vec<_> = self.inner.bindings.borrow().clone();
        trace!("Poll cycle {} ({} bindings)", cycle, bindings.len());

        for binding in bindings {
            binding.borrow_mut().poll();
        }

        self.inner.polling.set(false);
    }

    /// Remove every binding.
    pub fn clear(&self) {
        self.inner.bindings.borrow_mut().clear();
    }

    /// Number of times the loop has been polled.
    pub fn cycle(&self) -> u64 {
        self.inner.cycle.get()
    }

    pub fn cycle_counter(&self) -> CycleCounter {
        self.inner.cycle.clone()
    }

    pub fn num_bindings(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    /// Whether two handles refer to the same loop.
    pub fn ptr_eq(&self, other: &PollLoop) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn bind(&self, condition: Rc<dyn Condition>, kind: BindingKind, action: Box<dyn FnMut()>) {
        self.inner.bindings.borrow_mut().push(Rc::new(RefCell::new(Binding {
            condition,
            kind,
            previous: false,
            action,
        })));
    }
}

impl Binding {
    fn poll(&mut self) {
        let current = self.condition.evaluate();

        let fire = match self.kind {
            BindingKind::Rising => current && !self.previous,
            BindingKind::Falling => !current && self.previous,
            BindingKind::Change => current != self.previous,
            BindingKind::WhileHigh => current,
        };

        self.previous = current;

        if fire {
            (self.action)();
        }
    }
}

impl CycleLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value latched for `cycle`, computing it with `update` on the first request.
    pub fn get_or_update<F: FnOnce() -> bool>(&self, cycle: u64, update: F) -> bool {
        if self.cycle.get() != Some(cycle) {
            self.value.set(update());
            self.cycle.set(Some(cycle));
        }

        self.value.get()
    }
}

impl Trigger {
    pub fn new<F: Fn() -> bool + 'static>(poll_loop: &PollLoop, condition: F) -> Self {
        Self::from_condition(poll_loop, Rc::new(condition))
    }

    pub fn from_condition(poll_loop: &PollLoop, condition: Rc<dyn Condition>) -> Self {
        Self {
            poll_loop: poll_loop.clone(),
            condition,
        }
    }

    /// A trigger which is never true.
    pub fn off(poll_loop: &PollLoop) -> Self {
        Self::new(poll_loop, || false)
    }

    /// Current value of the condition.
    pub fn get(&self) -> bool {
        self.condition.evaluate()
    }

    pub fn poll_loop(&self) -> &PollLoop {
        &self.poll_loop
    }

    pub fn condition(&self) -> Rc<dyn Condition> {
        self.condition.clone()
    }

    /// True while both triggers are true.
    ///
    /// Both operands are always evaluated, so stateful operands see every cycle.
    pub fn and(&self, other: &Trigger) -> Trigger {
        self.check_same_loop(other);
        let (a, b) = (self.condition.clone(), other.condition.clone());
        Trigger::new(&self.poll_loop, move || a.evaluate() & b.evaluate())
    }

    /// True while either trigger is true.
    ///
    /// Both operands are always evaluated, so stateful operands see every cycle.
    pub fn or(&self, other: &Trigger) -> Trigger {
        self.check_same_loop(other);
        let (a, b) = (self.condition.clone(), other.condition.clone());
        Trigger::new(&self.poll_loop, move || a.evaluate() | b.evaluate())
    }

    pub fn negate(&self) -> Trigger {
        let a = self.condition.clone();
        Trigger::new(&self.poll_loop, move || !a.evaluate())
    }

    /// True for the one cycle in which this trigger goes from false to true.
    pub fn rising_edge(&self) -> Trigger {
        self.edge(true)
    }

    /// True for the one cycle in which this trigger goes from true to false.
    pub fn falling_edge(&self) -> Trigger {
        self.edge(false)
    }

    /// Run `action` on each poll where the condition changes from false to true.
    pub fn on_true<F: FnMut() + 'static>(&self, action: F) -> Trigger {
        self.bind(BindingKind::Rising, action)
    }

    /// Run `action` on each poll where the condition changes from true to false.
    pub fn on_false<F: FnMut() + 'static>(&self, action: F) -> Trigger {
        self.bind(BindingKind::Falling, action)
    }

    /// Run `action` on each poll where the condition changes.
    pub fn on_change<F: FnMut() + 'static>(&self, action: F) -> Trigger {
        self.bind(BindingKind::Change, action)
    }

    /// Run `action` on every poll where the condition is true.
    pub fn while_true<F: FnMut() + 'static>(&self, action: F) -> Trigger {
        self.bind(BindingKind::WhileHigh, action)
    }

    /// Schedule a fresh command from `factory` each time the condition becomes true.
    pub fn schedule_on_true<F>(&self, scheduler: &CommandScheduler, factory: F) -> Trigger
    where
        F: Fn() -> Box<dyn Command> + 'static,
    {
        let scheduler = scheduler.clone();
        self.on_true(move || scheduler.schedule(factory()))
    }

    fn bind<F: FnMut() + 'static>(&self, kind: BindingKind, action: F) -> Trigger {
        self.poll_loop
            .bind(self.condition.clone(), kind, Box::new(action));
        self.clone()
    }

    fn edge(&self, rising: bool) -> Trigger {
        Trigger::from_condition(
            &self.poll_loop,
            Rc::new(EdgeDetector {
                source: self.condition.clone(),
                rising,
                last: Cell::new(false),
                cycle: self.poll_loop.cycle_counter(),
                latch: CycleLatch::new(),
            }),
        )
    }

    fn check_same_loop(&self, other: &Trigger) {
        if !self.poll_loop.ptr_eq(&other.poll_loop) {
            warn!(
                "Composing triggers from different poll loops, the result is bound to the first \
                 trigger's loop"
            );
        }
    }
}

impl Condition for EdgeDetector {
    fn evaluate(&self) -> bool {
        self.latch.get_or_update(self.cycle.get(), || {
            let now = self.source.evaluate();
            let previous = self.last.replace(now);

            if self.rising {
                now && !previous
            }
            else {
                !now && previous
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::command::test::Scripted;

    fn flag(poll_loop: &PollLoop) -> (Rc<Cell<bool>>, Trigger) {
        let value = Rc::new(Cell::new(false));
        let v = value.clone();
        (value, Trigger::new(poll_loop, move || v.get()))
    }

    fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, move || c.set(c.get() + 1))
    }

    #[test]
    fn test_edges() {
        let poll_loop = PollLoop::new();
        let (value, trigger) = flag(&poll_loop);

        let (rises, on_rise) = counter();
        let (falls, on_fall) = counter();
        let (changes, on_change) = counter();
        let (highs, on_high) = counter();
        trigger.on_true(on_rise);
        trigger.on_false(on_fall);
        trigger.on_change(on_change);
        trigger.while_true(on_high);
        assert_eq!(poll_loop.num_bindings(), 4);

        for v in &[false, true, true, false, true] {
            value.set(*v);
            poll_loop.poll();
        }

        assert_eq!(rises.get(), 2);
        assert_eq!(falls.get(), 1);
        assert_eq!(changes.get(), 3);
        assert_eq!(highs.get(), 3);
        assert_eq!(poll_loop.cycle(), 5);
    }

    #[test]
    fn test_edge_memory_is_per_binding() {
        let poll_loop = PollLoop::new();
        let (value, trigger) = flag(&poll_loop);
        value.set(true);

        let (first, on_first) = counter();
        trigger.on_true(on_first);
        poll_loop.poll();

        // A binding added later sees its own first rising edge
        let (second, on_second) = counter();
        trigger.on_true(on_second);
        poll_loop.poll();

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn test_composition() {
        let poll_loop = PollLoop::new();
        let (a_value, a) = flag(&poll_loop);
        let (b_value, b) = flag(&poll_loop);

        let and = a.and(&b);
        let or = a.or(&b);
        let not_a = a.negate();

        a_value.set(true);
        assert!(!and.get());
        assert!(or.get());
        assert!(!not_a.get());

        b_value.set(true);
        assert!(and.get());

        a_value.set(false);
        b_value.set(false);
        assert!(!or.get());
        assert!(not_a.get());
        assert!(Trigger::off(&poll_loop).negate().get());
    }

    #[test]
    fn test_rising_edge_is_consistent_within_a_cycle() {
        let poll_loop = PollLoop::new();
        let (value, trigger) = flag(&poll_loop);
        let edge = trigger.rising_edge();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let e = edge.clone();
        Trigger::new(&poll_loop, || true).while_true(move || {
            s.borrow_mut().push((e.get(), e.get()));
        });

        for v in &[false, true, true, false, true] {
            value.set(*v);
            poll_loop.poll();
        }

        assert_eq!(
            *seen.borrow(),
            vec![(false, false), (true, true), (false, false), (false, false), (true, true)]
        );

        let falling = trigger.falling_edge();
        value.set(false);
        poll_loop.poll();
        assert!(!falling.get());
    }

    #[test]
    fn test_bindings_added_during_poll() {
        let poll_loop = PollLoop::new();
        let count = Rc::new(Cell::new(0));

        let inner_loop = poll_loop.clone();
        let c = count.clone();
        Trigger::new(&poll_loop, || true).on_true(move || {
            let c = c.clone();
            Trigger::new(&inner_loop, || true).on_true(move || c.set(c.get() + 1));
        });

        poll_loop.poll();
        assert_eq!(poll_loop.num_bindings(), 2);
        assert_eq!(count.get(), 0);

        poll_loop.poll();
        poll_loop.poll();
        assert_eq!(count.get(), 1);

        poll_loop.clear();
        assert_eq!(poll_loop.num_bindings(), 0);
    }

    #[test]
    fn test_schedule_on_true() {
        let poll_loop = PollLoop::new();
        let scheduler = CommandScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (value, trigger) = flag(&poll_loop);

        let l = log.clone();
        trigger.schedule_on_true(&scheduler, move || -> Box<dyn Command> {
            Box::new(Scripted::new("scripted", 5, &l))
        });

        poll_loop.poll();
        assert_eq!(scheduler.num_running(), 0);

        value.set(true);
        poll_loop.poll();
        poll_loop.poll();
        assert_eq!(scheduler.num_running(), 1);
        assert_eq!(*log.borrow(), vec!["scripted init"]);
    }
}
