//! # Commands
//!
//! A command is a unit of periodic work with a start, a body run once per cycle, an end, and a
//! completion check. The [`CommandScheduler`] drives commands cycle by cycle. It is deliberately
//! small: routines only need to start work, cancel it and learn when it is done.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A unit of periodic work driven by the [`CommandScheduler`].
pub trait Command {
    /// Name used in logs and by [`CommandScheduler::is_running`].
    fn name(&self) -> &str;

    /// The resource this command needs exclusive use of, if any.
    ///
    /// Starting a command interrupts any running command with the same requirement.
    fn requirement(&self) -> Option<&str> {
        None
    }

    /// Called once when the command starts.
    fn initialize(&mut self) {}

    /// Called once per cycle while the command runs.
    fn execute(&mut self) {}

    /// Called once when the command finishes or is interrupted.
    fn end(&mut self, _interrupted: bool) {}

    /// Whether the command has finished its work.
    fn is_finished(&self) -> bool;
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A command which runs a closure once when it starts and then finishes.
pub struct InstantCommand {
    name: String,
    action: Box<dyn FnMut()>,
}

/// Runs commands once per cycle.
///
/// Cloning the scheduler gives another handle to the same set of commands.
#[derive(Clone, Default)]
pub struct CommandScheduler {
    inner: Rc<SchedulerInner>,
}

#[derive(Default)]
struct SchedulerInner {
    running: RefCell<Vec<Box<dyn Command>>>,

    /// Requests made while commands were being run, applied in order at the end of the cycle
    deferred: RefCell<Vec<Deferred>>,

    in_run: Cell<bool>,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

enum Deferred {
    Schedule(Box<dyn Command>),
    CancelAll,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl InstantCommand {
    pub fn new<N: Into<String>, F: FnMut() + 'static>(name: N, action: F) -> Self {
        Self {
            name: name.into(),
            action: Box::new(action),
        }
    }

    /// Box the command, ready for scheduling.
    pub fn boxed(self) -> Box<dyn Command> {
        Box::new(self)
    }
}

impl Command for InstantCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) {
        (self.action)()
    }

    fn is_finished(&self) -> bool {
        true
    }
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a command.
    ///
    /// Outside of [`CommandScheduler::run`] the command is initialised immediately. Commands
    /// scheduled while the scheduler is running commands are initialised at the end of that
    /// cycle, so they first execute on the following cycle.
    pub fn schedule(&self, command: Box<dyn Command>) {
        if self.inner.in_run.get() {
            self.inner.deferred.borrow_mut().push(Deferred::Schedule(command));
        }
        else {
            self.start(command);
        }
    }

    /// Interrupt every running command.
    pub fn cancel_all(&self) {
        if self.inner.in_run.get() {
            self.inner.deferred.borrow_mut().push(Deferred::CancelAll);
        }
        else {
            self.interrupt_all();
        }
    }

    /// Run one cycle: execute every running command, end those which have finished, then apply
    /// any requests made during the cycle.
    pub fn run(&self) {
        if self.inner.in_run.replace(true) {
            return;
        }

        // The running list is taken out so commands may call back into the scheduler
        let commands = std::mem::take(&mut *self.inner.running.borrow_mut());
        let mut still_running = Vec::with_capacity(commands.len());

        for mut command in commands {
            command.execute();

            if command.is_finished() {
                debug!("Command \"{}\" finished", command.name());
                command.end(false);
            }
            else {
                still_running.push(command);
            }
        }

        self.inner.running.borrow_mut().extend(still_running);
        self.inner.in_run.set(false);

        let deferred = std::mem::take(&mut *self.inner.deferred.borrow_mut());
        for request in deferred {
            match request {
                Deferred::Schedule(command) => self.start(command),
                Deferred::CancelAll => self.interrupt_all(),
            }
        }
    }

    /// Whether a command with the given name is running.
    pub fn is_running(&self, name: &str) -> bool {
        self.inner.running.borrow().iter().any(|c| c.name() == name)
    }

    pub fn num_running(&self) -> usize {
        self.inner.running.borrow().len()
    }

    fn start(&self, mut command: Box<dyn Command>) {
        if let Some(requirement) = command.requirement() {
            let conflicting: Vec<Box<dyn Command>> = {
                let mut running = self.inner.running.borrow_mut();
                let (conflicting, others) = std::mem::take(&mut *running)
                    .into_iter()
                    .partition(|c| c.requirement() == Some(requirement));
                *running = others;
                conflicting
            };

            for mut c in conflicting {
                debug!("Command \"{}\" interrupted by \"{}\"", c.name(), command.name());
                c.end(true);
            }
        }

        trace!("Starting command \"{}\"", command.name());
        command.initialize();
        self.inner.running.borrow_mut().push(command);
    }

    fn interrupt_all(&self) {
        let commands = std::mem::take(&mut *self.inner.running.borrow_mut());

        for mut c in commands {
            debug!("Command \"{}\" cancelled", c.name());
            c.end(true);
        }
    }
}
