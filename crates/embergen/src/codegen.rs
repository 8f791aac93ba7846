/*!
The program accumulator and its cooperative scheduler.

Every builder coroutine writes into one [`Codegen`] instance: statements for
the generated `setup()` body, global declarations, includes, libraries,
build flags, defines, and the table of registered variables. The same
instance owns the task queue. Tasks run in priority order, and a task's
priority decays by one every time it suspends, so a high priority task that
keeps waiting on an unregistered ID cannot starve the task that would
register it.

Progress detection works on variable generations: registering a variable
bumps a counter, and a task suspended on an ID remembers the counter value
it last saw. When every queued task is waiting on an ID and none of them
has anything new to look at, the queue is stalled and generation fails with
the offending IDs. A step bound catches pathological yield loops.
*/

use std::cell::RefCell;
use std::fmt;

use anyhow::bail;
use embergen_cpp::{Expression, Ident, MockObj, Statement};
use embergen_util::fifo_heap::FifoHeap;
use fxhash::FxHashMap;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use tracing::{debug, trace};

use crate::coroutine::{Coroutine, Job, QueuedTask, Resume, Tracked, WaitOn};
use crate::errors::{CodegenError, CodegenResult};

const MAX_TASK_STEPS: usize = 1_000_000;

/// A build-time library dependency of the generated firmware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub version: Option<String>,
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Default)]
struct State {
    main_statements: Vec<Statement>,
    global_statements: Vec<Statement>,
    includes: IndexSet<String>,
    libraries: IndexMap<String, Option<String>>,
    build_flags: IndexSet<String>,
    defines: IndexMap<String, Option<Expression>>,
    variables: FxHashMap<String, (Ident, MockObj)>,
    pending_components: IndexSet<String>,
    loaded_integrations: IndexSet<String>,
    queue: FifoHeap<QueuedTask>,
    task_counter: usize,
    next_token: u64,
    active: FxHashMap<u64, String>,
    generation: u64,
}

/// The single mutable store of one generation pass.
///
/// All methods take `&self`; interior state lives behind a [`RefCell`] and
/// every method finishes its borrow before returning, so coroutines holding
/// `&Codegen` can call back in freely while the scheduler runs them.
#[derive(Default)]
pub struct Codegen {
    state: RefCell<State>,
}

impl Codegen {
    pub fn new() -> Self {
        Codegen::default()
    }

    /// Appends a statement to the generated `setup()` body.
    pub fn add(&self, statement: impl Into<Statement>) {
        self.state
            .borrow_mut()
            .main_statements
            .push(statement.into());
    }

    /// Appends a statement to the global region above `setup()`.
    pub fn add_global(&self, statement: impl Into<Statement>) {
        self.state
            .borrow_mut()
            .global_statements
            .push(statement.into());
    }

    /// Adds an include for the generated source. Paths in angle brackets are
    /// emitted verbatim, anything else is quoted.
    pub fn add_include(&self, path: impl Into<String>) {
        self.state.borrow_mut().includes.insert(path.into());
    }

    /// Requests a library. A versionless request never conflicts; a pinned
    /// request upgrades a versionless one; two different pins are an error.
    pub fn add_library(&self, name: &str, version: Option<&str>) -> CodegenResult<()> {
        let mut state = self.state.borrow_mut();
        match state.libraries.get_mut(name) {
            None => {
                state
                    .libraries
                    .insert(name.to_owned(), version.map(str::to_owned));
            }
            Some(existing) => match (existing.as_deref(), version) {
                (_, None) => {}
                (None, Some(version)) => *existing = Some(version.to_owned()),
                (Some(pinned), Some(version)) if pinned == version => {}
                (Some(pinned), Some(version)) => {
                    return Err(CodegenError::LibraryVersionConflict {
                        name: name.to_owned(),
                        existing: pinned.to_owned(),
                        requested: version.to_owned(),
                    }
                    .into());
                }
            },
        }
        Ok(())
    }

    pub fn add_build_flag(&self, flag: impl Into<String>) {
        self.state.borrow_mut().build_flags.insert(flag.into());
    }

    /// Adds a `#define`. Re-adding a name overwrites its value.
    pub fn add_define(&self, name: impl Into<String>, value: Option<Expression>) {
        self.state.borrow_mut().defines.insert(name.into(), value);
    }

    /// Binds a resolved ID to the expression that accesses its variable.
    /// Wakes tasks suspended on the ID.
    pub fn register_variable(&self, id: &Ident, obj: MockObj) -> CodegenResult<()> {
        let Some(name) = id.name() else {
            bail!("cannot register a variable before its ID is resolved");
        };
        let mut state = self.state.borrow_mut();
        if state.variables.contains_key(&name) {
            return Err(CodegenError::DuplicateId { id: name }.into());
        }
        trace!("registered variable '{name}'");
        state.variables.insert(name, (id.clone(), obj));
        state.generation += 1;
        Ok(())
    }

    pub fn get_variable(&self, name: &str) -> Option<(Ident, MockObj)> {
        self.state.borrow().variables.get(name).cloned()
    }

    pub fn has_id(&self, name: &str) -> bool {
        self.state.borrow().variables.contains_key(name)
    }

    /// Marks an ID as belonging to a component that must eventually pass
    /// through `register_component`.
    pub fn track_component(&self, name: impl Into<String>) {
        self.state
            .borrow_mut()
            .pending_components
            .insert(name.into());
    }

    /// Clears a component from the pending set. False when it was never
    /// tracked (or already registered).
    pub fn mark_component_registered(&self, name: &str) -> bool {
        self.state
            .borrow_mut()
            .pending_components
            .shift_remove(name)
    }

    pub fn load_integration(&self, name: impl Into<String>) {
        self.state
            .borrow_mut()
            .loaded_integrations
            .insert(name.into());
    }

    pub fn loaded_integrations(&self) -> Vec<String> {
        self.state
            .borrow()
            .loaded_integrations
            .iter()
            .cloned()
            .collect()
    }

    /// Registers a coroutine instance in the live table. The wrapper clears
    /// the entry when the coroutine completes; see [`Codegen::finish`].
    pub fn track<C: Coroutine>(&self, coroutine: C) -> Tracked<C> {
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        let token = state.next_token;
        state.active.insert(token, coroutine.describe());
        Tracked::new(token, coroutine)
    }

    pub(crate) fn untrack(&self, token: u64) {
        self.state.borrow_mut().active.remove(&token);
    }

    /// Queues a job. Nothing runs until [`Codegen::flush_tasks`].
    pub fn add_job(&self, priority: f64, job: Job) {
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        let token = state.next_token;
        state.active.insert(token, job.describe());
        let number = state.task_counter;
        state.task_counter += 1;
        trace!("queued task '{}' at priority {priority}", job.describe());
        state.queue.push(QueuedTask {
            priority,
            number,
            token,
            job,
            blocked_on: None,
            seen_generation: 0,
        });
    }

    /// Runs queued tasks to completion.
    pub fn flush_tasks(&self) -> CodegenResult<()> {
        debug!(
            "flushing {} queued task(s)",
            self.state.borrow().queue.len()
        );
        let mut steps = 0usize;
        loop {
            let mut task = {
                let mut state = self.state.borrow_mut();
                if state.queue.is_empty() {
                    return Ok(());
                }
                let generation = state.generation;
                let stalled = state
                    .queue
                    .iter()
                    .all(|t| t.blocked_on.is_some() && t.seen_generation == generation);
                if stalled {
                    let tasks = state.queue.iter().map(|t| t.job.describe()).collect();
                    let unresolved = state
                        .queue
                        .iter()
                        .filter_map(|t| t.blocked_on.as_ref())
                        .map(|id| id.name().unwrap_or_else(|| "(anonymous)".to_owned()))
                        .unique()
                        .collect();
                    return Err(CodegenError::CircularDependency { tasks, unresolved }.into());
                }
                match state.queue.pop() {
                    Some(task) => task,
                    None => return Ok(()),
                }
            };

            steps += 1;
            if steps > MAX_TASK_STEPS {
                return Err(CodegenError::SchedulerStuck {
                    steps: MAX_TASK_STEPS,
                }
                .into());
            }

            // The queue borrow is released here; the task is free to call
            // back into the accumulator.
            match task.job.resume(self)? {
                Resume::Ready(()) => {
                    trace!("task '{}' finished", task.job.describe());
                    self.untrack(task.token);
                }
                Resume::Pending(wait) => {
                    trace!("task '{}' suspended on {:?}", task.job.describe(), wait);
                    let mut state = self.state.borrow_mut();
                    match wait {
                        WaitOn::Variable(id) => {
                            task.seen_generation = state.generation;
                            task.blocked_on = Some(id);
                        }
                        WaitOn::Yield => {
                            task.blocked_on = None;
                        }
                    }
                    task.priority -= 1.0;
                    state.queue.push(task);
                }
            }
        }
    }

    /// Post-drain checks: every tracked component registered, no coroutine
    /// instance left unawaited. A failure names both leftover sets in one
    /// error.
    pub fn finish(&self) -> CodegenResult<()> {
        let state = self.state.borrow();
        let mut components: Vec<String> = state.pending_components.iter().cloned().collect();
        components.sort();
        let mut coroutines: Vec<String> = state.active.values().cloned().collect();
        coroutines.sort();
        if components.is_empty() && coroutines.is_empty() {
            return Ok(());
        }
        Err(CodegenError::GenerationUnfinished {
            components,
            coroutines,
        }
        .into())
    }

    /// Drops everything so the next generation pass starts clean.
    pub fn reset(&self) {
        *self.state.borrow_mut() = State::default();
    }

    pub fn main_statements(&self) -> Vec<Statement> {
        self.state.borrow().main_statements.clone()
    }

    pub fn global_statements(&self) -> Vec<Statement> {
        self.state.borrow().global_statements.clone()
    }

    pub fn includes(&self) -> Vec<String> {
        self.state.borrow().includes.iter().cloned().collect()
    }

    pub fn libraries(&self) -> Vec<Library> {
        self.state
            .borrow()
            .libraries
            .iter()
            .map(|(name, version)| Library {
                name: name.clone(),
                version: version.clone(),
            })
            .collect()
    }

    pub fn build_flags(&self) -> Vec<String> {
        self.state.borrow().build_flags.iter().cloned().collect()
    }

    pub fn defines(&self) -> Vec<(String, Option<Expression>)> {
        self.state
            .borrow()
            .defines
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coroutine::job;
    use embergen_cpp::MemberOp;
    use pretty_assertions::assert_eq;

    fn fake_class() -> embergen_cpp::MockObjClass {
        MockObj::global_namespace().class_("FakeComponent", &[])
    }

    fn raw_statements(core: &Codegen) -> Vec<String> {
        core.main_statements()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Emits `text` once `id` has a registered variable.
    struct EmitWhenBound {
        id: Ident,
        text: &'static str,
    }

    impl Coroutine for EmitWhenBound {
        type Output = ();

        fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<()>> {
            let name = self.id.name().unwrap();
            match core.get_variable(&name) {
                Some(_) => {
                    core.add(Expression::raw(self.text));
                    Ok(Resume::Ready(()))
                }
                None => Ok(Resume::Pending(WaitOn::Variable(self.id.clone()))),
            }
        }

        fn describe(&self) -> String {
            format!("emit {}", self.text)
        }
    }

    /// Yields `left` times, then emits `text`.
    struct YieldThenEmit {
        left: usize,
        text: &'static str,
    }

    impl Coroutine for YieldThenEmit {
        type Output = ();

        fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<()>> {
            if self.left > 0 {
                self.left -= 1;
                return Ok(Resume::Pending(WaitOn::Yield));
            }
            core.add(Expression::raw(self.text));
            Ok(Resume::Ready(()))
        }
    }

    #[test_log::test]
    fn tasks_wake_when_their_variable_appears() {
        let core = Codegen::new();
        let id = Ident::declared("pump", fake_class());

        core.add_job(
            100.0,
            Box::new(EmitWhenBound {
                id: id.clone(),
                text: "use(pump_)",
            }),
        );
        let register_id = id.clone();
        core.add_job(
            0.0,
            job("declare pump", move |core| {
                core.add(Expression::raw("declare(pump_)"));
                core.register_variable(
                    &register_id,
                    MockObj::new(Expression::raw("pump_"), MemberOp::Arrow),
                )
            }),
        );

        core.flush_tasks().unwrap();
        assert_eq!(raw_statements(&core), vec!["declare(pump_);", "use(pump_);"]);
    }

    #[test_log::test]
    fn stalled_queue_reports_the_cycle() {
        let core = Codegen::new();
        core.add_job(
            0.0,
            Box::new(EmitWhenBound {
                id: Ident::declared("ghost", fake_class()),
                text: "never",
            }),
        );

        let err = core.flush_tasks().unwrap_err().to_string();
        assert!(err.contains("circular dependency"), "{err}");
        assert!(err.contains("emit never"), "{err}");
        assert!(err.contains("ghost"), "{err}");
    }

    #[test_log::test]
    fn stalls_list_every_blocked_task_and_id() {
        let core = Codegen::new();
        for (name, text) in [("x", "a"), ("y", "b")] {
            core.add_job(
                0.0,
                Box::new(EmitWhenBound {
                    id: Ident::declared(name, fake_class()),
                    text,
                }),
            );
        }

        let err = core.flush_tasks().unwrap_err().to_string();
        assert!(err.contains("task(s) [emit a, emit b]"), "{err}");
        assert!(err.contains("ID(s) [x, y]"), "{err}");
    }

    #[test_log::test]
    fn priority_decay_lets_lower_priority_tasks_through() {
        let core = Codegen::new();
        core.add_job(10.0, Box::new(YieldThenEmit { left: 20, text: "slow" }));
        core.add_job(
            0.0,
            job("fast", |core| {
                core.add(Expression::raw("fast"));
                Ok(())
            }),
        );

        core.flush_tasks().unwrap();
        assert_eq!(raw_statements(&core), vec!["fast;", "slow;"]);
    }

    #[test_log::test]
    fn equal_priorities_run_in_submission_order() {
        let core = Codegen::new();
        for text in ["one", "two", "three"] {
            core.add_job(
                50.0,
                job(text, move |core| {
                    core.add(Expression::raw(text));
                    Ok(())
                }),
            );
        }

        core.flush_tasks().unwrap();
        assert_eq!(raw_statements(&core), vec!["one;", "two;", "three;"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let core = Codegen::new();
        let id = Ident::declared("twice", fake_class());
        let obj = MockObj::new(Expression::raw("twice_"), MemberOp::Arrow);
        core.register_variable(&id, obj.clone()).unwrap();
        let err = core.register_variable(&id, obj).unwrap_err().to_string();
        assert!(err.contains("ID twice redefined"), "{err}");
    }

    #[test]
    fn library_versions_merge_or_conflict() {
        let core = Codegen::new();
        core.add_library("PubSubClient", None).unwrap();
        core.add_library("PubSubClient", Some("2.8")).unwrap();
        core.add_library("PubSubClient", Some("2.8")).unwrap();
        core.add_library("PubSubClient", None).unwrap();
        assert_eq!(
            core.libraries(),
            vec![Library {
                name: "PubSubClient".to_owned(),
                version: Some("2.8".to_owned()),
            }]
        );

        let err = core
            .add_library("PubSubClient", Some("3.0"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("conflicting versions"), "{err}");
    }

    #[test]
    fn unregistered_components_fail_the_pass() {
        let core = Codegen::new();
        core.track_component("my_sensor");
        core.track_component("other_sensor");
        assert!(core.mark_component_registered("my_sensor"));

        let err = core.finish().unwrap_err().to_string();
        assert!(err.contains("other_sensor"), "{err}");
        assert!(!err.contains("my_sensor"), "{err}");
    }

    #[test]
    fn unawaited_coroutines_fail_the_pass() {
        let core = Codegen::new();
        let _leaked = core.track(EmitWhenBound {
            id: Ident::declared("x", fake_class()),
            text: "x",
        });

        let err = core.finish().unwrap_err().to_string();
        assert!(err.contains("did you forget to await"), "{err}");
        assert!(err.contains("emit x"), "{err}");
    }

    #[test]
    fn leftover_components_and_coroutines_report_together() {
        let core = Codegen::new();
        core.track_component("stray_sensor");
        let _leaked = core.track(EmitWhenBound {
            id: Ident::declared("x", fake_class()),
            text: "x",
        });

        let err = core.finish().unwrap_err().to_string();
        assert!(err.contains("stray_sensor"), "{err}");
        assert!(err.contains("never registered"), "{err}");
        assert!(err.contains("emit x"), "{err}");
        assert!(err.contains("did you forget to await"), "{err}");
    }

    #[test]
    fn tracked_coroutines_clear_on_completion() {
        let core = Codegen::new();
        let id = Ident::declared("y", fake_class());
        core.register_variable(&id, MockObj::new(Expression::raw("y_"), MemberOp::Arrow))
            .unwrap();

        let mut tracked = core.track(EmitWhenBound { id, text: "use(y_)" });
        let Resume::Ready(()) = tracked.resume(&core).unwrap() else {
            panic!("variable is bound, coroutine must complete");
        };
        core.finish().unwrap();
    }

    #[test]
    fn defines_overwrite_and_includes_dedup() {
        let core = Codegen::new();
        core.add_define("EMBER_BOARD", Some(Expression::StringLiteral("old".to_owned())));
        core.add_define(
            "EMBER_BOARD",
            Some(Expression::StringLiteral("esp32dev".to_owned())),
        );
        core.add_define("USE_STATUS_LED", None);
        core.add_include("ember/gpio.h");
        core.add_include("ember/gpio.h");
        core.add_include("<vector>");

        assert_eq!(core.includes(), vec!["ember/gpio.h", "<vector>"]);
        let defines = core.defines();
        assert_eq!(defines.len(), 2);
        assert_eq!(defines[0].0, "EMBER_BOARD");
        assert_eq!(defines[0].1.as_ref().map(ToString::to_string).as_deref(), Some("\"esp32dev\""));
    }

    #[test]
    fn reset_clears_everything() {
        let core = Codegen::new();
        core.add(Expression::raw("stmt"));
        core.track_component("c");
        core.add_job(0.0, job("noop", |_| Ok(())));
        core.reset();

        assert!(core.main_statements().is_empty());
        core.finish().unwrap();
        core.flush_tasks().unwrap();
        assert!(raw_statements(&core).is_empty());
    }
}
