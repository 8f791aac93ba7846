use std::cmp::Ordering;

use embergen_cpp::Ident;

use crate::codegen::Codegen;
use crate::errors::CodegenResult;

/// What a suspended coroutine is waiting for.
#[derive(Clone, Debug)]
pub enum WaitOn {
    /// An ID that has not been registered yet.
    Variable(Ident),
    /// Nothing in particular; run again once higher priority work is done.
    Yield,
}

/// The outcome of driving a coroutine one step.
pub enum Resume<T> {
    Ready(T),
    Pending(WaitOn),
}

/// A resumable unit of code generation.
///
/// Builders are written as explicit state machines: each call to `resume`
/// either finishes with an output or reports what it is blocked on. The
/// scheduler in [`Codegen`] keeps resuming queued coroutines until all of
/// them finish; nested coroutines are driven by their parent, with `Pending`
/// results propagated outwards.
pub trait Coroutine {
    type Output;

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<Self::Output>>;

    /// Shows up in diagnostics when generation cannot make progress.
    fn describe(&self) -> String {
        "task".to_owned()
    }
}

/// A top-level schedulable coroutine.
pub type Job = Box<dyn Coroutine<Output = ()>>;

/// Adapts a plain closure to a coroutine that completes in one step.
pub struct JobFn<F> {
    label: String,
    f: Option<F>,
}

impl<F> JobFn<F>
where
    F: FnOnce(&Codegen) -> CodegenResult<()>,
{
    pub fn new(label: impl Into<String>, f: F) -> Self {
        JobFn {
            label: label.into(),
            f: Some(f),
        }
    }
}

impl<F> Coroutine for JobFn<F>
where
    F: FnOnce(&Codegen) -> CodegenResult<()>,
{
    type Output = ();

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<()>> {
        if let Some(f) = self.f.take() {
            f(core)?;
        }
        Ok(Resume::Ready(()))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

pub fn job<F>(label: impl Into<String>, f: F) -> Job
where
    F: FnOnce(&Codegen) -> CodegenResult<()> + 'static,
{
    Box::new(JobFn::new(label, f))
}

/// Chains a closure after a coroutine: drives `inner` to completion, then
/// runs `finish` once with its output.
pub struct Then<C, F> {
    label: String,
    inner: C,
    finish: Option<F>,
}

impl<C, F> Coroutine for Then<C, F>
where
    C: Coroutine,
    F: FnOnce(&Codegen, C::Output) -> CodegenResult<()>,
{
    type Output = ();

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<()>> {
        match self.inner.resume(core)? {
            Resume::Pending(wait) => Ok(Resume::Pending(wait)),
            Resume::Ready(value) => {
                if let Some(finish) = self.finish.take() {
                    finish(core, value)?;
                }
                Ok(Resume::Ready(()))
            }
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

pub fn then<C, F>(label: impl Into<String>, inner: C, finish: F) -> Job
where
    C: Coroutine + 'static,
    F: FnOnce(&Codegen, C::Output) -> CodegenResult<()> + 'static,
{
    Box::new(Then {
        label: label.into(),
        inner,
        finish: Some(finish),
    })
}

/// A coroutine registered with the accumulator's live-instance table.
/// Completion clears the entry; an instance still in the table when the
/// scheduler drains was never awaited.
pub struct Tracked<C> {
    token: u64,
    inner: C,
}

impl<C> Tracked<C> {
    pub(crate) fn new(token: u64, inner: C) -> Self {
        Tracked { token, inner }
    }
}

impl<C: Coroutine> Coroutine for Tracked<C> {
    type Output = C::Output;

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<Self::Output>> {
        let resumed = self.inner.resume(core)?;
        if matches!(resumed, Resume::Ready(_)) {
            core.untrack(self.token);
        }
        Ok(resumed)
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

/// A job on the scheduler queue together with its scheduling state.
pub(crate) struct QueuedTask {
    pub priority: f64,
    pub number: usize,
    pub token: u64,
    pub job: Job,
    pub blocked_on: Option<Ident>,
    pub seen_generation: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    // Highest priority pops first; insertion order breaks ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then(self.number.cmp(&other.number))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
