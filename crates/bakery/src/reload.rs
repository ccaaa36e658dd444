//! Live shader replacement for a long-running render loop.
//!
//! The controller belongs to the render-loop thread. File watchers post
//! [`WatchEvent`]s into its inbox; [`HotReloadController::poll`] is called once
//! per frame, starts a compile when a signal is waiting and installs the new
//! program once it is ready. Compilation either runs inline or on a worker
//! thread, but the swap itself always happens inside `poll`, so draws never
//! see a half-built program. A failed compile leaves the previous program in
//! place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use shadersource::SourceProvider;
use tracing::{debug, info, warn};

use crate::error::BakeError;
use crate::gpu::{GpuDevice, Program, ProgramCompiler, ShaderProgram, UniformValue};
use crate::types::{LoadedProgram, ProgramSource};
use crate::watch::WatchEvent;

/// Where recompilation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileStrategy {
    /// On the calling thread, inside `poll`.
    Immediate,
    /// On a worker thread; `poll` picks the result up when it is ready.
    #[default]
    Threaded,
}

/// Generation of the installed program. Bumped on every successful swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(pub u64);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// Waiting for a change; the last attempt (if any) failed.
    Idle,
    /// A replacement program is being built.
    Compiling,
    /// Serving the most recently compiled program.
    Active,
}

/// Result of one [`HotReloadController::poll`].
#[derive(Debug)]
pub enum ReloadOutcome {
    Unchanged,
    Compiling,
    Reloaded(ProgramId),
    /// The replacement failed; the previous program is still installed.
    Failed(BakeError),
}

enum PendingCompile<P> {
    Ready(Option<Result<P, BakeError>>),
    Threaded {
        receiver: Receiver<Result<P, BakeError>>,
    },
}

impl<P> PendingCompile<P> {
    fn poll(&mut self) -> Option<Result<P, BakeError>> {
        match self {
            PendingCompile::Ready(result) => result.take(),
            PendingCompile::Threaded { receiver } => match receiver.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(BakeError::WorkerLost)),
            },
        }
    }
}

/// Builds a program from its source description.
pub fn build_program<C>(
    compiler: &C,
    provider: &dyn SourceProvider,
    source: &ProgramSource,
) -> Result<C::Program, BakeError>
where
    C: ProgramCompiler,
{
    match source.load(provider)? {
        LoadedProgram::Render(render) => Ok(compiler.compile_render(&render)?),
        LoadedProgram::Compute(compute) => Ok(compiler.compile_compute(&compute)?),
    }
}

/// Owns the active program of a render loop and swaps it on change.
pub struct HotReloadController<D: GpuDevice> {
    compiler: D::Compiler,
    provider: Arc<dyn SourceProvider>,
    source: ProgramSource,
    strategy: CompileStrategy,
    program: Program<D>,
    generation: ProgramId,
    last_failed: bool,
    pending: Option<PendingCompile<Program<D>>>,
    requested: bool,
    inbox: Option<Receiver<WatchEvent>>,
    uniforms: BTreeMap<String, UniformValue>,
}

impl<D: GpuDevice> HotReloadController<D> {
    /// Compiles the initial program synchronously. Failure here is fatal:
    /// there is no previous program to fall back on.
    pub fn new(
        device: &D,
        provider: Arc<dyn SourceProvider>,
        source: ProgramSource,
        strategy: CompileStrategy,
    ) -> Result<Self, BakeError> {
        let compiler = device.compiler();
        let program = build_program(&compiler, provider.as_ref(), &source)?;
        info!(program = %program.label(), "initial program compiled");

        Ok(Self {
            compiler,
            provider,
            source,
            strategy,
            program,
            generation: ProgramId(0),
            last_failed: false,
            pending: None,
            requested: false,
            inbox: None,
            uniforms: BTreeMap::new(),
        })
    }

    /// Connects the inbox a [`crate::ShaderWatcher`] posts into.
    pub fn with_inbox(mut self, inbox: Receiver<WatchEvent>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn program(&self) -> &Program<D> {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut Program<D> {
        &mut self.program
    }

    pub fn generation(&self) -> ProgramId {
        self.generation
    }

    pub fn state(&self) -> ReloadState {
        if self.pending.is_some() {
            ReloadState::Compiling
        } else if self.last_failed {
            ReloadState::Idle
        } else {
            ReloadState::Active
        }
    }

    /// Requests a recompile as if a watch event had arrived.
    pub fn request_reload(&mut self) {
        self.requested = true;
    }

    /// Sets a uniform on the current program and remembers it for every
    /// program installed later.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        self.uniforms.insert(name.to_owned(), value);
        self.program.set_uniform(name, value)
    }

    /// Advances the state machine. Call once per frame from the thread that
    /// owns the device.
    pub fn poll(&mut self) -> ReloadOutcome {
        self.drain_inbox();

        if self.pending.is_none() {
            if !self.requested {
                return ReloadOutcome::Unchanged;
            }
            self.requested = false;
            self.pending = Some(self.start_compile());
        }

        let Some(pending) = self.pending.as_mut() else {
            return ReloadOutcome::Unchanged;
        };
        match pending.poll() {
            None => ReloadOutcome::Compiling,
            Some(result) => {
                self.pending = None;
                self.finish(result)
            }
        }
    }

    fn drain_inbox(&mut self) {
        let Some(inbox) = &self.inbox else {
            return;
        };
        loop {
            match inbox.try_recv() {
                Ok(WatchEvent) => self.requested = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("watch inbox closed");
                    self.inbox = None;
                    break;
                }
            }
        }
    }

    fn start_compile(&self) -> PendingCompile<Program<D>> {
        debug!(strategy = ?self.strategy, "recompiling program");
        match self.strategy {
            CompileStrategy::Immediate => PendingCompile::Ready(Some(build_program(
                &self.compiler,
                self.provider.as_ref(),
                &self.source,
            ))),
            CompileStrategy::Threaded => {
                let compiler = self.compiler.clone();
                let provider = Arc::clone(&self.provider);
                let source = self.source.clone();
                let (sender, receiver) = bounded(1);
                let spawned = thread::Builder::new()
                    .name("shader-compile".into())
                    .spawn(move || {
                        let _ = sender.send(build_program(&compiler, provider.as_ref(), &source));
                    });
                match spawned {
                    Ok(_) => PendingCompile::Threaded { receiver },
                    Err(err) => {
                        warn!(%err, "failed to spawn compile worker; compiling inline");
                        PendingCompile::Ready(Some(build_program(
                            &self.compiler,
                            self.provider.as_ref(),
                            &self.source,
                        )))
                    }
                }
            }
        }
    }

    fn finish(&mut self, result: Result<Program<D>, BakeError>) -> ReloadOutcome {
        match result {
            Ok(mut program) => {
                for (name, value) in &self.uniforms {
                    program.set_uniform(name, *value);
                }
                let previous = std::mem::replace(&mut self.program, program);
                drop(previous);
                self.generation = ProgramId(self.generation.0 + 1);
                self.last_failed = false;
                info!(program = %self.program.label(), generation = %self.generation, "program reloaded");
                ReloadOutcome::Reloaded(self.generation)
            }
            Err(err) => {
                self.last_failed = true;
                warn!(%err, generation = %self.generation, "reload failed; keeping previous program");
                ReloadOutcome::Failed(err)
            }
        }
    }
}
