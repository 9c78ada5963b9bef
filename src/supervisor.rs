//! Process supervision.
//!
//! A [`Supervisor`] owns one supervised execution context (a decoder
//! subprocess or the inference worker) and drives it through
//! `Idle → Running → (Exited | Stopping) → Restarting → Running`.
//!
//! Restarting always goes through the same staircase: request graceful
//! termination, wait up to the grace period, then force-kill.

use anyhow::{Context, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Default time a process gets to exit after a graceful termination request.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Exited(Option<i32>),
}

/// An execution context that can be supervised.
pub trait Supervised: Send {
    /// OS process id, when there is one.
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Non-blocking liveness check.
    fn poll(&mut self) -> Result<Liveness>;

    /// Ask the context to exit on its own.
    fn terminate(&mut self) -> Result<()>;

    /// Force the context down. After this returns the context is gone.
    fn kill(&mut self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Exited(Option<i32>),
    Stopping,
    Restarting,
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Idle => f.write_str("idle"),
            SupervisorState::Running => f.write_str("running"),
            SupervisorState::Exited(Some(code)) => write!(f, "exited({code})"),
            SupervisorState::Exited(None) => f.write_str("exited"),
            SupervisorState::Stopping => f.write_str("stopping"),
            SupervisorState::Restarting => f.write_str("restarting"),
            SupervisorState::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SupervisorConfig {
    pub grace_period: Duration,
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SupervisorConfig {
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

type SpawnFn<P> = Box<dyn FnMut() -> Result<P> + Send>;

pub struct Supervisor<P: Supervised> {
    name: String,
    config: SupervisorConfig,
    spawn: SpawnFn<P>,
    process: Option<P>,
    state: SupervisorState,
    restarts: u32,
}

impl<P: Supervised> Supervisor<P> {
    pub fn new<F>(name: impl Into<String>, config: SupervisorConfig, spawn: F) -> Self
    where
        F: FnMut() -> Result<P> + Send + 'static,
    {
        Self {
            name: name.into(),
            config,
            spawn: Box::new(spawn),
            process: None,
            state: SupervisorState::Idle,
            restarts: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Number of times a previous context was replaced by a new one.
    pub fn restart_count(&self) -> u32 {
        self.restarts
    }

    pub fn process(&self) -> Option<&P> {
        self.process.as_ref()
    }

    pub fn process_mut(&mut self) -> Option<&mut P> {
        self.process.as_mut()
    }

    /// Start the context, replacing (and shutting down) any existing one.
    pub fn start_or_restart(&mut self) -> Result<()> {
        if let Some(mut previous) = self.process.take() {
            if previous.poll()? == Liveness::Alive {
                log::info!("[{}] terminating the existing process", self.name);
                self.state = SupervisorState::Stopping;
                self.shutdown(&mut previous)?;
            }
            self.state = SupervisorState::Restarting;
            self.restarts += 1;
        }

        log::info!("[{}] starting process", self.name);
        let process = match (self.spawn)() {
            Ok(process) => process,
            Err(e) => {
                self.state = SupervisorState::Exited(None);
                return Err(e).with_context(|| format!("[{}] failed to start", self.name));
            }
        };
        if let Some(pid) = process.pid() {
            log::debug!("[{}] started with pid {}", self.name, pid);
        }
        self.process = Some(process);
        self.state = SupervisorState::Running;
        Ok(())
    }

    /// Poll liveness, recording an unexpected exit.
    pub fn check(&mut self) -> Result<SupervisorState> {
        if self.state != SupervisorState::Running {
            return Ok(self.state);
        }
        let Some(process) = self.process.as_mut() else {
            return Ok(self.state);
        };
        if let Liveness::Exited(code) = process.poll()? {
            log::warn!("[{}] process exited unexpectedly with {:?}", self.name, code);
            self.state = SupervisorState::Exited(code);
        }
        Ok(self.state)
    }

    pub fn is_running(&mut self) -> Result<bool> {
        Ok(self.check()? == SupervisorState::Running)
    }

    /// Restart only if an exit was observed. Returns whether a restart happened.
    pub fn restart_if_exited(&mut self) -> Result<bool> {
        match self.check()? {
            SupervisorState::Exited(_) => {
                self.start_or_restart()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Shut the context down without respawning.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            if process.poll()? == Liveness::Alive {
                self.state = SupervisorState::Stopping;
                self.shutdown(&mut process)?;
            }
        }
        self.state = SupervisorState::Stopped;
        Ok(())
    }

    fn shutdown(&self, process: &mut P) -> Result<()> {
        process.terminate()?;
        log::info!("[{}] waiting for process to exit gracefully", self.name);
        let deadline = Instant::now() + self.config.grace_period;
        loop {
            if let Liveness::Exited(code) = process.poll()? {
                log::info!("[{}] process exited with {:?}", self.name, code);
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.config.poll_interval.min(deadline - now));
        }
        log::warn!("[{}] process did not exit, force killing", self.name);
        process.kill()
    }
}

impl<P: Supervised> Drop for Supervisor<P> {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.kill() {
                log::warn!("[{}] failed to kill process on drop: {}", self.name, e);
            }
        }
    }
}
