// Layer 1: Standard library imports
use std::sync::mpsc;
use std::thread::JoinHandle;

// Layer 3: Internal module imports
use super::env::Environment;
use super::params::EnvParams;
use crate::error::{Result, RuntimeError};

/// RAII wrapper around a running environment.
///
/// The environment starts on a background thread when the wrapper is
/// created; dropping the wrapper stops it and joins the thread. Meant for
/// embedding the runtime into an application that owns its own main loop.
///
/// # Example
/// ```rust,ignore
/// let wrapped = WrappedEnv::start(EnvParams::default())?;
/// wrapped.env().introduce_coop(|coop| {
///     coop.add_agent(Probe::new());
///     Ok(())
/// })?;
/// // dropped at scope end: stop + join
/// ```
pub struct WrappedEnv {
    env: Environment,
    thread: Option<JoinHandle<Result<()>>>,
}

impl WrappedEnv {
    /// Start an environment with the given params. Autoshutdown is
    /// disabled: the wrapper's lifetime governs the environment's.
    pub fn start(params: EnvParams) -> Result<Self> {
        let params = params.disable_autoshutdown();
        let (tx, rx) = mpsc::sync_channel::<Environment>(1);

        let thread = std::thread::Builder::new()
            .name("agentry-wrapped-env".to_string())
            .spawn(move || {
                Environment::launch_with_params(params, move |env| {
                    let _ = tx.send(env.clone());
                    Ok(())
                })
            })
            .map_err(|_| RuntimeError::StopInProgress)?;

        match rx.recv() {
            Ok(env) => Ok(Self {
                env,
                thread: Some(thread),
            }),
            Err(_) => {
                // The launch failed before init ran; surface its error.
                match thread.join() {
                    Ok(Err(error)) => Err(error),
                    _ => Err(RuntimeError::StopInProgress),
                }
            }
        }
    }

    /// The running environment.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Stop explicitly and wait for the environment thread.
    pub fn stop_then_join(mut self) -> Result<()> {
        self.env.stop();
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or(Ok(())),
            None => Ok(()),
        }
    }
}

impl Drop for WrappedEnv {
    fn drop(&mut self) {
        self.env.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
