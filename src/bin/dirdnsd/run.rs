// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `run` and `check` commands.

use std::fmt::Write;
use std::future::Future;
use std::net::SocketAddr;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use dirdns::http::{self, AppState};
use dirdns::manager::Manager;

use crate::args::{CheckArgs, RunArgs};
use crate::config;

/// Runs the server.
pub fn run(args: RunArgs) {
    init_logging();
    exit_on_failure("run", try_running(args));
    info!("Exiting with success.");
}

/// Checks a configuration file and prints a summary of it.
pub fn check(args: CheckArgs) {
    init_logging();
    exit_on_failure("check the configuration", try_checking(args));
}

fn init_logging() {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));
}

fn exit_on_failure(what: &str, result: Result<()>) {
    if let Err(e) = result {
        let mut message = format!("Failed to {}:", what);
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
}

fn try_checking(args: CheckArgs) -> Result<()> {
    let config = config::load_from_path(&args.config).context("failed to load the configuration")?;
    config.policy()?;
    config
        .directory
        .open()
        .context("failed to set up the directory")?;
    println!("{}", config::summarize(&config));
    Ok(())
}

fn try_running(args: RunArgs) -> Result<()> {
    info!(
        "dirdns daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    info!("Loading the configuration from {}.", args.config.display());
    let config = config::load_from_path(&args.config).context("failed to load the configuration")?;
    let bind = args.bind.unwrap_or(config.bind);
    let policy = Arc::new(config.policy()?);
    let directory = config
        .directory
        .open()
        .context("failed to set up the directory")?;
    let manager = Manager::new(
        directory,
        policy,
        config.zone_defaults(),
        config.directory.base_dn(),
    );

    // Set up signal handling before any worker threads exist.
    let shutdown = set_up_signal_handling().context("failed to set up signal handling")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    block_on_serving(runtime, AppState::new(manager), |state| {
        serve(bind, state, shutdown)
    })
}

/// Drives `serving` to completion on `runtime`. The caller's handle on
/// `state` is released only after the runtime is gone, so the
/// [`Manager`] and its directory connection are dropped outside of any
/// async context. (An LDAP connection owns a runtime of its own, which
/// tokio refuses to drop from async code.)
fn block_on_serving<F, Fut>(runtime: Runtime, state: AppState, serving: F) -> Result<()>
where
    F: FnOnce(AppState) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let result = runtime.block_on(serving(state.clone()));
    drop(runtime);
    drop(state);
    result
}

async fn serve(
    bind: SocketAddr,
    state: AppState,
    shutdown: oneshot::Receiver<&'static str>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    let app = http::router(state);

    info!("Set-up is complete; listening on {}.", bind);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Ok(name) = shutdown.await {
            info!("Received {}; shutting down.", name);
        }
    })
    .await
    .context("failed to serve HTTP")?;
    info!("Shutdown complete.");
    Ok(())
}

/// Starts a thread that waits for a termination signal and then
/// reports it through the returned receiver.
fn set_up_signal_handling() -> Result<oneshot::Receiver<&'static str>> {
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    let mut signals = Signals::new(term_signals)?;
    let (sender, receiver) = oneshot::channel();
    thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                let name = if signal == SIGINT { "SIGINT" } else { "SIGTERM" };
                // The receiver is gone only if the server already stopped.
                let _ = sender.send(name);
            }
        })
        .context("failed to start the signal thread")?;
    Ok(receiver)
}
