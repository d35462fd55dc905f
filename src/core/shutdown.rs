//! # OS termination signals.
//!
//! [`wait_for_signal`] completes on the first termination signal and names it,
//! so the supervisor can record what triggered the drain.
//!
//! | Platform | Signals                          |
//! |----------|----------------------------------|
//! | Unix     | `SIGINT`, `SIGTERM`, `SIGQUIT`   |
//! | other    | Ctrl-C                           |

/// Waits for a termination signal and returns its name.
///
/// Fails only when the signal listeners cannot be installed.
#[cfg(unix)]
pub(crate) async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for Ctrl-C and returns its name.
#[cfg(not(unix))]
pub(crate) async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
