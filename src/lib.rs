//! # campus-ledger
//!
//! Retrieves a campus card holder's transaction history from the card
//! portal, using the session cookies of an interactive login.
//!
//! ## Design Philosophy
//!
//! campus-ledger is designed to be:
//! - **Library-first** - The browser login and any UI live outside the crate
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Cancellable** - Every run can be stopped and keeps what it collected
//! - **Sensible defaults** - Works against the stock portal with zero configuration
//!
//! ## Quick Start
//!
//! ```no_run
//! use campus_ledger::{Config, CookieCapture, RetrievalRange, Retriever};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let capture = CookieCapture::new(&config.portal.target_domain);
//!     // ... the browser integration feeds `capture.record(domain, name, value)` ...
//!
//!     let retriever = Retriever::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = retriever.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let session = retriever.probe_jar(&capture.snapshot(), "12345").await?;
//!     let handle = retriever.start(&session, RetrievalRange::ALL).await?;
//!     let report = handle.join().await?;
//!     println!("{} records", report.rows.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Cookie capture and snapshots
pub mod cookies;
/// Credential resolution and credential shapes
pub mod credentials;
/// Error types
pub mod error;
/// CSV and JSON export
pub mod export;
/// Transaction page fetching
pub mod fetcher;
/// Page-count planning
pub mod planner;
/// Retrieval orchestration (decomposed into focused submodules)
pub mod retriever;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use cookies::{CookieCapture, CookieJar};
pub use credentials::{CredentialShape, Credentials};
pub use error::{Error, FetchError, Result};
pub use export::{ExportFormat, default_file_name, export_records};
pub use fetcher::{FetchRequest, HttpPageSource, PageSource};
pub use retriever::{ProbedSession, RetrievalHandle, Retriever};
pub use types::{
    Event, PageFailure, PageResult, Record, RetrievalRange, RetrievalReport, RunId, RunStatus,
};

/// Stop the retriever's active run when a termination signal arrives.
///
/// Waits for a signal, then calls [`Retriever::stop`]. Returns whether a run
/// was active. The run still ends with its usual `Finished` event and keeps
/// the rows collected so far.
///
/// - **Unix:** SIGTERM or SIGINT, whichever listener could be installed.
/// - **Elsewhere:** Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use campus_ledger::{Config, RetrievalRange, Retriever, stop_on_signal};
///
/// # async fn example(session: campus_ledger::ProbedSession) -> campus_ledger::Result<()> {
/// let retriever = Retriever::new(Config::default())?;
/// let handle = retriever.start(&session, RetrievalRange::ALL).await?;
///
/// tokio::spawn(stop_on_signal(retriever.clone()));
/// handle.join().await?;
/// # Ok(())
/// # }
/// ```
pub async fn stop_on_signal(retriever: Retriever) -> bool {
    let signal = wait_for_signal().await;
    tracing::info!(signal, "termination requested, stopping retrieval");
    retriever.stop().await
}

/// Resolves with the name of the first termination signal received
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut terminate), Ok(mut interrupt)) => tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        },
        (Ok(mut terminate), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT listener unavailable, stopping on SIGTERM only");
            terminate.recv().await;
            "SIGTERM"
        }
        (Err(e), Ok(mut interrupt)) => {
            tracing::warn!(error = %e, "SIGTERM listener unavailable, stopping on SIGINT only");
            interrupt.recv().await;
            "SIGINT"
        }
        (Err(e), Err(_)) => {
            tracing::warn!(error = %e, "no unix signal listener installed, stopping on ctrl_c");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

/// Waits for Ctrl+C; never resolves when no listener can be installed,
/// so the run is left alone rather than stopped spuriously
async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl_c listener unavailable, run will not stop on signals");
        std::future::pending::<()>().await;
    }
    "ctrl_c"
}
