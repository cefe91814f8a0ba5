//! Export a card holder's transaction history
//!
//! This example demonstrates the full retrieval flow of campus-ledger:
//! - Loading cookies captured by a browser login (a JSON object of name -> value)
//! - Probing the portal for the accepted credential shape
//! - Running a retrieval while printing progress events
//! - Stopping early on Ctrl+C and keeping the rows fetched so far
//! - Exporting the rows to CSV or JSON
//!
//! Usage: `cargo run --example export_history -- cookies.json <account> [output.csv|output.json]`

use campus_ledger::{
    Config, CookieJar, Event, ExportFormat, RetrievalRange, Retriever, default_file_name,
    export_records, stop_on_signal,
};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(cookie_file), Some(account)) = (args.next(), args.next()) else {
        eprintln!("usage: export_history <cookies.json> <account> [output.csv|output.json]");
        std::process::exit(2);
    };
    let output = args.next().map(PathBuf::from);

    let jar: CookieJar = serde_json::from_str(&std::fs::read_to_string(&cookie_file)?)?;
    println!("Loaded {} cookies: {}", jar.len(), jar.names().join(", "));

    let retriever = Retriever::new(Config::default())?;

    // Subscribe to events
    let mut events = retriever.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Probed {
                    shape,
                    total_count,
                    total_pages,
                    ..
                } => {
                    println!("✓ Logged in via {shape}: {total_count} records on {total_pages} pages");
                }
                Event::RunStarted {
                    run,
                    start_page,
                    end_page,
                } => {
                    println!("⬇ Run #{run}: pages {start_page}..={end_page}");
                }
                Event::Progress {
                    current_page,
                    total_pages,
                    ..
                } => {
                    println!("  page {current_page}/{total_pages}");
                }
                Event::Rows { .. } => {}
                Event::Finished { message, .. } => {
                    println!("✓ {message}");
                }
            }
        }
    });

    let session = retriever.probe_jar(&jar, &account).await?;
    let handle = retriever.start(&session, RetrievalRange::ALL).await?;

    // Ctrl+C stops the run; the rows fetched so far are still exported
    let signal_task = tokio::spawn(stop_on_signal(retriever.clone()));
    let report = handle.join().await?;
    signal_task.abort();

    if let Some(failure) = &report.failure {
        eprintln!(
            "⚠ page {} failed ({}); exporting the rows fetched before it",
            failure.page, failure.error
        );
    }
    let rows = report.rows;

    let format = output
        .as_deref()
        .and_then(ExportFormat::from_path)
        .unwrap_or(ExportFormat::Csv);
    let path = output.unwrap_or_else(|| {
        PathBuf::from(default_file_name(&account, format, chrono::Local::now()))
    });

    let written = export_records(&rows, &path, format)?;
    println!("Wrote {} records to {}", written, path.display());

    Ok(())
}
