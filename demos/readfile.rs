//! # Whole-File Read and Write Demonstration
//!
//! Reads every file named on the command line through the engine, then writes
//! a one-line-per-file summary to the temp directory.
//!
//! ## Key Concepts Demonstrated
//!
//! - **Lazy bootstrap**: the facility starts on the first submission
//! - **Callbacks**: each read hands its path and bytes to a closure
//! - **Driving the loop**: `EventLoop::run()` dispatches until nothing is in flight
//! - **Error reporting**: completion-time anomalies arrive through a reporter hook
//!
//! ```text
//! RUST_LOG=safer_aio=debug cargo run --example readfile -- /etc/hostname /etc/os-release
//! ```

use safer_aio::{initialize_logger, AioConfig, AioEngine, EventLoop};
use std::sync::{Arc, Mutex};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    initialize_logger();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: readfile <path>...");
        std::process::exit(2);
    }

    let event_loop = EventLoop::new();
    let engine = AioEngine::new(event_loop.reactor(), AioConfig::default())?;
    engine.set_error_reporter(|error| eprintln!("completion error: {error}"));

    let summary = Arc::new(Mutex::new(String::new()));
    for path in &paths {
        let summary = Arc::clone(&summary);
        let submitted = engine.read_file(path, move |outcome| {
            let line = format!(
                "{}: {} bytes{}\n",
                outcome.path().display(),
                outcome.transferred(),
                if outcome.is_short() { " (short)" } else { "" }
            );
            print!("{line}");
            summary.lock().map_err(|e| e.to_string())?.push_str(&line);
            Ok(())
        });
        if let Err(e) = submitted {
            eprintln!("{path}: {e}");
        }
    }

    let dispatched = event_loop.run()?;
    println!(
        "dispatched {dispatched} completions on {}",
        engine.backend_name().unwrap_or("no backend")
    );

    let summary = summary.lock().map_err(|e| e.to_string())?.clone();
    if summary.is_empty() {
        return Ok(());
    }

    let out = std::env::temp_dir().join("safer-aio-summary.txt");
    engine.write_file_with(&out, summary.as_bytes(), |outcome| {
        println!("wrote {} bytes to {}", outcome.written(), outcome.path().display());
        Ok(())
    })?;
    event_loop.run()?;

    let stats = engine.stats();
    println!(
        "stats: {} submitted, {} completed, {} errors",
        stats.submitted(),
        stats.completions,
        stats.completion_errors()
    );
    Ok(())
}
