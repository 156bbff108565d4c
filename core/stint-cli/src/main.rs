//! stint: CLI client for the stint daemon.
//!
//! Thin front-end over the daemon socket: every subcommand maps to one
//! request. The daemon owns all timer state; this binary only renders.

mod client;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use stint_core::TickReadout;
use stint_daemon_protocol::{Method, Response, StatusPayload, StintPayload};

#[derive(Parser)]
#[command(name = "stint")]
#[command(about = "Tagged interval stopwatch, crash-safe")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a run under the given tag
    Start {
        /// Tag for the run (e.g. "deep-work")
        #[arg(value_name = "TAG")]
        tag: String,
    },

    /// Stop the active run and record it
    Stop,

    /// Start if idle, stop if running
    Toggle {
        /// Tag used when the toggle starts a run
        #[arg(value_name = "TAG")]
        tag: String,
    },

    /// Show what the timer is doing right now
    Status,

    /// List tags with at least one recorded run
    Tags,

    /// List recorded runs, newest first
    Runs {
        /// Only show runs with this tag
        #[arg(value_name = "TAG")]
        tag: Option<String>,

        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Check that the daemon is up
    Health,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { tag } => run_start(&tag),
        Commands::Stop => run_stop(),
        Commands::Toggle { tag } => run_toggle(&tag),
        Commands::Status => run_status(),
        Commands::Tags => run_tags(),
        Commands::Runs { tag, limit } => run_runs(tag.as_deref(), limit),
        Commands::Health => run_health(),
    };

    if let Err(err) = result {
        eprintln!("stint: {}", err);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_start(tag: &str) -> Result<(), String> {
    let response = client::send_request(Method::Start, "cli-start", Some(json!({ "tag": tag })))?;
    let status: StatusPayload = expect_payload(response)?;
    match status.tag.as_deref() {
        Some(active) if active != tag.trim() => println!("already tracking {}", active),
        _ => println!("started {}", tag.trim()),
    }
    Ok(())
}

fn run_stop() -> Result<(), String> {
    let response = client::send_request(Method::Stop, "cli-stop", None)?;
    let record: StintPayload = expect_payload(response)?;
    println!(
        "stopped {} after {} ({}s)",
        record.tag,
        render_duration(record.duration_secs),
        record.duration_secs
    );
    Ok(())
}

fn run_toggle(tag: &str) -> Result<(), String> {
    let response = client::send_request(Method::Toggle, "cli-toggle", Some(json!({ "tag": tag })))?;
    let data = expect_data(response)?;

    match data.get("action").and_then(|value| value.as_str()) {
        Some("started") => {
            println!("started {}", tag);
            Ok(())
        }
        Some("stopped") => {
            let record: StintPayload = data
                .get("stint")
                .cloned()
                .ok_or_else(|| "Response is missing the stint payload".to_string())
                .and_then(|value| {
                    serde_json::from_value(value)
                        .map_err(|err| format!("Failed to parse stint payload: {}", err))
                })?;
            println!(
                "stopped {} after {} ({}s)",
                record.tag,
                render_duration(record.duration_secs),
                record.duration_secs
            );
            Ok(())
        }
        other => Err(format!("Unexpected toggle action: {:?}", other)),
    }
}

fn run_status() -> Result<(), String> {
    let response = client::send_request(Method::GetStatus, "cli-status", None)?;
    let status: StatusPayload = expect_payload(response)?;

    if status.running {
        let elapsed = TickReadout {
            hours: status.hours,
            minutes: status.minutes,
            seconds: status.seconds,
        };
        println!(
            "tracking {} for {} (since {})",
            status.tag.as_deref().unwrap_or("?"),
            elapsed,
            status.started_at.as_deref().unwrap_or("?")
        );
    } else {
        println!("idle");
    }
    Ok(())
}

fn run_tags() -> Result<(), String> {
    let response = client::send_request(Method::ListTags, "cli-tags", None)?;
    let tags: Vec<String> = expect_payload(response)?;

    if tags.is_empty() {
        println!("no recorded runs yet");
    } else {
        for tag in tags {
            println!("{}", tag);
        }
    }
    Ok(())
}

fn run_runs(tag: Option<&str>, limit: usize) -> Result<(), String> {
    let mut params = json!({ "limit": limit });
    if let Some(tag) = tag {
        params["tag"] = json!(tag);
    }

    let response = client::send_request(Method::ListStints, "cli-runs", Some(params))?;
    let records: Vec<StintPayload> = expect_payload(response)?;

    if records.is_empty() {
        println!("no recorded runs");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  {}",
            record.started_at,
            render_duration(record.duration_secs),
            record.tag
        );
    }
    Ok(())
}

fn run_health() -> Result<(), String> {
    let response = client::send_request(Method::GetHealth, "cli-health", None)?;
    let data = expect_data(response)?;

    let pid = data.get("pid").and_then(|value| value.as_u64()).unwrap_or(0);
    let version = data
        .get("version")
        .and_then(|value| value.as_str())
        .unwrap_or("unknown");
    println!("daemon ok (pid {}, version {})", pid, version);
    Ok(())
}

fn expect_data(response: Response) -> Result<serde_json::Value, String> {
    if !response.ok {
        let error = response
            .error
            .map(|err| format!("{} ({})", err.message, err.code))
            .unwrap_or_else(|| "daemon reported an unknown error".to_string());
        return Err(error);
    }
    response
        .data
        .ok_or_else(|| "daemon response had no payload".to_string())
}

fn expect_payload<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, String> {
    let data = expect_data(response)?;
    serde_json::from_value(data).map_err(|err| format!("Failed to parse response payload: {}", err))
}

fn render_duration(duration_secs: i64) -> String {
    TickReadout::from_whole_seconds(duration_secs).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_durations_as_clock_time() {
        assert_eq!(render_duration(0), "00:00:00");
        assert_eq!(render_duration(125), "00:02:05");
        assert_eq!(render_duration(3661), "01:01:01");
        assert_eq!(render_duration(-5), "00:00:00");
    }
}
