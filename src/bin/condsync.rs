//! condsync - command-line client for the condsync daemon
//!
//! Sends one request, prints the daemon's response line and disconnects.
//!
//! # Usage
//!
//! ```text
//! condsync set A ready 1              # Set: ready = 1
//! condsync wait A ready 1 2000        # Waited: 1 :: ready = 1
//! condsync get A ready                # Get: 1
//! condsync --json get A ready         # {"type":"get","state":1}
//! condsync --host 10.0.0.5 reset A    # Reset: A
//! ```
//!
//! Exits with status 1 when the daemon answers `Error:` or `Fatal:`.

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use condsync_client::{ClientConfig, SyncClient};
use condsync_core::WaitTimeout;
use condsync_protocol::{Operation, Request, Response};

// ============================================================================
// CLI Arguments
// ============================================================================

/// condsync - named condition synchronization client
#[derive(Parser, Debug)]
#[command(name = "condsync", version, about, allow_negative_numbers = true)]
struct Args {
    /// Daemon host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Daemon port
    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// Print the response as JSON
    #[arg(long)]
    json: bool,

    /// Operation: init, set, wait, get, delete or reset
    operation: Operation,

    /// Solution name
    solution: String,

    /// Condition name (all operations except reset)
    condition: Option<String>,

    /// Value to set or wait for
    value: Option<i64>,

    /// Wait timeout in milliseconds (0 or omitted waits forever)
    timeout_ms: Option<u64>,
}

impl Args {
    fn request(&self) -> Result<Request> {
        let solution = self.solution.as_str();
        let request = match self.operation {
            Operation::Reset => Request::reset(solution)?,
            Operation::Init => Request::init(solution, self.condition()?)?,
            Operation::Get => Request::get(solution, self.condition()?)?,
            Operation::Delete => Request::delete(solution, self.condition()?)?,
            Operation::Set => Request::set(solution, self.condition()?, self.value()?)?,
            Operation::Wait => Request::wait(
                solution,
                self.condition()?,
                self.value()?,
                WaitTimeout::from_millis(self.timeout_ms.unwrap_or(0)),
            )?,
        };
        Ok(request)
    }

    fn condition(&self) -> Result<&str> {
        match &self.condition {
            Some(condition) => Ok(condition),
            None => bail!("{} requires a condition name", self.operation),
        }
    }

    fn value(&self) -> Result<i64> {
        match self.value {
            Some(value) => Ok(value),
            None => bail!("{} requires a value", self.operation),
        }
    }
}

fn render(response: &Response, json: bool) -> Result<String> {
    if json {
        serde_json::to_string(response).context("Failed to encode response")
    } else {
        Ok(response.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let request = args.request()?;

    let config = ClientConfig::for_address(format!("{}:{}", args.host, args.port));
    let mut client = SyncClient::connect(&config)
        .await
        .context("Is condsyncd running?")?;

    debug!(request = %request, "Sending request");
    let response = client.request(&request).await?;
    println!("{}", render(&response, args.json)?);

    if let Err(e) = client.quit().await {
        // The daemon closes the socket itself after a fatal error.
        debug!(error = %e, "Failed to send quit");
    }

    Ok(if response.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
