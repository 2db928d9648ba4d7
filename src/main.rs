use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncWriteExt, BufReader};
use tracing::info;

use staybook::command::{error_response, execute, ok_response, parse_command, read_command_line};
use staybook::config::Settings;
use staybook::engine::BookingEngine;
use staybook::limits::MAX_COMMAND_LEN;
use staybook::notify::NotifyHub;
use staybook::observability::{self, command_label};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    observability::init(settings.metrics_port)?;

    std::fs::create_dir_all(&settings.data_dir)?;
    let wal_path = settings.data_dir.join("staybook.wal");
    let engine = Arc::new(BookingEngine::new(
        wal_path.clone(),
        Arc::new(NotifyHub::new()),
        settings.pricing,
    )?);
    tokio::spawn(staybook::compactor::run_compactor(
        engine.clone(),
        settings.compact_threshold,
    ));

    let session = settings.operator_session();
    info!("staybook ready");
    info!("  wal: {}", wal_path.display());
    info!("  atomic_reserve: {}", settings.atomic_reserve);
    info!(
        "  operator: {}",
        settings.operator_email.as_deref().unwrap_or("anonymous")
    );

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = read_command_line(&mut stdin, MAX_COMMAND_LEN) => line?,
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        };
        let Some(line) = line else { break };
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                write_response(&mut stdout, error_response(&e)).await?;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match parse_command(&line) {
            Ok(cmd) => {
                let label = command_label(&cmd);
                let start = Instant::now();
                let result = execute(&engine, &session, settings.atomic_reserve, cmd).await;
                metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
                    .record(start.elapsed().as_secs_f64());
                let status = if result.is_ok() { "ok" } else { "error" };
                metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => status)
                    .increment(1);
                match result {
                    Ok(data) => ok_response(data),
                    Err(e) => {
                        tracing::debug!("{label} failed: {e}");
                        error_response(&e)
                    }
                }
            }
            Err(e) => error_response(&e),
        };

        write_response(&mut stdout, response).await?;
    }

    info!("staybook stopped");
    Ok(())
}

async fn write_response(stdout: &mut tokio::io::Stdout, response: serde_json::Value) -> std::io::Result<()> {
    let mut out = response.to_string();
    out.push('\n');
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await
}
