use std::net::SocketAddr;

use crate::command::Command;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "staybook_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "staybook_command_duration_seconds";

// ── Booking metrics ─────────────────────────────────────────────

/// Counter: stays priced.
pub const QUOTES_TOTAL: &str = "staybook_quotes_total";

/// Counter: reservations persisted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "staybook_reservations_created_total";

/// Counter: atomic reservations refused because the dates were taken.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "staybook_reservation_conflicts_total";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "staybook_wal_flush_duration_seconds";

/// Histogram: events per WAL flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "staybook_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "staybook_wal_compactions_total";

/// Install the Prometheus exporter. No-op without a port.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command in metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateCabin { .. } => "create_cabin",
        Command::UpdatePriceConfig { .. } => "update_price_config",
        Command::AddSeasonRule { .. } => "add_season_rule",
        Command::RemoveSeasonRule { .. } => "remove_season_rule",
        Command::DeleteCabin { .. } => "delete_cabin",
        Command::ListCabins => "list_cabins",
        Command::Quote { .. } => "quote",
        Command::BookedDates { .. } => "booked_dates",
        Command::Book { .. } => "book",
        Command::SetStatus { .. } => "set_status",
        Command::ListReservations { .. } => "list_reservations",
        Command::Compact => "compact",
    }
}
