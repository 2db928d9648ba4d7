use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use ulid::Ulid;

use crate::booking::BookingForm;
use crate::engine::{place_reservation, BookingEngine, EngineError};
use crate::limits::MAX_COMMAND_LEN;
use crate::model::*;
use crate::session::{Session, ADMIN_ROLE};

/// One line of input to the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    CreateCabin {
        #[serde(default)]
        id: Option<Ulid>,
        name: String,
        #[serde(default)]
        price_config: PriceConfig,
    },
    UpdatePriceConfig {
        cabin_id: Ulid,
        price_config: PriceConfig,
    },
    AddSeasonRule {
        cabin_id: Ulid,
        rule: SeasonRule,
    },
    RemoveSeasonRule {
        cabin_id: Ulid,
        index: usize,
    },
    DeleteCabin {
        cabin_id: Ulid,
    },
    ListCabins,
    Quote {
        cabin_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    BookedDates {
        cabin_id: Ulid,
    },
    Book {
        cabin_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guest: GuestInfo,
    },
    SetStatus {
        reservation_id: Ulid,
        status: ReservationStatus,
    },
    ListReservations {
        cabin_id: Ulid,
    },
    Compact,
}

#[derive(Debug)]
pub enum CommandError {
    Parse(String),
    TooLong(usize),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Parse(s) => write!(f, "parse error: {s}"),
            CommandError::TooLong(n) => write!(f, "command too long: {n} bytes"),
        }
    }
}

impl std::error::Error for CommandError {}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    if line.len() > MAX_COMMAND_LEN {
        return Err(CommandError::TooLong(line.len()));
    }
    serde_json::from_str(line).map_err(|e| CommandError::Parse(e.to_string()))
}

/// Read one newline-terminated command of at most `max` bytes. A longer line
/// is consumed and discarded without being buffered whole, and reported as
/// `TooLong`. `Ok(None)` at end of input.
pub async fn read_command_line<R>(
    reader: &mut R,
    max: usize,
) -> std::io::Result<Option<Result<String, CommandError>>>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max as u64 + 1;
    let mut buf = Vec::new();
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max {
        let mut skipped = buf.len();
        loop {
            buf.clear();
            let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
            skipped += n;
            if n == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(Some(Err(CommandError::TooLong(skipped))));
    }

    Ok(Some(
        String::from_utf8(buf).map_err(|e| CommandError::Parse(e.to_string())),
    ))
}

impl Command {
    fn required_role(&self) -> Option<&'static str> {
        match self {
            Command::ListCabins
            | Command::Quote { .. }
            | Command::BookedDates { .. }
            | Command::Book { .. } => None,
            _ => Some(ADMIN_ROLE),
        }
    }
}

pub fn ok_response(data: Value) -> Value {
    json!({ "ok": true, "data": data })
}

pub fn error_response(error: &dyn std::error::Error) -> Value {
    json!({ "ok": false, "error": error.to_string() })
}

fn to_value<T: Serialize>(v: T) -> Result<Value, EngineError> {
    serde_json::to_value(v).map_err(|e| EngineError::Encode(e.to_string()))
}

/// Run one command against the engine on behalf of `session`.
pub async fn execute(
    engine: &BookingEngine,
    session: &Session,
    atomic_reserve: bool,
    cmd: Command,
) -> Result<Value, EngineError> {
    if let Some(role) = cmd.required_role() {
        session.require_role(role)?;
    }
    match cmd {
        Command::CreateCabin {
            id,
            name,
            price_config,
        } => {
            let id = id.unwrap_or_else(Ulid::new);
            engine.create_cabin(id, name, price_config).await?;
            Ok(json!({ "id": id }))
        }
        Command::UpdatePriceConfig {
            cabin_id,
            price_config,
        } => {
            engine.update_price_config(cabin_id, price_config).await?;
            Ok(Value::Null)
        }
        Command::AddSeasonRule { cabin_id, rule } => {
            engine.add_season_rule(cabin_id, rule).await?;
            Ok(Value::Null)
        }
        Command::RemoveSeasonRule { cabin_id, index } => {
            let removed = engine.remove_season_rule(cabin_id, index).await?;
            to_value(removed)
        }
        Command::DeleteCabin { cabin_id } => {
            engine.delete_cabin(cabin_id).await?;
            Ok(Value::Null)
        }
        Command::ListCabins => to_value(engine.list_cabins().await),
        Command::Quote {
            cabin_id,
            check_in,
            check_out,
        } => to_value(engine.quote(cabin_id, check_in, check_out).await?),
        Command::BookedDates { cabin_id } => {
            let booked = engine.booked_dates(cabin_id).await?;
            to_value(booked.iter().collect::<Vec<_>>())
        }
        Command::Book {
            cabin_id,
            check_in,
            check_out,
            guest,
        } => {
            let request = build_request(engine, session, cabin_id, check_in, check_out, guest).await?;
            let reservation = place_reservation(engine, request, atomic_reserve).await?;
            to_value(reservation)
        }
        Command::SetStatus {
            reservation_id,
            status,
        } => {
            engine.set_status(reservation_id, status).await?;
            Ok(Value::Null)
        }
        Command::ListReservations { cabin_id } => to_value(engine.list_reservations(cabin_id).await?),
        Command::Compact => {
            engine.compact_wal().await?;
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            Ok(Value::Null)
        }
    }
}

/// Drive the booking form the way the widget does: two clicks, then submit.
async fn build_request(
    engine: &BookingEngine,
    session: &Session,
    cabin_id: Ulid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guest: GuestInfo,
) -> Result<ReservationRequest, EngineError> {
    StayRange::new(check_in, check_out)?;
    let cabin = engine.get_cabin(cabin_id).await?;
    let booked = engine.booked_dates(cabin_id).await?;
    for date in [check_in, check_out] {
        if booked.contains(date) {
            return Err(EngineError::DatesUnavailable(date));
        }
    }

    let mut form = BookingForm::new(cabin_id, cabin.price_config, engine.policy, booked);
    form.click(check_in);
    form.click(check_out);
    form.submit(guest, session)
}
