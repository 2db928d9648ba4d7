use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use ulid::Ulid;

use staybook::booking::BookingForm;
use staybook::command::{execute, ok_response, parse_command, Command};
use staybook::engine::{place_reservation, BookingEngine, EngineError, PricingPolicy, ReservationStore};
use staybook::model::*;
use staybook::notify::NotifyHub;
use staybook::selection::Selection;
use staybook::session::{Session, User, ADMIN_ROLE};

// ── Test infrastructure ──────────────────────────────────────

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("staybook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("staybook.wal")
}

fn open(path: &PathBuf) -> BookingEngine {
    BookingEngine::new(path.clone(), Arc::new(NotifyHub::new()), PricingPolicy::default()).unwrap()
}

fn admin() -> Session {
    Session::signed_in(User {
        uid: "staff-1".into(),
        email: Some("staff@example.com".into()),
        roles: vec![ADMIN_ROLE.into()],
    })
}

fn visitor() -> Session {
    Session::signed_in(User {
        uid: "guest-7".into(),
        email: Some("ana@example.com".into()),
        roles: Vec::new(),
    })
}

fn guest() -> GuestInfo {
    GuestInfo {
        name: "Ana Pérez".into(),
        email: "ana@example.com".into(),
        phone: "+54 294 555 0101".into(),
        guest_count: 3,
        special_requests: "Late arrival".into(),
    }
}

fn pricing() -> PriceConfig {
    PriceConfig::new(Decimal::from(100))
        .with_rule(
            SeasonRule::date_range("Alta", Decimal::new(15, 1), ymd(2025, 1, 1), ymd(2025, 2, 28))
                .unwrap(),
        )
        .with_rule(SeasonRule::weekdays("Finde", Decimal::new(12, 1), vec![5, 6]).unwrap())
}

async fn form_for(engine: &BookingEngine, cabin_id: Ulid) -> BookingForm {
    let cabin = engine.get_cabin(cabin_id).await.unwrap();
    let active = ReservationStore::active_ranges(engine, cabin_id).await.unwrap();
    BookingForm::from_ranges(cabin_id, cabin.price_config, engine.policy, &active)
}

// ── Widget to persistence ────────────────────────────────────

#[tokio::test]
async fn guest_books_through_the_form() {
    let path = wal_path();
    let engine = open(&path);
    let cabin_id = Ulid::new();
    engine.create_cabin(cabin_id, "Coihue".into(), pricing()).await.unwrap();

    let mut form = form_for(&engine, cabin_id).await;
    form.click(ymd(2025, 1, 14));
    assert!(form.quote().unwrap().breakdown.is_empty());
    let selection = form.click(ymd(2025, 1, 16));
    assert_eq!(
        selection,
        Selection::RangeSelected {
            check_in: ymd(2025, 1, 14),
            check_out: ymd(2025, 1, 16),
        }
    );

    let quote = form.quote().unwrap();
    assert_eq!(quote.nights, 2);
    assert_eq!(quote.total, Decimal::from(300));

    let request = form.submit(guest(), &visitor()).unwrap();
    assert_eq!(request.user_id.as_deref(), Some("guest-7"));
    assert_eq!(request.base_price, Decimal::from(100));
    let reservation = place_reservation(&engine, request, true).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.request.quote, quote);

    // A second visitor with a fresh form sees the booked days.
    let mut other = form_for(&engine, cabin_id).await;
    assert!(other.booked().contains(ymd(2025, 1, 16)));
    assert_eq!(other.click(ymd(2025, 1, 15)), Selection::NoneSelected);
}

#[tokio::test]
async fn stale_form_is_caught_by_checked_insert() {
    let path = wal_path();
    let engine = open(&path);
    let cabin_id = Ulid::new();
    engine.create_cabin(cabin_id, "Radal".into(), pricing()).await.unwrap();

    let mut first = form_for(&engine, cabin_id).await;
    let mut second = form_for(&engine, cabin_id).await;
    for form in [&mut first, &mut second] {
        form.click(ymd(2025, 3, 10));
        form.click(ymd(2025, 3, 12));
    }

    let a = first.submit(guest(), &Session::anonymous()).unwrap();
    let b = second.submit(guest(), &Session::anonymous()).unwrap();
    assert!(place_reservation(&engine, a, true).await.is_ok());
    let err = place_reservation(&engine, b.clone(), true).await.unwrap_err();
    assert!(matches!(err, EngineError::DatesUnavailable(d) if d == ymd(2025, 3, 10)));

    // Refreshing the form surfaces the conflict before persistence.
    second.refresh_booked(engine.booked_dates(cabin_id).await.unwrap());
    assert!(matches!(
        second.submit(guest(), &Session::anonymous()),
        Err(EngineError::DatesUnavailable(_))
    ));

    // The unchecked path still stores it.
    assert!(place_reservation(&engine, b, false).await.is_ok());
    assert_eq!(engine.list_reservations(cabin_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn staff_confirm_and_cancel_survive_restart() {
    let path = wal_path();
    let cabin_id = Ulid::new();
    let (confirmed, cancelled) = {
        let engine = open(&path);
        engine.create_cabin(cabin_id, "Lenga".into(), pricing()).await.unwrap();

        let mut ids = Vec::new();
        for (from, to) in [(ymd(2025, 4, 1), ymd(2025, 4, 3)), (ymd(2025, 4, 10), ymd(2025, 4, 12))] {
            let mut form = form_for(&engine, cabin_id).await;
            form.click(from);
            form.click(to);
            let request = form.submit(guest(), &visitor()).unwrap();
            ids.push(place_reservation(&engine, request, true).await.unwrap().id);
        }
        ReservationStore::set_status(&engine, ids[0], ReservationStatus::Confirmed).await.unwrap();
        ReservationStore::set_status(&engine, ids[1], ReservationStatus::Cancelled).await.unwrap();
        (ids[0], ids[1])
    };

    let engine = open(&path);
    assert_eq!(
        engine.get_reservation(confirmed).await.unwrap().status,
        ReservationStatus::Confirmed
    );
    assert_eq!(
        engine.get_reservation(cancelled).await.unwrap().status,
        ReservationStatus::Cancelled
    );
    let booked = engine.booked_dates(cabin_id).await.unwrap();
    assert!(booked.contains(ymd(2025, 4, 3)));
    assert!(!booked.contains(ymd(2025, 4, 10)));
}

// ── Commands ─────────────────────────────────────────────────

#[tokio::test]
async fn command_session_round() {
    let path = wal_path();
    let engine = open(&path);
    let staff = admin();
    let anon = Session::anonymous();

    let line = json!({
        "cmd": "create_cabin",
        "name": "Arrayán",
        "price_config": { "base_price": "120", "season_rules": [] }
    })
    .to_string();
    let created = execute(&engine, &staff, true, parse_command(&line).unwrap())
        .await
        .unwrap();
    let cabin_id: Ulid = serde_json::from_value(created["id"].clone()).unwrap();

    // Anonymous visitors cannot manage cabins.
    let denied = execute(&engine, &anon, true, Command::DeleteCabin { cabin_id }).await;
    assert!(matches!(denied, Err(EngineError::PermissionDenied(ADMIN_ROLE))));

    let line = json!({
        "cmd": "book",
        "cabin_id": cabin_id,
        "check_in": "2025-05-05",
        "check_out": "2025-05-07",
        "guest": { "name": "Ana", "email": "ana@example.com", "guest_count": 2 }
    })
    .to_string();
    let booked = execute(&engine, &anon, true, parse_command(&line).unwrap())
        .await
        .unwrap();
    let reservation: Reservation = serde_json::from_value(booked).unwrap();
    assert_eq!(reservation.request.quote.total, Decimal::from(240));
    assert_eq!(reservation.request.user_id, None);

    // Same dates again: refused before the form is even built.
    let again = execute(&engine, &anon, true, parse_command(&line).unwrap()).await;
    assert!(matches!(again, Err(EngineError::DatesUnavailable(_))));

    let status = Command::SetStatus {
        reservation_id: reservation.id,
        status: ReservationStatus::Confirmed,
    };
    assert!(matches!(
        execute(&engine, &anon, true, status.clone()).await,
        Err(EngineError::PermissionDenied(_))
    ));
    assert!(execute(&engine, &staff, true, status).await.is_ok());

    let dates = execute(&engine, &anon, true, Command::BookedDates { cabin_id })
        .await
        .unwrap();
    assert_eq!(dates, json!(["2025-05-05", "2025-05-06", "2025-05-07"]));

    let listed = execute(&engine, &staff, true, Command::ListReservations { cabin_id })
        .await
        .unwrap();
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    assert!(execute(&engine, &staff, true, Command::Compact).await.is_ok());
    let response = ok_response(execute(&engine, &anon, true, Command::ListCabins).await.unwrap());
    assert_eq!(response["ok"], json!(true));
    assert_eq!(response["data"][0]["name"], json!("Arrayán"));
}
