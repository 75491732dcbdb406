// End-to-end appointment lifecycle against an in-memory tenant store.
// Tenant: Europe/Madrid, Mon-Fri 09:00-13:00 + 15:00-18:00, 30-minute slots,
// capacity 1. "Now" is Sunday 2026-10-18 12:00 local.

use chrono::{DateTime, Utc};
use slotwise_booking::{
    types::{
        AppointmentChanges, AppointmentFilter, BookingRequest, DurationUnit, Service, StartTime,
    },
    Actor, AppointmentStatus, AvailabilityPolicy, BookingError, BookingManager, TenantContext,
    TenantRegistry,
};
use slotwise_core::SubjectId;

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn now() -> DateTime<Utc> {
    utc("2026-10-18T10:00:00Z")
}

fn tenant() -> TenantContext {
    let registry = TenantRegistry::in_memory(16, "Europe/Madrid");
    let ctx = registry.resolve("acme").unwrap();
    ctx.store
        .save_policy(&ctx.tenant, &AvailabilityPolicy::default())
        .unwrap();
    for (id, minutes, price) in [("cut", 60, 1500), ("shave", 30, 800)] {
        ctx.store
            .upsert_service(
                &ctx.tenant,
                &Service {
                    id: id.into(),
                    name: id.to_string(),
                    price_cents: price,
                    duration: minutes,
                    duration_unit: DurationUnit::Minutes,
                    active: true,
                },
            )
            .unwrap();
    }
    registry.resolve("acme").unwrap()
}

fn client(name: &str) -> Actor {
    Actor::Client(SubjectId::from(name))
}

fn local(date: &str, time: &str, services: &[&str]) -> BookingRequest {
    BookingRequest {
        subject_id: None,
        service_ids: services.iter().map(|s| (*s).into()).collect(),
        start: StartTime::Local {
            date: date.into(),
            time: time.into(),
        },
        notes: String::new(),
        reminder_offsets: vec![],
    }
}

#[test]
fn client_books_a_local_slot() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let a = m
        .create(&client("ana"), local("2026-10-19", "09:00", &["cut", "shave"]), now())
        .unwrap();
    assert_eq!(a.start, utc("2026-10-19T07:00:00Z"));
    assert_eq!(a.duration_minutes, 90);
    assert_eq!(a.total_price_cents, 2300);
    assert_eq!(a.status, AppointmentStatus::Pending);
    assert_eq!(a.subject_id, SubjectId::from("ana"));
    assert_eq!(m.get(&client("ana"), &a.id).unwrap(), a);
}

#[test]
fn capacity_one_blocks_overlapping_slot() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    m.create(&client("ana"), local("2026-10-19", "09:00", &["cut"]), now())
        .unwrap();

    let err = m
        .create(&client("ben"), local("2026-10-19", "09:30", &["shave"]), now())
        .unwrap_err();
    assert_eq!(err.code(), "NO_CAPACITY");

    // Back-to-back is fine.
    m.create(&client("ben"), local("2026-10-19", "10:00", &["shave"]), now())
        .unwrap();
}

#[test]
fn policy_rejections_surface_as_violations() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let code = |date: &str, time: &str| {
        m.create(&client("ana"), local(date, time, &["cut"]), now())
            .unwrap_err()
            .code()
    };
    assert_eq!(code("2026-10-19", "12:30"), "OUTSIDE_WORKING_HOURS");
    assert_eq!(code("2026-10-19", "09:15"), "MISALIGNED");
    assert_eq!(code("2026-10-24", "09:00"), "OUTSIDE_WORKING_HOURS");
    assert_eq!(code("2027-01-04", "09:00"), "TOO_FAR_AHEAD");
    assert_eq!(code("2026-10-19", "9am"), "INVALID_TIME_INPUT");
}

#[test]
fn unknown_services_and_missing_policy() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    assert!(matches!(
        m.create(&client("ana"), local("2026-10-19", "09:00", &["cut", "massage"]), now()),
        Err(BookingError::UnknownServices(ids)) if ids.len() == 1
    ));

    let bare = TenantRegistry::in_memory(4, "Europe/Madrid")
        .resolve("fresh")
        .unwrap();
    let err = BookingManager::new(&bare)
        .create(&client("ana"), local("2026-10-19", "09:00", &["cut"]), now())
        .unwrap_err();
    assert_eq!(err.code(), "CONFIG_MISSING");
}

#[test]
fn operator_books_confirmed_for_a_subject() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let mut req = local("2026-10-20", "15:00", &["cut"]);
    assert!(matches!(
        m.create(&Actor::Operator, req.clone(), now()),
        Err(BookingError::InvalidRequest(_))
    ));
    req.subject_id = Some("ana".into());
    let a = m.create(&Actor::Operator, req.clone(), now()).unwrap();
    assert_eq!(a.status, AppointmentStatus::Confirmed);

    // A client cannot book in someone else's name.
    req.subject_id = Some("ana".into());
    assert!(matches!(
        m.create(&client("ben"), req, now()),
        Err(BookingError::Forbidden(_))
    ));
}

#[test]
fn cancel_and_reactivate() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let a = m
        .create(&client("ana"), local("2026-10-19", "09:00", &["cut"]), now())
        .unwrap();

    assert!(matches!(
        m.cancel(&client("ben"), &a.id, now()),
        Err(BookingError::Forbidden(_))
    ));
    let cancelled = m.cancel(&client("ana"), &a.id, now()).unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(
        m.cancel(&client("ana"), &a.id, now()).unwrap_err().code(),
        "INVALID_TRANSITION"
    );

    // Someone else takes the freed slot; reactivation must now fail.
    let b = m
        .create(&client("ben"), local("2026-10-19", "09:00", &["cut"]), now())
        .unwrap();
    assert_eq!(
        m.reactivate(&client("ana"), &a.id, now()).unwrap_err().code(),
        "NO_CAPACITY"
    );

    m.cancel(&client("ben"), &b.id, now()).unwrap();
    let back = m.reactivate(&client("ana"), &a.id, now()).unwrap();
    assert_eq!(back.status, AppointmentStatus::Pending);
}

#[test]
fn operator_only_transitions() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let a = m
        .create(&client("ana"), local("2026-10-19", "09:00", &["cut"]), now())
        .unwrap();

    assert_eq!(m.confirm(&client("ana"), &a.id, now()).unwrap_err().code(), "FORBIDDEN");
    assert_eq!(
        m.confirm(&Actor::Operator, &a.id, now()).unwrap().status,
        AppointmentStatus::Confirmed
    );
    assert_eq!(
        m.confirm(&Actor::Operator, &a.id, now()).unwrap_err().code(),
        "INVALID_TRANSITION"
    );

    assert_eq!(m.complete(&client("ana"), &a.id, now()).unwrap_err().code(), "FORBIDDEN");
    assert_eq!(
        m.complete(&Actor::Operator, &a.id, now()).unwrap().status,
        AppointmentStatus::Completed
    );
    assert_eq!(
        m.complete(&Actor::Operator, &a.id, now()).unwrap_err().code(),
        "INVALID_TRANSITION"
    );

    assert_eq!(m.delete(&client("ana"), &a.id).unwrap_err().code(), "FORBIDDEN");
    m.delete(&Actor::Operator, &a.id).unwrap();
    assert_eq!(m.get(&Actor::Operator, &a.id).unwrap_err().code(), "NOT_FOUND");
}

#[test]
fn update_revalidates_only_schedule_changes() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let a = m
        .create(&client("ana"), local("2026-10-19", "11:00", &["cut"]), now())
        .unwrap();

    let late = AppointmentChanges {
        start: Some(StartTime::Local {
            date: "2026-10-19".into(),
            time: "12:30".into(),
        }),
        ..Default::default()
    };
    assert_eq!(
        m.update(&client("ana"), &a.id, late, now()).unwrap_err().code(),
        "OUTSIDE_WORKING_HOURS"
    );

    // Moving within its own footprint does not collide with itself.
    let earlier = AppointmentChanges {
        start: Some(StartTime::Local {
            date: "2026-10-19".into(),
            time: "10:30".into(),
        }),
        service_ids: Some(vec!["shave".into()]),
        ..Default::default()
    };
    let moved = m.update(&client("ana"), &a.id, earlier, now()).unwrap();
    assert_eq!(moved.start, utc("2026-10-19T08:30:00Z"));
    assert_eq!(moved.duration_minutes, 30);
    assert_eq!(moved.total_price_cents, 800);

    let notes = AppointmentChanges {
        notes: Some("  window seat ".into()),
        reminder_offsets: Some(vec![30, 30, -1]),
        ..Default::default()
    };
    let noted = m.update(&client("ana"), &a.id, notes, now()).unwrap();
    assert_eq!(noted.notes, "window seat");
    assert_eq!(noted.reminder_offsets, vec![30]);
    assert_eq!(noted.start, moved.start);
}

#[test]
fn clients_list_only_their_own() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    m.create(&client("ana"), local("2026-10-19", "09:00", &["cut"]), now())
        .unwrap();
    m.create(&client("ben"), local("2026-10-19", "10:00", &["cut"]), now())
        .unwrap();

    let mine = m.list(&client("ana"), AppointmentFilter::default()).unwrap();
    assert_eq!(mine.total, 1);
    assert_eq!(mine.items[0].subject_id, SubjectId::from("ana"));

    // A client asking for someone else's list still gets their own.
    let sneaky = AppointmentFilter {
        subject_id: Some("ben".into()),
        ..Default::default()
    };
    assert_eq!(m.list(&client("ana"), sneaky).unwrap().total, 1);
    assert_eq!(m.list(&Actor::Operator, AppointmentFilter::default()).unwrap().total, 2);
}

#[test]
fn past_starts_are_rejected() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let err = m
        .create(&client("ana"), local("2026-10-12", "09:00", &["cut"]), now())
        .unwrap_err();
    assert_eq!(err.code(), "START_IN_PAST");

    let a = m
        .create(&client("ana"), local("2026-10-19", "09:00", &["cut"]), now())
        .unwrap();
    let back_in_time = AppointmentChanges {
        start: Some(StartTime::Local {
            date: "2026-10-16".into(),
            time: "09:00".into(),
        }),
        ..Default::default()
    };
    assert_eq!(
        m.update(&client("ana"), &a.id, back_in_time, now()).unwrap_err().code(),
        "START_IN_PAST"
    );

    // Cancelled, then the slot passes: it cannot come back.
    m.cancel(&client("ana"), &a.id, now()).unwrap();
    let later = utc("2026-10-19T07:00:00Z");
    assert_eq!(
        m.reactivate(&client("ana"), &a.id, later).unwrap_err().code(),
        "START_IN_PAST"
    );
}

#[test]
fn notes_are_capped() {
    let ctx = tenant();
    let m = BookingManager::new(&ctx);
    let mut req = local("2026-10-19", "09:00", &["cut"]);
    req.notes = "x".repeat(501);
    assert_eq!(
        m.create(&client("ana"), req.clone(), now()).unwrap_err().code(),
        "INVALID_REQUEST"
    );

    req.notes = "é".repeat(500);
    let a = m.create(&client("ana"), req, now()).unwrap();
    assert_eq!(a.notes.chars().count(), 500);

    let long = AppointmentChanges {
        notes: Some("y".repeat(501)),
        ..Default::default()
    };
    assert_eq!(
        m.update(&client("ana"), &a.id, long, now()).unwrap_err().code(),
        "INVALID_REQUEST"
    );
}

#[test]
fn capacity_three_admits_three_overlaps() {
    let ctx = tenant();
    let mut policy = ctx.policy.clone().unwrap();
    policy.capacity = 3;
    ctx.store.save_policy(&ctx.tenant, &policy).unwrap();
    let ctx = TenantContext {
        policy: Some(policy),
        ..ctx
    };
    let m = BookingManager::new(&ctx);

    for (who, time) in [("ana", "09:00"), ("ben", "09:30"), ("cas", "09:00")] {
        m.create(&client(who), local("2026-10-19", time, &["cut"]), now())
            .unwrap();
    }
    let err = m
        .create(&client("dan"), local("2026-10-19", "09:30", &["shave"]), now())
        .unwrap_err();
    assert_eq!(err.code(), "NO_CAPACITY");

    // 10:00 only overlaps ben's 09:30-10:30.
    m.create(&client("dan"), local("2026-10-19", "10:00", &["cut"]), now())
        .unwrap();
}
