use super::*;

#[test]
fn allows_exactly_the_limit() {
    let rl = RateLimiter::with_limit(100, Duration::from_secs(60));
    let conn = Uuid::new_v4();
    let now = Instant::now();

    for i in 0..100 {
        assert!(rl.check_and_record_at(conn, now).is_ok(), "event {i} should succeed");
    }
    assert!(matches!(
        rl.check_and_record_at(conn, now),
        Err(RateLimitError::Exceeded { limit: 100, window_secs: 60 })
    ));
}

#[test]
fn budget_recovers_after_window() {
    let rl = RateLimiter::with_limit(2, Duration::from_secs(60));
    let conn = Uuid::new_v4();
    let start = Instant::now();

    rl.check_and_record_at(conn, start).unwrap();
    rl.check_and_record_at(conn, start).unwrap();
    assert!(rl.check_and_record_at(conn, start).is_err());

    // Once the first event ages out, the budget frees up again.
    let later = start + Duration::from_secs(61);
    assert!(rl.check_and_record_at(conn, later).is_ok());
}

#[test]
fn window_rolls_rather_than_resets() {
    let rl = RateLimiter::with_limit(2, Duration::from_secs(60));
    let conn = Uuid::new_v4();
    let start = Instant::now();

    rl.check_and_record_at(conn, start).unwrap();
    rl.check_and_record_at(conn, start + Duration::from_secs(30)).unwrap();

    // 45s in: both events still inside the window.
    assert!(rl.check_and_record_at(conn, start + Duration::from_secs(45)).is_err());
    // 61s in: only the 30s event remains.
    assert!(rl.check_and_record_at(conn, start + Duration::from_secs(61)).is_ok());
}

#[test]
fn connections_do_not_interfere() {
    let rl = RateLimiter::with_limit(1, Duration::from_secs(60));
    let conn_a = Uuid::new_v4();
    let conn_b = Uuid::new_v4();
    let now = Instant::now();

    rl.check_and_record_at(conn_a, now).unwrap();
    assert!(rl.check_and_record_at(conn_a, now).is_err());
    assert!(rl.check_and_record_at(conn_b, now).is_ok());
}

#[test]
fn forget_clears_history() {
    let rl = RateLimiter::with_limit(1, Duration::from_secs(60));
    let conn = Uuid::new_v4();
    let now = Instant::now();

    rl.check_and_record_at(conn, now).unwrap();
    assert!(rl.check_and_record_at(conn, now).is_err());

    rl.forget(conn);
    assert!(rl.check_and_record_at(conn, now).is_ok());
}

#[test]
fn error_maps_to_wire_code() {
    let err = RateLimitError::Exceeded { limit: 1, window_secs: 60 };
    assert_eq!(err.code(), RejectCode::RateLimitExceeded);
}
