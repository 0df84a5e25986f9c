use crate::{
    Capacity, SlidingWindowRateLimiter, WindowDurationMs, WindowKey, ZwindowError,
    memory::MemoryWindowStore,
};

use super::fakes::{options, prefix};

#[test]
fn window_duration_ms_try_from_validates_min_1() {
    let w = WindowDurationMs::try_from(1u64).unwrap();
    assert_eq!(*w, 1u64);

    assert_eq!(
        WindowDurationMs::try_from(0u64).unwrap_err(),
        "Window duration must be at least 1 ms"
    );
}

#[test]
fn window_duration_ms_converts_to_micros() {
    assert_eq!(WindowDurationMs::try_from(1u64).unwrap().as_micros(), 1_000);
    assert_eq!(
        WindowDurationMs::try_from(60_000u64).unwrap().as_micros(),
        60_000_000
    );
    assert_eq!(
        WindowDurationMs::try_from(u64::MAX).unwrap().as_micros(),
        i64::MAX
    );
}

#[test]
fn window_duration_ms_ttl_is_exactly_one_window() {
    let ttl = |ms: u64| WindowDurationMs::try_from(ms).unwrap().ttl_ms();

    assert_eq!(ttl(1), 1);
    assert_eq!(ttl(500), 500);
    assert_eq!(ttl(1500), 1500);
    assert_eq!(ttl(60_000), 60_000);
}

#[test]
fn capacity_try_from_validates_nonzero() {
    let c = Capacity::try_from(1u64).unwrap();
    assert_eq!(*c, 1u64);

    assert_eq!(
        Capacity::try_from(0u64).unwrap_err(),
        "Capacity must be greater than 0"
    );
}

#[test]
fn window_key_rejects_empty_long_and_colon() {
    assert!(matches!(
        WindowKey::try_from(""),
        Err(ZwindowError::InvalidWindowKey(_))
    ));
    assert!(matches!(
        WindowKey::try_from("a".repeat(256)),
        Err(ZwindowError::InvalidWindowKey(_))
    ));
    assert!(matches!(
        WindowKey::try_from("app:1"),
        Err(ZwindowError::InvalidWindowKey(_))
    ));

    let k = WindowKey::try_from("a".repeat(255)).unwrap();
    assert_eq!(k.len(), 255);
}

#[test]
fn window_key_uses_default_prefix() {
    let limiter = SlidingWindowRateLimiter::new(options(1000, 1), MemoryWindowStore::new());

    assert_eq!(&**WindowKey::default_prefix(), "zwindow");
    assert_eq!(limiter.window_key("user_1"), "zwindow:user_1");
}

#[test]
fn window_key_uses_custom_prefix() {
    let mut options = options(1000, 1);
    options.prefix = Some(prefix("api"));

    let limiter = SlidingWindowRateLimiter::new(options, MemoryWindowStore::new());

    assert_eq!(limiter.window_key("user_1"), "api:user_1");
    assert_eq!(*limiter.window_duration_ms(), 1000);
    assert_eq!(*limiter.capacity(), 1);
}

#[test]
fn identities_are_used_verbatim() {
    let limiter = SlidingWindowRateLimiter::new(options(1000, 1), MemoryWindowStore::new());
    let long = "x".repeat(300);

    assert_eq!(limiter.window_key("2001:db8::1"), "zwindow:2001:db8::1");
    assert_eq!(limiter.window_key("tenant:42"), "zwindow:tenant:42");
    assert_eq!(limiter.window_key(&long), format!("zwindow:{long}"));
}
