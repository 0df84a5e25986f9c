use std::sync::{Arc, atomic::Ordering};

use crate::{
    Admission, OsRngTokenSource, SlidingWindowRateLimiter, ZwindowError,
    memory::MemoryWindowStore,
};

use super::{
    fakes::{
        EPOCH_MICROS, FixedTokenSource, ManualClock, ScriptedStore, memory_limiter,
        options, scripted_limiter,
    },
    runtime::block_on,
};

#[test]
fn admits_up_to_capacity_then_rejects() {
    let (limiter, _clock) = memory_limiter(1000, 2);
    let k = "k";

    block_on(async {
        assert!(limiter.allow_request(k).await.unwrap());
        assert!(limiter.allow_request(k).await.unwrap());
        assert!(!limiter.allow_request(k).await.unwrap());
        assert!(!limiter.allow_request(k).await.unwrap());
    });
}

#[test]
fn scenario_slot_frees_when_oldest_ages_out() {
    let (limiter, clock) = memory_limiter(1000, 2);
    let k = "k";

    block_on(async {
        clock.set_ms(0);
        assert_eq!(
            limiter.admit(k).await.unwrap(),
            Admission {
                allowed: true,
                count: 0
            }
        );

        clock.set_ms(100);
        assert_eq!(
            limiter.admit(k).await.unwrap(),
            Admission {
                allowed: true,
                count: 1
            }
        );

        clock.set_ms(200);
        assert_eq!(
            limiter.admit(k).await.unwrap(),
            Admission {
                allowed: false,
                count: 2
            }
        );

        // the entry from t=0 has left the window
        clock.set_ms(1001);
        assert_eq!(
            limiter.admit(k).await.unwrap(),
            Admission {
                allowed: true,
                count: 1
            }
        );
    });
}

#[test]
fn rejected_attempts_are_not_recorded() {
    let (limiter, _clock) = memory_limiter(1000, 3);
    let k = "k";

    block_on(async {
        for _ in 0..10 {
            limiter.allow_request(k).await.unwrap();
        }
    });

    let window_key = limiter.window_key(k);
    assert_eq!(limiter.store().window_len(&window_key), 3);
}

#[test]
fn entry_at_exact_window_edge_is_pruned() {
    let (limiter, clock) = memory_limiter(1000, 1);
    let k = "k";

    block_on(async {
        clock.set_ms(0);
        assert!(limiter.allow_request(k).await.unwrap());

        clock.set_ms(999);
        assert!(!limiter.allow_request(k).await.unwrap());

        clock.set_ms(1000);
        assert!(limiter.allow_request(k).await.unwrap());
    });
}

#[test]
fn identities_do_not_share_windows() {
    let (limiter, _clock) = memory_limiter(1000, 1);

    block_on(async {
        assert!(limiter.allow_request("a").await.unwrap());
        assert!(!limiter.allow_request("a").await.unwrap());
        assert!(limiter.allow_request("b").await.unwrap());
    });
}

#[test]
fn concurrent_callers_never_exceed_capacity() {
    let clock = ManualClock::starting_at_epoch();
    let limiter = Arc::new(
        SlidingWindowRateLimiter::new(
            options(60_000, 10),
            MemoryWindowStore::with_clock(clock.clone()),
        )
        .with_clock(clock)
        .with_token_source(Arc::new(OsRngTokenSource)),
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .build()
        .unwrap();

    let allowed = rt.block_on(async {
        let mut handles = Vec::new();

        for _ in 0..64 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.allow_request("hot").await.unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        allowed
    });

    assert_eq!(allowed, 10);
    assert_eq!(
        limiter.store().window_len(&limiter.window_key("hot")),
        10
    );
}

#[test]
fn same_microsecond_attempts_are_separate_entries() {
    let (limiter, _clock) = memory_limiter(1000, 5);
    let k = "k";

    block_on(async {
        assert!(limiter.allow_request(k).await.unwrap());
        assert!(limiter.allow_request(k).await.unwrap());

        let entries = limiter.window(k).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp_micros, EPOCH_MICROS);
        assert_eq!(entries[1].timestamp_micros, EPOCH_MICROS);
        assert_ne!(entries[0].token, entries[1].token);
    });
}

#[test]
fn reused_token_overwrites_instead_of_adding() {
    let (limiter, _clock) = memory_limiter(1000, 5);
    let limiter = limiter.with_token_source(Arc::new(FixedTokenSource("same")));
    let k = "k";

    block_on(async {
        assert!(limiter.allow_request(k).await.unwrap());
        assert!(limiter.allow_request(k).await.unwrap());
    });

    assert_eq!(limiter.store().window_len(&limiter.window_key(k)), 1);
}

#[test]
fn ttl_is_window_length_after_every_call() {
    let (limiter, clock) = memory_limiter(2000, 1);
    let k = "k";
    let window_key = limiter.window_key(k);

    block_on(async {
        assert!(limiter.allow_request(k).await.unwrap());
        assert_eq!(limiter.store().ttl_micros(&window_key), Some(2_000_000));

        clock.set_ms(500);
        assert!(!limiter.allow_request(k).await.unwrap());
        assert_eq!(limiter.store().ttl_micros(&window_key), Some(2_000_000));
    });

    // idle for a full window: the key is gone
    clock.set_ms(2500);
    assert_eq!(limiter.store().window_len(&window_key), 0);
}

#[test]
fn window_lists_live_entries_without_writing() {
    let (limiter, clock) = memory_limiter(1000, 5);
    let k = "k";

    block_on(async {
        clock.set_ms(0);
        limiter.allow_request(k).await.unwrap();
        clock.set_ms(600);
        limiter.allow_request(k).await.unwrap();

        clock.set_ms(1200);
        let entries = limiter.window(k).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp_micros, EPOCH_MICROS + 600_000);

        // the aged entry was filtered, not pruned
        assert_eq!(limiter.store().window_len(&limiter.window_key(k)), 2);
    });
}

#[test]
fn store_failure_is_returned() {
    let limiter = scripted_limiter(ScriptedStore::unavailable(), 2);

    let result = block_on(limiter.allow_request("k"));

    assert!(matches!(result, Err(ZwindowError::StoreUnavailable(_))));
    assert_eq!(limiter.store().calls.load(Ordering::SeqCst), 1);
}

#[test]
fn rejected_reply_is_a_decision() {
    let limiter = scripted_limiter(ScriptedStore::with_admission_reply(vec!["rejected", "2"]), 2);

    assert!(!block_on(limiter.allow_request("k")).unwrap());
}

#[test]
fn malformed_replies_are_protocol_errors() {
    let malformed: Vec<Vec<&str>> = vec![
        vec![],
        vec!["allowed"],
        vec!["allowed", "1", "extra"],
        vec!["maybe", "1"],
        vec!["allowed", "one"],
        vec!["rejected", "-1"],
        // admitted although the window was already full
        vec!["allowed", "2"],
    ];

    for reply in malformed {
        let limiter = scripted_limiter(ScriptedStore::with_admission_reply(reply.clone()), 2);

        let result = block_on(limiter.allow_request("k"));

        assert!(
            matches!(result, Err(ZwindowError::ProtocolError(_))),
            "reply {reply:?} gave {result:?}"
        );
    }
}

#[test]
fn default_limiter_uses_system_time_and_random_tokens() {
    let limiter = SlidingWindowRateLimiter::new(options(60_000, 2), MemoryWindowStore::new());
    let k = "k";

    block_on(async {
        assert!(limiter.allow_request(k).await.unwrap());
        assert!(limiter.allow_request(k).await.unwrap());
        assert!(!limiter.allow_request(k).await.unwrap());

        let entries = limiter.window(k).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].token.len(), 36);
    });
}

#[test]
fn identities_with_colons_get_decisions() {
    let (limiter, _clock) = memory_limiter(1000, 1);
    let long = "x".repeat(300);

    block_on(async {
        for identity in ["2001:db8::1", "::1", "tenant:42", long.as_str()] {
            assert!(limiter.allow_request(identity).await.unwrap(), "{identity}");
            assert!(!limiter.allow_request(identity).await.unwrap(), "{identity}");
        }
    });

    // "::1" and "2001:db8::1" share a suffix but not a window
    assert_eq!(limiter.store().window_len("zwindow:::1"), 1);
    assert_eq!(limiter.store().window_len("zwindow:2001:db8::1"), 1);
}

#[test]
fn sub_second_window_ttl_is_exact() {
    let (limiter, clock) = memory_limiter(1500, 1);
    let k = "k";
    let window_key = limiter.window_key(k);

    block_on(async {
        assert!(limiter.allow_request(k).await.unwrap());
    });
    assert_eq!(limiter.store().ttl_micros(&window_key), Some(1_500_000));

    clock.set_ms(1499);
    assert_eq!(limiter.store().window_len(&window_key), 1);

    clock.set_ms(1500);
    assert_eq!(limiter.store().window_len(&window_key), 0);
}
