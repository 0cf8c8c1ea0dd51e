//! Ordering, consumption and deadline properties of batch scripts.

use proptest::prelude::*;
use std::time::Duration;
use vmprobe::test_utils::FakeGuest;
use vmprobe::{BatchScript, BatchStep, ConsoleSession, Error, Pattern, SessionConfig};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

/// Runs `script` against `guest` and returns the outcome plus what the guest
/// received.
fn play(
    guest: FakeGuest,
    script: &BatchScript,
    deadline: Duration,
) -> (vmprobe::Result<()>, Vec<u8>) {
    runtime().block_on(async {
        let (stream, handle) = guest.spawn();
        let mut session = ConsoleSession::new(stream, SessionConfig::default());
        let result = script.run(&mut session, deadline).await.map(|_| ());
        session.close().await.unwrap();
        // a guest still sleeping through a delay notices on its next write
        assert!(handle.wait_disconnected(Duration::from_secs(60)).await);
        (result, handle.received())
    })
}

fn sends(words: &[String]) -> BatchScript {
    words
        .iter()
        .map(|w| BatchStep::Send(format!("{w}\n").into_bytes()))
        .collect()
}

proptest! {
    #[test]
    fn sends_reach_the_guest_in_script_order(
        words in prop::collection::vec("[a-z]{1,6}", 1..8),
    ) {
        let (result, received) = play(FakeGuest::new(), &sends(&words), Duration::from_secs(5));
        prop_assert!(result.is_ok());

        let expected: String = words.iter().map(|w| format!("{w}\n")).collect();
        prop_assert_eq!(String::from_utf8(received).unwrap(), expected);
    }

    #[test]
    fn reordering_sends_changes_guest_input(
        (words, shuffled) in prop::collection::vec("[a-z]{1,6}", 2..6)
            .prop_flat_map(|w| (Just(w.clone()), Just(w).prop_shuffle())),
    ) {
        let (_, original) = play(FakeGuest::new(), &sends(&words), Duration::from_secs(5));
        let (_, reordered) = play(FakeGuest::new(), &sends(&shuffled), Duration::from_secs(5));

        let original_lines: Vec<_> = original.split(|b| *b == b'\n').collect();
        let reordered_lines: Vec<_> = reordered.split(|b| *b == b'\n').collect();
        prop_assert_eq!(original_lines == reordered_lines, words == shuffled);
    }

    #[test]
    fn matches_only_move_forward(
        text in "[ab# ]{0,120}",
        patterns in prop::collection::vec(prop::sample::select(vec!["a", "b", "#", "ab", "b#"]), 1..12),
    ) {
        let found = runtime().block_on(async {
            let (stream, _handle) = FakeGuest::new().banner(text.clone()).spawn();
            let mut session = ConsoleSession::new(stream, SessionConfig::default());
            let mut found = Vec::new();
            for pattern in &patterns {
                match session.expect(&Pattern::from(*pattern), Duration::from_secs(1)).await {
                    Ok(m) => found.push((*pattern, m)),
                    Err(_) => break,
                }
            }
            session.close().await.unwrap();
            found
        });

        let mut consumed = 0usize;
        for (pattern, m) in &found {
            prop_assert!(m.start >= consumed);
            let leftmost = text[consumed..].find(pattern).map(|i| i + consumed);
            prop_assert_eq!(Some(m.start), leftmost);
            prop_assert_eq!(m.end, m.start + pattern.len());
            prop_assert_eq!(m.matched.as_str(), *pattern);
            consumed = m.end;
        }
    }

    #[test]
    fn shorter_deadlines_never_rescue_a_timeout(
        boot_secs in 0u64..20,
        prompt_secs in 0u64..20,
        long in 1u64..40,
        cut in 1u64..40,
    ) {
        let short = long.saturating_sub(cut).max(1).min(long);
        let guest = || {
            FakeGuest::new()
                .boot_delay(Duration::from_secs(boot_secs))
                .banner("login: ")
                .on_after("root\n", Duration::from_secs(prompt_secs), "# ")
        };
        let script = BatchScript::new().expect("login").send("root\n").expect("#");

        let (long_result, _) = play(guest(), &script, Duration::from_secs(long));
        let (short_result, _) = play(guest(), &script, Duration::from_secs(short));

        if matches!(&long_result, Err(e) if e.is_timeout()) {
            prop_assert!(
                matches!(&short_result, Err(e) if e.is_timeout()),
                "deadline {}s rescued a script that timed out at {}s",
                short,
                long
            );
        }
        if short_result.is_ok() {
            prop_assert!(long_result.is_ok());
        }
    }
}

#[test]
fn failing_step_is_attributed() {
    let script = BatchScript::new().expect("login").send("root\n").expect("#");
    let (result, received) = play(
        FakeGuest::new().banner("login: "),
        &script,
        Duration::from_secs(20),
    );

    let err = result.unwrap_err();
    assert_eq!(err.failed_step(), Some(2));
    assert!(matches!(
        err,
        Error::StepFailed { ref source, .. } if matches!(**source, Error::ReadTimeout { .. })
    ));
    assert_eq!(received, b"root\n");
}
