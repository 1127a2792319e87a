//! Scan session tests: replayed frames through the temporal confirmation loop.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use pretty_assertions::assert_eq;

use card_scanner::{DirectoryFrameSource, ScanUpdate, Scanner, StopReason};
use card_types::ConfirmationSettings;
use e2e_tests::{synthetic_card, TestHarness};

const TICK: Duration = Duration::from_millis(10);

fn scanner(harness: &TestHarness, confirmation: ConfirmationSettings) -> Scanner {
    let recognizer = Arc::new(harness.recognizer().unwrap());
    Scanner::with_interval(recognizer, confirmation, TICK)
}

#[tokio::test]
async fn test_scan_confirms_after_three_agreeing_frames() {
    let harness = TestHarness::new();
    harness.write_standard_corpus();
    harness.build().unwrap();

    // A warming-up camera delivers a blank frame first
    harness.write_frame("000.png", &RgbImage::new(1, 1));
    for i in 1..=4 {
        harness.write_frame(&format!("{:03}.png", i), &synthetic_card(2));
    }

    let scanner = scanner(&harness, ConfirmationSettings::default());
    let mut updates = scanner.subscribe();
    let report = scanner
        .start(DirectoryFrameSource::new(&harness.frames_dir, false))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.stop, StopReason::Confirmed);
    let result = report.result.unwrap();
    assert_eq!(result.item_id, "sv01-004");
    assert_eq!(result.frames, 3);
    assert!(result.confidence > 0.9);
    assert_eq!(report.frames, 3);

    let mut confirmed = 0;
    while let Ok(update) = updates.try_recv() {
        if let ScanUpdate::Confirmed(r) = update {
            assert_eq!(r.item_id, "sv01-004");
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 1);
}

#[tokio::test]
async fn test_scan_switching_cards_never_confirms() {
    let harness = TestHarness::new();
    harness.write_standard_corpus();
    harness.build().unwrap();

    for (i, seed) in [1, 2, 1, 3, 2, 3].iter().enumerate() {
        harness.write_frame(&format!("{:03}.png", i), &synthetic_card(*seed));
    }

    let scanner = scanner(&harness, ConfirmationSettings::default());
    let report = scanner
        .start(DirectoryFrameSource::new(&harness.frames_dir, false))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.stop, StopReason::SourceExhausted);
    assert!(report.result.is_none());
    assert_eq!(report.frames, 6);
}

#[tokio::test]
async fn test_stop_releases_and_reports() {
    let harness = TestHarness::new();
    harness.write_standard_corpus();
    harness.build().unwrap();
    harness.write_frame("000.png", &synthetic_card(1));

    let scanner = scanner(
        &harness,
        ConfirmationSettings {
            stop_on_confirm: false,
            ..Default::default()
        },
    );
    let mut updates = scanner.subscribe();
    let handle = scanner
        .start(DirectoryFrameSource::new(&harness.frames_dir, true))
        .await
        .unwrap();

    let confirmed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(ScanUpdate::Confirmed(_)) = updates.recv().await {
                break;
            }
        }
    })
    .await;
    assert!(confirmed.is_ok(), "no confirmation while streaming");
    assert!(!handle.is_finished());

    let report = handle.stop().await.unwrap();

    assert_eq!(report.stop, StopReason::Requested);
    assert_eq!(report.result.map(|r| r.item_id).as_deref(), Some("sv01-001"));
}
