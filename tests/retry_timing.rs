//! Delivery retry cap and backoff spacing, measured under paused time

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use otpflow::Notice;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn three_attempts_with_linear_backoff_then_one_exhaustion() {
    // Default policy: 3 attempts, 1s base delay.
    let h = spawn_with_config(Default::default());
    h.channel.fail_next_fills(u32::MAX);

    let mut notices = h.handle.subscribe();
    h.handle.need_code(false, None).await.unwrap();
    let when = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    assert!(h.handle.code_found("483920", Some(when)).await.unwrap());

    // Paused time fast-forwards through the backoff sleeps.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let mut exhaustions = 0;
    while let Ok(Ok(notice)) = tokio::time::timeout_at(deadline, notices.recv()).await {
        if let Notice::DeliveryExhausted { attempts } = notice {
            assert_eq!(attempts, 3);
            exhaustions += 1;
            break;
        }
    }
    assert_eq!(exhaustions, 1);

    let fills = h.channel.fills();
    assert_eq!(fills.len(), 3);

    // Backoff between attempts: 1s, then 2s, then 3s.
    let gap1 = fills[1].at - fills[0].at;
    let gap2 = fills[2].at - fills[1].at;
    assert_eq!(gap1, Duration::from_secs(2));
    assert_eq!(gap2, Duration::from_secs(3));

    // Give any stray retry a chance to show itself.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.channel.fills().len(), 3);
    while let Ok(notice) = notices.try_recv() {
        assert!(!matches!(notice, Notice::DeliveryExhausted { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn success_cancels_inflight_retries() {
    let h = spawn_with_config(Default::default());
    h.channel.fail_next_fills(u32::MAX);

    h.handle.need_code(false, None).await.unwrap();
    let when = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    assert!(h.handle.code_found("483920", Some(when)).await.unwrap());

    // Wait for the first attempt to land, then report success.
    assert!(
        wait_until(Duration::from_secs(30), || !h.channel.fills().is_empty()).await
    );
    h.handle.login_succeeded("483920", Utc::now()).await.unwrap();

    // The episode's token stops the remaining attempts.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.channel.fills().len(), 1);
}
