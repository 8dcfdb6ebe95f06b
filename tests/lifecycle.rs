//! Registry expiry, rate limiting and background sweeps.

mod common;

use common::{fast_settings, ScriptedEngine, SpyRunner, ok};
use mediagrab::cache::normalize_key;
use mediagrab::extractor::parse::locate_json_block;
use mediagrab::limiter::RateLimiter;
use mediagrab::registry::{DownloadRegistry, PublishedFile};
use mediagrab::utils::config::RateLimitSettings;
use mediagrab::{MediaCore, MediaFormat};
use proptest::prelude::*;
use std::time::Duration;
use tempfile::TempDir;

fn published(temp: &TempDir, name: &str) -> PublishedFile {
    let path = temp.path().join(name);
    std::fs::write(&path, b"bytes").unwrap();
    PublishedFile {
        path,
        filename: name.to_string(),
        metadata: serde_json::Value::Null,
        format: MediaFormat::Video,
    }
}

#[tokio::test]
async fn registry_entry_expires_with_its_file() {
    let temp = TempDir::new().unwrap();
    let registry = DownloadRegistry::new(Duration::from_secs(300));
    let file = published(&temp, "abc.mp4");
    let path = file.path.clone();

    registry.put("abc", file, Duration::from_millis(50)).await;
    assert!(registry.get("abc").await.is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(registry.get("abc").await.is_none());
    assert!(!path.exists());
}

#[test]
fn rate_limit_window_allows_then_blocks_then_resets() {
    tokio_test::block_on(async {
        let limiter = RateLimiter::new(&RateLimitSettings::default());
        let window = Duration::from_millis(60);

        let decisions: Vec<bool> = vec![
            limiter.check("client-a", 2, window).await.allowed,
            limiter.check("client-a", 2, window).await.allowed,
            limiter.check("client-a", 2, window).await.allowed,
        ];
        assert_eq!(decisions, vec![true, true, false]);

        tokio::time::sleep(Duration::from_millis(120)).await;

        let fresh = limiter.check("client-a", 2, window).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
    });
}

#[tokio::test]
async fn core_rate_check_uses_configured_quota() {
    let temp = TempDir::new().unwrap();
    let mut settings = fast_settings(temp.path());
    settings.rate_limit.limit = 1;
    let runner = SpyRunner::new(|_, _| ok(""));
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    assert!(core.check_rate("10.0.0.1").await.allowed);
    let blocked = core.check_rate("10.0.0.1").await;
    assert!(!blocked.allowed);
    assert_eq!(blocked.limit, 1);
    assert!(core.check_rate("10.0.0.2").await.allowed);
}

#[tokio::test]
async fn background_sweepers_clean_expired_state() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();

    let mut settings = fast_settings(&scratch);
    settings.registry.sweep_interval = Duration::from_millis(20);
    settings.rate_limit.sweep_interval = Duration::from_millis(20);
    settings.rate_limit.window = Duration::from_millis(20);
    settings.cache.sweep_interval = Duration::from_millis(20);
    let runner = SpyRunner::new(|_, _| ok(""));
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let path = scratch.join("old.mp4");
    std::fs::write(&path, b"bytes").unwrap();
    core.registry()
        .put(
            "old",
            PublishedFile {
                path: path.clone(),
                filename: "old.mp4".to_string(),
                metadata: serde_json::Value::Null,
                format: MediaFormat::Video,
            },
            Duration::from_millis(10),
        )
        .await;
    core.check_rate("client").await;

    core.start_sweepers().await;
    core.start_sweepers().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    core.shutdown().await;

    // Swept without anyone looking the entry up
    assert!(!path.exists());
    assert!(core.registry().is_empty().await);
    assert_eq!(core.limiter().tracked_clients().await, 0);
}

#[tokio::test]
async fn scratch_files_from_an_earlier_process_are_purged() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();

    // Left behind by a process that exited without releasing it
    let stale = scratch.join("0f3a9c.mp4");
    std::fs::write(&stale, b"bytes").unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let mut settings = fast_settings(&scratch);
    settings.registry.ttl = Duration::from_millis(60);
    settings.registry.sweep_interval = Duration::from_secs(60);
    let runner = SpyRunner::new(|_, _| ok(""));
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let fresh = scratch.join("fresh.mp4");
    std::fs::write(&fresh, b"bytes").unwrap();

    assert_eq!(core.purge_scratch().await, 1);
    assert!(!stale.exists());
    assert!(fresh.exists());

    // start_sweepers purges once before its first interval
    tokio::time::sleep(Duration::from_millis(120)).await;
    core.start_sweepers().await;
    assert!(!fresh.exists());
    core.shutdown().await;
}

proptest! {
    #[test]
    fn cache_key_ignores_case_and_trailing_slashes(
        path in "[a-zA-Z0-9]{1,12}",
        slashes in 0usize..4,
    ) {
        let base = format!("https://vimeo.com/{}", path);
        let variant = format!("  {}{}  ", base.to_uppercase(), "/".repeat(slashes));
        prop_assert_eq!(normalize_key(&base), normalize_key(&variant));
    }

    #[test]
    fn json_block_is_found_inside_arbitrary_log_lines(
        prefix in "[a-zA-Z0-9 :\\[\\]]{0,40}",
        suffix in "[a-zA-Z0-9 :\\[\\]]{0,40}",
        title in "[a-zA-Z0-9 {}]{0,20}",
    ) {
        let doc = serde_json::json!({ "title": title }).to_string();
        let text = format!("{}\n{}\n{}", prefix, doc, suffix);
        prop_assert_eq!(locate_json_block(&text), Some(doc.as_str()));
    }

    #[test]
    fn small_objects_in_log_lines_do_not_hide_the_document(
        noise in prop::sample::select(vec!["{}", "{\"k\":1}", "{\"a\": [1, 2]}"]),
        title in "[a-zA-Z0-9 ]{1,20}",
    ) {
        let doc = serde_json::json!({ "title": title, "id": "abc123", "duration": 12.0 });
        let doc = doc.to_string();
        let text = format!("[debug] Proxy map: {}\n{}\n[info] done", noise, doc);
        prop_assert_eq!(locate_json_block(&text), Some(doc.as_str()));
    }

    #[test]
    fn locate_json_block_never_panics(text in "\\PC{0,200}") {
        let _ = locate_json_block(&text);
    }
}
