//! Materialize pipeline tests: format fallback, file location, transcoding,
//! metadata and one-time retrieval.

mod common;

use common::{failed, fast_settings, ok, probe_json, write_download, ScriptedEngine, SpyRunner};
use mediagrab::{ErrorKind, MediaCore, MediaFormat};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn rejected_format_falls_back_to_relaxed_selector() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |spec, _| {
        let selector = spec.value_of("-f").unwrap_or_default();
        if selector.contains("height<=") {
            failed("ERROR: [vimeo] 1: Requested format is not available. Use --list-formats")
        } else {
            let path = write_download(spec, "mp4", b"relaxed video");
            ok(&format!("[download] Destination: {}", path.display()))
        }
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner.clone(), ScriptedEngine::writing());

    let file = core.materialize("https://vimeo.com/1", MediaFormat::Video).await.unwrap();

    let selectors: Vec<_> = runner
        .download_specs()
        .iter()
        .map(|s| s.value_of("-f").unwrap_or_default().to_string())
        .collect();
    assert_eq!(selectors.len(), 2);
    assert_eq!(selectors[1], "bestvideo+bestaudio/best");
    assert_eq!(file.size, b"relaxed video".len() as u64);
    assert!(file.path.starts_with(temp.path()));
    assert!(file.path.file_name().unwrap().to_string_lossy().starts_with(&file.id));
}

#[tokio::test]
async fn relaxed_attempt_is_made_only_once() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::new(|_, _| failed("ERROR: Requested format is not available"));
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner.clone(), ScriptedEngine::writing());

    let err = core.materialize("https://vimeo.com/1", MediaFormat::Video).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedQuality);
    assert_eq!(runner.calls(), 2);
    assert_eq!(runner.probe_calls(), 0);
}

#[tokio::test]
async fn merged_output_is_located_from_markers() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |spec, _| {
        let video = write_download(spec, "f137.mp4", b"v");
        let merged = write_download(spec, "mkv", b"merged video");
        std::fs::remove_file(&video).unwrap();
        ok(&format!(
            "[download] Destination: {}\n[Merger] Merging formats into \"{}\"\nDeleting original file {}",
            video.display(),
            merged.display(),
            video.display()
        ))
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let file = core.materialize("https://vimeo.com/1", MediaFormat::Video).await.unwrap();
    assert_eq!(file.path.extension().unwrap(), "mkv");
    assert_eq!(file.size, b"merged video".len() as u64);
}

#[tokio::test]
async fn silent_tool_output_falls_back_to_directory_search() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |spec, _| {
        write_download(spec, "webm", b"quiet video");
        ok("")
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let file = core.materialize("https://vimeo.com/1", MediaFormat::Video).await.unwrap();
    assert_eq!(file.path.extension().unwrap(), "webm");
}

#[tokio::test]
async fn success_without_a_file_is_a_location_error() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |_, _| ok("[download] 100% of 1.00MiB"));
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let err = core.materialize("https://vimeo.com/1", MediaFormat::Video).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FilePathError);
}

#[tokio::test]
async fn audio_request_is_transcoded_and_source_removed() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Song", |spec, _| {
        let path = write_download(spec, "m4a", b"aac stream");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let engine = ScriptedEngine::writing();
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner.clone(), engine.clone());

    let file = core.materialize("https://vimeo.com/1", MediaFormat::Audio).await.unwrap();

    assert_eq!(engine.jobs.load(Ordering::SeqCst), 1);
    assert_eq!(file.path.extension().unwrap(), "mp3");
    assert_eq!(file.filename, "Song.mp3");
    assert!(file.path.exists());
    assert!(!file.path.with_extension("m4a").exists());
    assert_eq!(runner.download_specs()[0].value_of("-f"), Some("bestaudio/best"));
}

#[tokio::test]
async fn transcode_output_that_appears_late_is_accepted() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |spec, _| {
        let path = write_download(spec, "webm", b"opus stream");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let engine = ScriptedEngine::late(Duration::from_millis(80));
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, engine);

    let file = core.materialize("https://vimeo.com/1", MediaFormat::Audio).await.unwrap();
    assert_eq!(file.path.extension().unwrap(), "mp3");
}

#[tokio::test]
async fn transcode_output_that_never_appears_is_file_not_found() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |spec, _| {
        let path = write_download(spec, "webm", b"opus stream");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::never_writes());

    let err = core.materialize("https://vimeo.com/1", MediaFormat::Audio).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);

    // Failed materializations leave nothing behind
    let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn materialize_without_earlier_probe_carries_metadata() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Fresh Upload", |spec, _| {
        let path = write_download(spec, "mp4", b"video");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner.clone(), ScriptedEngine::writing());

    let file = core.materialize("https://vimeo.com/2", MediaFormat::Video).await.unwrap();

    let metadata = file.metadata.expect("metadata attached");
    assert_eq!(metadata.title, "Fresh Upload");
    assert_eq!(file.filename, "Fresh Upload.mp4");
    assert_eq!(runner.probe_calls(), 1);

    // The probe made for the download is cached for later lookups
    core.probe("https://vimeo.com/2").await.unwrap();
    assert_eq!(runner.probe_calls(), 1);
}

#[tokio::test]
async fn failed_metadata_lookup_keeps_the_download() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::new(|spec, _| {
        if common::is_probe(spec) {
            return failed("ERROR: [vimeo] 3: Unable to extract info section");
        }
        let path = write_download(spec, "mp4", b"video");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let file = core.materialize("https://vimeo.com/3", MediaFormat::Video).await.unwrap();

    assert!(file.metadata.is_none());
    assert_eq!(file.filename, format!("{}.mp4", file.id));
    assert!(file.path.exists());
}

#[tokio::test]
async fn fetch_publishes_with_probe_title() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::new(|spec, _| {
        if common::is_probe(spec) {
            return ok(&probe_json("My Clip: Part 1"));
        }
        let path = write_download(spec, "mp4", b"video");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner.clone(), ScriptedEngine::writing());

    core.probe("https://vimeo.com/1").await.unwrap();
    let publication = core.fetch("https://vimeo.com/1", MediaFormat::Video).await.unwrap();

    assert_eq!(publication.filename, "My Clip_ Part 1.mp4");
    assert_eq!(publication.content_type, "video/mp4");
    // Metadata came from the cache
    assert_eq!(runner.probe_calls(), 1);

    let retrieval = core.retrieve(&publication.id).await.unwrap();
    assert_eq!(retrieval.entry.file.metadata["title"], "My Clip: Part 1");
    assert!(retrieval.entry.file.path.exists());
}

#[tokio::test]
async fn published_file_is_retrieved_only_once() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |spec, _| {
        let path = write_download(spec, "mp4", b"video");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let publication = core.fetch("https://vimeo.com/1", MediaFormat::Video).await.unwrap();

    let first = core.retrieve(&publication.id).await;
    let second = core.retrieve(&publication.id).await;

    assert!(first.is_some());
    assert!(second.is_none());
    // Nothing left to release; the file belongs to the first caller
    assert!(!core.release(&publication.id).await);
    assert!(first.unwrap().entry.file.path.exists());
}

#[tokio::test]
async fn released_file_is_deleted_and_not_retrievable() {
    let temp = TempDir::new().unwrap();
    let runner = SpyRunner::downloads("Clip", |spec, _| {
        let path = write_download(spec, "mp4", b"video");
        ok(&format!("[download] Destination: {}", path.display()))
    });
    let settings = fast_settings(temp.path());
    let core = MediaCore::with_components(settings, runner, ScriptedEngine::writing());

    let publication = core.fetch("https://vimeo.com/1", MediaFormat::Video).await.unwrap();
    let path = core.registry().get(&publication.id).await.unwrap().file.path;

    assert!(core.release(&publication.id).await);
    assert!(!path.exists());
    assert!(core.retrieve(&publication.id).await.is_none());
}
