use std::fs;
use std::sync::Arc;

use lib_sync::cache::{DerivedResultCache, MemoryStorage};
use lib_sync::core::{AutosaveOptions, SaveOutcome, SavedSection, SectionStatus};
use lib_sync::loggers::setup_logging;
use lib_sync::SyncSession;
use project_tests::{FakeAnalysisApi, FakeNotificationApi, FakeSectionApi};
use tempfile::tempdir;

#[tokio::main]
/// # Logging Integration Test
///
/// 1.  Seeds a temporary log directory with two stale log files.
/// 2.  Installs the global logger at debug level.
/// 3.  Drives a manual save through a session so the library logs on its own.
/// 4.  Asserts the save shows up in the new file and that rotation left only
///     the newest stale file next to it.
async fn main() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let log_dir = temp_dir.path().to_path_buf();

    for (name, age_secs) in [("old_a.log", 600), ("old_b.log", 60)] {
        let path = log_dir.join(name);
        fs::write(&path, "stale\n").expect("Failed to seed log file");
        let modified = std::time::SystemTime::now() - std::time::Duration::from_secs(age_secs);
        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(modified))
            .expect("Failed to age log file");
    }

    let log_path = setup_logging(&log_dir, "test_app", "debug").expect("Failed to install logger");
    log::info!("This is an info message");

    let sections = Arc::new(FakeSectionApi::new());
    let session = SyncSession::new(
        sections.clone(),
        Arc::new(FakeAnalysisApi::new()),
        Arc::new(FakeNotificationApi::new()),
        DerivedResultCache::open(MemoryStorage::new()),
        AutosaveOptions::default(),
    );
    let unit = session
        .open_section(&SavedSection {
            id: "s-log".into(),
            owner_id: None,
            content: [("summary".to_string(), "draft".to_string())].into_iter().collect(),
            status: SectionStatus::Draft,
        })
        .expect("Failed to open section");
    unit.edit_field("summary", "final").expect("Failed to edit");
    assert_eq!(unit.save_now().await, SaveOutcome::Saved);
    session.shutdown().await;
    log::logger().flush();

    let contents = fs::read_to_string(&log_path).expect("Failed to read log file contents");
    assert!(contents.contains("This is an info message"), "Info message not found in log file");
    assert!(contents.contains("[INFO]"), "Level tag not found in log file");
    assert!(contents.contains("s-log"), "Library save logging not found in log file");

    let mut remaining: Vec<String> = fs::read_dir(&log_dir)
        .expect("Failed to read log directory after rotation")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    remaining.sort();
    assert_eq!(remaining.len(), 2, "Log rotation failed: found {:?}", remaining);
    assert!(remaining.contains(&"old_b.log".to_string()), "Newest previous log should survive");
    assert_eq!(sections.call_count(), 1);

    println!("Logging test passed: {}", log_path.display());
    temp_dir.close().expect("Failed to clean up temporary directory");
}
