//! Drift tracking for installed configuration files.
//!
//! Each installed file gets a record holding the checksum of what the agent
//! wrote. A later checksum mismatch is reported to the control plane once;
//! the record stays `modified` until the next install of that file.

use crate::client::ApiClient;
use crate::error::{AgentError, Result};
use crate::inventory::InstalledCollectors;
use crate::notify::PendingNotifications;
use crate::paths;
use crate::registration::Registration;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RECORD_SUFFIX: &str = ".current.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    /// Control-plane id of the collector instance.
    pub collector_id: String,
    pub assignment_id: String,
    /// Managed file this record tracks.
    #[serde(default)]
    pub path: PathBuf,
    /// Hex SHA-256 of the file as written.
    pub checksum: String,
    /// Base64 copy of the installed contents.
    pub snapshot: String,
    pub modified: bool,
    pub updated_at: DateTime<Utc>,
}

impl TrackerRecord {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(Some(serde_yaml::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::write_private(path, data.as_bytes())
    }
}

/// Result of one verification pass over a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// No record or no file; nothing to compare.
    Untracked,
    /// Drift was already reported for this record.
    AlreadyReported,
    Unchanged,
    /// Drift detected and reported just now.
    Reported,
}

impl VerifyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyOutcome::Untracked => "untracked",
            VerifyOutcome::AlreadyReported => "already_reported",
            VerifyOutcome::Unchanged => "unchanged",
            VerifyOutcome::Reported => "reported",
        }
    }
}

/// SHA-256 over the whole file, hex encoded.
pub fn checksum_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Serialize)]
struct ModifiedStatus {
    status: &'static str,
}

/// Sole owner of tracker records.
#[derive(Debug, Clone)]
pub struct Tracker {
    etc: PathBuf,
    client: ApiClient,
    registration: Registration,
    notifications: Option<PendingNotifications>,
}

impl Tracker {
    pub fn new(etc: impl Into<PathBuf>, client: ApiClient, registration: Registration) -> Self {
        Self {
            etc: etc.into(),
            client,
            registration,
            notifications: None,
        }
    }

    /// Queue a container notification whenever drift is reported.
    pub fn with_notifications(mut self, notifications: PendingNotifications) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn record_path(&self, collector: &str, config_file: &Path) -> PathBuf {
        paths::tracking_record(&self.etc, collector, config_file)
    }

    /// Record a fresh baseline for a just-installed file.
    ///
    /// Clears any previous `modified` state for the file.
    pub fn update_config(
        &self,
        collector: &str,
        assignment_id: &str,
        config_file: &Path,
        data: &[u8],
    ) -> Result<TrackerRecord> {
        let record_path = self.record_path(collector, config_file);

        let collector_id = match TrackerRecord::load(&record_path)? {
            Some(prev) if !prev.collector_id.is_empty() => prev.collector_id,
            _ => InstalledCollectors::load(&paths::installed_path(&self.etc))?
                .id_for_type(collector)
                .map(str::to_string)
                .ok_or_else(|| {
                    AgentError::Inventory(format!(
                        "collector '{collector}' not found in installed collectors"
                    ))
                })?,
        };

        let record = TrackerRecord {
            collector_id,
            assignment_id: assignment_id.to_string(),
            path: config_file.to_path_buf(),
            checksum: checksum_file(config_file)?,
            snapshot: B64.encode(data),
            modified: false,
            updated_at: Utc::now(),
        };
        record.save(&record_path)?;
        Ok(record)
    }

    /// Keep a copy of a file the agent is about to take over.
    ///
    /// Only the first managed install of a path is backed up: nothing is
    /// copied once a backup or a tracker record exists for it. Missing files
    /// and non-regular files are skipped.
    pub fn backup_original(
        &self,
        collector: &str,
        config_file: &Path,
    ) -> Result<Option<PathBuf>> {
        let backup = paths::backup_file(&self.etc, collector, config_file);
        if backup.exists() || self.record_path(collector, config_file).exists() {
            return Ok(None);
        }
        match std::fs::metadata(config_file) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let data = std::fs::read(config_file)?;
        crate::io::write_private(&backup, &data)?;
        Ok(Some(backup))
    }

    /// Compare a tracked file against its baseline and report drift once.
    pub async fn verify_config(
        &self,
        collector: &str,
        config_file: &Path,
    ) -> Result<VerifyOutcome> {
        let record_path = self.record_path(collector, config_file);

        let Some(mut record) = TrackerRecord::load(&record_path)? else {
            debug!(collector, path = %config_file.display(), "no config to track");
            return Ok(VerifyOutcome::Untracked);
        };

        if !record.path.as_os_str().is_empty() && record.path != config_file {
            warn!(
                collector,
                path = %config_file.display(),
                recorded = %record.path.display(),
                "tracker record belongs to another file"
            );
            return Ok(VerifyOutcome::Untracked);
        }

        if record.modified {
            return Ok(VerifyOutcome::AlreadyReported);
        }

        if record.collector_id.is_empty()
            || record.assignment_id.is_empty()
            || record.checksum.is_empty()
        {
            return Err(AgentError::IncompleteTracking(record_path.display().to_string()));
        }

        if !config_file.exists() {
            warn!(collector, path = %config_file.display(), "tracked config file missing");
            return Ok(VerifyOutcome::Untracked);
        }

        let current = checksum_file(config_file)?;
        if current == record.checksum {
            return Ok(VerifyOutcome::Unchanged);
        }

        let path = format!(
            "collector/{}/config_assignment/{}",
            record.collector_id, record.assignment_id
        );
        match self
            .client
            .put_json(&path, &ModifiedStatus { status: "modified" })
            .await
        {
            Ok(_) => {}
            Err(AgentError::Unauthorized) => {
                self.registration.refresh().await?;
                return Err(AgentError::Unauthorized);
            }
            Err(e) => return Err(e),
        }

        warn!(
            collector,
            id = %record.assignment_id,
            curr = %current,
            orig = %record.checksum,
            "file modified"
        );

        record.modified = true;
        record.save(&record_path)?;

        if let Some(n) = &self.notifications {
            n.mark(collector);
        }
        Ok(VerifyOutcome::Reported)
    }

    /// Files with a record for `collector`, in addition to `known`.
    pub fn tracked_files(
        &self,
        collector: &str,
        known: impl IntoIterator<Item = PathBuf>,
    ) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = known.into_iter().collect();

        let dir = paths::tracking_dir(&self.etc, collector);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return files;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(RECORD_SUFFIX) {
                continue;
            }
            match TrackerRecord::load(&entry.path()) {
                Ok(Some(r)) if !r.path.as_os_str().is_empty() => {
                    if !files.contains(&r.path) {
                        files.push(r.path);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(
                    collector,
                    record = %entry.path().display(),
                    error = %e,
                    "unreadable tracker record"
                ),
            }
        }
        files
    }

    /// One pass over every file of one collector. Per-file failures are
    /// logged and do not stop the pass.
    pub async fn verify_collector(
        &self,
        collector: &str,
        known: impl IntoIterator<Item = PathBuf>,
    ) -> Vec<(PathBuf, Result<VerifyOutcome>)> {
        let mut out = Vec::new();
        for file in self.tracked_files(collector, known) {
            let res = self.verify_config(collector, &file).await;
            match &res {
                Ok(VerifyOutcome::Reported) => {
                    info!(collector, path = %file.display(), "drift reported")
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(collector, path = %file.display(), error = %e, "config tracking issue")
                }
            }
            out.push((file, res));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::inventory::InstalledCollector;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        tracker: Tracker,
        config: PathBuf,
    }

    fn fixture(api: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let etc = dir.path().join("etc");
        InstalledCollectors(vec![InstalledCollector {
            collector_id: "c-1".to_string(),
            collector_type_id: "telegraf".to_string(),
        }])
        .save(&paths::installed_path(&etc))
        .unwrap();
        let creds = Credentials::new(&etc);
        creds.save_jwt("jwt-1").unwrap();
        creds.save_refresh_token("rt-1").unwrap();
        creds.save_manager_id("m-1").unwrap();

        let client = ApiClient::new(api, Duration::from_secs(5), "jwt-1").unwrap();
        let tracker = Tracker::new(&etc, client.clone(), Registration::new(client, creds));

        let config = dir.path().join("telegraf.conf");
        std::fs::write(&config, "[agent]\n").unwrap();
        Fixture { dir, tracker, config }
    }

    #[test]
    fn checksum_is_sha256_hex() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("x");
        std::fs::write(&f, "abc").unwrap();
        assert_eq!(
            checksum_file(&f).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn update_round_trip() {
        let fx = fixture("http://127.0.0.1:9");
        let rec = fx
            .tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        assert_eq!(rec.checksum, checksum_file(&fx.config).unwrap());
        assert_eq!(rec.collector_id, "c-1");
        assert!(!rec.modified);

        let stored = TrackerRecord::load(&fx.tracker.record_path("telegraf", &fx.config))
            .unwrap()
            .unwrap();
        assert_eq!(stored, rec);
        assert_eq!(B64.decode(&stored.snapshot).unwrap(), b"[agent]\n");
        assert!(fx
            .tracker
            .record_path("telegraf", &fx.config)
            .starts_with(fx.dir.path().join("etc/configs/telegraf")));
    }

    #[tokio::test]
    async fn verify_is_idempotent_without_network() {
        let fx = fixture("http://127.0.0.1:9");
        fx.tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        for _ in 0..3 {
            assert_eq!(
                fx.tracker.verify_config("telegraf", &fx.config).await.unwrap(),
                VerifyOutcome::Unchanged
            );
        }
    }

    #[tokio::test]
    async fn untracked_file_is_skipped() {
        let fx = fixture("http://127.0.0.1:9");
        assert_eq!(
            fx.tracker.verify_config("telegraf", &fx.config).await.unwrap(),
            VerifyOutcome::Untracked
        );
    }

    #[tokio::test]
    async fn drift_reported_exactly_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/collector/c-1/config_assignment/a1")
            .match_header("authorization", "Bearer jwt-1")
            .match_body(mockito::Matcher::Json(serde_json::json!({"status": "modified"})))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let fx = fixture(&server.url());
        let pending = PendingNotifications::new();
        let tracker = fx.tracker.clone().with_notifications(pending.clone());
        tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        std::fs::write(&fx.config, "[agent]\nhostname = \"x\"\n").unwrap();

        assert_eq!(
            tracker.verify_config("telegraf", &fx.config).await.unwrap(),
            VerifyOutcome::Reported
        );
        for _ in 0..3 {
            assert_eq!(
                tracker.verify_config("telegraf", &fx.config).await.unwrap(),
                VerifyOutcome::AlreadyReported
            );
        }
        mock.assert_async().await;
        assert!(pending.take("telegraf"));

        // a fresh install starts a new episode
        let rec = tracker
            .update_config("telegraf", "a2", &fx.config, b"[agent]\nhostname = \"x\"\n")
            .unwrap();
        assert!(!rec.modified);
        assert_eq!(rec.collector_id, "c-1");
    }

    #[tokio::test]
    async fn server_error_keeps_modified_false() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/collector/c-1/config_assignment/a1")
            .with_status(500)
            .create_async()
            .await;

        let fx = fixture(&server.url());
        fx.tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        std::fs::write(&fx.config, "changed").unwrap();

        let err = fx.tracker.verify_config("telegraf", &fx.config).await.unwrap_err();
        assert!(matches!(err, AgentError::Http { status: 500, .. }));
        let rec = TrackerRecord::load(&fx.tracker.record_path("telegraf", &fx.config))
            .unwrap()
            .unwrap();
        assert!(!rec.modified);
    }

    #[tokio::test]
    async fn unauthorized_refreshes_and_retries_next_cycle() {
        let mut server = mockito::Server::new_async().await;
        let denied = server
            .mock("PUT", "/collector/c-1/config_assignment/a1")
            .match_header("authorization", "Bearer jwt-1")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let register = server
            .mock("POST", "/manager/register")
            .with_status(200)
            .with_body(r#"{"access_token":"jwt-2","refresh_token":"rt-2"}"#)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("PUT", "/collector/c-1/config_assignment/a1")
            .match_header("authorization", "Bearer jwt-2")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let fx = fixture(&server.url());
        fx.tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        std::fs::write(&fx.config, "changed").unwrap();

        let err = fx.tracker.verify_config("telegraf", &fx.config).await.unwrap_err();
        assert!(matches!(err, AgentError::Unauthorized));
        assert_eq!(
            fx.tracker.verify_config("telegraf", &fx.config).await.unwrap(),
            VerifyOutcome::Reported
        );

        denied.assert_async().await;
        register.assert_async().await;
        accepted.assert_async().await;
    }

    #[test]
    fn tracked_files_include_recorded_paths() {
        let fx = fixture("http://127.0.0.1:9");
        fx.tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        let other = PathBuf::from("/etc/telegraf/telegraf.d/inputs.conf");
        let files = fx.tracker.tracked_files("telegraf", [other.clone(), fx.config.clone()]);
        assert_eq!(files, vec![other, fx.config.clone()]);
    }

    #[tokio::test]
    async fn same_base_name_files_are_tracked_apart() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let fx = fixture(&server.url());
        let a = fx.dir.path().join("a/config.yaml");
        let b = fx.dir.path().join("b/config.yaml");
        for (file, id, body) in [(&a, "a1", "sources: {}\n"), (&b, "a2", "sinks: {}\n")] {
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, body).unwrap();
            fx.tracker
                .update_config("telegraf", id, file, body.as_bytes())
                .unwrap();
        }

        for file in [&a, &b] {
            assert_eq!(
                fx.tracker.verify_config("telegraf", file).await.unwrap(),
                VerifyOutcome::Unchanged
            );
        }
        let mut files = fx.tracker.tracked_files("telegraf", []);
        files.sort();
        assert_eq!(files, vec![a, b]);
        put.assert_async().await;
    }

    #[tokio::test]
    async fn record_for_another_path_is_ignored() {
        let fx = fixture("http://127.0.0.1:9");
        let rec = fx
            .tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        let elsewhere = fx.dir.path().join("other/telegraf.conf");
        std::fs::create_dir_all(elsewhere.parent().unwrap()).unwrap();
        std::fs::write(&elsewhere, "changed").unwrap();
        rec.save(&fx.tracker.record_path("telegraf", &elsewhere))
            .unwrap();

        assert_eq!(
            fx.tracker.verify_config("telegraf", &elsewhere).await.unwrap(),
            VerifyOutcome::Untracked
        );
    }

    #[test]
    fn first_install_backs_up_original_once() {
        let fx = fixture("http://127.0.0.1:9");
        let backup = fx
            .tracker
            .backup_original("telegraf", &fx.config)
            .unwrap()
            .expect("existing file is backed up");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "[agent]\n");
        assert!(backup.starts_with(fx.dir.path().join("etc/configs/telegraf/backup")));

        std::fs::write(&fx.config, "managed").unwrap();
        fx.tracker
            .update_config("telegraf", "a1", &fx.config, b"managed")
            .unwrap();
        assert_eq!(fx.tracker.backup_original("telegraf", &fx.config).unwrap(), None);
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "[agent]\n");
    }

    #[test]
    fn backup_skips_missing_and_already_managed_files() {
        let fx = fixture("http://127.0.0.1:9");
        let missing = fx.dir.path().join("absent.conf");
        assert_eq!(fx.tracker.backup_original("telegraf", &missing).unwrap(), None);
        assert_eq!(
            fx.tracker.backup_original("telegraf", fx.dir.path()).unwrap(),
            None
        );

        fx.tracker
            .update_config("telegraf", "a1", &fx.config, b"[agent]\n")
            .unwrap();
        assert_eq!(fx.tracker.backup_original("telegraf", &fx.config).unwrap(), None);
        assert!(!fx.dir.path().join("etc/configs/telegraf/backup").exists());
    }
}
