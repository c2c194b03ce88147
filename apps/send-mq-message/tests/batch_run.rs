use smq_bus::{BusEvent, Fault, InMemoryTransport};
use smq_core::{
    AppConfig, BatchReport, DEFAULT_PACE, MemoryEventLog, Mode, PathConfig, RunError,
    SENT_WITHOUT_REPLY, SessionConfig, SharedEventLog,
};
use smq_send::{NO_RESOURCE_FILES, RunSummary, USAGE, execute};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tracing::Level;

fn config(mode: Mode, need_reply: bool, resource: &Path, backup: &Path) -> AppConfig {
    let mut session = SessionConfig::new("QM1", "GATEWAY.Q", "REPLY.Q", "mfguser");
    session.need_reply = need_reply;
    session.wait_reply_interval = Duration::from_millis(250);
    AppConfig {
        mode,
        session,
        paths: PathConfig {
            log_dir: None,
            resource_dir: Some(resource.to_path_buf()),
            backup_dir: Some(backup.to_path_buf()),
        },
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

struct Harness {
    transport: InMemoryTransport,
    log: MemoryEventLog,
    console: Vec<u8>,
}

impl Harness {
    fn new(transport: InMemoryTransport) -> Self {
        Self {
            transport,
            log: MemoryEventLog::new(),
            console: Vec::new(),
        }
    }

    async fn execute(
        &mut self,
        config: AppConfig,
        args: &[String],
    ) -> Result<RunSummary, RunError> {
        let log: SharedEventLog = Arc::new(self.log.clone());
        execute(
            config,
            args,
            Arc::new(self.transport.clone()),
            log,
            &mut self.console,
        )
        .await
    }

    fn console(&self) -> String {
        String::from_utf8_lossy(&self.console).into_owned()
    }

    async fn session_opened(&self) -> bool {
        self.transport
            .events()
            .await
            .iter()
            .any(|event| matches!(event, BusEvent::SessionOpened { .. }))
    }
}

#[tokio::test(start_paused = true)]
async fn direct_mode_sends_each_message_with_the_shared_tag() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::new(InMemoryTransport::new());
    let cfg = config(Mode::Cli, false, dir.path(), dir.path());

    let summary = harness
        .execute(cfg, &args(&["TAG1", "hello", "world"]))
        .await
        .unwrap();
    let RunSummary::Completed(report) = summary else {
        panic!("expected a completed batch, got {summary:?}");
    };
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);

    let published = harness.transport.published().await;
    let payloads: Vec<_> = published
        .iter()
        .map(|p| p.envelope.payload.as_str())
        .collect();
    assert_eq!(payloads, vec!["hello", "world"]);
    assert!(published
        .iter()
        .all(|p| p.envelope.application_id_data.as_deref() == Some("TAG1")));
    assert!(published[1].at.duration_since(published[0].at) >= DEFAULT_PACE);

    let outcomes: Vec<_> = harness
        .log
        .at(Level::INFO)
        .into_iter()
        .filter(|line| line.starts_with("->[TAG1]"))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            format!("->[TAG1]hello\n<-{SENT_WITHOUT_REPLY}"),
            format!("->[TAG1]world\n<-{SENT_WITHOUT_REPLY}"),
        ]
    );
    assert!(harness.console().starts_with("success\n->[TAG1]hello\n<-"));
}

#[tokio::test]
async fn two_arguments_override_file_mode() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::new(InMemoryTransport::echo());
    let cfg = config(Mode::File, true, dir.path(), dir.path());

    let summary = harness.execute(cfg, &args(&["T", "ping"])).await.unwrap();
    assert_eq!(
        summary,
        RunSummary::Completed(BatchReport {
            processed: 1,
            succeeded: 1,
            ..BatchReport::default()
        })
    );
    assert_eq!(harness.console(), "success\n->[T]ping\n<-ping\n");
}

#[tokio::test]
async fn cli_mode_with_one_argument_prints_usage() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::new(InMemoryTransport::echo());
    let cfg = config(Mode::Cli, true, dir.path(), dir.path());

    let summary = harness.execute(cfg, &args(&["TAG1"])).await.unwrap();
    assert_eq!(summary, RunSummary::Usage);
    assert!(harness.console().starts_with(USAGE));
    assert!(harness.console().contains("MFG_MQ_INI"));
    assert!(!harness.session_opened().await);
}

#[tokio::test]
async fn empty_resource_directory_skips_without_connecting() {
    let resource = tempdir().unwrap();
    let backup = tempdir().unwrap();
    std::fs::write(resource.path().join("notes.txt"), "ignored").unwrap();
    std::fs::write(resource.path().join("[T]empty.trx"), "").unwrap();
    let mut harness = Harness::new(InMemoryTransport::echo());
    let cfg = config(Mode::File, true, resource.path(), backup.path());

    let summary = harness.execute(cfg, &[]).await.unwrap();
    assert_eq!(summary, RunSummary::Skipped);
    assert_eq!(harness.console(), format!("[Warn]{NO_RESOURCE_FILES}\n"));
    assert_eq!(harness.log.at(Level::INFO), vec![NO_RESOURCE_FILES]);
    assert!(!harness.session_opened().await);
    assert!(resource.path().join("[T]empty.trx").exists());
}

#[tokio::test]
async fn file_mode_archives_replied_items_and_drops_unanswered_ones() {
    let resource = tempdir().unwrap();
    let backup = tempdir().unwrap();
    std::fs::write(resource.path().join("[A1]first.trx"), "ping").unwrap();
    std::fs::write(resource.path().join("[B2]second.trx"), "silent").unwrap();

    let transport = InMemoryTransport::with_responder(|env| {
        (env.payload != "silent")
            .then(|| smq_bus::ReplyMessage::new(env.message_id.clone(), "pong"))
    });
    let mut harness = Harness::new(transport);
    let cfg = config(Mode::File, true, resource.path(), backup.path());

    let summary = harness.execute(cfg, &[]).await.unwrap();
    let RunSummary::Completed(report) = summary else {
        panic!("expected a completed batch, got {summary:?}");
    };
    assert_eq!(report.processed, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.archived, 1);
    assert_eq!(report.deleted, 1);

    assert!(backup.path().join("[A1]first.trx").exists());
    assert!(!backup.path().join("[B2]second.trx").exists());
    assert_eq!(std::fs::read_dir(resource.path()).unwrap().count(), 0);

    let console = harness.console();
    assert!(console.contains("success\n->[A1]ping\n<-pong\n"));
    assert!(console.contains("failure\n->[B2]silent\n<-[Error][get]"));
    assert!(harness
        .log
        .at(Level::INFO)
        .contains(&"Move trx to backup".to_string()));
}

#[tokio::test]
async fn missing_resource_directory_is_fatal() {
    let root = tempdir().unwrap();
    let mut harness = Harness::new(InMemoryTransport::echo());
    let cfg = config(
        Mode::File,
        true,
        &root.path().join("missing"),
        root.path(),
    );

    let err = harness.execute(cfg, &[]).await.unwrap_err();
    assert!(matches!(err, RunError::Source(_)));
    assert!(!harness.session_opened().await);
}

#[tokio::test]
async fn connection_failure_is_fatal_and_releases_the_session() {
    let dir = tempdir().unwrap();
    let transport = InMemoryTransport::echo();
    transport.inject(Fault::OpenQueue("GATEWAY.Q".into())).await;
    let mut harness = Harness::new(transport);
    let cfg = config(Mode::Cli, true, dir.path(), dir.path());

    let err = harness
        .execute(cfg, &args(&["T", "ping"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Connection(_)));
    assert!(harness.console().is_empty());
    assert_eq!(
        harness.transport.events().await.last(),
        Some(&BusEvent::Disconnected {
            manager: "QM1".into()
        })
    );
}
