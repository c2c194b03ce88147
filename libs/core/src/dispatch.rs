//! Sequential batch driver: send, report, archive or delete, pause.
use crate::error::{RunError, SideEffectError};
use crate::exchange::{ExchangeClient, ExchangeOutcome};
use crate::log::SharedEventLog;
use crate::source::{SourceKind, WorkItem};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

/// Pause between two consecutive sends.
pub const DEFAULT_PACE: Duration = Duration::from_millis(300);

/// Tallies of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Files moved to the backup directory.
    pub archived: usize,
    /// Files removed, either after a failed exchange or a failed move.
    pub deleted: usize,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

pub struct Dispatcher<W: Write> {
    log: SharedEventLog,
    console: W,
    pace: Duration,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(log: SharedEventLog, console: W) -> Self {
        Self {
            log,
            console,
            pace: DEFAULT_PACE,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn console(&self) -> &W {
        &self.console
    }

    /// Connects, runs the batch and disconnects. The disconnect happens on every path, including
    /// a failed connect that left some queues open.
    pub async fn run_scoped<I>(
        &mut self,
        client: &mut ExchangeClient,
        items: I,
        kind: &SourceKind,
    ) -> Result<BatchReport, RunError>
    where
        I: IntoIterator<Item = WorkItem>,
    {
        let result = match client.connect().await {
            Ok(()) => Ok(self.run(client, items, kind).await),
            Err(err) => Err(RunError::Connection(err)),
        };
        client.disconnect().await;
        result
    }

    /// Processes every item in order. Per-item failures are reported and never stop the batch.
    pub async fn run<I>(
        &mut self,
        client: &mut ExchangeClient,
        items: I,
        kind: &SourceKind,
    ) -> BatchReport
    where
        I: IntoIterator<Item = WorkItem>,
    {
        let mut report = BatchReport::default();
        let mut items = items.into_iter().peekable();
        while let Some(item) = items.next() {
            let outcome = client.send_message(&item.payload, &item.tag).await;
            self.report(&item, &outcome);
            report.processed += 1;
            match &outcome {
                Ok(_) => report.succeeded += 1,
                Err(_) => report.failed += 1,
            }

            if let (SourceKind::Directory { backup_dir }, Some(origin)) = (kind, &item.origin) {
                if outcome.is_ok() {
                    self.archive(origin, backup_dir, &mut report).await;
                } else {
                    self.remove(origin, &mut report).await;
                }
            }

            if items.peek().is_some() && !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }
        report
    }

    fn report(&mut self, item: &WorkItem, outcome: &ExchangeOutcome) {
        let (status, answer) = match outcome {
            Ok(reply) => ("success", reply.clone()),
            Err(err) => ("failure", err.to_string()),
        };
        let line = format!("->[{}]{}\n<-{}", item.tag, item.payload, answer);
        self.print(&format!("{status}\n{line}"));
        if outcome.is_ok() {
            self.log.info(&line);
        } else {
            self.log.warn(&line);
        }
    }

    fn print(&mut self, text: &str) {
        if let Err(err) = writeln!(self.console, "{text}") {
            self.log.debug(&format!("console write failed: {err}"));
        }
    }

    async fn archive(&mut self, origin: &Path, backup_dir: &Path, report: &mut BatchReport) {
        match move_to_backup(origin, backup_dir).await {
            Ok(()) => {
                self.log.info("Move trx to backup");
                report.archived += 1;
            }
            Err(err) => {
                self.print(&format!("Move to backup failed, {err}"));
                self.log.warn(&format!("Move trx to backup failed, {err}"));
                self.remove(origin, report).await;
            }
        }
    }

    async fn remove(&mut self, origin: &Path, report: &mut BatchReport) {
        match delete_file(origin).await {
            Ok(()) => report.deleted += 1,
            Err(err) => self.log.warn(&err.to_string()),
        }
    }
}

/// Moves `origin` into `backup_dir` under the same file name. Falls back to copy and remove when
/// a rename is not possible, e.g. across file systems. An existing backup is never replaced.
pub async fn move_to_backup(origin: &Path, backup_dir: &Path) -> Result<(), SideEffectError> {
    let target = backup_dir.join(origin.file_name().unwrap_or(origin.as_os_str()));
    let move_err = |source| SideEffectError::Move {
        from: origin.to_path_buf(),
        to: target.clone(),
        source,
    };
    if tokio::fs::try_exists(&target).await.map_err(move_err)? {
        return Err(move_err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "backup file already exists",
        )));
    }
    if tokio::fs::rename(origin, &target).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(origin, &target).await.map_err(move_err)?;
    tokio::fs::remove_file(origin).await.map_err(move_err)?;
    Ok(())
}

pub async fn delete_file(path: &Path) -> Result<(), SideEffectError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|source| SideEffectError::Delete {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::exchange::SENT_WITHOUT_REPLY;
    use crate::log::MemoryEventLog;
    use smq_bus::{Fault, InMemoryTransport};
    use std::sync::Arc;
    use tempfile::tempdir;
    use tracing::Level;

    fn session(need_reply: bool) -> SessionConfig {
        let mut cfg = SessionConfig::new("QM1", "GATEWAY.Q", "REPLY.Q", "mfguser");
        cfg.need_reply = need_reply;
        cfg.wait_reply_interval = Duration::from_millis(200);
        cfg
    }

    fn setup(
        transport: &InMemoryTransport,
        need_reply: bool,
    ) -> (ExchangeClient, Dispatcher<Vec<u8>>, MemoryEventLog) {
        let log = MemoryEventLog::new();
        let shared: SharedEventLog = Arc::new(log.clone());
        let client = ExchangeClient::new(
            Arc::new(transport.clone()),
            session(need_reply),
            shared.clone(),
        );
        (client, Dispatcher::new(shared, Vec::new()), log)
    }

    fn console(dispatcher: &Dispatcher<Vec<u8>>) -> String {
        String::from_utf8_lossy(dispatcher.console()).into_owned()
    }

    #[tokio::test(start_paused = true)]
    async fn direct_items_are_paced_and_logged() {
        let transport = InMemoryTransport::new();
        let (mut client, mut dispatcher, log) = setup(&transport, false);
        let items = vec![
            WorkItem::direct("TAG1", "hello"),
            WorkItem::direct("TAG1", "world"),
        ];

        let report = dispatcher
            .run_scoped(&mut client, items, &SourceKind::Direct)
            .await
            .unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 2);

        let published = transport.published().await;
        assert_eq!(published.len(), 2);
        assert!(published[1].at.duration_since(published[0].at) >= DEFAULT_PACE);

        let infos = log.at(Level::INFO);
        assert!(infos.contains(&format!("->[TAG1]hello\n<-{SENT_WITHOUT_REPLY}")));
        assert!(infos.contains(&format!("->[TAG1]world\n<-{SENT_WITHOUT_REPLY}")));
        assert_eq!(
            console(&dispatcher),
            format!(
                "success\n->[TAG1]hello\n<-{SENT_WITHOUT_REPLY}\nsuccess\n->[TAG1]world\n<-{SENT_WITHOUT_REPLY}\n"
            )
        );
        assert!(!client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn no_pause_after_last_item() {
        let transport = InMemoryTransport::echo();
        let (mut client, mut dispatcher, _log) = setup(&transport, true);
        client.connect().await.unwrap();

        let started = tokio::time::Instant::now();
        dispatcher
            .run(
                &mut client,
                vec![WorkItem::direct("T", "only")],
                &SourceKind::Direct,
            )
            .await;
        assert!(started.elapsed() < DEFAULT_PACE);
    }

    #[tokio::test]
    async fn successful_file_item_is_archived() {
        let resource = tempdir().unwrap();
        let backup = tempdir().unwrap();
        let file = resource.path().join("[ABC123]note.trx");
        std::fs::write(&file, "ping").unwrap();

        let transport = InMemoryTransport::echo();
        let (mut client, mut dispatcher, log) = setup(&transport, true);
        let kind = SourceKind::Directory {
            backup_dir: backup.path().to_path_buf(),
        };
        let item = WorkItem {
            tag: "ABC123".into(),
            payload: "ping".into(),
            origin: Some(file.clone()),
        };

        let report = dispatcher
            .run_scoped(&mut client, vec![item], &kind)
            .await
            .unwrap();
        assert_eq!(report.archived, 1);
        assert!(!file.exists());
        assert!(backup.path().join("[ABC123]note.trx").exists());
        assert!(log.at(Level::INFO).contains(&"Move trx to backup".to_string()));
        assert!(console(&dispatcher).starts_with("success\n->[ABC123]ping\n<-ping"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_file_item_is_deleted() {
        let resource = tempdir().unwrap();
        let backup = tempdir().unwrap();
        let file = resource.path().join("[T]late.trx");
        std::fs::write(&file, "no answer").unwrap();

        let transport = InMemoryTransport::new();
        let (mut client, mut dispatcher, log) = setup(&transport, true);
        let kind = SourceKind::Directory {
            backup_dir: backup.path().to_path_buf(),
        };
        let item = WorkItem {
            tag: "T".into(),
            payload: "no answer".into(),
            origin: Some(file.clone()),
        };

        let report = dispatcher
            .run_scoped(&mut client, vec![item], &kind)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 1);
        assert!(!file.exists());
        assert!(!backup.path().join("[T]late.trx").exists());
        assert_eq!(log.at(Level::WARN).len(), 1);
        assert!(console(&dispatcher).starts_with("failure\n->[T]no answer\n<-[Error][get]"));
    }

    #[tokio::test]
    async fn failed_backup_falls_back_to_delete() {
        let resource = tempdir().unwrap();
        let file = resource.path().join("[T]x.trx");
        std::fs::write(&file, "ping").unwrap();
        let missing_backup = resource.path().join("no-such-dir");

        let transport = InMemoryTransport::echo();
        let (mut client, mut dispatcher, log) = setup(&transport, true);
        let kind = SourceKind::Directory {
            backup_dir: missing_backup,
        };
        let item = WorkItem {
            tag: "T".into(),
            payload: "ping".into(),
            origin: Some(file.clone()),
        };

        let report = dispatcher
            .run_scoped(&mut client, vec![item], &kind)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.archived, 0);
        assert_eq!(report.deleted, 1);
        assert!(!file.exists());
        assert!(console(&dispatcher).contains("Move to backup failed, "));
        assert!(log.at(Level::WARN)[0].starts_with("Move trx to backup failed, "));
    }

    #[tokio::test]
    async fn existing_backup_is_kept_and_new_file_deleted() {
        let resource = tempdir().unwrap();
        let backup = tempdir().unwrap();
        let file = resource.path().join("[T]dup.trx");
        std::fs::write(&file, "new").unwrap();
        let archived = backup.path().join("[T]dup.trx");
        std::fs::write(&archived, "old").unwrap();

        let transport = InMemoryTransport::echo();
        let (mut client, mut dispatcher, log) = setup(&transport, true);
        let kind = SourceKind::Directory {
            backup_dir: backup.path().to_path_buf(),
        };
        let item = WorkItem {
            tag: "T".into(),
            payload: "new".into(),
            origin: Some(file.clone()),
        };

        let report = dispatcher
            .run_scoped(&mut client, vec![item], &kind)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.archived, 0);
        assert_eq!(report.deleted, 1);
        assert!(!file.exists());
        assert_eq!(std::fs::read_to_string(&archived).unwrap(), "old");
        assert!(console(&dispatcher).contains("Move to backup failed, "));
        assert!(log.at(Level::WARN)[0].starts_with("Move trx to backup failed, "));
    }

    struct BrokenConsole;

    impl Write for BrokenConsole {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn console_write_failures_are_logged_and_ignored() {
        let resource = tempdir().unwrap();
        let file = resource.path().join("[T]x.trx");
        std::fs::write(&file, "ping").unwrap();

        let transport = InMemoryTransport::echo();
        let (mut client, _unused, log) = setup(&transport, true);
        let shared: SharedEventLog = Arc::new(log.clone());
        let mut dispatcher = Dispatcher::new(shared, BrokenConsole);
        let kind = SourceKind::Directory {
            backup_dir: resource.path().join("no-such-dir"),
        };
        let item = WorkItem {
            tag: "T".into(),
            payload: "ping".into(),
            origin: Some(file.clone()),
        };

        let report = dispatcher
            .run_scoped(&mut client, vec![item], &kind)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.deleted, 1);
        let failures: Vec<_> = log
            .at(Level::DEBUG)
            .into_iter()
            .filter(|line| line.starts_with("console write failed: "))
            .collect();
        assert_eq!(failures.len(), 2);
    }

    #[tokio::test]
    async fn put_failure_does_not_stop_the_batch() {
        let transport = InMemoryTransport::echo();
        let (mut client, dispatcher, _log) = setup(&transport, true);
        let mut dispatcher = dispatcher.with_pace(Duration::ZERO);
        client.connect().await.unwrap();
        transport.inject(Fault::Put).await;

        let report = dispatcher
            .run(
                &mut client,
                vec![WorkItem::direct("T", "a"), WorkItem::direct("T", "b")],
                &SourceKind::Direct,
            )
            .await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 2);
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn connect_failure_aborts_and_still_disconnects() {
        let transport = InMemoryTransport::new();
        transport.inject(Fault::OpenQueue("REPLY.Q".into())).await;
        let (mut client, mut dispatcher, _log) = setup(&transport, true);

        let err = dispatcher
            .run_scoped(
                &mut client,
                vec![WorkItem::direct("T", "a")],
                &SourceKind::Direct,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Connection(_)));
        assert!(transport.published().await.is_empty());
        assert!(console(&dispatcher).is_empty());
        assert!(matches!(
            transport.events().await.last(),
            Some(smq_bus::BusEvent::Disconnected { .. })
        ));
    }
}
