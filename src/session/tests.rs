use super::*;
use crate::error::CacheError;
use crate::oracle::Position;
use crate::types::SymbolKind;
use std::collections::HashSet;
use std::fs;
use std::sync::Mutex as StdMutex;
use tempfile::TempDir;

/// In-memory oracle keyed by file base name
#[derive(Default)]
struct FakeOracle {
    symbols: HashMap<String, String>,
    references: HashMap<(String, u32), String>,
    failing_symbols: HashSet<String>,
    failing_references: HashSet<(String, u32)>,
    symbol_calls: StdMutex<HashMap<String, usize>>,
}

impl FakeOracle {
    fn symbol_calls(&self, file: &str) -> usize {
        self.symbol_calls
            .lock()
            .unwrap()
            .get(file)
            .copied()
            .unwrap_or(0)
    }
}

fn base_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl Oracle for FakeOracle {
    async fn list_symbols(&self, path: &Path) -> std::result::Result<String, OracleError> {
        let name = base_name(path);
        *self
            .symbol_calls
            .lock()
            .unwrap()
            .entry(name.clone())
            .or_default() += 1;
        if self.failing_symbols.contains(&name) {
            return Err(OracleError::NonZeroExit {
                command: "fake symbols".to_string(),
                status: "exit status: 2".to_string(),
                output: "parse error".to_string(),
            });
        }
        Ok(self.symbols.get(&name).cloned().unwrap_or_default())
    }

    async fn list_references(
        &self,
        path: &Path,
        position: &Position,
    ) -> std::result::Result<String, OracleError> {
        let key = (base_name(path), position.line);
        if self.failing_references.contains(&key) {
            return Err(OracleError::Timeout {
                command: "fake references".to_string(),
                secs: 1,
            });
        }
        Ok(self.references.get(&key).cloned().unwrap_or_default())
    }
}

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let project = Self {
            dir: TempDir::new().unwrap(),
        };
        for file in ["qf/repo.go", "qf/course.go", "web/server.go", "README.md"] {
            project.write(file);
        }
        project
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, relative: &str) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "package x\n").unwrap();
        self.set_mtime(relative, 1_700_000_000);
    }

    fn set_mtime(&self, relative: &str, secs: i64) {
        filetime::set_file_mtime(
            self.root().join(relative),
            filetime::FileTime::from_unix_time(secs, 0),
        )
        .unwrap();
    }

    fn location(&self, relative: &str, line: u32, cols: &str) -> String {
        format!("{}:{}:{}", self.root().join(relative).display(), line, cols)
    }

    fn oracle(&self) -> FakeOracle {
        let mut oracle = FakeOracle::default();
        oracle.symbols.insert(
            "repo.go".to_string(),
            "Repo Struct 3:6-3:10\nOpen Function 10:6-10:10\nRepo.Close Method 20:16-20:21\n"
                .to_string(),
        );
        oracle.symbols.insert(
            "course.go".to_string(),
            "NewCourse Function 5:6-5:15\nenroll Function 15:6-15:12\n".to_string(),
        );
        oracle
            .symbols
            .insert("server.go".to_string(), "Serve Function 8:6-8:11\n".to_string());

        oracle.references.insert(
            ("repo.go".to_string(), 10),
            [
                self.location("web/server.go", 12, "3-7"),
                self.location("qf/course.go", 7, "2-6"),
                self.location("qf/course.go", 2, "1-5"),
            ]
            .join("\n"),
        );
        oracle.references.insert(
            ("repo.go".to_string(), 20),
            self.location("qf/repo.go", 14, "2-7"),
        );
        oracle.references.insert(
            ("course.go".to_string(), 5),
            self.location("web/server.go", 9, "1-3"),
        );
        oracle
    }

    fn session(&self, oracle: FakeOracle) -> (IndexingSession, Arc<FakeOracle>) {
        let oracle = Arc::new(oracle);
        let session =
            IndexingSession::with_oracle(Config::default(), self.root(), oracle.clone()).unwrap();
        (session, oracle)
    }
}

#[tokio::test]
async fn test_scan_indexes_eligible_files() {
    let project = Project::new();
    let (session, _) = project.session(project.oracle());

    let report = session.scan(ScanRequest::all()).await.unwrap();
    assert_eq!(report.indexed, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.references_resolved, 0);
    assert!(report.unused.is_empty());

    let cache = session.cache().await;
    assert_eq!(cache.len(), 3);
    let repo = cache.get("repo.go").unwrap();
    assert_eq!(repo.path, "qf/repo.go");
    assert_eq!(repo.mod_time, 1_700_000_000);
    assert!(!repo.references_scanned);
    let names: Vec<&str> = repo.symbols.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Repo", "Open", "Close"]);

    // Persisted under the project state directory
    let reloaded = IndexCache::load(&project.root().join(".refmap/cache.json")).unwrap();
    assert_eq!(reloaded.len(), 3);
}

#[tokio::test]
async fn test_second_scan_skips_unchanged_files() {
    let project = Project::new();
    let (session, oracle) = project.session(project.oracle());

    session.scan(ScanRequest::all()).await.unwrap();
    let report = session.scan(ScanRequest::all()).await.unwrap();
    assert_eq!(report.indexed, 0);
    assert_eq!(report.skipped, 3);
    assert_eq!(oracle.symbol_calls("repo.go"), 1);
}

#[tokio::test]
async fn test_modified_file_is_reindexed() {
    let project = Project::new();
    let (session, _) = project.session(project.oracle());
    session.scan(ScanRequest::all()).await.unwrap();

    project.set_mtime("qf/course.go", 1_700_000_500);
    let report = session.scan(ScanRequest::all()).await.unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(
        session.cache().await.get("course.go").unwrap().mod_time,
        1_700_000_500
    );
}

#[tokio::test]
async fn test_force_reindexes_everything() {
    let project = Project::new();
    let (session, oracle) = project.session(project.oracle());
    session.scan(ScanRequest::all()).await.unwrap();

    let report = session.scan(ScanRequest::all().force(true)).await.unwrap();
    assert_eq!(report.indexed, 3);
    assert_eq!(oracle.symbol_calls("server.go"), 2);
}

#[tokio::test]
async fn test_reference_scan_attributes_across_files() {
    let project = Project::new();
    let (session, _) = project.session(project.oracle());

    let report = session
        .scan(ScanRequest::all().with_references(true))
        .await
        .unwrap();
    assert_eq!(report.indexed, 3);
    // Open: Serve + NewCourse, Close: Open, NewCourse: Serve
    assert_eq!(report.references_resolved, 4);
    // course.go:2 precedes every function in course.go
    assert_eq!(report.unattributed_references, 1);
    assert_eq!(
        report.unused,
        vec!["qf/course.go:enroll", "qf/repo.go:Repo", "web/server.go:Serve"]
    );

    let cache = session.cache().await;
    let repo = cache.get("repo.go").unwrap();
    assert!(repo.references_scanned);

    let open = repo.symbols.iter().find(|d| d.name == "Open").unwrap();
    let enclosing: Vec<&str> = open
        .references
        .iter()
        .map(|r| r.enclosing_symbol_name.as_str())
        .collect();
    assert_eq!(enclosing, vec!["Serve", "NewCourse"]);
    assert_eq!(open.references[0].folder_name, "web");
    assert_eq!(open.references[0].file_name, "server.go");
    assert!(!open.zero_references);

    let close = repo.symbols.iter().find(|d| d.name == "Close").unwrap();
    assert_eq!(close.kind, SymbolKind::Method);
    assert_eq!(close.references[0].enclosing_symbol_name, "Open");

    let repo_struct = repo.symbols.iter().find(|d| d.name == "Repo").unwrap();
    assert!(repo_struct.zero_references);
}

#[tokio::test]
async fn test_lazy_indexing_of_referencing_files() {
    let project = Project::new();
    let (session, oracle) = project.session(project.oracle());

    let report = session
        .scan(ScanRequest::path("qf/repo.go").with_references(true))
        .await
        .unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.references_resolved, 3);

    // Referencing files were indexed on demand, once each, without references
    let cache = session.cache().await;
    let course = cache.get("course.go").unwrap();
    assert_eq!(course.path, "qf/course.go");
    assert!(!course.references_scanned);
    assert!(course.symbols.iter().all(|d| d.references.is_empty()));
    assert!(!cache.get("server.go").unwrap().references_scanned);
    assert_eq!(oracle.symbol_calls("course.go"), 1);

    // A reference scan picks up the lazily indexed entries again
    let report = session
        .scan(ScanRequest::all().with_references(true))
        .await
        .unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.skipped, 1);
    assert!(session.cache().await.get("course.go").unwrap().references_scanned);
}

#[tokio::test]
async fn test_plain_scan_reuses_reference_entries() {
    let project = Project::new();
    let (session, _) = project.session(project.oracle());

    session
        .scan(ScanRequest::all().with_references(true))
        .await
        .unwrap();
    let report = session.scan(ScanRequest::all()).await.unwrap();
    assert_eq!(report.skipped, 3);
    assert!(session.cache().await.get("repo.go").unwrap().references_scanned);
}

#[tokio::test]
async fn test_symbol_oracle_failure_is_recorded() {
    let project = Project::new();
    let mut oracle = project.oracle();
    oracle.failing_symbols.insert("server.go".to_string());
    let (session, _) = project.session(oracle);

    let report = session.scan(ScanRequest::all()).await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 1);
    assert!(session.cache().await.get("server.go").is_none());

    let records = session.error_log().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].command, "fake symbols");
    assert!(records[0].input.ends_with("server.go"));
    assert_eq!(records[0].output, "parse error");

    // Flushed at the end of the scan
    let persisted = ErrorLog::load(&project.root().join(".refmap/errors.json"));
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn test_reference_oracle_failure_marks_zero_references() {
    let project = Project::new();
    let mut oracle = project.oracle();
    oracle
        .failing_references
        .insert(("repo.go".to_string(), 10));
    let (session, _) = project.session(oracle);

    let report = session
        .scan(ScanRequest::path("qf/repo.go").with_references(true))
        .await
        .unwrap();
    assert_eq!(report.indexed, 1);
    assert!(report.unused.contains(&"qf/repo.go:Open".to_string()));

    let cache = session.cache().await;
    let open = cache
        .get("repo.go")
        .unwrap()
        .symbols
        .iter()
        .find(|d| d.name == "Open")
        .cloned()
        .unwrap();
    assert!(open.zero_references);
    assert!(open.references.is_empty());

    let records = session.error_log().records();
    assert_eq!(records.len(), 1);
    assert!(records[0].input.ends_with("repo.go:10:6-10"));
}

#[tokio::test]
async fn test_failed_lazy_lookup_drops_reference() {
    let project = Project::new();
    let mut oracle = project.oracle();
    oracle.failing_symbols.insert("course.go".to_string());
    let (session, oracle) = project.session(oracle);

    let report = session
        .scan(ScanRequest::path("qf/repo.go").with_references(true))
        .await
        .unwrap();
    // Serve and Open survive; both course.go sites are dropped
    assert_eq!(report.references_resolved, 2);
    assert_eq!(report.unattributed_references, 2);
    assert_eq!(oracle.symbol_calls("course.go"), 1);
    assert_eq!(session.error_log().len(), 1);
}

#[tokio::test]
async fn test_lazy_lookup_survives_cache_write_failure() {
    let project = Project::new();
    let (session, oracle) = project.session(project.oracle());

    // Cache document can no longer be read or replaced
    let document = project.root().join(".refmap/cache.json");
    let _ = fs::remove_file(&document);
    fs::create_dir_all(&document).unwrap();

    let run = RunContext::new(&session);
    let course = project.root().join("qf/course.go");
    let declarations = run.declarations_for(&course).await.unwrap();
    let names: Vec<&str> = declarations.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["NewCourse", "enroll"]);

    // Remembered for the rest of the run
    let again = run.declarations_for(&course).await.unwrap();
    assert_eq!(again.len(), 2);
    assert_eq!(oracle.symbol_calls("course.go"), 1);
    assert!(session.cache().await.get("course.go").is_none());
    assert!(session.error_log().is_empty());
}

#[tokio::test]
async fn test_explicit_targets() {
    let project = Project::new();
    let (session, _) = project.session(project.oracle());

    let err = session.scan(ScanRequest::path("README.md")).await.unwrap_err();
    assert!(matches!(
        err,
        RefmapError::Validation(ValidationError::IneligiblePath { .. })
    ));

    let err = session.scan(ScanRequest::path("qf/missing.go")).await.unwrap_err();
    assert!(matches!(
        err,
        RefmapError::Validation(ValidationError::PathNotFound(_))
    ));

    project.write("node_modules/pkg/a.ts");
    for target in ["node_modules", "node_modules/pkg"] {
        let err = session.scan(ScanRequest::path(target)).await.unwrap_err();
        assert!(matches!(
            err,
            RefmapError::Validation(ValidationError::IneligiblePath { .. })
        ));
    }
    assert!(session.cache().await.get("a.ts").is_none());

    let report = session.scan(ScanRequest::path("qf")).await.unwrap();
    assert_eq!(report.indexed, 2);
    assert!(session.cache().await.get("server.go").is_none());
}

#[tokio::test]
async fn test_cancelled_scan() {
    let project = Project::new();
    let (session, oracle) = project.session(project.oracle());

    let token = CancellationToken::new();
    token.cancel();
    let err = session
        .scan_with_cancellation(ScanRequest::all(), token)
        .await
        .unwrap_err();
    assert!(matches!(err, RefmapError::Cancelled));
    assert_eq!(oracle.symbol_calls("repo.go"), 0);
    assert!(session.cache().await.is_empty());
}

#[tokio::test]
async fn test_corrupt_cache_fails_session() {
    let project = Project::new();
    fs::create_dir_all(project.root().join(".refmap")).unwrap();
    fs::write(project.root().join(".refmap/cache.json"), "[oops").unwrap();

    let result = IndexingSession::with_oracle(
        Config::default(),
        project.root(),
        Arc::new(project.oracle()),
    );
    assert!(matches!(
        result,
        Err(RefmapError::Cache(CacheError::Corrupted { .. }))
    ));
}

#[tokio::test]
async fn test_hierarchy_and_maps() {
    let project = Project::new();
    let (session, _) = project.session(project.oracle());
    session
        .scan(ScanRequest::all().with_references(true))
        .await
        .unwrap();

    let root = session.hierarchy().await;
    let expected_name = project
        .root()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert_eq!(root.name, expected_name);
    assert_eq!(root.file_count(), 3);

    // Open is used from web/server.go (another folder) and qf/course.go (sibling file)
    let qf = root.folder_at("qf").unwrap();
    assert!(
        qf.references
            .iter()
            .any(|r| r.enclosing_symbol_name == "Serve")
    );
    let repo = qf.files.iter().find(|f| f.name == "repo.go").unwrap();
    assert!(
        repo.references
            .iter()
            .any(|r| r.enclosing_symbol_name == "NewCourse")
    );

    session.create_map("baseline").await.unwrap();
    assert_eq!(session.maps().list().unwrap(), vec!["baseline"]);
    assert_eq!(session.maps().load("baseline").unwrap(), root);
}

#[tokio::test]
async fn test_prune_and_clear_errors() {
    let project = Project::new();
    let mut oracle = project.oracle();
    oracle.failing_symbols.insert("server.go".to_string());
    let (session, _) = project.session(oracle);
    session.scan(ScanRequest::all()).await.unwrap();

    fs::remove_file(project.root().join("qf/course.go")).unwrap();
    assert_eq!(session.prune_cache().await.unwrap(), 1);
    assert_eq!(session.cache().await.len(), 1);

    session.clear_errors().unwrap();
    assert!(session.error_log().is_empty());
    assert!(ErrorLog::load(&project.root().join(".refmap/errors.json")).is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    let project = Project::new();
    let mut config = Config::default();
    config.indexing.workers = 0;
    let result = IndexingSession::with_oracle(config, project.root(), Arc::new(FakeOracle::default()));
    assert!(matches!(result, Err(RefmapError::Config(_))));
}
