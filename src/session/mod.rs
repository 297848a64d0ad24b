//! Indexing session: the explicit context of one run.
//!
//! A session owns the declaration cache, the error log and the oracle handle
//! for a project root. Scans run files through a bounded worker pool; cache
//! commits are serialized through an async mutex (and, across processes, the
//! cache's file lock).

use crate::cache::{CacheEntry, IndexCache, modified_unix};
use crate::config::Config;
use crate::error::{OracleError, RefmapError, Result, ValidationError};
use crate::error_log::{ErrorLog, ErrorRecord};
use crate::hierarchy::{HierarchyBuilder, HierarchyNode};
use crate::indexer::{
    DeclarationSource, EligibilityPolicy, FileWalker, ReferenceResolver, SourceFile,
    SymbolExtractor,
};
use crate::maps::MapStore;
use crate::oracle::{
    CommandOracle, Oracle, REFERENCES_QUERY, SYMBOLS_QUERY, reference_query_input,
};
use crate::paths;
use crate::types::{Declaration, FileOutcome, FileStatus, ScanReport, ScanRequest};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Context object for indexing one project
pub struct IndexingSession {
    config: Arc<Config>,
    root: PathBuf,
    oracle: Arc<dyn Oracle>,
    extractor: SymbolExtractor,
    policy: EligibilityPolicy,
    cache: Arc<Mutex<IndexCache>>,
    error_log: Arc<ErrorLog>,
}

impl IndexingSession {
    /// Open a session for `root` using the configured external oracle
    pub fn new(config: Config, root: impl AsRef<Path>) -> Result<Self> {
        let root = absolute_root(root.as_ref())?;
        let oracle = Arc::new(CommandOracle::from_config(&config.oracle, &root));
        Self::with_oracle(config, root, oracle)
    }

    /// Open a session with a custom oracle implementation
    pub fn with_oracle(
        config: Config,
        root: impl AsRef<Path>,
        oracle: Arc<dyn Oracle>,
    ) -> Result<Self> {
        config.validate()?;
        let root = absolute_root(root.as_ref())?;
        if !root.is_dir() {
            return Err(ValidationError::PathNotFound(root.display().to_string()).into());
        }

        let policy = EligibilityPolicy::from_config(&config.indexing)?;

        let cache_path = config.storage.cache_path(&root);
        let cache = IndexCache::load(&cache_path)?;
        let error_log = ErrorLog::load(&config.storage.error_log_path(&root));

        tracing::info!(
            "Opened session for {:?} ({} cached files, cache at {:?})",
            root,
            cache.len(),
            cache_path
        );

        Ok(Self {
            config: Arc::new(config),
            extractor: SymbolExtractor::new(oracle.clone()),
            oracle,
            policy,
            root,
            cache: Arc::new(Mutex::new(cache)),
            error_log: Arc::new(error_log),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Snapshot of the cache as currently committed
    pub async fn cache(&self) -> IndexCache {
        self.cache.lock().await.clone()
    }

    /// Scan part or all of the project
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanReport> {
        self.scan_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Scan, stopping before the next file once `cancel_token` fires
    pub async fn scan_with_cancellation(
        &self,
        request: ScanRequest,
        cancel_token: CancellationToken,
    ) -> Result<ScanReport> {
        let start = Instant::now();
        tracing::info!(
            "Starting scan of {} (references: {}, force: {})",
            request
                .target
                .as_ref()
                .map_or_else(|| self.root.display().to_string(), |t| t.display().to_string()),
            request.with_references,
            request.force
        );

        let files = self.collect_files(&request, &cancel_token).await?;
        let run = RunContext::new(self);

        let outcomes: Vec<Result<FileOutcome>> = stream::iter(files)
            .map(|file| {
                let run = &run;
                let request = &request;
                let cancel_token = &cancel_token;
                async move {
                    if cancel_token.is_cancelled() {
                        return Err(RefmapError::Cancelled);
                    }
                    self.index_file(file, request, run).await
                }
            })
            .buffer_unordered(self.config.indexing.workers)
            .collect()
            .await;

        let mut report = ScanReport::default();
        let mut fatal = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => report.absorb(outcome),
                Err(RefmapError::Cancelled) => {}
                Err(e) if e.is_fatal() => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    tracing::warn!("File failed: {}", e);
                    report.absorb(FileOutcome::new(FileStatus::Failed));
                }
            }
        }

        if let Err(e) = self.error_log.flush() {
            tracing::warn!("Failed to persist error log: {}", e);
        }

        if let Some(e) = fatal {
            return Err(e);
        }
        if cancel_token.is_cancelled() {
            tracing::info!(
                "Scan cancelled after {} indexed, {} skipped",
                report.indexed,
                report.skipped
            );
            return Err(RefmapError::Cancelled);
        }

        report.unused.sort();
        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Scan complete: {} indexed, {} skipped, {} failed, {} references in {} ms",
            report.indexed,
            report.skipped,
            report.failed,
            report.references_resolved,
            report.duration_ms
        );
        Ok(report)
    }

    async fn collect_files(
        &self,
        request: &ScanRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Vec<SourceFile>> {
        let walker = FileWalker::new(&self.root, self.policy.clone())
            .with_gitignore(self.config.indexing.respect_gitignore)
            .with_cancellation(cancel_token.clone());

        let start = match &request.target {
            None => None,
            Some(target) => {
                let target = if target.is_absolute() {
                    paths::normalize(target)
                } else {
                    paths::normalize(&self.root.join(target))
                };
                if !target.exists() {
                    return Err(ValidationError::PathNotFound(target.display().to_string()).into());
                }
                if paths::relative_to(&target, &self.root).is_none() {
                    return Err(ValidationError::OutsideRoot(target.display().to_string()).into());
                }
                if !target.is_dir() {
                    return Ok(vec![walker.check(&target)?]);
                }
                Some(walker.check_dir(&target)?)
            }
        };

        tokio::task::spawn_blocking(move || walker.walk(start.as_deref()))
            .await
            .map_err(|e| RefmapError::other(format!("File walk task failed: {}", e)))?
            .map_err(|e| match e.downcast::<RefmapError>() {
                Ok(err) => err,
                Err(e) => e.into(),
            })
    }

    async fn index_file(
        &self,
        file: SourceFile,
        request: &ScanRequest,
        run: &RunContext<'_>,
    ) -> Result<FileOutcome> {
        if !request.force
            && let Some(entry) = self.reusable_entry(&file, request.with_references).await
        {
            tracing::debug!("Skipping up-to-date {}", file.relative_path);
            run.remember(&file.path, Arc::new(entry.symbols));
            return Ok(FileOutcome::new(FileStatus::Skipped));
        }

        let mut declarations = match self.extractor.extract(&file.path).await {
            Ok(declarations) => declarations,
            Err(e) => {
                self.record(SYMBOLS_QUERY, &file.path.to_string_lossy(), &e);
                return Ok(FileOutcome::new(FileStatus::Failed));
            }
        };
        let own = Arc::new(declarations.clone());
        run.remember(&file.path, own.clone());

        let mut outcome = FileOutcome::new(FileStatus::Indexed);
        if request.with_references {
            let resolver = ReferenceResolver::new(self.oracle.as_ref(), run, &file.path, &own);
            for decl in declarations.iter_mut() {
                match resolver.resolve(decl).await {
                    Ok(resolution) => {
                        outcome.references_resolved += resolution.references.len();
                        outcome.unattributed_references += resolution.unattributed;
                        decl.attach_references(resolution.references);
                    }
                    Err(e) => {
                        self.record(
                            REFERENCES_QUERY,
                            &reference_query_input(&file.path, &decl.position),
                            &e,
                        );
                        decl.attach_references(Vec::new());
                    }
                }
                if decl.zero_references {
                    outcome
                        .unused
                        .push(format!("{}:{}", file.relative_path, decl.name));
                }
            }
        }

        let entry = CacheEntry::new(file.relative_path.clone(), file.mod_time, declarations)
            .with_references_scanned(request.with_references);
        self.cache.lock().await.commit(&file.file_name, entry)?;
        tracing::debug!("Indexed {}", file.relative_path);
        Ok(outcome)
    }

    /// Cached entry for `file` if it can stand in for a fresh extraction
    async fn reusable_entry(&self, file: &SourceFile, with_references: bool) -> Option<CacheEntry> {
        let cache = self.cache.lock().await;
        cache
            .fresh(&file.file_name, file.mod_time)
            .filter(|entry| entry.path == file.relative_path)
            .filter(|entry| !with_references || entry.references_scanned)
            .cloned()
    }

    fn record(&self, query: &str, input: &str, err: &OracleError) {
        self.error_log
            .append(ErrorRecord::from_oracle(query, input, err));
    }

    /// Declarations of a referencing file, from the cache or freshly extracted
    ///
    /// Fresh extractions of eligible project files are committed without
    /// references. A failed commit only loses the cache entry.
    async fn lazy_declarations(&self, path: &Path) -> Result<Vec<Declaration>> {
        let mod_time = modified_unix(path)?;
        let relative = paths::relative_to(path, &self.root);
        let file_name = paths::file_name(&path.to_string_lossy()).to_string();

        if let Some(relative) = &relative {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache
                .fresh(&file_name, mod_time)
                .filter(|entry| &entry.path == relative)
            {
                return Ok(entry.symbols.clone());
            }
        }

        tracing::debug!("Lazily indexing referencing file {:?}", path);
        let declarations = match self.extractor.extract(path).await {
            Ok(declarations) => declarations,
            Err(e) => {
                self.record(SYMBOLS_QUERY, &path.to_string_lossy(), &e);
                return Err(e.into());
            }
        };

        let Some(relative) = relative.filter(|r| self.policy.is_eligible(r)) else {
            return Ok(declarations);
        };

        let mut cache = self.cache.lock().await;
        // Keep entries committed meanwhile and entries of same-named files elsewhere
        let occupied = cache
            .get(&file_name)
            .is_some_and(|entry| entry.path != relative || entry.mod_time == mod_time);
        if !occupied
            && let Err(e) = cache.commit(
                &file_name,
                CacheEntry::new(relative, mod_time, declarations.clone()),
            )
        {
            tracing::warn!("Failed to cache declarations of {:?}: {}", path, e);
        }
        Ok(declarations)
    }

    /// Hierarchy of everything in the cache
    pub async fn hierarchy(&self) -> HierarchyNode {
        let root_name = self.config.graph.root_name.clone().unwrap_or_else(|| {
            self.root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let cache = self.cache.lock().await;
        HierarchyBuilder::new(root_name)
            .with_policy(self.config.graph.zero_references)
            .with_project_root(&self.root)
            .from_cache(&cache)
    }

    pub fn maps(&self) -> MapStore {
        MapStore::new(self.config.storage.maps_dir(&self.root))
    }

    /// Snapshot the current hierarchy as map `name`
    pub async fn create_map(&self, name: &str) -> Result<PathBuf> {
        MapStore::validate_name(name)?;
        let root = self.hierarchy().await;
        self.maps().create(name, &root)
    }

    /// Drop cache entries whose file no longer exists
    pub async fn prune_cache(&self) -> Result<usize> {
        Ok(self.cache.lock().await.prune_missing(&self.root)?)
    }

    /// Forget all recorded oracle failures
    pub fn clear_errors(&self) -> Result<()> {
        self.error_log.clear();
        self.error_log.flush()?;
        Ok(())
    }
}

fn absolute_root(root: &Path) -> Result<PathBuf> {
    let root = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()?.join(root)
    };
    Ok(paths::normalize(&root))
}

/// Per-scan state shared by all workers
struct RunContext<'a> {
    session: &'a IndexingSession,
    /// Declarations already known this run, by absolute path
    known: std::sync::Mutex<HashMap<PathBuf, Arc<Vec<Declaration>>>>,
}

impl<'a> RunContext<'a> {
    fn new(session: &'a IndexingSession) -> Self {
        Self {
            session,
            known: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn remember(&self, path: &Path, declarations: Arc<Vec<Declaration>>) {
        self.known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(paths::normalize(path), declarations);
    }

    fn lookup(&self, path: &Path) -> Option<Arc<Vec<Declaration>>> {
        self.known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl DeclarationSource for RunContext<'_> {
    async fn declarations_for(&self, path: &Path) -> Result<Arc<Vec<Declaration>>> {
        let path = paths::normalize(path);
        if let Some(known) = self.lookup(&path) {
            return Ok(known);
        }

        match self.session.lazy_declarations(&path).await {
            Ok(declarations) => {
                let declarations = Arc::new(declarations);
                self.remember(&path, declarations.clone());
                Ok(declarations)
            }
            Err(e) => {
                // Later use sites in the same file fall through to attribution
                // failures instead of repeating the oracle call
                if matches!(e, RefmapError::Oracle(_)) {
                    self.remember(&path, Arc::new(Vec::new()));
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests;
