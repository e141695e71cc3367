//! Quest Catalog
//!
//! Loads quest records, links chains, and publishes immutable snapshots.
//! A reload builds the whole new snapshot off to the side and swaps it in,
//! so readers see either the old catalog or the new one, never a mix.
//! Supports hot-reloading during development.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::definition::{Quest, QuestBuilder, RawQuestFile, RawQuestRecord};
use super::error::{DataFileError, QuestError};

/// Weak, generation-checked reference to a quest definition.
///
/// Survives catalog reloads but only resolves against the generation that
/// produced it; a reloaded or removed definition reports `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestRef {
    id: u32,
    generation: u64,
}

impl QuestRef {
    pub(crate) fn new(id: u32, generation: u64) -> Self {
        Self { id, generation }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of a catalog load
#[derive(Debug, Default)]
pub struct LoadReport {
    pub generation: u64,
    pub loaded: usize,
    /// Records that were skipped, with the reason
    pub skipped: Vec<QuestError>,
    /// Data files that could not be read or parsed
    pub failed_files: Vec<String>,
}

/// One complete, immutable generation of the catalog
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    generation: u64,
    quests: HashMap<u32, Arc<Quest>>,
    exclusive_groups: HashMap<i32, Vec<u32>>,
}

impl CatalogSnapshot {
    /// Build and link every record. Bad records are skipped and reported.
    pub fn build(records: &[RawQuestRecord], generation: u64, inactive: &HashSet<u32>) -> (Self, LoadReport) {
        let mut report = LoadReport {
            generation,
            ..Default::default()
        };

        let mut builders: BTreeMap<u32, QuestBuilder> = BTreeMap::new();
        for raw in records {
            match QuestBuilder::from_record(raw) {
                Ok(builder) => {
                    let id = builder.id();
                    if builders.contains_key(&id) {
                        report.skipped.push(QuestError::load(id, "duplicate quest entry"));
                    } else {
                        builders.insert(id, builder);
                    }
                }
                Err(e) => report.skipped.push(e),
            }
        }

        // Skipping one quest can leave another dangling, so repeat until stable
        loop {
            let dangling: Vec<(u32, String)> = builders
                .values()
                .filter_map(|b| dangling_reference(b, &builders).map(|reason| (b.id(), reason)))
                .collect();
            if dangling.is_empty() {
                break;
            }
            for (id, reason) in dangling {
                builders.remove(&id);
                report.skipped.push(QuestError::load(id, reason));
            }
        }

        let links: Vec<(u32, i32, i32, u32, u32, i32)> = builders
            .values()
            .map(|b| {
                let chain = b.chain();
                (
                    b.id(),
                    chain.prev_quest_id,
                    chain.next_quest_id,
                    chain.next_in_chain,
                    chain.breadcrumb_for,
                    chain.exclusive_group,
                )
            })
            .collect();

        let mut exclusive_groups: HashMap<i32, Vec<u32>> = HashMap::new();
        for (id, prev, next, next_in_chain, breadcrumb_for, group) in links {
            if prev != 0 {
                if let Some(b) = builders.get_mut(&id) {
                    b.add_prev_quest(prev);
                }
            }
            if next != 0 {
                // Positive: this quest must be done first. Negative: must not be done.
                let link = if next > 0 { id as i32 } else { -(id as i32) };
                if let Some(b) = builders.get_mut(&next.unsigned_abs()) {
                    b.add_prev_quest(link);
                }
            }
            if next_in_chain != 0 {
                if let Some(b) = builders.get_mut(&next_in_chain) {
                    b.add_prev_chain_quest(id);
                }
            }
            if breadcrumb_for != 0 {
                if let Some(b) = builders.get_mut(&breadcrumb_for) {
                    b.add_dependent_breadcrumb(id);
                }
            }
            if group != 0 {
                exclusive_groups.entry(group).or_default().push(id);
            }
        }

        for (group, members) in &exclusive_groups {
            if members.len() < 2 {
                warn!("Exclusive group {} has a single member {:?}", group, members);
            }
        }

        let quests: HashMap<u32, Arc<Quest>> = builders
            .into_iter()
            .map(|(id, builder)| {
                let quest = builder.active(!inactive.contains(&id)).build(generation);
                (id, Arc::new(quest))
            })
            .collect();

        report.loaded = quests.len();

        (
            Self {
                generation,
                quests,
                exclusive_groups,
            },
            report,
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Get a quest by ID
    pub fn get(&self, quest_id: u32) -> Result<&Arc<Quest>, QuestError> {
        self.quests.get(&quest_id).ok_or(QuestError::NotFound(quest_id))
    }

    /// Get a quest only if it is globally enabled
    pub fn get_active(&self, quest_id: u32) -> Result<&Arc<Quest>, QuestError> {
        let quest = self.get(quest_id)?;
        if !quest.is_active() {
            return Err(QuestError::Inactive(quest_id));
        }
        Ok(quest)
    }

    /// Dereference a weak handle
    pub fn resolve(&self, handle: &QuestRef) -> Result<Arc<Quest>, QuestError> {
        match self.quests.get(&handle.id) {
            Some(quest) if quest.generation() == handle.generation => Ok(Arc::clone(quest)),
            _ => Err(QuestError::NotFound(handle.id)),
        }
    }

    pub fn contains(&self, quest_id: u32) -> bool {
        self.quests.contains_key(&quest_id)
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.quests.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Quest>> {
        self.quests.values()
    }

    /// Signed prerequisite list: negative ids must not have been completed
    pub fn prev_quests(&self, quest_id: u32) -> Result<&[i32], QuestError> {
        Ok(&self.get(quest_id)?.chain().prev_quests)
    }

    pub fn prev_chain_quests(&self, quest_id: u32) -> Result<&[u32], QuestError> {
        Ok(&self.get(quest_id)?.chain().prev_chain_quests)
    }

    /// Breadcrumb quests leading into this one
    pub fn dependent_breadcrumbs(&self, quest_id: u32) -> Result<&[u32], QuestError> {
        Ok(&self.get(quest_id)?.chain().dependent_breadcrumbs)
    }

    pub fn next_in_chain(&self, quest_id: u32) -> Result<Option<&Arc<Quest>>, QuestError> {
        let next = self.get(quest_id)?.chain().next_in_chain;
        Ok(self.quests.get(&next))
    }

    /// Quest ids from `quest_id` following next-in-chain links
    pub fn chain_from(&self, quest_id: u32) -> Result<Vec<u32>, QuestError> {
        let mut chain = vec![self.get(quest_id)?.id()];
        let mut seen: HashSet<u32> = chain.iter().copied().collect();
        let mut current = quest_id;

        while let Some(next) = self.next_in_chain(current)? {
            if !seen.insert(next.id()) {
                warn!("Quest chain starting at {} loops back to {}", quest_id, next.id());
                break;
            }
            chain.push(next.id());
            current = next.id();
        }

        Ok(chain)
    }

    /// Members of an exclusive group; completing one closes the others
    pub fn exclusive_group(&self, group: i32) -> &[u32] {
        self.exclusive_groups
            .get(&group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Other quests that become unavailable once `quest_id` is done
    pub fn exclusive_with(&self, quest_id: u32) -> Result<Vec<u32>, QuestError> {
        let group = self.get(quest_id)?.chain().exclusive_group;
        if group == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .exclusive_group(group)
            .iter()
            .copied()
            .filter(|&id| id != quest_id)
            .collect())
    }

    /// Quests without any prerequisite
    pub fn starting_quests(&self) -> Vec<Arc<Quest>> {
        self.quests
            .values()
            .filter(|q| q.chain().prev_quests.is_empty() && q.chain().prev_chain_quests.is_empty())
            .cloned()
            .collect()
    }
}

/// First chain reference of a quest that does not resolve
fn dangling_reference(builder: &QuestBuilder, builders: &BTreeMap<u32, QuestBuilder>) -> Option<String> {
    let chain = builder.chain();
    let references = [
        ("prev quest", chain.prev_quest_id.unsigned_abs()),
        ("next quest", chain.next_quest_id.unsigned_abs()),
        ("next quest in chain", chain.next_in_chain),
        ("breadcrumb target", chain.breadcrumb_for),
    ];

    references
        .iter()
        .find(|(_, id)| *id != 0 && !builders.contains_key(id))
        .map(|(what, id)| format!("{} {} does not exist", what, id))
}

/// Registry for all quest definitions
pub struct QuestCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
    /// Serializes reloads and activation changes
    writer: Mutex<()>,
    next_generation: AtomicU64,
    /// Base directory for quest data
    quests_dir: PathBuf,
}

impl QuestCatalog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot::default())),
            writer: Mutex::new(()),
            next_generation: AtomicU64::new(1),
            quests_dir: data_dir.join("quests"),
        }
    }

    /// Current complete catalog. Hold it for a consistent view across lookups.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Build a new generation from records and publish it
    pub async fn load(&self, records: Vec<RawQuestRecord>) -> LoadReport {
        let _writer = self.writer.lock().await;

        let inactive: HashSet<u32> = self
            .snapshot()
            .await
            .iter()
            .filter(|q| !q.is_active())
            .map(|q| q.id())
            .collect();

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (snapshot, report) = CatalogSnapshot::build(&records, generation, &inactive);

        for skipped in &report.skipped {
            warn!("{}", skipped);
        }

        *self.current.write().await = Arc::new(snapshot);

        info!(
            "Loaded {} quest definitions (generation {}, {} skipped)",
            report.loaded,
            generation,
            report.skipped.len()
        );
        report
    }

    /// Load all quest definitions from the data directory
    pub async fn load_all(&self) -> LoadReport {
        info!("Loading quests from {:?}", self.quests_dir);

        let mut paths = Vec::new();
        let mut failed_files = Vec::new();

        if self.quests_dir.exists() {
            if let Err(e) = collect_toml_files(&self.quests_dir, &mut paths) {
                warn!("Failed to scan quest directory: {}", e);
                failed_files.push(e.path().to_string_lossy().to_string());
            }
        } else {
            warn!("Quest directory does not exist: {:?}", self.quests_dir);
        }
        paths.sort();

        let mut records = Vec::new();
        for path in paths {
            match read_quest_file(&path) {
                Ok(file) => {
                    debug!("Read {} quest records from {:?}", file.quest.len(), path);
                    records.extend(file.quest);
                }
                Err(e) => {
                    warn!("Failed to load quests: {}", e);
                    failed_files.push(e.path().to_string_lossy().to_string());
                }
            }
        }

        let mut report = self.load(records).await;
        report.failed_files = failed_files;
        report
    }

    /// Get a quest by ID
    pub async fn get(&self, quest_id: u32) -> Result<Arc<Quest>, QuestError> {
        self.snapshot().await.get(quest_id).cloned()
    }

    /// Dereference a weak handle against the current generation
    pub async fn resolve(&self, handle: &QuestRef) -> Result<Arc<Quest>, QuestError> {
        self.snapshot().await.resolve(handle)
    }

    /// Globally disable a quest without invalidating handles to it
    pub async fn deactivate(&self, quest_id: u32) -> Result<(), QuestError> {
        self.set_active(quest_id, false).await
    }

    pub async fn activate(&self, quest_id: u32) -> Result<(), QuestError> {
        self.set_active(quest_id, true).await
    }

    async fn set_active(&self, quest_id: u32, state: bool) -> Result<(), QuestError> {
        let _writer = self.writer.lock().await;
        self.snapshot().await.get(quest_id)?.set_active(state);
        info!("Quest {} {}", quest_id, if state { "activated" } else { "deactivated" });
        Ok(())
    }

    /// Get count of loaded quests
    pub async fn count(&self) -> usize {
        self.snapshot().await.len()
    }

    /// Start file watcher for hot-reload.
    /// Returns a channel receiver that signals when reloads occur.
    /// Must be called from within a tokio runtime.
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<HotReloadEvent>, notify::Error> {
        use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                let _ = notify_tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;
        watcher.watch(&self.quests_dir, RecursiveMode::Recursive)?;

        let rt = tokio::runtime::Handle::current();
        let catalog = Arc::clone(self);

        info!("Quest hot-reload watcher started for {:?}", self.quests_dir);

        std::thread::spawn(move || {
            // Dropping the watcher stops notifications
            let _watcher = watcher;

            while let Ok(res) = notify_rx.recv() {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        let _ = tx.blocking_send(HotReloadEvent::Error(e.to_string()));
                        continue;
                    }
                };

                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)) {
                    continue;
                }

                let Some(path) = event
                    .paths
                    .iter()
                    .find(|p| p.extension().is_some_and(|ext| ext == "toml"))
                else {
                    continue;
                };

                info!("Detected change in {:?}, triggering reload", path);
                let report = rt.block_on(catalog.load_all());
                let reloaded = HotReloadEvent::Reloaded {
                    path: path.to_string_lossy().to_string(),
                    loaded: report.loaded,
                    skipped: report.skipped.len(),
                };
                if tx.blocking_send(reloaded).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), DataFileError> {
    let read_error = |source| DataFileError::Read {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

fn read_quest_file(path: &Path) -> Result<RawQuestFile, DataFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| DataFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| DataFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// The catalog was rebuilt after a change to `path`
    Reloaded {
        path: String,
        loaded: usize,
        skipped: usize,
    },
    /// The watcher reported an error
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(entry: u32) -> RawQuestRecord {
        RawQuestRecord::new(entry)
    }

    fn chained(entry: u32, prev: i32, next_in_chain: u32) -> RawQuestRecord {
        RawQuestRecord {
            prev_quest_id: prev,
            next_quest_in_chain: next_in_chain,
            ..record(entry)
        }
    }

    #[tokio::test]
    async fn test_load_and_get() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        let report = catalog.load(vec![record(1), record(2)]).await;

        assert_eq!(report.loaded, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(catalog.get(1).await.unwrap().id(), 1);
        assert_eq!(catalog.get(3).await.unwrap_err(), QuestError::NotFound(3));
        assert_eq!(catalog.count().await, 2);
    }

    #[tokio::test]
    async fn test_dangling_reference_skips_quest_and_dependents() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        // 2 points at missing 99; 3 follows 2 and is left dangling once 2 is dropped
        let report = catalog
            .load(vec![record(1), chained(2, 99, 0), chained(3, 2, 0), chained(4, 1, 0)])
            .await;

        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped.len(), 2);
        let snapshot = catalog.snapshot().await;
        assert!(snapshot.contains(1));
        assert!(snapshot.contains(4));
        assert!(!snapshot.contains(2));
        assert!(!snapshot.contains(3));
    }

    #[tokio::test]
    async fn test_duplicate_entry_skipped() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        let report = catalog.load(vec![record(5), record(5)]).await;
        assert_eq!(report.loaded, 1);
        assert!(matches!(report.skipped[0], QuestError::Load { quest_id: 5, .. }));
    }

    #[tokio::test]
    async fn test_chain_links() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        let breadcrumb = RawQuestRecord {
            breadcrumb_for_quest_id: 10,
            ..record(9)
        };
        let exclusive_a = RawQuestRecord {
            next_quest_id: -12,
            exclusive_group: 7,
            ..record(11)
        };
        let exclusive_b = RawQuestRecord {
            exclusive_group: 7,
            ..record(13)
        };
        catalog
            .load(vec![
                chained(10, 0, 20),
                chained(20, 10, 30),
                chained(30, 0, 0),
                breadcrumb,
                exclusive_a,
                record(12),
                exclusive_b,
            ])
            .await;

        let snapshot = catalog.snapshot().await;
        assert_eq!(snapshot.prev_quests(20).unwrap(), &[10]);
        assert_eq!(snapshot.prev_chain_quests(20).unwrap(), &[10]);
        assert_eq!(snapshot.chain_from(10).unwrap(), vec![10, 20, 30]);
        assert_eq!(snapshot.dependent_breadcrumbs(10).unwrap(), &[9]);
        assert_eq!(snapshot.prev_quests(12).unwrap(), &[-11]);
        assert_eq!(snapshot.exclusive_with(11).unwrap(), vec![13]);
        assert!(snapshot.exclusive_group(8).is_empty());
        assert!(snapshot.starting_quests().iter().any(|q| q.id() == 10));
        assert!(!snapshot.starting_quests().iter().any(|q| q.id() == 30));
    }

    #[tokio::test]
    async fn test_handle_dies_when_quest_removed_by_reload() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        catalog.load(vec![record(1), record(2)]).await;

        let handle = catalog.get(2).await.unwrap().handle();
        assert!(catalog.resolve(&handle).await.is_ok());

        catalog.load(vec![record(1)]).await;
        assert_eq!(catalog.resolve(&handle).await.unwrap_err(), QuestError::NotFound(2));
    }

    #[tokio::test]
    async fn test_handle_to_reloaded_definition_is_stale() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        catalog.load(vec![record(1)]).await;
        let handle = catalog.get(1).await.unwrap().handle();

        catalog.load(vec![record(1)]).await;
        assert!(catalog.resolve(&handle).await.is_err());

        let fresh = catalog.get(1).await.unwrap().handle();
        assert!(catalog.resolve(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_old_snapshot_stays_complete_across_reload() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        catalog.load(vec![record(1), record(2)]).await;
        let before = catalog.snapshot().await;

        catalog.load(vec![record(3)]).await;
        let after = catalog.snapshot().await;

        assert_eq!(before.len(), 2);
        assert!(before.contains(2));
        assert_eq!(after.len(), 1);
        assert!(after.generation() > before.generation());
    }

    #[tokio::test]
    async fn test_deactivate_keeps_definition_and_survives_reload() {
        let catalog = QuestCatalog::new(Path::new("unused"));
        catalog.load(vec![record(1)]).await;
        let quest = catalog.get(1).await.unwrap();
        let handle = quest.handle();

        catalog.deactivate(1).await.unwrap();
        assert!(!quest.is_active());
        assert!(catalog.resolve(&handle).await.is_ok());
        assert_eq!(
            catalog.snapshot().await.get_active(1).unwrap_err(),
            QuestError::Inactive(1)
        );

        catalog.load(vec![record(1)]).await;
        assert!(!catalog.get(1).await.unwrap().is_active());

        catalog.activate(1).await.unwrap();
        assert!(catalog.get(1).await.unwrap().is_active());
        assert_eq!(catalog.deactivate(77).await.unwrap_err(), QuestError::NotFound(77));
    }

    #[tokio::test]
    async fn test_load_all_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        let quest_dir = temp_dir.path().join("quests").join("elwynn");
        std::fs::create_dir_all(&quest_dir).unwrap();

        std::fs::write(
            quest_dir.join("wolves.toml"),
            r#"
[[quest]]
entry = 33
title = "Wolves Across the Border"
req_item_id = [750]
req_item_count = [8]

[[quest]]
entry = 34
prev_quest_id = 33
"#,
        )
        .unwrap();
        std::fs::write(quest_dir.join("broken.toml"), "[[quest]\nentry = ").unwrap();

        let catalog = QuestCatalog::new(temp_dir.path());
        let report = catalog.load_all().await;

        assert_eq!(report.loaded, 2);
        assert_eq!(report.failed_files.len(), 1);
        let quest = catalog.get(33).await.unwrap();
        assert_eq!(quest.text().title, "Wolves Across the Border");
        assert_eq!(quest.req_items_count(), 1);
    }

    #[test]
    fn test_quest_file_errors_are_typed() {
        let temp_dir = TempDir::new().unwrap();
        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "[[quest]\nentry = ").unwrap();

        match read_quest_file(&broken) {
            Err(DataFileError::Parse { path, .. }) => assert_eq!(path, broken),
            other => panic!("expected parse error, got {:?}", other),
        }

        let absent = temp_dir.path().join("absent.toml");
        let err = read_quest_file(&absent).unwrap_err();
        assert!(matches!(err, DataFileError::Read { .. }));
        assert_eq!(err.path(), absent.as_path());

        let mut paths = Vec::new();
        let err = collect_toml_files(&temp_dir.path().join("nowhere"), &mut paths).unwrap_err();
        assert!(matches!(err, DataFileError::Read { .. }));
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = QuestCatalog::new(temp_dir.path());
        let report = catalog.load_all().await;
        assert_eq!(report.loaded, 0);
        assert!(catalog.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_bundled_data_loads_cleanly() {
        let catalog = QuestCatalog::new(&Path::new(env!("CARGO_MANIFEST_DIR")).join("data"));
        let report = catalog.load_all().await;

        assert!(report.skipped.is_empty());
        assert!(report.failed_files.is_empty());
        assert_eq!(report.loaded, 4);

        let snapshot = catalog.snapshot().await;
        assert_eq!(snapshot.prev_chain_quests(7).unwrap(), &[783]);
        assert!(snapshot.get(5545).unwrap().is_timed());
    }
}
