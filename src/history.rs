//! Snapshot-based undo/redo history for the label mask.
//!
//! The history is one overwritable sequence of full mask copies addressed by
//! index, plus a cursor. Taking a snapshot writes at `cursor + 1` and
//! overwrites whatever was stored there. Nothing beyond that slot is deleted,
//! and redo only ever looks at `cursor + 1`:
//!
//! ```text
//! strokes A..E        0  A  B  C  D  E      cursor 5
//! undo x3             0  A  B  C  D  E      cursor 2
//! stroke F            0  A  B  F  D  E      cursor 3
//! redo                0  A  B  F  D  E      cursor 4 (loads stale D)
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use image::GrayImage;

use crate::constants::{MASK_EXTENSION, UNDO_FILE_PREFIX};
use crate::error::StoreError;
use crate::layer::LabelLayer;
use crate::raster;

/// Backing storage for history snapshots.
pub trait SnapshotStore {
    /// Replace every snapshot with `baseline` at index 0.
    ///
    /// On error the previous snapshots are left as they were.
    fn reset(&mut self, baseline: &GrayImage) -> Result<(), StoreError>;

    /// Store a snapshot at `index`, replacing any previous one.
    fn write(&mut self, index: usize, mask: &GrayImage) -> Result<(), StoreError>;

    /// Load the snapshot at `index`, `Ok(None)` if there is none.
    fn read(&self, index: usize) -> Result<Option<GrayImage>, StoreError>;

    /// Indices currently holding a snapshot, ascending.
    fn indices(&self) -> Result<Vec<usize>, StoreError>;
}

/// Snapshots as `undo_<index>.png` files in one directory.
#[derive(Debug, Clone)]
pub struct DirSnapshotStore {
    dir: PathBuf,
}

impl DirSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File a snapshot index is stored in.
    pub fn snapshot_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{UNDO_FILE_PREFIX}{index}.{MASK_EXTENSION}"))
    }

    /// Where the next baseline is written before the directory is wiped.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.dir.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".baseline.{MASK_EXTENSION}"));
        self.dir.with_file_name(name)
    }

    fn parse_index(name: &str) -> Option<usize> {
        name.strip_prefix(UNDO_FILE_PREFIX)?
            .strip_suffix(MASK_EXTENSION)?
            .strip_suffix('.')?
            .parse()
            .ok()
    }
}

impl SnapshotStore for DirSnapshotStore {
    fn reset(&mut self, baseline: &GrayImage) -> Result<(), StoreError> {
        let staged = self.staging_path();
        raster::write_mask(baseline, &staged)?;
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;
        std::fs::rename(&staged, self.snapshot_path(0))?;
        Ok(())
    }

    fn write(&mut self, index: usize, mask: &GrayImage) -> Result<(), StoreError> {
        Ok(raster::write_mask(mask, &self.snapshot_path(index))?)
    }

    fn read(&self, index: usize) -> Result<Option<GrayImage>, StoreError> {
        Ok(raster::read_mask(&self.snapshot_path(index))?)
    }

    fn indices(&self) -> Result<Vec<usize>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut indices = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(index) = name.to_str().and_then(Self::parse_index) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }
}

/// Snapshots kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: BTreeMap<usize, GrayImage>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn reset(&mut self, baseline: &GrayImage) -> Result<(), StoreError> {
        self.snapshots = BTreeMap::from([(0, baseline.clone())]);
        Ok(())
    }

    fn write(&mut self, index: usize, mask: &GrayImage) -> Result<(), StoreError> {
        self.snapshots.insert(index, mask.clone());
        Ok(())
    }

    fn read(&self, index: usize) -> Result<Option<GrayImage>, StoreError> {
        Ok(self.snapshots.get(&index).cloned())
    }

    fn indices(&self) -> Result<Vec<usize>, StoreError> {
        Ok(self.snapshots.keys().copied().collect())
    }
}

/// Cursor state of a history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryState {
    /// Index of the snapshot matching the label, `None` before the first snapshot
    pub cursor: Option<usize>,
    /// Highest index written since the last reset
    pub highest_written: Option<usize>,
}

impl HistoryState {
    fn next_index(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor + 1)
    }
}

/// Undo/redo history over a [`SnapshotStore`].
#[derive(Debug, Clone)]
pub struct UndoHistory<S: SnapshotStore> {
    store: S,
    state: HistoryState,
}

impl<S: SnapshotStore> UndoHistory<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: HistoryState::default(),
        }
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn cursor(&self) -> Option<usize> {
        self.state.cursor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Drop every snapshot and record the label as the clean baseline at index 0.
    ///
    /// On error the history is unchanged.
    pub fn reset(&mut self, label: &LabelLayer) -> Result<(), StoreError> {
        self.store.reset(label.mask())?;
        self.state = HistoryState {
            cursor: Some(0),
            highest_written: Some(0),
        };
        log::debug!("🗑️ Undo history cleared");
        Ok(())
    }

    /// Record the label at `cursor + 1`, overwriting anything stored there.
    pub fn snapshot(&mut self, label: &LabelLayer) -> Result<(), StoreError> {
        let index = self.state.next_index();
        self.store.write(index, label.mask())?;
        self.state.cursor = Some(index);
        self.state.highest_written = self.state.highest_written.max(Some(index));
        log::debug!("📝 Undo: snapshot {}", index);
        Ok(())
    }

    /// Step back one snapshot. Returns `false` at the baseline.
    ///
    /// The cursor only moves when the target snapshot can be loaded.
    pub fn undo(&mut self, label: &mut LabelLayer) -> Result<bool, StoreError> {
        let Some(target) = self.state.cursor.and_then(|c| c.checked_sub(1)) else {
            log::debug!("⏪ Undo: already at baseline");
            return Ok(false);
        };
        match self.store.read(target)? {
            Some(mask) => {
                label.replace(mask);
                self.state.cursor = Some(target);
                log::debug!("⏪ Undo: restored snapshot {}", target);
                Ok(true)
            }
            None => {
                log::warn!("Undo: snapshot {} is missing", target);
                Ok(false)
            }
        }
    }

    /// Step forward to the snapshot at `cursor + 1`. Returns `false` if none exists.
    pub fn redo(&mut self, label: &mut LabelLayer) -> Result<bool, StoreError> {
        let target = self.state.next_index();
        match self.store.read(target)? {
            Some(mask) => {
                label.replace(mask);
                self.state.cursor = Some(target);
                log::debug!("⏩ Redo: restored snapshot {}", target);
                Ok(true)
            }
            None => {
                log::debug!("⏩ Redo: nothing at {}", target);
                Ok(false)
            }
        }
    }

    /// Number of stored snapshots.
    pub fn snapshot_count(&self) -> Result<usize, StoreError> {
        Ok(self.store.indices()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Opacity;
    use image::Luma;
    use tempfile::TempDir;

    /// Paint class `id` at pixel `(id, 0)` to tell masks apart.
    fn mark(label: &mut LabelLayer, id: u8) {
        label.mask_mut().put_pixel(u32::from(id), 0, Luma([id]));
    }

    fn fresh() -> (UndoHistory<MemorySnapshotStore>, LabelLayer) {
        let label = LabelLayer::new(8, 1, Opacity::OPAQUE);
        let mut history = UndoHistory::new(MemorySnapshotStore::new());
        history.reset(&label).unwrap();
        (history, label)
    }

    #[test]
    fn test_reset_takes_baseline() {
        let (history, _) = fresh();
        assert_eq!(history.cursor(), Some(0));
        assert_eq!(history.snapshot_count().unwrap(), 1);
    }

    #[test]
    fn test_n_strokes_then_unwind() {
        let (mut history, mut label) = fresh();
        for id in 1..=4 {
            mark(&mut label, id);
            history.snapshot(&label).unwrap();
        }
        assert_eq!(history.snapshot_count().unwrap(), 5);

        let mut moved = 0;
        for _ in 0..5 {
            if history.undo(&mut label).unwrap() {
                moved += 1;
            }
        }
        assert_eq!(moved, 4);
        assert!(label.is_blank());
        assert_eq!(history.cursor(), Some(0));
    }

    #[test]
    fn test_undo_redo_is_idempotent() {
        let (mut history, mut label) = fresh();
        mark(&mut label, 1);
        history.snapshot(&label).unwrap();
        mark(&mut label, 2);
        history.snapshot(&label).unwrap();
        let before = label.mask().clone();

        assert!(history.undo(&mut label).unwrap());
        assert_ne!(label.mask(), &before);
        assert!(history.redo(&mut label).unwrap());
        assert_eq!(label.mask(), &before);
    }

    #[test]
    fn test_boundaries_are_noops() {
        let (mut history, mut label) = fresh();
        assert!(!history.undo(&mut label).unwrap());
        assert!(!history.redo(&mut label).unwrap());
        assert_eq!(history.cursor(), Some(0));
    }

    #[test]
    fn test_snapshot_after_undo_overwrites_slot() {
        let (mut history, mut label) = fresh();
        let mut masks = Vec::new();
        for id in 1..=5 {
            mark(&mut label, id);
            history.snapshot(&label).unwrap();
            masks.push(label.mask().clone());
        }
        assert_eq!(history.cursor(), Some(5));

        for _ in 0..3 {
            assert!(history.undo(&mut label).unwrap());
        }
        assert_eq!(history.cursor(), Some(2));
        assert_eq!(label.mask(), &masks[1]);

        // new stroke F lands at index 3
        mark(&mut label, 7);
        history.snapshot(&label).unwrap();
        let f = label.mask().clone();
        assert_eq!(history.cursor(), Some(3));
        assert_eq!(history.store().read(3).unwrap(), Some(f.clone()));
        assert_ne!(f, masks[2]);
        // stale slots past the overwrite are kept
        assert_eq!(history.store().read(4).unwrap(), Some(masks[3].clone()));
        assert_eq!(history.state().highest_written, Some(5));

        // undo then redo comes back to F, never the old C
        assert!(history.undo(&mut label).unwrap());
        assert!(history.redo(&mut label).unwrap());
        assert_eq!(label.mask(), &f);

        // redo still targets cursor + 1 and picks up stale D
        assert!(history.redo(&mut label).unwrap());
        assert_eq!(history.cursor(), Some(4));
        assert_eq!(label.mask(), &masks[3]);
    }

    #[test]
    fn test_missing_target_keeps_cursor() {
        let (mut history, mut label) = fresh();
        mark(&mut label, 1);
        history.snapshot(&label).unwrap();
        history.store.snapshots.remove(&0);

        assert!(!history.undo(&mut label).unwrap());
        assert_eq!(history.cursor(), Some(1));
    }

    #[test]
    fn test_dir_store_layout() {
        let dir = TempDir::new().unwrap();
        let undo_dir = dir.path().join("undo_history");
        let mut label = LabelLayer::new(4, 4, Opacity::OPAQUE);
        let mut history = UndoHistory::new(DirSnapshotStore::new(&undo_dir));

        history.reset(&label).unwrap();
        mark(&mut label, 2);
        history.snapshot(&label).unwrap();
        std::fs::write(undo_dir.join("unrelated.txt"), "x").unwrap();

        assert!(undo_dir.join("undo_0.png").is_file());
        assert!(undo_dir.join("undo_1.png").is_file());
        assert_eq!(history.store().indices().unwrap(), vec![0, 1]);

        assert!(history.undo(&mut label).unwrap());
        assert!(label.is_blank());

        // reset wipes the directory
        history.reset(&label).unwrap();
        assert!(!undo_dir.join("undo_1.png").exists());
        assert!(!undo_dir.join("unrelated.txt").exists());
        assert_eq!(history.snapshot_count().unwrap(), 1);
        assert!(!dir.path().join("undo_history.baseline.png").exists());
    }

    /// Memory store that refuses writes once `read_only` is set.
    #[derive(Default)]
    struct ReadOnlyStore {
        inner: MemorySnapshotStore,
        read_only: bool,
    }

    impl ReadOnlyStore {
        fn check(&self) -> Result<(), StoreError> {
            if self.read_only {
                return Err(StoreError::Io(std::io::Error::other("read-only")));
            }
            Ok(())
        }
    }

    impl SnapshotStore for ReadOnlyStore {
        fn reset(&mut self, baseline: &GrayImage) -> Result<(), StoreError> {
            self.check()?;
            self.inner.reset(baseline)
        }

        fn write(&mut self, index: usize, mask: &GrayImage) -> Result<(), StoreError> {
            self.check()?;
            self.inner.write(index, mask)
        }

        fn read(&self, index: usize) -> Result<Option<GrayImage>, StoreError> {
            self.inner.read(index)
        }

        fn indices(&self) -> Result<Vec<usize>, StoreError> {
            self.inner.indices()
        }
    }

    #[test]
    fn test_failed_reset_keeps_history() {
        let mut label = LabelLayer::new(8, 1, Opacity::OPAQUE);
        let mut history = UndoHistory::new(ReadOnlyStore::default());
        history.reset(&label).unwrap();
        mark(&mut label, 1);
        history.snapshot(&label).unwrap();

        history.store.read_only = true;
        let other = LabelLayer::new(8, 1, Opacity::OPAQUE);
        assert!(history.reset(&other).is_err());
        assert_eq!(history.cursor(), Some(1));
        assert_eq!(history.snapshot_count().unwrap(), 2);

        assert!(history.undo(&mut label).unwrap());
        assert!(label.is_blank());
        assert!(history.redo(&mut label).unwrap());
        assert_eq!(label.class_at(1, 0), 1);
    }
}
