//! Profile merging
//!
//! Folds every raw snapshot of a run into one [`MergedIndex`]. Counts are
//! summed per region across snapshots, so several binaries and several
//! processes may all report into the same function. Only non-zero counters
//! are stored: for any one test binary most instrumented code never runs.

use crate::artifact::ArtifactSet;
use crate::result::{CovError, CovResult};
use crate::snapshot::{RawSnapshot, RegionSpan, SnapshotReader};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Magic header of a merged index file
const INDEX_MAGIC: &[u8; 8] = b"CVPIDX01";
const DIGEST_LEN: usize = 32;

/// Identity of one function instantiation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Raw linker symbol
    pub symbol: String,
    /// Structural hash
    pub hash: u64,
}

/// Merged counters of one function instantiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedFunction {
    /// Source file
    pub file: PathBuf,
    /// Region spans; index 0 is the entry region
    pub regions: Vec<RegionSpan>,
    /// Sparse counters: region index to summed count, zeros omitted
    counters: BTreeMap<u32, u64>,
    /// Test binaries that reported this function
    pub objects: BTreeSet<PathBuf>,
}

impl MergedFunction {
    /// Summed count of region `index`
    #[must_use]
    pub fn count(&self, index: usize) -> u64 {
        u32::try_from(index)
            .ok()
            .and_then(|i| self.counters.get(&i))
            .copied()
            .unwrap_or(0)
    }

    /// Times the function was entered
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.count(0)
    }

    /// Entry region span
    #[must_use]
    pub fn entry_span(&self) -> Option<RegionSpan> {
        self.regions.first().copied()
    }

    /// Every region with its summed count
    pub fn region_counts(&self) -> impl Iterator<Item = (RegionSpan, u64)> + '_ {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, span)| (*span, self.count(i)))
    }

    /// Number of counters actually stored
    #[must_use]
    pub fn stored_counters(&self) -> usize {
        self.counters.len()
    }
}

/// Consolidated counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedIndex {
    records: BTreeMap<RecordKey, MergedFunction>,
    objects: BTreeSet<PathBuf>,
    snapshots: usize,
}

impl MergedIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge snapshots already in memory
    pub fn from_snapshots<'a>(
        snapshots: impl IntoIterator<Item = &'a RawSnapshot>,
    ) -> CovResult<Self> {
        let mut index = Self::new();
        for snapshot in snapshots {
            index.absorb(snapshot)?;
        }
        Ok(index)
    }

    /// Fold one snapshot into the index
    pub fn absorb(&mut self, snapshot: &RawSnapshot) -> CovResult<()> {
        for function in &snapshot.functions {
            let key = RecordKey {
                symbol: function.name.clone(),
                hash: function.hash,
            };
            let spans: Vec<RegionSpan> = function.regions.iter().map(|r| r.span()).collect();
            let record = self
                .records
                .entry(key)
                .or_insert_with(|| MergedFunction {
                    file: function.file.clone(),
                    regions: spans.clone(),
                    counters: BTreeMap::new(),
                    objects: BTreeSet::new(),
                });

            if record.file != function.file || record.regions != spans {
                return Err(CovError::merge(format!(
                    "function `{}` (hash {:#x}) has inconsistent regions across snapshots",
                    function.name, function.hash
                )));
            }

            for (i, region) in function.regions.iter().enumerate() {
                if region.count == 0 {
                    continue;
                }
                let slot = u32::try_from(i)
                    .map_err(|_| CovError::merge(format!("function `{}` has too many regions", function.name)))?;
                let counter = record.counters.entry(slot).or_insert(0);
                *counter = counter.saturating_add(region.count);
            }
            record.objects.insert(snapshot.object.clone());
        }
        self.objects.insert(snapshot.object.clone());
        self.snapshots += 1;
        Ok(())
    }

    /// Function records in key order
    pub fn records(&self) -> impl Iterator<Item = (&RecordKey, &MergedFunction)> {
        self.records.iter()
    }

    /// Look up one record
    #[must_use]
    pub fn record(&self, symbol: &str, hash: u64) -> Option<&MergedFunction> {
        self.records.get(&RecordKey {
            symbol: symbol.to_string(),
            hash,
        })
    }

    /// Objects that contributed snapshots
    #[must_use]
    pub fn objects(&self) -> &BTreeSet<PathBuf> {
        &self.objects
    }

    /// Number of snapshots merged
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots
    }

    /// Number of function records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check that every contributing object was discovered
    pub fn check_objects(&self, artifacts: &ArtifactSet) -> CovResult<()> {
        if let Some(stray) = self.objects.iter().find(|o| !artifacts.contains(o)) {
            return Err(CovError::discovery(format!(
                "merged index contains counters from {}, which is not a discovered test binary",
                stray.display()
            )));
        }
        Ok(())
    }

    /// Write the index file: magic, SHA-256 of the payload, bincode payload
    pub fn write_to(&self, path: &Path) -> CovResult<()> {
        let payload = bincode::serialize(self)
            .map_err(|e| CovError::merge(format!("cannot encode merged index: {e}")))?;
        let digest = Sha256::digest(&payload);

        let mut bytes = Vec::with_capacity(INDEX_MAGIC.len() + DIGEST_LEN + payload.len());
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(&payload);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes).map_err(|e| {
            CovError::merge(format!("cannot write merged index {}: {e}", path.display()))
        })
    }

    /// Read and verify an index file
    pub fn read_from(path: &Path) -> CovResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            CovError::merge(format!("cannot read merged index {}: {e}", path.display()))
        })?;
        let header = INDEX_MAGIC.len() + DIGEST_LEN;
        if bytes.len() < header || &bytes[..INDEX_MAGIC.len()] != INDEX_MAGIC {
            return Err(CovError::merge(format!(
                "{} is not a merged index file",
                path.display()
            )));
        }
        let (digest, payload) = bytes[INDEX_MAGIC.len()..].split_at(DIGEST_LEN);
        if Sha256::digest(payload).as_slice() != digest {
            return Err(CovError::merge(format!(
                "merged index {} failed its checksum",
                path.display()
            )));
        }
        bincode::deserialize(payload)
            .map_err(|e| CovError::merge(format!("cannot decode merged index: {e}")))
    }
}

/// Merges the snapshot files of one run
pub struct ProfileMerger<'a> {
    artifacts: &'a ArtifactSet,
    reader: &'a dyn SnapshotReader,
}

impl std::fmt::Debug for ProfileMerger<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileMerger")
            .field("artifacts", &self.artifacts.len())
            .finish_non_exhaustive()
    }
}

impl<'a> ProfileMerger<'a> {
    /// Create a merger bound to the discovered binaries
    #[must_use]
    pub fn new(artifacts: &'a ArtifactSet, reader: &'a dyn SnapshotReader) -> Self {
        Self { artifacts, reader }
    }

    /// Merge every given snapshot file into a fresh index
    ///
    /// Zero files is a merge failure, distinct from any build failure.
    pub fn merge(&self, paths: &[PathBuf]) -> CovResult<MergedIndex> {
        if paths.is_empty() {
            return Err(CovError::merge("no snapshot files match the run's naming pattern"));
        }

        let mut index = MergedIndex::new();
        for path in paths {
            let snapshot = self.reader.read(path)?;
            if !self.artifacts.contains(&snapshot.object) {
                return Err(CovError::discovery(format!(
                    "snapshot {} was written by {}, which is not a discovered test binary",
                    path.display(),
                    snapshot.object.display()
                )));
            }
            tracing::debug!(
                snapshot = %path.display(),
                functions = snapshot.functions.len(),
                "merging snapshot"
            );
            index.absorb(&snapshot)?;
        }
        Ok(index)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::snapshot::{FunctionCounters, JsonSnapshotReader, RegionCounter};
    use proptest::prelude::*;
    use tempfile::TempDir;

    const OBJ_A: &str = "/t/deps/a-1";
    const OBJ_B: &str = "/t/deps/b-2";

    fn function(name: &str, counts: &[u64]) -> FunctionCounters {
        FunctionCounters {
            name: name.to_string(),
            hash: 0xfeed,
            file: PathBuf::from("/w/src/lib.rs"),
            regions: counts
                .iter()
                .enumerate()
                .map(|(i, &c)| {
                    let line = i as u32 + 1;
                    RegionCounter::new(RegionSpan::new(line, 1, line, 20), c)
                })
                .collect(),
        }
    }

    fn artifacts() -> ArtifactSet {
        ArtifactSet::new([PathBuf::from(OBJ_A), PathBuf::from(OBJ_B)])
    }

    mod index_tests {
        use super::*;

        #[test]
        fn test_counts_are_summed_not_maxed() {
            let a = RawSnapshot::new(OBJ_A).with_function(function("f", &[10, 10, 10]));
            let b = RawSnapshot::new(OBJ_B).with_function(function("f", &[0, 0, 0]));
            let c = RawSnapshot::new(OBJ_A).with_function(function("f", &[5, 0, 1]));

            let index = MergedIndex::from_snapshots([&a, &b, &c]).unwrap();
            let f = index.record("f", 0xfeed).unwrap();
            assert_eq!(f.count(0), 15);
            assert_eq!(f.count(1), 10);
            assert_eq!(f.count(2), 11);
            assert_eq!(f.objects.len(), 2);
            assert_eq!(index.snapshot_count(), 3);
        }

        #[test]
        fn test_zero_counters_are_not_stored() {
            let a = RawSnapshot::new(OBJ_A).with_function(function("g", &[1, 0, 0, 0]));
            let index = MergedIndex::from_snapshots([&a]).unwrap();
            let g = index.record("g", 0xfeed).unwrap();
            assert_eq!(g.stored_counters(), 1);
            assert_eq!(g.regions.len(), 4);
            assert_eq!(g.count(3), 0);
            assert_eq!(g.count(99), 0);
        }

        #[test]
        fn test_inconsistent_regions_fail() {
            let a = RawSnapshot::new(OBJ_A).with_function(function("f", &[1, 1]));
            let b = RawSnapshot::new(OBJ_B).with_function(function("f", &[1, 1, 1]));
            let err = MergedIndex::from_snapshots([&a, &b]).unwrap_err();
            assert!(matches!(err, CovError::MergeFailure { .. }));
        }

        #[test]
        fn test_same_symbol_different_hash_are_separate_records() {
            let mut other = function("f", &[2]);
            other.hash = 0xbeef;
            let a = RawSnapshot::new(OBJ_A)
                .with_function(function("f", &[1]))
                .with_function(other);
            let index = MergedIndex::from_snapshots([&a]).unwrap();
            assert_eq!(index.len(), 2);
        }

        #[test]
        fn test_counter_saturates() {
            let a = RawSnapshot::new(OBJ_A).with_function(function("f", &[u64::MAX]));
            let b = RawSnapshot::new(OBJ_A).with_function(function("f", &[7]));
            let index = MergedIndex::from_snapshots([&a, &b]).unwrap();
            assert_eq!(index.record("f", 0xfeed).unwrap().entry_count(), u64::MAX);
        }

        #[test]
        fn test_check_objects() {
            let a = RawSnapshot::new("/elsewhere/x").with_function(function("f", &[1]));
            let index = MergedIndex::from_snapshots([&a]).unwrap();
            assert!(matches!(
                index.check_objects(&artifacts()).unwrap_err(),
                CovError::DiscoveryMismatch { .. }
            ));
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_index_file_roundtrip() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("nested").join("covpipe.profdata");
            let a = RawSnapshot::new(OBJ_A).with_function(function("f", &[3, 0, 4]));
            let index = MergedIndex::from_snapshots([&a]).unwrap();

            index.write_to(&path).unwrap();
            assert_eq!(MergedIndex::read_from(&path).unwrap(), index);
        }

        #[test]
        fn test_flipped_byte_fails_checksum() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("covpipe.profdata");
            let a = RawSnapshot::new(OBJ_A).with_function(function("f", &[3]));
            MergedIndex::from_snapshots([&a]).unwrap().write_to(&path).unwrap();

            let mut bytes = std::fs::read(&path).unwrap();
            let last = bytes.len() - 1;
            bytes[last] ^= 0xff;
            std::fs::write(&path, bytes).unwrap();

            let err = MergedIndex::read_from(&path).unwrap_err();
            assert!(err.to_string().contains("checksum"));
        }

        #[test]
        fn test_foreign_file_rejected() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("index.profdata");
            std::fs::write(&path, b"\xfflprofi\x81 not ours").unwrap();
            assert!(matches!(
                MergedIndex::read_from(&path).unwrap_err(),
                CovError::MergeFailure { .. }
            ));
        }
    }

    mod merger_tests {
        use super::*;

        fn write(dir: &Path, name: &str, snapshot: &RawSnapshot) -> PathBuf {
            let path = dir.join(name);
            snapshot.write_to(&path).unwrap();
            path
        }

        #[test]
        fn test_zero_snapshots_is_merge_failure() {
            let set = artifacts();
            let merger = ProfileMerger::new(&set, &JsonSnapshotReader);
            let err = merger.merge(&[]).unwrap_err();
            assert!(matches!(err, CovError::MergeFailure { .. }));
        }

        #[test]
        fn test_merges_files() {
            let temp = TempDir::new().unwrap();
            let paths = vec![
                write(
                    temp.path(),
                    "cov-1.json",
                    &RawSnapshot::new(OBJ_A).with_function(function("f", &[2])),
                ),
                write(
                    temp.path(),
                    "cov-2.json",
                    &RawSnapshot::new(OBJ_B).with_function(function("f", &[3])),
                ),
            ];
            let set = artifacts();
            let index = ProfileMerger::new(&set, &JsonSnapshotReader)
                .merge(&paths)
                .unwrap();
            assert_eq!(index.record("f", 0xfeed).unwrap().entry_count(), 5);
        }

        #[test]
        fn test_undiscovered_object_is_mismatch() {
            let temp = TempDir::new().unwrap();
            let paths = vec![write(
                temp.path(),
                "cov-1.json",
                &RawSnapshot::new("/t/deps/uninstrumented").with_function(function("f", &[2])),
            )];
            let set = artifacts();
            let err = ProfileMerger::new(&set, &JsonSnapshotReader)
                .merge(&paths)
                .unwrap_err();
            assert!(matches!(err, CovError::DiscoveryMismatch { .. }));
        }

        #[test]
        fn test_corrupt_file_aborts_merge() {
            let temp = TempDir::new().unwrap();
            let good = write(
                temp.path(),
                "cov-1.json",
                &RawSnapshot::new(OBJ_A).with_function(function("f", &[2])),
            );
            let bad = temp.path().join("cov-2.json");
            std::fs::write(&bad, "{\"object\": ").unwrap();
            let set = artifacts();
            let err = ProfileMerger::new(&set, &JsonSnapshotReader)
                .merge(&[good, bad])
                .unwrap_err();
            assert!(matches!(err, CovError::MergeFailure { .. }));
        }
    }

    mod property_tests {
        use super::*;

        fn snapshot_strategy() -> impl Strategy<Value = RawSnapshot> {
            (
                prop::bool::ANY,
                prop::collection::vec(
                    (0usize..4, prop::collection::vec(0u64..50, 3)),
                    0..4,
                ),
            )
                .prop_map(|(use_a, functions)| {
                    let mut snapshot = RawSnapshot::new(if use_a { OBJ_A } else { OBJ_B });
                    for (id, counts) in functions {
                        snapshot = snapshot.with_function(function(&format!("fn{id}"), &counts));
                    }
                    snapshot
                })
        }

        proptest! {
            #[test]
            fn prop_merge_is_order_independent(
                (snapshots, shuffled) in prop::collection::vec(snapshot_strategy(), 1..6)
                    .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
            ) {
                let forward = MergedIndex::from_snapshots(&snapshots).unwrap();
                let permuted = MergedIndex::from_snapshots(&shuffled).unwrap();
                prop_assert_eq!(forward, permuted);
            }

            #[test]
            fn prop_merge_is_idempotent(
                snapshots in prop::collection::vec(snapshot_strategy(), 1..6)
            ) {
                let first = MergedIndex::from_snapshots(&snapshots).unwrap();
                let second = MergedIndex::from_snapshots(&snapshots).unwrap();
                prop_assert_eq!(first, second);
            }
        }
    }
}
