use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::PersistError;

/// Leading bytes of every snapshot file.
pub(crate) const SNAPSHOT_MAGIC: [u8; 8] = *b"PMEMOSNP";

/// Bumped whenever the layout of `Snapshot` changes.
pub(crate) const SNAPSHOT_FORMAT_VERSION: u32 = 2;

/// File name prefix used when the storage path is a directory.
pub(crate) const SNAPSHOT_FILE_PREFIX: &str = "memoize";

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Serialize)]
struct SnapshotRef<'a, K, V> {
    version: u32,
    name: &'a str,
    entries: Vec<(&'a K, &'a V)>,
}

#[derive(Deserialize)]
struct Snapshot<K, V> {
    #[allow(dead_code)]
    version: u32,
    name: String,
    entries: Vec<(K, V)>,
}

fn codec() -> impl Options + Copy {
    bincode::DefaultOptions::new()
}

/// Returns the file the snapshot of the function `name` lives in.
///
/// A path naming an existing directory gets `memoize_<name>` appended, so that
/// several caches can share one directory.
pub(crate) fn resolve_path(path: &Path, name: &str) -> PathBuf {
    if path.is_dir() {
        path.join(format!("{SNAPSHOT_FILE_PREFIX}_{name}"))
    } else {
        path.to_path_buf()
    }
}

/// Reads the entries of a snapshot, oldest first.
pub(crate) fn load<K, V>(path: &Path, name: &str) -> Result<Vec<(K, V)>, PersistError>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let bytes = fs::read(path)?;
    let body = bytes
        .strip_prefix(&SNAPSHOT_MAGIC[..])
        .ok_or(PersistError::NotASnapshot)?;

    let header: Header = codec().allow_trailing_bytes().deserialize(body)?;
    if header.version != SNAPSHOT_FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: header.version,
            expected: SNAPSHOT_FORMAT_VERSION,
        });
    }

    let snapshot: Snapshot<K, V> = codec().deserialize(body)?;
    if snapshot.name != name {
        log::debug!(
            "[{name}] Loading a snapshot written for '{}' from {}",
            snapshot.name,
            path.display()
        );
    }
    Ok(snapshot.entries)
}

/// Writes the entries to `path`, replacing the previous snapshot.
///
/// The encoded snapshot is decoded back before anything is written, so a value
/// that cannot survive the round trip leaves the previous snapshot in place.
/// The snapshot is then written to a temporary file next to `path` and renamed
/// over it.
pub(crate) fn save<'a, K, V>(
    path: &Path,
    name: &str,
    entries: impl Iterator<Item = (&'a K, &'a V)>,
) -> Result<(), PersistError>
where
    K: Serialize + DeserializeOwned + 'a,
    V: Serialize + DeserializeOwned + 'a,
{
    let snapshot = SnapshotRef {
        version: SNAPSHOT_FORMAT_VERSION,
        name,
        entries: entries.collect(),
    };
    let body = codec().serialize(&snapshot)?;
    codec().deserialize::<Snapshot<K, V>>(&body)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&SNAPSHOT_MAGIC)?;
    file.write_all(&body)?;
    file.flush()?;
    file.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{codec, load, resolve_path, save, SNAPSHOT_FORMAT_VERSION, SNAPSHOT_MAGIC};
    use crate::PersistError;

    use bincode::Options;
    use serde::{Deserialize, Deserializer, Serialize};
    use std::{
        collections::{BTreeMap, HashMap},
        fs,
    };

    type Entries = Vec<((i64, String), (i64, String))>;

    #[test]
    fn round_trip_keeps_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");

        let entries: Entries = vec![
            ((9434, "xo".into()), (28302, "xoxo".into())),
            ((1, "a".into()), (3, "aa".into())),
            ((-5, "".into()), (-15, "".into())),
        ];
        save(&path, "somecall", entries.iter().map(|(k, v)| (k, v)))?;

        let loaded: Entries = load(&path, "somecall")?;
        assert_eq!(loaded, entries);
        Ok(())
    }

    #[test]
    fn round_trip_nested_values() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");

        let mut nested = BTreeMap::new();
        nested.insert("pi".to_string(), vec![Some(3.25f64), None]);
        let entries = vec![((1u8, true), nested)];
        save(&path, "f", entries.iter().map(|(k, v)| (k, v)))?;

        let loaded: Vec<((u8, bool), BTreeMap<String, Vec<Option<f64>>>)> = load(&path, "f")?;
        assert_eq!(loaded, entries);
        Ok(())
    }

    #[test]
    fn round_trip_non_finite_floats() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");

        let entries = vec![
            (100u32, 1.5f64),
            (1, f64::INFINITY),
            (2, f64::NEG_INFINITY),
            (3, f64::NAN),
        ];
        save(&path, "ratio", entries.iter().map(|(k, v)| (k, v)))?;

        let loaded: Vec<(u32, f64)> = load(&path, "ratio")?;
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[..3], entries[..3]);
        assert_eq!(loaded[3].0, 3);
        assert!(loaded[3].1.is_nan());
        Ok(())
    }

    #[test]
    fn round_trip_maps_with_tuple_keys() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");

        let mut grid = HashMap::new();
        grid.insert((0u32, 1u32), -0.5f32);
        grid.insert((7, 3), f32::INFINITY);
        let entries = vec![("grid".to_string(), grid)];
        save(&path, "f", entries.iter().map(|(k, v)| (k, v)))?;

        let loaded: Vec<(String, HashMap<(u32, u32), f32>)> = load(&path, "f")?;
        assert_eq!(loaded, entries);
        Ok(())
    }

    /// Serializes fine, but only deserializes from self-describing formats.
    #[derive(Serialize)]
    struct Untyped(u32);

    impl<'de> Deserialize<'de> for Untyped {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(serde::de::IgnoredAny)?;
            Ok(Untyped(0))
        }
    }

    #[test]
    fn unreadable_snapshot_keeps_the_previous_one() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");

        save(&path, "f", [(&1u32, &Untyped(1))].into_iter()).unwrap_err();
        assert!(!path.exists());

        // Replace with a typed snapshot, then fail to overwrite it.
        save(&path, "f", [(&1u32, &10u32)].into_iter())?;
        let before = fs::read(&path)?;
        let err = save(&path, "f", [(&2u32, &Untyped(2))].into_iter()).unwrap_err();
        assert!(matches!(err, PersistError::Codec(_)), "{err}");
        assert_eq!(fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn save_replaces_previous_snapshot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");

        save(&path, "f", [(&1u32, &10u32), (&2, &20)].into_iter())?;
        save(&path, "f", [(&3u32, &30u32)].into_iter())?;

        let loaded: Vec<(u32, u32)> = load(&path, "f")?;
        assert_eq!(loaded, vec![(3, 30)]);
        // Only the snapshot is left behind, no temporary files.
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load::<u32, u32>(&dir.path().join("nope"), "f").unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot");

        fs::write(&path, "OrderedDict([((55,), 5)])").unwrap();
        let err = load::<u32, u32>(&path, "f").unwrap_err();
        assert!(matches!(err, PersistError::NotASnapshot), "{err}");

        fs::write(&path, &SNAPSHOT_MAGIC[..3]).unwrap();
        let err = load::<u32, u32>(&path, "f").unwrap_err();
        assert!(matches!(err, PersistError::NotASnapshot), "{err}");
    }

    #[test]
    fn malformed_content() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");

        // Truncated after the header.
        let mut body = SNAPSHOT_MAGIC.to_vec();
        body.extend(codec().serialize(&SNAPSHOT_FORMAT_VERSION)?);
        fs::write(&path, &body)?;
        let err = load::<u32, u32>(&path, "f").unwrap_err();
        assert!(matches!(err, PersistError::Codec(_)), "{err}");

        // Well-formed, but the wrong value type.
        save(&path, "f", [(&1u32, &"one".to_string())].into_iter())?;
        let err = load::<u32, u32>(&path, "f").unwrap_err();
        assert!(matches!(err, PersistError::Codec(_)), "{err}");
        Ok(())
    }

    #[test]
    fn unknown_version() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot");
        let mut body = SNAPSHOT_MAGIC.to_vec();
        body.extend(codec().serialize(&99u32)?);
        body.extend(b"something else");
        fs::write(&path, body)?;

        match load::<u32, u32>(&path, "f") {
            Err(PersistError::UnsupportedVersion { found, expected }) => {
                assert_eq!(found, 99);
                assert_eq!(expected, SNAPSHOT_FORMAT_VERSION);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn save_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone").join("snapshot");
        let err = save(&path, "f", [(&1u32, &1u32)].into_iter()).unwrap_err();
        assert!(matches!(err, PersistError::Io(_)), "{err}");
    }

    #[test]
    fn directory_gets_file_name() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_path(dir.path(), "testdb"),
            dir.path().join("memoize_testdb")
        );

        let file = dir.path().join("custom.snapshot");
        assert_eq!(resolve_path(&file, "testdb"), file);
    }
}
