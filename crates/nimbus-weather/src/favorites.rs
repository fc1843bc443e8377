//! Favorite cities with write-through file persistence.
//!
//! The file holds one city per line. Every mutation rewrites the whole file
//! while still holding the set's lock, so what is on disk always matches the
//! last completed mutation. If saving fails the in-memory set is kept anyway.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::types::PersistenceError;

#[derive(Debug)]
pub struct FavoritesStore {
    path: PathBuf,
    cities: Mutex<BTreeSet<String>>,
}

impl FavoritesStore {
    /// Open the store at `path`, loading any existing entries.
    ///
    /// A missing file is an empty set. An unreadable file is logged and also
    /// treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cities = match load(&path) {
            Ok(cities) => cities,
            Err(e) => {
                tracing::warn!("Could not load favorites: {}", e);
                BTreeSet::new()
            }
        };

        tracing::debug!(
            "Loaded {} favorite cities from {}",
            cities.len(),
            path.display()
        );

        Self {
            path,
            cities: Mutex::new(cities),
        }
    }

    /// Add `city`; returns whether it was new.
    ///
    /// The set is updated even when persisting fails.
    pub fn add(&self, city: &str) -> Result<bool, PersistenceError> {
        let mut cities = self.cities.lock();
        let inserted = cities.insert(city.to_string());
        if inserted {
            save(&self.path, &cities)?;
        }
        Ok(inserted)
    }

    /// Remove `city`; returns whether it was present.
    pub fn remove(&self, city: &str) -> Result<bool, PersistenceError> {
        let mut cities = self.cities.lock();
        let removed = cities.remove(city);
        if removed {
            save(&self.path, &cities)?;
        }
        Ok(removed)
    }

    pub fn contains(&self, city: &str) -> bool {
        self.cities.lock().contains(city)
    }

    /// Sorted copy of the favorites.
    pub fn list(&self) -> Vec<String> {
        self.cities.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.lock().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load(path: &Path) -> Result<BTreeSet<String>, PersistenceError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    Ok(contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Write to a sibling temp file, then rename over the target.
fn save(path: &Path, cities: &BTreeSet<String>) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = path.with_extension("tmp");
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(&tmp).map_err(write_err)?;
    for city in cities {
        writeln!(file, "{}", city).map_err(write_err)?;
    }
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FavoritesStore::open(dir.path().join("favorites.txt"));
        assert!(store.is_empty());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorites.txt");

        {
            let store = FavoritesStore::open(&path);
            assert!(store.add("Paris").unwrap());
        }

        let reopened = FavoritesStore::open(&path);
        assert_eq!(reopened.list(), vec!["Paris".to_string()]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Paris\n");
    }

    #[test]
    fn test_add_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FavoritesStore::open(dir.path().join("favorites.txt"));

        assert!(store.add("Paris").unwrap());
        assert!(!store.add("Paris").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_exact_match_no_case_folding() {
        let dir = TempDir::new().unwrap();
        let store = FavoritesStore::open(dir.path().join("favorites.txt"));

        store.add("paris").unwrap();
        store.add("Paris").unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains("Paris"));
        assert!(!store.contains("PARIS"));
    }

    #[test]
    fn test_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorites.txt");
        let store = FavoritesStore::open(&path);

        store.add("Tel Aviv").unwrap();
        store.add("Haifa").unwrap();
        assert!(store.remove("Haifa").unwrap());
        assert!(!store.remove("Haifa").unwrap());

        let reopened = FavoritesStore::open(&path);
        assert_eq!(reopened.list(), vec!["Tel Aviv".to_string()]);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("favorites.txt");
        let store = FavoritesStore::open(&path);

        store.add("Oslo").unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_blank_lines_ignored_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorites.txt");
        fs::write(&path, "Rome\n\nMilan\n").unwrap();

        let store = FavoritesStore::open(&path);
        assert_eq!(store.list(), vec!["Milan".to_string(), "Rome".to_string()]);
    }

    #[test]
    fn test_persistence_failure_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        // A regular file where a directory is expected makes every save fail.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let store = FavoritesStore::open(blocker.join("favorites.txt"));

        assert!(store.add("Paris").is_err());
        assert!(store.contains("Paris"));
        assert_eq!(store.list(), vec!["Paris".to_string()]);
    }

    #[test]
    fn test_concurrent_adds_are_all_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favorites.txt");
        let store = Arc::new(FavoritesStore::open(&path));
        let done = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    for k in 0..10 {
                        let city = format!("City {}-{}", w, k);
                        assert!(store.add(&city).unwrap());
                        let list: BTreeSet<String> = store.list().into_iter().collect();
                        assert!(list.contains(&city));
                        seen.push(list);
                    }
                    seen
                })
            })
            .collect();

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let path = path.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut seen: Vec<BTreeSet<String>> = Vec::new();
                    let mut on_disk: Vec<BTreeSet<String>> = Vec::new();
                    while !done.load(Ordering::SeqCst) {
                        let list: BTreeSet<String> = store.list().into_iter().collect();
                        if let Some(previous) = seen.last() {
                            assert!(previous.is_subset(&list));
                        }
                        seen.push(list);

                        let file = load(&path).unwrap();
                        if let Some(previous) = on_disk.last() {
                            assert!(previous.is_subset(&file));
                        }
                        on_disk.push(file);
                    }
                    (seen, on_disk)
                })
            })
            .collect();

        let mut observed: Vec<BTreeSet<String>> = Vec::new();
        for writer in writers {
            let seen = writer.join().unwrap();
            for pair in seen.windows(2) {
                assert!(pair[0].len() < pair[1].len());
            }
            observed.extend(seen);
        }
        done.store(true, Ordering::SeqCst);

        let final_set: BTreeSet<String> = store.list().into_iter().collect();
        assert_eq!(final_set.len(), 40);

        for reader in readers {
            let (seen, on_disk) = reader.join().unwrap();
            for list in seen.iter().chain(&on_disk) {
                assert!(list.is_subset(&final_set));
            }
            observed.extend(seen);
        }

        let persisted = load(&path).unwrap();
        assert!(observed.contains(&persisted));
        assert_eq!(persisted, final_set);
        assert_eq!(FavoritesStore::open(&path).len(), 40);
    }
}
