//! Durable state store.
//!
//! [`State`] keeps one serde value in memory behind a mutex and mirrors it to
//! a MessagePack file. Saves write `<path>.tmp` next to the destination, sync
//! it, then rename it over the destination, so a reader sees either the old
//! file or the new one and never a torn write.

use std::fs::{self, File};
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::StoreError;

/// A value persisted to disk on demand.
pub struct State<T> {
    path: PathBuf,
    value: Mutex<T>,
}

impl<T> State<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Open the store at `path`.
    ///
    /// A missing or empty file starts from `default`, which is saved
    /// immediately. An existing file that does not decode is an error; the
    /// caller decides whether that is fatal.
    pub fn open(path: impl Into<PathBuf>, default: T) -> Result<Self, StoreError> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        if bytes.is_empty() {
            info!(path = %path.display(), "Initializing state file");
            write_atomic(&path, &default)?;
            return Ok(Self {
                path,
                value: Mutex::new(default),
            });
        }

        let value = rmp_serde::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "State loaded");

        Ok(Self {
            path,
            value: Mutex::new(value),
        })
    }

    /// A copy of the current in-memory value.
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Replace the in-memory value. Call [`State::save`] to persist it.
    pub fn set(&self, value: T) {
        *self.value.lock() = value;
    }

    /// Lock the value for a read-modify-save sequence.
    pub fn lock(&self) -> StateGuard<'_, T> {
        StateGuard {
            value: self.value.lock(),
            path: &self.path,
        }
    }

    /// Persist the current value.
    pub fn save(&self) -> Result<(), StoreError> {
        self.lock().save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Exclusive access to a [`State`] value.
///
/// Other readers and writers wait until the guard is dropped, which makes
/// "mutate, then save" atomic with respect to them.
pub struct StateGuard<'a, T> {
    value: MutexGuard<'a, T>,
    path: &'a Path,
}

impl<T: Serialize> StateGuard<'_, T> {
    /// Persist the guarded value without releasing the lock.
    pub fn save(&self) -> Result<(), StoreError> {
        write_atomic(self.path, &*self.value)
    }
}

impl<T> Deref for StateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for StateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let temp = temp_path(path);
    write_temp(&temp, value)?;
    fs::rename(&temp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "State saved");
    Ok(())
}

/// Encode `value` into `temp` and flush it to disk.
fn write_temp<T: Serialize + ?Sized>(temp: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = rmp_serde::to_vec_named(value)?;
    let io_err = |source| StoreError::Io {
        path: temp.to_path_buf(),
        source,
    };

    let mut file = File::create(temp).map_err(io_err)?;
    file.write_all(&bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    Ok(())
}
