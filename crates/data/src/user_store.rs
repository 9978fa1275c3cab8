use coinledger_core::{StoreError, User, UserStore};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// A user store backed by a flat file, one record per line.
///
/// The whole file is loaded into an in-memory index on open. Every `add` and
/// `update` rewrites the file (temp file + rename) before returning; if the
/// write fails the index is rolled back.
pub struct FileUserStore {
    path: PathBuf,
    users: HashMap<String, User>,
}

impl FileUserStore {
    /// Open (or lazily create) the store at `path`. A missing file is an
    /// empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let users = match File::open(&path) {
            Ok(file) => load_users(BufReader::new(file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };

        info!(path = %path.display(), users = users.len(), "User store opened");
        Ok(Self { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn persist(&self) -> Result<(), StoreError> {
        write_users(&self.path, &self.users).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to persist users");
            StoreError::Io(e)
        })
    }
}

impl UserStore for FileUserStore {
    fn get(&self, username: &str) -> Option<User> {
        self.users.get(username).cloned()
    }

    fn add(&mut self, user: User) -> Result<(), StoreError> {
        if self.users.contains_key(&user.username) {
            return Err(StoreError::DuplicateUser);
        }

        let username = user.username.clone();
        self.users.insert(username.clone(), user);
        if let Err(e) = self.persist() {
            self.users.remove(&username);
            return Err(e);
        }
        Ok(())
    }

    fn update(&mut self, user: &User) -> Result<(), StoreError> {
        let previous = self.users.insert(user.username.clone(), user.clone());
        if let Err(e) = self.persist() {
            match previous {
                Some(previous) => self.users.insert(user.username.clone(), previous),
                None => self.users.remove(&user.username),
            };
            return Err(e);
        }
        Ok(())
    }
}

/// A user store that lives only in memory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: HashMap<String, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn get(&self, username: &str) -> Option<User> {
        self.users.get(username).cloned()
    }

    fn add(&mut self, user: User) -> Result<(), StoreError> {
        if self.users.contains_key(&user.username) {
            return Err(StoreError::DuplicateUser);
        }
        self.users.insert(user.username.clone(), user);
        Ok(())
    }

    fn update(&mut self, user: &User) -> Result<(), StoreError> {
        self.users.insert(user.username.clone(), user.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_users(reader: impl BufRead) -> Result<HashMap<String, User>, StoreError> {
    let mut users = HashMap::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let user: User = line.parse().map_err(|source| StoreError::Record {
            line: i + 1,
            source,
        })?;
        users.insert(user.username.clone(), user);
    }
    Ok(users)
}

fn write_users(path: &Path, users: &HashMap<String, User>) -> io::Result<()> {
    let mut records: Vec<&User> = users.values().collect();
    records.sort_by(|a, b| a.username.cmp(&b.username));

    let tmp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for user in records {
            writeln!(writer, "{user}")?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)
}
