use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version written by this build.
/// 本版本寫出的設定檔結構版本。
pub const PREFERENCES_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("cannot access preferences {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed preferences {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("preferences {path} use schema version {found}, this build reads up to {supported}")]
    Unsupported {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

/// On-disk layout: `{ "version": 1, "import_watcher": { "enabled": bool } }`.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub version: u32,
    pub import_watcher: ImportWatcherPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            import_watcher: ImportWatcherPreferences::default(),
        }
    }
}

/// "Solution Imports Watcher" options: prompt for a solution reload when any
/// project import changes on disk. Off until the user opts in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportWatcherPreferences {
    pub enabled: bool,
}

/// Preferences bound to the JSON file they were read from.
/// 與來源 JSON 檔綁定的偏好設定。
#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        Self {
            path: path.into(),
            data: preferences,
        }
    }

    /// Reads `path`, or starts from defaults without creating it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Preferences>(&contents).map_err(|source| {
                PreferencesError::Format {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Preferences::default(),
            Err(source) => return Err(PreferencesError::Io { path, source }),
        };
        if data.version > PREFERENCES_VERSION {
            return Err(PreferencesError::Unsupported {
                path,
                found: data.version,
                supported: PREFERENCES_VERSION,
            });
        }
        Ok(Self { path, data })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn import_watcher_enabled(&self) -> bool {
        self.data.import_watcher.enabled
    }

    /// Persists the watcher switch. Returns whether the stored value changed;
    /// an unchanged value is not rewritten.
    /// 寫入監看開關，回傳值是否改變。
    pub fn set_import_watcher_enabled(&mut self, enabled: bool) -> Result<bool, PreferencesError> {
        if self.data.import_watcher.enabled == enabled && self.path.exists() {
            return Ok(false);
        }
        let changed = self.data.import_watcher.enabled != enabled;
        self.data.import_watcher.enabled = enabled;
        self.data.version = PREFERENCES_VERSION;
        self.save()?;
        Ok(changed)
    }

    /// Writes through a sibling temporary file so readers never see a
    /// partial document.
    pub fn save(&self) -> Result<(), PreferencesError> {
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PreferencesError::Io { path, source }
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let payload =
            serde_json::to_string_pretty(&self.data).map_err(|source| PreferencesError::Format {
                path: self.path.clone(),
                source,
            })?;

        let staged = self.path.with_extension("json.tmp");
        fs::write(&staged, payload.as_bytes()).map_err(io_error(staged.as_path()))?;
        fs::rename(&staged, &self.path).map_err(io_error(self.path.as_path()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
