use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::util::normalize_path;

/// Project type GUID Visual Studio uses for solution folders.
const SOLUTION_FOLDER_TYPE: &str = "2150E333-8FDC-42A3-9474-1A3956D46DE8";

static PROJECT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*Project\("\{(?P<kind>[0-9A-Fa-f\-]+)\}"\)\s*=\s*"(?P<name>[^"]*)"\s*,\s*"(?P<path>[^"]*)"\s*,\s*"\{(?P<id>[0-9A-Fa-f\-]+)\}""#,
    )
    .expect("solution project pattern is valid")
});

/// A project entry declared in a solution file.
/// 方案檔中宣告的專案項目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionProject {
    pub name: String,
    pub path: PathBuf,
    pub type_guid: String,
    pub project_guid: String,
}

/// Parsed `.sln` solution file.
/// 解析後的 `.sln` 方案檔。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionFile {
    path: PathBuf,
    projects: Vec<SolutionProject>,
}

/// Errors raised while loading a solution file.
/// 載入方案檔時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum SolutionFileError {
    #[error("failed to read solution {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SolutionFile {
    /// Loads and parses the solution at `path`.
    /// 載入並解析指定路徑的方案檔。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SolutionFileError> {
        let path = normalize_path(&path.as_ref().to_string_lossy(), Path::new(""));
        let contents = fs::read_to_string(&path).map_err(|source| SolutionFileError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self::parse(path, &contents))
    }

    /// Parses solution contents; project paths resolve against the solution directory.
    /// 解析方案內容；專案路徑以方案所在資料夾為基準。
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Self {
        let path = path.into();
        let directory = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let projects = contents
            .lines()
            .filter_map(|line| PROJECT_LINE.captures(line))
            .filter(|caps| !caps["kind"].eq_ignore_ascii_case(SOLUTION_FOLDER_TYPE))
            .map(|caps| SolutionProject {
                name: caps["name"].to_string(),
                path: normalize_path(&caps["path"], &directory),
                type_guid: caps["kind"].to_uppercase(),
                project_guid: caps["id"].to_uppercase(),
            })
            .collect();
        Self { path, projects }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn projects(&self) -> &[SolutionProject] {
        &self.projects
    }
}
