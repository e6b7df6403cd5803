use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use thiserror::Error;

use crate::watch::FileTouched;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to touch solution file {path}: {source}")]
    Touch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Last stage: bumps the solution file's write time so the host offers a reload.
/// 最後階段：更新方案檔的修改時間，促使宿主提示重新載入。
#[derive(Debug, Default, Clone, Copy)]
pub struct ReloadSignaler;

impl ReloadSignaler {
    pub fn new() -> Self {
        Self
    }

    pub fn on_file_touched(&self, event: &FileTouched) -> Result<(), ReloadError> {
        touch(&event.solution_path)
    }
}

fn touch(path: &Path) -> Result<(), ReloadError> {
    filetime::set_file_mtime(path, FileTime::now()).map_err(|source| ReloadError::Touch {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("touched {} to request a solution reload", path.display());
    Ok(())
}
