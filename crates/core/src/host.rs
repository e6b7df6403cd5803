//! Boundaries to the host environment the pipeline runs inside.
//! 管線與宿主環境之間的邊界介面。

use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use importwatch_project::{DocumentOpener, ImportReader, ImportsNode};
use thiserror::Error;

use crate::events::PipelineError;
use crate::file_monitor::FileMonitorError;

/// Solution lifecycle notifications the host raises.
/// 宿主發出的方案生命週期通知。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolutionSignal {
    Opened,
    ProjectAdded,
    ProjectRemoved,
    BeforeClosing,
}

impl SolutionSignal {
    pub const ALL: [SolutionSignal; 4] = [
        SolutionSignal::Opened,
        SolutionSignal::ProjectAdded,
        SolutionSignal::ProjectRemoved,
        SolutionSignal::BeforeClosing,
    ];
}

/// Cookie for a host subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostCookie(pub u64);

pub type SignalHandler = Arc<dyn Fn() + Send + Sync>;

/// Errors raised by host accessors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("not implemented by this project type")]
    NotImplemented,
    #[error("host error: {0}")]
    Other(String),
}

/// The host's live solution object.
/// 宿主中即時的方案物件。
pub trait SolutionHost: Send + Sync {
    /// Full path of the open solution, `None` when nothing is open.
    fn solution_path(&self) -> Option<PathBuf>;

    /// File name of every project; individual projects may fail to answer.
    fn project_file_names(&self) -> Vec<Result<String, HostError>>;

    fn advise(&self, signal: SolutionSignal, handler: SignalHandler) -> HostCookie;

    fn unadvise(&self, signal: SolutionSignal, cookie: HostCookie);
}

/// Bit set of change kinds a file watch is interested in.
/// 檔案監看所關注的變更種類位元集合。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeMask(u32);

impl ChangeMask {
    pub const NONE: ChangeMask = ChangeMask(0);
    /// Last-write time changed.
    pub const TIME: ChangeMask = ChangeMask(0x01);
    pub const SIZE: ChangeMask = ChangeMask(0x02);
    pub const DELETE: ChangeMask = ChangeMask(0x04);
    pub const ADD: ChangeMask = ChangeMask(0x08);
    pub const ATTRIBUTES: ChangeMask = ChangeMask(0x10);

    pub fn contains(self, other: ChangeMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: ChangeMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ChangeMask {
    type Output = ChangeMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChangeMask(self.0 | rhs.0)
    }
}

impl fmt::Debug for ChangeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeMask({:#04x})", self.0)
    }
}

/// Opaque handle identifying one file watch registration.
/// 單一檔案監看註冊的代號。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchCookie(pub u64);

/// One file reported by the watch mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeMask,
}

/// Push callback of the file watch mechanism.
pub trait FileChangeSink: Send + Sync {
    fn files_changed(&self, changes: &[FileChange]);
}

/// Per-file watch registration service.
/// 逐檔註冊的檔案監看服務。
pub trait FileChangeService: Send + Sync {
    fn advise(
        &self,
        path: &Path,
        mask: ChangeMask,
        sink: Arc<dyn FileChangeSink>,
    ) -> Result<WatchCookie, FileMonitorError>;

    fn unadvise(&self, cookie: WatchCookie) -> Result<(), FileMonitorError>;
}

/// Registration flags for a virtual node in the host's project tree.
/// 虛擬節點加入宿主專案樹時的旗標。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VirtualNodeFlags(u32);

impl VirtualNodeFlags {
    pub const ADD_TO_PROJECT_WINDOW: VirtualNodeFlags = VirtualNodeFlags(0x01);
    pub const EXCLUDE_FROM_BUILD: VirtualNodeFlags = VirtualNodeFlags(0x02);
    pub const EXCLUDE_FROM_CFG_UI: VirtualNodeFlags = VirtualNodeFlags(0x04);
    pub const EXCLUDE_FROM_DEBUG_LAUNCH: VirtualNodeFlags = VirtualNodeFlags(0x08);
    pub const EXCLUDE_FROM_DEPLOY: VirtualNodeFlags = VirtualNodeFlags(0x10);
    pub const EXCLUDE_FROM_ENUM_OUTPUTS: VirtualNodeFlags = VirtualNodeFlags(0x20);
    pub const EXCLUDE_FROM_SCC: VirtualNodeFlags = VirtualNodeFlags(0x40);

    /// Visible in the project window, invisible to everything else.
    pub const DISPLAY_ONLY: VirtualNodeFlags = VirtualNodeFlags(0x7f);

    pub fn contains(self, other: VirtualNodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VirtualNodeFlags {
    type Output = VirtualNodeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        VirtualNodeFlags(self.0 | rhs.0)
    }
}

/// The host's registry of project-tree nodes.
pub trait ProjectTreeRegistry: Send + Sync {
    fn add_virtual_node(&self, node: Arc<ImportsNode>, flags: VirtualNodeFlags);

    fn remove_virtual_node(&self, node: &Arc<ImportsNode>);
}

/// Tells the user the feature stopped because of a fatal error.
pub trait FeatureNotifier: Send + Sync {
    fn feature_faulted(&self, error: &PipelineError);
}

/// Everything the feature needs from its host.
/// 功能運作所需的宿主服務集合。
#[derive(Clone)]
pub struct HostServices {
    pub solution: Arc<dyn SolutionHost>,
    pub file_changes: Arc<dyn FileChangeService>,
    pub tree_registry: Arc<dyn ProjectTreeRegistry>,
    pub opener: Arc<dyn DocumentOpener>,
    pub import_reader: Arc<dyn ImportReader>,
    pub notifier: Arc<dyn FeatureNotifier>,
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_only_flags_cover_every_exclusion() {
        let expected = VirtualNodeFlags::ADD_TO_PROJECT_WINDOW
            | VirtualNodeFlags::EXCLUDE_FROM_BUILD
            | VirtualNodeFlags::EXCLUDE_FROM_CFG_UI
            | VirtualNodeFlags::EXCLUDE_FROM_DEBUG_LAUNCH
            | VirtualNodeFlags::EXCLUDE_FROM_DEPLOY
            | VirtualNodeFlags::EXCLUDE_FROM_ENUM_OUTPUTS
            | VirtualNodeFlags::EXCLUDE_FROM_SCC;
        assert_eq!(VirtualNodeFlags::DISPLAY_ONLY, expected);
    }

    #[test]
    fn change_mask_set_operations() {
        let mask = ChangeMask::TIME | ChangeMask::SIZE;
        assert!(mask.contains(ChangeMask::TIME));
        assert!(!mask.contains(ChangeMask::TIME | ChangeMask::DELETE));
        assert!(mask.intersects(ChangeMask::SIZE | ChangeMask::DELETE));
        assert!(!ChangeMask::NONE.intersects(mask));
    }
}
