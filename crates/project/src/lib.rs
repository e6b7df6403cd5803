//! Project-model primitives for the imports watcher: import discovery,
//! solution files and the read-only "Watched Imports" virtual node.
//! 匯入監看功能的專案模型：匯入探索、方案檔解析與唯讀的「Watched Imports」虛擬節點。

mod util;

pub mod imports;
pub mod solution;
pub mod tree;

pub use imports::{ImportReadError, ImportReader, MsBuildImportReader};
pub use solution::{SolutionFile, SolutionFileError, SolutionProject};
pub use tree::{
    DocumentOpener, HierarchyEvents, ImportItemProperties, ImportsNode, ItemId, NodeError,
    NodeScope, OpenDocumentError, PropertyKey, PropertyValue, SinkCookie, StateIcon,
    WindowHandle, WATCHED_IMPORT_TYPE_GUID,
};
pub use util::normalize_path;
