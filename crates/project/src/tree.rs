use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::util::paths_equal_ignore_case;

/// Type GUID reported for the root and every item of the node.
/// 根節點與所有項目回報的類型 GUID。
pub const WATCHED_IMPORT_TYPE_GUID: &str = "D98191F7-EB49-4784-8D3D-F7F61A1BE7FF";

const ROOT_CAPTION: &str = "Watched Imports";
const ROOT_NAME: &str = "Watched Imports Name";
const TYPE_NAME: &str = "WatchedImportType";
const EDITOR_CAPTION_PREFIX: &str = "Imports Watcher - ";

/// Identifier of an item inside the virtual node. `0` is never allocated.
/// 虛擬節點內項目的識別碼；`0` 保留不配發。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u32);

impl ItemId {
    /// "No item"; returned by lookups that found nothing.
    pub const NONE: ItemId = ItemId(0);
    /// The first identifier handed out for an import.
    pub const FIRST: ItemId = ItemId(1);
    /// The node's own root.
    pub const ROOT: ItemId = ItemId(0xFFFF_FFFE);
    /// Terminal sentinel: no parent, no sibling, no child.
    pub const NIL: ItemId = ItemId(0xFFFF_FFFF);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ItemId::ROOT => write!(f, "root"),
            ItemId::NIL => write!(f, "nil"),
            ItemId(raw) => write!(f, "{raw}"),
        }
    }
}

/// Cookie returned when an invalidation sink is advised.
/// 註冊失效通知接收端時回傳的 cookie。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkCookie(u32);

impl SinkCookie {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Opaque handle for an editor window opened on an item.
/// 開啟項目後的編輯器視窗代號。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Receives "items invalidated" notifications from the node.
/// 接收節點「項目失效」通知的介面。
pub trait HierarchyEvents: Send + Sync {
    /// The children of `parent` must be re-queried from scratch.
    fn on_invalidate_items(&self, parent: ItemId);
}

/// Host primitive that opens a file in its standard editor.
/// 由宿主提供、以標準編輯器開啟檔案的功能。
pub trait DocumentOpener: Send + Sync {
    fn open_standard_editor(
        &self,
        path: &Path,
        caption: &str,
    ) -> Result<WindowHandle, OpenDocumentError>;
}

/// Failure reported by a [`DocumentOpener`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to open {path}: {message}")]
pub struct OpenDocumentError {
    pub path: PathBuf,
    pub message: String,
}

/// Scope a property is looked up in.
/// 屬性查詢的範圍（根節點或項目）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeScope {
    Root,
    Item,
}

/// Properties the host may query on the node.
/// 宿主可查詢的節點屬性。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Caption,
    Name,
    Expandable,
    ExpandByDefault,
    Expanded,
    FirstChild,
    NextSibling,
    Parent,
    HandlesOwnReload,
    IconIndex,
    OpenFolderIconIndex,
    StateIconIndex,
    TypeGuid,
    TypeName,
    BrowseObject,
}

/// Overlay icon drawn next to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateIcon {
    Blank,
    ReadOnly,
}

/// Typed result of a property query.
/// 屬性查詢的型別化結果。
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Flag(bool),
    Item(ItemId),
    Index(i32),
    StateIcon(StateIcon),
    Guid(&'static str),
    Browse(ImportItemProperties),
}

/// Properties shown by a property inspector for one watched import.
/// 屬性檢視器為單一監看匯入顯示的內容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItemProperties {
    pub full_path: PathBuf,
    /// Read from disk at query time; `None` when the file is gone.
    pub last_write_time: Option<SystemTime>,
}

/// Errors returned by node queries and (unsupported) mutations.
/// 節點查詢與（不支援的）變更操作所回傳的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("no document named {0}")]
    UnknownDocument(String),
    #[error("property {key:?} is not defined for {scope:?} scope")]
    InvalidProperty { scope: NodeScope, key: PropertyKey },
    #[error("{0} is not supported by the read-only imports node")]
    NotImplemented(&'static str),
    #[error(transparent)]
    Open(#[from] OpenDocumentError),
}

/// Dense identifier space: item `i` (1-based) is `paths[i - 1]`.
#[derive(Debug, Default)]
struct ItemTable {
    paths: Vec<PathBuf>,
}

impl ItemTable {
    fn new(paths: Vec<PathBuf>) -> Self {
        let mut seen = HashSet::new();
        let paths = paths
            .into_iter()
            .filter(|path| seen.insert(path.clone()))
            .collect();
        Self { paths }
    }

    /// One past the last allocated identifier.
    fn next_unallocated(&self) -> u32 {
        ItemId::FIRST.0 + self.paths.len() as u32
    }

    fn contains(&self, id: ItemId) -> bool {
        id.0 >= ItemId::FIRST.0 && id.0 < self.next_unallocated()
    }

    fn path(&self, id: ItemId) -> Option<&Path> {
        if !self.contains(id) {
            return None;
        }
        self.paths
            .get((id.0 - ItemId::FIRST.0) as usize)
            .map(PathBuf::as_path)
    }

    fn find(&self, candidate: &Path) -> Option<ItemId> {
        self.paths
            .iter()
            .position(|path| paths_equal_ignore_case(path, candidate))
            .map(|index| ItemId(ItemId::FIRST.0 + index as u32))
    }

    fn first_child(&self) -> ItemId {
        if self.paths.is_empty() {
            ItemId::NIL
        } else {
            ItemId::FIRST
        }
    }

    fn next_sibling(&self, id: ItemId) -> ItemId {
        let next = id.0.saturating_add(1);
        if id.0 >= ItemId::FIRST.0 && next < self.next_unallocated() {
            ItemId(next)
        } else {
            ItemId::NIL
        }
    }
}

type Producer = fn(&ItemTable, ItemId) -> Result<PropertyValue, NodeError>;

static PROPERTY_TABLE: Lazy<HashMap<(NodeScope, PropertyKey), Producer>> = Lazy::new(|| {
    use NodeScope::{Item, Root};
    use PropertyKey::*;

    let entries: [((NodeScope, PropertyKey), Producer); 25] = [
        ((Root, Caption), |_, _| Ok(PropertyValue::Text(ROOT_CAPTION.into()))),
        ((Root, Name), |_, _| Ok(PropertyValue::Text(ROOT_NAME.into()))),
        ((Root, Expandable), |_, _| Ok(PropertyValue::Flag(true))),
        ((Root, ExpandByDefault), |_, _| Ok(PropertyValue::Flag(true))),
        ((Root, Expanded), |_, _| Ok(PropertyValue::Flag(true))),
        ((Root, FirstChild), |items, _| Ok(PropertyValue::Item(items.first_child()))),
        ((Root, HandlesOwnReload), |_, _| Ok(PropertyValue::Flag(true))),
        ((Root, IconIndex), |_, _| Ok(PropertyValue::Index(2))),
        ((Root, OpenFolderIconIndex), |_, _| Ok(PropertyValue::Index(3))),
        ((Root, Parent), |_, _| Ok(PropertyValue::Item(ItemId::NIL))),
        ((Root, StateIconIndex), |_, _| Ok(PropertyValue::StateIcon(StateIcon::ReadOnly))),
        ((Root, TypeGuid), |_, _| Ok(PropertyValue::Guid(WATCHED_IMPORT_TYPE_GUID))),
        ((Root, TypeName), |_, _| Ok(PropertyValue::Text(TYPE_NAME.into()))),
        ((Item, Name), |items, id| {
            item_path(items, id).map(|path| PropertyValue::Text(path.to_string_lossy().into_owned()))
        }),
        ((Item, Caption), |items, id| {
            item_path(items, id).map(|path| PropertyValue::Text(display_name(path)))
        }),
        ((Item, NextSibling), |items, id| Ok(PropertyValue::Item(items.next_sibling(id)))),
        ((Item, BrowseObject), |items, id| {
            item_path(items, id).map(|path| PropertyValue::Browse(browse_object(path)))
        }),
        ((Item, Expandable), |_, _| Ok(PropertyValue::Flag(false))),
        ((Item, ExpandByDefault), |_, _| Ok(PropertyValue::Flag(false))),
        ((Item, Expanded), |_, _| Ok(PropertyValue::Flag(false))),
        ((Item, Parent), |_, _| Ok(PropertyValue::Item(ItemId::ROOT))),
        ((Item, HandlesOwnReload), |_, _| Ok(PropertyValue::Flag(true))),
        ((Item, StateIconIndex), |_, _| Ok(PropertyValue::StateIcon(StateIcon::Blank))),
        ((Item, TypeGuid), |_, _| Ok(PropertyValue::Guid(WATCHED_IMPORT_TYPE_GUID))),
        ((Item, TypeName), |_, _| Ok(PropertyValue::Text(TYPE_NAME.into()))),
    ];
    HashMap::from(entries)
});

fn item_path(items: &ItemTable, id: ItemId) -> Result<&Path, NodeError> {
    items.path(id).ok_or(NodeError::NotFound(id))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn browse_object(path: &Path) -> ImportItemProperties {
    ImportItemProperties {
        full_path: path.to_path_buf(),
        last_write_time: fs::metadata(path).and_then(|meta| meta.modified()).ok(),
    }
}

/// Read-only virtual node listing the watched imports of the open solution.
/// 列出目前方案所監看匯入檔的唯讀虛擬節點。
///
/// The identifier mapping is replaced wholesale by [`ImportsNode::replace_items`];
/// identifiers handed out before a replacement are meaningless afterwards.
pub struct ImportsNode {
    items: RwLock<Arc<ItemTable>>,
    sinks: Mutex<Vec<(SinkCookie, Arc<dyn HierarchyEvents>)>>,
    next_cookie: AtomicU32,
    opener: Arc<dyn DocumentOpener>,
}

impl fmt::Debug for ImportsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportsNode")
            .field("items", &self.items())
            .finish_non_exhaustive()
    }
}

impl ImportsNode {
    /// Creates a node whose items are `paths`, numbered from 1 in order.
    /// 建立節點，項目依序自 1 起編號。
    pub fn new(paths: Vec<PathBuf>, opener: Arc<dyn DocumentOpener>) -> Self {
        Self {
            items: RwLock::new(Arc::new(ItemTable::new(paths))),
            sinks: Mutex::new(Vec::new()),
            next_cookie: AtomicU32::new(1),
            opener,
        }
    }

    fn table(&self) -> Arc<ItemTable> {
        Arc::clone(&self.items.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swaps in a fresh identifier mapping, then tells every sink to re-query.
    /// 置換整份識別碼對應，並通知所有接收端重新查詢。
    pub fn replace_items(&self, paths: Vec<PathBuf>) {
        let table = Arc::new(ItemTable::new(paths));
        *self.items.write().unwrap_or_else(PoisonError::into_inner) = table;
        self.invalidate_items();
    }

    fn invalidate_items(&self) {
        let sinks: Vec<Arc<dyn HierarchyEvents>> = self
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        log::debug!("invalidating imports node for {} sink(s)", sinks.len());
        for sink in sinks {
            sink.on_invalidate_items(ItemId::ROOT);
        }
    }

    /// Current `(id, path)` pairs in identifier order.
    pub fn items(&self) -> Vec<(ItemId, PathBuf)> {
        self.table()
            .paths
            .iter()
            .enumerate()
            .map(|(index, path)| (ItemId(ItemId::FIRST.0 + index as u32), path.clone()))
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.table().paths.len()
    }

    /// Resolves a path to its identifier, ignoring case.
    /// 不分大小寫地將路徑解析為識別碼。
    pub fn item_id(&self, path: &Path) -> Option<ItemId> {
        self.table().find(path)
    }

    /// Resolves an identifier to its path.
    /// 將識別碼解析為路徑。
    pub fn item_path(&self, id: ItemId) -> Option<PathBuf> {
        self.table().path(id).map(Path::to_path_buf)
    }

    pub fn first_child(&self) -> ItemId {
        self.table().first_child()
    }

    /// `id + 1` while still allocated, otherwise [`ItemId::NIL`].
    pub fn next_sibling(&self, id: ItemId) -> ItemId {
        self.table().next_sibling(id)
    }

    /// Looks up one property through the `(scope, key)` table.
    /// 透過 `(範圍, 鍵)` 對照表查詢單一屬性。
    pub fn property(&self, id: ItemId, key: PropertyKey) -> Result<PropertyValue, NodeError> {
        let table = self.table();
        let scope = if id == ItemId::ROOT {
            NodeScope::Root
        } else if table.contains(id) {
            NodeScope::Item
        } else {
            return Err(NodeError::NotFound(id));
        };
        let producer = PROPERTY_TABLE
            .get(&(scope, key))
            .ok_or(NodeError::InvalidProperty { scope, key })?;
        producer(&table, id)
    }

    /// Live `{ path, last write time }` view of an item.
    pub fn browse_object(&self, id: ItemId) -> Result<ImportItemProperties, NodeError> {
        let table = self.table();
        item_path(&table, id).map(browse_object)
    }

    pub fn canonical_name(&self, id: ItemId) -> Result<String, NodeError> {
        if id == ItemId::ROOT {
            return Ok(ROOT_CAPTION.to_string());
        }
        let table = self.table();
        item_path(&table, id).map(|path| path.to_string_lossy().into_owned())
    }

    pub fn parse_canonical_name(&self, name: &str) -> Result<ItemId, NodeError> {
        self.table().find(Path::new(name)).ok_or_else(|| {
            log::debug!("imports node has no document named {name}");
            NodeError::UnknownDocument(name.to_string())
        })
    }

    /// Opens the item's file in the standard editor and waits for the host.
    /// 以標準編輯器開啟項目檔案並等待宿主完成。
    pub fn open_item(&self, id: ItemId) -> Result<WindowHandle, NodeError> {
        let path = self.item_path(id).ok_or(NodeError::NotFound(id))?;
        let caption = format!("{EDITOR_CAPTION_PREFIX}{}", display_name(&path));
        Ok(self.opener.open_standard_editor(&path, &caption)?)
    }

    /// Registers an invalidation sink.
    /// 註冊失效通知接收端。
    pub fn advise(&self, sink: Arc<dyn HierarchyEvents>) -> SinkCookie {
        let cookie = SinkCookie(self.next_cookie.fetch_add(1, Ordering::Relaxed));
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((cookie, sink));
        cookie
    }

    /// Removes a sink; returns `false` when the cookie is unknown.
    /// 移除接收端；cookie 不存在時回傳 `false`。
    pub fn unadvise(&self, cookie: SinkCookie) -> bool {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sinks.len();
        sinks.retain(|(existing, _)| *existing != cookie);
        sinks.len() != before
    }

    /// Same lookup as [`ImportsNode::item_id`], for hosts asking which node owns a document.
    pub fn is_document_in_project(&self, path: &Path) -> Option<ItemId> {
        self.item_id(path)
    }

    /// The node never vetoes closing.
    pub fn query_close(&self) -> bool {
        true
    }

    pub fn add_item(&self, _location: ItemId, _name: &str) -> Result<ItemId, NodeError> {
        Err(NodeError::NotImplemented("add_item"))
    }

    pub fn remove_item(&self, _id: ItemId) -> Result<(), NodeError> {
        Err(NodeError::NotImplemented("remove_item"))
    }

    pub fn rename_item(&self, _id: ItemId, _new_name: &str) -> Result<(), NodeError> {
        Err(NodeError::NotImplemented("rename_item"))
    }

    pub fn set_property(
        &self,
        _id: ItemId,
        _key: PropertyKey,
        _value: PropertyValue,
    ) -> Result<(), NodeError> {
        Err(NodeError::NotImplemented("set_property"))
    }

    pub fn generate_unique_item_name(
        &self,
        _location: ItemId,
        _extension: &str,
    ) -> Result<String, NodeError> {
        Err(NodeError::NotImplemented("generate_unique_item_name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<(PathBuf, String)>>,
    }

    impl DocumentOpener for RecordingOpener {
        fn open_standard_editor(
            &self,
            path: &Path,
            caption: &str,
        ) -> Result<WindowHandle, OpenDocumentError> {
            let mut opened = self.opened.lock().unwrap();
            opened.push((path.to_path_buf(), caption.to_string()));
            Ok(WindowHandle(opened.len() as u64))
        }
    }

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
    }

    impl HierarchyEvents for CountingSink {
        fn on_invalidate_items(&self, parent: ItemId) {
            assert_eq!(parent, ItemId::ROOT);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn build_node(paths: &[&str]) -> (ImportsNode, Arc<RecordingOpener>) {
        let opener = Arc::new(RecordingOpener::default());
        let node = ImportsNode::new(
            paths.iter().map(PathBuf::from).collect(),
            opener.clone(),
        );
        (node, opener)
    }

    #[test]
    fn identifiers_are_dense_from_one() {
        let (node, _) = build_node(&["/b/a.h", "/b/b.h", "/b/c.h"]);
        let ids: Vec<u32> = node.items().iter().map(|(id, _)| id.as_u32()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(node.item_path(ItemId::new(2)), Some(PathBuf::from("/b/b.h")));
        assert_eq!(node.item_path(ItemId::NONE), None);
        assert_eq!(node.item_path(ItemId::new(4)), None);
    }

    #[test]
    fn sibling_chain_ends_with_nil() {
        let (node, _) = build_node(&["/a.h", "/b.h"]);
        assert_eq!(node.first_child(), ItemId::FIRST);
        assert_eq!(node.next_sibling(ItemId::new(1)), ItemId::new(2));
        assert_eq!(node.next_sibling(ItemId::new(2)), ItemId::NIL);

        let (empty, _) = build_node(&[]);
        assert_eq!(empty.first_child(), ItemId::NIL);
    }

    #[test]
    fn path_lookup_ignores_case() {
        let (node, _) = build_node(&["/Repo/Build/Common.props"]);
        assert_eq!(
            node.item_id(Path::new("/repo/build/common.PROPS")),
            Some(ItemId::FIRST)
        );
        assert_eq!(
            node.parse_canonical_name("/REPO/BUILD/COMMON.PROPS"),
            Ok(ItemId::FIRST)
        );
        assert!(matches!(
            node.parse_canonical_name("/repo/other.props"),
            Err(NodeError::UnknownDocument(_))
        ));
    }

    #[test]
    fn property_table_answers_root_and_items() {
        let (node, _) = build_node(&["/repo/build/common.props"]);
        assert_eq!(
            node.property(ItemId::ROOT, PropertyKey::Caption),
            Ok(PropertyValue::Text("Watched Imports".into()))
        );
        assert_eq!(
            node.property(ItemId::ROOT, PropertyKey::StateIconIndex),
            Ok(PropertyValue::StateIcon(StateIcon::ReadOnly))
        );
        assert_eq!(
            node.property(ItemId::FIRST, PropertyKey::Caption),
            Ok(PropertyValue::Text("common.props".into()))
        );
        assert_eq!(
            node.property(ItemId::FIRST, PropertyKey::Parent),
            Ok(PropertyValue::Item(ItemId::ROOT))
        );
        assert_eq!(
            node.property(ItemId::ROOT, PropertyKey::NextSibling),
            Err(NodeError::InvalidProperty {
                scope: NodeScope::Root,
                key: PropertyKey::NextSibling,
            })
        );
        assert_eq!(
            node.property(ItemId::new(9), PropertyKey::Caption),
            Err(NodeError::NotFound(ItemId::new(9)))
        );
    }

    #[test]
    fn browse_object_reads_last_write_time_live() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("live.props");
        let (node, _) = build_node(&[file.to_str().unwrap()]);

        assert_eq!(node.browse_object(ItemId::FIRST).unwrap().last_write_time, None);

        fs::write(&file, "<Project />").unwrap();
        let props = node.browse_object(ItemId::FIRST).unwrap();
        assert_eq!(props.full_path, file);
        assert!(props.last_write_time.is_some());
    }

    #[test]
    fn open_item_passes_caption_to_opener() {
        let (node, opener) = build_node(&["/repo/build/common.props"]);
        let handle = node.open_item(ItemId::FIRST).unwrap();
        assert_eq!(handle, WindowHandle(1));
        let opened = opener.opened.lock().unwrap();
        assert_eq!(
            opened[0],
            (
                PathBuf::from("/repo/build/common.props"),
                "Imports Watcher - common.props".to_string()
            )
        );
        drop(opened);
        assert_eq!(
            node.open_item(ItemId::new(2)),
            Err(NodeError::NotFound(ItemId::new(2)))
        );
    }

    #[test]
    fn replace_items_reallocates_and_notifies_sinks() {
        let (node, _) = build_node(&["/a.h", "/b.h"]);
        let first = Arc::new(CountingSink::default());
        let second = Arc::new(CountingSink::default());
        let first_cookie = node.advise(first.clone());
        let second_cookie = node.advise(second.clone());
        assert!(second_cookie > first_cookie);

        node.replace_items(vec![PathBuf::from("/b.h")]);
        assert_eq!(node.item_path(ItemId::FIRST), Some(PathBuf::from("/b.h")));
        assert_eq!(node.item_path(ItemId::new(2)), None);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);

        assert!(node.unadvise(first_cookie));
        assert!(!node.unadvise(first_cookie));
        node.replace_items(Vec::new());
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mutations_are_rejected() {
        let (node, _) = build_node(&["/a.h"]);
        assert_eq!(
            node.add_item(ItemId::ROOT, "new.props"),
            Err(NodeError::NotImplemented("add_item"))
        );
        assert_eq!(
            node.rename_item(ItemId::FIRST, "x"),
            Err(NodeError::NotImplemented("rename_item"))
        );
        assert!(node
            .set_property(ItemId::FIRST, PropertyKey::Caption, PropertyValue::Flag(true))
            .is_err());
        assert!(node.query_close());
        assert_eq!(node.canonical_name(ItemId::ROOT).unwrap(), "Watched Imports");
    }
}
