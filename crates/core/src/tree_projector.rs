use std::sync::{Arc, Mutex, PoisonError};

use importwatch_project::{DocumentOpener, ImportsNode};

use crate::events::PipelineError;
use crate::host::{ProjectTreeRegistry, VirtualNodeFlags};
use crate::import_set::ImportSet;

enum TreeState {
    Absent,
    Present(Arc<ImportsNode>),
}

/// Fourth stage: mirrors the import set into a virtual node of the host tree.
/// 第四階段：將匯入集合映射為宿主專案樹中的虛擬節點。
///
/// The node is created on the first set after start or after a close, and
/// every later set replaces its items wholesale. Invalidation sinks run under
/// the projector's lock and must not call back into it.
pub struct TreeProjector {
    registry: Arc<dyn ProjectTreeRegistry>,
    opener: Arc<dyn DocumentOpener>,
    state: Mutex<TreeState>,
}

impl TreeProjector {
    pub fn new(registry: Arc<dyn ProjectTreeRegistry>, opener: Arc<dyn DocumentOpener>) -> Self {
        Self {
            registry,
            opener,
            state: Mutex::new(TreeState::Absent),
        }
    }

    pub fn on_import_set_changed(&self, set: &ImportSet) -> Result<(), PipelineError> {
        if set.solution_path.is_none() {
            self.detach();
            return Ok(());
        }

        // Updates run under the state lock so a concurrent detach cannot
        // remove the node between the check and the invalidation.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            TreeState::Present(node) => node.replace_items(set.paths.clone()),
            TreeState::Absent => {
                let node = Arc::new(ImportsNode::new(set.paths.clone(), Arc::clone(&self.opener)));
                self.registry
                    .add_virtual_node(Arc::clone(&node), VirtualNodeFlags::DISPLAY_ONLY);
                *state = TreeState::Present(node);
                log::debug!("imports node created with {} item(s)", set.len());
            }
        }
        Ok(())
    }

    /// Removes the node from the host and re-arms lazy creation.
    /// 自宿主移除節點並重新允許延遲建立。
    pub fn detach(&self) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            TreeState::Absent,
        );
        if let TreeState::Present(node) = previous {
            self.registry.remove_virtual_node(&node);
            log::debug!("imports node detached");
        }
    }

    pub fn node(&self) -> Option<Arc<ImportsNode>> {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            TreeState::Present(node) => Some(Arc::clone(node)),
            TreeState::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.node().is_some()
    }
}
