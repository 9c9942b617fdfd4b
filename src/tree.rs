//! Arena-held task tree
//!
//! Every task of a run lives in one `Vec`, addressed by [`TaskId`]. Parent and
//! child links are ids, never references, so the tree can be read while
//! branches run elsewhere and mutated only by the driver that owns it.

use crate::types::{ReportMode, ResearchTask, TaskId};

/// Depth and breadth ceilings enforced when a child is added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    pub max_depth: u32,
    pub max_breadth: usize,
}

#[derive(Debug)]
struct TaskNode {
    task: ResearchTask,
    children: Vec<TaskId>,
}

#[derive(Debug)]
pub struct TaskTree {
    nodes: Vec<TaskNode>,
    limits: TreeLimits,
}

impl TaskTree {
    /// Create a tree holding only the root task.
    pub fn new(root_query: impl Into<String>, mode: ReportMode, limits: TreeLimits) -> Self {
        let root = ResearchTask {
            id: TaskId(0),
            query: root_query.into(),
            mode,
            parent: None,
            depth: 0,
            breadth_index: 0,
        };
        Self {
            nodes: vec![TaskNode {
                task: root,
                children: Vec::new(),
            }],
            limits,
        }
    }

    pub fn root(&self) -> TaskId {
        TaskId(0)
    }

    pub fn limits(&self) -> TreeLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&ResearchTask> {
        self.nodes.get(id.index()).map(|n| &n.task)
    }

    pub fn children(&self, id: TaskId) -> &[TaskId] {
        self.nodes
            .get(id.index())
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Add a child under `parent`.
    ///
    /// Returns `None` (and adds nothing) if the parent is unknown or the child
    /// would exceed the depth or breadth ceiling.
    pub fn add_child(&mut self, parent: TaskId, query: impl Into<String>) -> Option<TaskId> {
        let (depth, breadth_index, mode) = {
            let node = self.nodes.get(parent.index())?;
            (
                node.task.depth + 1,
                node.children.len(),
                node.task.mode,
            )
        };

        if depth > self.limits.max_depth || breadth_index >= self.limits.max_breadth {
            tracing::debug!(
                parent = %parent,
                depth,
                breadth_index,
                "refusing child beyond tree limits"
            );
            return None;
        }

        let id = TaskId(self.nodes.len() as u32);
        self.nodes.push(TaskNode {
            task: ResearchTask {
                id,
                query: query.into(),
                mode,
                parent: Some(parent),
                depth,
                breadth_index: breadth_index as u32,
            },
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        Some(id)
    }

    /// Ids from `id` up to the root, `id` first.
    pub fn path_to_root(&self, id: TaskId) -> Vec<TaskId> {
        let mut path = Vec::new();
        let mut cursor = self.get(id).map(|t| t.id);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.get(current).and_then(|t| t.parent);
        }
        path
    }

    /// Ancestors of `id`, parent first, excluding `id` itself.
    pub fn ancestors(&self, id: TaskId) -> Vec<TaskId> {
        let mut path = self.path_to_root(id);
        if !path.is_empty() {
            path.remove(0);
        }
        path
    }

    /// Root, then each child left-to-right with its subtree before the next
    /// sibling.
    pub fn preorder(&self) -> Vec<TaskId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            // reversed so the leftmost child is visited first
            for child in self.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    pub fn max_depth_reached(&self) -> u32 {
        self.nodes.iter().map(|n| n.task.depth).max().unwrap_or(0)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ResearchTask> {
        self.nodes.iter().map(|n| &n.task)
    }
}
