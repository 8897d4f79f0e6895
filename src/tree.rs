//! The frame graph: owns the transformation elements and answers chain
//! queries with a bounded breadth-first search.

use crate::element::TransformationElement;
use crate::FrameIdString;
use cu29::prelude::*;
use std::rc::Rc;

/// Maximum breadth-first search depth while looking for a chain.
pub const MAX_SEEK_DEPTH: usize = 20;

/// One node of the search tree spanned from the `from` frame.
struct SearchNode {
    frame: FrameIdString,
    parent: Option<usize>,
    /// Edge leading from the parent node to this one, None on the root.
    via: Option<Rc<TransformationElement>>,
}

#[derive(Default)]
pub struct TransformationTree {
    available_elements: Vec<Rc<TransformationElement>>,
}

impl TransformationTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element to the set of available edges, together with its
    /// inverse view.
    pub fn add_transformation(&mut self, element: Rc<TransformationElement>) {
        let inverse = Rc::new(TransformationElement::new_inverse(element.clone()));
        self.available_elements.push(element);
        self.available_elements.push(inverse);
    }

    /// All registered edges, inverse views included.
    pub fn available_elements(&self) -> &[Rc<TransformationElement>] {
        &self.available_elements
    }

    /// Number of registered (static, dynamic) edges. Inverse views count as
    /// the kind of the element they wrap.
    pub fn elements_count(&self) -> (usize, usize) {
        let dynamic = self
            .available_elements
            .iter()
            .filter(|e| e.is_dynamic())
            .count();
        (self.available_elements.len() - dynamic, dynamic)
    }

    /// Drops every registered element.
    pub fn clear(&mut self) {
        self.available_elements.clear();
    }

    /// Logs every registered edge.
    pub fn dump_tree(&self) {
        for element in &self.available_elements {
            let kind = match (
                matches!(element.as_ref(), TransformationElement::Inverse(_)),
                element.is_dynamic(),
            ) {
                (true, true) => "(inv,dyn)",
                (true, false) => "(inv,static)",
                (false, true) => "(dyn)",
                (false, false) => "(static)",
            };
            debug!(
                "{} {} > {}",
                kind,
                element.source_frame(),
                element.target_frame()
            );
        }
    }

    /// Tries to find a chain of edges leading from `from` to `to`.
    ///
    /// The search spans a tree of transformations originating at `from` and
    /// expands it breadth first until a chain is found, the tree cannot be
    /// expanded any further, or the depth passes [`MAX_SEEK_DEPTH`]. The
    /// first chain reaching `to` wins.
    ///
    /// The returned chain is in application order: composing the elements
    /// left to right maps `from` coordinates into `to` coordinates.
    pub fn get_transformation_chain(
        &self,
        from: &str,
        to: &str,
    ) -> Option<Vec<Rc<TransformationElement>>> {
        if from == to {
            return Some(Vec::new());
        }

        let root_frame = FrameIdString::from(from).ok()?;
        let mut nodes = vec![SearchNode {
            frame: root_frame,
            parent: None,
            via: None,
        }];
        let mut current_level = vec![0usize];

        for _ in 0..MAX_SEEK_DEPTH {
            if current_level.is_empty() {
                break;
            }
            let mut next_level = Vec::new();

            for &node_idx in &current_level {
                let parent_frame = nodes[node_idx].parent.map(|p| nodes[p].frame);
                let node_frame = nodes[node_idx].frame;

                let first_child = nodes.len();
                for element in &self.available_elements {
                    if element.source_frame() != node_frame.as_str() {
                        continue;
                    }
                    // Do not bounce straight back to where we came from.
                    if let Some(parent_frame) = parent_frame {
                        if parent_frame.as_str() == element.target_frame() {
                            continue;
                        }
                    }
                    let Ok(child_frame) = FrameIdString::from(element.target_frame()) else {
                        continue;
                    };
                    nodes.push(SearchNode {
                        frame: child_frame,
                        parent: Some(node_idx),
                        via: Some(element.clone()),
                    });
                }

                for child_idx in first_child..nodes.len() {
                    if nodes[child_idx].frame.as_str() == to {
                        debug!("Found transformation chain from {} to {}", from, to);
                        let mut result = Vec::new();
                        let mut current = child_idx;
                        while let Some(parent) = nodes[current].parent {
                            result.push(
                                nodes[current]
                                    .via
                                    .clone()
                                    .expect("non-root node without an edge"),
                            );
                            current = parent;
                        }
                        return Some(result);
                    }
                }

                next_level.extend(first_child..nodes.len());
            }

            current_level = next_level;
        }

        debug!("Could not find a transformation chain from {} to {}", from, to);
        None
    }
}
