//=========================================================================
// Memory Graph
//=========================================================================
//
// Headless SceneGraph kept entirely in a HashMap. Records everything the
// pool does to its nodes so tools and tests can inspect it.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;

use log::warn;

//=== Internal Dependencies ===============================================

use super::{NodeId, SceneGraph, Template, Transform};

//=== MemoryNode ==========================================================

/// A node as recorded by [`MemoryGraph`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryNode {
    pub name: String,
    pub template: Option<Template>,
    pub active: bool,
    pub transform: Transform,
    pub parent: Option<NodeId>,
}

//=== TemplateEntry =======================================================

#[derive(Debug, Clone)]
struct TemplateEntry {
    transform: Transform,
    active: bool,
}

//=== MemoryGraph =========================================================

/// In-memory scene graph.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: HashMap<NodeId, MemoryNode>,
    templates: HashMap<Template, TemplateEntry>,
    next_id: u64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a template with its canonical spawn transform.
    pub fn add_template(&mut self, template: Template, transform: Transform) {
        self.templates.insert(
            template,
            TemplateEntry {
                transform,
                active: true,
            },
        );
    }

    //--- Queries ----------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Live (not destroyed) clones of `template`.
    pub fn instances_of(&self, template: &Template) -> usize {
        self.nodes
            .values()
            .filter(|node| node.template.as_ref() == Some(template))
            .count()
    }

    /// Active clones of `template`.
    pub fn active_instances_of(&self, template: &Template) -> usize {
        self.nodes
            .values()
            .filter(|node| node.active && node.template.as_ref() == Some(template))
            .count()
    }

    /// Direct children of `parent`, sorted by id.
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent == Some(parent))
            .map(|(id, _)| *id)
            .collect();
        children.sort();
        children
    }

    /// Whether the template is shown. Unknown templates report `true`.
    pub fn is_template_active(&self, template: &Template) -> bool {
        self.templates.get(template).map_or(true, |entry| entry.active)
    }

    //--- Internal Helpers -------------------------------------------------

    fn allocate(&mut self, node: MemoryNode) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, node);
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut MemoryNode> {
        let node = self.nodes.get_mut(&id);
        if node.is_none() {
            warn!("Scene graph has no node {:?}", id);
        }
        node
    }
}

impl SceneGraph for MemoryGraph {
    fn template_transform(&self, template: &Template) -> Transform {
        self.templates
            .get(template)
            .map(|entry| entry.transform)
            .unwrap_or_default()
    }

    fn set_template_active(&mut self, template: &Template, active: bool) {
        self.templates
            .entry(template.clone())
            .or_insert(TemplateEntry {
                transform: Transform::IDENTITY,
                active,
            })
            .active = active;
    }

    fn create_node(&mut self, name: &str, parent: Option<NodeId>) -> NodeId {
        self.allocate(MemoryNode {
            name: name.to_owned(),
            template: None,
            active: true,
            transform: Transform::IDENTITY,
            parent,
        })
    }

    fn instantiate(
        &mut self,
        template: &Template,
        name: &str,
        transform: Transform,
        parent: NodeId,
    ) -> NodeId {
        let active = self.is_template_active(template);
        self.allocate(MemoryNode {
            name: name.to_owned(),
            template: Some(template.clone()),
            active,
            transform,
            parent: Some(parent),
        })
    }

    fn destroy(&mut self, node: NodeId) {
        if self.nodes.remove(&node).is_none() {
            warn!("Destroying unknown node {:?}", node);
        }
    }

    fn set_active(&mut self, node: NodeId, active: bool) {
        if let Some(node) = self.node_mut(node) {
            node.active = active;
        }
    }

    fn set_transform(&mut self, node: NodeId, transform: Transform) {
        if let Some(node) = self.node_mut(node) {
            node.transform = transform;
        }
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>, keep_world: bool) {
        let offset = match (keep_world, parent) {
            (false, Some(parent)) => self.nodes.get(&parent).map(|p| p.transform.position),
            _ => None,
        };

        if let Some(node) = self.node_mut(node) {
            node.parent = parent;
            if let Some([x, y, z]) = offset {
                node.transform.position[0] += x;
                node.transform.position[1] += y;
                node.transform.position[2] += z;
            }
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_inherits_template_activation() {
        let mut graph = MemoryGraph::new();
        let bullet = Template::new("bullet");
        graph.add_template(bullet.clone(), Transform::at([0.0, 1.0, 0.0]));
        let root = graph.create_node("root", None);

        graph.set_template_active(&bullet, false);
        let node = graph.instantiate(&bullet, "bullet 0", Transform::IDENTITY, root);

        let recorded = graph.node(node).unwrap();
        assert!(!recorded.active);
        assert_eq!(recorded.parent, Some(root));
        assert_eq!(graph.instances_of(&bullet), 1);
        assert_eq!(graph.active_instances_of(&bullet), 0);
    }

    #[test]
    fn set_parent_without_keep_world_offsets_position() {
        let mut graph = MemoryGraph::new();
        let bullet = Template::new("bullet");
        let root = graph.create_node("root", None);
        let holder = graph.create_node("holder", None);
        graph.set_transform(holder, Transform::at([10.0, 0.0, 0.0]));

        let node = graph.instantiate(&bullet, "bullet 0", Transform::at([1.0, 0.0, 0.0]), root);
        graph.set_parent(node, Some(holder), false);

        assert_eq!(graph.node(node).unwrap().transform.position, [11.0, 0.0, 0.0]);
        assert_eq!(graph.children(holder), vec![node]);
    }

    #[test]
    fn destroy_removes_node() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_node("root", None);
        assert_eq!(graph.node_count(), 1);
        graph.destroy(root);
        assert_eq!(graph.node_count(), 0);
    }
}
