use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanvasError {
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Edge '{0}' not found")]
    EdgeNotFound(String),

    #[error("Nodes '{0}' and '{1}' are already connected")]
    DuplicateEdge(String, String),
}

// New nodes are laid out on a 20px grid, ten per row.
const GRID_SIZE: f64 = 20.0;
const ORIGIN: f64 = 100.0;
const COLUMN_SPACING: f64 = 240.0;
const ROW_SPACING: f64 = 140.0;
const NODES_PER_ROW: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: 200.0,
            height: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Markdown shown inside the node.
    #[serde(default)]
    pub content: String,
    /// Widget-specific fields we carry through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    pub position: Position,
    #[serde(default)]
    pub style: Size,
    #[serde(default)]
    pub data: NodeData,
}

fn default_node_type() -> String {
    "custom".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasGraph {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

fn default_title() -> String {
    "Canvas".to_string()
}

impl Default for CanvasGraph {
    fn default() -> Self {
        Self::new(default_title())
    }
}

impl CanvasGraph {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: None,
        }
    }

    /// Parse a canvas file. Edges pointing at missing nodes are dropped.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let mut graph: CanvasGraph = serde_json::from_str(content)?;
        let pruned = graph.prune_dangling_edges();
        if pruned > 0 {
            log::warn!("Dropped {} dangling edge(s) from canvas '{}'", pruned, graph.title);
        }
        Ok(graph)
    }

    pub fn node(&self, node_id: &str) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    fn node_mut(&mut self, node_id: &str) -> Result<&mut CanvasNode, CanvasError> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| CanvasError::NodeNotFound(node_id.to_string()))
    }

    fn unique_id(&self, prefix: &str, taken: impl Fn(&str) -> bool) -> String {
        let millis = Utc::now().timestamp_millis();
        let mut counter = 0u32;
        loop {
            let id = format!("{}-{}-{}", prefix, millis, counter);
            if !taken(&id) {
                return id;
            }
            counter += 1;
        }
    }

    fn next_slot(&self) -> Position {
        let count = self.nodes.len();
        let x = ORIGIN + (count % NODES_PER_ROW) as f64 * COLUMN_SPACING;
        let y = ORIGIN + (count / NODES_PER_ROW) as f64 * ROW_SPACING;
        Position {
            x: (x / GRID_SIZE).round() * GRID_SIZE,
            y: (y / GRID_SIZE).round() * GRID_SIZE,
        }
    }

    pub fn add_node(&mut self, content: impl Into<String>) -> String {
        let id = self.unique_id("node", |id| self.node(id).is_some());
        let position = self.next_slot();
        self.nodes.push(CanvasNode {
            id: id.clone(),
            node_type: default_node_type(),
            position,
            style: Size::default(),
            data: NodeData {
                content: content.into(),
                extra: Map::new(),
            },
        });
        id
    }

    pub fn update_node_content(
        &mut self,
        node_id: &str,
        content: impl Into<String>,
    ) -> Result<(), CanvasError> {
        self.node_mut(node_id)?.data.content = content.into();
        Ok(())
    }

    pub fn move_node(&mut self, node_id: &str, position: Position) -> Result<(), CanvasError> {
        self.node_mut(node_id)?.position = position;
        Ok(())
    }

    pub fn resize_node(&mut self, node_id: &str, size: Size) -> Result<(), CanvasError> {
        self.node_mut(node_id)?.style = size;
        Ok(())
    }

    /// Remove a node together with every edge touching it.
    /// Returns the number of edges removed.
    pub fn remove_node(&mut self, node_id: &str) -> Result<usize, CanvasError> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.id == node_id)
            .ok_or_else(|| CanvasError::NodeNotFound(node_id.to_string()))?;
        self.nodes.remove(idx);

        let before = self.edges.len();
        self.edges
            .retain(|e| e.source != node_id && e.target != node_id);
        Ok(before - self.edges.len())
    }

    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        source_handle: Option<String>,
        target_handle: Option<String>,
    ) -> Result<String, CanvasError> {
        for endpoint in [source, target] {
            if self.node(endpoint).is_none() {
                return Err(CanvasError::NodeNotFound(endpoint.to_string()));
            }
        }
        let duplicate = self.edges.iter().any(|e| {
            e.source == source
                && e.target == target
                && e.source_handle == source_handle
                && e.target_handle == target_handle
        });
        if duplicate {
            return Err(CanvasError::DuplicateEdge(
                source.to_string(),
                target.to_string(),
            ));
        }

        let id = self.unique_id("edge", |id| self.edges.iter().any(|e| e.id == id));
        self.edges.push(CanvasEdge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            source_handle,
            target_handle,
        });
        Ok(id)
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Result<CanvasEdge, CanvasError> {
        let idx = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| CanvasError::EdgeNotFound(edge_id.to_string()))?;
        Ok(self.edges.remove(idx))
    }

    pub fn prune_dangling_edges(&mut self) -> usize {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let before = self.edges.len();
        self.edges
            .retain(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()));
        before - self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_snaps_to_grid() {
        let mut graph = CanvasGraph::new("Ideas");
        let first = graph.add_node("first");
        let node = graph.node(&first).unwrap();
        assert_eq!(node.position, Position { x: 100.0, y: 100.0 });
        assert_eq!(node.style, Size::default());
        assert_eq!(node.node_type, "custom");

        for i in 0..10 {
            graph.add_node(format!("n{}", i));
        }
        // 11th node wraps onto the second row
        let last = graph.nodes.last().unwrap();
        assert_eq!(last.position, Position { x: 100.0, y: 240.0 });
    }

    #[test]
    fn test_remove_node_prunes_edges() {
        let mut graph = CanvasGraph::default();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.connect(&a, &b, None, None).unwrap();
        graph.connect(&c, &a, None, None).unwrap();
        graph.connect(&b, &c, None, None).unwrap();

        let pruned = graph.remove_node(&a).unwrap();
        assert_eq!(pruned, 2);
        assert_eq!(graph.edges.len(), 1);
        assert!(graph
            .edges
            .iter()
            .all(|e| e.source != a && e.target != a));
    }

    #[test]
    fn test_connect_rejects_unknown_and_duplicate() {
        let mut graph = CanvasGraph::default();
        let a = graph.add_node("a");
        let b = graph.add_node("b");

        assert_eq!(
            graph.connect(&a, "ghost", None, None),
            Err(CanvasError::NodeNotFound("ghost".to_string()))
        );
        graph.connect(&a, &b, Some("right".into()), None).unwrap();
        assert!(matches!(
            graph.connect(&a, &b, Some("right".into()), None),
            Err(CanvasError::DuplicateEdge(_, _))
        ));
        // a different handle pair is a distinct connection
        graph.connect(&a, &b, Some("bottom".into()), None).unwrap();
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_from_json_drops_dangling_edges() {
        let content = r#"{
  "title": "Map",
  "nodes": [
    {"id": "n1", "type": "custom", "position": {"x": 0, "y": 0},
     "style": {"width": 200, "height": 100}, "data": {"content": "hello", "color": "red"}}
  ],
  "edges": [
    {"id": "e1", "source": "n1", "target": "n2"},
    {"id": "e2", "source": "n1", "target": "n1", "sourceHandle": "a"}
  ],
  "viewport": {"x": 0, "y": 0, "zoom": 1.5}
}"#;
        let graph = CanvasGraph::from_json(content).unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].id, "e2");
        assert_eq!(graph.nodes[0].data.content, "hello");
        assert_eq!(graph.nodes[0].data.extra.get("color"), Some(&Value::from("red")));
        assert_eq!(graph.viewport.unwrap().zoom, 1.5);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let graph =
            CanvasGraph::from_json(r#"{"nodes":[{"id":"n","position":{"x":1,"y":2}}]}"#).unwrap();
        assert_eq!(graph.title, "Canvas");
        assert_eq!(graph.nodes[0].node_type, "custom");
        assert_eq!(graph.nodes[0].style.width, 200.0);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_update_move_and_remove_edge() {
        let mut graph = CanvasGraph::default();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let edge = graph.connect(&a, &b, None, None).unwrap();

        graph.update_node_content(&a, "# Heading").unwrap();
        graph.move_node(&b, Position { x: 400.0, y: 20.0 }).unwrap();
        graph
            .resize_node(&b, Size { width: 300.0, height: 150.0 })
            .unwrap();
        assert_eq!(graph.node(&a).unwrap().data.content, "# Heading");
        assert_eq!(graph.node(&b).unwrap().position.x, 400.0);
        assert_eq!(graph.node(&b).unwrap().style.height, 150.0);

        graph.remove_edge(&edge).unwrap();
        assert!(graph.edges.is_empty());
        assert!(graph.remove_edge(&edge).is_err());
        assert!(graph.move_node("ghost", Position::default()).is_err());
    }
}
