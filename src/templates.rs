use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Map;
use std::collections::BTreeSet;

use crate::canvas::{CanvasEdge, CanvasGraph, CanvasNode, NodeData, Position, Size, Viewport};
use crate::document::{DocumentContent, DocumentKind};
use crate::kanban::{Card, Column, KanbanBoard, Priority};

/// Starting content for a new file.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: &'static str,
    pub category: &'static str,
    pub tags: &'static [&'static str],
}

const TEMPLATES: &[Template] = &[
    Template {
        id: "md-blank",
        name: "Blank Document",
        description: "Empty markdown document to start from scratch",
        kind: "markdown",
        category: "Basic",
        tags: &["empty", "blank"],
    },
    Template {
        id: "md-note",
        name: "Note Template",
        description: "Simple note template with sections",
        kind: "markdown",
        category: "Notes",
        tags: &["note", "template"],
    },
    Template {
        id: "md-meeting",
        name: "Meeting Notes",
        description: "Template for meeting notes and action items",
        kind: "markdown",
        category: "Business",
        tags: &["meeting", "notes", "business"],
    },
    Template {
        id: "kanban-basic",
        name: "Basic Kanban",
        description: "Simple 3-column kanban board",
        kind: "kanban",
        category: "Basic",
        tags: &["kanban", "basic", "todo"],
    },
    Template {
        id: "kanban-agile",
        name: "Agile Scrum Board",
        description: "Kanban board for agile development",
        kind: "kanban",
        category: "Development",
        tags: &["agile", "scrum", "development"],
    },
    Template {
        id: "kanban-personal",
        name: "Personal Task Board",
        description: "Personal productivity board",
        kind: "kanban",
        category: "Personal",
        tags: &["personal", "productivity", "gtd"],
    },
    Template {
        id: "canvas-blank",
        name: "Blank Canvas",
        description: "Empty canvas to start creating",
        kind: "canvas",
        category: "Basic",
        tags: &["canvas", "blank", "mindmap"],
    },
    Template {
        id: "canvas-mindmap",
        name: "Mind Map Template",
        description: "Basic mind map with central idea",
        kind: "canvas",
        category: "Planning",
        tags: &["mindmap", "brainstorm", "planning"],
    },
];

pub fn all() -> &'static [Template] {
    TEMPLATES
}

pub fn find(id: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.id == id)
}

pub fn for_kind(kind: DocumentKind) -> impl Iterator<Item = &'static Template> {
    TEMPLATES.iter().filter(move |t| t.kind == kind.as_str())
}

/// The template used when the user doesn't pick one.
pub fn default_for(kind: DocumentKind) -> &'static Template {
    let id = match kind {
        DocumentKind::Markdown => "md-blank",
        DocumentKind::Kanban => "kanban-basic",
        DocumentKind::Canvas => "canvas-blank",
    };
    // every kind has an entry in TEMPLATES
    find(id).unwrap_or(&TEMPLATES[0])
}

impl Template {
    pub fn document_kind(&self) -> DocumentKind {
        match self.kind {
            "kanban" => DocumentKind::Kanban,
            "canvas" => DocumentKind::Canvas,
            _ => DocumentKind::Markdown,
        }
    }

    /// Fresh content for a new file, stamped with `now`.
    pub fn instantiate(&self, now: DateTime<Utc>) -> DocumentContent {
        let date = now.format("%Y-%m-%d");
        match self.id {
            "md-note" => DocumentContent::Text(format!(
                "# Note Title\n\n## Summary\nQuick summary or key points here.\n\n\
                 ## Content\nMain content goes here.\n\n## References\n- Link 1\n- Link 2\n\n\
                 ## Tags\n#note #important\n\n---\nCreated: {}\n",
                date
            )),
            "md-meeting" => DocumentContent::Text(format!(
                "# Meeting Notes - {}\n\n## Attendees\n- \n- \n\n## Agenda\n1. \n2. \n\n\
                 ## Discussion Points\n### Point 1\n\n## Action Items\n\
                 - [ ] Task 1 - Assigned to: \n- [ ] Task 2 - Assigned to: \n\n\
                 ## Next Meeting\nDate: \nTime: \nLocation: \n",
                date
            )),
            "kanban-basic" => {
                let mut board = board(&[("todo", "To Do"), ("doing", "In Progress"), ("done", "Done")]);
                board.columns[0].cards.push(Card {
                    id: "task-1".to_string(),
                    title: "Example task".to_string(),
                    description: Some(
                        "This is an example task. You can edit or delete it.".to_string(),
                    ),
                    priority: Priority::Medium,
                    tags: BTreeSet::from(["example".to_string()]),
                    created_at: now,
                    updated_at: now,
                });
                DocumentContent::Kanban(board)
            }
            "kanban-agile" => DocumentContent::Kanban(board(&[
                ("backlog", "Backlog"),
                ("sprint-planning", "Sprint Planning"),
                ("in-development", "In Development"),
                ("code-review", "Code Review"),
                ("testing", "Testing"),
                ("done", "Done"),
            ])),
            "kanban-personal" => DocumentContent::Kanban(board(&[
                ("inbox", "Inbox"),
                ("today", "Today"),
                ("this-week", "This Week"),
                ("waiting", "Waiting For"),
                ("completed", "Completed"),
            ])),
            "canvas-blank" => {
                let mut graph = CanvasGraph::new("New Canvas");
                graph.viewport = Some(Viewport { x: 0.0, y: 0.0, zoom: 1.0 });
                DocumentContent::Canvas(graph)
            }
            "canvas-mindmap" => DocumentContent::Canvas(mind_map()),
            _ => DocumentContent::Text("# New Document\n\nStart writing here...\n".to_string()),
        }
    }
}

fn board(columns: &[(&str, &str)]) -> KanbanBoard {
    KanbanBoard {
        columns: columns
            .iter()
            .map(|(id, title)| Column {
                id: id.to_string(),
                title: title.to_string(),
                color: None,
                cards: Vec::new(),
            })
            .collect(),
    }
}

fn mind_map() -> CanvasGraph {
    let node = |id: &str, x: f64, y: f64, width: f64, height: f64, content: &str| CanvasNode {
        id: id.to_string(),
        node_type: "custom".to_string(),
        position: Position { x, y },
        style: Size { width, height },
        data: NodeData {
            content: content.to_string(),
            extra: Map::new(),
        },
    };
    let branches = [
        ("branch1", 100.0, 100.0),
        ("branch2", 700.0, 100.0),
        ("branch3", 100.0, 500.0),
        ("branch4", 700.0, 500.0),
    ];

    let mut graph = CanvasGraph::new("Mind Map");
    graph.viewport = Some(Viewport { x: 0.0, y: 0.0, zoom: 1.0 });
    graph
        .nodes
        .push(node("central", 400.0, 300.0, 200.0, 100.0, "# Central Idea\n\nMain topic or theme"));
    for (i, (id, x, y)) in branches.into_iter().enumerate() {
        let content = format!("## Branch {}\n\nSubtopic {}", i + 1, i + 1);
        graph.nodes.push(node(id, x, y, 180.0, 80.0, &content));
        graph.edges.push(CanvasEdge {
            id: format!("e{}", i + 1),
            source: "central".to_string(),
            target: id.to_string(),
            source_handle: None,
            target_handle: None,
        });
    }
    graph
}

// ---- File names ----

const GENERIC_NAMES: &[&str] = &["Untitled", "New Document", "New File"];

/// Pick a file name for a new document. Blank or placeholder names get a
/// timestamped default so repeated "New" clicks never collide.
pub fn generate_file_name(base_name: &str, kind: DocumentKind, now: DateTime<Utc>) -> String {
    let trimmed = base_name.trim();
    if trimmed.is_empty() || GENERIC_NAMES.contains(&trimmed) {
        let stem = match kind {
            DocumentKind::Markdown => "document",
            DocumentKind::Kanban => "board",
            DocumentKind::Canvas => "canvas",
        };
        return format!(
            "{}_{}.{}",
            stem,
            now.format("%Y-%m-%dT%H-%M-%S"),
            kind.extension()
        );
    }

    let name = sanitize_file_name(trimmed);
    if DocumentKind::from_path(&name) == Some(kind) {
        name
    } else {
        format!("{}.{}", name, kind.extension())
    }
}

/// Replace characters that are not allowed in file names on some platforms.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| *c != '\u{00A0}' && *c != '\u{FEFF}')
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            _ => c,
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
