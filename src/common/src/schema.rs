//! Declared table registry and ownership graph.
//!
//! Every table the integrity engine touches is listed in [`TABLES`] together
//! with its foreign-key edges. The same data drives three consumers:
//!
//! - the planner, which reads a table's derivation edges in the listed order
//!   (first edge = most reliable source of a missing tenant id),
//! - the deletion cascade, which follows ownership edges to reach rows that
//!   have no tenant column of their own,
//! - the deletion order, computed from all edges so that children always go
//!   before the rows they reference.

use std::collections::{BTreeMap, BTreeSet};

/// Column that associates a row with its tenant.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Name of the table holding tenants.
pub const TENANTS_TABLE: &str = "tenants";

/// Name of the append-only audit table.
pub const AUDIT_TABLE: &str = "audit_events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The parent owns the child: deleting the parent's tenant deletes the child.
    Ownership,
    /// A plain reference, usable for tenant derivation only.
    Reference,
}

/// A foreign-key column pointing at another registry table's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub column: &'static str,
    pub parent: &'static str,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    /// Whether the table carries a `tenant_id` column.
    pub tenant_scoped: bool,
    /// Whether a NULL `tenant_id` is a defect the scanner should report.
    pub integrity_checked: bool,
    /// Edges in reliability order.
    pub edges: &'static [Edge],
}

impl TableSpec {
    /// Edges whose parent carries its own tenant column.
    pub fn derivation_edges(&self) -> impl Iterator<Item = &'static Edge> {
        self.edges
            .iter()
            .filter(|edge| table(edge.parent).is_some_and(|parent| parent.tenant_scoped))
    }

    pub fn ownership_edges(&self) -> impl Iterator<Item = &'static Edge> {
        self.edges
            .iter()
            .filter(|edge| edge.kind == EdgeKind::Ownership)
    }
}

const fn own(column: &'static str, parent: &'static str) -> Edge {
    Edge {
        column,
        parent,
        kind: EdgeKind::Ownership,
    }
}

const fn reference(column: &'static str, parent: &'static str) -> Edge {
    Edge {
        column,
        parent,
        kind: EdgeKind::Reference,
    }
}

const fn scoped(name: &'static str, edges: &'static [Edge]) -> TableSpec {
    TableSpec {
        name,
        tenant_scoped: true,
        integrity_checked: true,
        edges,
    }
}

const fn tenantless(name: &'static str, edges: &'static [Edge]) -> TableSpec {
    TableSpec {
        name,
        tenant_scoped: false,
        integrity_checked: false,
        edges,
    }
}

pub static TABLES: &[TableSpec] = &[
    scoped("users", &[]),
    scoped("memberships", &[own("user_id", "users")]),
    scoped("user_invitations", &[reference("invited_by", "users")]),
    scoped("tenant_settings", &[]),
    scoped("clients", &[]),
    scoped("client_divisions", &[own("client_id", "clients")]),
    scoped(
        "client_contacts",
        &[
            own("client_id", "clients"),
            reference("division_id", "client_divisions"),
        ],
    ),
    scoped(
        "client_invites",
        &[
            own("client_id", "clients"),
            reference("contact_id", "client_contacts"),
        ],
    ),
    scoped(
        "projects",
        &[
            reference("client_id", "clients"),
            reference("created_by", "users"),
        ],
    ),
    scoped(
        "project_members",
        &[own("project_id", "projects"), reference("user_id", "users")],
    ),
    scoped("project_sections", &[own("project_id", "projects")]),
    scoped("tags", &[reference("created_by", "users")]),
    scoped(
        "tasks",
        &[
            own("project_id", "projects"),
            reference("section_id", "project_sections"),
            reference("created_by", "users"),
        ],
    ),
    scoped(
        "subtasks",
        &[own("task_id", "tasks"), reference("assignee_id", "users")],
    ),
    tenantless(
        "task_assignees",
        &[own("task_id", "tasks"), reference("user_id", "users")],
    ),
    tenantless(
        "task_tags",
        &[own("task_id", "tasks"), reference("tag_id", "tags")],
    ),
    scoped(
        "task_attachments",
        &[own("task_id", "tasks"), reference("uploaded_by", "users")],
    ),
    scoped(
        "task_comments",
        &[own("task_id", "tasks"), reference("author_id", "users")],
    ),
    tenantless(
        "comment_mentions",
        &[
            own("comment_id", "task_comments"),
            reference("user_id", "users"),
        ],
    ),
    scoped(
        "time_entries",
        &[
            reference("task_id", "tasks"),
            reference("project_id", "projects"),
            reference("user_id", "users"),
        ],
    ),
    scoped(
        "chat_threads",
        &[
            reference("project_id", "projects"),
            reference("created_by", "users"),
        ],
    ),
    scoped(
        "chat_messages",
        &[
            own("thread_id", "chat_threads"),
            reference("author_id", "users"),
        ],
    ),
    tenantless("chat_attachments", &[own("message_id", "chat_messages")]),
    tenantless(
        "chat_mentions",
        &[
            own("message_id", "chat_messages"),
            reference("user_id", "users"),
        ],
    ),
    scoped(
        "notifications",
        &[own("user_id", "users"), reference("task_id", "tasks")],
    ),
    scoped(
        "activity_log",
        &[
            reference("project_id", "projects"),
            reference("user_id", "users"),
        ],
    ),
    // NULL tenant marks platform-level events, so the audit table is never
    // reported as orphaned; it is still removed with its tenant.
    TableSpec {
        name: AUDIT_TABLE,
        tenant_scoped: true,
        integrity_checked: false,
        edges: &[],
    },
];

/// Look up a registry table by name.
pub fn table(name: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|spec| spec.name == name)
}

/// Tables whose NULL tenant column counts as an orphan.
pub fn integrity_tables() -> impl Iterator<Item = &'static TableSpec> {
    TABLES.iter().filter(|spec| spec.integrity_checked)
}

/// Error raised when the registry does not form a DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphError(pub String);

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid table graph: {}", self.0)
    }
}

impl std::error::Error for GraphError {}

/// Order in which tables can be emptied without deleting a row that is still
/// referenced: every table appears before each table it points at.
pub fn deletion_order() -> Result<Vec<&'static TableSpec>, GraphError> {
    deletion_order_of(TABLES)
}

/// Order in which tables can be repaired so that parents are fixed before the
/// children that derive their tenant from them.
pub fn repair_order() -> Result<Vec<&'static TableSpec>, GraphError> {
    let mut order = deletion_order()?;
    order.reverse();
    Ok(order)
}

pub fn deletion_order_of(
    tables: &'static [TableSpec],
) -> Result<Vec<&'static TableSpec>, GraphError> {
    // pending[t] = number of tables still referencing t
    let mut pending: BTreeMap<&str, usize> = tables.iter().map(|spec| (spec.name, 0)).collect();
    for spec in tables {
        for parent in parents_of(spec) {
            if parent == spec.name {
                return Err(GraphError(format!("{} references itself", spec.name)));
            }
            match pending.get_mut(parent) {
                Some(count) => *count += 1,
                None => {
                    return Err(GraphError(format!(
                        "{} points at unknown table {parent}",
                        spec.name
                    )));
                }
            }
        }
    }

    // Kahn's algorithm, following registry order among ready tables for a stable result.
    let mut order = Vec::with_capacity(tables.len());
    let mut done: BTreeSet<&str> = BTreeSet::new();
    while order.len() < tables.len() {
        let ready = tables
            .iter()
            .find(|spec| !done.contains(spec.name) && pending[spec.name] == 0);
        let Some(spec) = ready else {
            let stuck: Vec<&str> = tables
                .iter()
                .filter(|spec| !done.contains(spec.name))
                .map(|spec| spec.name)
                .collect();
            return Err(GraphError(format!("cycle among {}", stuck.join(", "))));
        };

        done.insert(spec.name);
        order.push(spec);
        for parent in parents_of(spec) {
            if let Some(count) = pending.get_mut(parent) {
                *count -= 1;
            }
        }
    }

    Ok(order)
}

fn parents_of(spec: &TableSpec) -> BTreeSet<&'static str> {
    spec.edges.iter().map(|edge| edge.parent).collect()
}

/// Columns of a table as created by [`create_table_sql`].
pub fn columns(spec: &TableSpec) -> Vec<&'static str> {
    let mut columns = vec!["id"];
    if spec.tenant_scoped {
        columns.push(TENANT_COLUMN);
    }
    columns.extend(spec.edges.iter().map(|edge| edge.column));
    columns
}

/// DDL for the tenants table.
pub fn create_tenants_sql() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#
}

/// DDL for a registry table.
///
/// Only the columns the engine reads are created; foreign keys are not
/// declared because legacy rows may point at parents that no longer exist.
/// `serial_type` is the backend's auto-incrementing key declaration, used for
/// the audit table's ordering column.
pub fn create_table_sql(spec: &TableSpec, serial_type: &str) -> String {
    if spec.name == AUDIT_TABLE {
        return format!(
            "CREATE TABLE IF NOT EXISTS {AUDIT_TABLE} (
                seq {serial_type},
                id TEXT NOT NULL UNIQUE,
                tenant_id TEXT,
                event_type TEXT NOT NULL,
                message TEXT NOT NULL,
                actor_id TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL
            )"
        );
    }

    let mut columns = vec!["id TEXT PRIMARY KEY".to_string()];
    if spec.tenant_scoped {
        columns.push(format!("{TENANT_COLUMN} TEXT"));
    }
    for edge in spec.edges {
        columns.push(format!("{} TEXT", edge.column));
    }
    if spec.name == "users" {
        columns.push("email TEXT".to_string());
        columns.push("name TEXT".to_string());
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        spec.name,
        columns.join(", ")
    )
}
