//! The construct tree
//!
//! Application code declares its infrastructure as a tree of [ConstructNode]s. Each node knows its full path (all
//! ancestor ids and its own id) and carries [ConstructMetadata] describing what kind of element it is.
//!
//! ```text
//! app                      App { outdir }
//! └── dev                  Stack { stack_name }
//!     ├── aws              Provider { source = hashicorp/aws }
//!     ├── region           Variable
//!     └── network
//!         └── vpc          Resource { type = aws_vpc }
//! ```
//!
//! Nodes are not mutated once created. [add_child] returns a new tree which contains the added node.
use crate::logical_id::generate_logical_id;
use crate::value::Value;
use indexmap::IndexMap;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct ConstructNode {
    id: String,
    path: Vec<String>,
    children: Vec<ConstructNode>,
    metadata: ConstructMetadata,
    /// computed on first access
    logical_id: OnceLock<String>,
}

pub fn create_node(
    id: impl Into<String>,
    path: Vec<String>,
    metadata: ConstructMetadata,
) -> ConstructNode {
    ConstructNode {
        id: id.into(),
        path,
        children: vec![],
        metadata,
        logical_id: OnceLock::new(),
    }
}

/// Returns a copy of `tree` with `child` appended to the children of the node at `parent_path`
///
/// Fails if there is no such node or if the path of `child` is not `parent_path` followed by its id.
pub fn add_child(
    tree: &ConstructNode,
    parent_path: &[String],
    child: ConstructNode,
) -> Result<ConstructNode, TreeError> {
    let path_matches = child.path.len() == parent_path.len() + 1
        && child.path.starts_with(parent_path)
        && child.path.last() == Some(&child.id);
    if !path_matches {
        return Err(TreeError::PathMismatch {
            id: child.id,
            path: child.path,
        });
    }

    tracing::trace!(path = ?child.path, "add child");
    insert_child(tree, parent_path, child)
        .ok_or_else(|| TreeError::ParentNotFound(parent_path.to_vec()))
}

/// Rebuilds the branch leading to `parent_path`, [None] if it does not exist below `node`
fn insert_child(
    node: &ConstructNode,
    parent_path: &[String],
    child: ConstructNode,
) -> Option<ConstructNode> {
    if node.path == parent_path {
        let mut node = node.clone();
        node.children.push(child);
        return Some(node);
    }

    if !parent_path.starts_with(&node.path) {
        return None;
    }

    let index = node
        .children
        .iter()
        .position(|c| parent_path.starts_with(&c.path))?;
    let updated = insert_child(&node.children[index], parent_path, child)?;

    let mut node = node.clone();
    node.children[index] = updated;
    Some(node)
}

pub fn find_node<'t>(tree: &'t ConstructNode, path: &[String]) -> Option<&'t ConstructNode> {
    if tree.path == path {
        return Some(tree);
    }

    if !path.starts_with(&tree.path) {
        return None;
    }

    tree.children
        .iter()
        .find(|c| path.starts_with(&c.path))
        .and_then(|c| find_node(c, path))
}

/// Pre-order traversal, the visitor also gets the depth (0 for `tree` itself)
pub fn walk_tree<'t, R>(
    tree: &'t ConstructNode,
    mut visitor: impl FnMut(&'t ConstructNode, usize) -> R,
) -> Vec<R> {
    let mut results = vec![];
    let mut stack = vec![(tree, 0)];

    while let Some((node, depth)) = stack.pop() {
        results.push(visitor(node, depth));
        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }

    results
}

/// All nodes below `node` (pre-order), optionally only those of one kind
pub fn get_descendants(node: &ConstructNode, kind: Option<ConstructKind>) -> Vec<&ConstructNode> {
    let mut descendants = vec![];
    let mut stack: Vec<_> = node.children.iter().rev().collect();

    while let Some(next) = stack.pop() {
        if kind.map_or(true, |kind| next.kind() == kind) {
            descendants.push(next);
        }
        stack.extend(next.children.iter().rev());
    }

    descendants
}

/// Elements of one stack selected by `select`, in tree order
///
/// Nested stacks are not part of the stack and are skipped with all their children.
pub fn stack_elements<'t, T: 't>(
    stack: &'t ConstructNode,
    select: impl Fn(&'t ConstructMetadata) -> Option<&'t T>,
) -> Vec<(&'t ConstructNode, &'t T)> {
    let mut elements = vec![];
    let mut pending: Vec<_> = stack.children.iter().rev().collect();

    while let Some(node) = pending.pop() {
        if node.kind() == ConstructKind::Stack {
            continue;
        }
        if let Some(data) = select(&node.metadata) {
            elements.push((node, data));
        }
        pending.extend(node.children.iter().rev());
    }

    elements
}

/// All stacks of the tree, including the root if it is one
pub fn stacks(tree: &ConstructNode) -> Vec<&ConstructNode> {
    let mut stacks = get_descendants(tree, Some(ConstructKind::Stack));
    if tree.kind() == ConstructKind::Stack {
        stacks.insert(0, tree);
    }
    stacks
}

impl ConstructNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn children(&self) -> &[ConstructNode] {
        &self.children
    }

    pub fn metadata(&self) -> &ConstructMetadata {
        &self.metadata
    }

    pub fn kind(&self) -> ConstructKind {
        self.metadata.kind()
    }

    pub fn child(&self, id: &str) -> Option<&ConstructNode> {
        self.children.iter().find(|c| c.id == id)
    }

    /// `path` joined by `/`
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    pub fn logical_id(&self) -> &str {
        self.logical_id
            .get_or_init(|| generate_logical_id(&self.path))
    }

    /// Terraform address of this element, [None] for elements that can not be referenced
    pub fn fqn(&self) -> Option<String> {
        let logical_id = self.logical_id();
        match &self.metadata {
            ConstructMetadata::Resource(resource) => {
                Some(format!("{}.{logical_id}", resource.resource_type))
            }
            ConstructMetadata::DataSource(data) => {
                Some(format!("data.{}.{logical_id}", data.data_type))
            }
            ConstructMetadata::Variable(_) => Some(format!("var.{logical_id}")),
            ConstructMetadata::Local(_) => Some(format!("local.{logical_id}")),
            ConstructMetadata::Output(_) => Some(format!("output.{logical_id}")),
            ConstructMetadata::Provider(provider) => Some(provider.fqn()),
            ConstructMetadata::App(_)
            | ConstructMetadata::Stack(_)
            | ConstructMetadata::Backend(_) => None,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TreeError {
    #[error("No construct found at {}", .0.join("/"))]
    ParentNotFound(Vec<String>),
    #[error("Path {} of construct {id} must be its parent path followed by its id", .path.join("/"))]
    PathMismatch { id: String, path: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructKind {
    App,
    Stack,
    Resource,
    Provider,
    DataSource,
    Variable,
    Output,
    Backend,
    Local,
}

impl std::fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstructKind::App => f.write_str("app"),
            ConstructKind::Stack => f.write_str("stack"),
            ConstructKind::Resource => f.write_str("resource"),
            ConstructKind::Provider => f.write_str("provider"),
            ConstructKind::DataSource => f.write_str("data source"),
            ConstructKind::Variable => f.write_str("variable"),
            ConstructKind::Output => f.write_str("output"),
            ConstructKind::Backend => f.write_str("backend"),
            ConstructKind::Local => f.write_str("local"),
        }
    }
}

/// Element specific data of a [ConstructNode]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructMetadata {
    App(AppMetadata),
    Stack(StackMetadata),
    Resource(ResourceMetadata),
    Provider(ProviderMetadata),
    DataSource(DataSourceMetadata),
    Variable(VariableMetadata),
    Output(OutputMetadata),
    Backend(BackendMetadata),
    Local(LocalMetadata),
}

impl ConstructMetadata {
    pub fn kind(&self) -> ConstructKind {
        match self {
            ConstructMetadata::App(_) => ConstructKind::App,
            ConstructMetadata::Stack(_) => ConstructKind::Stack,
            ConstructMetadata::Resource(_) => ConstructKind::Resource,
            ConstructMetadata::Provider(_) => ConstructKind::Provider,
            ConstructMetadata::DataSource(_) => ConstructKind::DataSource,
            ConstructMetadata::Variable(_) => ConstructKind::Variable,
            ConstructMetadata::Output(_) => ConstructKind::Output,
            ConstructMetadata::Backend(_) => ConstructKind::Backend,
            ConstructMetadata::Local(_) => ConstructKind::Local,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceMetadata> {
        match self {
            ConstructMetadata::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn as_provider(&self) -> Option<&ProviderMetadata> {
        match self {
            ConstructMetadata::Provider(provider) => Some(provider),
            _ => None,
        }
    }

    pub fn as_data_source(&self) -> Option<&DataSourceMetadata> {
        match self {
            ConstructMetadata::DataSource(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableMetadata> {
        match self {
            ConstructMetadata::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn as_output(&self) -> Option<&OutputMetadata> {
        match self {
            ConstructMetadata::Output(output) => Some(output),
            _ => None,
        }
    }

    pub fn as_backend(&self) -> Option<&BackendMetadata> {
        match self {
            ConstructMetadata::Backend(backend) => Some(backend),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<&LocalMetadata> {
        match self {
            ConstructMetadata::Local(local) => Some(local),
            _ => None,
        }
    }

    /// `depends_on` of the elements that support it
    pub fn depends_on(&self) -> Option<&[String]> {
        match self {
            ConstructMetadata::Resource(resource) => resource.depends_on.as_deref(),
            ConstructMetadata::DataSource(data) => data.depends_on.as_deref(),
            ConstructMetadata::Output(output) => output.depends_on.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, derive_new::new)]
pub struct AppMetadata {
    #[serde(default)]
    pub outdir: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, derive_new::new)]
pub struct StackMetadata {
    #[serde(default)]
    pub stack_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ResourceMetadata {
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub config: IndexMap<String, Value>,
    /// fqn of the provider, eg. `aws.west`
    pub provider: Option<String>,
    /// addresses or markers of [crate::tokens::Token::Ref]s
    pub depends_on: Option<Vec<String>>,
    pub count: Option<Value>,
    pub for_each: Option<Value>,
    pub lifecycle: Option<Lifecycle>,
    pub provisioners: Option<Vec<Provisioner>>,
}

impl ResourceMetadata {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }
}

/// Lifecycle meta-argument
///
/// Flags are kept as plain values. Declarations may come from untyped input and are type checked by the validator.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Lifecycle {
    pub create_before_destroy: Option<Value>,
    pub prevent_destroy: Option<Value>,
    /// `"all"` or a list of attribute names
    pub ignore_changes: Option<Value>,
    pub replace_triggered_by: Option<Vec<String>>,
    pub precondition: Option<Vec<Condition>>,
    pub postcondition: Option<Vec<Condition>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, derive_new::new)]
pub struct Condition {
    pub condition: Value,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Provisioner {
    /// `local-exec`, `remote-exec` or `file`
    #[serde(rename = "type")]
    pub provisioner_type: String,
    /// `create` or `destroy`
    pub when: Option<String>,
    /// `continue` or `fail`
    pub on_failure: Option<String>,
    #[serde(default)]
    pub config: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ProviderMetadata {
    /// eg. `hashicorp/aws`
    #[serde(default)]
    pub source: String,
    pub version: Option<String>,
    pub alias: Option<String>,
    #[serde(default)]
    pub config: IndexMap<String, Value>,
}

impl ProviderMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// `hashicorp/aws` -> `aws`
    pub fn short_name(&self) -> &str {
        self.source
            .rsplit_once('/')
            .map_or(self.source.as_str(), |(_, name)| name)
    }

    /// `aws` or `aws.<alias>`
    pub fn fqn(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{alias}", self.short_name()),
            None => self.short_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct DataSourceMetadata {
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub config: IndexMap<String, Value>,
    pub provider: Option<String>,
    pub depends_on: Option<Vec<String>>,
    pub count: Option<Value>,
    pub for_each: Option<Value>,
}

impl DataSourceMetadata {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct VariableMetadata {
    #[serde(rename = "type")]
    pub var_type: Option<String>,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub sensitive: Option<Value>,
    pub nullable: Option<Value>,
    pub validation: Option<Vec<Condition>>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct OutputMetadata {
    pub value: Option<Value>,
    pub description: Option<String>,
    pub sensitive: Option<Value>,
    pub depends_on: Option<Vec<String>>,
}

impl OutputMetadata {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BackendMetadata {
    #[serde(rename = "type", default)]
    pub backend_type: String,
    #[serde(default)]
    pub config: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LocalMetadata {
    pub expression: Option<Value>,
}

impl LocalMetadata {
    pub fn new(expression: impl Into<Value>) -> Self {
        Self {
            expression: Some(expression.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(components: &[&str]) -> Vec<String> {
        components.iter().map(|c| c.to_string()).collect()
    }

    fn sample_tree() -> ConstructNode {
        let app = create_node(
            "app",
            path(&["app"]),
            ConstructMetadata::App(AppMetadata::new("out".into())),
        );
        let stack = create_node(
            "dev",
            path(&["app", "dev"]),
            ConstructMetadata::Stack(StackMetadata::new("dev".into())),
        );
        let bucket = create_node(
            "bucket",
            path(&["app", "dev", "bucket"]),
            ConstructMetadata::Resource(ResourceMetadata::new("aws_s3_bucket")),
        );
        let region = create_node(
            "region",
            path(&["app", "dev", "region"]),
            ConstructMetadata::Variable(Default::default()),
        );

        let tree = add_child(&app, &path(&["app"]), stack).unwrap();
        let tree = add_child(&tree, &path(&["app", "dev"]), bucket).unwrap();
        add_child(&tree, &path(&["app", "dev"]), region).unwrap()
    }

    #[test]
    fn add_child_is_functional() {
        let app = create_node(
            "app",
            path(&["app"]),
            ConstructMetadata::App(AppMetadata::new("out".into())),
        );
        let stack = create_node(
            "dev",
            path(&["app", "dev"]),
            ConstructMetadata::Stack(StackMetadata::new("dev".into())),
        );

        let tree = add_child(&app, &path(&["app"]), stack).unwrap();

        assert!(app.children().is_empty());
        assert_eq!(tree.children().len(), 1);
    }

    #[test]
    fn add_child_to_missing_parent_fails() {
        let tree = sample_tree();
        let orphan = create_node(
            "x",
            path(&["app", "prod", "x"]),
            ConstructMetadata::Local(LocalMetadata::new(1)),
        );

        assert_eq!(
            add_child(&tree, &path(&["app", "prod"]), orphan).unwrap_err(),
            TreeError::ParentNotFound(path(&["app", "prod"]))
        );
    }

    #[test]
    fn add_child_checks_path() {
        let tree = sample_tree();
        let misplaced = create_node(
            "x",
            path(&["app", "x"]),
            ConstructMetadata::Local(LocalMetadata::new(1)),
        );

        assert!(matches!(
            add_child(&tree, &path(&["app", "dev"]), misplaced),
            Err(TreeError::PathMismatch { .. })
        ));
    }

    #[test]
    fn find() {
        let tree = sample_tree();

        let bucket = find_node(&tree, &path(&["app", "dev", "bucket"])).unwrap();
        assert_eq!(bucket.kind(), ConstructKind::Resource);
        assert!(find_node(&tree, &path(&["app", "dev", "nope"])).is_none());
        assert!(find_node(&tree, &path(&["other"])).is_none());
    }

    #[test]
    fn walk_is_pre_order_with_depth() {
        let tree = sample_tree();

        let visited = walk_tree(&tree, |node, depth| (node.id().to_string(), depth));

        assert_eq!(
            visited,
            vec![
                ("app".to_string(), 0),
                ("dev".to_string(), 1),
                ("bucket".to_string(), 2),
                ("region".to_string(), 2),
            ]
        );
    }

    #[test]
    fn descendants_exclude_self() {
        let tree = sample_tree();

        let all: Vec<_> = get_descendants(&tree, None)
            .into_iter()
            .map(ConstructNode::id)
            .collect();
        assert_eq!(all, ["dev", "bucket", "region"]);

        let variables = get_descendants(&tree, Some(ConstructKind::Variable));
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].id(), "region");
    }

    #[test]
    fn stack_elements_skip_nested_stacks() {
        let tree = sample_tree();
        let nested = create_node(
            "inner",
            path(&["app", "dev", "inner"]),
            ConstructMetadata::Stack(StackMetadata::new("inner".into())),
        );
        let hidden = create_node(
            "hidden",
            path(&["app", "dev", "inner", "hidden"]),
            ConstructMetadata::Resource(ResourceMetadata::new("null_resource")),
        );
        let tree = add_child(&tree, &path(&["app", "dev"]), nested).unwrap();
        let tree = add_child(&tree, &path(&["app", "dev", "inner"]), hidden).unwrap();

        let dev = find_node(&tree, &path(&["app", "dev"])).unwrap();
        let resources = stack_elements(dev, ConstructMetadata::as_resource);

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].1.resource_type, "aws_s3_bucket");
        assert_eq!(stacks(&tree).len(), 2);
    }

    #[test]
    fn fqn() {
        let tree = sample_tree();
        let bucket = find_node(&tree, &path(&["app", "dev", "bucket"])).unwrap();
        let region = find_node(&tree, &path(&["app", "dev", "region"])).unwrap();

        assert_eq!(bucket.fqn().as_deref(), Some("aws_s3_bucket.bucket_1B0441DE"));
        assert_eq!(region.fqn().as_deref(), Some("var.region_519C7668"));
        assert_eq!(tree.fqn(), None);
    }

    #[test]
    fn provider_names() {
        let mut provider = ProviderMetadata::new("hashicorp/aws");
        assert_eq!(provider.short_name(), "aws");
        assert_eq!(provider.fqn(), "aws");

        provider.alias = Some("west".into());
        assert_eq!(provider.fqn(), "aws.west");

        assert_eq!(ProviderMetadata::new("local").short_name(), "local");
    }
}
