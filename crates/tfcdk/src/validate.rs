//! Tree validation
//!
//! Validation runs before synthesis and never stops at the first problem. All issues of a tree are collected so they
//! can be fixed in one go.
//!
//! - structural checks per element ([validate_node])
//! - sibling id collisions ([find_duplicate_ids])
//! - `depends_on` cycles ([find_circular_dependencies])
//! - dangling references and providers ([find_invalid_references])
use crate::construct::{
    self, stack_elements, ConstructMetadata, ConstructNode, Lifecycle, Provisioner,
};
use crate::tokens::TokenMap;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingRequiredField,
    InvalidFieldType,
    InvalidReference,
    DuplicateId,
    InvalidLifecycle,
    InvalidProvider,
    CircularDependency,
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::MissingRequiredField => f.write_str("MISSING_REQUIRED_FIELD"),
            ErrorCode::InvalidFieldType => f.write_str("INVALID_FIELD_TYPE"),
            ErrorCode::InvalidReference => f.write_str("INVALID_REFERENCE"),
            ErrorCode::DuplicateId => f.write_str("DUPLICATE_ID"),
            ErrorCode::InvalidLifecycle => f.write_str("INVALID_LIFECYCLE"),
            ErrorCode::InvalidProvider => f.write_str("INVALID_PROVIDER"),
            ErrorCode::CircularDependency => f.write_str("CIRCULAR_DEPENDENCY"),
            ErrorCode::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// A single problem found in the tree
///
/// `path` is the path of the offending construct. For [ErrorCode::CircularDependency] it holds the addresses
/// forming the cycle instead, starting and ending with the same address.
#[derive(Debug, Clone, PartialEq, Serialize, derive_new::new)]
pub struct ValidationError {
    pub path: Vec<String>,
    pub message: String,
    pub code: ErrorCode,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.path.join("/"), self.message)
    }
}

/// All problems found in a tree, in the order they were discovered
#[derive(derive_new::new, Debug, Default)]
pub struct ValidationErrors {
    #[new(default)]
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn log(&mut self, error: ValidationError) {
        tracing::trace!(?error, "validation error found");
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }
}

impl Extend<ValidationError> for ValidationErrors {
    fn extend<I: IntoIterator<Item = ValidationError>>(&mut self, iter: I) {
        for error in iter {
            self.log(error);
        }
    }
}

impl std::error::Error for ValidationErrors {}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

/// Run every check over the whole tree, an empty result means the tree is valid
#[tracing::instrument(level = "debug", skip_all, fields(root = %tree.display_path()))]
pub fn validate_tree(tree: &ConstructNode, tokens: &TokenMap) -> Vec<ValidationError> {
    let mut errors = ValidationErrors::new();

    for node_errors in construct::walk_tree(tree, |node, _| validate_node(node)) {
        errors.extend(node_errors);
    }
    errors.extend(find_duplicate_ids(tree));
    errors.extend(find_circular_dependencies(tree, tokens));
    errors.extend(find_invalid_references(tree, tokens));

    tracing::debug!(count = errors.len(), "validation done");
    errors.into_vec()
}

/// Structural checks of a single node (children are not visited)
pub fn validate_node(node: &ConstructNode) -> Vec<ValidationError> {
    let mut errors = vec![];
    let mut report = |code, message: String| {
        errors.push(ValidationError::new(node.path().to_vec(), message, code))
    };

    match node.metadata() {
        ConstructMetadata::App(app) => {
            if app.outdir.is_empty() {
                report(ErrorCode::MissingRequiredField, "app requires an outdir".into());
            }
        }
        ConstructMetadata::Stack(stack) => {
            if stack.stack_name.is_empty() {
                report(ErrorCode::MissingRequiredField, "stack requires a stack_name".into());
            }
        }
        ConstructMetadata::Resource(resource) => {
            if resource.resource_type.is_empty() {
                report(ErrorCode::MissingRequiredField, "resource requires a type".into());
            }
            check_iteration(&resource.count, &resource.for_each, &mut report);
            if let Some(lifecycle) = &resource.lifecycle {
                check_lifecycle(lifecycle, &mut report);
            }
            for provisioner in resource.provisioners.iter().flatten() {
                check_provisioner(provisioner, &mut report);
            }
        }
        ConstructMetadata::Provider(provider) => {
            if provider.source.is_empty() {
                report(ErrorCode::MissingRequiredField, "provider requires a source".into());
            }
        }
        ConstructMetadata::DataSource(data) => {
            if data.data_type.is_empty() {
                report(ErrorCode::MissingRequiredField, "data source requires a type".into());
            }
            check_iteration(&data.count, &data.for_each, &mut report);
        }
        ConstructMetadata::Variable(variable) => {
            check_flag("sensitive", &variable.sensitive, ErrorCode::InvalidFieldType, &mut report);
            check_flag("nullable", &variable.nullable, ErrorCode::InvalidFieldType, &mut report);
            for validation in variable.validation.iter().flatten() {
                if validation.error_message.is_empty() {
                    report(
                        ErrorCode::MissingRequiredField,
                        "variable validation requires an error_message".into(),
                    );
                }
            }
        }
        ConstructMetadata::Output(output) => {
            if output.value.is_none() {
                report(ErrorCode::MissingRequiredField, "output requires a value".into());
            }
            check_flag("sensitive", &output.sensitive, ErrorCode::InvalidFieldType, &mut report);
        }
        ConstructMetadata::Backend(backend) => {
            if backend.backend_type.is_empty() {
                report(ErrorCode::MissingRequiredField, "backend requires a type".into());
            }
        }
        ConstructMetadata::Local(local) => {
            if local.expression.is_none() {
                report(ErrorCode::MissingRequiredField, "local requires an expression".into());
            }
        }
    }

    errors
}

fn check_flag(
    name: &str,
    flag: &Option<Value>,
    code: ErrorCode,
    report: &mut impl FnMut(ErrorCode, String),
) {
    match flag {
        None | Some(Value::Boolean(_)) => {}
        Some(other) => report(code, format!("{name} must be a boolean, found {other:?}")),
    }
}

fn check_iteration(
    count: &Option<Value>,
    for_each: &Option<Value>,
    report: &mut impl FnMut(ErrorCode, String),
) {
    if count.is_some() && for_each.is_some() {
        report(
            ErrorCode::InvalidFieldType,
            "count and for_each can not be used together".into(),
        );
    }

    match count {
        None | Some(Value::Integer(0..)) | Some(Value::String(_)) => {}
        Some(other) => report(
            ErrorCode::InvalidFieldType,
            format!("count must be a non-negative integer or an expression, found {other:?}"),
        ),
    }

    match for_each {
        None | Some(Value::Object(_) | Value::Array(_) | Value::String(_)) => {}
        Some(other) => report(
            ErrorCode::InvalidFieldType,
            format!("for_each must be a map, a set or an expression, found {other:?}"),
        ),
    }
}

fn check_lifecycle(lifecycle: &Lifecycle, report: &mut impl FnMut(ErrorCode, String)) {
    check_flag(
        "lifecycle.create_before_destroy",
        &lifecycle.create_before_destroy,
        ErrorCode::InvalidLifecycle,
        report,
    );
    check_flag(
        "lifecycle.prevent_destroy",
        &lifecycle.prevent_destroy,
        ErrorCode::InvalidLifecycle,
        report,
    );

    match &lifecycle.ignore_changes {
        None => {}
        Some(Value::String(all)) if all == "all" => {}
        Some(Value::Array(attributes)) if attributes.iter().all(|a| a.as_str().is_some()) => {}
        Some(other) => report(
            ErrorCode::InvalidLifecycle,
            format!("lifecycle.ignore_changes must be \"all\" or a list of strings, found {other:?}"),
        ),
    }

    let conditions = lifecycle
        .precondition
        .iter()
        .flatten()
        .chain(lifecycle.postcondition.iter().flatten());
    for condition in conditions {
        if condition.error_message.is_empty() {
            report(
                ErrorCode::InvalidLifecycle,
                "lifecycle conditions require an error_message".into(),
            );
        }
    }
}

const PROVISIONER_TYPES: [&str; 3] = ["local-exec", "remote-exec", "file"];
const PROVISIONER_WHEN: [&str; 2] = ["create", "destroy"];
const PROVISIONER_ON_FAILURE: [&str; 2] = ["continue", "fail"];

fn check_provisioner(provisioner: &Provisioner, report: &mut impl FnMut(ErrorCode, String)) {
    let mut check = |field: &str, value: Option<&str>, allowed: &[&str]| {
        if let Some(value) = value {
            if !allowed.contains(&value) {
                report(
                    ErrorCode::InvalidFieldType,
                    format!("provisioner {field} must be one of {allowed:?}, found {value:?}"),
                );
            }
        }
    };

    check("type", Some(provisioner.provisioner_type.as_str()), &PROVISIONER_TYPES);
    check("when", provisioner.when.as_deref(), &PROVISIONER_WHEN);
    check("on_failure", provisioner.on_failure.as_deref(), &PROVISIONER_ON_FAILURE);
}

/// Children of the same parent must have distinct ids
pub fn find_duplicate_ids(tree: &ConstructNode) -> Vec<ValidationError> {
    let mut errors = vec![];

    for parent in construct::walk_tree(tree, |node, _| node) {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();

        for (index, child) in parent.children().iter().enumerate() {
            let Some(first) = first_seen.get(child.id()).copied() else {
                first_seen.insert(child.id(), index);
                continue;
            };

            tracing::debug!(path = %child.display_path(), index, first, "duplicate id");
            errors.push(ValidationError::new(
                child.path().to_vec(),
                format!(
                    "duplicate id {:?} at child #{index} of {}, first occurrence is child #{first}",
                    child.id(),
                    parent.display_path(),
                ),
                ErrorCode::DuplicateId,
            ));
        }
    }

    errors
}

/// Addressable elements of the tree by their terraform address, first one wins
fn addressables(tree: &ConstructNode) -> IndexMap<String, &ConstructNode> {
    let mut addressables = IndexMap::new();
    for node in construct::walk_tree(tree, |node, _| node) {
        if let Some(fqn) = node.fqn() {
            addressables.entry(fqn).or_insert(node);
        }
    }
    addressables
}

/// Report every `depends_on` cycle once
pub fn find_circular_dependencies(tree: &ConstructNode, tokens: &TokenMap) -> Vec<ValidationError> {
    let addressables = addressables(tree);
    let mut graph = DependencyGraph::new();

    for (address, node) in &addressables {
        graph.add_node(address.clone());

        for entry in node.metadata().depends_on().into_iter().flatten() {
            let Some(target) = tokens.reference_address(entry) else {
                continue;
            };
            if addressables.contains_key(&target) {
                graph.add_edge(address, target);
            }
        }
    }

    graph
        .find_all_cycles()
        .into_iter()
        .map(|cycle| {
            let message = format!("circular dependency: {}", cycle.join(" -> "));
            ValidationError::new(cycle, message, ErrorCode::CircularDependency)
        })
        .collect()
}

/// `depends_on` entries that do not name an element of their own stack and resources using undeclared providers
pub fn find_invalid_references(tree: &ConstructNode, tokens: &TokenMap) -> Vec<ValidationError> {
    let mut errors = vec![];

    for stack in construct::stacks(tree) {
        let elements = stack_elements(stack, Some);
        let addresses: IndexSet<String> = elements
            .iter()
            .filter_map(|(node, _)| node.fqn())
            .collect();

        for (node, metadata) in &elements {
            for entry in metadata.depends_on().into_iter().flatten() {
                let message = match tokens.reference_address(entry) {
                    Some(address) if addresses.contains(&address) => continue,
                    Some(address) => format!(
                        "depends_on references {address} which is not an element of stack {}",
                        stack.display_path()
                    ),
                    None => format!("depends_on entry {entry:?} is not a reference"),
                };
                errors.push(ValidationError::new(
                    node.path().to_vec(),
                    message,
                    ErrorCode::InvalidReference,
                ));
            }
        }

        let providers: IndexSet<String> = stack_elements(stack, ConstructMetadata::as_provider)
            .into_iter()
            .map(|(_, provider)| provider.fqn())
            .collect();

        let users = stack_elements(stack, |metadata| match metadata {
            ConstructMetadata::Resource(resource) => resource.provider.as_ref(),
            ConstructMetadata::DataSource(data) => data.provider.as_ref(),
            _ => None,
        });

        for (node, provider) in users {
            if !providers.contains(provider) {
                errors.push(ValidationError::new(
                    node.path().to_vec(),
                    format!(
                        "provider {provider} is not declared in stack {}",
                        stack.display_path()
                    ),
                    ErrorCode::InvalidProvider,
                ));
            }
        }
    }

    errors
}

/// Graph of `depends_on` edges between element addresses
///
/// Nodes are kept in insertion order so cycles are found and reported in tree order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// address -> addresses it depends on
    deps: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>) {
        self.deps.entry(name.into()).or_default();
    }

    /// `from` depends on `to`
    pub fn add_edge(&mut self, from: &str, to: impl Into<String>) {
        let to = to.into();
        tracing::trace!(from, %to, "dependency edge");
        if let Some(deps) = self.deps.get_mut(from) {
            deps.push(to);
        }
    }

    /// Every cycle reachable from any node, eg. `["a", "b", "a"]`
    ///
    /// Nodes that were fully explored are not entered again, so each cycle is reported once.
    pub fn find_all_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = vec![];
        let mut visited = IndexSet::new();

        for node in self.deps.keys() {
            if !visited.contains(node.as_str()) {
                self.dfs_cycles(node, &mut visited, &mut cycles);
            }
        }

        cycles
    }

    /// Depth first search without recursion, `path` holds the current path and `next_neighbor` where to continue per node
    fn dfs_cycles<'g>(
        &'g self,
        start: &'g str,
        visited: &mut IndexSet<&'g str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(start);
        let mut path: IndexSet<&'g str> = IndexSet::from([start]);
        let mut next_neighbor = vec![0];

        while let (Some(node), Some(next)) = (path.last().copied(), next_neighbor.last_mut()) {
            let neighbors = self.deps.get(node).map(Vec::as_slice).unwrap_or_default();
            let Some(neighbor) = neighbors.get(*next) else {
                path.pop();
                next_neighbor.pop();
                continue;
            };
            *next += 1;

            if let Some(position) = path.get_index_of(neighbor.as_str()) {
                let mut cycle: Vec<String> = path
                    .iter()
                    .skip(position)
                    .map(|n| n.to_string())
                    .collect();
                cycle.push(neighbor.clone());
                tracing::debug!(?cycle, "cycle found");
                cycles.push(cycle);
            } else if !visited.contains(neighbor.as_str()) {
                visited.insert(neighbor.as_str());
                path.insert(neighbor.as_str());
                next_neighbor.push(0);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::construct::*;
    use crate::tokens::Token;
    use pretty_assertions::assert_eq;

    fn path(components: &[&str]) -> Vec<String> {
        components.iter().map(|c| c.to_string()).collect()
    }

    /// `app/dev` with the given children (id, metadata)
    fn tree_with(children: Vec<(&str, ConstructMetadata)>) -> ConstructNode {
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
        let mut tree = add_child(&app, &path(&["app"]), stack).unwrap();
        for (id, metadata) in children {
            let child = create_node(id, path(&["app", "dev", id]), metadata);
            tree = add_child(&tree, &path(&["app", "dev"]), child).unwrap();
        }
        tree
    }

    fn resource_depending_on(resource_type: &str, depends_on: Vec<String>) -> ConstructMetadata {
        ConstructMetadata::Resource(ResourceMetadata {
            depends_on: Some(depends_on),
            ..ResourceMetadata::new(resource_type)
        })
    }

    fn codes(errors: &[ValidationError]) -> Vec<ErrorCode> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn valid_tree() {
        let tree = tree_with(vec![
            (
                "aws",
                ConstructMetadata::Provider(ProviderMetadata::new("hashicorp/aws")),
            ),
            (
                "bucket",
                ConstructMetadata::Resource(ResourceMetadata {
                    provider: Some("aws".into()),
                    ..ResourceMetadata::new("aws_s3_bucket")
                }),
            ),
        ]);

        let errors = validate_tree(&tree, &TokenMap::new());
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn missing_required_fields() {
        let tree = tree_with(vec![
            ("r", ConstructMetadata::Resource(ResourceMetadata::new(""))),
            ("p", ConstructMetadata::Provider(ProviderMetadata::new(""))),
            ("d", ConstructMetadata::DataSource(DataSourceMetadata::new(""))),
            ("o", ConstructMetadata::Output(Default::default())),
            ("b", ConstructMetadata::Backend(Default::default())),
            ("l", ConstructMetadata::Local(Default::default())),
        ]);

        let errors = validate_tree(&tree, &TokenMap::new());

        assert_eq!(codes(&errors), vec![ErrorCode::MissingRequiredField; 6]);
        assert_eq!(errors[0].path, path(&["app", "dev", "r"]));
    }

    #[test]
    fn app_and_stack_require_names() {
        let app = create_node(
            "app",
            path(&["app"]),
            ConstructMetadata::App(AppMetadata::new(String::new())),
        );
        let stack = create_node(
            "dev",
            path(&["app", "dev"]),
            ConstructMetadata::Stack(StackMetadata::new(String::new())),
        );
        let tree = add_child(&app, &path(&["app"]), stack).unwrap();

        let errors = validate_tree(&tree, &TokenMap::new());

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, path(&["app"]));
        assert_eq!(errors[1].path, path(&["app", "dev"]));
    }

    #[test]
    fn all_node_errors_are_collected() {
        let resource = ResourceMetadata {
            count: Some(Value::from(true)),
            lifecycle: Some(Lifecycle {
                create_before_destroy: Some("yes".into()),
                prevent_destroy: Some(true.into()),
                ignore_changes: Some(Value::from(vec![Value::from("tags"), Value::from(1)])),
                ..Default::default()
            }),
            provisioners: Some(vec![Provisioner {
                provisioner_type: "shell".into(),
                when: Some("later".into()),
                on_failure: Some("fail".into()),
                config: Default::default(),
            }]),
            ..ResourceMetadata::new("")
        };
        let node = create_node(
            "r",
            path(&["r"]),
            ConstructMetadata::Resource(resource),
        );

        assert_eq!(
            codes(&validate_node(&node)),
            vec![
                ErrorCode::MissingRequiredField,
                ErrorCode::InvalidFieldType,
                ErrorCode::InvalidLifecycle,
                ErrorCode::InvalidLifecycle,
                ErrorCode::InvalidFieldType,
                ErrorCode::InvalidFieldType,
            ]
        );
    }

    #[test]
    fn ignore_changes_all() {
        let resource = ResourceMetadata {
            lifecycle: Some(Lifecycle {
                ignore_changes: Some("all".into()),
                ..Default::default()
            }),
            ..ResourceMetadata::new("aws_instance")
        };
        let node = create_node("r", path(&["r"]), ConstructMetadata::Resource(resource));

        let errors = validate_node(&node);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn count_and_for_each_conflict() {
        let resource = ResourceMetadata {
            count: Some(2.into()),
            for_each: Some(Value::from(vec!["a"])),
            ..ResourceMetadata::new("aws_instance")
        };
        let node = create_node("r", path(&["r"]), ConstructMetadata::Resource(resource));

        assert_eq!(codes(&validate_node(&node)), vec![ErrorCode::InvalidFieldType]);
    }

    #[test]
    fn duplicate_ids() {
        let tree = tree_with(vec![
            ("same", ConstructMetadata::Local(LocalMetadata::new(1))),
            ("other", ConstructMetadata::Local(LocalMetadata::new(2))),
            ("same", ConstructMetadata::Local(LocalMetadata::new(3))),
        ]);

        let errors = find_duplicate_ids(&tree);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::DuplicateId);
        assert_eq!(errors[0].path, path(&["app", "dev", "same"]));
        assert!(errors[0].message.contains("child #2"));
        assert!(errors[0].message.contains("first occurrence is child #0"));
    }

    #[test]
    fn two_resource_cycle_is_reported_once() {
        let mut tokens = TokenMap::new();
        let r1 = tokens.create_token(Token::reference("null_resource.r1_6E6D4BF6", ""));
        let r2 = tokens.create_token(Token::reference("null_resource.r2_03F89ED5", ""));

        let tree = tree_with(vec![
            ("r1", resource_depending_on("null_resource", vec![r2])),
            ("r2", resource_depending_on("null_resource", vec![r1])),
        ]);

        let errors = validate_tree(&tree, &tokens);
        let cycles: Vec<_> = errors
            .iter()
            .filter(|e| e.code == ErrorCode::CircularDependency)
            .collect();

        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0].path,
            path(&[
                "null_resource.r1_6E6D4BF6",
                "null_resource.r2_03F89ED5",
                "null_resource.r1_6E6D4BF6"
            ])
        );
        assert_eq!(cycles[0].path.first(), cycles[0].path.last());
    }

    #[test]
    fn self_dependency() {
        let tree = tree_with(vec![(
            "a",
            resource_depending_on("null_resource", vec!["null_resource.a_B016E630".into()]),
        )]);

        let errors = find_circular_dependencies(&tree, &TokenMap::new());

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].path,
            path(&["null_resource.a_B016E630", "null_resource.a_B016E630"])
        );
    }

    #[test]
    fn chains_without_cycles() {
        let tree = tree_with(vec![
            (
                "a",
                resource_depending_on("null_resource", vec!["null_resource.b_159036C9".into()]),
            ),
            (
                "b",
                resource_depending_on("null_resource", vec!["null_resource.c_17D10142".into()]),
            ),
            ("c", ConstructMetadata::Resource(ResourceMetadata::new("null_resource"))),
        ]);

        assert!(find_circular_dependencies(&tree, &TokenMap::new()).is_empty());
    }

    #[test]
    fn graph_reports_separate_cycles() {
        let mut graph = DependencyGraph::new();
        for node in ["a", "b", "c", "d"] {
            graph.add_node(node);
        }
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        graph.add_edge("c", "d");
        graph.add_edge("d", "c");
        graph.add_edge("d", "a");

        assert_eq!(
            graph.find_all_cycles(),
            vec![vec!["a", "b", "a"], vec!["c", "d", "c"]]
        );
    }

    #[test]
    fn long_chains_do_not_grow_the_call_stack() {
        let mut graph = DependencyGraph::new();
        let names: Vec<_> = (0..50_000).map(|i| format!("n{i}")).collect();
        for name in &names {
            graph.add_node(name.as_str());
        }
        for pair in names.windows(2) {
            graph.add_edge(&pair[0], pair[1].as_str());
        }
        assert!(graph.find_all_cycles().is_empty());

        graph.add_edge("n49999", "n0");
        let cycles = graph.find_all_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 50_001);
        assert_eq!(cycles[0].first(), cycles[0].last());
    }

    #[test]
    fn unknown_references_and_providers() {
        let mut tokens = TokenMap::new();
        let missing = tokens.create_token(Token::reference("aws_vpc.gone", "id"));

        let tree = tree_with(vec![(
            "web",
            ConstructMetadata::Resource(ResourceMetadata {
                provider: Some("aws.west".into()),
                depends_on: Some(vec![missing]),
                ..ResourceMetadata::new("aws_instance")
            }),
        )]);

        let errors = validate_tree(&tree, &tokens);

        assert_eq!(
            codes(&errors),
            vec![ErrorCode::InvalidReference, ErrorCode::InvalidProvider]
        );
        assert!(errors.iter().all(|e| e.path == path(&["app", "dev", "web"])));
    }

    #[test]
    fn plain_depends_on_must_exist() {
        let tree = tree_with(vec![
            ("vpc", ConstructMetadata::Resource(ResourceMetadata::new("aws_vpc"))),
            (
                "web",
                resource_depending_on(
                    "aws_instance",
                    vec!["aws_vpc.vpc_8CD1A3FE".into(), "aws_vpc.typo".into()],
                ),
            ),
        ]);

        let errors = validate_tree(&tree, &TokenMap::new());

        assert_eq!(codes(&errors), vec![ErrorCode::InvalidReference]);
        assert!(errors[0].message.contains("aws_vpc.typo"), "{}", errors[0].message);
    }

    #[test]
    fn depends_on_must_not_leave_the_stack() {
        let mut tokens = TokenMap::new();
        let dev_a = tokens.create_token(Token::reference("null_resource.a_B016E630", ""));

        let mut tree = tree_with(vec![(
            "a",
            ConstructMetadata::Resource(ResourceMetadata::new("null_resource")),
        )]);
        let prod = create_node(
            "prod",
            path(&["app", "prod"]),
            ConstructMetadata::Stack(StackMetadata::new("prod".into())),
        );
        tree = add_child(&tree, &path(&["app"]), prod).unwrap();
        let b = create_node(
            "b",
            path(&["app", "prod", "b"]),
            resource_depending_on("null_resource", vec![dev_a]),
        );
        tree = add_child(&tree, &path(&["app", "prod"]), b).unwrap();

        let errors = validate_tree(&tree, &tokens);

        assert_eq!(codes(&errors), vec![ErrorCode::InvalidReference]);
        assert_eq!(errors[0].path, path(&["app", "prod", "b"]));
    }

    #[test]
    fn function_tokens_are_not_references() {
        let mut tokens = TokenMap::new();
        let call = tokens.create_token(Token::function("uuid", vec![]));

        let tree = tree_with(vec![(
            "web",
            resource_depending_on("aws_instance", vec![call]),
        )]);

        assert_eq!(
            codes(&validate_tree(&tree, &tokens)),
            vec![ErrorCode::InvalidReference]
        );
    }

    #[test]
    fn errors_display() {
        let errors = ValidationErrors::from(vec![ValidationError::new(
            path(&["app", "dev"]),
            "stack requires a stack_name".into(),
            ErrorCode::MissingRequiredField,
        )]);

        assert_eq!(
            errors.to_string(),
            "1 validation error(s)\n  [MISSING_REQUIRED_FIELD] app/dev: stack requires a stack_name"
        );
    }
}
