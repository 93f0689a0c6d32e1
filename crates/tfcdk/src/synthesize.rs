//! Stack synthesis
//!
//! Turns the elements of one stack into a terraform json document.
//!
//! ```json
//! {
//!   "terraform": { "required_providers": { "aws": { "source": "hashicorp/aws" } } },
//!   "provider": { "aws": [{ "region": "eu-west-1" }] },
//!   "resource": { "aws_s3_bucket": { "logs_1B0441DE": { "bucket": "logs" } } }
//! }
//! ```
//!
//! Every element is keyed by its logical id ([crate::logical_id]) and all embedded tokens are resolved into terraform
//! interpolations. Sections without elements are left out.
use crate::construct::{
    stack_elements, Condition, ConstructMetadata, ConstructNode, DataSourceMetadata, Lifecycle,
    ProviderMetadata, Provisioner, ResourceMetadata, VariableMetadata,
};
use crate::tokens::{strip_interpolation, TokenMap};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

type Block = IndexMap<String, Value>;

/// A synthesized stack
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TerraformJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terraform: Option<TerraformBlock>,
    /// provider short name -> configurations (one per alias)
    ///
    /// Terraform json lists all configurations of a provider under its name, so unlike the other sections providers
    /// are not keyed by logical id.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub provider: IndexMap<String, Vec<Value>>,
    /// resource type -> logical id -> resource
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub resource: IndexMap<String, IndexMap<String, Value>>,
    /// data source type -> logical id -> data source
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, IndexMap<String, Value>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub variable: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub output: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub locals: IndexMap<String, Value>,
}

impl TerraformJson {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TerraformBlock {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub required_providers: IndexMap<String, RequiredProvider>,
    /// backend type -> configuration, holds at most one entry
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub backend: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequiredProvider {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[tracing::instrument(level = "debug", skip_all, fields(stack = %stack.display_path()))]
pub fn synthesize_stack(stack: &ConstructNode, tokens: &TokenMap) -> TerraformJson {
    let mut document = TerraformJson::default();
    let mut terraform = TerraformBlock::default();

    for (node, provider) in stack_elements(stack, ConstructMetadata::as_provider) {
        let name = provider.short_name().to_string();
        tracing::trace!(path = %node.display_path(), %name, "provider");

        terraform
            .required_providers
            .entry(name.clone())
            .or_insert_with(|| RequiredProvider {
                source: provider.source.clone(),
                version: provider.version.clone(),
            });
        document
            .provider
            .entry(name)
            .or_default()
            .push(synthesize_provider(provider, tokens));
    }

    for (node, resource) in stack_elements(stack, ConstructMetadata::as_resource) {
        let by_id = document
            .resource
            .entry(resource.resource_type.clone())
            .or_default();
        insert_unique(by_id, node, synthesize_resource(resource, tokens));
    }

    for (node, data) in stack_elements(stack, ConstructMetadata::as_data_source) {
        let by_id = document.data.entry(data.data_type.clone()).or_default();
        insert_unique(by_id, node, synthesize_data_source(data, tokens));
    }

    for (node, variable) in stack_elements(stack, ConstructMetadata::as_variable) {
        insert_unique(&mut document.variable, node, synthesize_variable(variable, tokens));
    }

    for (node, output) in stack_elements(stack, ConstructMetadata::as_output) {
        let mut block = Block::new();
        insert_resolved(&mut block, "value", &output.value, tokens);
        insert_some(&mut block, "description", output.description.clone());
        insert_resolved(&mut block, "sensitive", &output.sensitive, tokens);
        if let Some(depends_on) = &output.depends_on {
            block.insert("depends_on".into(), dependency_list(depends_on, tokens));
        }
        insert_unique(&mut document.output, node, Value::Object(block));
    }

    for (node, local) in stack_elements(stack, ConstructMetadata::as_local) {
        let expression = local
            .expression
            .as_ref()
            .map_or(Value::Null, |expression| tokens.resolve(expression));
        insert_unique(&mut document.locals, node, expression);
    }

    for (node, backend) in stack_elements(stack, ConstructMetadata::as_backend) {
        if let Some(existing) = terraform.backend.keys().next() {
            tracing::warn!(
                path = %node.display_path(),
                %existing,
                "stack already has a backend, ignoring"
            );
            continue;
        }
        terraform.backend.insert(
            backend.backend_type.clone(),
            Value::Object(resolve_config(&backend.config, tokens)),
        );
    }

    if !terraform.required_providers.is_empty() || !terraform.backend.is_empty() {
        document.terraform = Some(terraform);
    }

    document
}

/// Insert keyed by logical id, an element with an id that is already taken is dropped
fn insert_unique(map: &mut IndexMap<String, Value>, node: &ConstructNode, value: Value) {
    let logical_id = node.logical_id();
    if map.contains_key(logical_id) {
        tracing::warn!(path = %node.display_path(), logical_id, "logical id collision, element skipped");
        return;
    }
    map.insert(logical_id.to_string(), value);
}

fn resolve_config(config: &Block, tokens: &TokenMap) -> Block {
    config
        .iter()
        .map(|(key, value)| (key.clone(), tokens.resolve(value)))
        .collect()
}

fn insert_some(block: &mut Block, key: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        block.insert(key.to_string(), value.into());
    }
}

fn insert_resolved(block: &mut Block, key: &str, value: &Option<Value>, tokens: &TokenMap) {
    if let Some(value) = value {
        block.insert(key.to_string(), tokens.resolve(value));
    }
}

/// `depends_on` entries as plain addresses (`aws_instance.web`)
fn dependency_list(entries: &[String], tokens: &TokenMap) -> Value {
    entries
        .iter()
        .map(|entry| {
            tokens
                .reference_address(entry)
                .unwrap_or_else(|| reference_expression(entry, tokens))
        })
        .collect::<Vec<_>>()
        .into()
}

/// A reference rendered without interpolation (`aws_instance.web.id`)
fn reference_expression(entry: &str, tokens: &TokenMap) -> String {
    let rendered = tokens
        .resolve_str(entry, &mut |token| tokens.token_to_string(token))
        .unwrap_or_else(|| entry.to_string());
    strip_interpolation(&rendered).to_string()
}

fn synthesize_provider(provider: &ProviderMetadata, tokens: &TokenMap) -> Value {
    let mut block = resolve_config(&provider.config, tokens);
    insert_some(&mut block, "alias", provider.alias.clone());
    Value::Object(block)
}

fn synthesize_resource(resource: &ResourceMetadata, tokens: &TokenMap) -> Value {
    let mut block = resolve_config(&resource.config, tokens);

    insert_some(&mut block, "provider", resource.provider.clone());
    if let Some(depends_on) = &resource.depends_on {
        block.insert("depends_on".into(), dependency_list(depends_on, tokens));
    }
    insert_resolved(&mut block, "count", &resource.count, tokens);
    insert_resolved(&mut block, "for_each", &resource.for_each, tokens);
    if let Some(lifecycle) = &resource.lifecycle {
        block.insert("lifecycle".into(), synthesize_lifecycle(lifecycle, tokens));
    }
    if let Some(provisioners) = &resource.provisioners {
        let provisioners: Vec<_> = provisioners
            .iter()
            .map(|provisioner| synthesize_provisioner(provisioner, tokens))
            .collect();
        block.insert("provisioner".into(), provisioners.into());
    }

    Value::Object(block)
}

fn synthesize_data_source(data: &DataSourceMetadata, tokens: &TokenMap) -> Value {
    let mut block = resolve_config(&data.config, tokens);

    insert_some(&mut block, "provider", data.provider.clone());
    if let Some(depends_on) = &data.depends_on {
        block.insert("depends_on".into(), dependency_list(depends_on, tokens));
    }
    insert_resolved(&mut block, "count", &data.count, tokens);
    insert_resolved(&mut block, "for_each", &data.for_each, tokens);

    Value::Object(block)
}

fn synthesize_lifecycle(lifecycle: &Lifecycle, tokens: &TokenMap) -> Value {
    let mut block = Block::new();

    insert_some(&mut block, "create_before_destroy", lifecycle.create_before_destroy.clone());
    insert_some(&mut block, "prevent_destroy", lifecycle.prevent_destroy.clone());
    insert_some(&mut block, "ignore_changes", lifecycle.ignore_changes.clone());
    if let Some(triggers) = &lifecycle.replace_triggered_by {
        let triggers: Vec<_> = triggers
            .iter()
            .map(|trigger| reference_expression(trigger, tokens))
            .collect();
        block.insert("replace_triggered_by".into(), triggers.into());
    }
    if let Some(conditions) = &lifecycle.precondition {
        block.insert("precondition".into(), synthesize_conditions(conditions, tokens));
    }
    if let Some(conditions) = &lifecycle.postcondition {
        block.insert("postcondition".into(), synthesize_conditions(conditions, tokens));
    }

    Value::Object(block)
}

fn synthesize_conditions(conditions: &[Condition], tokens: &TokenMap) -> Value {
    conditions
        .iter()
        .map(|condition| {
            Value::object([
                ("condition", tokens.resolve(&condition.condition)),
                ("error_message", condition.error_message.clone().into()),
            ])
        })
        .collect::<Vec<_>>()
        .into()
}

/// `{ "<type>": { ...config, when, on_failure } }`
fn synthesize_provisioner(provisioner: &Provisioner, tokens: &TokenMap) -> Value {
    let mut block = resolve_config(&provisioner.config, tokens);
    insert_some(&mut block, "when", provisioner.when.clone());
    insert_some(&mut block, "on_failure", provisioner.on_failure.clone());

    Value::object([(provisioner.provisioner_type.clone(), Value::Object(block))])
}

fn synthesize_variable(variable: &VariableMetadata, tokens: &TokenMap) -> Value {
    let mut block = Block::new();

    insert_some(&mut block, "type", variable.var_type.clone());
    insert_resolved(&mut block, "default", &variable.default, tokens);
    insert_some(&mut block, "description", variable.description.clone());
    insert_some(&mut block, "sensitive", variable.sensitive.clone());
    insert_some(&mut block, "nullable", variable.nullable.clone());
    if let Some(validation) = &variable.validation {
        block.insert("validation".into(), synthesize_conditions(validation, tokens));
    }

    Value::Object(block)
}
