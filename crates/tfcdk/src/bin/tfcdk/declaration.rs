//! Construct tree declarations
//!
//! ```yaml
//! id: app
//! app: { outdir: cdktf.out }
//! children:
//!   - id: dev
//!     stack: { stack_name: dev }
//!     children:
//!       - id: vpc
//!         resource: { type: aws_vpc, config: { cidr_block: 10.0.0.0/16 } }
//!       - id: subnet
//!         resource:
//!           type: aws_subnet
//!           config: { vpc_id: "${ref:vpc#id}" }
//!           depends_on: [vpc]
//! ```
//!
//! Each construct has an `id`, exactly one metadata key and optional `children`.
//!
//! Other constructs are referenced by their path relative to the enclosing stack:
//! - `${ref:<path>}` and `${ref:<path>#<attribute>}` anywhere inside a string
//! - `depends_on` entries that are a plain path
use crate::cli::InputFormat;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use tfcdk::app::App;
use tfcdk::construct::{create_node, ConstructMetadata};
use tfcdk::tokens::{Token, TokenMap};

const REF_START: &str = "${ref:";
const ATTRIBUTE_SEPARATOR: char = '#';

#[derive(Debug, Deserialize)]
pub struct Declaration {
    pub id: String,
    #[serde(flatten)]
    pub metadata: ConstructMetadata,
    #[serde(default)]
    pub children: Vec<Declaration>,
}

pub fn parse(source: &str, format: InputFormat) -> anyhow::Result<serde_json::Value> {
    let raw = match format {
        InputFormat::Yaml => serde_yaml::from_str(source).context("Unable to parse yaml")?,
        InputFormat::Json => serde_json::from_str(source).context("Unable to parse json")?,
    };
    Ok(raw)
}

/// Build an app from a parsed declaration
pub fn load(mut raw: serde_json::Value, outdir: Option<String>) -> anyhow::Result<App> {
    let declaration: Declaration =
        serde_json::from_value(raw.clone()).context("Invalid construct declaration")?;

    let ConstructMetadata::App(app_metadata) = &declaration.metadata else {
        anyhow::bail!("Root construct {:?} must be an app", declaration.id);
    };
    let mut app = App::with_root_id(
        &declaration.id,
        outdir.unwrap_or_else(|| app_metadata.outdir.clone()),
    );

    let mut addresses = HashMap::new();
    index(&declaration, &[], &mut addresses);

    let root_path = vec![declaration.id.clone()];
    let mut linker = Linker {
        addresses: &addresses,
        tokens: app.tokens_mut(),
    };
    linker.link_declaration(&mut raw, &[], &root_path)?;

    let declaration: Declaration =
        serde_json::from_value(raw).context("Invalid construct declaration")?;
    for child in declaration.children {
        add(&mut app, &root_path, child)?;
    }

    Ok(app)
}

fn add(app: &mut App, parent_path: &[String], declaration: Declaration) -> anyhow::Result<()> {
    let path = app.add(parent_path, declaration.id, declaration.metadata)?;
    for child in declaration.children {
        add(app, &path, child)?;
    }
    Ok(())
}

/// Addresses of everything that can be referenced, by construct path
fn index(declaration: &Declaration, parent_path: &[String], addresses: &mut HashMap<Vec<String>, String>) {
    let mut path = parent_path.to_vec();
    path.push(declaration.id.clone());

    let node = create_node(&declaration.id, path.clone(), declaration.metadata.clone());
    if let Some(fqn) = node.fqn() {
        addresses.insert(path.clone(), fqn);
    }

    for child in &declaration.children {
        index(child, &path, addresses);
    }
}

/// Replaces construct references in the raw declaration with token markers
struct Linker<'a> {
    addresses: &'a HashMap<Vec<String>, String>,
    tokens: &'a mut TokenMap,
}

impl Linker<'_> {
    fn link_declaration(
        &mut self,
        raw: &mut serde_json::Value,
        parent_path: &[String],
        stack_path: &[String],
    ) -> anyhow::Result<()> {
        let serde_json::Value::Object(object) = raw else {
            return Ok(());
        };

        let id = object.get("id").and_then(|id| id.as_str()).unwrap_or_default();
        let mut path = parent_path.to_vec();
        path.push(id.to_string());
        let stack_path = if object.contains_key("stack") {
            path.clone()
        } else {
            stack_path.to_vec()
        };

        for (key, value) in object.iter_mut() {
            match key.as_str() {
                "id" => {}
                "children" => {
                    let serde_json::Value::Array(children) = value else {
                        continue;
                    };
                    for child in children {
                        self.link_declaration(child, &path, &stack_path)?;
                    }
                }
                _ => {
                    self.link_dependencies(value, &stack_path)?;
                    self.link_value(value, &stack_path)?;
                }
            }
        }

        Ok(())
    }

    /// `depends_on: [<path>]` of a metadata block
    fn link_dependencies(&mut self, metadata: &mut serde_json::Value, stack_path: &[String]) -> anyhow::Result<()> {
        let Some(serde_json::Value::Array(entries)) = metadata.get_mut("depends_on") else {
            return Ok(());
        };

        for entry in entries {
            let serde_json::Value::String(s) = entry else {
                continue;
            };
            if s.contains("${") {
                continue;
            }
            if let Some(fqn) = self.addresses.get(&relative_path(stack_path, s)) {
                *s = self.tokens.create_token(Token::reference(fqn, ""));
            }
        }

        Ok(())
    }

    fn link_value(&mut self, value: &mut serde_json::Value, stack_path: &[String]) -> anyhow::Result<()> {
        match value {
            serde_json::Value::String(s) if s.contains(REF_START) => {
                *s = self.link_string(s, stack_path)?;
            }
            serde_json::Value::Array(array) => {
                for element in array {
                    self.link_value(element, stack_path)?;
                }
            }
            serde_json::Value::Object(object) => {
                for element in object.values_mut() {
                    self.link_value(element, stack_path)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn link_string(&mut self, s: &str, stack_path: &[String]) -> anyhow::Result<String> {
        let mut linked = String::new();
        let mut rest = s;

        while let Some(start) = rest.find(REF_START) {
            linked.push_str(&rest[..start]);
            let reference = &rest[start + REF_START.len()..];
            let end = reference
                .find('}')
                .with_context(|| format!("Unterminated reference in {s:?}"))?;

            let (target, attribute) = reference[..end]
                .split_once(ATTRIBUTE_SEPARATOR)
                .unwrap_or((&reference[..end], ""));
            let fqn = self
                .addresses
                .get(&relative_path(stack_path, target))
                .with_context(|| format!("Reference to unknown construct {target:?}"))?;
            linked.push_str(&self.tokens.create_token(Token::reference(fqn, attribute)));

            rest = &reference[end + 1..];
        }
        linked.push_str(rest);

        Ok(linked)
    }
}

fn relative_path(stack_path: &[String], target: &str) -> Vec<String> {
    let mut path = stack_path.to_vec();
    path.extend(
        target
            .split('/')
            .filter(|component| !component.is_empty())
            .map(str::to_string),
    );
    path
}
