//! App level synthesis
//!
//! An [App] owns one construct tree and the token table used while building it. Synthesizing it validates the whole
//! tree first and only then renders each stack.
//!
//! ```text
//! <outdir>/
//!   manifest.json
//!   stacks/
//!     <stack name>/cdk.tf.json
//! ```
use crate::construct::{
    self, create_node, AppMetadata, ConstructMetadata, ConstructNode, TreeError,
};
use crate::synthesize::{synthesize_stack, TerraformJson};
use crate::tokens::TokenMap;
use crate::validate::{validate_tree, ValidationErrors};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTDIR: &str = "cdktf.out";
pub const ROOT_ID: &str = "app";

const STACKS_DIR: &str = "stacks";
const STACK_FILE: &str = "cdk.tf.json";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(thiserror::Error, Debug)]
pub enum SynthError {
    #[error("construct tree is invalid")]
    Validation(#[source] ValidationErrors),
    #[error("Failed to write {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Failed to serialize stack")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct App {
    root: ConstructNode,
    tokens: TokenMap,
}

impl App {
    pub fn new(outdir: impl Into<String>) -> Self {
        Self::with_root_id(ROOT_ID, outdir)
    }

    pub fn with_root_id(root_id: impl Into<String>, outdir: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let root = create_node(
            root_id.clone(),
            vec![root_id],
            ConstructMetadata::App(AppMetadata::new(outdir.into())),
        );

        Self {
            root,
            tokens: TokenMap::new(),
        }
    }

    pub fn root(&self) -> &ConstructNode {
        &self.root
    }

    pub fn tokens(&self) -> &TokenMap {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenMap {
        &mut self.tokens
    }

    pub fn outdir(&self) -> &str {
        match self.root.metadata() {
            ConstructMetadata::App(app) if !app.outdir.is_empty() => &app.outdir,
            _ => DEFAULT_OUTDIR,
        }
    }

    /// Add a construct below `parent_path`, returns the path of the new construct
    pub fn add(
        &mut self,
        parent_path: &[String],
        id: impl Into<String>,
        metadata: ConstructMetadata,
    ) -> Result<Vec<String>, TreeError> {
        let id = id.into();
        let mut path = parent_path.to_vec();
        path.push(id.clone());

        let child = create_node(id, path.clone(), metadata);
        self.root = construct::add_child(&self.root, parent_path, child)?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let errors = validate_tree(&self.root, &self.tokens);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    /// Validate the tree and render every stack, keyed by stack name
    pub fn synth_stacks(&self) -> Result<IndexMap<String, (&ConstructNode, TerraformJson)>, SynthError> {
        self.validate().map_err(SynthError::Validation)?;

        let mut documents = IndexMap::new();
        for stack in construct::stacks(&self.root) {
            let name = stack_name(stack);
            if documents.contains_key(&name) {
                tracing::warn!(path = %stack.display_path(), %name, "stack name already used, skipping");
                continue;
            }
            documents.insert(name, (stack, synthesize_stack(stack, &self.tokens)));
        }

        Ok(documents)
    }

    /// Write all stacks and the manifest to the output directory
    #[tracing::instrument(level = "debug", skip_all, fields(outdir = self.outdir()))]
    pub fn synth(&self) -> Result<Manifest, SynthError> {
        let outdir = Path::new(self.outdir());
        let mut manifest = Manifest::default();

        for (name, (stack, document)) in self.synth_stacks()? {
            let working_directory = format!("{STACKS_DIR}/{name}");
            let synthesized_stack_path = format!("{working_directory}/{STACK_FILE}");

            let directory = outdir.join(&working_directory);
            std::fs::create_dir_all(&directory)
                .map_err(|e| SynthError::Io(directory.clone(), e))?;
            write_json(&outdir.join(&synthesized_stack_path), &document)?;
            tracing::info!(stack = %name, path = %synthesized_stack_path, "stack synthesized");

            manifest.stacks.insert(
                name.clone(),
                StackManifest {
                    name,
                    construct_path: stack.display_path(),
                    working_directory,
                    synthesized_stack_path,
                },
            );
        }

        write_json(&outdir.join(MANIFEST_FILE), &manifest)?;
        Ok(manifest)
    }
}

fn stack_name(stack: &ConstructNode) -> String {
    match stack.metadata() {
        ConstructMetadata::Stack(s) if !s.stack_name.is_empty() => s.stack_name.clone(),
        _ => stack.id().to_string(),
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<(), SynthError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    std::fs::write(path, json).map_err(|e| SynthError::Io(path.to_owned(), e))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub version: String,
    pub stacks: IndexMap<String, StackManifest>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            stacks: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackManifest {
    pub name: String,
    pub construct_path: String,
    pub working_directory: String,
    pub synthesized_stack_path: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::construct::{ResourceMetadata, StackMetadata};
    use crate::tokens::Token;
    use crate::validate::ErrorCode;
    use pretty_assertions::assert_eq;

    fn root() -> Vec<String> {
        vec![ROOT_ID.to_string()]
    }

    fn stack(name: &str) -> ConstructMetadata {
        ConstructMetadata::Stack(StackMetadata::new(name.into()))
    }

    fn bucket() -> ConstructMetadata {
        ConstructMetadata::Resource(ResourceMetadata::new("aws_s3_bucket"))
    }

    fn temp_outdir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tfcdk-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn add_returns_path() {
        let mut app = App::new("out");
        let dev = app.add(&root(), "dev", stack("dev")).unwrap();
        let bucket = app.add(&dev, "bucket", bucket()).unwrap();

        assert_eq!(bucket, vec!["app", "dev", "bucket"]);
        assert!(construct::find_node(app.root(), &bucket).is_some());
    }

    #[test]
    fn add_to_missing_parent() {
        let mut app = App::new("out");
        let missing = vec!["app".to_string(), "nope".to_string()];

        assert_eq!(
            app.add(&missing, "bucket", bucket()),
            Err(TreeError::ParentNotFound(missing))
        );
    }

    #[test]
    fn outdir_defaults() {
        assert_eq!(App::new("").outdir(), DEFAULT_OUTDIR);
        assert_eq!(App::new("build").outdir(), "build");
    }

    #[test]
    fn invalid_tree_is_not_synthesized() {
        let mut app = App::new("out");
        let dev = app.add(&root(), "dev", stack("dev")).unwrap();
        app.add(&dev, "bucket", ConstructMetadata::Resource(ResourceMetadata::default()))
            .unwrap();

        let Err(SynthError::Validation(errors)) = app.synth_stacks() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors()[0].code, ErrorCode::MissingRequiredField);
    }

    #[test]
    fn one_document_per_stack() {
        let mut app = App::new("out");
        let dev = app.add(&root(), "dev", stack("dev")).unwrap();
        let prod = app.add(&root(), "prod", stack("production")).unwrap();
        app.add(&dev, "bucket", bucket()).unwrap();
        app.add(&prod, "bucket", bucket()).unwrap();

        let documents = app.synth_stacks().unwrap();

        assert_eq!(
            documents.keys().collect::<Vec<_>>(),
            vec!["dev", "production"]
        );
        assert_eq!(documents["dev"].1.resource["aws_s3_bucket"].len(), 1);
    }

    #[test]
    fn synth_writes_stacks_and_manifest() {
        let outdir = temp_outdir("synth");
        let mut app = App::new(outdir.to_string_lossy());
        let dev = app.add(&root(), "dev", stack("dev")).unwrap();
        let bucket_path = app.add(&dev, "bucket", bucket()).unwrap();
        let bucket_fqn = construct::find_node(app.root(), &bucket_path)
            .and_then(|n| n.fqn())
            .unwrap();
        let arn = app.tokens_mut().create_token(Token::reference(bucket_fqn, "arn"));
        app.add(&dev, "arn", ConstructMetadata::Output(crate::construct::OutputMetadata::new(arn)))
            .unwrap();

        let manifest = app.synth().unwrap();

        assert_eq!(
            manifest.stacks["dev"],
            StackManifest {
                name: "dev".into(),
                construct_path: "app/dev".into(),
                working_directory: "stacks/dev".into(),
                synthesized_stack_path: "stacks/dev/cdk.tf.json".into(),
            }
        );

        let written: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(outdir.join("stacks/dev/cdk.tf.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            written["output"],
            serde_json::json!({ "arn_6691A4E2": { "value": "${aws_s3_bucket.bucket_1B0441DE.arn}" } })
        );
        assert!(outdir.join("manifest.json").is_file());

        std::fs::remove_dir_all(outdir).unwrap();
    }
}
