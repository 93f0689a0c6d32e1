//! # tfcdk - construct tree to terraform json
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tfcdk` works internally.
//!
//! ### Terms
//!
//! - a `construct` is a node in a tree, it has an `id` and a `path` (the ids from the root down to itself)
//! - the root of the tree is the `app`
//! - a `stack` is a construct that becomes one terraform json document
//! - everything below a stack (that is not itself inside a nested stack) is an `element` of that stack: resources,
//!   providers, data sources, variables, outputs, locals and backends
//!
//! ```text
//! app
//! └── dev                 (stack)
//!     ├── aws             (provider)
//!     ├── network
//!     │   └── vpc         (resource)
//!     └── region          (variable)
//! ```
//!
//! ### Building the tree
//!
//! see [construct]
//!
//! Trees are immutable. [construct::add_child] returns a new tree and leaves the old one untouched, [app::App] keeps
//! the current version around.
//!
//! ### Logical ids
//!
//! Terraform addresses elements by `<type>.<name>`. The name is derived from the path of the element
//! ([logical_id::generate_logical_id]) so it stays stable as long as the tree shape does.
//!
//! ### Tokens
//!
//! Values in the tree are plain data. References to other elements, function calls and lazily computed values are
//! stored in a [tokens::TokenMap] and represented by a marker string in their place:
//!
//! ```text
//! ${TfToken[TOKEN.0]}
//! ```
//!
//! Markers can be used as a whole value or embedded in a larger string. During synthesis every marker is replaced by
//! the terraform expression of its token.
//!
//! | **token**                         | **rendered**                   |
//! |-----------------------------------|--------------------------------|
//! | `Ref { aws_vpc.main, id }`        | `${aws_vpc.main.id}`           |
//! | `Fn { join, [",", list] }`        | `${join(",", ...)}`            |
//! | `Raw("${var.region}")`            | `${var.region}`                |
//! | `Lazy(...)`                       | whatever the producer returns  |
//!
//! ### Validation
//!
//! see [validate::validate_tree]
//!
//! All problems are collected before anything is synthesized: missing fields, wrong field types, duplicate ids,
//! `depends_on` cycles and references to elements that do not exist.
//!
//! ### Synthesis
//!
//! [synthesize::synthesize_stack] renders the elements of one stack, [app::App::synth] does this for every stack and
//! writes the documents together with a manifest.
//!
pub mod app;
pub mod construct;
pub mod logical_id;
pub mod synthesize;
pub mod tokens;
mod util;
pub mod validate;
pub mod value;
mod visit;
