//! Logical ids
//!
//! Every addressable element gets a stable id that is derived from its path only.
//!
//! | **path**                      | **logical id**    |
//! |-------------------------------|-------------------|
//! | `[]`                          | ``                |
//! | `[bucket]`                    | `bucket`          |
//! | `[stack, my-bucket]`          | `my-bucket`       |
//! | `[app, stack, bucket]`        | `bucket_E7D169E3` |
//! | `[app, stack, group, bucket]` | `group_bucket_E8114D00` |
//!
//! The suffix is the uppercase hex encoded start of the md5 digest of the full path joined by `/`. It is computed
//! from the unfiltered path so that paths which only differ in hidden components still get distinct ids.
//!
//! Ids are computed from the full path, never from a path relative to the enclosing stack. Elements of a nested stack
//! keep the nested stack id in their name (`[app, dev, network, vpc]` -> `network_vpc_61C03AEA`).
use md5::{Digest, Md5};

/// Components that are dropped from the human readable part
const HIDDEN_COMPONENTS: [&str; 2] = ["Default", "Resource"];

const PATH_SEPARATOR: &str = "/";
const HASH_LENGTH: usize = 8;

pub fn generate_logical_id<S: AsRef<str>>(path: &[S]) -> String {
    match path {
        [] => String::new(),
        [single] => sanitize(single.as_ref()),
        [_root, last] => sanitize(last.as_ref()),
        [_root, _stack, rest @ ..] => {
            let human: Vec<_> = rest
                .iter()
                .map(|component| component.as_ref())
                .filter(|component| !HIDDEN_COMPONENTS.contains(component))
                .map(sanitize)
                .filter(|component| !component.is_empty())
                .collect();

            let hash = path_hash(path);
            if human.is_empty() {
                hash
            } else {
                format!("{}_{hash}", human.join("_"))
            }
        }
    }
}

/// Keep ascii alphanumerics, `_` and `-`
pub fn sanitize(component: &str) -> String {
    component
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn path_hash<S: AsRef<str>>(path: &[S]) -> String {
    let mut hasher = Md5::new();
    for (index, component) in path.iter().enumerate() {
        if index > 0 {
            hasher.update(PATH_SEPARATOR.as_bytes());
        }
        hasher.update(component.as_ref().as_bytes());
    }

    let mut hash = hex::encode_upper(hasher.finalize());
    hash.truncate(HASH_LENGTH);
    hash
}
