/*
 * utils.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Identifier and hashing helpers exposed to loader stages.
 */

//! Identifier and hashing helpers.
//!
//! Request strings may embed absolute paths. Before such a string is used
//! as a key (or shown to a user) the paths are rewritten relative to a
//! context directory; [`contextify`] and [`absolutify`] convert between
//! the two forms. Paths are POSIX-style.

use sha2::{Digest, Sha256, Sha512};

use crate::error::StageError;
use crate::request::REQUEST_SEPARATOR;

/// Helpers handed to stages through `LoaderContext::utils`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderUtils {
    hash_function: String,
}

impl LoaderUtils {
    /// Helpers using `hash_function` as the default for [`create_hash`](Self::create_hash).
    pub fn new(hash_function: impl Into<String>) -> Self {
        Self {
            hash_function: hash_function.into(),
        }
    }

    /// Make every `./` or `../` request in a `!`-joined string absolute.
    pub fn absolutify(&self, context: &str, request: &str) -> String {
        absolutify(context, request)
    }

    /// Make every absolute path in a `!`-joined string relative.
    pub fn contextify(&self, context: &str, request: &str) -> String {
        contextify(context, request)
    }

    /// Start a hash. `None` uses the configured default algorithm.
    pub fn create_hash(&self, kind: Option<&str>) -> Result<LoaderHash, StageError> {
        LoaderHash::new(kind.unwrap_or(&self.hash_function))
    }
}

/// An in-progress hash.
#[derive(Debug, Clone)]
pub enum LoaderHash {
    /// SHA-256
    Sha256(Sha256),
    /// SHA-512
    Sha512(Sha512),
}

impl LoaderHash {
    /// Start a hash of the named kind (`"sha256"` or `"sha512"`).
    pub fn new(kind: &str) -> Result<Self, StageError> {
        match kind {
            "sha256" => Ok(LoaderHash::Sha256(Sha256::new())),
            "sha512" => Ok(LoaderHash::Sha512(Sha512::new())),
            other => Err(anyhow::anyhow!("Unsupported hash function: {other}")),
        }
    }

    /// Feed data into the hash.
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        match self {
            LoaderHash::Sha256(hasher) => hasher.update(data.as_ref()),
            LoaderHash::Sha512(hasher) => hasher.update(data.as_ref()),
        }
        self
    }

    /// Finish and return the lowercase hex digest.
    pub fn digest_hex(self) -> String {
        match self {
            LoaderHash::Sha256(hasher) => hex::encode(hasher.finalize()),
            LoaderHash::Sha512(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Rewrite each absolute path in a `!`-joined request relative to
/// `context`.
///
/// ```
/// use loader_runner::utils::contextify;
///
/// assert_eq!(
///     contextify("/project", "/project/loaders/a.js?x!/project/src/index.js"),
///     "./loaders/a.js?x!./src/index.js"
/// );
/// ```
pub fn contextify(context: &str, request: &str) -> String {
    request
        .split(REQUEST_SEPARATOR)
        .map(|part| absolute_to_request(context, part))
        .collect::<Vec<_>>()
        .join(REQUEST_SEPARATOR)
}

/// Rewrite each `./` or `../` request in a `!`-joined request to an
/// absolute path under `context`.
pub fn absolutify(context: &str, request: &str) -> String {
    request
        .split(REQUEST_SEPARATOR)
        .map(|part| request_to_absolute(context, part))
        .collect::<Vec<_>>()
        .join(REQUEST_SEPARATOR)
}

/// Rewrite absolute paths inside an identifier (segments separated by `|`
/// or `!`) relative to `context`. Separators are kept.
pub fn make_paths_relative(context: &str, identifier: &str) -> String {
    let mut result = String::with_capacity(identifier.len());
    let mut start = 0;
    for (idx, c) in identifier.char_indices() {
        if c == '|' || c == '!' {
            result.push_str(&absolute_to_request(context, &identifier[start..idx]));
            result.push(c);
            start = idx + c.len_utf8();
        }
    }
    result.push_str(&absolute_to_request(context, &identifier[start..]));
    result
}

fn absolute_to_request(context: &str, maybe_absolute: &str) -> String {
    if !maybe_absolute.starts_with('/') {
        return maybe_absolute.to_string();
    }
    // Directories stay absolute
    if maybe_absolute.len() > 1 && maybe_absolute.ends_with('/') {
        return maybe_absolute.to_string();
    }
    let (resource, query) = match maybe_absolute.find('?') {
        Some(pos) => maybe_absolute.split_at(pos),
        None => (maybe_absolute, ""),
    };
    let relative = relative_path_to_request(&posix_relative(context, resource));
    format!("{relative}{query}")
}

fn request_to_absolute(context: &str, request: &str) -> String {
    if request.starts_with("./") || request.starts_with("../") {
        posix_join(context, request)
    } else {
        request.to_string()
    }
}

fn relative_path_to_request(relative: &str) -> String {
    if relative.is_empty() {
        "./.".to_string()
    } else if relative.starts_with("../") || relative == ".." {
        relative.to_string()
    } else {
        format!("./{relative}")
    }
}

/// Normalized components of a POSIX path (`.` removed, `..` folded).
fn normalize_components(path: &str) -> Vec<&str> {
    let absolute = path.starts_with('/');
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match components.last() {
                Some(&last) if last != ".." => {
                    components.pop();
                }
                _ if absolute => {}
                _ => components.push(".."),
            },
            other => components.push(other),
        }
    }
    components
}

fn posix_join(base: &str, path: &str) -> String {
    let joined = format!("{base}/{path}");
    let components = normalize_components(&joined);
    let body = components.join("/");
    match (joined.starts_with('/'), body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

fn posix_relative(from: &str, to: &str) -> String {
    let from = normalize_components(from);
    let to = normalize_components(to);
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend_from_slice(&to[common..]);
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contextify() {
        assert_eq!(contextify("/a/b", "/a/b/c.js"), "./c.js");
        assert_eq!(contextify("/a/b", "/a/d/e.js?q=1"), "../d/e.js?q=1");
        assert_eq!(contextify("/a/b", "/a/b"), "./.");
        assert_eq!(contextify("/a/b", "pkg/index.js"), "pkg/index.js");
        assert_eq!(contextify("/a/b", "/a/dir/"), "/a/dir/");
    }

    #[test]
    fn test_absolutify() {
        assert_eq!(absolutify("/a/b", "./c.js!../d.js?x"), "/a/b/c.js!/a/d.js?x");
        assert_eq!(absolutify("/a/b", "pkg!/abs/x.js"), "pkg!/abs/x.js");
    }

    #[test]
    fn test_contextify_absolutify_inverse() {
        let request = "/p/loaders/l.js?opt!/p/src/x.js";
        assert_eq!(absolutify("/p/src", &contextify("/p/src", request)), request);
    }

    #[test]
    fn test_make_paths_relative_keeps_separators() {
        assert_eq!(
            make_paths_relative("/p", "css|/p/a.css!/p/l.js|x"),
            "css|./a.css!./l.js|x"
        );
        assert_eq!(make_paths_relative("/p", "plain"), "plain");
    }

    #[test]
    fn test_posix_relative() {
        assert_eq!(posix_relative("/a/b/c", "/a/x"), "../../x");
        assert_eq!(posix_relative("/", "/a"), "a");
        assert_eq!(posix_relative("/a", "/a"), "");
    }

    #[test]
    fn test_posix_join() {
        assert_eq!(posix_join("/a/b", "../../../c"), "/c");
        assert_eq!(posix_join("a", "../.."), "..");
        assert_eq!(posix_join("a", ".."), ".");
    }

    #[test]
    fn test_hashes() {
        let mut hash = LoaderHash::new("sha256").unwrap();
        hash.update("abc");
        assert_eq!(
            hash.digest_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let utils = LoaderUtils::new("sha512");
        let mut hash = utils.create_hash(None).unwrap();
        hash.update(b"");
        assert_eq!(hash.digest_hex().len(), 128);

        assert!(utils.create_hash(Some("md4")).is_err());
    }
}
