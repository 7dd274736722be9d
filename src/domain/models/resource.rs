//! Requested resources and the keys used to cooperate on them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File names that always denote repository metadata.
const METADATA_FILE_NAMES: &[&str] = &[
    "maven-metadata.xml",
    "index.json",
    "index.yaml",
    "Packages",
    "Packages.gz",
    "Release",
    "InRelease",
    "repomd.xml",
];

/// Suffixes of checksum and signature files served alongside metadata.
const METADATA_SUFFIXES: &[&str] = &[".sha1", ".sha256", ".sha512", ".md5", ".asc"];

/// Which max-age a resource is governed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    /// Immutable-ish artifacts (jars, tarballs, blobs).
    #[default]
    Content,
    /// Indexes and listings that change frequently upstream.
    Metadata,
}

impl CacheCategory {
    /// Classify a repository path by its file name.
    pub fn classify(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        let is_metadata = METADATA_FILE_NAMES.contains(&name)
            || METADATA_SUFFIXES
                .iter()
                .any(|suffix| name.ends_with(suffix) && name.contains("metadata"));
        if is_metadata {
            Self::Metadata
        } else {
            Self::Content
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Metadata => "metadata",
        }
    }
}

/// A logical resource requested from the proxy.
///
/// The path is relative to the repository root and never starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    path: String,
    query: Vec<(String, String)>,
    category: CacheCategory,
}

impl Resource {
    /// Create a content resource for the given path.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: path.as_ref().trim_start_matches('/').to_string(),
            query: Vec::new(),
            category: CacheCategory::Content,
        }
    }

    /// Create a metadata resource for the given path.
    pub fn metadata(path: impl AsRef<str>) -> Self {
        Self::new(path).with_category(CacheCategory::Metadata)
    }

    /// Create a resource whose category is derived from its path.
    pub fn classified(path: impl AsRef<str>) -> Self {
        let category = CacheCategory::classify(path.as_ref());
        Self::new(path).with_category(category)
    }

    pub fn with_category(mut self, category: CacheCategory) -> Self {
        self.category = category;
        self
    }

    /// Append a query parameter. Parameter order is not significant.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self.query.sort();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn category(&self) -> CacheCategory {
        self.category
    }

    /// Key under which concurrent requests for this resource cooperate.
    pub fn cooperation_key(&self) -> CooperationKey {
        CooperationKey::from(self)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        for (i, (name, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

/// Identity of an upstream request for cooperation purposes.
///
/// Path plus the debug rendering of the sorted query parameters. The rendering
/// quotes and escapes every name and value, so two keys are equal iff they
/// come from the same path and parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CooperationKey(String);

impl CooperationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Resource> for CooperationKey {
    fn from(resource: &Resource) -> Self {
        Self(format!("{}?{:?}", resource.path, resource.query))
    }
}

impl fmt::Display for CooperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
