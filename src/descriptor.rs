//! Repository descriptors handed over by the reconciliation loop.
//!
//! A descriptor identifies a tracked repository by namespace and name, and
//! carries the location of its latest artifact once one has been published.

use serde::{Deserialize, Serialize};

/// A packaged snapshot of a repository at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where the tarball can be downloaded from.
    pub url: String,
    /// Revision the tarball was built from, e.g. `main/3f2a9c1`.
    #[serde(default)]
    pub revision: String,
}

impl Artifact {
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            revision: revision.into(),
        }
    }
}

/// Metadata identifying a repository and its current artifact.
///
/// `artifact` is `None` while the repository has not published anything yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDescriptor {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

impl RepoDescriptor {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, url: impl Into<String>, revision: impl Into<String>) -> Self {
        self.artifact = Some(Artifact::new(url, revision));
        self
    }

    /// Registry key and path segment: `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Revision of the current artifact, if any.
    pub fn revision(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.revision.as_str())
    }
}
