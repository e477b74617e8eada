//! Component coordinates and the pluggable field-schema providers.
//!
//! A [`SchemaProvider`] owns the mapping between a component coordinate and
//! index document fields. Providers are held in a fixed, ordered
//! [`SchemaRegistry`]; the lifecycle core only uses the decode direction (for
//! group computation), the encode direction exists for indexing callers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::Document;

/// Field holding the unique coordinate key of an artifact document.
pub const FLD_UINFO: &str = "uinfo";

/// Field holding the deleted coordinate key of a tombstone document.
pub const FLD_DELETED: &str = "deleted";

/// Field holding the namespace (group) id.
pub const FLD_GROUP_ID: &str = "group_id";

/// Field holding the artifact id.
pub const FLD_ARTIFACT_ID: &str = "artifact_id";

/// Field holding the version.
pub const FLD_VERSION: &str = "version";

/// Field holding the optional classifier.
pub const FLD_CLASSIFIER: &str = "classifier";

/// Field holding the optional extension.
pub const FLD_EXTENSION: &str = "extension";

const COORDINATE_SEPARATOR: char = ':';

/// The coordinates of one repository component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: Option<String>,
}

impl ComponentInfo {
    /// Create coordinates from the three mandatory parts.
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            extension: None,
        }
    }

    /// Set the classifier.
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Set the extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// The unique coordinate key: `group:artifact:version[:classifier[:extension]]`.
    pub fn uinfo(&self) -> String {
        let mut key = format!(
            "{}{sep}{}{sep}{}",
            self.group_id,
            self.artifact_id,
            self.version,
            sep = COORDINATE_SEPARATOR
        );
        if let Some(classifier) = &self.classifier {
            key.push(COORDINATE_SEPARATOR);
            key.push_str(classifier);
            if let Some(extension) = &self.extension {
                key.push(COORDINATE_SEPARATOR);
                key.push_str(extension);
            }
        }
        key
    }

    /// Parse a coordinate key produced by [`uinfo`](ComponentInfo::uinfo).
    pub fn from_uinfo(key: &str) -> Option<Self> {
        let mut parts = key.split(COORDINATE_SEPARATOR);
        let group_id = parts.next()?;
        let artifact_id = parts.next()?;
        let version = parts.next()?;
        if group_id.is_empty() || artifact_id.is_empty() || version.is_empty() {
            return None;
        }
        let mut info = ComponentInfo::new(group_id, artifact_id, version);
        if let Some(classifier) = parts.next() {
            info.classifier = Some(classifier.to_string());
            if let Some(extension) = parts.next() {
                info.extension = Some(extension.to_string());
            }
        }
        Some(info)
    }

    /// The top-level segment of the group id.
    pub fn root_group(&self) -> &str {
        self.group_id
            .split('.')
            .next()
            .unwrap_or(&self.group_id)
    }
}

impl fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uinfo())
    }
}

/// One pluggable mapping between coordinates and document fields.
pub trait SchemaProvider: Send + Sync + fmt::Debug {
    /// Provider name, for diagnostics.
    fn name(&self) -> &'static str;

    /// The field names this provider contributes.
    fn fields(&self) -> &'static [&'static str];

    /// Decode a document into coordinates, if this provider recognizes it.
    fn decode(&self, doc: &Document) -> Option<ComponentInfo>;

    /// Write the fields for `info` into `doc`.
    fn encode(&self, info: &ComponentInfo, doc: &mut Document);
}

/// The default provider: the `uinfo` key plus discrete coordinate fields.
#[derive(Debug, Default)]
pub struct CoordinateProvider;

impl SchemaProvider for CoordinateProvider {
    fn name(&self) -> &'static str {
        "coordinate"
    }

    fn fields(&self) -> &'static [&'static str] {
        &[
            FLD_UINFO,
            FLD_GROUP_ID,
            FLD_ARTIFACT_ID,
            FLD_VERSION,
            FLD_CLASSIFIER,
            FLD_EXTENSION,
        ]
    }

    fn decode(&self, doc: &Document) -> Option<ComponentInfo> {
        if let Some(key) = doc.get_text(FLD_UINFO) {
            if let Some(info) = ComponentInfo::from_uinfo(key) {
                return Some(info);
            }
        }
        // fall back to the discrete fields for documents with a damaged key
        let group_id = doc.get_text(FLD_GROUP_ID)?;
        let artifact_id = doc.get_text(FLD_ARTIFACT_ID)?;
        let version = doc.get_text(FLD_VERSION)?;
        let mut info = ComponentInfo::new(group_id, artifact_id, version);
        info.classifier = doc.get_text(FLD_CLASSIFIER).map(str::to_string);
        info.extension = doc.get_text(FLD_EXTENSION).map(str::to_string);
        Some(info)
    }

    fn encode(&self, info: &ComponentInfo, doc: &mut Document) {
        let mut out = std::mem::take(doc)
            .add_string(FLD_UINFO, info.uinfo())
            .add_string(FLD_GROUP_ID, &info.group_id)
            .add_string(FLD_ARTIFACT_ID, &info.artifact_id)
            .add_string(FLD_VERSION, &info.version);
        if let Some(classifier) = &info.classifier {
            out = out.add_string(FLD_CLASSIFIER, classifier);
        }
        if let Some(extension) = &info.extension {
            out = out.add_string(FLD_EXTENSION, extension);
        }
        *doc = out;
    }
}

/// Fixed, ordered set of schema providers.
///
/// Decoding asks each provider in registration order and takes the first
/// answer; the order is stable for the lifetime of the registry.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    providers: Vec<Arc<dyn SchemaProvider>>,
}

impl SchemaRegistry {
    /// Create a registry over the given providers, in order.
    pub fn new(providers: Vec<Arc<dyn SchemaProvider>>) -> Self {
        Self { providers }
    }

    /// The registered providers, in order.
    pub fn providers(&self) -> &[Arc<dyn SchemaProvider>] {
        &self.providers
    }

    /// Decode a document through the providers; first answer wins.
    pub fn decode(&self, doc: &Document) -> Option<ComponentInfo> {
        self.providers.iter().find_map(|p| p.decode(doc))
    }

    /// Build a document for `info` by running every provider's encode.
    pub fn encode(&self, info: &ComponentInfo) -> Document {
        let mut doc = Document::new();
        for provider in &self.providers {
            provider.encode(info, &mut doc);
        }
        doc
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(vec![Arc::new(CoordinateProvider)])
    }
}
