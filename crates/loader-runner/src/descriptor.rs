/*
 * descriptor.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Stage descriptors: one entry of the loader pipeline.
 */

//! Stage descriptors.
//!
//! A [`StageDescriptor`] is built either from a request string
//! (`path?query#fragment`, see [`crate::request`]) or from a structured
//! [`StageObject`]. Descriptors live for one run: they carry the loaded
//! implementation, the per-stage data bag and the two one-way execution
//! flags the walkers rely on.

use serde::{Deserialize, Serialize};

use crate::collaborators::ReferenceTable;
use crate::error::{LoaderError, MISSING_IDENT};
use crate::implementation::LoaderImplementation;
use crate::request::{RequestParts, escape_request_part};

/// Per-stage data bag shared between a stage's pitch and normal phase.
pub type DataBag = serde_json::Map<String, serde_json::Value>;

/// A structured stage request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageObject {
    /// Stage path; required
    #[serde(default)]
    pub loader: Option<String>,
    /// Options for the stage
    #[serde(default)]
    pub options: Option<serde_json::Value>,
    /// Explicit ident under which the options are registered
    #[serde(default)]
    pub ident: Option<String>,
    /// Fragment, including its leading `#`
    #[serde(default)]
    pub fragment: Option<String>,
    /// Module type of the stage implementation
    #[serde(default, rename = "type")]
    pub stage_type: Option<String>,
}

impl StageObject {
    /// Structured request for a stage path.
    pub fn new(loader: impl Into<String>) -> Self {
        Self {
            loader: Some(loader.into()),
            ..Self::default()
        }
    }

    /// Set the options.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the explicit ident.
    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    /// Canonical query for this object's options.
    ///
    /// - no options (or `null`) gives an empty query
    /// - a string gives `?` followed by the string
    /// - for an options object, an ident (explicit, or an `ident` string
    ///   inside the object) gives `??ident`
    /// - anything else gives `?` followed by its JSON serialization
    pub fn canonical_query(&self) -> String {
        match &self.options {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => format!("?{s}"),
            Some(options) => match self.effective_ident() {
                Some(ident) => format!("??{ident}"),
                None => format!("?{options}"),
            },
        }
    }

    /// The ident the options are registered under. Only structured
    /// options carry one.
    fn effective_ident(&self) -> Option<&str> {
        let options = self.options.as_ref().filter(|o| !o.is_null() && !o.is_string())?;
        self.ident
            .as_deref()
            .filter(|i| !i.is_empty())
            .or_else(|| {
                options
                    .get("ident")
                    .and_then(|i| i.as_str())
                    .filter(|i| !i.is_empty())
            })
    }
}

/// Input accepted when building a stage descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageInput {
    /// A `path?query#fragment` request string
    Request(String),
    /// A structured request
    Object(StageObject),
}

impl From<&str> for StageInput {
    fn from(value: &str) -> Self {
        StageInput::Request(value.to_string())
    }
}

impl From<String> for StageInput {
    fn from(value: String) -> Self {
        StageInput::Request(value)
    }
}

impl From<StageObject> for StageInput {
    fn from(value: StageObject) -> Self {
        StageInput::Object(value)
    }
}

/// One stage of the loader pipeline.
#[derive(Debug, Clone, Default)]
pub struct StageDescriptor {
    /// Stage path (decoded)
    pub path: String,
    /// Query including its leading `?`, or empty (decoded)
    pub query: String,
    /// Fragment including its leading `#`, or empty
    pub fragment: String,
    /// Resolved options: absent, a string, structured data, or the value
    /// registered under `ident`
    pub options: Option<serde_json::Value>,
    /// Ident the options were looked up under
    pub ident: Option<String>,
    /// Module type of the implementation, when given
    pub stage_type: Option<String>,
    /// Data shared between this stage's pitch and normal phase
    pub data: DataBag,
    implementation: Option<LoaderImplementation>,
    pitch_executed: bool,
    normal_executed: bool,
}

impl StageDescriptor {
    /// Build a descriptor from either input form.
    pub fn new(
        input: impl Into<StageInput>,
        references: &dyn ReferenceTable,
    ) -> Result<Self, LoaderError> {
        let mut descriptor = Self::default();
        descriptor.set_request(input, references)?;
        Ok(descriptor)
    }

    /// Build a descriptor from a request string.
    ///
    /// A query starting with `??` names an ident whose options are looked
    /// up in `references`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use loader_runner::descriptor::StageDescriptor;
    /// use serde_json::json;
    ///
    /// let mut refs = HashMap::new();
    /// refs.insert("ref1".to_string(), json!({"modules": true}));
    ///
    /// let stage = StageDescriptor::from_request("css-loader??ref1", &refs).unwrap();
    /// assert_eq!(stage.path, "css-loader");
    /// assert_eq!(stage.ident.as_deref(), Some("ref1"));
    /// assert_eq!(stage.options, Some(json!({"modules": true})));
    /// ```
    pub fn from_request(request: &str, references: &dyn ReferenceTable) -> Result<Self, LoaderError> {
        Self::new(request, references)
    }

    /// Build a descriptor from a structured request.
    pub fn from_object(object: StageObject) -> Result<Self, LoaderError> {
        let mut descriptor = Self::default();
        descriptor.apply_object(object)?;
        Ok(descriptor)
    }

    /// Replace this stage's identity in place.
    ///
    /// Execution flags, the data bag and any cached implementation are
    /// kept: a stage is mutated, never replaced.
    pub fn set_request(
        &mut self,
        input: impl Into<StageInput>,
        references: &dyn ReferenceTable,
    ) -> Result<(), LoaderError> {
        match input.into() {
            StageInput::Request(request) => self.apply_request(&request, references),
            StageInput::Object(object) => self.apply_object(object),
        }
    }

    fn apply_request(
        &mut self,
        request: &str,
        references: &dyn ReferenceTable,
    ) -> Result<(), LoaderError> {
        let parts = RequestParts::parse(request)?;
        let (options, ident) = match parts.query.strip_prefix("??") {
            Some(ident) => {
                if ident == MISSING_IDENT {
                    return Err(LoaderError::MissingIdent);
                }
                let options = references
                    .lookup(ident)
                    .ok_or_else(|| LoaderError::UnknownIdent {
                        ident: ident.to_string(),
                    })?;
                (Some(options), Some(ident.to_string()))
            }
            // A plain query stays in `query`; stages read it through the
            // context's `query()`.
            None => (None, None),
        };

        self.path = parts.path;
        self.query = parts.query;
        self.fragment = parts.fragment;
        self.options = options;
        self.ident = ident;
        self.stage_type = None;
        Ok(())
    }

    fn apply_object(&mut self, object: StageObject) -> Result<(), LoaderError> {
        let path = match object.loader.as_deref() {
            Some(loader) if !loader.is_empty() => loader.to_string(),
            _ => {
                let value = serde_json::to_string(&object).unwrap_or_default();
                return Err(LoaderError::InvalidStageObject { value });
            }
        };

        self.query = object.canonical_query();
        self.path = path;
        self.ident = object.effective_ident().map(str::to_string);
        self.fragment = object.fragment.unwrap_or_default();
        self.options = object.options;
        self.stage_type = object.stage_type;
        Ok(())
    }

    /// Canonical request string, with `#` escaped inside path and query.
    pub fn request(&self) -> String {
        format!(
            "{}{}{}",
            escape_request_part(&self.path),
            escape_request_part(&self.query),
            self.fragment
        )
    }

    /// Human-readable request string, used in diagnostics.
    pub fn display(&self) -> String {
        format!("{}{}{}", self.path, self.query, self.fragment)
    }

    /// The stage's request split into its parts.
    pub fn parts(&self) -> RequestParts {
        RequestParts::new(&self.path, &self.query, &self.fragment)
    }

    /// The loaded implementation, once the stage was loaded.
    pub fn implementation(&self) -> Option<&LoaderImplementation> {
        self.implementation.as_ref()
    }

    pub(crate) fn set_implementation(&mut self, implementation: LoaderImplementation) {
        self.implementation = Some(implementation);
    }

    /// Check if the stage's pitch phase has been visited.
    pub fn pitch_executed(&self) -> bool {
        self.pitch_executed
    }

    /// Check if the stage's normal phase has been visited.
    pub fn normal_executed(&self) -> bool {
        self.normal_executed
    }

    pub(crate) fn mark_pitch_executed(&mut self) {
        self.pitch_executed = true;
    }

    pub(crate) fn mark_normal_executed(&mut self) {
        self.normal_executed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn refs() -> HashMap<String, serde_json::Value> {
        let mut table = HashMap::new();
        table.insert("ref1".to_string(), json!({"a": 1}));
        table
    }

    #[test]
    fn test_plain_query_has_no_options() {
        let stage = StageDescriptor::from_request("B?opt=1", &refs()).unwrap();
        assert_eq!(stage.path, "B");
        assert_eq!(stage.query, "?opt=1");
        assert_eq!(stage.options, None);
        assert!(stage.ident.is_none());
    }

    #[test]
    fn test_no_query_has_no_options() {
        let stage = StageDescriptor::from_request("./loader.js#frag", &refs()).unwrap();
        assert_eq!(stage.options, None);
        assert_eq!(stage.fragment, "#frag");
    }

    #[test]
    fn test_ident_lookup() {
        let stage = StageDescriptor::from_request("A??ref1", &refs()).unwrap();
        assert_eq!(stage.options, Some(json!({"a": 1})));
        assert_eq!(stage.ident.as_deref(), Some("ref1"));
        assert_eq!(stage.request(), "A??ref1");
    }

    #[test]
    fn test_missing_ident_sentinel_is_error() {
        let err = StageDescriptor::from_request("X??[[missing ident]]", &refs()).unwrap_err();
        assert!(matches!(err, LoaderError::MissingIdent));
    }

    #[test]
    fn test_unknown_ident_is_error() {
        let err = StageDescriptor::from_request("X??nope", &refs()).unwrap_err();
        match err {
            LoaderError::UnknownIdent { ident } => assert_eq!(ident, "nope"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_object_canonical_queries() {
        let none = StageDescriptor::from_object(StageObject::new("L")).unwrap();
        assert_eq!(none.query, "");

        let null = StageDescriptor::from_object(StageObject::new("L").with_options(json!(null)))
            .unwrap();
        assert_eq!(null.query, "");

        let text =
            StageDescriptor::from_object(StageObject::new("L").with_options(json!("x=1"))).unwrap();
        assert_eq!(text.query, "?x=1");

        let own_ident = StageDescriptor::from_object(
            StageObject::new("L").with_options(json!({"ident": "k", "v": 2})),
        )
        .unwrap();
        assert_eq!(own_ident.query, "??k");
        assert_eq!(own_ident.ident.as_deref(), Some("k"));
        assert_eq!(own_ident.options, Some(json!({"ident": "k", "v": 2})));

        let structured =
            StageDescriptor::from_object(StageObject::new("L").with_options(json!({"b": [1, 2]})))
                .unwrap();
        assert_eq!(structured.query, r#"?{"b":[1,2]}"#);
    }

    #[test]
    fn test_explicit_ident_wins() {
        let stage = StageDescriptor::from_object(
            StageObject::new("L")
                .with_options(json!({"ident": "inner"}))
                .with_ident("outer"),
        )
        .unwrap();
        assert_eq!(stage.query, "??outer");
        assert_eq!(stage.ident.as_deref(), Some("outer"));
    }

    #[test]
    fn test_ident_ignored_without_structured_options() {
        let absent = StageDescriptor::from_object(StageObject::new("L").with_ident("x")).unwrap();
        assert_eq!(absent.query, "");
        assert_eq!(absent.ident, None);

        let null = StageDescriptor::from_object(
            StageObject::new("L").with_options(json!(null)).with_ident("x"),
        )
        .unwrap();
        assert_eq!(null.query, "");
        assert_eq!(null.request(), "L");

        let text = StageDescriptor::from_object(
            StageObject::new("L").with_options(json!("a=1")).with_ident("x"),
        )
        .unwrap();
        assert_eq!(text.query, "?a=1");
        assert_eq!(text.ident, None);

        // The canonical request parses back without consulting references.
        let reparsed = StageDescriptor::from_request(&text.request(), &refs()).unwrap();
        assert_eq!(reparsed.parts(), text.parts());
    }

    #[test]
    fn test_object_without_loader_is_error() {
        let object = StageObject {
            options: Some(json!({"a": 1})),
            ..StageObject::default()
        };
        let err = StageDescriptor::from_object(object).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidStageObject { .. }));
        assert!(err.to_string().contains(r#""a":1"#));
    }

    #[test]
    fn test_stage_input_deserializes_both_forms() {
        let inputs: Vec<StageInput> =
            serde_json::from_value(json!(["a?x", {"loader": "b", "type": "module"}])).unwrap();
        assert_eq!(inputs[0], StageInput::Request("a?x".to_string()));
        let StageInput::Object(object) = &inputs[1] else {
            panic!("expected structured input");
        };
        assert_eq!(object.loader.as_deref(), Some("b"));
        assert_eq!(object.stage_type.as_deref(), Some("module"));
    }

    #[test]
    fn test_escaped_hash_request_is_stable() {
        let stage = StageDescriptor::from_request("dir\0#1/l.js?c=\0#fff#f", &refs()).unwrap();
        assert_eq!(stage.path, "dir#1/l.js");
        assert_eq!(stage.query, "?c=#fff");
        assert_eq!(stage.display(), "dir#1/l.js?c=#fff#f");
        let reparsed = StageDescriptor::from_request(&stage.request(), &refs()).unwrap();
        assert_eq!(reparsed.parts(), stage.parts());
    }

    #[test]
    fn test_set_request_keeps_flags() {
        let mut stage = StageDescriptor::from_request("a", &refs()).unwrap();
        stage.mark_pitch_executed();
        stage.data.insert("k".to_string(), json!(1));
        stage.set_request("b?y", &refs()).unwrap();
        assert_eq!(stage.path, "b");
        assert!(stage.pitch_executed());
        assert!(!stage.normal_executed());
        assert_eq!(stage.data.get("k"), Some(&json!(1)));
    }
}
