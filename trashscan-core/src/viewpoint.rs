//! Fixed, ordered camera viewpoints.
//!
//! The order of a [`ViewpointSet`] is the capture order (and therefore the order
//! motor positioning instructions are issued in). The suffix is how a viewpoint
//! is recovered from a captured file's name once it leaves the capture station.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One logical camera position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewpoint {
    /// Stable name, also used for the captured file name (`<name>.png`).
    pub name: String,
    /// Filename-stem suffix identifying this viewpoint. Defaults to `name`.
    #[serde(default)]
    pub suffix: Option<String>,
}

impl Viewpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or(&self.name)
    }

    /// True when the file's stem ends with this viewpoint's suffix.
    pub fn matches_file(&self, path: &Path) -> bool {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.ends_with(self.suffix()))
    }
}

impl fmt::Display for Viewpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Validated, ordered set of viewpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Viewpoint>", into = "Vec<Viewpoint>")]
pub struct ViewpointSet {
    views: Vec<Viewpoint>,
}

impl ViewpointSet {
    pub fn new(views: Vec<Viewpoint>) -> Result<Self> {
        if views.is_empty() {
            return Err(PipelineError::Config(
                "at least one viewpoint is required".into(),
            ));
        }

        let mut names = HashSet::new();
        let mut suffixes = HashSet::new();
        for view in &views {
            if view.name.trim().is_empty() || view.suffix().trim().is_empty() {
                return Err(PipelineError::Config(
                    "viewpoint names and suffixes must not be empty".into(),
                ));
            }
            if !names.insert(view.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate viewpoint name '{}'",
                    view.name
                )));
            }
            if !suffixes.insert(view.suffix()) {
                return Err(PipelineError::Config(format!(
                    "duplicate viewpoint suffix '{}'",
                    view.suffix()
                )));
            }
        }

        Ok(Self { views })
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Viewpoint> {
        self.views.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Viewpoint> {
        self.views.iter()
    }

    pub fn by_name(&self, name: &str) -> Option<&Viewpoint> {
        self.views.iter().find(|view| view.name == name)
    }
}

impl Default for ViewpointSet {
    /// front, left, back, right: the turntable order of the scanning rig.
    fn default() -> Self {
        Self {
            views: ["front", "left", "back", "right"]
                .into_iter()
                .map(Viewpoint::new)
                .collect(),
        }
    }
}

impl TryFrom<Vec<Viewpoint>> for ViewpointSet {
    type Error = PipelineError;

    fn try_from(views: Vec<Viewpoint>) -> Result<Self> {
        Self::new(views)
    }
}

impl From<ViewpointSet> for Vec<Viewpoint> {
    fn from(set: ViewpointSet) -> Self {
        set.views
    }
}

impl<'a> IntoIterator for &'a ViewpointSet {
    type Item = &'a Viewpoint;
    type IntoIter = std::slice::Iter<'a, Viewpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_is_turntable_order() {
        let set = ViewpointSet::default();
        let names: Vec<_> = set.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["front", "left", "back", "right"]);
    }

    #[test]
    fn suffix_falls_back_to_name() {
        let view = Viewpoint::new("left");
        assert_eq!(view.suffix(), "left");
        assert!(view.matches_file(Path::new("/x/b_left.png")));
        assert!(!view.matches_file(Path::new("/x/left_b.png")));

        let custom = Viewpoint::new("left").with_suffix("_L");
        assert!(custom.matches_file(Path::new("scan_L.jpg")));
    }

    #[test]
    fn rejects_duplicates_and_empty_sets() {
        assert!(ViewpointSet::new(vec![]).is_err());
        assert!(
            ViewpointSet::new(vec![Viewpoint::new("front"), Viewpoint::new("front")]).is_err()
        );
        assert!(
            ViewpointSet::new(vec![
                Viewpoint::new("a").with_suffix("x"),
                Viewpoint::new("b").with_suffix("x"),
            ])
            .is_err()
        );
    }

    #[test]
    fn deserializes_through_validation() {
        let parsed: std::result::Result<ViewpointSet, _> =
            serde_json::from_str(r#"[{"name":"front"},{"name":"front"}]"#);
        assert!(parsed.is_err());

        let parsed: ViewpointSet =
            serde_json::from_str(r#"[{"name":"front"},{"name":"back","suffix":"_b"}]"#)
                .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.by_name("back").unwrap().suffix(), "_b");
    }
}
