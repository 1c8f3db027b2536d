//! Skeleton graph: named markers joined by rigid cylinder segments.
//!
//! The graph is built once from a body description and stays immutable
//! afterwards, apart from the single synthetic hip-midpoint marker appended
//! once the capture is loaded.
//!
//! A body description is a JSON document with three sections:
//!
//! ```json
//! {
//!   "nodes":    { "0": "STRN", "1": "CLAV" },
//!   "cylinder": { "0": { "tail": 0, "head": 1, "radius": 0.12 } },
//!   "antenna":  { "S2R2": { "cylinder": 0, "length": 0.1, "height": 0.05, "angle": 0.0 } }
//! }
//! ```
//!
//! Malformed entries are skipped and reported as [`ConfigWarning`]s instead
//! of aborting the load.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::antenna::{AntennaMount, AntennaMounts};
use crate::error::{BodyError, BodyResult, ConfigWarning, Validated};

pub type MarkerId = u32;
pub type CylinderId = u32;

/// A rigid body segment between two markers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    pub tail: MarkerId,
    pub head: MarkerId,
    pub radius: f64,
}

impl Cylinder {
    pub fn new(tail: MarkerId, head: MarkerId, radius: f64) -> Self {
        Self { tail, head, radius }
    }

    fn pair(&self) -> (MarkerId, MarkerId) {
        (self.tail.min(self.head), self.tail.max(self.head))
    }
}

// ============================================================================
// BODY DESCRIPTION
// ============================================================================

/// Parsed body description, before graph validation.
#[derive(Debug, Clone, Default)]
pub struct BodyDescription {
    pub nodes: BTreeMap<MarkerId, String>,
    pub cylinders: BTreeMap<CylinderId, Cylinder>,
    pub antennas: AntennaMounts,
}

const NODES: &str = "nodes";
const CYLINDER: &str = "cylinder";
const ANTENNA: &str = "antenna";

impl BodyDescription {
    /// Parses a JSON body description.
    ///
    /// Only a document that is not a JSON object is fatal. Every entry that
    /// cannot be read is skipped and returned as a warning.
    pub fn from_json_str(json: &str) -> BodyResult<Validated<Self>> {
        let doc: Value = serde_json::from_str(json)?;
        let root = doc.as_object().ok_or_else(|| BodyError::ConfigParse {
            section: "<root>".to_string(),
            key: String::new(),
            reason: "body description must be a JSON object".to_string(),
        })?;

        let mut warnings = Vec::new();
        let mut desc = BodyDescription::default();

        if let Some(entries) = section(root, NODES, &mut warnings) {
            for (key, value) in entries {
                match parse_node(key, value) {
                    Ok((id, name)) => {
                        desc.nodes.insert(id, name);
                    }
                    Err(w) => skip(&mut warnings, w),
                }
            }
        }

        if let Some(entries) = section(root, CYLINDER, &mut warnings) {
            for (key, value) in entries {
                match parse_cylinder(key, value) {
                    Ok((id, cylinder)) => {
                        desc.cylinders.insert(id, cylinder);
                    }
                    Err(w) => skip(&mut warnings, w),
                }
            }
        }

        if let Some(entries) = section(root, ANTENNA, &mut warnings) {
            for (key, value) in entries {
                match parse_antenna(key, value) {
                    Ok(mount) => {
                        desc.antennas.insert(key.clone(), mount);
                    }
                    Err(w) => skip(&mut warnings, w),
                }
            }
        }

        debug!(
            "Parsed body description: {} nodes, {} cylinders, {} antennas, {} skipped",
            desc.nodes.len(),
            desc.cylinders.len(),
            desc.antennas.len(),
            warnings.len()
        );

        Ok(Validated::new(desc, warnings))
    }
}

fn skip(warnings: &mut Vec<ConfigWarning>, w: ConfigWarning) {
    warn!("Skipping body description entry {}", w);
    warnings.push(w);
}

fn section<'a>(
    root: &'a Map<String, Value>,
    name: &str,
    warnings: &mut Vec<ConfigWarning>,
) -> Option<&'a Map<String, Value>> {
    match root.get(name) {
        Some(Value::Object(entries)) => Some(entries),
        Some(_) => {
            skip(warnings, ConfigWarning::new(name, "", "section must be an object"));
            None
        }
        None => {
            skip(warnings, ConfigWarning::new(name, "", "section missing"));
            None
        }
    }
}

fn parse_id(section: &str, key: &str) -> Result<u32, ConfigWarning> {
    key.trim()
        .parse::<u32>()
        .map_err(|_| ConfigWarning::new(section, key, "key is not an unsigned integer"))
}

fn parse_node(key: &str, value: &Value) -> Result<(MarkerId, String), ConfigWarning> {
    let id = parse_id(NODES, key)?;
    match value.as_str().map(str::trim) {
        Some(name) if !name.is_empty() => Ok((id, name.to_string())),
        _ => Err(ConfigWarning::new(NODES, key, "marker name must be a non-empty string")),
    }
}

fn number_field(
    section: &str,
    key: &str,
    entry: &Map<String, Value>,
    field: &str,
) -> Result<f64, ConfigWarning> {
    let value = entry
        .get(field)
        .ok_or_else(|| ConfigWarning::new(section, key, format!("missing field '{}'", field)))?;
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ConfigWarning::new(
            section,
            key,
            format!("field '{}' must be a finite number, got {}", field, value),
        )),
    }
}

fn id_field(
    section: &str,
    key: &str,
    entry: &Map<String, Value>,
    field: &str,
) -> Result<u32, ConfigWarning> {
    entry
        .get(field)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            ConfigWarning::new(section, key, format!("field '{}' must be an unsigned integer", field))
        })
}

fn entry_object<'a>(
    section: &str,
    key: &str,
    value: &'a Value,
) -> Result<&'a Map<String, Value>, ConfigWarning> {
    value
        .as_object()
        .ok_or_else(|| ConfigWarning::new(section, key, "entry must be an object"))
}

fn parse_cylinder(key: &str, value: &Value) -> Result<(CylinderId, Cylinder), ConfigWarning> {
    let id = parse_id(CYLINDER, key)?;
    let entry = entry_object(CYLINDER, key, value)?;
    let tail = id_field(CYLINDER, key, entry, "tail")?;
    let head = id_field(CYLINDER, key, entry, "head")?;
    let radius = number_field(CYLINDER, key, entry, "radius")?;
    if radius < 0.0 {
        return Err(ConfigWarning::new(CYLINDER, key, "radius must not be negative"));
    }
    Ok((id, Cylinder::new(tail, head, radius)))
}

fn parse_antenna(key: &str, value: &Value) -> Result<AntennaMount, ConfigWarning> {
    let entry = entry_object(ANTENNA, key, value)?;
    let asset = match entry.get("asset") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            return Err(ConfigWarning::new(
                ANTENNA,
                key,
                format!("field 'asset' must be a string, got {}", other),
            ))
        }
    };
    Ok(AntennaMount {
        cylinder: id_field(ANTENNA, key, entry, "cylinder")?,
        length: number_field(ANTENNA, key, entry, "length")?,
        height: number_field(ANTENNA, key, entry, "height")?,
        angle: number_field(ANTENNA, key, entry, "angle")?,
        asset,
    })
}

// ============================================================================
// SKELETON GRAPH
// ============================================================================

/// Undirected graph of markers (nodes) and cylinders (edges).
#[derive(Debug, Clone, Default)]
pub struct SkeletonGraph {
    markers: BTreeMap<MarkerId, String>,
    cylinders: BTreeMap<CylinderId, Cylinder>,
    adjacency: BTreeMap<MarkerId, BTreeSet<MarkerId>>,
}

impl SkeletonGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph and the antenna mount table from a description.
    ///
    /// Cylinders referencing undeclared markers, self-loops, repeated marker
    /// pairs and antennas on unknown cylinders are skipped with a warning.
    pub fn from_description(desc: &BodyDescription) -> Validated<(SkeletonGraph, AntennaMounts)> {
        let mut warnings = Vec::new();
        let mut graph = SkeletonGraph::new();

        for (&id, name) in &desc.nodes {
            graph.add_marker(id, name);
        }

        for (&id, cylinder) in &desc.cylinders {
            if let Err(e) = graph.add_cylinder(id, *cylinder) {
                skip(&mut warnings, ConfigWarning::new(CYLINDER, &id.to_string(), e.to_string()));
            }
        }

        let mut mounts = AntennaMounts::new();
        for (key, mount) in &desc.antennas {
            if graph.cylinder(mount.cylinder).is_none() {
                skip(
                    &mut warnings,
                    ConfigWarning::new(ANTENNA, key, format!("unknown cylinder {}", mount.cylinder)),
                );
                continue;
            }
            mounts.insert(key.clone(), mount.clone());
        }

        Validated::new((graph, mounts), warnings)
    }

    /// Adds (or renames) a marker.
    pub fn add_marker(&mut self, id: MarkerId, name: &str) {
        self.markers.insert(id, name.to_string());
        self.adjacency.entry(id).or_default();
    }

    /// Adds a cylinder between two declared markers.
    pub fn add_cylinder(&mut self, id: CylinderId, cylinder: Cylinder) -> BodyResult<()> {
        for end in [cylinder.tail, cylinder.head] {
            if !self.markers.contains_key(&end) {
                return Err(BodyError::UnknownMarker(end));
            }
        }
        if cylinder.tail == cylinder.head {
            return Err(BodyError::shape(format!(
                "cylinder {} joins marker {} to itself",
                id, cylinder.tail
            )));
        }
        if let Some((other, _)) = self
            .cylinders
            .iter()
            .find(|(_, c)| c.pair() == cylinder.pair())
        {
            return Err(BodyError::shape(format!(
                "cylinder {} repeats the marker pair of cylinder {}",
                id, other
            )));
        }
        if self.cylinders.contains_key(&id) {
            return Err(BodyError::shape(format!("cylinder {} declared twice", id)));
        }

        self.cylinders.insert(id, cylinder);
        self.adjacency.entry(cylinder.tail).or_default().insert(cylinder.head);
        self.adjacency.entry(cylinder.head).or_default().insert(cylinder.tail);
        Ok(())
    }

    /// Appends the synthetic marker `name`.
    ///
    /// A declared marker of the same name keeps its id; otherwise the next
    /// free id is allocated. Fails when the declared ids leave no room above
    /// the largest one.
    pub fn extend_with_marker(&mut self, name: &str) -> BodyResult<MarkerId> {
        if let Some(id) = self.marker_id(name) {
            return Ok(id);
        }
        let id = match self.markers.keys().next_back() {
            None => 0,
            Some(&last) => last.checked_add(1).ok_or_else(|| {
                BodyError::shape(format!("no marker id left above {} for {}", last, name))
            })?,
        };
        self.add_marker(id, name);
        Ok(id)
    }

    pub fn marker_name(&self, id: MarkerId) -> Option<&str> {
        self.markers.get(&id).map(String::as_str)
    }

    pub fn marker_id(&self, name: &str) -> Option<MarkerId> {
        self.markers
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(&id, _)| id)
    }

    /// Markers in ascending id order.
    pub fn markers(&self) -> impl Iterator<Item = (MarkerId, &str)> {
        self.markers.iter().map(|(&id, name)| (id, name.as_str()))
    }

    pub fn cylinder(&self, id: CylinderId) -> Option<&Cylinder> {
        self.cylinders.get(&id)
    }

    /// Cylinders in ascending id order.
    pub fn cylinders(&self) -> impl Iterator<Item = (CylinderId, &Cylinder)> {
        self.cylinders.iter().map(|(&id, c)| (id, c))
    }

    /// Markers sharing a cylinder with `id`.
    pub fn neighbors(&self, id: MarkerId) -> impl Iterator<Item = MarkerId> + '_ {
        self.adjacency.get(&id).into_iter().flatten().copied()
    }

    pub fn degree(&self, id: MarkerId) -> usize {
        self.adjacency.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn cylinder_count(&self) -> usize {
        self.cylinders.len()
    }
}
