//! Per-node configuration.
//!
//! Every node kind has its own settings struct; [`NodeSettings`] is the
//! closed union the graph stores. Settings are plain serde data so documents
//! can round-trip them without the graph knowing node internals.

use crate::engine::plan::{
    AggSpec, Aggregation, JoinHow, JoinSuffixes, KeepStrategy, Predicate, SelectColumn, SortKey,
};
use crate::error::{FlowError, Result};
use crate::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node kind tag, the discriminant stored in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Read,
    ManualInput,
    Filter,
    Select,
    GroupBy,
    Join,
    Sort,
    ExpressionCode,
    Unique,
    Head,
    Preview,
    Pivot,
    Unpivot,
    Output,
}

impl NodeKind {
    pub const ALL: [NodeKind; 14] = [
        NodeKind::Read,
        NodeKind::ManualInput,
        NodeKind::Filter,
        NodeKind::Select,
        NodeKind::GroupBy,
        NodeKind::Join,
        NodeKind::Sort,
        NodeKind::ExpressionCode,
        NodeKind::Unique,
        NodeKind::Head,
        NodeKind::Preview,
        NodeKind::Pivot,
        NodeKind::Unpivot,
        NodeKind::Output,
    ];

    /// Source kinds take no upstream input.
    pub fn is_source(self) -> bool {
        matches!(self, NodeKind::Read | NodeKind::ManualInput)
    }

    /// Join is the only kind with a distinct second input slot.
    pub fn takes_right_input(self) -> bool {
        self == NodeKind::Join
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Read => "read",
            NodeKind::ManualInput => "manual-input",
            NodeKind::Filter => "filter",
            NodeKind::Select => "select",
            NodeKind::GroupBy => "group-by",
            NodeKind::Join => "join",
            NodeKind::Sort => "sort",
            NodeKind::ExpressionCode => "expression-code",
            NodeKind::Unique => "unique",
            NodeKind::Head => "head",
            NodeKind::Preview => "preview",
            NodeKind::Pivot => "pivot",
            NodeKind::Unpivot => "unpivot",
            NodeKind::Output => "output",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadSettings {
    /// CSV file path; may be empty until the user configures the node.
    pub path: String,
}

/// Literal rows entered by hand. Records are insertion-ordered maps so the
/// column order the user typed survives round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualInputSettings {
    pub data: Vec<IndexMap<String, Value>>,
}

impl ManualInputSettings {
    /// Materialize the literal rows as a frame. Columns are the union of
    /// record keys in first-seen order. A column's type is the one shared by
    /// all its non-null cells; mixed-type columns demote to String and every
    /// cell is stringified. All-null columns default to String.
    pub fn to_frame(&self) -> Result<crate::engine::frame::DataFrame> {
        use crate::engine::frame::{Column, DataFrame};
        use crate::types::DataType;

        let mut names: Vec<String> = Vec::new();
        for record in &self.data {
            for key in record.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let mut cell_types = self
                    .data
                    .iter()
                    .filter_map(|record| record.get(&name))
                    .filter_map(|v| v.data_type());
                let data_type = match cell_types.next() {
                    Some(first) if cell_types.all(|t| t == first) => first,
                    Some(_) => DataType::String,
                    None => DataType::String,
                };
                let values = self
                    .data
                    .iter()
                    .map(|record| match record.get(&name) {
                        None | Some(Value::Null) => Value::Null,
                        Some(cell) if cell.data_type() == Some(data_type) => cell.clone(),
                        Some(cell) => Value::Str(cell.to_string()),
                    })
                    .collect();
                Column::new(name, data_type, values)
            })
            .collect();
        DataFrame::new(columns)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// `None` means unconfigured; the node passes rows through unchanged.
    pub predicate: Option<Predicate>,
}

/// One column decision in a select node: keep or drop, optional rename,
/// optional explicit output position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectEntry {
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default = "default_true")]
    pub keep: bool,
    #[serde(default)]
    pub position: Option<usize>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectSettings {
    pub columns: Vec<SelectEntry>,
}

impl SelectSettings {
    /// Resolve to plan projection order: kept entries only, positioned
    /// entries sorted stably by position before unpositioned ones.
    pub fn to_select_columns(&self) -> Vec<SelectColumn> {
        let mut kept: Vec<&SelectEntry> = self.columns.iter().filter(|e| e.keep).collect();
        kept.sort_by_key(|e| e.position.unwrap_or(usize::MAX));
        kept.into_iter()
            .map(|e| SelectColumn {
                source: e.name.clone(),
                output: e.new_name.clone().unwrap_or_else(|| e.name.clone()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupBySettings {
    pub keys: Vec<String>,
    pub aggregations: Vec<AggSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinSettings {
    pub how: JoinHow,
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    pub suffixes: JoinSuffixes,
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self {
            how: JoinHow::Inner,
            left_on: Vec::new(),
            right_on: Vec::new(),
            suffixes: JoinSuffixes::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSettings {
    pub by: Vec<SortKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionSettings {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniqueSettings {
    pub subset: Option<Vec<String>>,
    pub keep: KeepStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadSettings {
    pub n: usize,
}

impl Default for HeadSettings {
    fn default() -> Self {
        Self { n: 10 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotSettings {
    pub index: Vec<String>,
    pub on: String,
    pub values: String,
    pub agg: Aggregation,
}

impl Default for PivotSettings {
    fn default() -> Self {
        Self {
            index: Vec::new(),
            on: String::new(),
            values: String::new(),
            agg: Aggregation::Sum,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpivotSettings {
    pub index: Vec<String>,
    /// Columns to melt; empty means all non-index columns.
    pub on: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub path: String,
}

/// Closed union of every node kind's settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeSettings {
    Read(ReadSettings),
    ManualInput(ManualInputSettings),
    Filter(FilterSettings),
    Select(SelectSettings),
    GroupBy(GroupBySettings),
    Join(JoinSettings),
    Sort(SortSettings),
    ExpressionCode(ExpressionSettings),
    Unique(UniqueSettings),
    Head(HeadSettings),
    Preview(PreviewSettings),
    Pivot(PivotSettings),
    Unpivot(UnpivotSettings),
    Output(OutputSettings),
}

impl NodeSettings {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSettings::Read(_) => NodeKind::Read,
            NodeSettings::ManualInput(_) => NodeKind::ManualInput,
            NodeSettings::Filter(_) => NodeKind::Filter,
            NodeSettings::Select(_) => NodeKind::Select,
            NodeSettings::GroupBy(_) => NodeKind::GroupBy,
            NodeSettings::Join(_) => NodeKind::Join,
            NodeSettings::Sort(_) => NodeKind::Sort,
            NodeSettings::ExpressionCode(_) => NodeKind::ExpressionCode,
            NodeSettings::Unique(_) => NodeKind::Unique,
            NodeSettings::Head(_) => NodeKind::Head,
            NodeSettings::Preview(_) => NodeKind::Preview,
            NodeSettings::Pivot(_) => NodeKind::Pivot,
            NodeSettings::Unpivot(_) => NodeKind::Unpivot,
            NodeSettings::Output(_) => NodeKind::Output,
        }
    }

    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Read => NodeSettings::Read(ReadSettings::default()),
            NodeKind::ManualInput => NodeSettings::ManualInput(ManualInputSettings::default()),
            NodeKind::Filter => NodeSettings::Filter(FilterSettings::default()),
            NodeKind::Select => NodeSettings::Select(SelectSettings::default()),
            NodeKind::GroupBy => NodeSettings::GroupBy(GroupBySettings::default()),
            NodeKind::Join => NodeSettings::Join(JoinSettings::default()),
            NodeKind::Sort => NodeSettings::Sort(SortSettings::default()),
            NodeKind::ExpressionCode => {
                NodeSettings::ExpressionCode(ExpressionSettings::default())
            }
            NodeKind::Unique => NodeSettings::Unique(UniqueSettings::default()),
            NodeKind::Head => NodeSettings::Head(HeadSettings::default()),
            NodeKind::Preview => NodeSettings::Preview(PreviewSettings::default()),
            NodeKind::Pivot => NodeSettings::Pivot(PivotSettings::default()),
            NodeKind::Unpivot => NodeSettings::Unpivot(UnpivotSettings::default()),
            NodeKind::Output => NodeSettings::Output(OutputSettings::default()),
        }
    }

    /// Settings body without the kind tag, for document payloads.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("kind");
        }
        Ok(value)
    }

    /// Rebuild settings from a document payload, trusting the external kind
    /// tag. A null or missing payload yields the kind's defaults.
    pub fn from_payload(kind: NodeKind, payload: serde_json::Value) -> Result<Self> {
        if payload.is_null() {
            return Ok(Self::default_for(kind));
        }
        let mut tagged = payload;
        match tagged.as_object_mut() {
            Some(map) => {
                map.insert("kind".into(), serde_json::json!(kind.as_str()));
            }
            None => {
                return Err(FlowError::Document(format!(
                    "settings payload for {kind} node must be a mapping"
                )))
            }
        }
        Ok(serde_json::from_value(tagged)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_through_payload() {
        let settings = NodeSettings::Head(HeadSettings { n: 3 });
        let payload = settings.to_payload().unwrap();
        assert!(payload.get("kind").is_none());
        let back = NodeSettings::from_payload(NodeKind::Head, payload).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_null_payload_gives_defaults() {
        let settings =
            NodeSettings::from_payload(NodeKind::Head, serde_json::Value::Null).unwrap();
        assert_eq!(settings, NodeSettings::Head(HeadSettings { n: 10 }));
    }

    #[test]
    fn test_select_resolution_order() {
        let settings = SelectSettings {
            columns: vec![
                SelectEntry {
                    name: "a".into(),
                    new_name: None,
                    keep: true,
                    position: None,
                },
                SelectEntry {
                    name: "b".into(),
                    new_name: Some("renamed".into()),
                    keep: true,
                    position: Some(0),
                },
                SelectEntry {
                    name: "c".into(),
                    new_name: None,
                    keep: false,
                    position: None,
                },
            ],
        };
        let resolved = settings.to_select_columns();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].source, "b");
        assert_eq!(resolved[0].output, "renamed");
        assert_eq!(resolved[1].source, "a");
    }

    #[test]
    fn test_manual_input_preserves_column_order() {
        let json = r#"{"data": [{"z": 1, "a": "x"}]}"#;
        let settings: ManualInputSettings = serde_json::from_str(json).unwrap();
        let keys: Vec<&String> = settings.data[0].keys().collect();
        assert_eq!(keys, ["z", "a"]);
        assert_eq!(settings.data[0]["z"], Value::Int(1));
    }

    #[test]
    fn test_kebab_case_kind_names() {
        assert_eq!(
            serde_json::to_string(&NodeKind::ManualInput).unwrap(),
            "\"manual-input\""
        );
        assert_eq!(
            serde_json::to_string(&NodeKind::ExpressionCode).unwrap(),
            "\"expression-code\""
        );
    }
}
