//! Nested relation payload model and its JSON parser.
//!
//! # Invariants
//! - `ItemPayload::fields` never contains the primary key; it lives in `id`.
//! - An object holding any action key is an action bundle, and then every key
//!   must be an action mapped to a list.
//! - Payload shape never decides the relation kind; it only has to be one the
//!   kind accepts.

use crate::error::{SyncError, SyncResult};
use crate::model::entity::{Attributes, RowId, PRIMARY_KEY};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// Relation name → desired state, for one save call.
pub type RelationPayload = BTreeMap<String, RelationData>;

/// Explicit mutation verb carried by an action bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Attach,
    Detach,
    Update,
    Delete,
    Add,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Attach,
        Action::Detach,
        Action::Update,
        Action::Delete,
        Action::Add,
    ];

    /// Payload key for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attach => "attach",
            Self::Detach => "detach",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Add => "add",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == key)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of one related row.
///
/// `id == None` means "create"; `Some` refers to an existing row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPayload {
    pub id: Option<RowId>,
    pub fields: Attributes,
}

impl ItemPayload {
    pub fn new(id: Option<RowId>, fields: Attributes) -> Self {
        Self { id, fields }
    }

    /// Reference to an existing row without fields.
    pub fn with_id(id: RowId) -> Self {
        Self {
            id: Some(id),
            fields: Attributes::new(),
        }
    }

    /// Parses one list element: an object, or a bare integer id.
    pub fn from_value(relation: &str, value: Value) -> SyncResult<Self> {
        match value {
            Value::Number(number) => {
                let id = number.as_i64().ok_or_else(|| invalid_id(relation, &number))?;
                Ok(Self::with_id(id))
            }
            Value::Object(mut fields) => {
                let id = match fields.remove(PRIMARY_KEY) {
                    None | Some(Value::Null) => None,
                    Some(Value::Number(number)) => {
                        Some(number.as_i64().ok_or_else(|| invalid_id(relation, &number))?)
                    }
                    Some(other) => return Err(invalid_id(relation, &other)),
                };
                Ok(Self { id, fields })
            }
            other => Err(SyncError::Validation(format!(
                "relation `{relation}` items must be objects or ids, got `{other}`"
            ))),
        }
    }

    /// Fields plus one extra column, without mutating the payload.
    pub fn fields_with(&self, column: &str, value: Value) -> Attributes {
        let mut fields = self.fields.clone();
        fields.insert(column.to_string(), value);
        fields
    }
}

/// One or more explicit actions for a collection relation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionBundle {
    actions: BTreeMap<Action, Vec<ItemPayload>>,
}

impl ActionBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, action: Action, items: Vec<ItemPayload>) -> Self {
        self.actions.insert(action, items);
        self
    }

    pub fn get(&self, action: Action) -> Option<&[ItemPayload]> {
        self.actions.get(&action).map(Vec::as_slice)
    }

    /// First action of `priority` present in the bundle.
    pub fn first_of(&self, priority: &[Action]) -> Option<(Action, &[ItemPayload])> {
        priority
            .iter()
            .find_map(|action| self.get(*action).map(|items| (*action, items)))
    }

    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.actions.keys().copied()
    }
}

/// Desired state of one relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationData {
    /// Raw id or null.
    Scalar(Option<RowId>),
    /// Object without action keys: a to-one desired row.
    Single(ItemPayload),
    /// Explicit attach/detach/update/delete/add lists.
    Actions(ActionBundle),
    /// Complete desired collection.
    FullList(Vec<ItemPayload>),
}

impl RelationData {
    /// Parses one relation value.
    ///
    /// # Errors
    /// - `Validation` for strings, booleans and non-integer numbers.
    /// - `Validation` when an action key does not map to a list, or when
    ///   action keys are mixed with plain fields.
    pub fn from_value(relation: &str, value: Value) -> SyncResult<Self> {
        match value {
            Value::Null => Ok(Self::Scalar(None)),
            Value::Number(number) => number
                .as_i64()
                .map(|id| Self::Scalar(Some(id)))
                .ok_or_else(|| invalid_id(relation, &number)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| ItemPayload::from_value(relation, item))
                .collect::<SyncResult<Vec<_>>>()
                .map(Self::FullList),
            Value::Object(map) => {
                if map.keys().any(|key| Action::parse(key).is_some()) {
                    parse_bundle(relation, map).map(Self::Actions)
                } else {
                    ItemPayload::from_value(relation, Value::Object(map)).map(Self::Single)
                }
            }
            other => Err(SyncError::Validation(format!(
                "relation `{relation}` has unsupported payload `{other}`"
            ))),
        }
    }

    /// Short shape name used in logs and validation messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Single(_) => "single",
            Self::Actions(_) => "actions",
            Self::FullList(_) => "full_list",
        }
    }
}

fn parse_bundle(relation: &str, map: Attributes) -> SyncResult<ActionBundle> {
    let mut bundle = ActionBundle::new();
    for (key, value) in map {
        let Some(action) = Action::parse(&key) else {
            return Err(SyncError::Validation(format!(
                "relation `{relation}` mixes action keys with field `{key}`"
            )));
        };
        let Value::Array(items) = value else {
            return Err(SyncError::Validation(format!(
                "relation `{relation}` action `{action}` must be a list of items"
            )));
        };
        let items = items
            .into_iter()
            .map(|item| ItemPayload::from_value(relation, item))
            .collect::<SyncResult<Vec<_>>>()?;
        bundle.actions.insert(action, items);
    }
    Ok(bundle)
}

fn invalid_id(relation: &str, value: &impl Display) -> SyncError {
    SyncError::Validation(format!(
        "relation `{relation}` has invalid id `{value}`; expected an integer"
    ))
}

/// Ids carried by `items`, first occurrence order, duplicates and missing
/// ids dropped.
pub fn item_ids(items: &[ItemPayload]) -> Vec<RowId> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter_map(|item| item.id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Items paired with their list index, keeping only the last occurrence of
/// each id. Items without id are all kept.
pub fn last_occurrences(items: &[ItemPayload]) -> Vec<(usize, &ItemPayload)> {
    let mut last_index: HashMap<RowId, usize> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        if let Some(id) = item.id {
            last_index.insert(id, index);
        }
    }

    items
        .iter()
        .enumerate()
        .filter(|(index, item)| item.id.map_or(true, |id| last_index.get(&id) == Some(index)))
        .collect()
}
