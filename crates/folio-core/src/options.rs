//! Option trees on template fields.
//!
//! An option is either a selectable leaf with a stable uuid or a named group
//! of further options. Records select leaves by uuid.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldOption {
  Group { name: String, options: Vec<FieldOption> },
  Leaf { name: String, uuid: Uuid },
}

impl FieldOption {
  pub fn name(&self) -> &str {
    match self {
      Self::Group { name, .. } | Self::Leaf { name, .. } => name,
    }
  }
}

/// An option as submitted: a leaf may repeat an existing uuid, a new leaf
/// omits it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionInput {
  #[serde(default)]
  pub name:    String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uuid:    Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<OptionInput>>,
}

/// A selected option as stored on a record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
  pub uuid: Uuid,
  pub name: String,
}

/// Validate submitted options against the leaf uuids of the previous version.
pub fn parse_options(
  input: &[OptionInput],
  previous: &HashSet<Uuid>,
) -> Result<Vec<FieldOption>> {
  parse_level(input, previous, &mut HashSet::new())
}

fn parse_level(
  input: &[OptionInput],
  previous: &HashSet<Uuid>,
  current: &mut HashSet<Uuid>,
) -> Result<Vec<FieldOption>> {
  let mut parsed = Vec::with_capacity(input.len());
  for option in input {
    if option.name.is_empty() {
      return Err(Error::input("each option must have a name"));
    }
    let name = option.name.clone();
    if let Some(children) = &option.options {
      let options = parse_level(children, previous, current)?;
      parsed.push(FieldOption::Group { name, options });
      continue;
    }
    let uuid = match option.uuid {
      Some(uuid) => {
        if !previous.contains(&uuid) {
          return Err(Error::input(format!(
            "cannot provide option uuid {uuid}; only existing option uuids may be supplied"
          )));
        }
        if !current.insert(uuid) {
          return Err(Error::input(format!(
            "option uuid {uuid} duplicated; each option may only be supplied once"
          )));
        }
        uuid
      }
      None => Uuid::new_v4(),
    };
    parsed.push(FieldOption::Leaf { name, uuid });
  }
  Ok(parsed)
}

/// Order-insensitive equality, matching options by name.
pub fn options_equal(a: &[FieldOption], b: &[FieldOption]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let by_name: HashMap<&str, &FieldOption> =
    b.iter().map(|o| (o.name(), o)).collect();
  a.iter().all(|left| match (left, by_name.get(left.name())) {
    (FieldOption::Leaf { uuid: l, .. }, Some(FieldOption::Leaf { uuid: r, .. })) => {
      l == r
    }
    (
      FieldOption::Group { options: l, .. },
      Some(FieldOption::Group { options: r, .. }),
    ) => options_equal(l, r),
    _ => false,
  })
}

pub fn leaf_uuids(options: &[FieldOption], into: &mut HashSet<Uuid>) {
  for option in options {
    match option {
      FieldOption::Leaf { uuid, .. } => {
        into.insert(*uuid);
      }
      FieldOption::Group { options, .. } => leaf_uuids(options, into),
    }
  }
}

fn leaf_names<'a>(options: &'a [FieldOption], into: &mut HashMap<Uuid, &'a str>) {
  for option in options {
    match option {
      FieldOption::Leaf { uuid, name } => {
        into.insert(*uuid, name);
      }
      FieldOption::Group { options, .. } => leaf_names(options, into),
    }
  }
}

/// Resolve selected leaf uuids to `{uuid, name}` pairs.
pub fn option_values(options: &[FieldOption], selected: &[Uuid]) -> Result<Vec<OptionValue>> {
  let mut names = HashMap::new();
  leaf_names(options, &mut names);
  selected
    .iter()
    .map(|uuid| {
      names
        .get(uuid)
        .map(|name| OptionValue { uuid: *uuid, name: (*name).to_owned() })
        .ok_or_else(|| {
          Error::input(format!(
            "option uuid {uuid} is not an option provided by the template"
          ))
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn leaf(name: &str, uuid: Option<Uuid>) -> OptionInput {
    OptionInput { name: name.into(), uuid, options: None }
  }

  #[test]
  fn new_leaves_get_fresh_uuids() {
    let parsed = parse_options(&[leaf("a", None), leaf("b", None)], &HashSet::new()).unwrap();
    assert_eq!(parsed.len(), 2);
    assert!(matches!(&parsed[0], FieldOption::Leaf { name, .. } if name == "a"));
  }

  #[test]
  fn unknown_uuid_is_rejected() {
    let err = parse_options(&[leaf("a", Some(Uuid::new_v4()))], &HashSet::new()).unwrap_err();
    assert!(matches!(err, Error::Input(_)));
  }

  #[test]
  fn duplicate_uuid_is_rejected() {
    let id = Uuid::new_v4();
    let previous = HashSet::from([id]);
    let nested = OptionInput {
      name:    "group".into(),
      uuid:    None,
      options: Some(vec![leaf("again", Some(id))]),
    };
    let err = parse_options(&[leaf("a", Some(id)), nested], &previous).unwrap_err();
    assert!(matches!(err, Error::Input(_)));
  }

  #[test]
  fn nameless_option_is_rejected() {
    let err = parse_options(&[leaf("", None)], &HashSet::new()).unwrap_err();
    assert!(matches!(err, Error::Input(_)));
  }

  #[test]
  fn equality_ignores_order_but_not_uuids() {
    let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
    let a = vec![
      FieldOption::Leaf { name: "x".into(), uuid: x },
      FieldOption::Group {
        name:    "g".into(),
        options: vec![FieldOption::Leaf { name: "y".into(), uuid: y }],
      },
    ];
    let mut b = a.clone();
    b.reverse();
    assert!(options_equal(&a, &b));

    let c = vec![
      FieldOption::Leaf { name: "x".into(), uuid: Uuid::new_v4() },
      a[1].clone(),
    ];
    assert!(!options_equal(&a, &c));
  }

  #[test]
  fn values_resolve_names_and_reject_unknown() {
    let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
    let options = vec![FieldOption::Group {
      name:    "g".into(),
      options: vec![
        FieldOption::Leaf { name: "x".into(), uuid: x },
        FieldOption::Leaf { name: "y".into(), uuid: y },
      ],
    }];
    let values = option_values(&options, &[y]).unwrap();
    assert_eq!(values, vec![OptionValue { uuid: y, name: "y".into() }]);
    assert!(option_values(&options, &[Uuid::new_v4()]).is_err());
  }

  #[test]
  fn group_serializes_without_uuid() {
    let group = FieldOption::Group { name: "g".into(), options: vec![] };
    let json = serde_json::to_value(group).unwrap();
    assert_eq!(json, serde_json::json!({ "name": "g", "options": [] }));
  }
}
