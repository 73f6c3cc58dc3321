//! Structural diff and patch over label maps
//!
//! A [`Changelog`] is the compact description of how one label map turns into
//! another. It is an explicit, string-keyed diff: every [`Change`] names the
//! operation, the label it touches, and the old and new values.
//!
//! Serialized form of a change:
//!
//! ```json
//! {"type": "update", "path": ["version"], "from": "1", "to": "2"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::LabelSet;

/// Kind of a single change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Label added
    Create,
    /// Label value changed
    Update,
    /// Label removed
    Delete,
}

/// A single label change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Operation
    #[serde(rename = "type")]
    pub kind: ChangeType,

    /// Path to the changed label; always a single label name for label maps
    pub path: Vec<String>,

    /// Value before the change (`None` for creations)
    pub from: Option<String>,

    /// Value after the change (`None` for deletions)
    pub to: Option<String>,
}

impl Change {
    /// A label added with `value`
    pub fn create(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ChangeType::Create,
            path: vec![key.into()],
            from: None,
            to: Some(value.into()),
        }
    }

    /// A label changed from `from` to `to`
    pub fn update(key: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: ChangeType::Update,
            path: vec![key.into()],
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    /// A label removed that held `value`
    pub fn delete(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ChangeType::Delete,
            path: vec![key.into()],
            from: Some(value.into()),
            to: None,
        }
    }

    /// The label name this change applies to
    pub fn key(&self) -> Option<&str> {
        match self.path.as_slice() {
            [key] => Some(key.as_str()),
            _ => None,
        }
    }

    fn apply(&self, target: &mut LabelSet) -> std::result::Result<(), String> {
        let key = self
            .key()
            .ok_or_else(|| format!("invalid path {:?}", self.path))?;
        let current = target.get(key);
        match self.kind {
            ChangeType::Create => {
                if let Some(existing) = current {
                    return Err(format!("create of '{}': already set to '{}'", key, existing));
                }
                let to = self
                    .to
                    .clone()
                    .ok_or_else(|| format!("create of '{}' has no value", key))?;
                target.insert(key.to_string(), to);
            }
            ChangeType::Update => {
                match current {
                    None => return Err(format!("update of '{}': label not present", key)),
                    Some(existing) if self.from.as_deref() != Some(existing.as_str()) => {
                        return Err(format!(
                            "update of '{}': expected '{}', found '{}'",
                            key,
                            self.from.as_deref().unwrap_or_default(),
                            existing
                        ));
                    }
                    Some(_) => {}
                }
                let to = self
                    .to
                    .clone()
                    .ok_or_else(|| format!("update of '{}' has no value", key))?;
                target.insert(key.to_string(), to);
            }
            ChangeType::Delete => {
                match current {
                    None => return Err(format!("delete of '{}': label not present", key)),
                    Some(existing) if self.from.as_deref() != Some(existing.as_str()) => {
                        return Err(format!(
                            "delete of '{}': expected '{}', found '{}'",
                            key,
                            self.from.as_deref().unwrap_or_default(),
                            existing
                        ));
                    }
                    Some(_) => {}
                }
                target.remove(key);
            }
        }
        Ok(())
    }
}

/// Ordered list of changes between two label maps
pub type Changelog = Vec<Change>;

/// Compute the changes turning `from` into `to`
///
/// Changes come out in label-name order.
pub fn diff(from: &LabelSet, to: &LabelSet) -> Changelog {
    let mut changelog = Changelog::new();
    let mut old = from.iter().peekable();
    let mut new = to.iter().peekable();

    loop {
        match (old.peek(), new.peek()) {
            (Some((ok, ov)), Some((nk, nv))) => {
                if ok < nk {
                    changelog.push(Change::delete(ok.as_str(), ov.as_str()));
                    old.next();
                } else if nk < ok {
                    changelog.push(Change::create(nk.as_str(), nv.as_str()));
                    new.next();
                } else {
                    if ov != nv {
                        changelog.push(Change::update(ok.as_str(), ov.as_str(), nv.as_str()));
                    }
                    old.next();
                    new.next();
                }
            }
            (Some((ok, ov)), None) => {
                changelog.push(Change::delete(ok.as_str(), ov.as_str()));
                old.next();
            }
            (None, Some((nk, nv))) => {
                changelog.push(Change::create(nk.as_str(), nv.as_str()));
                new.next();
            }
            (None, None) => break,
        }
    }

    changelog
}

/// Apply a changelog to `target` in place
///
/// Every change is attempted; if any of them conflicts with the current
/// contents of `target`, all conflicts are reported in one
/// [`Error::PatchFailure`].
pub fn patch(changelog: &[Change], target: &mut LabelSet) -> Result<()> {
    let failures: Vec<String> = changelog
        .iter()
        .filter_map(|change| change.apply(target).err())
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::PatchFailure(failures.join("; ")))
    }
}
