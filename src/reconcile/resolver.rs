//! Reference resolver
//!
//! Listener default actions and rule actions usually name their target group.
//! The name is swapped for the identifier right before the owning entity is
//! created or modified, using the target groups known at that point in the
//! pass. Nothing is cached between calls.

use std::collections::BTreeMap;

use crate::domain::{Action, TargetGroupArn};
use crate::errors::{AlbError, Result};

/// Target groups known to the current pass, by name.
#[derive(Debug, Clone, Default)]
pub struct TargetGroupIndex {
    by_name: BTreeMap<String, TargetGroupArn>,
}

impl TargetGroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the identifier bound to `name`
    pub fn insert(&mut self, name: impl Into<String>, arn: TargetGroupArn) {
        self.by_name.insert(name.into(), arn);
    }

    pub fn get(&self, name: &str) -> Option<&TargetGroupArn> {
        self.by_name.get(name)
    }

    /// Name bound to an identifier, if any
    pub fn name_of(&self, arn: &TargetGroupArn) -> Option<&str> {
        self.by_name.iter().find(|(_, a)| *a == arn).map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl FromIterator<(String, TargetGroupArn)> for TargetGroupIndex {
    fn from_iter<I: IntoIterator<Item = (String, TargetGroupArn)>>(iter: I) -> Self {
        Self { by_name: iter.into_iter().collect() }
    }
}

/// Fill in the target group identifier of an action that names its target.
///
/// An action that already carries an identifier is returned unchanged. An
/// action naming a target group that is not in `index` fails with a
/// resolution error naming `owner`.
pub fn resolve(action: &Action, index: &TargetGroupIndex, owner: &str) -> Result<Action> {
    if action.target_group_arn.is_some() {
        return Ok(action.clone());
    }
    let Some(name) = action.target_group_name.as_deref() else {
        return Err(AlbError::validation_field(
            format!("action of {} has no target group", owner),
            "target_group_name",
        ));
    };
    let arn = index.get(name).ok_or_else(|| AlbError::resolution(name, owner))?;
    Ok(Action { target_group_arn: Some(arn.clone()), ..action.clone() })
}

pub fn resolve_all(
    actions: &[Action],
    index: &TargetGroupIndex,
    owner: &str,
) -> Result<Vec<Action>> {
    actions.iter().map(|a| resolve(a, index, owner)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TargetGroupIndex {
        [("web".to_string(), TargetGroupArn::new("id123"))].into_iter().collect()
    }

    #[test]
    fn test_resolves_name_to_identifier() {
        let resolved = resolve(&Action::forward_to_name("web"), &index(), "listener 80").unwrap();
        assert_eq!(resolved.target_group_arn, Some(TargetGroupArn::new("id123")));
        assert_eq!(resolved.target_group_name.as_deref(), Some("web"));
        assert_eq!(resolved.payload(), Action::forward_to_arn(TargetGroupArn::new("id123")));
    }

    #[test]
    fn test_missing_name_is_resolution_error() {
        let error = resolve(&Action::forward_to_name("missing"), &index(), "listener 80 of 'a'")
            .unwrap_err();
        match error {
            AlbError::Resolution { target_group, owner } => {
                assert_eq!(target_group, "missing");
                assert_eq!(owner, "listener 80 of 'a'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_existing_identifier_is_kept() {
        let action = Action::forward_to_arn(TargetGroupArn::new("arn:other"));
        assert_eq!(resolve(&action, &TargetGroupIndex::new(), "rule").unwrap(), action);
    }

    #[test]
    fn test_resolve_all_stops_on_first_failure() {
        let actions = vec![Action::forward_to_name("web"), Action::forward_to_name("api")];
        assert!(resolve_all(&actions, &index(), "rule /api/*").is_err());
        assert_eq!(resolve_all(&actions[..1], &index(), "rule").unwrap().len(), 1);
    }

    #[test]
    fn test_name_of() {
        assert_eq!(index().name_of(&TargetGroupArn::new("id123")), Some("web"));
        assert_eq!(index().name_of(&TargetGroupArn::new("nope")), None);
    }
}
