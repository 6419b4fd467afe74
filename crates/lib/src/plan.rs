//! Sync planning.
//!
//! [`compute_plan`] diffs the desired table against what is checked out and
//! returns the actions needed to converge. It is pure: no I/O, and the same
//! inputs always give the same plan.
//!
//! # Planning Rules
//!
//! For each entry in the table:
//! - nothing checked out for its id → `Fetch`
//! - checked out at a different revision → `Update`
//! - checked out at the pinned revision → unchanged
//!
//! For each observed id not in the table:
//! - its path overlaps no table entry's path → `Remove`
//! - otherwise the directory now belongs to another entry and is left alone
//!   (e.g. an id that was renamed but kept its path)
//!
//! For each old location of an entry that moved to a new path, the same
//! overlap rule applies; the removal is marked `relocated`.

use serde::{Serialize, Serializer};

use crate::entry::DependencyEntry;
use crate::manifest::DependencyTable;
use crate::workspace::LocalCheckoutState;

/// One step towards the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
  /// Nothing is checked out for this entry yet.
  Fetch(DependencyEntry),

  /// The entry is checked out at `from` and must move to `to`.
  Update {
    entry: DependencyEntry,
    from: String,
    to: String,
  },

  /// A checkout no longer referenced by the table. Destructive; requires
  /// confirmation. `relocated` marks the old location of an entry that is
  /// still in the table under a new path.
  Remove { id: String, path: String, relocated: bool },
}

impl SyncAction {
  pub fn id(&self) -> &str {
    match self {
      SyncAction::Fetch(entry) | SyncAction::Update { entry, .. } => entry.id(),
      SyncAction::Remove { id, .. } => id,
    }
  }

  /// Workspace-relative path this action writes to.
  pub fn path(&self) -> &str {
    match self {
      SyncAction::Fetch(entry) | SyncAction::Update { entry, .. } => entry.path(),
      SyncAction::Remove { path, .. } => path,
    }
  }

  /// Key this action's result is recorded under in a summary.
  ///
  /// The old location of a relocated entry shares its id with the entry's own
  /// fetch, so it is keyed by id and path. Ids never contain whitespace, so
  /// the two keys cannot collide.
  pub fn key(&self) -> String {
    match self {
      SyncAction::Remove {
        id,
        path,
        relocated: true,
      } => format!("{} ({})", id, path),
      other => other.id().to_string(),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      SyncAction::Fetch(_) => "fetch",
      SyncAction::Update { .. } => "update",
      SyncAction::Remove { .. } => "remove",
    }
  }

  pub fn is_destructive(&self) -> bool {
    matches!(self, SyncAction::Remove { .. })
  }
}

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ActionView<'a> {
  Fetch {
    id: &'a str,
    path: &'a str,
    version: String,
  },
  Update {
    id: &'a str,
    path: &'a str,
    from: &'a str,
    to: &'a str,
  },
  Remove {
    id: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    relocated: bool,
  },
}

impl Serialize for SyncAction {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let view = match self {
      SyncAction::Fetch(entry) => ActionView::Fetch {
        id: entry.id(),
        path: entry.path(),
        version: entry.version().to_string(),
      },
      SyncAction::Update { entry, from, to } => ActionView::Update {
        id: entry.id(),
        path: entry.path(),
        from,
        to,
      },
      SyncAction::Remove { id, path, relocated } => ActionView::Remove {
        id,
        path,
        relocated: *relocated,
      },
    };
    view.serialize(serializer)
  }
}

/// Actions sorted by id, plus the ids already at their pin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
  pub actions: Vec<SyncAction>,
  pub unchanged: Vec<String>,
}

impl SyncPlan {
  /// Returns true if the workspace already matches the table.
  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  pub fn get(&self, id: &str) -> Option<&SyncAction> {
    self.actions.iter().find(|a| a.id() == id)
  }

  pub fn count(&self, kind: &str) -> usize {
    self.actions.iter().filter(|a| a.kind() == kind).count()
  }

  pub fn removals(&self) -> impl Iterator<Item = &SyncAction> {
    self.actions.iter().filter(|a| a.is_destructive())
  }
}

/// Diff `desired` against `observed`.
pub fn compute_plan(desired: &DependencyTable, observed: &LocalCheckoutState) -> SyncPlan {
  let mut plan = SyncPlan::default();

  for entry in desired {
    let expected = entry.version().revision();
    match observed.revision(entry.id()) {
      None => plan.actions.push(SyncAction::Fetch(entry.clone())),
      Some(actual) if actual == expected => plan.unchanged.push(entry.id().to_string()),
      Some(actual) => plan.actions.push(SyncAction::Update {
        entry: entry.clone(),
        from: actual.to_string(),
        to: expected,
      }),
    }
  }

  for (id, checkout) in observed.iter() {
    if desired.get(id).is_some() || desired.overlaps_path(&checkout.path) {
      continue;
    }
    plan.actions.push(SyncAction::Remove {
      id: id.to_string(),
      path: checkout.path.clone(),
      relocated: false,
    });
  }

  for (id, path) in observed.relocated() {
    if desired.overlaps_path(path) {
      continue;
    }
    plan.actions.push(SyncAction::Remove {
      id: id.to_string(),
      path: path.to_string(),
      relocated: true,
    });
  }

  plan.actions.sort_by(|a, b| {
    a.id()
      .as_bytes()
      .cmp(b.id().as_bytes())
      .then_with(|| a.key().cmp(&b.key()))
  });
  plan
}

#[cfg(test)]
mod tests {
  use super::*;

  const REV1: &str = "1111111111111111111111111111111111111111";
  const REV2: &str = "2222222222222222222222222222222222222222";

  fn entry(id: &str, version: &str, path: &str) -> DependencyEntry {
    DependencyEntry::new(id, version, path).unwrap()
  }

  fn table(entries: Vec<DependencyEntry>) -> DependencyTable {
    DependencyTable::from_entries(entries).unwrap()
  }

  /// Observed state in which every entry is at its pin.
  fn converged(table: &DependencyTable) -> LocalCheckoutState {
    let mut state = LocalCheckoutState::new();
    for e in table {
      state.insert(e.id(), e.path(), Some(&e.version().revision()));
    }
    state
  }

  #[test]
  fn empty_inputs_empty_plan() {
    let plan = compute_plan(&DependencyTable::default(), &LocalCheckoutState::new());
    assert!(plan.is_empty());
    assert!(plan.unchanged.is_empty());
  }

  #[test]
  fn missing_checkout_is_fetched() {
    let a = entry("A", REV1, "a");
    let plan = compute_plan(&table(vec![a.clone()]), &LocalCheckoutState::new());
    assert_eq!(plan.actions, vec![SyncAction::Fetch(a)]);
  }

  #[test]
  fn changed_pin_is_updated() {
    let a = entry("A", REV2, "a");
    let mut observed = LocalCheckoutState::new();
    observed.insert("A", "a", Some(REV1));

    let plan = compute_plan(&table(vec![a.clone()]), &observed);
    assert_eq!(
      plan.actions,
      vec![SyncAction::Update {
        entry: a,
        from: REV1.to_string(),
        to: REV2.to_string(),
      }]
    );
  }

  #[test]
  fn dropped_entry_is_removed() {
    let mut observed = LocalCheckoutState::new();
    observed.insert("B", "b", Some(REV1));

    let plan = compute_plan(&DependencyTable::default(), &observed);
    assert_eq!(
      plan.actions,
      vec![SyncAction::Remove {
        id: "B".to_string(),
        path: "b".to_string(),
        relocated: false,
      }]
    );
    assert!(plan.actions[0].is_destructive());
  }

  #[test]
  fn converged_state_plans_nothing() {
    let desired = table(vec![
      entry("host/a", REV1, "third_party/a"),
      entry("infra/tool", "version:2@1.12.1.chromium.4", "bin"),
      entry("skia/tools/sk", &format!("git_revision:{}", REV2), "bin"),
    ]);

    let plan = compute_plan(&desired, &converged(&desired));
    assert!(plan.is_empty());
    assert_eq!(plan.unchanged, vec!["host/a", "infra/tool", "skia/tools/sk"]);
  }

  #[test]
  fn uppercase_pin_matches_lowercase_checkout() {
    let desired = table(vec![entry("A", &REV1.replace('1', "A"), "a")]);
    let mut observed = LocalCheckoutState::new();
    observed.insert("A", "a", Some(&REV1.replace('1', "a")));

    assert!(compute_plan(&desired, &observed).is_empty());
  }

  #[test]
  fn renamed_id_keeping_path_is_not_removed() {
    let desired = table(vec![entry("new/name", REV2, "third_party/x")]);
    let mut observed = LocalCheckoutState::new();
    observed.insert("old/name", "third_party/x", None);

    let plan = compute_plan(&desired, &observed);
    assert_eq!(plan.actions, vec![SyncAction::Fetch(entry("new/name", REV2, "third_party/x"))]);
    assert_eq!(plan.count("remove"), 0);
  }

  #[test]
  fn orphan_enclosing_a_live_checkout_is_not_removed() {
    let desired = table(vec![entry("A", REV1, "third_party/a")]);
    let mut observed = converged(&desired);
    observed.insert("old/parent", "third_party", None);
    observed.insert("old/sibling", "third_party/b", None);

    let plan = compute_plan(&desired, &observed);
    assert_eq!(
      plan.actions,
      vec![SyncAction::Remove {
        id: "old/sibling".to_string(),
        path: "third_party/b".to_string(),
        relocated: false,
      }]
    );
  }

  #[test]
  fn relocated_entry_removes_its_old_path() {
    let moved = entry("host/a", REV1, "third_party/new");
    let desired = table(vec![moved.clone()]);
    let mut observed = LocalCheckoutState::new();
    observed.insert_relocated("host/a", "third_party/old");

    let plan = compute_plan(&desired, &observed);
    assert_eq!(
      plan.actions,
      vec![
        SyncAction::Fetch(moved),
        SyncAction::Remove {
          id: "host/a".to_string(),
          path: "third_party/old".to_string(),
          relocated: true,
        },
      ]
    );
    assert_eq!(plan.actions[0].key(), "host/a");
    assert_eq!(plan.actions[1].key(), "host/a (third_party/old)");
  }

  #[test]
  fn relocation_into_own_subdirectory_keeps_old_path() {
    let desired = table(vec![entry("host/a", REV1, "third_party/a/src")]);
    let mut observed = converged(&desired);
    observed.insert_relocated("host/a", "third_party/a");

    assert!(compute_plan(&desired, &observed).is_empty());
  }

  #[test]
  fn actions_are_sorted_by_id() {
    let desired = table(vec![entry("c", REV1, "c"), entry("a", REV1, "a")]);
    let mut observed = LocalCheckoutState::new();
    observed.insert("b", "b", None);
    observed.insert("c", "c", Some(REV2));

    let plan = compute_plan(&desired, &observed);
    let ids: Vec<&str> = plan.actions.iter().map(|a| a.id()).collect();
    let kinds: Vec<&str> = plan.actions.iter().map(|a| a.kind()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(kinds, vec!["fetch", "remove", "update"]);
  }

  #[test]
  fn planning_is_deterministic() {
    let desired = table(vec![entry("a", REV1, "a"), entry("b", REV2, "b")]);
    let mut observed = LocalCheckoutState::new();
    observed.insert("b", "b", Some(REV1));
    observed.insert("z", "z", None);

    assert_eq!(compute_plan(&desired, &observed), compute_plan(&desired, &observed));
  }

  #[test]
  fn json_shape() {
    let desired = table(vec![entry("a", REV1, "a")]);
    let mut observed = LocalCheckoutState::new();
    observed.insert("z", "z", None);

    let json = serde_json::to_value(compute_plan(&desired, &observed)).unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "actions": [
          { "action": "fetch", "id": "a", "path": "a", "version": REV1 },
          { "action": "remove", "id": "z", "path": "z" },
        ],
        "unchanged": [],
      })
    );

    let mut moved = LocalCheckoutState::new();
    moved.insert_relocated("a", "old");
    let json = serde_json::to_value(compute_plan(&desired, &moved)).unwrap();
    assert_eq!(
      json["actions"][1],
      serde_json::json!({ "action": "remove", "id": "a", "path": "old", "relocated": true })
    );
  }
}
