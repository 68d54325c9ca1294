//! Full contents of both namespaces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Namespace;

/// Key -> document mapping of a single namespace.
pub type Documents = BTreeMap<String, Value>;

/// Both namespaces, as served by `GET /data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Documents,
    #[serde(default)]
    pub bids: Documents,
}

impl Snapshot {
    pub fn namespace(&self, ns: Namespace) -> &Documents {
        match ns {
            Namespace::Users => &self.users,
            Namespace::Bids => &self.bids,
        }
    }

    pub fn namespace_mut(&mut self, ns: Namespace) -> &mut Documents {
        match ns {
            Namespace::Users => &mut self.users,
            Namespace::Bids => &mut self.bids,
        }
    }

    /// Overwrite every local key whose value is absent or differs from
    /// `leader`.  Keys that only exist locally are kept.
    ///
    /// Returns the number of keys that changed.
    pub fn merge_from(&mut self, leader: &Snapshot) -> usize {
        let mut changed = 0;
        for ns in Namespace::ALL {
            let local = self.namespace_mut(ns);
            for (key, value) in leader.namespace(ns) {
                if local.get(key) != Some(value) {
                    local.insert(key.clone(), value.clone());
                    changed += 1;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_leader_wins_and_keeps_local_only_keys() {
        let mut local = Snapshot::default();
        local.bids.insert("a1".into(), json!({"highest_bid": 5}));
        local.bids.insert("local-only".into(), json!({"highest_bid": 1}));

        let mut leader = Snapshot::default();
        leader.bids.insert("a1".into(), json!({"highest_bid": 9}));
        leader.users.insert("alice".into(), json!({"password": "pw"}));

        let changed = local.merge_from(&leader);

        assert_eq!(changed, 2);
        assert_eq!(local.bids["a1"], json!({"highest_bid": 9}));
        assert_eq!(local.bids["local-only"], json!({"highest_bid": 1}));
        assert_eq!(local.users["alice"], json!({"password": "pw"}));
    }

    #[test]
    fn test_merge_identical_is_noop() {
        let mut leader = Snapshot::default();
        leader.users.insert("bob".into(), json!({"password": "x"}));
        let mut local = leader.clone();

        assert_eq!(local.merge_from(&leader), 0);
        assert_eq!(local, leader);
    }

    #[test]
    fn test_deserialize_missing_namespace_defaults_empty() {
        let snap: Snapshot = serde_json::from_str(r#"{"bids": {"a1": {}}}"#).unwrap();
        assert!(snap.users.is_empty());
        assert_eq!(snap.bids.len(), 1);
    }
}
