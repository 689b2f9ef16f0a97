//! Cache index builder (§2 item 10): at startup, materializes auxiliary
//! lookup structures — the stat-var group tree and a stat-var search
//! index — from the store facade; refreshed on overlay swap when
//! `use_search_index` is configured.

use crate::codec::Triple;
use crate::dcid::Dcid;
use crate::key;
use crate::store::{RowSet, StoreFacade};
use std::collections::HashMap;
use std::sync::RwLock;

/// One node of the stat-var group tree, derived from the `specializationOf`
/// / `member` predicates on a group's `triples/` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatVarGroupNode {
    pub id: String,
    pub name: String,
    pub parent_groups: Vec<String>,
    pub child_groups: Vec<String>,
    pub child_stat_vars: Vec<String>,
}

/// Materialized auxiliary structures (§2 item 10), rebuildable on overlay
/// swap. Guarded by a `RwLock` the same way the teacher's `IndexManager`
/// guards its property indices — readers take a shared lock, rebuilds
/// take an exclusive one, matching the low-churn nature of this data (it
/// only changes on an overlay reload, never per-request).
#[derive(Default)]
pub struct CacheIndex {
    inner: RwLock<CacheIndexData>,
}

#[derive(Default, Clone)]
struct CacheIndexData {
    group_tree: HashMap<String, StatVarGroupNode>,
    /// Lowercased word -> stat-var-group ids whose name contains that word.
    search_index: HashMap<String, Vec<String>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, id: &str) -> Option<StatVarGroupNode> {
        self.inner.read().unwrap().group_tree.get(id).cloned()
    }

    pub fn search(&self, term: &str) -> Vec<String> {
        let term = term.to_lowercase();
        self.inner
            .read()
            .unwrap()
            .search_index
            .get(&term)
            .cloned()
            .unwrap_or_default()
    }

    /// Rebuild both structures from the store facade's current view
    /// (overlay and persistent instances unioned via §4.4's
    /// `merge_concat`, since a group's `specializationOf`/`member` arcs
    /// can be split across sources and every arc must be visible in the
    /// tree), replacing the old data atomically behind the write lock.
    pub async fn rebuild(&self, facade: &StoreFacade, group_root_ids: &[Dcid]) -> Result<(), crate::error::MixerError> {
        let keys = key::triples(group_root_ids);
        let row_set = RowSet::Keys(keys.keys.clone());
        let tokens = keys.tokens.clone();
        let result = facade
            .fan_out(
                row_set,
                |_k, bytes| crate::codec::decode_triples(bytes).map(|r| r.triples),
                move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
            )
            .await?;
        let merged = StoreFacade::merge_concat(&result);

        let mut group_tree = HashMap::new();
        for (token, triples) in &merged {
            let id = token.to_string();
            let node = build_node(&id, triples);
            group_tree.insert(id, node);
        }
        let search_index = build_search_index(&group_tree);

        let mut guard = self.inner.write().unwrap();
        *guard = CacheIndexData {
            group_tree,
            search_index,
        };
        Ok(())
    }
}

fn build_node(id: &str, triples: &[Triple]) -> StatVarGroupNode {
    let mut node = StatVarGroupNode {
        id: id.to_string(),
        ..Default::default()
    };
    for t in triples {
        match t.predicate.as_str() {
            "name" => {
                if let Some(name) = &t.object_value {
                    node.name = name.clone();
                } else if let Some(name) = &t.object_name {
                    node.name = name.clone();
                }
            }
            "specializationOf" => {
                if let Some(parent) = &t.object_id {
                    node.parent_groups.push(parent.clone());
                }
            }
            "member" => {
                if let Some(member) = &t.object_id {
                    if t.object_types.iter().any(|ty| ty == "StatVarGroup") {
                        node.child_groups.push(member.clone());
                    } else {
                        node.child_stat_vars.push(member.clone());
                    }
                }
            }
            _ => {}
        }
    }
    node
}

fn build_search_index(group_tree: &HashMap<String, StatVarGroupNode>) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for node in group_tree.values() {
        for word in node.name.split_whitespace() {
            let word = word.to_lowercase();
            if word.is_empty() {
                continue;
            }
            index.entry(word).or_default().push(node.id.clone());
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_index_tokenizes_group_names() {
        let mut tree = HashMap::new();
        tree.insert(
            "dc/g/Demographics".to_string(),
            StatVarGroupNode {
                id: "dc/g/Demographics".to_string(),
                name: "Demographics Population".to_string(),
                ..Default::default()
            },
        );
        let index = build_search_index(&tree);
        assert_eq!(index.get("population").unwrap(), &vec!["dc/g/Demographics".to_string()]);
    }
}
