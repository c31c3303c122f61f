//! A persistent trie keyed by bytes.
//!
//! Every mutation returns a new trie; nodes off the mutated path are shared
//! with the previous version, so old tries remain valid and readable. Values
//! are stored type-erased and recovered with a checked downcast, making a
//! lookup with the wrong type a miss rather than a misread.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

type ValueRef = Arc<dyn Any + Send + Sync>;

/// A single trie node. A node may carry a value, children, or both; nodes
/// carrying neither are pruned on removal.
#[derive(Default, Clone)]
struct TrieNode {
    children: BTreeMap<u8, Arc<TrieNode>>,
    value: Option<ValueRef>,
}

/// An immutable map from byte strings to values of arbitrary types.
///
/// Cloning a trie is cheap (it clones the root pointer); concurrent readers
/// of any version are safe by construction.
#[derive(Default, Clone)]
pub struct Trie {
    root: Option<Arc<TrieNode>>,
}

impl Trie {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Looks up a key. Returns None when the key is absent, when the
    /// terminal node carries no value, or when the stored value is not a
    /// `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &[u8]) -> Option<&T> {
        let mut node = self.root.as_ref()?;
        for byte in key {
            node = node.children.get(byte)?;
        }
        node.value.as_ref()?.downcast_ref::<T>()
    }

    /// Returns a new trie with `value` stored at `key`. The path from the
    /// root to the terminal is freshly allocated; everything else is shared
    /// with `self`. An empty key stores at the root, keeping its children.
    pub fn put<T: Send + Sync + 'static>(&self, key: &[u8], value: T) -> Trie {
        let value: ValueRef = Arc::new(value);
        let new_root = Self::put_node(self.root.as_deref(), key, value);
        Trie {
            root: Some(Arc::new(new_root)),
        }
    }

    fn put_node(node: Option<&TrieNode>, key: &[u8], value: ValueRef) -> TrieNode {
        // Cloning copies the children map of Arc pointers: the subtrees
        // themselves stay shared
        let mut new_node = node.cloned().unwrap_or_default();
        match key.split_first() {
            None => new_node.value = Some(value),
            Some((byte, rest)) => {
                let child = new_node.children.get(byte).map(|c| c.as_ref());
                let new_child = Self::put_node(child, rest, value);
                new_node.children.insert(*byte, Arc::new(new_child));
            }
        }
        new_node
    }

    /// Returns a new trie without `key`. When the key holds no value the
    /// original trie is returned unchanged (sharing its root). Nodes left
    /// with neither value nor children are pruned on the way back up.
    pub fn remove(&self, key: &[u8]) -> Trie {
        let Some(root) = self.root.as_ref() else {
            return self.clone();
        };
        if !Self::contains(root, key) {
            return self.clone();
        }
        Trie {
            root: Self::remove_node(root, key).map(Arc::new),
        }
    }

    fn contains(node: &TrieNode, key: &[u8]) -> bool {
        match key.split_first() {
            None => node.value.is_some(),
            Some((byte, rest)) => node
                .children
                .get(byte)
                .map_or(false, |child| Self::contains(child, rest)),
        }
    }

    fn remove_node(node: &TrieNode, key: &[u8]) -> Option<TrieNode> {
        let mut new_node = node.clone();
        match key.split_first() {
            None => new_node.value = None,
            Some((byte, rest)) => {
                let child = node
                    .children
                    .get(byte)
                    .expect("presence checked before removal");
                match Self::remove_node(child, rest) {
                    Some(new_child) => {
                        new_node.children.insert(*byte, Arc::new(new_child));
                    }
                    None => {
                        new_node.children.remove(byte);
                    }
                }
            }
        }
        if new_node.value.is_none() && new_node.children.is_empty() {
            None
        } else {
            Some(new_node)
        }
    }
}
