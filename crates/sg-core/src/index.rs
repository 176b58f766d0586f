//! Pattern Index
//!
//! A reversed-label domain trie mapping match patterns to payloads. Lookup cost
//! is proportional to the number of labels in the URL host plus the size of
//! the buckets visited, independent of how many patterns are stored.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; bucket entries are
//! addressed by stable slots so a single entry can be retracted with
//! [`PatternIndex::remove`] without disturbing any other handle.
//!
//! # Serialized form
//!
//! ```text
//! index  = [allUrls, rootWildcard, rootChildren?]
//! node   = [exact, wildcard, children?]
//! entry  = [payload] | [payload, scheme] | [payload, scheme, path]
//! ```
//!
//! `allUrls` holds bare payloads. Children are a map keyed by label and are
//! omitted when empty; entry fields equal to `"*"` / `"/*"` are omitted from
//! the end.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserialize, Deserializer, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::pattern::{path_matches, scheme_matches, MatchPattern, PatternError, ANY_PATH, ANY_SCHEME};
use crate::url::{is_web_scheme, reversed_labels, UrlParts};

/// Arena index of a trie node.
pub type NodeId = usize;

const ROOT: NodeId = 0;

// =============================================================================
// Entries and Handles
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BucketKind {
    AllUrls,
    Exact,
    Wildcard,
}

/// Stable reference to one inserted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    node: NodeId,
    bucket: BucketKind,
    slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry<T> {
    value: T,
    scheme: String,
    path: String,
}

impl<T> Entry<T> {
    fn bare(value: T) -> Self {
        Self {
            value,
            scheme: ANY_SCHEME.to_string(),
            path: ANY_PATH.to_string(),
        }
    }

    #[inline]
    fn matches(&self, url: &UrlParts) -> bool {
        scheme_matches(&self.scheme, &url.scheme) && path_matches(&self.path, &url.path_and_query)
    }
}

/// Removed entries leave a `None` behind so later slots keep their position.
type Bucket<T> = Vec<Option<Entry<T>>>;

#[derive(Debug, Clone)]
struct Node<T> {
    exact: Bucket<T>,
    wildcard: Bucket<T>,
    children: BTreeMap<String, NodeId>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            exact: Vec::new(),
            wildcard: Vec::new(),
            children: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Pattern Index
// =============================================================================

/// Match pattern -> payload index.
#[derive(Debug, Clone)]
pub struct PatternIndex<T> {
    all_urls: Bucket<T>,
    nodes: Vec<Node<T>>,
    len: usize,
}

impl<T> Default for PatternIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PatternIndex<T> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            all_urls: Vec::new(),
            nodes: vec![Node::default()],
            len: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Parse `pattern` and insert `value` under it.
    pub fn insert(&mut self, pattern: &str, value: T) -> Result<EntryHandle, PatternError> {
        let parsed: MatchPattern = pattern.parse()?;
        self.insert_pattern(&parsed, value)
    }

    /// Insert `value` under an already parsed pattern.
    ///
    /// Only `*`, `http` and `https` schemes are served.
    pub fn insert_pattern(&mut self, pattern: &MatchPattern, value: T) -> Result<EntryHandle, PatternError> {
        let (scheme, host, path) = match pattern {
            MatchPattern::AllUrls => {
                self.all_urls.push(Some(Entry::bare(value)));
                self.len += 1;
                return Ok(EntryHandle {
                    node: ROOT,
                    bucket: BucketKind::AllUrls,
                    slot: self.all_urls.len() - 1,
                });
            }
            MatchPattern::Url { scheme, host, path } => (scheme, host, path),
        };

        if scheme != ANY_SCHEME && !is_web_scheme(scheme) {
            return Err(PatternError::UnsupportedScheme(scheme.clone()));
        }

        let (domain, wildcard) = host.domain();
        let mut node = ROOT;
        for label in reversed_labels(domain) {
            node = self.child_or_insert(node, label);
        }

        let entry = Entry {
            value,
            scheme: scheme.clone(),
            path: path.clone(),
        };
        let (bucket, kind) = if wildcard {
            (&mut self.nodes[node].wildcard, BucketKind::Wildcard)
        } else {
            (&mut self.nodes[node].exact, BucketKind::Exact)
        };
        bucket.push(Some(entry));
        self.len += 1;

        Ok(EntryHandle {
            node,
            bucket: kind,
            slot: bucket.len() - 1,
        })
    }

    fn child_or_insert(&mut self, node: NodeId, label: &str) -> NodeId {
        if let Some(&child) = self.nodes[node].children.get(label) {
            return child;
        }
        let child = self.nodes.len();
        self.nodes.push(Node::default());
        self.nodes[node].children.insert(label.to_string(), child);
        child
    }

    fn bucket(&self, handle: EntryHandle) -> Option<&Bucket<T>> {
        match handle.bucket {
            BucketKind::AllUrls => Some(&self.all_urls),
            BucketKind::Exact => self.nodes.get(handle.node).map(|n| &n.exact),
            BucketKind::Wildcard => self.nodes.get(handle.node).map(|n| &n.wildcard),
        }
    }

    fn bucket_mut(&mut self, handle: EntryHandle) -> Option<&mut Bucket<T>> {
        match handle.bucket {
            BucketKind::AllUrls => Some(&mut self.all_urls),
            BucketKind::Exact => self.nodes.get_mut(handle.node).map(|n| &mut n.exact),
            BucketKind::Wildcard => self.nodes.get_mut(handle.node).map(|n| &mut n.wildcard),
        }
    }

    /// Payload behind a handle, if it has not been removed.
    pub fn get(&self, handle: EntryHandle) -> Option<&T> {
        self.bucket(handle)?
            .get(handle.slot)?
            .as_ref()
            .map(|entry| &entry.value)
    }

    /// Retract one entry. Returns its payload, or `None` if it was already gone.
    pub fn remove(&mut self, handle: EntryHandle) -> Option<T> {
        let removed = self.bucket_mut(handle)?.get_mut(handle.slot)?.take()?;
        self.len -= 1;
        Some(removed.value)
    }

    /// All live entries with their handles.
    pub fn entries(&self) -> impl Iterator<Item = (EntryHandle, &T)> + '_ {
        let all_urls = live(&self.all_urls).map(|(slot, value)| {
            (EntryHandle { node: ROOT, bucket: BucketKind::AllUrls, slot }, value)
        });
        let nodes = self.nodes.iter().enumerate().flat_map(|(node, n)| {
            let exact = live(&n.exact).map(move |(slot, value)| {
                (EntryHandle { node, bucket: BucketKind::Exact, slot }, value)
            });
            let wildcard = live(&n.wildcard).map(move |(slot, value)| {
                (EntryHandle { node, bucket: BucketKind::Wildcard, slot }, value)
            });
            exact.chain(wildcard)
        });
        all_urls.chain(nodes)
    }

    /// Every payload whose pattern matches `url`. Order is unspecified.
    pub fn lookup(&self, url: &str) -> Vec<&T> {
        match UrlParts::parse(url) {
            Some(parts) => self.lookup_parts(&parts),
            None => Vec::new(),
        }
    }

    /// [`lookup`](Self::lookup) on a pre-parsed URL.
    pub fn lookup_parts(&self, url: &UrlParts) -> Vec<&T> {
        let mut matches = Vec::new();
        if !url.is_web() {
            return matches;
        }

        matches.extend(live(&self.all_urls).map(|(_, value)| value));

        let mut node = &self.nodes[ROOT];
        collect(&node.wildcard, url, &mut matches);

        for label in reversed_labels(&url.host) {
            match node.children.get(label) {
                Some(&child) => {
                    node = &self.nodes[child];
                    collect(&node.wildcard, url, &mut matches);
                }
                None => {
                    log::trace!("lookup for {} stopped at label {}", url.host, label);
                    return matches;
                }
            }
        }

        collect(&node.exact, url, &mut matches);
        matches
    }
}

fn live<T>(bucket: &Bucket<T>) -> impl Iterator<Item = (usize, &T)> {
    bucket
        .iter()
        .enumerate()
        .filter_map(|(slot, entry)| entry.as_ref().map(|e| (slot, &e.value)))
}

#[inline]
fn collect<'a, T>(bucket: &'a Bucket<T>, url: &UrlParts, out: &mut Vec<&'a T>) {
    for entry in bucket.iter().flatten() {
        if entry.matches(url) {
            out.push(&entry.value);
        }
    }
}

// =============================================================================
// Serialization
// =============================================================================

struct EntryRef<'a, T>(&'a Entry<T>);

impl<T: Serialize> Serialize for EntryRef<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entry = self.0;
        let fields = if entry.path != ANY_PATH {
            3
        } else if entry.scheme != ANY_SCHEME {
            2
        } else {
            1
        };
        let mut seq = serializer.serialize_seq(Some(fields))?;
        seq.serialize_element(&entry.value)?;
        if fields >= 2 {
            seq.serialize_element(&entry.scheme)?;
        }
        if fields == 3 {
            seq.serialize_element(&entry.path)?;
        }
        seq.end()
    }
}

struct BucketRef<'a, T>(&'a Bucket<T>);

impl<T: Serialize> Serialize for BucketRef<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.iter().flatten().count()))?;
        for entry in self.0.iter().flatten() {
            seq.serialize_element(&EntryRef(entry))?;
        }
        seq.end()
    }
}

struct ChildrenRef<'a, T> {
    index: &'a PatternIndex<T>,
    children: &'a BTreeMap<String, NodeId>,
}

impl<T: Serialize> Serialize for ChildrenRef<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.children.len()))?;
        for (label, &node) in self.children {
            map.serialize_entry(label, &NodeRef { index: self.index, node })?;
        }
        map.end()
    }
}

struct NodeRef<'a, T> {
    index: &'a PatternIndex<T>,
    node: NodeId,
}

impl<T: Serialize> Serialize for NodeRef<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = &self.index.nodes[self.node];
        let has_children = !node.children.is_empty();
        let mut seq = serializer.serialize_seq(Some(if has_children { 3 } else { 2 }))?;
        seq.serialize_element(&BucketRef(&node.exact))?;
        seq.serialize_element(&BucketRef(&node.wildcard))?;
        if has_children {
            seq.serialize_element(&ChildrenRef { index: self.index, children: &node.children })?;
        }
        seq.end()
    }
}

impl<T: Serialize> Serialize for PatternIndex<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let root = &self.nodes[ROOT];
        let has_children = !root.children.is_empty();
        let mut seq = serializer.serialize_seq(Some(if has_children { 3 } else { 2 }))?;
        let all_urls: Vec<&T> = live(&self.all_urls).map(|(_, value)| value).collect();
        seq.serialize_element(&all_urls)?;
        seq.serialize_element(&BucketRef(&root.wildcard))?;
        if has_children {
            seq.serialize_element(&ChildrenRef { index: self, children: &root.children })?;
        }
        seq.end()
    }
}

/// `[payload, scheme?, path?]`
struct RawEntry<T>(Entry<T>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RawEntry<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntryVisitor<T> {
            type Value = RawEntry<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an index entry [payload, scheme?, path?]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let value = seq
                    .next_element::<T>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let scheme = seq.next_element::<String>()?.unwrap_or_else(|| ANY_SCHEME.to_string());
                let path = seq.next_element::<String>()?.unwrap_or_else(|| ANY_PATH.to_string());
                Ok(RawEntry(Entry { value, scheme, path }))
            }
        }

        deserializer.deserialize_seq(EntryVisitor(PhantomData))
    }
}

/// `[first, wildcard, children?]` where `first` is the exact bucket for inner
/// nodes and the bare all-URLs list for the root.
struct RawNode<A, T> {
    first: Vec<A>,
    wildcard: Vec<RawEntry<T>>,
    children: BTreeMap<String, RawNode<RawEntry<T>, T>>,
}

impl<'de, A: Deserialize<'de>, T: Deserialize<'de>> Deserialize<'de> for RawNode<A, T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeVisitor<A, T>(PhantomData<(A, T)>);

        impl<'de, A: Deserialize<'de>, T: Deserialize<'de>> Visitor<'de> for NodeVisitor<A, T> {
            type Value = RawNode<A, T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an index node [exact, wildcard, children?]")
            }

            fn visit_seq<S: SeqAccess<'de>>(self, mut seq: S) -> Result<Self::Value, S::Error> {
                let first = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let wildcard = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let children = seq.next_element()?.unwrap_or_default();
                Ok(RawNode { first, wildcard, children })
            }
        }

        deserializer.deserialize_seq(NodeVisitor(PhantomData))
    }
}

impl<T> PatternIndex<T> {
    fn fill(&mut self, node: NodeId, wildcard: Vec<RawEntry<T>>, children: BTreeMap<String, RawNode<RawEntry<T>, T>>) {
        self.len += wildcard.len();
        self.nodes[node].wildcard = wildcard.into_iter().map(|raw| Some(raw.0)).collect();

        for (label, child) in children {
            let id = self.child_or_insert(node, &label);
            self.len += child.first.len();
            self.nodes[id].exact = child.first.into_iter().map(|raw| Some(raw.0)).collect();
            self.fill(id, child.wildcard, child.children);
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for PatternIndex<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawNode::<T, T>::deserialize(deserializer)?;
        let mut index = Self::new();
        index.len = raw.first.len();
        index.all_urls = raw.first.into_iter().map(|value| Some(Entry::bare(value))).collect();
        index.fill(ROOT, raw.wildcard, raw.children);
        Ok(index)
    }
}
