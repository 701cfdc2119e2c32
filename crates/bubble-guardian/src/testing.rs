//! In-memory [`BlockchainProvider`] and [`DataServer`] doubles.
//!
//! Tests through the public trait rather than internals: the two
//! collaborator traits are narrow enough that an in-memory implementation of
//! each is the natural double. [`InMemoryBlockchainProvider`] is a settable
//! `(contract, signatory, path_hash) -> Permissions` table, and
//! [`InMemoryDataServer`] is a full (if non-durable) implementation of the
//! DataServer operation table, used both by this crate's own integration
//! tests and as the reference backend the `server` binary wires up out of
//! the box.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::blockchain_provider::{BlockchainProvider, ChainError};
use crate::data_server::{
    DataServer, DataServerError, DeleteOptions, EntryKind, ListEntry, ListOptions, SilentOption,
    SubscribeOptions, SubscribeResult,
};
use bubble_types::Permissions;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

/// A settable permissions table standing in for an Access Control Contract.
///
/// Entries not explicitly set answer with [`Permissions::none`] — the ACC's
/// "nobody may do anything" default, matching real ACC semantics where an
/// unrecognized `(signatory, path)` pair simply has no grant recorded.
pub struct InMemoryBlockchainProvider {
    chain_id: u64,
    grants: DashMap<(Address, Address, String), Permissions>,
    fail_next: std::sync::atomic::AtomicBool,
}

impl InMemoryBlockchainProvider {
    pub fn new(chain_id: u64) -> Self {
        InMemoryBlockchainProvider {
            chain_id,
            grants: DashMap::new(),
            fail_next: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Sets the permission word an `(contract, signatory, path_hash)` triple
    /// will answer with.
    pub fn grant(&self, contract: Address, signatory: Address, path_hash: impl Into<String>, permissions: Permissions) {
        self.grants.insert((contract, signatory, path_hash.into()), permissions);
    }

    /// Marks `contract`'s root as terminated for every signatory that
    /// already has a grant recorded against it, mirroring an ACC flipping
    /// its terminated bit chain-wide.
    pub fn terminate_bubble(&self, contract: Address, root_hash: &str) {
        for mut entry in self.grants.iter_mut() {
            let (c, _, hash) = entry.key().clone();
            if c == contract && hash == root_hash {
                *entry.value_mut() = entry.value().with_bubble_terminated(true);
            }
        }
    }

    /// Causes the next [`BlockchainProvider::get_permissions`] call to
    /// return [`ChainError::Transient`], for exercising the Guardian's
    /// "Blockchain unavailable" mapping to `INTERNAL_ERROR`.
    pub fn fail_next_lookup(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlockchainProvider for InMemoryBlockchainProvider {
    async fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_permissions(&self, contract: Address, signatory: Address, path_hash: &str) -> Result<Permissions, ChainError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ChainError::Transient);
        }
        Ok(self
            .grants
            .get(&(contract, signatory, path_hash.to_string()))
            .map(|entry| *entry.value())
            .unwrap_or_else(Permissions::none))
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    File { data: String },
    Directory { children: BTreeMap<String, String> },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    created: i64,
    modified: i64,
}

impl Node {
    fn entry_kind(&self) -> EntryKind {
        match self.kind {
            NodeKind::File { .. } => EntryKind::File,
            NodeKind::Directory { .. } => EntryKind::Directory,
        }
    }

    fn length(&self) -> u64 {
        match &self.kind {
            NodeKind::File { data } => data.len() as u64,
            NodeKind::Directory { children } => children.len() as u64,
        }
    }
}

struct Bubble {
    /// Keyed by full path string (`<hash>` for the root, `<hash>/<name>`
    /// for anything else).
    nodes: BTreeMap<String, Node>,
}

impl Bubble {
    fn new(root: String) -> Self {
        let now = now_ms();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            Node { kind: NodeKind::Directory { children: BTreeMap::new() }, created: now, modified: now },
        );
        Bubble { nodes }
    }

    fn split(path: &str) -> (&str, Option<&str>) {
        match path.split_once('/') {
            Some((hash, name)) => (hash, Some(name)),
            None => (path, None),
        }
    }

    fn parent_path(path: &str) -> &str {
        Self::split(path).0
    }

    fn name_component(path: &str) -> Option<&str> {
        Self::split(path).1
    }
}

/// A non-durable, process-local [`DataServer`].
///
/// One [`Bubble`] per contract address; each bubble is a flat map keyed by
/// the full path string rather than a real tree, which is sufficient for
/// this crate's one-level (`<hash>/<name>`) path grammar.
pub struct InMemoryDataServer {
    bubbles: DashMap<Address, Bubble>,
    subscriptions: DashMap<String, (Address, String)>,
}

impl Default for InMemoryDataServer {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDataServer {
    pub fn new() -> Self {
        InMemoryDataServer { bubbles: DashMap::new(), subscriptions: DashMap::new() }
    }

    fn root_hash() -> String {
        format!("0x{}", "0".repeat(64))
    }

    fn to_entry(path: &str, node: &Node, options: &ListOptions) -> ListEntry {
        ListEntry {
            name: path.to_string(),
            kind: node.entry_kind(),
            length: if options.long || options.length { Some(node.length()) } else { None },
            created: if options.long || options.created { Some(node.created) } else { None },
            modified: if options.long || options.modified { Some(node.modified) } else { None },
        }
    }

    fn passes_filters(node: &Node, entry_name: &str, options: &ListOptions) -> Result<bool, DataServerError> {
        if options.directory_only && !matches!(node.kind, NodeKind::Directory { .. }) {
            return Ok(false);
        }
        if let Some(pattern) = &options.matches {
            let re = regex::Regex::new(pattern).map_err(|e| DataServerError::InvalidOption(e.to_string()))?;
            if !re.is_match(entry_name) {
                return Ok(false);
            }
        }
        if let Some(after) = options.after {
            if node.modified <= after {
                return Ok(false);
            }
        }
        if let Some(before) = options.before {
            if node.modified >= before {
                return Ok(false);
            }
        }
        if let Some(after) = options.created_after {
            if node.created <= after {
                return Ok(false);
            }
        }
        if let Some(before) = options.created_before {
            if node.created >= before {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl DataServer for InMemoryDataServer {
    async fn create(&self, contract: Address, options: SilentOption) -> Result<(), DataServerError> {
        if self.bubbles.contains_key(&contract) {
            return if options.silent { Ok(()) } else { Err(DataServerError::BubbleAlreadyExists) };
        }
        self.bubbles.insert(contract, Bubble::new(Self::root_hash()));
        Ok(())
    }

    async fn write(&self, contract: Address, path: &str, data: &str) -> Result<(), DataServerError> {
        let mut bubble = self.bubbles.get_mut(&contract).ok_or(DataServerError::BubbleDoesNotExist)?;
        let now = now_ms();
        let is_new = !bubble.nodes.contains_key(path);
        bubble.nodes.insert(
            path.to_string(),
            Node { kind: NodeKind::File { data: data.to_string() }, created: now, modified: now },
        );
        if is_new {
            let parent = Bubble::parent_path(path).to_string();
            let name = Bubble::name_component(path).unwrap_or(path).to_string();
            bubble.nodes.entry(parent.clone()).or_insert_with(|| Node {
                kind: NodeKind::Directory { children: BTreeMap::new() },
                created: now,
                modified: now,
            });
            if let Some(parent_node) = bubble.nodes.get_mut(&parent) {
                if let NodeKind::Directory { children } = &mut parent_node.kind {
                    children.insert(name, path.to_string());
                }
                parent_node.modified = now;
            }
        } else {
            // Overwriting an existing file's content must not disturb the
            // parent directory's `modified` (list invariant).
            if let Some(node) = bubble.nodes.get_mut(path) {
                node.modified = now;
            }
        }
        Ok(())
    }

    async fn append(&self, contract: Address, path: &str, data: &str) -> Result<(), DataServerError> {
        let mut bubble = self.bubbles.get_mut(&contract).ok_or(DataServerError::BubbleDoesNotExist)?;
        let now = now_ms();
        if let Some(node) = bubble.nodes.get_mut(path) {
            if let NodeKind::File { data: existing } = &mut node.kind {
                existing.push_str(data);
                node.modified = now;
                return Ok(());
            }
        }
        drop(bubble);
        self.write(contract, path, data).await
    }

    async fn read(&self, contract: Address, path: &str, options: SilentOption) -> Result<String, DataServerError> {
        let bubble = self.bubbles.get(&contract).ok_or(DataServerError::BubbleDoesNotExist)?;
        match bubble.nodes.get(path) {
            Some(Node { kind: NodeKind::File { data }, .. }) => Ok(data.clone()),
            Some(Node { kind: NodeKind::Directory { .. }, .. }) => {
                drop(bubble);
                let entries = self.list(contract, path, ListOptions::default()).await?;
                Ok(serde_json::to_string(&entries).expect("entries always serialize"))
            }
            None if options.silent => Ok(String::new()),
            None => Err(DataServerError::FileDoesNotExist),
        }
    }

    async fn delete(&self, contract: Address, path: &str, options: DeleteOptions) -> Result<(), DataServerError> {
        let mut bubble = self.bubbles.get_mut(&contract).ok_or(DataServerError::BubbleDoesNotExist)?;
        if path == Self::root_hash() {
            return Err(DataServerError::Internal("the root cannot be deleted; use terminate".to_string()));
        }
        if !bubble.nodes.contains_key(path) {
            return if options.silent { Ok(()) } else { Err(DataServerError::FileDoesNotExist) };
        }
        let mut to_remove = vec![path.to_string()];
        let mut frontier = vec![path.to_string()];
        while let Some(current) = frontier.pop() {
            if let Some(Node { kind: NodeKind::Directory { children }, .. }) = bubble.nodes.get(&current) {
                for child in children.values() {
                    to_remove.push(child.clone());
                    frontier.push(child.clone());
                }
            }
        }
        for entry in &to_remove {
            bubble.nodes.remove(entry);
        }
        let now = now_ms();
        let parent = Bubble::parent_path(path).to_string();
        let name = Bubble::name_component(path).unwrap_or(path).to_string();
        if let Some(parent_node) = bubble.nodes.get_mut(&parent) {
            if let NodeKind::Directory { children } = &mut parent_node.kind {
                children.remove(&name);
            }
            parent_node.modified = now;
        }
        Ok(())
    }

    async fn mkdir(&self, contract: Address, path: &str, options: SilentOption) -> Result<(), DataServerError> {
        let mut bubble = self.bubbles.get_mut(&contract).ok_or(DataServerError::BubbleDoesNotExist)?;
        if bubble.nodes.contains_key(path) {
            return if options.silent { Ok(()) } else { Err(DataServerError::DirectoryAlreadyExists) };
        }
        let now = now_ms();
        bubble.nodes.insert(path.to_string(), Node { kind: NodeKind::Directory { children: BTreeMap::new() }, created: now, modified: now });
        let parent = Bubble::parent_path(path).to_string();
        // A bare-hash directory's own hash is both its "parent" and itself
        // per `Bubble::split` — never link it as its own child, or deletes
        // cascade forever and listings show a self-referencing entry.
        if parent != path {
            let name = Bubble::name_component(path).unwrap_or(path).to_string();
            if let Some(parent_node) = bubble.nodes.get_mut(&parent) {
                if let NodeKind::Directory { children } = &mut parent_node.kind {
                    children.insert(name, path.to_string());
                }
                parent_node.modified = now;
            }
        }
        Ok(())
    }

    async fn list(&self, contract: Address, path: &str, options: ListOptions) -> Result<Vec<ListEntry>, DataServerError> {
        let bubble = self.bubbles.get(&contract).ok_or(DataServerError::BubbleDoesNotExist)?;
        let node = match bubble.nodes.get(path) {
            Some(node) => node,
            None if options.silent => return Ok(Vec::new()),
            None => return Err(DataServerError::FileDoesNotExist),
        };
        let children = match &node.kind {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => return Err(DataServerError::FileDoesNotExist),
        };
        if options.directory_only {
            return Ok(vec![Self::to_entry(path, node, &options)]);
        }
        let mut out = Vec::new();
        for (name, child_path) in children {
            if let Some(child) = bubble.nodes.get(child_path) {
                if Self::passes_filters(child, name, &options)? {
                    out.push(Self::to_entry(child_path, child, &options));
                }
            }
        }
        Ok(out)
    }

    async fn subscribe(&self, contract: Address, path: &str, subscription_id: &str, options: SubscribeOptions) -> Result<SubscribeResult, DataServerError> {
        let bubble = self.bubbles.get(&contract).ok_or(DataServerError::BubbleDoesNotExist)?;
        let node = bubble.nodes.get(path).ok_or(DataServerError::FileDoesNotExist)?;
        let file = Self::to_entry(path, node, &ListOptions { long: true, ..Default::default() });
        let list = if options.list && matches!(node.kind, NodeKind::Directory { .. }) {
            drop(bubble);
            Some(self.list(contract, path, ListOptions::default()).await?)
        } else {
            None
        };
        let data = if options.read {
            if let NodeKind::File { data } = &node.kind { Some(data.clone()) } else { None }
        } else {
            None
        };
        self.subscriptions.insert(subscription_id.to_string(), (contract, path.to_string()));
        Ok(SubscribeResult { subscription_id: subscription_id.to_string(), file, list, data })
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), DataServerError> {
        self.subscriptions.remove(subscription_id);
        Ok(())
    }

    async fn terminate(&self, contract: Address, options: SilentOption) -> Result<(), DataServerError> {
        if self.bubbles.remove(&contract).is_none() && !options.silent {
            return Err(DataServerError::BubbleDoesNotExist);
        }
        Ok(())
    }
}
