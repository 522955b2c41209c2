//! Incremental dependency-graph cache and builder.
//!
//! Three keys per namespace: the serialized graph, the head commit it was
//! built at, and a `path → blob sha` hash used to diff against a freshly
//! fetched tree. Builds are single-flight per namespace in-process;
//! cross-process racers both derive their writes from the same head, so
//! last-writer-wins stays coherent.

use super::extractor::{ImportExtractor, SupportedLanguage};
use super::models::{DependencyGraph, GraphEdge, GraphMetadata, GraphNode, GraphView};
use super::resolver::resolve_import;
use crate::error::RelayError;
use crate::github::{RepoCoordinates, RepoHost, TreeEntry};
use crate::identity::now_ms;
use crate::kv::{KvScript, KvStore};
use crate::locks::LockRegistry;
use crate::Namespace;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Graph cache and builder for all namespaces.
pub struct GraphService {
    kv: Arc<dyn KvStore>,
    host: Arc<dyn RepoHost>,
    locks: Arc<LockRegistry>,
    extractor: Arc<dyn ImportExtractor>,
    /// Per-namespace build gates. Concurrent callers serialize here and
    /// late arrivals are satisfied from the freshly written cache.
    builds: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GraphService {
    pub fn new(
        kv: Arc<dyn KvStore>,
        host: Arc<dyn RepoHost>,
        locks: Arc<LockRegistry>,
        extractor: Arc<dyn ImportExtractor>,
    ) -> Self {
        Self {
            kv,
            host,
            locks,
            extractor,
            builds: Mutex::new(HashMap::new()),
        }
    }

    /// The stored graph without any remote call, or `None` when absent or
    /// unparsable.
    pub async fn cached_graph(&self, ns: &Namespace) -> Result<Option<DependencyGraph>, RelayError> {
        let Some(raw) = self.kv.get(&ns.graph_key()).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(graph) => Ok(Some(graph)),
            Err(e) => {
                tracing::warn!(namespace = %ns, error = %e, "cached graph unparsable");
                Ok(None)
            }
        }
    }

    /// The stored graph overlaid with a fresh lock snapshot.
    pub async fn get_cached(&self, ns: &Namespace) -> Result<Option<GraphView>, RelayError> {
        let Some(graph) = self.cached_graph(ns).await? else {
            return Ok(None);
        };
        let locks = self.locks.list(ns, now_ms()).await?;
        Ok(Some(GraphView::new(graph, locks)))
    }

    /// Compare the live branch head to the head the stored graph was built
    /// at. Returns `(current_head, stored_head)`.
    pub async fn needs_update(
        &self,
        ns: &Namespace,
        coords: &RepoCoordinates,
    ) -> Result<(String, Option<String>), RelayError> {
        let head = self
            .host
            .branch_head(&coords.owner, &coords.repo, &ns.branch)
            .await?;
        let stored = self.kv.get(&ns.graph_meta_key()).await?;
        Ok((head, stored))
    }

    /// Build (or refresh) the graph for a namespace.
    ///
    /// Single-flight per namespace. Without `force`, a branch that has not
    /// moved short-circuits to the cached graph.
    pub async fn generate(
        &self,
        ns: &Namespace,
        coords: &RepoCoordinates,
        force: bool,
    ) -> Result<GraphView, RelayError> {
        let gate = {
            let mut builds = self.builds.lock().await;
            builds
                .entry(ns.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = gate.lock().await;

        let head = self
            .host
            .branch_head(&coords.owner, &coords.repo, &ns.branch)
            .await?;

        if !force {
            let stored_head = self.kv.get(&ns.graph_meta_key()).await?;
            if stored_head.as_deref() == Some(head.as_str()) {
                if let Some(view) = self.get_cached(ns).await? {
                    return Ok(view);
                }
            }
        }

        let graph = self.build(ns, coords, &head).await?;
        let locks = self.locks.list(ns, now_ms()).await?;
        Ok(GraphView::new(graph, locks))
    }

    async fn build(
        &self,
        ns: &Namespace,
        coords: &RepoCoordinates,
        head: &str,
    ) -> Result<DependencyGraph, RelayError> {
        let tree: Vec<TreeEntry> = self
            .host
            .recursive_tree(&coords.owner, &coords.repo, head)
            .await?
            .into_iter()
            .filter(|e| e.is_blob() && SupportedLanguage::from_path(&e.path).is_some())
            .collect();

        let tree_by_path: HashMap<&str, &TreeEntry> =
            tree.iter().map(|e| (e.path.as_str(), e)).collect();
        let known_paths: HashSet<String> = tree.iter().map(|e| e.path.clone()).collect();

        let stored_shas = self.kv.hgetall(&ns.file_shas_key()).await?;

        let mut new_files = BTreeSet::new();
        let mut changed = BTreeSet::new();
        for entry in &tree {
            match stored_shas.get(&entry.path) {
                None => {
                    new_files.insert(entry.path.clone());
                }
                Some(sha) if *sha != entry.sha => {
                    changed.insert(entry.path.clone());
                }
                Some(_) => {}
            }
        }
        let deleted: BTreeSet<String> = stored_shas
            .keys()
            .filter(|path| !known_paths.contains(*path))
            .cloned()
            .collect();

        let existing = self.cached_graph(ns).await?;
        let diff_empty = new_files.is_empty() && changed.is_empty() && deleted.is_empty();
        // A lingering SHA map next to an empty node set means the cache is
        // corrupted; rebuild from scratch.
        let full_rebuild = match &existing {
            None => true,
            Some(graph) => !tree.is_empty() && graph.nodes.is_empty() && diff_empty,
        };

        let mut nodes: HashMap<String, GraphNode> = HashMap::new();
        let mut edges: HashMap<String, GraphEdge> = HashMap::new();
        let files_to_process: BTreeSet<String> = if full_rebuild {
            known_paths.iter().cloned().collect()
        } else {
            if let Some(graph) = existing {
                for node in graph.nodes {
                    if !deleted.contains(&node.id) {
                        nodes.insert(node.id.clone(), node);
                    }
                }
                for edge in graph.edges {
                    if deleted.contains(&edge.source) || deleted.contains(&edge.target) {
                        continue;
                    }
                    // Outgoing edges of changed files are rebuilt below.
                    if changed.contains(&edge.source) {
                        continue;
                    }
                    edges.insert(edge.key(), edge);
                }
            }
            new_files.union(&changed).cloned().collect()
        };

        for path in &files_to_process {
            let content = match self
                .host
                .blob_content(&coords.owner, &coords.repo, path, head)
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(namespace = %ns, %path, error = %e, "blob fetch failed, skipping file");
                    continue;
                }
            };

            nodes.insert(path.clone(), node_for(path, &tree_by_path));

            for reference in self.extractor.extract(&content, path) {
                let Some(target) = resolve_import(path, &reference, &known_paths) else {
                    continue;
                };
                nodes
                    .entry(target.clone())
                    .or_insert_with(|| node_for(&target, &tree_by_path));
                let edge = GraphEdge::import(path.clone(), target);
                edges.entry(edge.key()).or_insert(edge);
            }
        }

        let mut graph = DependencyGraph {
            nodes: nodes.into_values().collect(),
            edges: edges.into_values().collect(),
            version: head.to_string(),
            metadata: GraphMetadata {
                generated_at_ms: now_ms(),
                files_processed: files_to_process.len() as u64,
                edges_found: 0,
            },
        };
        graph.metadata.edges_found = graph.edges.len() as u64;
        graph.sort();

        self.commit(ns, &graph, head, &deleted, &tree).await?;

        tracing::info!(
            namespace = %ns,
            version = %head,
            files_processed = graph.metadata.files_processed,
            edges = graph.metadata.edges_found,
            full_rebuild,
            "dependency graph updated"
        );
        Ok(graph)
    }

    /// Publish graph, meta, and the SHA-map delta in one atomic step.
    async fn commit(
        &self,
        ns: &Namespace,
        graph: &DependencyGraph,
        head: &str,
        deleted: &BTreeSet<String>,
        tree: &[TreeEntry],
    ) -> Result<(), RelayError> {
        let graph_json =
            serde_json::to_string(graph).map_err(|e| RelayError::Internal(anyhow::anyhow!(e)))?;

        let mut args = vec![graph_json, head.to_string(), deleted.len().to_string()];
        args.extend(deleted.iter().cloned());
        for entry in tree {
            args.push(entry.path.clone());
            args.push(entry.sha.clone());
        }

        self.kv
            .eval(
                KvScript::CommitGraph,
                &[ns.graph_key(), ns.graph_meta_key(), ns.file_shas_key()],
                &args,
            )
            .await?;
        Ok(())
    }
}

fn node_for(path: &str, tree_by_path: &HashMap<&str, &TreeEntry>) -> GraphNode {
    GraphNode {
        id: path.to_string(),
        language: SupportedLanguage::from_path(path).map(|l| l.as_str().to_string()),
        size: tree_by_path.get(path).and_then(|e| e.size),
    }
}
