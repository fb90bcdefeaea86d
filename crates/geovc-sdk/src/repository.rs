use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use geovc_cache::{ObjectDatabase, SharedCache};
use geovc_diff::{DiffOptions, DiffStream};
use geovc_refs::names::{branch_ref, HEADS_PREFIX, TAGS_PREFIX};
use geovc_refs::{InMemoryRefDatabase, RefDatabase, RefTransaction, HEAD};
use geovc_store::{Commit, Feature, FeatureType, InMemoryObjectStore, Node, ObjectStore, Person, RevObject, RevTree};
use geovc_sync::{Endpoint, LocalRemote};
use geovc_tree::RevTreeBuilder;
use geovc_types::{CancelToken, ObjectId, Outcome};
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::error::{SdkError, SdkResult};

/// One change to apply to a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeEdit {
    Put(Node),
    Remove(String),
}

/// High-level geovc repository API.
#[derive(Clone)]
pub struct Repository {
    config: RepositoryConfig,
    objects: ObjectDatabase,
    refs: Arc<dyn RefDatabase>,
}

impl Repository {
    /// Assemble a repository from its parts. The cache may be shared with
    /// other repositories.
    pub fn new(
        config: RepositoryConfig,
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefDatabase>,
        cache: Arc<SharedCache>,
    ) -> SdkResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            objects: ObjectDatabase::new(store, cache),
            refs,
        })
    }

    /// A repository held entirely in memory, with `HEAD` pointing at an
    /// unborn `main` branch.
    pub fn in_memory(config: RepositoryConfig) -> SdkResult<Self> {
        let cache = Arc::new(SharedCache::new(config.cache.clone())?);
        let repo = Self::new(
            config,
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefDatabase::new()),
            cache,
        )?;
        repo.refs.put_symbolic(HEAD, &branch_ref("main"))?;
        Ok(repo)
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn objects(&self) -> &ObjectDatabase {
        &self.objects
    }

    pub fn refs(&self) -> &Arc<dyn RefDatabase> {
        &self.refs
    }

    pub fn empty_tree(&self) -> Arc<RevTree> {
        Arc::new(RevTree::empty())
    }

    // ---- Trees ----

    /// A builder over the tree `base`, or the empty tree.
    pub fn builder(&self, base: Option<ObjectId>) -> SdkResult<RevTreeBuilder> {
        let base = match base {
            Some(id) => self.objects.get_tree(&id)?,
            None => self.empty_tree(),
        };
        Ok(RevTreeBuilder::from_base(
            self.objects.clone(),
            self.config.tree.clone(),
            base,
        )?)
    }

    /// Apply `edits` to `base` and store the result.
    pub fn build_tree(
        &self,
        base: Option<ObjectId>,
        edits: impl IntoIterator<Item = TreeEdit>,
        cancel: &CancelToken,
    ) -> SdkResult<Outcome<Arc<RevTree>>> {
        let mut builder = self.builder(base)?;
        for edit in edits {
            match edit {
                TreeEdit::Put(node) => {
                    builder.put(node)?;
                }
                TreeEdit::Remove(name) => {
                    builder.remove(&name);
                }
            }
        }
        Ok(builder.build(cancel)?)
    }

    pub fn put_feature(&self, feature: Feature) -> SdkResult<ObjectId> {
        Ok(self.objects.put(feature)?)
    }

    pub fn put_feature_type(&self, feature_type: FeatureType) -> SdkResult<ObjectId> {
        Ok(self.objects.put(feature_type)?)
    }

    // ---- History ----

    /// Record `tree` as the new tip of `branch`.
    ///
    /// The current tip becomes the parent. Fails with
    /// [`SdkError::CommitConflict`] if the branch moves in the meantime.
    pub fn commit(&self, branch: &str, tree: ObjectId, message: &str, author: Person) -> SdkResult<ObjectId> {
        let name = full_branch(branch);
        let parent = self.refs.resolve_if_present(&name)?;
        let commit = Commit::new(
            tree,
            parent.into_iter().collect(),
            author.clone(),
            author,
            message,
        );
        let id = self.objects.put(commit)?;
        if !self.refs.update(&name, parent, id)? {
            debug!(branch = %name, commit = %id.short_hex(), "branch moved during commit");
            return Err(SdkError::CommitConflict { branch: name });
        }
        info!(branch = %name, commit = %id.short_hex(), tree = %tree.short_hex(), "committed");
        Ok(id)
    }

    /// Commits reachable from `start`, newest committer timestamp first.
    pub fn log(&self, start: &str, limit: Option<usize>) -> SdkResult<Vec<(ObjectId, Arc<Commit>)>> {
        let tip = self.peel_to_commit(self.resolve(start)?)?;
        let mut heap = BinaryHeap::new();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let first = self.objects.get_commit(&tip)?;
        heap.push((first.committer.timestamp, tip));
        seen.insert(tip);

        while let Some((_, id)) = heap.pop() {
            if limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
            let commit = self.objects.get_commit(&id)?;
            for parent in &commit.parents {
                if seen.insert(*parent) {
                    match self.objects.get_commit(parent) {
                        Ok(p) => heap.push((p.committer.timestamp, *parent)),
                        // Shallow history ends here.
                        Err(geovc_store::StoreError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            out.push((id, commit));
        }
        Ok(out)
    }

    /// Resolve a ref name, short branch or tag name, or hex object id.
    pub fn resolve(&self, rev: &str) -> SdkResult<ObjectId> {
        for candidate in [
            rev.to_string(),
            format!("{HEADS_PREFIX}{rev}"),
            format!("{TAGS_PREFIX}{rev}"),
        ] {
            if geovc_refs::validate_ref_name(&candidate).is_err() {
                continue;
            }
            if let Some(id) = self.refs.resolve_if_present(&candidate)? {
                return Ok(id);
            }
        }
        if let Ok(id) = rev.parse::<ObjectId>() {
            if self.objects.has(&id)? {
                return Ok(id);
            }
        }
        Err(SdkError::UnknownRevision(rev.to_string()))
    }

    fn peel_to_commit(&self, id: ObjectId) -> SdkResult<ObjectId> {
        match self.objects.get(&id)? {
            RevObject::Commit(_) => Ok(id),
            RevObject::Tag(tag) => Ok(tag.commit),
            other => Err(SdkError::NotTreeish {
                id: id.to_string(),
                kind: other.kind().to_string(),
            }),
        }
    }

    /// The root tree of a commit, tag or tree.
    pub fn tree_of(&self, id: ObjectId) -> SdkResult<ObjectId> {
        match self.objects.get(&id)? {
            RevObject::Tree(_) => Ok(id),
            RevObject::Commit(commit) => Ok(commit.tree),
            RevObject::Tag(tag) => Ok(self.objects.get_commit(&tag.commit)?.tree),
            other => Err(SdkError::NotTreeish {
                id: id.to_string(),
                kind: other.kind().to_string(),
            }),
        }
    }

    // ---- Diffs ----

    pub fn diff_trees(&self, left: ObjectId, right: ObjectId, options: DiffOptions) -> DiffStream {
        DiffStream::new(self.objects.clone(), left, right, options)
    }

    /// Diff the trees of two revisions. Fails if either does not resolve.
    pub fn diff_refs(&self, left: &str, right: &str, options: DiffOptions) -> SdkResult<DiffStream> {
        let left = self.tree_of(self.resolve(left)?)?;
        let right = self.tree_of(self.resolve(right)?)?;
        Ok(self.diff_trees(left, right, options))
    }

    // ---- Refs and sync ----

    pub fn begin_transaction(&self) -> RefTransaction {
        RefTransaction::begin(Arc::clone(&self.refs))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.objects.clone(), Arc::clone(&self.refs))
    }

    /// A remote named `name` backed by another in-process repository.
    pub fn local_remote(&self, name: &str, other: &Repository) -> LocalRemote {
        LocalRemote::new(name, self.endpoint(), other.endpoint())
    }
}

fn full_branch(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        branch_ref(branch)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("objects", &self.objects)
            .finish_non_exhaustive()
    }
}
