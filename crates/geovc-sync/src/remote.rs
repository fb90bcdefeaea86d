//! Fetching from and pushing to another repository.

use std::sync::Arc;

use geovc_cache::ObjectDatabase;
use geovc_refs::names::{remote_ref, short_name, HEADS_PREFIX, TAGS_PREFIX};
use geovc_refs::{Ref, RefDatabase, RefValue};
use geovc_types::ObjectId;
use tracing::{debug, info};

use crate::bundle::ObjectBundle;
use crate::closure::MissingObjects;
use crate::error::{SyncError, SyncResult};
use crate::history::is_ancestor;
use crate::progress::ProgressListener;
use crate::types::{FetchResult, PushResult, RefSpec, RefUpdate};

/// The object and ref databases of one repository.
#[derive(Clone)]
pub struct Endpoint {
    pub objects: ObjectDatabase,
    pub refs: Arc<dyn RefDatabase>,
}

impl Endpoint {
    pub fn new(objects: ObjectDatabase, refs: Arc<dyn RefDatabase>) -> Self {
        Self { objects, refs }
    }
}

/// A repository that history can be exchanged with.
pub trait Remote: Send + Sync {
    /// Name used for remote-tracking refs (`refs/remotes/<name>/...`).
    fn name(&self) -> &str;

    /// Branches and tags of the remote, sorted by name.
    fn list_refs(&self) -> SyncResult<Vec<Ref>>;

    /// Copy the history of the remote ref `refspec.src` into the local
    /// repository and point the local ref `refspec.dst` (by default the
    /// remote-tracking ref) at it. `depth_limit` bounds how many commits
    /// are followed from the tip.
    fn fetch_new_data(
        &self,
        refspec: &RefSpec,
        depth_limit: Option<usize>,
        progress: &dyn ProgressListener,
    ) -> SyncResult<FetchResult>;

    /// Copy the history of the local ref `refspec.src` to the remote and
    /// move the remote ref `refspec.dst` (by default the same name) to it.
    /// The remote ref must be an ancestor of the pushed commit unless the
    /// refspec is forced.
    fn push_new_data(&self, refspec: &RefSpec, progress: &dyn ProgressListener) -> SyncResult<PushResult>;

    /// Delete a ref on the remote, returning what it pointed at.
    fn delete_ref(&self, refspec: &RefSpec) -> SyncResult<Option<Ref>>;
}

/// A remote living in the same process.
pub struct LocalRemote {
    name: String,
    local: Endpoint,
    remote: Endpoint,
}

impl LocalRemote {
    pub fn new(name: impl Into<String>, local: Endpoint, remote: Endpoint) -> Self {
        Self {
            name: name.into(),
            local,
            remote,
        }
    }

    /// Send the closure of `tip` from one side to the other.
    fn transfer(
        from: &Endpoint,
        to: &Endpoint,
        tip: ObjectId,
        depth_limit: Option<usize>,
        progress: &dyn ProgressListener,
    ) -> SyncResult<(usize, u64, Vec<ObjectId>)> {
        let closure = MissingObjects::new(&from.objects, &to.objects)
            .depth_limit(depth_limit)
            .collect(&[tip])?;
        let bundle = ObjectBundle::collect(&from.objects, &closure.ids)?;
        let wire = bundle.to_bytes()?;
        let received = ObjectBundle::from_bytes(&wire)?;
        received.import(&to.objects, progress)?;
        Ok((received.len(), wire.len() as u64, closure.shallow))
    }
}

/// Expand a short ref name to a branch, leaving full names alone.
fn full_name(name: &str) -> String {
    if name.starts_with("refs/") || name == geovc_refs::HEAD {
        name.to_string()
    } else {
        format!("{HEADS_PREFIX}{name}")
    }
}

/// Move `name` from `old` to `new` on `refs`, enforcing fast-forward unless
/// `force` is set.
fn advance(
    refs: &dyn RefDatabase,
    objects: &ObjectDatabase,
    name: &str,
    old: Option<ObjectId>,
    new: ObjectId,
    force: bool,
) -> SyncResult<Option<RefUpdate>> {
    if old == Some(new) {
        return Ok(None);
    }
    if !objects.has(&new)? {
        return Err(SyncError::RefRejected {
            name: name.to_string(),
            reason: format!("{} was not transferred", new.short_hex()),
        });
    }
    if let Some(old) = old {
        if !force && !is_ancestor(objects, old, new)? {
            return Err(SyncError::NotFastForward(name.to_string()));
        }
    }
    let expected = old.map(RefValue::Direct);
    if !refs.compare_and_swap(name, expected.as_ref(), Some(RefValue::Direct(new)))? {
        return Err(SyncError::RefRejected {
            name: name.to_string(),
            reason: "ref changed during transfer".into(),
        });
    }
    Ok(Some(RefUpdate {
        name: name.to_string(),
        old,
        new: Some(new),
    }))
}

/// Read a ref that must hold an object id, not a symbolic link.
fn read_direct(refs: &dyn RefDatabase, name: &str) -> SyncResult<Option<ObjectId>> {
    match refs.read(name)? {
        None => Ok(None),
        Some(RefValue::Direct(id)) => Ok(Some(id)),
        Some(RefValue::Symbolic(target)) => Err(SyncError::RefRejected {
            name: name.to_string(),
            reason: format!("is a symbolic ref to {target}"),
        }),
    }
}

impl Remote for LocalRemote {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_refs(&self) -> SyncResult<Vec<Ref>> {
        let mut refs = self.remote.refs.list(HEADS_PREFIX)?;
        refs.extend(self.remote.refs.list(TAGS_PREFIX)?);
        Ok(refs)
    }

    fn fetch_new_data(
        &self,
        refspec: &RefSpec,
        depth_limit: Option<usize>,
        progress: &dyn ProgressListener,
    ) -> SyncResult<FetchResult> {
        let src = full_name(&refspec.src);
        let tip = self
            .remote
            .refs
            .resolve_if_present(&src)?
            .ok_or_else(|| SyncError::RefNotFound(src.clone()))?;
        let dst = match &refspec.dst {
            Some(dst) => full_name(dst),
            None => remote_ref(&self.name, short_name(&src)),
        };

        progress.started(&format!("fetching {src} from {}", self.name));
        let (objects, bytes, shallow) = Self::transfer(&self.remote, &self.local, tip, depth_limit, progress)?;

        let old = read_direct(self.local.refs.as_ref(), &dst)?;
        let update = advance(
            self.local.refs.as_ref(),
            &self.local.objects,
            &dst,
            old,
            tip,
            refspec.force,
        )?;
        progress.complete();
        info!(remote = %self.name, refname = %dst, objects, bytes, "fetch complete");
        Ok(FetchResult {
            objects_received: objects,
            bytes_transferred: bytes,
            refs_updated: update.into_iter().collect(),
            shallow_commits: shallow,
        })
    }

    fn push_new_data(&self, refspec: &RefSpec, progress: &dyn ProgressListener) -> SyncResult<PushResult> {
        let src = full_name(&refspec.src);
        let tip = self
            .local
            .refs
            .resolve_if_present(&src)?
            .ok_or_else(|| SyncError::RefNotFound(src.clone()))?;
        let dst = refspec.dst.as_deref().map_or_else(|| src.clone(), full_name);

        let old = read_direct(self.remote.refs.as_ref(), &dst)?;
        if old == Some(tip) {
            debug!(remote = %self.name, refname = %dst, "push up to date");
            return Ok(PushResult::default());
        }
        // Checked before sending anything; the remote tip must already be
        // local for it to be an ancestor.
        if let Some(old) = old {
            if !refspec.force && !is_ancestor(&self.local.objects, old, tip)? {
                return Err(SyncError::NotFastForward(dst));
            }
        }

        progress.started(&format!("pushing {src} to {}", self.name));
        let (objects, bytes, _) = Self::transfer(&self.local, &self.remote, tip, None, progress)?;
        let update = advance(self.remote.refs.as_ref(), &self.remote.objects, &dst, old, tip, true)?;
        progress.complete();
        info!(remote = %self.name, refname = %dst, objects, bytes, "push complete");
        Ok(PushResult {
            objects_sent: objects,
            bytes_transferred: bytes,
            refs_updated: update.into_iter().collect(),
        })
    }

    fn delete_ref(&self, refspec: &RefSpec) -> SyncResult<Option<Ref>> {
        let name = full_name(refspec.dst.as_deref().unwrap_or(&refspec.src));
        let Some(value) = self.remote.refs.read(&name)? else {
            return Ok(None);
        };
        if !self.remote.refs.compare_and_swap(&name, Some(&value), None)? {
            return Err(SyncError::RefRejected {
                name,
                reason: "ref changed before delete".into(),
            });
        }
        info!(remote = %self.name, refname = %name, "remote ref deleted");
        Ok(Some(Ref::new(name, value)))
    }
}

impl std::fmt::Debug for LocalRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRemote").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use geovc_cache::{CacheConfig, SharedCache};
    use geovc_refs::InMemoryRefDatabase;
    use geovc_store::{Commit, Feature, InMemoryObjectStore, Node, ObjectStore, Person, Value};
    use geovc_tree::{RevTreeBuilder, TreeConfig};
    use geovc_types::CancelToken;
    use std::sync::atomic::{AtomicU64, Ordering};

    const MAIN: &str = "refs/heads/main";

    fn endpoint() -> Endpoint {
        Endpoint::new(
            ObjectDatabase::new(
                Arc::new(InMemoryObjectStore::new()),
                Arc::new(SharedCache::new(CacheConfig::default()).unwrap()),
            ),
            Arc::new(InMemoryRefDatabase::new()),
        )
    }

    /// Two endpoints with their own stores reading through one cache.
    fn endpoints_sharing_cache() -> (Endpoint, Endpoint, Arc<SharedCache>) {
        let cache = Arc::new(SharedCache::new(CacheConfig::default()).unwrap());
        let endpoint = || {
            Endpoint::new(
                ObjectDatabase::new(Arc::new(InMemoryObjectStore::new()), Arc::clone(&cache)),
                Arc::new(InMemoryRefDatabase::new()),
            )
        };
        let (a, b) = (endpoint(), endpoint());
        (a, b, cache)
    }

    /// Commit `n` features on top of `parent` and advance `branch`.
    fn commit(ep: &Endpoint, branch: &str, label: &str, n: usize) -> ObjectId {
        let parent = ep.refs.resolve_if_present(branch).unwrap();
        let base = match parent {
            Some(p) => {
                let tree = ep.objects.get_commit(&p).unwrap().tree;
                ep.objects.get_tree(&tree).unwrap()
            }
            None => Arc::new(geovc_store::RevTree::empty()),
        };
        let mut builder = RevTreeBuilder::from_base(ep.objects.clone(), TreeConfig::new(4, 2).unwrap(), base).unwrap();
        for i in 0..n {
            let fid = ep
                .objects
                .put(Feature::new(vec![Value::from(format!("{label}{i}"))]))
                .unwrap();
            builder.put(Node::feature(format!("{label}{i}"), fid)).unwrap();
        }
        let tree = builder.build(&CancelToken::new()).unwrap().completed().unwrap();
        let person = Person::new("t", "t@example.com", 0, 0);
        let id = ep
            .objects
            .put(Commit::new(tree.id(), parent.into_iter().collect(), person.clone(), person, label))
            .unwrap();
        assert!(ep.refs.update(branch, parent, id).unwrap());
        id
    }

    #[derive(Default)]
    struct Counting {
        ticks: AtomicU64,
    }

    impl ProgressListener for Counting {
        fn started(&self, _description: &str) {}

        fn progress(&self, _done: u64, _total: Option<u64>) {
            self.ticks.fetch_add(1, Ordering::Relaxed);
        }

        fn complete(&self) {}
    }

    // ---- fetch ----

    #[test]
    fn fetch_creates_tracking_ref() {
        let local = endpoint();
        let remote = endpoint();
        let c1 = commit(&remote, MAIN, "a", 6);
        let origin = LocalRemote::new("origin", local.clone(), remote.clone());

        let progress = Counting::default();
        let result = origin
            .fetch_new_data(&RefSpec::parse("refs/heads/main").unwrap(), None, &progress)
            .unwrap();
        assert!(result.objects_received > 6);
        assert_eq!(progress.ticks.load(Ordering::Relaxed), result.objects_received as u64);
        assert_eq!(
            result.refs_updated,
            vec![RefUpdate {
                name: "refs/remotes/origin/main".into(),
                old: None,
                new: Some(c1),
            }]
        );
        assert_eq!(local.refs.resolve("refs/remotes/origin/main").unwrap(), c1);
        assert!(local.objects.has(&c1).unwrap());
    }

    #[test]
    fn second_fetch_sends_only_new_objects() {
        let local = endpoint();
        let remote = endpoint();
        commit(&remote, MAIN, "a", 6);
        let origin = LocalRemote::new("origin", local.clone(), remote.clone());
        let spec = RefSpec::parse("main").unwrap();
        let first = origin.fetch_new_data(&spec, None, &NullProgress).unwrap();

        let again = origin.fetch_new_data(&spec, None, &NullProgress).unwrap();
        assert_eq!(again.objects_received, 0);
        assert!(again.refs_updated.is_empty());

        commit(&remote, MAIN, "b", 1);
        let incremental = origin.fetch_new_data(&spec, None, &NullProgress).unwrap();
        assert!(incremental.objects_received < first.objects_received);
        assert_eq!(incremental.refs_updated.len(), 1);
    }

    #[test]
    fn shallow_fetch() {
        let local = endpoint();
        let remote = endpoint();
        let c1 = commit(&remote, MAIN, "a", 2);
        let c2 = commit(&remote, MAIN, "b", 2);
        let origin = LocalRemote::new("origin", local.clone(), remote);
        let result = origin
            .fetch_new_data(&RefSpec::parse("main").unwrap(), Some(1), &NullProgress)
            .unwrap();
        assert_eq!(result.shallow_commits, vec![c2]);
        assert!(local.objects.has(&c2).unwrap());
        assert!(!local.objects.has(&c1).unwrap());
    }

    #[test]
    fn fetch_through_shared_cache_copies_objects() {
        let (local, remote, cache) = endpoints_sharing_cache();
        let c1 = commit(&remote, MAIN, "a", 6);
        let origin = LocalRemote::new("origin", local.clone(), remote);

        let result = origin
            .fetch_new_data(&RefSpec::parse(MAIN).unwrap(), None, &NullProgress)
            .unwrap();
        assert!(result.objects_received > 6);
        assert!(local.objects.store().has(&c1).unwrap());

        cache.clear();
        let fetched = local.objects.get_commit(&c1).unwrap();
        assert!(local.objects.get_tree(&fetched.tree).is_ok());
        assert_eq!(local.refs.resolve("refs/remotes/origin/main").unwrap(), c1);
    }

    #[test]
    fn fetch_missing_ref_fails() {
        let origin = LocalRemote::new("origin", endpoint(), endpoint());
        assert!(matches!(
            origin.fetch_new_data(&RefSpec::parse("nope").unwrap(), None, &NullProgress),
            Err(SyncError::RefNotFound(name)) if name == "refs/heads/nope"
        ));
    }

    // ---- push ----

    #[test]
    fn push_fast_forward() {
        let local = endpoint();
        let remote = endpoint();
        let c1 = commit(&local, MAIN, "a", 5);
        let origin = LocalRemote::new("origin", local.clone(), remote.clone());

        let spec = RefSpec::parse(MAIN).unwrap();
        let pushed = origin.push_new_data(&spec, &NullProgress).unwrap();
        assert!(pushed.objects_sent > 5);
        assert_eq!(remote.refs.resolve(MAIN).unwrap(), c1);

        let c2 = commit(&local, MAIN, "b", 1);
        let pushed = origin.push_new_data(&spec, &NullProgress).unwrap();
        assert_eq!(pushed.refs_updated[0].old, Some(c1));
        assert_eq!(remote.refs.resolve(MAIN).unwrap(), c2);
        assert!(origin.push_new_data(&spec, &NullProgress).unwrap().is_up_to_date());
    }

    #[test]
    fn push_through_shared_cache_copies_objects() {
        let (local, remote, cache) = endpoints_sharing_cache();
        let c1 = commit(&local, MAIN, "a", 5);
        let origin = LocalRemote::new("origin", local, remote.clone());

        let pushed = origin.push_new_data(&RefSpec::parse(MAIN).unwrap(), &NullProgress).unwrap();
        assert!(pushed.objects_sent > 5);
        assert!(remote.objects.store().has(&c1).unwrap());

        cache.clear();
        assert!(remote.objects.get_commit(&c1).is_ok());
    }

    #[test]
    fn ref_does_not_move_to_an_absent_object() {
        let ep = endpoint();
        let ghost = ObjectId::from_bytes(b"never sent");
        let err = advance(ep.refs.as_ref(), &ep.objects, MAIN, None, ghost, false).unwrap_err();
        assert!(matches!(err, SyncError::RefRejected { ref name, .. } if name == MAIN));
        assert!(ep.refs.read(MAIN).unwrap().is_none());
    }

    #[test]
    fn diverged_push_requires_force() {
        let local = endpoint();
        let remote = endpoint();
        let origin = LocalRemote::new("origin", local.clone(), remote.clone());
        commit(&local, MAIN, "a", 2);
        origin.push_new_data(&RefSpec::parse(MAIN).unwrap(), &NullProgress).unwrap();

        // Someone else moves the remote branch.
        let theirs = commit(&remote, MAIN, "theirs", 1);
        let ours = commit(&local, MAIN, "ours", 1);

        let err = origin
            .push_new_data(&RefSpec::parse(MAIN).unwrap(), &NullProgress)
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFastForward(name) if name == MAIN));
        assert_eq!(remote.refs.resolve(MAIN).unwrap(), theirs);

        origin
            .push_new_data(&RefSpec::parse(&format!("+{MAIN}")).unwrap(), &NullProgress)
            .unwrap();
        assert_eq!(remote.refs.resolve(MAIN).unwrap(), ours);
    }

    #[test]
    fn push_to_other_name_and_delete() {
        let local = endpoint();
        let remote = endpoint();
        let c1 = commit(&local, MAIN, "a", 1);
        let origin = LocalRemote::new("origin", local, remote.clone());
        origin
            .push_new_data(&RefSpec::parse("main:review").unwrap(), &NullProgress)
            .unwrap();
        assert_eq!(remote.refs.resolve("refs/heads/review").unwrap(), c1);
        assert_eq!(origin.list_refs().unwrap().len(), 1);

        let deleted = origin.delete_ref(&RefSpec::parse("review").unwrap()).unwrap();
        assert_eq!(deleted, Some(Ref::direct("refs/heads/review", c1)));
        assert!(origin.delete_ref(&RefSpec::parse("review").unwrap()).unwrap().is_none());
        assert!(origin.list_refs().unwrap().is_empty());
    }
}
