//! The host-facing filesystem over all registered sites.
//!
//! [`PloneFs`] routes each URI to its site, resolves it through the lazy
//! tree and turns filesystem verbs into entry saves, clipboard transfers and
//! workflow calls. The tree is only touched once the remote has confirmed a
//! mutation, and every confirmed mutation is announced through the
//! debounced [`ChangeNotifier`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::entry::{Document, Download, Entry, File, Folder, SiteFeatures, endpoint};
use crate::error::{FsError, FsResult};
use crate::naming::collision_free;
use crate::notify::ChangeNotifier;
use crate::ops::FsOps;
use crate::registry::{Site, SiteRegistry};
use crate::resolver::{Target, resolve};
use crate::session::{Authenticator, CLIPBOARD_COOKIE, CookieJar, Transport};
use crate::types::{
    ChangeEvent, DirEntry, FileStat, Identity, RemoteUri, RenameOptions, WriteOptions,
};
use crate::workflow::{WorkflowAction, WorkflowState};

/// Clipboard verb of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Copy,
    Move,
}

impl Transfer {
    fn view(&self) -> &'static str {
        match self {
            Transfer::Copy => "object_copy",
            Transfer::Move => "object_cut",
        }
    }
}

/// Remote virtual filesystem over registered Plone sites.
#[derive(Debug)]
pub struct PloneFs {
    registry: SiteRegistry,
    notifier: ChangeNotifier,
}

impl Default for PloneFs {
    fn default() -> Self {
        Self::new(crate::notify::DEFAULT_DEBOUNCE)
    }
}

impl PloneFs {
    /// Create a filesystem whose change batches coalesce over `debounce`.
    pub fn new(debounce: Duration) -> Self {
        Self {
            registry: SiteRegistry::new(),
            notifier: ChangeNotifier::new(debounce),
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Register a site rooted at `uri` with its own session.
    pub fn register(
        &self,
        uri: RemoteUri,
        features: SiteFeatures,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Arc<Site> {
        let site = Site::new(uri, features, transport, authenticator);
        self.registry.register(site.clone());
        site
    }

    /// Drop a site, its session and its cached tree.
    pub fn unregister(&self, uri: &RemoteUri) -> bool {
        self.registry.unregister(uri)
    }

    /// Debounced batches of change events.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<ChangeEvent>> {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    async fn lookup(&self, target: &Target, allow_missing: bool) -> FsResult<(Arc<Site>, Option<Entry>)> {
        let (site, relative) = self.registry.route(&target.uri)?;
        let entry = resolve(site.root(), &relative, target.local_css, allow_missing).await?;
        Ok((site, entry))
    }

    async fn lookup_existing(&self, target: &Target) -> FsResult<(Arc<Site>, Entry)> {
        let (site, entry) = self.lookup(target, false).await?;
        let entry = entry.ok_or_else(|| FsError::not_found(target.uri.path()))?;
        Ok((site, entry))
    }

    /// Entry at `uri`; `NotFound` if there is none.
    pub async fn get_entry(&self, uri: &str) -> FsResult<Entry> {
        let target = Target::parse(uri)?;
        Ok(self.lookup_existing(&target).await?.1)
    }

    /// Entry at `uri`, or None when the last segments do not exist.
    pub async fn find_entry(&self, uri: &str) -> FsResult<Option<Entry>> {
        let target = Target::parse(uri)?;
        Ok(self.lookup(&target, true).await?.1)
    }

    /// The folder or portlet manager `uri` lives in.
    async fn parent_of(&self, uri: &RemoteUri) -> FsResult<(Arc<Site>, Entry)> {
        let (site, relative) = self.registry.route(uri)?;
        if relative.is_empty() {
            return Err(FsError::unavailable(format!(
                "{}: a site root has no parent",
                uri.path()
            )));
        }
        let parent_relative = relative.rsplit_once('/').map_or("", |(dir, _)| dir);
        let parent = resolve(site.root(), parent_relative, false, false)
            .await?
            .ok_or_else(|| FsError::not_found(uri.path()))?;
        if !parent.is_dir() {
            return Err(FsError::not_a_directory(parent.uri().path()));
        }
        Ok((site, parent))
    }

    /// Remove `uri` from its cached parent folder, if that folder is reachable.
    async fn forget(&self, uri: &RemoteUri) {
        match self.parent_of(uri).await {
            Ok((_, Entry::Folder(parent))) => {
                parent.remove_child(&base_name(uri));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(path = %uri.path(), error = %e, "parent not cached"),
        }
    }

    // ========================================================================
    // Clipboard
    // ========================================================================

    /// Cut or copy `entry` and paste it into `dest`, then rename the pasted
    /// object to `requested` when that name differs and is free.
    async fn transfer(
        &self,
        site: &Site,
        entry: &Entry,
        dest: &Arc<Folder>,
        transfer: Transfer,
        requested: &str,
    ) -> FsResult<Entry> {
        dest.load_entries(false).await?;
        // The CMS applies the same rule when it pastes.
        let pasted_name = collision_free(entry.name(), |name| dest.has_child(name));

        {
            let _clipboard = site.lock_clipboard().await;
            let session = site.session();
            let response = session
                .get(&endpoint(entry.uri().path(), transfer.view()))
                .await?;
            let set = CookieJar::new().absorb(&response);
            if !set.iter().any(|name| name == CLIPBOARD_COOKIE) {
                return Err(FsError::unavailable(format!(
                    "{} {}: no clipboard cookie",
                    transfer.view(),
                    entry.uri().path()
                )));
            }
            let response = session
                .get(&endpoint(dest.identity().path(), "object_paste"))
                .await?;
            if response.status != 302 {
                return Err(FsError::unexpected_status(
                    response.status,
                    &format!("paste into {}", dest.identity().path()),
                ));
            }
        }
        tracing::debug!(
            source = %entry.uri().path(),
            dest = %dest.identity().path(),
            name = %pasted_name,
            ?transfer,
            "pasted"
        );

        dest.load_entries(true).await?;
        let pasted = dest.child(&pasted_name).ok_or_else(|| {
            FsError::unavailable(format!(
                "pasted {pasted_name} not listed in {}",
                dest.identity().path()
            ))
        })?;
        if requested == pasted_name || dest.has_child(requested) {
            return Ok(pasted);
        }
        let renamed = pasted.save(None, Some(requested)).await?;
        dest.remove_child(&pasted_name);
        dest.insert_child(renamed.clone());
        Ok(renamed)
    }

    // ========================================================================
    // Working copies
    // ========================================================================

    /// Check a page out; returns the working copy, now cached beside it.
    pub async fn check_out(&self, uri: &str) -> FsResult<Entry> {
        let target = Target::parse(uri)?;
        let (site, entry) = self.lookup_existing(&target).await?;
        let page = document_of(&entry)?;
        let working_uri = page.check_out().await?;

        let working = Document::new(site.context().clone(), working_uri.clone(), true, true, None);
        {
            let original = page.meta().read();
            let mut meta = working.meta().write();
            meta.title = original.title.clone();
            meta.description = original.description.clone();
        }
        let working = Entry::Document(working);
        match self.parent_of(&working_uri).await {
            Ok((_, Entry::Folder(parent))) => parent.insert_child(working.clone()),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(working_copy = %working_uri.path(), error = %e, "working copy outside the cached tree")
            }
        }
        self.notifier.fire([ChangeEvent::created(working_uri)]);
        Ok(working)
    }

    /// Check a working copy in. The original is reloaded in place and the
    /// working copy dropped; returns the original's URI.
    ///
    /// Once the CMS has accepted the check-in this succeeds. A failed reload
    /// only leaves the original stale in the cache until its next load.
    pub async fn check_in(&self, uri: &str, message: &str) -> FsResult<RemoteUri> {
        let target = Target::parse(uri)?;
        let (_, entry) = self.lookup_existing(&target).await?;
        let working = document_of(&entry)?;
        let original_uri = working.check_in(message).await?;

        self.forget(entry.uri()).await;
        if let Err(e) = self.reload(&original_uri).await {
            tracing::warn!(original = %original_uri.path(), error = %e, "reload after check-in failed");
        }
        self.notifier.fire([
            ChangeEvent::deleted(entry.uri().clone()),
            ChangeEvent::changed(original_uri.clone()),
        ]);
        Ok(original_uri)
    }

    async fn reload(&self, uri: &RemoteUri) -> FsResult<()> {
        if let (_, Some(entry)) = self.lookup(&Target::new(uri.clone()), true).await? {
            entry.load(true).await?;
        }
        Ok(())
    }

    /// Discard a working copy.
    pub async fn cancel_check_out(&self, uri: &str) -> FsResult<()> {
        let target = Target::parse(uri)?;
        let (_, entry) = self.lookup_existing(&target).await?;
        document_of(&entry)?.cancel_check_out().await?;
        self.forget(entry.uri()).await;
        self.notifier.fire([ChangeEvent::deleted(entry.uri().clone())]);
        Ok(())
    }

    pub async fn can_check_out(&self, uri: &str) -> FsResult<bool> {
        match self.get_entry(uri).await? {
            Entry::Document(document) => document.can_check_out().await,
            _ => Ok(false),
        }
    }

    pub async fn can_check_in(&self, uri: &str) -> FsResult<bool> {
        match self.get_entry(uri).await? {
            Entry::Document(document) => document.can_check_in().await,
            _ => Ok(false),
        }
    }

    // ========================================================================
    // Workflow, downloads, portlets
    // ========================================================================

    /// Current workflow state; None when unknown or not applicable.
    pub async fn workflow_state(&self, uri: &str) -> FsResult<Option<WorkflowState>> {
        let entry = self.get_entry(uri).await?;
        Ok(entry.as_workflow().and_then(|w| w.workflow_state()))
    }

    pub async fn change_state(&self, uri: &str, action: WorkflowAction) -> FsResult<WorkflowState> {
        let entry = self.get_entry(uri).await?;
        let workflow = entry
            .as_workflow()
            .ok_or_else(|| FsError::unavailable(format!("{} has no workflow state", entry.uri().path())))?;
        let state = workflow.change_state(action).await?;
        self.notifier.fire([ChangeEvent::changed(entry.uri().clone())]);
        Ok(state)
    }

    /// Raw file bytes with the served content type.
    pub async fn download(&self, uri: &str) -> FsResult<Download> {
        let entry = self.get_entry(uri).await?;
        match entry.as_file() {
            Some(file) => file.download().await,
            None => Err(FsError::unavailable(format!(
                "{} is not a file",
                entry.uri().path()
            ))),
        }
    }

    /// Add a text portlet to the manager at `manager_uri`.
    pub async fn add_portlet(&self, manager_uri: &str, header: &str, content: &[u8]) -> FsResult<Entry> {
        let entry = self.get_entry(manager_uri).await?;
        let manager = entry
            .as_portlet_manager()
            .ok_or_else(|| FsError::not_a_directory(entry.uri().path()))?;
        let portlet = Entry::Portlet(manager.add(header, content).await?);
        self.notifier.fire([ChangeEvent::created(portlet.uri().clone())]);
        Ok(portlet)
    }
}

#[async_trait]
impl FsOps for PloneFs {
    async fn stat(&self, uri: &str) -> FsResult<FileStat> {
        Ok(self.get_entry(uri).await?.stat())
    }

    async fn read_dir(&self, uri: &str) -> FsResult<Vec<DirEntry>> {
        let entry = self.get_entry(uri).await?;
        let children = match &entry {
            Entry::Folder(folder) => {
                folder.load_entries(false).await?;
                folder.children()
            }
            Entry::PortletManager(manager) => {
                manager.load_entries(false).await?;
                manager.children()
            }
            other => return Err(FsError::not_a_directory(other.uri().path())),
        };
        Ok(children
            .iter()
            .map(|child| DirEntry::new(child.name(), child.kind()))
            .collect())
    }

    async fn read_file(&self, uri: &str) -> FsResult<Vec<u8>> {
        self.get_entry(uri).await?.read().await
    }

    async fn write_file(&self, uri: &str, content: &[u8], options: WriteOptions) -> FsResult<()> {
        let target = Target::parse(uri)?;
        if target.local_css {
            let (_, entry) = self.lookup_existing(&target).await?;
            if !matches!(entry, Entry::LocalCss(_)) {
                return Err(FsError::unavailable(format!(
                    "{}: local css is not enabled",
                    target.uri.path()
                )));
            }
            entry.save(Some(content.to_vec()), None).await?;
            self.notifier.fire([ChangeEvent::changed(target.uri.clone())]);
            return Ok(());
        }

        let (site, parent) = self.parent_of(&target.uri).await?;
        let name = base_name(&target.uri);
        let existing = child_of(&parent, &name).await?;
        match &existing {
            Some(entry) if entry.is_dir() => {
                return Err(FsError::is_a_directory(target.uri.path()));
            }
            Some(_) if options.create && !options.overwrite => {
                return Err(FsError::already_exists(target.uri.path()));
            }
            None if !options.create => return Err(FsError::not_found(target.uri.path())),
            _ => {}
        }

        if let Some(entry) = existing {
            entry.save(Some(content.to_vec()), None).await?;
            self.notifier.fire([ChangeEvent::changed(entry.uri().clone())]);
            return Ok(());
        }

        let created = match &parent {
            Entry::PortletManager(manager) => Entry::Portlet(manager.add(&name, content).await?),
            Entry::Folder(folder) => {
                let ctx = site.context().clone();
                let fresh = if has_extension(&name) {
                    Entry::File(File::new(ctx, target.uri.clone(), false))
                } else {
                    Entry::Document(Document::new(ctx, target.uri.clone(), true, false, None))
                };
                let saved = fresh.save(Some(content.to_vec()), None).await?;
                folder.insert_child(saved.clone());
                saved
            }
            other => return Err(FsError::not_a_directory(other.uri().path())),
        };
        tracing::debug!(path = %created.uri().path(), kind = %created.kind(), "created");
        self.notifier.fire([
            ChangeEvent::created(created.uri().clone()),
            ChangeEvent::changed(created.uri().clone()),
        ]);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str, options: RenameOptions) -> FsResult<()> {
        let from = Target::parse(from)?;
        let to = Target::parse(to)?;
        if from.local_css || to.local_css {
            return Err(FsError::unsupported("renaming a local stylesheet"));
        }
        if from.uri == to.uri {
            return Ok(());
        }

        let (site, entry) = self.lookup_existing(&from).await?;
        if matches!(entry, Entry::Portlet(_) | Entry::PortletManager(_)) {
            return Err(FsError::unsupported("renaming portlets"));
        }
        let (_, old_parent) = self.parent_of(&from.uri).await?;
        let (dest_site, new_parent) = self.parent_of(&to.uri).await?;
        if !Arc::ptr_eq(&site, &dest_site) {
            return Err(FsError::unsupported("moving between sites"));
        }
        let old_folder = folder_of(&old_parent)?;
        let new_folder = folder_of(&new_parent)?;

        let new_name = base_name(&to.uri);
        new_folder.load_entries(false).await?;
        if new_folder.has_child(&new_name) {
            if !options.overwrite {
                return Err(FsError::already_exists(to.uri.path()));
            }
            return Err(FsError::unavailable(format!(
                "cannot replace {}: delete is not supported",
                to.uri.path()
            )));
        }

        let landed = if Arc::ptr_eq(old_folder, new_folder) {
            let renamed = entry.save(None, Some(&new_name)).await?;
            old_folder.remove_child(entry.name());
            old_folder.insert_child(renamed.clone());
            renamed
        } else {
            let moved = self
                .transfer(&site, &entry, new_folder, Transfer::Move, &new_name)
                .await?;
            old_folder.remove_child(entry.name());
            moved
        };

        self.notifier.fire([
            ChangeEvent::deleted(from.uri.clone()),
            ChangeEvent::created(landed.uri().clone()),
        ]);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> FsResult<RemoteUri> {
        let from = Target::parse(from)?;
        let to = Target::parse(to)?;
        if from.local_css || to.local_css {
            return Err(FsError::unsupported("copying a local stylesheet"));
        }

        let (site, entry) = self.lookup_existing(&from).await?;
        if matches!(entry, Entry::Portlet(_) | Entry::PortletManager(_)) {
            return Err(FsError::unsupported("copying portlets"));
        }
        let (dest_site, parent) = self.parent_of(&to.uri).await?;
        if !Arc::ptr_eq(&site, &dest_site) {
            return Err(FsError::unsupported("copying between sites"));
        }
        let dest = folder_of(&parent)?;

        let copied = self
            .transfer(&site, &entry, dest, Transfer::Copy, &base_name(&to.uri))
            .await?;
        let uri = copied.uri().clone();
        self.notifier.fire([ChangeEvent::created(uri.clone())]);
        Ok(uri)
    }

    async fn create_directory(&self, uri: &str) -> FsResult<()> {
        let target = Target::parse(uri)?;
        if target.local_css {
            return Err(FsError::unsupported("creating a local stylesheet directory"));
        }
        let (site, parent) = self.parent_of(&target.uri).await?;
        let folder = folder_of(&parent)?;
        folder.load_entries(false).await?;
        if folder.has_child(&base_name(&target.uri)) {
            return Err(FsError::already_exists(target.uri.path()));
        }

        let created = Folder::new(site.context().clone(), target.uri.clone(), false)
            .save(None)
            .await?;
        folder.insert_child(Entry::Folder(created));
        self.notifier.fire([
            ChangeEvent::changed(folder.identity().uri().clone()),
            ChangeEvent::created(target.uri.clone()),
        ]);
        Ok(())
    }

    async fn delete(&self, _uri: &str) -> FsResult<()> {
        Err(FsError::unsupported("delete"))
    }
}

/// Cached child `name` of a folder or portlet manager, loading it first.
async fn child_of(parent: &Entry, name: &str) -> FsResult<Option<Entry>> {
    match parent {
        Entry::Folder(folder) => {
            folder.load_entries(false).await?;
            Ok(folder.child(name))
        }
        Entry::PortletManager(manager) => {
            manager.load_entries(false).await?;
            Ok(manager.child(name).map(Entry::Portlet))
        }
        other => Err(FsError::not_a_directory(other.uri().path())),
    }
}

fn folder_of(entry: &Entry) -> FsResult<&Arc<Folder>> {
    entry
        .as_folder()
        .ok_or_else(|| FsError::not_a_directory(entry.uri().path()))
}

fn document_of(entry: &Entry) -> FsResult<&Arc<Document>> {
    entry
        .as_document()
        .ok_or_else(|| FsError::unavailable(format!("{} is not a page", entry.uri().path())))
}

fn base_name(uri: &RemoteUri) -> String {
    Identity::new(uri.clone()).name().to_string()
}

/// New names with an extension become files, the rest pages. A leading dot
/// alone does not count.
fn has_extension(name: &str) -> bool {
    name.rfind('.').is_some_and(|index| index > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_extension() {
        assert!(has_extension("report.doc"));
        assert!(has_extension("archive.tar.gz"));
        assert!(!has_extension("about-us"));
        assert!(!has_extension(".hidden"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(&RemoteUri::new("h", "/site/a/page")), "page");
    }

    #[test]
    fn test_transfer_views() {
        assert_eq!(Transfer::Copy.view(), "object_copy");
        assert_eq!(Transfer::Move.view(), "object_cut");
    }
}
