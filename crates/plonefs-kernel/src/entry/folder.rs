//! Folders and the lazily loaded child map.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    Document, Entry, EntryMeta, File, HasLocalCss, HasPortlets, LocalCss, PortletManagers,
    SiteContext, endpoint, full_save,
};
use crate::error::{FsError, FsResult};
use crate::session::FormData;
use crate::single_flight::SingleFlight;
use crate::types::{Identity, RemoteUri};
use crate::workflow::WorkflowState;

/// Folder listing returned by `tinymce-jsonlinkablefolderlisting`.
#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    items: Vec<ListingItem>,
}

#[derive(Debug, Deserialize)]
struct ListingItem {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    /// A state name, or `false` for objects without workflow.
    #[serde(default)]
    review_state: serde_json::Value,
    #[serde(default)]
    normalized_type: String,
}

/// Object details returned by `tinymce-jsondetails`.
#[derive(Debug, Deserialize)]
struct Details {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default)]
struct Children {
    entries: BTreeMap<String, Entry>,
    loaded: bool,
}

/// A folder; its children are loaded on first use.
#[derive(Debug)]
pub struct Folder {
    ctx: Arc<SiteContext>,
    identity: Identity,
    is_site_root: bool,
    meta: RwLock<EntryMeta>,
    children: RwLock<Children>,
    flight: SingleFlight<()>,
    local_css: Option<Arc<LocalCss>>,
    portlets: Option<PortletManagers>,
}

impl Folder {
    /// A folder discovered in a listing (`exists`) or about to be created.
    pub fn new(ctx: Arc<SiteContext>, uri: RemoteUri, exists: bool) -> Arc<Self> {
        Self::build(ctx, uri, exists, false)
    }

    /// The root folder of a registered site.
    pub fn site_root(ctx: Arc<SiteContext>, uri: RemoteUri) -> Arc<Self> {
        Self::build(ctx, uri, true, true)
    }

    fn build(ctx: Arc<SiteContext>, uri: RemoteUri, exists: bool, is_site_root: bool) -> Arc<Self> {
        let local_css = ctx
            .features
            .local_css
            .then(|| LocalCss::new(ctx.clone(), uri.clone(), is_site_root));
        let portlets = ctx
            .features
            .portlets
            .then(|| PortletManagers::new(&ctx, &uri));
        Arc::new(Self {
            identity: Identity::new(uri),
            is_site_root,
            meta: RwLock::new(EntryMeta::new(exists)),
            children: RwLock::new(Children::default()),
            flight: SingleFlight::new(),
            local_css,
            portlets,
            ctx,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn meta(&self) -> &RwLock<EntryMeta> {
        &self.meta
    }

    pub fn is_site_root(&self) -> bool {
        self.is_site_root
    }

    pub fn is_loaded(&self) -> bool {
        self.children.read().loaded
    }

    /// Snapshot of the cached children.
    pub fn children(&self) -> Vec<Entry> {
        self.children.read().entries.values().cloned().collect()
    }

    pub fn child(&self, name: &str) -> Option<Entry> {
        self.children.read().entries.get(name).cloned()
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.read().entries.contains_key(name)
    }

    /// Insert a child confirmed by the remote.
    pub fn insert_child(&self, entry: Entry) {
        let mut children = self.children.write();
        children.entries.insert(entry.name().to_string(), entry);
        self.meta.write().size = children.entries.len() as u64;
    }

    /// Drop a child the remote no longer has under this name.
    pub fn remove_child(&self, name: &str) -> Option<Entry> {
        let mut children = self.children.write();
        let removed = children.entries.remove(name);
        self.meta.write().size = children.entries.len() as u64;
        removed
    }

    /// Load the child map.
    ///
    /// Without `force`, a loaded folder answers from cache. Concurrent
    /// callers share one listing request; the map is replaced only when the
    /// listing succeeds.
    pub async fn load_entries(self: &Arc<Self>, force: bool) -> FsResult<()> {
        if !force && self.is_loaded() {
            return Ok(());
        }
        let folder = self.clone();
        self.flight
            .run(move || async move { folder.fetch_entries().await })
            .await
    }

    async fn fetch_entries(&self) -> FsResult<()> {
        let form = FormData::new()
            .text("rooted", "True")
            .text("document_base_url", "/");
        let path = endpoint(self.identity.path(), "tinymce-jsonlinkablefolderlisting");
        let response = self.ctx.session.post(&path, &form).await?;
        if response.status != 200 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("list {}", self.identity.path()),
            ));
        }
        let listing: Listing = serde_json::from_slice(&response.body)?;

        let entries: BTreeMap<String, Entry> = listing
            .items
            .iter()
            .filter_map(|item| self.child_from_item(item))
            .map(|entry| (entry.name().to_string(), entry))
            .collect();
        tracing::debug!(path = %self.identity.path(), count = entries.len(), "listed folder");

        let mut children = self.children.write();
        self.meta.write().size = entries.len() as u64;
        children.entries = entries;
        children.loaded = true;
        Ok(())
    }

    fn child_from_item(&self, item: &ListingItem) -> Option<Entry> {
        let uri = self.identity.uri().join(&item.id);
        let state = item
            .review_state
            .as_str()
            .and_then(WorkflowState::from_review_state);
        let entry = match item.normalized_type.as_str() {
            "folder" => Entry::Folder(Folder::new(self.ctx.clone(), uri, true)),
            "document" => Entry::Document(Document::new(self.ctx.clone(), uri, true, true, state)),
            "news-item" | "event" | "collection" | "topic" => {
                Entry::Document(Document::new(self.ctx.clone(), uri, false, true, state))
            }
            "file" => Entry::File(File::new(self.ctx.clone(), uri, true)),
            other => {
                tracing::debug!(id = %item.id, normalized_type = %other, "skipping unsupported listing item");
                return None;
            }
        };
        {
            let mut meta = entry.meta().write();
            meta.title = item.title.clone();
            meta.description = item.description.clone();
        }
        Some(entry)
    }

    /// Refresh title and description from `tinymce-jsondetails`.
    pub async fn load_details(&self) -> FsResult<()> {
        if self.is_site_root {
            return Err(FsError::unsupported("root folder metadata loading"));
        }
        let path = endpoint(self.identity.path(), "tinymce-jsondetails");
        let response = self.ctx.session.get(&path).await?;
        if response.status != 200 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("details of {}", self.identity.path()),
            ));
        }
        let details: Details = serde_json::from_slice(&response.body)?;
        let mut meta = self.meta.write();
        meta.title = details.title;
        meta.description = details.description;
        Ok(())
    }

    /// Create (when new) or re-save the folder, optionally under a new id.
    ///
    /// A rename yields a fresh, unloaded folder at the new URI.
    pub(crate) async fn save(self: &Arc<Self>, rename_to: Option<&str>) -> FsResult<Arc<Folder>> {
        let name = rename_to.unwrap_or(self.identity.name());
        let (exists, title) = {
            let meta = self.meta.read();
            (meta.exists, meta.title_or(name).to_string())
        };
        let form = FormData::new()
            .text("id", name)
            .text("title", title)
            .text("form.submitted", "1");
        full_save(&self.ctx, &self.identity, exists, "Folder", form).await?;

        let Some(new_name) = rename_to else {
            self.meta.write().exists = true;
            return Ok(self.clone());
        };
        let parent = self.identity.uri().with_path(self.identity.parent_path());
        let renamed = Folder::new(self.ctx.clone(), parent.join(new_name), true);
        {
            let old = self.meta.read();
            let mut meta = renamed.meta.write();
            meta.title = old.title.clone();
            meta.description = old.description.clone();
            meta.ctime = old.ctime;
        }
        Ok(renamed)
    }
}

impl HasLocalCss for Folder {
    fn local_css(&self) -> Option<Arc<LocalCss>> {
        self.local_css.clone()
    }
}

impl HasPortlets for Folder {
    fn portlet_managers(&self) -> Option<&PortletManagers> {
        self.portlets.as_ref()
    }
}
