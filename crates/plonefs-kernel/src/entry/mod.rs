//! Entry model: the nodes of a site's virtual tree.
//!
//! [`Entry`] is a closed set of reference-counted variants. Behavior that
//! only some variants have is exposed through capability traits
//! ([`HasWorkflowState`], [`HasLocalCss`], [`HasPortlets`]) reached with
//! `Entry::as_*` lookups instead of a class lattice.
//!
//! Every variant owns an immutable [`Identity`]. Renaming builds a new
//! entry; nothing ever edits a URI in place.

mod document;
mod file;
mod folder;
mod local_css;
mod portlet;
mod portlet_manager;

pub use document::Document;
pub use file::{Download, File, language_for_content_type};
pub use folder::Folder;
pub use local_css::LocalCss;
pub use portlet::Portlet;
pub use portlet_manager::{PortletManager, PortletManagers, PortletSide};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{FsError, FsResult};
use crate::external_edit::Settings;
use crate::session::{FormData, Session};
use crate::types::{EntryKind, FileStat, Identity, RemoteUri};
use crate::workflow::{WorkflowAction, WorkflowState};

/// Optional CMS add-ons a site has installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteFeatures {
    /// Folders and documents expose the four portlet managers.
    #[serde(default)]
    pub portlets: bool,
    /// Folders and documents expose a local stylesheet.
    #[serde(default)]
    pub local_css: bool,
}

/// What every entry of one site shares: its session and feature flags.
#[derive(Debug)]
pub struct SiteContext {
    pub session: Arc<Session>,
    pub features: SiteFeatures,
}

impl SiteContext {
    pub fn new(session: Arc<Session>, features: SiteFeatures) -> Arc<Self> {
        Arc::new(Self { session, features })
    }
}

/// Metadata shared by every variant.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub title: String,
    pub description: String,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    pub size: u64,
    /// Remote object confirmed present.
    pub exists: bool,
}

impl EntryMeta {
    pub fn new(exists: bool) -> Self {
        let now = SystemTime::now();
        Self {
            title: String::new(),
            description: String::new(),
            ctime: now,
            mtime: now,
            size: 0,
            exists,
        }
    }

    /// Title, or `fallback` when the object has none.
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.title.is_empty() {
            fallback
        } else {
            &self.title
        }
    }

    fn stat(&self, kind: EntryKind) -> FileStat {
        FileStat {
            kind,
            size: self.size,
            ctime: self.ctime,
            mtime: self.mtime,
            title: self.title.clone(),
            description: self.description.clone(),
            exists: self.exists,
        }
    }

    /// Promote `title` / `description` from parsed settings.
    fn absorb_settings(&mut self, settings: &Settings) {
        if let Some(title) = settings.get("title") {
            self.title = title.clone();
        }
        if let Some(description) = settings.get("description") {
            self.description = description.clone();
        }
    }

    /// Record committed content.
    fn committed(&mut self, size: usize) {
        self.size = size as u64;
        self.mtime = SystemTime::now();
        self.exists = true;
    }
}

/// Content of a file-like entry.
#[derive(Debug, Clone, Default)]
pub struct FileBody {
    pub data: Vec<u8>,
    pub settings: Settings,
    pub loaded: bool,
}

/// A node of the virtual tree.
#[derive(Debug, Clone)]
pub enum Entry {
    Folder(Arc<Folder>),
    /// Page or document-like content (news item, event, collection).
    Document(Arc<Document>),
    File(Arc<File>),
    Portlet(Arc<Portlet>),
    PortletManager(Arc<PortletManager>),
    LocalCss(Arc<LocalCss>),
}

impl Entry {
    pub fn identity(&self) -> &Identity {
        match self {
            Entry::Folder(e) => e.identity(),
            Entry::Document(e) => e.identity(),
            Entry::File(e) => e.identity(),
            Entry::Portlet(e) => e.identity(),
            Entry::PortletManager(e) => e.identity(),
            Entry::LocalCss(e) => e.identity(),
        }
    }

    pub fn meta(&self) -> &RwLock<EntryMeta> {
        match self {
            Entry::Folder(e) => e.meta(),
            Entry::Document(e) => e.meta(),
            Entry::File(e) => e.meta(),
            Entry::Portlet(e) => e.meta(),
            Entry::PortletManager(e) => e.meta(),
            Entry::LocalCss(e) => e.meta(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Folder(_) => EntryKind::Folder,
            Entry::Document(e) => e.kind(),
            Entry::File(_) => EntryKind::File,
            Entry::Portlet(_) => EntryKind::Portlet,
            Entry::PortletManager(_) => EntryKind::PortletManager,
            Entry::LocalCss(_) => EntryKind::LocalCss,
        }
    }

    pub fn uri(&self) -> &RemoteUri {
        self.identity().uri()
    }

    pub fn name(&self) -> &str {
        self.identity().name()
    }

    pub fn is_dir(&self) -> bool {
        self.kind().file_type().is_dir()
    }

    pub fn exists(&self) -> bool {
        self.meta().read().exists
    }

    pub fn stat(&self) -> FileStat {
        self.meta().read().stat(self.kind())
    }

    /// Returns true if two handles point at the same entry.
    pub fn same(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::Folder(a), Entry::Folder(b)) => Arc::ptr_eq(a, b),
            (Entry::Document(a), Entry::Document(b)) => Arc::ptr_eq(a, b),
            (Entry::File(a), Entry::File(b)) => Arc::ptr_eq(a, b),
            (Entry::Portlet(a), Entry::Portlet(b)) => Arc::ptr_eq(a, b),
            (Entry::PortletManager(a), Entry::PortletManager(b)) => Arc::ptr_eq(a, b),
            (Entry::LocalCss(a), Entry::LocalCss(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_folder(&self) -> Option<&Arc<Folder>> {
        match self {
            Entry::Folder(folder) => Some(folder),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Arc<Document>> {
        match self {
            Entry::Document(document) => Some(document),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<File>> {
        match self {
            Entry::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_portlet_manager(&self) -> Option<&Arc<PortletManager>> {
        match self {
            Entry::PortletManager(manager) => Some(manager),
            _ => None,
        }
    }

    /// Workflow capability (pages and documents).
    pub fn as_workflow(&self) -> Option<&dyn HasWorkflowState> {
        match self {
            Entry::Document(document) => Some(document.as_ref()),
            _ => None,
        }
    }

    /// Local stylesheet capability, when the site enables it.
    pub fn as_local_css_owner(&self) -> Option<&dyn HasLocalCss> {
        match self {
            Entry::Folder(folder) => Some(folder.as_ref()),
            Entry::Document(document) => Some(document.as_ref()),
            _ => None,
        }
    }

    /// Portlet capability, when the site enables it.
    pub fn as_portlets(&self) -> Option<&dyn HasPortlets> {
        match self {
            Entry::Folder(folder) => Some(folder.as_ref()),
            Entry::Document(document) => Some(document.as_ref()),
            _ => None,
        }
    }

    /// Load children (directories) or content (files).
    pub async fn load(&self, force: bool) -> FsResult<()> {
        match self {
            Entry::Folder(e) => e.load_entries(force).await,
            Entry::Document(e) => e.load(force).await,
            Entry::File(e) => e.load(force).await,
            Entry::Portlet(e) => e.load(force).await,
            Entry::PortletManager(e) => e.load_entries(force).await,
            Entry::LocalCss(e) => e.load(force).await,
        }
    }

    /// Content of a file-like entry, loading it on first access.
    pub async fn read(&self) -> FsResult<Vec<u8>> {
        match self {
            Entry::Folder(_) | Entry::PortletManager(_) => {
                Err(FsError::is_a_directory(self.uri().path()))
            }
            Entry::Document(e) => {
                e.load(false).await?;
                Ok(e.data())
            }
            Entry::File(e) => {
                e.load(false).await?;
                Ok(e.data())
            }
            Entry::Portlet(e) => {
                e.load(false).await?;
                Ok(e.data())
            }
            Entry::LocalCss(e) => {
                e.load(false).await?;
                Ok(e.data())
            }
        }
    }

    /// Save to the remote, optionally with new content and a new name.
    ///
    /// Returns the entry that now represents the object: `self` unless the
    /// save renamed it. Local state changes only after the remote accepts.
    pub async fn save(&self, content: Option<Vec<u8>>, rename_to: Option<&str>) -> FsResult<Entry> {
        let rename_to = rename_to.filter(|name| *name != self.name());
        match self {
            Entry::Folder(folder) => {
                if content.is_some() {
                    return Err(FsError::is_a_directory(self.uri().path()));
                }
                folder.save(rename_to).await.map(Entry::Folder)
            }
            Entry::Document(document) => document.save(content, rename_to).await.map(Entry::Document),
            Entry::File(file) => file.save(content, rename_to).await.map(Entry::File),
            Entry::Portlet(portlet) => {
                if rename_to.is_some() {
                    return Err(FsError::unsupported("renaming a portlet"));
                }
                portlet.save(content).await?;
                Ok(self.clone())
            }
            Entry::LocalCss(css) => {
                if rename_to.is_some() {
                    return Err(FsError::unsupported("renaming a local stylesheet"));
                }
                css.save(content).await?;
                Ok(self.clone())
            }
            Entry::PortletManager(_) => Err(FsError::unsupported("saving a portlet manager")),
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Objects with a publish state.
#[async_trait]
pub trait HasWorkflowState: Send + Sync {
    /// Current state; None when the listing did not report a known one.
    fn workflow_state(&self) -> Option<WorkflowState>;

    /// Ask the CMS for `action`. The local state moves only on success.
    async fn change_state(&self, action: WorkflowAction) -> FsResult<WorkflowState>;
}

/// Objects that can carry a local stylesheet.
pub trait HasLocalCss: Send + Sync {
    fn local_css(&self) -> Option<Arc<LocalCss>>;
}

/// Objects that own portlet managers.
pub trait HasPortlets: Send + Sync {
    fn portlet_managers(&self) -> Option<&PortletManagers>;

    fn portlet_manager(&self, side: PortletSide) -> Option<Arc<PortletManager>> {
        self.portlet_managers().map(|managers| managers.get(side).clone())
    }
}

// ============================================================================
// Shared remote calls
// ============================================================================

/// `{path}/{view}`, without doubling the slash at the authority root.
pub(crate) fn endpoint(path: &str, view: &str) -> String {
    if path == "/" {
        format!("/{view}")
    } else {
        format!("{path}/{view}")
    }
}

/// Path component of a `Location` header (absolute or path-only).
pub(crate) fn location_path(location: &str) -> String {
    match url::Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location
            .split_once('?')
            .map_or(location, |(path, _)| path)
            .to_string(),
    }
}

/// External-edit payload of `identity`.
pub(crate) async fn fetch_external_edit(ctx: &SiteContext, identity: &Identity) -> FsResult<Vec<u8>> {
    let path = endpoint(identity.parent_path(), &format!("externalEdit_/{}", identity.name()));
    let response = ctx.session.get(&path).await?;
    if response.status != 200 {
        return Err(FsError::unexpected_status(
            response.status,
            &format!("load {}", identity.path()),
        ));
    }
    Ok(response.body)
}

/// Reserve a new object of `type_name` in `parent_path`.
///
/// The CMS answers with a redirect to the new object's edit form; the
/// directory of that location is where the full save goes.
async fn new_save_path(ctx: &SiteContext, parent_path: &str, type_name: &str) -> FsResult<String> {
    let path = endpoint(parent_path, &format!("createObject?type_name={type_name}"));
    let response = ctx.session.get(&path).await?;
    if response.status != 302 {
        return Err(FsError::unexpected_status(
            response.status,
            &format!("create {type_name} in {parent_path}"),
        ));
    }
    let location = response
        .location()
        .ok_or_else(|| FsError::unavailable(format!("create {type_name}: no location")))?;
    let location = location_path(location);
    match location.rsplit_once('/') {
        Some((dir, base)) if base.starts_with("edit") && !dir.is_empty() => Ok(dir.to_string()),
        _ => Err(FsError::unavailable(format!(
            "create {type_name}: bad location {location}"
        ))),
    }
}

/// Full `atct_edit` save, creating the object first when it is new.
pub(crate) async fn full_save(
    ctx: &SiteContext,
    identity: &Identity,
    exists: bool,
    type_name: &str,
    form: FormData,
) -> FsResult<()> {
    let save_path = if exists {
        identity.path().to_string()
    } else {
        new_save_path(ctx, identity.parent_path(), type_name).await?
    };
    let response = ctx.session.post(&endpoint(&save_path, "atct_edit"), &form).await?;
    if response.status != 302 {
        return Err(FsError::unexpected_status(
            response.status,
            &format!("save {}", identity.path()),
        ));
    }
    tracing::debug!(path = %identity.path(), created = !exists, "full save");
    Ok(())
}

/// Single-field `tinymce-save`. The CMS answers exactly `saved`.
pub(crate) async fn quick_save(
    ctx: &SiteContext,
    path: &str,
    fieldname: &str,
    data: &[u8],
) -> FsResult<()> {
    let form = FormData::new().text("fieldname", fieldname);
    let form = match std::str::from_utf8(data) {
        Ok(text) => form.text("text", text),
        Err(_) => form.bytes("text", data.to_vec()),
    };
    let response = ctx.session.post(&endpoint(path, "tinymce-save"), &form).await?;
    if response.body != b"saved" {
        tracing::warn!(path = %path, status = response.status, "quick save not confirmed");
        return Err(FsError::unavailable(format!("save {path}: not confirmed")));
    }
    Ok(())
}
