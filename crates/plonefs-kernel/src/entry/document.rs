//! Pages and document-like content.
//!
//! Pages (`normalized_type == "document"`) can also be checked out into a
//! working copy and checked back in; other document-like types only carry
//! content and a publish state.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use super::{
    EntryMeta, FileBody, HasLocalCss, HasPortlets, HasWorkflowState, LocalCss, PortletManagers,
    SiteContext, endpoint, fetch_external_edit, full_save, location_path, quick_save,
};
use crate::error::{FsError, FsResult};
use crate::external_edit::ExternalEdit;
use crate::naming::is_copy_name;
use crate::session::{FormData, HttpResponse};
use crate::single_flight::SingleFlight;
use crate::types::{EntryKind, Identity, RemoteUri};
use crate::workflow::{WorkflowAction, WorkflowState, check_transition};

/// A page or document-like object with rich-text content.
#[derive(Debug)]
pub struct Document {
    ctx: Arc<SiteContext>,
    identity: Identity,
    page: bool,
    meta: RwLock<EntryMeta>,
    body: RwLock<FileBody>,
    state: RwLock<Option<WorkflowState>>,
    flight: SingleFlight<()>,
    local_css: Option<Arc<LocalCss>>,
    portlets: Option<PortletManagers>,
}

impl Document {
    pub fn new(
        ctx: Arc<SiteContext>,
        uri: RemoteUri,
        page: bool,
        exists: bool,
        state: Option<WorkflowState>,
    ) -> Arc<Self> {
        let local_css = ctx
            .features
            .local_css
            .then(|| LocalCss::new(ctx.clone(), uri.clone(), false));
        let portlets = ctx
            .features
            .portlets
            .then(|| PortletManagers::new(&ctx, &uri));
        Arc::new(Self {
            identity: Identity::new(uri),
            page,
            meta: RwLock::new(EntryMeta::new(exists)),
            body: RwLock::new(FileBody::default()),
            state: RwLock::new(state),
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

    pub fn kind(&self) -> EntryKind {
        if self.page {
            EntryKind::Page
        } else {
            EntryKind::Document
        }
    }

    pub fn is_page(&self) -> bool {
        self.page
    }

    pub fn is_loaded(&self) -> bool {
        self.body.read().loaded
    }

    pub fn data(&self) -> Vec<u8> {
        self.body.read().data.clone()
    }

    /// Raw field value from the last load.
    pub fn setting(&self, key: &str) -> Option<String> {
        self.body.read().settings.get(key).cloned()
    }

    /// Fetch and parse the external-edit payload.
    pub async fn load(self: &Arc<Self>, force: bool) -> FsResult<()> {
        if !force && self.is_loaded() {
            return Ok(());
        }
        let document = self.clone();
        self.flight
            .run(move || async move { document.fetch().await })
            .await
    }

    async fn fetch(&self) -> FsResult<()> {
        let payload = fetch_external_edit(&self.ctx, &self.identity).await?;
        let parsed = ExternalEdit::parse(&payload)?;
        let settings = parsed.settings();

        let mut body = self.body.write();
        let mut meta = self.meta.write();
        meta.absorb_settings(&settings);
        meta.size = parsed.content.len() as u64;
        body.data = parsed.content;
        body.settings = settings;
        body.loaded = true;
        Ok(())
    }

    /// Save content and/or a new id.
    ///
    /// An existing object keeping its name takes the quick single-field
    /// save. Creating or renaming needs the full edit form, which carries
    /// the text too so a rename-and-edit loses nothing.
    pub(crate) async fn save(
        self: &Arc<Self>,
        content: Option<Vec<u8>>,
        rename_to: Option<&str>,
    ) -> FsResult<Arc<Document>> {
        let exists = self.meta.read().exists;

        if exists && rename_to.is_none() {
            let data = content.unwrap_or_else(|| self.data());
            quick_save(&self.ctx, self.identity.path(), "text", &data).await?;
            self.commit(data);
            return Ok(self.clone());
        }

        let name = rename_to.unwrap_or(self.identity.name());
        let title = self.meta.read().title_or(name).to_string();
        let text = content.or_else(|| {
            let body = self.body.read();
            body.loaded.then(|| body.data.clone())
        });
        let mut form = FormData::new()
            .text("id", name)
            .text("title", title)
            .text("form.submitted", "1");
        if let Some(text) = &text {
            form = match std::str::from_utf8(text) {
                Ok(utf8) => form.text("text", utf8),
                Err(_) => form.bytes("text", text.clone()),
            };
        }
        full_save(&self.ctx, &self.identity, exists, "Document", form).await?;

        let target = match rename_to {
            Some(new_name) => self.renamed(new_name),
            None => self.clone(),
        };
        match text {
            Some(text) => target.commit(text),
            None => target.meta.write().exists = true,
        }
        Ok(target)
    }

    fn commit(&self, data: Vec<u8>) {
        let mut body = self.body.write();
        self.meta.write().committed(data.len());
        body.data = data;
        body.loaded = true;
    }

    /// Same object under a new id, carrying over what is known about it.
    fn renamed(&self, new_name: &str) -> Arc<Document> {
        let parent = self.identity.uri().with_path(self.identity.parent_path());
        let renamed = Document::new(
            self.ctx.clone(),
            parent.join(new_name),
            self.page,
            true,
            *self.state.read(),
        );
        *renamed.meta.write() = self.meta.read().clone();
        *renamed.body.write() = self.body.read().clone();
        renamed
    }

    // ========================================================================
    // Checkout lifecycle
    // ========================================================================

    fn require_page(&self, operation: &str) -> FsResult<()> {
        if self.page {
            Ok(())
        } else {
            Err(FsError::unavailable(format!(
                "{operation}: {} is not a page",
                self.identity.path()
            )))
        }
    }

    async fn iterate_allowed(&self, query: &str) -> FsResult<bool> {
        let path = endpoint(self.identity.path(), &format!("@@iterate_control/{query}"));
        let response = self.ctx.session.get(&path).await?;
        Ok(response.status == 200 && response.body == b"True")
    }

    /// Asks the CMS; another session may hold the checkout.
    pub async fn can_check_out(&self) -> FsResult<bool> {
        if !self.page {
            return Ok(false);
        }
        self.iterate_allowed("checkout_allowed").await
    }

    /// Only working copies (`copy<N>_of_` names) can be checked in.
    pub async fn can_check_in(&self) -> FsResult<bool> {
        if !self.page || !is_copy_name(self.identity.name()) {
            return Ok(false);
        }
        self.iterate_allowed("checkin_allowed").await
    }

    /// Create a working copy; returns its URI.
    pub async fn check_out(&self) -> FsResult<RemoteUri> {
        self.require_page("check out")?;
        let path = endpoint(self.identity.path(), "@@content-checkout");
        let response = self.ctx.session.get(&path).await?;
        let uri = self.redirect_target(&response, "check out")?;
        tracing::info!(page = %self.identity.path(), working_copy = %uri.path(), "checked out");
        Ok(uri)
    }

    /// Check this working copy in; returns the original's URI.
    pub async fn check_in(&self, message: &str) -> FsResult<RemoteUri> {
        self.require_page("check in")?;
        let form = FormData::new()
            .text("checkin_message", message)
            .text("form.button.Checkin", "Check in");
        let path = endpoint(self.identity.path(), "@@content-checkin");
        let response = self.ctx.session.post(&path, &form).await?;
        let uri = self.redirect_target(&response, "check in")?;
        tracing::info!(working_copy = %self.identity.path(), original = %uri.path(), "checked in");
        Ok(uri)
    }

    /// Discard this working copy.
    pub async fn cancel_check_out(&self) -> FsResult<()> {
        self.require_page("cancel checkout")?;
        let form = FormData::new().text("form.button.Cancel", "Cancel checkout");
        let path = endpoint(self.identity.path(), "@@content-cancel-checkout");
        let response = self.ctx.session.post(&path, &form).await?;
        if response.status != 302 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("cancel checkout of {}", self.identity.path()),
            ));
        }
        Ok(())
    }

    fn redirect_target(
        &self,
        response: &HttpResponse,
        operation: &str,
    ) -> FsResult<RemoteUri> {
        if response.status != 302 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("{operation} {}", self.identity.path()),
            ));
        }
        let location = response.location().ok_or_else(|| {
            FsError::unavailable(format!("{operation} {}: no location", self.identity.path()))
        })?;
        Ok(self.identity.uri().with_path(&location_path(location)))
    }
}

#[async_trait]
impl HasWorkflowState for Document {
    fn workflow_state(&self) -> Option<WorkflowState> {
        *self.state.read()
    }

    async fn change_state(&self, action: WorkflowAction) -> FsResult<WorkflowState> {
        let target = check_transition(self.workflow_state(), action)?;
        let path = endpoint(
            self.identity.path(),
            &format!("content_status_modify?workflow_action={action}"),
        );
        let response = self.ctx.session.get(&path).await?;
        if response.status != 302 {
            return Err(FsError::unavailable(format!(
                "{action} on {}: unexpected status {}",
                self.identity.path(),
                response.status
            )));
        }
        *self.state.write() = Some(target);
        tracing::info!(path = %self.identity.path(), %action, state = %target, "workflow transition");
        Ok(target)
    }
}

impl HasLocalCss for Document {
    fn local_css(&self) -> Option<Arc<LocalCss>> {
        self.local_css.clone()
    }
}

impl HasPortlets for Document {
    fn portlet_managers(&self) -> Option<&PortletManagers> {
        self.portlets.as_ref()
    }
}
