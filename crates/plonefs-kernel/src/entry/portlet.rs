//! Static text portlets.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

use super::{EntryMeta, FileBody, SiteContext, endpoint};
use crate::error::{FsError, FsResult};
use crate::portlet_form::parse_edit_form;
use crate::session::FormData;
use crate::single_flight::SingleFlight;
use crate::types::{Identity, RemoteUri};

/// A text portlet. Its header is the entry title; the other edit-form
/// fields are carried opaquely and sent back on save.
#[derive(Debug)]
pub struct Portlet {
    ctx: Arc<SiteContext>,
    identity: Identity,
    meta: RwLock<EntryMeta>,
    body: RwLock<FileBody>,
    inputs: RwLock<IndexMap<String, String>>,
    flight: SingleFlight<()>,
}

impl Portlet {
    pub fn new(ctx: Arc<SiteContext>, uri: RemoteUri, exists: bool) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            identity: Identity::new(uri),
            meta: RwLock::new(EntryMeta::new(exists)),
            body: RwLock::new(FileBody::default()),
            inputs: RwLock::new(IndexMap::new()),
            flight: SingleFlight::new(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn meta(&self) -> &RwLock<EntryMeta> {
        &self.meta
    }

    pub fn header(&self) -> String {
        self.meta.read().title.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.body.read().loaded
    }

    pub fn data(&self) -> Vec<u8> {
        self.body.read().data.clone()
    }

    /// Opaque form fields captured at load.
    pub fn inputs(&self) -> IndexMap<String, String> {
        self.inputs.read().clone()
    }

    pub async fn load(self: &Arc<Self>, force: bool) -> FsResult<()> {
        if !force && self.is_loaded() {
            return Ok(());
        }
        let portlet = self.clone();
        self.flight
            .run(move || async move { portlet.fetch().await })
            .await
    }

    async fn fetch(&self) -> FsResult<()> {
        let path = endpoint(self.identity.path(), "edit");
        let response = self.ctx.session.get(&path).await?;
        if response.status != 200 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("load portlet {}", self.identity.path()),
            ));
        }
        let form = parse_edit_form(&response.body_text())?;

        *self.inputs.write() = form.fields;
        let mut body = self.body.write();
        self.meta.write().size = form.content.len() as u64;
        body.data = form.content.into_bytes();
        body.loaded = true;
        Ok(())
    }

    /// Post the edit form back with new text.
    ///
    /// New portlets are created through [`super::PortletManager::add`],
    /// which knows the manager's form token.
    pub(crate) async fn save(self: &Arc<Self>, content: Option<Vec<u8>>) -> FsResult<()> {
        if !self.meta.read().exists {
            return Err(FsError::unavailable(format!(
                "{}: new portlets are added through their manager",
                self.identity.path()
            )));
        }
        // The form must be posted whole; load it first so inputs are known.
        self.load(false).await?;

        let data = content.unwrap_or_else(|| self.data());
        let text = if data.is_empty() { b"\n".to_vec() } else { data };
        let header = {
            let meta = self.meta.read();
            meta.title_or(self.identity.name()).to_string()
        };
        let mut form = FormData::new();
        for (name, value) in self.inputs() {
            form = form.text(name, value);
        }
        let form = form
            .text("form.header", header)
            .bytes("form.text", text.clone())
            .text("form.actions.save", "Save");

        let path = endpoint(self.identity.path(), "edit");
        let response = self.ctx.session.post(&path, &form).await?;
        if response.status != 302 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("save portlet {}", self.identity.path()),
            ));
        }

        let mut body = self.body.write();
        self.meta.write().committed(text.len());
        body.data = text;
        Ok(())
    }
}
