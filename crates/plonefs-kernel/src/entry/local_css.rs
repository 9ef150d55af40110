//! Local stylesheet pseudo-files.
//!
//! Reached through the `?localCss` marker on a folder or page path. A
//! regular owner stores the stylesheet in its `localCss` field; the site
//! root's stylesheet lives inside the `@@localcss-settings` page instead.

use parking_lot::RwLock;
use std::sync::Arc;

use super::{EntryMeta, FileBody, SiteContext, endpoint, fetch_external_edit, quick_save};
use crate::error::{FsError, FsResult};
use crate::external_edit::ExternalEdit;
use crate::session::FormData;
use crate::single_flight::SingleFlight;
use crate::types::{Identity, RemoteUri};

const FIELD: &str = "localCss";
const ROOT_START: &[u8] = b"/* Local CSS from site root */\n";
const ROOT_END: &[u8] = b"\n</style>";

/// Local stylesheet of one folder or page.
#[derive(Debug)]
pub struct LocalCss {
    ctx: Arc<SiteContext>,
    /// The owner's identity: the pseudo-file has no path of its own.
    identity: Identity,
    for_root: bool,
    meta: RwLock<EntryMeta>,
    body: RwLock<FileBody>,
    flight: SingleFlight<()>,
}

impl LocalCss {
    pub fn new(ctx: Arc<SiteContext>, owner: RemoteUri, for_root: bool) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            identity: Identity::new(owner),
            for_root,
            meta: RwLock::new(EntryMeta::new(true)),
            body: RwLock::new(FileBody::default()),
            flight: SingleFlight::new(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn meta(&self) -> &RwLock<EntryMeta> {
        &self.meta
    }

    pub fn is_for_root(&self) -> bool {
        self.for_root
    }

    pub fn is_loaded(&self) -> bool {
        self.body.read().loaded
    }

    pub fn data(&self) -> Vec<u8> {
        self.body.read().data.clone()
    }

    pub async fn load(self: &Arc<Self>, force: bool) -> FsResult<()> {
        if !force && self.is_loaded() {
            return Ok(());
        }
        let css = self.clone();
        self.flight
            .run(move || async move { css.fetch().await })
            .await
    }

    async fn fetch(&self) -> FsResult<()> {
        let (data, settings) = if self.for_root {
            (self.fetch_root().await?, Default::default())
        } else {
            let payload = fetch_external_edit(&self.ctx, &self.identity).await?;
            let settings = ExternalEdit::parse(&payload)?.settings();
            let data = settings
                .get(FIELD)
                .map(|css| css.clone().into_bytes())
                .unwrap_or_default();
            (data, settings)
        };
        let mut body = self.body.write();
        self.meta.write().size = data.len() as u64;
        body.data = data;
        body.settings = settings;
        body.loaded = true;
        Ok(())
    }

    async fn fetch_root(&self) -> FsResult<Vec<u8>> {
        let path = endpoint(self.identity.path(), "@@localcss-settings");
        let response = self.ctx.session.get(&path).await?;
        if response.status != 200 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("load site local css of {}", self.identity.path()),
            ));
        }
        extract_root_css(&response.body).map(<[u8]>::to_vec)
    }

    pub(crate) async fn save(&self, content: Option<Vec<u8>>) -> FsResult<()> {
        let data = content.unwrap_or_else(|| self.data());
        if self.for_root {
            self.save_root(&data).await?;
        } else {
            quick_save(&self.ctx, self.identity.path(), FIELD, &data).await?;
        }
        let mut body = self.body.write();
        self.meta.write().committed(data.len());
        body.data = data;
        body.loaded = true;
        Ok(())
    }

    async fn save_root(&self, data: &[u8]) -> FsResult<()> {
        let post_path = endpoint(self.identity.path(), "@@localcss-settings");
        let form = FormData::new()
            .bytes("form.widgets.site_local_css", data.to_vec())
            .text("form.buttons.save", "Save");
        let response = self.ctx.session.post(&post_path, &form).await?;
        if response.status != 302 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("save site local css of {}", self.identity.path()),
            ));
        }
        // Validation errors also redirect, but elsewhere.
        let expected = self.identity.uri().with_path(&post_path);
        let landed = response
            .location()
            .and_then(|location| RemoteUri::parse(location).ok());
        if landed.as_ref() != Some(&expected) {
            tracing::warn!(
                path = %post_path,
                location = ?response.location(),
                "site local css save redirected elsewhere"
            );
            return Err(FsError::unavailable(format!(
                "save site local css: redirected to {}",
                response.location().unwrap_or("nowhere")
            )));
        }
        Ok(())
    }
}

/// The site root stylesheet inside the `@@localcss-settings` page.
pub(crate) fn extract_root_css(page: &[u8]) -> FsResult<&[u8]> {
    let start = find(page, ROOT_START, 0)
        .ok_or_else(|| FsError::unavailable("could not find start of local css"))?
        + ROOT_START.len();
    let end = find(page, ROOT_END, start)
        .ok_or_else(|| FsError::unavailable("could not find end of local css"))?;
    Ok(&page[start..end])
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|index| index + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_root_css() {
        let page = b"<style>\n/* Local CSS from site root */\nbody { color: red; }\n</style>\n";
        assert_eq!(extract_root_css(page).unwrap(), b"body { color: red; }");
    }

    #[test]
    fn test_extract_root_css_missing_markers() {
        assert!(extract_root_css(b"<html></html>").is_err());
        assert!(extract_root_css(b"/* Local CSS from site root */\nno end").is_err());
    }
}
