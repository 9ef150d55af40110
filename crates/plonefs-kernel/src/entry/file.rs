//! Uploaded files.

use parking_lot::RwLock;
use std::sync::Arc;

use super::{EntryMeta, FileBody, SiteContext, endpoint, fetch_external_edit, full_save};
use crate::error::{FsError, FsResult};
use crate::external_edit::ExternalEdit;
use crate::session::FormData;
use crate::single_flight::SingleFlight;
use crate::types::{Identity, RemoteUri};

/// Languages a host editor is assumed to recognize by MIME (sub)type.
const KNOWN_LANGUAGES: &[&str] = &[
    "css",
    "csv",
    "html",
    "javascript",
    "json",
    "markdown",
    "php",
    "python",
    "sql",
    "typescript",
    "xml",
    "yaml",
];

/// Editor language hint for a MIME type: subtype first, then type.
pub fn language_for_content_type(content_type: &str) -> String {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    let (kind, subtype) = mime.split_once('/').unwrap_or((mime, ""));
    let subtype = subtype.strip_prefix("x-").unwrap_or(subtype);
    [subtype, kind]
        .into_iter()
        .find(|candidate| KNOWN_LANGUAGES.contains(candidate))
        .unwrap_or("plaintext")
        .to_string()
}

/// Result of `at_download/file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub language: String,
}

/// An uploaded file. Its payload has no structured-field section.
#[derive(Debug)]
pub struct File {
    ctx: Arc<SiteContext>,
    identity: Identity,
    meta: RwLock<EntryMeta>,
    body: RwLock<FileBody>,
    language: RwLock<String>,
    flight: SingleFlight<()>,
}

impl File {
    pub fn new(ctx: Arc<SiteContext>, uri: RemoteUri, exists: bool) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            identity: Identity::new(uri),
            meta: RwLock::new(EntryMeta::new(exists)),
            body: RwLock::new(FileBody::default()),
            language: RwLock::new("plaintext".to_string()),
            flight: SingleFlight::new(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn meta(&self) -> &RwLock<EntryMeta> {
        &self.meta
    }

    pub fn is_loaded(&self) -> bool {
        self.body.read().loaded
    }

    pub fn data(&self) -> Vec<u8> {
        self.body.read().data.clone()
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.body.read().settings.get(key).cloned()
    }

    /// Language hint derived from the stored content type.
    pub fn language(&self) -> String {
        self.language.read().clone()
    }

    pub async fn load(self: &Arc<Self>, force: bool) -> FsResult<()> {
        if !force && self.is_loaded() {
            return Ok(());
        }
        let file = self.clone();
        self.flight
            .run(move || async move { file.fetch().await })
            .await
    }

    async fn fetch(&self) -> FsResult<()> {
        let payload = fetch_external_edit(&self.ctx, &self.identity).await?;
        let parsed = ExternalEdit::parse_file(&payload)?;
        let settings = parsed.settings();

        if let Some(content_type) = settings.get("content_type") {
            *self.language.write() = language_for_content_type(content_type);
        }
        let mut body = self.body.write();
        let mut meta = self.meta.write();
        meta.absorb_settings(&settings);
        meta.size = parsed.content.len() as u64;
        body.data = parsed.content;
        body.settings = settings;
        body.loaded = true;
        Ok(())
    }

    /// Raw bytes from `at_download/file`, with the served content type.
    pub async fn download(&self) -> FsResult<Download> {
        let path = endpoint(self.identity.path(), "at_download/file");
        let response = self.ctx.session.get(&path).await?;
        if response.status != 200 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("download {}", self.identity.path()),
            ));
        }
        let content_type = response.header("content-type").map(str::to_string);
        let language = content_type
            .as_deref()
            .map_or_else(|| "plaintext".to_string(), language_for_content_type);
        Ok(Download {
            data: response.body,
            content_type,
            language,
        })
    }

    /// Files always take the full save: the upload field is the only way to
    /// replace their bytes.
    pub(crate) async fn save(
        self: &Arc<Self>,
        content: Option<Vec<u8>>,
        rename_to: Option<&str>,
    ) -> FsResult<Arc<File>> {
        let exists = self.meta.read().exists;
        let loaded = self.is_loaded();
        let name = rename_to.unwrap_or(self.identity.name());
        let title = self.meta.read().title_or(name).to_string();

        // An unloaded file being renamed keeps its remote bytes untouched.
        let upload = match content {
            Some(data) => Some(data),
            None if loaded => Some(self.data()),
            None if !exists => Some(Vec::new()),
            None => None,
        }
        .map(|data| if data.is_empty() { b"\n".to_vec() } else { data });

        let mut form = FormData::new()
            .text("id", name)
            .text("title", title)
            .text("form.submitted", "1");
        if let Some(data) = &upload {
            form = form.file("file_file", name, data.clone());
        }
        full_save(&self.ctx, &self.identity, exists, "File", form).await?;

        let target = match rename_to {
            Some(new_name) => {
                let parent = self.identity.uri().with_path(self.identity.parent_path());
                let renamed = File::new(self.ctx.clone(), parent.join(new_name), true);
                *renamed.meta.write() = self.meta.read().clone();
                *renamed.body.write() = self.body.read().clone();
                *renamed.language.write() = self.language();
                renamed
            }
            None => self.clone(),
        };
        match upload {
            Some(data) => {
                let mut body = target.body.write();
                target.meta.write().committed(data.len());
                body.data = data;
                body.loaded = true;
            }
            None => target.meta.write().exists = true,
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_for_content_type() {
        assert_eq!(language_for_content_type("text/css; charset=utf-8"), "css");
        assert_eq!(language_for_content_type("application/x-javascript"), "javascript");
        assert_eq!(language_for_content_type("application/json"), "json");
        assert_eq!(language_for_content_type("text/plain"), "plaintext");
        assert_eq!(language_for_content_type("image/png"), "plaintext");
    }
}
