//! Registered sites with longest-prefix routing.
//!
//! Every site is registered explicitly with its own session. A URI is routed
//! to the site whose root is its longest prefix: with `/nursing` and
//! `/nursing/research` both registered, `/nursing/research/page` goes to
//! the latter.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::entry::{Folder, SiteContext, SiteFeatures};
use crate::error::{FsError, FsResult};
use crate::session::{Authenticator, Session, Transport};
use crate::types::RemoteUri;

/// One registered site: its session and lazily loaded tree.
pub struct Site {
    ctx: Arc<SiteContext>,
    root: Arc<Folder>,
    /// One clipboard cookie per session: cut/copy + paste pairs run one at a time.
    clipboard: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Site")
            .field("uri", self.uri())
            .field("features", &self.ctx.features)
            .finish()
    }
}

impl Site {
    pub fn new(
        uri: RemoteUri,
        features: SiteFeatures,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Arc<Self> {
        let session = Arc::new(Session::new(uri.clone(), transport, authenticator));
        let ctx = SiteContext::new(session, features);
        let root = Folder::site_root(ctx.clone(), uri);
        Arc::new(Self {
            ctx,
            root,
            clipboard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn uri(&self) -> &RemoteUri {
        self.root.identity().uri()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.ctx.session
    }

    pub fn context(&self) -> &Arc<SiteContext> {
        &self.ctx
    }

    pub fn features(&self) -> SiteFeatures {
        self.ctx.features
    }

    /// Root folder of the site's tree.
    pub fn root(&self) -> &Arc<Folder> {
        &self.root
    }

    pub(crate) async fn lock_clipboard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.clipboard.lock().await
    }
}

/// Routes URIs to registered sites.
#[derive(Default)]
pub struct SiteRegistry {
    sites: RwLock<BTreeMap<RemoteUri, Arc<Site>>>,
}

impl fmt::Debug for SiteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteRegistry")
            .field("sites", &self.sites.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a site, replacing (and returning) one at the same root.
    pub fn register(&self, site: Arc<Site>) -> Option<Arc<Site>> {
        tracing::info!(site = %site.uri(), "registered site");
        self.sites.write().insert(site.uri().clone(), site)
    }

    /// Drop a site and its session. Returns false if it was not registered.
    pub fn unregister(&self, uri: &RemoteUri) -> bool {
        let removed = self.sites.write().remove(uri).is_some();
        if removed {
            tracing::info!(site = %uri, "unregistered site");
        }
        removed
    }

    pub fn get(&self, uri: &RemoteUri) -> Option<Arc<Site>> {
        self.sites.read().get(uri).cloned()
    }

    /// Roots of all registered sites.
    pub fn list(&self) -> Vec<RemoteUri> {
        self.sites.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.read().is_empty()
    }

    /// Find the site for `uri` and the path below its root.
    pub fn route(&self, uri: &RemoteUri) -> FsResult<(Arc<Site>, String)> {
        let sites = self.sites.read();
        let best = sites
            .iter()
            .filter(|(root, _)| root.contains(uri))
            .max_by_key(|(root, _)| root.path().len());
        match best {
            Some((root, site)) => {
                let relative = root.relative(uri).unwrap_or_default().to_string();
                Ok((site.clone(), relative))
            }
            None => Err(FsError::not_found(format!("no site registered for {uri}"))),
        }
    }
}
