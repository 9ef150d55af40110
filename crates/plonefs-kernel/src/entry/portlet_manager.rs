//! Portlet managers: virtual folders of portlets.
//!
//! A manager's path is its owner's path plus a `++contextportlets++` token.
//! It never appears in a folder listing; the resolver enters it when a path
//! segment matches one of the tokens.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::{Entry, EntryMeta, Portlet, SiteContext, endpoint};
use crate::error::{FsError, FsResult};
use crate::portlet_form::{authenticator_token, parse_manager_listing};
use crate::session::FormData;
use crate::single_flight::SingleFlight;
use crate::types::{Identity, RemoteUri};

/// Layout side a manager renders on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PortletSide {
    Top,
    Right,
    Bottom,
    Left,
}

impl PortletSide {
    /// Path segment addressing this side's manager.
    pub fn token(&self) -> &'static str {
        match self {
            PortletSide::Top => "++contextportlets++uofl.heromanager",
            PortletSide::Right => "++contextportlets++plone.rightcolumn",
            PortletSide::Bottom => "++contextportlets++uofl.prefootermanager",
            PortletSide::Left => "++contextportlets++plone.leftcolumn",
        }
    }

    /// Element id suffix on `@@manage-portlets`.
    pub fn dom_id(&self) -> &'static str {
        match self {
            PortletSide::Top => "uofl-heromanager",
            PortletSide::Right => "plone-rightcolumn",
            PortletSide::Bottom => "uofl-prefootermanager",
            PortletSide::Left => "plone-leftcolumn",
        }
    }

    pub fn from_token(segment: &str) -> Option<Self> {
        PortletSide::iter().find(|side| side.token() == segment)
    }
}

#[derive(Debug, Default)]
struct Portlets {
    entries: BTreeMap<String, Arc<Portlet>>,
    loaded: bool,
}

/// Container of one side's portlets.
#[derive(Debug)]
pub struct PortletManager {
    ctx: Arc<SiteContext>,
    identity: Identity,
    side: PortletSide,
    owner: RemoteUri,
    meta: RwLock<EntryMeta>,
    portlets: RwLock<Portlets>,
    flight: SingleFlight<()>,
}

impl PortletManager {
    pub fn new(ctx: Arc<SiteContext>, owner: RemoteUri, side: PortletSide) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            identity: Identity::new(owner.join(side.token())),
            side,
            owner,
            meta: RwLock::new(EntryMeta::new(true)),
            portlets: RwLock::new(Portlets::default()),
            flight: SingleFlight::new(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn meta(&self) -> &RwLock<EntryMeta> {
        &self.meta
    }

    pub fn side(&self) -> PortletSide {
        self.side
    }

    /// The folder or page this manager belongs to.
    pub fn owner(&self) -> &RemoteUri {
        &self.owner
    }

    pub fn is_loaded(&self) -> bool {
        self.portlets.read().loaded
    }

    pub fn children(&self) -> Vec<Entry> {
        self.portlets
            .read()
            .entries
            .values()
            .cloned()
            .map(Entry::Portlet)
            .collect()
    }

    pub fn child(&self, name: &str) -> Option<Arc<Portlet>> {
        self.portlets.read().entries.get(name).cloned()
    }

    pub async fn load_entries(self: &Arc<Self>, force: bool) -> FsResult<()> {
        if !force && self.is_loaded() {
            return Ok(());
        }
        let manager = self.clone();
        self.flight
            .run(move || async move { manager.fetch_entries().await })
            .await
    }

    async fn manage_page(&self) -> FsResult<String> {
        let path = endpoint(self.owner.path(), "@@manage-portlets");
        let response = self.ctx.session.get(&path).await?;
        if response.status != 200 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("portlets of {}", self.owner.path()),
            ));
        }
        Ok(response.body_text())
    }

    async fn fetch_entries(&self) -> FsResult<()> {
        let html = self.manage_page().await?;
        let entries: BTreeMap<String, Arc<Portlet>> = parse_manager_listing(&html, self.side.dom_id())
            .into_iter()
            .map(|link| {
                let portlet = Portlet::new(self.ctx.clone(), self.identity.uri().join(&link.name), true);
                portlet.meta().write().title = link.title;
                (link.name, portlet)
            })
            .collect();
        tracing::debug!(manager = %self.identity.path(), count = entries.len(), "listed portlets");

        let mut portlets = self.portlets.write();
        self.meta.write().size = entries.len() as u64;
        portlets.entries = entries;
        portlets.loaded = true;
        Ok(())
    }

    /// Add a static text portlet titled `header`.
    ///
    /// The CMS picks the new portlet's id, so the manager is re-listed and
    /// the id missing from the listing taken before the add is the new one.
    /// Headers need not be unique; one only breaks a tie between several
    /// new ids.
    pub async fn add(self: &Arc<Self>, header: &str, content: &[u8]) -> FsResult<Arc<Portlet>> {
        let html = self.manage_page().await?;
        let token = authenticator_token(&html)
            .ok_or_else(|| FsError::unavailable("portlet management page has no _authenticator"))?;
        let before: HashSet<String> = parse_manager_listing(&html, self.side.dom_id())
            .into_iter()
            .map(|link| link.name)
            .collect();

        let text = if content.is_empty() {
            b"\n".to_vec()
        } else {
            content.to_vec()
        };
        let form = FormData::new()
            .text("form.header", header)
            .bytes("form.text", text)
            .text("_authenticator", token)
            .text("form.actions.save", "Save");
        let path = endpoint(self.identity.path(), "+/plone.portlet.static.Static");
        let response = self.ctx.session.post(&path, &form).await?;
        if response.status != 302 {
            return Err(FsError::unexpected_status(
                response.status,
                &format!("add portlet to {}", self.identity.path()),
            ));
        }

        self.load_entries(true).await?;
        let added = {
            let portlets = self.portlets.read();
            let new: Vec<&Arc<Portlet>> = portlets
                .entries
                .iter()
                .filter(|(name, _)| !before.contains(*name))
                .map(|(_, portlet)| portlet)
                .collect();
            match new.as_slice() {
                [only] => Some(Arc::clone(only)),
                _ => new
                    .iter()
                    .find(|portlet| portlet.header() == header)
                    .map(|portlet| Arc::clone(portlet)),
            }
        };
        added.ok_or_else(|| {
            FsError::unavailable(format!(
                "added portlet {header} not listed in {}",
                self.identity.path()
            ))
        })
    }
}

/// The four managers of one owner.
#[derive(Debug, Clone)]
pub struct PortletManagers {
    top: Arc<PortletManager>,
    right: Arc<PortletManager>,
    bottom: Arc<PortletManager>,
    left: Arc<PortletManager>,
}

impl PortletManagers {
    pub fn new(ctx: &Arc<SiteContext>, owner: &RemoteUri) -> Self {
        let manager = |side| PortletManager::new(ctx.clone(), owner.clone(), side);
        Self {
            top: manager(PortletSide::Top),
            right: manager(PortletSide::Right),
            bottom: manager(PortletSide::Bottom),
            left: manager(PortletSide::Left),
        }
    }

    pub fn get(&self, side: PortletSide) -> &Arc<PortletManager> {
        match side {
            PortletSide::Top => &self.top,
            PortletSide::Right => &self.right,
            PortletSide::Bottom => &self.bottom,
            PortletSide::Left => &self.left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_round_trip() {
        for side in PortletSide::iter() {
            assert_eq!(PortletSide::from_token(side.token()), Some(side));
        }
        assert_eq!(
            PortletSide::from_token("++contextportlets++plone.rightcolumn"),
            Some(PortletSide::Right)
        );
        assert_eq!(PortletSide::from_token("plone.rightcolumn"), None);
        assert_eq!(PortletSide::Bottom.to_string(), "bottom");
    }
}
