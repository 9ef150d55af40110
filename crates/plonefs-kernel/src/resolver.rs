//! Path resolution over the lazy tree.
//!
//! Host paths are walked segment by segment from a site root, loading
//! folders on demand. Two kinds of segment have no real remote object
//! behind them: portlet-manager tokens, which switch into that manager for
//! exactly one more segment, and the trailing `?localCss` marker, which
//! swaps the result for the owner's stylesheet.

use std::sync::Arc;

use crate::entry::{Entry, Folder, PortletSide};
use crate::error::{FsError, FsResult};
use crate::types::RemoteUri;

/// Query marker addressing an entry's local stylesheet.
pub const LOCAL_CSS_MARKER: &str = "localCss";

/// A parsed host path: the object URI plus the local-stylesheet flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub uri: RemoteUri,
    pub local_css: bool,
}

impl Target {
    /// Parse `scheme://authority/path[?localCss]`.
    pub fn parse(value: &str) -> FsResult<Self> {
        let (base, query) = match value.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (value, None),
        };
        let local_css = query.is_some_and(|q| q.split('&').any(|part| part == LOCAL_CSS_MARKER));
        Ok(Self {
            uri: RemoteUri::parse(base)?,
            local_css,
        })
    }

    pub fn new(uri: RemoteUri) -> Self {
        Self {
            uri,
            local_css: false,
        }
    }
}

/// Walk `relative` (slash-separated, relative to `root`) to an entry.
///
/// A missing segment yields `Ok(None)` with `allow_missing`, `NotFound`
/// otherwise. Walking through a file fails with `NotADirectory`.
pub async fn resolve(
    root: &Arc<Folder>,
    relative: &str,
    local_css: bool,
    allow_missing: bool,
) -> FsResult<Option<Entry>> {
    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let missing = |at: &Entry, segment: &str| -> FsResult<Option<Entry>> {
        if allow_missing {
            Ok(None)
        } else {
            Err(FsError::not_found(at.uri().join(segment).path()))
        }
    };

    let mut current = Entry::Folder(root.clone());
    let mut index = 0;
    while index < segments.len() {
        let segment = segments[index];

        if let Some(manager) = PortletSide::from_token(segment)
            .and_then(|side| current.as_portlets().and_then(|p| p.portlet_manager(side)))
        {
            let manager_entry = Entry::PortletManager(manager.clone());
            let Some(&name) = segments.get(index + 1) else {
                current = manager_entry;
                break;
            };
            if index + 2 < segments.len() {
                return Err(FsError::not_a_directory(manager.identity().uri().join(name).path()));
            }
            manager.load_entries(false).await?;
            match manager.child(name) {
                Some(portlet) => {
                    current = Entry::Portlet(portlet);
                    break;
                }
                None => return missing(&manager_entry, name),
            }
        }

        let child = match &current {
            Entry::Folder(folder) => {
                folder.load_entries(false).await?;
                folder.child(segment)
            }
            Entry::PortletManager(manager) => {
                manager.load_entries(false).await?;
                manager.child(segment).map(Entry::Portlet)
            }
            other => return Err(FsError::not_a_directory(other.uri().path())),
        };
        match child {
            Some(child) => current = child,
            None => return missing(&current, segment),
        }
        index += 1;
    }

    if local_css {
        if let Some(css) = current.as_local_css_owner().and_then(|owner| owner.local_css()) {
            return Ok(Some(Entry::LocalCss(css)));
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        let target = Target::parse("plone://h/site/page?localCss").unwrap();
        assert!(target.local_css);
        assert_eq!(target.uri.path(), "/site/page");

        let target = Target::parse("https://h/site/page").unwrap();
        assert!(!target.local_css);

        let target = Target::parse("plone://h/site/page?other=1").unwrap();
        assert!(!target.local_css);
    }
}
