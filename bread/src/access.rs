//! Login and permission gate in front of every view.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::scaffold::{Bread, ViewKind};

/// The requesting user as seen by the permission system.
pub trait Principal {
    fn is_authenticated(&self) -> bool;

    /// `perm` is a full name such as `tests.change_breadtestmodel`.
    fn has_perm(&self, perm: &str) -> bool;
}

/// Nobody is logged in.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Principal for Anonymous {
    fn is_authenticated(&self) -> bool {
        false
    }

    fn has_perm(&self, _perm: &str) -> bool {
        false
    }
}

/// A logged-in user holding a fixed set of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default)]
    pub superuser: bool,
}

impl User {
    pub fn new<I, S>(name: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            superuser: false,
        }
    }
}

impl Principal for User {
    fn is_authenticated(&self) -> bool {
        true
    }

    fn has_perm(&self, perm: &str) -> bool {
        self.superuser || self.permissions.contains(perm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Redirect to the login page, coming back to the request afterwards.
    Login { location: String },
    Forbidden,
}

pub fn check_access(
    bread: &Bread,
    view: ViewKind,
    principal: &dyn Principal,
    request_path: &str,
    login_url: &str,
) -> Access {
    if !principal.is_authenticated() {
        return Access::Login {
            location: login_redirect(login_url, request_path),
        };
    }
    if !principal.has_perm(&bread.permission(view)) {
        return Access::Forbidden;
    }
    Access::Granted
}

/// `{login_url}?next={request_path}`, with the path percent-encoded.
pub fn login_redirect(login_url: &str, request_path: &str) -> String {
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!(
        "{login_url}{separator}next={}",
        urlencoding::encode(request_path)
    )
}
