//! Sign-in helpers for the workspace console

mod oauth;

pub use oauth::{
    login_path, oauth_link, purify_href, SearchParams, DEFAULT_PROVIDER, INVITE_TOKEN_PARAM,
};
