mod auth;
mod helpers;
mod post;
mod recipe;
mod saved;

use anyhow::Result;

use crate::config::Config;
use cookbuddy_core::models::Session;
use cookbuddy_core::service::CookbookService;

pub(crate) use auth::{cmd_signin, cmd_signout, cmd_signup, cmd_whoami};
pub(crate) use post::{
    cmd_comment, cmd_post_create, cmd_post_delete, cmd_post_edit, cmd_post_list, cmd_post_show,
    cmd_post_upvote,
};
pub(crate) use recipe::{cmd_discover, cmd_recipe};
pub(crate) use saved::{cmd_save, cmd_saved, cmd_unsave};

/// Session for the token stored in the data directory. A token the database
/// no longer knows is treated as signed out.
pub(super) fn current_session(svc: &CookbookService, config: &Config) -> Result<Option<Session>> {
    let Some(token) = config.load_session_token()? else {
        return Ok(None);
    };
    let session = svc.session(&token)?;
    if session.is_none() {
        tracing::debug!("stored session token is no longer valid");
    }
    Ok(session)
}
