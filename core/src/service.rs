use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::auth;
use crate::db::Database;
use crate::models::{
    Comment, NewPost, Post, PostDetail, PostSort, ResolvedRecipe, SavedRecipeRef, Session,
    UpdatePost, non_blank, validate_comment, validate_email, validate_password,
    validate_post_title, validate_recipe_id,
};
use crate::resolver::{
    RecipeLookup, ResolveError, ResolverConfig, SavedRecipeResolver, SavedRecipeStore, StoreError,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[allow(clippy::needless_pass_by_value)]
fn invalid(err: anyhow::Error) -> ServiceError {
    ServiceError::Invalid(format!("{err}"))
}

fn require<'s>(session: Option<&'s Session>, action: &str) -> ServiceResult<&'s Session> {
    session.ok_or_else(|| ServiceError::Unauthorized(format!("You must be signed in to {action}")))
}

pub struct CookbookService {
    db: Database,
}

impl CookbookService {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> anyhow::Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Accounts ---

    pub fn sign_up(&self, email: &str, password: &str) -> ServiceResult<Session> {
        let email = validate_email(email).map_err(invalid)?;
        validate_password(password).map_err(invalid)?;

        if self.db.get_credentials(&email)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "An account for '{email}' already exists"
            )));
        }

        let salt = auth::generate_salt();
        let hash = auth::hash_password(password, &salt);
        let user = self.db.insert_user(&email, &hash, &salt)?;
        info!(user_id = user.id, "account created");
        Ok(self.db.create_session(user.id)?)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> ServiceResult<Session> {
        let rejected = || ServiceError::Unauthorized("Invalid email or password".to_string());

        let email = validate_email(email).map_err(|_| rejected())?;
        let creds = self.db.get_credentials(&email)?.ok_or_else(rejected)?;
        if !auth::verify_password(password, &creds.salt, &creds.password_hash) {
            debug!(user_id = creds.user.id, "sign-in rejected");
            return Err(rejected());
        }
        Ok(self.db.create_session(creds.user.id)?)
    }

    pub fn sign_out(&self, token: &str) -> ServiceResult<bool> {
        Ok(self.db.delete_session(token)?)
    }

    pub fn session(&self, token: &str) -> ServiceResult<Option<Session>> {
        Ok(self.db.get_session(token)?)
    }

    // --- Saved recipes ---

    pub fn save_recipe(
        &self,
        session: Option<&Session>,
        recipe_id: &str,
    ) -> ServiceResult<SavedRecipeRef> {
        let session = require(session, "save recipes")?;
        let recipe_id = validate_recipe_id(recipe_id).map_err(invalid)?;
        Ok(self.db.save_recipe(session.user_id, &recipe_id)?)
    }

    pub fn unsave_recipe(&self, session: Option<&Session>, recipe_id: &str) -> ServiceResult<bool> {
        let session = require(session, "remove saved recipes")?;
        let recipe_id = validate_recipe_id(recipe_id).map_err(invalid)?;
        Ok(self.db.delete_saved_recipe(session.user_id, &recipe_id)?)
    }

    pub fn is_saved(&self, session: Option<&Session>, recipe_id: &str) -> ServiceResult<bool> {
        match session {
            Some(s) => Ok(self.db.is_recipe_saved(s.user_id, recipe_id.trim())?),
            None => Ok(false),
        }
    }

    pub fn saved_refs(&self, session: Option<&Session>) -> ServiceResult<Vec<SavedRecipeRef>> {
        match session {
            Some(s) => Ok(self.db.list_saved_recipes(s.user_id)?),
            None => Ok(Vec::new()),
        }
    }

    /// Saved recipes with titles resolved through `lookup`.
    pub async fn saved_recipes<L: RecipeLookup + ?Sized>(
        &self,
        lookup: &L,
        config: ResolverConfig,
        session: Option<&Session>,
    ) -> Result<Vec<ResolvedRecipe>, ResolveError> {
        SavedRecipeResolver::with_config(lookup, config)
            .resolve(self, session)
            .await
    }

    // --- Posts ---

    pub fn create_post(&self, session: Option<&Session>, post: NewPost) -> ServiceResult<Post> {
        let session = require(session, "create a post")?;
        let title = validate_post_title(&post.title).map_err(invalid)?;
        let recipe_id = match post.recipe_id.as_deref() {
            Some(id) => self.saved_recipe_id(session, id)?,
            None => {
                return Err(ServiceError::Invalid(
                    "Please choose a recipe for this post".to_string(),
                ));
            }
        };

        let post = NewPost {
            title,
            content: non_blank(post.content),
            image_url: non_blank(post.image_url).map(|u| u.trim().to_string()),
            recipe_id: Some(recipe_id),
        };
        let created = self.db.insert_post(session.user_id, &post)?;
        info!(post_id = created.id, user_id = session.user_id, "post created");
        Ok(created)
    }

    /// Posts are about recipes their author has saved.
    fn saved_recipe_id(&self, session: &Session, recipe_id: &str) -> ServiceResult<String> {
        let recipe_id = validate_recipe_id(recipe_id).map_err(invalid)?;
        if !self.db.is_recipe_saved(session.user_id, &recipe_id)? {
            return Err(ServiceError::Invalid(format!(
                "Recipe '{recipe_id}' is not in your saved recipes"
            )));
        }
        Ok(recipe_id)
    }

    pub fn list_posts(&self, search: Option<&str>, sort: PostSort) -> ServiceResult<Vec<Post>> {
        Ok(self.db.list_posts(search, sort)?)
    }

    pub fn get_post(&self, id: i64) -> ServiceResult<Post> {
        self.db
            .get_post(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("Post {id} not found")))
    }

    pub fn get_post_detail(&self, id: i64) -> ServiceResult<PostDetail> {
        let post = self.get_post(id)?;
        let comments = self.db.list_comments(id)?;
        Ok(PostDetail { post, comments })
    }

    fn owned_post(&self, session: Option<&Session>, id: i64, action: &str) -> ServiceResult<Post> {
        let session = require(session, action)?;
        let post = self.get_post(id)?;
        if post.user_id != session.user_id {
            return Err(ServiceError::Forbidden(format!(
                "You are not allowed to {action}"
            )));
        }
        Ok(post)
    }

    pub fn update_post(
        &self,
        session: Option<&Session>,
        id: i64,
        update: UpdatePost,
    ) -> ServiceResult<Post> {
        let session = require(session, "edit this post")?;
        self.owned_post(Some(session), id, "edit this post")?;

        if update.is_empty() {
            return Err(ServiceError::Invalid(
                "At least one field must be provided".to_string(),
            ));
        }

        let update = UpdatePost {
            title: update
                .title
                .as_deref()
                .map(validate_post_title)
                .transpose()
                .map_err(invalid)?,
            content: update.content.map(non_blank),
            image_url: update
                .image_url
                .map(|u| non_blank(u).map(|v| v.trim().to_string())),
            recipe_id: update
                .recipe_id
                .as_deref()
                .map(|recipe| self.saved_recipe_id(session, recipe))
                .transpose()?,
        };
        Ok(self.db.update_post(id, &update)?)
    }

    pub fn delete_post(&self, session: Option<&Session>, id: i64) -> ServiceResult<()> {
        self.owned_post(session, id, "delete this post")?;
        self.db.delete_post(id)?;
        info!(post_id = id, "post deleted");
        Ok(())
    }

    pub fn upvote_post(&self, id: i64) -> ServiceResult<Post> {
        self.db
            .increment_upvotes(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("Post {id} not found")))
    }

    // --- Comments ---

    pub fn add_comment(
        &self,
        session: Option<&Session>,
        post_id: i64,
        content: &str,
    ) -> ServiceResult<Comment> {
        let session = require(session, "comment")?;
        let content = validate_comment(content).map_err(invalid)?;
        self.get_post(post_id)?;
        Ok(self.db.insert_comment(post_id, session.user_id, &content)?)
    }

    pub fn list_comments(&self, post_id: i64) -> ServiceResult<Vec<Comment>> {
        self.get_post(post_id)?;
        Ok(self.db.list_comments(post_id)?)
    }
}

impl SavedRecipeStore for CookbookService {
    fn list_saved(&self, user_id: i64) -> Result<Vec<SavedRecipeRef>, StoreError> {
        self.db.list_saved(user_id)
    }
}
