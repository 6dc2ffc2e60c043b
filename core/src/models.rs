use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Title shown for a saved recipe whose lookup failed.
pub const UNKNOWN_RECIPE_TITLE: &str = "Unknown Recipe";

pub const MIN_PASSWORD_LEN: usize = 6;

// --- Recipes (external lookup) ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub measure: Option<String>,
}

impl Ingredient {
    /// "2 tbsp Soy Sauce", or just the name when no measure is given.
    #[must_use]
    pub fn display(&self) -> String {
        match self.measure.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => format!("{m} {}", self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub category: Option<String>,
    pub area: Option<String>,
    pub instructions: Option<String>,
    pub tags: Option<String>,
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub category: Option<String>,
}

impl From<&Recipe> for RecipeSummary {
    fn from(r: &Recipe) -> Self {
        Self {
            id: r.id.clone(),
            title: r.title.clone(),
            thumbnail: r.thumbnail.clone(),
            category: r.category.clone(),
        }
    }
}

// --- Saved recipes ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecipeRef {
    pub id: i64,
    pub user_id: i64,
    pub recipe_id: String,
    pub created_at: String,
}

/// A saved recipe joined against the lookup client. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecipe {
    pub recipe_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub found: bool,
}

impl ResolvedRecipe {
    #[must_use]
    pub fn found(recipe_id: &str, recipe: Recipe) -> Self {
        Self {
            recipe_id: recipe_id.to_string(),
            title: recipe.title,
            thumbnail: recipe.thumbnail,
            category: recipe.category,
            found: true,
        }
    }

    #[must_use]
    pub fn placeholder(recipe_id: &str) -> Self {
        Self {
            recipe_id: recipe_id.to_string(),
            title: UNKNOWN_RECIPE_TITLE.to_string(),
            thumbnail: None,
            category: None,
            found: false,
        }
    }
}

// --- Accounts ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

/// The authenticated caller. Passed explicitly to every operation that
/// needs an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub email: String,
    pub created_at: String,
}

// --- Posts & comments ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub recipe_id: Option<String>,
    pub upvotes: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub recipe_id: Option<String>,
}

/// Partial post edit. For the clearable fields `Some(None)` removes the value.
#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub recipe_id: Option<String>,
}

impl UpdatePost {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.image_url.is_none()
            && self.recipe_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    #[default]
    Newest,
    Upvotes,
}

impl PostSort {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "newest" | "created_at" | "new" => Ok(Self::Newest),
            "upvotes" | "top" => Ok(Self::Upvotes),
            _ => bail!("Invalid sort '{s}'. Must be one of: newest, upvotes"),
        }
    }

    pub(crate) fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC, id DESC",
            Self::Upvotes => "upvotes DESC, created_at DESC, id DESC",
        }
    }
}

// --- Validation ---

/// Normalize an email address (trim + lowercase) and check its basic shape.
pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        bail!("Invalid email '{email}'");
    };
    if local.is_empty() || domain.is_empty() || email.contains(char::is_whitespace) {
        bail!("Invalid email '{email}'");
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("Password must be at least {MIN_PASSWORD_LEN} characters");
    }
    Ok(())
}

pub fn validate_recipe_id(recipe_id: &str) -> Result<String> {
    let id = recipe_id.trim();
    if id.is_empty() {
        bail!("Recipe id must not be empty");
    }
    Ok(id.to_string())
}

pub fn validate_post_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Post title must not be empty");
    }
    Ok(title.to_string())
}

pub fn validate_comment(content: &str) -> Result<String> {
    let content = content.trim();
    if content.is_empty() {
        bail!("Comment must not be empty");
    }
    Ok(content.to_string())
}

/// Blank optional text collapses to `None`.
#[must_use]
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
