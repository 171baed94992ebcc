//! Fan-out Module
//!
//! Finds typed sub-entities inside a payload so they can be cached under
//! their own category and id. Each candidate yields its own `Result`, so one
//! malformed item never hides its siblings.

use serde_json::Value;
use thiserror::Error;

use crate::cache::key::{is_valid_username, username_id};
use crate::cache::{Category, Payload};

/// An entity discovered inside another payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SubEntity {
    pub category: Category,
    pub id: String,
    pub value: Payload,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{0} entry is not an object")]
    NotAnObject(Category),
    #[error("{0} entry has no id")]
    MissingId(Category),
    #[error("{category} entry has an unusable id: {raw}")]
    InvalidId { category: Category, raw: String },
}

// == Contents ==
/// What a cached payload holds, and so which sub-entities it embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contents {
    /// One project; its `author` is a user.
    Project,
    /// One user.
    User,
    /// A list of projects, each possibly carrying an `author`.
    ProjectList,
    /// A list of users.
    UserList,
    /// Nothing to extract.
    Opaque,
}

impl Contents {
    /// What payloads stored directly under `category` usually hold.
    pub fn of(category: Category) -> Self {
        match category {
            Category::Projects => Contents::Project,
            Category::Users => Contents::User,
            Category::Search => Contents::ProjectList,
            Category::Studios | Category::Thumbnails | Category::Avatars => Contents::Opaque,
        }
    }
}

// == Extract ==
/// Lists the sub-entities embedded in a payload holding `contents`.
///
/// - Project lists yield each project and its author; items typed as
///   something other than `project` are ignored.
/// - User lists yield each user.
/// - A single project yields its author.
/// - Anything else, and non-JSON payloads, yield nothing.
///
/// Projects are identified by their numeric `id`, users by their `username`.
pub fn extract_sub_entities(contents: Contents, payload: &Payload) -> Vec<Result<SubEntity, ExtractError>> {
    let Some(json) = payload.as_json() else {
        return Vec::new();
    };

    let mut found = Vec::new();
    match (contents, json) {
        (Contents::ProjectList, Value::Array(items)) => {
            for item in items.iter().filter(|item| is_project_item(item)) {
                let project = entity(Category::Projects, item);
                if project.is_ok() {
                    push_author(item, &mut found);
                }
                found.push(project);
            }
        }
        (Contents::UserList, Value::Array(items)) => {
            found.extend(items.iter().map(|item| entity(Category::Users, item)));
        }
        (Contents::Project, Value::Object(_)) => push_author(json, &mut found),
        _ => {}
    }
    found
}

fn is_project_item(item: &Value) -> bool {
    match item.get("type") {
        Some(Value::String(kind)) => kind == "project",
        _ => true,
    }
}

fn push_author(project: &Value, found: &mut Vec<Result<SubEntity, ExtractError>>) {
    if let Some(author) = project.get("author") {
        found.push(entity(Category::Users, author));
    }
}

fn entity(category: Category, value: &Value) -> Result<SubEntity, ExtractError> {
    let object = value.as_object().ok_or(ExtractError::NotAnObject(category))?;
    let id = object
        .get(id_field(category))
        .ok_or(ExtractError::MissingId(category))?;
    Ok(SubEntity {
        category,
        id: entity_id(category, id)?,
        value: Payload::Json(value.clone()),
    })
}

fn id_field(category: Category) -> &'static str {
    match category {
        Category::Users => "username",
        _ => "id",
    }
}

/// Cache id for a raw identifier of `category`.
///
/// Users take a valid username and are stored under [`username_id`]; every
/// other category takes a non-negative integer or a numeric string.
pub(crate) fn entity_id(category: Category, id: &Value) -> Result<String, ExtractError> {
    let invalid = || ExtractError::InvalidId {
        category,
        raw: id.to_string(),
    };
    match (category, id) {
        (Category::Users, Value::String(name)) if is_valid_username(name) => Ok(username_id(name)),
        (Category::Users, _) => Err(invalid()),
        (_, Value::Number(n)) => n.as_u64().map(|n| n.to_string()).ok_or_else(invalid),
        (_, Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => Ok(s.clone()),
        _ => Err(invalid()),
    }
}
