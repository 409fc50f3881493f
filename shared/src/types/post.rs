use serde::{Deserialize, Serialize};

/// Body of `POST /api/addpost`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub categories: Vec<i64>,
}

/// Body of `POST /api/updpost`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePost {
    #[serde(rename = "postID")]
    pub post_id: i64,
    pub title: String,
    pub text: String,
    pub status: i64,
    #[serde(default)]
    pub categories: Vec<i64>,
}

/// Body of `POST /api/addcomment`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    #[serde(rename = "postID")]
    pub post_id: i64,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

/// Body of `POST /api/react`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionData {
    #[serde(rename = "postID")]
    pub post_id: i64,
    pub reaction: Reaction,
}
