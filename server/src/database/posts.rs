use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use shared::types::Reaction;

use crate::database::categories::CategoryRef;
use crate::database::mapper::{
    Descriptor, Expansion, FromRecord, MapperError, Param, Record, exec_all_with_guard,
    exec_with_guard, exists, query_many, query_one,
};

/// Posts per page of `view_posts`.
pub const PAGE_SIZE: i64 = 10;

/// Reaction reported when the viewer has not reacted.
pub const NO_REACTION: &str = "idle";

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(rename = "PostID")]
    pub post_id: i64,
    #[serde(rename = "Posted")]
    pub posted: i64,
    #[serde(rename = "AuthorID")]
    pub author_id: i64,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Status")]
    pub status: i64,
    #[serde(rename = "Likes")]
    pub likes: i64,
    #[serde(rename = "Dislikes")]
    pub dislikes: i64,
    /// The viewer's own reaction, or `idle`.
    #[serde(rename = "Reaction")]
    pub reaction: String,
    #[serde(rename = "Categories")]
    pub categories: Vec<CategoryRef>,
}

impl PostView {
    fn descriptor(categories: Expansion) -> Descriptor {
        Descriptor::new()
            .integer("postId")
            .timestamp("posted")
            .integer("userId")
            .text("username")
            .text("title")
            .text("text")
            .integer("status")
            .integer("likes")
            .integer("dislikes")
            .text("reaction")
            .with_expansion("categories", categories)
    }
}

impl FromRecord for PostView {
    fn from_record(mut record: Record) -> Result<Self, MapperError> {
        Ok(Self {
            post_id: record.take_i64("postId")?,
            posted: record.take_i64("posted")?,
            author_id: record.take_i64("userId")?,
            username: record.take_opt_string("username")?.unwrap_or_default(),
            title: record.take_string("title")?,
            text: record.take_string("text")?,
            status: record.take_i64("status")?,
            likes: record.take_i64("likes")?,
            dislikes: record.take_i64("dislikes")?,
            reaction: record
                .take_opt_string("reaction")?
                .unwrap_or_else(|| NO_REACTION.to_string()),
            categories: record.take_expanded("categories")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(rename = "CommentID")]
    pub comment_id: i64,
    #[serde(rename = "Commented")]
    pub commented: i64,
    #[serde(rename = "AuthorID")]
    pub author_id: i64,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Comment")]
    pub comment: String,
    #[serde(rename = "Likes")]
    pub likes: i64,
    #[serde(rename = "Dislikes")]
    pub dislikes: i64,
    #[serde(rename = "Reaction")]
    pub reaction: String,
}

impl CommentView {
    fn descriptor() -> Descriptor {
        Descriptor::new()
            .integer("commentId")
            .timestamp("commented")
            .integer("userId")
            .text("username")
            .text("comment")
            .integer("likes")
            .integer("dislikes")
            .text("reaction")
    }
}

impl FromRecord for CommentView {
    fn from_record(mut record: Record) -> Result<Self, MapperError> {
        Ok(Self {
            comment_id: record.take_i64("commentId")?,
            commented: record.take_i64("commented")?,
            author_id: record.take_i64("userId")?,
            username: record.take_opt_string("username")?.unwrap_or_default(),
            comment: record.take_string("comment")?,
            likes: record.take_i64("likes")?,
            dislikes: record.take_i64("dislikes")?,
            reaction: record
                .take_opt_string("reaction")?
                .unwrap_or_else(|| NO_REACTION.to_string()),
        })
    }
}

/// Optional narrowing of `view_posts`. Absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub category: Option<i64>,
    pub author: Option<i64>,
    pub search: Option<String>,
    pub status: Option<i64>,
    /// One-based; anything below 1 is treated as 1.
    pub page: i64,
}

impl PostFilter {
    fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * PAGE_SIZE
    }

    fn category_pattern(&self) -> String {
        match self.category {
            Some(id) => format!("%\"{}\"%", id),
            None => "%".to_string(),
        }
    }

    fn search_pattern(&self) -> String {
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => format!("%{}%", escape_like(term)),
            _ => "%".to_string(),
        }
    }
}

/// Make `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

const POST_COLUMNS: &str = "
    p.postId,
    CAST(strftime('%s', p.posted) AS INT),
    p.userId,
    (SELECT username FROM users u WHERE u.userId = p.userId),
    p.title,
    p.text,
    p.status,
    (SELECT COUNT(*) FROM reactions r WHERE r.postId = p.postId AND r.reaction = 'like'),
    (SELECT COUNT(*) FROM reactions r WHERE r.postId = p.postId AND r.reaction = 'dislike'),
    (SELECT r.reaction FROM reactions r WHERE r.postId = p.postId AND r.userId = ?1
        ORDER BY r.reactionId DESC LIMIT 1),
    p.categories";

/// One page of published posts, newest first.
pub async fn view_posts(
    pool: &SqlitePool,
    viewer: Option<i64>,
    filter: &PostFilter,
    categories: Expansion,
) -> Result<Vec<PostView>, MapperError> {
    let sql = format!(
        "SELECT {POST_COLUMNS}
         FROM posts p
         WHERE p.status > 0
           AND p.categories LIKE ?2
           AND (?3 IS NULL OR p.userId = ?3)
           AND p.title LIKE ?4 ESCAPE '\\'
           AND (?5 IS NULL OR p.status = ?5)
         ORDER BY p.postId DESC
         LIMIT ?6 OFFSET ?7"
    );

    let posts = query_many(
        pool,
        &PostView::descriptor(categories),
        &sql,
        &[
            Param::from(viewer),
            Param::from(filter.category_pattern()),
            Param::from(filter.author),
            Param::from(filter.search_pattern()),
            Param::from(filter.status),
            Param::from(PAGE_SIZE),
            Param::from(filter.offset()),
        ],
    )
    .await?;

    debug!("view_posts {:?} -> {} posts", filter, posts.len());
    Ok(posts)
}

/// A single post. Hidden posts (status 0) are visible to their author only.
pub async fn read_post(
    pool: &SqlitePool,
    viewer: Option<i64>,
    post_id: i64,
    categories: Expansion,
) -> Result<Option<PostView>, MapperError> {
    let sql = format!(
        "SELECT {POST_COLUMNS}
         FROM posts p
         WHERE p.postId = ?2 AND (p.status > 0 OR p.userId = ?1)"
    );

    query_one(
        pool,
        &PostView::descriptor(categories),
        &sql,
        &[Param::from(viewer), Param::from(post_id)],
    )
    .await
}

/// Comments under a post, oldest first.
pub async fn post_comments(
    pool: &SqlitePool,
    viewer: Option<i64>,
    post_id: i64,
) -> Result<Vec<CommentView>, MapperError> {
    query_many(
        pool,
        &CommentView::descriptor(),
        "SELECT
            c.commentId,
            c.commented,
            c.userId,
            (SELECT username FROM users u WHERE u.userId = c.userId),
            c.comment,
            (SELECT COUNT(*) FROM comment_reactions cr
                WHERE cr.commentId = c.commentId AND cr.reaction = 'like'),
            (SELECT COUNT(*) FROM comment_reactions cr
                WHERE cr.commentId = c.commentId AND cr.reaction = 'dislike'),
            (SELECT cr.reaction FROM comment_reactions cr
                WHERE cr.commentId = c.commentId AND cr.userId = ?1
                ORDER BY cr.reactionId DESC LIMIT 1)
         FROM comments c
         WHERE c.postId = ?2
         ORDER BY c.commentId",
        &[Param::from(viewer), Param::from(post_id)],
    )
    .await
}

pub async fn post_exists(pool: &SqlitePool, post_id: i64) -> Result<bool, MapperError> {
    exists(
        pool,
        "SELECT postId FROM posts WHERE postId = ?1 AND status > 0",
        &[Param::from(post_id)],
    )
    .await
}

/// Insert a post unless `abort` holds; returns the new post id.
pub async fn add_post(
    pool: &SqlitePool,
    author: i64,
    title: &str,
    text: &str,
    categories: &str,
    abort: bool,
) -> Result<i64, MapperError> {
    let done = exec_with_guard(
        pool,
        "INSERT INTO posts (userId, title, text, categories) VALUES (?1, ?2, ?3, ?4)",
        &[
            Param::from(author),
            Param::from(title),
            Param::from(text),
            Param::from(categories),
        ],
        abort,
    )
    .await?;

    info!("User {} created post {}", author, done.last_insert_id);
    Ok(done.last_insert_id)
}

/// Rewrite a post owned by `author`. Returns `false` when no such post
/// belongs to them.
#[allow(clippy::too_many_arguments)]
pub async fn update_post(
    pool: &SqlitePool,
    author: i64,
    post_id: i64,
    title: &str,
    text: &str,
    categories: &str,
    status: i64,
    abort: bool,
) -> Result<bool, MapperError> {
    let done = exec_with_guard(
        pool,
        "UPDATE posts SET title = ?1, text = ?2, categories = ?3, status = ?4
         WHERE postId = ?5 AND userId = ?6",
        &[
            Param::from(title),
            Param::from(text),
            Param::from(categories),
            Param::from(status),
            Param::from(post_id),
            Param::from(author),
        ],
        abort,
    )
    .await?;

    Ok(done.rows_affected > 0)
}

pub async fn add_comment(
    pool: &SqlitePool,
    author: i64,
    post_id: i64,
    comment: &str,
    abort: bool,
) -> Result<i64, MapperError> {
    let done = exec_with_guard(
        pool,
        "INSERT INTO comments (postId, userId, comment) VALUES (?1, ?2, ?3)",
        &[Param::from(post_id), Param::from(author), Param::from(comment)],
        abort,
    )
    .await?;
    Ok(done.last_insert_id)
}

/// Record a reaction. Reacting the same way twice is a conflict on
/// `reactions.userId`; the opposite reaction is replaced in the same
/// transaction.
pub async fn add_reaction(
    pool: &SqlitePool,
    user: i64,
    post_id: i64,
    reaction: Reaction,
    abort: bool,
) -> Result<(), MapperError> {
    let opposite = match reaction {
        Reaction::Like => Reaction::Dislike,
        Reaction::Dislike => Reaction::Like,
    };
    let clear = [
        Param::from(post_id),
        Param::from(user),
        Param::from(opposite.as_str()),
    ];
    let insert = [
        Param::from(post_id),
        Param::from(user),
        Param::from(reaction.as_str()),
    ];

    exec_all_with_guard(
        pool,
        &[
            (
                "DELETE FROM reactions WHERE postId = ?1 AND userId = ?2 AND reaction = ?3",
                &clear[..],
            ),
            (
                "INSERT INTO reactions (postId, userId, reaction) VALUES (?1, ?2, ?3)",
                &insert[..],
            ),
        ],
        abort,
    )
    .await?;

    Ok(())
}
