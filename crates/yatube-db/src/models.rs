//! Database row types. These map directly to SQLite rows and stay distinct
//! from the yatube-types models handed to the view layer.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use yatube_types::models::{Author, Comment, Group, GroupRef, Post};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct GroupRow {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post joined with its author's username and its group, if any.
pub struct PostRow {
    pub id: i64,
    pub text: String,
    pub pub_date: String,
    pub author_id: String,
    pub author_username: String,
    pub group_id: Option<i64>,
    pub group_title: Option<String>,
    pub group_slug: Option<String>,
    pub image: Option<String>,
}

pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub author_id: String,
    pub author_username: String,
    pub text: String,
    pub created: String,
}

impl UserRow {
    pub fn author(&self) -> Author {
        Author {
            id: parse_uuid(&self.id, "user"),
            username: self.username.clone(),
        }
    }
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
        }
    }
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        let group = match (row.group_id, row.group_title, row.group_slug) {
            (Some(id), Some(title), Some(slug)) => Some(GroupRef { id, title, slug }),
            _ => None,
        };
        Post {
            id: row.id,
            pub_date: parse_timestamp(&row.pub_date, "post", row.id),
            author: Author {
                id: parse_uuid(&row.author_id, "post author"),
                username: row.author_username,
            },
            text: row.text,
            group,
            image: row.image.filter(|path| !path.is_empty()),
        }
    }
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            post_id: row.post_id,
            created: parse_timestamp(&row.created, "comment", row.id),
            author: Author {
                id: parse_uuid(&row.author_id, "comment author"),
                username: row.author_username,
            },
            text: row.text,
        }
    }
}

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS[.fff]" without a
/// timezone; they are UTC.
fn parse_timestamp(raw: &str, what: &str, id: i64) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {} {}: {}", raw, what, id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_sqlite_timestamps_with_and_without_millis() {
        let with = parse_timestamp("2024-03-01 12:30:45.123", "post", 1);
        assert_eq!((with.year(), with.hour(), with.second()), (2024, 12, 45));
        assert_eq!(with.timestamp_subsec_millis(), 123);

        let without = parse_timestamp("2024-03-01 12:30:45", "post", 1);
        assert_eq!(without.minute(), 30);
    }

    #[test]
    fn post_without_group_has_no_group_ref() {
        let row = PostRow {
            id: 7,
            text: "hello".into(),
            pub_date: "2024-03-01 12:30:45.000".into(),
            author_id: Uuid::new_v4().to_string(),
            author_username: "Alex".into(),
            group_id: None,
            group_title: None,
            group_slug: None,
            image: Some(String::new()),
        };
        let post = Post::from(row);
        assert!(post.group.is_none());
        assert!(post.image.is_none());
        assert_eq!(post.author.username, "Alex");
    }
}
