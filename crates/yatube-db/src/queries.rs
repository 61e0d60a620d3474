use crate::Database;
use crate::models::{CommentRow, GroupRow, PostRow, UserRow};
use anyhow::{Result, bail};
use rusqlite::{Connection, Row, ToSql};
use tracing::info;

/// Maximum group title length, in characters.
pub const GROUP_TITLE_MAX: usize = 200;

/// Post listing with author and group joined in, so a page of posts is one
/// query rather than one per post.
const POST_SELECT: &str = "
    SELECT p.id, p.text, p.pub_date, p.author_id, u.username,
           p.group_id, g.title, g.slug, p.image
    FROM posts p
    JOIN users u ON p.author_id = u.id
    LEFT JOIN post_groups g ON p.group_id = g.id";

const POST_ORDER: &str = "ORDER BY p.pub_date DESC, p.id DESC";

/// Which posts a listing covers.
#[derive(Debug, Clone)]
pub enum PostFilter {
    All,
    Group(i64),
    Author(String),
}

impl PostFilter {
    fn where_clause(&self) -> (&'static str, Option<&dyn ToSql>) {
        match self {
            PostFilter::All => ("", None),
            PostFilter::Group(id) => ("WHERE p.group_id = ?1", Some(id as &dyn ToSql)),
            PostFilter::Author(id) => ("WHERE p.author_id = ?1", Some(id as &dyn ToSql)),
        }
    }
}

pub struct NewPost<'a> {
    pub text: &'a str,
    pub author_id: &'a str,
    pub group_id: Option<i64>,
    pub image: Option<&'a str>,
}

/// Editable fields of a post. `pub_date` and `author` never change.
pub struct PostChanges<'a> {
    pub text: &'a str,
    pub group_id: Option<i64>,
    pub image: Option<&'a str>,
}

impl Database {
    // -- Users --

    /// Inserts a user. Returns `false` when the username is already taken.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)
                 ON CONFLICT(username) DO NOTHING",
                (id, username, password_hash),
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Removes a user together with their posts and comments.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Groups --

    pub fn create_group(&self, title: &str, slug: &str, description: &str) -> Result<i64> {
        if !is_valid_slug(slug) {
            bail!("Invalid slug '{}': use letters, numbers, underscores or hyphens", slug);
        }
        if title.chars().count() > GROUP_TITLE_MAX {
            bail!("Group title exceeds {} characters", GROUP_TITLE_MAX);
        }

        self.with_conn(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM post_groups WHERE slug = ?1)",
                [slug],
                |row| row.get(0),
            )?;
            if taken {
                bail!("Group with slug '{}' already exists", slug);
            }

            conn.execute(
                "INSERT INTO post_groups (title, slug, description) VALUES (?1, ?2, ?3)",
                (title, slug, description),
            )?;
            let id = conn.last_insert_rowid();
            info!("Group '{}' created (id {})", slug, id);
            Ok(id)
        })
    }

    pub fn get_group_by_slug(&self, slug: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, slug, description FROM post_groups WHERE slug = ?1",
                [slug],
                group_from_row,
            )
            .optional()
        })
    }

    pub fn get_group(&self, id: i64) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, slug, description FROM post_groups WHERE id = ?1",
                [id],
                group_from_row,
            )
            .optional()
        })
    }

    pub fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, slug, description FROM post_groups ORDER BY title, id",
            )?;
            let rows = stmt
                .query_map([], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Removes a group; its posts survive without a group.
    pub fn delete_group(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM post_groups WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Posts --

    pub fn insert_post(&self, post: &NewPost<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (text, author_id, group_id, image) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![post.text, post.author_id, post.group_id, post.image],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update_post(&self, id: i64, changes: &PostChanges<'_>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE posts SET text = ?1, group_id = ?2, image = ?3 WHERE id = ?4",
                rusqlite::params![changes.text, changes.group_id, changes.image, id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.id = ?1", POST_SELECT);
            conn.query_row(&sql, [id], post_from_row).optional()
        })
    }

    pub fn count_posts(&self, filter: &PostFilter) -> Result<u64> {
        self.with_conn(|conn| {
            let (clause, param) = filter.where_clause();
            let sql = format!("SELECT COUNT(*) FROM posts p {}", clause);
            let params: Vec<&dyn ToSql> = param.into_iter().collect();
            let count: i64 = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// One window of a listing, newest first.
    pub fn list_posts(&self, filter: &PostFilter, limit: u64, offset: u64) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let (clause, param) = filter.where_clause();
            let (limit_idx, offset_idx) = if param.is_some() { (2, 3) } else { (1, 2) };
            let sql = format!(
                "{} {} {} LIMIT ?{} OFFSET ?{}",
                POST_SELECT, clause, POST_ORDER, limit_idx, offset_idx
            );

            let limit = limit as i64;
            let offset = offset as i64;
            let mut params: Vec<&dyn ToSql> = param.into_iter().collect();
            params.push(&limit);
            params.push(&offset);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Removes a post together with its comments.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Comments --

    pub fn insert_comment(&self, post_id: i64, author_id: &str, text: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (post_id, author_id, text) VALUES (?1, ?2, ?3)",
                rusqlite::params![post_id, author_id, text],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All comments on a post, oldest first.
    pub fn get_comments_for_post(&self, post_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.author_id, u.username, c.text, c.created
                 FROM comments c
                 JOIN users u ON c.author_id = u.id
                 WHERE c.post_id = ?1
                 ORDER BY c.id",
            )?;
            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        author_id: row.get(2)?,
                        author_username: row.get(3)?,
                        text: row.get(4)?,
                        created: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Slugs are ASCII letters, digits, underscores and hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;
    let row = stmt.query_row([username], user_from_row).optional()?;
    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE id = ?1")?;
    let row = stmt.query_row([id], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        text: row.get(1)?,
        pub_date: row.get(2)?,
        author_id: row.get(3)?,
        author_username: row.get(4)?,
        group_id: row.get(5)?,
        group_title: row.get(6)?,
        group_slug: row.get(7)?,
        image: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        assert!(db.create_user(&id, username, "hash").unwrap());
        id
    }

    fn post(db: &Database, author_id: &str, text: &str, group_id: Option<i64>) -> i64 {
        db.insert_post(&NewPost { text, author_id, group_id, image: None })
            .unwrap()
    }

    #[test]
    fn listing_is_newest_first_and_windowed() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        for i in 0..13 {
            post(&db, &alex, &format!("post {}", i), None);
        }

        assert_eq!(db.count_posts(&PostFilter::All).unwrap(), 13);

        let first = db.list_posts(&PostFilter::All, 10, 0).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].text, "post 12");
        assert_eq!(first[9].text, "post 3");

        let second = db.list_posts(&PostFilter::All, 10, 10).unwrap();
        assert_eq!(second.len(), 3);
        assert_eq!(second[2].text, "post 0");
    }

    #[test]
    fn filters_by_group_and_author() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        let other = user(&db, "test_username");
        let group = db.create_group("Test group", "testgroup", "Test desc").unwrap();
        let group_2 = db.create_group("Test group 2", "slug2", "Test desc2").unwrap();

        for i in 0..9 {
            post(&db, &alex, &format!("grouped {}", i), Some(group));
        }
        for i in 0..4 {
            post(&db, &other, &format!("loose {}", i), None);
        }

        assert_eq!(db.count_posts(&PostFilter::Group(group)).unwrap(), 9);
        assert_eq!(db.count_posts(&PostFilter::Group(group_2)).unwrap(), 0);
        assert_eq!(db.count_posts(&PostFilter::Author(other.clone())).unwrap(), 4);

        let grouped = db.list_posts(&PostFilter::Group(group), 10, 0).unwrap();
        assert!(grouped.iter().all(|p| p.group_slug.as_deref() == Some("testgroup")));
        assert!(grouped.iter().all(|p| p.author_username == "Alex"));
        assert_eq!(grouped[0].text, "grouped 8");
        assert_eq!(grouped[8].text, "grouped 0");

        let by_other = db.list_posts(&PostFilter::Author(other), 10, 0).unwrap();
        assert_eq!(by_other.len(), 4);
        assert_eq!(by_other[0].text, "loose 3");
        assert_eq!(by_other[3].text, "loose 0");
        assert!(by_other.iter().all(|p| p.group_id.is_none()));
    }

    #[test]
    fn update_keeps_author_and_pub_date() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        let group = db.create_group("Test group", "testgroup", "Test desc").unwrap();
        let id = post(&db, &alex, "Test post", None);
        let before = db.get_post(id).unwrap().unwrap();

        let changed = db
            .update_post(id, &PostChanges { text: "edited", group_id: Some(group), image: None })
            .unwrap();
        assert!(changed);

        let after = db.get_post(id).unwrap().unwrap();
        assert_eq!(after.text, "edited");
        assert_eq!(after.group_id, Some(group));
        assert_eq!(after.author_id, before.author_id);
        assert_eq!(after.pub_date, before.pub_date);
        assert_eq!(db.count_posts(&PostFilter::All).unwrap(), 1);
    }

    #[test]
    fn deleting_group_clears_post_group() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        let group = db.create_group("Test group", "testgroup", "Test desc").unwrap();
        let id = post(&db, &alex, "Test post", Some(group));

        assert!(db.delete_group(group).unwrap());

        let row = db.get_post(id).unwrap().expect("post survives its group");
        assert_eq!(row.group_id, None);
        assert_eq!(row.group_slug, None);
    }

    #[test]
    fn deleting_post_removes_its_comments() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        let reader = user(&db, "reader");
        let id = post(&db, &alex, "Test post", None);
        db.insert_comment(id, &reader, "nice").unwrap();
        db.insert_comment(id, &alex, "thanks").unwrap();
        assert_eq!(db.get_comments_for_post(id).unwrap().len(), 2);

        assert!(db.delete_post(id).unwrap());
        assert!(db.get_comments_for_post(id).unwrap().is_empty());
    }

    #[test]
    fn deleting_user_removes_their_posts_and_comments() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        let reader = user(&db, "reader");
        let alex_post = post(&db, &alex, "by alex", None);
        let reader_post = post(&db, &reader, "by reader", None);
        db.insert_comment(reader_post, &alex, "alex was here").unwrap();
        db.insert_comment(reader_post, &reader, "reply").unwrap();

        assert!(db.delete_user(&alex).unwrap());

        assert!(db.get_post(alex_post).unwrap().is_none());
        assert!(db.get_user_by_username("Alex").unwrap().is_none());
        let remaining = db.get_comments_for_post(reader_post).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].author_username, "reader");
    }

    #[test]
    fn comments_are_listed_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        let id = post(&db, &alex, "Test post", None);
        db.insert_comment(id, &alex, "first").unwrap();
        db.insert_comment(id, &alex, "second").unwrap();

        let texts: Vec<_> = db
            .get_comments_for_post(id)
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[test]
    fn store_rejects_oversized_comment() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");
        let id = post(&db, &alex, "Test post", None);
        assert!(db.insert_comment(id, &alex, &"x".repeat(141)).is_err());
        assert!(db.insert_comment(id, &alex, &"я".repeat(140)).is_ok());
    }

    #[test]
    fn group_slug_must_be_valid_and_unique() {
        let db = Database::open_in_memory().unwrap();
        db.create_group("Test group", "testgroup", "Test desc").unwrap();

        assert!(db.create_group("Again", "testgroup", "dup").is_err());
        assert!(db.create_group("Spaces", "has spaces", "bad").is_err());
        assert!(db.create_group("Empty", "", "bad").is_err());
        assert!(db.create_group(&"t".repeat(201), "long-title", "bad").is_err());
        assert!(db.create_group("Ok", "ok_slug-2", "fine").is_ok());

        let group = db.get_group_by_slug("testgroup").unwrap().unwrap();
        assert_eq!(group.title, "Test group");
        assert_eq!(db.get_group(group.id).unwrap().unwrap().slug, "testgroup");
        assert!(db.get_group_by_slug("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_not_inserted() {
        let db = Database::open_in_memory().unwrap();
        let alex = user(&db, "Alex");

        let second = Uuid::new_v4().to_string();
        assert!(!db.create_user(&second, "Alex", "other-hash").unwrap());
        assert!(db.get_user_by_id(&second).unwrap().is_none());
        let stored = db.get_user_by_username("Alex").unwrap().unwrap();
        assert_eq!(stored.id, alex);
        assert_eq!(stored.password, "hash");
    }

    #[test]
    fn post_requires_existing_author() {
        let db = Database::open_in_memory().unwrap();
        let ghost = Uuid::new_v4().to_string();
        assert!(db
            .insert_post(&NewPost {
                text: "orphan",
                author_id: &ghost,
                group_id: None,
                image: None,
            })
            .is_err());
    }
}
