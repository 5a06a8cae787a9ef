//! Reply-tree maintenance.
//!
//! Threads are denormalized into dot-delimited path strings of zero-padded
//! message ids, so a single `ORDER BY path` reads a whole tree depth-first
//! with no recursive query.

use anyhow::Result;
use sandwich_db::Database;

/// Ids are padded to this width before concatenation. Lexicographic order of
/// the resulting paths matches numeric order only while every id fits the
/// width; 10 digits covers ids up to 9,999,999,999.
pub const PATH_ID_WIDTH: usize = 10;

pub fn pad_id(id: i64) -> String {
    format!("{:0width$}", id, width = PATH_ID_WIDTH)
}

/// Attach `message_id` under `parent_message_id`.
///
/// If the parent is already threaded the child extends its path. A parent
/// receiving its first reply has no entry yet; both the parent's depth-0
/// root entry and the child entry are synthesized together.
pub fn attach_reply(db: &Database, message_id: i64, parent_message_id: i64, now: &str) -> Result<()> {
    match db.thread_entry(parent_message_id)? {
        Some(parent) => {
            let path = format!("{}.{}", parent.path, pad_id(message_id));
            db.insert_thread_entry(
                parent.root_message_id,
                message_id,
                Some(parent_message_id),
                parent.depth + 1,
                &path,
                now,
            )?;
        }
        None => {
            let parent_path = pad_id(parent_message_id);
            let child_path = format!("{}.{}", parent_path, pad_id(message_id));

            db.insert_thread_entry(parent_message_id, parent_message_id, None, 0, &parent_path, now)?;
            db.insert_thread_entry(
                parent_message_id,
                message_id,
                Some(parent_message_id),
                1,
                &child_path,
                now,
            )?;
        }
    }
    Ok(())
}

/// Thread a freshly sent context message under the most recent live message
/// sharing its context. The first message in a context becomes a depth-0
/// root, so every context grows a single arrival-ordered thread without
/// callers passing an explicit parent.
pub fn auto_thread(
    db: &Database,
    message_id: i64,
    context_type: &str,
    context_id: &str,
    now: &str,
) -> Result<()> {
    match db.latest_context_message(context_type, context_id, message_id)? {
        Some(parent_id) => attach_reply(db, message_id, parent_id, now),
        None => db.insert_thread_entry(message_id, message_id, None, 0, &pad_id(message_id), now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandwich_db::timestamps;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "x", None, None, &timestamps::now())
            .unwrap();
        db
    }

    fn insert_message(db: &Database, context: Option<(&str, &str)>) -> i64 {
        let (ct, cid) = match context {
            Some((ct, cid)) => (Some(ct), Some(cid)),
            None => (None, None),
        };
        db.insert_message("u1", "hello", ct, cid, &timestamps::now()).unwrap()
    }

    fn assert_path_invariant(db: &Database, message_id: i64) {
        let entry = db.thread_entry(message_id).unwrap().unwrap();
        assert!(entry.path.ends_with(&pad_id(message_id)));
        assert_eq!(entry.depth as usize, entry.path.matches('.').count());
    }

    #[test]
    fn first_reply_synthesizes_parent_root_entry() {
        let db = test_db();
        let parent = insert_message(&db, None);
        let child = insert_message(&db, None);

        attach_reply(&db, child, parent, &timestamps::now()).unwrap();

        let parent_entry = db.thread_entry(parent).unwrap().unwrap();
        assert_eq!(parent_entry.depth, 0);
        assert_eq!(parent_entry.path, pad_id(parent));
        assert_eq!(parent_entry.root_message_id, parent);

        let child_entry = db.thread_entry(child).unwrap().unwrap();
        assert_eq!(child_entry.depth, 1);
        assert_eq!(child_entry.parent_message_id, Some(parent));
        assert_eq!(child_entry.root_message_id, parent);
        assert_eq!(child_entry.path, format!("{}.{}", pad_id(parent), pad_id(child)));
    }

    #[test]
    fn nested_replies_extend_path_and_keep_root() {
        let db = test_db();
        let root = insert_message(&db, None);
        let mid = insert_message(&db, None);
        let leaf = insert_message(&db, None);

        attach_reply(&db, mid, root, &timestamps::now()).unwrap();
        attach_reply(&db, leaf, mid, &timestamps::now()).unwrap();

        let leaf_entry = db.thread_entry(leaf).unwrap().unwrap();
        assert_eq!(leaf_entry.depth, 2);
        assert_eq!(leaf_entry.root_message_id, root);

        for id in [root, mid, leaf] {
            assert_path_invariant(&db, id);
        }
    }

    #[test]
    fn auto_thread_chains_context_messages_by_arrival() {
        let db = test_db();
        let first = insert_message(&db, Some(("project", "p1")));
        auto_thread(&db, first, "project", "p1", &timestamps::now()).unwrap();

        let second = insert_message(&db, Some(("project", "p1")));
        auto_thread(&db, second, "project", "p1", &timestamps::now()).unwrap();

        let first_entry = db.thread_entry(first).unwrap().unwrap();
        assert_eq!(first_entry.depth, 0);

        let second_entry = db.thread_entry(second).unwrap().unwrap();
        assert_eq!(second_entry.parent_message_id, Some(first));
        assert_eq!(second_entry.root_message_id, first);
    }

    #[test]
    fn auto_thread_skips_deleted_parents() {
        let db = test_db();
        let first = insert_message(&db, Some(("task", "t1")));
        auto_thread(&db, first, "task", "t1", &timestamps::now()).unwrap();
        db.soft_delete_message(first, "u1", &timestamps::now(), "[Message deleted]")
            .unwrap();

        let second = insert_message(&db, Some(("task", "t1")));
        auto_thread(&db, second, "task", "t1", &timestamps::now()).unwrap();

        // The deleted message cannot be a parent; the new message roots itself
        let entry = db.thread_entry(second).unwrap().unwrap();
        assert_eq!(entry.depth, 0);
        assert_eq!(entry.root_message_id, second);
    }

    #[test]
    fn padded_paths_sort_in_numeric_order() {
        // 9 < 10 numerically but "9" > "10" as strings; padding fixes that
        assert!(pad_id(9) < pad_id(10));
        assert!(pad_id(999) < pad_id(1000));
    }
}
