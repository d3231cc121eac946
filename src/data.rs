use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use crate::backend::{
    self, Client, Comment, FeedItem, MediaKind, Profile, Question, QuestionSummary,
    COMMENT_SELECT, FEED_SELECT, QUESTION_SELECT,
};
use crate::feed::{FIRST_PAGE_SIZE, PAGE_SIZE};

pub const MAX_QUESTION_LEN: usize = 280;

pub trait FeedService: Send + Sync {
    fn first_page(&self) -> Result<Vec<FeedItem>>;
    fn page_after(&self, cursor: DateTime<Utc>) -> Result<Vec<FeedItem>>;
}

pub trait QuestionService: Send + Sync {
    fn ask(&self, user_id: &str, content: &str, is_public: bool) -> Result<Question>;
    fn browse_public(&self) -> Result<Vec<QuestionSummary>>;
    fn question(&self, question_id: &str) -> Result<Option<QuestionSummary>>;
    fn answers_for(&self, question_id: &str) -> Result<Vec<FeedItem>>;
}

#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub question_id: String,
    pub user_id: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_type: MediaKind,
}

/// Check the composition input before any upload or insert: text answers
/// need a body, media answers need a file to attach. Returns the trimmed
/// input.
pub fn validate_answer_input(mode: MediaKind, input: &str) -> Result<String> {
    let input = input.trim();
    match mode {
        MediaKind::Text => ensure!(!input.is_empty(), "answer cannot be empty"),
        _ => ensure!(
            !input.is_empty(),
            "a {} answer needs a file to attach",
            mode.as_str()
        ),
    }
    Ok(input.to_string())
}

pub trait AnswerService: Send + Sync {
    fn submit(&self, answer: NewAnswer) -> Result<FeedItem>;
    fn delete(&self, answer_id: &str, user_id: &str) -> Result<()>;
}

pub trait InteractionService: Send + Sync {
    fn has_liked(&self, answer_id: &str, user_id: &str) -> Result<bool>;
    fn like_count(&self, answer_id: &str) -> Result<i64>;
    fn like(&self, answer_id: &str, user_id: &str) -> Result<()>;
    fn unlike(&self, answer_id: &str, user_id: &str) -> Result<()>;
    fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool>;
    fn follow(&self, follower_id: &str, following_id: &str) -> Result<()>;
    fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<()>;
    fn follower_count(&self, user_id: &str) -> Result<i64>;
    fn following_count(&self, user_id: &str) -> Result<i64>;
}

pub trait CommentService: Send + Sync {
    fn list(&self, answer_id: &str) -> Result<Vec<Comment>>;
    fn comment_count(&self, answer_id: &str) -> Result<i64>;
    fn add(&self, answer_id: &str, user_id: &str, content: &str) -> Result<Comment>;
    fn delete(&self, comment_id: &str, user_id: &str) -> Result<()>;
}

pub trait ProfileService: Send + Sync {
    fn profile(&self, user_id: &str) -> Result<Option<Profile>>;
    fn update_own(&self, user_id: &str, display_name: &str, bio: &str) -> Result<()>;
    fn answers_by(&self, user_id: &str) -> Result<Vec<FeedItem>>;
}

pub struct BackendFeedService {
    client: Arc<Client>,
}

impl BackendFeedService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl FeedService for BackendFeedService {
    fn first_page(&self) -> Result<Vec<FeedItem>> {
        self.client
            .select(
                "answers",
                &[
                    ("select", FEED_SELECT.to_string()),
                    backend::order_desc("created_at"),
                    backend::limit(FIRST_PAGE_SIZE),
                ],
            )
            .context("fetch first feed page")
    }

    fn page_after(&self, cursor: DateTime<Utc>) -> Result<Vec<FeedItem>> {
        self.client
            .select(
                "answers",
                &[
                    ("select", FEED_SELECT.to_string()),
                    ("created_at", backend::lt(&cursor)),
                    backend::order_desc("created_at"),
                    backend::limit(PAGE_SIZE),
                ],
            )
            .context("fetch feed page")
    }
}

pub struct BackendQuestionService {
    client: Arc<Client>,
}

impl BackendQuestionService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl QuestionService for BackendQuestionService {
    fn ask(&self, user_id: &str, content: &str, is_public: bool) -> Result<Question> {
        let content = content.trim();
        ensure!(!content.is_empty(), "question cannot be empty");
        ensure!(
            content.chars().count() <= MAX_QUESTION_LEN,
            "question is longer than {} characters",
            MAX_QUESTION_LEN
        );
        self.client
            .insert_returning(
                "questions",
                &json!({
                    "user_id": user_id,
                    "content": content,
                    "is_public": is_public,
                }),
                None,
            )
            .context("post question")
    }

    fn browse_public(&self) -> Result<Vec<QuestionSummary>> {
        self.client
            .select(
                "questions",
                &[
                    (
                        "select",
                        "*,user:profiles(*),answers:answers(count)".to_string(),
                    ),
                    ("is_public", backend::eq("true")),
                    backend::order_desc("created_at"),
                ],
            )
            .context("fetch public questions")
    }

    fn question(&self, question_id: &str) -> Result<Option<QuestionSummary>> {
        self.client
            .maybe_single(
                "questions",
                &[
                    (
                        "select",
                        "*,user:profiles(*),answers:answers(count)".to_string(),
                    ),
                    ("id", backend::eq(question_id)),
                ],
            )
            .context("fetch question")
    }

    fn answers_for(&self, question_id: &str) -> Result<Vec<FeedItem>> {
        self.client
            .select(
                "answers",
                &[
                    ("select", FEED_SELECT.to_string()),
                    ("question_id", backend::eq(question_id)),
                    backend::order_desc("created_at"),
                ],
            )
            .context("fetch answers for question")
    }
}

pub struct BackendAnswerService {
    client: Arc<Client>,
}

impl BackendAnswerService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl AnswerService for BackendAnswerService {
    fn submit(&self, answer: NewAnswer) -> Result<FeedItem> {
        self.client
            .insert_returning(
                "answers",
                &json!({
                    "question_id": answer.question_id,
                    "user_id": answer.user_id,
                    "content": answer.content,
                    "media_url": answer.media_url,
                    "media_type": answer.media_type.as_str(),
                }),
                Some(FEED_SELECT),
            )
            .context("post answer")
    }

    fn delete(&self, answer_id: &str, user_id: &str) -> Result<()> {
        self.client.delete(
            "answers",
            &[
                ("id", backend::eq(answer_id)),
                ("user_id", backend::eq(user_id)),
            ],
        )
    }
}

pub struct BackendInteractionService {
    client: Arc<Client>,
}

impl BackendInteractionService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for BackendInteractionService {
    fn has_liked(&self, answer_id: &str, user_id: &str) -> Result<bool> {
        let row: Option<serde_json::Value> = self.client.maybe_single(
            "likes",
            &[
                ("select", "answer_id".to_string()),
                ("answer_id", backend::eq(answer_id)),
                ("user_id", backend::eq(user_id)),
            ],
        )?;
        Ok(row.is_some())
    }

    fn like_count(&self, answer_id: &str) -> Result<i64> {
        self.client
            .count("likes", &[("answer_id", backend::eq(answer_id))])
    }

    fn like(&self, answer_id: &str, user_id: &str) -> Result<()> {
        self.client.insert(
            "likes",
            &json!({ "answer_id": answer_id, "user_id": user_id }),
        )
    }

    fn unlike(&self, answer_id: &str, user_id: &str) -> Result<()> {
        self.client.delete(
            "likes",
            &[
                ("answer_id", backend::eq(answer_id)),
                ("user_id", backend::eq(user_id)),
            ],
        )
    }

    fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        let row: Option<serde_json::Value> = self.client.maybe_single(
            "follows",
            &[
                ("select", "follower_id".to_string()),
                ("follower_id", backend::eq(follower_id)),
                ("following_id", backend::eq(following_id)),
            ],
        )?;
        Ok(row.is_some())
    }

    fn follow(&self, follower_id: &str, following_id: &str) -> Result<()> {
        self.client.insert(
            "follows",
            &json!({ "follower_id": follower_id, "following_id": following_id }),
        )
    }

    fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<()> {
        self.client.delete(
            "follows",
            &[
                ("follower_id", backend::eq(follower_id)),
                ("following_id", backend::eq(following_id)),
            ],
        )
    }

    fn follower_count(&self, user_id: &str) -> Result<i64> {
        self.client
            .count("follows", &[("following_id", backend::eq(user_id))])
    }

    fn following_count(&self, user_id: &str) -> Result<i64> {
        self.client
            .count("follows", &[("follower_id", backend::eq(user_id))])
    }
}

pub struct BackendCommentService {
    client: Arc<Client>,
}

impl BackendCommentService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl CommentService for BackendCommentService {
    fn list(&self, answer_id: &str) -> Result<Vec<Comment>> {
        self.client
            .select(
                "comments",
                &[
                    ("select", COMMENT_SELECT.to_string()),
                    ("answer_id", backend::eq(answer_id)),
                    backend::order_desc("created_at"),
                ],
            )
            .context("fetch comments")
    }

    fn comment_count(&self, answer_id: &str) -> Result<i64> {
        self.client
            .count("comments", &[("answer_id", backend::eq(answer_id))])
    }

    fn add(&self, answer_id: &str, user_id: &str, content: &str) -> Result<Comment> {
        let content = content.trim();
        ensure!(!content.is_empty(), "comment cannot be empty");
        self.client
            .insert_returning(
                "comments",
                &json!({
                    "answer_id": answer_id,
                    "user_id": user_id,
                    "content": content,
                }),
                Some(COMMENT_SELECT),
            )
            .context("post comment")
    }

    fn delete(&self, comment_id: &str, user_id: &str) -> Result<()> {
        self.client.delete(
            "comments",
            &[
                ("id", backend::eq(comment_id)),
                ("user_id", backend::eq(user_id)),
            ],
        )
    }
}

pub struct BackendProfileService {
    client: Arc<Client>,
}

impl BackendProfileService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ProfileService for BackendProfileService {
    fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.client
            .maybe_single("profiles", &[("id", backend::eq(user_id))])
            .context("fetch profile")
    }

    fn update_own(&self, user_id: &str, display_name: &str, bio: &str) -> Result<()> {
        self.client.update(
            "profiles",
            &[("id", backend::eq(user_id))],
            &json!({
                "display_name": display_name.trim(),
                "bio": bio.trim(),
                "updated_at": Utc::now().to_rfc3339(),
            }),
        )
    }

    fn answers_by(&self, user_id: &str) -> Result<Vec<FeedItem>> {
        self.client
            .select(
                "answers",
                &[
                    ("select", FEED_SELECT.to_string()),
                    ("user_id", backend::eq(user_id)),
                    backend::order_desc("created_at"),
                ],
            )
            .context("fetch answers by user")
    }
}

fn sample_item(id: &str, question: &str, content: &str, ts_secs: i64) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        question_id: format!("q-{}", id),
        user_id: "sample".into(),
        content: Some(content.to_string()),
        media_url: None,
        media_type: Some(MediaKind::Text),
        created_at: Utc.timestamp_opt(ts_secs, 0).single().unwrap_or_else(Utc::now),
        updated_at: None,
        question: Question {
            id: format!("q-{}", id),
            user_id: "sample".into(),
            content: question.to_string(),
            is_public: true,
            created_at: Utc.timestamp_opt(ts_secs, 0).single().unwrap_or_else(Utc::now),
            updated_at: None,
        },
        user: Profile {
            id: "sample".into(),
            username: "knowme".into(),
            display_name: Some("KnowMe".into()),
            ..Profile::default()
        },
    }
}

/// Offline placeholder feed, shown when no backend is configured.
#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn first_page(&self) -> Result<Vec<FeedItem>> {
        Ok(vec![
            sample_item(
                "welcome",
                "What is KnowMe?",
                "A swipeable Q&A feed in your terminal. Swipe up (or press Down) for the next answer.",
                2,
            ),
            sample_item(
                "setup",
                "How do I connect it?",
                "Set KNOWME_BACKEND__BASE_URL and KNOWME_BACKEND__ANON_KEY, or edit the config file.",
                1,
            ),
        ])
    }

    fn page_after(&self, _cursor: DateTime<Utc>) -> Result<Vec<FeedItem>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MockInteractionService;

impl InteractionService for MockInteractionService {
    fn has_liked(&self, _answer_id: &str, _user_id: &str) -> Result<bool> {
        Ok(false)
    }

    fn like_count(&self, _answer_id: &str) -> Result<i64> {
        Ok(0)
    }

    fn like(&self, _answer_id: &str, _user_id: &str) -> Result<()> {
        Ok(())
    }

    fn unlike(&self, _answer_id: &str, _user_id: &str) -> Result<()> {
        Ok(())
    }

    fn is_following(&self, _follower_id: &str, _following_id: &str) -> Result<bool> {
        Ok(false)
    }

    fn follow(&self, _follower_id: &str, _following_id: &str) -> Result<()> {
        Ok(())
    }

    fn unfollow(&self, _follower_id: &str, _following_id: &str) -> Result<()> {
        Ok(())
    }

    fn follower_count(&self, _user_id: &str) -> Result<i64> {
        Ok(0)
    }

    fn following_count(&self, _user_id: &str) -> Result<i64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_answer_needs_a_body() {
        assert!(validate_answer_input(MediaKind::Text, "   ").is_err());
        assert_eq!(
            validate_answer_input(MediaKind::Text, " sure, ask me anything ").unwrap(),
            "sure, ask me anything"
        );
    }

    #[test]
    fn media_answer_needs_a_file_path() {
        assert!(validate_answer_input(MediaKind::Video, "").is_err());
        assert!(validate_answer_input(MediaKind::Audio, "  ").is_err());
        assert_eq!(
            validate_answer_input(MediaKind::Image, " ~/shots/cat.png ").unwrap(),
            "~/shots/cat.png"
        );
    }

    #[test]
    fn mock_feed_is_a_single_page() {
        let feed = MockFeedService;
        let first = feed.first_page().unwrap();
        assert!(!first.is_empty());
        let cursor = first.last().unwrap().created_at;
        assert!(feed.page_after(cursor).unwrap().is_empty());
    }

    #[test]
    fn mock_feed_is_ordered_descending() {
        let first = MockFeedService.first_page().unwrap();
        for pair in first.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}
