use std::collections::{HashMap, HashSet};
use std::io::{self, Stdout};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::UnicodeWidthStr;

use crate::auth::Session;
use crate::backend::{self, Comment, FeedItem, MediaKind, Profile, Question, QuestionSummary};
use crate::config::PlayerConfig;
use crate::data::{
    self, AnswerService, CommentService, FeedService, InteractionService, NewAnswer,
    ProfileService, QuestionService, MAX_QUESTION_LEN,
};
use crate::engagement::Toggle;
use crate::feed::{FeedView, NavEvent, SwipeTracker, CELL_PIXEL_HEIGHT};
use crate::media;
use crate::session;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Landing,
    Login,
    Signup,
    Feed,
    Ask,
    Browse,
    QuestionDetail,
    Compose,
    Comments,
    Profile,
}

struct Field {
    label: &'static str,
    value: String,
    masked: bool,
}

impl Field {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            value: String::new(),
            masked: false,
        }
    }

    fn masked(label: &'static str) -> Self {
        Self {
            label,
            value: String::new(),
            masked: true,
        }
    }

    fn display_value(&self) -> String {
        if self.masked {
            "•".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }
}

struct Form {
    fields: Vec<Field>,
    focus: usize,
}

impl Form {
    fn new(fields: Vec<Field>) -> Self {
        Self { fields, focus: 0 }
    }

    fn next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    fn previous(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
    }

    fn insert_char(&mut self, ch: char) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.push(ch);
        }
    }

    fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.pop();
        }
    }

    fn value(&self, index: usize) -> &str {
        self.fields.get(index).map(|f| f.value.as_str()).unwrap_or("")
    }

    fn clear(&mut self) {
        for field in &mut self.fields {
            field.value.clear();
        }
        self.focus = 0;
    }
}

enum AsyncResponse {
    FeedPage {
        request_id: u64,
        result: Result<Vec<FeedItem>>,
    },
    NextPage {
        request_id: u64,
        result: Result<Vec<FeedItem>>,
    },
    Stats {
        answer_id: String,
        author_id: String,
        result: Result<AnswerStats>,
    },
    LikeResult {
        answer_id: String,
        error: Option<String>,
    },
    FollowResult {
        user_id: String,
        error: Option<String>,
    },
    Comments {
        request_id: u64,
        answer_id: String,
        result: Result<Vec<Comment>>,
    },
    CommentPosted {
        answer_id: String,
        result: Result<Comment>,
    },
    CommentDeleted {
        answer_id: String,
        result: Result<()>,
    },
    Questions {
        request_id: u64,
        result: Result<Vec<QuestionSummary>>,
    },
    QuestionAnswers {
        request_id: u64,
        question_id: String,
        result: Result<Vec<FeedItem>>,
    },
    Asked {
        result: Result<Question>,
    },
    AnswerPosted {
        question_id: String,
        result: Result<FeedItem>,
    },
    AnswerDeleted {
        answer_id: String,
        result: Result<()>,
    },
    Auth {
        result: Result<Session>,
    },
    ProfileLoaded {
        request_id: u64,
        user_id: String,
        result: Result<ProfileBundle>,
    },
    ProfileSaved {
        user_id: String,
        result: Result<()>,
    },
    MediaReady {
        url: String,
        result: Result<String>,
    },
}

struct AnswerStats {
    liked: bool,
    like_count: i64,
    following: bool,
    comment_count: i64,
}

struct ProfileBundle {
    profile: Option<Profile>,
    answers: Vec<FeedItem>,
    followers: i64,
    following: i64,
}

pub struct Options {
    pub status_message: String,
    pub feed_service: Arc<dyn FeedService>,
    pub question_service: Option<Arc<dyn QuestionService>>,
    pub answer_service: Option<Arc<dyn AnswerService>>,
    pub interaction_service: Arc<dyn InteractionService>,
    pub comment_service: Option<Arc<dyn CommentService>>,
    pub profile_service: Option<Arc<dyn ProfileService>>,
    pub session_manager: Option<Arc<session::Manager>>,
    pub uploader: Option<Arc<backend::Client>>,
    pub media_bucket: String,
    pub max_upload_bytes: i64,
    pub media_cache: Option<Arc<media::Cache>>,
    pub player: PlayerConfig,
    pub config_path: String,
}

pub struct Model {
    status_message: String,
    screen: Screen,
    screen_stack: Vec<Screen>,
    needs_redraw: bool,
    spinner: Spinner,

    feed_service: Arc<dyn FeedService>,
    question_service: Option<Arc<dyn QuestionService>>,
    answer_service: Option<Arc<dyn AnswerService>>,
    interaction_service: Arc<dyn InteractionService>,
    comment_service: Option<Arc<dyn CommentService>>,
    profile_service: Option<Arc<dyn ProfileService>>,
    session_manager: Option<Arc<session::Manager>>,
    uploader: Option<Arc<backend::Client>>,
    media_bucket: String,
    max_upload_bytes: i64,
    media_cache: Option<Arc<media::Cache>>,
    player: PlayerConfig,
    config_path: String,

    session: Option<Session>,
    auth_in_progress: bool,
    posting: bool,

    feed: FeedView,
    swipe: SwipeTracker,
    pending_feed: Option<u64>,
    pending_page: Option<u64>,

    likes: HashMap<String, Toggle>,
    follows: HashMap<String, Toggle>,
    comment_counts: HashMap<String, i64>,
    stats_requested: HashSet<String>,

    landing_selected: usize,
    login_form: Form,
    signup_form: Form,

    ask_input: String,
    ask_public: bool,

    browse_filter: String,
    browse_selected: usize,
    questions: Vec<QuestionSummary>,
    pending_questions: Option<u64>,

    detail_question: Option<QuestionSummary>,
    detail_answers: Vec<FeedItem>,
    detail_selected: usize,
    pending_detail: Option<u64>,

    compose_question: Option<(String, String)>,
    compose_mode: MediaKind,
    compose_input: String,

    comments_answer: Option<String>,
    comments: Vec<Comment>,
    comment_selected: usize,
    comment_input: String,
    pending_comments: Option<u64>,

    profile_user: Option<String>,
    profile: Option<Profile>,
    profile_answers: Vec<FeedItem>,
    profile_selected: usize,
    profile_followers: i64,
    profile_following: i64,
    pending_profile: Option<u64>,
    profile_edit: Option<Form>,

    matcher: SkimMatcherV2,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let session = opts
            .session_manager
            .as_ref()
            .and_then(|manager| manager.active());
        let screen = if session.is_some() {
            Screen::Feed
        } else {
            Screen::Landing
        };

        Self {
            status_message: opts.status_message,
            screen,
            screen_stack: Vec::new(),
            needs_redraw: true,
            spinner: Spinner::new(),
            feed_service: opts.feed_service,
            question_service: opts.question_service,
            answer_service: opts.answer_service,
            interaction_service: opts.interaction_service,
            comment_service: opts.comment_service,
            profile_service: opts.profile_service,
            session_manager: opts.session_manager,
            uploader: opts.uploader,
            media_bucket: opts.media_bucket,
            max_upload_bytes: opts.max_upload_bytes,
            media_cache: opts.media_cache,
            player: opts.player,
            config_path: opts.config_path,
            session,
            auth_in_progress: false,
            posting: false,
            feed: FeedView::new(Vec::new()),
            swipe: SwipeTracker::default(),
            pending_feed: None,
            pending_page: None,
            likes: HashMap::new(),
            follows: HashMap::new(),
            comment_counts: HashMap::new(),
            stats_requested: HashSet::new(),
            landing_selected: 0,
            login_form: Form::new(vec![Field::new("Email"), Field::masked("Password")]),
            signup_form: Form::new(vec![
                Field::new("Email"),
                Field::new("Username"),
                Field::masked("Password"),
            ]),
            ask_input: String::new(),
            ask_public: true,
            browse_filter: String::new(),
            browse_selected: 0,
            questions: Vec::new(),
            pending_questions: None,
            detail_question: None,
            detail_answers: Vec::new(),
            detail_selected: 0,
            pending_detail: None,
            compose_question: None,
            compose_mode: MediaKind::Text,
            compose_input: String::new(),
            comments_answer: None,
            comments: Vec::new(),
            comment_selected: 0,
            comment_input: String::new(),
            pending_comments: None,
            profile_user: None,
            profile: None,
            profile_answers: Vec::new(),
            profile_selected: 0,
            profile_followers: 0,
            profile_following: 0,
            pending_profile: None,
            profile_edit: None,
            matcher: SkimMatcherV2::default(),
            response_tx,
            response_rx,
            next_request_id: 1,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.reload_feed();
        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse) {
                            self.status_message = format!("Error: {}", err);
                            self.mark_dirty();
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.pending_feed.is_some()
            || self.pending_page.is_some()
            || self.pending_questions.is_some()
            || self.pending_detail.is_some()
            || self.pending_comments.is_some()
            || self.pending_profile.is_some()
            || self.auth_in_progress
            || self.posting
    }

    fn request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn session_user_id(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|session| session.user_id().to_string())
    }

    fn push_screen(&mut self, screen: Screen) {
        self.screen_stack.push(self.screen);
        self.screen = screen;
        self.mark_dirty();
    }

    fn pop_screen(&mut self) {
        if let Some(previous) = self.screen_stack.pop() {
            self.screen = previous;
        } else {
            self.screen = if self.session.is_some() {
                Screen::Feed
            } else {
                Screen::Landing
            };
        }
        self.mark_dirty();
    }

    // ----- background requests -----

    fn reload_feed(&mut self) {
        let request_id = self.request_id();
        self.pending_feed = Some(request_id);
        // A refresh supersedes any page fetch still in flight; its result
        // belongs to the old sequence.
        self.pending_page = None;
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.first_page();
            let _ = tx.send(AsyncResponse::FeedPage { request_id, result });
        });
        self.mark_dirty();
    }

    fn maybe_prefetch(&mut self) {
        let Some(cursor) = self.feed.begin_prefetch() else {
            return;
        };
        let request_id = self.request_id();
        self.pending_page = Some(request_id);
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.page_after(cursor);
            let _ = tx.send(AsyncResponse::NextPage { request_id, result });
        });
    }

    /// Fetch like/follow/comment state for an answer once per feed session;
    /// optimistic toggles take over from there.
    fn ensure_stats(&mut self, item: &FeedItem) {
        if self.stats_requested.contains(&item.id) {
            return;
        }
        self.stats_requested.insert(item.id.clone());

        let interaction = self.interaction_service.clone();
        let comments = self.comment_service.clone();
        let tx = self.response_tx.clone();
        let answer_id = item.id.clone();
        let author_id = item.user_id.clone();
        let viewer = self.session_user_id();
        thread::spawn(move || {
            let result = (|| -> Result<AnswerStats> {
                let like_count = interaction.like_count(&answer_id)?;
                let (liked, following) = match viewer.as_deref() {
                    Some(user_id) => (
                        interaction.has_liked(&answer_id, user_id)?,
                        interaction.is_following(user_id, &author_id)?,
                    ),
                    None => (false, false),
                };
                let comment_count = match &comments {
                    Some(service) => service.comment_count(&answer_id)?,
                    None => 0,
                };
                Ok(AnswerStats {
                    liked,
                    like_count,
                    following,
                    comment_count,
                })
            })();
            let _ = tx.send(AsyncResponse::Stats {
                answer_id,
                author_id,
                result,
            });
        });
    }

    fn toggle_like(&mut self, item: &FeedItem) {
        let Some(user_id) = self.session_user_id() else {
            self.status_message = "Sign in to like answers.".to_string();
            self.mark_dirty();
            return;
        };
        let toggle = self
            .likes
            .entry(item.id.clone())
            .or_insert_with(|| Toggle::new(false, 0));
        let Some(target) = toggle.request() else {
            return;
        };

        let service = self.interaction_service.clone();
        let tx = self.response_tx.clone();
        let answer_id = item.id.clone();
        thread::spawn(move || {
            let result = if target {
                service.like(&answer_id, &user_id)
            } else {
                service.unlike(&answer_id, &user_id)
            };
            let _ = tx.send(AsyncResponse::LikeResult {
                answer_id,
                error: result.err().map(|err| err.to_string()),
            });
        });
        self.mark_dirty();
    }

    fn toggle_follow(&mut self, author_id: &str, author_name: &str) {
        let Some(user_id) = self.session_user_id() else {
            self.status_message = "Sign in to follow people.".to_string();
            self.mark_dirty();
            return;
        };
        if user_id == author_id {
            self.status_message = "That's you.".to_string();
            self.mark_dirty();
            return;
        }
        let toggle = self
            .follows
            .entry(author_id.to_string())
            .or_insert_with(|| Toggle::new(false, 0));
        let Some(target) = toggle.request() else {
            return;
        };

        self.status_message = if target {
            format!("Following @{}.", author_name)
        } else {
            format!("Unfollowed @{}.", author_name)
        };

        let service = self.interaction_service.clone();
        let tx = self.response_tx.clone();
        let author_id = author_id.to_string();
        thread::spawn(move || {
            let result = if target {
                service.follow(&user_id, &author_id)
            } else {
                service.unfollow(&user_id, &author_id)
            };
            let _ = tx.send(AsyncResponse::FollowResult {
                user_id: author_id,
                error: result.err().map(|err| err.to_string()),
            });
        });
        self.mark_dirty();
    }

    fn open_comments(&mut self, answer_id: &str) {
        let Some(service) = self.comment_service.clone() else {
            self.status_message = "Comments need a configured backend.".to_string();
            self.mark_dirty();
            return;
        };
        let request_id = self.request_id();
        self.pending_comments = Some(request_id);
        self.comments_answer = Some(answer_id.to_string());
        self.comments.clear();
        self.comment_selected = 0;
        self.comment_input.clear();

        let tx = self.response_tx.clone();
        let answer_id = answer_id.to_string();
        thread::spawn(move || {
            let result = service.list(&answer_id);
            let _ = tx.send(AsyncResponse::Comments {
                request_id,
                answer_id,
                result,
            });
        });
        self.push_screen(Screen::Comments);
    }

    fn post_comment(&mut self) {
        let Some(user_id) = self.session_user_id() else {
            self.status_message = "Sign in to comment.".to_string();
            self.mark_dirty();
            return;
        };
        let Some(answer_id) = self.comments_answer.clone() else {
            return;
        };
        let content = self.comment_input.trim().to_string();
        if content.is_empty() {
            self.status_message = "Comment cannot be empty.".to_string();
            self.mark_dirty();
            return;
        }
        let Some(service) = self.comment_service.clone() else {
            return;
        };

        self.posting = true;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.add(&answer_id, &user_id, &content);
            let _ = tx.send(AsyncResponse::CommentPosted { answer_id, result });
        });
        self.mark_dirty();
    }

    fn delete_selected_comment(&mut self) {
        let Some(user_id) = self.session_user_id() else {
            return;
        };
        let Some(comment) = self.comments.get(self.comment_selected) else {
            return;
        };
        if comment.user_id != user_id {
            self.status_message = "You can only delete your own comments.".to_string();
            self.mark_dirty();
            return;
        }
        let Some(service) = self.comment_service.clone() else {
            return;
        };
        let Some(answer_id) = self.comments_answer.clone() else {
            return;
        };

        let comment_id = comment.id.clone();
        self.posting = true;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.delete(&comment_id, &user_id);
            let _ = tx.send(AsyncResponse::CommentDeleted { answer_id, result });
        });
        self.mark_dirty();
    }

    fn open_browse(&mut self) {
        let Some(service) = self.question_service.clone() else {
            self.status_message = "Browsing needs a configured backend.".to_string();
            self.mark_dirty();
            return;
        };
        let request_id = self.request_id();
        self.pending_questions = Some(request_id);
        self.browse_filter.clear();
        self.browse_selected = 0;

        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.browse_public();
            let _ = tx.send(AsyncResponse::Questions { request_id, result });
        });
        self.push_screen(Screen::Browse);
    }

    fn open_question(&mut self, summary: QuestionSummary) {
        let Some(service) = self.question_service.clone() else {
            return;
        };
        let request_id = self.request_id();
        self.pending_detail = Some(request_id);
        let question_id = summary.id.clone();
        self.detail_question = Some(summary);
        self.detail_answers.clear();
        self.detail_selected = 0;

        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.answers_for(&question_id);
            let _ = tx.send(AsyncResponse::QuestionAnswers {
                request_id,
                question_id,
                result,
            });
        });
        self.push_screen(Screen::QuestionDetail);
    }

    fn submit_question(&mut self) {
        let Some(user_id) = self.session_user_id() else {
            self.status_message = "Sign in to ask questions.".to_string();
            self.mark_dirty();
            return;
        };
        let Some(service) = self.question_service.clone() else {
            return;
        };
        let content = self.ask_input.trim().to_string();
        if content.is_empty() {
            self.status_message = "Question cannot be empty.".to_string();
            self.mark_dirty();
            return;
        }
        if content.chars().count() > MAX_QUESTION_LEN {
            self.status_message = format!("Questions are capped at {} characters.", MAX_QUESTION_LEN);
            self.mark_dirty();
            return;
        }

        self.posting = true;
        let is_public = self.ask_public;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.ask(&user_id, &content, is_public);
            let _ = tx.send(AsyncResponse::Asked { result });
        });
        self.mark_dirty();
    }

    fn open_compose(&mut self, question_id: String, question_content: String) {
        if self.session.is_none() {
            self.status_message = "Sign in to answer questions.".to_string();
            self.push_screen(Screen::Login);
            return;
        }
        if self.answer_service.is_none() {
            self.status_message = "Answering needs a configured backend.".to_string();
            self.mark_dirty();
            return;
        }
        self.compose_question = Some((question_id, question_content));
        self.compose_mode = MediaKind::Text;
        self.compose_input.clear();
        self.push_screen(Screen::Compose);
    }

    /// Validate locally, then upload media (when any) and insert the answer
    /// off the event loop.
    fn submit_answer(&mut self) {
        let Some(user_id) = self.session_user_id() else {
            return;
        };
        let Some((question_id, _)) = self.compose_question.clone() else {
            return;
        };
        let Some(service) = self.answer_service.clone() else {
            return;
        };

        let input = match data::validate_answer_input(self.compose_mode, &self.compose_input) {
            Ok(input) => input,
            Err(err) => {
                self.status_message = err.to_string();
                self.mark_dirty();
                return;
            }
        };

        let tx = self.response_tx.clone();
        match self.compose_mode {
            MediaKind::Text => {
                let content = input;
                self.posting = true;
                thread::spawn(move || {
                    let result = service.submit(NewAnswer {
                        question_id: question_id.clone(),
                        user_id,
                        content: Some(content),
                        media_url: None,
                        media_type: MediaKind::Text,
                    });
                    let _ = tx.send(AsyncResponse::AnswerPosted {
                        question_id,
                        result,
                    });
                });
            }
            kind => {
                let Some(uploader) = self.uploader.clone() else {
                    self.status_message = "Media uploads need a configured backend.".to_string();
                    self.mark_dirty();
                    return;
                };
                let path = input;
                let bucket = self.media_bucket.clone();
                let max_bytes = self.max_upload_bytes;
                self.posting = true;
                thread::spawn(move || {
                    let result = (|| -> Result<FeedItem> {
                        let upload = media::prepare_upload(Path::new(&path), kind, max_bytes)?;
                        let object = media::object_path(&user_id, &upload.extension);
                        let url = uploader.upload_object(
                            &bucket,
                            &object,
                            upload.bytes,
                            &upload.content_type,
                        )?;
                        service.submit(NewAnswer {
                            question_id: question_id.clone(),
                            user_id: user_id.clone(),
                            content: None,
                            media_url: Some(url),
                            media_type: kind,
                        })
                    })();
                    let _ = tx.send(AsyncResponse::AnswerPosted {
                        question_id,
                        result,
                    });
                });
            }
        }
        self.mark_dirty();
    }

    fn open_profile(&mut self, user_id: &str) {
        let Some(service) = self.profile_service.clone() else {
            self.status_message = "Profiles need a configured backend.".to_string();
            self.mark_dirty();
            return;
        };
        let request_id = self.request_id();
        self.pending_profile = Some(request_id);
        self.profile_user = Some(user_id.to_string());
        self.profile = None;
        self.profile_answers.clear();
        self.profile_selected = 0;
        self.profile_edit = None;

        let interaction = self.interaction_service.clone();
        let tx = self.response_tx.clone();
        let user_id = user_id.to_string();
        let id_for_thread = user_id.clone();
        thread::spawn(move || {
            let result = (|| -> Result<ProfileBundle> {
                Ok(ProfileBundle {
                    profile: service.profile(&id_for_thread)?,
                    answers: service.answers_by(&id_for_thread)?,
                    followers: interaction.follower_count(&id_for_thread)?,
                    following: interaction.following_count(&id_for_thread)?,
                })
            })();
            let _ = tx.send(AsyncResponse::ProfileLoaded {
                request_id,
                user_id: id_for_thread,
                result,
            });
        });
        if self.screen != Screen::Profile {
            self.push_screen(Screen::Profile);
        } else {
            self.mark_dirty();
        }
    }

    fn save_profile(&mut self) {
        let Some(user_id) = self.session_user_id() else {
            return;
        };
        let Some(form) = self.profile_edit.as_ref() else {
            return;
        };
        let Some(service) = self.profile_service.clone() else {
            return;
        };
        let display_name = form.value(0).to_string();
        let bio = form.value(1).to_string();

        self.posting = true;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.update_own(&user_id, &display_name, &bio);
            let _ = tx.send(AsyncResponse::ProfileSaved { user_id, result });
        });
        self.mark_dirty();
    }

    fn delete_selected_answer(&mut self) {
        let Some(user_id) = self.session_user_id() else {
            return;
        };
        if self.profile_user.as_deref() != Some(user_id.as_str()) {
            return;
        }
        let Some(item) = self.profile_answers.get(self.profile_selected) else {
            return;
        };
        let Some(service) = self.answer_service.clone() else {
            return;
        };

        let answer_id = item.id.clone();
        self.posting = true;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.delete(&answer_id, &user_id);
            let _ = tx.send(AsyncResponse::AnswerDeleted { answer_id, result });
        });
        self.mark_dirty();
    }

    fn sign_in(&mut self) {
        let Some(manager) = self.session_manager.clone() else {
            self.status_message = format!(
                "No backend configured. Set backend.base_url and backend.anon_key in {}.",
                self.config_path
            );
            self.mark_dirty();
            return;
        };
        let email = self.login_form.value(0).to_string();
        let password = self.login_form.value(1).to_string();

        self.auth_in_progress = true;
        self.status_message = "Signing in…".to_string();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = manager.sign_in(&email, &password);
            let _ = tx.send(AsyncResponse::Auth { result });
        });
        self.mark_dirty();
    }

    fn sign_up(&mut self) {
        let Some(manager) = self.session_manager.clone() else {
            self.status_message = format!(
                "No backend configured. Set backend.base_url and backend.anon_key in {}.",
                self.config_path
            );
            self.mark_dirty();
            return;
        };
        let email = self.signup_form.value(0).to_string();
        let username = self.signup_form.value(1).to_string();
        let password = self.signup_form.value(2).to_string();

        self.auth_in_progress = true;
        self.status_message = "Creating account…".to_string();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = manager.sign_up(&email, &password, &username);
            let _ = tx.send(AsyncResponse::Auth { result });
        });
        self.mark_dirty();
    }

    fn sign_out(&mut self) {
        if let Some(manager) = self.session_manager.as_ref() {
            if let Err(err) = manager.sign_out() {
                self.status_message = format!("Sign out failed: {}", err);
                self.mark_dirty();
                return;
            }
        }
        self.session = None;
        self.reset_engagement();
        self.status_message = "Signed out.".to_string();
        self.screen = Screen::Landing;
        self.screen_stack.clear();
        self.mark_dirty();
    }

    /// Liked/following state is per-viewer; drop it when the viewer changes.
    fn reset_engagement(&mut self) {
        self.likes.clear();
        self.follows.clear();
        self.comment_counts.clear();
        self.stats_requested.clear();
    }

    fn open_media(&mut self, item: &FeedItem) {
        let Some(url) = item.media_url.clone() else {
            self.status_message = "This answer has no media.".to_string();
            self.mark_dirty();
            return;
        };
        match item.media_kind() {
            MediaKind::Video | MediaKind::Audio => {
                match launch_player(&self.player, &url) {
                    Ok(()) => self.status_message = "Launched external player.".to_string(),
                    Err(err) => self.status_message = format!("Player failed: {}", err),
                }
                self.mark_dirty();
            }
            MediaKind::Image => {
                if let Some(cache) = self.media_cache.clone() {
                    self.status_message = "Fetching image…".to_string();
                    let tx = self.response_tx.clone();
                    let media_type = item.media_type.map(|kind| kind.as_str().to_string());
                    thread::spawn(move || {
                        let result = cache
                            .fetch(media::Request {
                                url: url.clone(),
                                media_type,
                                ttl: None,
                                force: false,
                            })
                            .map(|entry| entry.file_path);
                        let _ = tx.send(AsyncResponse::MediaReady { url, result });
                    });
                } else if let Err(err) = webbrowser::open(&url) {
                    self.status_message = format!("Failed to open browser: {}", err);
                }
                self.mark_dirty();
            }
            MediaKind::Text => {
                if let Err(err) = webbrowser::open(&url) {
                    self.status_message = format!("Failed to open browser: {}", err);
                    self.mark_dirty();
                }
            }
        }
    }

    fn copy_share_text(&mut self, item: &FeedItem) {
        let mut text = format!("Q: {}\n", item.question.content);
        if let Some(content) = item.content.as_deref() {
            text.push_str(&format!("A: {}\n", content));
        }
        if let Some(url) = item.media_url.as_deref() {
            text.push_str(url);
            text.push('\n');
        }
        text.push_str(&format!("- @{} on KnowMe", item.user.username));

        match arboard::Clipboard::new().and_then(|mut clip| clip.set_text(text)) {
            Ok(()) => self.status_message = "Copied answer to clipboard.".to_string(),
            Err(err) => self.status_message = format!("Clipboard failed: {}", err),
        }
        self.mark_dirty();
    }

    // ----- async responses -----

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::FeedPage { request_id, result } => {
                if self.pending_feed != Some(request_id) {
                    return;
                }
                self.pending_feed = None;
                match result {
                    Ok(items) => {
                        let count = items.len();
                        self.feed.reset(items);
                        self.reset_engagement();
                        if let Some(item) = self.feed.current().cloned() {
                            self.ensure_stats(&item);
                        }
                        self.status_message = if count == 0 {
                            "The feed is empty. Ask a question to get things moving.".to_string()
                        } else {
                            format!("Loaded {} answers. Swipe or press j/k to browse.", count)
                        };
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load feed: {}", err);
                    }
                }
            }
            AsyncResponse::NextPage { request_id, result } => {
                if self.pending_page != Some(request_id) {
                    // A stale page must not flip the fetch state owned by a
                    // newer request.
                    return;
                }
                self.pending_page = None;
                match result {
                    Ok(items) => {
                        self.feed.apply_page(items);
                        if let Some(item) = self.feed.current().cloned() {
                            self.ensure_stats(&item);
                        }
                    }
                    Err(err) => {
                        self.feed.fetch_failed();
                        self.status_message = format!("Failed to load more answers: {}", err);
                    }
                }
            }
            AsyncResponse::Stats {
                answer_id,
                author_id,
                result,
            } => match result {
                Ok(stats) => {
                    self.likes
                        .entry(answer_id.clone())
                        .or_insert_with(|| Toggle::new(false, 0))
                        .sync(stats.liked, stats.like_count);
                    self.follows
                        .entry(author_id)
                        .or_insert_with(|| Toggle::new(false, 0))
                        .sync(stats.following, 0);
                    self.comment_counts.insert(answer_id, stats.comment_count);
                }
                Err(_) => {
                    // Allow a retry the next time the answer is shown.
                    self.stats_requested.remove(&answer_id);
                }
            },
            AsyncResponse::LikeResult { answer_id, error } => {
                if let Some(toggle) = self.likes.get_mut(&answer_id) {
                    match error {
                        None => toggle.confirm(),
                        Some(message) => {
                            toggle.rollback();
                            self.status_message = format!("Like failed: {}", message);
                        }
                    }
                }
            }
            AsyncResponse::FollowResult { user_id, error } => {
                if let Some(toggle) = self.follows.get_mut(&user_id) {
                    match error {
                        None => toggle.confirm(),
                        Some(message) => {
                            toggle.rollback();
                            self.status_message = format!("Follow failed: {}", message);
                        }
                    }
                }
            }
            AsyncResponse::Comments {
                request_id,
                answer_id,
                result,
            } => {
                if self.pending_comments != Some(request_id) {
                    return;
                }
                self.pending_comments = None;
                if self.comments_answer.as_deref() != Some(answer_id.as_str()) {
                    return;
                }
                match result {
                    Ok(comments) => {
                        self.comment_counts
                            .insert(answer_id, comments.len() as i64);
                        self.comments = comments;
                        self.comment_selected = 0;
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load comments: {}", err);
                    }
                }
            }
            AsyncResponse::CommentPosted { answer_id, result } => {
                self.posting = false;
                match result {
                    Ok(comment) => {
                        if self.comments_answer.as_deref() == Some(answer_id.as_str()) {
                            self.comments.insert(0, comment);
                            self.comment_input.clear();
                            self.comment_selected = 0;
                        }
                        *self.comment_counts.entry(answer_id).or_insert(0) += 1;
                        self.status_message = "Comment posted.".to_string();
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to post comment: {}", err);
                    }
                }
            }
            AsyncResponse::CommentDeleted { answer_id, result } => {
                self.posting = false;
                match result {
                    Ok(()) => {
                        if self.comments_answer.as_deref() == Some(answer_id.as_str()) {
                            if self.comment_selected < self.comments.len() {
                                self.comments.remove(self.comment_selected);
                            }
                            self.comment_selected =
                                self.comment_selected.min(self.comments.len().saturating_sub(1));
                        }
                        if let Some(count) = self.comment_counts.get_mut(&answer_id) {
                            *count = (*count - 1).max(0);
                        }
                        self.status_message = "Comment deleted.".to_string();
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to delete comment: {}", err);
                    }
                }
            }
            AsyncResponse::Questions { request_id, result } => {
                if self.pending_questions != Some(request_id) {
                    return;
                }
                self.pending_questions = None;
                match result {
                    Ok(questions) => {
                        self.questions = questions;
                        self.browse_selected = 0;
                        self.status_message = format!(
                            "{} public questions. Type to filter, Enter to open.",
                            self.questions.len()
                        );
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load questions: {}", err);
                    }
                }
            }
            AsyncResponse::QuestionAnswers {
                request_id,
                question_id,
                result,
            } => {
                if self.pending_detail != Some(request_id) {
                    return;
                }
                self.pending_detail = None;
                if self
                    .detail_question
                    .as_ref()
                    .map(|question| question.id.as_str())
                    != Some(question_id.as_str())
                {
                    return;
                }
                match result {
                    Ok(answers) => {
                        self.detail_answers = answers;
                        self.detail_selected = 0;
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load answers: {}", err);
                    }
                }
            }
            AsyncResponse::Asked { result } => {
                self.posting = false;
                match result {
                    Ok(question) => {
                        self.ask_input.clear();
                        self.status_message = if question.is_public {
                            "Question posted. It is now open for answers.".to_string()
                        } else {
                            "Private question posted.".to_string()
                        };
                        self.pop_screen();
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to post question: {}", err);
                    }
                }
            }
            AsyncResponse::AnswerPosted {
                question_id,
                result,
            } => {
                self.posting = false;
                match result {
                    Ok(_) => {
                        self.compose_input.clear();
                        self.compose_question = None;
                        self.status_message = "Answer posted.".to_string();
                        self.pop_screen();
                        // Refresh the detail list when returning to it.
                        if self.screen == Screen::QuestionDetail {
                            if let Some(summary) = self.detail_question.clone() {
                                if summary.id == question_id {
                                    self.open_question_answers_only(summary.id);
                                }
                            }
                        }
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to post answer: {}", err);
                    }
                }
            }
            AsyncResponse::AnswerDeleted { answer_id, result } => {
                self.posting = false;
                match result {
                    Ok(()) => {
                        self.profile_answers.retain(|item| item.id != answer_id);
                        self.profile_selected = self
                            .profile_selected
                            .min(self.profile_answers.len().saturating_sub(1));
                        self.status_message = "Answer deleted.".to_string();
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to delete answer: {}", err);
                    }
                }
            }
            AsyncResponse::Auth { result } => {
                self.auth_in_progress = false;
                match result {
                    Ok(session) => {
                        self.status_message = format!(
                            "Signed in as @{}.",
                            session.account.username
                        );
                        self.session = Some(session);
                        self.login_form.clear();
                        self.signup_form.clear();
                        self.reset_engagement();
                        self.screen = Screen::Feed;
                        self.screen_stack.clear();
                        if let Some(item) = self.feed.current().cloned() {
                            self.ensure_stats(&item);
                        }
                    }
                    Err(err) => {
                        self.status_message = format!("{}", err);
                    }
                }
            }
            AsyncResponse::ProfileLoaded {
                request_id,
                user_id,
                result,
            } => {
                if self.pending_profile != Some(request_id) {
                    return;
                }
                self.pending_profile = None;
                if self.profile_user.as_deref() != Some(user_id.as_str()) {
                    return;
                }
                match result {
                    Ok(bundle) => {
                        self.profile = bundle.profile;
                        self.profile_answers = bundle.answers;
                        self.profile_followers = bundle.followers;
                        self.profile_following = bundle.following;
                        self.profile_selected = 0;
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load profile: {}", err);
                    }
                }
            }
            AsyncResponse::ProfileSaved { user_id, result } => {
                self.posting = false;
                match result {
                    Ok(()) => {
                        self.profile_edit = None;
                        self.status_message = "Profile saved.".to_string();
                        self.open_profile(&user_id.clone());
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to save profile: {}", err);
                    }
                }
            }
            AsyncResponse::MediaReady { url: _, result } => match result {
                Ok(file_path) => {
                    match webbrowser::open(&format!("file://{}", file_path)) {
                        Ok(()) => self.status_message = "Opened image.".to_string(),
                        Err(err) => {
                            self.status_message = format!("Failed to open image: {}", err)
                        }
                    }
                }
                Err(err) => {
                    self.status_message = format!("Failed to fetch media: {}", err);
                }
            },
        }
        self.mark_dirty();
    }

    fn open_question_answers_only(&mut self, question_id: String) {
        let Some(service) = self.question_service.clone() else {
            return;
        };
        let request_id = self.request_id();
        self.pending_detail = Some(request_id);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.answers_for(&question_id);
            let _ = tx.send(AsyncResponse::QuestionAnswers {
                request_id,
                question_id,
                result,
            });
        });
    }

    // ----- input -----

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        match self.screen {
            Screen::Landing => self.handle_landing_key(code),
            Screen::Login => self.handle_login_key(code),
            Screen::Signup => self.handle_signup_key(code),
            Screen::Feed => self.handle_feed_key(code),
            Screen::Ask => self.handle_ask_key(code),
            Screen::Browse => self.handle_browse_key(code),
            Screen::QuestionDetail => self.handle_detail_key(code),
            Screen::Compose => self.handle_compose_key(code),
            Screen::Comments => self.handle_comments_key(code),
            Screen::Profile => self.handle_profile_key(code),
        }
    }

    fn handle_landing_key(&mut self, code: KeyCode) -> Result<bool> {
        const OPTION_COUNT: usize = 3;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Up | KeyCode::Char('k') => {
                self.landing_selected =
                    (self.landing_selected + OPTION_COUNT - 1) % OPTION_COUNT;
                self.mark_dirty();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.landing_selected = (self.landing_selected + 1) % OPTION_COUNT;
                self.mark_dirty();
            }
            KeyCode::Enter => match self.landing_selected {
                0 => self.push_screen(Screen::Login),
                1 => self.push_screen(Screen::Signup),
                _ => {
                    self.status_message =
                        "Browsing as a guest. Sign in to like, follow, and post.".to_string();
                    self.screen = Screen::Feed;
                    self.screen_stack.clear();
                    self.mark_dirty();
                }
            },
            KeyCode::Char('1') => self.push_screen(Screen::Login),
            KeyCode::Char('2') => self.push_screen(Screen::Signup),
            KeyCode::Char('3') => {
                self.screen = Screen::Feed;
                self.screen_stack.clear();
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_login_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc => self.pop_screen(),
            KeyCode::Tab | KeyCode::Down => {
                self.login_form.next();
                self.mark_dirty();
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.login_form.previous();
                self.mark_dirty();
            }
            KeyCode::Enter => {
                if !self.auth_in_progress {
                    self.sign_in();
                }
            }
            KeyCode::Backspace => {
                self.login_form.backspace();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.login_form.insert_char(ch);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_signup_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc => self.pop_screen(),
            KeyCode::Tab | KeyCode::Down => {
                self.signup_form.next();
                self.mark_dirty();
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.signup_form.previous();
                self.mark_dirty();
            }
            KeyCode::Enter => {
                if !self.auth_in_progress {
                    self.sign_up();
                }
            }
            KeyCode::Backspace => {
                self.signup_form.backspace();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.signup_form.insert_char(ch);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_feed_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Char(' ') => {
                self.advance_feed();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.retreat_feed();
            }
            KeyCode::Char('l') => {
                if let Some(item) = self.feed.current().cloned() {
                    self.toggle_like(&item);
                }
            }
            KeyCode::Char('f') => {
                if let Some(item) = self.feed.current().cloned() {
                    self.toggle_follow(&item.user_id, &item.user.username);
                }
            }
            KeyCode::Char('c') => {
                if let Some(item) = self.feed.current().cloned() {
                    self.open_comments(&item.id);
                }
            }
            KeyCode::Char('a') => {
                if let Some(item) = self.feed.current().cloned() {
                    self.open_compose(item.question_id.clone(), item.question.content.clone());
                }
            }
            KeyCode::Char('o') | KeyCode::Enter => {
                if let Some(item) = self.feed.current().cloned() {
                    self.open_media(&item);
                }
            }
            KeyCode::Char('y') => {
                if let Some(item) = self.feed.current().cloned() {
                    self.copy_share_text(&item);
                }
            }
            KeyCode::Char('p') => {
                if let Some(item) = self.feed.current().cloned() {
                    self.open_profile(&item.user_id);
                }
            }
            KeyCode::Char('m') => {
                if let Some(user_id) = self.session_user_id() {
                    self.open_profile(&user_id);
                } else {
                    self.status_message = "Sign in to see your profile.".to_string();
                    self.mark_dirty();
                }
            }
            KeyCode::Char('b') => self.open_browse(),
            KeyCode::Char('n') => {
                if self.session.is_some() {
                    self.push_screen(Screen::Ask);
                } else {
                    self.status_message = "Sign in to ask questions.".to_string();
                    self.push_screen(Screen::Login);
                }
            }
            KeyCode::Char('r') => {
                self.status_message = "Refreshing feed…".to_string();
                self.reload_feed();
            }
            KeyCode::Char('s') => {
                if self.session.is_some() {
                    self.sign_out();
                } else {
                    self.screen = Screen::Landing;
                    self.screen_stack.clear();
                    self.mark_dirty();
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn advance_feed(&mut self) {
        if self.feed.advance() {
            if let Some(item) = self.feed.current().cloned() {
                self.ensure_stats(&item);
            }
            self.mark_dirty();
        } else if self.feed.is_exhausted() && !self.feed.is_empty() {
            self.status_message = "You're all caught up.".to_string();
            self.mark_dirty();
        }
        self.maybe_prefetch();
    }

    fn retreat_feed(&mut self) {
        if self.feed.retreat() {
            if let Some(item) = self.feed.current().cloned() {
                self.ensure_stats(&item);
            }
            self.mark_dirty();
        }
    }

    fn handle_ask_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc => {
                self.ask_input.clear();
                self.pop_screen();
            }
            KeyCode::Enter => {
                if !self.posting {
                    self.submit_question();
                }
            }
            KeyCode::F(2) => {
                self.ask_public = !self.ask_public;
                self.mark_dirty();
            }
            KeyCode::Backspace => {
                self.ask_input.pop();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.ask_input.push(ch);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn filtered_questions(&self) -> Vec<usize> {
        if self.browse_filter.trim().is_empty() {
            return (0..self.questions.len()).collect();
        }
        let mut scored: Vec<(i64, usize)> = self
            .questions
            .iter()
            .enumerate()
            .filter_map(|(index, question)| {
                let haystack = format!("{} {}", question.content, question.user.username);
                self.matcher
                    .fuzzy_match(&haystack, self.browse_filter.trim())
                    .map(|score| (score, index))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, index)| index).collect()
    }

    fn handle_browse_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc => {
                if self.browse_filter.is_empty() {
                    self.pop_screen();
                } else {
                    self.browse_filter.clear();
                    self.browse_selected = 0;
                    self.mark_dirty();
                }
            }
            KeyCode::Up => {
                self.browse_selected = self.browse_selected.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Down => {
                let visible = self.filtered_questions().len();
                if visible > 0 {
                    self.browse_selected = (self.browse_selected + 1).min(visible - 1);
                }
                self.mark_dirty();
            }
            KeyCode::Enter => {
                let visible = self.filtered_questions();
                if let Some(&index) = visible.get(self.browse_selected) {
                    if let Some(summary) = self.questions.get(index).cloned() {
                        self.open_question(summary);
                    }
                }
            }
            KeyCode::Backspace => {
                self.browse_filter.pop();
                self.browse_selected = 0;
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.browse_filter.push(ch);
                self.browse_selected = 0;
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_detail_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc | KeyCode::Char('q') => self.pop_screen(),
            KeyCode::Up | KeyCode::Char('k') => {
                self.detail_selected = self.detail_selected.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if !self.detail_answers.is_empty() {
                    self.detail_selected =
                        (self.detail_selected + 1).min(self.detail_answers.len() - 1);
                }
                self.mark_dirty();
            }
            KeyCode::Char('a') => {
                if let Some(question) = self.detail_question.clone() {
                    self.open_compose(question.id, question.content);
                }
            }
            KeyCode::Char('c') => {
                if let Some(item) = self.detail_answers.get(self.detail_selected).cloned() {
                    self.open_comments(&item.id);
                }
            }
            KeyCode::Char('p') => {
                if let Some(item) = self.detail_answers.get(self.detail_selected).cloned() {
                    self.open_profile(&item.user_id);
                }
            }
            KeyCode::Char('o') => {
                if let Some(item) = self.detail_answers.get(self.detail_selected).cloned() {
                    self.open_media(&item);
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_compose_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc => {
                self.compose_input.clear();
                self.compose_question = None;
                self.pop_screen();
            }
            KeyCode::Enter => {
                if !self.posting {
                    self.submit_answer();
                }
            }
            KeyCode::F(2) => {
                self.compose_mode = match self.compose_mode {
                    MediaKind::Text => MediaKind::Image,
                    MediaKind::Image => MediaKind::Video,
                    MediaKind::Video => MediaKind::Audio,
                    MediaKind::Audio => MediaKind::Text,
                };
                self.compose_input.clear();
                self.mark_dirty();
            }
            KeyCode::Backspace => {
                self.compose_input.pop();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.compose_input.push(ch);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_comments_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc => {
                self.comments_answer = None;
                self.comments.clear();
                self.comment_input.clear();
                self.pop_screen();
            }
            KeyCode::Enter => {
                if !self.posting {
                    self.post_comment();
                }
            }
            KeyCode::Up => {
                self.comment_selected = self.comment_selected.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Down => {
                if !self.comments.is_empty() {
                    self.comment_selected =
                        (self.comment_selected + 1).min(self.comments.len() - 1);
                }
                self.mark_dirty();
            }
            KeyCode::Delete => {
                if !self.posting {
                    self.delete_selected_comment();
                }
            }
            KeyCode::Backspace => {
                self.comment_input.pop();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.comment_input.push(ch);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_profile_key(&mut self, code: KeyCode) -> Result<bool> {
        if let Some(form) = self.profile_edit.as_mut() {
            match code {
                KeyCode::Esc => {
                    self.profile_edit = None;
                    self.mark_dirty();
                }
                KeyCode::Tab | KeyCode::Down => {
                    form.next();
                    self.mark_dirty();
                }
                KeyCode::BackTab | KeyCode::Up => {
                    form.previous();
                    self.mark_dirty();
                }
                KeyCode::Enter => {
                    if !self.posting {
                        self.save_profile();
                    }
                }
                KeyCode::Backspace => {
                    form.backspace();
                    self.mark_dirty();
                }
                KeyCode::Char(ch) => {
                    form.insert_char(ch);
                    self.mark_dirty();
                }
                _ => {}
            }
            return Ok(false);
        }

        match code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.profile_user = None;
                self.pop_screen();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.profile_selected = self.profile_selected.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if !self.profile_answers.is_empty() {
                    self.profile_selected =
                        (self.profile_selected + 1).min(self.profile_answers.len() - 1);
                }
                self.mark_dirty();
            }
            KeyCode::Char('f') => {
                if let (Some(user_id), Some(profile)) =
                    (self.profile_user.clone(), self.profile.clone())
                {
                    self.toggle_follow(&user_id, &profile.username);
                }
            }
            KeyCode::Char('e') => {
                let is_own = self.session_user_id().as_deref() == self.profile_user.as_deref();
                if is_own {
                    let mut form = Form::new(vec![Field::new("Display name"), Field::new("Bio")]);
                    if let Some(profile) = self.profile.as_ref() {
                        form.fields[0].value =
                            profile.display_name.clone().unwrap_or_default();
                        form.fields[1].value = profile.bio.clone().unwrap_or_default();
                    }
                    self.profile_edit = Some(form);
                    self.mark_dirty();
                }
            }
            KeyCode::Delete => {
                if !self.posting {
                    self.delete_selected_answer();
                }
            }
            KeyCode::Char('o') => {
                if let Some(item) = self.profile_answers.get(self.profile_selected).cloned() {
                    self.open_media(&item);
                }
            }
            _ => {}
        }
        Ok(false)
    }

    /// Mouse input only drives the feed: wheel steps map one-to-one to
    /// navigation, press/drag/release goes through the swipe tracker with
    /// rows scaled to pixels.
    fn handle_mouse(&mut self, event: MouseEvent) -> Result<()> {
        if self.screen != Screen::Feed {
            return Ok(());
        }
        match event.kind {
            MouseEventKind::ScrollDown => self.advance_feed(),
            MouseEventKind::ScrollUp => self.retreat_feed(),
            MouseEventKind::Down(MouseButton::Left) => {
                self.swipe.begin(event.row as f32 * CELL_PIXEL_HEIGHT);
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                self.swipe.drag(event.row as f32 * CELL_PIXEL_HEIGHT);
            }
            MouseEventKind::Up(MouseButton::Left) => match self.swipe.release() {
                Some(NavEvent::Advance) => self.advance_feed(),
                Some(NavEvent::Retreat) => self.retreat_feed(),
                None => {}
            },
            _ => {}
        }
        Ok(())
    }

    // ----- drawing -----

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(frame.size());

        match self.screen {
            Screen::Landing => self.draw_landing(frame, chunks[0]),
            Screen::Login => self.draw_form(frame, chunks[0], "Sign in", true),
            Screen::Signup => self.draw_form(frame, chunks[0], "Create account", false),
            Screen::Feed => self.draw_feed(frame, chunks[0]),
            Screen::Ask => self.draw_ask(frame, chunks[0]),
            Screen::Browse => self.draw_browse(frame, chunks[0]),
            Screen::QuestionDetail => self.draw_detail(frame, chunks[0]),
            Screen::Compose => self.draw_compose(frame, chunks[0]),
            Screen::Comments => self.draw_comments(frame, chunks[0]),
            Screen::Profile => self.draw_profile(frame, chunks[0]),
        }

        self.draw_status(frame, chunks[1]);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let mut text = self.status_message.clone();
        if self.is_loading() {
            text = format!("{} {}", self.spinner.frame(), text);
        }
        let status = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
        frame.render_widget(status, area);
    }

    fn draw_landing(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" KnowMe ")
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let options = ["Sign in", "Create account", "Continue as guest"];
        let mut lines = vec![
            Line::from(Span::styled(
                "Ask questions. Answer with text, images, video, or audio.",
                Style::default().fg(Color::Gray),
            )),
            Line::from(""),
        ];
        for (index, option) in options.iter().enumerate() {
            let style = if index == self.landing_selected {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let marker = if index == self.landing_selected {
                "▶ "
            } else {
                "  "
            };
            lines.push(Line::from(Span::styled(
                format!("{}{}. {}", marker, index + 1, option),
                style,
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Config: {}", self.config_path),
            Style::default().fg(Color::DarkGray),
        )));

        let paragraph = Paragraph::new(lines).alignment(Alignment::Left);
        frame.render_widget(paragraph, centered_rect(60, 50, inner));
    }

    fn draw_form(&self, frame: &mut Frame, area: Rect, title: &str, login: bool) {
        let form = if login {
            &self.login_form
        } else {
            &self.signup_form
        };
        let block = Block::default()
            .title(format!(" {} ", title))
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut lines = Vec::new();
        for (index, field) in form.fields.iter().enumerate() {
            let focused = index == form.focus;
            let label_style = if focused {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            let cursor = if focused { "▏" } else { "" };
            lines.push(Line::from(vec![
                Span::styled(format!("{:>10}: ", field.label), label_style),
                Span::raw(field.display_value()),
                Span::styled(cursor, Style::default().fg(Color::Cyan)),
            ]));
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            "Tab: next field · Enter: submit · Esc: back",
            Style::default().fg(Color::DarkGray),
        )));

        let paragraph = Paragraph::new(lines);
        frame.render_widget(paragraph, centered_rect(70, 60, inner));
    }

    fn draw_feed(&self, frame: &mut Frame, area: Rect) {
        let title = match self.session.as_ref() {
            Some(session) => format!(" KnowMe · @{} ", session.account.username),
            None => " KnowMe · guest ".to_string(),
        };
        let position = if self.feed.is_empty() {
            String::from("0/0")
        } else {
            format!("{}/{}", self.feed.index() + 1, self.feed.len())
        };
        let block = Block::default()
            .title(format!("{}· {} ", title, position))
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(item) = self.feed.current() else {
            let empty = Paragraph::new(
                "Nothing here yet.\n\nPress r to refresh, b to browse questions, n to ask one.",
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
            frame.render_widget(empty, centered_rect(60, 40, inner));
            return;
        };

        let card = centered_rect(80, 90, inner);
        let width = card.width.saturating_sub(2).max(20) as usize;
        let mut lines: Vec<Line> = Vec::new();

        for wrapped in textwrap::wrap(&item.question.content, width) {
            lines.push(Line::from(Span::styled(
                wrapped.to_string(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
        }
        lines.push(Line::from(Span::styled(
            format!(
                "answered by {} (@{}) · {}",
                item.user.display(),
                item.user.username,
                relative_time(item.created_at)
            ),
            Style::default().fg(Color::Gray),
        )));
        lines.push(Line::from(""));

        match item.media_kind() {
            MediaKind::Text => {
                let content = item.content.as_deref().unwrap_or("(empty answer)");
                for wrapped in textwrap::wrap(content, width) {
                    lines.push(Line::from(wrapped.to_string()));
                }
            }
            kind => {
                let url = item.media_url.as_deref().unwrap_or("");
                lines.push(Line::from(Span::styled(
                    format!("[{} answer] {}", kind.as_str(), url),
                    Style::default().fg(Color::Magenta),
                )));
                lines.push(Line::from(Span::styled(
                    match kind {
                        MediaKind::Image => "o: view image",
                        _ => "o: play in external player",
                    },
                    Style::default().fg(Color::DarkGray),
                )));
                if let Some(content) = item.content.as_deref() {
                    lines.push(Line::from(""));
                    for wrapped in textwrap::wrap(content, width) {
                        lines.push(Line::from(wrapped.to_string()));
                    }
                }
            }
        }

        lines.push(Line::from(""));
        let like = self.likes.get(&item.id);
        let liked = like.map(|toggle| toggle.active()).unwrap_or(false);
        let like_count = like.map(|toggle| toggle.count()).unwrap_or(0);
        let comment_count = self.comment_counts.get(&item.id).copied().unwrap_or(0);
        let following = self
            .follows
            .get(&item.user_id)
            .map(|toggle| toggle.active())
            .unwrap_or(false);

        let heart = if liked { "♥" } else { "♡" };
        let heart_style = if liked {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::Gray)
        };
        let mut engagement = vec![
            Span::styled(format!("{} {}", heart, like_count), heart_style),
            Span::raw("   "),
            Span::styled(
                format!("💬 {}", comment_count),
                Style::default().fg(Color::Gray),
            ),
        ];
        if following {
            engagement.push(Span::raw("   "));
            engagement.push(Span::styled(
                "following",
                Style::default().fg(Color::Green),
            ));
        }
        lines.push(Line::from(engagement));

        if self.feed.is_fetching() {
            lines.push(Line::from(Span::styled(
                format!("{} loading more…", self.spinner.frame()),
                Style::default().fg(Color::DarkGray),
            )));
        } else if self.feed.is_exhausted() && self.feed.index() + 1 == self.feed.len() {
            lines.push(Line::from(Span::styled(
                "· end of feed ·",
                Style::default().fg(Color::DarkGray),
            )));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "j/k: swipe · l: like · c: comments · a: answer · f: follow · y: share · b: browse · n: ask · q: quit",
            Style::default().fg(Color::DarkGray),
        )));

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
        frame.render_widget(paragraph, card);
    }

    fn draw_ask(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Ask a question ")
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let used = self.ask_input.chars().count();
        let over = used > MAX_QUESTION_LEN;
        let counter_style = if over {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let visibility = if self.ask_public {
            "public (anyone can answer)"
        } else {
            "private"
        };

        let width = inner.width.saturating_sub(4).max(20) as usize;
        let mut lines = Vec::new();
        if self.ask_input.is_empty() {
            lines.push(Line::from(Span::styled(
                "Type your question…",
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            for wrapped in textwrap::wrap(&self.ask_input, width) {
                lines.push(Line::from(wrapped.to_string()));
            }
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{}/{} characters", used, MAX_QUESTION_LEN),
            counter_style,
        )));
        lines.push(Line::from(Span::styled(
            format!("Visibility: {} (F2 toggles)", visibility),
            Style::default().fg(Color::Gray),
        )));
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Enter: post · Esc: cancel",
            Style::default().fg(Color::DarkGray),
        )));

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
        frame.render_widget(paragraph, centered_rect(80, 70, inner));
    }

    fn draw_browse(&self, frame: &mut Frame, area: Rect) {
        let filter_line = if self.browse_filter.is_empty() {
            " Browse questions · type to filter ".to_string()
        } else {
            format!(" Browse questions · filter: {} ", self.browse_filter)
        };
        let block = Block::default().title(filter_line).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let visible = self.filtered_questions();
        if visible.is_empty() {
            let empty = Paragraph::new("No questions match.")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, centered_rect(50, 20, inner));
            return;
        }

        let items: Vec<ListItem> = visible
            .iter()
            .filter_map(|&index| self.questions.get(index))
            .map(|question| {
                let answers = question.answer_count();
                let noun = if answers == 1 { "answer" } else { "answers" };
                ListItem::new(vec![
                    Line::from(Span::raw(question.content.clone())),
                    Line::from(Span::styled(
                        format!(
                            "  @{} · {} {} · {}",
                            question.user.username,
                            answers,
                            noun,
                            relative_time(question.created_at)
                        ),
                        Style::default().fg(Color::DarkGray),
                    )),
                ])
            })
            .collect();

        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");
        let mut state = ListState::default();
        state.select(Some(self.browse_selected.min(visible.len() - 1)));
        frame.render_stateful_widget(list, inner, &mut state);
    }

    fn draw_detail(&self, frame: &mut Frame, area: Rect) {
        let Some(question) = self.detail_question.as_ref() else {
            return;
        };
        let block = Block::default()
            .title(" Question ")
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(3)])
            .split(inner);

        let header = Paragraph::new(vec![
            Line::from(Span::styled(
                question.content.clone(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!(
                    "asked by @{} · {} · a: answer · c: comments · Esc: back",
                    question.user.username,
                    relative_time(question.created_at)
                ),
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .wrap(Wrap { trim: true });
        frame.render_widget(header, chunks[0]);

        if self.detail_answers.is_empty() {
            let empty = Paragraph::new("No answers yet. Press a to be the first.")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, chunks[1]);
            return;
        }

        let items: Vec<ListItem> = self
            .detail_answers
            .iter()
            .map(|item| {
                let body = match item.media_kind() {
                    MediaKind::Text => item.content.clone().unwrap_or_default(),
                    kind => format!("[{} answer]", kind.as_str()),
                };
                ListItem::new(vec![
                    Line::from(Span::raw(body)),
                    Line::from(Span::styled(
                        format!(
                            "  @{} · {}",
                            item.user.username,
                            relative_time(item.created_at)
                        ),
                        Style::default().fg(Color::DarkGray),
                    )),
                ])
            })
            .collect();

        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");
        let mut state = ListState::default();
        state.select(Some(
            self.detail_selected.min(self.detail_answers.len() - 1),
        ));
        frame.render_stateful_widget(list, chunks[1], &mut state);
    }

    fn draw_compose(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Answer ")
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let width = inner.width.saturating_sub(4).max(20) as usize;
        let mut lines = Vec::new();
        if let Some((_, question)) = self.compose_question.as_ref() {
            for wrapped in textwrap::wrap(question, width) {
                lines.push(Line::from(Span::styled(
                    wrapped.to_string(),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
            }
            lines.push(Line::from(""));
        }

        lines.push(Line::from(Span::styled(
            format!("Mode: {} (F2 cycles text/image/video/audio)", self.compose_mode.as_str()),
            Style::default().fg(Color::Gray),
        )));
        lines.push(Line::from(""));

        let prompt = match self.compose_mode {
            MediaKind::Text => "Your answer…",
            _ => "Path to the file to attach…",
        };
        if self.compose_input.is_empty() {
            lines.push(Line::from(Span::styled(
                prompt,
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            for wrapped in textwrap::wrap(&self.compose_input, width) {
                lines.push(Line::from(wrapped.to_string()));
            }
        }

        if self.compose_mode != MediaKind::Text {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!(
                    "Files up to {} MB; the type must match the mode.",
                    self.max_upload_bytes / (1024 * 1024)
                ),
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Enter: post · Esc: cancel",
            Style::default().fg(Color::DarkGray),
        )));

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
        frame.render_widget(paragraph, centered_rect(80, 80, inner));
    }

    fn draw_comments(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Comments ")
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(2)])
            .split(inner);

        if self.comments.is_empty() {
            let empty = Paragraph::new("No comments yet.")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, chunks[0]);
        } else {
            let own_id = self.session_user_id();
            let items: Vec<ListItem> = self
                .comments
                .iter()
                .map(|comment| {
                    let mut meta = format!(
                        "  @{} · {}",
                        comment.user.username,
                        relative_time(comment.created_at)
                    );
                    if own_id.as_deref() == Some(comment.user_id.as_str()) {
                        meta.push_str(" · Del: delete");
                    }
                    ListItem::new(vec![
                        Line::from(Span::raw(comment.content.clone())),
                        Line::from(Span::styled(meta, Style::default().fg(Color::DarkGray))),
                    ])
                })
                .collect();
            let list = List::new(items)
                .highlight_style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("▶ ");
            let mut state = ListState::default();
            state.select(Some(self.comment_selected.min(self.comments.len() - 1)));
            frame.render_stateful_widget(list, chunks[0], &mut state);
        }

        let cursor_col = self.comment_input.width() as u16;
        let input = Paragraph::new(Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::Cyan)),
            Span::raw(self.comment_input.clone()),
        ]))
        .block(Block::default().borders(Borders::TOP));
        frame.render_widget(input, chunks[1]);
        frame.set_cursor(
            chunks[1].x + 2 + cursor_col,
            chunks[1].y + 1,
        );
    }

    fn draw_profile(&self, frame: &mut Frame, area: Rect) {
        let username = self
            .profile
            .as_ref()
            .map(|profile| profile.username.clone())
            .unwrap_or_else(|| "profile".to_string());
        let block = Block::default()
            .title(format!(" @{} ", username))
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if let Some(form) = self.profile_edit.as_ref() {
            let mut lines = Vec::new();
            for (index, field) in form.fields.iter().enumerate() {
                let focused = index == form.focus;
                let style = if focused {
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("{:>14}: ", field.label), style),
                    Span::raw(field.value.clone()),
                ]));
                lines.push(Line::from(""));
            }
            lines.push(Line::from(Span::styled(
                "Tab: next field · Enter: save · Esc: cancel",
                Style::default().fg(Color::DarkGray),
            )));
            let paragraph = Paragraph::new(lines);
            frame.render_widget(paragraph, centered_rect(70, 60, inner));
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(3)])
            .split(inner);

        let is_own = self.session_user_id().as_deref() == self.profile_user.as_deref();
        let following = self
            .profile_user
            .as_ref()
            .and_then(|id| self.follows.get(id))
            .map(|toggle| toggle.active())
            .unwrap_or(false);

        let mut header_lines = Vec::new();
        if let Some(profile) = self.profile.as_ref() {
            header_lines.push(Line::from(Span::styled(
                profile.display().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            if let Some(bio) = profile.bio.as_deref() {
                if !bio.trim().is_empty() {
                    header_lines.push(Line::from(Span::raw(bio.to_string())));
                }
            }
        }
        let mut counts = format!(
            "{} followers · {} following · {} answers",
            self.profile_followers,
            self.profile_following,
            self.profile_answers.len()
        );
        if following {
            counts.push_str(" · following");
        }
        header_lines.push(Line::from(Span::styled(
            counts,
            Style::default().fg(Color::Gray),
        )));
        header_lines.push(Line::from(Span::styled(
            if is_own {
                "e: edit profile · Del: delete answer · Esc: back"
            } else {
                "f: follow/unfollow · Esc: back"
            },
            Style::default().fg(Color::DarkGray),
        )));
        frame.render_widget(
            Paragraph::new(header_lines).wrap(Wrap { trim: true }),
            chunks[0],
        );

        if self.profile_answers.is_empty() {
            let empty = Paragraph::new("No answers yet.")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, chunks[1]);
            return;
        }

        let items: Vec<ListItem> = self
            .profile_answers
            .iter()
            .map(|item| {
                let body = match item.media_kind() {
                    MediaKind::Text => item.content.clone().unwrap_or_default(),
                    kind => format!("[{} answer]", kind.as_str()),
                };
                ListItem::new(vec![
                    Line::from(Span::styled(
                        item.question.content.clone(),
                        Style::default().fg(Color::Yellow),
                    )),
                    Line::from(Span::raw(format!("  {}", body))),
                    Line::from(Span::styled(
                        format!("  {}", relative_time(item.created_at)),
                        Style::default().fg(Color::DarkGray),
                    )),
                ])
            })
            .collect();
        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");
        let mut state = ListState::default();
        state.select(Some(
            self.profile_selected.min(self.profile_answers.len() - 1),
        ));
        frame.render_stateful_widget(list, chunks[1], &mut state);
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn relative_time(then: chrono::DateTime<chrono::Utc>) -> String {
    let delta = chrono::Utc::now().signed_duration_since(then);
    let seconds = delta.num_seconds();
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else if seconds < 86_400 * 30 {
        format!("{}d ago", seconds / 86_400)
    } else {
        then.format("%b %d, %Y").to_string()
    }
}

fn launch_player(player: &PlayerConfig, url: &str) -> Result<()> {
    let mut parts = player.command.iter();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("player command is empty"))?;
    let mut command = Command::new(program);
    let mut saw_placeholder = false;
    for arg in parts {
        if arg.contains("%URL%") {
            saw_placeholder = true;
            command.arg(arg.replace("%URL%", url));
        } else {
            command.arg(arg);
        }
    }
    if !saw_placeholder {
        command.arg(url);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = command.spawn()?;
    if !player.detach {
        child.wait()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;

    #[test]
    fn form_focus_wraps_both_ways() {
        let mut form = Form::new(vec![Field::new("Email"), Field::masked("Password")]);
        assert_eq!(form.focus, 0);
        form.next();
        assert_eq!(form.focus, 1);
        form.next();
        assert_eq!(form.focus, 0);
        form.previous();
        assert_eq!(form.focus, 1);
    }

    #[test]
    fn masked_fields_hide_input() {
        let mut form = Form::new(vec![Field::masked("Password")]);
        for ch in "secret".chars() {
            form.insert_char(ch);
        }
        assert_eq!(form.fields[0].display_value(), "••••••");
        assert_eq!(form.value(0), "secret");
        form.backspace();
        assert_eq!(form.value(0), "secre");
    }

    #[test]
    fn player_command_substitutes_url() {
        // Substitution itself is string-level; a missing placeholder appends.
        let with_placeholder = PlayerConfig {
            command: vec!["mpv".into(), "--fs".into(), "%URL%".into()],
            detach: true,
        };
        let args: Vec<String> = with_placeholder
            .command
            .iter()
            .skip(1)
            .map(|arg| arg.replace("%URL%", "https://example.com/a.mp4"))
            .collect();
        assert_eq!(args, vec!["--fs", "https://example.com/a.mp4"]);
    }

    #[test]
    fn relative_time_buckets() {
        let now = chrono::Utc::now();
        assert_eq!(relative_time(now), "just now");
        assert_eq!(relative_time(now - chrono::Duration::minutes(5)), "5m ago");
        assert_eq!(relative_time(now - chrono::Duration::hours(3)), "3h ago");
        assert_eq!(relative_time(now - chrono::Duration::days(2)), "2d ago");
    }
}
