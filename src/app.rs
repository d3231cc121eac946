use std::sync::Arc;

use anyhow::{Context, Result};

use crate::auth;
use crate::backend;
use crate::config;
use crate::data::{
    self, AnswerService, CommentService, FeedService, InteractionService, ProfileService,
    QuestionService,
};
use crate::media;
use crate::session;
use crate::storage;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);

    let mut feed_service: Arc<dyn FeedService> = Arc::new(data::MockFeedService);
    let mut interaction_service: Arc<dyn InteractionService> =
        Arc::new(data::MockInteractionService);
    let mut question_service: Option<Arc<dyn QuestionService>> = None;
    let mut answer_service: Option<Arc<dyn AnswerService>> = None;
    let mut comment_service: Option<Arc<dyn CommentService>> = None;
    let mut profile_service: Option<Arc<dyn ProfileService>> = None;
    let mut session_manager: Option<Arc<session::Manager>> = None;
    let mut uploader: Option<Arc<backend::Client>> = None;
    let mut media_cache: Option<Arc<media::Cache>> = None;

    let status: String;
    let configured =
        !cfg.backend.base_url.trim().is_empty() && !cfg.backend.anon_key.trim().is_empty();

    if configured {
        let client = Arc::new(
            backend::Client::new(backend::ClientConfig {
                base_url: cfg.backend.base_url.clone(),
                anon_key: cfg.backend.anon_key.clone(),
                user_agent: cfg.backend.user_agent.clone(),
                http_client: None,
            })
            .context("initialize backend client")?,
        );

        let flow = Arc::new(auth::Flow::new(client.clone(), store.clone()));
        let manager = Arc::new(session::Manager::new(
            store.clone(),
            client.clone(),
            flow,
        ));
        if let Err(err) = manager.load_existing() {
            eprintln!("warning: failed to resume stored sessions: {err:#}");
        }

        feed_service = Arc::new(data::BackendFeedService::new(client.clone()));
        interaction_service = Arc::new(data::BackendInteractionService::new(client.clone()));
        question_service = Some(Arc::new(data::BackendQuestionService::new(client.clone())));
        answer_service = Some(Arc::new(data::BackendAnswerService::new(client.clone())));
        comment_service = Some(Arc::new(data::BackendCommentService::new(client.clone())));
        profile_service = Some(Arc::new(data::BackendProfileService::new(client.clone())));

        media_cache = media::Cache::new(
            store.clone(),
            media::CacheConfig {
                cache_dir: cfg.media.cache_dir.clone(),
                max_size_bytes: cfg.media.max_cache_bytes,
                default_ttl: cfg.media.default_ttl,
                http_client: None,
            },
        )
        .ok()
        .map(Arc::new);

        status = match manager.active() {
            Some(active) => format!(
                "Welcome back, @{}. Loading your feed…",
                active.account.username
            ),
            None => "Connected. Sign in or browse as a guest.".to_string(),
        };
        session_manager = Some(manager);
        uploader = Some(client);
    } else {
        status = format!(
            "No backend configured; showing sample answers. Set backend.base_url and backend.anon_key in {}.",
            display_path
        );
    }

    let options = ui::Options {
        status_message: status,
        feed_service,
        question_service,
        answer_service,
        interaction_service,
        comment_service,
        profile_service,
        session_manager,
        uploader,
        media_bucket: cfg.backend.media_bucket.clone(),
        max_upload_bytes: cfg.media.max_upload_bytes,
        media_cache,
        player: cfg.player.clone(),
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    Ok(())
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/knowme/config.yaml".to_string()
    }
}
