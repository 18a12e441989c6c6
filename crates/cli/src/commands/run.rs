//! `mastomend run` — Connect to the stream and start replying.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use mastomend_bot::Orchestrator;
use mastomend_config::{AppConfig, Credentials};
use mastomend_core::{EventBus, Provider, Publisher, Timeline};
use mastomend_mastodon::MastodonClient;
use mastomend_policy::ReplyPolicy;
use mastomend_providers::{GeminiProvider, RetryProvider};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run(config_path: Option<&Path>) -> ExitCode {
    // ── Credentials and config ──
    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!("❌ Configuration error: {e}");
            eprintln!("   Required environment variables:");
            eprintln!("     {}", Credentials::ENV_LLM_API_KEY);
            eprintln!("     {}", Credentials::ENV_ACCESS_TOKEN);
            eprintln!("     {}", Credentials::ENV_BASE_URL);
            eprintln!("     {}", Credentials::ENV_BOT_USERNAME);
            return ExitCode::from(2);
        }
    };

    let config = match AppConfig::load_with(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let system_prompt = match config.persona.resolve() {
        Ok(prompt) => prompt,
        Err(e) => {
            eprintln!("❌ Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    // ── Wire the stack ──
    let client = Arc::new(MastodonClient::new(
        &credentials.social_base_url,
        &credentials.social_access_token,
        config.stream.clone(),
    ));

    let gemini = Arc::new(GeminiProvider::new(&credentials.llm_api_key, &config.llm));
    let provider: Arc<dyn Provider> =
        Arc::new(RetryProvider::new(gemini, config.llm.max_retries));

    // ── Prove the token works before touching the stream ──
    let publisher: Arc<dyn Publisher> = client.clone();
    let account = match publisher.verify_credentials().await {
        Ok(account) => account,
        Err(e) => {
            eprintln!("❌ Credential verification failed: {e}");
            return ExitCode::from(2);
        }
    };
    info!(account = %account.acct, id = %account.id, "Authenticated");
    if account.username != credentials.bot_username {
        warn!(
            token_account = %account.username,
            configured = %credentials.bot_username,
            "BOT_USERNAME does not match the account behind the access token"
        );
    }

    let policy = ReplyPolicy::new(config.policy.clone(), &credentials.bot_username)
        .with_account_id(&account.id);

    let timeline: Arc<dyn Timeline> = client.clone();
    let mut orchestrator = Orchestrator::new(
        timeline,
        provider,
        publisher,
        policy,
        config,
        system_prompt,
        Arc::new(EventBus::default()),
    );

    // ── Shutdown on Ctrl-C ──
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    match orchestrator.run(cancel).await {
        Ok(stats) => {
            println!(
                "Session: {} events, {} replies, {} skipped, {} completion failures, {} publish failures",
                stats.events_seen,
                stats.replies_posted,
                stats.skipped,
                stats.completion_failures,
                stats.publish_failures
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Bot stopped");
            ExitCode::FAILURE
        }
    }
}
