//! `mastomend doctor` — Check credentials, config, and connectivity.

use std::process::ExitCode;

use mastomend_config::{AppConfig, Credentials};
use mastomend_core::{Provider, Publisher};
use mastomend_mastodon::MastodonClient;
use mastomend_providers::GeminiProvider;

pub async fn run() -> ExitCode {
    println!("🩺 mastomend doctor — diagnostics");
    println!("=================================\n");

    let mut issues = 0;

    // ── Credentials ──
    let credentials = match Credentials::from_env() {
        Ok(credentials) => {
            println!("  ✅ Credentials present in environment");
            println!("     server: {}", credentials.social_base_url);
            println!("     bot:    @{}", credentials.bot_username);
            Some(credentials)
        }
        Err(e) => {
            println!("  ❌ Credentials missing: {e}");
            issues += 1;
            None
        }
    };

    // ── Config file ──
    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid (timeline: {})", config.stream.timeline);
            Some(config)
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            issues += 1;
            None
        }
    };

    if let Some(config) = &config {
        match config.persona.resolve() {
            Ok(prompt) => println!("  ✅ Persona resolved ({} chars)", prompt.chars().count()),
            Err(e) => {
                println!("  ❌ Persona unusable: {e}");
                issues += 1;
            }
        }
    }

    // ── Connectivity (needs credentials) ──
    if let (Some(credentials), Some(config)) = (credentials, config) {
        let client = MastodonClient::new(
            &credentials.social_base_url,
            &credentials.social_access_token,
            config.stream.clone(),
        );
        match client.verify_credentials().await {
            Ok(account) => {
                println!(
                    "  ✅ Server accepted the token (authenticated as @{})",
                    account.acct
                );
                if !account.bot {
                    println!("     ⚠️  Account is not flagged as a bot; consider enabling it");
                }
            }
            Err(e) => {
                println!("  ❌ Server rejected the token: {e}");
                issues += 1;
            }
        }

        let gemini = GeminiProvider::new(&credentials.llm_api_key, &config.llm);
        match gemini.health_check().await {
            Ok(true) => println!("  ✅ Completion API reachable (model: {})", config.llm.model),
            Ok(false) => {
                println!("  ❌ Completion API refused the model or key");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Completion API unreachable: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  Skipping connectivity checks");
    }

    // ── Summary ──
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed, run `mastomend run` to start.");
        ExitCode::SUCCESS
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
        ExitCode::FAILURE
    }
}
