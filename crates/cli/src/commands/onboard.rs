//! `mastomend onboard` — First-time setup.

use std::process::ExitCode;

use mastomend_config::{AppConfig, Credentials};

pub fn run(force: bool) -> ExitCode {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🐘 mastomend — First-Time Setup");
    println!("===============================\n");

    // Create the config directory
    if !config_dir.exists() {
        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            println!("❌ Could not create {}: {e}", config_dir.display());
            return ExitCode::FAILURE;
        }
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    // Create the config file
    if config_path.exists() && !force {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually, or re-run with --force to overwrite.\n");
        return ExitCode::SUCCESS;
    }
    if let Err(e) = std::fs::write(&config_path, AppConfig::default_toml()) {
        println!("❌ Could not write {}: {e}", config_path.display());
        return ExitCode::FAILURE;
    }
    println!("✅ Created config.toml at: {}", config_path.display());

    println!("\n📝 Next steps:");
    println!("   1. Export your credentials:");
    println!("        {}=<Gemini API key>", Credentials::ENV_LLM_API_KEY);
    println!("        {}=<Mastodon access token>", Credentials::ENV_ACCESS_TOKEN);
    println!("        {}=<https://your.instance>", Credentials::ENV_BASE_URL);
    println!("        {}=<bot account name>", Credentials::ENV_BOT_USERNAME);
    println!("   2. Edit {} to taste", config_path.display());
    println!("   3. Run: mastomend doctor");

    println!("\n🎉 Setup complete! Run `mastomend run` to start replying.\n");
    ExitCode::SUCCESS
}
