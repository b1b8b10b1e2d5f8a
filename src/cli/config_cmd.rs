use anyhow::Result;

use crate::cli::output::{to_json, OutputFormat, OutputOptions};
use crate::core::auth::CredentialSource;
use crate::core::config::{ReportEnv, Settings};

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = Settings::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    match Settings::default().save_to(&path) {
        Ok(()) => {
            println!("Generated config at {}", path.display());
            println!("  Set AZURE_SUBSCRIPTION_ID, SLACK_WEBHOOK and SLACK_CHANNEL_NAME before running.");
        }
        Err(e) => {
            eprintln!("Failed to generate config: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

pub fn check(opts: &OutputOptions) -> Result<()> {
    let path = Settings::config_path();
    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let mut issues = settings.validate();
    let missing = ReportEnv::missing_vars(|name| std::env::var(name).ok());
    for name in &missing {
        issues.push(format!("Environment variable {} is not set", name));
    }
    if missing.is_empty() {
        if let Err(e) = ReportEnv::from_env() {
            issues.push(e.to_string());
        }
    }

    if opts.format == OutputFormat::Json {
        println!("{}", to_json(&settings, opts.pretty)?);
    }

    if issues.is_empty() {
        if path.exists() {
            println!("Config is valid: {}", path.display());
        } else {
            println!("No config file at {}, using defaults.", path.display());
        }
        println!(
            "  Window: {} to {} days ago, top {} resource groups",
            settings.report.start_days_ago, settings.report.end_days_ago, settings.report.top_groups
        );
        if opts.verbose {
            println!("  Credential: {}", CredentialSource::from_env().kind());
            println!("  Daily run at {} UTC", settings.schedule.run_at);
        }
    } else {
        eprintln!("Config issues found:");
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}
