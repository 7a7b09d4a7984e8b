// tests/config_env.rs
// PipelineConfig::load against the real process environment.
use std::{env, fs};

use kona_newsroom::config::{PeriodGranularity, PipelineConfig, ProviderKind};
use kona_newsroom::ConfigError;

const KEYS: &[&str] = &[
    "PIPELINE_CONFIG_PATH",
    "AI_MODEL",
    "AI_TEST_MODE",
    "CLAUDE_API_KEY",
    "OPENAI_API_KEY",
    "GPT4_API_KEY",
    "MAX_ARTICLES_PER_RUN",
    "DRY_RUN",
    "RUN_BUDGET_SECS",
    "PERIOD",
    "LEDGER_PATH",
];

fn clear_env() {
    for k in KEYS {
        env::remove_var(k);
    }
}

/// Run `f` from an empty working directory so no repo config/ is picked up.
fn in_tempdir<F: FnOnce(&std::path::Path)>(f: F) {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();
    f(tmp.path());
    clear_env();
    env::set_current_dir(old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_only_configuration() {
    in_tempdir(|_| {
        env::set_var("AI_MODEL", "gpt4,claude");
        env::set_var("OPENAI_API_KEY", "sk-test");
        env::set_var("MAX_ARTICLES_PER_RUN", "3");
        env::set_var("PERIOD", "hourly");

        let cfg = PipelineConfig::load().unwrap();
        assert_eq!(cfg.providers, vec![ProviderKind::OpenAi, ProviderKind::Claude]);
        assert_eq!(cfg.usable_providers(), vec![ProviderKind::OpenAi]);
        assert_eq!(cfg.max_articles_per_run, 3);
        assert_eq!(cfg.period, PeriodGranularity::Hourly);
        assert!(!cfg.dry_run);
    });
}

#[serial_test::serial]
#[test]
fn file_then_env_overrides() {
    in_tempdir(|dir| {
        let path = dir.join("pipeline.toml");
        fs::write(
            &path,
            r#"
ai_model = "claude"
max_articles_per_run = 7
run_budget_secs = 120
ledger_path = "state/ledger.json"

[validation]
min_distinct_sources = 3
"#,
        )
        .unwrap();
        env::set_var("PIPELINE_CONFIG_PATH", path.display().to_string());
        env::set_var("CLAUDE_API_KEY", "sk-claude");
        env::set_var("MAX_ARTICLES_PER_RUN", "2");

        let cfg = PipelineConfig::load().unwrap();
        assert_eq!(cfg.max_articles_per_run, 2);
        assert_eq!(cfg.run_budget.as_secs(), 120);
        assert_eq!(cfg.validation.min_distinct_sources, 3);
        assert_eq!(cfg.ledger_path, std::path::PathBuf::from("state/ledger.json"));
        assert_eq!(cfg.usable_providers(), vec![ProviderKind::Claude]);
    });
}

#[serial_test::serial]
#[test]
fn default_config_file_is_read_from_cwd() {
    in_tempdir(|dir| {
        fs::create_dir_all(dir.join("config")).unwrap();
        fs::write(dir.join("config/pipeline.toml"), "dry_run = true\n").unwrap();

        let cfg = PipelineConfig::load().unwrap();
        assert!(cfg.dry_run);
    });
}

#[serial_test::serial]
#[test]
fn explicit_missing_file_is_an_error() {
    in_tempdir(|dir| {
        env::set_var(
            "PIPELINE_CONFIG_PATH",
            dir.join("nope.toml").display().to_string(),
        );
        env::set_var("AI_TEST_MODE", "mock");
        let err = PipelineConfig::load().unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    });
}

#[serial_test::serial]
#[test]
fn unknown_file_key_is_rejected() {
    in_tempdir(|dir| {
        let path = dir.join("bad.toml");
        fs::write(&path, "max_article_per_run = 3\n").unwrap();
        env::set_var("PIPELINE_CONFIG_PATH", path.display().to_string());
        env::set_var("AI_TEST_MODE", "mock");
        let err = PipelineConfig::load().unwrap_err();
        match err {
            ConfigError::Parse { path: p, .. } => assert!(p.ends_with("bad.toml")),
            other => panic!("unexpected {other:?}"),
        }
    });
}

#[serial_test::serial]
#[test]
fn no_credentials_without_dry_run_fails() {
    in_tempdir(|_| {
        let err = PipelineConfig::load().unwrap_err();
        assert!(matches!(err, ConfigError::NoUsableProvider(_)));

        env::set_var("DRY_RUN", "1");
        assert!(PipelineConfig::load().unwrap().dry_run);
    });
}

#[serial_test::serial]
#[test]
fn malformed_numbers_are_rejected() {
    in_tempdir(|_| {
        env::set_var("AI_TEST_MODE", "mock");
        env::set_var("RUN_BUDGET_SECS", "ten");
        let err = PipelineConfig::load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "RUN_BUDGET_SECS", .. }));
    });
}
