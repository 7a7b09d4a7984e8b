// src/config/mod.rs
//! Run configuration: defaults, optional TOML file, environment overrides.

pub mod pipeline;

pub use pipeline::{
    Credentials, FeedKind, FeedSpec, PeriodGranularity, PipelineConfig, ProviderKind,
    ProviderSettings, DEFAULT_PIPELINE_CONFIG_PATH, ENV_PIPELINE_CONFIG_PATH,
};
