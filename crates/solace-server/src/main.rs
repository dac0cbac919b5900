use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use solace_core::merge::AnalysisMerger;
use solace_core::{DialogueOrchestrator, OrchestratorSettings, SolaceConfig};
use solace_memory::ConversationStore;
use solace_provider::{AnthropicProvider, OpenAiModerationProvider, ProviderConfig};
use solace_safety::{
    InputSafetyGate, OutputGateConfig, OutputSafetyGate, PatternClassifier, RemoteSafetyClassifier,
};
use solace_server::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "solace-server", about = "Safety-gated dialogue orchestrator")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "solace.yaml")]
    config: String,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let config = SolaceConfig::load(&args.config)?;
    let listen_addr = args.listen.unwrap_or_else(|| config.listen_addr.clone());

    let store = ConversationStore::open(&config.database_path)?;

    let generation = Arc::new(AnthropicProvider::new(&provider_config(
        &config.generation.api_key,
        config.generation.base_url.as_deref(),
    )));
    let moderation = Arc::new(OpenAiModerationProvider::new(&provider_config(
        &config.moderation.api_key,
        config.moderation.base_url.as_deref(),
    )));

    let classifier = Arc::new(PatternClassifier::new()?);
    let input_gate = InputSafetyGate::new(
        classifier.clone(),
        RemoteSafetyClassifier::new(
            moderation,
            Duration::from_millis(config.moderation.deadline_ms),
        ),
    );
    let output_gate = OutputSafetyGate::new(classifier, OutputGateConfig::default())?;

    let orchestrator = DialogueOrchestrator::new(
        input_gate,
        output_gate,
        generation,
        store,
        AnalysisMerger::new(config.merge.clone()),
        OrchestratorSettings::from_config(&config),
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };
    solace_server::serve(state, &listen_addr).await
}

fn provider_config(api_key: &str, base_url: Option<&str>) -> ProviderConfig {
    let mut config = ProviderConfig::new(api_key);
    if let Some(url) = base_url {
        config = config.with_base_url(url);
    }
    config
}
