mod config;
mod protocol;
mod server;
mod suggester;

use anyhow::Result;
use config::{ModelBackend, RelayConfig};
use server::{AppState, RelayServer};
use suggester::{CompletionSuggester, SuggestionRouter};
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = RelayConfig::load()?;
    let credential_configured = config.model.api_key.is_configured();
    info!(
        addr = %config.server.socket_addr(),
        backend = config.model.backend.as_str(),
        model = %config.model.model,
        api_base = %config.model.api_base,
        credential_configured,
        timeout_ms = config.model.timeout_ms,
        max_text_chars = config.server.max_text_chars,
        extra_substitutions = config.fallback.substitutions.len(),
        dotenv_loaded,
        "loaded english assistant config"
    );
    if !credential_configured && config.model.backend == ModelBackend::Completion {
        warn!("OPENAI_API_KEY is not set; every request will use the substitution fallback");
    }

    if config.model.verify_on_startup && config.model.backend == ModelBackend::Completion {
        verify_credential(&config).await;
    }

    let suggester = SuggestionRouter::new(&config.model, &config.fallback)?;
    let state = AppState::new(suggester, credential_configured, config.server.max_text_chars);
    let server = RelayServer::new(config.server.clone(), state);
    server.run().await
}

async fn verify_credential(config: &RelayConfig) {
    let suggester = match CompletionSuggester::new(&config.model) {
        Ok(suggester) => suggester,
        Err(error) => {
            warn!("skipping credential check: {error}");
            return;
        }
    };
    let budget = Duration::from_millis(config.model.timeout_ms.max(1));
    match timeout(budget, suggester.verify()).await {
        Ok(Ok(())) => info!("completion API key accepted"),
        Ok(Err(error)) => warn!("completion API key check failed: {error}"),
        Err(_) => warn!(
            "completion API key check timed out after {}ms",
            config.model.timeout_ms
        ),
    }
}
