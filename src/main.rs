use std::sync::Arc;

use nutri_assist::channels::WhatsAppClient;
use nutri_assist::collaborators::{AccountClient, ChatClient, PlanClient};
use nutri_assist::config::Config;
use nutri_assist::conversation::ConversationEngine;
use nutri_assist::store::{KvStore, LibSqlStore};
use nutri_assist::webhook::webhook_routes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  required: WA_VERIFY_TOKEN, WHATSAPP_PHONE_NUMBER_ID, WHATSAPP_ACCESS_TOKEN");
        std::process::exit(1);
    });

    eprintln!("🥗 NutriSuite assistant v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    eprintln!("   Plan service: {}", config.app_base_url);
    eprintln!("   Chat proxy: {}", config.chat_base_url);

    // ── Key-value store ──────────────────────────────────────────────────
    let store_path = std::path::Path::new(&config.store_path);
    let store: Arc<dyn KvStore> = Arc::new(
        LibSqlStore::new_local(store_path).await.unwrap_or_else(|e| {
            eprintln!("Error: Failed to open store at {}: {}", config.store_path, e);
            std::process::exit(1);
        }),
    );
    eprintln!("   Store: {}", config.store_path);

    // ── Clients ──────────────────────────────────────────────────────────
    let messenger = Arc::new(WhatsAppClient::new(
        config.phone_number_id.clone(),
        config.access_token.clone(),
    ));
    let plans = PlanClient::new(config.app_base_url.clone());
    let accounts = AccountClient::new(config.app_base_url.clone());
    let chat = ChatClient::new(config.chat_base_url.clone());

    let engine = Arc::new(ConversationEngine::new(
        store, messenger, plans, accounts, chat,
    ));

    // ── Webhook server ───────────────────────────────────────────────────
    let app = webhook_routes(engine, config.verify_token.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
