use std::sync::Arc;

use axum::{routing::get, Json, Router};
use teloxide::{
    dispatching::Dispatcher,
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    update_listeners::{webhooks, UpdateListener},
};

use nbot_core::{
    app::{AppContext, Storage},
    config::{Config, WebhookConfig},
    messaging::port::MessagingPort,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Run the bot until Ctrl-C. Long polling unless a webhook is configured.
pub async fn run(cfg: Arc<Config>, storage: Storage) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    // Basic startup info.
    match bot.get_me().await {
        Ok(me) => tracing::info!("nbot started: @{}", me.username()),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }
    tracing::info!(
        operator = cfg.operator_id.0,
        subscribers = storage.registry.count().await,
        "ready"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let ctx = Arc::new(AppContext::new(&cfg, storage, messenger));

    // Journal rows left by the previous process mean a broadcast died mid-run.
    ctx.report_interrupted_broadcast().await;

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build();

    match &cfg.webhook {
        Some(wh) => {
            let (mut listener, stop_flag, router) =
                webhooks::axum_to_router(bot, webhook_options(wh)?).await?;
            let app = with_health_route(router, &wh.path);

            let server = axum::Server::try_bind(&wh.listen_addr())?;
            let stop_token = listener.stop_token();
            tokio::spawn(async move {
                if let Err(e) = server
                    .serve(app.into_make_service())
                    .with_graceful_shutdown(stop_flag)
                    .await
                {
                    tracing::error!("webhook server failed: {e}");
                    stop_token.stop();
                }
            });

            tracing::info!(url = %wh.url(), port = wh.port, "webhook mode");
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("webhook listener error"),
                )
                .await;
        }
        None => {
            tracing::info!("long polling mode");
            dispatcher.dispatch().await;
        }
    }

    tracing::info!("dispatcher stopped");
    Ok(())
}

fn webhook_options(wh: &WebhookConfig) -> anyhow::Result<webhooks::Options> {
    let url: url::Url = wh.url().parse()?;
    let mut opts = webhooks::Options::new(wh.listen_addr(), url);
    if let Some(secret) = &wh.secret {
        opts = opts.secret_token(secret.clone());
    }
    Ok(opts)
}

/// Add `GET /` for platform health checks, unless the webhook itself lives at `/`.
fn with_health_route(webhook: Router, webhook_path: &str) -> Router {
    if webhook_path == "/" {
        return webhook;
    }
    webhook.merge(Router::new().route("/", get(health)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Bot is running",
    }))
}
