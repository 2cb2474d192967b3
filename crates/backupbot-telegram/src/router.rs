use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use backupbot_core::{
    backup::BackupSpec,
    config::ConfigStore,
    domain::{RunRequest, Trigger},
    messaging::port::{ClientChannel, MessagingPort},
    pipeline::{spawn_worker, Pipeline, PipelineHandle},
    scheduler::Scheduler,
};

use crate::handlers;
use crate::{MtProtoClient, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub messenger: Arc<dyn MessagingPort>,
    pub pipeline: PipelineHandle,
    pub scheduler: Scheduler,
}

pub async fn run_polling(config: Arc<ConfigStore>) -> anyhow::Result<()> {
    let cfg = config.snapshot();
    let bot = Bot::new(cfg.bot.token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "Bot started"),
        Err(e) => tracing::warn!(error = %e, "Failed to fetch bot info"),
    }
    tracing::info!(
        chat_id = cfg.backup_chat_data.id,
        thread_id = cfg.backup_chat_data.thread_id,
        admins = cfg.admins.len(),
        "Default backup target"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let client: Arc<dyn ClientChannel> = Arc::new(MtProtoClient::new(
        cfg.client_api_data.id,
        cfg.client_api_data.hash.clone(),
        cfg.bot.token.clone(),
    ));

    let pipeline = Arc::new(Pipeline::new(config.clone(), messenger.clone(), client));
    let (handle, _worker) = spawn_worker(pipeline);

    let scheduler = Scheduler::new(config.clone(), handle.clone());
    match scheduler.start().await {
        Ok(n) => tracing::info!(jobs = n, "Scheduler started"),
        Err(e) => tracing::error!(error = %e, "Failed to start scheduler"),
    }
    scheduler.ensure_watcher().await;

    if cfg.bot.send_archive_on_start {
        let request = RunRequest {
            target: BackupSpec::default_target(&cfg),
            trigger: Trigger::Startup,
        };
        if let Err(e) = handle.submit(request).await {
            tracing::error!(error = %e, "Failed to queue startup backup");
        }
    }

    let state = Arc::new(AppState {
        config,
        messenger,
        pipeline: handle,
        scheduler: scheduler.clone(),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    tracing::info!("Polling started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    scheduler.stop().await;
    Ok(())
}
