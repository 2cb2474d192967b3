//! Build-and-deliver pipeline and its single entry point.
//!
//! Scheduler jobs and bot commands never call the pipeline directly; they
//! submit a [`RunRequest`] through a [`PipelineHandle`]. The worker spawns one
//! task per request, so runs may overlap.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    archive::{self, BuildReport},
    backup::BackupSpec,
    config::ConfigStore,
    delivery::{DeliveryOutcome, DeliveryRouter},
    domain::{RunRequest, Trigger},
    errors::Error,
    formatting::escape_html,
    messaging::port::{ClientChannel, MessagingPort},
    Result,
};

const QUEUE_CAPACITY: usize = 32;

/// What happened in one run.
#[derive(Debug)]
pub struct RunReport {
    pub request: RunRequest,
    pub build: Option<BuildReport>,
    pub delivery: Option<DeliveryOutcome>,
    /// Set when the run failed before delivery (config or archive creation).
    pub error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.delivery.as_ref().is_some_and(|d| d.success)
    }
}

pub struct Pipeline {
    config: Arc<ConfigStore>,
    messenger: Arc<dyn MessagingPort>,
    client: Arc<dyn ClientChannel>,
}

impl Pipeline {
    pub fn new(
        config: Arc<ConfigStore>,
        messenger: Arc<dyn MessagingPort>,
        client: Arc<dyn ClientChannel>,
    ) -> Self {
        Self {
            config,
            messenger,
            client,
        }
    }

    /// Run one backup: build the archive, deliver it, remove it.
    pub async fn run(&self, request: RunRequest) -> RunReport {
        let cfg = self.config.snapshot();
        tracing::info!(trigger = %request.trigger, target = %request.target, "Backup run started");

        let mut spec = match BackupSpec::from_config(&cfg, request.target) {
            Ok(s) => s,
            Err(e) => return self.fail_early(request, e).await,
        };
        spec.threshold = spec
            .threshold
            .min(self.messenger.capabilities().max_upload_bytes);
        let threshold = spec.threshold;

        let built = tokio::task::spawn_blocking(move || archive::build(&spec)).await;
        let (archive, build) = match built {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return self.fail_early(request, e).await,
            Err(join) => {
                return self
                    .fail_early(request, Error::External(format!("archive task failed: {join}")))
                    .await
            }
        };

        let router = DeliveryRouter::new(
            self.messenger.clone(),
            self.client.clone(),
            cfg.client_timeout(),
        );
        let delivery = router.deliver(&archive, request.target, threshold).await;

        // Close + delete regardless of the outcome.
        drop(archive);

        tracing::info!(
            trigger = %request.trigger,
            channel = %delivery.channel,
            success = delivery.success,
            bytes_sent = delivery.bytes_sent,
            "Backup run finished"
        );

        RunReport {
            request,
            build: Some(build),
            delivery: Some(delivery),
            error: None,
        }
    }

    async fn fail_early(&self, request: RunRequest, e: Error) -> RunReport {
        tracing::error!(
            trigger = %request.trigger,
            error = %e,
            "Backup run failed before delivery"
        );

        if matches!(request.trigger, Trigger::Command { .. }) {
            let html = format!("Backup failed: {}", escape_html(&e.to_string()));
            if let Err(send_e) = self.messenger.send_html(request.target, &html).await {
                tracing::error!(error = %send_e, "Failed to report backup failure");
            }
        }

        RunReport {
            request,
            build: None,
            delivery: None,
            error: Some(e.to_string()),
        }
    }
}

/// Sending side of the pipeline queue.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<RunRequest>,
}

impl PipelineHandle {
    pub async fn submit(&self, request: RunRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| Error::External("pipeline worker stopped".to_string()))
    }

    /// A handle plus the receiving end, for driving requests by hand.
    pub fn channel() -> (Self, mpsc::Receiver<RunRequest>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }
}

/// Start the worker that turns queued requests into concurrent runs.
pub fn spawn_worker(pipeline: Arc<Pipeline>) -> (PipelineHandle, JoinHandle<()>) {
    let (handle, mut rx) = PipelineHandle::channel();
    let worker = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline.run(request).await;
            });
        }
        tracing::debug!("Pipeline worker stopped");
    });
    (handle, worker)
}
