use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::info;

use super::{GenerationOptions, Prompt, TextGenerator};
use crate::error::LlmError;

/// Priority level for LLM requests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// High priority: requests that finish a run already in progress (Advisor)
    High,
    /// Normal priority: requests that start analysis of a new source (Analyst)
    Normal,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Normal => "NORMAL",
        }
    }
}

/// A request to be queued for LLM processing
struct QueuedRequest {
    prompt: Prompt,
    options: GenerationOptions,
    response_tx: oneshot::Sender<Result<String, LlmError>>,
}

/// LLM Queue that limits concurrent requests and prioritizes runs close to completion
#[derive(Clone)]
pub struct LLMQueue {
    high_tx: mpsc::Sender<QueuedRequest>,
    normal_tx: mpsc::Sender<QueuedRequest>,
}

impl LLMQueue {
    /// Create a new LLM Queue over `generator` with the given max concurrent requests
    pub fn new(generator: Arc<dyn TextGenerator>, max_concurrent: usize, queue_size: usize) -> Self {
        let (high_tx, high_rx) = mpsc::channel::<QueuedRequest>(queue_size.max(1));
        let (normal_tx, normal_rx) = mpsc::channel::<QueuedRequest>(queue_size.max(1));

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        // Spawn the queue processor
        tokio::spawn(Self::process_queue(generator, semaphore, high_rx, normal_rx));

        Self { high_tx, normal_tx }
    }

    /// Process queued requests, prioritizing high-priority over normal-priority
    async fn process_queue(
        generator: Arc<dyn TextGenerator>,
        semaphore: Arc<Semaphore>,
        mut high_rx: mpsc::Receiver<QueuedRequest>,
        mut normal_rx: mpsc::Receiver<QueuedRequest>,
    ) {
        info!(
            "📬 [QUEUE] LLM Queue processor started (max concurrent: {})",
            semaphore.available_permits()
        );

        loop {
            // Wait for a free slot before dequeuing
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    info!("📬 [QUEUE] Semaphore closed, shutting down");
                    break;
                }
            };

            let request = tokio::select! {
                biased;

                Some(req) = high_rx.recv() => {
                    info!("📬 [QUEUE] Processing HIGH priority request");
                    req
                }
                Some(req) = normal_rx.recv() => {
                    info!("📬 [QUEUE] Processing NORMAL priority request");
                    req
                }
                else => {
                    // Both channels closed, exit
                    info!("📬 [QUEUE] All channels closed, shutting down");
                    break;
                }
            };

            info!(
                "📬 [QUEUE] Acquired permit. {} slots remaining",
                semaphore.available_permits()
            );

            let generator = generator.clone();
            tokio::spawn(async move {
                let result = generator.generate(&request.prompt, &request.options).await;
                let _ = request.response_tx.send(result);
                drop(permit); // Release permit when done
            });
        }
    }

    /// Queue a request with the priority carried in `options` and wait for its answer
    pub async fn submit(&self, prompt: Prompt, options: GenerationOptions) -> Result<String, LlmError> {
        let (response_tx, response_rx) = oneshot::channel();

        let priority = options.priority;
        let request = QueuedRequest {
            prompt,
            options,
            response_tx,
        };

        // Send to appropriate queue based on priority
        let send_result = match priority {
            Priority::High => self.high_tx.send(request).await,
            Priority::Normal => self.normal_tx.send(request).await,
        };

        if send_result.is_err() {
            return Err(LlmError::Queue("failed to queue LLM request".to_string()));
        }

        // Wait for response
        response_rx
            .await
            .map_err(|_| LlmError::Queue("LLM request was dropped".to_string()))?
    }
}

#[async_trait]
impl TextGenerator for LLMQueue {
    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String, LlmError> {
        self.submit(prompt.clone(), *options).await
    }
}
