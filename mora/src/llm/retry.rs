//! Bounded retry for transient generation failures

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatMessage, ChatModel, GenerationOptions};
use crate::Result;

/// Retries timeouts, connection failures, 429 and 5xx with exponential
/// backoff (`base * 2^(attempt-1)`). Other errors return immediately.
pub struct RetryingChat {
    inner: Arc<dyn ChatModel>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingChat {
    pub fn new(inner: Arc<dyn ChatModel>, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[async_trait]
impl ChatModel for RetryingChat {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(messages, options).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        provider = self.inner.provider_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Generation failed, retrying"
                    );
                    metrics::counter!("mora_llm_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChatModel for Flaky {
        async fn generate(&self, _m: &[ChatMessage], _o: &GenerationOptions) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::UpstreamStatus {
                    service: "llm",
                    status: self.status,
                    body: "unavailable".into(),
                })
            } else {
                Ok("ok".into())
            }
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn provider_name(&self) -> &'static str {
            "test"
        }
    }

    fn flaky(failures: u32, status: u16) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            status,
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let inner = flaky(2, 503);
        let chat = RetryingChat::new(inner.clone(), 2, Duration::from_millis(250));
        let out = chat
            .generate(&[ChatMessage::user("hi")], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let inner = flaky(5, 429);
        let chat = RetryingChat::new(inner.clone(), 2, Duration::from_millis(250));
        let res = chat
            .generate(&[ChatMessage::user("hi")], &GenerationOptions::default())
            .await;
        assert!(res.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let inner = flaky(1, 400);
        let chat = RetryingChat::new(inner.clone(), 2, Duration::from_millis(250));
        let res = chat
            .generate(&[ChatMessage::user("hi")], &GenerationOptions::default())
            .await;
        assert!(res.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let chat = RetryingChat::new(flaky(0, 500), 3, Duration::from_millis(100));
        assert_eq!(chat.delay(1), Duration::from_millis(100));
        assert_eq!(chat.delay(2), Duration::from_millis(200));
        assert_eq!(chat.delay(3), Duration::from_millis(400));
    }
}
