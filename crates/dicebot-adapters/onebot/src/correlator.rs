//! Echo-based request/response matching.
//!
//! Each call:
//! 1. Takes a fresh `dicebot-<n>` token.
//! 2. Registers a one-shot slot keyed on that token in the pending table.
//! 3. Writes `{action, params, echo}` through the session.
//! 4. Awaits the slot, the timeout, or cancellation. The timeout also
//!    bounds the write, so a peer that stops reading cannot stall a call.
//!
//! Removing an entry from the pending table is the only way to resolve it,
//! so a response, a timeout and a forced failure can never both win. A guard
//! removes the entry on every exit path, including a dropped future.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use dicebot_core::{ApiError, ApiResult};

use crate::model::{ApiRequest, ApiResponse};
use crate::session::Session;

type Pending = Mutex<HashMap<String, oneshot::Sender<ApiResult<ApiResponse>>>>;

/// Removes its entry from the pending table when dropped.
struct PendingGuard<'a> {
    pending: &'a Pending,
    echo: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.echo);
    }
}

/// Tracks outstanding calls by correlation token.
pub struct RequestCorrelator {
    seq: AtomicU64,
    pending: Pending,
    timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            seq: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn next_token(&self) -> String {
        format!("dicebot-{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Issues a call over `session` and waits for its response data.
    pub async fn call(&self, session: &Session, action: &str, params: Value) -> ApiResult<Value> {
        self.call_with(session, action, params, &CancellationToken::new())
            .await
    }

    /// Like [`call`](Self::call), aborting with [`ApiError::Cancelled`] when
    /// `cancel` fires.
    pub async fn call_with(
        &self,
        session: &Session,
        action: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> ApiResult<Value> {
        let echo = self.next_token();

        // Register before sending so a fast response cannot be missed.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(echo.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            echo: &echo,
        };

        let frame = serde_json::to_string(&ApiRequest {
            action,
            params: &params,
            echo: &echo,
        })?;

        debug!(action = %action, echo = %echo, session = %session.id(), "Calling OneBot API");

        // One deadline covers the write and the wait for the response.
        let exchange = async {
            session.send_text(frame).await.map_err(ApiError::from)?;
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Closed("response slot dropped".into())),
            }
        };

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(ApiError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, exchange) => match outcome {
                Err(_) => {
                    debug!(action = %action, echo = %echo, "OneBot API call timed out");
                    return Err(ApiError::Timeout);
                }
                Ok(result) => result?,
            },
        };

        response.into_data()
    }

    /// Delivers an outcome to the call waiting on `echo`.
    ///
    /// Returns `false` when no call is waiting (it already timed out or was
    /// never issued); the outcome is dropped.
    pub fn resolve(&self, echo: &str, outcome: ApiResult<ApiResponse>) -> bool {
        let Some(tx) = self.pending.lock().remove(echo) else {
            trace!(echo = %echo, "Dropping response for unknown echo");
            return false;
        };
        let _ = tx.send(outcome);
        true
    }

    /// Fails every outstanding call with [`ApiError::Closed`].
    pub fn fail_all(&self, cause: &str) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if drained.is_empty() {
            return;
        }
        debug!(count = drained.len(), cause = %cause, "Failing pending OneBot API calls");
        for (_, tx) in drained {
            let _ = tx.send(Err(ApiError::Closed(cause.to_string())));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::session::SessionRole;
    use crate::testing::{fake_sink, stalled_sink};

    fn ok_response(data: Value) -> ApiResult<ApiResponse> {
        Ok(ApiResponse {
            status: "ok".into(),
            data,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_concurrent_calls_resolve_to_their_own_response() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(5)));
        let (sink, mut outbound) = fake_sink();
        let session = Session::new(SessionRole::Api, sink);

        let mut calls = Vec::new();
        for n in 0..3 {
            let correlator = correlator.clone();
            let session = session.clone();
            calls.push(tokio::spawn(async move {
                correlator
                    .call(&session, "get_group_info", json!({"group_id": n}))
                    .await
            }));
        }

        // Collect the echo of every request, then answer in reverse order.
        let mut requests = Vec::new();
        for _ in 0..3 {
            let text = futures::StreamExt::next(&mut outbound).await.unwrap();
            let frame: Value = serde_json::from_str(&text).unwrap();
            requests.push(frame);
        }
        for frame in requests.iter().rev() {
            let echo = frame["echo"].as_str().unwrap();
            assert!(echo.starts_with("dicebot-"));
            let n = frame["params"]["group_id"].clone();
            assert!(correlator.resolve(echo, ok_response(json!({"n": n}))));
        }

        for (n, call) in calls.into_iter().enumerate() {
            let data = call.await.unwrap().unwrap();
            assert_eq!(data, json!({"n": n}));
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_dropped() {
        let correlator = RequestCorrelator::new(Duration::from_secs(15));
        let (sink, mut outbound) = fake_sink();
        let session = Session::new(SessionRole::Api, sink);

        let err = correlator
            .call(&session, "delete_msg", json!({"message_id": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout));
        assert_eq!(err.to_string(), "action timeout");
        assert_eq!(correlator.pending_count(), 0);

        let text = futures::StreamExt::next(&mut outbound).await.unwrap();
        let frame: Value = serde_json::from_str(&text).unwrap();
        assert!(!correlator.resolve(frame["echo"].as_str().unwrap(), ok_response(Value::Null)));
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_pending_call() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(30)));
        let (sink, _outbound) = fake_sink();
        let session = Session::new(SessionRole::Unified, sink);

        let mut calls = Vec::new();
        for _ in 0..4 {
            let correlator = correlator.clone();
            let session = session.clone();
            calls.push(tokio::spawn(async move {
                correlator.call(&session, "send_group_msg", json!({})).await
            }));
        }
        while correlator.pending_count() < 4 {
            tokio::task::yield_now().await;
        }

        correlator.fail_all("adapter closed");
        for call in calls {
            let err = call.await.unwrap().unwrap_err();
            assert!(matches!(err, ApiError::Closed(ref cause) if cause == "adapter closed"));
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_entry() {
        let correlator = RequestCorrelator::new(Duration::from_secs(30));
        let (sink, _outbound) = fake_sink();
        let session = Session::new(SessionRole::Api, sink);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = correlator
            .call_with(&session, "delete_friend", json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_removes_pending_entry() {
        let correlator = RequestCorrelator::new(Duration::from_secs(30));
        let (sink, _outbound) = fake_sink();
        let session = Session::new(SessionRole::Api, sink);
        session.close();

        let err = correlator
            .call(&session, "delete_friend", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_stalled_write_counts_against_timeout() {
        let correlator = RequestCorrelator::new(Duration::from_millis(100));
        let session = Session::new(SessionRole::Api, stalled_sink());

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            correlator.call(&session, "send_group_msg", json!({})),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, ApiError::Timeout));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_releases_call_stuck_in_write() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(30)));
        let session = Session::new(SessionRole::Unified, stalled_sink());

        let call = tokio::spawn({
            let correlator = correlator.clone();
            let session = session.clone();
            async move { correlator.call(&session, "delete_msg", json!({})).await }
        });
        while correlator.pending_count() < 1 {
            tokio::task::yield_now().await;
        }

        correlator.fail_all("adapter closed");
        session.close();

        let outcome = tokio::time::timeout(Duration::from_secs(2), call)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.is_err());
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_reported() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(5)));
        let (sink, mut outbound) = fake_sink();
        let session = Session::new(SessionRole::Api, sink);

        let call = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.call(&session, "set_group_ban", json!({})).await })
        };
        let text = futures::StreamExt::next(&mut outbound).await.unwrap();
        let frame: Value = serde_json::from_str(&text).unwrap();
        correlator.resolve(
            frame["echo"].as_str().unwrap(),
            Ok(ApiResponse {
                status: "failed".into(),
                retcode: 102,
                message: "not admin".into(),
                ..Default::default()
            }),
        );

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::Remote { retcode: 102, ref message } if message == "not admin"));
    }
}
