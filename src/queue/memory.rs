//! In-process shared queue.
//!
//! Same contract as the Redis backend, but only visible inside one process:
//! used by standalone mode and by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::envelope::{Request, Response};
use crate::queue::{QueueError, SharedQueue};

#[derive(Default)]
struct State {
    pending: VecDeque<String>,
    responses: HashMap<String, (String, Instant)>,
}

/// Mutex-guarded pending list and response map.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<State>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn responses_len(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("in-memory queue mutex poisoned")
    }
}

#[async_trait]
impl SharedQueue for InMemoryQueue {
    async fn push(&self, request: &Request) -> Result<(), QueueError> {
        let serialized = request.to_json()?;
        self.lock().pending.push_back(serialized);
        Ok(())
    }

    async fn get_request(&self) -> Result<Option<String>, QueueError> {
        Ok(self.lock().pending.pop_front())
    }

    async fn set_response(
        &self,
        request: &Request,
        response: &Response,
    ) -> Result<(), QueueError> {
        let serialized = response.to_json()?;
        self.lock()
            .responses
            .insert(request.uuid().to_string(), (serialized, Instant::now()));
        Ok(())
    }

    async fn pop(&self, request: &Request) -> Result<Option<String>, QueueError> {
        Ok(self
            .lock()
            .responses
            .remove(request.uuid())
            .map(|(serialized, _)| serialized))
    }

    async fn reclaim_abandoned(&self, max_age: Duration) -> Result<usize, QueueError> {
        let mut state = self.lock();
        let before = state.responses.len();
        state
            .responses
            .retain(|_, (_, stored_at)| stored_at.elapsed() <= max_age);
        Ok(before - state.responses.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::envelope::{Headers, RequestFields};

    fn request(uuid: &str) -> Request {
        Request::new(RequestFields {
            method: Some("GET".into()),
            uri: Some("/x".into()),
            uuid: Some(uuid.into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryQueue::new();
        queue.push(&request("a")).await.unwrap();
        queue.push(&request("b")).await.unwrap();

        let first = Request::from_json(&queue.get_request().await.unwrap().unwrap()).unwrap();
        let second = Request::from_json(&queue.get_request().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.uuid(), "a");
        assert_eq!(second.uuid(), "b");
        assert!(queue.get_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pop_consumes_response() {
        let queue = InMemoryQueue::new();
        let req = request("abc");
        assert!(queue.pop(&req).await.unwrap().is_none());

        let resp = Response::for_request(&req, "200 OK", Headers::new(), "hi");
        queue.set_response(&req, &resp).await.unwrap();

        let raw = queue.pop(&req).await.unwrap().unwrap();
        assert_eq!(Response::from_json(&raw).unwrap(), resp);
        assert!(queue.pop(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_response_last_write_wins() {
        let queue = InMemoryQueue::new();
        let req = request("abc");
        let first = Response::for_request(&req, "500 Internal Server Error", Headers::new(), "");
        let second = Response::for_request(&req, "200 OK", Headers::new(), "ok");
        queue.set_response(&req, &first).await.unwrap();
        queue.set_response(&req, &second).await.unwrap();

        assert_eq!(queue.responses_len(), 1);
        let raw = queue.pop(&req).await.unwrap().unwrap();
        assert_eq!(Response::from_json(&raw).unwrap().status(), "200 OK");
    }

    #[tokio::test]
    async fn test_concurrent_get_request_delivers_once() {
        let queue = Arc::new(InMemoryQueue::new());
        for i in 0..200 {
            queue.push(&request(&format!("r{}", i))).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            tasks.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(raw) = queue.get_request().await.unwrap() {
                    seen.push(Request::from_json(&raw).unwrap().uuid().to_string());
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }

    #[tokio::test]
    async fn test_concurrent_pop_delivers_once() {
        let queue = Arc::new(InMemoryQueue::new());
        let req = request("shared");
        let resp = Response::for_request(&req, "200 OK", Headers::new(), "hi");
        queue.set_response(&req, &resp).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            let req = req.clone();
            tasks.push(tokio::spawn(async move { queue.pop(&req).await.unwrap() }));
        }

        let mut delivered = 0;
        for task in tasks {
            if task.await.unwrap().is_some() {
                delivered += 1;
            }
        }
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_reclaim_abandoned() {
        let queue = InMemoryQueue::new();
        let old = request("old");
        queue
            .set_response(&old, &Response::for_request(&old, "200 OK", Headers::new(), ""))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = request("fresh");
        queue
            .set_response(&fresh, &Response::for_request(&fresh, "200 OK", Headers::new(), ""))
            .await
            .unwrap();

        let removed = queue.reclaim_abandoned(Duration::from_millis(20)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(queue.pop(&old).await.unwrap().is_none());
        assert!(queue.pop(&fresh).await.unwrap().is_some());
    }
}
