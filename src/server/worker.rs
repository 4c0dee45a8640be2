//! Worker pool: drains the ingress queue and invokes handlers.
//!
//! Workers block on the ingress queue rather than polling it, so an idle
//! server burns no CPU. A worker never dies from a dispatch: unknown
//! handler names and handler failures all come back as failure Responses.

use std::sync::Arc;

use crate::handler::HandlerRegistry;
use crate::protocol::{Query, Response};
use crate::queue::BoundedQueue;
use crate::server::connection::IngressItem;

/// Run one worker until the ingress queue closes.
pub(crate) async fn worker_loop(
    id: usize,
    ingress: Arc<BoundedQueue<IngressItem>>,
    registry: Arc<HandlerRegistry>,
) {
    while let Some((query, destination)) = ingress.dequeue(None).await {
        let mut response = dispatch(&registry, &query).await;
        response.dispatch = query.dispatch;

        if !destination.try_enqueue(response) {
            // Writer saturated or connection gone; the caller times out.
            tracing::debug!(
                worker = id,
                handler = %query.handler,
                dispatch = query.dispatch,
                "dropping response for saturated connection"
            );
        }
    }
    tracing::trace!(worker = id, "worker stopped");
}

/// Look up and invoke the handler for `query`.
async fn dispatch(registry: &HandlerRegistry, query: &Query) -> Response {
    match registry.get(&query.handler) {
        Some(handler) => handler.call(query).await,
        None => Response::failure(
            query.dispatch,
            format!("unknown handler: {}", query.handler),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MsgPackCodec, PayloadCodec};
    use crate::handler::HandlerError;
    use std::time::Duration;

    fn registry() -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        registry
            .register::<MsgPackCodec, _, i32, i32, _>("add_one", |x: i32| async move { Ok(x + 1) })
            .unwrap();
        registry
            .register::<MsgPackCodec, _, i32, i32, _>("fail", |_: i32| async move {
                Err(HandlerError::new("nope"))
            })
            .unwrap();
        Arc::new(registry)
    }

    fn query(dispatch: i32, handler: &str, value: i32) -> Query {
        Query::new(dispatch, handler, MsgPackCodec::encode(&value).unwrap())
    }

    #[tokio::test]
    async fn test_worker_routes_response_to_destination() {
        let ingress: Arc<BoundedQueue<IngressItem>> = Arc::new(BoundedQueue::new(8));
        let destination: Arc<BoundedQueue<Response>> = Arc::new(BoundedQueue::new(8));

        tokio::spawn(worker_loop(0, ingress.clone(), registry()));

        assert!(ingress.try_enqueue((query(11, "add_one", 5), destination.clone())));

        let response = destination
            .dequeue(Some(Duration::from_secs(1)))
            .await
            .expect("worker should produce a response");
        assert!(response.ok);
        assert_eq!(response.dispatch, 11);
        let value: i32 = MsgPackCodec::decode(&response.message_data).unwrap();
        assert_eq!(value, 6);
    }

    #[tokio::test]
    async fn test_unknown_handler_names_the_handler() {
        let ingress: Arc<BoundedQueue<IngressItem>> = Arc::new(BoundedQueue::new(8));
        let destination: Arc<BoundedQueue<Response>> = Arc::new(BoundedQueue::new(8));

        tokio::spawn(worker_loop(0, ingress.clone(), registry()));

        assert!(ingress.try_enqueue((query(4, "missing", 0), destination.clone())));

        let response = destination
            .dequeue(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(!response.ok);
        assert_eq!(response.dispatch, 4);
        assert!(response.error_text().contains("missing"));
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_kill_worker() {
        let ingress: Arc<BoundedQueue<IngressItem>> = Arc::new(BoundedQueue::new(8));
        let destination: Arc<BoundedQueue<Response>> = Arc::new(BoundedQueue::new(8));

        tokio::spawn(worker_loop(0, ingress.clone(), registry()));

        assert!(ingress.try_enqueue((query(1, "fail", 0), destination.clone())));
        let failure = destination
            .dequeue(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(!failure.ok);
        assert_eq!(failure.error_text(), "nope");

        // The same worker keeps dispatching afterwards.
        assert!(ingress.try_enqueue((query(2, "add_one", 1), destination.clone())));
        let success = destination
            .dequeue(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(success.ok);
        assert_eq!(success.dispatch, 2);
    }

    #[tokio::test]
    async fn test_worker_stops_when_ingress_closes() {
        let ingress: Arc<BoundedQueue<IngressItem>> = Arc::new(BoundedQueue::new(8));
        let handle = tokio::spawn(worker_loop(0, ingress.clone(), registry()));

        ingress.close();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should exit on close")
            .unwrap();
    }
}
