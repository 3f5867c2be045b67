//! # Multiple Gateways
//!
//! Gateways serving the same cluster share each request subject through the
//! `kube-nats` queue group: every request is handled by exactly one of them.

#[cfg(test)]
mod tests {
    use kube_gateway::subjects;
    use serde_json::json;
    use shared_bus::{BusError, InMemoryBus};

    use crate::harness::{pod, pods, send, TestGateway};

    #[tokio::test]
    async fn test_requests_are_shared_between_replicas() {
        let bus = InMemoryBus::new();
        let first = TestGateway::start_on(bus.clone(), "c1", false).await.unwrap();
        let second = TestGateway::start_on(bus.clone(), "c1", false).await.unwrap();
        for gw in [&first, &second] {
            gw.store.insert(&pods(), "foo", pod("foo", "x"));
        }

        let request = json!({
            "cluster": "c1",
            "groupVersionResource": {"version": "v1", "resource": "pods"},
            "namespace": "foo",
            "name": "x",
        });
        for _ in 0..10 {
            let reply = send(&bus, subjects::GET, &request).await.unwrap();
            assert_eq!(reply["metadata"]["name"], "x");
        }

        assert_eq!(first.store.call_count() + second.store.call_count(), 10);
        assert!(first.store.call_count() > 0);
        assert!(second.store.call_count() > 0);

        first.stop().await;
        second.stop().await;
    }

    #[tokio::test]
    async fn test_surviving_replica_keeps_serving() {
        let bus = InMemoryBus::new();
        let first = TestGateway::start_on(bus.clone(), "c1", false).await.unwrap();
        let second = TestGateway::start_on(bus.clone(), "c1", false).await.unwrap();
        second.store.insert(&pods(), "foo", pod("foo", "x"));

        first.stop().await;

        let reply = send(
            &bus,
            subjects::GET,
            &json!({
                "cluster": "c1",
                "groupVersionResource": {"version": "v1", "resource": "pods"},
                "namespace": "foo",
                "name": "x",
            }),
        )
        .await
        .unwrap();
        assert_eq!(reply["metadata"]["name"], "x");
        second.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_subjects() {
        let gw = TestGateway::start("c1", true).await.unwrap();
        let bus = gw.bus.clone();
        assert_eq!(bus.subscriber_count(), 4);

        gw.stop().await;

        assert_eq!(bus.subscriber_count(), 0);
        let result = send(
            &bus,
            subjects::LIST,
            &json!({"cluster": "c1", "groupVersionResource": {"version": "v1", "resource": "pods"}}),
        )
        .await;
        assert!(matches!(result, Err(BusError::Timeout(_))), "{result:?}");
    }
}
