//! # Gateway Scenarios
//!
//! One request per test, checked against the exact reply a bus client sees.
//!
//! | Subject          | Situation                     | Reply                         |
//! |------------------|-------------------------------|-------------------------------|
//! | kube.get         | object exists                 | the object                    |
//! | kube.get         | other cluster                 | none                          |
//! | kube.delete      | object exists                 | `{}`                          |
//! | kube.create      | store refuses                 | `{"error": "quota exceeded"}` |
//! | kube.event.watch | store emits an added event    | `{cluster, event}`            |

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kube_gateway::subjects;
    use kube_store::{StoreError, StoreOp};
    use serde_json::{json, Value};
    use shared_bus::{BusError, Subscriber};
    use shared_types::{ResourceDescriptor, WatchEvent};
    use tokio::time::timeout;

    use crate::harness::{pod, pods, TestGateway};

    fn pod_ref(cluster: &str, name: &str) -> Value {
        json!({
            "cluster": cluster,
            "groupVersionResource": {"group": "", "version": "v1", "resource": "pods"},
            "namespace": "foo",
            "name": name,
        })
    }

    #[tokio::test]
    async fn test_get_existing_object() {
        let gw = TestGateway::start("c1", false).await.unwrap();
        gw.store.insert(&pods(), "foo", pod("foo", "x"));

        let reply = gw.request(subjects::GET, &pod_ref("c1", "x")).await.unwrap();

        assert_eq!(reply["metadata"]["name"], "x");
        assert_eq!(reply["metadata"]["namespace"], "foo");
        assert_eq!(reply["kind"], "Pod");
        assert!(reply.get("error").is_none());
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_get_missing_object_replies_error() {
        let gw = TestGateway::start("c1", false).await.unwrap();

        let reply = gw.request(subjects::GET, &pod_ref("c1", "ghost")).await.unwrap();

        assert_eq!(reply, json!({"error": "pods \"ghost\" not found"}));
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_foreign_cluster_gets_no_reply() {
        let gw = TestGateway::start("c1", false).await.unwrap();
        gw.store.insert(&pods(), "foo", pod("foo", "x"));

        let result = gw.request(subjects::GET, &pod_ref("c2", "x")).await;

        assert!(matches!(result, Err(BusError::Timeout(_))), "{result:?}");
        assert_eq!(gw.store.call_count(), 0);
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_list_returns_collection() {
        let gw = TestGateway::start("c1", false).await.unwrap();
        gw.store.insert(&pods(), "foo", pod("foo", "a"));
        gw.store.insert(&pods(), "foo", pod("foo", "b"));
        gw.store.insert(&pods(), "bar", pod("bar", "c"));

        let reply = gw
            .request(
                subjects::LIST,
                &json!({
                    "cluster": "c1",
                    "groupVersionResource": {"version": "v1", "resource": "pods"},
                    "namespace": "foo",
                }),
            )
            .await
            .unwrap();

        let names: Vec<&str> = reply["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["metadata"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_delete_replies_empty_object() {
        let gw = TestGateway::start("c1", false).await.unwrap();
        gw.store.insert(&pods(), "foo", pod("foo", "x"));

        let reply = gw.request(subjects::DELETE, &pod_ref("c1", "x")).await.unwrap();

        assert_eq!(reply, json!({}));
        assert!(gw.store.is_empty());
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let gw = TestGateway::start("c1", false).await.unwrap();

        let created = gw
            .request(
                subjects::CREATE,
                &json!({
                    "cluster": "c1",
                    "groupVersionResource": {"version": "v1", "resource": "pods"},
                    "namespace": "foo",
                    "resource": {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "new"}},
                }),
            )
            .await
            .unwrap();
        assert_eq!(created["metadata"]["name"], "new");
        assert_eq!(created["metadata"]["namespace"], "foo");

        let fetched = gw.request(subjects::GET, &pod_ref("c1", "new")).await.unwrap();
        assert_eq!(fetched["metadata"]["name"], "new");
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_create_error_is_single_error_reply() {
        let gw = TestGateway::start("c1", false).await.unwrap();
        gw.store.fail_next(
            StoreOp::Create,
            StoreError::status(403, "Forbidden", "quota exceeded"),
        );
        let published_before = gw.bus.published_count();

        let reply = gw
            .request(
                subjects::CREATE,
                &json!({
                    "cluster": "c1",
                    "groupVersionResource": {"version": "v1", "resource": "pods"},
                    "namespace": "foo",
                    "resource": {"metadata": {"name": "x"}},
                }),
            )
            .await
            .unwrap();

        assert_eq!(reply, json!({"error": "quota exceeded"}));
        // The request itself plus exactly one reply.
        assert_eq!(gw.bus.published_count() - published_before, 2);
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_request_is_dropped() {
        let gw = TestGateway::start("c1", false).await.unwrap();

        let result = gw
            .request(subjects::GET, &json!({"cluster": "c1", "name": 42}))
            .await;

        assert!(matches!(result, Err(BusError::Timeout(_))), "{result:?}");
        assert_eq!(gw.store.call_count(), 0);
        gw.stop().await;
    }

    #[tokio::test]
    async fn test_added_event_is_forwarded() {
        let gw = TestGateway::start("c1", true).await.unwrap();
        let mut events = gw.bus.subscribe(subjects::EVENT_WATCH).await.unwrap();

        timeout(Duration::from_secs(1), async {
            while gw.store.watch_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let event = pod("foo", "x");
        gw.store
            .emit(&ResourceDescriptor::events(), WatchEvent::added(event));

        let msg = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        let body: Value = msg.decode().unwrap();
        assert_eq!(body["cluster"], "c1");
        assert_eq!(body["event"]["type"], "added");
        assert_eq!(body["event"]["object"]["metadata"]["name"], "x");
        gw.stop().await;
    }
}
