//! # Operations
//!
//! The four store operations exposed on the bus. Each binds a subject, a
//! request envelope and a reply payload to one [`ResourceStore`] call.
//!
//! | Operation | Subject       | Store call | Reply            |
//! |-----------|---------------|------------|------------------|
//! | Get       | `kube.get`    | `get`      | object           |
//! | List      | `kube.list`   | `list`     | object list      |
//! | Create    | `kube.create` | `create`   | created object   |
//! | Delete    | `kube.delete` | `delete`   | `{}`             |

use async_trait::async_trait;
use kube_store::{ResourceStore, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{
    ClusterScoped, CreateRequest, DeleteRequest, Deleted, GetRequest, ListRequest, Object,
    ObjectList,
};

use crate::subjects;

/// One request/reply operation.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Inbound envelope.
    type Request: DeserializeOwned + ClusterScoped + Send + 'static;
    /// Success payload.
    type Reply: Serialize + Send + Sync;

    /// Subject the handler subscribes to.
    const SUBJECT: &'static str;

    /// Run the store call for `request`.
    async fn call(
        &self,
        store: &dyn ResourceStore,
        request: Self::Request,
    ) -> Result<Self::Reply, StoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOperation;

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOperation;

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOperation;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOperation;

#[async_trait]
impl Operation for GetOperation {
    type Request = GetRequest;
    type Reply = Object;
    const SUBJECT: &'static str = subjects::GET;

    async fn call(&self, store: &dyn ResourceStore, req: GetRequest) -> Result<Object, StoreError> {
        store
            .get(
                &req.descriptor,
                &req.namespace,
                &req.name,
                &req.options,
                &req.subresources,
            )
            .await
    }
}

#[async_trait]
impl Operation for ListOperation {
    type Request = ListRequest;
    type Reply = ObjectList;
    const SUBJECT: &'static str = subjects::LIST;

    async fn call(
        &self,
        store: &dyn ResourceStore,
        req: ListRequest,
    ) -> Result<ObjectList, StoreError> {
        store
            .list(&req.descriptor, &req.namespace, &req.options)
            .await
    }
}

#[async_trait]
impl Operation for CreateOperation {
    type Request = CreateRequest;
    type Reply = Object;
    const SUBJECT: &'static str = subjects::CREATE;

    async fn call(
        &self,
        store: &dyn ResourceStore,
        req: CreateRequest,
    ) -> Result<Object, StoreError> {
        store
            .create(
                &req.descriptor,
                &req.namespace,
                &req.object,
                &req.options,
                &req.subresources,
            )
            .await
    }
}

#[async_trait]
impl Operation for DeleteOperation {
    type Request = DeleteRequest;
    type Reply = Deleted;
    const SUBJECT: &'static str = subjects::DELETE;

    async fn call(
        &self,
        store: &dyn ResourceStore,
        req: DeleteRequest,
    ) -> Result<Deleted, StoreError> {
        store
            .delete(
                &req.descriptor,
                &req.namespace,
                &req.name,
                req.options.as_ref(),
                &req.subresources,
            )
            .await?;
        Ok(Deleted {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_store::InMemoryStore;
    use shared_types::{Options, ResourceDescriptor};

    fn pods() -> ResourceDescriptor {
        ResourceDescriptor::new("", "v1", "pods")
    }

    fn pod(name: &str) -> Object {
        let mut object = Object::new();
        object.set_metadata("name", name);
        object
    }

    #[tokio::test]
    async fn test_subjects_are_distinct() {
        let subjects = [
            GetOperation::SUBJECT,
            ListOperation::SUBJECT,
            CreateOperation::SUBJECT,
            DeleteOperation::SUBJECT,
        ];
        assert_eq!(subjects, crate::subjects::REQUEST_SUBJECTS);
    }

    #[tokio::test]
    async fn test_get_passes_parameters() {
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));

        let reply = GetOperation
            .call(
                &store,
                GetRequest {
                    cluster: "c1".into(),
                    descriptor: pods(),
                    namespace: "foo".into(),
                    name: "x".into(),
                    ..GetRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.name(), Some("x"));
    }

    #[tokio::test]
    async fn test_delete_returns_empty_marker() {
        let store = InMemoryStore::new();
        store.insert(&pods(), "foo", pod("x"));

        let reply = DeleteOperation
            .call(
                &store,
                DeleteRequest {
                    cluster: "c1".into(),
                    descriptor: pods(),
                    namespace: "foo".into(),
                    name: "x".into(),
                    options: Some(Options::new()),
                    subresources: Vec::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(serde_json::to_string(&reply).unwrap(), "{}");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_and_create() {
        let store = InMemoryStore::new();
        CreateOperation
            .call(
                &store,
                CreateRequest {
                    cluster: "c1".into(),
                    descriptor: pods(),
                    namespace: "foo".into(),
                    object: pod("x"),
                    ..CreateRequest::default()
                },
            )
            .await
            .unwrap();

        let list = ListOperation
            .call(
                &store,
                ListRequest {
                    cluster: "c1".into(),
                    descriptor: pods(),
                    namespace: "foo".into(),
                    options: Options::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
    }
}
