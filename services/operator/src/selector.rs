//! Selector resolution: turn persisted selector clauses into stored entities.

use thiserror::Error;
use tracing::debug;
use vto_topology::{LabelSelector, ResourceSelector, SelectorError};

use crate::store::{ApiStore, Object, StoreError, StoreExt};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    #[error("listing selected objects: {0}")]
    Client(#[from] StoreError),
}

/// Resolve `selectors` to the matching objects of kind `T` in `namespace`.
///
/// An empty clause list matches nothing and issues no query; otherwise exactly
/// one list query is issued.
pub async fn resolve<T: Object>(
    store: &dyn ApiStore,
    namespace: &str,
    selectors: &[ResourceSelector],
) -> Result<Vec<T>, ResolveError> {
    if selectors.is_empty() {
        return Ok(Vec::new());
    }

    let selector = LabelSelector::from_resource_selectors(selectors)?;
    let matched: Vec<T> = store.list_objects(namespace, &selector).await?;

    debug!(kind = %T::KIND, namespace, %selector, matched = matched.len(), "Resolved selector");
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Kind, StoreOp};
    use rstest::rstest;
    use vto_topology::{ObjectMeta, Shard, ShardSpec};

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (name, tier) in [("-80", "hot"), ("80-", "cold")] {
            let shard = Shard::new(
                ObjectMeta::named("vitess", name).with_label("tier", tier),
                ShardSpec::default(),
            );
            store.create_object(&shard).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_empty_selector_issues_no_query() {
        let store = seeded().await;
        let shards: Vec<Shard> = resolve(&store, "vitess", &[]).await.unwrap();
        assert!(shards.is_empty());
        assert_eq!(store.calls(StoreOp::List), 0);
    }

    #[rstest]
    #[case(vec![ResourceSelector::is_in("tier", ["hot"])], vec!["-80"])]
    #[case(vec![ResourceSelector::not_in("tier", ["hot"])], vec!["80-"])]
    #[case(vec![ResourceSelector::exists("tier")], vec!["-80", "80-"])]
    #[case(vec![ResourceSelector::does_not_exist("tier")], vec![])]
    #[case(
        vec![ResourceSelector::exists("tier"), ResourceSelector::is_in("tier", ["cold"])],
        vec!["80-"]
    )]
    #[tokio::test]
    async fn test_clauses_are_and_combined(
        #[case] selectors: Vec<ResourceSelector>,
        #[case] expected: Vec<&str>,
    ) {
        let store = seeded().await;
        let shards: Vec<Shard> = resolve(&store, "vitess", &selectors).await.unwrap();

        let names: Vec<&str> = shards.iter().map(Shard::name).collect();
        assert_eq!(names, expected);
        assert_eq!(store.calls(StoreOp::List), 1);
    }

    #[tokio::test]
    async fn test_unknown_operator_is_invalid() {
        let store = seeded().await;
        let selectors = vec![ResourceSelector {
            key: "tier".to_string(),
            operator: "Near".to_string(),
            values: vec![],
        }];

        let err = resolve::<Shard>(&store, "vitess", &selectors).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidSelector(SelectorError::UnknownOperator(_))
        ));
        assert_eq!(store.calls(StoreOp::List), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_client_error() {
        let store = seeded().await;
        store.fail_on(StoreOp::List, Kind::Shard).await;

        let err = resolve::<Shard>(&store, "vitess", &[ResourceSelector::exists("tier")])
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Client(StoreError::Unavailable(_))));
    }
}
