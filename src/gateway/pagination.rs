//! Pagination driver
//!
//! Every listing is driven until the provider stops returning a continuation
//! marker. A marker that does not advance is reported as an error instead of
//! looping forever.

use std::future::Future;

use tracing::{debug, Instrument};

use super::{
    CloudGateway, Listener, LoadBalancer, Operation, Page, Rule, TargetGroup, TargetGroupFilter,
};
use crate::domain::{ListenerArn, LoadBalancerArn, ResourceKind};
use crate::errors::{GatewayContext, GatewayError, GatewayResult, Result};

/// Collect every page of a listing call.
pub async fn collect_pages<T, F, Fut>(operation: Operation, mut fetch: F) -> GatewayResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = GatewayResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(marker.clone()).await?;
        pages += 1;
        items.extend(page.items);

        match page.next_marker {
            Some(next) if marker.as_deref() == Some(next.as_str()) => {
                return Err(GatewayError::invalid(format!(
                    "{} returned the same continuation marker twice",
                    operation
                )));
            }
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    debug!(operation = %operation, pages, items = items.len(), "Listing complete");
    Ok(items)
}

pub async fn all_load_balancers(gateway: &dyn CloudGateway) -> Result<Vec<LoadBalancer>> {
    let operation = Operation::ListLoadBalancers;
    collect_pages(operation, |marker| gateway.list_load_balancers(marker))
        .instrument(crate::gateway_span!(operation))
        .await
        .context(ResourceKind::LoadBalancer, "*", operation)
}

pub async fn all_target_groups(
    gateway: &dyn CloudGateway,
    filter: &TargetGroupFilter,
) -> Result<Vec<TargetGroup>> {
    let operation = Operation::ListTargetGroups;
    let resource = filter.load_balancer_arn.as_ref().map_or("*", |arn| arn.as_str());
    collect_pages(operation, |marker| gateway.list_target_groups(filter, marker))
        .instrument(crate::gateway_span!(operation))
        .await
        .context(ResourceKind::TargetGroup, resource, operation)
}

pub async fn all_listeners(
    gateway: &dyn CloudGateway,
    load_balancer_arn: &LoadBalancerArn,
) -> Result<Vec<Listener>> {
    let operation = Operation::ListListeners;
    collect_pages(operation, |marker| gateway.list_listeners(load_balancer_arn, marker))
        .instrument(crate::gateway_span!(operation, resource = %load_balancer_arn))
        .await
        .context(ResourceKind::Listener, load_balancer_arn, operation)
}

pub async fn all_rules(
    gateway: &dyn CloudGateway,
    listener_arn: &ListenerArn,
) -> Result<Vec<Rule>> {
    let operation = Operation::ListRules;
    collect_pages(operation, |marker| gateway.list_rules(listener_arn, marker))
        .instrument(crate::gateway_span!(operation, resource = %listener_arn))
        .await
        .context(ResourceKind::Rule, listener_arn, operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_collects_until_marker_exhausted() {
        let calls = AtomicUsize::new(0);
        let items = collect_pages(Operation::ListRules, |marker| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match marker.as_deref() {
                    None => Page { items: vec![1, 2], next_marker: Some("2".to_string()) },
                    Some("2") => Page { items: vec![3], next_marker: Some("3".to_string()) },
                    _ => Page::last(vec![4]),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stuck_marker_is_an_error() {
        let result = collect_pages(Operation::ListTargetGroups, |_marker| async {
            Ok(Page { items: vec![1], next_marker: Some("same".to_string()) })
        })
        .await;

        let error = result.unwrap_err();
        assert!(error.message.contains("list_target_groups"));
    }
}
