//! Target pool membership
//!
//! Pools are regional load balancer backends. Membership is compared against
//! the desired state and the apply function runs only on disagreement, so
//! repeated reconciliation converges without redundant mutations.

use std::future::Future;

use tracing::{debug, info};

use gantry_common::{Error, Result};
use gantry_compute::ComputeGateway;

/// Membership of one instance across the target pools of its provider spec
pub struct TargetPoolMembership<'a> {
    compute: &'a dyn ComputeGateway,
    project: &'a str,
    region: &'a str,
    pools: &'a [String],
    instance_link: &'a str,
}

impl<'a> TargetPoolMembership<'a> {
    /// Membership of `instance_link` in `pools`; an unset list means no pools
    pub fn new(
        compute: &'a dyn ComputeGateway,
        project: &'a str,
        region: &'a str,
        pools: Option<&'a [String]>,
        instance_link: &'a str,
    ) -> Self {
        Self {
            compute,
            project,
            region,
            pools: pools.unwrap_or_default(),
            instance_link,
        }
    }

    /// Drive every pool towards `desired` membership.
    ///
    /// `apply(pool, instance_link)` is invoked only for pools whose actual
    /// membership differs. The first failure aborts the pass; pools already
    /// processed are not rolled back.
    pub async fn process<F, Fut>(&self, desired: bool, mut apply: F) -> Result<()>
    where
        F: FnMut(String, String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.pools.is_empty() {
            return Ok(());
        }

        for pool in self.pools {
            let members = self
                .compute
                .target_pool_instances(self.project, self.region, pool)
                .await
                .map_err(|e| {
                    let resource = format!("target pool {}", pool);
                    if e.is_not_found() {
                        Error::fetch_not_found(resource, e.to_string())
                    } else {
                        Error::fetch(resource, e.to_string())
                    }
                })?;

            let present = members.iter().any(|m| m == self.instance_link);
            if present == desired {
                debug!(pool = %pool, member = present, "Target pool membership up to date");
                continue;
            }

            apply(pool.clone(), self.instance_link.to_string()).await?;
        }

        Ok(())
    }
}

/// Add an instance to a target pool
pub async fn add_instance_to_target_pool(
    compute: &dyn ComputeGateway,
    project: &str,
    region: &str,
    pool: &str,
    instance_link: &str,
) -> Result<()> {
    compute
        .add_target_pool_instance(project, region, pool, instance_link)
        .await
        .map_err(|e| {
            Error::gateway(format!(
                "failed to add instance {} to target pool {}: {}",
                instance_link, pool, e
            ))
        })?;
    info!(pool = %pool, instance = %instance_link, "Added instance to target pool");
    Ok(())
}

/// Remove an instance from a target pool
pub async fn remove_instance_from_target_pool(
    compute: &dyn ComputeGateway,
    project: &str,
    region: &str,
    pool: &str,
    instance_link: &str,
) -> Result<()> {
    compute
        .remove_target_pool_instance(project, region, pool, instance_link)
        .await
        .map_err(|e| {
            Error::gateway(format!(
                "failed to remove instance {} from target pool {}: {}",
                instance_link, pool, e
            ))
        })?;
    info!(pool = %pool, instance = %instance_link, "Removed instance from target pool");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use gantry_compute::types::Operation;
    use gantry_compute::{ComputeError, MockComputeGateway};
    use mockall::predicate::eq;

    const LINK: &str =
        "https://www.googleapis.com/compute/v1/projects/proj/zones/us-east1-b/instances/worker-a";

    fn pools(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_pool_list_touches_nothing() {
        // no expectations: any gateway call would panic
        let compute = MockComputeGateway::new();
        let calls = AtomicUsize::new(0);

        for list in [None, Some(&[][..])] {
            let membership = TargetPoolMembership::new(&compute, "proj", "us-east1", list, LINK);
            membership
                .process(true, |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                })
                .await
                .expect("empty list should succeed");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn applies_exactly_once_per_disagreeing_pool() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_target_pool_instances()
            .with(eq("proj"), eq("us-east1"), eq("ingress"))
            .times(1)
            .returning(|_, _, _| Ok(vec![LINK.to_string()]));
        compute
            .expect_target_pool_instances()
            .with(eq("proj"), eq("us-east1"), eq("api"))
            .times(1)
            .returning(|_, _, _| Ok(vec![]));

        let list = pools(&["ingress", "api"]);
        let applied = Mutex::new(Vec::new());
        let membership =
            TargetPoolMembership::new(&compute, "proj", "us-east1", Some(list.as_slice()), LINK);
        membership
            .process(true, |pool, link| {
                applied.lock().expect("lock").push((pool, link));
                async { Ok(()) }
            })
            .await
            .expect("process should succeed");

        let applied = applied.into_inner().expect("lock");
        assert_eq!(applied, vec![("api".to_string(), LINK.to_string())]);
    }

    #[tokio::test]
    async fn removal_only_touches_pools_that_hold_the_instance() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_target_pool_instances()
            .with(eq("proj"), eq("us-east1"), eq("ingress"))
            .returning(|_, _, _| Ok(vec![LINK.to_string()]));
        compute
            .expect_target_pool_instances()
            .with(eq("proj"), eq("us-east1"), eq("api"))
            .returning(|_, _, _| Ok(vec!["other".to_string()]));
        compute
            .expect_remove_target_pool_instance()
            .with(eq("proj"), eq("us-east1"), eq("ingress"), eq(LINK))
            .times(1)
            .returning(|_, _, _, _| Ok(Operation::default()));

        let list = pools(&["ingress", "api"]);
        let gateway: &dyn ComputeGateway = &compute;
        let membership =
            TargetPoolMembership::new(gateway, "proj", "us-east1", Some(list.as_slice()), LINK);
        membership
            .process(false, move |pool, link| {
                async move {
                    remove_instance_from_target_pool(gateway, "proj", "us-east1", &pool, &link)
                        .await
                }
            })
            .await
            .expect("process should succeed");
    }

    #[tokio::test]
    async fn first_failure_aborts_without_rollback() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_target_pool_instances()
            .with(eq("proj"), eq("us-east1"), eq("a"))
            .returning(|_, _, _| Ok(vec![]));
        compute
            .expect_target_pool_instances()
            .with(eq("proj"), eq("us-east1"), eq("b"))
            .returning(|_, _, _| Ok(vec![]));
        compute
            .expect_target_pool_instances()
            .with(eq("proj"), eq("us-east1"), eq("c"))
            .never();

        let list = pools(&["a", "b", "c"]);
        let calls = AtomicUsize::new(0);
        let membership =
            TargetPoolMembership::new(&compute, "proj", "us-east1", Some(list.as_slice()), LINK);
        let err = membership
            .process(true, |pool, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if pool == "b" {
                        Err(Error::gateway("quota exceeded"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .expect_err("second pool should fail");

        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_pool_is_reported_as_not_found() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_target_pool_instances()
            .returning(|_, _, _| Err(ComputeError::NotFound("pool gone".into())));

        let list = pools(&["gone"]);
        let membership =
            TargetPoolMembership::new(&compute, "proj", "us-east1", Some(list.as_slice()), LINK);
        let err = membership
            .process(true, |_, _| async { Ok(()) })
            .await
            .expect_err("should fail");

        assert!(err.is_not_found());
        assert!(err.to_string().contains("target pool gone"));
    }

    #[tokio::test]
    async fn add_wraps_gateway_errors() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_add_target_pool_instance()
            .returning(|_, _, _, _| Err(ComputeError::Transient("connection reset".into())));

        let err = add_instance_to_target_pool(&compute, "proj", "us-east1", "api", LINK)
            .await
            .expect_err("should fail");
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            format!("failed to add instance {} to target pool api: connection reset", LINK)
        );
    }
}
