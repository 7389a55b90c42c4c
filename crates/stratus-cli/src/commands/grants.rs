use anyhow::Context;
use stratus_cloud::{Env, RetryPolicy};
use stratus_cloud_memory::MemoryCloud;
use stratus_core::Mode;
use stratus_reconcile::{DeployPlan, GrantSpec, PassReport, RoleGrants, run_pass};

pub async fn run(
    cloud: &MemoryCloud,
    env: &Env,
    policy: &RetryPolicy,
    role: &str,
    allows: &[String],
    policies: &[String],
    key: Option<String>,
    mode: Mode,
) -> anyhow::Result<PassReport> {
    let allows = allows
        .iter()
        .map(|raw| parse_allow(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let plan = DeployPlan {
        resources: Vec::new(),
        grants: Some(RoleGrants {
            role: role.to_string(),
            allows,
            policies: policies.to_vec(),
            key,
        }),
        triggers: Vec::new(),
    };
    Ok(run_pass(cloud, env, policy, &plan, mode).await?)
}

fn parse_allow(raw: &str) -> anyhow::Result<GrantSpec> {
    let (action, resource) = raw
        .split_once(' ')
        .with_context(|| format!("expected \"<action> <resource>\", got {:?}", raw))?;
    Ok(GrantSpec::new(action.trim(), resource.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_parsing() {
        let grant = parse_allow("dynamodb:* arn:aws:dynamodb:*:*:table/orders").unwrap();
        assert_eq!(grant.action, "dynamodb:*");
        assert_eq!(grant.resource, "arn:aws:dynamodb:*:*:table/orders");

        assert!(parse_allow("no-resource").is_err());
    }
}
