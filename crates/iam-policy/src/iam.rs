//! Permission checks on top of a policy source.
//!
//! The authorization service is reached through [`PolicySource`]; HTTP
//! transport and request signing live behind that trait. Everything here
//! is local: validate the request, fetch the policy once, build attribute
//! stores and evaluate.

use crate::cache::ResultCache;
use crate::config::IamConfig;
use crate::context::AttributeStore;
use crate::error::Result;
use crate::evaluator::PolicyEvaluator;
use crate::expression::Expression;
use crate::parser::ActionPolicy;
use crate::request::{MultiActionRequest, Request, Resource};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

/// The only username accepted by [`Iam::is_basic_auth_allowed`].
pub const BASIC_AUTH_USERNAME: &str = "bk_iam";

/// Fetches policies from the authorization service.
pub trait PolicySource {
    /// Returns the condition tree for a single-action query, or `None` when
    /// the subject has no policy at all.
    fn policy_query(&self, request: &serde_json::Value) -> Result<Option<serde_json::Value>>;

    /// Returns one condition tree per action for a multi-action query.
    fn policy_query_by_actions(&self, request: &serde_json::Value) -> Result<Vec<ActionPolicy>>;

    /// Returns the token the service issued to `system`.
    fn get_token(&self, system: &str) -> Result<String>;
}

/// Permission checker.
#[derive(Debug)]
pub struct Iam<S> {
    source: S,
    evaluator: PolicyEvaluator,
    cache: ResultCache,
}

impl<S: PolicySource> Iam<S> {
    /// Creates a checker with the default configuration.
    pub fn new(source: S) -> Result<Self> {
        Self::with_config(source, IamConfig::default())
    }

    pub fn with_config(source: S, config: IamConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            evaluator: PolicyEvaluator::from_config(&config),
            cache: ResultCache::new(Duration::from_secs(config.cache_ttl_secs))?,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Checks one action on one resource.
    ///
    /// The resource is sent along with the query so the service can resolve
    /// attributes owned by other systems; the returned policy is evaluated
    /// against every node of the chain.
    pub fn is_allowed(&self, request: &Request) -> Result<bool> {
        debug!(system = %request.system, action = %request.action.id, "Checking permission");
        request.validate()?;

        let Some(policy) = self.query(request, true)? else {
            debug!("No policy returned; denying");
            return Ok(false);
        };

        let store = AttributeStore::from_resource(&request.system, &request.resource, false)?;
        let expr = self.evaluator.parse(&policy)?;
        self.evaluator.evaluate_expression(&expr, &store)
    }

    /// [`Iam::is_allowed`], memoised by request fingerprint for the configured TTL.
    pub fn is_allowed_with_cache(&self, request: &Request) -> Result<bool> {
        let key = request.fingerprint()?;
        if let Some(allowed) = self.cache.get(&key) {
            debug!(fingerprint = %key, allowed, "Permission served from cache");
            return Ok(allowed);
        }

        let allowed = self.is_allowed(request)?;
        self.cache.insert(key, allowed);
        Ok(allowed)
    }

    /// Checks one action on many resources of the same system.
    ///
    /// The policy is queried once without resources and evaluated per
    /// resource, so attributes from other systems are not supported.
    /// Results are keyed by [`Resource::resource_id`].
    pub fn batch_is_allowed(
        &self,
        request: &Request,
        resources: &[Resource],
    ) -> Result<HashMap<String, bool>> {
        debug!(
            system = %request.system,
            action = %request.action.id,
            resources = resources.len(),
            "Checking permission for a batch of resources"
        );
        request.validate()?;

        let Some(policy) = self.query(request, false)? else {
            debug!("No policy returned; denying every resource");
            return resources
                .iter()
                .map(|resource| -> Result<(String, bool)> {
                    Ok((resource.resource_id(&request.system)?, false))
                })
                .collect();
        };

        let expr = self.evaluator.parse(&policy)?;
        let mut results = HashMap::with_capacity(resources.len());
        for resource in resources {
            let store = AttributeStore::from_resource(&request.system, resource, false)?;
            let allowed = self.evaluator.evaluate_expression(&expr, &store)?;
            results.insert(resource.resource_id(&request.system)?, allowed);
        }
        Ok(results)
    }

    /// Checks many actions on one resource.
    ///
    /// Only nodes of the request's own system take part in local evaluation;
    /// the service has already resolved the rest.
    pub fn resource_multi_actions_allowed(
        &self,
        request: &MultiActionRequest,
    ) -> Result<HashMap<String, bool>> {
        debug!(
            system = %request.system,
            actions = request.actions.len(),
            "Checking several actions on one resource"
        );
        request.validate()?;

        let action_policies = self.source.policy_query_by_actions(&request.to_value(true)?)?;
        debug!(policies = action_policies.len(), "Received action policies");

        if action_policies.is_empty() {
            debug!("No policy returned; denying every action");
            return Ok(deny_all(request));
        }

        let store = AttributeStore::from_resource(&request.system, &request.resource, true)?;
        let mut results = HashMap::with_capacity(action_policies.len());
        for action_policy in &action_policies {
            let expr = self.evaluator.parse(&action_policy.condition)?;
            let allowed = self.evaluator.evaluate_expression(&expr, &store)?;
            results.insert(action_policy.action_id().to_string(), allowed);
        }
        Ok(results)
    }

    /// Checks many actions on many resources of the same system.
    pub fn batch_resource_multi_actions_allowed(
        &self,
        request: &MultiActionRequest,
        resources: &[Resource],
    ) -> Result<HashMap<String, HashMap<String, bool>>> {
        debug!(
            system = %request.system,
            actions = request.actions.len(),
            resources = resources.len(),
            "Checking several actions on a batch of resources"
        );
        request.validate()?;

        let action_policies = self.source.policy_query_by_actions(&request.to_value(false)?)?;

        if action_policies.is_empty() {
            debug!("No policy returned; denying every action on every resource");
            return resources
                .iter()
                .map(|resource| -> Result<(String, HashMap<String, bool>)> {
                    Ok((resource.resource_id(&request.system)?, deny_all(request)))
                })
                .collect();
        }

        let exprs = action_policies
            .iter()
            .map(|ap| -> Result<(String, Expression)> {
                Ok((ap.action_id().to_string(), self.evaluator.parse(&ap.condition)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut results = HashMap::with_capacity(resources.len());
        for resource in resources {
            let store = AttributeStore::from_resource(&request.system, resource, false)?;
            let mut allowed_actions = HashMap::with_capacity(exprs.len());
            for (action_id, expr) in &exprs {
                let allowed = self.evaluator.evaluate_expression(expr, &store)?;
                allowed_actions.insert(action_id.clone(), allowed);
            }
            results.insert(resource.resource_id(&request.system)?, allowed_actions);
        }
        Ok(results)
    }

    /// Fetches the token of `system` from the service.
    pub fn get_token(&self, system: &str) -> Result<String> {
        self.source.get_token(system)
    }

    /// Checks a basic-auth callback made by the authorization service.
    ///
    /// The username must be `bk_iam` and the password the system's token.
    /// A token fetch failure denies.
    pub fn is_basic_auth_allowed(&self, system: &str, username: &str, password: &str) -> bool {
        if username != BASIC_AUTH_USERNAME {
            error!(username, "Basic auth username is not {}", BASIC_AUTH_USERNAME);
            return false;
        }

        let token = match self.source.get_token(system) {
            Ok(token) => token,
            Err(err) => {
                error!(system, error = %err, "Failed to get system token from IAM");
                return false;
            }
        };

        if password != token {
            error!(
                system,
                password = %mask_secret(password),
                token = %mask_secret(&token),
                "Basic auth password does not match the system token"
            );
            return false;
        }

        true
    }

    fn query(&self, request: &Request, with_resources: bool) -> Result<Option<serde_json::Value>> {
        let payload = request.to_value(with_resources)?;
        let policy = self.source.policy_query(&payload)?;
        debug!(policy = ?policy, "Received policy");
        Ok(policy.filter(|p| !is_empty_policy(p)))
    }
}

fn deny_all(request: &MultiActionRequest) -> HashMap<String, bool> {
    request
        .actions
        .iter()
        .map(|action| (action.id.clone(), false))
        .collect()
}

/// Keeps the first six characters of a secret for logging.
fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{}***", prefix)
}

fn is_empty_policy(policy: &serde_json::Value) -> bool {
    match policy {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
