//! SecurityPolicy translation.
//!
//! A SecurityPolicy that can't be translated fails closed: every route it
//! covers responds with a 500 instead of serving traffic unprotected.

use std::collections::{BTreeMap, BTreeSet};

use kube::ResourceExt;
use switchyard_api::policy::security::{
    ApiKeyAuth, Authorization, AuthorizationAction, BasicAuth, Cors, Jwt, SecurityPolicy,
};

use super::{optional_duration, parse_cidr, process_policies, target_http_routes, PolicyTarget, TranslationError};
use crate::ir;
use crate::refs::{resolve_secret, Referrer};
use crate::resources::Resources;
use crate::tls::secret_value;
use crate::translator::TranslateContext;

const HTPASSWD_KEY: &str = ".htpasswd";

pub(crate) fn process_security_policies(cx: &mut TranslateContext) {
    let resources = cx.resources;
    process_policies(cx, &resources.security_policies, |cx, policy, target| {
        let result = security_features(cx.resources, policy);
        let route_target = matches!(target, PolicyTarget::Route { .. });

        // gateway policies never touch routes a route policy already set up
        let routes = target_http_routes(cx, target)
            .into_iter()
            .filter(|r| route_target || r.security.is_none());

        match result {
            Ok(features) => {
                for route in routes {
                    route.security = Some(features.clone());
                }
                Ok(())
            }
            Err(e) => {
                for route in routes {
                    route.fail_with(500);
                }
                Err(e)
            }
        }
    });
}

fn security_features(
    resources: &Resources,
    policy: &SecurityPolicy,
) -> Result<ir::SecurityFeatures, TranslationError> {
    let namespace = policy.namespace().unwrap_or_default();
    let name = policy.name_any();
    let from = Referrer {
        group: switchyard_api::ENVOY_GATEWAY_GROUP,
        kind: switchyard_api::KIND_SECURITY_POLICY,
        namespace: &namespace,
    };
    let ir_name = format!("securitypolicy/{namespace}/{name}");

    let spec = &policy.spec;
    let mut features = ir::SecurityFeatures::default();
    let mut errors = vec![];

    macro_rules! build {
        ($field:ident, $name:literal, $build:expr) => {
            if let Some(value) = &spec.$field {
                match $build(value) {
                    Ok(v) => features.$field = Some(v),
                    Err(e) => errors.push(TranslationError::with_field(e, $name)),
                }
            }
        };
    }

    build!(cors, "CORS", cors);
    build!(basic_auth, "BasicAuth", |b| basic_auth(resources, from, &ir_name, b));
    build!(api_key_auth, "APIKeyAuth", |a| api_key_auth(resources, from, a));
    build!(jwt, "JWT", jwt);
    build!(authorization, "Authorization", |a| authorization(&namespace, &name, a));

    TranslationError::collect(errors)?;
    Ok(features)
}

fn cors(cors: &Cors) -> Result<ir::Cors, TranslationError> {
    let allow_origins = cors
        .allow_origins
        .iter()
        .map(|origin| {
            if origin.contains('*') {
                ir::StringMatch::regex(regex::escape(origin).replace(r"\*", ".*"))
            } else {
                ir::StringMatch::exact(origin)
            }
        })
        .collect();

    Ok(ir::Cors {
        allow_origins,
        allow_methods: cors.allow_methods.clone(),
        allow_headers: cors.allow_headers.clone(),
        expose_headers: cors.expose_headers.clone(),
        max_age: optional_duration("maxAge", cors.max_age.as_ref())?,
        allow_credentials: cors.allow_credentials.unwrap_or(false),
    })
}

fn basic_auth(
    resources: &Resources,
    from: Referrer,
    ir_name: &str,
    basic_auth: &BasicAuth,
) -> Result<ir::BasicAuth, TranslationError> {
    let secret = resolve_secret(resources, from, &basic_auth.users).map_err(TranslationError::Invalid)?;
    let users = secret_value(secret, HTPASSWD_KEY).ok_or_else(|| {
        TranslationError::invalid(format!(
            "users secret {} must contain the key {HTPASSWD_KEY}",
            basic_auth.users.name
        ))
    })?;

    Ok(ir::BasicAuth {
        name: ir_name.to_string(),
        users: String::from_utf8_lossy(users).into_owned(),
    })
}

/// Every key of every credential Secret is a client id, and its value is
/// that client's API key. Client ids that appear in more than one Secret
/// keep their first key.
fn api_key_auth(
    resources: &Resources,
    from: Referrer,
    api_key_auth: &ApiKeyAuth,
) -> Result<ir::ApiKeyAuth, TranslationError> {
    if api_key_auth.extract_from.is_empty() {
        return Err(TranslationError::invalid("extractFrom must not be empty"));
    }

    let mut extract_from_headers = vec![];
    let mut extract_from_params = vec![];
    for extract_from in &api_key_auth.extract_from {
        if extract_from.headers.is_empty() && extract_from.params.is_empty() {
            return Err(TranslationError::invalid(
                "extractFrom must name at least one header or query parameter",
            ));
        }
        extract_from_headers.extend(extract_from.headers.iter().cloned());
        extract_from_params.extend(extract_from.params.iter().cloned());
    }

    let mut credentials = BTreeMap::new();
    for credential_ref in &api_key_auth.credential_refs {
        let secret = resolve_secret(resources, from, credential_ref).map_err(TranslationError::Invalid)?;
        for (client_id, key) in secret.data.iter().flatten() {
            credentials
                .entry(client_id.clone())
                .or_insert_with(|| String::from_utf8_lossy(&key.0).into_owned());
        }
    }

    Ok(ir::ApiKeyAuth {
        credentials,
        extract_from_headers,
        extract_from_params,
    })
}

fn jwt(jwt: &Jwt) -> Result<ir::Jwt, TranslationError> {
    let mut names = BTreeSet::new();
    let mut providers = Vec::with_capacity(jwt.providers.len());

    for provider in &jwt.providers {
        if provider.name.is_empty() {
            return Err(TranslationError::invalid("provider name must not be empty"));
        }
        if !names.insert(provider.name.as_str()) {
            return Err(TranslationError::invalid(format!(
                "provider name {} must be unique",
                provider.name
            )));
        }

        let uri = &provider.remote_jwks.uri;
        let parsed: http::Uri = uri
            .parse()
            .map_err(|_| TranslationError::invalid(format!("invalid remoteJWKS uri {uri:?}")))?;
        let http_scheme = matches!(parsed.scheme_str(), Some("http" | "https"));
        if !http_scheme || parsed.host().is_none() {
            return Err(TranslationError::invalid(format!(
                "remoteJWKS uri {uri:?} must be an absolute http or https URL"
            )));
        }

        let mut claim_to_headers = BTreeMap::new();
        for claim in &provider.claim_to_headers {
            if http::HeaderName::from_bytes(claim.header.as_bytes()).is_err() {
                return Err(TranslationError::invalid(format!(
                    "claimToHeaders header {:?} is not a valid header name",
                    claim.header
                )));
            }
            if claim.claim.is_empty() {
                return Err(TranslationError::invalid(format!(
                    "claimToHeaders claim for header {} must not be empty",
                    claim.header
                )));
            }
            claim_to_headers.insert(claim.header.clone(), claim.claim.clone());
        }

        providers.push(ir::JwtProvider {
            name: provider.name.clone(),
            issuer: provider.issuer.clone(),
            audiences: provider.audiences.clone(),
            remote_jwks_uri: uri.clone(),
            claim_to_headers,
        });
    }

    Ok(ir::Jwt {
        allow_missing: jwt.optional.unwrap_or(false),
        providers,
    })
}

fn authorization(
    namespace: &str,
    name: &str,
    authorization: &Authorization,
) -> Result<ir::Authorization, TranslationError> {
    let mut rules = Vec::with_capacity(authorization.rules.len());

    for (i, rule) in authorization.rules.iter().enumerate() {
        let rule_name = rule
            .name
            .clone()
            .unwrap_or_else(|| format!("{namespace}/{name}/authorization/rule/{i}"));

        if rule.principal.client_cidrs.is_empty() {
            return Err(TranslationError::invalid(format!(
                "rule {rule_name} must have at least one client CIDR"
            )));
        }
        let client_cidrs = rule
            .principal
            .client_cidrs
            .iter()
            .map(|cidr| parse_cidr(cidr))
            .collect::<Result<_, _>>()?;

        rules.push(ir::AuthorizationRule {
            name: rule_name,
            action: rule.action,
            client_cidrs,
        });
    }

    Ok(ir::Authorization {
        default_action: authorization.default_action.unwrap_or(AuthorizationAction::Deny),
        rules,
    })
}
