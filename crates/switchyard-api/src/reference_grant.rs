//! ReferenceGrants and ClusterTrustBundles.
//!
//! A [ReferenceGrant] lives in the namespace of the object being referenced and
//! allows objects of a kind in another namespace to refer to it.

pub use gateway_api::apis::standard::referencegrants::{
    ReferenceGrant, ReferenceGrantFrom, ReferenceGrantSpec, ReferenceGrantTo,
};
pub use k8s_openapi::api::certificates::v1alpha1::{ClusterTrustBundle, ClusterTrustBundleSpec};

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_grant() {
        let grant: ReferenceGrant = serde_json::from_value(json!({
            "apiVersion": "gateway.networking.k8s.io/v1beta1",
            "kind": "ReferenceGrant",
            "metadata": {"namespace": "backends", "name": "allow-default"},
            "spec": {
                "from": [{"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "namespace": "default"}],
                "to": [{"group": "", "kind": "Service"}],
            },
        }))
        .unwrap();

        assert_eq!(grant.spec.from[0].kind, "HTTPRoute");
        assert_eq!(
            grant.spec.to,
            vec![ReferenceGrantTo {
                group: String::new(),
                kind: "Service".to_string(),
                name: None,
            }]
        );
    }

    #[test]
    fn test_cluster_trust_bundle() {
        let bundle: ClusterTrustBundle = serde_json::from_value(json!({
            "apiVersion": "certificates.k8s.io/v1alpha1",
            "kind": "ClusterTrustBundle",
            "metadata": {"name": "example-ca"},
            "spec": {"trustBundle": "-----BEGIN CERTIFICATE-----"},
        }))
        .unwrap();

        assert_eq!(bundle.spec.trust_bundle, "-----BEGIN CERTIFICATE-----");
        assert_eq!(bundle.spec.signer_name, None);
    }
}
